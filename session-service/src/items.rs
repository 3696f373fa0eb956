// Copyright (C) 2026 StarHuntingGames
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Inventory-driven combat modifiers. Every check takes the inventory as a
//! plain slice; an empty inventory simply yields no effect.

use rand::Rng;
use tactics_common::{Combatant, ItemKind, Player, Profile};

pub const POTION_LIFE_BONUS: i32 = 2;
pub const POTION_DEFENSE_PENALTY: i32 = 1;
pub const SHIELD_DEFENSE_BONUS: i32 = 2;
pub const SHIELD_ATTACK_PENALTY: i32 = 1;
pub const POISON_DAMAGE: i32 = 1;
/// Dagger kills outright when the target's working life is below this.
pub const DAGGER_EXECUTE_THRESHOLD: i32 = 3;

/// Working combat stats for a player. Potion is applied before shield; both
/// stack when held together.
pub fn combatant_for(player: &Player) -> Combatant {
    let stats = &player.stats;
    let mut combatant = Combatant {
        player_id: player.id.clone(),
        life: stats.life,
        max_life: stats.max_life,
        attack: stats.attack,
        defense: stats.defense,
        attack_die: stats.attack_die,
        defense_die: stats.defense_die,
    };

    if player.holds(ItemKind::Potion) {
        combatant.life += POTION_LIFE_BONUS;
        combatant.max_life += POTION_LIFE_BONUS;
        combatant.defense -= POTION_DEFENSE_PENALTY;
    }
    if player.holds(ItemKind::Shield) {
        combatant.defense += SHIELD_DEFENSE_BONUS;
        combatant.attack -= SHIELD_ATTACK_PENALTY;
    }
    combatant
}

pub fn has_poison(inventory: &[ItemKind]) -> bool {
    inventory.contains(&ItemKind::Poison)
}

pub fn dagger_executes(inventory: &[ItemKind], target_life: i32) -> bool {
    inventory.contains(&ItemKind::Dagger) && target_life > 0 && target_life < DAGGER_EXECUTE_THRESHOLD
}

/// Extra roll in `[0, faces - 1]` for a dice holder, zero otherwise.
pub fn dice_bonus<R: Rng>(inventory: &[ItemKind], faces: u32, rng: &mut R) -> i32 {
    if !inventory.contains(&ItemKind::Dice) || faces == 0 {
        return 0;
    }
    rng.random_range(0..faces) as i32
}

pub fn can_revive(player: &Player) -> bool {
    player.holds(ItemKind::Revive) && !player.revive_used
}

fn keep_score(profile: Profile, item: ItemKind) -> u8 {
    match (item, profile) {
        (ItemKind::Flag, _) => 3,
        (item, Profile::Aggressive) if item.is_offensive() => 2,
        (item, Profile::Opportunistic) if !item.is_offensive() => 2,
        _ => 1,
    }
}

/// Item a virtual player leaves behind when its inventory overflows. Among
/// equally ranked items the most recently picked one goes.
pub fn item_to_discard(profile: Profile, inventory: &[ItemKind]) -> Option<ItemKind> {
    inventory
        .iter()
        .rev()
        .min_by_key(|item| keep_score(profile, **item))
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{SeedableRng, rngs::StdRng};
    use tactics_common::{PlayerKind, Position, Stats};

    fn fighter(items: &[ItemKind]) -> Player {
        let mut player = Player::new("p1".into(), "P1", PlayerKind::Human, Position::new(0, 0));
        player.stats = Stats {
            life: 10,
            max_life: 10,
            attack: 5,
            defense: 5,
            ..Stats::default()
        };
        player.inventory = items.to_vec();
        player
    }

    #[test]
    fn potion_raises_life_and_lowers_defense() {
        let combatant = combatant_for(&fighter(&[ItemKind::Potion]));
        assert_eq!(combatant.life, 12);
        assert_eq!(combatant.defense, 4);
        assert_eq!(combatant.attack, 5);
    }

    #[test]
    fn shield_and_potion_stack_in_order() {
        let combatant = combatant_for(&fighter(&[ItemKind::Shield, ItemKind::Potion]));
        assert_eq!(combatant.life, 12);
        assert_eq!(combatant.defense, 5 - 1 + 2);
        assert_eq!(combatant.attack, 4);
    }

    #[test]
    fn empty_inventory_has_no_effects() {
        let mut rng = StdRng::seed_from_u64(3);
        let player = fighter(&[]);
        let combatant = combatant_for(&player);
        assert_eq!((combatant.life, combatant.attack, combatant.defense), (10, 5, 5));
        assert!(!has_poison(&player.inventory));
        assert!(!dagger_executes(&player.inventory, 1));
        assert_eq!(dice_bonus(&player.inventory, 6, &mut rng), 0);
        assert!(!can_revive(&player));
        assert_eq!(item_to_discard(Profile::Aggressive, &player.inventory), None);
    }

    #[test]
    fn dagger_only_executes_below_threshold() {
        let items = [ItemKind::Dagger];
        assert!(dagger_executes(&items, 2));
        assert!(dagger_executes(&items, 1));
        assert!(!dagger_executes(&items, 3));
        assert!(!dagger_executes(&items, 0));
    }

    #[test]
    fn dice_bonus_stays_below_face_count() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..200 {
            let bonus = dice_bonus(&[ItemKind::Dice], 4, &mut rng);
            assert!((0..4).contains(&bonus));
        }
    }

    #[test]
    fn revive_is_single_use() {
        let mut player = fighter(&[ItemKind::Revive]);
        assert!(can_revive(&player));
        player.revive_used = true;
        assert!(!can_revive(&player));
    }

    #[test]
    fn discard_follows_profile_preference() {
        let inventory = [ItemKind::Shield, ItemKind::Dagger, ItemKind::Potion];
        assert_eq!(
            item_to_discard(Profile::Aggressive, &inventory),
            Some(ItemKind::Shield)
        );
        assert_eq!(
            item_to_discard(Profile::Opportunistic, &inventory),
            Some(ItemKind::Potion)
        );
        assert_eq!(
            item_to_discard(Profile::Aggressive, &[ItemKind::Flag, ItemKind::Revive, ItemKind::Shield]),
            Some(ItemKind::Shield)
        );
    }
}
