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

use std::collections::{HashSet, VecDeque};

use rand::Rng;
use tactics_common::{
    AttackReport, Board, CombatView, Combatant, CommandOutcome, GameMode, ItemKind, Player,
    PlayerId, Position, Rejection, RoomEvent, VICTORIES_TO_WIN, Winner,
};
use tracing::{debug, info, warn};

use crate::{
    engine::Engine,
    items::{POISON_DAMAGE, can_revive, combatant_for, dagger_executes, dice_bonus, has_poison},
    registry::{Room, RoomPhase},
    timer::{TimerInfo, TimerKind, TimerPhase},
};

/// Two players locked in a fight, with their item-modified working stats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombatState {
    pub attacker: Combatant,
    pub defender: Combatant,
    pub turn_owner: PlayerId,
    pub rounds: u32,
}

impl CombatState {
    /// The initiator strikes first.
    pub fn begin(attacker: &Player, defender: &Player) -> Self {
        Self {
            attacker: combatant_for(attacker),
            defender: combatant_for(defender),
            turn_owner: attacker.id.clone(),
            rounds: 0,
        }
    }

    pub fn view(&self) -> CombatView {
        CombatView {
            attacker: self.attacker.clone(),
            defender: self.defender.clone(),
            turn_owner: self.turn_owner.clone(),
        }
    }

    pub fn involves(&self, player_id: &str) -> bool {
        self.attacker.player_id == player_id || self.defender.player_id == player_id
    }

    pub fn opponent_of(&self, player_id: &str) -> Option<PlayerId> {
        if self.attacker.player_id == player_id {
            Some(self.defender.player_id.clone())
        } else if self.defender.player_id == player_id {
            Some(self.attacker.player_id.clone())
        } else {
            None
        }
    }

    /// `(striker, target)` for the given striker.
    fn sides_mut(&mut self, striker_id: &str) -> (&mut Combatant, &mut Combatant) {
        if self.attacker.player_id == striker_id {
            (&mut self.attacker, &mut self.defender)
        } else {
            (&mut self.defender, &mut self.attacker)
        }
    }
}

fn roll<R: Rng>(faces: u32, rng: &mut R) -> i32 {
    rng.random_range(1..=faces.max(1)) as i32
}

/// One attack from `striker` against `target`, mutating the target's working
/// life. Dagger execution skips the rolls; poison hits on every attack; a
/// revive catches the target at zero life.
pub fn resolve_attack<R: Rng>(
    striker: &Combatant,
    striker_items: &[ItemKind],
    target: &mut Combatant,
    target_items: &[ItemKind],
    target_can_revive: bool,
    rng: &mut R,
) -> AttackReport {
    let mut report = AttackReport {
        attacker_id: striker.player_id.clone(),
        defender_id: target.player_id.clone(),
        attack_roll: 0,
        defense_roll: 0,
        damage: 0,
        poison_damage: 0,
        executed: false,
        revived: false,
        defender_life: target.life,
    };

    if dagger_executes(striker_items, target.life) {
        report.executed = true;
        report.damage = target.life;
    } else {
        report.attack_roll = striker.attack
            + roll(striker.attack_die, rng)
            + dice_bonus(striker_items, striker.attack_die, rng);
        report.defense_roll = target.defense
            + roll(target.defense_die, rng)
            + dice_bonus(target_items, target.defense_die, rng);
        report.damage = (report.attack_roll - report.defense_roll).max(0);
    }
    target.life -= report.damage;

    if !report.executed && has_poison(striker_items) {
        report.poison_damage = POISON_DAMAGE;
        target.life -= POISON_DAMAGE;
    }

    if target.life <= 0 && target_can_revive {
        target.life = target.max_life;
        report.revived = true;
    }
    report.defender_life = target.life;
    report
}

/// Breadth-first search over traversable cells from `origin`, returning the
/// first cell accepted by `is_free`.
fn nearest_cell(
    board: &Board,
    origin: Position,
    is_free: impl Fn(Position) -> bool,
) -> Option<Position> {
    let mut seen = HashSet::from([origin]);
    let mut queue = VecDeque::from([origin]);
    while let Some(pos) = queue.pop_front() {
        if is_free(pos) {
            return Some(pos);
        }
        for next in pos.neighbors() {
            if board.is_traversable(next) && seen.insert(next) {
                queue.push_back(next);
            }
        }
    }
    None
}

/// Respawn cell for a defeated player: the starting point when nobody else
/// stands on it, otherwise the closest empty cell around it.
pub fn find_next_player_position(
    board: &Board,
    players: &[Player],
    loser_id: &str,
    spawn: Position,
) -> Position {
    let occupied = |pos: Position| {
        players
            .iter()
            .any(|player| player.id != loser_id && player.position == pos)
    };
    if !occupied(spawn) {
        return spawn;
    }
    nearest_cell(board, spawn, |pos| {
        board.is_traversable(pos) && board.item_at(pos).is_none() && !occupied(pos)
    })
    .unwrap_or(spawn)
}

/// Closest cell around `origin` whose item slot can take a dropped item.
/// Cells under other players are skipped.
pub fn nearest_item_slot(room: &Room, origin: Position, owner_id: &str) -> Option<Position> {
    nearest_cell(&room.board, origin, |pos| {
        room.can_hold_item(pos) && !room.is_occupied_by_other(pos, owner_id)
    })
}

impl Engine {
    pub async fn engage(&self, room_id: &str, attacker_id: &str, defender_id: &str) -> CommandOutcome {
        let Some(mut room) = self.registry.lock(room_id).await else {
            return CommandOutcome::rejected(Rejection::RoomNotFound);
        };
        if let Err(reason) = check_action_allowed(&room, attacker_id) {
            return CommandOutcome::rejected(reason);
        }
        let (Some(attacker), Some(defender)) = (room.player(attacker_id), room.player(defender_id))
        else {
            return CommandOutcome::rejected(Rejection::PlayerNotFound);
        };
        if attacker.actions_left == 0 {
            return CommandOutcome::rejected(Rejection::NoActionLeft);
        }
        if attacker.is_ally_of(defender) {
            return CommandOutcome::rejected(Rejection::InvalidTarget);
        }
        if !attacker.position.is_adjacent(defender.position) {
            return CommandOutcome::rejected(Rejection::NotAdjacent);
        }

        self.start_combat(&mut room, attacker_id, defender_id).await;
        CommandOutcome::applied()
    }

    async fn start_combat(&self, room: &mut Room, attacker_id: &str, defender_id: &str) {
        let (Some(attacker), Some(defender)) = (room.player(attacker_id), room.player(defender_id))
        else {
            return;
        };
        let combat = CombatState::begin(attacker, defender);

        if let Some(attacker) = room.player_mut(attacker_id) {
            attacker.actions_left = attacker.actions_left.saturating_sub(1);
            attacker.game_stats.combats += 1;
        }
        if let Some(defender) = room.player_mut(defender_id) {
            defender.game_stats.combats += 1;
        }

        info!(
            room_id = %room.id,
            attacker_id = %attacker_id,
            defender_id = %defender_id,
            "combat started"
        );
        self.emit(
            &room.id,
            RoomEvent::CombatStarted {
                combat: combat.view(),
            },
        );
        room.combat = Some(combat);

        self.timers.stop(&room.id, TimerPhase::Turn).await;
        self.timers
            .start(TimerInfo::new(
                room.id.clone(),
                self.settings.combat_seconds,
                TimerKind::Combat,
            ))
            .await;
        self.schedule_ai_combat(room);
    }

    pub async fn attack(&self, room_id: &str, attacker_id: &str, defender_id: &str) -> CommandOutcome {
        let Some(mut room) = self.registry.lock(room_id).await else {
            return CommandOutcome::rejected(Rejection::RoomNotFound);
        };
        if !room.is_active() {
            return CommandOutcome::rejected(Rejection::GameOver);
        }
        let Some(combat) = room.combat.as_ref() else {
            return CommandOutcome::rejected(Rejection::NotInCombat);
        };
        if combat.turn_owner != attacker_id {
            return CommandOutcome::rejected(Rejection::NotCombatTurn);
        }
        if combat.opponent_of(attacker_id).as_deref() != Some(defender_id) {
            return CommandOutcome::rejected(Rejection::InvalidTarget);
        }

        self.strike(&mut room).await;
        CommandOutcome::applied()
    }

    /// The current combat-turn owner attacks; also run on combat timer expiry.
    pub(crate) async fn strike(&self, room: &mut Room) {
        let Some(mut combat) = room.combat.take() else {
            return;
        };
        let striker_id = combat.turn_owner.clone();
        let Some(target_id) = combat.opponent_of(&striker_id) else {
            return;
        };
        let striker_items = room
            .player(&striker_id)
            .map(|player| player.inventory.clone())
            .unwrap_or_default();
        let (target_items, target_can_revive) = room
            .player(&target_id)
            .map(|player| (player.inventory.clone(), can_revive(player)))
            .unwrap_or_default();

        let (striker, target) = combat.sides_mut(&striker_id);
        let report = resolve_attack(
            striker,
            &striker_items,
            target,
            &target_items,
            target_can_revive,
            &mut room.rng,
        );
        combat.rounds += 1;

        let dealt = report.damage + report.poison_damage;
        if let Some(striker) = room.player_mut(&striker_id) {
            striker.game_stats.damage_dealt += dealt;
        }
        if let Some(target) = room.player_mut(&target_id) {
            target.game_stats.life_lost += dealt;
            if report.revived {
                target.revive_used = true;
                if let Some(slot) = target.inventory.iter().position(|item| *item == ItemKind::Revive) {
                    target.inventory.remove(slot);
                }
            }
        }

        let target_down = report.defender_life <= 0;
        if !target_down {
            combat.turn_owner = target_id.clone();
        }
        debug!(
            room_id = %room.id,
            striker_id = %striker_id,
            target_id = %target_id,
            damage = report.damage,
            poison = report.poison_damage,
            life = report.defender_life,
            "attack resolved"
        );
        self.emit(
            &room.id,
            RoomEvent::CombatUpdate {
                message: attack_message(&report),
                report,
                combat: combat.view(),
            },
        );

        if target_down {
            self.finish_combat(room, &striker_id, &target_id).await;
            return;
        }

        room.combat = Some(combat);
        self.timers
            .reset(TimerInfo::new(
                room.id.clone(),
                self.settings.combat_seconds,
                TimerKind::Combat,
            ))
            .await;
        self.schedule_ai_combat(room);
    }

    async fn finish_combat(&self, room: &mut Room, winner_id: &str, loser_id: &str) {
        self.timers.stop(&room.id, TimerPhase::Combat).await;
        room.combat = None;

        self.strip_inventory(room, loser_id);
        let respawn = match room.player(loser_id) {
            Some(loser) => find_next_player_position(&room.board, &room.players, loser_id, loser.spawn),
            None => return,
        };
        if let Some(loser) = room.player_mut(loser_id) {
            loser.position = respawn;
            loser.defeats += 1;
            loser.stats.life = loser.stats.max_life;
            loser.game_stats.visited.insert(respawn);
        }
        room.game_mode.record_visit(respawn);

        let mut winner_victories = 0;
        if let Some(winner) = room.player_mut(winner_id) {
            winner.victories += 1;
            winner.stats.life = winner.stats.max_life;
            winner_victories = winner.victories;
        }

        info!(
            room_id = %room.id,
            winner_id = %winner_id,
            loser_id = %loser_id,
            victories = winner_victories,
            "combat finished"
        );
        self.emit(
            &room.id,
            RoomEvent::CombatEnded {
                winner_id: winner_id.to_string(),
                loser_id: loser_id.to_string(),
                respawn,
                players: room.players.clone(),
            },
        );

        if room.mode == GameMode::Classic && winner_victories >= VICTORIES_TO_WIN {
            self.conclude(
                room,
                Some(Winner::Player {
                    player_id: winner_id.to_string(),
                }),
            )
            .await;
            return;
        }

        self.resume_after_combat(room, winner_id).await;
    }

    /// A virtual winner holding the turn keeps playing after a short pause;
    /// any other outcome ends the turn.
    pub(crate) async fn resume_after_combat(&self, room: &mut Room, winner_id: &str) {
        let virtual_holder = room.is_turn_holder(winner_id)
            && room.player(winner_id).is_some_and(Player::is_virtual);
        if virtual_holder {
            self.timers
                .start(TimerInfo::new(
                    room.id.clone(),
                    self.settings.turn_seconds,
                    TimerKind::Turn,
                ))
                .await;
            let delay = self.settings.post_combat_delay();
            self.schedule_ai_turn(room, delay);
        } else {
            self.end_turn(room).await;
        }
    }

    /// Empty a player's inventory onto the nearest free cells around them,
    /// dropping the flag if they carried it.
    pub(crate) fn strip_inventory(&self, room: &mut Room, player_id: &str) -> Vec<(ItemKind, Position)> {
        let Some(player) = room.player_mut(player_id) else {
            return Vec::new();
        };
        let items = std::mem::take(&mut player.inventory);
        let origin = player.position;
        self.scatter_items(room, player_id, items, origin)
    }

    pub(crate) fn scatter_items(
        &self,
        room: &mut Room,
        owner_id: &str,
        mut items: Vec<ItemKind>,
        origin: Position,
    ) -> Vec<(ItemKind, Position)> {
        // The flag claims the closest slot.
        items.sort_by_key(|item| *item != ItemKind::Flag);

        let mut dropped = Vec::with_capacity(items.len());
        for item in items {
            let slot = match nearest_item_slot(room, origin, owner_id) {
                Some(slot) => slot,
                None if item == ItemKind::Flag => {
                    let Some(slot) = flag_fallback_slot(room, origin, owner_id) else {
                        warn!(room_id = %room.id, "no cell left for the dropped flag");
                        continue;
                    };
                    if let Some(displaced) = room.board.take_item(slot) {
                        warn!(room_id = %room.id, item = ?displaced, position = ?slot, "item displaced by the dropped flag");
                    }
                    slot
                }
                None => {
                    debug!(room_id = %room.id, item = ?item, "no free cell for dropped item");
                    continue;
                }
            };
            room.board.place_item(slot, item);
            dropped.push((item, slot));
            self.emit(
                &room.id,
                RoomEvent::ItemDropped {
                    player_id: owner_id.to_string(),
                    item,
                    position: slot,
                },
            );
        }

        if room.game_mode.holds_flag(owner_id) {
            room.game_mode.flag_dropped();
            let position = dropped
                .iter()
                .find(|(item, _)| *item == ItemKind::Flag)
                .map(|(_, pos)| *pos);
            self.emit(
                &room.id,
                RoomEvent::FlagDropped {
                    player_id: owner_id.to_string(),
                    position,
                },
            );
        }
        dropped
    }
}

/// Cell for a flag when every slot around is taken: the closest walkable
/// cell not under another player, whatever ordinary item lies there.
fn flag_fallback_slot(room: &Room, origin: Position, owner_id: &str) -> Option<Position> {
    nearest_cell(&room.board, origin, |pos| {
        room.board.is_traversable(pos)
            && room.board.item_at(pos) != Some(ItemKind::StartingPoint)
            && !room.is_occupied_by_other(pos, owner_id)
    })
}

/// Shared guard for turn-holder actions.
pub(crate) fn check_action_allowed(room: &Room, player_id: &str) -> Result<(), Rejection> {
    if !room.is_active() {
        return Err(Rejection::GameOver);
    }
    if room.player(player_id).is_none() {
        return Err(Rejection::PlayerNotFound);
    }
    if room.phase != RoomPhase::Playing {
        return Err(Rejection::TurnNotStarted);
    }
    if !room.is_turn_holder(player_id) {
        return Err(Rejection::NotYourTurn);
    }
    if room.locked_by.is_some() {
        return Err(Rejection::RoomBusy);
    }
    if room.combat.is_some() {
        return Err(Rejection::CombatInProgress);
    }
    if room.pending_swap.is_some() {
        return Err(Rejection::SwapPending);
    }
    Ok(())
}

fn attack_message(report: &AttackReport) -> String {
    if report.executed {
        return format!("{} executed {}", report.attacker_id, report.defender_id);
    }
    let mut message = format!(
        "{} rolled {} against {} and dealt {} damage",
        report.attacker_id, report.attack_roll, report.defense_roll, report.damage
    );
    if report.poison_damage > 0 {
        message.push_str(&format!(" (+{} poison)", report.poison_damage));
    }
    if report.revived {
        message.push_str(&format!("; {} was revived", report.defender_id));
    }
    message
}
