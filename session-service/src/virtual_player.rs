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

//! Scripted decisions for virtual players and the tasks that drive them.
//!
//! A virtual player's turn runs as a spawned task that alternates thinking
//! delays with ordinary room commands. Every scheduled task carries the
//! room's `ai_ticket` at spawn time and stops as soon as the ticket moves on,
//! so ending a turn or starting another schedule retires it without an abort.

use std::time::Duration;

use tactics_common::{
    GameMode, ItemKind, MAX_INVENTORY, Player, PlayerId, Position, Profile, TileKind,
};
use tracing::{debug, info};

use crate::{
    engine::Engine,
    movement::{CostMap, truncate_to_budget},
    registry::{Room, RoomPhase},
};

/// Upper bound on commands a virtual player issues in one turn.
const MAX_AI_STEPS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Engage { defender_id: PlayerId },
    Travel { path: Vec<Position> },
    OpenDoor { position: Position },
    EndTurn,
}

/// Next command for the virtual player `ai_id` on its own turn.
pub fn decide(room: &Room, ai_id: &str) -> Decision {
    let Some(ai) = room.player(ai_id) else {
        return Decision::EndTurn;
    };
    let profile = ai.profile().unwrap_or_default();
    let enemies: Vec<&Player> = room
        .players
        .iter()
        .filter(|other| !ai.is_ally_of(other))
        .collect();

    if ai.actions_left > 0 {
        if let Some(defender) = pick_adjacent_enemy(room, ai, profile, &enemies) {
            return Decision::Engage {
                defender_id: defender.id.clone(),
            };
        }
    }

    let costs = CostMap::build(&room.board, &room.blocked_for(ai_id), ai.position);
    for tier in target_tiers(room, ai, profile, &enemies) {
        let best = tier
            .into_iter()
            .filter(|target| *target != ai.position)
            .filter_map(|target| costs.cost_to(target).map(|cost| (cost, target)))
            .min();
        let Some((_, target)) = best else {
            continue;
        };
        let Some(path) = costs.path_to(target) else {
            continue;
        };
        let affordable = truncate_to_budget(&room.board, &path, ai.stats.speed);
        if !affordable.is_empty() {
            return Decision::Travel { path: affordable };
        }
    }

    if ai.actions_left > 0 {
        let door = ai
            .position
            .neighbors()
            .into_iter()
            .find(|pos| room.board.tile(*pos) == Some(TileKind::DoorClosed));
        if let Some(position) = door {
            return Decision::OpenDoor { position };
        }
    }
    Decision::EndTurn
}

fn pick_adjacent_enemy<'a>(
    room: &Room,
    ai: &Player,
    profile: Profile,
    enemies: &[&'a Player],
) -> Option<&'a Player> {
    let armed = ai.inventory.iter().any(|item| item.is_offensive());
    enemies
        .iter()
        .copied()
        .filter(|enemy| ai.position.is_adjacent(enemy.position))
        .filter(|enemy| {
            profile == Profile::Aggressive || armed || room.game_mode.holds_flag(&enemy.id)
        })
        .min_by_key(|enemy| {
            (
                !room.game_mode.holds_flag(&enemy.id),
                enemy.stats.life,
                enemy.id.clone(),
            )
        })
}

/// Candidate destinations, most wanted tier first. The cheapest reachable
/// cell of the first tier with an affordable step wins.
fn target_tiers(room: &Room, ai: &Player, profile: Profile, enemies: &[&Player]) -> Vec<Vec<Position>> {
    if room.game_mode.holds_flag(&ai.id) {
        return vec![vec![ai.spawn]];
    }

    let mut tiers = Vec::new();
    if room.mode == GameMode::CaptureTheFlag {
        let carrier = enemies
            .iter()
            .find(|enemy| room.game_mode.holds_flag(&enemy.id));
        if let Some(carrier) = carrier {
            tiers.push(open_cells_around(room, carrier.position));
        }
        if let Some(flag) = room.flag_on_board() {
            tiers.push(vec![flag]);
        }
    }

    let hunting: Vec<Position> = enemies
        .iter()
        .flat_map(|enemy| open_cells_around(room, enemy.position))
        .collect();
    let (offensive, defensive) = if ai.inventory.len() < MAX_INVENTORY {
        (
            item_cells(room, |item| item.is_offensive() && !ai.holds(item)),
            item_cells(room, |item| !item.is_offensive() && !ai.holds(item)),
        )
    } else {
        (Vec::new(), Vec::new())
    };

    match profile {
        Profile::Aggressive => tiers.extend([hunting, offensive, defensive]),
        Profile::Opportunistic => tiers.extend([defensive, offensive, hunting]),
    }
    tiers
}

fn open_cells_around(room: &Room, pos: Position) -> Vec<Position> {
    pos.neighbors()
        .into_iter()
        .filter(|next| room.board.is_traversable(*next) && room.occupant(*next).is_none())
        .collect()
}

/// Board cells holding a pickable item accepted by `wanted`. The flag is
/// handled by its own tier.
fn item_cells(room: &Room, wanted: impl Fn(ItemKind) -> bool) -> Vec<Position> {
    room.board
        .positions()
        .filter(|pos| {
            room.board.item_at(*pos).is_some_and(|item| {
                item.is_pickable() && item != ItemKind::Flag && wanted(item)
            })
        })
        .collect()
}

/// Whether a virtual player's scheduled task may still act.
fn ai_may_act(room: &Room, ai_id: &str, ticket: u64) -> bool {
    room.is_active()
        && room.ai_ticket == ticket
        && room.phase == RoomPhase::Playing
        && room.is_turn_holder(ai_id)
        && room.combat.is_none()
        && room.locked_by.is_none()
}

impl Engine {
    /// Spawn the turn driver for the virtual holder, retiring any earlier one.
    pub(crate) fn schedule_ai_turn(&self, room: &mut Room, delay: Duration) {
        room.ai_ticket += 1;
        let Some(ai_id) = room
            .turn_holder()
            .filter(|holder| holder.is_virtual())
            .map(|holder| holder.id.clone())
        else {
            return;
        };
        let ticket = room.ai_ticket;
        let room_id = room.id.clone();
        let engine = self.clone();
        let task = tokio::spawn(async move {
            engine.run_ai_turn(room_id, ai_id, ticket, delay).await;
        });
        room.ai_task = Some(task.abort_handle());
    }

    /// Spawn a strike for a virtual combat-turn owner.
    pub(crate) fn schedule_ai_combat(&self, room: &mut Room) {
        room.ai_ticket += 1;
        let Some(owner) = room.combat.as_ref().map(|combat| combat.turn_owner.clone()) else {
            return;
        };
        if !room.player(&owner).is_some_and(Player::is_virtual) {
            return;
        }
        let ticket = room.ai_ticket;
        let delay = self.think_delay(room);
        let room_id = room.id.clone();
        let engine = self.clone();
        let task = tokio::spawn(async move {
            engine.run_ai_combat(room_id, owner, ticket, delay).await;
        });
        room.ai_task = Some(task.abort_handle());
    }

    /// Abort whatever the room's virtual player is waiting on.
    pub(crate) fn cancel_ai(&self, room: &mut Room) {
        if let Some(task) = room.ai_task.take() {
            task.abort();
        }
        room.ai_ticket += 1;
    }

    async fn run_ai_turn(&self, room_id: String, ai_id: PlayerId, ticket: u64, delay: Duration) {
        tokio::time::sleep(delay).await;

        for _ in 0..MAX_AI_STEPS {
            let (decision, pause) = {
                let Some(mut room) = self.registry.lock(&room_id).await else {
                    return;
                };
                if !ai_may_act(&room, &ai_id, ticket) {
                    return;
                }
                let decision = decide(&room, &ai_id);
                (decision, self.think_delay(&mut room))
            };
            debug!(room_id = %room_id, player_id = %ai_id, decision = ?decision, "virtual player decided");

            let outcome = match decision {
                Decision::Engage { defender_id } => {
                    // Combat drives itself from here.
                    self.engage(&room_id, &ai_id, &defender_id).await;
                    return;
                }
                Decision::Travel { path } => self.move_player(&room_id, &ai_id, path, false).await,
                Decision::OpenDoor { position } => {
                    self.toggle_door(&room_id, &ai_id, position).await
                }
                Decision::EndTurn => break,
            };
            if !outcome.applied {
                debug!(room_id = %room_id, player_id = %ai_id, reason = ?outcome.reason, "virtual player command refused");
                break;
            }
            tokio::time::sleep(pause).await;
        }

        let Some(mut room) = self.registry.lock(&room_id).await else {
            return;
        };
        if ai_may_act(&room, &ai_id, ticket) {
            info!(room_id = %room_id, player_id = %ai_id, "virtual player ends turn");
            self.end_turn(&mut room).await;
        }
    }

    async fn run_ai_combat(&self, room_id: String, ai_id: PlayerId, ticket: u64, delay: Duration) {
        tokio::time::sleep(delay).await;
        let Some(mut room) = self.registry.lock(&room_id).await else {
            return;
        };
        let owns_turn = room
            .combat
            .as_ref()
            .is_some_and(|combat| combat.turn_owner == ai_id);
        if room.is_active() && room.ai_ticket == ticket && owns_turn {
            self.strike(&mut room).await;
        }
    }
}
