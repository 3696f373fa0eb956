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

use std::{
    cmp::Reverse,
    collections::{BinaryHeap, HashMap, HashSet},
};

use tactics_common::{
    Board, CommandOutcome, Facing, ItemKind, MAX_INVENTORY, Player, Position, Rejection,
    RoomEvent, TileKind, Winner,
};
use tracing::{debug, info};

use crate::{
    combat::{check_action_allowed, nearest_item_slot},
    engine::Engine,
    items::item_to_discard,
    registry::Room,
};

/// Cheapest entry cost from one origin to every reachable cell.
#[derive(Debug, Clone)]
pub struct CostMap {
    origin: Position,
    costs: HashMap<Position, u32>,
    previous: HashMap<Position, Position>,
}

impl CostMap {
    /// Dijkstra over traversable cells, never entering `blocked`.
    pub fn build(board: &Board, blocked: &HashSet<Position>, origin: Position) -> Self {
        let mut costs = HashMap::from([(origin, 0)]);
        let mut previous = HashMap::new();
        let mut frontier = BinaryHeap::from([Reverse((0u32, origin))]);

        while let Some(Reverse((cost, pos))) = frontier.pop() {
            if costs.get(&pos).is_some_and(|best| *best < cost) {
                continue;
            }
            for next in pos.neighbors() {
                if blocked.contains(&next) {
                    continue;
                }
                let Some(step) = board.tile_cost(next) else {
                    continue;
                };
                let total = cost + step;
                if costs.get(&next).is_none_or(|best| total < *best) {
                    costs.insert(next, total);
                    previous.insert(next, pos);
                    frontier.push(Reverse((total, next)));
                }
            }
        }

        Self {
            origin,
            costs,
            previous,
        }
    }

    pub fn cost_to(&self, pos: Position) -> Option<u32> {
        self.costs.get(&pos).copied()
    }

    /// Steps from the origin to `target`, origin excluded.
    pub fn path_to(&self, target: Position) -> Option<Vec<Position>> {
        self.costs.get(&target)?;
        let mut path = Vec::new();
        let mut cursor = target;
        while cursor != self.origin {
            path.push(cursor);
            cursor = *self.previous.get(&cursor)?;
        }
        path.reverse();
        Some(path)
    }

    pub fn reachable_within(&self, budget: u32) -> Vec<Position> {
        let mut cells: Vec<Position> = self
            .costs
            .iter()
            .filter(|(pos, cost)| **pos != self.origin && **cost <= budget)
            .map(|(pos, _)| *pos)
            .collect();
        cells.sort();
        cells
    }
}

/// Longest prefix of `path` whose cost fits in `budget`.
pub fn truncate_to_budget(board: &Board, path: &[Position], budget: u32) -> Vec<Position> {
    let mut spent = 0;
    let mut kept = Vec::new();
    for pos in path {
        let Some(cost) = board.tile_cost(*pos) else {
            break;
        };
        if spent + cost > budget {
            break;
        }
        spent += cost;
        kept.push(*pos);
    }
    kept
}

pub fn facing_for(from: Position, to: Position, current: Facing) -> Facing {
    match to.x.cmp(&from.x) {
        std::cmp::Ordering::Less => Facing::Left,
        std::cmp::Ordering::Greater => Facing::Right,
        std::cmp::Ordering::Equal => current,
    }
}

/// Total cost of a requested path, or the reason it cannot be walked.
/// Nothing is mutated; a rejected path leaves the mover where it stands.
pub fn validate_path(
    room: &Room,
    mover: &Player,
    path: &[Position],
    forced: bool,
) -> Result<u32, Rejection> {
    if forced {
        if !room.debug {
            return Err(Rejection::DebugDisabled);
        }
        let Some(destination) = path.last() else {
            return Ok(0);
        };
        if !room.board.is_traversable(*destination)
            || room.is_occupied_by_other(*destination, &mover.id)
        {
            return Err(Rejection::PathBlocked);
        }
        return Ok(0);
    }

    let mut previous = mover.position;
    let mut total = 0u32;
    for step in path {
        if !previous.is_adjacent(*step) {
            return Err(Rejection::PathNotContiguous);
        }
        let Some(cost) = room.board.tile_cost(*step) else {
            return Err(Rejection::PathBlocked);
        };
        if room.is_occupied_by_other(*step, &mover.id) {
            return Err(Rejection::PathBlocked);
        }
        total += cost;
        previous = *step;
    }
    if total > mover.stats.speed {
        return Err(Rejection::PathTooCostly);
    }
    Ok(total)
}

enum StepResult {
    Continue,
    Stop,
    Aborted(CommandOutcome),
}

impl Engine {
    pub async fn move_player(
        &self,
        room_id: &str,
        player_id: &str,
        path: Vec<Position>,
        forced: bool,
    ) -> CommandOutcome {
        let steps = {
            let Some(mut room) = self.registry.lock(room_id).await else {
                return CommandOutcome::rejected(Rejection::RoomNotFound);
            };
            if let Err(reason) = check_action_allowed(&room, player_id) {
                return CommandOutcome::rejected(reason);
            }
            if path.is_empty() {
                return CommandOutcome::noop();
            }
            let Some(mover) = room.player(player_id) else {
                return CommandOutcome::rejected(Rejection::PlayerNotFound);
            };
            if let Err(reason) = validate_path(&room, mover, &path, forced) {
                debug!(
                    room_id = %room_id,
                    player_id = %player_id,
                    reason = ?reason,
                    "move rejected"
                );
                return CommandOutcome::rejected(reason);
            }
            room.locked_by = Some(player_id.to_string());
            if forced {
                path.last().copied().into_iter().collect::<Vec<_>>()
            } else {
                path
            }
        };

        for step in steps {
            tokio::time::sleep(self.settings.move_step_delay()).await;
            match self.take_step(room_id, player_id, step, forced).await {
                StepResult::Continue => {}
                StepResult::Stop => break,
                StepResult::Aborted(outcome) => return outcome,
            }
        }

        if let Some(mut room) = self.registry.lock(room_id).await {
            self.finish_action(&mut room, player_id).await;
        }
        CommandOutcome::applied()
    }

    async fn take_step(
        &self,
        room_id: &str,
        player_id: &str,
        step: Position,
        forced: bool,
    ) -> StepResult {
        let Some(mut room) = self.registry.lock(room_id).await else {
            return StepResult::Aborted(CommandOutcome::applied());
        };
        if !room.is_active() {
            return StepResult::Aborted(CommandOutcome::applied());
        }
        // Quit handling clears the lock and removes the mover.
        if room.locked_by.as_deref() != Some(player_id) || room.player(player_id).is_none() {
            debug!(room_id = %room_id, player_id = %player_id, "mover left mid-path");
            return StepResult::Aborted(CommandOutcome::rejected(Rejection::MoverDisconnected));
        }
        if room.is_occupied_by_other(step, player_id) || !room.board.is_traversable(step) {
            return StepResult::Stop;
        }

        let cost = if forced {
            0
        } else {
            room.board.tile_cost(step).unwrap_or(0)
        };
        let Some(mover) = room.player_mut(player_id) else {
            return StepResult::Aborted(CommandOutcome::rejected(Rejection::MoverDisconnected));
        };
        mover.facing = facing_for(mover.position, step, mover.facing);
        mover.position = step;
        mover.stats.speed = mover.stats.speed.saturating_sub(cost);
        mover.game_stats.visited.insert(step);
        let (facing, speed_left) = (mover.facing, mover.stats.speed);
        room.game_mode.record_visit(step);

        self.emit(
            room_id,
            RoomEvent::PlayerNextPosition {
                player_id: player_id.to_string(),
                position: step,
                facing,
                speed_left,
            },
        );

        let picked = self.pick_up(&mut room, player_id, step);
        self.check_capture(&mut room, player_id).await;
        if !room.is_active() {
            return StepResult::Aborted(CommandOutcome::applied());
        }
        if picked {
            StepResult::Stop
        } else {
            StepResult::Continue
        }
    }

    /// Release the room after a multi-step action and honour a turn expiry
    /// that arrived meanwhile.
    pub(crate) async fn finish_action(&self, room: &mut Room, player_id: &str) {
        if room.locked_by.as_deref() == Some(player_id) {
            room.locked_by = None;
        }
        if room.is_active() && room.expire_after_action && room.locked_by.is_none() {
            info!(room_id = %room.id, "deferred turn expiry applied");
            self.end_turn(room).await;
        }
    }

    fn pick_up(&self, room: &mut Room, player_id: &str, pos: Position) -> bool {
        let Some(item) = room.board.item_at(pos).filter(|item| item.is_pickable()) else {
            return false;
        };
        // One of each kind per inventory; a duplicate stays on the board.
        if room.player(player_id).is_none_or(|player| player.holds(item)) {
            return false;
        }
        room.board.take_item(pos);
        let Some(player) = room.player_mut(player_id) else {
            return false;
        };
        player.inventory.push(item);
        player.game_stats.items_collected += 1;
        let overflow = player.inventory.len() > MAX_INVENTORY;
        let profile = player.profile();

        self.emit(
            &room.id,
            RoomEvent::ItemPickedUp {
                player_id: player_id.to_string(),
                item,
                position: pos,
            },
        );

        if item == ItemKind::Flag {
            if let Some(player) = room.player(player_id).cloned() {
                let holder = room.game_mode.flag_taken(&player);
                self.emit(&room.id, RoomEvent::FlagTaken { player: holder });
            }
        }

        if overflow {
            match profile {
                Some(profile) => {
                    let inventory = room
                        .player(player_id)
                        .map(|player| player.inventory.clone())
                        .unwrap_or_default();
                    if let Some(discard) = item_to_discard(profile, &inventory) {
                        self.discard(room, player_id, discard);
                    }
                }
                None => {
                    room.pending_swap = Some(player_id.to_string());
                    let inventory = room
                        .player(player_id)
                        .map(|player| player.inventory.clone())
                        .unwrap_or_default();
                    self.emit(
                        &room.id,
                        RoomEvent::InventoryFull {
                            player_id: player_id.to_string(),
                            inventory,
                        },
                    );
                }
            }
        }
        true
    }

    async fn check_capture(&self, room: &mut Room, player_id: &str) {
        let Some(team) = room
            .player(player_id)
            .and_then(|player| room.game_mode.check_flag_captured(room.mode, player))
        else {
            return;
        };
        room.game_mode.flag_dropped();
        info!(room_id = %room.id, player_id = %player_id, team = ?team, "flag captured");
        self.emit(
            &room.id,
            RoomEvent::FlagCaptured {
                team: Some(team),
                player_id: player_id.to_string(),
            },
        );
        self.conclude(room, Some(Winner::Team { team })).await;
    }

    /// Leave `item` on the player's cell, or the closest free cell when that
    /// slot is taken. Returns where it landed.
    pub(crate) fn discard(&self, room: &mut Room, player_id: &str, item: ItemKind) -> Option<Position> {
        let player = room.player_mut(player_id)?;
        let slot = player.inventory.iter().rposition(|held| *held == item)?;
        player.inventory.remove(slot);
        let origin = player.position;

        let target = if room.can_hold_item(origin) {
            Some(origin)
        } else {
            nearest_item_slot(room, origin, player_id)
        };
        let Some(target) = target else {
            // Nowhere to put it; the item stays in the inventory.
            if let Some(player) = room.player_mut(player_id) {
                player.inventory.insert(slot, item);
            }
            return None;
        };

        room.board.place_item(target, item);
        if room.pending_swap.as_deref() == Some(player_id) {
            room.pending_swap = None;
        }
        self.emit(
            &room.id,
            RoomEvent::ItemDropped {
                player_id: player_id.to_string(),
                item,
                position: target,
            },
        );
        if item == ItemKind::Flag && room.game_mode.holds_flag(player_id) {
            room.game_mode.flag_dropped();
            self.emit(
                &room.id,
                RoomEvent::FlagDropped {
                    player_id: player_id.to_string(),
                    position: Some(target),
                },
            );
        }
        Some(target)
    }

    pub async fn drop_item(&self, room_id: &str, player_id: &str, item: ItemKind) -> CommandOutcome {
        let Some(mut room) = self.registry.lock(room_id).await else {
            return CommandOutcome::rejected(Rejection::RoomNotFound);
        };
        if !room.is_active() {
            return CommandOutcome::rejected(Rejection::GameOver);
        }
        let Some(player) = room.player(player_id) else {
            return CommandOutcome::rejected(Rejection::PlayerNotFound);
        };
        if !room.is_turn_holder(player_id) {
            return CommandOutcome::rejected(Rejection::NotYourTurn);
        }
        if room.locked_by.is_some() {
            return CommandOutcome::rejected(Rejection::RoomBusy);
        }
        if room.combat.is_some() {
            return CommandOutcome::rejected(Rejection::CombatInProgress);
        }
        if !player.holds(item) {
            return CommandOutcome::rejected(Rejection::ItemNotHeld);
        }

        match self.discard(&mut room, player_id, item) {
            Some(_) => CommandOutcome::applied(),
            None => CommandOutcome::noop(),
        }
    }

    pub async fn toggle_door(&self, room_id: &str, player_id: &str, position: Position) -> CommandOutcome {
        let Some(mut room) = self.registry.lock(room_id).await else {
            return CommandOutcome::rejected(Rejection::RoomNotFound);
        };
        if let Err(reason) = check_action_allowed(&room, player_id) {
            return CommandOutcome::rejected(reason);
        }
        let Some(player) = room.player(player_id) else {
            return CommandOutcome::rejected(Rejection::PlayerNotFound);
        };
        if player.actions_left == 0 {
            return CommandOutcome::rejected(Rejection::NoActionLeft);
        }
        if !player.position.is_adjacent(position) {
            return CommandOutcome::rejected(Rejection::NotAdjacent);
        }
        let tile = match room.board.tile(position) {
            Some(TileKind::DoorClosed) => TileKind::DoorOpen,
            Some(TileKind::DoorOpen) => {
                if room.occupant(position).is_some() || room.board.item_at(position).is_some() {
                    return CommandOutcome::rejected(Rejection::DoorBlocked);
                }
                TileKind::DoorClosed
            }
            _ => return CommandOutcome::rejected(Rejection::NotADoor),
        };

        if let Some(cell) = room.board.cell_mut(position) {
            cell.tile = tile;
        }
        if let Some(player) = room.player_mut(player_id) {
            player.actions_left -= 1;
        }
        room.game_mode.record_door_toggle(position);
        debug!(room_id = %room_id, player_id = %player_id, position = ?position, tile = ?tile, "door toggled");
        self.emit(
            room_id,
            RoomEvent::DoorToggled {
                player_id: player_id.to_string(),
                position,
                tile,
            },
        );
        CommandOutcome::applied()
    }
}
