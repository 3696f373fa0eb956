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

use rand::{Rng, seq::SliceRandom};
use tactics_common::{
    ACTIONS_PER_TURN, CommandOutcome, GameMode, MIN_PLAYERS, Player, PlayerId, Rejection,
    RoomEvent, VICTORIES_TO_WIN, Winner,
};
use tracing::{debug, info};

use crate::{
    engine::Engine,
    registry::{Room, RoomPhase},
    timer::{TimerInfo, TimerKind, TimerPhase},
};

/// Turn order for a new session: fastest first, ties broken by a shuffle.
pub fn first_turn_order<R: Rng>(players: &[Player], rng: &mut R) -> Vec<PlayerId> {
    let mut order: Vec<&Player> = players.iter().collect();
    order.shuffle(rng);
    // Stable sort keeps the shuffled order among equal speeds.
    order.sort_by(|a, b| b.stats.max_speed.cmp(&a.stats.max_speed));
    order.into_iter().map(|player| player.id.clone()).collect()
}

impl Room {
    pub fn set_first_turn(&mut self) -> Option<PlayerId> {
        self.turn_order = first_turn_order(&self.players, &mut self.rng);
        self.turn_index = 0;
        self.current_turn = self.turn_order.first().cloned();
        self.current_turn.clone()
    }

    /// Advance circularly through the session's fixed order, skipping
    /// players who have left. Works from the last holder's slot even when
    /// that holder is gone.
    pub fn next_turn(&mut self) -> Option<PlayerId> {
        let len = self.turn_order.len();
        for step in 1..=len {
            let index = (self.turn_index + step) % len;
            let candidate = &self.turn_order[index];
            if self.player(candidate).is_some() {
                self.turn_index = index;
                self.current_turn = Some(candidate.clone());
                return self.current_turn.clone();
            }
        }
        None
    }

    pub fn has_no_more_players(&self) -> bool {
        self.players.len() < MIN_PLAYERS || self.human_count() == 0
    }
}

impl Engine {
    /// Open the transition countdown for the current holder.
    pub(crate) async fn announce_turn(&self, room: &mut Room) {
        let Some(holder) = room.current_turn.clone() else {
            return;
        };
        room.phase = RoomPhase::Transition;
        room.expire_after_action = false;
        debug!(room_id = %room.id, player_id = %holder, "turn transition");
        self.emit(
            &room.id,
            RoomEvent::TurnTransition {
                player_id: holder,
                turn_no: room.turn_no + 1,
            },
        );
        self.timers.stop(&room.id, TimerPhase::Turn).await;
        self.timers
            .start(TimerInfo::new(
                room.id.clone(),
                self.settings.transition_seconds,
                TimerKind::Transition,
            ))
            .await;
    }

    /// Hand the turn to the holder: fresh speed and action, full turn timer.
    pub(crate) async fn begin_turn(&self, room: &mut Room) {
        if room.phase != RoomPhase::Transition {
            return;
        }
        let Some(holder_id) = room.current_turn.clone() else {
            return;
        };
        let Some(holder) = room.player_mut(&holder_id) else {
            return;
        };
        holder.stats.speed = holder.stats.max_speed;
        holder.actions_left = ACTIONS_PER_TURN;
        let holder = holder.clone();

        room.phase = RoomPhase::Playing;
        room.turn_no += 1;
        info!(room_id = %room.id, player_id = %holder_id, turn_no = room.turn_no, "turn started");

        self.timers.stop(&room.id, TimerPhase::Turn).await;
        self.timers
            .start(TimerInfo::new(
                room.id.clone(),
                self.settings.turn_seconds,
                TimerKind::Turn,
            ))
            .await;
        self.emit(
            &room.id,
            RoomEvent::TurnUpdate {
                player: holder.clone(),
                turn_no: room.turn_no,
            },
        );

        if holder.is_virtual() {
            let delay = self.think_delay(room);
            self.schedule_ai_turn(room, delay);
        }
    }

    /// Close the holder's turn and announce the next one.
    pub(crate) async fn end_turn(&self, room: &mut Room) {
        if !room.is_active() {
            return;
        }
        self.timers.stop(&room.id, TimerPhase::Turn).await;
        room.expire_after_action = false;
        // Stale AI continuations check the ticket and stop.
        room.ai_ticket += 1;

        if let Some(player_id) = room.pending_swap.clone() {
            let newest = room
                .player(&player_id)
                .and_then(|player| player.inventory.last().copied());
            if let Some(item) = newest {
                self.discard(room, &player_id, item);
            }
            room.pending_swap = None;
        }

        if room.next_turn().is_some() {
            self.announce_turn(room).await;
        }
    }

    pub async fn start_turn(&self, room_id: &str) -> CommandOutcome {
        let Some(mut room) = self.registry.lock(room_id).await else {
            return CommandOutcome::rejected(Rejection::RoomNotFound);
        };
        if !room.is_active() {
            return CommandOutcome::rejected(Rejection::GameOver);
        }
        if room.phase != RoomPhase::Transition {
            return CommandOutcome::noop();
        }
        self.begin_turn(&mut room).await;
        CommandOutcome::applied()
    }

    pub async fn request_end_turn(&self, room_id: &str, player_id: &str) -> CommandOutcome {
        let Some(mut room) = self.registry.lock(room_id).await else {
            return CommandOutcome::rejected(Rejection::RoomNotFound);
        };
        if !room.is_active() {
            return CommandOutcome::rejected(Rejection::GameOver);
        }
        if room.player(player_id).is_none() {
            return CommandOutcome::rejected(Rejection::PlayerNotFound);
        }
        if room.phase != RoomPhase::Playing {
            return CommandOutcome::rejected(Rejection::TurnNotStarted);
        }
        if !room.is_turn_holder(player_id) {
            return CommandOutcome::rejected(Rejection::NotYourTurn);
        }
        if room.locked_by.is_some() {
            return CommandOutcome::rejected(Rejection::RoomBusy);
        }
        if room.combat.is_some() {
            return CommandOutcome::rejected(Rejection::CombatInProgress);
        }
        self.end_turn(&mut room).await;
        CommandOutcome::applied()
    }

    /// Remove a departing player and reconcile turn, combat and flag state.
    pub async fn handle_player_quit(&self, room_id: &str, player_id: &str) -> CommandOutcome {
        let Some(mut room) = self.registry.lock(room_id).await else {
            return CommandOutcome::rejected(Rejection::RoomNotFound);
        };
        if !room.is_active() {
            return CommandOutcome::rejected(Rejection::GameOver);
        }
        let Some(index) = room.player_index(player_id) else {
            return CommandOutcome::rejected(Rejection::PlayerNotFound);
        };

        let was_holder = room.is_turn_holder(player_id);
        if was_holder {
            self.cancel_ai(&mut room);
        }
        if room.locked_by.as_deref() == Some(player_id) {
            room.locked_by = None;
        }
        if room.pending_swap.as_deref() == Some(player_id) {
            room.pending_swap = None;
        }

        let last_position = room.players[index].position;
        let dropped_items = self.strip_inventory(&mut room, player_id);
        let departed = room.players.remove(index);
        room.departed.push(departed);
        info!(room_id = %room_id, player_id = %player_id, remaining = room.players.len(), "player left");
        self.emit(
            room_id,
            RoomEvent::PlayerDisconnected {
                player_id: player_id.to_string(),
                last_position,
                dropped_items,
                remaining: room.players.clone(),
            },
        );

        if room.has_no_more_players() {
            self.abandon(&mut room).await;
            return CommandOutcome::applied();
        }

        let interrupted = room
            .combat
            .as_ref()
            .filter(|combat| combat.involves(player_id))
            .and_then(|combat| combat.opponent_of(player_id));
        if let Some(winner_id) = interrupted {
            self.settle_abandoned_combat(&mut room, &winner_id, player_id).await;
        } else if was_holder {
            self.end_turn(&mut room).await;
        }
        CommandOutcome::applied()
    }

    /// The opponent of a departed combatant wins by forfeit.
    async fn settle_abandoned_combat(&self, room: &mut Room, winner_id: &str, loser_id: &str) {
        room.combat = None;
        self.timers.stop(&room.id, TimerPhase::Combat).await;

        let mut victories = 0;
        if let Some(winner) = room.player_mut(winner_id) {
            winner.victories += 1;
            winner.stats.life = winner.stats.max_life;
            victories = winner.victories;
        }
        let respawn = match room.departed.last_mut() {
            Some(loser) => {
                loser.defeats += 1;
                loser.position
            }
            None => return,
        };
        self.emit(
            &room.id,
            RoomEvent::CombatEnded {
                winner_id: winner_id.to_string(),
                loser_id: loser_id.to_string(),
                respawn,
                players: room.players.clone(),
            },
        );

        if room.mode == GameMode::Classic && victories >= VICTORIES_TO_WIN {
            self.conclude(
                room,
                Some(Winner::Player {
                    player_id: winner_id.to_string(),
                }),
            )
            .await;
            return;
        }

        if room.is_turn_holder(winner_id) {
            let human_holder = room.player(winner_id).is_some_and(|player| !player.is_virtual());
            if human_holder {
                // The holder keeps the rest of the turn.
                self.timers
                    .start(TimerInfo::new(
                        room.id.clone(),
                        self.settings.turn_seconds,
                        TimerKind::Turn,
                    ))
                    .await;
                return;
            }
            self.resume_after_combat(room, winner_id).await;
        } else {
            self.end_turn(room).await;
        }
    }
}
