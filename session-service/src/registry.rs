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

use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use rand::{SeedableRng, rngs::StdRng};
use tactics_common::{
    Board, GameMode, ItemKind, MIN_PLAYERS, Player, PlayerId, Position, RoomId, RoomSetup,
    RoomSnapshot, Team, default_board, new_room_id,
};
use tokio::{
    sync::{Mutex, OwnedMutexGuard, RwLock},
    task::AbortHandle,
};

use crate::{combat::CombatState, game_mode::GameModeState};

pub type SharedRoom = Arc<Mutex<Room>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomPhase {
    /// Countdown before the next holder may act.
    Transition,
    Playing,
    Ended,
}

/// All mutable state of one session. Only ever touched through its mutex.
#[derive(Debug)]
pub struct Room {
    pub id: RoomId,
    pub mode: GameMode,
    pub board: Board,
    pub players: Vec<Player>,
    /// Fixed at session start; departed players keep their slot.
    pub turn_order: Vec<PlayerId>,
    pub turn_index: usize,
    pub current_turn: Option<PlayerId>,
    pub phase: RoomPhase,
    pub turn_no: u64,
    pub combat: Option<CombatState>,
    pub game_mode: GameModeState,
    pub departed: Vec<Player>,
    pub debug: bool,
    /// Player whose multi-step action is in flight.
    pub locked_by: Option<PlayerId>,
    /// Turn timer ran out while an action was in flight.
    pub expire_after_action: bool,
    pub pending_swap: Option<PlayerId>,
    pub rng: StdRng,
    pub started_at: DateTime<Utc>,
    pub ai_ticket: u64,
    pub ai_task: Option<AbortHandle>,
}

impl Room {
    pub fn new(id: RoomId, mode: GameMode, board: Board, players: Vec<Player>, rng: StdRng) -> Self {
        let game_mode = GameModeState::new(players.iter().map(|player| player.spawn));
        Self {
            id,
            mode,
            board,
            players,
            turn_order: Vec::new(),
            turn_index: 0,
            current_turn: None,
            phase: RoomPhase::Transition,
            turn_no: 0,
            combat: None,
            game_mode,
            departed: Vec::new(),
            debug: false,
            locked_by: None,
            expire_after_action: false,
            pending_swap: None,
            rng,
            started_at: Utc::now(),
            ai_ticket: 0,
            ai_task: None,
        }
    }

    /// Build a room from a validated session setup. Players take the board's
    /// starting points in roster order; unused starting points are cleared.
    pub fn from_setup(setup: RoomSetup, seed: Option<u64>) -> Result<Self, String> {
        if setup.players.len() < MIN_PLAYERS {
            return Err(format!(
                "a session needs at least {MIN_PLAYERS} players, got {}",
                setup.players.len()
            ));
        }

        let mut board = setup.board.unwrap_or_else(default_board);
        let starts = board.starting_points();
        if setup.players.len() > starts.len() {
            return Err(format!(
                "board has {} starting points for {} players",
                starts.len(),
                setup.players.len()
            ));
        }

        let mut players: Vec<Player> = setup
            .players
            .into_iter()
            .zip(starts.iter().copied())
            .map(|(player_setup, spawn)| Player::from_setup(player_setup, spawn))
            .collect();

        let mut seen = std::collections::HashSet::new();
        if let Some(duplicate) = players.iter().find(|player| !seen.insert(player.id.clone())) {
            return Err(format!("duplicate player id {}", duplicate.id));
        }

        if players.iter().all(Player::is_virtual) {
            return Err("a session needs at least one human player".to_string());
        }

        for unused in starts.iter().skip(players.len()) {
            board.take_item(*unused);
        }

        if setup.mode == GameMode::CaptureTheFlag {
            for (index, player) in players.iter_mut().enumerate() {
                if player.team.is_none() {
                    player.team = Some(if index % 2 == 0 { Team::Red } else { Team::Blue });
                }
            }
        }

        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let id = setup.room_id.unwrap_or_else(new_room_id);
        Ok(Self::new(id, setup.mode, board, players, rng))
    }

    pub fn player(&self, player_id: &str) -> Option<&Player> {
        self.players.iter().find(|player| player.id == player_id)
    }

    pub fn player_mut(&mut self, player_id: &str) -> Option<&mut Player> {
        self.players.iter_mut().find(|player| player.id == player_id)
    }

    pub fn player_index(&self, player_id: &str) -> Option<usize> {
        self.players.iter().position(|player| player.id == player_id)
    }

    pub fn occupant(&self, pos: Position) -> Option<&Player> {
        self.players.iter().find(|player| player.position == pos)
    }

    pub fn is_occupied_by_other(&self, pos: Position, player_id: &str) -> bool {
        self.players
            .iter()
            .any(|player| player.position == pos && player.id != player_id)
    }

    pub fn is_turn_holder(&self, player_id: &str) -> bool {
        self.current_turn.as_deref() == Some(player_id)
    }

    pub fn turn_holder(&self) -> Option<&Player> {
        self.current_turn.as_deref().and_then(|id| self.player(id))
    }

    pub fn human_count(&self) -> usize {
        self.players.iter().filter(|player| !player.is_virtual()).count()
    }

    pub fn is_active(&self) -> bool {
        self.phase != RoomPhase::Ended
    }

    /// Positions a mover may not enter: every other player.
    pub fn blocked_for(&self, player_id: &str) -> std::collections::HashSet<Position> {
        self.players
            .iter()
            .filter(|player| player.id != player_id)
            .map(|player| player.position)
            .collect()
    }

    /// A cell an item can be left on: traversable, empty item slot.
    pub fn can_hold_item(&self, pos: Position) -> bool {
        self.board
            .cell(pos)
            .is_some_and(|cell| cell.item.is_none() && cell.tile.cost().is_some())
    }

    pub fn flag_on_board(&self) -> Option<Position> {
        self.board.find_item(ItemKind::Flag)
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            room_id: self.id.clone(),
            mode: self.mode,
            board: self.board.clone(),
            players: self.players.clone(),
            turn_order: self.turn_order.clone(),
            current_turn: self.current_turn.clone(),
            turn_no: self.turn_no,
            combat: self.combat.as_ref().map(CombatState::view),
            flag_holder: self.game_mode.flag_holder.clone(),
            departed: self.departed.iter().map(|player| player.id.clone()).collect(),
            debug: self.debug,
            started_at: self.started_at,
        }
    }
}

/// Owns every live room. Callers get a room handle and lock it themselves;
/// the map lock is never held while a room lock is awaited.
#[derive(Default)]
pub struct RoomRegistry {
    rooms: RwLock<HashMap<RoomId, SharedRoom>>,
}

impl RoomRegistry {
    pub async fn create(&self, room: Room) -> Result<SharedRoom, String> {
        let mut rooms = self.rooms.write().await;
        if rooms.contains_key(&room.id) {
            return Err(format!("room {} already exists", room.id));
        }
        let id = room.id.clone();
        let shared = Arc::new(Mutex::new(room));
        rooms.insert(id, shared.clone());
        Ok(shared)
    }

    pub async fn get(&self, room_id: &str) -> Option<SharedRoom> {
        self.rooms.read().await.get(room_id).cloned()
    }

    pub async fn lock(&self, room_id: &str) -> Option<OwnedMutexGuard<Room>> {
        let shared = self.get(room_id).await?;
        Some(shared.lock_owned().await)
    }

    pub async fn destroy(&self, room_id: &str) -> Option<SharedRoom> {
        self.rooms.write().await.remove(room_id)
    }

    pub async fn room_ids(&self) -> Vec<RoomId> {
        self.rooms.read().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rooms.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tactics_common::Profile;

    use crate::testing::{bot, human, setup_with};

    #[test]
    fn from_setup_places_players_on_starting_points_in_order() {
        let setup = setup_with(
            &["S..", "...", "..S"],
            vec![human("p1", 4), human("p2", 4)],
            GameMode::Classic,
        );
        let room = Room::from_setup(setup, Some(1)).unwrap();
        assert_eq!(room.players[0].position, Position::new(0, 0));
        assert_eq!(room.players[1].position, Position::new(2, 2));
        assert_eq!(room.phase, RoomPhase::Transition);
        assert!(room.players.iter().all(|player| player.inventory.is_empty()));
    }

    #[test]
    fn from_setup_clears_unused_starting_points() {
        let setup = setup_with(
            &["S.S", "...", "S.S"],
            vec![human("p1", 4), human("p2", 4)],
            GameMode::Classic,
        );
        let room = Room::from_setup(setup, Some(1)).unwrap();
        assert_eq!(room.board.starting_points().len(), 2);
    }

    #[test]
    fn from_setup_rejects_short_rosters_and_missing_starts() {
        let solo = setup_with(&["S.S"], vec![human("p1", 4)], GameMode::Classic);
        assert!(Room::from_setup(solo, Some(1)).is_err());

        let crowded = setup_with(
            &["S.."],
            vec![human("p1", 4), human("p2", 4)],
            GameMode::Classic,
        );
        assert!(Room::from_setup(crowded, Some(1)).is_err());

        let duplicate = setup_with(
            &["S.S"],
            vec![human("p1", 4), human("p1", 4)],
            GameMode::Classic,
        );
        assert!(Room::from_setup(duplicate, Some(1)).is_err());

        let bots_only = setup_with(
            &["S.S"],
            vec![
                bot("b1", 4, Profile::Aggressive),
                bot("b2", 4, Profile::Opportunistic),
            ],
            GameMode::Classic,
        );
        assert!(Room::from_setup(bots_only, Some(1)).is_err());
    }

    #[test]
    fn capture_the_flag_alternates_teams() {
        let setup = setup_with(
            &["S.S", "...", "S.S"],
            vec![human("p1", 4), human("p2", 4), human("p3", 4)],
            GameMode::CaptureTheFlag,
        );
        let room = Room::from_setup(setup, Some(1)).unwrap();
        let teams: Vec<Option<Team>> = room.players.iter().map(|player| player.team).collect();
        assert_eq!(teams, vec![Some(Team::Red), Some(Team::Blue), Some(Team::Red)]);
    }

    #[tokio::test]
    async fn registry_create_get_destroy() {
        let registry = RoomRegistry::default();
        let setup = setup_with(
            &["S.S"],
            vec![human("p1", 4), human("p2", 4)],
            GameMode::Classic,
        );
        let mut room = Room::from_setup(setup, Some(1)).unwrap();
        room.id = "R1".to_string();

        registry.create(room).await.unwrap();
        assert!(registry.get("R1").await.is_some());
        assert_eq!(registry.len().await, 1);

        let mut again = Room::from_setup(
            setup_with(&["S.S"], vec![human("a", 4), human("b", 4)], GameMode::Classic),
            Some(2),
        )
        .unwrap();
        again.id = "R1".to_string();
        assert!(registry.create(again).await.is_err());

        assert!(registry.destroy("R1").await.is_some());
        assert!(registry.get("R1").await.is_none());
        assert!(registry.lock("R1").await.is_none());
        assert!(registry.is_empty().await);
    }
}
