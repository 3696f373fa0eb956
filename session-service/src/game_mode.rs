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

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tactics_common::{
    Board, GameMode, GameSummary, ItemKind, Player, PlayerId, PlayerSummary, Position, Team,
    Winner,
};

use crate::registry::Room;

/// Flag ownership plus the traversal counters reported at game end.
#[derive(Debug, Clone, Default)]
pub struct GameModeState {
    pub flag_holder: Option<PlayerId>,
    pub flag_history: Vec<PlayerId>,
    pub visited: HashSet<Position>,
    pub doors_used: HashSet<Position>,
    pub door_toggles: u32,
}

impl GameModeState {
    pub fn new(spawns: impl IntoIterator<Item = Position>) -> Self {
        Self {
            visited: spawns.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn flag_taken(&mut self, player: &Player) -> Player {
        self.flag_holder = Some(player.id.clone());
        self.flag_history.push(player.id.clone());
        player.clone()
    }

    pub fn flag_dropped(&mut self) -> Option<PlayerId> {
        self.flag_holder.take()
    }

    pub fn holds_flag(&self, player_id: &str) -> bool {
        self.flag_holder.as_deref() == Some(player_id)
    }

    /// Winning team when the flag holder stands on their own starting point.
    pub fn check_flag_captured(&self, mode: GameMode, player: &Player) -> Option<Team> {
        if mode != GameMode::CaptureTheFlag
            || !self.holds_flag(&player.id)
            || !player.holds(ItemKind::Flag)
            || player.position != player.spawn
        {
            return None;
        }
        player.team
    }

    pub fn record_visit(&mut self, pos: Position) {
        self.visited.insert(pos);
    }

    pub fn record_door_toggle(&mut self, pos: Position) {
        self.doors_used.insert(pos);
        self.door_toggles += 1;
    }

    pub fn tile_coverage_percent(&self, board: &Board) -> f64 {
        percent(self.visited.len(), board.traversable_count())
    }

    pub fn door_usage_percent(&self, board: &Board) -> f64 {
        percent(self.doors_used.len(), board.doors().len())
    }
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    part as f64 * 100.0 / whole as f64
}

fn player_summary(player: &Player, board: &Board, departed: bool) -> PlayerSummary {
    let stats = &player.game_stats;
    PlayerSummary {
        player_id: player.id.clone(),
        name: player.name.clone(),
        kind: player.kind,
        team: player.team,
        victories: player.victories,
        defeats: player.defeats,
        combats: stats.combats,
        items_collected: stats.items_collected,
        damage_dealt: stats.damage_dealt,
        life_lost: stats.life_lost,
        tile_coverage_percent: percent(stats.visited.len(), board.traversable_count()),
        departed,
    }
}

pub fn summarize(room: &Room, winner: Option<Winner>, ended_at: DateTime<Utc>) -> GameSummary {
    let players = room
        .players
        .iter()
        .map(|player| player_summary(player, &room.board, false))
        .chain(
            room.departed
                .iter()
                .map(|player| player_summary(player, &room.board, true)),
        )
        .collect();

    GameSummary {
        room_id: room.id.clone(),
        mode: room.mode,
        winner,
        started_at: room.started_at,
        ended_at,
        duration_seconds: (ended_at - room.started_at).num_seconds().max(0),
        total_turns: room.turn_no,
        door_usage_percent: room.game_mode.door_usage_percent(&room.board),
        tile_coverage_percent: room.game_mode.tile_coverage_percent(&room.board),
        flag_holders: room.game_mode.flag_history.clone(),
        players,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tactics_common::PlayerKind;

    fn carrier(team: Team) -> Player {
        let mut player = Player::new("p1".into(), "P1", PlayerKind::Human, Position::new(0, 0));
        player.team = Some(team);
        player.inventory.push(ItemKind::Flag);
        player
    }

    #[test]
    fn flag_taken_and_dropped_track_holder_history() {
        let mut state = GameModeState::default();
        let player = carrier(Team::Red);
        let broadcast = state.flag_taken(&player);
        assert_eq!(broadcast.id, "p1");
        assert!(state.holds_flag("p1"));
        assert_eq!(state.flag_dropped().as_deref(), Some("p1"));
        assert_eq!(state.flag_holder, None);
        assert_eq!(state.flag_history, vec!["p1".to_string()]);
    }

    #[test]
    fn capture_requires_holder_on_home_tile_in_ctf() {
        let mut state = GameModeState::default();
        let mut player = carrier(Team::Blue);
        state.flag_taken(&player);

        assert_eq!(state.check_flag_captured(GameMode::Classic, &player), None);
        assert_eq!(
            state.check_flag_captured(GameMode::CaptureTheFlag, &player),
            Some(Team::Blue)
        );

        player.position = Position::new(1, 0);
        assert_eq!(state.check_flag_captured(GameMode::CaptureTheFlag, &player), None);

        player.position = player.spawn;
        state.flag_dropped();
        assert_eq!(state.check_flag_captured(GameMode::CaptureTheFlag, &player), None);
    }

    #[test]
    fn coverage_counters_are_percentages_of_the_board() {
        let board = Board::from_rows(&["..D.", "#O.."]).unwrap();
        let mut state = GameModeState::new([Position::new(0, 0)]);
        state.record_visit(Position::new(1, 0));
        state.record_visit(Position::new(1, 0));
        state.record_door_toggle(Position::new(2, 0));
        state.record_door_toggle(Position::new(2, 0));

        // Six traversable cells: the closed door and the wall do not count.
        assert!((state.tile_coverage_percent(&board) - 2.0 * 100.0 / 6.0).abs() < 1e-9);
        assert!((state.door_usage_percent(&board) - 50.0).abs() < 1e-9);
        assert_eq!(state.door_toggles, 2);
    }
}
