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

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_PLAYER_LIFE: i32 = 10;
pub const DEFAULT_PLAYER_SPEED: u32 = 4;
pub const DEFAULT_PLAYER_ATTACK: i32 = 4;
pub const DEFAULT_PLAYER_DEFENSE: i32 = 4;
pub const MIN_PLAYERS: usize = 2;
pub const MAX_INVENTORY: usize = 2;
pub const VICTORIES_TO_WIN: u32 = 3;
pub const ACTIONS_PER_TURN: u32 = 1;

pub type RoomId = String;
pub type PlayerId = String;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Orthogonal neighbours in a fixed order: up, left, down, right.
    pub fn neighbors(self) -> [Position; 4] {
        [
            Position::new(self.x, self.y - 1),
            Position::new(self.x - 1, self.y),
            Position::new(self.x, self.y + 1),
            Position::new(self.x + 1, self.y),
        ]
    }

    pub fn is_adjacent(self, other: Position) -> bool {
        (self.x - other.x).abs() + (self.y - other.y).abs() == 1
    }

    pub fn manhattan(self, other: Position) -> u32 {
        (self.x - other.x).unsigned_abs() + (self.y - other.y).unsigned_abs()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Facing {
    Left,
    #[default]
    Right,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TileKind {
    Floor,
    Water,
    Ice,
    Wall,
    DoorClosed,
    DoorOpen,
}

impl TileKind {
    /// Movement points needed to enter a tile of this kind. `None` means the
    /// tile can never be entered.
    pub const fn cost(self) -> Option<u32> {
        match self {
            TileKind::Floor | TileKind::DoorOpen => Some(1),
            TileKind::Water => Some(2),
            TileKind::Ice => Some(0),
            TileKind::Wall | TileKind::DoorClosed => None,
        }
    }

    pub const fn is_door(self) -> bool {
        matches!(self, TileKind::DoorClosed | TileKind::DoorOpen)
    }
}

/// Fixed item catalog. Effects live in the session engine's item resolver.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Potion,
    Shield,
    Poison,
    Dagger,
    Dice,
    Revive,
    Flag,
    StartingPoint,
}

impl ItemKind {
    /// Lookup table used by virtual players to rank items against their
    /// profile.
    pub const fn is_offensive(self) -> bool {
        match self {
            ItemKind::Potion | ItemKind::Poison | ItemKind::Dagger | ItemKind::Dice => true,
            ItemKind::Shield | ItemKind::Revive | ItemKind::Flag | ItemKind::StartingPoint => false,
        }
    }

    pub const fn is_pickable(self) -> bool {
        !matches!(self, ItemKind::StartingPoint)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Cell {
    pub tile: TileKind,
    #[serde(default)]
    pub item: Option<ItemKind>,
}

impl Cell {
    pub const fn floor() -> Self {
        Self {
            tile: TileKind::Floor,
            item: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Board {
    pub rows: usize,
    pub cols: usize,
    pub cells: Vec<Vec<Cell>>,
}

impl Board {
    pub fn filled(rows: usize, cols: usize, tile: TileKind) -> Self {
        Self {
            rows,
            cols,
            cells: vec![vec![Cell { tile, item: None }; cols]; rows],
        }
    }

    /// Build a board from one string per row.
    ///
    /// `.` floor, `~` water, `_` ice, `#` wall, `D` closed door, `O` open
    /// door. Item glyphs sit on floor: `S` starting point, `F` flag,
    /// `p` potion, `s` shield, `x` poison, `k` dagger, `d` dice, `r` revive.
    pub fn from_rows(rows: &[&str]) -> Result<Self, String> {
        let cols = rows.first().map(|row| row.chars().count()).unwrap_or(0);
        let mut cells = Vec::with_capacity(rows.len());
        for (y, row) in rows.iter().enumerate() {
            let parsed: Vec<Cell> = row
                .chars()
                .enumerate()
                .map(|(x, glyph)| {
                    parse_glyph(glyph).ok_or_else(|| format!("unknown glyph {glyph:?} at ({x}, {y})"))
                })
                .collect::<Result<_, _>>()?;
            if parsed.len() != cols {
                return Err(format!("row {y} has {} cells, expected {cols}", parsed.len()));
            }
            cells.push(parsed);
        }
        Ok(Self {
            rows: rows.len(),
            cols,
            cells,
        })
    }

    pub fn in_bounds(&self, pos: Position) -> bool {
        pos.x >= 0 && pos.y >= 0 && (pos.y as usize) < self.rows && (pos.x as usize) < self.cols
    }

    pub fn cell(&self, pos: Position) -> Option<&Cell> {
        if !self.in_bounds(pos) {
            return None;
        }
        self.cells
            .get(pos.y as usize)
            .and_then(|row| row.get(pos.x as usize))
    }

    pub fn cell_mut(&mut self, pos: Position) -> Option<&mut Cell> {
        if !self.in_bounds(pos) {
            return None;
        }
        self.cells
            .get_mut(pos.y as usize)
            .and_then(|row| row.get_mut(pos.x as usize))
    }

    pub fn tile(&self, pos: Position) -> Option<TileKind> {
        self.cell(pos).map(|cell| cell.tile)
    }

    pub fn tile_cost(&self, pos: Position) -> Option<u32> {
        self.tile(pos).and_then(TileKind::cost)
    }

    pub fn is_traversable(&self, pos: Position) -> bool {
        self.tile_cost(pos).is_some()
    }

    pub fn item_at(&self, pos: Position) -> Option<ItemKind> {
        self.cell(pos).and_then(|cell| cell.item)
    }

    /// Place an item on an empty, non-wall cell. Returns false if the slot is
    /// taken or the cell cannot hold items.
    pub fn place_item(&mut self, pos: Position, item: ItemKind) -> bool {
        match self.cell_mut(pos) {
            Some(cell) if cell.item.is_none() && cell.tile != TileKind::Wall => {
                cell.item = Some(item);
                true
            }
            _ => false,
        }
    }

    pub fn take_item(&mut self, pos: Position) -> Option<ItemKind> {
        self.cell_mut(pos).and_then(|cell| cell.item.take())
    }

    pub fn positions(&self) -> impl Iterator<Item = Position> + '_ {
        (0..self.rows).flat_map(move |y| (0..self.cols).map(move |x| Position::new(x as i32, y as i32)))
    }

    pub fn starting_points(&self) -> Vec<Position> {
        self.positions()
            .filter(|pos| self.item_at(*pos) == Some(ItemKind::StartingPoint))
            .collect()
    }

    pub fn find_item(&self, item: ItemKind) -> Option<Position> {
        self.positions().find(|pos| self.item_at(*pos) == Some(item))
    }

    pub fn traversable_count(&self) -> usize {
        self.positions().filter(|pos| self.is_traversable(*pos)).count()
    }

    pub fn doors(&self) -> Vec<Position> {
        self.positions()
            .filter(|pos| self.tile(*pos).is_some_and(TileKind::is_door))
            .collect()
    }
}

fn parse_glyph(glyph: char) -> Option<Cell> {
    let tile = match glyph {
        '~' => TileKind::Water,
        '_' => TileKind::Ice,
        '#' => TileKind::Wall,
        'D' => TileKind::DoorClosed,
        'O' => TileKind::DoorOpen,
        _ => TileKind::Floor,
    };
    let item = match glyph {
        '.' | '~' | '_' | '#' | 'D' | 'O' => None,
        'S' => Some(ItemKind::StartingPoint),
        'F' => Some(ItemKind::Flag),
        'p' => Some(ItemKind::Potion),
        's' => Some(ItemKind::Shield),
        'x' => Some(ItemKind::Poison),
        'k' => Some(ItemKind::Dagger),
        'd' => Some(ItemKind::Dice),
        'r' => Some(ItemKind::Revive),
        _ => return None,
    };
    Some(Cell { tile, item })
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Stats {
    pub life: i32,
    pub max_life: i32,
    /// Movement points left in the current turn.
    pub speed: u32,
    pub max_speed: u32,
    pub attack: i32,
    pub defense: i32,
    pub attack_die: u32,
    pub defense_die: u32,
}

impl Default for Stats {
    fn default() -> Self {
        Self {
            life: DEFAULT_PLAYER_LIFE,
            max_life: DEFAULT_PLAYER_LIFE,
            speed: DEFAULT_PLAYER_SPEED,
            max_speed: DEFAULT_PLAYER_SPEED,
            attack: DEFAULT_PLAYER_ATTACK,
            defense: DEFAULT_PLAYER_DEFENSE,
            attack_die: 6,
            defense_die: 4,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    #[default]
    Aggressive,
    Opportunistic,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlayerKind {
    #[default]
    Human,
    Virtual {
        profile: Profile,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Team {
    Red,
    Blue,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameMode {
    #[default]
    Classic,
    CaptureTheFlag,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerGameStats {
    pub items_collected: u32,
    pub visited: BTreeSet<Position>,
    pub combats: u32,
    pub damage_dealt: i32,
    pub life_lost: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub kind: PlayerKind,
    pub team: Option<Team>,
    pub position: Position,
    pub spawn: Position,
    pub stats: Stats,
    pub inventory: Vec<ItemKind>,
    pub victories: u32,
    pub defeats: u32,
    pub game_stats: PlayerGameStats,
    pub facing: Facing,
    pub actions_left: u32,
    pub revive_used: bool,
}

impl Player {
    pub fn new(id: PlayerId, name: impl Into<String>, kind: PlayerKind, spawn: Position) -> Self {
        let mut game_stats = PlayerGameStats::default();
        game_stats.visited.insert(spawn);
        Self {
            id,
            name: name.into(),
            kind,
            team: None,
            position: spawn,
            spawn,
            stats: Stats::default(),
            inventory: Vec::new(),
            victories: 0,
            defeats: 0,
            game_stats,
            facing: Facing::default(),
            actions_left: ACTIONS_PER_TURN,
            revive_used: false,
        }
    }

    pub fn from_setup(setup: PlayerSetup, spawn: Position) -> Self {
        let id = setup.id.unwrap_or_else(new_player_id);
        let mut player = Self::new(id, setup.name, setup.kind, spawn);
        player.team = setup.team;
        if let Some(stats) = setup.stats {
            player.stats = stats;
        }
        player
    }

    pub fn is_virtual(&self) -> bool {
        matches!(self.kind, PlayerKind::Virtual { .. })
    }

    pub fn profile(&self) -> Option<Profile> {
        match self.kind {
            PlayerKind::Virtual { profile } => Some(profile),
            PlayerKind::Human => None,
        }
    }

    pub fn holds(&self, item: ItemKind) -> bool {
        self.inventory.contains(&item)
    }

    pub fn is_ally_of(&self, other: &Player) -> bool {
        self.id == other.id || (self.team.is_some() && self.team == other.team)
    }
}

pub fn new_player_id() -> PlayerId {
    Uuid::new_v4().to_string()
}

pub fn new_room_id() -> RoomId {
    Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerSetup {
    #[serde(default)]
    pub id: Option<PlayerId>,
    pub name: String,
    #[serde(default)]
    pub kind: PlayerKind,
    #[serde(default)]
    pub team: Option<Team>,
    #[serde(default)]
    pub stats: Option<Stats>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSetup {
    #[serde(default)]
    pub room_id: Option<RoomId>,
    #[serde(default)]
    pub mode: GameMode,
    /// Falls back to [`default_board`] when absent.
    #[serde(default)]
    pub board: Option<Board>,
    pub players: Vec<PlayerSetup>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CombatAction {
    Engage,
    Attack,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TimerAction {
    Start,
    Stop,
    Reset,
}

/// Every inbound action a room accepts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoomCommand {
    StartTurn,
    Move {
        player_id: PlayerId,
        path: Vec<Position>,
        #[serde(default)]
        forced: bool,
    },
    ToggleDoor {
        player_id: PlayerId,
        position: Position,
    },
    Combat {
        attacker_id: PlayerId,
        defender_id: PlayerId,
        action: CombatAction,
    },
    DropItem {
        player_id: PlayerId,
        item: ItemKind,
    },
    EndTurn {
        player_id: PlayerId,
    },
    Quit {
        player_id: PlayerId,
    },
    ToggleDebug,
    Timer {
        action: TimerAction,
        start_value: u32,
        #[serde(default)]
        combat: bool,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Rejection {
    RoomNotFound,
    PlayerNotFound,
    GameOver,
    TurnNotStarted,
    NotYourTurn,
    RoomBusy,
    CombatInProgress,
    NotInCombat,
    NotCombatTurn,
    SwapPending,
    NoPendingSwap,
    ItemNotHeld,
    PathNotContiguous,
    PathBlocked,
    PathTooCostly,
    MoverDisconnected,
    DebugDisabled,
    NoActionLeft,
    NotAdjacent,
    InvalidTarget,
    NotADoor,
    DoorBlocked,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandOutcome {
    pub accepted: bool,
    pub applied: bool,
    pub reason: Option<Rejection>,
}

impl CommandOutcome {
    pub const fn applied() -> Self {
        Self {
            accepted: true,
            applied: true,
            reason: None,
        }
    }

    /// Accepted but nothing changed, e.g. an empty path.
    pub const fn noop() -> Self {
        Self {
            accepted: true,
            applied: false,
            reason: None,
        }
    }

    pub const fn rejected(reason: Rejection) -> Self {
        Self {
            accepted: false,
            applied: false,
            reason: Some(reason),
        }
    }
}

/// Working combat stats for one side of a fight, item modifiers included.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Combatant {
    pub player_id: PlayerId,
    pub life: i32,
    pub max_life: i32,
    pub attack: i32,
    pub defense: i32,
    pub attack_die: u32,
    pub defense_die: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CombatView {
    pub attacker: Combatant,
    pub defender: Combatant,
    pub turn_owner: PlayerId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttackReport {
    pub attacker_id: PlayerId,
    pub defender_id: PlayerId,
    pub attack_roll: i32,
    pub defense_roll: i32,
    pub damage: i32,
    pub poison_damage: i32,
    pub executed: bool,
    pub revived: bool,
    pub defender_life: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Winner {
    Player { player_id: PlayerId },
    Team { team: Team },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerSummary {
    pub player_id: PlayerId,
    pub name: String,
    pub kind: PlayerKind,
    pub team: Option<Team>,
    pub victories: u32,
    pub defeats: u32,
    pub combats: u32,
    pub items_collected: u32,
    pub damage_dealt: i32,
    pub life_lost: i32,
    pub tile_coverage_percent: f64,
    pub departed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameSummary {
    pub room_id: RoomId,
    pub mode: GameMode,
    pub winner: Option<Winner>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_seconds: i64,
    pub total_turns: u64,
    pub door_usage_percent: f64,
    pub tile_coverage_percent: f64,
    pub flag_holders: Vec<PlayerId>,
    pub players: Vec<PlayerSummary>,
}

/// Outbound notifications, in the order a room produced them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RoomEvent {
    TurnTransition {
        player_id: PlayerId,
        turn_no: u64,
    },
    TurnUpdate {
        player: Player,
        turn_no: u64,
    },
    PlayerNextPosition {
        player_id: PlayerId,
        position: Position,
        facing: Facing,
        speed_left: u32,
    },
    ItemPickedUp {
        player_id: PlayerId,
        item: ItemKind,
        position: Position,
    },
    ItemDropped {
        player_id: PlayerId,
        item: ItemKind,
        position: Position,
    },
    InventoryFull {
        player_id: PlayerId,
        inventory: Vec<ItemKind>,
    },
    DoorToggled {
        player_id: PlayerId,
        position: Position,
        tile: TileKind,
    },
    CombatStarted {
        combat: CombatView,
    },
    CombatUpdate {
        message: String,
        report: AttackReport,
        combat: CombatView,
    },
    CombatEnded {
        winner_id: PlayerId,
        loser_id: PlayerId,
        respawn: Position,
        players: Vec<Player>,
    },
    FlagTaken {
        player: Player,
    },
    FlagDropped {
        player_id: PlayerId,
        position: Option<Position>,
    },
    FlagCaptured {
        team: Option<Team>,
        player_id: PlayerId,
    },
    NoMorePlayers,
    PlayerDisconnected {
        player_id: PlayerId,
        last_position: Position,
        dropped_items: Vec<(ItemKind, Position)>,
        remaining: Vec<Player>,
    },
    DebugToggled {
        enabled: bool,
    },
    TimerUpdate {
        room_id: RoomId,
        time_left: u32,
        combat: bool,
    },
    TimerEnd {
        room_id: RoomId,
        combat: bool,
        full_turn: bool,
    },
    GameEnded {
        summary: GameSummary,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoomSnapshot {
    pub room_id: RoomId,
    pub mode: GameMode,
    pub board: Board,
    pub players: Vec<Player>,
    pub turn_order: Vec<PlayerId>,
    pub current_turn: Option<PlayerId>,
    pub turn_no: u64,
    pub combat: Option<CombatView>,
    pub flag_holder: Option<PlayerId>,
    pub departed: Vec<PlayerId>,
    pub debug: bool,
    pub started_at: DateTime<Utc>,
}

/// 11x11 board with four corner starting points and the flag in the middle.
pub fn default_board() -> Board {
    const ROWS: [&str; 11] = [
        "S.._~~~_..S",
        ".#.......#.",
        "..p.#D#.s..",
        "._..#.#..~.",
        "~...O.O...~",
        "~.k...F..d~",
        "~...O.O...~",
        ".~..#.#.._.",
        "..r.#D#.x..",
        ".#.......#.",
        "S.._~~~_..S",
    ];
    // The layout above is fixed and always parses.
    Board::from_rows(&ROWS).unwrap_or_else(|_| Board::filled(11, 11, TileKind::Floor))
}

/// Replace `${VAR_NAME}` patterns in a string with values from environment variables.
/// Unknown or unset variables are replaced with an empty string.
pub fn expand_env_vars(input: &str) -> String {
    let Ok(re) = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}") else {
        return input.to_string();
    };
    re.replace_all(input, |caps: &regex::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_default()
    })
    .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_costs_follow_catalog() {
        assert_eq!(TileKind::Floor.cost(), Some(1));
        assert_eq!(TileKind::Water.cost(), Some(2));
        assert_eq!(TileKind::Ice.cost(), Some(0));
        assert_eq!(TileKind::DoorOpen.cost(), Some(1));
        assert_eq!(TileKind::Wall.cost(), None);
        assert_eq!(TileKind::DoorClosed.cost(), None);
    }

    #[test]
    fn from_rows_parses_tiles_and_items() {
        let board = Board::from_rows(&["S.~", "#Dp", "_OF"]).unwrap();
        assert_eq!((board.rows, board.cols), (3, 3));
        assert_eq!(board.item_at(Position::new(0, 0)), Some(ItemKind::StartingPoint));
        assert_eq!(board.tile(Position::new(2, 0)), Some(TileKind::Water));
        assert_eq!(board.tile(Position::new(0, 1)), Some(TileKind::Wall));
        assert_eq!(board.tile(Position::new(1, 1)), Some(TileKind::DoorClosed));
        assert_eq!(board.item_at(Position::new(2, 1)), Some(ItemKind::Potion));
        assert_eq!(board.tile(Position::new(0, 2)), Some(TileKind::Ice));
        assert_eq!(board.item_at(Position::new(2, 2)), Some(ItemKind::Flag));
    }

    #[test]
    fn from_rows_rejects_ragged_rows_and_unknown_glyphs() {
        assert!(Board::from_rows(&["...", ".."]).is_err());
        assert!(Board::from_rows(&["..?"]).is_err());
    }

    #[test]
    fn walls_and_closed_doors_are_never_traversable() {
        let board = Board::from_rows(&["#DO"]).unwrap();
        assert!(!board.is_traversable(Position::new(0, 0)));
        assert!(!board.is_traversable(Position::new(1, 0)));
        assert!(board.is_traversable(Position::new(2, 0)));
        assert!(!board.is_traversable(Position::new(3, 0)));
        assert!(!board.is_traversable(Position::new(-1, 0)));
    }

    #[test]
    fn place_item_refuses_walls_and_occupied_slots() {
        let mut board = Board::from_rows(&["#.p"]).unwrap();
        assert!(!board.place_item(Position::new(0, 0), ItemKind::Dice));
        assert!(!board.place_item(Position::new(2, 0), ItemKind::Dice));
        assert!(board.place_item(Position::new(1, 0), ItemKind::Dice));
        assert_eq!(board.take_item(Position::new(1, 0)), Some(ItemKind::Dice));
        assert_eq!(board.item_at(Position::new(1, 0)), None);
    }

    #[test]
    fn default_board_has_four_starting_points_and_a_flag() {
        let board = default_board();
        assert_eq!((board.rows, board.cols), (11, 11));
        let starts = board.starting_points();
        assert_eq!(starts.len(), 4);
        assert!(starts.contains(&Position::new(0, 0)));
        assert!(starts.contains(&Position::new(10, 10)));
        assert_eq!(board.find_item(ItemKind::Flag), Some(Position::new(6, 5)));
        assert_eq!(board.doors().len(), 6);
    }

    #[test]
    fn offensive_lookup_splits_the_catalog() {
        let offensive: Vec<ItemKind> = [
            ItemKind::Potion,
            ItemKind::Shield,
            ItemKind::Poison,
            ItemKind::Dagger,
            ItemKind::Dice,
            ItemKind::Revive,
        ]
        .into_iter()
        .filter(|item| item.is_offensive())
        .collect();
        assert_eq!(
            offensive,
            vec![ItemKind::Potion, ItemKind::Poison, ItemKind::Dagger, ItemKind::Dice]
        );
        assert!(!ItemKind::StartingPoint.is_pickable());
        assert!(ItemKind::Flag.is_pickable());
    }

    #[test]
    fn new_player_starts_with_empty_inventory_and_visited_spawn() {
        let player = Player::new("p1".into(), "Ana", PlayerKind::Human, Position::new(2, 3));
        assert!(player.inventory.is_empty());
        assert_eq!(player.position, player.spawn);
        assert!(player.game_stats.visited.contains(&Position::new(2, 3)));
        assert_eq!(player.actions_left, ACTIONS_PER_TURN);
    }

    #[test]
    fn allies_share_a_team() {
        let mut a = Player::new("a".into(), "A", PlayerKind::Human, Position::new(0, 0));
        let mut b = Player::new("b".into(), "B", PlayerKind::Human, Position::new(1, 0));
        assert!(!a.is_ally_of(&b));
        a.team = Some(Team::Red);
        b.team = Some(Team::Red);
        assert!(a.is_ally_of(&b));
    }

    #[test]
    fn room_command_uses_tagged_json() {
        let command: RoomCommand = serde_json::from_str(
            r#"{"type":"move","player_id":"p1","path":[{"x":1,"y":0}]}"#,
        )
        .unwrap();
        assert_eq!(
            command,
            RoomCommand::Move {
                player_id: "p1".into(),
                path: vec![Position::new(1, 0)],
                forced: false,
            }
        );
        let rejection = serde_json::to_string(&Rejection::PathTooCostly).unwrap();
        assert_eq!(rejection, "\"PATH_TOO_COSTLY\"");
    }

    #[test]
    fn expand_env_vars_replaces_unset_with_empty() {
        let expanded = expand_env_vars("url=${TACTICS_COMMON_SURELY_UNSET_VAR}/stats");
        assert_eq!(expanded, "url=/stats");
    }
}
