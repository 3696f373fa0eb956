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

//! Authoritative session engine for turn-based tactical rooms.

pub mod api;
pub mod combat;
pub mod config;
pub mod engine;
pub mod game_mode;
pub mod items;
pub mod movement;
pub mod notify;
pub mod registry;
pub mod reporter;
pub mod timer;
pub mod turn;
pub mod virtual_player;

#[cfg(test)]
mod testing;

pub use engine::Engine;
