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

//! Fakes and fixtures shared by the unit tests.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use tactics_common::{
    Board, GameMode, GameSummary, PlayerKind, PlayerSetup, Profile, RoomCommand, RoomEvent,
    RoomId, RoomSetup, Stats,
};

use crate::{
    config::EngineSettings, engine::Engine, notify::EventSink, registry::Room,
    reporter::StatsReporter,
};

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<(RoomId, RoomEvent)>>,
}

impl RecordingSink {
    pub fn events_for(&self, room_id: &str) -> Vec<RoomEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(owner, _)| owner == room_id)
            .map(|(_, event)| event.clone())
            .collect()
    }

    /// Room events minus timer ticks, which interleave with everything.
    pub fn game_events(&self, room_id: &str) -> Vec<RoomEvent> {
        self.events_for(room_id)
            .into_iter()
            .filter(|event| {
                !matches!(
                    event,
                    RoomEvent::TimerUpdate { .. } | RoomEvent::TimerEnd { .. }
                )
            })
            .collect()
    }

    pub fn count(&self, room_id: &str, predicate: impl Fn(&RoomEvent) -> bool) -> usize {
        self.events_for(room_id)
            .iter()
            .filter(|event| predicate(event))
            .count()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl EventSink for RecordingSink {
    fn publish(&self, room_id: &str, event: RoomEvent) {
        self.events
            .lock()
            .unwrap()
            .push((room_id.to_string(), event));
    }
}

#[derive(Default)]
pub struct RecordingReporter {
    pub summaries: Mutex<Vec<GameSummary>>,
}

#[async_trait]
impl StatsReporter for RecordingReporter {
    async fn report(&self, summary: &GameSummary) -> anyhow::Result<()> {
        self.summaries.lock().unwrap().push(summary.clone());
        Ok(())
    }
}

pub fn human(id: &str, max_speed: u32) -> PlayerSetup {
    PlayerSetup {
        id: Some(id.to_string()),
        name: id.to_uppercase(),
        kind: PlayerKind::Human,
        team: None,
        stats: Some(Stats {
            speed: max_speed,
            max_speed,
            ..Stats::default()
        }),
    }
}

pub fn bot(id: &str, max_speed: u32, profile: Profile) -> PlayerSetup {
    PlayerSetup {
        kind: PlayerKind::Virtual { profile },
        ..human(id, max_speed)
    }
}

pub fn setup_with(rows: &[&str], players: Vec<PlayerSetup>, mode: GameMode) -> RoomSetup {
    RoomSetup {
        room_id: None,
        mode,
        board: Some(Board::from_rows(rows).unwrap()),
        players,
    }
}

/// Short pacing, long turn timers and a fixed seed.
pub fn test_settings() -> EngineSettings {
    EngineSettings {
        transition_seconds: 3,
        turn_seconds: 30,
        combat_seconds: 5,
        turn_tick_ms: 1000,
        combat_tick_ms: 1000,
        move_step_delay_ms: 10,
        ai_think_min_ms: 20,
        ai_think_max_ms: 20,
        post_combat_delay_ms: 50,
        rng_seed: Some(7),
        stats_report_url: None,
    }
}

pub struct Harness {
    pub engine: Engine,
    pub sink: Arc<RecordingSink>,
    pub reporter: Arc<RecordingReporter>,
}

pub fn harness() -> Harness {
    harness_with(test_settings())
}

pub fn harness_with(settings: EngineSettings) -> Harness {
    let sink = Arc::new(RecordingSink::default());
    let reporter = Arc::new(RecordingReporter::default());
    let engine = Engine::start(settings, sink.clone(), reporter.clone());
    Harness {
        engine,
        sink,
        reporter,
    }
}

impl Harness {
    /// Create the room under `room_id` and begin the first turn.
    pub async fn start_room(&self, room_id: &str, mut setup: RoomSetup) {
        setup.room_id = Some(room_id.to_string());
        self.engine.create_room(setup).await.unwrap();
        let outcome = self.engine.dispatch(room_id, RoomCommand::StartTurn).await;
        assert!(outcome.applied, "start turn failed: {outcome:?}");
    }

    pub async fn with_room<T>(&self, room_id: &str, f: impl FnOnce(&mut Room) -> T) -> T {
        let mut room = self.engine.registry.lock(room_id).await.unwrap();
        f(&mut room)
    }

    /// Summaries handed to the reporter. Reports run on their own task, so
    /// give them a moment to land first.
    pub async fn reported(&self) -> Vec<GameSummary> {
        tokio::time::sleep(Duration::from_millis(1)).await;
        self.reporter.summaries.lock().unwrap().clone()
    }

    pub async fn room_exists(&self, room_id: &str) -> bool {
        self.engine.registry.get(room_id).await.is_some()
    }
}
