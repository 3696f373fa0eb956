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

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use rand::Rng;
use tactics_common::{
    CombatAction, CommandOutcome, GameSummary, Rejection, RoomCommand, RoomEvent, RoomSetup,
    RoomSnapshot, TimerAction, Winner,
};
use tracing::{debug, info, warn};

use crate::{
    config::EngineSettings,
    game_mode::summarize,
    notify::EventSink,
    registry::{Room, RoomPhase, RoomRegistry},
    reporter::StatsReporter,
    timer::{TimerEngine, TimerExpired, TimerInfo, TimerKind, TimerPhase},
};

/// Entry point for every room operation. Cheap to clone; all clones share
/// the same registry, timers and outbound seams.
#[derive(Clone)]
pub struct Engine {
    pub(crate) registry: Arc<RoomRegistry>,
    pub(crate) timers: TimerEngine,
    pub(crate) events: Arc<dyn EventSink>,
    pub(crate) reporter: Arc<dyn StatsReporter>,
    pub(crate) settings: Arc<EngineSettings>,
}

impl Engine {
    /// Build the engine and spawn the task that turns timer expiries into
    /// room transitions. Must be called inside a tokio runtime.
    pub fn start(
        settings: EngineSettings,
        events: Arc<dyn EventSink>,
        reporter: Arc<dyn StatsReporter>,
    ) -> Self {
        let (timers, mut expired_rx) =
            TimerEngine::new(events.clone(), settings.turn_tick(), settings.combat_tick());
        let engine = Self {
            registry: Arc::new(RoomRegistry::default()),
            timers,
            events,
            reporter,
            settings: Arc::new(settings),
        };

        let pump = engine.clone();
        tokio::spawn(async move {
            while let Some(expired) = expired_rx.recv().await {
                let engine = pump.clone();
                tokio::spawn(async move {
                    engine.on_timer_expired(expired).await;
                });
            }
        });
        engine
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    async fn on_timer_expired(&self, expired: TimerExpired) {
        let Some(mut room) = self.registry.lock(&expired.room_id).await else {
            return;
        };
        if !room.is_active() {
            return;
        }
        // A countdown started after this one fired owns the slot now.
        if self.timers.is_active(&room.id, expired.kind.phase()).await {
            debug!(room_id = %room.id, kind = ?expired.kind, "stale timer expiry ignored");
            return;
        }

        match expired.kind {
            TimerKind::Transition => {
                if room.phase == RoomPhase::Transition {
                    self.begin_turn(&mut room).await;
                }
            }
            TimerKind::Turn => {
                if room.phase != RoomPhase::Playing || room.combat.is_some() {
                    return;
                }
                if room.locked_by.is_some() {
                    room.expire_after_action = true;
                } else {
                    info!(room_id = %room.id, "turn timed out");
                    self.end_turn(&mut room).await;
                }
            }
            TimerKind::Combat => {
                if room.combat.is_some() {
                    info!(room_id = %room.id, "combat turn timed out");
                    self.strike(&mut room).await;
                }
            }
        }
    }

    /// Register a session from a validated setup and open its first turn.
    pub async fn create_room(&self, setup: RoomSetup) -> anyhow::Result<RoomSnapshot> {
        let mut room =
            Room::from_setup(setup, self.settings.rng_seed).map_err(anyhow::Error::msg)?;
        room.set_first_turn();
        let shared = self
            .registry
            .create(room)
            .await
            .map_err(anyhow::Error::msg)?;

        let mut room = shared.lock().await;
        info!(
            room_id = %room.id,
            mode = ?room.mode,
            players = room.players.len(),
            first = ?room.current_turn,
            "room created"
        );
        self.announce_turn(&mut room).await;
        Ok(room.snapshot())
    }

    pub async fn snapshot(&self, room_id: &str) -> Option<RoomSnapshot> {
        let room = self.registry.lock(room_id).await?;
        Some(room.snapshot())
    }

    pub async fn room_ids(&self) -> Vec<String> {
        self.registry.room_ids().await
    }

    /// Route one inbound command to its handler.
    pub async fn dispatch(&self, room_id: &str, command: RoomCommand) -> CommandOutcome {
        let outcome = match command {
            RoomCommand::StartTurn => self.start_turn(room_id).await,
            RoomCommand::Move {
                player_id,
                path,
                forced,
            } => self.move_player(room_id, &player_id, path, forced).await,
            RoomCommand::ToggleDoor {
                player_id,
                position,
            } => self.toggle_door(room_id, &player_id, position).await,
            RoomCommand::Combat {
                attacker_id,
                defender_id,
                action: CombatAction::Engage,
            } => self.engage(room_id, &attacker_id, &defender_id).await,
            RoomCommand::Combat {
                attacker_id,
                defender_id,
                action: CombatAction::Attack,
            } => self.attack(room_id, &attacker_id, &defender_id).await,
            RoomCommand::DropItem { player_id, item } => {
                self.drop_item(room_id, &player_id, item).await
            }
            RoomCommand::EndTurn { player_id } => self.request_end_turn(room_id, &player_id).await,
            RoomCommand::Quit { player_id } => self.handle_player_quit(room_id, &player_id).await,
            RoomCommand::ToggleDebug => self.toggle_debug(room_id).await,
            RoomCommand::Timer {
                action,
                start_value,
                combat,
            } => self.control_timer(room_id, action, start_value, combat).await,
        };
        if let Some(reason) = outcome.reason {
            debug!(room_id = %room_id, reason = ?reason, "command rejected");
        }
        outcome
    }

    pub async fn toggle_debug(&self, room_id: &str) -> CommandOutcome {
        let Some(mut room) = self.registry.lock(room_id).await else {
            return CommandOutcome::rejected(Rejection::RoomNotFound);
        };
        if !room.is_active() {
            return CommandOutcome::rejected(Rejection::GameOver);
        }
        room.debug = !room.debug;
        info!(room_id = %room_id, enabled = room.debug, "debug mode toggled");
        self.emit(room_id, RoomEvent::DebugToggled { enabled: room.debug });
        CommandOutcome::applied()
    }

    /// Direct timer control. Starting an occupied slot changes nothing.
    pub async fn control_timer(
        &self,
        room_id: &str,
        action: TimerAction,
        start_value: u32,
        combat: bool,
    ) -> CommandOutcome {
        let Some(room) = self.registry.lock(room_id).await else {
            return CommandOutcome::rejected(Rejection::RoomNotFound);
        };
        if !room.is_active() {
            return CommandOutcome::rejected(Rejection::GameOver);
        }
        let (kind, phase) = if combat {
            (TimerKind::Combat, TimerPhase::Combat)
        } else {
            (TimerKind::Turn, TimerPhase::Turn)
        };
        let info = TimerInfo::new(room.id.clone(), start_value, kind);
        let changed = match action {
            TimerAction::Start => self.timers.start(info).await,
            TimerAction::Stop => self.timers.stop(room_id, phase).await,
            TimerAction::Reset => self.timers.reset(info).await,
        };
        if changed {
            CommandOutcome::applied()
        } else {
            CommandOutcome::noop()
        }
    }

    /// Administrative teardown: the game ends without a winner.
    pub async fn close_room(&self, room_id: &str) -> Option<GameSummary> {
        let mut room = self.registry.lock(room_id).await?;
        if !room.is_active() {
            return None;
        }
        Some(self.conclude(&mut room, None).await)
    }

    /// End the game: stop its timers, publish the summary, forget the room
    /// and hand the statistics to the reporter in the background.
    pub(crate) async fn conclude(&self, room: &mut Room, winner: Option<Winner>) -> GameSummary {
        room.phase = RoomPhase::Ended;
        room.combat = None;
        room.locked_by = None;
        room.ai_ticket += 1;
        self.timers.stop_room(&room.id).await;

        let summary = summarize(room, winner, Utc::now());
        info!(
            room_id = %room.id,
            winner = ?summary.winner,
            total_turns = summary.total_turns,
            "game ended"
        );
        self.emit(
            &room.id,
            RoomEvent::GameEnded {
                summary: summary.clone(),
            },
        );
        self.registry.destroy(&room.id).await;

        // Reported off the room lock; the collaborator may be slow.
        let reporter = self.reporter.clone();
        let report = summary.clone();
        tokio::spawn(async move {
            if let Err(error) = reporter.report(&report).await {
                warn!(room_id = %report.room_id, error = %error, "failed to report game statistics");
            }
        });
        summary
    }

    /// Tear the room down after too many departures. Nothing is reported.
    pub(crate) async fn abandon(&self, room: &mut Room) {
        room.phase = RoomPhase::Ended;
        room.combat = None;
        room.locked_by = None;
        room.ai_ticket += 1;
        info!(room_id = %room.id, remaining = room.players.len(), "no more players");
        self.emit(&room.id, RoomEvent::NoMorePlayers);
        self.timers.stop_room(&room.id).await;
        self.registry.destroy(&room.id).await;
    }

    pub(crate) fn emit(&self, room_id: &str, event: RoomEvent) {
        self.events.publish(room_id, event);
    }

    /// Random pause before a virtual player's next command.
    pub(crate) fn think_delay(&self, room: &mut Room) -> Duration {
        let min = self.settings.ai_think_min_ms;
        let max = self.settings.ai_think_max_ms.max(min);
        Duration::from_millis(room.rng.random_range(min..=max))
    }

    /// Stop every countdown and retire every virtual player.
    pub async fn shutdown(&self) {
        for room_id in self.registry.room_ids().await {
            if let Some(mut room) = self.registry.lock(&room_id).await {
                if let Some(task) = room.ai_task.take() {
                    task.abort();
                }
                room.ai_ticket += 1;
            }
        }
        self.timers.shutdown().await;
        info!("engine stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tactics_common::{GameMode, Profile};

    use crate::testing::{bot, harness, human, setup_with};

    fn duo() -> RoomSetup {
        setup_with(&["S...S"], vec![human("P2", 4), human("P1", 6)], GameMode::Classic)
    }

    #[tokio::test(start_paused = true)]
    async fn fastest_player_gets_the_first_turn() {
        let h = harness();
        let mut setup = duo();
        setup.room_id = Some("R1".into());
        let snapshot = h.engine.create_room(setup).await.unwrap();

        assert_eq!(snapshot.current_turn.as_deref(), Some("P1"));
        assert_eq!(snapshot.turn_order, vec!["P1".to_string(), "P2".to_string()]);
        assert_eq!(
            h.sink.game_events("R1"),
            vec![RoomEvent::TurnTransition {
                player_id: "P1".into(),
                turn_no: 1,
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_setups_and_duplicate_rooms_are_refused() {
        let h = harness();
        let solo = setup_with(&["S...S"], vec![human("p1", 4)], GameMode::Classic);
        assert!(h.engine.create_room(solo).await.is_err());

        let mut bots_only = setup_with(
            &["S...S"],
            vec![
                bot("b1", 4, Profile::Aggressive),
                bot("b2", 4, Profile::Opportunistic),
            ],
            GameMode::Classic,
        );
        bots_only.room_id = Some("B1".into());
        assert!(h.engine.create_room(bots_only).await.is_err());
        assert!(!h.room_exists("B1").await);
        assert_eq!(h.engine.timers.active_count().await, 0);

        let mut first = duo();
        first.room_id = Some("R1".into());
        h.engine.create_room(first).await.unwrap();
        let mut again = duo();
        again.room_id = Some("R1".into());
        assert!(h.engine.create_room(again).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn generated_room_ids_are_used_when_absent() {
        let h = harness();
        let snapshot = h.engine.create_room(duo()).await.unwrap();
        assert!(!snapshot.room_id.is_empty());
        assert_eq!(h.engine.room_ids().await, vec![snapshot.room_id]);
    }

    #[tokio::test(start_paused = true)]
    async fn commands_for_unknown_rooms_are_rejected() {
        let h = harness();
        let start = h.engine.dispatch("missing", RoomCommand::StartTurn).await;
        assert_eq!(start.reason, Some(Rejection::RoomNotFound));
        let quit = h
            .engine
            .dispatch("missing", RoomCommand::Quit { player_id: "p1".into() })
            .await;
        assert_eq!(quit.reason, Some(Rejection::RoomNotFound));
        assert!(h.engine.snapshot("missing").await.is_none());
        assert!(h.engine.close_room("missing").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn transition_countdown_starts_the_turn_by_itself() {
        let h = harness();
        let mut setup = duo();
        setup.room_id = Some("R1".into());
        h.engine.create_room(setup).await.unwrap();

        tokio::time::sleep(Duration::from_millis(4_500)).await;
        let (phase, turn_no, speed) = h
            .with_room("R1", |room| {
                (room.phase, room.turn_no, room.player("P1").unwrap().stats.speed)
            })
            .await;
        assert_eq!(phase, RoomPhase::Playing);
        assert_eq!(turn_no, 1);
        assert_eq!(speed, 6);
        let updates = h.sink.count("R1", |event| {
            matches!(event, RoomEvent::TurnUpdate { player, turn_no: 1 } if player.id == "P1")
        });
        assert_eq!(updates, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn start_turn_is_a_noop_once_playing() {
        let h = harness();
        h.start_room("R1", duo()).await;
        let again = h.engine.dispatch("R1", RoomCommand::StartTurn).await;
        assert!(again.accepted && !again.applied);
        assert_eq!(h.with_room("R1", |room| room.turn_no).await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_commands_are_idempotent() {
        let h = harness();
        h.start_room("R1", duo()).await;
        let timer = |action| RoomCommand::Timer {
            action,
            start_value: 9,
            combat: true,
        };

        assert!(h.engine.dispatch("R1", timer(TimerAction::Start)).await.applied);
        let second = h.engine.dispatch("R1", timer(TimerAction::Start)).await;
        assert!(second.accepted && !second.applied);
        assert_eq!(h.engine.timers.remaining("R1", TimerPhase::Combat).await, Some(9));

        assert!(h.engine.dispatch("R1", timer(TimerAction::Stop)).await.applied);
        assert!(!h.engine.timers.is_active("R1", TimerPhase::Combat).await);
        // The turn countdown is untouched.
        assert!(h.engine.timers.is_active("R1", TimerPhase::Turn).await);
    }

    #[tokio::test(start_paused = true)]
    async fn debug_toggle_is_broadcast() {
        let h = harness();
        h.start_room("R1", duo()).await;
        assert!(h.engine.dispatch("R1", RoomCommand::ToggleDebug).await.applied);
        assert!(h.engine.dispatch("R1", RoomCommand::ToggleDebug).await.applied);
        let toggles: Vec<bool> = h
            .sink
            .game_events("R1")
            .into_iter()
            .filter_map(|event| match event {
                RoomEvent::DebugToggled { enabled } => Some(enabled),
                _ => None,
            })
            .collect();
        assert_eq!(toggles, vec![true, false]);
    }

    #[tokio::test(start_paused = true)]
    async fn closing_a_room_reports_and_forgets_it() {
        let h = harness();
        h.start_room("R1", duo()).await;

        let summary = h.engine.close_room("R1").await.unwrap();
        assert_eq!(summary.winner, None);
        assert_eq!(summary.total_turns, 1);
        assert_eq!(summary.players.len(), 2);
        assert!(!h.room_exists("R1").await);
        assert_eq!(h.engine.timers.active_count().await, 0);
        assert_eq!(h.reported().await.len(), 1);
        assert!(matches!(
            h.sink.game_events("R1").last(),
            Some(RoomEvent::GameEnded { .. })
        ));
    }

    struct StalledReporter;

    #[async_trait::async_trait]
    impl StatsReporter for StalledReporter {
        async fn report(&self, _summary: &GameSummary) -> anyhow::Result<()> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_reporter_does_not_hold_up_the_game_end() {
        let sink = Arc::new(crate::testing::RecordingSink::default());
        let engine = Engine::start(
            crate::testing::test_settings(),
            sink.clone(),
            Arc::new(StalledReporter),
        );
        let mut setup = duo();
        setup.room_id = Some("R1".into());
        engine.create_room(setup).await.unwrap();

        let summary = tokio::time::timeout(Duration::from_secs(1), engine.close_room("R1"))
            .await
            .expect("close_room waited on the reporter");
        assert!(summary.is_some());
        assert!(engine.registry.get("R1").await.is_none());
        assert_eq!(
            sink.count("R1", |event| matches!(event, RoomEvent::GameEnded { .. })),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn turn_expiry_waits_for_an_action_in_flight() {
        let h = harness();
        h.start_room("R1", duo()).await;
        h.with_room("R1", |room| room.locked_by = Some("P1".into())).await;

        tokio::time::sleep(Duration::from_millis(31_500)).await;
        let (holder, deferred) = h
            .with_room("R1", |room| (room.current_turn.clone(), room.expire_after_action))
            .await;
        assert_eq!(holder.as_deref(), Some("P1"));
        assert!(deferred);

        {
            let mut room = h.engine.registry.lock("R1").await.unwrap();
            h.engine.finish_action(&mut room, "P1").await;
        }
        let holder = h.with_room("R1", |room| room.current_turn.clone()).await;
        assert_eq!(holder.as_deref(), Some("P2"));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_clears_all_timers() {
        let h = harness();
        h.start_room("R1", duo()).await;
        h.engine.shutdown().await;
        assert_eq!(h.engine.timers.active_count().await, 0);
    }
}
