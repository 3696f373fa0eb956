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
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU32, AtomicU64, Ordering},
    },
    time::Duration,
};

use tactics_common::{RoomEvent, RoomId};
use tokio::{
    sync::{Mutex, mpsc},
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, interval_at},
};
use tracing::{debug, info};

use crate::notify::EventSink;

/// One countdown slot per room and phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerPhase {
    Turn,
    Combat,
}

/// What a countdown is measuring. Transition and turn countdowns share the
/// turn slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Transition,
    Turn,
    Combat,
}

impl TimerKind {
    pub fn phase(self) -> TimerPhase {
        match self {
            TimerKind::Transition | TimerKind::Turn => TimerPhase::Turn,
            TimerKind::Combat => TimerPhase::Combat,
        }
    }

    fn is_combat(self) -> bool {
        self == TimerKind::Combat
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerInfo {
    pub room_id: RoomId,
    pub start_value: u32,
    pub kind: TimerKind,
}

impl TimerInfo {
    pub fn new(room_id: impl Into<RoomId>, start_value: u32, kind: TimerKind) -> Self {
        Self {
            room_id: room_id.into(),
            start_value,
            kind,
        }
    }
}

/// Sent to the engine once a countdown has run out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerExpired {
    pub room_id: RoomId,
    pub kind: TimerKind,
}

struct TimerEntry {
    generation: u64,
    remaining: Arc<AtomicU32>,
    handle: JoinHandle<()>,
}

#[derive(Clone)]
pub struct TimerEngine {
    timers: Arc<Mutex<HashMap<(RoomId, TimerPhase), TimerEntry>>>,
    next_generation: Arc<AtomicU64>,
    events: Arc<dyn EventSink>,
    expired_tx: mpsc::UnboundedSender<TimerExpired>,
    turn_tick: Duration,
    combat_tick: Duration,
}

impl TimerEngine {
    pub fn new(
        events: Arc<dyn EventSink>,
        turn_tick: Duration,
        combat_tick: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<TimerExpired>) {
        let (expired_tx, expired_rx) = mpsc::unbounded_channel();
        let engine = Self {
            timers: Arc::new(Mutex::new(HashMap::new())),
            next_generation: Arc::new(AtomicU64::new(1)),
            events,
            expired_tx,
            turn_tick,
            combat_tick,
        };
        (engine, expired_rx)
    }

    fn tick_for(&self, kind: TimerKind) -> Duration {
        match kind.phase() {
            TimerPhase::Turn => self.turn_tick,
            TimerPhase::Combat => self.combat_tick,
        }
    }

    /// Start a countdown. Returns false without touching anything when the
    /// room already has one running for the same phase, including one in its
    /// trailing tick.
    pub async fn start(&self, info: TimerInfo) -> bool {
        let mut timers = self.timers.lock().await;
        let key = (info.room_id.clone(), info.kind.phase());
        if timers.contains_key(&key) {
            debug!(room_id = %info.room_id, kind = ?info.kind, "timer already running");
            return false;
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let remaining = Arc::new(AtomicU32::new(info.start_value));
        let tick = self.tick_for(info.kind);
        info!(
            room_id = %info.room_id,
            kind = ?info.kind,
            start_value = info.start_value,
            tick_ms = tick.as_millis() as u64,
            "timer scheduled"
        );

        let runner = self.clone();
        let counter = remaining.clone();
        let handle = tokio::spawn(async move {
            runner.run_countdown(info, generation, counter, tick).await;
        });
        timers.insert(
            key,
            TimerEntry {
                generation,
                remaining,
                handle,
            },
        );
        true
    }

    async fn run_countdown(
        &self,
        info: TimerInfo,
        generation: u64,
        remaining: Arc<AtomicU32>,
        tick: Duration,
    ) {
        let combat = info.kind.is_combat();
        self.events.publish(
            &info.room_id,
            RoomEvent::TimerUpdate {
                room_id: info.room_id.clone(),
                time_left: remaining.load(Ordering::Relaxed),
                combat,
            },
        );

        let mut ticker = interval_at(Instant::now() + tick, tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        while remaining.load(Ordering::Relaxed) > 0 {
            ticker.tick().await;
            let left = remaining.fetch_sub(1, Ordering::Relaxed).saturating_sub(1);
            self.events.publish(
                &info.room_id,
                RoomEvent::TimerUpdate {
                    room_id: info.room_id.clone(),
                    time_left: left,
                    combat,
                },
            );
        }

        // Still registered through the trailing tick, so a stop aborts it.
        tokio::time::sleep(tick).await;
        {
            let mut timers = self.timers.lock().await;
            let key = (info.room_id.clone(), info.kind.phase());
            match timers.get(&key) {
                Some(entry) if entry.generation == generation => {
                    timers.remove(&key);
                }
                _ => return,
            }
        }

        self.events.publish(
            &info.room_id,
            RoomEvent::TimerEnd {
                room_id: info.room_id.clone(),
                combat,
                full_turn: info.kind == TimerKind::Turn,
            },
        );
        debug!(room_id = %info.room_id, kind = ?info.kind, "timer expired");
        let _ = self.expired_tx.send(TimerExpired {
            room_id: info.room_id,
            kind: info.kind,
        });
    }

    pub async fn stop(&self, room_id: &str, phase: TimerPhase) -> bool {
        let mut timers = self.timers.lock().await;
        match timers.remove(&(room_id.to_string(), phase)) {
            Some(entry) => {
                entry.handle.abort();
                debug!(room_id = %room_id, phase = ?phase, "timer stopped");
                true
            }
            None => false,
        }
    }

    pub async fn reset(&self, info: TimerInfo) -> bool {
        self.stop(&info.room_id, info.kind.phase()).await;
        self.start(info).await
    }

    pub async fn stop_room(&self, room_id: &str) {
        let mut timers = self.timers.lock().await;
        timers.retain(|(owner, _), entry| {
            if owner == room_id {
                entry.handle.abort();
                false
            } else {
                true
            }
        });
    }

    /// Clear every active countdown, e.g. on process shutdown.
    pub async fn shutdown(&self) {
        let mut timers = self.timers.lock().await;
        for (_, entry) in timers.drain() {
            entry.handle.abort();
        }
        info!("all timers cleared");
    }

    pub async fn is_active(&self, room_id: &str, phase: TimerPhase) -> bool {
        self.timers
            .lock()
            .await
            .contains_key(&(room_id.to_string(), phase))
    }

    pub async fn remaining(&self, room_id: &str, phase: TimerPhase) -> Option<u32> {
        self.timers
            .lock()
            .await
            .get(&(room_id.to_string(), phase))
            .map(|entry| entry.remaining.load(Ordering::Relaxed))
    }

    pub async fn active_count(&self) -> usize {
        self.timers.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingSink;

    fn engine(sink: Arc<RecordingSink>) -> (TimerEngine, mpsc::UnboundedReceiver<TimerExpired>) {
        TimerEngine::new(sink, Duration::from_millis(1000), Duration::from_millis(500))
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_for_same_phase_is_a_noop() {
        let sink = Arc::new(RecordingSink::default());
        let (timers, _rx) = engine(sink.clone());

        assert!(timers.start(TimerInfo::new("r1", 5, TimerKind::Turn)).await);
        assert!(!timers.start(TimerInfo::new("r1", 9, TimerKind::Transition)).await);

        assert_eq!(timers.active_count().await, 1);
        assert_eq!(timers.remaining("r1", TimerPhase::Turn).await, Some(5));
    }

    #[tokio::test(start_paused = true)]
    async fn turn_and_combat_phases_run_independently() {
        let sink = Arc::new(RecordingSink::default());
        let (timers, _rx) = engine(sink);

        assert!(timers.start(TimerInfo::new("r1", 5, TimerKind::Turn)).await);
        assert!(timers.start(TimerInfo::new("r1", 3, TimerKind::Combat)).await);
        assert!(timers.start(TimerInfo::new("r2", 5, TimerKind::Turn)).await);
        assert_eq!(timers.active_count().await, 3);

        timers.stop_room("r1").await;
        assert_eq!(timers.active_count().await, 1);
        assert!(timers.is_active("r2", TimerPhase::Turn).await);
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_ticks_then_reports_expiry_after_one_extra_tick() {
        let sink = Arc::new(RecordingSink::default());
        let (timers, mut rx) = engine(sink.clone());

        timers.start(TimerInfo::new("r1", 2, TimerKind::Turn)).await;
        let expired = rx.recv().await.unwrap();
        assert_eq!(
            expired,
            TimerExpired {
                room_id: "r1".to_string(),
                kind: TimerKind::Turn,
            }
        );

        let events = sink.events_for("r1");
        assert_eq!(
            events,
            vec![
                RoomEvent::TimerUpdate {
                    room_id: "r1".into(),
                    time_left: 2,
                    combat: false,
                },
                RoomEvent::TimerUpdate {
                    room_id: "r1".into(),
                    time_left: 1,
                    combat: false,
                },
                RoomEvent::TimerUpdate {
                    room_id: "r1".into(),
                    time_left: 0,
                    combat: false,
                },
                RoomEvent::TimerEnd {
                    room_id: "r1".into(),
                    combat: false,
                    full_turn: true,
                },
            ]
        );
        assert!(!timers.is_active("r1", TimerPhase::Turn).await);
    }

    #[tokio::test(start_paused = true)]
    async fn combat_expiry_is_not_a_full_turn() {
        let sink = Arc::new(RecordingSink::default());
        let (timers, mut rx) = engine(sink.clone());

        timers.start(TimerInfo::new("r1", 1, TimerKind::Combat)).await;
        assert_eq!(rx.recv().await.unwrap().kind, TimerKind::Combat);
        assert_eq!(
            sink.events_for("r1").last(),
            Some(&RoomEvent::TimerEnd {
                room_id: "r1".into(),
                combat: true,
                full_turn: false,
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_timer_never_expires() {
        let sink = Arc::new(RecordingSink::default());
        let (timers, mut rx) = engine(sink.clone());

        timers.start(TimerInfo::new("r1", 2, TimerKind::Turn)).await;
        assert!(timers.stop("r1", TimerPhase::Turn).await);
        assert!(!timers.stop("r1", TimerPhase::Turn).await);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
        assert!(
            !sink
                .events_for("r1")
                .iter()
                .any(|event| matches!(event, RoomEvent::TimerEnd { .. }))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_during_the_trailing_tick_cancels_the_end() {
        let sink = Arc::new(RecordingSink::default());
        let (timers, mut rx) = engine(sink.clone());

        timers.start(TimerInfo::new("r1", 1, TimerKind::Turn)).await;
        // Counted down to zero at 1s; the end is due at 2s.
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert!(timers.is_active("r1", TimerPhase::Turn).await);
        assert_eq!(timers.remaining("r1", TimerPhase::Turn).await, Some(0));

        timers.stop_room("r1").await;
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(
            sink.count("r1", |event| matches!(event, RoomEvent::TimerEnd { .. })),
            0
        );
    }

    #[tokio::test(start_paused = true)]
    async fn reset_restarts_from_the_new_value() {
        let sink = Arc::new(RecordingSink::default());
        let (timers, _rx) = engine(sink);

        timers.start(TimerInfo::new("r1", 2, TimerKind::Turn)).await;
        assert!(timers.reset(TimerInfo::new("r1", 7, TimerKind::Turn)).await);
        assert_eq!(timers.remaining("r1", TimerPhase::Turn).await, Some(7));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_clears_everything() {
        let sink = Arc::new(RecordingSink::default());
        let (timers, _rx) = engine(sink);

        timers.start(TimerInfo::new("r1", 2, TimerKind::Turn)).await;
        timers.start(TimerInfo::new("r2", 2, TimerKind::Combat)).await;
        timers.shutdown().await;
        assert_eq!(timers.active_count().await, 0);
    }
}
