use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::sleep;
use uuid::Uuid;

use crate::engine::EngineEvent;
use crate::store::scope::ScopedResource;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TimerEvent {
    TimerTick(TimerTick),
    TimeExpired(TimeExpired),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerTick {
    pub session_id: Uuid,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeExpired {
    pub session_id: Uuid,
    pub timestamp: DateTime<Utc>,
}

impl TimerEvent {
    pub fn session_id(&self) -> Uuid {
        match self {
            TimerEvent::TimerTick(tick) => tick.session_id,
            TimerEvent::TimeExpired(expired) => expired.session_id,
        }
    }
}

/// Cloneable cancel token for a countdown task. Cancelling twice is a no-op;
/// `cancel` reports whether this call was the one that cancelled.
#[derive(Debug, Clone, Default)]
pub struct TimerHandle {
    cancelled: Arc<AtomicBool>,
}

impl TimerHandle {
    pub fn cancel(&self) -> bool {
        !self.cancelled.swap(true, Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl ScopedResource for TimerHandle {
    fn dispose(&mut self) {
        if self.cancel() {
            tracing::debug!("countdown timer cancelled by scope disposal");
        }
    }
}

/// Spawns the 1 Hz countdown for an exam session. Ticks carry the owning
/// session id so the consumer discards stale ones; the task stops on cancel
/// or after `total_seconds` ticks, whichever comes first.
pub fn spawn_countdown(
    session_id: Uuid,
    total_seconds: u32,
    tick_interval: Duration,
    events: UnboundedSender<EngineEvent>,
) -> TimerHandle {
    let handle = TimerHandle::default();
    let flag = handle.clone();

    tokio::spawn(async move {
        for _ in 0..total_seconds {
            sleep(tick_interval).await;
            if flag.is_cancelled() {
                return;
            }
            let tick = TimerEvent::TimerTick(TimerTick {
                session_id,
                timestamp: Utc::now(),
            });
            if events.send(EngineEvent::Timer(tick)).is_err() {
                return;
            }
        }
        if !flag.is_cancelled() {
            let expired = TimerEvent::TimeExpired(TimeExpired {
                session_id,
                timestamp: Utc::now(),
            });
            let _ = events.send(EngineEvent::Timer(expired));
        }
    });

    handle
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_is_idempotent() {
        let handle = TimerHandle::default();
        assert!(!handle.is_cancelled());
        assert!(handle.cancel());
        assert!(!handle.cancel());
        assert!(handle.is_cancelled());
    }

    #[test]
    fn clones_share_the_flag() {
        let handle = TimerHandle::default();
        let other = handle.clone();
        handle.cancel();
        assert!(other.is_cancelled());
    }
}
