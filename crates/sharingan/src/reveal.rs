/// Progressive reveal of a finished report.
///
/// A single 4 s sweep moves a scan line from 0 % to 125 % of the report's height. Past
/// 100 % the report counts as fully revealed and the scan line is hidden. The sweep is
/// tied to the identity of the data it animates: tracking a different `Arc` restarts it,
/// and a replaced or dropped sequencer aborts its frame task.
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use crate::model::{AuditResponse, AuditSessionState};

pub const REVEAL_DURATION: Duration = Duration::from_millis(4000);
pub const REVEAL_SPAN_PCT: f64 = 125.0;
pub const REVEALED_AT_PCT: f64 = 100.0;
/// Where the scan line is parked once the sweep is over.
pub const PARKED_PCT: f64 = 200.0;
pub const FRAME_INTERVAL: Duration = Duration::from_millis(16);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RevealFrame {
    pub position_pct: f64,
    pub finished: bool,
}

impl RevealFrame {
    pub const START: RevealFrame = RevealFrame {
        position_pct: 0.0,
        finished: false,
    };

    pub fn revealed(&self) -> bool {
        self.finished || self.position_pct > REVEALED_AT_PCT
    }

    /// Share of the report that is uncovered, in `[0, 1]`.
    pub fn visible_fraction(&self) -> f64 {
        if self.revealed() {
            return 1.0;
        }
        (self.position_pct / REVEALED_AT_PCT).clamp(0.0, 1.0)
    }
}

/// Scan-line position after `elapsed` of a sweep lasting `duration`.
pub fn position_at(elapsed: Duration, duration: Duration) -> f64 {
    if duration.is_zero() {
        return REVEAL_SPAN_PCT;
    }
    let progress = elapsed.as_secs_f64() / duration.as_secs_f64();
    progress.min(1.0) * REVEAL_SPAN_PCT
}

struct Running {
    data: Arc<AuditResponse>,
    task: JoinHandle<()>,
}

pub struct RevealSequencer {
    duration: Duration,
    frames: Arc<watch::Sender<RevealFrame>>,
    current: Option<Running>,
}

impl Default for RevealSequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl RevealSequencer {
    pub fn new() -> Self {
        Self::with_duration(REVEAL_DURATION)
    }

    pub fn with_duration(duration: Duration) -> Self {
        let (frames, _) = watch::channel(RevealFrame::START);
        Self {
            duration,
            frames: Arc::new(frames),
            current: None,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<RevealFrame> {
        self.frames.subscribe()
    }

    /// Animate `data`. Restarts from 0 when `data` is not the value already being
    /// animated; returns whether a new sweep started.
    pub fn track(&mut self, data: &Arc<AuditResponse>) -> bool {
        if let Some(running) = &self.current {
            if Arc::ptr_eq(&running.data, data) {
                return false;
            }
        }
        self.cancel();

        self.frames.send_replace(RevealFrame::START);
        let task = tokio::spawn(sweep(Arc::clone(&self.frames), self.duration));
        self.current = Some(Running {
            data: Arc::clone(data),
            task,
        });
        debug!(duration_ms = self.duration.as_millis(), "reveal started");
        true
    }

    /// Stop driving frames. The last frame stays as it was.
    pub fn cancel(&mut self) {
        if let Some(running) = self.current.take() {
            running.task.abort();
            debug!("reveal cancelled");
        }
    }

    /// Drive this sequencer from session state: every `complete` tracks its data, every
    /// other state cancels. Ends when the state sender goes away.
    pub fn follow(mut self, mut states: watch::Receiver<AuditSessionState>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let data = states.borrow_and_update().data().cloned();
                match data {
                    Some(data) => {
                        self.track(&data);
                    }
                    None => self.cancel(),
                }
                if states.changed().await.is_err() {
                    break;
                }
            }
        })
    }
}

impl Drop for RevealSequencer {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn sweep(frames: Arc<watch::Sender<RevealFrame>>, duration: Duration) {
    let start = Instant::now();
    let mut ticker = tokio::time::interval(FRAME_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        let elapsed = start.elapsed();
        if elapsed >= duration {
            frames.send_replace(RevealFrame {
                position_pct: PARKED_PCT,
                finished: true,
            });
            return;
        }
        frames.send_replace(RevealFrame {
            position_pct: position_at(elapsed, duration),
            finished: false,
        });
    }
}
