/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Keep-alive pulse train on the WAKEUP line.
//!
//! The XNova goes to sleep after roughly three seconds without GPIO activity.
//! The generator keeps it awake with a square wave:
//!
//! ```text
//!          ┌──┐                 ┌──┐
//! WAKEUP ──┘  └─────────────────┘  └──────────
//!          │◄►│◄── idle_interval ──►│
//!       pulse_on
//! ```
//!
//! # Ownership model
//! The generator state (phase + at most one deadline) lives inside a single
//! tokio task and is never shared.  Other components talk to it through a
//! [`WakeupHandle`]:
//!
//! | Message | Effect |
//! |---|---|
//! | `Pause` | drop the pending deadline, reply with the phase it was in |
//! | `Resume(delay)` | enter the low phase, first deadline after `delay` |
//! | `Shutdown` | drop the deadline and end the task |
//!
//! Messages and deadlines are handled by the same `select!` loop, so once
//! [`WakeupHandle::stop`] has returned no phase transition can be running or
//! pending.  That is what lets the activation executor drive the lines right
//! after it.

use std::future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, trace};

use crate::config::Timing;
use crate::gpio::{Line, OutputLines};

/// Queue depth of the control channel.  One activation at a time sends at
/// most two messages, so this never fills in practice.
const CONTROL_QUEUE_DEPTH: usize = 8;

// ── Public types ──────────────────────────────────────────────────────────────

/// Which half of the square wave the generator is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeupPhase {
    /// Line low, waiting `idle_interval` before the next pulse.
    Low,
    /// Line high for `pulse_on`.
    High,
}

/// Square-wave shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WakeupTiming {
    pub pulse_on: Duration,
    pub idle_interval: Duration,
}

impl WakeupTiming {
    /// Time from one rising edge to the next.
    pub fn period(&self) -> Duration {
        self.pulse_on + self.idle_interval
    }
}

impl From<Timing> for WakeupTiming {
    fn from(timing: Timing) -> Self {
        Self {
            pulse_on: timing.pulse_on,
            idle_interval: timing.idle_interval,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WakeupError {
    /// The generator task has exited (shutdown or panic).
    #[error("wakeup generator is no longer running")]
    Terminated,
}

enum Control {
    Pause { ack: oneshot::Sender<WakeupPhase> },
    Resume { delay: Duration },
    Shutdown { ack: oneshot::Sender<()> },
}

// ── Handle ────────────────────────────────────────────────────────────────────

/// Cloneable control handle for the generator task.
#[derive(Debug, Clone)]
pub struct WakeupHandle {
    tx: mpsc::Sender<Control>,
}

impl WakeupHandle {
    /// Spawns the generator on the current tokio runtime.
    ///
    /// It starts in the low phase with the first pulse due one
    /// `idle_interval` from now.
    pub fn spawn(lines: Arc<dyn OutputLines>, timing: WakeupTiming) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(CONTROL_QUEUE_DEPTH);
        let mut generator = Generator {
            lines,
            line: Line::WAKEUP,
            timing,
            phase: WakeupPhase::Low,
            deadline: None,
        };
        generator.enter_low(Instant::now() + timing.idle_interval);

        debug!(
            line = %Line::WAKEUP,
            pulse_on_ms = timing.pulse_on.as_millis() as u64,
            idle_interval_ms = timing.idle_interval.as_millis() as u64,
            "Wakeup generator started"
        );

        let task = tokio::spawn(generator.run(rx));
        (Self { tx }, task)
    }

    /// Cancels the pending deadline and waits until the generator confirms.
    ///
    /// Returns the phase the generator was in.  The line is left at whatever
    /// level that phase drove it to.  Stopping an already stopped generator
    /// is a no-op that reports the same phase again.
    pub async fn stop(&self) -> Result<WakeupPhase, WakeupError> {
        let (ack, acked) = oneshot::channel();
        self.tx
            .send(Control::Pause { ack })
            .await
            .map_err(|_| WakeupError::Terminated)?;
        acked.await.map_err(|_| WakeupError::Terminated)
    }

    /// Re-enters the low phase with the first pulse `delay` from now.
    ///
    /// Works whether the generator is stopped or running; a running
    /// generator simply loses its current deadline.
    pub async fn restart(&self, delay: Duration) -> Result<(), WakeupError> {
        self.tx
            .send(Control::Resume { delay })
            .await
            .map_err(|_| WakeupError::Terminated)
    }

    /// Stops the generator for good and waits for it to acknowledge.
    pub async fn shutdown(&self) -> Result<(), WakeupError> {
        let (ack, acked) = oneshot::channel();
        self.tx
            .send(Control::Shutdown { ack })
            .await
            .map_err(|_| WakeupError::Terminated)?;
        acked.await.map_err(|_| WakeupError::Terminated)
    }
}

// ── Generator task ────────────────────────────────────────────────────────────

struct Generator {
    lines: Arc<dyn OutputLines>,
    line: Line,
    timing: WakeupTiming,
    phase: WakeupPhase,
    /// `None` while paused.
    deadline: Option<Instant>,
}

impl Generator {
    async fn run(mut self, mut rx: mpsc::Receiver<Control>) {
        loop {
            let deadline = self.deadline;
            let expiry = async move {
                match deadline {
                    Some(at) => sleep_until(at).await,
                    None => future::pending().await,
                }
            };

            tokio::select! {
                // Control messages win over a deadline that expires at the
                // same instant: a pause must never be followed by a write.
                biased;

                msg = rx.recv() => match msg {
                    Some(Control::Pause { ack }) => {
                        self.deadline = None;
                        trace!(phase = ?self.phase, "Wakeup generator paused");
                        let _ = ack.send(self.phase);
                    }
                    Some(Control::Resume { delay }) => {
                        trace!(delay_ms = delay.as_millis() as u64, "Wakeup generator resumed");
                        self.enter_low(Instant::now() + delay);
                    }
                    Some(Control::Shutdown { ack }) => {
                        self.deadline = None;
                        let _ = ack.send(());
                        break;
                    }
                    // Every handle dropped: nobody can resume us any more.
                    None => break,
                },

                _ = expiry => {
                    // `deadline` is always `Some` when this branch completes.
                    if let Some(fired) = deadline {
                        self.fire(fired);
                    }
                }
            }
        }

        debug!("Wakeup generator stopped");
    }

    /// Deadline expired: switch to the other half of the wave.  The next
    /// deadline is measured from the one that fired so the period does not
    /// drift with task wake-up latency.
    fn fire(&mut self, fired: Instant) {
        match self.phase {
            WakeupPhase::Low => self.enter_high(fired + self.timing.pulse_on),
            WakeupPhase::High => self.enter_low(fired + self.timing.idle_interval),
        }
    }

    fn enter_low(&mut self, next: Instant) {
        self.drive(false);
        self.phase = WakeupPhase::Low;
        self.deadline = Some(next);
    }

    fn enter_high(&mut self, next: Instant) {
        self.drive(true);
        self.phase = WakeupPhase::High;
        self.deadline = Some(next);
    }

    fn drive(&self, high: bool) {
        // A failed keep-alive write is not fatal; the next phase retries.
        match self.lines.set_level(self.line, high) {
            Ok(()) => trace!(line = %self.line, high, "Wakeup phase"),
            Err(e) => error!(line = %self.line, "Wakeup pulse write failed: {}", e),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
