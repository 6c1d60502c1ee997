/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Activation pulses: one line high for a fixed time, on demand.
//!
//! A pulse borrows the hardware from the wakeup generator:
//!
//! ```text
//! trigger(line)
//!   │  take the single pulse slot            (Busy if taken)
//!   ▼
//! spawned task
//!   1. wakeup.stop()  ── waits for the generator's ack
//!   2. line ← 1       (WAKEUP ← 0 first if the keep-alive pulse was high)
//!   3. sleep(activation)
//!   4. line ← 0
//!   5. wakeup.restart(cooldown)
//!   └─ release the slot
//! ```
//!
//! `trigger` returns as soon as the slot is taken, so whoever feeds commands
//! is never held up by the one-second hold.  There is no way to cancel a
//! pulse once it has started.

pub mod error;

pub use error::ActivationError;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::config::Timing;
use crate::gpio::{Line, OutputLines};
use crate::wakeup::{WakeupHandle, WakeupPhase};

// ── Executor ──────────────────────────────────────────────────────────────────

/// Runs at most one activation pulse at a time.
///
/// Cheap to clone; clones share the same pulse slot.
#[derive(Clone)]
pub struct ActivationExecutor {
    lines: Arc<dyn OutputLines>,
    wakeup: WakeupHandle,
    activation: Duration,
    cooldown: Duration,
    /// One permit = one pulse in flight.  Closed on shutdown.
    slot: Arc<Semaphore>,
}

impl ActivationExecutor {
    pub fn new(lines: Arc<dyn OutputLines>, wakeup: WakeupHandle, timing: &Timing) -> Self {
        Self {
            lines,
            wakeup,
            activation: timing.activation,
            cooldown: timing.cooldown,
            slot: Arc::new(Semaphore::new(1)),
        }
    }

    /// Starts an activation pulse on `line`.
    ///
    /// Must be called from within a tokio runtime.  Returns once the pulse
    /// task is spawned; await [`ActivationHandle::wait`] to follow it to the
    /// end, or drop the handle to let it run detached.
    ///
    /// # Errors
    /// * [`ActivationError::Busy`] — a pulse is already running.
    /// * [`ActivationError::Closed`] — [`close`](Self::close) was called.
    ///
    /// Neither touches the hardware.
    pub fn trigger(&self, line: Line) -> Result<ActivationHandle, ActivationError> {
        let permit = match self.slot.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(TryAcquireError::NoPermits) => return Err(ActivationError::Busy),
            Err(TryAcquireError::Closed) => return Err(ActivationError::Closed),
        };

        debug!(line = %line, "Activation pulse accepted");
        let pulse = Pulse {
            lines: self.lines.clone(),
            wakeup: self.wakeup.clone(),
            line,
            activation: self.activation,
            cooldown: self.cooldown,
        };
        let task = tokio::spawn(pulse.run(permit));

        Ok(ActivationHandle { line, task })
    }

    /// `true` while a pulse holds the slot.
    pub fn is_busy(&self) -> bool {
        !self.slot.is_closed() && self.slot.available_permits() == 0
    }

    /// Waits for a running pulse to finish, then refuses every later
    /// trigger with [`ActivationError::Closed`].  Idempotent.
    pub async fn close(&self) {
        if let Ok(permit) = self.slot.acquire().await {
            self.slot.close();
            permit.forget();
            debug!("Activation executor closed");
        }
    }
}

// ── Running pulse ─────────────────────────────────────────────────────────────

/// A pulse that has been accepted.
#[derive(Debug)]
pub struct ActivationHandle {
    line: Line,
    task: JoinHandle<Result<(), ActivationError>>,
}

impl ActivationHandle {
    pub fn line(&self) -> Line {
        self.line
    }

    /// Waits until the line is low again and the wakeup generator has been
    /// told to resume.
    pub async fn wait(self) -> Result<(), ActivationError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => {
                error!(line = %self.line, "Activation pulse task failed: {}", e);
                Err(ActivationError::Aborted)
            }
        }
    }
}

struct Pulse {
    lines: Arc<dyn OutputLines>,
    wakeup: WakeupHandle,
    line: Line,
    activation: Duration,
    cooldown: Duration,
}

impl Pulse {
    async fn run(self, permit: OwnedSemaphorePermit) -> Result<(), ActivationError> {
        let result = self.drive().await;
        drop(permit);
        result
    }

    async fn drive(&self) -> Result<(), ActivationError> {
        let line = self.line;

        // 1. Generator stopped and acknowledged: from here on we own the lines.
        let stopped_in = self.wakeup.stop().await?;
        if stopped_in == WakeupPhase::High && line != Line::WAKEUP {
            // Keep-alive pulse cut short; it must not stay high under the
            // activation.
            if let Err(e) = self.lines.set_level(Line::WAKEUP, false) {
                warn!(line = %Line::WAKEUP, "Failed to end interrupted wakeup pulse: {}", e);
            }
        }

        // 2–4. The pulse.  The line is driven low even if raising it failed.
        info!(
            line = %line,
            duration_ms = self.activation.as_millis() as u64,
            "Activation pulse started"
        );
        let raised = self.lines.set_level(line, true);
        match &raised {
            Ok(()) => sleep(self.activation).await,
            Err(e) => error!(line = %line, "Failed to raise activation line: {}", e),
        }
        let lowered = self.lines.set_level(line, false);
        if let Err(e) = &lowered {
            error!(line = %line, "Failed to lower activation line: {}", e);
        }

        // 5. Hand the lines back.
        let resumed = self.wakeup.restart(self.cooldown).await;
        match &resumed {
            Ok(()) => info!(
                line = %line,
                cooldown_ms = self.cooldown.as_millis() as u64,
                "Activation pulse finished, keep-alive resumes after cooldown"
            ),
            Err(e) => error!("Keep-alive train not resumed: {}", e),
        }

        raised?;
        lowered?;
        resumed?;
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpio::{HardwareError, LevelChange, RecordingLines};
    use crate::wakeup::WakeupTiming;
    use tokio::time::Instant;

    const ACTIVATION: Duration = Duration::from_millis(1000);
    const COOLDOWN: Duration = Duration::from_millis(2000);
    const IDLE: Duration = Duration::from_millis(2500);
    const PULSE_ON: Duration = Duration::from_millis(60);

    struct Rig {
        lines: Arc<RecordingLines>,
        wakeup: WakeupHandle,
        executor: ActivationExecutor,
    }

    fn rig() -> Rig {
        let lines = Arc::new(RecordingLines::new());
        let timing = Timing::default();
        let (wakeup, _task) = WakeupHandle::spawn(
            lines.clone(),
            WakeupTiming {
                pulse_on: timing.pulse_on,
                idle_interval: timing.idle_interval,
            },
        );
        let executor = ActivationExecutor::new(lines.clone(), wakeup.clone(), &timing);
        Rig {
            lines,
            wakeup,
            executor,
        }
    }

    fn levels(edges: &[LevelChange]) -> Vec<bool> {
        edges.iter().map(|c| c.high).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn pulses_only_the_target_line() {
        for target in [Line::Open, Line::Autoclose] {
            let rig = rig();
            sleep(Duration::from_millis(100)).await;

            let start = Instant::now();
            rig.executor.trigger(target).unwrap().wait().await.unwrap();

            let edges = rig.lines.edges(target);
            assert_eq!(levels(&edges), vec![true, false]);
            assert_eq!(edges[0].at, start);
            assert_eq!(edges[1].at - edges[0].at, ACTIVATION);

            for other in Line::ALL.into_iter().filter(|l| *l != target) {
                assert!(rig.lines.edges(other).is_empty(), "{other} must not move");
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn close_pulse_is_one_clean_high_low() {
        let rig = rig();
        sleep(Duration::from_millis(100)).await;

        rig.executor.trigger(Line::Close).unwrap().wait().await.unwrap();

        let edges = rig.lines.edges(Line::Close);
        assert_eq!(levels(&edges), vec![true, false]);
        assert_eq!(edges[1].at - edges[0].at, ACTIVATION);
        assert!(rig.lines.edges(Line::Open).is_empty());
        assert!(rig.lines.edges(Line::Autoclose).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn second_trigger_while_running_is_busy() {
        let rig = rig();
        let first = rig.executor.trigger(Line::Close).unwrap();
        sleep(Duration::from_millis(10)).await;
        assert!(rig.executor.is_busy());

        let writes = rig.lines.history().len();
        let err = rig.executor.trigger(Line::Open).unwrap_err();
        assert!(matches!(err, ActivationError::Busy));
        assert!(err.is_rejection());
        assert_eq!(rig.lines.history().len(), writes, "Busy has no side effect");

        first.wait().await.unwrap();
        assert!(rig.lines.edges(Line::Open).is_empty());
        assert!(!rig.executor.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn slot_is_free_again_after_completion() {
        let rig = rig();
        rig.executor.trigger(Line::Open).unwrap().wait().await.unwrap();
        rig.executor.trigger(Line::Open).unwrap().wait().await.unwrap();

        assert_eq!(
            levels(&rig.lines.edges(Line::Open)),
            vec![true, false, true, false]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn keep_alive_is_silent_during_pulse_and_resumes_after_cooldown() {
        let rig = rig();
        sleep(Duration::from_millis(100)).await;

        let start = Instant::now();
        rig.executor.trigger(Line::Open).unwrap().wait().await.unwrap();
        let end = start + ACTIVATION;

        // Without the activation the first keep-alive pulse would be at 2500 ms.
        sleep(COOLDOWN + PULSE_ON * 2).await;

        let wakeup = rig.lines.history();
        let wakeup: Vec<_> = wakeup.iter().filter(|c| c.line == Line::WAKEUP).collect();
        assert!(
            wakeup.iter().all(|c| c.at < start || c.at >= end),
            "no WAKEUP write while OPEN is held: {wakeup:?}"
        );
        let rising: Vec<_> = wakeup.iter().filter(|c| c.high).collect();
        assert_eq!(rising.len(), 1);
        assert_eq!(rising[0].at, end + COOLDOWN);
    }

    #[tokio::test(start_paused = true)]
    async fn interrupted_keep_alive_pulse_is_ended_before_activation() {
        let rig = rig();
        // Inside the first keep-alive high phase (2500..2560 ms).
        sleep(IDLE + Duration::from_millis(10)).await;
        assert!(rig.lines.level(Line::WAKEUP));

        rig.executor.trigger(Line::Open).unwrap().wait().await.unwrap();

        let wakeup_edges = rig.lines.edges(Line::WAKEUP);
        let open_edges = rig.lines.edges(Line::Open);
        assert_eq!(levels(&wakeup_edges), vec![true, false]);
        assert!(wakeup_edges[1].at <= open_edges[0].at);
        let history = rig.lines.history();
        let fall = history
            .iter()
            .position(|c| c.line == Line::WAKEUP && !c.high && c.at > wakeup_edges[0].at)
            .unwrap();
        let rise = history
            .iter()
            .position(|c| c.line == Line::Open && c.high)
            .unwrap();
        assert!(fall < rise, "WAKEUP low before OPEN high");
    }

    #[tokio::test(start_paused = true)]
    async fn hardware_failure_still_resumes_keep_alive() {
        let rig = rig();
        rig.lines.set_faulted(Line::Autoclose, true);

        let start = Instant::now();
        let err = rig
            .executor
            .trigger(Line::Autoclose)
            .unwrap()
            .wait()
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ActivationError::Hardware(HardwareError::Unavailable(Line::Autoclose))
        ));
        assert!(!rig.executor.is_busy());

        sleep(COOLDOWN + Duration::from_millis(10)).await;
        let rise = rig
            .lines
            .edges(Line::WAKEUP)
            .into_iter()
            .find(|c| c.high)
            .unwrap();
        assert_eq!(rise.at - start, COOLDOWN, "no hold when raising failed");
    }

    #[tokio::test(start_paused = true)]
    async fn dead_generator_means_no_pulse() {
        let rig = rig();
        rig.wakeup.shutdown().await.unwrap();
        let writes = rig.lines.history().len();

        let err = rig
            .executor
            .trigger(Line::Open)
            .unwrap()
            .wait()
            .await
            .unwrap_err();
        assert!(matches!(err, ActivationError::Wakeup(_)));
        assert_eq!(rig.lines.history().len(), writes);
    }

    #[tokio::test(start_paused = true)]
    async fn close_waits_for_running_pulse_then_rejects() {
        let rig = rig();
        let start = Instant::now();
        let _pulse = rig.executor.trigger(Line::Open).unwrap();
        sleep(Duration::from_millis(10)).await;

        rig.executor.close().await;
        assert_eq!(Instant::now() - start, ACTIVATION);
        assert!(!rig.lines.level(Line::Open));

        let err = rig.executor.trigger(Line::Open).unwrap_err();
        assert!(matches!(err, ActivationError::Closed));
        assert!(!rig.executor.is_busy());

        // Second close is a no-op.
        rig.executor.close().await;
    }
}
