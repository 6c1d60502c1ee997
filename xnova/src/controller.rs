/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! The running controller: one object owning the lines and both schedulers.
//!
//! ```text
//! Controller
//! ├── lines     Arc<dyn OutputLines>   shared by both schedulers
//! ├── wakeup    generator task + handle
//! └── executor  single-slot activation pulses
//! ```

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::activation::ActivationExecutor;
use crate::command::CommandDispatcher;
use crate::config::Timing;
use crate::gpio::OutputLines;
use crate::wakeup::WakeupHandle;

pub struct Controller {
    lines: Arc<dyn OutputLines>,
    wakeup: WakeupHandle,
    wakeup_task: JoinHandle<()>,
    executor: ActivationExecutor,
}

impl Controller {
    /// Starts the keep-alive train on already acquired lines.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(lines: Arc<dyn OutputLines>, timing: Timing) -> Self {
        let (wakeup, wakeup_task) = WakeupHandle::spawn(lines.clone(), timing.into());
        let executor = ActivationExecutor::new(lines.clone(), wakeup.clone(), &timing);

        info!(
            pulse_on_ms = timing.pulse_on.as_millis() as u64,
            idle_interval_ms = timing.idle_interval.as_millis() as u64,
            activation_ms = timing.activation.as_millis() as u64,
            cooldown_ms = timing.cooldown.as_millis() as u64,
            "XNova controller started"
        );

        Self {
            lines,
            wakeup,
            wakeup_task,
            executor,
        }
    }

    pub fn executor(&self) -> &ActivationExecutor {
        &self.executor
    }

    /// A dispatcher feeding this controller's executor.
    pub fn dispatcher(&self) -> CommandDispatcher {
        CommandDispatcher::new(self.executor.clone())
    }

    /// Best-effort teardown; never fails.
    ///
    /// Waits for a running activation pulse to complete, stops the keep-alive
    /// train, then forces every line low and releases it.
    pub async fn shutdown(self) {
        info!("XNova controller shutting down");

        self.executor.close().await;

        if let Err(e) = self.wakeup.shutdown().await {
            warn!("Wakeup generator already gone: {}", e);
        }
        if let Err(e) = self.wakeup_task.await {
            error!("Wakeup generator task failed: {}", e);
        }

        self.lines.release_all();
        info!("XNova controller stopped");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::time::{sleep, Instant};

    use crate::activation::ActivationError;
    use crate::gpio::{Line, RecordingLines};

    fn start() -> (Arc<RecordingLines>, Controller) {
        let lines = Arc::new(RecordingLines::new());
        let controller = Controller::start(lines.clone(), Timing::default());
        (lines, controller)
    }

    #[tokio::test(start_paused = true)]
    async fn open_command_end_to_end() {
        let (lines, controller) = start();
        let dispatcher = controller.dispatcher();
        sleep(Duration::from_millis(500)).await;

        let sent = Instant::now();
        assert_eq!(dispatcher.write(b"open").unwrap(), 4);
        sleep(Duration::from_millis(4000)).await;

        let open = lines.edges(Line::Open);
        assert_eq!(open.len(), 2);
        assert_eq!(open[0].at, sent);
        assert_eq!(open[1].at - sent, Duration::from_millis(1000));

        // Keep-alive resumes from its low phase 2000 ms after the pulse ends.
        let wakeup = lines.edges(Line::WAKEUP);
        assert!(wakeup[0].high);
        assert_eq!(wakeup[0].at - open[1].at, Duration::from_millis(2000));
        assert_eq!(wakeup[1].at - wakeup[0].at, Duration::from_millis(60));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_waits_for_pulse_and_releases_lines() {
        let (lines, controller) = start();
        let executor = controller.executor().clone();
        executor.trigger(Line::Autoclose).unwrap();
        sleep(Duration::from_millis(10)).await;
        assert!(lines.level(Line::Autoclose));

        let begun = Instant::now();
        controller.shutdown().await;
        assert!(Instant::now() - begun >= Duration::from_millis(990));

        assert!(lines.is_released());
        assert!(Line::ALL.iter().all(|l| !lines.level(*l)));
        assert!(matches!(
            executor.trigger(Line::Open).unwrap_err(),
            ActivationError::Closed
        ));

        let writes = lines.history().len();
        sleep(Duration::from_millis(10_000)).await;
        assert_eq!(lines.history().len(), writes, "keep-alive train stopped");
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_while_idle_forces_high_wakeup_low() {
        let (lines, controller) = start();
        // Inside the first keep-alive pulse.
        sleep(Duration::from_millis(2510)).await;
        assert!(lines.level(Line::WAKEUP));

        controller.shutdown().await;
        assert!(!lines.level(Line::WAKEUP));
        assert!(lines.is_released());
    }
}
