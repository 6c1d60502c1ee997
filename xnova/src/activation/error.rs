/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Error type for activation pulses.
//!
//! Unknown line names never reach the executor: its entry point takes a
//! [`Line`](crate::gpio::Line), and text is converted (and rejected with
//! [`InvalidTarget`](crate::gpio::InvalidTarget)) by the command parser.
//!
//! | Variant | Hardware touched? | Caller action |
//! |---|---|---|
//! | `Busy` | no | retry after the running pulse ends |
//! | `Closed` | no | none, the controller is shutting down |
//! | `Wakeup` | only if it failed on resume | none, the controller is broken |
//! | `Hardware` | yes, line forced low afterwards | inspect the wiring |

use thiserror::Error;

use crate::gpio::HardwareError;
use crate::wakeup::WakeupError;

#[derive(Debug, Error)]
pub enum ActivationError {
    /// Another activation pulse is still running.
    #[error("an activation pulse is already in progress")]
    Busy,

    /// The executor has been shut down.
    #[error("activation executor is shut down")]
    Closed,

    /// The wakeup generator is gone.  Returned before the pulse, no line was
    /// touched; returned after it, the keep-alive train did not resume.
    #[error("wakeup generator unavailable: {0}")]
    Wakeup(#[from] WakeupError),

    /// A GPIO write inside the pulse failed.
    #[error("activation pulse failed: {0}")]
    Hardware(#[from] HardwareError),

    /// The pulse task ended without reporting (panicked or was aborted).
    #[error("activation pulse task ended abnormally")]
    Aborted,
}

impl ActivationError {
    /// `true` for rejections that left every line untouched.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            ActivationError::Busy | ActivationError::Closed
        )
    }
}
