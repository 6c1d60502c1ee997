/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Output lines wired to the XNova control inputs.
//!
//! The actuator exposes three inputs, one per function.  Each is driven by one
//! digital output:
//!
//! ```text
//! OPEN       ── activation pulse only
//! CLOSE      ── activation pulse + keep-alive (WAKEUP) pulse train
//! AUTOCLOSE  ── activation pulse only
//! ```
//!
//! [`OutputLines`] is the seam between the scheduling code and the hardware.
//! Two implementations exist:
//!
//! * [`CdevLines`] — the real lines, claimed through the Linux GPIO
//!   character device.
//! * [`RecordingLines`] — in-memory levels plus a timestamped write history,
//!   used by `--dry-run` and by the tests.

pub mod cdev;
pub mod recording;

pub use cdev::CdevLines;
pub use recording::{LevelChange, RecordingLines};

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;
use tracing::warn;

// ── Line identifiers ──────────────────────────────────────────────────────────

/// One of the three actuator control lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Line {
    Open,
    Close,
    Autoclose,
}

impl Line {
    /// All lines, in acquisition order.
    pub const ALL: [Line; 3] = [Line::Open, Line::Close, Line::Autoclose];

    /// The line that carries the keep-alive pulse train.
    pub const WAKEUP: Line = Line::Close;

    /// Command token / log name of this line.
    pub fn as_str(self) -> &'static str {
        match self {
            Line::Open => "open",
            Line::Close => "close",
            Line::Autoclose => "autoclose",
        }
    }

    /// Position of this line inside per-line arrays.
    pub(crate) fn index(self) -> usize {
        match self {
            Line::Open => 0,
            Line::Close => 1,
            Line::Autoclose => 2,
        }
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A line identifier that does not name one of the three actuator lines.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("'{0}' is not an actuator line (valid: open, close, autoclose)")]
pub struct InvalidTarget(pub String);

impl FromStr for Line {
    type Err = InvalidTarget;

    /// Exact, case-sensitive match on the command token.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Line::Open),
            "close" => Ok(Line::Close),
            "autoclose" => Ok(Line::Autoclose),
            other => Err(InvalidTarget(other.to_string())),
        }
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Failures talking to the GPIO hardware.
///
/// `Chip` and `Acquisition` only occur at startup and are fatal there.
/// `Write` and `Unavailable` occur at runtime and are logged by the scheduling
/// code, which keeps running.
#[derive(Debug, Error)]
pub enum HardwareError {
    /// The GPIO character device could not be opened.
    #[error("cannot open GPIO chip {}: {source}", .path.display())]
    Chip {
        path: PathBuf,
        #[source]
        source: gpio_cdev::Error,
    },

    /// A configured line could not be claimed or configured as an output.
    #[error("cannot claim line {line} (offset {offset}) as output: {source}")]
    Acquisition {
        line: Line,
        offset: u32,
        #[source]
        source: gpio_cdev::Error,
    },

    /// Driving an acquired line failed.
    #[error("cannot drive line {line} (high = {high}): {source}")]
    Write {
        line: Line,
        high: bool,
        #[source]
        source: gpio_cdev::Error,
    },

    /// The line was released (shutdown) or is otherwise unusable.
    #[error("line {0} is not available")]
    Unavailable(Line),
}

pub(crate) fn level_name(high: bool) -> &'static str {
    if high {
        "high"
    } else {
        "low"
    }
}

// ── Hardware seam ─────────────────────────────────────────────────────────────

/// Digital outputs for the three actuator lines.
///
/// Writes take `&self`: implementations hold their own interior locking so a
/// single `Arc<dyn OutputLines>` can be shared by the wakeup generator and the
/// activation executor.  Which of the two may write at any instant is decided
/// by the pause/resume protocol, not by this trait.
pub trait OutputLines: Send + Sync {
    /// Drive `line` to `high` (`true` = logic 1).
    fn set_level(&self, line: Line, high: bool) -> Result<(), HardwareError>;

    /// Force every line low and give it up.  Never fails; problems are
    /// logged.  Later writes return [`HardwareError::Unavailable`].
    fn release_all(&self);
}

/// Best-effort: drive every line low, logging (not returning) failures.
pub(crate) fn force_all_low<L: OutputLines + ?Sized>(lines: &L) {
    for line in Line::ALL {
        if let Err(e) = lines.set_level(line, false) {
            warn!(line = %line, "Failed to force line low: {}", e);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
