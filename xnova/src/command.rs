/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Text commands → activation pulses.
//!
//! A command is one short write: `open`, `close` or `autoclose`, optionally
//! followed by a single line terminator.  Matching is exact and
//! case-sensitive.  Input longer than [`MAX_COMMAND_LEN`] bytes is rejected
//! as a whole, never truncated to a prefix that happens to match.

use thiserror::Error;
use tracing::{info, warn};

use crate::activation::{ActivationError, ActivationExecutor};
use crate::gpio::{InvalidTarget, Line};

/// Longest accepted write, terminator included (`"autoclose\r\n"`).
pub const MAX_COMMAND_LEN: usize = 11;

/// Why a write is not a command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("empty command")]
    Empty,

    #[error("command is {len} bytes, at most {} are accepted", MAX_COMMAND_LEN)]
    TooLong { len: usize },

    #[error("command is not valid UTF-8")]
    NotUtf8,

    #[error(transparent)]
    UnknownLine(#[from] InvalidTarget),
}

/// Result of a rejected write.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Malformed input.  Nothing happened.
    #[error("invalid command: {0}")]
    InvalidCommand(#[from] ParseError),

    /// Valid command the executor would not run (e.g. `Busy`).
    #[error(transparent)]
    Activation(#[from] ActivationError),
}

impl DispatchError {
    pub fn is_busy(&self) -> bool {
        matches!(self, DispatchError::Activation(ActivationError::Busy))
    }
}

/// Maps a raw write onto the line it names.
pub fn parse(buf: &[u8]) -> Result<Line, ParseError> {
    if buf.len() > MAX_COMMAND_LEN {
        return Err(ParseError::TooLong { len: buf.len() });
    }

    let token = buf
        .strip_suffix(b"\r\n")
        .or_else(|| buf.strip_suffix(b"\n"))
        .unwrap_or(buf);
    if token.is_empty() {
        return Err(ParseError::Empty);
    }

    let token = std::str::from_utf8(token).map_err(|_| ParseError::NotUtf8)?;
    Ok(token.parse::<Line>()?)
}

/// Front door of the controller: accepts raw command writes.
#[derive(Clone)]
pub struct CommandDispatcher {
    executor: ActivationExecutor,
}

impl CommandDispatcher {
    pub fn new(executor: ActivationExecutor) -> Self {
        Self { executor }
    }

    /// Handles one write.  On success the activation pulse is running in the
    /// background and the whole buffer counts as consumed.
    ///
    /// Must be called from within a tokio runtime.
    pub fn write(&self, buf: &[u8]) -> Result<usize, DispatchError> {
        let line = parse(buf).map_err(|e| {
            warn!("Rejected command {:?}: {}", String::from_utf8_lossy(buf), e);
            e
        })?;

        match self.executor.trigger(line) {
            Ok(pulse) => {
                info!(line = %pulse.line(), "Command accepted");
                Ok(buf.len())
            }
            Err(e) => {
                warn!(line = %line, "Command not executed: {}", e);
                Err(e.into())
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
