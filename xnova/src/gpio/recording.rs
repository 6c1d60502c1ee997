/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! In-memory output lines with a timestamped write history.
//!
//! Backs `xnovad --dry-run` and every timing test.  Timestamps come from
//! [`tokio::time::Instant`], so under a paused test clock they advance only
//! with the virtual time.

use std::sync::Mutex;

use tokio::time::Instant;
use tracing::{debug, info};

use super::{level_name, HardwareError, Line, OutputLines};

/// One `set_level` call that reached the lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelChange {
    pub at: Instant,
    pub line: Line,
    pub high: bool,
}

#[derive(Debug, Default)]
struct State {
    levels: [bool; 3],
    faulted: [bool; 3],
    released: bool,
    history: Vec<LevelChange>,
    /// Oldest entries are dropped past this length.
    history_limit: Option<usize>,
}

impl State {
    fn record(&mut self, change: LevelChange) {
        self.history.push(change);
        if let Some(limit) = self.history_limit {
            if self.history.len() > limit {
                let excess = self.history.len() - limit;
                self.history.drain(..excess);
            }
        }
    }
}

/// Lines that only remember what was written to them.
#[derive(Debug, Default)]
pub struct RecordingLines {
    state: Mutex<State>,
}

impl RecordingLines {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps only the most recent `limit` writes, for long dry runs.
    pub fn bounded(limit: usize) -> Self {
        let lines = Self::default();
        lines.lock().history_limit = Some(limit);
        lines
    }

    /// Current level of `line`.
    pub fn level(&self, line: Line) -> bool {
        self.lock().levels[line.index()]
    }

    /// Every successful write, in order, including writes that did not change
    /// the level.
    pub fn history(&self) -> Vec<LevelChange> {
        self.lock().history.clone()
    }

    /// Level changes of `line` only: writes that repeat the previous level
    /// are skipped.  Every line starts low.
    pub fn edges(&self, line: Line) -> Vec<LevelChange> {
        let mut level = false;
        let mut edges = Vec::new();
        for change in self.lock().history.iter().filter(|c| c.line == line) {
            if change.high != level {
                level = change.high;
                edges.push(*change);
            }
        }
        edges
    }

    /// Make every subsequent write to `line` fail (or succeed again).
    pub fn set_faulted(&self, line: Line, faulted: bool) {
        self.lock().faulted[line.index()] = faulted;
    }

    /// `true` once [`release_all`](OutputLines::release_all) has run.
    pub fn is_released(&self) -> bool {
        self.lock().released
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl OutputLines for RecordingLines {
    fn set_level(&self, line: Line, high: bool) -> Result<(), HardwareError> {
        let mut state = self.lock();
        if state.released || state.faulted[line.index()] {
            return Err(HardwareError::Unavailable(line));
        }
        state.levels[line.index()] = high;
        state.record(LevelChange {
            at: Instant::now(),
            line,
            high,
        });
        debug!(line = %line, level = level_name(high), "Line driven (dry run)");
        Ok(())
    }

    fn release_all(&self) {
        let mut state = self.lock();
        let now = Instant::now();
        for line in Line::ALL {
            if state.levels[line.index()] {
                state.levels[line.index()] = false;
                state.record(LevelChange {
                    at: now,
                    line,
                    high: false,
                });
            }
        }
        state.released = true;
        info!("Released dry-run control lines");
    }
}
