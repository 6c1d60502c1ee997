/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Real output lines on a Linux GPIO character device.

use std::sync::Mutex;

use gpio_cdev::{Chip, LineHandle, LineRequestFlags};
use tracing::{debug, info, warn};

use super::{force_all_low, level_name, HardwareError, Line, OutputLines};
use crate::config::GpioConfig;

/// Consumer label shown by `gpioinfo` for lines held by this process.
const CONSUMER: &str = "xnova";

/// The three actuator lines, claimed as outputs on one GPIO chip.
///
/// Handles are dropped (returning the lines to the kernel) by
/// [`release_all`](OutputLines::release_all) or when this value is dropped.
pub struct CdevLines {
    /// Indexed by [`Line::index`]; `None` once released.
    handles: Mutex<Option<[LineHandle; 3]>>,
}

impl CdevLines {
    /// Open `config.chip` and claim the open/close/autoclose offsets as
    /// outputs driven low.
    ///
    /// # Errors
    /// Fails on the first line that cannot be claimed.  Lines claimed before
    /// the failure are released when their handles drop on the error path.
    pub fn acquire(config: &GpioConfig) -> Result<Self, HardwareError> {
        let mut chip = Chip::new(&config.chip).map_err(|source| HardwareError::Chip {
            path: config.chip.clone(),
            source,
        })?;

        let open = request_output(&mut chip, Line::Open, config.open_line)?;
        let close = request_output(&mut chip, Line::Close, config.close_line)?;
        let autoclose = request_output(&mut chip, Line::Autoclose, config.autoclose_line)?;

        info!(
            chip = %config.chip.display(),
            open = config.open_line,
            close = config.close_line,
            autoclose = config.autoclose_line,
            "Acquired XNova control lines"
        );

        Ok(Self {
            handles: Mutex::new(Some([open, close, autoclose])),
        })
    }
}

fn request_output(chip: &mut Chip, line: Line, offset: u32) -> Result<LineHandle, HardwareError> {
    let acquisition = |source| HardwareError::Acquisition {
        line,
        offset,
        source,
    };
    let handle = chip
        .get_line(offset)
        .map_err(acquisition)?
        .request(LineRequestFlags::OUTPUT, 0, CONSUMER)
        .map_err(acquisition)?;
    debug!(line = %line, offset, "Line claimed as output");
    Ok(handle)
}

impl OutputLines for CdevLines {
    fn set_level(&self, line: Line, high: bool) -> Result<(), HardwareError> {
        // A poisoned lock only means another writer panicked mid-call; the
        // handles themselves are still valid.
        let guard = self.handles.lock().unwrap_or_else(|p| p.into_inner());
        let handles = guard.as_ref().ok_or(HardwareError::Unavailable(line))?;
        handles[line.index()]
            .set_value(u8::from(high))
            .map_err(|source| HardwareError::Write { line, high, source })?;
        debug!(line = %line, level = level_name(high), "Line driven");
        Ok(())
    }

    fn release_all(&self) {
        force_all_low(self);
        let mut guard = self.handles.lock().unwrap_or_else(|p| p.into_inner());
        if guard.take().is_some() {
            info!("Released XNova control lines");
        } else {
            warn!("Control lines were already released");
        }
    }
}
