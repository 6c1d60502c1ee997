/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! XNova – keep-alive and activation pulse controller for the Mottura XNova
//! motorised lock.
//!
//! Module layout:
//!
//! ```text
//! lib.rs
//! ├── config/       – YAML configuration + defaults
//! ├── gpio/         – line identifiers, OutputLines trait, cdev + dry-run backends
//! ├── wakeup/       – keep-alive square wave on the WAKEUP line
//! ├── activation/   – single-slot activation pulses
//! ├── command       – text command parsing and dispatch
//! ├── controller    – owns the lines and both schedulers
//! └── server        – Unix socket command channel
//! ```

pub mod activation;
pub mod command;
pub mod config;
pub mod controller;
pub mod gpio;
pub mod server;
pub mod wakeup;
