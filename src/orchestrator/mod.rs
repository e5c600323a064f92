//! Application-level orchestration.
//!
//! This module owns run lifecycle control (start/cancel/quit) and artifact
//! refreshes. UI/CLI layers talk to it through commands and events only.

mod controller;

pub(crate) use controller::{run_controller, UiCommand};
