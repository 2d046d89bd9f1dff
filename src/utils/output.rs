//! Verbosity-gated logging.
//!
//! Messages are classified by [`MsgType`]; a message is forwarded to the
//! `log` facade only when its class is enabled in the manager's verbosity
//! mask. The log level is derived from the class, so an application can
//! filter further with its logger configuration.

use bitflags::bitflags;
use log::Level;
use std::fmt;

bitflags! {
    /// Classes of solver output.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MsgType: u32 {
        const ERRORS = 0b0000_0001;
        const WARNINGS = 0b0000_0010;
        const ITERATION_DETAILS = 0b0000_0100;
        const ORTHO_DETAILS = 0b0000_1000;
        const FINAL_SUMMARY = 0b0001_0000;
        const TIMING_DETAILS = 0b0010_0000;
        const STATUS_TEST_DETAILS = 0b0100_0000;
        const DEBUG = 0b1000_0000;
    }
}

impl MsgType {
    fn level(self) -> Level {
        if self.contains(MsgType::ERRORS) {
            Level::Error
        } else if self.contains(MsgType::WARNINGS) {
            Level::Warn
        } else if self.intersects(MsgType::FINAL_SUMMARY | MsgType::TIMING_DETAILS) {
            Level::Info
        } else if self.intersects(MsgType::ITERATION_DETAILS | MsgType::STATUS_TEST_DETAILS | MsgType::ORTHO_DETAILS) {
            Level::Debug
        } else {
            Level::Trace
        }
    }
}

/// Routes classified messages to `log`.
#[derive(Debug, Clone)]
pub struct OutputManager {
    verbosity: MsgType,
    label: String,
}

impl OutputManager {
    pub fn new(verbosity: MsgType, label: impl Into<String>) -> Self {
        Self { verbosity, label: label.into() }
    }

    pub fn verbosity(&self) -> MsgType {
        self.verbosity
    }

    pub fn set_verbosity(&mut self, verbosity: MsgType) {
        self.verbosity = verbosity;
    }

    pub fn set_label(&mut self, label: impl Into<String>) {
        self.label = label.into();
    }

    pub fn is_enabled(&self, kind: MsgType) -> bool {
        self.verbosity.intersects(kind)
    }

    pub fn emit(&self, kind: MsgType, args: fmt::Arguments<'_>) {
        if self.is_enabled(kind) {
            log::log!(target: "blockcg", kind.level(), "{}: {}", self.label, args);
        }
    }
}
