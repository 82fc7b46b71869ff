//! Errors surfaced while building or controlling a machine.
//!
//! Emulation itself never fails; these only come from loading images,
//! reading configuration and talking to the emulation thread.

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MachineError {
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error("bad ROM image: {0}")]
    Rom(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("emulation thread is gone")]
    ControlClosed,
}
