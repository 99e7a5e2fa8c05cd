// SPDX-License-Identifier: GPL-2.0

//! Fatal engine errors.
//!
//! Broken-pipe on a single sink is not represented here — it is handled
//! in-place by deactivating the sink (see [`crate::engine`]). Everything in
//! this enum terminates the process.

use std::fmt;
use std::io;

#[derive(Debug)]
pub enum EngineError {
    Read(io::Error),
    Write { sink: String, source: io::Error },
    Poll(io::Error),
    Alloc(&'static str),
    LineBoundary { sink: String },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Read(e) => write!(f, "read from input failed: {e}"),
            EngineError::Write { sink, source } => {
                write!(f, "write to sink {sink:?} failed: {source}")
            }
            EngineError::Poll(e) => write!(f, "poll failed: {e}"),
            EngineError::Alloc(what) => write!(f, "allocation failure: {what}"),
            EngineError::LineBoundary { sink } => write!(
                f,
                "sink {sink:?}: no newline found within a full share; increase -b",
            ),
        }
    }
}

impl std::error::Error for EngineError {}
