//! Simulation error kinds.
//!
//! Every error here is local and recoverable: a road referencing a missing
//! endpoint is skipped, a routing failure strands one vehicle, an invalid
//! position is clamped. None of them halts the tick loop.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    #[error("unknown endpoint '{0}'")]
    UnknownEndpoint(String),

    #[error("road between '{a}' and '{b}' already exists")]
    DuplicateRoad { a: String, b: String },

    #[error("no route from '{from}' to '{to}'")]
    NoRoute { from: String, to: String },

    #[error("invalid position {position} on road '{road}'")]
    InvalidPosition { road: String, position: f64 },
}

pub type SimResult<T> = Result<T, SimError>;
