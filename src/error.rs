//! This module contains the error types surfaced by the engine.
//!
//! Only recoverable conditions are expressed as errors; invariant
//! violations such as an unmatched unmake or a corrupted transposition
//! table entry mean the engine state is no longer trustworthy, and
//! those panic instead.

use thiserror::Error;

// Errors that a caller of the engine can observe and act on
#[derive(Error, Debug)]
pub enum EngineError {

    // The position has no legal moves, so there is no move to return.
    // The game is over; the caller decides how (mate or stalemate).
    #[error("no legal move available in this position")]
    NoLegalMove,

    // A FEN string could not be parsed into a position
    #[error("invalid FEN string: {0}")]
    InvalidFen(String),

    // A SAN or UCI move string could not be parsed, or described an
    // illegal move in the given position
    #[error("invalid move text: {0}")]
    InvalidMoveText(String),
}

// Result type alias used throughout the crate
pub type EngineResult<T> = Result<T, EngineError>;
