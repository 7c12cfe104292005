//! Game validation errors

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GameError {
    #[error("Not a standard starting position: {0}")]
    NonStandardStart(String),

    #[error("Malformed header {name}: {value:?}")]
    MalformedHeader { name: String, value: String },

    #[error("Illegal move {san} at ply {ply}")]
    IllegalMove { san: String, ply: usize },

    #[error("Game has no moves")]
    Empty,

    #[error("Move text did not contain a game")]
    NoGame,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
