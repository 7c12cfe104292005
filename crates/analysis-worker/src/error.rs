//! Worker error types

use chess_core::GameError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Stockfish error: {0}")]
    Engine(String),

    #[error("Could not start Stockfish {version}: {reason}")]
    EngineLaunch { version: u32, reason: String },

    #[error("Stockfish process crashed: {0}")]
    EngineCrashed(String),

    #[error("Engine crashed {restarts} times, giving up")]
    CrashBudgetExhausted { restarts: u32 },

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Game error: {0}")]
    Game(#[from] GameError),

    #[error("Analysis error: {0}")]
    Analysis(String),

    #[error("No stored result for key {0}")]
    ResultNotFound(String),
}

impl WorkerError {
    /// Only a crash warrants restarting the engine.
    pub fn is_crash(&self) -> bool {
        matches!(self, WorkerError::EngineCrashed(_))
    }
}
