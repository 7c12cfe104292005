pub mod analysis;
pub mod analyzer;
pub mod cache;
pub mod config;
pub mod convergence;
pub mod engine;
pub mod error;
pub mod evaluation;
pub mod orchestrator;
pub mod settings;
pub mod stats;
pub mod stockfish;
pub mod store;

pub use error::WorkerError;
