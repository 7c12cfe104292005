//! Engine abstraction used by the orchestrator.

use std::future::Future;

use crate::error::WorkerError;
use crate::evaluation::PositionEvaluation;
use crate::settings::{EngineVersion, EvaluationSettings, SearchLimit};

/// A live engine process.
///
/// `evaluate` returning [`WorkerError::EngineCrashed`] leaves the session
/// unusable; callers must drop it and launch a fresh one.
pub trait EngineSession: Send {
    /// Apply option settings. May be called again to switch node budgets.
    fn configure(
        &mut self,
        settings: &EvaluationSettings,
    ) -> impl Future<Output = Result<(), WorkerError>> + Send;

    fn evaluate(
        &mut self,
        fen: &str,
        limit: SearchLimit,
    ) -> impl Future<Output = Result<PositionEvaluation, WorkerError>> + Send;

    /// Shut the process down cleanly.
    fn quit(self) -> impl Future<Output = ()> + Send;
}

/// Starts sessions for a given engine version.
pub trait EngineLauncher: Send {
    type Session: EngineSession;

    fn launch(
        &mut self,
        version: &EngineVersion,
    ) -> impl Future<Output = Result<Self::Session, WorkerError>> + Send;
}
