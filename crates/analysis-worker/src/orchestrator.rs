//! Evaluation matrix runner.
//!
//! Walks versions × node budgets × games × positions, answering every
//! position from the cache when possible and from the engine otherwise. One
//! game payload is stored per (version, node budget, game) cell and its key is
//! returned to the caller.

use chess_core::{GameInfo, GameRecord};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cache::{game_key, position_key, Cache};
use crate::engine::{EngineLauncher, EngineSession};
use crate::error::WorkerError;
use crate::evaluation::PositionEvaluation;
use crate::settings::{EngineVersion, EvaluationSettings, NodeBudget};
use crate::store::CacheStore;

/// The matrix to run.
#[derive(Debug, Clone)]
pub struct MatrixConfig {
    pub versions: Vec<EngineVersion>,
    pub node_budgets: Vec<NodeBudget>,
    /// Threads, hash, depth, multi-PV and mode shared by every cell.
    pub base_settings: EvaluationSettings,
    pub max_restarts: u32,
    pub historical: bool,
}

/// Engine identity stored alongside each game evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineIdentity {
    pub name: String,
    pub version: u32,
    pub release_date: chrono::NaiveDate,
    pub nnue: bool,
    pub settings: EvaluationSettings,
}

/// Everything the analysis step needs about one evaluated game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameEvaluation {
    pub description: String,
    pub info: GameInfo,
    pub engine: EngineIdentity,
    pub nodes: NodeBudget,
    pub movetext: String,
    /// One entry per position, in game order.
    pub evaluations: Vec<PositionEvaluation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultKey {
    pub description: String,
    pub key: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub engine_calls: u64,
    pub cache_hits: u64,
    pub restarts: u32,
    pub skipped_games: u32,
    pub skipped_cells: u32,
}

pub struct Orchestrator<L: EngineLauncher, S> {
    launcher: L,
    cache: Cache<S>,
    config: MatrixConfig,
    session: Option<L::Session>,
    /// Version of the live session, if any.
    session_version: Option<u32>,
    /// Settings last sent to the live session.
    configured: Option<EvaluationSettings>,
    stats: RunStats,
}

impl<L, S> Orchestrator<L, S>
where
    L: EngineLauncher,
    S: CacheStore,
{
    pub fn new(launcher: L, store: S, config: MatrixConfig) -> Self {
        Self {
            launcher,
            cache: Cache::new(store),
            config,
            session: None,
            session_version: None,
            configured: None,
            stats: RunStats::default(),
        }
    }

    pub fn stats(&self) -> RunStats {
        self.stats
    }

    pub fn cache(&self) -> &Cache<S> {
        &self.cache
    }

    pub fn into_cache(self) -> Cache<S> {
        self.cache
    }

    /// Run the whole matrix and return the stored game keys in
    /// version, node budget, game order.
    pub async fn run(&mut self, games: &[GameRecord]) -> Result<Vec<ResultKey>, WorkerError> {
        let outcome = self.run_matrix(games).await;
        self.shutdown().await;
        info!(
            engine_calls = self.stats.engine_calls,
            cache_hits = self.stats.cache_hits,
            restarts = self.stats.restarts,
            skipped_games = self.stats.skipped_games,
            "Evaluation run finished"
        );
        outcome
    }

    async fn run_matrix(&mut self, games: &[GameRecord]) -> Result<Vec<ResultKey>, WorkerError> {
        let mut keys = Vec::new();
        let versions = self.config.versions.clone();
        let budgets = self.config.node_budgets.clone();

        for version in &versions {
            // Sessions never outlive their version.
            self.shutdown().await;

            for budget in &budgets {
                let settings = EvaluationSettings {
                    version: version.version,
                    ..self.config.base_settings.with_nodes(*budget)
                };
                info!(version = version.version, nodes = %budget, games = games.len(), "Evaluating matrix cell");

                for game in games {
                    if self.config.historical && !version.available_on(game.info.parsed_date()) {
                        debug!(game = %game.info.describe(), version = version.version, "Version newer than game, skipping");
                        self.stats.skipped_cells += 1;
                        continue;
                    }

                    match self.evaluate_game(version, &settings, game).await {
                        Ok(evaluations) => {
                            let key = self.persist(version, &settings, game, evaluations).await?;
                            keys.push(key);
                        }
                        Err(e @ (WorkerError::CrashBudgetExhausted { .. } | WorkerError::EngineLaunch { .. })) => {
                            return Err(e);
                        }
                        Err(e) => {
                            warn!(game = %game.info.describe(), error = %e, "Evaluation failed, skipping game");
                            self.stats.skipped_games += 1;
                        }
                    }
                }
            }
        }

        Ok(keys)
    }

    async fn evaluate_game(
        &mut self,
        version: &EngineVersion,
        settings: &EvaluationSettings,
        game: &GameRecord,
    ) -> Result<Vec<PositionEvaluation>, WorkerError> {
        let mut evaluations = Vec::with_capacity(game.positions.len());
        for fen in &game.positions {
            evaluations.push(self.evaluate_position(version, settings, fen).await?);
        }
        Ok(evaluations)
    }

    /// Cache first, engine second. Crashes restart the engine and retry the
    /// same position until the run's restart budget is spent.
    pub async fn evaluate_position(
        &mut self,
        version: &EngineVersion,
        settings: &EvaluationSettings,
        fen: &str,
    ) -> Result<PositionEvaluation, WorkerError> {
        let key = position_key(settings, fen)?;
        if let Some(cached) = self.cache.get::<PositionEvaluation>(&key).await? {
            self.stats.cache_hits += 1;
            return Ok(cached);
        }

        loop {
            match self.try_evaluate(version, settings, fen).await {
                Ok(evaluation) => {
                    self.cache.put(&key, &evaluation).await?;
                    return Ok(evaluation);
                }
                Err(e) if e.is_crash() => {
                    // A crashed process is never reused.
                    self.discard_session();
                    if self.stats.restarts >= self.config.max_restarts {
                        warn!(restarts = self.stats.restarts, "Crash budget exhausted");
                        return Err(WorkerError::CrashBudgetExhausted {
                            restarts: self.stats.restarts,
                        });
                    }
                    self.stats.restarts += 1;
                    warn!(error = %e, restart = self.stats.restarts, fen, "Engine crashed, restarting");
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn try_evaluate(
        &mut self,
        version: &EngineVersion,
        settings: &EvaluationSettings,
        fen: &str,
    ) -> Result<PositionEvaluation, WorkerError> {
        self.ready_session(version, settings).await?;
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| WorkerError::Engine("no live engine session".into()))?;
        self.stats.engine_calls += 1;
        session.evaluate(fen, settings.search_limit()).await
    }

    /// Launch or reconfigure so the live session matches `settings`.
    async fn ready_session(
        &mut self,
        version: &EngineVersion,
        settings: &EvaluationSettings,
    ) -> Result<(), WorkerError> {
        if self.session_version != Some(version.version) {
            self.shutdown().await;
            let session = self.launcher.launch(version).await.map_err(|e| match e {
                WorkerError::EngineCrashed(_) => e,
                other => WorkerError::EngineLaunch {
                    version: version.version,
                    reason: other.to_string(),
                },
            })?;
            self.session = Some(session);
            self.session_version = Some(version.version);
        }

        if self.configured.as_ref() != Some(settings) {
            let session = self
                .session
                .as_mut()
                .ok_or_else(|| WorkerError::Engine("no live engine session".into()))?;
            session.configure(settings).await?;
            self.configured = Some(settings.clone());
        }
        Ok(())
    }

    fn discard_session(&mut self) {
        self.session = None;
        self.session_version = None;
        self.configured = None;
    }

    async fn persist(
        &mut self,
        version: &EngineVersion,
        settings: &EvaluationSettings,
        game: &GameRecord,
        evaluations: Vec<PositionEvaluation>,
    ) -> Result<ResultKey, WorkerError> {
        let description = format!(
            "{} | Stockfish {} | {} nodes",
            game.info.describe(),
            version.version,
            settings.nodes
        );
        let payload = GameEvaluation {
            description: description.clone(),
            info: game.info.clone(),
            engine: EngineIdentity {
                name: settings.engine.clone(),
                version: version.version,
                release_date: version.release_date,
                nnue: version.nnue,
                settings: settings.clone(),
            },
            nodes: settings.nodes,
            movetext: game.movetext.clone(),
            evaluations,
        };
        let raw = serde_json::to_string(&payload)?;
        let key = game_key(&raw);
        self.cache.put_raw(&key, &raw).await;
        info!(game = %description, key = %key, "Stored game evaluation");
        Ok(ResultKey { description, key })
    }

    async fn shutdown(&mut self) {
        if let Some(session) = self.session.take() {
            session.quit().await;
        }
        self.discard_session();
    }
}
