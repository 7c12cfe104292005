#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use analysis_worker::engine::{EngineLauncher, EngineSession};
use analysis_worker::error::WorkerError;
use analysis_worker::evaluation::{PositionEvaluation, PvLine, Score, Wdl};
use analysis_worker::orchestrator::MatrixConfig;
use analysis_worker::settings::{
    EngineVersion, EvaluationSettings, NodeBudget, SearchLimit, SearchMode,
};
use analysis_worker::store::CacheStore;

/// Counts what the orchestrator asked of the engine.
#[derive(Debug, Default)]
pub struct EngineLog {
    pub launches: AtomicU32,
    pub evaluations: AtomicU32,
}

impl EngineLog {
    pub fn launches(&self) -> u32 {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn evaluations(&self) -> u32 {
        self.evaluations.load(Ordering::SeqCst)
    }
}

/// Engine answering from a FEN → lines table. Unknown positions get a
/// single quiet line; `crash` makes every search die and `fail_on` makes the
/// search of one position return an ordinary engine error.
#[derive(Clone, Default)]
pub struct ScriptedEngine {
    pub answers: Arc<HashMap<String, Vec<PvLine>>>,
    pub log: Arc<EngineLog>,
    pub crash: bool,
    pub fail_on: Option<String>,
}

impl ScriptedEngine {
    pub fn new(answers: HashMap<String, Vec<PvLine>>) -> Self {
        Self {
            answers: Arc::new(answers),
            ..Self::default()
        }
    }

    pub fn crashing() -> Self {
        Self {
            crash: true,
            ..Self::default()
        }
    }

    pub fn failing_on(fen: &str) -> Self {
        Self {
            fail_on: Some(fen.to_string()),
            ..Self::default()
        }
    }
}

impl EngineSession for ScriptedEngine {
    async fn configure(&mut self, _: &EvaluationSettings) -> Result<(), WorkerError> {
        Ok(())
    }

    async fn evaluate(
        &mut self,
        fen: &str,
        _: SearchLimit,
    ) -> Result<PositionEvaluation, WorkerError> {
        self.log.evaluations.fetch_add(1, Ordering::SeqCst);
        if self.crash {
            return Err(WorkerError::EngineCrashed("scripted crash".into()));
        }
        if self.fail_on.as_deref() == Some(fen) {
            return Err(WorkerError::Engine(format!("cannot search {fen}")));
        }
        let lines = self
            .answers
            .get(fen)
            .cloned()
            .unwrap_or_else(|| vec![line(1, 5, Score::Centipawns(0), None, "a2a3")]);
        Ok(PositionEvaluation {
            fen: fen.to_string(),
            lines,
        })
    }

    async fn quit(self) {}
}

impl EngineLauncher for ScriptedEngine {
    type Session = ScriptedEngine;

    async fn launch(&mut self, _: &EngineVersion) -> Result<ScriptedEngine, WorkerError> {
        self.log.launches.fetch_add(1, Ordering::SeqCst);
        Ok(self.clone())
    }
}

/// Store whose writes always fail.
#[derive(Default)]
pub struct ReadOnlyStore;

impl CacheStore for ReadOnlyStore {
    async fn get(&self, _: &str) -> Result<Option<String>, WorkerError> {
        Ok(None)
    }

    async fn set(&self, _: &str, _: &str) -> Result<(), WorkerError> {
        Err(WorkerError::Cache("store is read-only".into()))
    }

    async fn remove(&self, _: &str) -> Result<(), WorkerError> {
        Err(WorkerError::Cache("store is read-only".into()))
    }
}

pub fn line(rank: u32, depth: u32, score: Score, wdl: Option<Wdl>, pv: &str) -> PvLine {
    PvLine {
        rank,
        depth,
        seldepth: None,
        nodes: None,
        score: Some(score),
        wdl,
        pv: pv.split_whitespace().map(String::from).collect(),
    }
}

pub fn matrix(versions: &[u32], budgets: &[&str], max_restarts: u32) -> MatrixConfig {
    let node_budgets: Vec<NodeBudget> = budgets.iter().map(|b| b.parse().unwrap()).collect();
    MatrixConfig {
        versions: versions
            .iter()
            .map(|v| EngineVersion::lookup(*v).unwrap())
            .collect(),
        node_budgets: node_budgets.clone(),
        base_settings: EvaluationSettings {
            engine: "stockfish".into(),
            version: versions[0],
            threads: 1,
            hash_mb: 64,
            depth: 20,
            multi_pv: 3,
            nodes: node_budgets[0],
            mode: SearchMode::Nodes,
        },
        max_restarts,
        historical: false,
    }
}
