//! Game analysis over a stored evaluation
//!
//! Replays the stored move text, pairs every board with its cached engine
//! output and derives per-move metrics plus per-colour statistics.

use chess_core::pgn::replay_movetext;
use chess_core::{BoardView, GameInfo, Material, Side};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::analysis;
use crate::cache::Cache;
use crate::config::AnalysisConfig;
use crate::convergence::{move_convergence, position_convergence, Convergence};
use crate::error::WorkerError;
use crate::evaluation::PvLine;
use crate::orchestrator::{EngineIdentity, GameEvaluation};
use crate::stats::{color_stats, ColorStats};
use crate::store::CacheStore;

/// One position of the game and the move played from it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MoveRecord {
    pub fullmove_number: u32,
    /// 1-based index of the move played from this position.
    pub ply: usize,
    pub turn: Side,
    pub fen: String,
    /// UCI move, `None` for the final position.
    #[serde(rename = "move")]
    pub played: Option<String>,
    pub is_check: bool,
    pub is_checkmate: bool,
    pub is_stalemate: bool,
    pub is_insufficient_material: bool,
    pub centipawn_loss: Option<u32>,
    pub wdl_diff: Option<[i32; 3]>,
    /// Rank of the played move among the candidates, 0 when absent.
    pub top_engine_move: u32,
    pub legal_moves: usize,
    /// `[white, black]`
    pub material: [u32; 2],
    pub position_depth: Option<u32>,
    pub move_depth: Option<u32>,
    /// Agreeing depths and ratio behind `position_depth`.
    pub position_convergence: Convergence,
    pub move_convergence: Convergence,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<Vec<PvLine>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSummary {
    pub white: ColorStats,
    pub black: ColorStats,
    /// Position convergence per move played, 0 where none.
    pub position_depths: Vec<u32>,
    /// Played-move convergence per move played, 0 where none.
    pub move_depths: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub description: String,
    pub info: GameInfo,
    pub engine: EngineIdentity,
    pub game: GameSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub moves: Option<Vec<MoveRecord>>,
}

/// Analyse the game stored under `key`.
pub async fn analyse_key<S: CacheStore>(
    cache: &Cache<S>,
    key: &str,
    config: &AnalysisConfig,
) -> Result<AnalysisResult, WorkerError> {
    let payload: GameEvaluation = cache
        .get(key)
        .await?
        .ok_or_else(|| WorkerError::ResultNotFound(key.to_string()))?;
    info!(key, game = %payload.description, "Analysing stored evaluation");
    analyse(&payload, config)
}

/// Analyse one stored game evaluation.
pub fn analyse(payload: &GameEvaluation, config: &AnalysisConfig) -> Result<AnalysisResult, WorkerError> {
    let records = move_records(payload, config)?;

    let played: Vec<&MoveRecord> = records.iter().filter(|r| r.played.is_some()).collect();
    let summary = GameSummary {
        white: color_stats(&records, Side::White, config),
        black: color_stats(&records, Side::Black, config),
        position_depths: played.iter().map(|r| r.position_convergence.depth_or_zero()).collect(),
        move_depths: played.iter().map(|r| r.move_convergence.depth_or_zero()).collect(),
    };
    debug!(
        moves = played.len(),
        white_acpl = ?summary.white.all.average_centipawn_loss,
        black_acpl = ?summary.black.all.average_centipawn_loss,
        "Analysis complete"
    );

    Ok(AnalysisResult {
        description: payload.description.clone(),
        info: payload.info.clone(),
        engine: payload.engine.clone(),
        game: summary,
        moves: config.include_moves.then_some(records),
    })
}

/// Pair every replayed board with its stored evaluation.
pub fn move_records(
    payload: &GameEvaluation,
    config: &AnalysisConfig,
) -> Result<Vec<MoveRecord>, WorkerError> {
    let replay = replay_movetext(&payload.movetext)?;
    let evaluations = &payload.evaluations;
    if replay.boards.len() != evaluations.len() {
        return Err(WorkerError::Analysis(format!(
            "{} positions replayed but {} evaluations stored",
            replay.boards.len(),
            evaluations.len()
        )));
    }

    let mut records = Vec::with_capacity(replay.boards.len());
    for (i, (board, evaluation)) in replay.boards.iter().zip(evaluations).enumerate() {
        let fen = board.fen();
        if fen != evaluation.fen {
            return Err(WorkerError::Analysis(format!(
                "ply {}: replayed {fen} but evaluation is for {}",
                i + 1,
                evaluation.fen
            )));
        }

        let turn = board.side_to_move();
        let played = replay.moves.get(i);
        let next = evaluations.get(i + 1);
        let position = position_convergence(evaluation, config.min_depth);

        let mut record = MoveRecord {
            fullmove_number: board.fullmove_number(),
            ply: i + 1,
            turn,
            fen,
            played: played.cloned(),
            is_check: board.is_check(),
            is_checkmate: board.is_checkmate(),
            is_stalemate: board.is_stalemate(),
            is_insufficient_material: board.is_insufficient_material(),
            legal_moves: board.legal_move_count(),
            material: Material::of(board).to_pair(),
            position_depth: position.depth,
            position_convergence: position,
            evaluation: config
                .include_moves
                .then(|| evaluation.top_moves().into_iter().cloned().collect()),
            ..MoveRecord::default()
        };

        if let Some(mv) = played {
            record.centipawn_loss = analysis::centipawn_loss(evaluation, next, mv);
            record.wdl_diff = analysis::wdl_diff(evaluation, next, mv, turn.is_white());
            record.top_engine_move = analysis::top_move_rank(evaluation, mv);
            let convergence = move_convergence(evaluation, mv, config.min_depth);
            record.move_depth = convergence.depth;
            record.move_convergence = convergence;
        }
        records.push(record);
    }
    Ok(records)
}
