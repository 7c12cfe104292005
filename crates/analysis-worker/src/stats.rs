//! Per-colour aggregation of analysed moves.

use std::collections::BTreeMap;

use chess_core::Side;
use serde::{Deserialize, Serialize};

use crate::analysis::{classify_loss, Severity};
use crate::analyzer::MoveRecord;
use crate::config::AnalysisConfig;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MoveStats {
    pub moves: u32,
    /// Mean over moves with a defined loss; `None` if there are none.
    pub average_centipawn_loss: Option<f64>,
    pub average_wdl_diff: Option<[f64; 3]>,
    /// Top-move rank → occurrences (0 = not among the candidates).
    pub top_moves: BTreeMap<u32, u32>,
    /// Losses in [50, 100). The three bands do not overlap.
    pub inaccuracies: u32,
    /// Losses in [100, 300).
    pub mistakes: u32,
    /// Losses of 300 or more.
    pub blunders: u32,
}

impl MoveStats {
    fn collect<'a>(records: impl Iterator<Item = &'a MoveRecord>) -> Self {
        let mut stats = MoveStats::default();
        let mut losses: Vec<u32> = Vec::new();
        let mut wdl_diffs: Vec<[i32; 3]> = Vec::new();

        for record in records {
            stats.moves += 1;
            *stats.top_moves.entry(record.top_engine_move).or_insert(0) += 1;
            if let Some(loss) = record.centipawn_loss {
                losses.push(loss);
                match classify_loss(loss) {
                    Some(Severity::Inaccuracy) => stats.inaccuracies += 1,
                    Some(Severity::Mistake) => stats.mistakes += 1,
                    Some(Severity::Blunder) => stats.blunders += 1,
                    None => {}
                }
            }
            if let Some(diff) = record.wdl_diff {
                wdl_diffs.push(diff);
            }
        }

        if !losses.is_empty() {
            let total: f64 = losses.iter().map(|&l| f64::from(l)).sum();
            stats.average_centipawn_loss = Some(total / losses.len() as f64);
        }
        if !wdl_diffs.is_empty() {
            let n = wdl_diffs.len() as f64;
            let mut sums = [0.0; 3];
            for diff in &wdl_diffs {
                for (sum, component) in sums.iter_mut().zip(diff) {
                    *sum += f64::from(*component);
                }
            }
            stats.average_wdl_diff = Some(sums.map(|s| s / n));
        }
        stats
    }
}

/// Statistics for one colour under both filters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColorStats {
    pub all: MoveStats,
    /// Excludes the warm-up plies and forced moves.
    pub selected: MoveStats,
}

/// Whether a move survives the warm-up and forced-move exclusions.
pub fn is_selected(record: &MoveRecord, config: &AnalysisConfig) -> bool {
    record.ply > config.warmup_plies && record.legal_moves > config.forced_move_threshold
}

/// Aggregate the moves made by `side`.
pub fn color_stats(records: &[MoveRecord], side: Side, config: &AnalysisConfig) -> ColorStats {
    let made_by = |r: &&MoveRecord| r.turn == side && r.played.is_some();
    ColorStats {
        all: MoveStats::collect(records.iter().filter(made_by)),
        selected: MoveStats::collect(
            records
                .iter()
                .filter(made_by)
                .filter(|r| is_selected(r, config)),
        ),
    }
}
