//! Depth of convergence.
//!
//! A search reports its rank-1 move at every depth it completes. The
//! convergence depth of a move is the shallowest retained depth at which that
//! move was rank 1. For the position as a whole the move is the deepest
//! search's choice; for the played move it is the move actually made.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::evaluation::PositionEvaluation;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Convergence {
    /// Shallowest agreeing depth. `None` when no retained depth agrees.
    pub depth: Option<u32>,
    /// Every retained depth at which the move was rank 1, ascending.
    pub depths: Vec<u32>,
    /// `depths.len()` over the inclusive span from first to last agreeing depth.
    pub ratio: Option<f64>,
}

impl Convergence {
    fn from_depths(depths: Vec<u32>) -> Self {
        let ratio = match (depths.first(), depths.last()) {
            (Some(first), Some(last)) => Some(depths.len() as f64 / f64::from(last - first + 1)),
            _ => None,
        };
        Self {
            depth: depths.first().copied(),
            depths,
            ratio,
        }
    }

    /// Depth as reported in flat lists, 0 when there is none.
    pub fn depth_or_zero(&self) -> u32 {
        self.depth.unwrap_or(0)
    }
}

fn agreeing_depths(groups: &BTreeMap<u32, String>, mv: &str, min_depth: u32) -> Vec<u32> {
    groups
        .iter()
        .filter(|(depth, best)| **depth >= min_depth && best.as_str() == mv)
        .map(|(depth, _)| *depth)
        .collect()
}

/// Convergence of the deepest search's rank-1 move.
pub fn position_convergence(evaluation: &PositionEvaluation, min_depth: u32) -> Convergence {
    let groups = evaluation.rank_one_by_depth();
    let Some((_, deepest)) = groups.iter().next_back() else {
        return Convergence::default();
    };
    Convergence::from_depths(agreeing_depths(&groups, deepest, min_depth))
}

/// Convergence of the move actually played.
pub fn move_convergence(evaluation: &PositionEvaluation, played: &str, min_depth: u32) -> Convergence {
    let groups = evaluation.rank_one_by_depth();
    Convergence::from_depths(agreeing_depths(&groups, played, min_depth))
}
