//! Engine output for a single position.
//!
//! All scores and WDL triples are stored from White's point of view.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::WorkerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Score {
    #[serde(rename = "cp")]
    Centipawns(i32),
    #[serde(rename = "mate")]
    Mate(i32),
}

impl Score {
    /// Centipawn value, `None` for mate scores.
    pub fn centipawns(self) -> Option<i32> {
        match self {
            Score::Centipawns(cp) => Some(cp),
            Score::Mate(_) => None,
        }
    }

    /// Same score seen from the other side.
    pub fn flipped(self) -> Self {
        match self {
            Score::Centipawns(cp) => Score::Centipawns(-cp),
            Score::Mate(n) => Score::Mate(-n),
        }
    }
}

/// Win/draw/loss expectation in permille.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wdl {
    pub win: u32,
    pub draw: u32,
    pub loss: u32,
}

impl Wdl {
    pub fn new(win: u32, draw: u32, loss: u32) -> Self {
        Self { win, draw, loss }
    }

    pub fn flipped(self) -> Self {
        Self {
            win: self.loss,
            draw: self.draw,
            loss: self.win,
        }
    }

    /// Elementwise `self - other`.
    pub fn diff(self, other: Wdl) -> [i32; 3] {
        [
            self.win as i32 - other.win as i32,
            self.draw as i32 - other.draw as i32,
            self.loss as i32 - other.loss as i32,
        ]
    }
}

impl FromStr for Wdl {
    type Err = WorkerError;

    /// Parses the `"500 300 200"` form used by UCI `wdl`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<u32> = s
            .split_whitespace()
            .map(|p| p.parse::<u32>())
            .collect::<Result<_, _>>()
            .map_err(|_| WorkerError::Engine(format!("invalid WDL triple {s:?}")))?;
        match parts.as_slice() {
            [win, draw, loss] => Ok(Wdl::new(*win, *draw, *loss)),
            _ => Err(WorkerError::Engine(format!("invalid WDL triple {s:?}"))),
        }
    }
}

/// One `info ... pv ...` report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PvLine {
    /// 1-based MultiPV index.
    pub rank: u32,
    pub depth: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seldepth: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes: Option<u64>,
    pub score: Option<Score>,
    #[serde(default)]
    pub wdl: Option<Wdl>,
    pub pv: Vec<String>,
}

impl PvLine {
    /// The move this line starts with.
    pub fn first_move(&self) -> Option<&str> {
        self.pv.first().map(String::as_str)
    }
}

/// Every exact PV report the engine produced for one position, in arrival order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionEvaluation {
    pub fen: String,
    pub lines: Vec<PvLine>,
}

impl PositionEvaluation {
    pub fn new(fen: impl Into<String>) -> Self {
        Self {
            fen: fen.into(),
            lines: Vec::new(),
        }
    }

    /// Final candidate list: the deepest (latest on ties) report per rank,
    /// ordered by rank.
    pub fn top_moves(&self) -> Vec<&PvLine> {
        let mut by_rank: BTreeMap<u32, &PvLine> = BTreeMap::new();
        for line in &self.lines {
            match by_rank.get(&line.rank) {
                Some(existing) if existing.depth > line.depth => {}
                _ => {
                    by_rank.insert(line.rank, line);
                }
            }
        }
        by_rank.into_values().filter(|l| !l.pv.is_empty()).collect()
    }

    /// The rank-1 candidate.
    pub fn best(&self) -> Option<&PvLine> {
        self.top_moves().into_iter().find(|l| l.rank == 1)
    }

    /// The candidate starting with `mv`, if the engine considered it.
    pub fn candidate(&self, mv: &str) -> Option<&PvLine> {
        self.top_moves()
            .into_iter()
            .find(|l| l.first_move() == Some(mv))
    }

    /// Rank-1 move reported at each search depth.
    pub fn rank_one_by_depth(&self) -> BTreeMap<u32, String> {
        self.lines
            .iter()
            .filter(|l| l.rank == 1)
            .filter_map(|l| l.first_move().map(|mv| (l.depth, mv.to_string())))
            .collect()
    }
}
