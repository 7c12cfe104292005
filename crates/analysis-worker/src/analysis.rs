//! Per-move metrics. Pure functions only
//! (no engine, cache or game dependencies).

use serde::{Deserialize, Serialize};

use crate::evaluation::{PositionEvaluation, Wdl};

/// Classification thresholds (centipawn loss)
const THRESHOLD_INACCURACY: u32 = 50;
const THRESHOLD_MISTAKE: u32 = 100;
const THRESHOLD_BLUNDER: u32 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Inaccuracy,
    Mistake,
    Blunder,
}

/// Bands are exclusive: [50, 100), [100, 300), 300 and up.
pub fn classify_loss(centipawn_loss: u32) -> Option<Severity> {
    if centipawn_loss >= THRESHOLD_BLUNDER {
        Some(Severity::Blunder)
    } else if centipawn_loss >= THRESHOLD_MISTAKE {
        Some(Severity::Mistake)
    } else if centipawn_loss >= THRESHOLD_INACCURACY {
        Some(Severity::Inaccuracy)
    } else {
        None
    }
}

/// Centipawn loss of `played`.
///
/// When the engine listed the move, compare it with the rank-1 line of the
/// same search. Otherwise compare the rank-1 score after the move with the
/// rank-1 score before it. Mate scores and missing scores give `None`.
pub fn centipawn_loss(
    current: &PositionEvaluation,
    next: Option<&PositionEvaluation>,
    played: &str,
) -> Option<u32> {
    let best = current.best()?.score?.centipawns()?;
    let after = match current.candidate(played) {
        Some(line) => line.score?.centipawns()?,
        None => next?.best()?.score?.centipawns()?,
    };
    Some(best.abs_diff(after))
}

/// `best - played` for win, draw and loss, from the mover's point of view.
pub fn wdl_diff(
    current: &PositionEvaluation,
    next: Option<&PositionEvaluation>,
    played: &str,
    white_to_move: bool,
) -> Option<[i32; 3]> {
    let best = current.best()?.wdl?;
    let after = match current.candidate(played) {
        Some(line) => line.wdl?,
        None => next?.best()?.wdl?,
    };
    let mover = |wdl: Wdl| if white_to_move { wdl } else { wdl.flipped() };
    Some(mover(best).diff(mover(after)))
}

/// 1-based rank of `played` among the final candidates, 0 when absent.
pub fn top_move_rank(current: &PositionEvaluation, played: &str) -> u32 {
    current.candidate(played).map_or(0, |line| line.rank)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::{PvLine, Score};

    fn line(rank: u32, score: Score, wdl: Option<Wdl>, mv: &str) -> PvLine {
        PvLine {
            rank,
            depth: 10,
            seldepth: None,
            nodes: None,
            score: Some(score),
            wdl,
            pv: vec![mv.to_string()],
        }
    }

    fn eval(lines: Vec<PvLine>) -> PositionEvaluation {
        PositionEvaluation {
            fen: "fen".into(),
            lines,
        }
    }

    #[test]
    fn test_classify_loss() {
        assert_eq!(classify_loss(0), None);
        assert_eq!(classify_loss(49), None);
        assert_eq!(classify_loss(50), Some(Severity::Inaccuracy));
        assert_eq!(classify_loss(99), Some(Severity::Inaccuracy));
        assert_eq!(classify_loss(100), Some(Severity::Mistake));
        assert_eq!(classify_loss(299), Some(Severity::Mistake));
        assert_eq!(classify_loss(300), Some(Severity::Blunder));
    }

    #[test]
    fn test_loss_from_candidate_list() {
        let current = eval(vec![
            line(1, Score::Centipawns(80), None, "e2e4"),
            line(2, Score::Centipawns(20), None, "d2d4"),
        ]);
        assert_eq!(centipawn_loss(&current, None, "e2e4"), Some(0));
        assert_eq!(centipawn_loss(&current, None, "d2d4"), Some(60));
        assert_eq!(top_move_rank(&current, "d2d4"), 2);
    }

    #[test]
    fn test_loss_falls_back_to_next_position() {
        let current = eval(vec![line(1, Score::Centipawns(80), None, "e2e4")]);
        let next = eval(vec![line(1, Score::Centipawns(50), None, "e7e5")]);
        assert_eq!(centipawn_loss(&current, Some(&next), "g1f3"), Some(30));
        assert_eq!(top_move_rank(&current, "g1f3"), 0);
        assert_eq!(centipawn_loss(&current, None, "g1f3"), None);
    }

    #[test]
    fn test_mate_scores_have_no_loss() {
        let current = eval(vec![
            line(1, Score::Mate(2), None, "d1h5"),
            line(2, Score::Centipawns(300), None, "e2e4"),
        ]);
        assert_eq!(centipawn_loss(&current, None, "e2e4"), None);
        assert_eq!(centipawn_loss(&current, None, "d1h5"), None);
    }

    #[test]
    fn test_wdl_diff() {
        let current = eval(vec![
            line(1, Score::Centipawns(80), Some(Wdl::new(500, 300, 200)), "e2e4"),
            line(2, Score::Centipawns(20), Some(Wdl::new(400, 300, 300)), "d2d4"),
        ]);
        assert_eq!(wdl_diff(&current, None, "d2d4", true), Some([100, 0, -100]));
        assert_eq!(wdl_diff(&current, None, "e2e4", true), Some([0, 0, 0]));

        // Stored from White's view; Black's loss of winning chances is the mirror.
        let black = eval(vec![
            line(1, Score::Centipawns(-80), Some(Wdl::new(200, 300, 500)), "e7e5"),
            line(2, Score::Centipawns(-20), Some(Wdl::new(300, 300, 400)), "d7d5"),
        ]);
        assert_eq!(wdl_diff(&black, None, "d7d5", false), Some([100, 0, -100]));
    }
}
