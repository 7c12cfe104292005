use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Header fields carried through evaluation and analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameInfo {
    pub white: String,
    pub black: String,
    pub date: Option<String>,
    pub result: String, // "1-0", "0-1", "1/2-1/2", "*"
    pub event: Option<String>,
    pub round: Option<String>,
    pub white_elo: Option<u32>,
    pub black_elo: Option<u32>,
    pub eco: Option<String>,
    pub ply: usize,
}

impl GameInfo {
    /// Game date, accepting both `2022.09.04` and `2022-09-04`.
    /// Partially known dates (`2022.??.??`) yield `None`.
    pub fn parsed_date(&self) -> Option<NaiveDate> {
        let raw = self.date.as_deref()?.trim();
        NaiveDate::parse_from_str(raw, "%Y.%m.%d")
            .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
            .ok()
    }

    /// Short human readable label, e.g. `Carlsen - Niemann (Sinquefield Cup, 3) 2022.09.04`.
    pub fn describe(&self) -> String {
        let mut label = format!("{} - {}", self.white, self.black);
        match (&self.event, &self.round) {
            (Some(event), Some(round)) => label.push_str(&format!(" ({event}, {round})")),
            (Some(event), None) => label.push_str(&format!(" ({event})")),
            (None, Some(round)) => label.push_str(&format!(" (round {round})")),
            (None, None) => {}
        }
        if let Some(date) = &self.date {
            label.push(' ');
            label.push_str(date);
        }
        label
    }
}

/// A validated game. Built once by [`crate::pgn`] and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRecord {
    pub info: GameInfo,
    /// Every tag pair in file order.
    pub headers: Vec<(String, String)>,
    /// Exported SAN move text without tags, comments or variations.
    pub movetext: String,
    /// Played moves in UCI notation, one per ply.
    pub moves: Vec<String>,
    /// FEN before every ply plus the final position (`moves.len() + 1` entries).
    pub positions: Vec<String>,
}

impl GameRecord {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}
