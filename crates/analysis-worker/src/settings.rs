//! Engine settings, typed node budgets and the Stockfish version catalog.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::WorkerError;

/// Suffix of a node budget literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeUnit {
    Nodes,
    Thousand,
    Million,
    Billion,
}

impl NodeUnit {
    pub fn multiplier(self) -> u64 {
        match self {
            NodeUnit::Nodes => 1,
            NodeUnit::Thousand => 1_000,
            NodeUnit::Million => 1_000_000,
            NodeUnit::Billion => 1_000_000_000,
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            NodeUnit::Nodes => "",
            NodeUnit::Thousand => "K",
            NodeUnit::Million => "M",
            NodeUnit::Billion => "B",
        }
    }
}

/// A node count such as `500K` or `3M`, validated when parsed.
///
/// Equality, hashing and serialization use the absolute node count, so `1000K`
/// and `1M` are the same budget.
#[derive(Debug, Clone, Copy)]
pub struct NodeBudget {
    amount: u64,
    unit: NodeUnit,
}

impl NodeBudget {
    pub fn new(amount: u64, unit: NodeUnit) -> Result<Self, WorkerError> {
        if amount == 0 {
            return Err(WorkerError::Config("node budget must be positive".into()));
        }
        amount
            .checked_mul(unit.multiplier())
            .ok_or_else(|| WorkerError::Config(format!("node budget {amount}{} overflows", unit.suffix())))?;
        Ok(Self { amount, unit })
    }

    /// Express an absolute node count in the largest unit that divides it.
    pub fn from_nodes(nodes: u64) -> Result<Self, WorkerError> {
        let unit = [NodeUnit::Billion, NodeUnit::Million, NodeUnit::Thousand]
            .into_iter()
            .find(|unit| nodes > 0 && nodes % unit.multiplier() == 0)
            .unwrap_or(NodeUnit::Nodes);
        Self::new(nodes / unit.multiplier(), unit)
    }

    pub fn nodes(&self) -> u64 {
        self.amount * self.unit.multiplier()
    }
}

impl PartialEq for NodeBudget {
    fn eq(&self, other: &Self) -> bool {
        self.nodes() == other.nodes()
    }
}

impl Eq for NodeBudget {}

impl std::hash::Hash for NodeBudget {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.nodes().hash(state);
    }
}

static NODE_BUDGET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+)\s*([kKmMbB]?)\s*$").unwrap());

impl FromStr for NodeBudget {
    type Err = WorkerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = NODE_BUDGET_RE
            .captures(s)
            .ok_or_else(|| WorkerError::Config(format!("invalid node budget {s:?}")))?;
        let amount: u64 = caps[1]
            .parse()
            .map_err(|_| WorkerError::Config(format!("invalid node budget {s:?}")))?;
        let unit = match caps[2].to_ascii_uppercase().as_str() {
            "K" => NodeUnit::Thousand,
            "M" => NodeUnit::Million,
            "B" => NodeUnit::Billion,
            _ => NodeUnit::Nodes,
        };
        Self::new(amount, unit)
    }
}

impl fmt::Display for NodeBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.unit.suffix())
    }
}

impl Serialize for NodeBudget {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.nodes())
    }
}

impl<'de> Deserialize<'de> for NodeBudget {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let nodes = u64::deserialize(deserializer)?;
        NodeBudget::from_nodes(nodes).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Nodes,
    Depth,
}

impl FromStr for SearchMode {
    type Err = WorkerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nodes" => Ok(SearchMode::Nodes),
            "depth" => Ok(SearchMode::Depth),
            other => Err(WorkerError::Config(format!("unknown search mode {other:?}"))),
        }
    }
}

/// What bounds a single `go` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchLimit {
    Nodes(u64),
    Depth(u32),
}

/// A Stockfish release known to the evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineVersion {
    pub version: u32,
    pub release_date: NaiveDate,
    pub nnue: bool,
}

const CATALOG: [(u32, (i32, u32, u32), bool); 7] = [
    (9, (2018, 2, 4), false),
    (10, (2018, 12, 1), false),
    (11, (2020, 1, 15), false),
    (12, (2020, 9, 2), true),
    (13, (2021, 2, 13), true),
    (14, (2021, 7, 2), true),
    (15, (2022, 4, 18), true),
];

impl EngineVersion {
    /// Look a version up in the catalog.
    pub fn lookup(version: u32) -> Result<Self, WorkerError> {
        CATALOG
            .iter()
            .find(|(v, _, _)| *v == version)
            .and_then(|&(version, (y, m, d), nnue)| {
                NaiveDate::from_ymd_opt(y, m, d).map(|release_date| EngineVersion {
                    version,
                    release_date,
                    nnue,
                })
            })
            .ok_or_else(|| WorkerError::Config(format!("unknown Stockfish version {version}")))
    }

    pub fn known_versions() -> Vec<u32> {
        CATALOG.iter().map(|(v, _, _)| *v).collect()
    }

    /// Whether a game played on `date` may be evaluated with this version in
    /// historical mode. Unknown dates never exclude a version.
    pub fn available_on(&self, date: Option<NaiveDate>) -> bool {
        date.map_or(true, |d| d >= self.release_date)
    }
}

/// Everything that influences an engine's answer for a position.
/// Serialized as the settings half of a position cache key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationSettings {
    pub engine: String,
    pub version: u32,
    pub threads: u32,
    pub hash_mb: u32,
    pub depth: u32,
    pub multi_pv: u32,
    pub nodes: NodeBudget,
    pub mode: SearchMode,
}

impl EvaluationSettings {
    pub fn search_limit(&self) -> SearchLimit {
        match self.mode {
            SearchMode::Nodes => SearchLimit::Nodes(self.nodes.nodes()),
            SearchMode::Depth => SearchLimit::Depth(self.depth),
        }
    }

    /// Same settings under a different node budget.
    pub fn with_nodes(&self, nodes: NodeBudget) -> Self {
        Self {
            nodes,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_node_budget() {
        assert_eq!("500K".parse::<NodeBudget>().unwrap().nodes(), 500_000);
        assert_eq!("3m".parse::<NodeBudget>().unwrap().nodes(), 3_000_000);
        assert_eq!(" 2 B ".parse::<NodeBudget>().unwrap().nodes(), 2_000_000_000);
        assert_eq!("100000".parse::<NodeBudget>().unwrap().nodes(), 100_000);
        assert_eq!("200M".parse::<NodeBudget>().unwrap().to_string(), "200M");
    }

    #[test]
    fn test_reject_bad_node_budget() {
        assert!("".parse::<NodeBudget>().is_err());
        assert!("0M".parse::<NodeBudget>().is_err());
        assert!("3G".parse::<NodeBudget>().is_err());
        assert!("-5K".parse::<NodeBudget>().is_err());
        assert!("1.5M".parse::<NodeBudget>().is_err());
    }

    #[test]
    fn test_node_budget_equality_is_absolute() {
        let a: NodeBudget = "1000K".parse().unwrap();
        let b: NodeBudget = "1M".parse().unwrap();
        assert_eq!(a, b);
        assert_eq!(serde_json::to_string(&a).unwrap(), "1000000");

        let back: NodeBudget = serde_json::from_str("1000000").unwrap();
        assert_eq!(back, b);
        assert_eq!(back.to_string(), "1M");
    }

    #[test]
    fn test_catalog() {
        let sf12 = EngineVersion::lookup(12).unwrap();
        assert!(sf12.nnue);
        assert_eq!(sf12.release_date, NaiveDate::from_ymd_opt(2020, 9, 2).unwrap());
        assert!(!EngineVersion::lookup(11).unwrap().nnue);
        assert!(EngineVersion::lookup(8).is_err());
        assert_eq!(EngineVersion::known_versions().len(), 7);
    }

    #[test]
    fn test_available_on() {
        let sf15 = EngineVersion::lookup(15).unwrap();
        assert!(!sf15.available_on(NaiveDate::from_ymd_opt(2021, 1, 1)));
        assert!(sf15.available_on(NaiveDate::from_ymd_opt(2022, 4, 18)));
        assert!(sf15.available_on(None));
    }

    #[test]
    fn test_search_limit() {
        let settings = EvaluationSettings {
            engine: "stockfish".into(),
            version: 15,
            threads: 1,
            hash_mb: 16,
            depth: 20,
            multi_pv: 3,
            nodes: "3M".parse().unwrap(),
            mode: SearchMode::Nodes,
        };
        assert_eq!(settings.search_limit(), SearchLimit::Nodes(3_000_000));

        let by_depth = EvaluationSettings {
            mode: SearchMode::Depth,
            ..settings
        };
        assert_eq!(by_depth.search_limit(), SearchLimit::Depth(20));
    }
}
