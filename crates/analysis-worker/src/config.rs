//! Worker configuration from environment variables

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::WorkerError;
use crate::settings::{EngineVersion, EvaluationSettings, NodeBudget, SearchMode};

/// Knobs of the analysis step.
#[derive(Clone, Debug, PartialEq)]
pub struct AnalysisConfig {
    /// Plies at the start of the game left out of the selected-moves statistics.
    pub warmup_plies: usize,
    /// Plies with this many legal moves or fewer are treated as forced.
    pub forced_move_threshold: usize,
    /// Shallowest depth that counts towards convergence.
    pub min_depth: u32,
    /// Attach per-move records to the output.
    pub include_moves: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            warmup_plies: 10,
            forced_move_threshold: 3,
            min_depth: 3,
            include_moves: false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct WorkerConfig {
    /// Folder holding `stockfish-<v>/stockfish-<v>` binaries
    pub stockfish_folder: PathBuf,

    /// Engine versions to evaluate with, in run order
    pub versions: Vec<EngineVersion>,

    /// Node budgets to evaluate with, in run order
    pub node_budgets: Vec<NodeBudget>,

    /// Settings shared by every matrix cell (version and nodes are overridden per cell)
    pub base_settings: EvaluationSettings,

    /// Forwarded to Stockfish as `Debug Log File`
    pub engine_log_file: Option<String>,

    /// Engine restarts allowed over a whole run
    pub max_restarts: u32,

    /// Skip versions released after the game was played
    pub historical: bool,

    /// Keep only the last N games (0 = all)
    pub limit_games: usize,

    /// Postgres cache; in-memory when unset
    pub database_url: Option<String>,

    pub analysis: AnalysisConfig,
}

impl WorkerConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, WorkerError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from any variable source. Every value is validated here.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, WorkerError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let stockfish_folder = var("STOCKFISH_FOLDER")
            .unwrap_or_else(|| "/usr/local/share/stockfish".to_string())
            .into();

        let versions = parse_list(&var("STOCKFISH_VERSIONS").unwrap_or_else(|| "15".into()), "STOCKFISH_VERSIONS")?
            .into_iter()
            .map(EngineVersion::lookup)
            .collect::<Result<Vec<_>, _>>()?;

        let node_budgets: Vec<NodeBudget> =
            parse_list(&var("NODE_BUDGETS").unwrap_or_else(|| "1M".into()), "NODE_BUDGETS")?;

        let mode: SearchMode = var("SEARCH_MODE")
            .unwrap_or_else(|| "nodes".into())
            .parse()?;

        let base_settings = EvaluationSettings {
            engine: "stockfish".to_string(),
            version: versions[0].version,
            threads: parse_or("ENGINE_THREADS", var("ENGINE_THREADS"), 1)?,
            hash_mb: parse_or("ENGINE_HASH_MB", var("ENGINE_HASH_MB"), 256)?,
            depth: parse_or("ENGINE_DEPTH", var("ENGINE_DEPTH"), 20)?,
            multi_pv: parse_or("ENGINE_MULTI_PV", var("ENGINE_MULTI_PV"), 5)?,
            nodes: node_budgets[0],
            mode,
        };
        if base_settings.multi_pv == 0 || base_settings.threads == 0 {
            return Err(WorkerError::Config(
                "ENGINE_MULTI_PV and ENGINE_THREADS must be positive".into(),
            ));
        }

        let historical = match var("HISTORICAL").as_deref().map(str::to_ascii_lowercase).as_deref() {
            None | Some("0") | Some("false") | Some("no") => false,
            Some("1") | Some("true") | Some("yes") => true,
            Some(other) => {
                return Err(WorkerError::Config(format!("HISTORICAL: invalid flag {other:?}")))
            }
        };

        Ok(Self {
            stockfish_folder,
            versions,
            node_budgets,
            base_settings,
            engine_log_file: var("ENGINE_LOG_FILE"),
            max_restarts: parse_or("MAX_ENGINE_RESTARTS", var("MAX_ENGINE_RESTARTS"), 200)?,
            historical,
            limit_games: parse_or("LIMIT_GAMES", var("LIMIT_GAMES"), 0)?,
            database_url: var("DATABASE_URL"),
            analysis: AnalysisConfig {
                warmup_plies: parse_or("ANALYSIS_WARMUP_PLIES", var("ANALYSIS_WARMUP_PLIES"), 10)?,
                forced_move_threshold: parse_or("ANALYSIS_FORCED_MOVES", var("ANALYSIS_FORCED_MOVES"), 3)?,
                min_depth: parse_or("ANALYSIS_MIN_DEPTH", var("ANALYSIS_MIN_DEPTH"), 3)?,
                include_moves: false,
            },
        })
    }
}

fn parse_or<T: FromStr>(name: &str, value: Option<String>, default: T) -> Result<T, WorkerError> {
    match value {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| WorkerError::Config(format!("{name}: invalid value {raw:?}"))),
    }
}

/// Comma separated, non-empty list.
fn parse_list<T: FromStr>(raw: &str, name: &str) -> Result<Vec<T>, WorkerError> {
    let items = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse()
                .map_err(|_| WorkerError::Config(format!("{name}: invalid entry {s:?}")))
        })
        .collect::<Result<Vec<T>, _>>()?;
    if items.is_empty() {
        return Err(WorkerError::Config(format!("{name} is empty")));
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<WorkerConfig, WorkerError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        WorkerConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.versions.len(), 1);
        assert_eq!(config.versions[0].version, 15);
        assert_eq!(config.node_budgets[0].nodes(), 1_000_000);
        assert_eq!(config.base_settings.multi_pv, 5);
        assert_eq!(config.base_settings.mode, SearchMode::Nodes);
        assert_eq!(config.max_restarts, 200);
        assert!(!config.historical);
        assert!(config.database_url.is_none());
        assert_eq!(config.analysis, AnalysisConfig::default());
    }

    #[test]
    fn test_matrix_lists() {
        let config = load(&[
            ("STOCKFISH_VERSIONS", "15, 14,12"),
            ("NODE_BUDGETS", "500K,3M"),
            ("HISTORICAL", "true"),
            ("ANALYSIS_MIN_DEPTH", "5"),
        ])
        .unwrap();
        let versions: Vec<u32> = config.versions.iter().map(|v| v.version).collect();
        assert_eq!(versions, vec![15, 14, 12]);
        assert_eq!(config.node_budgets[1].nodes(), 3_000_000);
        assert!(config.historical);
        assert_eq!(config.analysis.min_depth, 5);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(load(&[("STOCKFISH_VERSIONS", "16")]).is_err());
        assert!(load(&[("NODE_BUDGETS", "3X")]).is_err());
        assert!(load(&[("NODE_BUDGETS", ",")]).is_err());
        assert!(load(&[("SEARCH_MODE", "time")]).is_err());
        assert!(load(&[("ENGINE_THREADS", "many")]).is_err());
        assert!(load(&[("ENGINE_MULTI_PV", "0")]).is_err());
        assert!(load(&[("HISTORICAL", "maybe")]).is_err());
    }
}
