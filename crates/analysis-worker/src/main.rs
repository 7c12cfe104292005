//! catchfish
//!
//! Evaluates PGN games against a matrix of Stockfish versions and node budgets,
//! caching every position, then analyses the stored evaluations.
//!
//! ```text
//! catchfish evaluate <pgn-glob>...          print one stored key per evaluated game
//! catchfish analyse <key> [--moves]         print the analysis of a stored game
//! catchfish run <pgn-glob>... [--moves]     evaluate, then analyse every stored game
//! ```

use std::fs::File;

use anyhow::{bail, Context};
use tracing::{info, warn};

use analysis_worker::analyzer::analyse_key;
use analysis_worker::cache::Cache;
use analysis_worker::config::{AnalysisConfig, WorkerConfig};
use analysis_worker::orchestrator::{MatrixConfig, Orchestrator, ResultKey};
use analysis_worker::stockfish::StockfishLauncher;
use analysis_worker::store::{CacheStore, MemoryStore, PgStore};
use chess_core::pgn::{read_games, GameSet};

enum Command {
    Evaluate { patterns: Vec<String> },
    Analyse { key: String },
    Run { patterns: Vec<String> },
}

/// Parse `<command> [args...] [--moves]` from CLI args
fn parse_args() -> anyhow::Result<(Command, bool)> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let include_moves = args.iter().any(|a| a == "--moves");
    let mut rest = args.into_iter().filter(|a| a != "--moves");

    let command = match rest.next().as_deref() {
        Some("evaluate") => Command::Evaluate {
            patterns: rest.collect(),
        },
        Some("run") => Command::Run {
            patterns: rest.collect(),
        },
        Some("analyse") | Some("analyze") => Command::Analyse {
            key: rest.next().context("analyse needs a result key")?,
        },
        _ => bail!("usage: catchfish evaluate|run <pgn-glob>... | analyse <key> [--moves]"),
    };
    Ok((command, include_moves))
}

/// Read every game from the files matching `patterns`.
fn load_games(patterns: &[String], limit: usize) -> anyhow::Result<GameSet> {
    if patterns.is_empty() {
        bail!("no PGN files given");
    }

    let mut set = GameSet::default();
    for pattern in patterns {
        for path in glob::glob(pattern).with_context(|| format!("bad pattern {pattern}"))? {
            let path = path?;
            let file = File::open(&path).with_context(|| format!("opening {}", path.display()))?;
            let games = read_games(file).with_context(|| format!("reading {}", path.display()))?;
            info!(
                file = %path.display(),
                games = games.games.len(),
                invalid = games.invalid,
                "Loaded PGN"
            );
            set.extend(games);
        }
    }
    set.keep_last(limit);
    Ok(set)
}

async fn evaluate<S: CacheStore>(
    config: &WorkerConfig,
    store: S,
    patterns: &[String],
) -> anyhow::Result<(Vec<ResultKey>, Cache<S>)> {
    let games = load_games(patterns, config.limit_games)?;
    info!(games = games.games.len(), invalid = games.invalid, "Games ready");

    let launcher = StockfishLauncher::new(&config.stockfish_folder, config.engine_log_file.clone());
    let matrix = MatrixConfig {
        versions: config.versions.clone(),
        node_budgets: config.node_budgets.clone(),
        base_settings: config.base_settings.clone(),
        max_restarts: config.max_restarts,
        historical: config.historical,
    };
    let mut orchestrator = Orchestrator::new(launcher, store, matrix);

    let keys = tokio::select! {
        result = orchestrator.run(&games.games) => result?,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, aborting evaluation run");
            bail!("interrupted");
        }
    };

    let stats = orchestrator.stats();
    info!(
        keys = keys.len(),
        engine_calls = stats.engine_calls,
        cache_hits = stats.cache_hits,
        restarts = stats.restarts,
        skipped_games = stats.skipped_games,
        "Evaluation done"
    );
    Ok((keys, orchestrator.into_cache()))
}

async fn analyse_all<S: CacheStore>(
    cache: &Cache<S>,
    keys: &[String],
    analysis: &AnalysisConfig,
) -> anyhow::Result<()> {
    for key in keys {
        let result = analyse_key(cache, key, analysis).await?;
        println!("{}", serde_json::to_string(&result)?);
    }
    Ok(())
}

async fn execute<S: CacheStore>(
    config: &WorkerConfig,
    store: S,
    command: Command,
    analysis: &AnalysisConfig,
) -> anyhow::Result<()> {
    match command {
        Command::Evaluate { patterns } => {
            let (keys, _) = evaluate(config, store, &patterns).await?;
            for key in keys {
                println!("{}", serde_json::to_string(&key)?);
            }
        }
        Command::Run { patterns } => {
            let (keys, cache) = evaluate(config, store, &patterns).await?;
            let keys: Vec<String> = keys.into_iter().map(|k| k.key).collect();
            analyse_all(&cache, &keys, analysis).await?;
        }
        Command::Analyse { key } => {
            analyse_all(&Cache::new(store), &[key], analysis).await?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    // Load .env file for local dev
    let _ = dotenvy::dotenv();

    let (command, include_moves) = parse_args()?;
    let config = WorkerConfig::load()?;
    let analysis = AnalysisConfig {
        include_moves,
        ..config.analysis.clone()
    };
    info!(
        versions = ?config.versions.iter().map(|v| v.version).collect::<Vec<_>>(),
        node_budgets = ?config.node_budgets.iter().map(|n| n.to_string()).collect::<Vec<_>>(),
        "Config loaded"
    );

    match &config.database_url {
        Some(url) => {
            let store = PgStore::connect(url).await?;
            info!("Postgres cache ready");
            execute(&config, store, command, &analysis).await
        }
        None => {
            if matches!(command, Command::Analyse { .. }) {
                bail!("DATABASE_URL must be set to analyse a stored result");
            }
            warn!("DATABASE_URL not set, using in-memory cache (results are not durable)");
            execute(&config, MemoryStore::new(), command, &analysis).await
        }
    }
}
