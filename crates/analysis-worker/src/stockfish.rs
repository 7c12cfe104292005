//! Stockfish engine wrapper using UCI protocol (async I/O)

use std::path::{Path, PathBuf};
use std::str::FromStr;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use tracing::{debug, info};

use crate::engine::{EngineLauncher, EngineSession};
use crate::error::WorkerError;
use crate::evaluation::{PositionEvaluation, PvLine, Score, Wdl};
use crate::settings::{EngineVersion, EvaluationSettings, SearchLimit};

/// Stockfish engine instance
pub struct StockfishEngine {
    process: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    log_file: Option<String>,
}

impl StockfishEngine {
    /// Spawn a Stockfish process and complete the UCI handshake
    pub async fn spawn(path: &Path, log_file: Option<String>) -> Result<Self, WorkerError> {
        let mut process = Command::new(path)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .spawn()
            .map_err(|e| {
                WorkerError::Engine(format!("Failed to spawn {}: {e}", path.display()))
            })?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| WorkerError::Engine("Stockfish stdin unavailable".into()))?;
        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| WorkerError::Engine("Stockfish stdout unavailable".into()))?;

        let mut engine = Self {
            process,
            stdin,
            stdout: BufReader::new(stdout),
            log_file,
        };

        engine.send("uci").await?;
        engine.wait_for("uciok").await?;

        Ok(engine)
    }

    /// Send a command to Stockfish
    async fn send(&mut self, cmd: &str) -> Result<(), WorkerError> {
        debug!(cmd, "SF <");
        self.stdin
            .write_all(format!("{cmd}\n").as_bytes())
            .await
            .map_err(|e| WorkerError::EngineCrashed(format!("Failed to write to Stockfish: {e}")))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| WorkerError::EngineCrashed(format!("Failed to flush stdin: {e}")))?;
        Ok(())
    }

    /// Read one line; end of stream means the process died.
    async fn read_line(&mut self) -> Result<String, WorkerError> {
        let mut line = String::new();
        let read = self
            .stdout
            .read_line(&mut line)
            .await
            .map_err(|e| WorkerError::EngineCrashed(format!("Failed to read from Stockfish: {e}")))?;
        if read == 0 {
            return Err(WorkerError::EngineCrashed(
                "Stockfish closed its output".into(),
            ));
        }
        let trimmed = line.trim().to_string();
        debug!(line = %trimmed, "SF >");
        Ok(trimmed)
    }

    /// Wait for a specific response line
    async fn wait_for(&mut self, expected: &str) -> Result<(), WorkerError> {
        loop {
            if self.read_line().await? == expected {
                return Ok(());
            }
        }
    }

    async fn set_option(&mut self, name: &str, value: impl std::fmt::Display) -> Result<(), WorkerError> {
        self.send(&format!("setoption name {name} value {value}")).await
    }
}

impl EngineSession for StockfishEngine {
    async fn configure(&mut self, settings: &EvaluationSettings) -> Result<(), WorkerError> {
        self.set_option("Threads", settings.threads).await?;
        self.set_option("Hash", settings.hash_mb).await?;
        self.set_option("MultiPV", settings.multi_pv).await?;
        self.set_option("UCI_ShowWDL", "true").await?;
        if let Some(log_file) = self.log_file.clone() {
            self.set_option("Debug Log File", log_file).await?;
        }
        self.send("isready").await?;
        self.wait_for("readyok").await
    }

    async fn evaluate(
        &mut self,
        fen: &str,
        limit: SearchLimit,
    ) -> Result<PositionEvaluation, WorkerError> {
        self.send(&format!("position fen {fen}")).await?;
        match limit {
            SearchLimit::Nodes(nodes) => self.send(&format!("go nodes {nodes}")).await?,
            SearchLimit::Depth(depth) => self.send(&format!("go depth {depth}")).await?,
        }

        let black_to_move = fen.split_whitespace().nth(1) == Some("b");
        let mut evaluation = PositionEvaluation::new(fen);

        loop {
            let line = self.read_line().await?;
            if line.starts_with("info") {
                if let Some(pv_line) = parse_info_line(&line) {
                    evaluation.lines.push(if black_to_move {
                        from_whites_view(pv_line)
                    } else {
                        pv_line
                    });
                }
            } else if line.starts_with("bestmove") {
                break;
            }
        }

        Ok(evaluation)
    }

    /// Send quit command and wait for process to exit
    async fn quit(mut self) {
        let _ = self.send("quit").await;
        let _ = self.process.wait().await;
    }
}

impl Drop for StockfishEngine {
    fn drop(&mut self) {
        // Best-effort synchronous kill in drop
        let _ = self.process.start_kill();
    }
}

/// Launches `<folder>/stockfish-<v>/stockfish-<v>` binaries.
#[derive(Debug, Clone)]
pub struct StockfishLauncher {
    pub binaries_folder: PathBuf,
    pub engine_log_file: Option<String>,
}

impl StockfishLauncher {
    pub fn new(binaries_folder: impl Into<PathBuf>, engine_log_file: Option<String>) -> Self {
        Self {
            binaries_folder: binaries_folder.into(),
            engine_log_file,
        }
    }

    pub fn binary_path(&self, version: u32) -> PathBuf {
        let name = format!("stockfish-{version}");
        self.binaries_folder.join(&name).join(&name)
    }
}

impl EngineLauncher for StockfishLauncher {
    type Session = StockfishEngine;

    async fn launch(&mut self, version: &EngineVersion) -> Result<StockfishEngine, WorkerError> {
        let path = self.binary_path(version.version);
        info!(version = version.version, path = %path.display(), "Starting Stockfish");
        StockfishEngine::spawn(&path, self.engine_log_file.clone()).await
    }
}

/// Flip a side-to-move report for a position with Black to move.
fn from_whites_view(mut line: PvLine) -> PvLine {
    line.score = line.score.map(Score::flipped);
    line.wdl = line.wdl.map(Wdl::flipped);
    line
}

/// Parse an exact `info ... pv ...` line. Bound and string lines yield `None`.
fn parse_info_line(line: &str) -> Option<PvLine> {
    let head = line.split(" pv ").next()?;
    if head.len() == line.len() || head.contains(" string ") {
        return None;
    }
    if head.contains("lowerbound") || head.contains("upperbound") {
        return None;
    }

    let score = match (parse_cp(head), parse_mate(head)) {
        (Some(cp), _) => Some(Score::Centipawns(cp)),
        (None, Some(mate)) => Some(Score::Mate(mate)),
        (None, None) => None,
    };

    Some(PvLine {
        rank: parse_multipv_index(head).unwrap_or(1),
        depth: parse_field(head, "depth")?,
        seldepth: parse_field(head, "seldepth"),
        nodes: parse_field(head, "nodes"),
        score,
        wdl: parse_wdl(head),
        pv: parse_pv(line),
    })
}

/// Value following `key` in an info line
fn parse_field<T: FromStr>(line: &str, key: &str) -> Option<T> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    for (i, part) in parts.iter().enumerate() {
        if *part == key && i + 1 < parts.len() {
            return parts[i + 1].parse().ok();
        }
    }
    None
}

/// Parse centipawn score from info line
fn parse_cp(line: &str) -> Option<i32> {
    parse_field(line, "cp")
}

/// Parse mate score from info line
fn parse_mate(line: &str) -> Option<i32> {
    parse_field(line, "mate")
}

/// Parse multipv index from info line
fn parse_multipv_index(line: &str) -> Option<u32> {
    parse_field(line, "multipv")
}

/// Parse `wdl W D L` from info line
fn parse_wdl(line: &str) -> Option<Wdl> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let at = parts.iter().position(|p| *p == "wdl")?;
    parts.get(at + 1..at + 4)?.join(" ").parse().ok()
}

/// Parse PV moves from info line
fn parse_pv(line: &str) -> Vec<String> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let mut in_pv = false;
    let mut moves = Vec::new();

    for part in parts {
        if part == "pv" {
            in_pv = true;
            continue;
        }
        if in_pv {
            // PV ends at next keyword or end of line
            if part.starts_with("bmc") || part == "string" {
                break;
            }
            moves.push(part.to_string());
        }
    }

    moves
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cp() {
        let line = "info depth 20 seldepth 25 multipv 1 score cp 35 nodes 100000 pv e2e4";
        assert_eq!(parse_cp(line), Some(35));
    }

    #[test]
    fn test_parse_mate() {
        let line = "info depth 20 score mate 3 nodes 100000 pv e2e4";
        assert_eq!(parse_mate(line), Some(3));
    }

    #[test]
    fn test_parse_pv() {
        let line = "info depth 20 score cp 35 pv e2e4 e7e5 g1f3";
        let pv = parse_pv(line);
        assert_eq!(pv, vec!["e2e4", "e7e5", "g1f3"]);
    }

    #[test]
    fn test_parse_info_line_with_wdl() {
        let line = "info depth 18 seldepth 24 multipv 2 score cp -12 wdl 40 880 80 nodes 2500000 nps 1200000 hashfull 312 tbhits 0 time 2080 pv d7d5 c2c4 e7e6";
        let parsed = parse_info_line(line).unwrap();
        assert_eq!(parsed.rank, 2);
        assert_eq!(parsed.depth, 18);
        assert_eq!(parsed.seldepth, Some(24));
        assert_eq!(parsed.nodes, Some(2_500_000));
        assert_eq!(parsed.score, Some(Score::Centipawns(-12)));
        assert_eq!(parsed.wdl, Some(Wdl::new(40, 880, 80)));
        assert_eq!(parsed.pv, vec!["d7d5", "c2c4", "e7e6"]);
    }

    #[test]
    fn test_parse_info_line_skips_non_pv_lines() {
        assert!(parse_info_line("info string NNUE evaluation using nn-6877cd24400e.nnue enabled").is_none());
        assert!(parse_info_line("info depth 10 currmove e2e4 currmovenumber 1").is_none());
        assert!(parse_info_line(
            "info depth 12 seldepth 15 multipv 1 score cp 40 lowerbound nodes 9000 pv e2e4"
        )
        .is_none());
    }

    #[test]
    fn test_black_to_move_normalized_to_white() {
        let line = parse_info_line("info depth 5 multipv 1 score cp 80 wdl 500 300 200 pv e7e5").unwrap();
        let white = from_whites_view(line);
        assert_eq!(white.score, Some(Score::Centipawns(-80)));
        assert_eq!(white.wdl, Some(Wdl::new(200, 300, 500)));
    }

    /// Answers the handshake and every search with two depths of one line.
    const ANSWERING_ENGINE: &str = r#"#!/bin/sh
while read -r cmd rest; do
  case "$cmd" in
    uci) echo "id name Scripted"; echo "uciok" ;;
    isready) echo "readyok" ;;
    go)
      echo "info string scripted search"
      echo "info depth 1 seldepth 1 multipv 1 score cp 20 wdl 300 500 200 nodes 20 pv e2e4"
      echo "info depth 2 seldepth 3 multipv 1 score cp 25 wdl 310 500 190 nodes 120 pv e2e4 e7e5"
      echo "bestmove e2e4" ;;
    quit) exit 0 ;;
  esac
done
"#;

    /// Completes the handshake, then dies as soon as it is asked to search.
    const DYING_ENGINE: &str = r#"#!/bin/sh
while read -r cmd rest; do
  case "$cmd" in
    uci) echo "uciok" ;;
    isready) echo "readyok" ;;
    go) exit 1 ;;
  esac
done
"#;

    #[cfg(unix)]
    fn install_engine(folder: &Path, version: u32, script: &str) {
        use std::os::unix::fs::PermissionsExt;

        let launcher = StockfishLauncher::new(folder, None);
        let path = launcher.binary_path(version);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    fn settings() -> EvaluationSettings {
        EvaluationSettings {
            engine: "stockfish".into(),
            version: 15,
            threads: 1,
            hash_mb: 16,
            depth: 20,
            multi_pv: 1,
            nodes: "1K".parse().unwrap(),
            mode: crate::settings::SearchMode::Nodes,
        }
    }

    // Both scripts are written before anything is spawned.
    #[cfg(unix)]
    #[tokio::test]
    async fn test_scripted_uci_process() {
        use crate::orchestrator::{MatrixConfig, Orchestrator};
        use crate::store::MemoryStore;
        use chess_core::pgn::parse_game;

        let answering = tempfile::tempdir().unwrap();
        let dying = tempfile::tempdir().unwrap();
        install_engine(answering.path(), 15, ANSWERING_ENGINE);
        install_engine(dying.path(), 15, DYING_ENGINE);
        let version = EngineVersion::lookup(15).unwrap();

        // Searches are parsed and Black's view is flipped to White's.
        let mut launcher = StockfishLauncher::new(answering.path(), None);
        let mut engine = launcher.launch(&version).await.unwrap();
        engine.configure(&settings()).await.unwrap();

        let start = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";
        let white = engine.evaluate(start, settings().search_limit()).await.unwrap();
        assert_eq!(white.lines.len(), 2);
        let best = white.best().unwrap();
        assert_eq!(best.depth, 2);
        assert_eq!(best.score, Some(Score::Centipawns(25)));
        assert_eq!(best.pv, vec!["e2e4", "e7e5"]);

        let after_e4 = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1";
        let black = engine.evaluate(after_e4, settings().search_limit()).await.unwrap();
        assert_eq!(black.best().unwrap().score, Some(Score::Centipawns(-25)));
        assert_eq!(black.best().unwrap().wdl, Some(Wdl::new(190, 500, 310)));
        engine.quit().await;

        // A process that exits mid-search is a crash, not an answer.
        let mut launcher = StockfishLauncher::new(dying.path(), None);
        let mut engine = launcher.launch(&version).await.unwrap();
        engine.configure(&settings()).await.unwrap();
        let err = engine.evaluate(start, settings().search_limit()).await.unwrap_err();
        assert!(err.is_crash(), "unexpected error: {err}");
        drop(engine);

        // The run gives up after the restart budget.
        let config = MatrixConfig {
            versions: vec![version],
            node_budgets: vec![settings().nodes],
            base_settings: settings(),
            max_restarts: 4,
            historical: false,
        };
        let mut orch = Orchestrator::new(launcher, MemoryStore::new(), config);
        let game = parse_game("1. e4 *").unwrap();
        let err = orch.run(&[game]).await.unwrap_err();
        assert!(matches!(err, WorkerError::CrashBudgetExhausted { restarts: 4 }));
        assert_eq!(orch.stats().engine_calls, 5);
        assert_eq!(orch.stats().restarts, 4);
    }

    #[test]
    fn test_binary_path() {
        let launcher = StockfishLauncher::new("/opt/stockfish", None);
        assert_eq!(
            launcher.binary_path(14),
            PathBuf::from("/opt/stockfish/stockfish-14/stockfish-14")
        );
    }
}
