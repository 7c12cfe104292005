//! PGN ingestion and move-text replay on top of `pgn-reader`.

use std::io::Read;
use std::ops::ControlFlow;

use pgn_reader::{RawTag, Reader, SanPlus, Visitor};
use shakmaty::{CastlingMode, Chess, Position};
use tracing::{debug, warn};

use crate::board::{fen_of, ChessBoard};
use crate::error::GameError;
use crate::game_data::{GameInfo, GameRecord};

pub const STANDARD_START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Games read from one PGN source.
#[derive(Debug, Default)]
pub struct GameSet {
    pub games: Vec<GameRecord>,
    /// Games rejected by validation.
    pub invalid: usize,
}

impl GameSet {
    /// Keep only the last `limit` games (0 keeps everything).
    pub fn keep_last(&mut self, limit: usize) {
        if limit > 0 && self.games.len() > limit {
            let excess = self.games.len() - limit;
            self.games.drain(..excess);
        }
    }

    pub fn extend(&mut self, other: GameSet) {
        self.games.extend(other.games);
        self.invalid += other.invalid;
    }
}

/// Read every game from a PGN stream, skipping (and counting) invalid ones.
pub fn read_games<R: Read>(reader: R) -> Result<GameSet, GameError> {
    let mut pgn_reader = Reader::new(reader);
    let mut collector = GameCollector;
    let mut set = GameSet::default();

    while let Some(outcome) = pgn_reader.read_game(&mut collector)? {
        match outcome {
            Ok(game) => {
                debug!(game = %game.info.describe(), plies = game.moves.len(), "Accepted game");
                set.games.push(game);
            }
            Err(e) => {
                warn!(error = %e, "Skipping invalid game");
                set.invalid += 1;
            }
        }
    }

    Ok(set)
}

/// Parse and validate the first game of a PGN string.
pub fn parse_game(pgn: &str) -> Result<GameRecord, GameError> {
    let mut pgn_reader = Reader::new(pgn.as_bytes());
    pgn_reader
        .read_game(&mut GameCollector)?
        .unwrap_or(Err(GameError::NoGame))
}

/// Boards reached while replaying exported move text.
#[derive(Debug, Clone)]
pub struct Replay {
    /// Starting board plus the board after every ply.
    pub boards: Vec<ChessBoard>,
    /// Played moves in UCI notation.
    pub moves: Vec<String>,
}

/// Replay SAN move text (as stored in [`GameRecord::movetext`]) from the
/// standard starting position.
pub fn replay_movetext(movetext: &str) -> Result<Replay, GameError> {
    let mut pgn_reader = Reader::new(movetext.as_bytes());
    pgn_reader
        .read_game(&mut ReplayVisitor)?
        .unwrap_or(Err(GameError::NoGame))
}

/// Validate the tag section, returning `Some(error)` when the game must be rejected.
fn validate_tags(tags: &[(String, String)]) -> Option<GameError> {
    for (name, value) in tags {
        match name.as_str() {
            "FEN" if value.trim() != STANDARD_START_FEN => {
                return Some(GameError::NonStandardStart(value.clone()));
            }
            "Variant" => {
                let variant = value.trim().to_ascii_lowercase();
                if !matches!(variant.as_str(), "" | "standard" | "chess") {
                    return Some(GameError::NonStandardStart(value.clone()));
                }
            }
            "WhiteElo" | "BlackElo" => {
                if parse_elo(value).is_err() {
                    return Some(GameError::MalformedHeader {
                        name: name.clone(),
                        value: value.clone(),
                    });
                }
            }
            _ => {}
        }
    }
    None
}

/// Elo tags use `?` or `-` (or nothing) for unknown ratings.
fn parse_elo(value: &str) -> Result<Option<u32>, std::num::ParseIntError> {
    let value = value.trim();
    if value.is_empty() || value == "?" || value == "-" {
        return Ok(None);
    }
    value.parse().map(Some)
}

fn info_from_tags(tags: &[(String, String)]) -> GameInfo {
    let mut info = GameInfo {
        white: "?".to_string(),
        black: "?".to_string(),
        result: "*".to_string(),
        ..Default::default()
    };
    for (name, value) in tags {
        let value = value.trim().to_string();
        match name.as_str() {
            "White" => info.white = value,
            "Black" => info.black = value,
            "Result" => info.result = value,
            "Date" => info.date = Some(value),
            "Event" => info.event = Some(value),
            "Round" => info.round = Some(value),
            "ECO" => info.eco = Some(value),
            "WhiteElo" => info.white_elo = parse_elo(&value).ok().flatten(),
            "BlackElo" => info.black_elo = parse_elo(&value).ok().flatten(),
            _ => {}
        }
    }
    info
}

/// Move text state while a game is being read.
struct GameBuilder {
    tags: Vec<(String, String)>,
    pos: Chess,
    sans: Vec<String>,
    moves: Vec<String>,
    positions: Vec<String>,
}

impl GameBuilder {
    fn new(tags: Vec<(String, String)>) -> Self {
        let pos = Chess::default();
        let positions = vec![fen_of(&pos)];
        Self {
            tags,
            pos,
            sans: Vec::new(),
            moves: Vec::new(),
            positions,
        }
    }

    fn push(&mut self, san_plus: SanPlus) -> Result<(), GameError> {
        let san_str = san_plus.to_string();
        let mv = san_plus.san.to_move(&self.pos).map_err(|_| GameError::IllegalMove {
            san: san_str.clone(),
            ply: self.moves.len() + 1,
        })?;

        self.moves.push(mv.to_uci(CastlingMode::Standard).to_string());
        self.pos.play_unchecked(mv);
        self.positions.push(fen_of(&self.pos));
        self.sans.push(san_str);
        Ok(())
    }

    fn finish(self) -> Result<GameRecord, GameError> {
        if self.moves.is_empty() {
            return Err(GameError::Empty);
        }

        let mut info = info_from_tags(&self.tags);
        info.ply = self.moves.len();
        let movetext = export_movetext(&self.sans, &info.result);

        Ok(GameRecord {
            info,
            headers: self.tags,
            movetext,
            moves: self.moves,
            positions: self.positions,
        })
    }
}

/// `1. e4 e5 2. Nf3 Nc6 1-0`
fn export_movetext(sans: &[String], result: &str) -> String {
    let mut text = String::new();
    for (i, san) in sans.iter().enumerate() {
        if !text.is_empty() {
            text.push(' ');
        }
        if i % 2 == 0 {
            text.push_str(&format!("{}. ", i / 2 + 1));
        }
        text.push_str(san);
    }
    if !result.is_empty() {
        text.push(' ');
        text.push_str(result);
    }
    text
}

/// Visitor producing one validated [`GameRecord`] per game.
struct GameCollector;

impl Visitor for GameCollector {
    type Tags = Vec<(String, String)>;
    type Movetext = GameBuilder;
    type Output = Result<GameRecord, GameError>;

    fn begin_tags(&mut self) -> ControlFlow<Self::Output, Self::Tags> {
        ControlFlow::Continue(Vec::new())
    }

    fn tag(
        &mut self,
        tags: &mut Self::Tags,
        name: &[u8],
        value: RawTag<'_>,
    ) -> ControlFlow<Self::Output> {
        tags.push((
            String::from_utf8_lossy(name).into_owned(),
            value.decode_utf8_lossy().into_owned(),
        ));
        ControlFlow::Continue(())
    }

    fn begin_movetext(&mut self, tags: Self::Tags) -> ControlFlow<Self::Output, Self::Movetext> {
        match validate_tags(&tags) {
            Some(e) => ControlFlow::Break(Err(e)),
            None => ControlFlow::Continue(GameBuilder::new(tags)),
        }
    }

    fn san(&mut self, movetext: &mut Self::Movetext, san_plus: SanPlus) -> ControlFlow<Self::Output> {
        match movetext.push(san_plus) {
            Ok(()) => ControlFlow::Continue(()),
            Err(e) => ControlFlow::Break(Err(e)),
        }
    }

    fn end_game(&mut self, movetext: Self::Movetext) -> Self::Output {
        movetext.finish()
    }
}

/// Visitor replaying bare move text.
struct ReplayVisitor;

impl Visitor for ReplayVisitor {
    type Tags = ();
    type Movetext = (Chess, Replay);
    type Output = Result<Replay, GameError>;

    fn begin_tags(&mut self) -> ControlFlow<Self::Output, Self::Tags> {
        ControlFlow::Continue(())
    }

    fn begin_movetext(&mut self, _: Self::Tags) -> ControlFlow<Self::Output, Self::Movetext> {
        let pos = Chess::default();
        let replay = Replay {
            boards: vec![ChessBoard::new(pos.clone())],
            moves: Vec::new(),
        };
        ControlFlow::Continue((pos, replay))
    }

    fn san(&mut self, movetext: &mut Self::Movetext, san_plus: SanPlus) -> ControlFlow<Self::Output> {
        let (pos, replay) = movetext;
        let san_str = san_plus.to_string();
        match san_plus.san.to_move(&*pos) {
            Ok(mv) => {
                replay.moves.push(mv.to_uci(CastlingMode::Standard).to_string());
                pos.play_unchecked(mv);
                replay.boards.push(ChessBoard::new(pos.clone()));
                ControlFlow::Continue(())
            }
            Err(_) => ControlFlow::Break(Err(GameError::IllegalMove {
                san: san_str,
                ply: replay.moves.len() + 1,
            })),
        }
    }

    fn end_game(&mut self, movetext: Self::Movetext) -> Self::Output {
        Ok(movetext.1)
    }
}
