pub mod board;
pub mod error;
pub mod game_data;
pub mod pgn;

pub use board::{BoardView, ChessBoard, Material, PieceKind, PlacedPiece, Side};
pub use error::GameError;
pub use game_data::{GameInfo, GameRecord};
