//! Narrow board abstraction used by the analysis code.
//!
//! Analysis only ever needs a handful of facts about a position, so it reads
//! them through [`BoardView`] instead of depending on shakmaty's types.

use serde::{Deserialize, Serialize};
use shakmaty::fen::Fen;
use shakmaty::{Chess, Color, EnPassantMode, Position, Role};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    #[default]
    White,
    Black,
}

impl Side {
    pub fn is_white(self) -> bool {
        self == Side::White
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PieceKind {
    Pawn,
    Knight,
    Bishop,
    Rook,
    Queen,
    King,
}

impl PieceKind {
    /// Standard material value (king counts as nothing).
    pub fn value(self) -> u32 {
        match self {
            PieceKind::Pawn => 1,
            PieceKind::Knight => 3,
            PieceKind::Bishop => 3,
            PieceKind::Rook => 5,
            PieceKind::Queen => 9,
            PieceKind::King => 0,
        }
    }
}

/// A piece standing on a square (0 = a1 .. 63 = h8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlacedPiece {
    pub square: u8,
    pub side: Side,
    pub kind: PieceKind,
}

pub trait BoardView {
    fn fen(&self) -> String;
    fn side_to_move(&self) -> Side;
    fn fullmove_number(&self) -> u32;
    fn legal_move_count(&self) -> usize;
    fn piece_map(&self) -> Vec<PlacedPiece>;
    fn is_check(&self) -> bool;
    fn is_checkmate(&self) -> bool;
    fn is_stalemate(&self) -> bool;
    fn is_insufficient_material(&self) -> bool;
}

/// Material per side, in pawn units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Material {
    pub white: u32,
    pub black: u32,
}

impl Material {
    pub fn of(board: &impl BoardView) -> Self {
        let mut material = Material::default();
        for piece in board.piece_map() {
            match piece.side {
                Side::White => material.white += piece.kind.value(),
                Side::Black => material.black += piece.kind.value(),
            }
        }
        material
    }

    pub fn to_pair(self) -> [u32; 2] {
        [self.white, self.black]
    }
}

/// [`BoardView`] over a shakmaty position.
#[derive(Debug, Clone, Default)]
pub struct ChessBoard(Chess);

impl ChessBoard {
    pub fn new(position: Chess) -> Self {
        Self(position)
    }

    pub fn position(&self) -> &Chess {
        &self.0
    }
}

impl From<Chess> for ChessBoard {
    fn from(position: Chess) -> Self {
        Self(position)
    }
}

fn side_of(color: Color) -> Side {
    match color {
        Color::White => Side::White,
        Color::Black => Side::Black,
    }
}

fn kind_of(role: Role) -> PieceKind {
    match role {
        Role::Pawn => PieceKind::Pawn,
        Role::Knight => PieceKind::Knight,
        Role::Bishop => PieceKind::Bishop,
        Role::Rook => PieceKind::Rook,
        Role::Queen => PieceKind::Queen,
        Role::King => PieceKind::King,
    }
}

/// FEN of a shakmaty position with the en passant square only when legal.
pub fn fen_of(pos: &Chess) -> String {
    Fen::from_position(pos, EnPassantMode::Legal).to_string()
}

impl BoardView for ChessBoard {
    fn fen(&self) -> String {
        fen_of(&self.0)
    }

    fn side_to_move(&self) -> Side {
        side_of(self.0.turn())
    }

    fn fullmove_number(&self) -> u32 {
        self.0.fullmoves().get()
    }

    fn legal_move_count(&self) -> usize {
        self.0.legal_moves().len()
    }

    fn piece_map(&self) -> Vec<PlacedPiece> {
        self.0
            .board()
            .iter()
            .map(|(square, piece)| PlacedPiece {
                square: u8::from(square),
                side: side_of(piece.color),
                kind: kind_of(piece.role),
            })
            .collect()
    }

    fn is_check(&self) -> bool {
        self.0.is_check()
    }

    fn is_checkmate(&self) -> bool {
        self.0.is_checkmate()
    }

    fn is_stalemate(&self) -> bool {
        self.0.is_stalemate()
    }

    fn is_insufficient_material(&self) -> bool {
        self.0.is_insufficient_material()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shakmaty::CastlingMode;

    fn board(fen: &str) -> ChessBoard {
        let fen: Fen = fen.parse().unwrap();
        ChessBoard::new(fen.into_position(CastlingMode::Standard).unwrap())
    }

    #[test]
    fn test_starting_position() {
        let start = ChessBoard::default();
        assert_eq!(
            start.fen(),
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1"
        );
        assert_eq!(start.legal_move_count(), 20);
        assert_eq!(start.side_to_move(), Side::White);
        assert_eq!(start.fullmove_number(), 1);
        assert_eq!(Material::of(&start), Material { white: 39, black: 39 });
    }

    #[test]
    fn test_position_flags() {
        // Fool's mate
        let mate = board("rnb1kbnr/pppp1ppp/8/4p3/6Pq/5P2/PPPPP2P/RNBQKBNR w KQkq - 1 3");
        assert!(mate.is_check());
        assert!(mate.is_checkmate());
        assert_eq!(mate.legal_move_count(), 0);

        let stalemate = board("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1");
        assert!(stalemate.is_stalemate());
        assert!(!stalemate.is_check());

        let bare_kings = board("8/8/4k3/8/8/3K4/8/8 w - - 0 1");
        assert!(bare_kings.is_insufficient_material());
    }

    #[test]
    fn test_material_ignores_kings() {
        let rook_ending = board("4k3/4p3/8/8/8/8/4P3/R3K3 w - - 0 40");
        assert_eq!(Material::of(&rook_ending).to_pair(), [6, 1]);
    }
}
