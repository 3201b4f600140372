//! This module contains the game position the engine searches.
//!
//! Board representation, legal move generation, and Zobrist hashing
//! come from the `chess` crate.  That crate is copy-make (applying a
//! move produces a new board), while the search wants make/unmake
//! semantics, so this wraps the board together with an undo stack and
//! the game state the base crate does not track: the halfmove clock,
//! the fullmove number, and the hash history used for repetition
//! detection.
//!
//! The undo stack must stay balanced.  An unmake without a matching
//! make means the position can no longer be trusted and panics.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::str::FromStr;

use chess::{
    get_bishop_moves, get_king_moves, get_knight_moves, get_pawn_attacks, get_rook_moves,
    BitBoard, Board, BoardStatus, ChessMove, Color, MoveGen, Piece, Square, EMPTY,
};

use crate::error::{EngineError, EngineResult};

// Bitboard of the dark squares, used by the insufficient material rule
const DARK_SQUARES: BitBoard = BitBoard(0xAA55_AA55_AA55_AA55);

// Game state snapshot taken before each move, for unmake purposes
#[derive(Debug)]
struct UndoRecord {
    board: Board,
    halfmove_clock: u32,
    fullmove_number: u32,
}

pub struct Position {

    // Current board state (pieces, castling rights, en passant,
    // side to move) and its Zobrist hash
    board: Board,

    // Halfmoves since the last capture or pawn move, for the
    // seventy-five-move rule
    halfmove_clock: u32,

    // Full move counter, incremented after each black move
    fullmove_number: u32,

    // Prior states, one per made move
    undo_stack: Vec<UndoRecord>,

    // Zobrist hash of every position seen since construction,
    // including the current one, for repetition counting
    hash_history: Vec<u64>,
}

impl Position {

    // Construct a position at the standard starting point
    pub fn start() -> Position {
        let board = Board::default();
        Position {
            board,
            halfmove_clock: 0,
            fullmove_number: 1,
            undo_stack: Vec::new(),
            hash_history: vec![board.get_hash()],
        }
    }

    // Construct a position from a FEN string.  The board fields are
    // parsed by the `chess` crate; the two clock fields are kept here.
    pub fn from_fen(fen: &str) -> EngineResult<Position> {
        let board = Board::from_str(fen).map_err(|_| EngineError::InvalidFen(fen.to_string()))?;
        let fields: Vec<&str> = fen.split_whitespace().collect();
        let halfmove_clock = fields.get(4).and_then(|f| f.parse().ok()).unwrap_or(0);
        let fullmove_number = fields.get(5).and_then(|f| f.parse().ok()).unwrap_or(1);
        Ok(Position {
            board,
            halfmove_clock,
            fullmove_number,
            undo_stack: Vec::new(),
            hash_history: vec![board.get_hash()],
        })
    }

    // The side to move
    pub fn side_to_move(&self) -> Color {
        self.board.side_to_move()
    }

    // Zobrist hash of the current position
    pub fn hash(&self) -> u64 {
        self.board.get_hash()
    }

    // True if this is the standard starting position
    pub fn is_startpos(&self) -> bool {
        self.board == Board::default()
    }

    pub fn halfmove_clock(&self) -> u32 {
        self.halfmove_clock
    }

    pub fn fullmove_number(&self) -> u32 {
        self.fullmove_number
    }

    // Generate all legal moves in the current position
    pub fn legal_moves(&self) -> Vec<ChessMove> {
        MoveGen::new_legal(&self.board).collect()
    }

    // Make a move.  The move must be legal; this is not re-checked
    // on the hot path.
    pub fn make(&mut self, mv: ChessMove) {
        let resets_clock = self.is_capture(mv)
            || self.board.piece_on(mv.get_source()) == Some(Piece::Pawn);
        self.undo_stack.push(UndoRecord {
            board: self.board,
            halfmove_clock: self.halfmove_clock,
            fullmove_number: self.fullmove_number,
        });
        self.board = self.board.make_move_new(mv);
        self.halfmove_clock = if resets_clock { 0 } else { self.halfmove_clock + 1 };
        if self.board.side_to_move() == Color::White {
            self.fullmove_number += 1;
        }
        self.hash_history.push(self.board.get_hash());
    }

    // Undo the most recent move
    pub fn unmake(&mut self) {
        let record = self
            .undo_stack
            .pop()
            .expect("unmake without a matching make; position is no longer trustworthy");
        self.board = record.board;
        self.halfmove_clock = record.halfmove_clock;
        self.fullmove_number = record.fullmove_number;
        self.hash_history.pop();
    }

    // Make a move under a scope guard.  The move is unmade when the
    // guard drops, so no return path can leave it half applied.
    pub fn play(&mut self, mv: ChessMove) -> MoveScope<'_> {
        self.make(mv);
        MoveScope { position: self }
    }

    // The piece and color on a square, if any
    pub fn piece_at(&self, square: Square) -> Option<(Piece, Color)> {
        let piece = self.board.piece_on(square)?;
        let color = self.board.color_on(square)?;
        Some((piece, color))
    }

    pub fn king_square(&self, color: Color) -> Square {
        self.board.king_square(color)
    }

    pub fn is_check(&self) -> bool {
        *self.board.checkers() != EMPTY
    }

    pub fn is_checkmate(&self) -> bool {
        self.board.status() == BoardStatus::Checkmate
    }

    pub fn is_stalemate(&self) -> bool {
        self.board.status() == BoardStatus::Stalemate
    }

    // Neither side can deliver mate: bare kings, a lone minor piece,
    // or a single bishop each with both bishops on one square color
    pub fn is_insufficient_material(&self) -> bool {
        let heavy = *self.board.pieces(Piece::Pawn)
            | *self.board.pieces(Piece::Rook)
            | *self.board.pieces(Piece::Queen);
        if heavy != EMPTY {
            return false;
        }
        let knights = *self.board.pieces(Piece::Knight);
        let bishops = *self.board.pieces(Piece::Bishop);
        let minors = knights | bishops;
        if minors.popcnt() <= 1 {
            return true;
        }
        if knights != EMPTY {
            return false;
        }
        let white_bishops = bishops & *self.board.color_combined(Color::White);
        let black_bishops = bishops & *self.board.color_combined(Color::Black);
        if white_bishops.popcnt() <= 1 && black_bishops.popcnt() <= 1 {
            let dark = (bishops & DARK_SQUARES).popcnt();
            return dark == 0 || dark == bishops.popcnt();
        }
        false
    }

    // Count how many times the current position has occurred,
    // including this occurrence
    pub fn repetition_count(&self) -> usize {
        let hash = self.board.get_hash();
        self.hash_history.iter().filter(|h| **h == hash).count()
    }

    pub fn is_fivefold_repetition(&self) -> bool {
        self.repetition_count() >= 5
    }

    pub fn is_seventyfive_moves(&self) -> bool {
        self.halfmove_clock >= 150
    }

    // True if the game has ended by mate or by a forced draw rule
    pub fn is_game_over(&self) -> bool {
        self.board.status() != BoardStatus::Ongoing
            || self.is_insufficient_material()
            || self.is_fivefold_repetition()
            || self.is_seventyfive_moves()
    }

    // True if the move captures, including en passant (a pawn that
    // changes file onto an empty square)
    pub fn is_capture(&self, mv: ChessMove) -> bool {
        if self.board.color_on(mv.get_dest()) == Some(!self.board.side_to_move()) {
            return true;
        }
        self.board.piece_on(mv.get_source()) == Some(Piece::Pawn)
            && mv.get_source().get_file() != mv.get_dest().get_file()
            && self.board.piece_on(mv.get_dest()).is_none()
    }

    // The piece captured by the move.  En passant always takes a pawn.
    pub fn captured_piece(&self, mv: ChessMove) -> Option<Piece> {
        if self.board.color_on(mv.get_dest()) == Some(!self.board.side_to_move()) {
            return self.board.piece_on(mv.get_dest());
        }
        if self.is_capture(mv) {
            return Some(Piece::Pawn);
        }
        None
    }

    // True if the move leaves the opponent in check
    pub fn gives_check(&self, mv: ChessMove) -> bool {
        *self.board.make_move_new(mv).checkers() != EMPTY
    }

    // True if any piece of the given color attacks the square.  Uses
    // the reverse-attack trick: a square is attacked by a piece kind
    // if that piece kind, placed on the square, would reach one.
    pub fn is_attacked_by(&self, color: Color, square: Square) -> bool {
        let occupied = *self.board.combined();
        let them = *self.board.color_combined(color);
        let pawns = *self.board.pieces(Piece::Pawn) & them;
        if get_pawn_attacks(square, !color, pawns) != EMPTY {
            return true;
        }
        if get_knight_moves(square) & *self.board.pieces(Piece::Knight) & them != EMPTY {
            return true;
        }
        if get_king_moves(square) & *self.board.pieces(Piece::King) & them != EMPTY {
            return true;
        }
        let queens = *self.board.pieces(Piece::Queen);
        let rooks = (*self.board.pieces(Piece::Rook) | queens) & them;
        if get_rook_moves(square, occupied) & rooks != EMPTY {
            return true;
        }
        let bishops = (*self.board.pieces(Piece::Bishop) | queens) & them;
        get_bishop_moves(square, occupied) & bishops != EMPTY
    }

    // Parse a move in standard algebraic notation, tolerating check,
    // mate, and annotation suffixes
    pub fn parse_san(&self, san: &str) -> EngineResult<ChessMove> {
        let trimmed = san.trim_end_matches(['+', '#', '!', '?']);
        ChessMove::from_san(&self.board, trimmed)
            .map_err(|_| EngineError::InvalidMoveText(san.to_string()))
    }

    // Parse a move in UCI notation ("e2e4", "e7e8q") and check it is
    // legal here
    pub fn parse_uci(&self, uci: &str) -> EngineResult<ChessMove> {
        let mv = ChessMove::from_str(uci)
            .map_err(|_| EngineError::InvalidMoveText(uci.to_string()))?;
        if !self.board.legal(mv) {
            return Err(EngineError::InvalidMoveText(uci.to_string()));
        }
        Ok(mv)
    }

    // Write the position as a FEN string
    pub fn fen(&self) -> String {
        let mut fen = String::new();
        for rank in (0..8).rev() {
            let mut empty = 0;
            for file in 0..8 {
                let square = Square::make_square(
                    chess::Rank::from_index(rank),
                    chess::File::from_index(file),
                );
                match self.piece_at(square) {
                    Some((piece, color)) => {
                        if empty > 0 {
                            fen.push_str(&empty.to_string());
                            empty = 0;
                        }
                        fen.push(piece_char(piece, color));
                    }
                    None => empty += 1,
                }
            }
            if empty > 0 {
                fen.push_str(&empty.to_string());
            }
            if rank > 0 {
                fen.push('/');
            }
        }
        fen.push(' ');
        fen.push(match self.board.side_to_move() {
            Color::White => 'w',
            Color::Black => 'b',
        });
        fen.push(' ');
        fen.push_str(&castling_field(&self.board));
        fen.push(' ');
        fen.push_str(&en_passant_field(&self.board));
        fen.push_str(&format!(" {} {}", self.halfmove_clock, self.fullmove_number));
        fen
    }

    // Borrow the underlying board, for evaluation bitboard scans
    pub(crate) fn board(&self) -> &Board {
        &self.board
    }
}

impl fmt::Debug for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Position").field("fen", &self.fen()).finish()
    }
}

// A made move that is automatically unmade when dropped
pub struct MoveScope<'a> {
    position: &'a mut Position,
}

impl Deref for MoveScope<'_> {
    type Target = Position;

    fn deref(&self) -> &Position {
        self.position
    }
}

impl DerefMut for MoveScope<'_> {
    fn deref_mut(&mut self) -> &mut Position {
        self.position
    }
}

impl Drop for MoveScope<'_> {
    fn drop(&mut self) {
        self.position.unmake();
    }
}

fn piece_char(piece: Piece, color: Color) -> char {
    let c = match piece {
        Piece::Pawn => 'p',
        Piece::Knight => 'n',
        Piece::Bishop => 'b',
        Piece::Rook => 'r',
        Piece::Queen => 'q',
        Piece::King => 'k',
    };
    match color {
        Color::White => c.to_ascii_uppercase(),
        Color::Black => c,
    }
}

fn castling_field(board: &Board) -> String {
    let mut field = String::new();
    let white = board.castle_rights(Color::White);
    let black = board.castle_rights(Color::Black);
    if white.has_kingside() {
        field.push('K');
    }
    if white.has_queenside() {
        field.push('Q');
    }
    if black.has_kingside() {
        field.push('k');
    }
    if black.has_queenside() {
        field.push('q');
    }
    if field.is_empty() {
        field.push('-');
    }
    field
}

// The en passant target square from the mover's point of view.  Only
// the file of the stored square is trusted, since the crate tracks
// the double-moved pawn; the rank follows from the side to move.
fn en_passant_field(board: &Board) -> String {
    match board.en_passant() {
        Some(square) => {
            let file = (b'a' + square.get_file().to_index() as u8) as char;
            let rank = match board.side_to_move() {
                Color::White => '6',
                Color::Black => '3',
            };
            format!("{}{}", file, rank)
        }
        None => "-".to_string(),
    }
}

// =====================================
//             UNIT TESTS
// =====================================

#[cfg(test)]
mod tests {

    use super::*;

    // Play out a short game and walk it back, checking the hash and
    // FEN return to the starting state
    #[test]
    fn test_make_and_unmake_moves() {
        let game = ["e4", "e5", "Nf3", "Nc6", "Bc4", "Bc5", "O-O", "Nf6", "d4", "exd4"];
        let mut position = Position::start();
        let initial_hash = position.hash();
        let initial_fen = position.fen();
        for san in game {
            let mv = position.parse_san(san).unwrap();
            position.make(mv);
        }
        assert_ne!(position.hash(), initial_hash);
        for _ in game {
            position.unmake();
        }
        assert_eq!(position.hash(), initial_hash);
        assert_eq!(position.fen(), initial_fen);
    }

    #[test]
    fn test_start_fen() {
        let position = Position::start();
        assert_eq!(
            position.fen(),
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1"
        );
        assert!(position.is_startpos());
    }

    #[test]
    fn test_fen_round_trip() {
        let fens = [
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
            "r1bqkbnr/pppp1ppp/2n5/4p3/4P3/5N2/PPPP1PPP/RNBQKB1R w KQkq - 4 3",
            "8/8/8/4k3/8/8/8/R3K3 w Q - 0 1",
        ];
        for fen in fens {
            let position = Position::from_fen(fen).unwrap();
            assert_eq!(position.fen(), fen);
        }
    }

    #[test]
    fn test_invalid_fen_is_an_error() {
        assert!(Position::from_fen("not a fen").is_err());
    }

    // En passant shows up as a capture onto an empty square
    #[test]
    fn test_en_passant_is_a_capture() {
        let mut position = Position::start();
        for san in ["e4", "a6", "e5", "f5"] {
            let mv = position.parse_san(san).unwrap();
            position.make(mv);
        }
        let ep = position.parse_san("exf6").unwrap();
        assert!(position.is_capture(ep));
        assert_eq!(position.captured_piece(ep), Some(Piece::Pawn));
        assert!(position.piece_at(ep.get_dest()).is_none());
    }

    #[test]
    fn test_checkmate_and_stalemate_queries() {
        // Fool's mate
        let mated =
            Position::from_fen("rnb1kbnr/pppp1ppp/8/4p3/6Pq/5P2/PPPPP2P/RNBQKBNR w KQkq - 1 3")
                .unwrap();
        assert!(mated.is_checkmate());
        assert!(mated.is_check());
        assert!(mated.is_game_over());
        assert!(mated.legal_moves().is_empty());

        let stale = Position::from_fen("k7/2Q5/8/8/8/8/8/7K b - - 0 1").unwrap();
        assert!(stale.is_stalemate());
        assert!(!stale.is_check());
        assert!(stale.is_game_over());
    }

    #[test]
    fn test_insufficient_material() {
        let bare = Position::from_fen("8/8/4k3/8/8/3K4/8/8 w - - 0 1").unwrap();
        assert!(bare.is_insufficient_material());
        let knight = Position::from_fen("8/8/4k3/8/8/3KN3/8/8 w - - 0 1").unwrap();
        assert!(knight.is_insufficient_material());
        let rook = Position::from_fen("8/8/4k3/8/8/3KR3/8/8 w - - 0 1").unwrap();
        assert!(!rook.is_insufficient_material());
        // Opposite colored bishops can still mate
        let bishops = Position::from_fen("8/8/4kb2/8/8/2BK4/8/8 w - - 0 1").unwrap();
        assert!(!bishops.is_insufficient_material());
    }

    // Shuffle the knights back and forth until the start position has
    // been seen five times
    #[test]
    fn test_fivefold_repetition() {
        let mut position = Position::start();
        for _ in 0..4 {
            for uci in ["g1f3", "g8f6", "f3g1", "f6g8"] {
                let mv = position.parse_uci(uci).unwrap();
                position.make(mv);
            }
        }
        assert_eq!(position.repetition_count(), 5);
        assert!(position.is_fivefold_repetition());
        assert!(position.is_game_over());
    }

    #[test]
    fn test_seventyfive_move_rule() {
        let mut position =
            Position::from_fen("8/8/4k3/8/8/3K4/7R/8 w - - 149 120").unwrap();
        assert!(!position.is_seventyfive_moves());
        let mv = position.parse_uci("h2h1").unwrap();
        position.make(mv);
        assert!(position.is_seventyfive_moves());
        // A capture or pawn move resets the clock instead
        let mut position =
            Position::from_fen("8/8/4k3/7p/8/3K4/7R/8 w - - 149 120").unwrap();
        let mv = position.parse_uci("h2h5").unwrap();
        position.make(mv);
        assert_eq!(position.halfmove_clock(), 0);
    }

    #[test]
    fn test_attack_queries() {
        let position = Position::start();
        assert!(position.is_attacked_by(Color::White, Square::D3));
        assert!(position.is_attacked_by(Color::White, Square::F3));
        assert!(position.is_attacked_by(Color::Black, Square::F6));
        assert!(!position.is_attacked_by(Color::White, Square::E5));
        assert!(!position.is_attacked_by(Color::Black, Square::E4));
    }

    #[test]
    fn test_gives_check() {
        let position =
            Position::from_fen("rnbqkbnr/ppppp1pp/5p2/8/4P3/8/PPPP1PPP/RNBQKBNR w KQkq - 0 2")
                .unwrap();
        let check = position.parse_uci("d1h5").unwrap();
        assert!(position.gives_check(check));
        let quiet = position.parse_uci("d2d4").unwrap();
        assert!(!position.gives_check(quiet));
    }

    // The scope guard restores the position even on early exits
    #[test]
    fn test_move_scope_unmakes_on_drop() {
        let mut position = Position::start();
        let hash = position.hash();
        let mv = position.parse_uci("e2e4").unwrap();
        {
            let scoped = position.play(mv);
            assert_ne!(scoped.hash(), hash);
        }
        assert_eq!(position.hash(), hash);
    }

    #[test]
    #[should_panic(expected = "unmake without a matching make")]
    fn test_unbalanced_unmake_panics() {
        let mut position = Position::start();
        position.unmake();
    }

    #[test]
    fn test_parse_errors() {
        let position = Position::start();
        assert!(position.parse_san("Qh5").is_err());
        assert!(position.parse_san("garbage").is_err());
        assert!(position.parse_uci("e2e5").is_err());
        assert!(position.parse_uci("zz9").is_err());
        assert!(position.parse_san("Nf3").is_ok());
        assert!(position.parse_uci("e2e4").is_ok());
    }

    #[test]
    fn test_fullmove_counter() {
        let mut position = Position::start();
        assert_eq!(position.fullmove_number(), 1);
        position.make(position.parse_uci("e2e4").unwrap());
        assert_eq!(position.fullmove_number(), 1);
        position.make(position.parse_uci("e7e5").unwrap());
        assert_eq!(position.fullmove_number(), 2);
    }
}
