//! This module contains functions related to game state evaluation.
//!
//! Evaluation is static: it scores a single quiescent position from
//! White's point of view (positive means White is better).  The score
//! blends material, piece-square bonuses, and an endgame term that
//! herds the defending king toward the edge of the board.  Searches
//! that want the side-to-move perspective negate the result.

use chess::{Color, Piece, ALL_PIECES};

use crate::pieces;
use crate::position::Position;

// Score for a checkmate against the side to move.  Mate in N plies
// is encoded as MATE_SCORE - N so shorter mates score higher.
pub const MATE_SCORE: i32 = 100_000;

// Non-pawn material of two rooks, a bishop, and a knight; below this
// the endgame weight starts rising toward 1
const ENDGAME_MATERIAL_START: i32 =
    2 * pieces::ROOK_VALUE + pieces::BISHOP_VALUE + pieces::KNIGHT_VALUE;

// A side must be ahead by this much material before the king-herding
// term applies
const MOP_UP_MARGIN: i32 = 2 * pieces::PAWN_VALUE;

// Statically evaluate the position, in centipawns from White's
// perspective.  This is a pure function of the position.
pub fn static_evaluation(position: &Position) -> i32 {

    // Terminal states short-circuit everything else.  A checkmated
    // side to move has lost; every drawn terminal scores zero.
    if position.is_checkmate() {
        return match position.side_to_move() {
            Color::White => -MATE_SCORE,
            Color::Black => MATE_SCORE,
        };
    }
    if position.is_stalemate()
        || position.is_insufficient_material()
        || position.is_fivefold_repetition()
        || position.is_seventyfive_moves()
    {
        return 0;
    }

    let endgame = is_endgame(position);
    let board = position.board();

    // Material and piece-square scan over the occupied squares
    let mut score = 0;
    let mut material = [0i32; 2];
    let mut non_pawn_material = [0i32; 2];
    for color in [Color::White, Color::Black] {
        let sign = if color == Color::White { 1 } else { -1 };
        for piece in ALL_PIECES {
            let table = pieces::piece_square_table(piece, endgame);
            let value = pieces::piece_value(piece);
            let squares = *board.pieces(piece) & *board.color_combined(color);
            for square in squares {
                material[color.to_index()] += value;
                if piece != Piece::Pawn {
                    non_pawn_material[color.to_index()] += value;
                }
                score += sign
                    * (value + table[pieces::table_index(square, color == Color::White)]);
            }
        }
    }

    // King herding: with a winning material edge in the endgame, pull
    // the kings together and drive the defender to the edge
    if endgame {
        let white = material[Color::White.to_index()];
        let black = material[Color::Black.to_index()];
        if white > black + MOP_UP_MARGIN {
            let weight = endgame_weight(non_pawn_material[Color::Black.to_index()]);
            score += mop_up_score(position, Color::White, weight);
        } else if black > white + MOP_UP_MARGIN {
            let weight = endgame_weight(non_pawn_material[Color::White.to_index()]);
            score -= mop_up_score(position, Color::Black, weight);
        }
    }

    score
}

// A position is an endgame once the heavy pieces thin out: no queens,
// at most one major, or exactly two majors with few minors.  The same
// definition is used everywhere so cached scores stay comparable.
pub fn is_endgame(position: &Position) -> bool {
    let board = position.board();
    let queens = board.pieces(Piece::Queen).popcnt();
    let majors = queens + board.pieces(Piece::Rook).popcnt();
    let minors = board.pieces(Piece::Knight).popcnt() + board.pieces(Piece::Bishop).popcnt();
    queens == 0 || majors <= 1 || (majors == 2 && minors < 3)
}

// Weight in [0, 1] that rises as the defender's non-pawn material
// disappears
fn endgame_weight(non_pawn_material: i32) -> f64 {
    1.0 - (non_pawn_material as f64 / ENDGAME_MATERIAL_START as f64).min(1.0)
}

// Herding bonus for the winning side: reward the defending king being
// far from the center and the kings being close together.  14 is the
// maximum Manhattan distance between squares on the board.
fn mop_up_score(position: &Position, winner: Color, weight: f64) -> i32 {
    let winner_king = position.king_square(winner);
    let loser_king = position.king_square(!winner);
    let center_distance = center_distance(loser_king);
    let king_distance = manhattan_distance(winner_king, loser_king);
    let raw = 10 * center_distance + 4 * (14 - king_distance);
    (raw as f64 * weight).round() as i32
}

// Manhattan distance from the four central squares
fn center_distance(square: chess::Square) -> i32 {
    let file = square.get_file().to_index() as i32;
    let rank = square.get_rank().to_index() as i32;
    (file - 3).abs().min((file - 4).abs()) + (rank - 3).abs().min((rank - 4).abs())
}

fn manhattan_distance(a: chess::Square, b: chess::Square) -> i32 {
    let df = a.get_file().to_index() as i32 - b.get_file().to_index() as i32;
    let dr = a.get_rank().to_index() as i32 - b.get_rank().to_index() as i32;
    df.abs() + dr.abs()
}

// =====================================
//             UNIT TESTS
// =====================================
