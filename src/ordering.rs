//! This module contains move ordering heuristics.
//!
//! Alpha-beta pruning cuts the most when the best move is searched
//! first, so candidate moves are scored and sorted before the search
//! loops over them.  Captures are ranked by MVV-LVA (take the biggest
//! victim with the smallest attacker), promotions by the promoted
//! piece, moves onto defended squares are penalized, and checks get a
//! flat bonus.  Scores are side-neutral: negamax always wants the
//! best move for the side to move first, so no per-color flipping is
//! needed.
//! See https://www.chessprogramming.org/Move_Ordering

use std::cmp::Reverse;

use chess::ChessMove;

use crate::pieces;
use crate::position::Position;

// Capture gains are scaled up so a good capture outranks any
// positional bonus
const CAPTURE_FACTOR: i32 = 10;

// Flat bonus for checking moves
const CHECK_BONUS: i32 = 1000;

// Heuristic priority of a single move in the given position.  Higher
// scores are searched first.  The ordering is deterministic: equal
// scores keep the move generator's enumeration order.
pub fn move_score(position: &Position, mv: ChessMove) -> i32 {
    let mut score = 0;
    let mover = position.piece_at(mv.get_source()).map(|(piece, _)| piece);

    if let Some(victim) = position.captured_piece(mv) {
        let attacker = mover.map(pieces::piece_value).unwrap_or(0);
        score += CAPTURE_FACTOR * (pieces::piece_value(victim) - attacker);
    }

    if let Some(promotion) = mv.get_promotion() {
        score += pieces::piece_value(promotion);
    }

    // Walking into a defended square is usually losing; sort it late
    if let Some(piece) = mover {
        if position.is_attacked_by(!position.side_to_move(), mv.get_dest()) {
            score -= pieces::piece_value(piece);
        }
    }

    if position.gives_check(mv) {
        score += CHECK_BONUS;
    }

    score
}

// Sort moves in place, best candidates first.  The sort is stable so
// ties keep their generation order, making the result a total,
// deterministic order.
pub fn order_moves(position: &Position, moves: &mut [ChessMove]) {
    moves.sort_by_key(|&mv| Reverse(move_score(position, mv)));
}

// =====================================
//             UNIT TESTS
// =====================================
