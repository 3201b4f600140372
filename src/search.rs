//! This module contains all functionality related to searching the
//! game tree.  The core of this functionality is a negamax
//! implementation with alpha-beta pruning and a quiescence extension
//! at the horizon.
//!
//! A transposition table (TT) is used to store results of previously
//! searched nodes.  The TT size is configurable.  The TT is stored
//! on the heap (in a Vec) and so should be sized with respect to the
//! available memory on the system.  Every entry records the depth it
//! was searched to and whether its score is exact or a bound, so a
//! shallow result can never pollute a deeper search.
//!
//! At the root the engine first consults the opening book; only when
//! no book line matches the game so far does it fall back to search.

use std::cmp::Reverse;

use chess::{ChessMove, Color};
use log::{debug, trace};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::book::OpeningBook;
use crate::error::{EngineError, EngineResult};
use crate::evaluate::{self, MATE_SCORE};
use crate::ordering;
use crate::position::Position;

// Default number of TT entries
const DEFAULT_NUM_TT_ENTRIES: usize = 1 << 20;

// When prioritizing moves, a bonus may be assigned to a move found
// in the transposition table.  A move stored from an exact score is
// the best known move in the position and goes first; a move that
// caused a beta cutoff goes next.  Both bonuses dwarf the heuristic
// move scores.
const TT_EXACT_PRIORITY_BONUS: i32 = 100_000;
const TT_CUTOFF_PRIORITY_BONUS: i32 = 50_000;

// TT Flag corresponding to a value
#[derive(Clone, Copy, PartialEq)]
enum TTFlag {

    // An exact value is one that falls between alpha and beta
    Exact,

    // A lower bound value is one that failed high and caused a
    // beta-cutoff -- the move was too good
    Lowerbound,

    // An upper bound value is one that failed low, meaning it didn't
    // rise to the level of an already found acceptable move
    Upperbound,
}

// An entry within the transposition table
#[derive(Clone, Copy)]
struct TTEntry {

    // Zobrist hash of the position at this node, used to recognize
    // index collisions between different positions
    zobrist_hash: u64,

    // The remaining search depth when this node was scored.  A probe
    // may only use the entry when this is at least the current
    // remaining depth.
    depth: u8,

    // The score at this node (caveated by the flag)
    score: i32,

    // Whether the score is exact, an upper bound, or a lower bound,
    // according to the alpha-beta window at store time
    flag: TTFlag,

    // The best move discovered at this node.  For an exact entry this
    // is the principal move; for a lower bound it is the cutoff move;
    // a fail-low entry has no best move.
    best_move: Option<ChessMove>,
}

// The main engine.  It owns the transposition table, the opening
// book, and the random source, and borrows the position only for the
// duration of a call.
pub struct SearchEngine {

    // The transposition table size in entries
    num_tt_entries: usize,

    // The transposition table
    transposition_table: Vec<Option<TTEntry>>,

    // Opening book consulted at the root, if any
    book: Option<OpeningBook>,

    // Random source for book line selection.  Injected so a seeded
    // engine plays reproducible openings.
    rng: StdRng,

    // Total nodes visited in the current search
    nodes_searched: u64,
}

impl SearchEngine {

    // Construct a new SearchEngine with the built-in book and an
    // unpredictable seed
    pub fn new() -> SearchEngine {
        SearchEngine {
            num_tt_entries: DEFAULT_NUM_TT_ENTRIES,
            transposition_table: vec![None; DEFAULT_NUM_TT_ENTRIES],
            book: Some(OpeningBook::builtin()),
            rng: StdRng::from_entropy(),
            nodes_searched: 0,
        }
    }

    // Use a fixed seed for book selection
    pub fn with_seed(mut self, seed: u64) -> SearchEngine {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    // Replace the opening book
    pub fn with_book(mut self, book: OpeningBook) -> SearchEngine {
        self.book = Some(book);
        self
    }

    // Disable the opening book entirely
    pub fn without_book(mut self) -> SearchEngine {
        self.book = None;
        self
    }

    // Resize the transposition table.  Each entry is small, but the
    // count should still respect available memory.
    pub fn with_tt_capacity(mut self, num_entries: usize) -> SearchEngine {
        assert!(num_entries > 0, "transposition table cannot be empty");
        self.num_tt_entries = num_entries;
        self.transposition_table = vec![None; num_entries];
        self
    }

    // Start a new game, discarding cached search results
    pub fn new_game(&mut self) {
        self.transposition_table.clear();
        self.transposition_table.resize(self.num_tt_entries, None);
        self.nodes_searched = 0;
    }

    // Nodes visited by the most recent best_move or search call
    pub fn nodes_searched(&self) -> u64 {
        self.nodes_searched
    }

    // This returns the engine's top move for the position at the
    // given search depth, in plies.  `history` is the game's move
    // sequence in SAN, used for opening book matching.  The position
    // is restored to its entry state before returning.
    pub fn best_move(
        &mut self,
        position: &mut Position,
        depth: u32,
        history: &[String],
    ) -> EngineResult<ChessMove> {
        assert!(depth > 0, "search depth must be at least 1");
        self.nodes_searched = 0;

        // Opening book lookup.  Only meaningful from the start
        // position or with a game history to match against.
        if !history.is_empty() || position.is_startpos() {
            if let Some(book) = &self.book {
                if let Some((name, san)) = book.pick(history, &mut self.rng) {
                    if let Ok(book_move) = position.parse_san(&san) {
                        debug!("book move {} from \"{}\"", san, name);
                        return Ok(book_move);
                    }
                }
            }
        }

        let mut moves = position.legal_moves();
        if moves.is_empty() {
            return Err(EngineError::NoLegalMove);
        }
        self.sort_moves(position, &mut moves);

        // Search every root move with a full window.  Strict
        // comparison keeps the first of score-tied moves in the
        // deterministic sorted order.
        let mut best_move = moves[0];
        let mut best_score = -MATE_SCORE;
        for m in moves {
            let mut scoped = position.play(m);
            let score = -self.search_score(&mut scoped, depth - 1, -MATE_SCORE, MATE_SCORE, 1);
            trace!("root move {}: {}", m, score);
            if score > best_score {
                best_score = score;
                best_move = m;
            }
        }

        debug!(
            "best move {} score {} after {} nodes",
            best_move, best_score, self.nodes_searched
        );
        Ok(best_move)
    }

    // This is an implementation of negamax with alpha-beta pruning
    // and is the core of the engine's search routine.  Scores are
    // from the perspective of the side to move.  `ply` is the
    // distance from the root, used to prefer shorter mates.
    // See https://en.wikipedia.org/wiki/Negamax
    fn search_score(
        &mut self,
        position: &mut Position,
        depth: u32,
        mut alpha: i32,
        mut beta: i32,
        ply: i32,
    ) -> i32 {
        self.nodes_searched += 1;
        let alpha_orig = alpha;

        // Check the transposition table for a cached result.  The
        // entry must match the full hash, have been searched at least
        // as deep as we need, and hold a bound compatible with the
        // current window.  Its best move seeds ordering either way.
        let hash = position.hash();
        let tt_key = (hash % self.num_tt_entries as u64) as usize;
        let mut tt_move = None;
        if let Some(entry) = self.transposition_table[tt_key] {
            if entry.zobrist_hash == hash {
                tt_move = entry.best_move;
                if entry.depth as u32 >= depth {
                    match entry.flag {
                        TTFlag::Exact => return entry.score,
                        TTFlag::Lowerbound => alpha = alpha.max(entry.score),
                        TTFlag::Upperbound => beta = beta.min(entry.score),
                    }
                    if alpha >= beta {
                        return entry.score;
                    }
                }
            }
        }

        // Draw rules that don't depend on having moves
        if position.is_insufficient_material()
            || position.is_fivefold_repetition()
            || position.is_seventyfive_moves()
        {
            return 0;
        }

        // Checkmate and stalemate.  Mate is offset by the ply so the
        // search prefers the shortest mate it can force.
        let mut moves = position.legal_moves();
        if moves.is_empty() {
            return if position.is_check() {
                -MATE_SCORE + ply
            } else {
                0
            };
        }

        // At the horizon, resolve captures before trusting the
        // static evaluation
        if depth == 0 {
            let score = self.quiescence(position, alpha, beta);
            self.store(tt_key, hash, 0, score, alpha_orig, beta);
            return score;
        }

        self.sort_moves_with_hint(position, &mut moves, tt_move);

        let mut best_move = None;
        for m in moves {
            let mut scoped = position.play(m);
            let score = -self.search_score(&mut scoped, depth - 1, -beta, -alpha, ply + 1);
            drop(scoped);
            if score >= beta {
                // Fail high: the opponent would never allow this
                // branch, so beta is a lower bound on the true score
                self.transposition_table[tt_key] = Some(TTEntry {
                    zobrist_hash: hash,
                    depth: depth as u8,
                    score: beta,
                    flag: TTFlag::Lowerbound,
                    best_move: Some(m),
                });
                return beta;
            }
            if score > alpha {
                alpha = score;
                best_move = Some(m);
            }
        }

        // Either an exact score, or a fail low where every move was
        // worse than something we already had
        let flag = if alpha > alpha_orig {
            TTFlag::Exact
        } else {
            TTFlag::Upperbound
        };
        self.transposition_table[tt_key] = Some(TTEntry {
            zobrist_hash: hash,
            depth: depth as u8,
            score: alpha,
            flag,
            best_move,
        });
        alpha
    }

    // This is an implementation of the quiescence search, which keeps
    // searching capture moves beyond the horizon.  This mitigates the
    // horizon effect, where a bad exchange is pushed just past the
    // edge of the search and never seen.  Capture chains strictly
    // shrink the material on the board, so the recursion terminates.
    // See https://www.chessprogramming.org/Quiescence_Search
    fn quiescence(&mut self, position: &mut Position, mut alpha: i32, beta: i32) -> i32 {
        self.nodes_searched += 1;

        // Stand pat: the side to move can usually decline to capture,
        // so the static score bounds the node from below.  Terminal
        // positions (mate, draws) are scored by the evaluator.
        let white_score = evaluate::static_evaluation(position);
        let stand_pat = match position.side_to_move() {
            Color::White => white_score,
            Color::Black => -white_score,
        };
        if stand_pat >= beta {
            return beta;
        }
        if stand_pat > alpha {
            alpha = stand_pat;
        }

        let mut captures: Vec<ChessMove> = position
            .legal_moves()
            .into_iter()
            .filter(|m| position.is_capture(*m))
            .collect();
        ordering::order_moves(position, &mut captures);

        for m in captures {
            let mut scoped = position.play(m);
            let score = -self.quiescence(&mut scoped, -beta, -alpha);
            drop(scoped);
            if score >= beta {
                return beta;
            }
            if score > alpha {
                alpha = score;
            }
        }

        alpha
    }

    // Store a horizon result with the bound implied by the window
    fn store(&mut self, tt_key: usize, hash: u64, depth: u8, score: i32, alpha: i32, beta: i32) {
        let flag = if score <= alpha {
            TTFlag::Upperbound
        } else if score >= beta {
            TTFlag::Lowerbound
        } else {
            TTFlag::Exact
        };
        self.transposition_table[tt_key] = Some(TTEntry {
            zobrist_hash: hash,
            depth,
            score,
            flag,
            best_move: None,
        });
    }

    // Sort moves, looking up any move remembered for this position
    fn sort_moves(&self, position: &Position, moves: &mut [ChessMove]) {
        let hash = position.hash();
        let tt_key = (hash % self.num_tt_entries as u64) as usize;
        let mut tt_move = None;
        if let Some(entry) = self.transposition_table[tt_key] {
            if entry.zobrist_hash == hash {
                tt_move = entry.best_move;
            }
        }
        self.sort_moves_with_hint(position, moves, tt_move);
    }

    // This sorts moves, in place, with the highest priority moves
    // first.  Priority from high to low is: (1) the move remembered
    // by the transposition table, (2) the heuristic ordering of
    // captures, promotions, and checks, and (3) quiet moves.
    fn sort_moves_with_hint(
        &self,
        position: &Position,
        moves: &mut [ChessMove],
        tt_move: Option<ChessMove>,
    ) {
        let hash = position.hash();
        let tt_key = (hash % self.num_tt_entries as u64) as usize;
        let mut bonus_flag = None;
        if let Some(entry) = self.transposition_table[tt_key] {
            if entry.zobrist_hash == hash {
                bonus_flag = Some(entry.flag);
            }
        }
        let bonus = match bonus_flag {
            Some(TTFlag::Exact) => TT_EXACT_PRIORITY_BONUS,
            Some(TTFlag::Lowerbound) => TT_CUTOFF_PRIORITY_BONUS,
            _ => 0,
        };
        moves.sort_by_key(|&m| {
            let mut priority = ordering::move_score(position, m);
            if Some(m) == tt_move {
                priority += bonus;
            }
            Reverse(priority)
        });
    }
}

impl Default for SearchEngine {
    fn default() -> SearchEngine {
        SearchEngine::new()
    }
}

// =====================================
//             UNIT TESTS
// =====================================
