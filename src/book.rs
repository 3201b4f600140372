//! This module contains the opening book.
//!
//! The book maps opening names to sequences of moves in standard
//! algebraic notation.  When the moves played so far are a strict
//! prefix of at least one line, the engine can answer from the book
//! instead of searching.  Selection among matching lines is random,
//! with the random source injected by the caller so games can be
//! reproduced from a seed.

use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::Rng;

// Lines that are famous traps rather than openings worth repeating.
// A pick landing on one of these is re-rolled once, weighting the
// book away from them without removing them.
const TRAP_LINES: &[&str] = &["Barnes Opening: Fool's Mate"];

pub struct OpeningBook {

    // Opening name to SAN move sequence.  An ordered map keeps
    // prefix matching deterministic for a fixed seed.
    lines: BTreeMap<String, Vec<String>>,
}

impl OpeningBook {

    // Construct an empty book
    pub fn new() -> OpeningBook {
        OpeningBook {
            lines: BTreeMap::new(),
        }
    }

    // Construct the built-in book of mainstream lines
    pub fn builtin() -> OpeningBook {
        let mut book = OpeningBook::new();
        book.insert("Italian Game", &["e4", "e5", "Nf3", "Nc6", "Bc4"]);
        book.insert("Ruy Lopez", &["e4", "e5", "Nf3", "Nc6", "Bb5"]);
        book.insert(
            "Ruy Lopez: Morphy Defence",
            &["e4", "e5", "Nf3", "Nc6", "Bb5", "a6", "Ba4"],
        );
        book.insert(
            "Sicilian Defence",
            &["e4", "c5", "Nf3", "d6", "d4", "cxd4", "Nxd4", "Nf6"],
        );
        book.insert(
            "Sicilian Defence: Najdorf Variation",
            &["e4", "c5", "Nf3", "d6", "d4", "cxd4", "Nxd4", "Nf6", "Nc3", "a6"],
        );
        book.insert("French Defence", &["e4", "e6", "d4", "d5"]);
        book.insert("Caro-Kann Defence", &["e4", "c6", "d4", "d5"]);
        book.insert("Queen's Gambit", &["d4", "d5", "c4"]);
        book.insert(
            "Queen's Gambit Declined",
            &["d4", "d5", "c4", "e6", "Nc3", "Nf6"],
        );
        book.insert("Slav Defence", &["d4", "d5", "c4", "c6"]);
        book.insert(
            "King's Indian Defence",
            &["d4", "Nf6", "c4", "g6", "Nc3", "Bg7"],
        );
        book.insert("London System", &["d4", "d5", "Nf3", "Nf6", "Bf4"]);
        book.insert("English Opening", &["c4", "e5", "Nc3", "Nf6"]);
        book.insert("Barnes Opening: Fool's Mate", &["f3", "e5", "g4", "Qh4#"]);
        book
    }

    // Add or replace a line
    pub fn insert(&mut self, name: &str, moves: &[&str]) {
        self.lines.insert(
            name.to_string(),
            moves.iter().map(|m| m.to_string()).collect(),
        );
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    // All lines the played move sequence is a strict prefix of
    pub fn prefix_match(&self, history: &[String]) -> Vec<(&str, &[String])> {
        self.lines
            .iter()
            .filter(|(_, moves)| {
                moves.len() > history.len() && moves[..history.len()] == *history
            })
            .map(|(name, moves)| (name.as_str(), moves.as_slice()))
            .collect()
    }

    // Pick the next book move for the given history, if any line
    // still matches.  Returns the line name and the move in SAN.
    pub fn pick(&self, history: &[String], rng: &mut impl Rng) -> Option<(String, String)> {
        let matching = self.prefix_match(history);
        let (mut name, mut moves) = *matching.choose(rng)?;
        if TRAP_LINES.contains(&name) {
            let reroll = *matching.choose(rng)?;
            name = reroll.0;
            moves = reroll.1;
        }
        let san = moves.get(history.len())?;
        Some((name.to_string(), san.clone()))
    }
}

impl Default for OpeningBook {
    fn default() -> OpeningBook {
        OpeningBook::new()
    }
}

// =====================================
//             UNIT TESTS
// =====================================
