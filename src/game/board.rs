//! Board and Terminal-State Evaluation
//!
//! The fixed 3x3 grid, the two marks, and the pure function that
//! classifies a board as won, drawn, or still in play.

use serde::{Serialize, Deserialize};

use crate::BOARD_CELLS;

// =============================================================================
// MARKS AND CELLS
// =============================================================================

/// A player's symbol on the board.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Mark {
    /// First mover, seat 0.
    X,
    /// Second mover, seat 1.
    O,
}

impl Mark {
    /// The other mark.
    #[inline]
    pub fn opponent(self) -> Mark {
        match self {
            Mark::X => Mark::O,
            Mark::O => Mark::X,
        }
    }

    /// Seat index of the player holding this mark.
    #[inline]
    pub fn seat(self) -> usize {
        match self {
            Mark::X => 0,
            Mark::O => 1,
        }
    }

    /// Mark held by the player in `seat` (0 or 1).
    pub fn from_seat(seat: usize) -> Option<Mark> {
        match seat {
            0 => Some(Mark::X),
            1 => Some(Mark::O),
            _ => None,
        }
    }
}

/// One board slot. `None` is an empty cell.
pub type Cell = Option<Mark>;

/// Row-major board, index 0 is top-left and 8 is bottom-right.
pub type Board = [Cell; BOARD_CELLS];

/// An empty board.
pub const EMPTY_BOARD: Board = [None; BOARD_CELLS];

// =============================================================================
// OUTCOME
// =============================================================================

/// Terminal classification of a match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "status", content = "mark", rename_all = "snake_case")]
pub enum Outcome {
    /// Still in play.
    #[default]
    Undecided,
    /// A mark completed a line (or the opponent forfeited on time).
    Winner(Mark),
    /// Board full with no completed line.
    Draw,
}

impl Outcome {
    /// True once the match is over.
    #[inline]
    pub fn is_decided(self) -> bool {
        !matches!(self, Outcome::Undecided)
    }

    /// Winning mark, if the match ended decisively.
    #[inline]
    pub fn winner(self) -> Option<Mark> {
        match self {
            Outcome::Winner(mark) => Some(mark),
            _ => None,
        }
    }
}

// =============================================================================
// EVALUATION
// =============================================================================

/// All winning lines in evaluation order: rows top to bottom,
/// columns left to right, then the two diagonals.
pub const WIN_LINES: [[usize; 3]; 8] = [
    // rows
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    // columns
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    // diagonals
    [0, 4, 8],
    [2, 4, 6],
];

/// Classify a board.
///
/// The first fully matched line wins. A board with no line and no empty
/// cell is a draw; anything else is undecided.
pub fn evaluate(board: &Board) -> Outcome {
    for [a, b, c] in WIN_LINES {
        if let Some(mark) = board[a] {
            if board[b] == Some(mark) && board[c] == Some(mark) {
                return Outcome::Winner(mark);
            }
        }
    }

    if board.iter().all(Option::is_some) {
        Outcome::Draw
    } else {
        Outcome::Undecided
    }
}

/// Number of occupied cells.
pub fn filled_cells(board: &Board) -> usize {
    board.iter().filter(|c| c.is_some()).count()
}
