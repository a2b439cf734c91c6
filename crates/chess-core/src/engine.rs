//! Board Engine seam: the rules engine consumed by the record store and the
//! PGN replayer. Legality, check detection and move execution live behind it.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::snapshot::{
    BoardSnapshot, Bitboard, CastlingRights, Colour, PieceKind, SnapshotError, Spin,
    PIECE_TYPES, STATE_LEN,
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error("Invalid position: {0}")]
    InvalidPosition(String),

    #[error("Illegal move {from}-{to}: {reason}")]
    IllegalMove {
        from: String,
        to: String,
        reason: String,
    },
}

/// Result of a successful `BoardEngine::play` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayedMove {
    pub from: u8,
    pub to: u8,
    pub spin: Spin,
    pub captured: Option<Spin>,
    pub promotion: Option<PieceKind>,
    /// SAN including a trailing `+` or `#`.
    pub san: String,
}

pub trait BoardEngine {
    /// Back to the standard starting position, white to move.
    fn reset(&mut self);

    fn board_str(&self) -> String;
    fn set_board_str(&mut self, board: &str) -> Result<(), EngineError>;

    fn board_array(&self) -> [Bitboard; PIECE_TYPES];
    fn set_board_array(&mut self, pieces: [Bitboard; PIECE_TYPES]) -> Result<(), EngineError>;

    fn state_str(&self) -> String;
    fn set_state_str(&mut self, state: &str) -> Result<(), EngineError>;

    fn state_array(&self) -> [i32; STATE_LEN];
    fn set_state_array(&mut self, state: [i32; STATE_LEN]) -> Result<(), EngineError>;

    fn spin_at(&self, square: u8) -> Spin;

    fn active_colour(&self) -> Colour;
    fn set_active_colour(&mut self, colour: Colour);

    fn castling_availability(&self) -> CastlingRights;

    fn king_index(&self, colour: Colour) -> Option<u8>;

    fn is_king_check(&self, colour: Colour) -> bool;

    /// Destination squares reachable by the piece on `square`.
    fn potential_moves(&self, square: u8) -> Bitboard;

    /// Execute `from -> to`. With `validate` the move must be legal; with
    /// `commit == false` the position is left untouched (dry run).
    fn play(
        &mut self,
        from: u8,
        to: u8,
        promotion: Option<PieceKind>,
        validate: bool,
        commit: bool,
    ) -> Result<PlayedMove, EngineError>;

    /// The unique square in `candidates` holding `spin` that can legally
    /// reach `to`. `None` when zero or several pieces qualify.
    fn find_from_index(&self, to: u8, spin: Spin, candidates: Bitboard) -> Option<u8>;

    fn fen_char_from_spin(&self, spin: Spin) -> char {
        spin.fen_char().unwrap_or('.')
    }

    fn piece_name_from_char(&self, c: char) -> Option<&'static str> {
        PieceKind::from_letter(c).map(PieceKind::name)
    }

    /// Board and state captured together.
    fn snapshot(&self) -> BoardSnapshot;

    fn restore(&mut self, snapshot: &BoardSnapshot) -> Result<(), EngineError> {
        self.set_board_array(*snapshot.pieces())?;
        self.set_state_array(snapshot.state_array())
    }
}
