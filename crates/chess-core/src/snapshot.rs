//! Board snapshot data model: piece bitboards plus game state.
//!
//! Squares are indexed 0..64 with a1 = 0, h1 = 7, a8 = 56, h8 = 63.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One 64-bit mask per signed piece type.
pub type Bitboard = u64;

/// Number of piece bitboards in a snapshot (6 white + 6 black).
pub const PIECE_TYPES: usize = 12;

/// Number of integers in the flat game-state vector.
pub const STATE_LEN: usize = 8;

pub const STARTING_BOARD: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("Invalid board string: {0}")]
    InvalidBoard(String),

    #[error("Invalid game state: {0}")]
    InvalidState(String),

    #[error("Square {0} is occupied by more than one piece type")]
    OverlappingPieces(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Colour {
    White,
    Black,
}

impl Colour {
    /// +1 for white, -1 for black.
    pub fn sign(self) -> i32 {
        match self {
            Colour::White => 1,
            Colour::Black => -1,
        }
    }

    pub fn from_sign(sign: i32) -> Option<Colour> {
        match sign {
            1 => Some(Colour::White),
            -1 => Some(Colour::Black),
            _ => None,
        }
    }

    pub fn opposite(self) -> Colour {
        match self {
            Colour::White => Colour::Black,
            Colour::Black => Colour::White,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PieceKind {
    Pawn = 1,
    Knight = 2,
    Bishop = 3,
    Rook = 4,
    Queen = 5,
    King = 6,
}

impl PieceKind {
    pub const ALL: [PieceKind; 6] = [
        PieceKind::Pawn,
        PieceKind::Knight,
        PieceKind::Bishop,
        PieceKind::Rook,
        PieceKind::Queen,
        PieceKind::King,
    ];

    pub fn from_magnitude(n: u8) -> Option<PieceKind> {
        match n {
            1 => Some(PieceKind::Pawn),
            2 => Some(PieceKind::Knight),
            3 => Some(PieceKind::Bishop),
            4 => Some(PieceKind::Rook),
            5 => Some(PieceKind::Queen),
            6 => Some(PieceKind::King),
            _ => None,
        }
    }

    /// Upper-case SAN letter (`P` for pawns, which SAN itself omits).
    pub fn letter(self) -> char {
        match self {
            PieceKind::Pawn => 'P',
            PieceKind::Knight => 'N',
            PieceKind::Bishop => 'B',
            PieceKind::Rook => 'R',
            PieceKind::Queen => 'Q',
            PieceKind::King => 'K',
        }
    }

    pub fn from_letter(c: char) -> Option<PieceKind> {
        match c.to_ascii_uppercase() {
            'P' => Some(PieceKind::Pawn),
            'N' => Some(PieceKind::Knight),
            'B' => Some(PieceKind::Bishop),
            'R' => Some(PieceKind::Rook),
            'Q' => Some(PieceKind::Queen),
            'K' => Some(PieceKind::King),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PieceKind::Pawn => "pawn",
            PieceKind::Knight => "knight",
            PieceKind::Bishop => "bishop",
            PieceKind::Rook => "rook",
            PieceKind::Queen => "queen",
            PieceKind::King => "king",
        }
    }
}

/// Signed piece code: positive white, negative black, magnitude = kind, 0 = empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Spin(pub i8);

impl Spin {
    pub const EMPTY: Spin = Spin(0);

    pub fn new(colour: Colour, kind: PieceKind) -> Spin {
        Spin(colour.sign() as i8 * kind as i8)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn colour(self) -> Option<Colour> {
        match self.0.signum() {
            1 => Some(Colour::White),
            -1 => Some(Colour::Black),
            _ => None,
        }
    }

    pub fn kind(self) -> Option<PieceKind> {
        PieceKind::from_magnitude(self.0.unsigned_abs())
    }

    /// Index of this spin's bitboard within `BoardSnapshot::pieces`.
    pub fn board_index(self) -> Option<usize> {
        let kind = self.kind()? as usize - 1;
        match self.colour()? {
            Colour::White => Some(kind),
            Colour::Black => Some(kind + 6),
        }
    }

    pub fn from_board_index(index: usize) -> Option<Spin> {
        if index >= PIECE_TYPES {
            return None;
        }
        let colour = if index < 6 { Colour::White } else { Colour::Black };
        let kind = PieceKind::from_magnitude((index % 6) as u8 + 1)?;
        Some(Spin::new(colour, kind))
    }

    /// FEN letter, upper case for white. `None` for an empty square.
    pub fn fen_char(self) -> Option<char> {
        let letter = self.kind()?.letter();
        match self.colour()? {
            Colour::White => Some(letter),
            Colour::Black => Some(letter.to_ascii_lowercase()),
        }
    }

    pub fn from_fen_char(c: char) -> Option<Spin> {
        let kind = PieceKind::from_letter(c)?;
        let colour = if c.is_ascii_uppercase() { Colour::White } else { Colour::Black };
        Some(Spin::new(colour, kind))
    }
}

impl fmt::Display for Spin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.colour(), self.kind()) {
            (Some(colour), Some(kind)) => {
                let side = if colour == Colour::White { "white" } else { "black" };
                write!(f, "{side} {}", kind.name())
            }
            _ => f.write_str("empty"),
        }
    }
}

/// 4-bit castling mask.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CastlingRights(pub u8);

impl CastlingRights {
    pub const WHITE_KING_SIDE: u8 = 1;
    pub const WHITE_QUEEN_SIDE: u8 = 2;
    pub const BLACK_KING_SIDE: u8 = 4;
    pub const BLACK_QUEEN_SIDE: u8 = 8;
    pub const ALL: CastlingRights = CastlingRights(15);
    pub const NONE: CastlingRights = CastlingRights(0);

    pub fn flag(colour: Colour, king_side: bool) -> u8 {
        match (colour, king_side) {
            (Colour::White, true) => Self::WHITE_KING_SIDE,
            (Colour::White, false) => Self::WHITE_QUEEN_SIDE,
            (Colour::Black, true) => Self::BLACK_KING_SIDE,
            (Colour::Black, false) => Self::BLACK_QUEEN_SIDE,
        }
    }

    pub fn has(self, colour: Colour, king_side: bool) -> bool {
        self.0 & Self::flag(colour, king_side) != 0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameStatus {
    #[default]
    Ready = 0,
    Checkmate = 1,
    Stalemate = 2,
    Resigned = 3,
}

impl GameStatus {
    pub fn from_code(code: i32) -> Option<GameStatus> {
        match code {
            0 => Some(GameStatus::Ready),
            1 => Some(GameStatus::Checkmate),
            2 => Some(GameStatus::Stalemate),
            3 => Some(GameStatus::Resigned),
            _ => None,
        }
    }
}

/// Everything about a position that is not piece placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GameState {
    pub active: Colour,
    pub castling: CastlingRights,
    pub status: GameStatus,
    pub fullmove: u32,
    /// Seconds.
    pub white_clock: i32,
    /// Seconds.
    pub black_clock: i32,
    pub en_passant: Option<u8>,
    pub halfmove: u32,
}

impl Default for GameState {
    fn default() -> Self {
        Self {
            active: Colour::White,
            castling: CastlingRights::ALL,
            status: GameStatus::Ready,
            fullmove: 1,
            white_clock: 0,
            black_clock: 0,
            en_passant: None,
            halfmove: 0,
        }
    }
}

impl GameState {
    /// Flat layout: active, castling, status, fullmove, white clock,
    /// black clock, en-passant square (-1 none), halfmove clock.
    pub fn to_array(&self) -> [i32; STATE_LEN] {
        [
            self.active.sign(),
            i32::from(self.castling.0),
            self.status as i32,
            self.fullmove as i32,
            self.white_clock,
            self.black_clock,
            self.en_passant.map(i32::from).unwrap_or(-1),
            self.halfmove as i32,
        ]
    }

    pub fn from_array(values: [i32; STATE_LEN]) -> Result<Self, SnapshotError> {
        let active = Colour::from_sign(values[0])
            .ok_or_else(|| SnapshotError::InvalidState(format!("active colour {}", values[0])))?;
        if !(0..16).contains(&values[1]) {
            return Err(SnapshotError::InvalidState(format!("castling mask {}", values[1])));
        }
        let status = GameStatus::from_code(values[2])
            .ok_or_else(|| SnapshotError::InvalidState(format!("status {}", values[2])))?;
        if values[3] < 1 {
            return Err(SnapshotError::InvalidState(format!("full-move count {}", values[3])));
        }
        let en_passant = match values[6] {
            -1 => None,
            sq @ 0..=63 => Some(sq as u8),
            other => {
                return Err(SnapshotError::InvalidState(format!("en-passant square {other}")));
            }
        };
        if values[7] < 0 {
            return Err(SnapshotError::InvalidState(format!("half-move clock {}", values[7])));
        }

        Ok(Self {
            active,
            castling: CastlingRights(values[1] as u8),
            status,
            fullmove: values[3] as u32,
            white_clock: values[4],
            black_clock: values[5],
            en_passant,
            halfmove: values[7] as u32,
        })
    }
}

impl fmt::Display for GameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.to_array().iter().map(|v| v.to_string()).collect();
        f.write_str(&parts.join(","))
    }
}

impl FromStr for GameState {
    type Err = SnapshotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let values: Vec<i32> = s
            .split(',')
            .map(|part| part.trim().parse::<i32>())
            .collect::<Result<_, _>>()
            .map_err(|_| SnapshotError::InvalidState(s.to_string()))?;
        let values: [i32; STATE_LEN] = values
            .try_into()
            .map_err(|_| SnapshotError::InvalidState(format!("expected {STATE_LEN} fields: {s}")))?;
        GameState::from_array(values)
    }
}

/// Immutable position: piece bitboards and game state, always set together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoardSnapshot {
    pieces: [Bitboard; PIECE_TYPES],
    state: GameState,
}

impl BoardSnapshot {
    /// Build a snapshot, rejecting boards where two piece types share a square.
    pub fn new(pieces: [Bitboard; PIECE_TYPES], state: GameState) -> Result<Self, SnapshotError> {
        let mut seen: Bitboard = 0;
        for bb in pieces {
            let overlap = seen & bb;
            if overlap != 0 {
                return Err(SnapshotError::OverlappingPieces(square_name(
                    overlap.trailing_zeros() as u8,
                )));
            }
            seen |= bb;
        }
        Ok(Self { pieces, state })
    }

    pub fn from_arrays(
        pieces: [Bitboard; PIECE_TYPES],
        state: [i32; STATE_LEN],
    ) -> Result<Self, SnapshotError> {
        Self::new(pieces, GameState::from_array(state)?)
    }

    /// Parse the persisted `BoardSquareStr` / `GameStateStr` pair.
    pub fn from_strs(board: &str, state: &str) -> Result<Self, SnapshotError> {
        Self::new(parse_board_str(board)?, state.parse()?)
    }

    pub fn starting_position() -> Self {
        let pieces = parse_board_str(STARTING_BOARD).unwrap_or_default();
        Self {
            pieces,
            state: GameState::default(),
        }
    }

    pub fn pieces(&self) -> &[Bitboard; PIECE_TYPES] {
        &self.pieces
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn state_array(&self) -> [i32; STATE_LEN] {
        self.state.to_array()
    }

    pub fn bitboard(&self, spin: Spin) -> Bitboard {
        spin.board_index().map(|i| self.pieces[i]).unwrap_or(0)
    }

    pub fn spin_at(&self, square: u8) -> Spin {
        let mask = 1u64 << square;
        self.pieces
            .iter()
            .position(|bb| bb & mask != 0)
            .and_then(Spin::from_board_index)
            .unwrap_or(Spin::EMPTY)
    }

    pub fn occupied(&self, colour: Colour) -> Bitboard {
        let range = match colour {
            Colour::White => 0..6,
            Colour::Black => 6..12,
        };
        self.pieces[range].iter().fold(0, |acc, bb| acc | bb)
    }

    pub fn occupied_all(&self) -> Bitboard {
        self.occupied(Colour::White) | self.occupied(Colour::Black)
    }

    /// Copy of this snapshot with the clock offsets replaced.
    pub fn with_clocks(&self, white_clock: i32, black_clock: i32) -> Self {
        let mut state = self.state;
        state.white_clock = white_clock;
        state.black_clock = black_clock;
        Self {
            pieces: self.pieces,
            state,
        }
    }

    pub fn with_state(&self, state: GameState) -> Self {
        Self {
            pieces: self.pieces,
            state,
        }
    }

    /// FEN piece-placement field, rank 8 first.
    pub fn board_str(&self) -> String {
        let mut out = String::with_capacity(72);
        for rank in (0..8u8).rev() {
            let mut empty = 0;
            for file in 0..8u8 {
                match self.spin_at(rank * 8 + file).fen_char() {
                    Some(c) => {
                        if empty > 0 {
                            out.push(char::from(b'0' + empty));
                            empty = 0;
                        }
                        out.push(c);
                    }
                    None => empty += 1,
                }
            }
            if empty > 0 {
                out.push(char::from(b'0' + empty));
            }
            if rank > 0 {
                out.push('/');
            }
        }
        out
    }

    pub fn state_str(&self) -> String {
        self.state.to_string()
    }
}

/// Parse a FEN piece-placement field into bitboards. Extra FEN fields after
/// the first space are ignored.
pub fn parse_board_str(s: &str) -> Result<[Bitboard; PIECE_TYPES], SnapshotError> {
    let placement = s.split_whitespace().next().unwrap_or("");
    let ranks: Vec<&str> = placement.split('/').collect();
    if ranks.len() != 8 {
        return Err(SnapshotError::InvalidBoard(s.to_string()));
    }

    let mut pieces = [0u64; PIECE_TYPES];
    for (row, rank_str) in ranks.iter().enumerate() {
        let rank = 7 - row as u8;
        let mut file = 0u8;
        for c in rank_str.chars() {
            if let Some(skip) = c.to_digit(10) {
                file += skip as u8;
            } else {
                let spin = Spin::from_fen_char(c)
                    .ok_or_else(|| SnapshotError::InvalidBoard(format!("unknown piece '{c}'")))?;
                if file >= 8 {
                    return Err(SnapshotError::InvalidBoard(s.to_string()));
                }
                if let Some(index) = spin.board_index() {
                    pieces[index] |= 1u64 << (rank * 8 + file);
                }
                file += 1;
            }
            if file > 8 {
                return Err(SnapshotError::InvalidBoard(s.to_string()));
            }
        }
        if file != 8 {
            return Err(SnapshotError::InvalidBoard(s.to_string()));
        }
    }
    Ok(pieces)
}

/// Algebraic name of a square index, e.g. 28 -> "e4".
pub fn square_name(square: u8) -> String {
    let file = char::from(b'a' + square % 8);
    let rank = char::from(b'1' + square / 8);
    format!("{file}{rank}")
}

pub fn parse_square(s: &str) -> Option<u8> {
    let bytes = s.as_bytes();
    if bytes.len() != 2 {
        return None;
    }
    let file = bytes[0].checked_sub(b'a').filter(|f| *f < 8)?;
    let rank = bytes[1].checked_sub(b'1').filter(|r| *r < 8)?;
    Some(rank * 8 + file)
}

pub fn file_mask(file: u8) -> Bitboard {
    0x0101_0101_0101_0101u64 << (file & 7)
}

pub fn rank_mask(rank: u8) -> Bitboard {
    0xFFu64 << (8 * (rank & 7))
}

/// Iterate set bits from lowest to highest (bit-scan-and-clear).
pub fn squares(mut bb: Bitboard) -> impl Iterator<Item = u8> {
    std::iter::from_fn(move || {
        if bb == 0 {
            return None;
        }
        let sq = bb.trailing_zeros() as u8;
        bb &= bb - 1;
        Some(sq)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starting_position_layout() {
        let start = BoardSnapshot::starting_position();
        assert_eq!(start.spin_at(parse_square("e1").unwrap()), Spin(6));
        assert_eq!(start.spin_at(parse_square("d8").unwrap()), Spin(-5));
        assert_eq!(start.spin_at(parse_square("e4").unwrap()), Spin::EMPTY);
        assert_eq!(start.occupied(Colour::White), 0xFFFF);
        assert_eq!(start.occupied(Colour::Black), 0xFFFF_0000_0000_0000);
        assert_eq!(start.board_str(), STARTING_BOARD);
    }

    #[test]
    fn test_state_string_round_trip() {
        let state = GameState {
            active: Colour::Black,
            castling: CastlingRights(CastlingRights::WHITE_KING_SIDE | CastlingRights::BLACK_QUEEN_SIDE),
            status: GameStatus::Resigned,
            fullmove: 23,
            white_clock: 120,
            black_clock: 95,
            en_passant: Some(20),
            halfmove: 3,
        };
        assert_eq!(state.to_string(), "-1,9,3,23,120,95,20,3");
        assert_eq!(state.to_string().parse::<GameState>().unwrap(), state);
    }

    #[test]
    fn test_invalid_state_rejected() {
        assert!("0,15,0,1,0,0,-1,0".parse::<GameState>().is_err());
        assert!("1,15,0,1,0,0".parse::<GameState>().is_err());
        assert!("1,15,9,1,0,0,-1,0".parse::<GameState>().is_err());
    }

    #[test]
    fn test_overlapping_pieces_rejected() {
        let mut pieces = *BoardSnapshot::starting_position().pieces();
        pieces[1] |= 1; // white knight on a1, already a rook
        let err = BoardSnapshot::new(pieces, GameState::default()).unwrap_err();
        assert_eq!(err, SnapshotError::OverlappingPieces("a1".to_string()));
    }

    #[test]
    fn test_board_str_rejects_bad_ranks() {
        assert!(parse_board_str("8/8/8").is_err());
        assert!(parse_board_str("9/8/8/8/8/8/8/8").is_err());
        assert!(parse_board_str("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNX").is_err());
    }

    #[test]
    fn test_spin_board_index_mapping() {
        for index in 0..PIECE_TYPES {
            let spin = Spin::from_board_index(index).unwrap();
            assert_eq!(spin.board_index(), Some(index));
        }
        assert_eq!(Spin::new(Colour::Black, PieceKind::Knight), Spin(-2));
        assert_eq!(Spin(-2).fen_char(), Some('n'));
        assert_eq!(Spin::from_fen_char('Q'), Some(Spin(5)));
    }

    #[test]
    fn test_squares_iterates_low_to_high() {
        let found: Vec<u8> = squares((1 << 12) | (1 << 28) | 1).collect();
        assert_eq!(found, vec![0, 12, 28]);
        assert_eq!(square_name(28), "e4");
        assert_eq!(parse_square("h8"), Some(63));
        assert_eq!(parse_square("i1"), None);
    }
}
