//! `BoardEngine` binding backed by the shakmaty rules crate.

use std::num::NonZeroU32;

use shakmaty::fen::Fen;
use shakmaty::san::San;
use shakmaty::{
    Bitboard as ShakBitboard, Board, CastlingMode, Chess, Color, EnPassantMode, File,
    FromSetup, Move, Piece, Position, PositionError, Role, Setup, Square,
};

use crate::engine::{BoardEngine, EngineError, PlayedMove};
use crate::snapshot::{
    parse_board_str, square_name, squares, BoardSnapshot, Bitboard, CastlingRights, Colour,
    GameState, GameStatus, PieceKind, Spin, PIECE_TYPES, STATE_LEN,
};

/// Live "current game". The snapshot is the source of truth; a shakmaty
/// position is rebuilt from it whenever rules are needed.
#[derive(Debug, Clone)]
pub struct ShakmatyEngine {
    current: BoardSnapshot,
}

impl Default for ShakmatyEngine {
    fn default() -> Self {
        Self {
            current: BoardSnapshot::starting_position(),
        }
    }
}

impl ShakmatyEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: BoardSnapshot) -> Self {
        Self { current: snapshot }
    }

    /// Load a full FEN string.
    pub fn from_fen(fen: &str) -> Result<Self, EngineError> {
        let fen: Fen = fen
            .parse()
            .map_err(|e| EngineError::InvalidPosition(format!("{fen}: {e}")))?;
        let pos: Chess = fen
            .into_position(CastlingMode::Standard)
            .map_err(|e| EngineError::InvalidPosition(e.to_string()))?;
        Ok(Self {
            current: snapshot_of(&pos, 0, 0)?,
        })
    }

    fn position(&self) -> Result<Chess, EngineError> {
        let state = self.current.state();

        let mut board = Board::empty();
        for (index, bb) in self.current.pieces().iter().enumerate() {
            let Some(spin) = Spin::from_board_index(index) else {
                continue;
            };
            let (Some(colour), Some(kind)) = (spin.colour(), spin.kind()) else {
                continue;
            };
            let piece = Piece {
                color: to_color(colour),
                role: to_role(kind),
            };
            for sq in squares(*bb) {
                board.set_piece_at(to_square(sq), piece);
            }
        }

        let mut rights = ShakBitboard::EMPTY;
        for (colour, king_side, rook) in CASTLING_ROOKS {
            if state.castling.has(colour, king_side) {
                rights.add(rook);
            }
        }

        let mut setup = Setup::empty();
        setup.board = board;
        setup.turn = to_color(state.active);
        setup.castling_rights = rights;
        setup.ep_square = state.en_passant.map(to_square);
        setup.halfmoves = state.halfmove;
        setup.fullmoves = NonZeroU32::new(state.fullmove).unwrap_or(NonZeroU32::MIN);

        Chess::from_setup(setup, CastlingMode::Standard)
            .or_else(PositionError::ignore_invalid_castling_rights)
            .or_else(PositionError::ignore_invalid_ep_square)
            .map_err(|e| EngineError::InvalidPosition(e.to_string()))
    }

    fn absorb(&mut self, pos: &Chess) -> Result<(), EngineError> {
        let state = self.current.state();
        self.current = snapshot_of(pos, state.white_clock, state.black_clock)?;
        Ok(())
    }
}

const CASTLING_ROOKS: [(Colour, bool, Square); 4] = [
    (Colour::White, true, Square::H1),
    (Colour::White, false, Square::A1),
    (Colour::Black, true, Square::H8),
    (Colour::Black, false, Square::A8),
];

fn snapshot_of(
    pos: &Chess,
    white_clock: i32,
    black_clock: i32,
) -> Result<BoardSnapshot, EngineError> {
    let status = if pos.is_checkmate() {
        GameStatus::Checkmate
    } else if pos.is_stalemate() {
        GameStatus::Stalemate
    } else {
        GameStatus::Ready
    };

    let setup = pos.to_setup(EnPassantMode::Legal);

    let mut pieces = [0u64; PIECE_TYPES];
    for (index, slot) in pieces.iter_mut().enumerate() {
        let Some(spin) = Spin::from_board_index(index) else {
            continue;
        };
        if let (Some(colour), Some(kind)) = (spin.colour(), spin.kind()) {
            let piece = Piece {
                color: to_color(colour),
                role: to_role(kind),
            };
            *slot = u64::from(setup.board.by_piece(piece));
        }
    }

    let mut castling = 0u8;
    for (colour, king_side, rook) in CASTLING_ROOKS {
        if setup.castling_rights.contains(rook) {
            castling |= CastlingRights::flag(colour, king_side);
        }
    }

    let state = GameState {
        active: from_color(setup.turn),
        castling: CastlingRights(castling),
        status,
        fullmove: setup.fullmoves.get(),
        white_clock,
        black_clock,
        en_passant: setup.ep_square.map(from_square),
        halfmove: setup.halfmoves,
    };

    Ok(BoardSnapshot::new(pieces, state)?)
}

fn to_square(index: u8) -> Square {
    Square::new(u32::from(index))
}

fn from_square(sq: Square) -> u8 {
    sq as u8
}

fn to_color(colour: Colour) -> Color {
    match colour {
        Colour::White => Color::White,
        Colour::Black => Color::Black,
    }
}

fn from_color(color: Color) -> Colour {
    match color {
        Color::White => Colour::White,
        Color::Black => Colour::Black,
    }
}

fn to_role(kind: PieceKind) -> Role {
    match kind {
        PieceKind::Pawn => Role::Pawn,
        PieceKind::Knight => Role::Knight,
        PieceKind::Bishop => Role::Bishop,
        PieceKind::Rook => Role::Rook,
        PieceKind::Queen => Role::Queen,
        PieceKind::King => Role::King,
    }
}

fn from_role(role: Role) -> PieceKind {
    match role {
        Role::Pawn => PieceKind::Pawn,
        Role::Knight => PieceKind::Knight,
        Role::Bishop => PieceKind::Bishop,
        Role::Rook => PieceKind::Rook,
        Role::Queen => PieceKind::Queen,
        Role::King => PieceKind::King,
    }
}

/// Where the king lands for castling moves (shakmaty encodes them as king
/// takes rook); the plain destination otherwise.
fn king_target(mv: &Move) -> Square {
    match mv {
        Move::Castle { king, rook } => {
            let file = if rook.file() > king.file() { File::G } else { File::C };
            Square::from_coords(file, king.rank())
        }
        other => other.to(),
    }
}

fn move_from(mv: &Move) -> Option<Square> {
    match mv {
        Move::Castle { king, .. } => Some(*king),
        other => other.from(),
    }
}

impl BoardEngine for ShakmatyEngine {
    fn reset(&mut self) {
        self.current = BoardSnapshot::starting_position();
    }

    fn board_str(&self) -> String {
        self.current.board_str()
    }

    fn set_board_str(&mut self, board: &str) -> Result<(), EngineError> {
        self.set_board_array(parse_board_str(board)?)
    }

    fn board_array(&self) -> [Bitboard; PIECE_TYPES] {
        *self.current.pieces()
    }

    fn set_board_array(&mut self, pieces: [Bitboard; PIECE_TYPES]) -> Result<(), EngineError> {
        self.current = BoardSnapshot::new(pieces, *self.current.state())?;
        Ok(())
    }

    fn state_str(&self) -> String {
        self.current.state_str()
    }

    fn set_state_str(&mut self, state: &str) -> Result<(), EngineError> {
        let state: GameState = state.parse()?;
        self.current = self.current.with_state(state);
        Ok(())
    }

    fn state_array(&self) -> [i32; STATE_LEN] {
        self.current.state_array()
    }

    fn set_state_array(&mut self, state: [i32; STATE_LEN]) -> Result<(), EngineError> {
        let state = GameState::from_array(state)?;
        self.current = self.current.with_state(state);
        Ok(())
    }

    fn spin_at(&self, square: u8) -> Spin {
        self.current.spin_at(square)
    }

    fn active_colour(&self) -> Colour {
        self.current.state().active
    }

    fn set_active_colour(&mut self, colour: Colour) {
        let mut state = *self.current.state();
        state.active = colour;
        self.current = self.current.with_state(state);
    }

    fn castling_availability(&self) -> CastlingRights {
        self.current.state().castling
    }

    fn king_index(&self, colour: Colour) -> Option<u8> {
        let kings = self.current.bitboard(Spin::new(colour, PieceKind::King));
        squares(kings).next()
    }

    fn is_king_check(&self, colour: Colour) -> bool {
        let Ok(pos) = self.position() else {
            return false;
        };
        if to_color(colour) == pos.turn() {
            return pos.is_check();
        }
        let board = pos.board();
        match board.king_of(to_color(colour)) {
            Some(king) => board
                .attacks_to(king, !to_color(colour), board.occupied())
                .any(),
            None => false,
        }
    }

    fn potential_moves(&self, square: u8) -> Bitboard {
        let Ok(pos) = self.position() else {
            return 0;
        };
        let from = to_square(square);
        pos.legal_moves()
            .iter()
            .filter(|m| move_from(m) == Some(from))
            .fold(0u64, |acc, m| acc | (1u64 << from_square(king_target(m))))
    }

    fn play(
        &mut self,
        from: u8,
        to: u8,
        promotion: Option<PieceKind>,
        validate: bool,
        commit: bool,
    ) -> Result<PlayedMove, EngineError> {
        let illegal = |reason: &str| EngineError::IllegalMove {
            from: square_name(from),
            to: square_name(to),
            reason: reason.to_string(),
        };

        let pos = self.position()?;
        let from_sq = to_square(from);
        let to_sq = to_square(to);
        let wanted = promotion.map(to_role);

        let legal = pos.legal_moves();
        let found = legal.iter().find(|m| {
            move_from(m) == Some(from_sq)
                && king_target(m) == to_sq
                && (m.promotion() == wanted
                    || (wanted.is_none() && m.promotion() == Some(Role::Queen)))
        });

        let mv = match found {
            Some(m) => m.clone(),
            None if validate => return Err(illegal("not a legal move")),
            None => {
                let piece = pos
                    .board()
                    .piece_at(from_sq)
                    .ok_or_else(|| illegal("no piece on source square"))?;
                Move::Normal {
                    role: piece.role,
                    from: from_sq,
                    capture: pos.board().piece_at(to_sq).map(|p| p.role),
                    to: to_sq,
                    promotion: wanted,
                }
            }
        };

        let mover = pos
            .board()
            .piece_at(from_sq)
            .ok_or_else(|| illegal("no piece on source square"))?;
        let mover_colour = from_color(mover.color);
        let captured = match &mv {
            Move::EnPassant { .. } => Some(Spin::new(mover_colour.opposite(), PieceKind::Pawn)),
            Move::Normal {
                capture: Some(role),
                ..
            } => Some(Spin::new(mover_colour.opposite(), from_role(*role))),
            _ => None,
        };

        let mut san = San::from_move(&pos, mv.clone()).to_string();
        let mut after = pos.clone();
        after.play_unchecked(mv.clone());
        if after.is_checkmate() {
            san.push('#');
        } else if after.is_check() {
            san.push('+');
        }

        if commit {
            self.absorb(&after)?;
        }

        Ok(PlayedMove {
            from,
            to,
            spin: Spin::new(mover_colour, from_role(mover.role)),
            captured,
            promotion: mv.promotion().map(from_role),
            san,
        })
    }

    fn find_from_index(&self, to: u8, spin: Spin, candidates: Bitboard) -> Option<u8> {
        let pos = self.position().ok()?;
        if spin.colour().map(to_color) != Some(pos.turn()) {
            return None;
        }
        let to_sq = to_square(to);
        let legal = pos.legal_moves();

        let mut matches = squares(self.current.bitboard(spin) & candidates).filter(|from| {
            let from_sq = to_square(*from);
            legal
                .iter()
                .any(|m| move_from(m) == Some(from_sq) && king_target(m) == to_sq)
        });

        let first = matches.next()?;
        match matches.next() {
            Some(_) => None,
            None => Some(first),
        }
    }

    fn snapshot(&self) -> BoardSnapshot {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::parse_square;

    fn sq(name: &str) -> u8 {
        parse_square(name).unwrap()
    }

    #[test]
    fn test_from_fen_keeps_the_position() {
        let engine = ShakmatyEngine::from_fen(
            "r1bqkbnr/pppp1ppp/2n5/4p3/4P3/5N2/PPPP1PPP/RNBQKB1R w KQkq - 2 3",
        )
        .unwrap();
        assert_eq!(
            engine.board_str(),
            "r1bqkbnr/pppp1ppp/2n5/4p3/4P3/5N2/PPPP1PPP/RNBQKB1R"
        );
        assert_eq!(engine.state_array(), [1, 15, 0, 3, 0, 0, -1, 2]);
    }

    #[test]
    fn test_play_commits_and_reports_san() {
        let mut engine = ShakmatyEngine::new();
        let played = engine.play(sq("e2"), sq("e4"), None, true, true).unwrap();
        assert_eq!(played.san, "e4");
        assert_eq!(played.spin, Spin(1));
        assert_eq!(engine.active_colour(), Colour::Black);
        assert_eq!(engine.spin_at(sq("e4")), Spin(1));
        // No black pawn can capture en passant, so no target is recorded.
        assert_eq!(engine.snapshot().state().en_passant, None);
    }

    #[test]
    fn test_dry_run_leaves_position_untouched() {
        let mut engine = ShakmatyEngine::new();
        let before = engine.snapshot();
        let played = engine.play(sq("g1"), sq("f3"), None, true, false).unwrap();
        assert_eq!(played.san, "Nf3");
        assert_eq!(engine.snapshot(), before);
    }

    #[test]
    fn test_illegal_move_rejected() {
        let mut engine = ShakmatyEngine::new();
        let err = engine.play(sq("e2"), sq("e5"), None, true, true).unwrap_err();
        assert!(matches!(err, EngineError::IllegalMove { .. }));
        assert_eq!(engine.snapshot(), BoardSnapshot::starting_position());
    }

    #[test]
    fn test_find_from_index_requires_unique_piece() {
        let engine = ShakmatyEngine::new();
        let knight = Spin::new(Colour::White, PieceKind::Knight);
        assert_eq!(engine.find_from_index(sq("f3"), knight, u64::MAX), Some(sq("g1")));
        assert_eq!(engine.find_from_index(sq("e4"), knight, u64::MAX), None);

        // Both knights reach d2 after the pawn moves away.
        let engine =
            ShakmatyEngine::from_fen("rnbqkbnr/pppppppp/8/8/8/5N2/PPP1PPPP/RNBQKB1R w KQkq - 0 1")
                .unwrap();
        assert_eq!(engine.find_from_index(sq("d2"), knight, u64::MAX), None);
        let b_file = crate::snapshot::file_mask(1);
        assert_eq!(engine.find_from_index(sq("d2"), knight, b_file), Some(sq("b1")));
    }

    #[test]
    fn test_castling_uses_king_destination() {
        let mut engine =
            ShakmatyEngine::from_fen("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1").unwrap();
        assert_ne!(engine.potential_moves(sq("e1")) & (1u64 << sq("g1")), 0);
        let played = engine.play(sq("e1"), sq("g1"), None, true, true).unwrap();
        assert_eq!(played.san, "O-O");
        assert_eq!(engine.spin_at(sq("f1")), Spin(4));
        assert!(!engine.castling_availability().has(Colour::White, true));
        assert!(engine.castling_availability().has(Colour::Black, false));
    }

    #[test]
    fn test_promotion_defaults_to_queen() {
        let mut engine = ShakmatyEngine::from_fen("7k/P7/8/8/8/8/8/K7 w - - 0 1").unwrap();
        let played = engine.play(sq("a7"), sq("a8"), None, true, true).unwrap();
        assert_eq!(played.promotion, Some(PieceKind::Queen));
        assert_eq!(played.san, "a8=Q+");
        assert_eq!(engine.spin_at(sq("a8")), Spin(5));
    }

    #[test]
    fn test_check_detection_for_both_sides() {
        let engine = ShakmatyEngine::from_fen("4k3/8/8/8/8/8/4r3/4K3 w - - 0 1").unwrap();
        assert!(engine.is_king_check(Colour::White));
        assert!(!engine.is_king_check(Colour::Black));
        assert_eq!(engine.king_index(Colour::Black), Some(sq("e8")));
    }

    #[test]
    fn test_board_and_state_arrays_round_trip() {
        let mut engine = ShakmatyEngine::new();
        engine.play(sq("d2"), sq("d4"), None, true, true).unwrap();
        let snapshot = engine.snapshot();

        let mut other = ShakmatyEngine::new();
        other.set_board_array(engine.board_array()).unwrap();
        other.set_state_array(engine.state_array()).unwrap();
        assert_eq!(other.snapshot(), snapshot);

        other.set_board_str(&engine.board_str()).unwrap();
        other.set_state_str(&engine.state_str()).unwrap();
        assert_eq!(other.snapshot(), snapshot);
    }
}
