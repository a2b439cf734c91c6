//! Chess game history core: board snapshots, the board-engine seam, snapshot
//! diffing for animation, and PGN replay.

pub mod diff;
pub mod engine;
pub mod pgn;
pub mod san;
pub mod shakmaty_engine;
pub mod snapshot;

pub use diff::{animation_plan, piece_changes, square_changes, AnimationInstruction, PieceChange};
pub use engine::{BoardEngine, EngineError, PlayedMove};
pub use pgn::{replay, ReplayError, ReplayedPosition};
pub use shakmaty_engine::ShakmatyEngine;
pub use snapshot::{
    BoardSnapshot, Bitboard, CastlingRights, Colour, GameState, GameStatus, PieceKind,
    SnapshotError, Spin,
};
