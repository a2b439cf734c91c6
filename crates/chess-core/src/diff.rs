//! Snapshot diffing for move animation.
//!
//! The changed squares between two snapshots are bucketed per signed piece
//! type, then turned into a handful of animation primitives. This is a hint
//! for the UI, not a move reconstructor: anything too busy to explain with
//! one disappearance and one appearance per piece type yields an empty plan.

use serde::{Deserialize, Serialize};

use crate::snapshot::{squares, Bitboard, BoardSnapshot, Colour, PieceKind, Spin};

/// More piece types than this changing at once is not animated.
pub const MAX_CHANGED_PIECE_TYPES: usize = 3;

/// 6 white + 6 black + the empty sentinel.
const BUCKETS: usize = 13;

/// One piece type's disappearance (`from`) and/or appearance (`to`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PieceChange {
    pub spin: Spin,
    pub from: Option<u8>,
    pub to: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnimationInstruction {
    /// Slide a piece from one square to another.
    Move { spin: Spin, from: u8, to: u8 },
    /// A piece vanished without reappearing.
    Capture { spin: Spin, from: u8 },
    /// A piece reappeared, e.g. a captured piece coming back on undo.
    Put { spin: Spin, to: u8 },
    /// Slide and fade one piece into another (promotion, or its undo).
    MoveFade {
        from_spin: Spin,
        from: u8,
        to_spin: Spin,
        to: u8,
    },
}

#[derive(Debug, Clone, Copy, Default)]
struct Bucket {
    from: Option<u8>,
    to: Option<u8>,
    overflow: bool,
}

fn bucket_index(spin: Spin) -> usize {
    (spin.0 + 6) as usize
}

fn bucket_spin(index: usize) -> Spin {
    Spin(index as i8 - 6)
}

/// Mask of squares whose occupant differs. A missing side yields 0.
pub fn square_changes(before: Option<&BoardSnapshot>, after: Option<&BoardSnapshot>) -> Bitboard {
    match (before, after) {
        (Some(a), Some(b)) => a
            .pieces()
            .iter()
            .zip(b.pieces().iter())
            .fold(0, |acc, (x, y)| acc | (x ^ y)),
        _ => 0,
    }
}

/// Per-piece-type changes, ordered by spin from black king to white king.
/// Empty when more than `MAX_CHANGED_PIECE_TYPES` types changed, or when a
/// type vanished or appeared on more than one square.
pub fn piece_changes(before: &BoardSnapshot, after: &BoardSnapshot) -> Vec<PieceChange> {
    let mut buckets = [Bucket::default(); BUCKETS];

    for sq in squares(square_changes(Some(before), Some(after))) {
        let was = before.spin_at(sq);
        let now = after.spin_at(sq);
        if was == now {
            continue;
        }
        if !was.is_empty() {
            let bucket = &mut buckets[bucket_index(was)];
            bucket.overflow |= bucket.from.is_some();
            bucket.from = Some(sq);
        }
        if !now.is_empty() {
            let bucket = &mut buckets[bucket_index(now)];
            bucket.overflow |= bucket.to.is_some();
            bucket.to = Some(sq);
        }
    }

    if buckets.iter().any(|b| b.overflow) {
        return Vec::new();
    }

    let changes: Vec<PieceChange> = buckets
        .iter()
        .enumerate()
        .filter(|(_, b)| b.from.is_some() || b.to.is_some())
        .map(|(i, b)| PieceChange {
            spin: bucket_spin(i),
            from: b.from,
            to: b.to,
        })
        .collect();

    if changes.len() > MAX_CHANGED_PIECE_TYPES {
        return Vec::new();
    }
    changes
}

/// A vanished piece and an appeared piece of the same side, exactly one of
/// them a pawn.
fn is_fade_pair(vanished: &PieceChange, appeared: &PieceChange) -> bool {
    let is_pawn = |c: &PieceChange| c.spin.kind() == Some(PieceKind::Pawn);
    vanished.from.is_some()
        && vanished.to.is_none()
        && appeared.from.is_none()
        && appeared.to.is_some()
        && vanished.spin.colour() == appeared.spin.colour()
        && is_pawn(vanished) != is_pawn(appeared)
}

/// Animation instructions taking `before` to `after`.
pub fn animation_plan(before: &BoardSnapshot, after: &BoardSnapshot) -> Vec<AnimationInstruction> {
    let changes = piece_changes(before, after);

    // pair index of each change consumed by a fade
    let mut partner: Vec<Option<usize>> = vec![None; changes.len()];
    for i in 0..changes.len() {
        if partner[i].is_some() {
            continue;
        }
        let found = (0..changes.len())
            .find(|&j| j != i && partner[j].is_none() && is_fade_pair(&changes[i], &changes[j]));
        if let Some(j) = found {
            partner[i] = Some(j);
            partner[j] = Some(i);
        }
    }

    let mut plan = Vec::with_capacity(changes.len());
    let mut emitted = vec![false; changes.len()];
    for (i, change) in changes.iter().enumerate() {
        if emitted[i] {
            continue;
        }
        emitted[i] = true;

        if let Some(j) = partner[i] {
            emitted[j] = true;
            let (vanished, appeared) = if change.to.is_none() {
                (change, &changes[j])
            } else {
                (&changes[j], change)
            };
            if let (Some(from), Some(to)) = (vanished.from, appeared.to) {
                plan.push(AnimationInstruction::MoveFade {
                    from_spin: vanished.spin,
                    from,
                    to_spin: appeared.spin,
                    to,
                });
            }
            continue;
        }

        match (change.from, change.to) {
            (Some(from), Some(to)) => plan.push(AnimationInstruction::Move {
                spin: change.spin,
                from,
                to,
            }),
            (Some(from), None) => plan.push(AnimationInstruction::Capture {
                spin: change.spin,
                from,
            }),
            (None, Some(to)) => plan.push(AnimationInstruction::Put {
                spin: change.spin,
                to,
            }),
            (None, None) => {}
        }
    }
    plan
}

/// Side whose pieces moved, if exactly one side has a `Move` or `MoveFade`.
pub fn moving_side(plan: &[AnimationInstruction]) -> Option<Colour> {
    let mut sides = plan.iter().filter_map(|instruction| match instruction {
        AnimationInstruction::Move { spin, .. } => spin.colour(),
        AnimationInstruction::MoveFade { from_spin, .. } => from_spin.colour(),
        _ => None,
    });
    let first = sides.next()?;
    sides.all(|c| c == first).then_some(first)
}
