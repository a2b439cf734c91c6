//! SAN half-move classification.
//!
//! Every token is classified into one `SanMove` kind; resolving the source
//! square is left to the replayer and the board engine.

use thiserror::Error;

use crate::snapshot::{file_mask, parse_square, rank_mask, Bitboard, PieceKind};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SanError {
    #[error("empty move")]
    Empty,

    #[error("unrecognised move text")]
    Unrecognised,

    #[error("cannot promote to {0}")]
    BadPromotion(char),
}

/// Source-square hints carried by a piece move.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Disambiguation {
    pub file: Option<u8>,
    pub rank: Option<u8>,
}

impl Disambiguation {
    /// Squares the moving piece may start from.
    pub fn candidates(self) -> Bitboard {
        match (self.file, self.rank) {
            (None, None) => u64::MAX,
            (Some(file), None) => file_mask(file),
            (None, Some(rank)) => rank_mask(rank),
            (Some(file), Some(rank)) => 1u64 << (rank * 8 + file),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SanMove {
    /// `e4`, `e8=Q`
    PawnPush {
        to: u8,
        promotion: Option<PieceKind>,
    },
    /// `exd5`, `bxa8=N`
    PawnCapture {
        from_file: u8,
        to: u8,
        promotion: Option<PieceKind>,
    },
    /// `Nf3`, `Nbd7`, `R1e2`, `Qh4xe1`
    Piece {
        kind: PieceKind,
        from: Disambiguation,
        to: u8,
        capture: bool,
    },
    /// `O-O`
    CastleKingSide,
    /// `O-O-O`
    CastleQueenSide,
}

fn file_of(c: u8) -> Option<u8> {
    (b'a'..=b'h').contains(&c).then(|| c - b'a')
}

fn rank_of(c: u8) -> Option<u8> {
    (b'1'..=b'8').contains(&c).then(|| c - b'1')
}

fn square_at(bytes: &[u8]) -> Option<u8> {
    std::str::from_utf8(bytes).ok().and_then(parse_square)
}

/// Split a trailing promotion (`=Q` or bare `Q`) off a pawn move.
fn split_promotion(body: &[u8]) -> Result<(&[u8], Option<PieceKind>), SanError> {
    let Some(&last) = body.last() else {
        return Err(SanError::Empty);
    };
    if !last.is_ascii_uppercase() {
        return Ok((body, None));
    }
    let kind = PieceKind::from_letter(char::from(last))
        .filter(|k| !matches!(k, PieceKind::Pawn | PieceKind::King))
        .ok_or(SanError::BadPromotion(char::from(last)))?;
    let mut rest = &body[..body.len() - 1];
    if rest.last() == Some(&b'=') {
        rest = &rest[..rest.len() - 1];
    }
    Ok((rest, Some(kind)))
}

/// Classify a single SAN token. Check and annotation suffixes are ignored.
pub fn parse_san(token: &str) -> Result<SanMove, SanError> {
    let trimmed = token.trim().trim_end_matches(['+', '#', '!', '?']);
    if trimmed.is_empty() {
        return Err(SanError::Empty);
    }

    match trimmed {
        "O-O" | "0-0" => return Ok(SanMove::CastleKingSide),
        "O-O-O" | "0-0-0" => return Ok(SanMove::CastleQueenSide),
        _ => {}
    }

    let bytes = trimmed.as_bytes();
    if let Some(kind) = PieceKind::from_letter(char::from(bytes[0]))
        .filter(|_| bytes[0].is_ascii_uppercase() && bytes[0] != b'P')
    {
        return parse_piece_move(kind, &bytes[1..]);
    }

    let (body, promotion) = split_promotion(bytes)?;
    match body {
        [_, _] => {
            let to = square_at(body).ok_or(SanError::Unrecognised)?;
            Ok(SanMove::PawnPush { to, promotion })
        }
        [file, b'x', dest @ ..] if dest.len() == 2 => {
            let from_file = file_of(*file).ok_or(SanError::Unrecognised)?;
            let to = square_at(dest).ok_or(SanError::Unrecognised)?;
            Ok(SanMove::PawnCapture {
                from_file,
                to,
                promotion,
            })
        }
        _ => Err(SanError::Unrecognised),
    }
}

/// Bare destination, then file-, rank-, and fully-qualified forms; a capture
/// `x` shifts the destination one character right.
fn parse_piece_move(kind: PieceKind, rest: &[u8]) -> Result<SanMove, SanError> {
    if rest.len() < 2 {
        return Err(SanError::Unrecognised);
    }
    let (head, dest) = rest.split_at(rest.len() - 2);
    let to = square_at(dest).ok_or(SanError::Unrecognised)?;

    let (hint, capture) = match head.split_last() {
        Some((b'x', hint)) => (hint, true),
        _ => (head, false),
    };

    let from = match hint {
        [] => Disambiguation::default(),
        [c] if file_of(*c).is_some() => Disambiguation {
            file: file_of(*c),
            rank: None,
        },
        [c] if rank_of(*c).is_some() => Disambiguation {
            file: None,
            rank: rank_of(*c),
        },
        [f, r] => Disambiguation {
            file: Some(file_of(*f).ok_or(SanError::Unrecognised)?),
            rank: Some(rank_of(*r).ok_or(SanError::Unrecognised)?),
        },
        _ => return Err(SanError::Unrecognised),
    };

    Ok(SanMove::Piece {
        kind,
        from,
        to,
        capture,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sq(name: &str) -> u8 {
        parse_square(name).unwrap()
    }

    #[test]
    fn test_pawn_moves() {
        assert_eq!(
            parse_san("e4").unwrap(),
            SanMove::PawnPush {
                to: sq("e4"),
                promotion: None
            }
        );
        assert_eq!(
            parse_san("exd5").unwrap(),
            SanMove::PawnCapture {
                from_file: 4,
                to: sq("d5"),
                promotion: None
            }
        );
        assert_eq!(
            parse_san("e8=Q+").unwrap(),
            SanMove::PawnPush {
                to: sq("e8"),
                promotion: Some(PieceKind::Queen)
            }
        );
        assert_eq!(
            parse_san("bxa1N").unwrap(),
            SanMove::PawnCapture {
                from_file: 1,
                to: sq("a1"),
                promotion: Some(PieceKind::Knight)
            }
        );
    }

    #[test]
    fn test_piece_disambiguation_precedence() {
        let piece = |s: &str| match parse_san(s).unwrap() {
            SanMove::Piece { from, capture, to, .. } => (from, capture, to),
            other => panic!("unexpected {other:?}"),
        };

        assert_eq!(piece("Nf3"), (Disambiguation::default(), false, sq("f3")));
        assert_eq!(
            piece("Nbd7"),
            (Disambiguation { file: Some(1), rank: None }, false, sq("d7"))
        );
        assert_eq!(
            piece("R1e2"),
            (Disambiguation { file: None, rank: Some(0) }, false, sq("e2"))
        );
        assert_eq!(
            piece("Qh4xe1#"),
            (Disambiguation { file: Some(7), rank: Some(3) }, true, sq("e1"))
        );
        assert_eq!(piece("Bxc6"), (Disambiguation::default(), true, sq("c6")));
        assert_eq!(
            piece("Raxd1"),
            (Disambiguation { file: Some(0), rank: None }, true, sq("d1"))
        );
    }

    #[test]
    fn test_castling_forms() {
        assert_eq!(parse_san("O-O").unwrap(), SanMove::CastleKingSide);
        assert_eq!(parse_san("0-0-0+").unwrap(), SanMove::CastleQueenSide);
    }

    #[test]
    fn test_rejects_garbage() {
        assert_eq!(parse_san(""), Err(SanError::Empty));
        assert_eq!(parse_san("Nz9"), Err(SanError::Unrecognised));
        assert_eq!(parse_san("e9"), Err(SanError::Unrecognised));
        assert_eq!(parse_san("e8=K"), Err(SanError::BadPromotion('K')));
        assert_eq!(parse_san("hello"), Err(SanError::Unrecognised));
    }

    #[test]
    fn test_candidate_masks() {
        assert_eq!(Disambiguation::default().candidates(), u64::MAX);
        assert_eq!(
            Disambiguation { file: Some(1), rank: Some(0) }.candidates(),
            1u64 << sq("b1")
        );
        assert_eq!(Disambiguation { file: None, rank: Some(7) }.candidates(), 0xFFu64 << 56);
    }
}
