//! PGN import: clean the movetext, split it into move numbers and SAN
//! half-moves, and replay them through a board engine.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;
use tracing::debug;

use crate::engine::BoardEngine;
use crate::san::{parse_san, SanMove};
use crate::snapshot::{file_mask, BoardSnapshot, Colour, PieceKind, Spin, STARTING_BOARD};

/// Shown in errors raised before the first move number.
const NO_MOVE_NUMBER: &str = "-";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReplayError {
    #[error("Move {move_number} '{san}': {reason}")]
    Unparseable {
        move_number: String,
        san: String,
        reason: String,
    },

    #[error("Move {move_number} '{san}' is illegal: {reason}")]
    IllegalMove {
        move_number: String,
        san: String,
        reason: String,
    },

    #[error("Move {move_number} '{san}': castling right is not available")]
    CastlingUnavailable { move_number: String, san: String },

    #[error("Move {move_number} '{san}': no unique piece can make this move")]
    NoSourceSquare { move_number: String, san: String },

    #[error("PGN starts from a custom position: {0}")]
    UnsupportedSetup(String),

    #[error("No moves to import")]
    NothingToImport,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PgnToken {
    /// `12.` or `12...`; the latter means black moves next.
    MoveNumber {
        text: String,
        number: u32,
        black_to_move: bool,
    },
    San(String),
}

/// One replayed position; `san` is `None` for the starting position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayedPosition {
    pub snapshot: BoardSnapshot,
    pub san: Option<String>,
}

fn cached(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static PGN pattern"))
}

fn header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached(&RE, r#"(?m)^\s*\[(\w+)\s+"((?:[^"\\]|\\.)*)"\]"#)
}

fn move_number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached(&RE, r"\b(\d{1,3})(\.{3}|\.)")
}

/// Parse the `[Tag "value"]` header section.
pub fn headers(pgn: &str) -> BTreeMap<String, String> {
    header_re()
        .captures_iter(pgn)
        .map(|cap| (cap[1].to_string(), cap[2].to_string()))
        .collect()
}

/// Drop `{...}` and `;` comments and `[Tag "value"]` pairs in document
/// order, so a bracket inside a comment or a quoted tag value cannot
/// swallow movetext. A `;` comment always ends at the end of its line.
fn strip_comments_and_tags(pgn: &str) -> String {
    let mut out = String::with_capacity(pgn.len());
    let mut chars = pgn.chars();
    while let Some(c) = chars.next() {
        match c {
            '{' => {
                chars.by_ref().find(|&c| c == '}');
                out.push(' ');
            }
            ';' => {
                chars.by_ref().find(|&c| c == '\n');
                out.push('\n');
            }
            '[' => {
                skip_tag(&mut chars);
                out.push(' ');
            }
            _ => out.push(c),
        }
    }
    out
}

/// Consume a tag up to its closing `]`, ignoring brackets inside the quoted
/// value.
fn skip_tag(chars: &mut std::str::Chars<'_>) {
    let mut quoted = false;
    while let Some(c) = chars.next() {
        match c {
            '\\' if quoted => {
                chars.next();
            }
            '"' => quoted = !quoted,
            ']' if !quoted => break,
            _ => {}
        }
    }
}

/// Strip headers, comments, variations, NAGs, annotations, `e.p.` markers
/// and results, and collapse whitespace.
pub fn pre_clean(pgn: &str) -> String {
    static VARIATIONS: OnceLock<Regex> = OnceLock::new();
    static NAGS: OnceLock<Regex> = OnceLock::new();
    static EN_PASSANT: OnceLock<Regex> = OnceLock::new();
    static ANNOTATIONS: OnceLock<Regex> = OnceLock::new();
    static RESULTS: OnceLock<Regex> = OnceLock::new();
    static WHITESPACE: OnceLock<Regex> = OnceLock::new();

    let mut text = strip_comments_and_tags(pgn);

    // innermost first until no variations remain
    let variations = cached(&VARIATIONS, r"\([^()]*\)");
    while variations.is_match(&text) {
        text = variations.replace_all(&text, " ").into_owned();
    }

    let text = cached(&NAGS, r"\$\d+").replace_all(&text, " ");
    let text = cached(&EN_PASSANT, r"\be\.p\.").replace_all(&text, " ");
    let text = cached(&ANNOTATIONS, r"[!?]+").replace_all(&text, "");
    let text = cached(&RESULTS, r"(?:^|\s)(?:1-0|0-1|1/2-1/2|\*)(?:\s|$)").replace_all(&text, " ");
    cached(&WHITESPACE, r"\s+")
        .replace_all(&text, " ")
        .trim()
        .to_string()
}

/// Split cleaned movetext into move-number markers and SAN half-moves.
pub fn tokenize(movetext: &str) -> Vec<PgnToken> {
    fn push_sans(chunk: &str, tokens: &mut Vec<PgnToken>) {
        tokens.extend(chunk.split_whitespace().map(|s| PgnToken::San(s.to_string())));
    }

    let mut tokens = Vec::new();
    let mut last = 0;
    for cap in move_number_re().captures_iter(movetext) {
        let Some(whole) = cap.get(0) else {
            continue;
        };
        push_sans(&movetext[last..whole.start()], &mut tokens);
        tokens.push(PgnToken::MoveNumber {
            text: whole.as_str().to_string(),
            number: cap[1].parse().unwrap_or(0),
            black_to_move: &cap[2] == "...",
        });
        last = whole.end();
    }
    push_sans(&movetext[last..], &mut tokens);
    tokens
}

/// Black moves first only when the movetext opens with `N...`.
pub fn starting_colour(tokens: &[PgnToken]) -> Colour {
    match tokens.first() {
        Some(PgnToken::MoveNumber {
            black_to_move: true,
            ..
        }) => Colour::Black,
        _ => Colour::White,
    }
}

/// Replay PGN text from the standard starting position. The first element
/// is the starting position; one more follows per half-move. The engine is
/// left on the final position, or wherever the failing move stopped it.
pub fn replay<E: BoardEngine>(
    pgn: &str,
    engine: &mut E,
) -> Result<Vec<ReplayedPosition>, ReplayError> {
    let tags = headers(pgn);
    if tags.get("SetUp").map(String::as_str) == Some("1") {
        if let Some(fen) = tags.get("FEN") {
            if fen.split_whitespace().next() != Some(STARTING_BOARD) {
                return Err(ReplayError::UnsupportedSetup(fen.clone()));
            }
        }
    }

    let tokens = tokenize(&pre_clean(pgn));

    engine.reset();
    engine.set_active_colour(starting_colour(&tokens));

    let mut positions = vec![ReplayedPosition {
        snapshot: engine.snapshot(),
        san: None,
    }];

    let mut move_number = NO_MOVE_NUMBER.to_string();
    for token in tokens {
        match token {
            PgnToken::MoveNumber { text, .. } => move_number = text,
            PgnToken::San(san) => {
                let played = play_san(engine, &move_number, &san)?;
                debug!(move_number = %move_number, san = %played, "replayed half-move");
                positions.push(ReplayedPosition {
                    snapshot: engine.snapshot(),
                    san: Some(played),
                });
            }
        }
    }

    if positions.len() == 1 {
        return Err(ReplayError::NothingToImport);
    }
    Ok(positions)
}

/// Resolve and play one SAN half-move, returning the engine's SAN for it.
fn play_san<E: BoardEngine>(
    engine: &mut E,
    move_number: &str,
    san: &str,
) -> Result<String, ReplayError> {
    let context = || (move_number.to_string(), san.to_string());

    let parsed = parse_san(san).map_err(|e| {
        let (move_number, san) = context();
        ReplayError::Unparseable {
            move_number,
            san,
            reason: e.to_string(),
        }
    })?;

    let colour = engine.active_colour();
    let (from, to, promotion) = match parsed {
        SanMove::CastleKingSide | SanMove::CastleQueenSide => {
            let king_side = parsed == SanMove::CastleKingSide;
            if !engine.castling_availability().has(colour, king_side) {
                let (move_number, san) = context();
                return Err(ReplayError::CastlingUnavailable { move_number, san });
            }
            let from = engine.king_index(colour).ok_or_else(|| {
                let (move_number, san) = context();
                ReplayError::NoSourceSquare { move_number, san }
            })?;
            let rank_start = from - from % 8;
            let to = if king_side { rank_start + 6 } else { rank_start + 2 };
            (from, to, None)
        }
        SanMove::PawnPush { to, promotion } => {
            let pawn = Spin::new(colour, PieceKind::Pawn);
            (find_from(engine, to, pawn, file_mask(to % 8), &context)?, to, promotion)
        }
        SanMove::PawnCapture {
            from_file,
            to,
            promotion,
        } => {
            let pawn = Spin::new(colour, PieceKind::Pawn);
            (find_from(engine, to, pawn, file_mask(from_file), &context)?, to, promotion)
        }
        SanMove::Piece { kind, from, to, .. } => {
            let spin = Spin::new(colour, kind);
            (find_from(engine, to, spin, from.candidates(), &context)?, to, None)
        }
    };

    engine
        .play(from, to, promotion, true, true)
        .map(|played| played.san)
        .map_err(|e| {
            let (move_number, san) = context();
            ReplayError::IllegalMove {
                move_number,
                san,
                reason: e.to_string(),
            }
        })
}

fn find_from<E: BoardEngine>(
    engine: &E,
    to: u8,
    spin: Spin,
    candidates: u64,
    context: &dyn Fn() -> (String, String),
) -> Result<u8, ReplayError> {
    engine.find_from_index(to, spin, candidates).ok_or_else(|| {
        let (move_number, san) = context();
        ReplayError::NoSourceSquare { move_number, san }
    })
}
