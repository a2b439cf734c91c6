//! `<Records>` export format, optionally gzip-compressed.
//!
//! ```xml
//! <Records>
//!   <GameRecord>
//!     <Id>1</Id>
//!     <BoardSquareStr>rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR</BoardSquareStr>
//!     <GameStateStr>1,15,0,1,0,0,-1,0</GameStateStr>
//!   </GameRecord>
//! </Records>
//! ```

use std::io::{Cursor, Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::StoreError;
use crate::record::Record;

const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];

const ROOT: &str = "Records";
const RECORD: &str = "GameRecord";
const ID: &str = "Id";
const BOARD: &str = "BoardSquareStr";
const STATE: &str = "GameStateStr";
const SAN: &str = "MoveSANStr";

fn xml_err(e: impl std::fmt::Display) -> StoreError {
    StoreError::Xml(e.to_string())
}

/// Compression is detected from content, never from a file name.
pub fn is_gzip(bytes: &[u8]) -> bool {
    bytes.starts_with(&GZIP_MAGIC)
}

pub fn write_records<W: Write>(
    mut writer: W,
    records: &[&Record],
    compress: bool,
) -> Result<(), StoreError> {
    let document = render(records)?;
    if compress {
        let mut encoder = GzEncoder::new(writer, Compression::default());
        encoder.write_all(&document)?;
        encoder.finish()?.flush()?;
    } else {
        writer.write_all(&document)?;
        writer.flush()?;
    }
    Ok(())
}

fn render(records: &[&Record]) -> Result<Vec<u8>, StoreError> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(xml_err)?;
    writer
        .write_event(Event::Start(BytesStart::new(ROOT)))
        .map_err(xml_err)?;

    for record in records {
        writer
            .write_event(Event::Start(BytesStart::new(RECORD)))
            .map_err(xml_err)?;
        text_element(&mut writer, ID, &record.id.to_string())?;
        text_element(&mut writer, BOARD, &record.board_str())?;
        text_element(&mut writer, STATE, &record.state_str())?;
        if let Some(san) = &record.move_san {
            text_element(&mut writer, SAN, san)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new(RECORD)))
            .map_err(xml_err)?;
    }

    writer
        .write_event(Event::End(BytesEnd::new(ROOT)))
        .map_err(xml_err)?;
    Ok(writer.into_inner().into_inner())
}

fn text_element<W: Write>(writer: &mut Writer<W>, name: &str, text: &str) -> Result<(), StoreError> {
    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .map_err(xml_err)?;
    writer
        .write_event(Event::Text(BytesText::new(text)))
        .map_err(xml_err)?;
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(xml_err)?;
    Ok(())
}

#[derive(Default)]
struct PendingRecord {
    id: Option<String>,
    board: Option<String>,
    state: Option<String>,
    san: Option<String>,
}

impl PendingRecord {
    fn finish(self, position: usize) -> Result<Record, StoreError> {
        let missing = |field: &str| xml_err(format!("record {position} has no <{field}>"));
        let id_text = self.id.ok_or_else(|| missing(ID))?;
        let id = id_text
            .trim()
            .parse::<i64>()
            .map_err(|_| xml_err(format!("record {position} has a bad <{ID}>: {id_text}")))?;
        let board = self.board.ok_or_else(|| missing(BOARD))?;
        let state = self.state.ok_or_else(|| missing(STATE))?;
        Record::from_columns(id, &board, &state, self.san)
    }
}

/// Parse a `<Records>` document, plain or gzip. Records are returned in
/// document order; contiguity is the caller's check.
pub fn read_records(bytes: &[u8]) -> Result<Vec<Record>, StoreError> {
    let inflated;
    let document = if is_gzip(bytes) {
        let mut buf = Vec::new();
        GzDecoder::new(bytes).read_to_end(&mut buf)?;
        inflated = buf;
        inflated.as_slice()
    } else {
        bytes
    };

    let mut reader = Reader::from_reader(document);
    reader.trim_text(true);

    let mut records = Vec::new();
    let mut pending: Option<PendingRecord> = None;
    let mut field: Option<String> = None;
    let mut saw_root = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf).map_err(xml_err)? {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                match name.as_str() {
                    ROOT => saw_root = true,
                    RECORD => pending = Some(PendingRecord::default()),
                    _ => field = Some(name),
                }
            }
            Event::Text(t) => {
                let text = t.unescape().map_err(xml_err)?.into_owned();
                if let (Some(record), Some(name)) = (pending.as_mut(), field.as_deref()) {
                    match name {
                        ID => record.id = Some(text),
                        BOARD => record.board = Some(text),
                        STATE => record.state = Some(text),
                        SAN => record.san = Some(text),
                        _ => {}
                    }
                }
            }
            Event::End(e) => {
                if e.name().as_ref() == RECORD.as_bytes() {
                    let record = pending
                        .take()
                        .ok_or_else(|| xml_err("unbalanced </GameRecord>"))?;
                    records.push(record.finish(records.len() + 1)?);
                }
                field = None;
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !saw_root {
        return Err(xml_err(format!("missing <{ROOT}> root element")));
    }
    if pending.is_some() {
        return Err(xml_err(format!("unterminated <{RECORD}>")));
    }
    Ok(records)
}
