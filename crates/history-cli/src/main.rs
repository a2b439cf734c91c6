//! Chess game history CLI
//!
//! Keeps the move-by-move history of a game in SQLite, imports PGN,
//! exports/imports the XML record format, and prints the animation steps
//! between two records.

mod config;

use std::fs;
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::{bail, Context};
use chess_core::snapshot::{parse_square, square_name, squares};
use chess_core::{BoardEngine, BoardSnapshot, PieceKind, ShakmatyEngine};
use record_store::{InstanceId, Record, RecordStore, SqliteStorage, StorageStatus};
use tracing::info;

use crate::config::CliConfig;

const USAGE: &str = "usage: chess-history <command>

commands:
  status                      report storage status without changing it
  show [--json]               list every record
  play <from> <to> [piece]    play a move and record it (e.g. play e7 e8 n)
  edit <id> <board>           replace a record's piece placement
  undo                        remove the latest record
  reset                       start a new game
  diff <id-a> <id-b>          changed squares and animation steps
  import-pgn <file>           replace the history with a PGN game
  export <file> [--gzip]      write the history as XML
  import-xml <file>           replace the history from an XML export";

#[derive(Debug)]
enum Command {
    Status,
    Show { json: bool },
    Play { from: u8, to: u8, promotion: Option<PieceKind> },
    Edit { id: i64, board: String },
    Undo,
    Reset,
    Diff { a: i64, b: i64 },
    ImportPgn(PathBuf),
    Export { path: PathBuf, gzip: bool },
    ImportXml(PathBuf),
}

fn square_arg(arg: Option<&String>) -> anyhow::Result<u8> {
    let text = arg.context("missing square")?;
    parse_square(text).with_context(|| format!("not a square: {text}"))
}

fn id_arg(arg: Option<&String>) -> anyhow::Result<i64> {
    let text = arg.context("missing record id")?;
    text.parse()
        .with_context(|| format!("not a record id: {text}"))
}

fn path_arg(arg: Option<&String>) -> anyhow::Result<PathBuf> {
    arg.map(PathBuf::from).context("missing file argument")
}

fn parse_command(args: &[String]) -> anyhow::Result<Command> {
    let Some(name) = args.first() else {
        bail!("{USAGE}");
    };
    let has_flag = |flag: &str| args[1..].iter().any(|a| a == flag);

    let command = match name.as_str() {
        "status" => Command::Status,
        "show" => Command::Show {
            json: has_flag("--json"),
        },
        "play" => {
            let promotion = match args.get(3) {
                None => None,
                Some(letter) => {
                    let kind = letter
                        .chars()
                        .next()
                        .and_then(|c| PieceKind::from_letter(c.to_ascii_uppercase()));
                    Some(kind.with_context(|| format!("not a piece: {letter}"))?)
                }
            };
            Command::Play {
                from: square_arg(args.get(1))?,
                to: square_arg(args.get(2))?,
                promotion,
            }
        }
        "edit" => Command::Edit {
            id: id_arg(args.get(1))?,
            board: args.get(2).cloned().context("missing board")?,
        },
        "undo" => Command::Undo,
        "reset" => Command::Reset,
        "diff" => Command::Diff {
            a: id_arg(args.get(1))?,
            b: id_arg(args.get(2))?,
        },
        "import-pgn" => Command::ImportPgn(path_arg(args.get(1))?),
        "export" => Command::Export {
            path: path_arg(args.get(1))?,
            gzip: has_flag("--gzip"),
        },
        "import-xml" => Command::ImportXml(path_arg(args.get(1))?),
        other => bail!("unknown command: {other}\n\n{USAGE}"),
    };
    Ok(command)
}

fn open_store(config: &CliConfig) -> anyhow::Result<RecordStore<ShakmatyEngine>> {
    let instance = InstanceId::new(config.instance);
    let storage = if config.create {
        SqliteStorage::open_or_create(&config.db_path, instance)
    } else {
        SqliteStorage::open(&config.db_path, instance)
    }
    .with_context(|| format!("opening {}", config.db_path.display()))?;

    let store = RecordStore::open(ShakmatyEngine::new(), storage).context("loading records")?;
    Ok(store)
}

fn print_record(record: &Record) {
    println!(
        "{:>4}  {:<10} {}  [{}]",
        record.id,
        record.move_san.as_deref().unwrap_or("-"),
        record.board_str(),
        record.state_str()
    );
}

fn run(config: CliConfig, command: Command) -> anyhow::Result<()> {
    if let Command::Status = command {
        let status =
            SqliteStorage::check_status(&config.db_path, InstanceId::new(config.instance));
        println!("{}: {status}", config.db_path.display());
        if status != StorageStatus::Ready {
            bail!("storage not ready");
        }
        return Ok(());
    }

    let mut store = open_store(&config)?;

    match command {
        Command::Status => {}
        Command::Show { json } => {
            if json {
                let records: Vec<&Record> = store.game_history().collect();
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                store.game_history().for_each(print_record);
            }
        }
        Command::Play { from, to, promotion } => {
            let played = store
                .engine_mut()
                .play(from, to, promotion, true, true)
                .context("move rejected")?;
            let rows = store.record_game_state(0, 0, Some(&played.san))?;
            if rows == 0 {
                bail!("record was not written");
            }
            if let Some(latest) = store.latest() {
                print_record(latest);
            }
        }
        Command::Edit { id, board } => {
            let Some(record) = store.get(id) else {
                bail!("no record {id}");
            };
            let pieces = chess_core::snapshot::parse_board_str(&board)?;
            let snapshot = BoardSnapshot::new(pieces, *record.snapshot.state())?;
            let rows = store.update_game_state(Record::new(id, snapshot, None))?;
            println!("updated {rows} record(s)");
        }
        Command::Undo => {
            if store.undo()? {
                println!("undone, {} record(s) left", store.record_count());
            } else {
                println!("nothing to undo");
            }
        }
        Command::Reset => {
            store.reset(0, 0)?;
            println!("new game started");
        }
        Command::Diff { a, b } => {
            let changed: Vec<String> = squares(store.square_changes(a, b))
                .map(square_name)
                .collect();
            println!("changed squares: {}", changed.join(" "));
            let plan = store.animation_plan(a, b);
            if let Some(side) = chess_core::diff::moving_side(&plan) {
                println!("moving side: {side:?}");
            }
            for step in &plan {
                println!("{}", serde_json::to_string(step)?);
            }
        }
        Command::ImportPgn(path) => {
            let text = fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let count = store.import_pgn(&text)?;
            println!("imported {count} record(s)");
        }
        Command::Export { path, gzip } => {
            let file = fs::File::create(&path)
                .with_context(|| format!("creating {}", path.display()))?;
            store.export_xml(BufWriter::new(file), gzip)?;
            println!("exported {} record(s) to {}", store.record_count(), path.display());
        }
        Command::ImportXml(path) => {
            let bytes = fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
            let count = store.import_xml(&bytes)?;
            println!("imported {count} record(s)");
        }
    }

    info!(
        records = store.record_count(),
        side_to_move = ?store.engine().active_colour(),
        "Done"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    // Load .env file for local dev
    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = parse_command(&args)?;
    let config = CliConfig::load()?;
    info!(
        db = %config.db_path.display(),
        instance = config.instance,
        create = config.create,
        "Config loaded"
    );

    // SQLite calls block; keep them off the async runtime.
    tokio::task::spawn_blocking(move || run(config, command))
        .await
        .context("storage task panicked")?
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_play_with_promotion() {
        match parse_command(&args(&["play", "e7", "e8", "n"])).unwrap() {
            Command::Play { from, to, promotion } => {
                assert_eq!(from, 52);
                assert_eq!(to, 60);
                assert_eq!(promotion, Some(PieceKind::Knight));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_export_flag() {
        match parse_command(&args(&["export", "out.xml", "--gzip"])).unwrap() {
            Command::Export { path, gzip } => {
                assert_eq!(path, PathBuf::from("out.xml"));
                assert!(gzip);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(parse_command(&args(&[])).is_err());
        assert!(parse_command(&args(&["fly"])).is_err());
        assert!(parse_command(&args(&["diff", "1"])).is_err());
        assert!(parse_command(&args(&["play", "e2", "z9"])).is_err());
    }
}
