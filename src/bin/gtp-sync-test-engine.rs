//! Minimal GTP engine used by the integration tests.
//!
//! It only records moves (no capture or ko rules), but it can hide optional
//! commands and can die after a fixed number of commands, which makes the
//! synchronizer's capability and failure paths testable against a real
//! subprocess.

use anyhow::Result;
use clap::Parser;
use gtp_sync::game::{Color, Komi, Move, Point, Position, PositionSource, MAX_BOARD_SIZE};
use gtp_sync::gtp::protocol::{GG_UNDO, GOGUI_PLAY_SEQUENCE, KOMI, PLAY_SEQUENCE, UNDO};
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};

/// Prints the recorded moves, one per line.
const DUMP_MOVES: &str = "gtp-sync-moves";

#[derive(Parser, Debug)]
#[command(name = "gtp-sync-test-engine", version)]
struct Args {
    /// Do not advertise or accept `undo`
    #[arg(long)]
    no_undo: bool,

    /// Do not advertise or accept `gg-undo`
    #[arg(long)]
    no_gg_undo: bool,

    /// Do not advertise or accept the play sequence commands
    #[arg(long)]
    no_play_sequence: bool,

    /// Do not advertise or accept `komi`
    #[arg(long)]
    no_komi: bool,

    /// Exit without answering once this many commands were handled
    #[arg(long)]
    fail_after: Option<usize>,
}

struct TestEngine {
    args: Args,
    position: Position,
}

impl TestEngine {
    fn new(args: Args) -> Self {
        Self {
            args,
            position: Position::new(19),
        }
    }

    fn commands(&self) -> Vec<&'static str> {
        let mut names = vec![
            "protocol_version",
            "name",
            "version",
            "known_command",
            "list_commands",
            "boardsize",
            "clear_board",
            "play",
            "genmove",
            DUMP_MOVES,
            "quit",
        ];
        if !self.args.no_komi {
            names.push(KOMI);
        }
        if !self.args.no_undo {
            names.push(UNDO);
        }
        if !self.args.no_gg_undo {
            names.push(GG_UNDO);
        }
        if !self.args.no_play_sequence {
            names.push(GOGUI_PLAY_SEQUENCE);
            names.push(PLAY_SEQUENCE);
        }
        names
    }

    fn knows(&self, name: &str) -> bool {
        self.commands().iter().any(|c| *c == name)
    }

    fn handle(&mut self, name: &str, args: &[&str]) -> std::result::Result<String, String> {
        if !self.knows(name) {
            return Err("unknown command".to_string());
        }

        match name {
            "protocol_version" => Ok("2".to_string()),
            "name" => Ok("gtp-sync-test-engine".to_string()),
            "version" => Ok(env!("CARGO_PKG_VERSION").to_string()),
            "known_command" => {
                let known = args.first().is_some_and(|a| self.knows(a));
                Ok(known.to_string())
            }
            "list_commands" => Ok(self.commands().join("\n")),
            "boardsize" => {
                let size: usize = args
                    .first()
                    .and_then(|a| a.parse().ok())
                    .ok_or("boardsize not an integer")?;
                if size == 0 || size > MAX_BOARD_SIZE {
                    return Err("unacceptable size".to_string());
                }
                let komi = self.position.komi();
                self.position = Position::new(size);
                self.position.set_komi(komi);
                Ok(String::new())
            }
            "clear_board" => {
                self.position.truncate(0);
                Ok(String::new())
            }
            KOMI => {
                let komi: f64 = args
                    .first()
                    .and_then(|a| a.parse().ok())
                    .ok_or("komi not a float")?;
                self.position.set_komi(Some(Komi(komi)));
                Ok(String::new())
            }
            "play" => {
                if args.len() != 2 {
                    return Err("invalid color or coordinate".to_string());
                }
                let mv = self.parse_moves(args)?;
                self.apply(&mv)?;
                Ok(String::new())
            }
            GOGUI_PLAY_SEQUENCE | PLAY_SEQUENCE => {
                let moves = self.parse_moves(args)?;
                self.apply(&moves)?;
                Ok(String::new())
            }
            UNDO => self
                .position
                .undo()
                .map(|_| String::new())
                .ok_or_else(|| "cannot undo".to_string()),
            GG_UNDO => {
                let count: usize = match args.first() {
                    Some(a) => a.parse().map_err(|_| "count not an integer")?,
                    None => 1,
                };
                let len = self.position.move_count();
                if count > len {
                    return Err("cannot undo".to_string());
                }
                self.position.truncate(len - count);
                Ok(String::new())
            }
            "genmove" => {
                let color: Color = args
                    .first()
                    .ok_or("missing color")?
                    .parse()
                    .map_err(|e: gtp_sync::SyncError| e.to_string())?;
                let mv = match self.first_free_point() {
                    Some(point) => Move::play(color, point),
                    None => Move::pass(color),
                };
                self.position.play(mv);
                Ok(match mv.point {
                    Some(point) => point.to_string(),
                    None => "pass".to_string(),
                })
            }
            DUMP_MOVES => Ok(self
                .position
                .as_slice()
                .iter()
                .map(Move::to_string)
                .collect::<Vec<_>>()
                .join("\n")),
            _ => Ok(String::new()),
        }
    }

    /// Parse `color vertex` pairs.
    fn parse_moves(&self, args: &[&str]) -> std::result::Result<Vec<Move>, String> {
        if args.is_empty() || args.len() % 2 != 0 {
            return Err("invalid color or coordinate".to_string());
        }
        args.chunks(2)
            .map(|pair| {
                Move::parse(&pair.join(" "), self.position.size()).map_err(|e| e.to_string())
            })
            .collect()
    }

    /// Apply all moves or none.
    fn apply(&mut self, moves: &[Move]) -> std::result::Result<(), String> {
        let mut next = self.position.clone();
        for mv in moves {
            if let Some(point) = mv.point {
                if next.as_slice().iter().any(|m| m.point == Some(point)) {
                    return Err("illegal move".to_string());
                }
            }
            next.play(*mv);
        }
        self.position = next;
        Ok(())
    }

    fn first_free_point(&self) -> Option<Point> {
        let size = self.position.size() as u8;
        let taken: Vec<Point> = self.position.as_slice().iter().filter_map(|m| m.point).collect();
        (0..size)
            .flat_map(|row| (0..size).map(move |col| Point::new(col, row)))
            .find(|p| !taken.contains(p))
    }
}

fn format_response(id: Option<&str>, result: &std::result::Result<String, String>) -> String {
    let (status, text) = match result {
        Ok(text) => ('=', text.as_str()),
        Err(text) => ('?', text.as_str()),
    };
    let id = id.unwrap_or_default();
    if text.is_empty() {
        format!("{}{}\n\n", status, id)
    } else {
        format!("{}{} {}\n\n", status, id, text)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    let fail_after = args.fail_after;
    let mut engine = TestEngine::new(args);

    let mut lines = BufReader::new(io::stdin()).lines();
    let mut stdout = io::stdout();
    let mut handled = 0usize;

    while let Some(line) = lines.next_line().await? {
        let line = line.split('#').next().unwrap_or_default().trim().to_string();
        if line.is_empty() {
            continue;
        }

        if fail_after == Some(handled) {
            std::process::exit(1);
        }
        handled += 1;

        let mut tokens: Vec<&str> = line.split_whitespace().collect();
        let id = if tokens[0].chars().all(|c| c.is_ascii_digit()) {
            Some(tokens.remove(0))
        } else {
            None
        };
        let Some((&name, rest)) = tokens.split_first() else {
            continue;
        };

        let result = engine.handle(name, rest);
        stdout
            .write_all(format_response(id, &result).as_bytes())
            .await?;
        stdout.flush().await?;

        if name == "quit" {
            break;
        }
    }

    Ok(())
}
