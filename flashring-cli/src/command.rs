//! Text command parsing
//!
//! One line is one command. The keyword is matched case-insensitively and the
//! arguments keep their case, so `WRITE 1000 Hello` stores `Hello`. This
//! differs from the serial firmware console, which lowercases the whole line
//! before parsing and would store `hello`.
//!
//! # Argument formats
//!
//! - Addresses are hexadecimal, with or without a `0x` prefix: `1000`, `0x1000`
//! - `writeb` bytes are a comma-separated list of decimal or `0x` hex values
//! - `readb` lengths are decimal, 1 to 256

use std::fmt;

/// Largest payload accepted by `writeb`, `readb` and `readrange`.
pub const MAX_TRANSFER: usize = 256;

/// A parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `write <addr> <text>`: store a string record.
    Write { addr: u32, text: String },
    /// `writeb <addr> <b0,b1,...>`: erase then program raw bytes.
    WriteBytes { addr: u32, bytes: Vec<u8> },
    /// `read <addr>`: read a string record.
    Read { addr: u32 },
    /// `readb <addr> <len>`: hex-dump raw bytes.
    ReadBytes { addr: u32, len: usize },
    /// `readrange <start> <end>`: hex-dump an inclusive range.
    ReadRange { start: u32, end: u32 },
    /// `erase <addr>`: erase the enclosing sector.
    Erase { addr: u32 },
    /// `eraserange <start> <end>`: erase every sector in the range.
    EraseRange { start: u32, end: u32 },
    /// `eraseall`: chip erase after confirmation.
    EraseAll,
    /// `readall`: full-device dump.
    ReadAll,
    /// `info`: chip identification.
    Info,
    /// `help`: command menu.
    Help,
    /// `ring <sub>`: ring buffer control.
    Ring(RingCommand),
}

/// Subcommands of `ring`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RingCommand {
    /// Scan the device for the write frontier.
    Init,
    /// Append a text record.
    Write(String),
    /// Show the cursor.
    Pos,
    /// Force the cursor to a sector start.
    SetPos(u32),
    /// Move the cursor back to 0.
    Reset,
    /// Reject new appends.
    Pause,
    /// Accept appends again.
    Resume,
    /// Pause and wait for in-flight writers.
    Drain,
    /// Show phase, cursor and pause flag.
    Status,
}

/// Malformed command input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Keyword not recognized.
    UnknownCommand(String),
    /// Missing or extra arguments; holds the usage text.
    Usage(&'static str),
    /// Address that is not a hexadecimal `u32`.
    BadHex(String),
    /// `writeb` value that is not a byte.
    BadByte(String),
    /// Length outside 1 to 256.
    BadLength(String),
    /// `readrange` end before start.
    InvalidRange { start: u32, end: u32 },
    /// Range or byte list over 256 bytes.
    TooLarge(usize),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownCommand(cmd) => write!(f, "Unknown command: {}", cmd),
            Self::Usage(usage) => write!(f, "Usage: {}", usage),
            Self::BadHex(s) => write!(f, "Invalid hex address: {}", s),
            Self::BadByte(s) => write!(f, "Invalid byte value: {}", s),
            Self::BadLength(s) => write!(f, "Length must be 1-{}, got {}", MAX_TRANSFER, s),
            Self::InvalidRange { start, end } => {
                write!(f, "Invalid address range 0x{:08X} to 0x{:08X}", start, end)
            }
            Self::TooLarge(n) => write!(f, "Range too large ({} bytes, max {})", n, MAX_TRANSFER),
        }
    }
}

impl std::error::Error for CommandError {}

/// Parse a hexadecimal address with an optional `0x`/`0X` prefix.
pub fn parse_hex(s: &str) -> Result<u32, CommandError> {
    let s = s.trim();
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u32::from_str_radix(digits, 16).map_err(|_| CommandError::BadHex(s.to_string()))
}

fn parse_byte(s: &str) -> Result<u8, CommandError> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse::<u8>(),
    };
    parsed.map_err(|_| CommandError::BadByte(s.to_string()))
}

fn parse_len(s: &str) -> Result<usize, CommandError> {
    match s.trim().parse::<usize>() {
        Ok(n) if (1..=MAX_TRANSFER).contains(&n) => Ok(n),
        _ => Err(CommandError::BadLength(s.trim().to_string())),
    }
}

/// Split off the first space-delimited token.
fn split_word(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim_start()),
        None => (s, ""),
    }
}

/// Parse exactly one address argument.
fn one_addr(args: &str, usage: &'static str) -> Result<u32, CommandError> {
    match args.split_whitespace().collect::<Vec<_>>().as_slice() {
        [addr] => parse_hex(addr),
        _ => Err(CommandError::Usage(usage)),
    }
}

/// Parse exactly two address arguments.
fn two_addrs(args: &str, usage: &'static str) -> Result<(u32, u32), CommandError> {
    match args.split_whitespace().collect::<Vec<_>>().as_slice() {
        [start, end] => Ok((parse_hex(start)?, parse_hex(end)?)),
        _ => Err(CommandError::Usage(usage)),
    }
}

fn no_args(args: &str, cmd: Command, usage: &'static str) -> Result<Command, CommandError> {
    if args.is_empty() {
        Ok(cmd)
    } else {
        Err(CommandError::Usage(usage))
    }
}

impl Command {
    /// Parse one line. Blank lines parse to `None`.
    pub fn parse(line: &str) -> Result<Option<Self>, CommandError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let (keyword, args) = split_word(line);
        let command = match keyword.to_ascii_lowercase().as_str() {
            "write" => {
                const USAGE: &str = "write <addr> <data>";
                let (addr, text) = split_word(args);
                if addr.is_empty() || text.is_empty() {
                    return Err(CommandError::Usage(USAGE));
                }
                Command::Write {
                    addr: parse_hex(addr)?,
                    text: text.to_string(),
                }
            }
            "writeb" => {
                const USAGE: &str = "writeb <addr> <byte1,byte2,...>";
                let (addr, list) = split_word(args);
                if addr.is_empty() || list.is_empty() {
                    return Err(CommandError::Usage(USAGE));
                }
                let addr = parse_hex(addr)?;
                let bytes = list
                    .split(',')
                    .map(parse_byte)
                    .collect::<Result<Vec<_>, _>>()?;
                if bytes.len() > MAX_TRANSFER {
                    return Err(CommandError::TooLarge(bytes.len()));
                }
                Command::WriteBytes { addr, bytes }
            }
            "read" => Command::Read {
                addr: one_addr(args, "read <addr>")?,
            },
            "readb" => match args.split_whitespace().collect::<Vec<_>>().as_slice() {
                [addr, len] => Command::ReadBytes {
                    addr: parse_hex(addr)?,
                    len: parse_len(len)?,
                },
                _ => return Err(CommandError::Usage("readb <addr> <length>")),
            },
            "readrange" => {
                let (start, end) = two_addrs(args, "readrange <start> <end>")?;
                if start > end {
                    return Err(CommandError::InvalidRange { start, end });
                }
                let len = (end - start) as usize + 1;
                if len > MAX_TRANSFER {
                    return Err(CommandError::TooLarge(len));
                }
                Command::ReadRange { start, end }
            }
            "erase" => Command::Erase {
                addr: one_addr(args, "erase <addr>")?,
            },
            "eraserange" => {
                let (start, end) = two_addrs(args, "eraserange <start> <end>")?;
                Command::EraseRange { start, end }
            }
            "eraseall" => no_args(args, Command::EraseAll, "eraseall")?,
            "readall" => no_args(args, Command::ReadAll, "readall")?,
            "info" => no_args(args, Command::Info, "info")?,
            "help" => no_args(args, Command::Help, "help")?,
            "ring" => Command::Ring(RingCommand::parse(args)?),
            _ => return Err(CommandError::UnknownCommand(keyword.to_string())),
        };
        Ok(Some(command))
    }

    /// Whether running the command can change flash content.
    pub fn mutates_flash(&self) -> bool {
        matches!(
            self,
            Command::Write { .. }
                | Command::WriteBytes { .. }
                | Command::Erase { .. }
                | Command::EraseRange { .. }
                | Command::EraseAll
                | Command::Ring(RingCommand::Write(_))
        )
    }
}

impl RingCommand {
    const USAGE: &'static str =
        "ring <init|write <data>|pos|setpos <addr>|reset|pause|resume|drain|status>";

    fn parse(args: &str) -> Result<Self, CommandError> {
        let (sub, rest) = split_word(args);
        let simple = |cmd: RingCommand| {
            if rest.is_empty() {
                Ok(cmd)
            } else {
                Err(CommandError::Usage(Self::USAGE))
            }
        };
        match sub.to_ascii_lowercase().as_str() {
            "init" => simple(RingCommand::Init),
            "write" if !rest.is_empty() => Ok(RingCommand::Write(rest.to_string())),
            "pos" => simple(RingCommand::Pos),
            "setpos" => Ok(RingCommand::SetPos(one_addr(rest, "ring setpos <addr>")?)),
            "reset" => simple(RingCommand::Reset),
            "pause" => simple(RingCommand::Pause),
            "resume" => simple(RingCommand::Resume),
            "drain" => simple(RingCommand::Drain),
            "status" => simple(RingCommand::Status),
            _ => Err(CommandError::Usage(Self::USAGE)),
        }
    }
}

/// Help menu, one line per entry.
pub const MENU: &[&str] = &[
    "========== FLASH MEMORY COMMANDS ==========",
    "Write Commands:",
    "  write <addr> <data>       - Write string to address (hex)",
    "  writeb <addr> <bytes>     - Write bytes (e.g., writeb 1000 0,1,2,3)",
    "Read Commands:",
    "  read <addr>               - Read string from address (hex)",
    "  readb <addr> <len>        - Read bytes (e.g., readb 1000 16)",
    "  readrange <start> <end>   - Read address range (hex, max 256 bytes)",
    "  readall                   - Dump entire flash",
    "Erase Commands:",
    "  erase <addr>              - Erase sector at address (hex)",
    "  eraserange <start> <end>  - Erase address range (hex)",
    "  eraseall                  - Erase entire chip (CAUTION!)",
    "Ring Buffer Commands:",
    "  ring init                 - Scan flash for the write position",
    "  ring write <data>         - Append a record",
    "  ring pos                  - Show the write position",
    "  ring setpos <addr>        - Set the write position (sector aligned)",
    "  ring reset                - Set the write position to 0",
    "  ring pause | ring resume  - Reject or accept new appends",
    "  ring drain                - Pause and wait for running appends",
    "  ring status               - Show ring buffer state",
    "Info Commands:",
    "  info                      - Show flash chip information",
    "  help                      - Show this menu",
    "===========================================",
];
