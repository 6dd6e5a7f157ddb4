//! Line-oriented command dispatcher
//!
//! Reads command lines from any async buffered reader, runs them against a
//! [`FlashEngine`] and answers with tagged text lines on any async writer.
//! Command input and the `eraseall` confirmation share the same line stream.

use std::fmt;
use std::io;
use std::time::Duration;

use flashring::{Address, FlashDevice, FlashEngine, FlashError, MAX_STR_LEN};
use log::{debug, warn};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, Lines};

use crate::command::{Command, CommandError, MAX_TRANSFER, MENU, RingCommand};
use crate::hexdump;

/// Chunk size for `readall`.
const DUMP_CHUNK: usize = 256;

/// Response line tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Ok,
    Info,
    Data,
    Progress,
    Warn,
    Error,
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Tag::Ok => "[OK]",
            Tag::Info => "[INFO]",
            Tag::Data => "[DATA]",
            Tag::Progress => "[PROGRESS]",
            Tag::Warn => "[WARN]",
            Tag::Error => "[ERROR]",
        })
    }
}

/// Drives a [`FlashEngine`] from text commands.
pub struct Dispatcher<'a, D, R, W> {
    engine: &'a FlashEngine<D>,
    input: Lines<R>,
    out: W,
    confirm_timeout: Duration,
}

impl<'a, D, R, W> Dispatcher<'a, D, R, W>
where
    D: FlashDevice,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(engine: &'a FlashEngine<D>, input: R, out: W, confirm_timeout: Duration) -> Self {
        Self {
            engine,
            input: input.lines(),
            out,
            confirm_timeout,
        }
    }

    /// The engine commands run against.
    pub fn engine(&self) -> &'a FlashEngine<D> {
        self.engine
    }

    /// Next input line, or `None` at end of input.
    pub async fn next_line(&mut self) -> io::Result<Option<String>> {
        self.input.next_line().await
    }

    /// Write one tagged response line.
    pub async fn say(&mut self, tag: Tag, msg: impl fmt::Display) -> io::Result<()> {
        let line = format!("{} {}\n", tag, msg);
        self.out.write_all(line.as_bytes()).await
    }

    /// Flush buffered output.
    pub async fn flush(&mut self) -> io::Result<()> {
        self.out.flush().await
    }

    /// Run one command line.
    ///
    /// Returns whether the command may have changed flash content, so the
    /// caller knows when to persist. Engine and parse errors are reported as
    /// `[ERROR]` lines; only output I/O errors are returned.
    pub async fn execute(&mut self, line: &str) -> io::Result<bool> {
        let command = match Command::parse(line) {
            Ok(Some(command)) => command,
            Ok(None) => return Ok(false),
            Err(e) => {
                self.say(Tag::Error, &e).await?;
                if matches!(e, CommandError::UnknownCommand(_)) {
                    self.say(Tag::Info, "Type 'help' for available commands").await?;
                }
                self.out.flush().await?;
                return Ok(false);
            }
        };
        debug!("Executing {:?}", command);

        let mutated = command.mutates_flash();
        if let Err(e) = self.run(command).await? {
            self.say(Tag::Error, e).await?;
        }
        self.out.flush().await?;
        Ok(mutated)
    }

    /// The output sink.
    #[cfg(test)]
    pub fn output(&self) -> &W {
        &self.out
    }

    async fn run(&mut self, command: Command) -> io::Result<Result<(), FlashError<D::Error>>> {
        let engine = self.engine;
        match command {
            Command::Write { addr, text } => {
                self.say(Tag::Info, format_args!("Writing string to 0x{:08X}: {}", addr, text))
                    .await?;
                match engine.write_str(addr, &text).await {
                    Ok(n) => self.say(Tag::Ok, format_args!("Wrote {} bytes", n)).await?,
                    Err(e) => return Ok(Err(e)),
                }
            }
            Command::WriteBytes { addr, bytes } => {
                self.say(
                    Tag::Info,
                    format_args!("Writing {} bytes to 0x{:08X}", bytes.len(), addr),
                )
                .await?;
                match engine.write(addr, &bytes).await {
                    Ok(()) => self.say(Tag::Ok, "Write successful").await?,
                    Err(e) => return Ok(Err(e)),
                }
            }
            Command::Read { addr } => {
                let mut buf = [0u8; MAX_STR_LEN];
                match engine.read_str(addr, &mut buf).await {
                    Ok(s) => {
                        let text = String::from_utf8_lossy(s).into_owned();
                        self.say(Tag::Data, text).await?;
                    }
                    Err(e) => return Ok(Err(e)),
                }
            }
            Command::ReadBytes { addr, len } => {
                let mut buf = [0u8; MAX_TRANSFER];
                if let Err(e) = engine.read(addr, &mut buf[..len]).await {
                    return Ok(Err(e));
                }
                self.say(Tag::Info, format_args!("Read {} bytes from 0x{:08X}", len, addr))
                    .await?;
                self.dump(None, &buf[..len]).await?;
            }
            Command::ReadRange { start, end } => {
                let mut buf = [0u8; MAX_TRANSFER];
                let n = match engine.read_range(start, end, &mut buf).await {
                    Ok(n) => n,
                    Err(e) => return Ok(Err(e)),
                };
                self.say(
                    Tag::Info,
                    format_args!("Reading range 0x{:08X} to 0x{:08X} ({} bytes)", start, end, n),
                )
                .await?;
                self.dump(Some(start), &buf[..n]).await?;
            }
            Command::Erase { addr } => {
                let capacity = engine.capacity();
                let addr_in = Address::new(addr);
                if capacity.contains(addr_in) {
                    let sector = capacity.sector_of(addr_in);
                    self.say(
                        Tag::Info,
                        format_args!(
                            "Erasing sector {} at {}",
                            sector.value(),
                            capacity.sector_start(sector)
                        ),
                    )
                    .await?;
                }
                match engine.erase_sector(addr).await {
                    Ok(()) => self.say(Tag::Ok, "Sector erased").await?,
                    Err(e) => return Ok(Err(e)),
                }
            }
            Command::EraseRange { start, end } => {
                let mut reports = Vec::new();
                let result = engine.erase_range(start, end, |p| reports.push(p)).await;
                for p in reports {
                    self.say(Tag::Progress, format_args!("Erased sector {}/{}", p.done, p.total))
                        .await?;
                }
                match result {
                    Ok(n) => self.say(Tag::Ok, format_args!("Erased {} sectors", n)).await?,
                    Err(e) => return Ok(Err(e)),
                }
            }
            Command::EraseAll => return self.erase_all().await,
            Command::ReadAll => return self.read_all().await,
            Command::Info => match engine.info().await {
                Ok(info) => {
                    let total = info.capacity.total_bytes();
                    self.say(Tag::Info, "Flash Chip Information:").await?;
                    self.say(Tag::Info, format_args!("JEDEC ID: 0x{:06X}", info.chip_id))
                        .await?;
                    self.say(
                        Tag::Info,
                        format_args!(
                            "Capacity: {} bytes ({:.2} MB)",
                            total,
                            total as f64 / 1_048_576.0
                        ),
                    )
                    .await?;
                    self.say(Tag::Info, format_args!("Max Pages: {}", info.page_count))
                        .await?;
                    self.say(
                        Tag::Info,
                        format_args!("Sector Size: {} bytes", info.capacity.sector_size()),
                    )
                    .await?;
                }
                Err(e) => return Ok(Err(e)),
            },
            Command::Help => {
                for line in MENU {
                    self.say(Tag::Info, line).await?;
                }
            }
            Command::Ring(ring) => return self.ring(ring).await,
        }
        Ok(Ok(()))
    }

    async fn ring(&mut self, command: RingCommand) -> io::Result<Result<(), FlashError<D::Error>>> {
        let engine = self.engine;
        match command {
            RingCommand::Init => match engine.ring_init().await {
                Ok(at) => {
                    self.say(Tag::Ok, format_args!("Ring buffer initialized at {}", at))
                        .await?
                }
                Err(e) => return Ok(Err(e)),
            },
            RingCommand::Write(text) => match engine.ring_write(text.as_bytes()).await {
                Ok(at) => {
                    let next = engine.position().await;
                    self.say(
                        Tag::Ok,
                        format_args!("Appended {} bytes at {}, next {}", text.len(), at, next),
                    )
                    .await?
                }
                Err(e) => return Ok(Err(e)),
            },
            RingCommand::Pos => {
                let at = engine.position().await;
                self.say(Tag::Info, format_args!("Position: {}", at)).await?
            }
            RingCommand::SetPos(addr) => match engine.set_position(addr).await {
                Ok(at) => self.say(Tag::Ok, format_args!("Position set to {}", at)).await?,
                Err(e) => return Ok(Err(e)),
            },
            RingCommand::Reset => {
                engine.reset().await;
                self.say(Tag::Ok, format_args!("Position reset to {}", Address::ZERO))
                    .await?
            }
            RingCommand::Pause => {
                engine.pause();
                self.say(Tag::Ok, "Ring buffer paused").await?
            }
            RingCommand::Resume => {
                engine.resume();
                self.say(Tag::Ok, "Ring buffer resumed").await?
            }
            RingCommand::Drain => {
                engine.pause_and_drain().await;
                self.say(Tag::Ok, "Ring buffer paused and drained").await?
            }
            RingCommand::Status => {
                let state = engine.ring_state().await;
                let phase = engine.phase().await;
                self.say(
                    Tag::Info,
                    format_args!(
                        "Phase: {:?}, position: {}, initialized: {}, paused: {}",
                        phase,
                        state.cursor(),
                        state.is_initialized(),
                        state.is_paused()
                    ),
                )
                .await?
            }
        }
        Ok(Ok(()))
    }

    async fn erase_all(&mut self) -> io::Result<Result<(), FlashError<D::Error>>> {
        self.say(Tag::Warn, "This will erase ALL data!").await?;
        self.say(
            Tag::Info,
            format_args!(
                "Type 'yes' to confirm within {} ms",
                self.confirm_timeout.as_millis()
            ),
        )
        .await?;
        self.out.flush().await?;

        let confirmed = match tokio::time::timeout(self.confirm_timeout, self.input.next_line()).await
        {
            Ok(Ok(Some(reply))) => reply.trim() == "yes",
            Ok(Ok(None)) => false,
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                warn!("Chip erase confirmation timed out");
                false
            }
        };
        if !confirmed {
            self.say(Tag::Info, "Erase cancelled").await?;
            return Ok(Ok(()));
        }

        self.say(Tag::Info, "Erasing entire flash memory...").await?;
        self.out.flush().await?;
        match self.engine.erase_all().await {
            Ok(()) => self.say(Tag::Ok, "Chip erase complete").await?,
            Err(e) => return Ok(Err(e)),
        }
        Ok(Ok(()))
    }

    async fn read_all(&mut self) -> io::Result<Result<(), FlashError<D::Error>>> {
        let engine = self.engine;
        let mut export = match engine.export(DUMP_CHUNK).await {
            Ok(export) => export,
            Err(e) => return Ok(Err(e)),
        };
        self.say(
            Tag::Info,
            format_args!("Reading entire flash memory ({} bytes)...", export.total()),
        )
        .await?;

        let mut buf = [0u8; DUMP_CHUNK];
        while let Some(chunk) = export.next_chunk(&mut buf).await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => return Ok(Err(e)),
            };
            self.dump(Some(chunk.addr.value()), &buf[..chunk.len]).await?;
            if let Some(p) = chunk.progress {
                self.say(Tag::Progress, format_args!("{}% complete", p.percent()))
                    .await?;
            }
        }
        self.say(Tag::Ok, "Read complete").await?;
        Ok(Ok(()))
    }

    async fn dump(&mut self, base: Option<u32>, bytes: &[u8]) -> io::Result<()> {
        for line in hexdump::lines(base, bytes) {
            self.say(Tag::Data, line).await?;
        }
        Ok(())
    }
}
