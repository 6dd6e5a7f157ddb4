//! CLI definitions and session driver

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use flashring::{Capacity, FlashEngine, MemFlash};
use log::{info, warn};
use tokio::io::{AsyncBufRead, AsyncWrite, BufReader};

use crate::command::parse_hex;
use crate::dispatcher::{Dispatcher, Tag};
use crate::image::ImageFile;

#[derive(Parser, Debug)]
#[command(name = "flashring")]
#[command(about = "Text command console for a simulated NOR flash ring buffer", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Raw flash image, created erased if missing and saved after every change
    #[arg(short, long)]
    pub image: Option<PathBuf>,

    /// Total device size in bytes
    #[arg(long, default_value_t = 4_194_304)]
    pub capacity: u32,

    /// Erase sector size in bytes
    #[arg(long, default_value_t = 4096)]
    pub sector_size: u32,

    /// JEDEC id reported by the simulated chip (hex)
    #[arg(long, default_value = "EF4016", value_parser = parse_hex)]
    pub chip_id: u32,

    /// How long `eraseall` waits for "yes"
    #[arg(long, default_value_t = 5000)]
    pub confirm_timeout_ms: u64,

    /// Skip the ring buffer frontier scan at start
    #[arg(long)]
    pub no_ring_scan: bool,

    /// Run these command lines and exit instead of reading stdin
    #[arg(short, long = "command", value_name = "LINE")]
    pub command: Vec<String>,
}

pub async fn run(cli: Cli) -> Result<()> {
    let capacity = Capacity::new(cli.capacity, cli.sector_size).context("Invalid flash geometry")?;
    let image = cli.image.as_ref().map(|path| ImageFile::new(path));

    let mem = match &image {
        Some(image) => {
            info!("Using image {}", image.path().display());
            image.load_or_create(capacity).await?
        }
        None => {
            warn!("No --image given, flash content is lost on exit");
            MemFlash::new(capacity)
        }
    };
    let engine = FlashEngine::new(mem.with_chip_id(cli.chip_id));

    let stdout = tokio::io::stdout();
    let timeout = Duration::from_millis(cli.confirm_timeout_ms);
    let scan = !cli.no_ring_scan;

    if cli.command.is_empty() {
        let stdin = BufReader::new(tokio::io::stdin());
        let dispatcher = Dispatcher::new(&engine, stdin, stdout, timeout);
        session(dispatcher, image.as_ref(), scan).await
    } else {
        let script = cli.command.join("\n");
        let dispatcher = Dispatcher::new(&engine, script.as_bytes(), stdout, timeout);
        session(dispatcher, image.as_ref(), scan).await
    }
}

/// Bring the chip up, optionally scan for the ring frontier, then run
/// commands until input ends.
async fn session<R, W>(
    mut dispatcher: Dispatcher<'_, MemFlash, R, W>,
    image: Option<&ImageFile>,
    scan: bool,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let engine = dispatcher.engine();
    let chip = engine.bring_up().await.context("Flash bring-up failed")?;
    info!("Flash ready: {}", chip);
    dispatcher.say(Tag::Info, &chip).await?;

    if scan {
        match engine.ring_init().await {
            Ok(at) => {
                dispatcher
                    .say(Tag::Info, format_args!("Ring buffer position: {}", at))
                    .await?
            }
            Err(e) => {
                dispatcher
                    .say(Tag::Warn, format_args!("Ring buffer scan failed: {}", e))
                    .await?
            }
        }
    }
    dispatcher.say(Tag::Info, "Type 'help' for available commands").await?;
    dispatcher.flush().await?;

    while let Some(line) = dispatcher.next_line().await? {
        let mutated = dispatcher.execute(&line).await?;
        if let (true, Some(image)) = (mutated, image) {
            image.persist(engine).await?;
        }
    }
    Ok(())
}
