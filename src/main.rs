mod app;
mod config;
mod input;
mod model;
mod render;
mod sim;
mod sprites;
mod storage;

use anyhow::Result;
use clap::Parser;
use std::{
    fs::{File, OpenOptions},
    io,
    path::{Path, PathBuf},
};

#[derive(Parser, Debug, Clone)]
#[command(name = "roadrush")]
#[command(about = "Dodge the oncoming traffic for as long as you can", long_about = None)]
pub(crate) struct Args {
    /// RNG seed for obstacle placement (0 = random).
    #[arg(long)]
    seed: Option<u64>,

    /// FPS cap (render rate). The game itself ticks at a fixed step.
    #[arg(long)]
    fps: Option<u32>,

    /// Directory holding player.txt / crashed.txt / obstacle.txt sprite art.
    #[arg(long)]
    assets: Option<PathBuf>,

    /// Monochrome output.
    #[arg(long, default_value_t = false)]
    no_color: bool,

    /// Forget the stored best time before starting.
    #[arg(long, default_value_t = false)]
    reset_record: bool,

    /// Log filter, e.g. `debug` or `roadrush=trace`. Defaults to RUST_LOG, then `info`.
    #[arg(long)]
    log_level: Option<String>,
}

fn open_log(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Runs before raw mode, so failures can still be reported on stderr.
fn init_logging(path: &Path, filter: Option<&str>) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(f) = filter {
        builder.parse_filters(f);
    }
    // the terminal is in raw mode while playing, so logs go to a file
    let target: Box<dyn io::Write + Send> = match open_log(path) {
        Ok(file) => Box::new(file),
        Err(e) => {
            eprintln!("roadrush: logging disabled, cannot open {}: {e}", path.display());
            Box::new(io::sink())
        }
    };
    builder.target(env_logger::Target::Pipe(target));
    if let Err(e) = builder.try_init() {
        eprintln!("roadrush: logging disabled: {e}");
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let paths = config::project_paths()?;
    init_logging(&paths.log_path, args.log_level.as_deref());
    app::run(&args, paths)
}
