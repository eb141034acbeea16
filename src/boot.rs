use anyhow::{Context, Result};
use chrono::Local;
use log::LevelFilter;
use std::{
    io::{self, Write},
    path::{Path, PathBuf},
};

use env_logger::{Builder, Target};

/// Multi-writer for logging to both file and stdout
struct DualWriter {
    file: std::fs::File,
    stdout: io::Stdout,
}

impl Write for DualWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write_all(buf)?;
        self.stdout.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()?;
        self.stdout.flush()?;
        Ok(())
    }
}

/// `<log_dir>/<prefix>_log_<date>_<unix-ts>.txt`
pub fn log_file_path(log_dir: &Path, prefix: &str) -> PathBuf {
    let now = Local::now();
    log_dir.join(format!(
        "{prefix}_log_{}_{}.txt",
        now.format("%Y-%m-%d"),
        now.timestamp()
    ))
}

fn builder(target: Target) -> Builder {
    let mut builder = Builder::new();
    builder
        .format(|buf, record| {
            writeln!(
                buf,
                "{} - {} - {} - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.target(),
                record.level(),
                record.args()
            )
        })
        .target(target)
        .filter_level(LevelFilter::Info)
        .parse_default_env();
    builder
}

/// Log to stdout and to a fresh per-run file under `log_dir`.
pub fn init_logger(log_dir: &Path, prefix: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;
    let path = log_file_path(log_dir, prefix);
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;

    let dual_writer = DualWriter {
        file,
        stdout: io::stdout(),
    };
    builder(Target::Pipe(Box::new(dual_writer)))
        .try_init()
        .context("Logger already initialized")?;

    log::info!("Logging to {} and terminal", path.display());
    Ok(path)
}

/// Fall back to terminal-only logging.
pub fn init_stdout_logger() {
    if let Err(err) = builder(Target::Stdout).try_init() {
        eprintln!("Failed to initialize logger: {err}");
    }
}
