//! macholite - Inspect 64-bit Mach-O files and build minimal executables.
//!
//! `read` prints the library versions and entry point bytes of a file,
//! `write` converts an object file into a runnable executable, and `info`
//! prints a summary of every load command.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

use macholite::{convert_object, inspect_file, ExecutableLayout};

/// Inspect 64-bit Mach-O files and build minimal executables.
#[derive(Parser, Debug)]
#[command(name = "macholite")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print library versions and the entry point bytes of a file
    Read {
        /// Mach-O file to read
        file: PathBuf,

        /// Verbosity level (0=quiet, 1=warnings, 2=info, 3=debug)
        #[arg(short, long, default_value = "1")]
        verbosity: u8,
    },

    /// Convert an object file into a minimal executable
    Write {
        /// Object file containing a __text section
        input: PathBuf,

        /// Path of the executable to create
        output: PathBuf,

        /// Verbosity level (0=quiet, 1=warnings, 2=info, 3=debug)
        #[arg(short, long, default_value = "1")]
        verbosity: u8,
    },

    /// Show the header and every load command of a file
    Info {
        /// Mach-O file to describe
        file: PathBuf,

        /// Verbosity level (0=quiet, 1=warnings, 2=info, 3=debug)
        #[arg(short, long, default_value = "1")]
        verbosity: u8,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Read { file, verbosity } => {
            setup_logging(verbosity);
            cmd_read(&file)
        }
        Commands::Write {
            input,
            output,
            verbosity,
        } => {
            setup_logging(verbosity);
            cmd_write(&input, &output)
        }
        Commands::Info { file, verbosity } => {
            setup_logging(verbosity);
            cmd_info(&file)
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", diagnostic(&e));
            ExitCode::from(exit_code(&e))
        }
    }
}

/// Renders an error as one `<file>: <problem>` line.
fn diagnostic(err: &anyhow::Error) -> String {
    format!("{:#}", err)
}

/// Maps a failed command to the process exit status.
fn exit_code(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<macholite::Error>()
        .map(macholite::Error::exit_code)
        .unwrap_or(1)
}

fn setup_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::ERROR,
        1 => Level::WARN,
        2 => Level::INFO,
        _ => Level::DEBUG,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .without_time()
        .with_writer(io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).ok();
}

fn cmd_read(file: &Path) -> Result<()> {
    let inspection = inspect_file(file).with_context(|| file.display().to_string())?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    inspection.write_report(&mut out)?;
    out.flush()?;
    Ok(())
}

fn cmd_write(input: &Path, output: &Path) -> Result<()> {
    let start = Instant::now();
    let layout = ExecutableLayout::default();
    debug!(
        "Layout: dylinker {}, dylib {}",
        layout.dylinker_path, layout.library_path
    );

    let written = convert_object(input, output, &layout).map_err(|e| {
        let path = match e {
            macholite::Error::FileWrite { .. } => output,
            _ => input,
        };
        anyhow::Error::new(e).context(path.display().to_string())
    })?;

    info!(
        "Wrote {} ({} bytes) in {:.2?}",
        output.display(),
        written,
        start.elapsed()
    );
    Ok(())
}

fn cmd_info(file: &Path) -> Result<()> {
    let inspection = inspect_file(file).with_context(|| file.display().to_string())?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    writeln!(out, "File: {}", file.display())?;
    inspection.write_summary(&mut out)?;

    if let Some(entry) = inspection.context.entry_point() {
        writeln!(out, "Entry point: {:#x}", entry.entryoff)?;
    }
    if let Some(preview) = &inspection.preview {
        let bytes: Vec<String> = preview.iter().map(|b| format!("{:02x}", b)).collect();
        writeln!(out, "Entry bytes: {}", bytes.join(" "))?;
    }
    out.flush()?;
    Ok(())
}
