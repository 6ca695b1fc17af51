mod bits;
mod capture;
mod decode;

use std::io::stderr;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum Format {
    Text,
    Json,
}

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode complete minutes from a recorded pulse capture.
    ///
    /// The capture holds one `edge_ms,width_ms` pair per line, with edge
    /// times in milliseconds from any monotonic origin. Lines starting with
    /// `#` are comments.
    Decode {
        /// Input pulse capture.
        input: PathBuf,

        /// Output format.
        #[arg(short, long, default_value = "text")]
        format: Format,

        /// Also render local time for this GMT offset, applying the
        /// broadcast DST state.
        #[arg(short, long, value_name = "hours", allow_hyphen_values = true)]
        gmt_hours: Option<i8>,
    },
    /// Dump every classified bit with its phase check and signal quality.
    Bits {
        /// Input pulse capture.
        input: PathBuf,

        /// Output format.
        #[arg(short, long, default_value = "text")]
        format: Format,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(stderr)
        .with_ansi(false)
        .without_time()
        .with_env_filter(
            EnvFilter::try_from_env("WWVB_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match &cli.command {
        Commands::Decode {
            input,
            format,
            gmt_hours,
        } => decode::run(input, *format, *gmt_hours),
        Commands::Bits { input, format } => bits::run(input, *format),
    }
}
