//! CLI argument definitions

use clap::{Parser, ValueEnum};
use cpuscope_common::TraceFormat;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "cpuscope",
    about = "Record a CPU trace through a capture session and report its hotspots",
    after_help = "\
EXAMPLES:
    cpuscope --trace app.json                          Replay a sampled trace
    cpuscope --trace app.json --format instrumented    Replay an instrumented trace
    cpuscope --trace app.json --filter decode --top 5  Only functions matching \"decode\""
)]
pub struct Args {
    /// Trace file served by the replay profiler
    #[arg(long, value_name = "FILE")]
    pub trace: PathBuf,

    /// Trace format (defaults to the selected profiling configuration's)
    #[arg(long, value_enum)]
    pub format: Option<FormatArg>,

    /// Keep the recording running for N seconds before stopping
    #[arg(long, default_value = "0")]
    pub duration: u64,

    /// Session configuration file (JSON)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Only count and report functions matching PATTERN
    #[arg(long, value_name = "PATTERN")]
    pub filter: Option<String>,

    /// Treat --filter as a regular expression
    #[arg(long, requires = "filter")]
    pub regex: bool,

    /// Make --filter case-sensitive
    #[arg(long, requires = "filter")]
    pub match_case: bool,

    /// Restrict the report to one thread
    #[arg(long, value_name = "TID")]
    pub thread: Option<u32>,

    /// Read durations from the per-thread CPU clock instead of wall time
    #[arg(long)]
    pub thread_clock: bool,

    /// Number of hotspots to print
    #[arg(long, default_value = "10")]
    pub top: usize,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    Sampled,
    Instrumented,
}

impl From<FormatArg> for TraceFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Sampled => TraceFormat::Sampled,
            FormatArg::Instrumented => TraceFormat::Instrumented,
        }
    }
}
