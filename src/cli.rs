use clap::Parser;

use crate::config::Mode;

/// Course registration bot for the ITU OBS portal.
///
/// Credentials, CRN lists and intervals are read from the environment (and
/// `.env`); the keys are the fields of [`Config`](crate::config::Config).
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Log output format
    #[arg(long, value_enum, default_value_t = default_tracing_format())]
    pub tracing: TracingFormat,

    /// Override the `MODE` environment variable
    #[arg(long, value_enum)]
    pub mode: Option<Mode>,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TracingFormat {
    /// Human-readable, colored output
    Pretty,
    /// One JSON object per line
    Json,
}

/// Pretty in debug builds, JSON in release builds.
fn default_tracing_format() -> TracingFormat {
    if cfg!(debug_assertions) {
        TracingFormat::Pretty
    } else {
        TracingFormat::Json
    }
}
