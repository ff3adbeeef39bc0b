//! Command-line arguments.

use clap::{Parser, ValueEnum};

/// Caching, coalescing gateway in front of a translation provider.
///
/// Runtime settings (port, provider credentials, cache path, limits) come from
/// the environment; the command line only controls presentation.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Log output format
    #[arg(long, value_enum, default_value_t = TracingFormat::default())]
    pub tracing: TracingFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TracingFormat {
    /// Human-readable, colored output
    Pretty,
    /// One JSON object per line
    Json,
}

impl Default for TracingFormat {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            TracingFormat::Pretty
        } else {
            TracingFormat::Json
        }
    }
}
