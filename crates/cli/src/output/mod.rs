//! Terminal output: human or JSON messages, and the upload progress bar

use std::io::IsTerminal;

use bf_core::config::ColorMode;

mod formatter;
mod progress;

pub use formatter::Formatter;
pub use progress::ProgressBar;

/// Output settings after merging command-line flags with config defaults
#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub json: bool,
    pub color: bool,
    pub progress: bool,
    /// Suppress everything but errors and requested data
    pub quiet: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            json: false,
            color: true,
            progress: true,
            quiet: false,
        }
    }
}

/// Whether to color output under the configured mode
pub fn use_color(mode: ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => {
            std::env::var_os("NO_COLOR").is_none() && std::io::stdout().is_terminal()
        }
    }
}
