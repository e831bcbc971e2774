use std::path::PathBuf;

use clap::Parser;
use tracing::level_filters::LevelFilter;

use super::config::ConfigOverrides;

/// Arguments of the native messaging host. The browser starts the host itself and appends its
/// own arguments (manifest path, extension origin, parent window), which are accepted and ignored.
#[derive(Parser, Debug)]
#[command(name = "tabtally-host", version)]
pub struct HostArgs {
    #[arg(long)]
    pub dir: Option<PathBuf>,
    #[command(flatten)]
    pub overrides: ConfigOverrides,
    /// This option is for debugging purposes only. Logs go to stderr.
    #[arg(long = "log-console")]
    pub log_console: bool,
    #[arg(long = "log-filter")]
    pub log: Option<LevelFilter>,
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, hide = true)]
    pub browser_args: Vec<String>,
}
