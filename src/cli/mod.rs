pub mod flush;
pub mod host_path;
pub mod manifest;
pub mod process;
pub mod status;

use std::{env, path::PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use flush::process_flush_command;
use host_path::to_host_path;
use manifest::{Browser, host_manifest};
use process::kill_running_hosts;
use status::{StatusCommand, process_status_command};
use tracing::level_filters::LevelFilter;

use crate::{
    daemon::config::ConfigOverrides,
    utils::{
        dir::resolve_application_path,
        logging::{CLI_PREFIX, enable_logging},
    },
};

#[derive(Parser, Debug)]
#[command(name = "Tabtally", version, long_about = None)]
#[command(about = "Inspect and control the browser activity host", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(long, help = "Enable logging")]
    log: bool,
    #[arg(
        long,
        global = true,
        help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
    )]
    dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Show time accumulated since the last upload")]
    Status {
        #[command(flatten)]
        command: StatusCommand,
    },
    #[command(about = "Upload accumulated time right away")]
    Flush {
        #[command(flatten)]
        overrides: ConfigOverrides,
    },
    #[command(about = "Print the native messaging manifest that registers the host with a browser")]
    Manifest {
        #[arg(long, value_enum, default_value_t = Browser::Chrome)]
        browser: Browser,
        #[arg(long = "extension-id", help = "Id of the extension allowed to start the host")]
        extension_id: String,
    },
    #[command(about = "Stop currently running hosts. Their open sessions are saved")]
    Stop {},
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();
    let app_dir = resolve_application_path(args.dir)?;

    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };
    enable_logging(CLI_PREFIX, &app_dir, logging_level, args.log)?;

    match args.commands {
        Commands::Status { command } => process_status_command(&app_dir, command).await,
        Commands::Flush { overrides } => process_flush_command(&app_dir, &overrides).await,
        Commands::Manifest {
            browser,
            extension_id,
        } => {
            let host_path = to_host_path(env::current_exe()?);
            let manifest = host_manifest(browser, &host_path, &extension_id);
            println!("{}", serde_json::to_string_pretty(&manifest)?);
            Ok(())
        }
        Commands::Stop {} => {
            let host_path = to_host_path(env::current_exe()?);
            let stopped = kill_running_hosts(&host_path)?;
            println!("Stopped {stopped} hosts");
            Ok(())
        }
    }
}
