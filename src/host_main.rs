use anyhow::Result;
use clap::Parser;
use tracing::error;
use tabtally::{
    daemon::{args::HostArgs, config::HostConfig, start_daemon},
    utils::{
        dir::resolve_application_path,
        logging::{enable_logging, HOST_PREFIX},
        runtime::single_thread_runtime,
    },
};

fn main() -> Result<()> {
    run(HostArgs::parse())
}

fn run(args: HostArgs) -> Result<()> {
    let app_dir = resolve_application_path(args.dir)?;
    enable_logging(HOST_PREFIX, &app_dir, args.log, args.log_console)?;

    let config = HostConfig::resolve(app_dir, &args.overrides)
        .inspect_err(|e| error!("Invalid configuration {e:?}"))?;

    let runtime = single_thread_runtime()?;
    let result = runtime.block_on(start_daemon(config));
    // Reading stdin parks a blocking thread that never wakes up on its own once the browser is
    // gone, don't wait for it.
    runtime.shutdown_background();
    result
}
