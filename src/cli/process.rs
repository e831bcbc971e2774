use std::path::Path;

use anyhow::{Result, anyhow};
use sysinfo::{get_current_pid, Signal, System};
use tracing::info;

/// Terminates every running process started from `name`. Returns how many were stopped.
pub fn kill_running_hosts(name: &Path) -> Result<usize> {
    let system = System::new_all();
    let current_id = get_current_pid().map_err(|e| anyhow!("Can't determine own pid: {e}"))?;
    let mut stopped = 0;
    for (pid, process) in system.processes().iter() {
        if *pid == current_id {
            continue;
        }

        if process
            .exe()
            .filter(|v| v.exists())
            .filter(|v| name == *v)
            .is_some()
        {
            info!("Stopping host {pid}");
            // This will forcefully terminate the process on Windows, the open session is lost.
            if process.kill_with(Signal::Term).is_none() {
                process.kill();
            }
            process.wait();
            stopped += 1;
        }
    }
    Ok(stopped)
}
