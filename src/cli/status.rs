use std::path::Path;

use anyhow::Result;
use chrono::{Duration, Local};
use clap::Parser;

use crate::{
    daemon::{
        config::STORE_FILE_NAME,
        storage::{accumulator::AccumulatorStore, entities::AccumulatorEntity, json_file::JsonFileStore},
    },
    utils::{
        percentage::{millis_percentage, Percentage},
        time::format_duration,
    },
};

#[derive(Debug, Parser)]
pub struct StatusCommand {
    #[arg(short = 'p', long = "percentage", help = "Filter hosts to have at least specified percentage", default_value_t = Percentage::new_opt(0.).unwrap())]
    min_percentage: Percentage,
}

#[derive(Debug, PartialEq)]
pub struct HostUsage<'a> {
    pub host: &'a str,
    pub duration: Duration,
    pub percentage: Percentage,
}

/// Hosts of the pending period, longest first. Hosts below `min_percentage` of the total are
/// left out.
pub fn analyze_hosts(accumulator: &AccumulatorEntity, min_percentage: Percentage) -> Vec<HostUsage<'_>> {
    let total = accumulator.total_ms();
    let mut usages = accumulator
        .durations
        .iter()
        .map(|(host, ms)| HostUsage {
            host,
            duration: Duration::milliseconds(*ms),
            percentage: millis_percentage(*ms, total),
        })
        .filter(|v| *v.percentage >= *min_percentage)
        .collect::<Vec<_>>();
    usages.sort_by(|a, b| b.duration.cmp(&a.duration).then(a.host.cmp(b.host)));
    usages
}

/// Prints what the host has accumulated and not uploaded yet.
pub async fn process_status_command(app_dir: &Path, command: StatusCommand) -> Result<()> {
    let store = AccumulatorStore::new(JsonFileStore::new(app_dir.join(STORE_FILE_NAME))?);
    let accumulator = store.load().await?;

    match accumulator.period_start {
        Some(start) => println!(
            "Period started\t{}",
            start.with_timezone(&Local).format("%x %H:%M:%S")
        ),
        None => println!("No period started yet"),
    }

    let usages = analyze_hosts(&accumulator, command.min_percentage);
    if usages.is_empty() {
        println!("Nothing accumulated");
        return Ok(());
    }

    for entry in usages {
        println!(
            "{}%\t{}\t{}",
            *entry.percentage as i32,
            format_duration(entry.duration),
            entry.host
        );
    }
    println!(
        "Total\t{}",
        format_duration(Duration::milliseconds(accumulator.total_ms()))
    );
    Ok(())
}
