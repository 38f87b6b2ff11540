//! fabric-sim: cycle-level simulator for chiplet compute fabrics

use std::path::PathBuf;

use clap::Parser;

use fabric_sim::engine::Simulator;

/// Simulate a DAG workload on a configurable multi-chiplet fabric.
#[derive(Debug, Parser)]
#[command(name = "fabric-sim", version, about)]
struct Cli {
    /// Path to the configuration JSON file.
    #[arg(long, value_name = "FILE")]
    config: PathBuf,

    /// Path to the tasks CSV file.
    #[arg(long, value_name = "FILE")]
    tasks: PathBuf,

    /// Path to the operations CSV file.
    #[arg(long, value_name = "FILE")]
    ops: PathBuf,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    let mut simulator = Simulator::from_files(&cli.config, &cli.tasks, &cli.ops)?;
    simulator.run()?;

    let frequency = simulator.config().frequency_ghz;
    print!("{}", simulator.stats().render_report(frequency));

    let output = PathBuf::from("stats.json");
    simulator.stats().write_json(&output, frequency)?;
    println!("Statistics written to {}", output.display());

    Ok(())
}
