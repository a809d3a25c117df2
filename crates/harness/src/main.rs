//! Scenario runner for the kernel synchronization subsystem.
//!
//! Each scenario builds a fresh kernel, forks a handful of threads against
//! one or two primitives, and prints what happens. Scenarios that exercise a
//! fatal rule violation end with the kernel abort message and a non-zero
//! exit.

use anyhow::{bail, Result};
use clap::Parser;

mod scenarios;

/// Runs one numbered kernel thread-synchronization scenario.
#[derive(Parser)]
#[command(name = "ukern-harness", version, about)]
struct Args {
    /// Scenario number to run (see --list).
    #[arg(value_name = "TESTNUM", required_unless_present = "list")]
    testnum: Option<u32>,

    /// List the available scenarios and exit.
    #[arg(long)]
    list: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if args.list {
        for (number, name, _) in scenarios::TABLE {
            println!("{number:>2}  {name}");
        }
        return Ok(());
    }

    let testnum = args.testnum.expect("clap requires testnum without --list");
    let Some((_, name, scenario)) = scenarios::TABLE.iter().find(|(n, _, _)| *n == testnum)
    else {
        bail!("no scenario numbered {testnum}; try --list");
    };
    log::info!("running scenario {testnum}: {name}");
    scenario();
    Ok(())
}
