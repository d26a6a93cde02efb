use std::thread;

use anyhow::{Context, Result, bail};
use clap::Parser;

mod cli;

use cli::{Cli, Mode};

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level.parse().unwrap_or(log::LevelFilter::Info))
        .init();

    match cli.mode {
        Mode::Coordinator => {
            let summary = ms_coordinator::run(&cli.settings)?;
            log::info!(
                "{} frames écrites dans {}",
                summary.frames_written,
                summary.run_dir.display()
            );
            Ok(())
        }
        Mode::Worker => run_workers(&cli),
    }
}

/// Lance `--workers` moteurs dans ce processus, chacun sur son propre
/// port, et attend leur fin.
fn run_workers(cli: &Cli) -> Result<()> {
    if cli.workers == 0 {
        bail!("--workers doit être au moins 1");
    }
    let settings = ms_worker::WorkerSettings::load(&cli.settings)?;

    let mut handles = Vec::with_capacity(cli.workers);
    for index in 0..cli.workers {
        let worker_settings = settings.clone();
        let handle = thread::Builder::new()
            .name(format!("ms-worker-{index}"))
            .spawn(move || ms_worker::run(&worker_settings))
            .context("démarrage d'un worker")?;
        handles.push(handle);
    }

    let mut failures = 0usize;
    for handle in handles {
        match handle.join() {
            Ok(Ok(completed)) => log::info!("worker terminé, {completed} tâches"),
            Ok(Err(e)) => {
                log::error!("worker en échec: {e:#}");
                failures += 1;
            }
            Err(_) => {
                log::error!("panique d'un worker");
                failures += 1;
            }
        }
    }
    if failures > 0 {
        bail!("{failures} workers en échec");
    }
    Ok(())
}
