use std::env::args;
use std::io;

use env_logger::Env;
use log::info;

use rw_turnstile::config::{one_of, Setting};
use rw_turnstile::{Config, Harness, StdinLine, Variant};

fn main() -> Result<(), String> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = Config::from_args(args().skip(1)).map_err(|e| {
        format!(
            "{e}\nusage: rw-turnstile [{}] [key=value ...], keys are {}",
            one_of::<Variant>(),
            one_of::<Setting>()
        )
    })?;
    let run_for = config.run_for;

    let harness = Harness::start(config).map_err(|e| e.to_string())?;
    let report = match run_for {
        Some(duration) => harness.run_until(duration),
        None => {
            info!("press enter to stop");
            harness.run_until(StdinLine)
        }
    }
    .map_err(|e| e.to_string())?;

    info!(
        "{} readers and {} writers made {} reads and {} writes, up to {} readers at once, a writer inside in {:.0}% of samples",
        report.readers_spawned,
        report.writers,
        report.reads,
        report.writes,
        report.max_readers_observed(),
        report.writer_share() * 100.0
    );
    report
        .write_csv(io::stdout().lock())
        .map_err(|e| e.to_string())
}
