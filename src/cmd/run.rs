use crate::reports;
use clap::Args;
use shakespeare::api::Session;
use shakespeare::config::Config;
use shakespeare::error::EvResult;
use shakespeare::optimizer::RunEvent;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

pub const DEFAULT_TARGET: &str = "To be or not to be, that is the question;\n\
Whether 'tis nobler in the mind to suffer\n\
The slings and arrows of outrageous fortune,\n\
Or to take arms against a sea of troubles,\n\
And by opposing, end them.";

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub config: Config,

    /// Text the population evolves toward
    #[arg(short, long, default_value = DEFAULT_TARGET)]
    pub target: String,

    /// Seconds between progress lines
    #[arg(long, default_value_t = 1)]
    pub report_every: u64,
}

pub async fn run(args: RunArgs, config: Config) -> EvResult<()> {
    let population = config.search.population_size;
    println!(
        "🐒 {} monkeys, {} workers ({} mode)",
        population, config.pool.pool_size, config.search.mode
    );

    let session = Arc::new(Session::new(config));
    let mut subscription = session.start_run(&args.target, population)?;

    let interrupt = Arc::clone(&session);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling run...");
            interrupt.cancel_run();
        }
    });

    let interval = Duration::from_secs(args.report_every);
    let started = Instant::now();
    let mut last_print: Option<Instant> = None;

    while let Some(event) = subscription.next_event().await {
        match event {
            RunEvent::Progress(ev) => {
                if last_print.map_or(true, |t| t.elapsed() >= interval) {
                    reports::print_progress(&ev);
                    last_print = Some(Instant::now());
                }
            }
            RunEvent::Complete(ev) => reports::print_progress(&ev),
        }
    }

    let outcome = subscription.finish().await?;
    info!("Run finished after {:.2}s", started.elapsed().as_secs_f64());
    reports::print_outcome(&outcome, started.elapsed());
    Ok(())
}
