//! `olfa`: deliver olfactometer pulses from the command line.
//!
//! ```bash
//! # Validate and normalise expressions
//! olfa check "2=5,1=4" "1=[50]4,2=[10]4"
//!
//! # Show the valve schedule of one pulse
//! olfa timeline "1=4x200,2=[100]4x100" --default-duration 1000
//!
//! # Deliver a shuffled session, printing trial records as JSON
//! olfa run --file session.txt --repetitions 3 --shuffle --seed 7 --json
//! ```

mod report;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use olfa_core::{parse, TrialRecord};
use olfa_pulses::{ControllerConfig, PulsesController, Timeline, TrialList};
use olfa_timing::{HighPrecisionTimer, ManualTimer, Timer};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use report::{notification_line, timeline_table, SessionSummary};

#[derive(Parser)]
#[command(name = "olfa")]
#[command(version)]
#[command(about = "Pulse expression tools and scheduler for a two-channel olfactometer")]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Odour flow duration for channels without an explicit one
    #[arg(long, global = true)]
    default_duration: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate pulse expressions and print their normalised form
    Check {
        #[arg(required = true)]
        expressions: Vec<String>,
    },

    /// Print the timeline of a single pulse
    Timeline {
        expression: String,

        /// Print notifications as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Deliver a batch of pulses as a trial list
    Run {
        /// Pulse expressions
        expressions: Vec<String>,

        /// Read additional whitespace separated expressions from a file
        #[arg(short, long)]
        file: Option<PathBuf>,

        #[arg(long)]
        repetitions: Option<usize>,

        #[arg(long)]
        shuffle: bool,

        #[arg(long)]
        seed: Option<u64>,

        /// Use a virtual clock instead of sleeping
        #[arg(long)]
        dry_run: bool,

        /// Print trial records and the summary as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let mut config = ControllerConfig::load(cli.config.as_deref())
        .context("failed to load configuration")?;
    if let Some(ms) = cli.default_duration {
        config.default_duration_ms = ms;
    }

    match cli.command {
        Commands::Check { expressions } => check(&expressions),
        Commands::Timeline { expression, json } => {
            config.validate()?;
            let pulse = parse(&expression)?;
            let timeline = Timeline::build(&pulse, config.default_duration_ms);
            if json {
                for n in timeline.notifications() {
                    println!("{}", serde_json::to_string(&n)?);
                }
            } else {
                println!("{pulse}");
                print!("{}", timeline_table(&timeline));
            }
            Ok(())
        }
        Commands::Run {
            expressions,
            file,
            repetitions,
            shuffle,
            seed,
            dry_run,
            json,
        } => {
            if let Some(n) = repetitions {
                config.repetitions = n;
            }
            config.shuffle |= shuffle;
            if seed.is_some() {
                config.seed = seed;
            }
            config.validate()?;

            let mut text = expressions.join(" ");
            if let Some(path) = file {
                let content = std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                text.push(' ');
                text.push_str(&content);
            }
            let batch = TrialList::parse(&text).context("invalid pulse batch")?;
            if batch.is_empty() {
                bail!("no pulses to deliver");
            }
            let trials = TrialList::from_config(batch.pulses().to_vec(), &config);

            if dry_run {
                run_trials(&trials, &config, ManualTimer::new(), json)
            } else {
                run_trials(&trials, &config, HighPrecisionTimer::new(), json)
            }
        }
    }
}

fn check(expressions: &[String]) -> Result<()> {
    let mut failures = 0;
    for expr in expressions {
        match parse(expr) {
            Ok(pulse) => println!("ok    {pulse}"),
            Err(e) => {
                failures += 1;
                println!("error {e}");
            }
        }
    }
    if failures > 0 {
        bail!("{failures} of {} expressions are invalid", expressions.len());
    }
    Ok(())
}

fn run_trials<T>(trials: &TrialList, config: &ControllerConfig, timer: T, json: bool) -> Result<()>
where
    T: Timer<Timestamp = u64>,
{
    info!(trials = trials.len(), "starting session");
    let mut timer = timer;
    let mut records: Vec<TrialRecord> = Vec::with_capacity(trials.len());

    for (trial_id, pulse) in trials.iter() {
        let mut ctl = PulsesController::new(pulse.clone(), config, timer)?;
        ctl.run_blocking(|n| {
            if !json {
                println!("{}", notification_line(trial_id, n));
            }
        })?;

        let record = ctl.record(trial_id);
        if record.was_cut_short() {
            warn!(trial_id, "trial did not complete");
        }
        if json {
            println!("{}", serde_json::to_string(&record)?);
        }
        records.push(record);

        ctl.dispose();
        timer = ctl.into_timer();
        if trial_id + 1 < trials.len() {
            timer.sleep(Duration::from_millis(config.inter_trial_interval_ms));
        }
    }

    let summary = SessionSummary::new(&records, &timer.latency_stats());
    if json {
        println!("{}", serde_json::to_string(&summary)?);
    } else {
        println!(
            "{} of {} trials completed, latency avg {:.1} us, jitter {:.1} us, max {:.1} us",
            summary.completed,
            summary.trials,
            summary.latency_avg_us,
            summary.latency_jitter_us,
            summary.latency_max_us,
        );
    }
    Ok(())
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .init();
}
