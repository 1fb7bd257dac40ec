#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

use clap::{Args, CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process;
use std::sync::Mutex;

use confsets::config::{ConfigOverrides, ExperimentConfig};
use confsets::io::{summarize, write_results};
use confsets::pipeline::CoverageExperiment;
use confsets::progress::{ExperimentStage, ProgressObserver};
use confsets::types::{Assessment, BoundaryVariant};

#[derive(Parser)]
#[command(
    name = "confsets",
    about = "Coverage simulations for confidence regions of excursion-set intersections"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args)]
struct RunArgs {
    /// Path to the experiment description (.toml)
    config: PathBuf,

    /// Number of subjects per realization, overriding the file
    #[arg(long, value_name = "N")]
    n_sub: Option<usize>,

    /// Number of realizations, overriding the file
    #[arg(long, value_name = "N")]
    n_reals: Option<usize>,

    /// Number of bootstrap draws per realization, overriding the file
    #[arg(long, value_name = "N")]
    n_boot: Option<usize>,

    /// Base random seed, overriding the file
    #[arg(long)]
    seed: Option<u64>,

    /// Directory receiving the success tables, overriding the file
    #[arg(long, value_name = "DIR")]
    out_dir: Option<PathBuf>,

    /// Worker threads (defaults to every logical core)
    #[arg(long, value_name = "N")]
    threads: Option<usize>,
}

#[derive(Args)]
struct SummarizeArgs {
    /// Experiment description supplying the tag, probabilities and result directory
    config: PathBuf,

    /// Sample sizes to join, one row each
    #[arg(long = "n-sub", value_name = "N", required = true, num_args = 1..)]
    n_subs: Vec<usize>,

    /// Directory holding the success tables, overriding the file
    #[arg(long, value_name = "DIR")]
    out_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Run a coverage experiment and append its success tables")]
    Run(RunArgs),
    #[command(about = "Join success tables of several sample sizes into coverage tables")]
    Summarize(SummarizeArgs),
    #[command(about = "Display version and build information")]
    Version,
}

// Advanced from the rayon workers as realizations finish.
struct BarProgress {
    bar: Mutex<Option<ProgressBar>>,
}

impl BarProgress {
    fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }
}

impl ProgressObserver for BarProgress {
    fn on_stage_start(&self, stage: ExperimentStage, total: usize) {
        let draw_target = if std::io::stderr().is_terminal() {
            ProgressDrawTarget::stderr_with_hz(20)
        } else {
            ProgressDrawTarget::hidden()
        };
        let bar = ProgressBar::with_draw_target(Some(total as u64), draw_target);
        if let Ok(style) = ProgressStyle::with_template(
            "> [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        ) {
            bar.set_style(style.progress_chars("█▉▊▋▌▍▎▏  "));
        }
        bar.set_message(stage.to_string());
        if let Ok(mut slot) = self.bar.lock() {
            *slot = Some(bar);
        }
    }

    // Workers report out of order; the bar only moves forward.
    fn on_stage_advance(&self, _: ExperimentStage, completed: usize) {
        if let Ok(slot) = self.bar.lock() {
            if let Some(bar) = slot.as_ref() {
                bar.set_position(bar.position().max(completed as u64));
            }
        }
    }

    fn on_stage_finish(&self, stage: ExperimentStage) {
        if let Ok(mut slot) = self.bar.lock() {
            if let Some(bar) = slot.take() {
                bar.finish_with_message(format!("{stage} done"));
            }
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Cli { command } = Cli::parse();

    let result = match command {
        Some(Commands::Run(args)) => run(args),
        Some(Commands::Summarize(args)) => run_summarize(args),
        Some(Commands::Version) => {
            print_version_info();
            Ok(())
        }
        None => {
            if let Err(e) = Cli::command().print_help() {
                eprintln!("Error: {e}");
            }
            println!();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let threads = args.threads.unwrap_or_else(num_cpus::get).max(1);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()?;

    let mut config = ExperimentConfig::load(&args.config)?;
    config.apply_overrides(&ConfigOverrides {
        n_sub: args.n_sub,
        n_reals: args.n_reals,
        n_boot: args.n_boot,
        seed: args.seed,
        out_dir: args.out_dir,
    });

    let experiment = CoverageExperiment::new(config)?;
    let progress = BarProgress::new();
    let results = experiment.run(&progress)?;

    progress.on_stage_start(ExperimentStage::Persistence, 1);
    let config = experiment.config();
    let written = write_results(&config.out_dir, config, &results)?;
    progress.on_stage_finish(ExperimentStage::Persistence);

    println!(
        "Appended {} realizations for nSub = {} to {}",
        results.n_reals(),
        config.n_sub,
        config.out_dir.display()
    );
    for variant in BoundaryVariant::ALL {
        for assessment in Assessment::ALL {
            let coverage = results.coverage(variant, assessment);
            println!(
                "  {:<18} {:<12} {}",
                variant.to_string(),
                format!("{assessment:?}"),
                coverage
                    .iter()
                    .map(|c| format!("{c:.3}"))
                    .collect::<Vec<_>>()
                    .join(" ")
            );
        }
    }
    for variant in BoundaryVariant::ALL {
        let degenerate = results.degenerate_realizations(variant);
        if degenerate > 0 {
            println!(
                "  {degenerate} of {} realizations on the {variant} had infinite thresholds and count as successes",
                results.n_reals()
            );
        }
    }
    log::debug!("Files written: {written:?}");
    Ok(())
}

fn run_summarize(args: SummarizeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = ExperimentConfig::load(&args.config)?;
    let dir = args.out_dir.unwrap_or_else(|| config.out_dir.clone());
    let written = summarize(
        &dir,
        &args.n_subs,
        &config.tag,
        &config.probabilities.values(),
    )?;
    for path in written {
        println!("Coverage table written to {}", path.display());
    }
    Ok(())
}

/// Format seconds into a human-readable duration like "2.4 hours ago"
fn format_duration_ago(seconds: u64) -> String {
    const MINUTE: u64 = 60;
    const HOUR: u64 = 60 * MINUTE;
    const DAY: u64 = 24 * HOUR;

    if seconds < MINUTE {
        format!("{seconds} seconds ago")
    } else if seconds < HOUR {
        format!("{:.1} minutes ago", seconds as f64 / MINUTE as f64)
    } else if seconds < DAY {
        format!("{:.1} hours ago", seconds as f64 / HOUR as f64)
    } else {
        format!("{:.1} days ago", seconds as f64 / DAY as f64)
    }
}

fn print_version_info() {
    let version = env!("CARGO_PKG_VERSION");
    let build_timestamp: u64 = env!("CONFSETS_BUILD_TIMESTAMP").parse().unwrap_or(0);

    println!("confsets {version}");

    if build_timestamp > 0 {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        if now > build_timestamp {
            println!("Built: {}", format_duration_ago(now - build_timestamp));
        } else {
            println!("Built: just now");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(progress: &BarProgress) -> Option<u64> {
        progress
            .bar
            .lock()
            .ok()
            .and_then(|slot| slot.as_ref().map(|bar| bar.position()))
    }

    #[test]
    fn late_reports_never_move_the_bar_backwards() {
        let progress = BarProgress::new();
        progress.on_stage_start(ExperimentStage::Realizations, 10);
        progress.on_stage_advance(ExperimentStage::Realizations, 2);
        progress.on_stage_advance(ExperimentStage::Realizations, 5);
        progress.on_stage_advance(ExperimentStage::Realizations, 4);
        assert_eq!(position(&progress), Some(5));
        progress.on_stage_advance(ExperimentStage::Realizations, 6);
        assert_eq!(position(&progress), Some(6));

        progress.on_stage_finish(ExperimentStage::Realizations);
        assert_eq!(position(&progress), None);
    }

    #[test]
    fn durations_are_described_in_the_largest_unit() {
        assert_eq!(format_duration_ago(42), "42 seconds ago");
        assert_eq!(format_duration_ago(90), "1.5 minutes ago");
        assert_eq!(format_duration_ago(2 * 3600), "2.0 hours ago");
        assert_eq!(format_duration_ago(3 * 86400), "3.0 days ago");
    }
}
