use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use myeloma_effect::config::{parse_agents, Config};
use myeloma_effect::harness::{ComparisonHarness, HarnessError, InputBundle};
use myeloma_effect::logging::init_tracing;

/// Compare per-treatment-set outcome estimates from LinUCB, S/T-learners and IPW.
#[derive(Parser, Debug)]
#[command(name = "compare-effects", version, about)]
struct Args {
    /// JSON input bundle (features, treatments, outcomes)
    input: PathBuf,

    /// Where to write the CSV report
    #[arg(short, long, default_value = "effect_set_results.csv")]
    output: PathBuf,

    /// Optional JSON run summary
    #[arg(long)]
    summary: Option<PathBuf>,

    /// LinUCB exploration weight
    #[arg(long)]
    alpha: Option<f64>,

    /// Ranking depth for the recommendation match rate
    #[arg(long)]
    top_n: Option<usize>,

    /// Ridge strength of the regression learners
    #[arg(long)]
    ridge: Option<f64>,

    /// Comma-separated agent names, one per treatment column
    #[arg(long)]
    agents: Option<String>,

    /// Also write a daily rolling log file into this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let args = Args::parse();
    let mut config = Config::from_env();

    if let Some(alpha) = args.alpha {
        config.estimation.alpha = alpha;
    }
    if let Some(top_n) = args.top_n {
        config.estimation.top_n = top_n;
    }
    if let Some(ridge) = args.ridge {
        config.estimation.ridge = ridge;
    }
    if let Some(agents) = args.agents.as_deref() {
        config.agents = parse_agents(agents);
    }
    if let Some(dir) = &args.log_dir {
        config.logging.file_dir = Some(dir.clone());
    }

    let _log_guard = init_tracing(&config.logging);

    match run(&args, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "comparison failed");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args, config: &Config) -> Result<(), HarnessError> {
    let bundle = InputBundle::load(&args.input)?;
    let harness = ComparisonHarness::from_config(config);
    let report = harness.run(&bundle)?;

    for (kind, rate) in report.match_rates() {
        match rate {
            Some(rate) => tracing::info!(estimator = %kind, rate, "recommendation match rate"),
            None => tracing::info!(estimator = %kind, "no per-sample ranking"),
        }
    }

    report.write_csv(&args.output)?;
    if let Some(path) = &args.summary {
        report.write_summary(path)?;
    }
    Ok(())
}
