use anyhow::Result;
use chrono::{Duration, Utc};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use willowbot::backtest::{MarketScenario, ReplayReport, ReplayRunner, SyntheticTickGenerator};
use willowbot::config::Settings;

#[derive(Parser)]
#[command(author, version, about = "Replay synthetic tick histories through the scorer", long_about = None)]
struct Cli {
    /// Scenarios to run (uptrend, downtrend, sideways, volatile, gaps)
    #[arg(short, long, value_delimiter = ',', default_value = "uptrend,downtrend,sideways,volatile,gaps")]
    scenarios: Vec<String>,

    /// Ticks to generate per scenario
    #[arg(short, long, default_value = "1000")]
    ticks: usize,

    /// Average seconds between ticks
    #[arg(long, default_value = "60")]
    spacing: i64,

    /// RNG seed
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Settings file for evaluation parameters
    #[arg(short, long)]
    config: Option<String>,

    /// Print every scored cycle, not just the summary
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging();
    let cli = Cli::parse();

    let settings = Settings::load(cli.config.as_deref()).map_err(|e| anyhow::anyhow!(e))?;
    settings.validate().map_err(|e| anyhow::anyhow!(e))?;
    let runner = ReplayRunner::new(settings.evaluation.clone());
    let pair = "SYN/USD".to_string();

    println!("\n╔═══════════════════════════════════════════════════════╗");
    println!("║              WILLOWBOT SCORE REPLAY                   ║");
    println!("╚═══════════════════════════════════════════════════════╝");

    let mut summaries = Vec::new();

    for name in &cli.scenarios {
        let Some(scenario) = MarketScenario::parse(name) else {
            eprintln!("❌ Unknown scenario: {}", name);
            continue;
        };

        let start = Utc::now() - Duration::seconds(cli.ticks as i64 * cli.spacing);
        let ticks = SyntheticTickGenerator::new(cli.seed).generate(
            &pair,
            scenario,
            cli.ticks,
            start,
            cli.spacing,
        );

        match runner.run(std::slice::from_ref(&pair), ticks).await {
            Ok(report) => {
                if cli.verbose {
                    print_points(&report);
                }
                summaries.push((format!("{:?}", scenario), report));
            }
            Err(e) => eprintln!("❌ Replay failed for {:?}: {}", scenario, e),
        }
    }

    print_summary(&summaries, settings.evaluation.score_threshold);

    Ok(())
}

fn setup_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("willowbot=warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn print_points(report: &ReplayReport) {
    println!("\n{:<22} {:>6} {:>14} {:>8}", "Cycle", "Score", "Price", "Order");
    for point in &report.points {
        println!(
            "{:<22} {:>6} {:>14.4} {:>8}",
            point.cycle_time.format("%Y-%m-%d %H:%M:%S"),
            point.score,
            point.price,
            if point.ordered { "BUY" } else { "-" }
        );
    }
}

fn print_summary(summaries: &[(String, ReplayReport)], threshold: u8) {
    println!("\n{:<12} {:>8} {:>8} {:>10} {:>8}", "Scenario", "Cycles", "Scored", "Avg score", "Orders");
    println!("{}", "─".repeat(52));

    for (name, report) in summaries {
        let average = report
            .average_score()
            .map(|a| format!("{:.1}", a))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<12} {:>8} {:>8} {:>10} {:>8}",
            name,
            report.cycles,
            report.points.len(),
            average,
            report.orders()
        );
    }

    println!("\nOrders are placed when score ≥ {}", threshold);
}
