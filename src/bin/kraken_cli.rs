use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use willowbot::api::{KrakenClient, OrderGateway, OrderSummary};
use willowbot::config::{Credentials, Settings};

#[derive(Parser)]
#[command(author, version, about = "Kraken account and order inspection", long_about = None)]
struct Cli {
    /// TOML settings file
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Per-asset balances
    Balance,
    /// Status of a single order
    OrderStatus {
        /// Transaction id, e.g. OUF4EM-FRGI2-MQMWZD
        txid: String,
    },
    /// Recent open (or closed) orders
    Orders {
        /// Show closed orders instead of open ones
        #[arg(long)]
        closed: bool,

        /// Only orders opened/closed within this many minutes
        #[arg(long, default_value = "20")]
        since_minutes: i64,
    },
    /// Tradable pair names as used by the ticker feed
    Pairs,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).map_err(|e| anyhow::anyhow!(e))?;

    let credentials = Credentials::from_env();
    let client = KrakenClient::new(
        &settings.exchange.rest_url,
        credentials,
        settings.exchange.requests_per_minute,
    )?;

    match cli.command {
        Commands::Balance => {
            let mut balances: Vec<(String, f64)> = client
                .get_balance()
                .await
                .context("Failed to fetch balance")?
                .into_iter()
                .collect();
            balances.sort_by(|a, b| a.0.cmp(&b.0));

            println!("{:<10} {:>20}", "Asset", "Balance");
            for (asset, amount) in balances {
                println!("{:<10} {:>20.8}", asset, amount);
            }
        }
        Commands::OrderStatus { txid } => {
            let status = client
                .query_order_status(&txid)
                .await
                .context("Failed to query order")?;
            println!("{}: {}", txid, status);
        }
        Commands::Orders {
            closed,
            since_minutes,
        } => {
            let cutoff = Utc::now() - Duration::minutes(since_minutes);
            let orders = if closed {
                client.closed_orders().await
            } else {
                client.open_orders().await
            }
            .context("Failed to fetch orders")?;

            let recent: Vec<&OrderSummary> = orders
                .iter()
                .filter(|o| {
                    let at = if closed { o.closed_at } else { o.opened_at };
                    at.is_some_and(|t| t >= cutoff)
                })
                .collect();

            print_orders(&recent, closed, since_minutes);
        }
        Commands::Pairs => {
            let pairs = client
                .tradable_pairs()
                .await
                .context("Failed to fetch asset pairs")?;
            for pair in &pairs {
                println!("{}", pair);
            }
            println!("\n{} tradable pairs", pairs.len());
        }
    }

    Ok(())
}

fn setup_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("willowbot=warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn print_orders(orders: &[&OrderSummary], closed: bool, since_minutes: i64) {
    println!(
        "{} orders (last {} mins)\n",
        if closed { "Closed" } else { "Open" },
        since_minutes
    );
    println!(
        "{:<6} {:<10} {:>14} {:>14} {:<10} {:>10}",
        "Type", "Pair", "Volume", "Price", "Status", "PnL"
    );

    for order in orders {
        let price = order
            .limit_price
            .map(|p| format!("{:.4}", p))
            .unwrap_or_else(|| "Market".to_string());
        let pnl = if closed {
            format!("{:.2}", order.pnl())
        } else {
            "-".to_string()
        };
        let status = if order.status == "closed" {
            "Executed ✅".to_string()
        } else {
            order.status.clone()
        };

        println!(
            "{:<6} {:<10} {:>14.8} {:>14} {:<10} {:>10}",
            order.side, order.pair, order.volume, price, status, pnl
        );
    }

    if orders.is_empty() {
        println!("(none)");
    }
}
