use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use newsdesk::{analysis, health, views, Config};

#[derive(Parser)]
#[command(name = "report-news")]
#[command(about = "Weekly trends, freshness checks and result previews for the news archive")]
struct Args {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Write analysis/weekly/<week>.json and docs/api.json from the last 7 days
    Analyze,
    /// Exit non-zero when the newest data directory is missing or older than 36h
    Health,
    /// Print stored results
    View {
        #[arg(value_enum, default_value = "latest")]
        what: View,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum View {
    Latest,
    All,
    Stats,
}

fn main() -> Result<()> {
    newsdesk::init_tracing();
    let args = Args::parse();
    let config = Config::from_env()?;

    match args.command {
        Cmd::Analyze => {
            println!("📈 Analyzing the last 7 days...");
            let (weekly, api) = analysis::write_reports(&config, Utc::now())?;
            println!("✓ Weekly report: {}", weekly.display());
            println!("✓ API snapshot: {}", api.display());
        }
        Cmd::Health => {
            let status = health::check(&config.data_dir(), Utc::now())?;
            println!("{status}");
            std::process::exit(status.exit_code());
        }
        Cmd::View { what } => {
            let text = match what {
                View::Latest => views::latest(&config)?,
                View::All => views::all(&config)?,
                View::Stats => views::stats(&config)?,
            };
            print!("{text}");
        }
    }

    Ok(())
}
