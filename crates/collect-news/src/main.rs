use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use newsdesk::formats::FormatGenerator;
use newsdesk::io::{save_digest, write_json, SELECTED_FILE};
use newsdesk::llm::openai_from_config;
use newsdesk::{assessor, pipeline, scoring, Config, RunPaths, Weights};

#[derive(Parser)]
#[command(name = "collect-news")]
#[command(about = "Collect AI news, score it, and write the candidate board for today's edition")]
struct Args {
    /// Skip the editor and write the Top-N digest directly
    #[arg(long)]
    auto: bool,

    /// Number of articles kept by --auto
    #[arg(short = 'n', long, default_value = "20")]
    limit: usize,

    /// Never call a model, even when API keys are configured
    #[arg(long)]
    no_llm: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    newsdesk::init_tracing();
    let args = Args::parse();
    let config = Config::from_env()?;
    let now = Utc::now();
    let paths = RunPaths::for_now(&config, now);

    println!("📅 Edition: {}", paths.date);
    println!("\n📡 Collecting news from configured sources...");
    let articles = pipeline::collect(&config, &paths)
        .await
        .context("Failed to collect news")?;

    if articles.is_empty() {
        println!("No articles collected. Check config/sources.yaml and your API keys.");
        return Ok(());
    }
    println!("✓ Collected {} unique articles", articles.len());

    if args.auto {
        return run_digest(&config, &paths, articles, &args).await;
    }

    println!("\n🤖 Scoring candidates...");
    let assessor = pipeline::build_assessor(&config, &paths.date, !args.no_llm)?;
    let candidates = assessor.assess(&articles, &Weights::default(), now).await;
    println!("✓ Scored {} candidates", candidates.len());

    pipeline::save_candidates(&paths, &candidates).context("Failed to save candidates")?;

    println!("\n📋 Top candidates:");
    for c in candidates.iter().take(5) {
        println!("  {}. [{}] {} ({:.1})", c.id, c.category, c.title, c.total_score);
    }

    println!(
        "\n✅ Candidate board saved to: {}",
        paths.content_dir.join(newsdesk::io::BOARD_FILE).display()
    );
    println!("   Next: curate-news -c \"#選擇 1 2 3\"");

    Ok(())
}

async fn run_digest(
    config: &Config,
    paths: &RunPaths,
    articles: Vec<newsdesk::Article>,
    args: &Args,
) -> Result<()> {
    let keywords = config.load_keywords()?;
    let llm = if args.no_llm {
        None
    } else {
        openai_from_config(config)?
    };

    let refined = match &llm {
        Some(llm) => {
            println!("\n🤖 Re-scoring articles with the model...");
            println!("  (This may take a minute...)");
            assessor::refine_scores(llm.as_ref(), &articles).await
        }
        None => Vec::new(),
    };
    let rescored = refined.iter().filter(|r| r.is_some()).count();
    if llm.is_some() {
        println!("✓ Re-scored {}/{} articles", rescored, articles.len());
    }

    let top: Vec<_> = scoring::top_articles(articles, &keywords, &refined, args.limit, Utc::now())
        .into_iter()
        .map(|(_, article)| article)
        .collect();

    println!("\n📝 Writing Top {} digest...", top.len());
    write_json(&paths.data(SELECTED_FILE), &top)?;
    save_digest(&paths.content_dir, &FormatGenerator::digest(&top))
        .context("Failed to save digest")?;

    println!("\n✅ Digest saved to: {}", paths.content_dir.display());
    Ok(())
}
