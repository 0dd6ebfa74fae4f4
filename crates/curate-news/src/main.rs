use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use newsdesk::commands::COMMAND_HELP;
use newsdesk::llm::gemini_from_config;
use newsdesk::{pipeline, publish_all, Config, EvidenceExtractor, RunPaths, Weights, Workflow};
use std::io::{self, Write as _};

#[derive(Parser)]
#[command(name = "curate-news")]
#[command(about = "Apply editor commands to today's candidates and generate the final formats")]
struct Args {
    /// Editor command, e.g. "#選擇 1 3 5" (repeatable; prompts when omitted)
    #[arg(short, long = "command")]
    commands: Vec<String>,

    /// Criterion weights as tech,impact,practical,timely (must sum to 100)
    #[arg(short, long)]
    weights: Option<String>,

    /// Never call a model, even when API keys are configured
    #[arg(long)]
    no_llm: bool,

    /// Send the results to Slack, GitHub and Google Sheets when configured
    #[arg(long)]
    publish: bool,
}

fn parse_weights(raw: &str) -> Result<Weights> {
    let parts: Vec<u32> = raw
        .split([',', '，', ' '])
        .filter(|s| !s.trim().is_empty())
        .map(|s| {
            s.trim()
                .parse()
                .with_context(|| format!("Invalid weight: {s}"))
        })
        .collect::<Result<_>>()?;

    match parts.as_slice() {
        [tech, impact, practical, timely] => Ok(Weights {
            tech: *tech,
            impact: *impact,
            practical: *practical,
            timely: *timely,
        }),
        _ => anyhow::bail!("Expected four weights (tech,impact,practical,timely), got {}", parts.len()),
    }
}

fn prompt_commands() -> Result<Vec<String>> {
    println!("\n可用指令：");
    for line in COMMAND_HELP {
        println!("  {line}");
    }
    println!("\n輸入指令，每行一個；空行結束。");

    let mut commands = Vec::new();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let line = input.trim();
        if line.is_empty() {
            break;
        }
        commands.push(line.to_string());
    }
    Ok(commands)
}

#[tokio::main]
async fn main() -> Result<()> {
    newsdesk::init_tracing();
    let args = Args::parse();
    let config = Config::from_env()?;
    let now = Utc::now();
    let paths = RunPaths::for_now(&config, now);

    println!("📖 Loading candidates for {}...", paths.date);
    let candidates = pipeline::load_candidates(&paths)?.ok_or_else(|| {
        anyhow::anyhow!(
            "No candidates found in {}. Run collect-news first.",
            paths.content_dir.display()
        )
    })?;
    println!("✓ Loaded {} candidates", candidates.len());

    let mut workflow = Workflow::resume(&paths.date, &paths.content_dir, candidates);

    if let Some(raw) = &args.weights {
        let weights = parse_weights(raw)?;
        match workflow.update_weights(weights) {
            Ok(()) => println!("✓ Weights updated: {raw}"),
            Err(e) => println!("⚠ {e}"),
        }
    }

    let commands = if args.commands.is_empty() {
        prompt_commands()?
    } else {
        args.commands.clone()
    };

    let assessor = pipeline::build_assessor(&config, &paths.date, !args.no_llm)?;
    let extractor = EvidenceExtractor::new()?;
    for line in &commands {
        match pipeline::apply_and_resolve(&config, &assessor, &extractor, &mut workflow, line, now)
            .await
        {
            Ok(report) => println!("✓ {line} → {report}"),
            Err(e) => println!("✗ {line} → {e:#}"),
        }
    }

    pipeline::save_candidates(&paths, workflow.candidates())
        .context("Failed to save updated candidates")?;

    let selected = match workflow.begin_generation() {
        Ok(selected) => selected,
        Err(e) => {
            println!("\n⚠ {e}. Candidate board updated; nothing generated.");
            return Ok(());
        }
    };

    println!("\n📝 Generating formats for {} selected items...", selected.len());
    let llm = if args.no_llm {
        None
    } else {
        gemini_from_config(&config)?
    };
    let formats = match pipeline::generate_outputs(llm.as_deref(), &paths, &selected).await {
        Ok(formats) => formats,
        Err(e) => {
            workflow.fail();
            return Err(e);
        }
    };
    workflow.complete()?;
    println!("✓ Formats saved to: {}", paths.content_dir.display());

    if args.publish {
        println!("\n📤 Publishing...");
        let report = publish_all(&config.publish, &formats, &selected, &paths.date).await?;
        println!(
            "  Slack: {}  Confluence: {}  Figma: {}  GitHub: {}  Sheets: {}",
            mark(report.slack),
            mark(report.confluence),
            mark(report.figma),
            mark(report.database.github_format_a && report.database.github_database),
            mark(report.database.google_sheets),
        );
    }

    println!("\n✅ Done!");
    Ok(())
}

fn mark(ok: bool) -> &'static str {
    if ok {
        "✓"
    } else {
        "–"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_weights() {
        let w = parse_weights("40,20，20 20").unwrap();
        assert_eq!((w.tech, w.impact, w.practical, w.timely), (40, 20, 20, 20));
        assert!(parse_weights("40,20,20").is_err());
        assert!(parse_weights("a,b,c,d").is_err());
    }
}
