mod commands;
mod render;

use anyhow::{Context, Result};
use clap::Parser;
use commands::{Command, HELP};
use shared::{Config, Desk, SearchMode};
use std::io::{self as stdio, Write};
use std::path::PathBuf;
use tracing::Level;

#[derive(Parser)]
#[command(name = "newsdesk")]
#[command(about = "Search the news, classify it, and draft LinkedIn posts with generated images")]
struct Args {
    /// Comma-separated search terms to run at startup
    #[arg(short, long)]
    terms: Option<String>,

    /// Search mode (everything, top-headlines, sources)
    #[arg(short, long, default_value = "everything")]
    mode: String,

    /// Results per term (1-100), defaults to MAX_NEWS_PER_SOURCE
    #[arg(short, long)]
    page_size: Option<u32>,

    /// Extra .env file, read after the standard ones
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Log requests and progress to stderr
    #[arg(short, long)]
    verbose: bool,
}

/// Settings the user can change from the prompt.
struct Prompt {
    mode: SearchMode,
    page_size: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_writer(stdio::stderr)
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::WARN })
        .with_target(false)
        .init();

    let config =
        Config::load(args.env_file.as_deref()).context("Failed to load configuration")?;
    tracing::debug!("Loaded configuration: {:?}", config);

    let mode = args
        .mode
        .parse::<SearchMode>()
        .map_err(anyhow::Error::msg)?;
    if let Some(size) = args.page_size {
        if !(1..=100).contains(&size) {
            anyhow::bail!("--page-size must be between 1 and 100");
        }
    }

    let desk = Desk::from_config(&config).context("Failed to set up API clients")?;

    println!("📰 newsdesk");
    let missing = config.missing_keys();
    if !missing.is_empty() {
        println!(
            "⚠ Not configured: {}. Related commands will fail until they are set.",
            missing.join(", ")
        );
    }
    println!("Type 'help' for commands.\n");

    let mut prompt = Prompt {
        mode,
        page_size: args.page_size,
    };

    if let Some(terms) = args.terms {
        execute(&desk, &mut prompt, &config, Command::Search(terms)).await;
    }

    loop {
        print!("newsdesk> ");
        stdio::stdout().flush()?;

        let mut input = String::new();
        if stdio::stdin().read_line(&mut input)? == 0 {
            println!();
            break;
        }

        match commands::parse(&input) {
            Ok(None) => {}
            Ok(Some(Command::Quit)) => break,
            Ok(Some(command)) => execute(&desk, &mut prompt, &config, command).await,
            Err(e) => println!("✗ {}", e),
        }
    }

    Ok(())
}

/// Run one command and print its outcome. Failures are printed, never propagated.
async fn execute(desk: &Desk, prompt: &mut Prompt, config: &Config, command: Command) {
    match command {
        Command::Search(terms) => {
            println!("🔍 Searching {} for \"{}\"...", prompt.mode, terms);
            match desk.search(&terms, prompt.mode, prompt.page_size).await {
                Ok(count) => {
                    println!("✓ Found {} articles\n", count);
                    desk.read(|s| println!("{}", render::article_list(s.entries())));
                }
                Err(e) => println!("✗ {}", e),
            }
        }
        Command::Mode(None) => {
            for (i, mode) in SearchMode::ALL.iter().enumerate() {
                let current = if *mode == prompt.mode { " (current)" } else { "" };
                println!("  {}) {}: {}{}", i + 1, mode, mode.description(), current);
            }
        }
        Command::Mode(Some(mode)) => {
            prompt.mode = mode;
            println!("✓ Mode set to {}", mode);
        }
        Command::Size(size) => {
            prompt.page_size = Some(size);
            println!("✓ {} results per term", size);
        }
        Command::List => desk.read(|s| println!("{}", render::article_list(s.entries()))),
        Command::Show(index) => desk.read(|s| match s.entry(index) {
            Ok(entry) => println!("{}", render::article_detail(index, entry)),
            Err(e) => println!("✗ {}", e),
        }),
        Command::Classify(index) => {
            println!("🤖 Classifying article {}...", index + 1);
            match desk.classify(index).await {
                Ok(result) => {
                    println!("✓ {}", result.label);
                    if let Some(rationale) = result.rationale {
                        println!("  {}", rationale);
                    }
                }
                Err(e) => println!("✗ {}", e),
            }
        }
        Command::Curate => {
            println!("🤖 Picking the most relevant articles...");
            match desk.curate().await {
                Ok(shortlist) => println!("\n{}\n", shortlist.trim()),
                Err(e) => println!("✗ {}", e),
            }
        }
        Command::Post { index, comment } => {
            println!("📝 Writing post for article {}...", index + 1);
            match desk.post(index, comment.as_deref()).await {
                Ok(post) => println!("\n{}\n", post.text.trim()),
                Err(e) => println!("✗ {}", e),
            }
        }
        Command::PostShortlist => {
            println!("📝 Writing post from the shortlist...");
            match desk.post_from_shortlist().await {
                Ok(draft) => println!("\n{}\n", draft.trim()),
                Err(e) => println!("✗ {}", e),
            }
        }
        Command::Draft(text) => {
            println!("📝 Writing post from your text...");
            match desk.draft(&text).await {
                Ok(draft) => println!("\n{}\n", draft.trim()),
                Err(e) => println!("✗ {}", e),
            }
        }
        Command::Image(index) => {
            println!("🎨 Generating image for article {} (this may take a minute)...", index + 1);
            match desk.image(index).await {
                Ok(image) => println!("✓ Image saved to: {}", image.local_path.display()),
                Err(e) => println!("✗ {}", e),
            }
        }
        Command::Preview(index) => match desk.preview(index) {
            Ok(preview) => println!("{}", render::preview(&preview)),
            Err(e) => println!("✗ {}", e),
        },
        Command::Clear => {
            desk.clear();
            println!("✓ Results cleared");
        }
        Command::Status => {
            let (count, epoch) = desk.read(|s| (s.len(), s.epoch()));
            let defaults = desk.defaults();
            println!("Mode: {}", prompt.mode);
            println!(
                "Results per term: {}",
                prompt.page_size.unwrap_or(defaults.page_size)
            );
            println!("Language: {}", defaults.language);
            println!("Model: {}", config.zai_model);
            println!("Image model: {}", config.replicate_model);
            println!("Images: {}", desk.images_dir().display());
            println!("Articles: {} (search #{})", count, epoch);
            let missing = config.missing_keys();
            if !missing.is_empty() {
                println!("Not configured: {}", missing.join(", "));
            }
        }
        Command::Help => println!("{}", HELP),
        Command::Quit => {}
    }
}
