//! CLI parsing and orchestration. Runs the pipeline: fetch feed -> extract
//! articles -> resolve images -> build cover -> write EPUB. Maps errors to
//! exit codes.

use crate::config;
use crate::cover::build_cover;
use crate::epub::{write_epub, EpubError, EpubVersion};
use crate::extract::{extract_article, ExtractError};
use crate::feed::{parse_feed, FeedError};
use crate::fetch::{FetchError, HttpClient};
use crate::images::{resolve_images, ImageIds};
use crate::model::{Article, Book, Item};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_LIMIT: u32 = 20;

/// CLI error carrying exit code and message.
#[derive(Debug, Error)]
pub enum CliRunError {
    /// Usage or config problem: exit 1.
    #[error("{0}")]
    InvalidInput(String),

    /// Feed unreachable: exit 2.
    #[error("{0}")]
    FeedFetch(#[from] FetchError),

    /// Feed unparsable: exit 2.
    #[error("{0}")]
    FeedParse(#[from] FeedError),

    /// Assembly/write failure: exit 3.
    #[error("{0}")]
    Epub(#[from] EpubError),
}

impl CliRunError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliRunError::InvalidInput(_) => 1,
            CliRunError::FeedFetch(_) | CliRunError::FeedParse(_) => 2,
            CliRunError::Epub(_) => 3,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "feedbook")]
#[command(about = "Convert an RSS/Atom feed into an EPUB with article content and images")]
#[command(
    after_help = "Config file keys (output_dir, user_agent, request_delay_secs, timeout_secs, limit, toc_page) are read from ./feedbook.toml or the user config directory. CLI flags override config."
)]
pub struct Args {
    /// URL of the RSS or Atom feed.
    pub url: String,

    /// Maximum number of items to include (default 20; must be positive).
    #[arg(short, long, value_parser = parse_limit)]
    pub limit: Option<u32>,

    /// Output path. Default: ./{sanitized-feed-title}.epub.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Generate EPUB 2 instead of EPUB 3.
    #[arg(long)]
    pub epub_2: bool,

    /// Include toc.ncx in EPUB 3 output for legacy readers.
    #[arg(long)]
    pub ncx: bool,

    /// Suppress progress output (errors only).
    #[arg(short, long)]
    pub quiet: bool,

    /// Print verbose error chain.
    #[arg(long)]
    pub verbose: bool,

    /// HTTP User-Agent (overrides config).
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Delay between requests in seconds (overrides config; default 0).
    #[arg(long)]
    pub delay: Option<u64>,

    /// Request timeout in seconds (overrides config; default 30).
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Fetch and parse the feed, print item count and output path, fetch
    /// nothing else and write nothing.
    #[arg(long)]
    pub dry_run: bool,
}

fn parse_limit(s: &str) -> Result<u32, String> {
    let n: u32 = s
        .trim()
        .parse()
        .map_err(|_| format!("Invalid --limit: '{}' is not a number", s))?;
    if n == 0 {
        return Err("Invalid --limit: must be a positive integer".to_string());
    }
    Ok(n)
}

/// Sanitize a feed title to an output base name: lowercase, trim, collapse
/// whitespace runs to a single hyphen. Punctuation is kept; path separators
/// are replaced so the name stays a single path component.
fn sanitize_title(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut last_ws = false;
    for c in title.trim().chars() {
        if c.is_whitespace() {
            if !last_ws {
                out.push('-');
            }
            last_ws = true;
        } else if c == '/' || c == '\\' {
            out.push('-');
            last_ws = false;
        } else {
            out.extend(c.to_lowercase());
            last_ws = false;
        }
    }
    if out.is_empty() {
        out.push_str("feed");
    }
    out
}

/// Run `extract` over each item in order, keeping successes. A failed item
/// is warned about and skipped; its siblings still make it into the book.
fn collect_articles<F>(items: &[Item], mut extract: F) -> Vec<Article>
where
    F: FnMut(usize, &Item) -> Result<Article, ExtractError>,
{
    let mut articles = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        match extract(i, item) {
            Ok(article) => articles.push(article),
            Err(e) => eprintln!("Warning: skipping article: {}", e),
        }
    }
    articles
}

/// Entry point for the CLI. Ok(()) on success; Err carries the exit code.
pub fn run(args: &Args) -> Result<(), CliRunError> {
    let config = config::load_config().map_err(CliRunError::InvalidInput)?;

    let limit = args
        .limit
        .or_else(|| config.as_ref().and_then(|c| c.limit))
        .unwrap_or(DEFAULT_LIMIT) as usize;
    let delay_secs = args
        .delay
        .or_else(|| config.as_ref().and_then(|c| c.request_delay_secs))
        .unwrap_or(0);
    let timeout_secs = args
        .timeout
        .or_else(|| config.as_ref().and_then(|c| c.timeout_secs))
        .unwrap_or(30);
    let user_agent = args
        .user_agent
        .clone()
        .or_else(|| config.as_ref().and_then(|c| c.user_agent.clone()));
    let output_dir: PathBuf = config
        .as_ref()
        .and_then(|c| c.output_dir.clone())
        .unwrap_or_else(|| PathBuf::from("."));
    let include_toc_page = config.as_ref().and_then(|c| c.toc_page).unwrap_or(true);

    let mut builder = HttpClient::builder()
        .delay_secs(delay_secs)
        .timeout_secs(timeout_secs);
    if let Some(ua) = user_agent {
        builder = builder.user_agent(ua);
    }
    let mut client = builder
        .build()
        .map_err(|e| CliRunError::InvalidInput(format!("Failed to create HTTP client: {}", e)))?;

    // Feed fetch and parse are the only fatal stages.
    let fetched = client.fetch(&args.url)?;
    let mut feed = parse_feed(&fetched.bytes, &args.url)?;
    feed.items.truncate(limit);

    let output_path = match &args.output {
        Some(p) => p.clone(),
        None => output_dir.join(format!("{}.epub", sanitize_title(&feed.title))),
    };

    if args.dry_run {
        eprintln!("Feed: {}", feed.title);
        eprintln!("Items: {}", feed.items.len());
        eprintln!("Output: {}", output_path.display());
        return Ok(());
    }

    let progress = if args.quiet || feed.items.is_empty() {
        None
    } else {
        let bar = indicatif::ProgressBar::new(feed.items.len() as u64);
        if let Ok(style) = indicatif::ProgressStyle::default_bar()
            .template("{spinner} {msg} [{bar:40}] {pos}/{len} ({elapsed})")
        {
            bar.set_style(style.progress_chars("█▉▊▋▌▍▎▏ "));
        }
        bar.enable_steady_tick(Duration::from_millis(80));
        Some(bar)
    };

    let mut ids = ImageIds::new();
    let total = feed.items.len();
    let articles = collect_articles(&feed.items, |i, item| {
        if let Some(bar) = &progress {
            bar.set_position(i as u64);
            bar.set_message(format!("Fetching {}/{}", i + 1, total));
        }
        let mut article = extract_article(&mut client, item)?;
        resolve_images(&mut client, &mut ids, &mut article);
        Ok(article)
    });
    if let Some(bar) = progress {
        bar.disable_steady_tick();
        bar.finish_and_clear();
    }

    let cover = build_cover(&mut client, &feed.site_url);

    let book = Book {
        title: feed.title,
        site_url: feed.site_url,
        description: feed.description,
        cover,
        articles,
    };

    let version = if args.epub_2 {
        EpubVersion::Epub2
    } else {
        EpubVersion::Epub3
    };
    write_epub(&book, &output_path, version, args.ncx, include_toc_page)?;

    if !args.quiet {
        eprintln!("Wrote {}", output_path.display());
    }
    Ok(())
}
