// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use photogallery::config::{config_path, load_config, save_config, Config};
use photogallery::{
    FetchError, FlickrClient, GalleryItem, HttpFetcher, SlotKey, ThumbnailDownloader, WorkerStats,
};

/// Exit codes following sysexits.h conventions
mod exit_codes {
    /// Service unavailable - Flickr unreachable or rejecting requests
    pub const SERVICE_UNAVAILABLE: i32 = 69;
    /// Configuration error - invalid or missing config
    pub const CONFIG: i32 = 78;
}

/// Spinner helpers for consistent progress indicators
mod spinner {
    use indicatif::{ProgressBar, ProgressStyle};
    use std::time::Duration;

    pub fn create(message: &str) -> ProgressBar {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            spinner.set_style(style);
        }
        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(80));
        spinner
    }

    pub fn bar(len: u64) -> ProgressBar {
        let bar = ProgressBar::new(len);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
        {
            bar.set_style(style.progress_chars("=> "));
        }
        bar
    }
}

#[derive(Parser)]
#[command(name = "photogallery", version, about = "Browse Flickr photos and download thumbnails in the background")]
struct Cli {
    /// Flickr API key (overrides the config file)
    #[arg(long, env = "FLICKR_API_KEY", hide_env_values = true, global = true)]
    api_key: Option<String>,

    /// Flickr REST endpoint (overrides the config file)
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the most recent public photos
    Recent {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Search photos by text
    Search {
        query: String,
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Scroll a simulated recycling list and download its thumbnails
    Thumbs {
        /// Search text (recent photos when omitted)
        #[arg(short, long)]
        query: Option<String>,
        /// Number of recycled slots
        #[arg(long)]
        slots: Option<usize>,
        /// Number of gallery items to scroll through
        #[arg(short, long, default_value_t = 60)]
        limit: usize,
        /// Milliseconds between scroll steps
        #[arg(long, default_value_t = 40)]
        scroll_ms: u64,
        /// Downscale thumbnails so neither side exceeds this
        #[arg(long)]
        max_edge: Option<u32>,
    },
    /// Show or edit configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Store the Flickr API key
    SetKey { key: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = effective_config(load_config()?, &cli);

    match cli.command {
        Commands::Config { command } => handle_config(command, config),
        command => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .context("Failed to create Tokio runtime")?;
            runtime.block_on(run_async_command(command, &config))
        }
    }
}

/// Apply command-line overrides to the loaded config.
///
/// `config` subcommands see the file as stored, since `set-key` writes it back.
fn effective_config(mut config: Config, cli: &Cli) -> Config {
    if matches!(cli.command, Commands::Config { .. }) {
        return config;
    }
    if let Some(key) = &cli.api_key {
        config.flickr_api_key = Some(key.clone());
    }
    if let Some(endpoint) = &cli.endpoint {
        config.endpoint = Some(endpoint.clone());
    }
    config
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "photogallery=debug" } else { "photogallery=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run_async_command(command: Commands, config: &Config) -> Result<()> {
    let client = flickr_client(config)?;

    match command {
        Commands::Recent { limit } => {
            let items = fetch_gallery(&client, None).await;
            print_items(&items, limit);
        }
        Commands::Search { query, limit } => {
            let items = fetch_gallery(&client, Some(query.as_str())).await;
            print_items(&items, limit);
        }
        Commands::Thumbs {
            query,
            slots,
            limit,
            scroll_ms,
            max_edge,
        } => {
            let mut items = fetch_gallery(&client, query.as_deref()).await;
            items.truncate(limit);
            let options = ThumbsOptions {
                slots: slots.filter(|&n| n > 0).unwrap_or_else(|| config.slots()),
                scroll_interval: Duration::from_millis(scroll_ms.max(1)),
                max_edge: max_edge.or(config.thumbnail_max_edge),
            };
            run_thumbs(&items, config, &options).await?;
        }
        Commands::Config { .. } => unreachable!("handled synchronously"),
    }

    Ok(())
}

fn flickr_client(config: &Config) -> Result<FlickrClient> {
    let Some(api_key) = config.flickr_api_key.clone().filter(|k| !k.trim().is_empty()) else {
        print_error(
            "No Flickr API key configured",
            &["The config file has no flickr_api_key", "FLICKR_API_KEY is not set"],
            &["Set a key: photogallery config set-key <KEY>", "Or export FLICKR_API_KEY=<KEY>"],
        );
        std::process::exit(exit_codes::CONFIG);
    };

    FlickrClient::new(config.endpoint(), api_key, config.timeouts()).context("Failed to create Flickr client")
}

async fn fetch_gallery(client: &FlickrClient, query: Option<&str>) -> Vec<GalleryItem> {
    let message = match query {
        Some(q) => format!("Searching Flickr for \"{q}\"..."),
        None => "Fetching recent photos...".to_string(),
    };
    let spinner = spinner::create(&message);
    let result = client.fetch_gallery_items(query).await;
    spinner.finish_and_clear();

    match result {
        Ok(items) => items,
        Err(e) => {
            report_fetch_error("Failed to fetch gallery", &e);
            std::process::exit(exit_codes::SERVICE_UNAVAILABLE);
        }
    }
}

fn print_items(items: &[GalleryItem], limit: usize) {
    if items.is_empty() {
        println!("{} No photos found", "[!]".yellow());
        return;
    }

    println!();
    for (i, item) in items.iter().take(limit).enumerate() {
        let caption = if item.caption.is_empty() {
            "(untitled)".dimmed().to_string()
        } else {
            item.caption.bold().to_string()
        };
        println!("{:>4}. {} {}", i + 1, caption, format!("[{}]", item.id).dimmed());
        println!("      {}", item.url.cyan());
    }
    println!();
    println!("Showing {} of {} photos", items.len().min(limit), items.len());
}

struct ThumbsOptions {
    slots: usize,
    scroll_interval: Duration,
    max_edge: Option<u32>,
}

/// Drive the downloader the way a recycling list would: each scroll step
/// rebinds the next slot to the next photo, and every frame dispatches
/// whatever thumbnails have arrived.
async fn run_thumbs(items: &[GalleryItem], config: &Config, options: &ThumbsOptions) -> Result<()> {
    if items.is_empty() {
        println!("{} No photos to load", "[!]".yellow());
        return Ok(());
    }

    let slots: Vec<SlotKey> = (0..options.slots).map(|_| SlotKey::new()).collect();
    let bound: Rc<RefCell<HashMap<SlotKey, usize>>> = Rc::default();
    let shown: Rc<RefCell<HashMap<SlotKey, (u32, u32)>>> = Rc::default();

    let fetcher = HttpFetcher::with_timeouts(config.timeouts())?;
    let mut downloader = ThumbnailDownloader::with_max_edge(fetcher, options.max_edge);

    // Sized by dispatched tasks, which grows as the list scrolls.
    let progress = spinner::bar(0);
    {
        let shown = shown.clone();
        downloader.set_delivery_callback(move |slot: SlotKey, image| {
            shown.borrow_mut().insert(slot, image.dimensions());
        });
    }
    downloader.start()?;

    let mut frame = tokio::time::interval(options.scroll_interval);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut next_item = 0;
    let mut dispatched: u64 = 0;
    let mut interrupted = false;

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                interrupted = true;
                break;
            }
            _ = frame.tick() => {}
        }

        if next_item < items.len() {
            let slot = slots[next_item % slots.len()];
            // Rebinding shows the placeholder until the new thumbnail arrives.
            bound.borrow_mut().insert(slot, next_item);
            shown.borrow_mut().remove(&slot);
            if downloader.enqueue(slot, Some(items[next_item].url.as_str())) {
                dispatched += 1;
            }
            progress.set_message(format!("scrolled to #{}", next_item + 1));
            next_item += 1;
        }

        downloader.dispatch_pending();

        let stats = downloader.stats();
        progress.set_length(dispatched);
        progress.set_position(stats.resolved().min(dispatched));

        if scroll_settled(next_item >= items.len(), dispatched, &stats) {
            break;
        }
        if downloader.state().is_terminal() {
            tracing::warn!("Thumbnail worker exited early");
            break;
        }
    }

    progress.finish_and_clear();
    downloader.cancel_all();
    downloader.stop();

    if interrupted {
        println!("{} Interrupted", "[!]".yellow());
    } else {
        downloader.join()?;
    }

    print_slots(items, &slots, &bound.borrow(), &shown.borrow());
    let stats = downloader.stats();
    println!(
        "Delivered {}, fetched {}, failed {}, stale {}, superseded {}",
        stats.delivered.to_string().green(),
        stats.fetched,
        stats.failed.to_string().red(),
        stats.stale.to_string().yellow(),
        stats.superseded
    );
    println!();
    Ok(())
}

/// Whether the simulated scroll is over and every dispatched task has an
/// outcome. Failed requests stay mapped but are never retried, so they count
/// as done.
fn scroll_settled(all_bound: bool, dispatched: u64, stats: &WorkerStats) -> bool {
    all_bound && stats.resolved() >= dispatched
}

fn print_slots(
    items: &[GalleryItem],
    slots: &[SlotKey],
    bound: &HashMap<SlotKey, usize>,
    shown: &HashMap<SlotKey, (u32, u32)>,
) {
    println!();
    println!("{}", "=== Visible slots ===".cyan().bold());
    for slot in slots {
        let Some(&index) = bound.get(slot) else {
            println!("  {:<9} {}", slot.to_string(), "(unused)".dimmed());
            continue;
        };
        let item = &items[index];
        let image = match shown.get(slot) {
            Some((w, h)) => format!("{w}x{h}").green().to_string(),
            None => "placeholder".yellow().to_string(),
        };
        println!("  {:<9} #{:<4} {:<12} {}", slot.to_string(), index + 1, image, item.caption);
    }
    println!();
}

fn handle_config(command: Option<ConfigCommands>, mut config: Config) -> Result<()> {
    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("{}", "=== Photogallery Configuration ===".cyan().bold());
            println!();

            let key_display = config
                .flickr_api_key
                .as_ref()
                .map(|k| {
                    let prefix: String = k.chars().take(8).collect();
                    format!("{prefix}...")
                })
                .unwrap_or_else(|| "(not set)".dimmed().to_string());
            println!("  Flickr API key:  {}", key_display);
            println!("  Endpoint:        {}", config.endpoint());
            let timeouts = config.timeouts();
            println!("  Connect timeout: {}s", timeouts.connect.as_secs());
            println!("  Request timeout: {}s", timeouts.request.as_secs());
            println!(
                "  Max thumb edge:  {}",
                config
                    .thumbnail_max_edge
                    .map(|e| format!("{e}px"))
                    .unwrap_or_else(|| "(original size)".to_string())
            );
            println!("  Slots:           {}", config.slots());
            println!();

            if let Ok(path) = config_path() {
                println!("Config file: {}", path.display());
            }
            println!();
        }
        Some(ConfigCommands::SetKey { key }) => {
            let key = key.trim().to_string();
            if key.is_empty() {
                print_error("API key is empty", &[], &["Pass the key from your Flickr app page"]);
                std::process::exit(exit_codes::CONFIG);
            }
            config.flickr_api_key = Some(key);
            save_config(&config)?;
            println!("{} Flickr API key set", "[✓]".green());
            println!();
        }
    }
    Ok(())
}

fn report_fetch_error(title: &str, error: &FetchError) {
    let (causes, fixes) = error.hints();
    print_error(&format!("{title}: {error}"), causes, fixes);
}

fn print_error(title: &str, causes: &[&str], fixes: &[&str]) {
    eprintln!("{} {}", "[✗]".red(), title);
    eprintln!();
    if !causes.is_empty() {
        eprintln!("Possible causes:");
        for cause in causes {
            eprintln!("  - {cause}");
        }
        eprintln!();
    }
    if !fixes.is_empty() {
        eprintln!("Try these fixes:");
        for (i, fix) in fixes.iter().enumerate() {
            eprintln!("  {}. {}", i + 1, fix);
        }
        eprintln!();
    }
}
