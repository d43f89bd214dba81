use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Instant;

mod error;
mod extract;
mod fetch;
mod scrape;
mod site;
mod store;
mod throttle;
mod types;
mod utils;
mod walk;

use site::{SiteConfig, BUILTIN_SITES};
use throttle::{DEFAULT_MAX_DELAY_MS, DEFAULT_MIN_DELAY_MS};

#[derive(Parser)]
#[command(name = "catalog-scraper")]
#[command(about = "Scrape product catalogs into a deduplicated CSV table")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk catalog pages and merge new products into the CSV table
    Scrape {
        /// Catalog paths to walk (default: the sections file, then the site's own list)
        #[arg(value_name = "CATALOG_PATH")]
        sections: Vec<String>,
        /// Built-in site name or path to a .conl site definition
        #[arg(short, long, default_value = "manotom")]
        site: String,
        /// Override the site's base URL
        #[arg(long)]
        base_url: Option<String>,
        /// File with one catalog path per line
        #[arg(long)]
        sections_file: Option<PathBuf>,
        /// Output CSV table, merged with what is already there
        #[arg(short, long, default_value = scrape::DEFAULT_OUTPUT)]
        output: PathBuf,
        /// Identity field for duplicate detection (repeatable; replaces the site's list)
        #[arg(long = "identity", value_name = "FIELD")]
        identity: Vec<String>,
        /// Shortest pause between product requests
        #[arg(long, default_value_t = DEFAULT_MIN_DELAY_MS)]
        min_delay_ms: u64,
        /// Longest pause between product requests
        #[arg(long, default_value_t = DEFAULT_MAX_DELAY_MS)]
        max_delay_ms: u64,
        /// User-Agent header sent with every request
        #[arg(long)]
        user_agent: Option<String>,
        /// Quiet mode - suppress progress output
        #[arg(short, long)]
        quiet: bool,
    },
    /// List built-in sites and their fields
    Sites,
}

fn init_tracing(quiet: bool) {
    let default = if quiet { "warn" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run_sites() -> Result<()> {
    for name in BUILTIN_SITES {
        let Some(config) = SiteConfig::builtin(name) else {
            continue;
        };
        println!("{}", config.name);
        println!(
            "  base url:  {}",
            config.base_url.as_deref().unwrap_or("(pass --base-url)")
        );
        println!("  links:     {}", config.listing.href_policy.as_str());
        println!("  identity:  {}", config.identity_fields.join(", "));
        println!("  sections:  {}", config.sections.len());
        println!("  fields:");
        for field in &config.fields {
            println!(
                "    {:<16} {:<10} {}",
                field.name,
                field.kind.as_str(),
                field.selector.as_deref().unwrap_or("")
            );
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let t0 = Instant::now();

    match cli.command {
        Commands::Scrape {
            sections,
            site,
            base_url,
            sections_file,
            output,
            identity,
            min_delay_ms,
            max_delay_ms,
            user_agent,
            quiet,
        } => {
            init_tracing(quiet);
            let result = scrape::run_scrape(scrape::ScrapeOptions {
                site,
                base_url,
                sections,
                sections_file,
                output,
                identity,
                min_delay_ms,
                max_delay_ms,
                user_agent,
                quiet,
            });
            if !quiet {
                println!("Finished in {}", utils::format_duration(t0.elapsed()));
            }
            result
        }
        Commands::Sites => run_sites(),
    }
}
