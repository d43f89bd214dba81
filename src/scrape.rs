use anyhow::{bail, Context, Result};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::fetch::{HttpFetcher, PageFetcher, BROWSER_USER_AGENT};
use crate::site::{Site, SiteConfig};
use crate::store::RecordStore;
use crate::throttle::{Pause, Throttle};
use crate::utils::{osc8_file_link, parse_sections};
use crate::walk::CatalogWalker;

pub const DEFAULT_OUTPUT: &str = "products.csv";

pub struct ScrapeOptions {
    pub site: String,
    pub base_url: Option<String>,
    pub sections: Vec<String>,
    pub sections_file: Option<PathBuf>,
    pub output: PathBuf,
    pub identity: Vec<String>,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub user_agent: Option<String>,
    pub quiet: bool,
}

/// Totals over every catalog section of a run
#[derive(Debug, Default)]
pub struct RunSummary {
    pub sections: usize,
    pub found: usize,
    pub collected: usize,
    pub added: usize,
    pub duplicates: usize,
    pub failed_sections: Vec<String>,
}

/// Paths on the command line win, then the sections file, then the site's defaults
fn resolve_sections(opts: &ScrapeOptions, site: &Site) -> Result<Vec<String>> {
    if !opts.sections.is_empty() {
        return Ok(opts.sections.clone());
    }
    if let Some(path) = &opts.sections_file {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read sections file: {}", path.display()))?;
        return Ok(parse_sections(&content));
    }
    Ok(site.sections.clone())
}

pub fn run_scrape(opts: ScrapeOptions) -> Result<()> {
    if opts.min_delay_ms > opts.max_delay_ms {
        bail!(
            "--min-delay-ms ({}) must not exceed --max-delay-ms ({})",
            opts.min_delay_ms,
            opts.max_delay_ms
        );
    }

    let mut site = SiteConfig::resolve(&opts.site)?
        .compile(opts.base_url.clone())
        .with_context(|| format!("Invalid site definition '{}'", opts.site))?;
    if !opts.identity.is_empty() {
        site.identity_fields = opts.identity.clone();
    }

    let sections = resolve_sections(&opts, &site)?;
    if sections.is_empty() {
        bail!("No catalog paths to scrape. Pass paths, --sections-file, or a site with default sections.");
    }

    let fetcher = HttpFetcher::new(opts.user_agent.as_deref().unwrap_or(BROWSER_USER_AGENT))?;
    let throttle = Throttle::new(
        Duration::from_millis(opts.min_delay_ms),
        Duration::from_millis(opts.max_delay_ms),
    );
    let store = RecordStore::new(&opts.output);

    if !opts.quiet {
        println!(
            "Scraping {} catalog sections of {} ({}) into {}",
            sections.len(),
            site.name,
            site.base_url,
            opts.output.display()
        );
    }

    let summary = scrape_sections(&site, &fetcher, throttle, &store, &sections, opts.quiet);

    if !opts.quiet {
        println!(
            "\nDone! {} products found, {} collected, {} added, {} duplicates skipped",
            summary.found, summary.collected, summary.added, summary.duplicates
        );
    }

    if !summary.failed_sections.is_empty() {
        bail!(
            "{} of {} catalog sections failed: {}",
            summary.failed_sections.len(),
            summary.sections,
            summary.failed_sections.join(", ")
        );
    }
    Ok(())
}

/// Walk each section in turn and merge its batch into the store right away
pub fn scrape_sections<F: PageFetcher, P: Pause>(
    site: &Site,
    fetcher: &F,
    pause: P,
    store: &RecordStore,
    sections: &[String],
    quiet: bool,
) -> RunSummary {
    let mut walker = CatalogWalker::new(site, fetcher, pause);
    let mut summary = RunSummary {
        sections: sections.len(),
        ..Default::default()
    };
    let total = sections.len();

    for (i, section) in sections.iter().enumerate() {
        if !quiet {
            println!("\n[{:02}/{:02}] Catalog {}", i + 1, total, section);
        }

        let batch = match walker.walk(section) {
            Ok(batch) => batch,
            Err(e) => {
                eprintln!("Error loading catalog {}: {}", section, e);
                summary.failed_sections.push(section.clone());
                continue;
            }
        };

        summary.found += batch.found;
        summary.collected += batch.records.len();
        if !quiet {
            println!(
                "  Found {} products at {}, collected {}, skipped {}",
                batch.found,
                batch.listing_url,
                batch.records.len(),
                batch.skipped()
            );
        }

        if batch.records.is_empty() {
            if !quiet {
                println!("  No data to save");
            }
            continue;
        }

        let stats = match store.merge_and_commit(&batch.records, &site.identity_fields) {
            Ok(stats) => stats,
            Err(e) => {
                eprintln!("Error saving catalog {}: {}", section, e);
                summary.failed_sections.push(section.clone());
                continue;
            }
        };

        summary.added += stats.added;
        summary.duplicates += stats.skipped;
        if !quiet {
            if stats.shared_identities > 0 {
                println!("  Duplicates found: {}", stats.shared_identities);
            }
            let path = store.path().to_string_lossy();
            if stats.added > 0 {
                println!("  Saved to {}", osc8_file_link(&path, &path));
            } else {
                println!("  Nothing new to save");
            }
            println!(
                "  Rows in file: {} (was {}), added: {}, duplicates skipped: {}",
                stats.total, stats.existing, stats.added, stats.skipped
            );
        }
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FixtureFetcher;
    use crate::throttle::RecordingSleeper;
    use tempfile::TempDir;

    fn listing(hrefs: &[&str]) -> String {
        let items: String = hrefs
            .iter()
            .map(|h| format!(r#"<li><a href="{}">item</a></li>"#, h))
            .collect();
        format!(r#"<ul class="b-goods">{}</ul>"#, items)
    }

    fn detail(article: &str) -> String {
        format!(r#"<div class="b-item-title"><h1>{}</h1></div>"#, article)
    }

    fn fixture() -> FixtureFetcher {
        FixtureFetcher::new()
            .with_page("https://manotom.com/catalog/a/", &listing(&["/p/1/", "/p/2/"]))
            .with_page("https://manotom.com/catalog/b/", &listing(&["/p/2/", "/p/3/"]))
            .with_page("https://manotom.com/catalog/empty/", &listing(&[]))
            .with_page("https://manotom.com/p/1/", &detail("A-1"))
            .with_page("https://manotom.com/p/2/", &detail("A-2"))
            .with_page("https://manotom.com/p/3/", &detail("A-3"))
    }

    fn pause() -> Throttle<RecordingSleeper> {
        Throttle::with_sleeper(Duration::ZERO, Duration::ZERO, RecordingSleeper::default())
    }

    #[test]
    fn test_scrape_sections_merges_per_section() {
        let dir = TempDir::new().unwrap();
        let store = RecordStore::new(dir.path().join("products.csv"));
        let site = SiteConfig::builtin("manotom").unwrap().compile(None).unwrap();
        let sections: Vec<String> = ["/catalog/a/", "/catalog/missing/", "/catalog/empty/", "/catalog/b/"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let summary = scrape_sections(&site, &fixture(), pause(), &store, &sections, true);

        assert_eq!(summary.sections, 4);
        assert_eq!(summary.failed_sections, vec!["/catalog/missing/".to_string()]);
        assert_eq!(summary.found, 4);
        assert_eq!(summary.collected, 4);
        assert_eq!(summary.added, 3);
        assert_eq!(summary.duplicates, 1);

        let table = store.load().unwrap().unwrap();
        let articles: Vec<_> = table.rows.iter().map(|r| r[1].as_str()).collect();
        assert_eq!(articles, vec!["A-1", "A-2", "A-3"]);
    }

    #[test]
    fn test_rerun_adds_nothing() {
        let dir = TempDir::new().unwrap();
        let store = RecordStore::new(dir.path().join("products.csv"));
        let site = SiteConfig::builtin("manotom").unwrap().compile(None).unwrap();
        let sections = vec!["/catalog/a/".to_string()];

        scrape_sections(&site, &fixture(), pause(), &store, &sections, true);
        let before = fs::read(store.path()).unwrap();

        let summary = scrape_sections(&site, &fixture(), pause(), &store, &sections, true);
        assert_eq!(summary.added, 0);
        assert_eq!(summary.duplicates, 2);
        assert_eq!(fs::read(store.path()).unwrap(), before);
    }

    #[test]
    fn test_resolve_sections_precedence() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("sections.txt");
        fs::write(&file, "/from/file/\n").unwrap();
        let site = SiteConfig::builtin("manotom").unwrap().compile(None).unwrap();

        let mut opts = ScrapeOptions {
            site: "manotom".to_string(),
            base_url: None,
            sections: vec!["/from/args/".to_string()],
            sections_file: Some(file),
            output: PathBuf::from(DEFAULT_OUTPUT),
            identity: Vec::new(),
            min_delay_ms: 0,
            max_delay_ms: 0,
            user_agent: None,
            quiet: true,
        };
        assert_eq!(resolve_sections(&opts, &site).unwrap(), vec!["/from/args/"]);

        opts.sections.clear();
        assert_eq!(resolve_sections(&opts, &site).unwrap(), vec!["/from/file/"]);

        opts.sections_file = None;
        assert_eq!(resolve_sections(&opts, &site).unwrap(), site.sections);
    }

    #[test]
    fn test_run_scrape_rejects_inverted_delays() {
        let opts = ScrapeOptions {
            site: "manotom".to_string(),
            base_url: None,
            sections: Vec::new(),
            sections_file: None,
            output: PathBuf::from(DEFAULT_OUTPUT),
            identity: Vec::new(),
            min_delay_ms: 3000,
            max_delay_ms: 2000,
            user_agent: None,
            quiet: true,
        };
        assert!(run_scrape(opts).is_err());
    }
}
