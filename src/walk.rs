//! Catalog traversal: listing page to product records

use scraper::{ElementRef, Html};
use tracing::{info, warn};

use crate::error::FetchError;
use crate::extract::fetch_and_extract;
use crate::fetch::PageFetcher;
use crate::site::{Listing, Site};
use crate::throttle::Pause;
use crate::types::ProductRecord;

/// Records collected from one listing page, plus what happened to the rest
#[derive(Debug, Clone, Default)]
pub struct CatalogBatch {
    pub listing_url: String,
    /// Item entries on the listing page
    pub found: usize,
    /// Entries without a usable link
    pub unlinked: usize,
    /// Entries whose detail page could not be extracted
    pub failed: usize,
    pub records: Vec<ProductRecord>,
}

impl CatalogBatch {
    pub fn skipped(&self) -> usize {
        self.unlinked + self.failed
    }
}

enum ItemLink {
    Url(String),
    NoAnchor,
    NoHref,
}

impl Listing {
    /// First link selector that matches inside `item` wins
    fn link_in<'b>(&self, item: ElementRef<'b>) -> Option<ElementRef<'b>> {
        self.links.iter().find_map(|selector| item.select(selector).next())
    }
}

pub struct CatalogWalker<'a, F, P> {
    site: &'a Site,
    fetcher: &'a F,
    pause: P,
    walks: usize,
}

impl<'a, F: PageFetcher, P: Pause> CatalogWalker<'a, F, P> {
    pub fn new(site: &'a Site, fetcher: &'a F, pause: P) -> Self {
        Self {
            site,
            fetcher,
            pause,
            walks: 0,
        }
    }

    /// Walk one listing page. Only a failure to load the listing itself is an
    /// error; per-item problems are counted in the batch.
    pub fn walk(&mut self, catalog_path: &str) -> Result<CatalogBatch, FetchError> {
        let listing_url = self.site.listing_url(catalog_path);
        let mut batch = CatalogBatch {
            listing_url: listing_url.clone(),
            ..Default::default()
        };

        if self.walks > 0 {
            self.pause.pause();
        }
        self.walks += 1;

        info!("Loading catalog page {}", listing_url);
        let html = self.fetcher.fetch(&listing_url)?;
        let links = self.discover(&html);

        batch.found = links.len();
        if links.is_empty() {
            warn!("No products found at {}", listing_url);
            return Ok(batch);
        }
        info!("Found {} products", batch.found);

        let total = batch.found;
        let mut attempted = 0usize;
        for (i, link) in links.into_iter().enumerate() {
            let index = i + 1;
            let url = match link {
                ItemLink::Url(url) => url,
                ItemLink::NoAnchor => {
                    warn!("[{}/{}] No link found for product", index, total);
                    batch.unlinked += 1;
                    continue;
                }
                ItemLink::NoHref => {
                    warn!("[{}/{}] Product link has no href", index, total);
                    batch.unlinked += 1;
                    continue;
                }
            };

            // The first detail request follows the listing fetch directly
            if attempted > 0 {
                self.pause.pause();
            }
            attempted += 1;

            info!("[{}/{}] {}", index, total, url);
            match fetch_and_extract(self.fetcher, &self.site.field_map, &url) {
                Ok(record) => {
                    info!(
                        "[{}/{}] Collected {}",
                        index,
                        total,
                        record.label(&self.site.identity_fields).unwrap_or(&url)
                    );
                    batch.records.push(record);
                }
                Err(e) => {
                    warn!("[{}/{}] Skipped {}: {}", index, total, url, e);
                    batch.failed += 1;
                }
            }
        }

        Ok(batch)
    }

    fn discover(&self, html: &str) -> Vec<ItemLink> {
        let document = Html::parse_document(html);
        let listing = &self.site.listing;

        document
            .select(&listing.items)
            .map(|item| match listing.link_in(item) {
                None => ItemLink::NoAnchor,
                Some(anchor) => match anchor.value().attr("href").map(str::trim) {
                    Some(href) if !href.is_empty() => {
                        ItemLink::Url(listing.href_policy.resolve(&self.site.base_url, href))
                    }
                    _ => ItemLink::NoHref,
                },
            })
            .collect()
    }

    #[cfg(test)]
    fn pause_state(&self) -> &P {
        &self.pause
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FixtureFetcher;
    use crate::site::SiteConfig;
    use crate::throttle::{RecordingSleeper, Throttle};
    use std::time::Duration;

    const MIN: Duration = Duration::from_millis(2000);
    const MAX: Duration = Duration::from_millis(3000);

    fn throttle() -> Throttle<RecordingSleeper> {
        Throttle::with_sleeper(MIN, MAX, RecordingSleeper::default())
    }

    fn manotom() -> Site {
        SiteConfig::builtin("manotom").unwrap().compile(None).unwrap()
    }

    fn detail(article: &str) -> String {
        format!(
            r#"<div class="b-item-title"><h5>Манометры</h5><h1>{}</h1></div>"#,
            article
        )
    }

    const LISTING: &str = r#"
        <ul class="b-goods">
          <li><a href="/catalog/dif/dm-1/">DM-1</a></li>
          <li><span>no link</span></li>
          <li><a href="https://manotom.com/catalog/dif/dm-2/">DM-2</a></li>
          <li><a href="/catalog/dif/gone/">Gone</a></li>
          <li><a>no href</a></li>
          <li><a href="/catalog/dif/dm-3/">DM-3</a></li>
        </ul>"#;

    #[test]
    fn test_walk_isolates_item_failures() {
        let site = manotom();
        let fetcher = FixtureFetcher::new()
            .with_page("https://manotom.com/catalog/dif/", LISTING)
            .with_page("https://manotom.com/catalog/dif/dm-1/", &detail("DM-1"))
            .with_page("https://manotom.com/catalog/dif/dm-2/", &detail("DM-2"))
            .with_page("https://manotom.com/catalog/dif/dm-3/", &detail("DM-3"));

        let mut walker = CatalogWalker::new(&site, &fetcher, throttle());
        let batch = walker.walk("/catalog/dif/").unwrap();

        assert_eq!(batch.found, 6);
        assert_eq!(batch.unlinked, 2);
        assert_eq!(batch.failed, 1);
        assert_eq!(batch.skipped(), 3);

        let articles: Vec<_> = batch.records.iter().map(|r| r.get("артикул").unwrap()).collect();
        assert_eq!(articles, vec!["DM-1", "DM-2", "DM-3"]);
        assert_eq!(
            batch.records[1].get("url"),
            Some("https://manotom.com/catalog/dif/dm-2/")
        );

        // 4 detail requests were attempted: 3 pauses between them
        let sleeps = &walker.pause_state().sleeper().sleeps;
        assert_eq!(sleeps.len(), 3);
        assert!(sleeps.iter().all(|d| *d >= MIN && *d <= MAX));
        assert_eq!(fetcher.requests.borrow().len(), 5);
    }

    #[test]
    fn test_walk_pauses_before_next_listing() {
        let site = manotom();
        let fetcher = FixtureFetcher::new()
            .with_page(
                "https://manotom.com/catalog/a/",
                r#"<ul class="b-goods"><li><a href="/catalog/a/1/">1</a></li></ul>"#,
            )
            .with_page("https://manotom.com/catalog/a/1/", &detail("A-1"));

        let mut walker = CatalogWalker::new(&site, &fetcher, throttle());
        assert_eq!(walker.walk("/catalog/a/").unwrap().records.len(), 1);
        assert!(walker.pause_state().sleeper().sleeps.is_empty());

        assert_eq!(walker.walk("/catalog/a/").unwrap().records.len(), 1);
        assert_eq!(walker.pause_state().sleeper().sleeps.len(), 1);
    }

    #[test]
    fn test_walk_empty_listing_yields_empty_batch() {
        let site = manotom();
        let fetcher = FixtureFetcher::new()
            .with_page("https://manotom.com/catalog/empty/", "<ul class=\"b-goods\"></ul>");

        let mut walker = CatalogWalker::new(&site, &fetcher, throttle());
        let batch = walker.walk("/catalog/empty/").unwrap();
        assert_eq!(batch.found, 0);
        assert!(batch.records.is_empty());
        assert_eq!(fetcher.requests.borrow().len(), 1);
    }

    #[test]
    fn test_walk_listing_failure_is_error() {
        let site = manotom();
        let fetcher = FixtureFetcher::new();
        let mut walker = CatalogWalker::new(&site, &fetcher, throttle());
        let err = walker.walk("/catalog/missing/").unwrap_err();
        assert_eq!(err.to_string(), "https://manotom.com/catalog/missing/ returned HTTP 404");
    }

    #[test]
    fn test_link_fallback_chain_and_slash_join() {
        let site = SiteConfig::builtin("bitrix")
            .unwrap()
            .compile(Some("https://shop.example.com/".to_string()))
            .unwrap();
        let listing = r#"
            <div class="catalog-section">
              <div class="product-item"><a class="product-item-title" href="/p/primary/">x</a><a href="/p/other/">y</a></div>
              <div class="product-item"><div class="product-item-title"><a href="p/nested/">x</a></div></div>
              <div class="product-item"><a href="/p/last-resort/">x</a></div>
            </div>"#;
        let page = r#"<h1>Gauge</h1><div class="product-item-detail-article"><span>G-1</span></div>"#;
        let fetcher = FixtureFetcher::new()
            .with_page("https://shop.example.com/gauges/", listing)
            .with_page("https://shop.example.com/p/primary/", page)
            .with_page("https://shop.example.com/p/nested/", page)
            .with_page("https://shop.example.com/p/last-resort/", page);

        let mut walker = CatalogWalker::new(&site, &fetcher, throttle());
        let batch = walker.walk("gauges/").unwrap();

        let urls: Vec<_> = batch.records.iter().map(|r| r.get("url").unwrap()).collect();
        assert_eq!(
            urls,
            vec![
                "https://shop.example.com/p/primary/",
                "https://shop.example.com/p/nested/",
                "https://shop.example.com/p/last-resort/",
            ]
        );
        assert_eq!(batch.records[0].get("name"), Some("Gauge"));
        assert_eq!(batch.records[0].get("price"), Some(""));
    }
}
