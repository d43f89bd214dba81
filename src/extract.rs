//! Turn a product detail page into a [`ProductRecord`]

use scraper::{ElementRef, Html, Selector};

use crate::error::ExtractionFailure;
use crate::fetch::PageFetcher;
use crate::site::{FieldMap, FieldRule};
use crate::types::ProductRecord;

/// Fetch a detail page and extract it. Fetch failures become
/// [`ExtractionFailure::Unavailable`].
pub fn fetch_and_extract<F: PageFetcher>(
    fetcher: &F,
    field_map: &FieldMap,
    detail_url: &str,
) -> Result<ProductRecord, ExtractionFailure> {
    let html = fetcher.fetch(detail_url)?;
    extract(&html, field_map, detail_url)
}

/// Extract every field of `field_map` from `html`.
///
/// Absent elements yield empty strings; only a page with no content at all
/// fails, and then no partial record is produced.
pub fn extract(
    html: &str,
    field_map: &FieldMap,
    detail_url: &str,
) -> Result<ProductRecord, ExtractionFailure> {
    if html.trim().is_empty() {
        return Err(ExtractionFailure::EmptyPage {
            url: detail_url.to_string(),
        });
    }

    let document = Html::parse_document(html);
    let mut record = ProductRecord::new();

    for field in field_map.fields() {
        let value = match &field.rule {
            FieldRule::Text(selector) => first_text(&document, selector),
            FieldRule::Pairs { names, values } => paired_lines(&document, names, values),
            FieldRule::Flag { selector, yes, no } => {
                if document.select(selector).next().is_some() {
                    yes.clone()
                } else {
                    no.clone()
                }
            }
            FieldRule::SourceUrl => detail_url.to_string(),
        };
        record.insert(field.name.as_str(), value);
    }

    Ok(record)
}

fn element_text(element: ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn first_text(document: &Html, selector: &Selector) -> String {
    document
        .select(selector)
        .next()
        .map(element_text)
        .unwrap_or_default()
}

/// "name: value" per line, paired by position; stops at the shorter list
fn paired_lines(document: &Html, names: &Selector, values: &Selector) -> String {
    document
        .select(names)
        .zip(document.select(values))
        .map(|(name, value)| format!("{}: {}", element_text(name), element_text(value)))
        .collect::<Vec<_>>()
        .join("\n")
}
