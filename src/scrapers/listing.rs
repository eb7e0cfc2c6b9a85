//! Listing page discovery.
//!
//! Fetches the configured listing page and turns every item node into an
//! absolute detail-page URL. A listing fetch failure is returned to the
//! caller: without the listing there is nothing to ingest.

use crate::config::CompiledSelectors;
use crate::error::FetchError;
use crate::scrapers::fetcher::{Document, DocumentFetcher};
use itertools::Itertools;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Selector};
use tracing::{debug, info, instrument};
use url::Url;

static ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("static selector"));

/// Resolve the listing page into distinct absolute detail URLs.
///
/// Order is not significant. Item nodes without a usable link are skipped,
/// so the result never has more entries than there are item nodes.
#[instrument(level = "info", skip_all, fields(listing_url = %selectors.listing_url))]
pub async fn discover(
    fetcher: &dyn DocumentFetcher,
    selectors: &CompiledSelectors,
) -> Result<Vec<String>, FetchError> {
    let document = fetcher.fetch(selectors.listing_url.as_str()).await?;
    let urls = item_urls(&document, selectors);
    info!(count = urls.len(), "Indexed detail page URLs");
    debug!(urls = ?urls, "Detail URLs");
    Ok(urls)
}

/// Detail URLs linked from the item nodes of an already fetched listing.
pub fn item_urls(document: &Document, selectors: &CompiledSelectors) -> Vec<String> {
    document
        .select(&selectors.item)
        .filter_map(item_href)
        .filter_map(|href| resolve_href(&selectors.base_url, href))
        .unique()
        .collect()
}

/// The item's own `href` if it is an anchor, else its first descendant link.
fn item_href(item: ElementRef<'_>) -> Option<&str> {
    let element = item.value();
    if element.name() == "a" {
        if let Some(href) = element.attr("href") {
            return Some(href);
        }
    }
    item.select(&ANCHOR).find_map(|a| a.value().attr("href"))
}

/// Make `href` absolute against `base`.
///
/// Absolute `http(s)` links are returned unchanged; relative links are
/// resolved against the base. Empty links and other schemes (`mailto:`,
/// `javascript:`) yield `None`.
pub fn resolve_href(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    match Url::parse(href) {
        Ok(absolute) if is_web(&absolute) => Some(href.to_string()),
        Ok(other) => {
            debug!(href, scheme = other.scheme(), "Skipping non-web link");
            None
        }
        Err(_) => match base.join(href) {
            Ok(resolved) if is_web(&resolved) => Some(resolved.to_string()),
            Ok(_) => None,
            Err(e) => {
                debug!(href, error = %e, "Skipping unresolvable link");
                None
            }
        },
    }
}

fn is_web(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}
