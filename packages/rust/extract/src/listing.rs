//! Listing-mode extraction: item links from the quiz index page.

use std::collections::HashSet;

use scraper::{Html, Selector};
use tracing::{debug, warn};
use url::Url;

use quizrelay_shared::{ItemId, Result};

use crate::selector;

/// Finds item links inside `div.card-section` cards.
pub struct ListingExtractor {
    card: Selector,
    link: Selector,
}

impl ListingExtractor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            card: selector("div.card-section")?,
            link: selector("a[href]")?,
        })
    }

    /// Item identifiers in page order, absolute against `base`, first occurrence kept.
    pub fn extract(&self, html: &str, base: &Url) -> Vec<ItemId> {
        let doc = Html::parse_document(html);
        let mut seen = HashSet::new();
        let mut ids = Vec::new();

        for card in doc.select(&self.card) {
            let Some(href) = card
                .select(&self.link)
                .next()
                .and_then(|a| a.value().attr("href"))
            else {
                continue;
            };

            let url = match base.join(href.trim()) {
                Ok(u) => u,
                Err(e) => {
                    debug!(href, error = %e, "skipping unresolvable link");
                    continue;
                }
            };
            if seen.insert(url.to_string()) {
                ids.push(ItemId::new(url.to_string()));
            }
        }

        if ids.is_empty() {
            warn!("no card-section links found on listing page");
        }
        ids
    }
}
