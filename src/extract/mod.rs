pub mod base;
pub mod builder;
pub mod fields;
pub mod timetext;

use std::collections::HashSet;

use chrono::DateTime;
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::config::CompiledLocale;
use crate::models::EventRecord;

static ANCHOR_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("anchor selector"));

const CARD_ROLES: [&str; 2] = ["article", "button"];
const CARD_CLASS_HINTS: [&str; 2] = ["x1n2onr6", "xdt5ytf"];
const LISTING_URL_PREFIX: &str = "https://www.facebook.com/events/";

/// How one card's visible text is acquired from its subtree. The separation
/// logic downstream is identical for every strategy; only the traversal that
/// feeds it differs.
pub trait TextAcquisition: Send + Sync {
    fn name(&self) -> &'static str;
    fn acquire(&self, card: ElementRef<'_>) -> String;
}

/// Whole-subtree text, the rendered-text equivalent.
pub struct InnerText;

impl TextAcquisition for InnerText {
    fn name(&self) -> &'static str {
        "inner_text"
    }

    fn acquire(&self, card: ElementRef<'_>) -> String {
        base::clean_text(&card.text().collect::<Vec<_>>().join(" "))
    }
}

/// Text-node walk: trimmed, non-empty nodes in document order.
pub struct LeafWalk;

impl TextAcquisition for LeafWalk {
    fn name(&self) -> &'static str {
        "leaf_walk"
    }

    fn acquire(&self, card: ElementRef<'_>) -> String {
        let nodes: Vec<&str> = card
            .text()
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .collect();
        base::clean_text(&nodes.join(" "))
    }
}

/// Leaf elements only: elements with no child elements contribute their own
/// text, one segment per element.
pub struct PerElement;

impl TextAcquisition for PerElement {
    fn name(&self) -> &'static str {
        "per_element"
    }

    fn acquire(&self, card: ElementRef<'_>) -> String {
        let mut segments = Vec::new();
        for node in card.descendants() {
            let Some(element) = ElementRef::wrap(node) else {
                continue;
            };
            let has_child_elements = element.children().any(|child| child.value().is_element());
            if has_child_elements {
                continue;
            }
            let text = base::clean_text(&element.text().collect::<Vec<_>>().join(" "));
            if !text.is_empty() {
                segments.push(text);
            }
        }
        segments.join(" ")
    }
}

/// Scans a rendered feed document for listing cards and builds one record per
/// candidate. Candidates without an id-bearing href or a resolvable card
/// container are skipped; a skip never aborts the pass. Duplicate ids are
/// left in scan order for the pipeline to resolve first-seen-wins.
pub fn scan_document(
    html: &str,
    strategy: &dyn TextAcquisition,
    now: DateTime<Tz>,
    locale: &CompiledLocale,
    description_limit: usize,
) -> Vec<EventRecord> {
    let document = Html::parse_document(html);
    let mut records = Vec::new();

    for anchor in document.select(&ANCHOR_SELECTOR) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let Some(id) = base::event_id_from_href(href) else {
            continue;
        };
        let Some(card) = card_for(anchor) else {
            continue;
        };

        let raw_title = anchor_title(anchor);
        let card_text = strategy.acquire(card);
        let url = format!("{LISTING_URL_PREFIX}{id}");

        records.push(builder::build(
            &card_text,
            &raw_title,
            id,
            &url,
            now,
            locale,
            description_limit,
        ));
    }

    debug!(
        candidates = records.len(),
        strategy = strategy.name(),
        "scanned feed document"
    );
    records
}

/// Unique listing ids visible in the document; the badge counter.
pub fn count_unique_listings(html: &str) -> usize {
    let document = Html::parse_document(html);
    let mut ids = HashSet::new();
    for anchor in document.select(&ANCHOR_SELECTOR) {
        if let Some(id) = anchor.value().attr("href").and_then(base::event_id_from_href) {
            ids.insert(id.to_string());
        }
    }
    ids.len()
}

/// Nearest ancestor that looks like the listing's card: a feed article or
/// button container, then a known card class, then any div, then the direct
/// parent.
fn card_for(anchor: ElementRef<'_>) -> Option<ElementRef<'_>> {
    let ancestors: Vec<ElementRef<'_>> = anchor
        .ancestors()
        .filter_map(ElementRef::wrap)
        .collect();

    for element in &ancestors {
        let role = element.value().attr("role").unwrap_or("");
        if CARD_ROLES.contains(&role) {
            return Some(*element);
        }
        let class = element.value().attr("class").unwrap_or("");
        if CARD_CLASS_HINTS.iter().any(|hint| class.contains(hint)) {
            return Some(*element);
        }
    }

    ancestors
        .iter()
        .find(|element| element.value().name() == "div")
        .copied()
        .or_else(|| ancestors.first().copied())
}

fn anchor_title(anchor: ElementRef<'_>) -> String {
    let text = base::clean_text(&anchor.text().collect::<Vec<_>>().join(" "));
    if !text.is_empty() {
        return text;
    }
    anchor
        .value()
        .attr("aria-label")
        .map(base::clean_text)
        .unwrap_or_default()
}
