pub mod blocks;
pub mod fields;
pub mod links;

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};

use crate::fetch::resolve;
use crate::model::ChurchRecord;
use fields::{FieldChains, Strategy};

static TABLE_ROW: LazyLock<Selector> = LazyLock::new(|| Selector::parse("table tr").unwrap());
static CELL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").unwrap());
static LIST_ITEM: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("ul > li, ol > li").unwrap());
static BODY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("body").unwrap());
static ANCHOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());

const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "dd", "div", "dl", "dt", "footer", "h1", "h2",
    "h3", "h4", "h5", "h6", "header", "hr", "li", "main", "ol", "p", "section", "table", "td",
    "th", "tr", "ul",
];
const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "template", "svg"];

const TABLE_CHAINS: FieldChains = FieldChains {
    name: &[Strategy::Text("td")],
    ..FieldChains::GENERIC
};
const LIST_CHAINS: FieldChains = FieldChains {
    name: &[Strategy::Text("strong, b, h3, h4"), Strategy::FirstLine],
    ..FieldChains::GENERIC
};

/// How one directory lays out its listings.
#[derive(Debug, Clone, Copy)]
pub struct ListingProfile {
    /// Container selectors tried in order; the first that yields records wins.
    pub containers: &'static [&'static str],
    pub chains: FieldChains,
}

impl ListingProfile {
    pub const GENERIC: ListingProfile = ListingProfile {
        containers: &[
            ".church-listing",
            ".parish-listing",
            ".parish",
            ".church",
            ".vcard",
            "[itemtype*='Church']",
        ],
        chains: FieldChains::GENERIC,
    };
}

/// Which extraction layer produced a page's records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    Structured,
    Generic,
    Text,
    Nothing,
}

#[derive(Debug)]
pub struct Listing {
    pub records: Vec<ChurchRecord>,
    pub layer: Layer,
}

/// Three layers, each tried only when the previous produced nothing:
/// the profile's containers, then generic tables and lists, then the
/// page's plain text split into entries.
pub fn extract_listing(html: &str, page_url: &str, profile: &ListingProfile) -> Listing {
    let doc = Html::parse_document(html);

    for container in profile.containers {
        let Ok(sel) = Selector::parse(container) else {
            continue;
        };
        let records: Vec<ChurchRecord> = doc
            .select(&sel)
            .filter_map(|el| profile.chains.extract(el, page_url))
            .collect();
        if !records.is_empty() {
            return Listing {
                records,
                layer: Layer::Structured,
            };
        }
    }

    let records = generic_listing(&doc, page_url);
    if !records.is_empty() {
        return Listing {
            records,
            layer: Layer::Generic,
        };
    }

    let records = text_listing(&doc, page_url);
    let layer = if records.is_empty() {
        Layer::Nothing
    } else {
        Layer::Text
    };
    Listing { records, layer }
}

fn generic_listing(doc: &Html, page_url: &str) -> Vec<ChurchRecord> {
    let mut records: Vec<ChurchRecord> = doc
        .select(&TABLE_ROW)
        .filter(|row| row.select(&CELL).count() >= 2)
        .filter_map(|row| TABLE_CHAINS.extract(row, page_url))
        .filter(|r| blocks::looks_like_church(&r.name) || has_location(r))
        .collect();

    records.extend(
        doc.select(&LIST_ITEM)
            .filter(|li| {
                let text = block_text(*li);
                text.len() > 10
                    && blocks::looks_like_church(&text)
                    && (text.lines().count() >= 2 || blocks::locality(&text).is_some())
            })
            .filter_map(|li| LIST_CHAINS.extract(li, page_url)),
    );
    records
}

fn text_listing(doc: &Html, page_url: &str) -> Vec<ChurchRecord> {
    let root = doc
        .select(&BODY)
        .next()
        .unwrap_or_else(|| doc.root_element());
    let lines = blocks::classify_lines(&block_text(root));
    blocks::group_entries(&lines)
        .iter()
        .filter_map(|entry| blocks::entry_record(entry))
        .map(|mut rec| {
            rec.patron_saint = blocks::patron_saint(&rec.name);
            rec.source_url = Some(page_url.to_string());
            rec
        })
        .collect()
}

fn has_location(r: &ChurchRecord) -> bool {
    r.address.is_some() || r.city.is_some() || r.zip_code.is_some()
}

/// One parish's own page. The first matching container is the record;
/// without one the whole body is.
pub fn extract_detail(html: &str, page_url: &str, profile: &ListingProfile) -> Option<ChurchRecord> {
    let doc = Html::parse_document(html);
    let container = profile
        .containers
        .iter()
        .filter_map(|c| Selector::parse(c).ok())
        .find_map(|sel| doc.select(&sel).next());
    let el = container
        .or_else(|| doc.select(&BODY).next())
        .unwrap_or_else(|| doc.root_element());
    profile.chains.extract(el, page_url)
}

/// Absolute links on a page whose URL matches `pattern`, deduplicated in
/// document order.
pub fn find_links(html: &str, page_url: &str, pattern: &Regex) -> Vec<String> {
    let doc = Html::parse_document(html);
    let mut out: Vec<String> = Vec::new();
    for href in doc.select(&ANCHOR).filter_map(|a| a.value().attr("href")) {
        if let Some(url) = resolve(page_url, href) {
            if pattern.is_match(&url) && !out.contains(&url) {
                out.push(url);
            }
        }
    }
    out
}

/// Plain text of an element with line breaks at `<br>` and blank lines
/// around block elements. Lines are whitespace-collapsed and runs of
/// blank lines folded to one.
pub fn block_text(el: ElementRef) -> String {
    let mut raw = String::new();
    push_text(el, &mut raw);

    let mut lines: Vec<String> = Vec::new();
    for line in raw.lines() {
        let line = squash(line);
        if !line.is_empty() {
            lines.push(line);
        } else if lines.last().is_some_and(|l| !l.is_empty()) {
            lines.push(String::new());
        }
    }
    if lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}

fn push_text(el: ElementRef, out: &mut String) {
    for child in el.children() {
        match child.value() {
            Node::Text(t) => out.push_str(t),
            Node::Element(e) => {
                let tag = e.name();
                if SKIPPED_TAGS.contains(&tag) {
                    continue;
                }
                if tag == "br" {
                    out.push('\n');
                    continue;
                }
                let block = BLOCK_TAGS.contains(&tag);
                if block {
                    out.push_str("\n\n");
                }
                if let Some(child_el) = ElementRef::wrap(child) {
                    push_text(child_el, out);
                }
                if block {
                    out.push_str("\n\n");
                }
            }
            _ => {}
        }
    }
}

pub fn squash(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
