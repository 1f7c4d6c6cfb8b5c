use std::collections::HashSet;

use scraper::{ElementRef, Selector};
use std::sync::LazyLock;

use crate::fetch::resolve;

static ANCHOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());

/// Hosts that are never a parish's own website.
const NOT_A_WEBSITE: &[&str] = &[
    "facebook.com",
    "instagram.com",
    "youtube.com",
    "youtu.be",
    "twitter.com",
    "x.com",
    "google.com",
    "goo.gl",
    "maps.apple.com",
    "bing.com",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Social {
    Facebook,
    Instagram,
    Youtube,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct SocialLinks {
    pub facebook: Option<String>,
    pub instagram: Option<String>,
    pub youtube: Option<String>,
}

/// First link to each social network inside `el`.
pub fn social_links(el: ElementRef, page_url: &str) -> SocialLinks {
    let mut out = SocialLinks::default();
    let mut seen = HashSet::new();
    for a in el.select(&ANCHOR) {
        let Some(url) = a.value().attr("href").and_then(|h| resolve(page_url, h)) else {
            continue;
        };
        if !seen.insert(url.clone()) {
            continue;
        }
        let slot = match classify_domain(&extract_domain(&url)) {
            Some(Social::Facebook) => &mut out.facebook,
            Some(Social::Instagram) => &mut out.instagram,
            Some(Social::Youtube) => &mut out.youtube,
            None => continue,
        };
        slot.get_or_insert(url);
    }
    out
}

/// First outbound link that is neither on the directory's own host nor a
/// social or maps link.
pub fn external_website(el: ElementRef, page_url: &str) -> Option<String> {
    let own = extract_domain(page_url);
    el.select(&ANCHOR)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|h| resolve(page_url, h))
        .find(|url| {
            let domain = extract_domain(url);
            domain != own && !NOT_A_WEBSITE.iter().any(|d| domain.ends_with(d))
        })
}

pub fn extract_domain(url: &str) -> String {
    url.split("//")
        .nth(1)
        .unwrap_or(url)
        .split(['/', '?', '#'])
        .next()
        .unwrap_or("")
        .trim_start_matches("www.")
        .to_lowercase()
}

pub fn classify_domain(domain: &str) -> Option<Social> {
    match domain {
        d if d.ends_with("facebook.com") || d == "fb.com" => Some(Social::Facebook),
        d if d.ends_with("instagram.com") => Some(Social::Instagram),
        d if d.ends_with("youtube.com") || d == "youtu.be" => Some(Social::Youtube),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    #[test]
    fn domains() {
        assert_eq!(extract_domain("https://www.StNicholas.org/about?x=1"), "stnicholas.org");
        assert_eq!(classify_domain("m.facebook.com"), Some(Social::Facebook));
        assert_eq!(classify_domain("youtu.be"), Some(Social::Youtube));
        assert_eq!(classify_domain("stgeorge.org"), None);
    }

    #[test]
    fn picks_social_and_external_links() {
        let html = Html::parse_fragment(
            r#"<div>
                <a href="/parishes/next">Next</a>
                <a href="https://facebook.com/stgeorge">fb</a>
                <a href="https://maps.google.com/?q=1">map</a>
                <a href="https://stgeorgechurch.org/">site</a>
                <a href="https://www.youtube.com/@stgeorge">yt</a>
            </div>"#,
        );
        let root = html.root_element();
        let social = social_links(root, "https://www.antiochian.org/parish/1");
        assert_eq!(social.facebook.as_deref(), Some("https://facebook.com/stgeorge"));
        assert_eq!(social.youtube.as_deref(), Some("https://www.youtube.com/@stgeorge"));
        assert_eq!(social.instagram, None);
        assert_eq!(
            external_website(root, "https://www.antiochian.org/parish/1").as_deref(),
            Some("https://stgeorgechurch.org/")
        );
    }
}
