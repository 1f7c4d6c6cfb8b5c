use anyhow::{Context, Result};
use regex::Regex;
use tracing::info;

use crate::fetch::Fetcher;

/// Fetch an XML sitemap and return the `<loc>` URLs matching `pattern`.
/// Sitemap indexes are followed one level deep.
pub async fn discover(fetcher: &Fetcher, sitemap_url: &str, pattern: &Regex) -> Result<Vec<String>> {
    info!("Fetching sitemap: {}", sitemap_url);
    let xml = fetcher
        .get_html(sitemap_url)
        .await
        .context("Failed to fetch sitemap")?;

    let mut all_urls = Vec::new();
    match parse_sitemap(&xml)? {
        Sitemap::Urls(urls) => all_urls.extend(urls),
        Sitemap::Index(children) => {
            for child in children {
                fetcher.pause().await;
                let child_xml = fetcher
                    .get_html(&child)
                    .await
                    .with_context(|| format!("Failed to fetch child sitemap {}", child))?;
                if let Sitemap::Urls(urls) = parse_sitemap(&child_xml)? {
                    all_urls.extend(urls);
                }
            }
        }
    }
    info!("Total URLs in sitemap: {}", all_urls.len());

    let mut filtered: Vec<String> = all_urls.into_iter().filter(|u| pattern.is_match(u)).collect();
    filtered.sort();
    filtered.dedup();
    info!("Pages after filtering: {}", filtered.len());
    Ok(filtered)
}

#[derive(Debug, PartialEq)]
enum Sitemap {
    Urls(Vec<String>),
    Index(Vec<String>),
}

/// Parse either a `<urlset>` or a `<sitemapindex>` document.
fn parse_sitemap(xml: &str) -> Result<Sitemap> {
    let mut reader = quick_xml::Reader::from_str(xml);
    let mut locs = Vec::new();
    let mut is_index = false;
    let mut in_entry = false;
    let mut in_loc = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => match e.local_name().as_ref() {
                b"sitemapindex" => is_index = true,
                b"url" | b"sitemap" => in_entry = true,
                b"loc" if in_entry => in_loc = true,
                _ => {}
            },
            Ok(quick_xml::events::Event::Text(e)) if in_loc => {
                locs.push(e.unescape()?.trim().to_string());
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"loc" => in_loc = false,
                b"url" | b"sitemap" => in_entry = false,
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(e.into()),
            _ => {}
        }
        buf.clear();
    }

    Ok(if is_index {
        Sitemap::Index(locs)
    } else {
        Sitemap::Urls(locs)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpConfig;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn parses_urlset_and_index() {
        let urlset = r#"<?xml version="1.0"?>
            <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
              <url><loc>https://www.antiochian.org/parish/st-george-1</loc></url>
              <url><loc> https://www.antiochian.org/about </loc></url>
            </urlset>"#;
        assert_eq!(
            parse_sitemap(urlset).unwrap(),
            Sitemap::Urls(vec![
                "https://www.antiochian.org/parish/st-george-1".into(),
                "https://www.antiochian.org/about".into(),
            ])
        );

        let index = r#"<sitemapindex><sitemap><loc>https://x.org/s1.xml</loc></sitemap></sitemapindex>"#;
        assert_eq!(
            parse_sitemap(index).unwrap(),
            Sitemap::Index(vec!["https://x.org/s1.xml".into()])
        );
    }

    #[tokio::test]
    async fn follows_index_and_filters() {
        let server = MockServer::start().await;
        let base = server.uri();
        Mock::given(method("GET"))
            .and(path("/sitemap.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                "<sitemapindex><sitemap><loc>{base}/pages.xml</loc></sitemap></sitemapindex>"
            )))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/pages.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                "<urlset><url><loc>{base}/parish/b</loc></url><url><loc>{base}/news/1</loc></url>\
                 <url><loc>{base}/parish/a</loc></url></urlset>"
            )))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(&HttpConfig {
            delay_ms: 0,
            ..HttpConfig::default()
        })
        .unwrap();
        let re = Regex::new(r"/parish/[a-z-]+$").unwrap();
        let urls = discover(&fetcher, &format!("{base}/sitemap.xml"), &re).await.unwrap();
        assert_eq!(urls, vec![format!("{base}/parish/a"), format!("{base}/parish/b")]);
    }
}
