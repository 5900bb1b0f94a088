// src/collect/nitter.rs
//! Account timelines via Nitter RSS. Nitter mirrors expose any public
//! account's feed at `{base}/{handle}/rss`, which keeps the collector free
//! of platform API credentials.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::histogram;
use quick_xml::de::from_str;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime, UtcOffset};

use crate::collect::{normalize_text, CollectedPost, PostSource};
use crate::store::Account;

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}
#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}
#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

fn parse_rfc2822_to_utc(ts: &str) -> DateTime<Utc> {
    // Nitter stamps items with the obsolete "GMT" zone name, which the
    // Rfc2822 parser rejects; rewrite it as a numeric offset.
    let ts = ts.trim();
    let normalized = match ts.strip_suffix("GMT") {
        Some(stripped) => format!("{stripped}+0000"),
        None => ts.to_string(),
    };
    OffsetDateTime::parse(&normalized, &Rfc2822)
        .ok()
        .map(|dt| dt.to_offset(UtcOffset::UTC).unix_timestamp())
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Status id from a Nitter item link, e.g.
/// `https://nitter.net/user/status/123456789#m` -> `123456789`.
fn external_id_from_link(link: &str) -> Option<String> {
    let (_, tail) = link.rsplit_once("/status/")?;
    let id: String = tail.chars().take_while(|c| c.is_ascii_digit()).collect();
    (!id.is_empty()).then_some(id)
}

pub struct NitterRssSource {
    base_url: String,
    client: reqwest::Client,
}

impl NitterRssSource {
    pub fn new(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("crypto-pulse/0.1")
            .connect_timeout(std::time::Duration::from_secs(5))
            .timeout(std::time::Duration::from_secs(20))
            .build()
            .expect("reqwest client");
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Parse one account feed. Public so tests can feed fixture XML.
    pub fn parse_feed(xml: &str) -> Result<Vec<CollectedPost>> {
        let t0 = std::time::Instant::now();
        let xml_clean = scrub_html_entities_for_xml(xml);
        let rss: Rss = from_str(&xml_clean).context("parsing nitter rss xml")?;

        let mut out = Vec::with_capacity(rss.channel.item.len());
        for it in rss.channel.item {
            let Some(external_id) = it.link.as_deref().and_then(external_id_from_link) else {
                continue;
            };
            // Title carries the plain post text; description is an HTML copy.
            let text_raw = match it.title.as_deref() {
                Some(t) if !t.is_empty() => t.to_string(),
                _ => it.description.unwrap_or_default(),
            };
            let text = normalize_text(&text_raw);
            if text.is_empty() {
                continue;
            }

            out.push(CollectedPost {
                external_id,
                text,
                language: None,
                published_at: it
                    .pub_date
                    .as_deref()
                    .map(parse_rfc2822_to_utc)
                    .unwrap_or(DateTime::UNIX_EPOCH),
            });
        }

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("collect_parse_ms").record(ms);
        Ok(out)
    }
}

#[async_trait]
impl PostSource for NitterRssSource {
    async fn fetch_latest(&self, account: &Account) -> Result<Vec<CollectedPost>> {
        let url = format!("{}/{}/rss", self.base_url, account.handle);
        let body = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("fetching feed for {}", account.handle))?
            .error_for_status()
            .with_context(|| format!("feed status for {}", account.handle))?
            .text()
            .await
            .context("reading feed body")?;
        Self::parse_feed(&body)
    }

    fn name(&self) -> &'static str {
        "nitter-rss"
    }
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_id_is_extracted_from_links() {
        assert_eq!(
            external_id_from_link("https://nitter.net/saylor/status/17299#m"),
            Some("17299".to_string())
        );
        assert_eq!(external_id_from_link("https://nitter.net/saylor"), None);
    }

    #[test]
    fn rfc2822_dates_parse_to_utc() {
        let dt = parse_rfc2822_to_utc("Mon, 06 Jan 2025 15:04:05 GMT");
        assert_eq!(dt.timestamp(), 1_736_175_845);
    }

    #[test]
    fn bad_dates_fall_back_to_epoch() {
        assert_eq!(parse_rfc2822_to_utc("not a date"), DateTime::UNIX_EPOCH);
    }
}
