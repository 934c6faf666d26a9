//! Feed parsing. feed-rs handles both RSS (`<item>`) and Atom (`<entry>`)
//! item enumerations; this module maps the result onto the canonical
//! [Feed](crate::model::Feed) and applies the field-level fallbacks.

use crate::model::{Feed, Item};
use reqwest::Url;
use thiserror::Error;

/// Substituted when the feed carries no title, so filename derivation
/// downstream never fails.
pub const FALLBACK_FEED_TITLE: &str = "Untitled Feed";

const FALLBACK_ITEM_TITLE: &str = "Untitled";

/// Fatal parse failure: the bytes are not a recognized syndication format.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Could not parse feed at {url}: {reason}")]
    Unparsable { url: String, reason: String },
}

/// Parse feed bytes into the canonical model.
///
/// Items with no link are skipped (they cannot be dereferenced later).
/// Published falls back to the entry's updated timestamp. The site URL is
/// the first non-self feed link, else the feed URL's origin.
pub fn parse_feed(bytes: &[u8], feed_url: &str) -> Result<Feed, FeedError> {
    let parsed = feed_rs::parser::parse(bytes).map_err(|e| FeedError::Unparsable {
        url: feed_url.to_string(),
        reason: e.to_string(),
    })?;

    let title = parsed
        .title
        .map(|t| t.content.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| FALLBACK_FEED_TITLE.to_string());

    let site_url = parsed
        .links
        .iter()
        .find(|l| l.rel.as_deref() != Some("self"))
        .or_else(|| parsed.links.first())
        .map(|l| l.href.clone())
        .unwrap_or_else(|| origin_of(feed_url));

    let description = parsed
        .description
        .map(|d| d.content.trim().to_string())
        .filter(|d| !d.is_empty());

    let items = parsed
        .entries
        .into_iter()
        .filter_map(|entry| {
            let link = entry.links.first().map(|l| l.href.clone())?;
            let title = entry
                .title
                .map(|t| t.content.trim().to_string())
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| FALLBACK_ITEM_TITLE.to_string());
            Some(Item {
                title,
                link,
                published: entry.published.or(entry.updated),
            })
        })
        .collect();

    Ok(Feed {
        title,
        site_url,
        description,
        items,
    })
}

/// Scheme plus host of a URL, used when the feed declares no site link.
fn origin_of(url: &str) -> String {
    match Url::parse(url) {
        Ok(u) => {
            let mut origin = format!("{}://", u.scheme());
            if let Some(host) = u.host_str() {
                origin.push_str(host);
            }
            origin
        }
        Err(_) => url.to_string(),
    }
}
