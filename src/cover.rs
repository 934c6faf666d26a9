//! Cover builder. Fetches the site's favicon from the well-known path and
//! normalizes it to a single PNG raster. Every failure is non-fatal: the
//! book is simply built without a cover.

use crate::fetch::HttpClient;
use crate::model::CoverImage;
use image::ImageFormat;
use reqwest::Url;
use std::io::Cursor;

/// Favicon URL for a site: origin plus `/favicon.ico`.
pub fn favicon_url(site_url: &str) -> Option<String> {
    let url = Url::parse(site_url).ok()?;
    url.host_str()?;
    url.join("/favicon.ico").ok().map(|u| u.to_string())
}

/// Fetch the favicon and adapt it into a cover image. Returns None (with a
/// warning on stderr) when the favicon is unreachable or undecodable.
pub fn build_cover(client: &mut HttpClient, site_url: &str) -> Option<CoverImage> {
    let url = match favicon_url(site_url) {
        Some(u) => u,
        None => {
            eprintln!(
                "Warning: no cover: cannot derive favicon URL from {}",
                site_url
            );
            return None;
        }
    };
    let fetched = match client.fetch(&url) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Warning: no cover: {}", e);
            return None;
        }
    };
    match normalize_to_png(&fetched.bytes) {
        Some(data) => Some(CoverImage {
            data,
            media_type: "image/png".to_string(),
        }),
        None => {
            eprintln!("Warning: no cover: could not decode favicon at {}", url);
            None
        }
    }
}

/// Decode any supported favicon format (ICO containers included; the decoder
/// picks one frame) and re-encode as PNG.
pub fn normalize_to_png(bytes: &[u8]) -> Option<Vec<u8>> {
    let img = image::load_from_memory(bytes).ok()?;
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).ok()?;
    Some(out.into_inner())
}
