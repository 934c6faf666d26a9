//! Image resolution. Fetches each image referenced by an article, assigns a
//! book-unique id, and rewrites the reference to the in-archive path.
//! Failures drop the reference; they never fail the article.

use crate::fetch::HttpClient;
use crate::model::{Article, Block, ImageAsset};

const DEFAULT_MEDIA_TYPE: &str = "image/jpeg";
const DEFAULT_EXT: &str = "jpg";

/// Book-scoped id allocator. Every call yields a fresh id, so two assets
/// never collide even when they come from the same source URL.
#[derive(Debug, Default)]
pub struct ImageIds {
    next: u32,
}

impl ImageIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next id and archive path for an asset with the given extension.
    pub fn assign(&mut self, ext: &str) -> (String, String) {
        self.next += 1;
        let id = format!("img-{}", self.next);
        let file_name = format!("images/{}.{}", id, ext);
        (id, file_name)
    }
}

/// Fetch every image block in the article. On success the block's src is
/// rewritten to the archive path and the asset recorded; on failure the
/// block is removed and a warning printed.
pub fn resolve_images(client: &mut HttpClient, ids: &mut ImageIds, article: &mut Article) {
    let blocks = std::mem::take(&mut article.blocks);
    article.blocks = resolve_in_blocks(client, ids, &mut article.images, blocks);
}

fn resolve_in_blocks(
    client: &mut HttpClient,
    ids: &mut ImageIds,
    assets: &mut Vec<ImageAsset>,
    blocks: Vec<Block>,
) -> Vec<Block> {
    blocks
        .into_iter()
        .filter_map(|block| match block {
            Block::Image { src, alt } => match client.fetch(&src) {
                Ok(fetched) => {
                    let (media_type, ext) =
                        media_type_for(fetched.content_type.as_deref(), &src);
                    let (id, file_name) = ids.assign(ext);
                    assets.push(ImageAsset {
                        source_url: src,
                        id,
                        file_name: file_name.clone(),
                        media_type: media_type.to_string(),
                        data: fetched.bytes,
                    });
                    Some(Block::Image {
                        src: file_name,
                        alt,
                    })
                }
                Err(e) => {
                    eprintln!("Warning: skipping image: {}", e);
                    None
                }
            },
            Block::Blockquote(inner) => Some(Block::Blockquote(resolve_in_blocks(
                client, ids, assets, inner,
            ))),
            other => Some(other),
        })
        .collect()
}

/// Media type and file extension for an image, from the Content-Type header
/// first, then the URL suffix, defaulting to JPEG.
pub fn media_type_for(content_type: Option<&str>, url: &str) -> (&'static str, &'static str) {
    if let Some(ct) = content_type {
        let ct = ct.split(';').next().unwrap_or(ct).trim();
        match ct {
            "image/jpeg" | "image/jpg" => return ("image/jpeg", "jpg"),
            "image/png" => return ("image/png", "png"),
            "image/gif" => return ("image/gif", "gif"),
            "image/webp" => return ("image/webp", "webp"),
            "image/svg+xml" => return ("image/svg+xml", "svg"),
            _ => {}
        }
    }
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let suffix = path.rsplit('.').next().unwrap_or("").to_ascii_lowercase();
    match suffix.as_str() {
        "jpg" | "jpeg" => ("image/jpeg", "jpg"),
        "png" => ("image/png", "png"),
        "gif" => ("image/gif", "gif"),
        "webp" => ("image/webp", "webp"),
        "svg" => ("image/svg+xml", "svg"),
        _ => (DEFAULT_MEDIA_TYPE, DEFAULT_EXT),
    }
}
