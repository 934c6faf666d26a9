//! Canonical data model for the feed-to-EPUB pipeline.
//!
//! Each stage owns its output until it hands it to the next: the feed parser
//! produces [Feed], the extractor produces one [Article] per [Item], the
//! image resolver fills in [ImageAsset]s, and the EPUB writer consumes the
//! final [Book].

use chrono::{DateTime, Utc};

/// Parsed feed: metadata plus items in source order.
#[derive(Debug, Clone)]
pub struct Feed {
    pub title: String,
    /// Site the feed belongs to (used for the favicon and the book identifier).
    pub site_url: String,
    pub description: Option<String>,
    pub items: Vec<Item>,
}

/// One syndicated entry. Items without a link are dropped at parse time.
#[derive(Debug, Clone)]
pub struct Item {
    pub title: String,
    pub link: String,
    pub published: Option<DateTime<Utc>>,
}

/// Extracted article content: the source item plus a block tree and any
/// embedded images resolved so far.
#[derive(Debug, Clone)]
pub struct Article {
    pub item: Item,
    pub blocks: Vec<Block>,
    pub images: Vec<ImageAsset>,
}

/// Block-level content element produced by the extractor.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    /// Heading, level 1-6.
    Heading { level: u8, inlines: Vec<Inline> },
    Paragraph(Vec<Inline>),
    /// Ordered or unordered list; each item is a run of inlines.
    List {
        ordered: bool,
        items: Vec<Vec<Inline>>,
    },
    Blockquote(Vec<Block>),
    /// Preformatted text, kept verbatim.
    Preformatted(String),
    /// Image reference. `src` starts as the absolute source URL and is
    /// rewritten by the image resolver to the in-archive path.
    Image { src: String, alt: String },
}

/// Inline content element.
#[derive(Debug, Clone, PartialEq)]
pub enum Inline {
    Text(String),
    Emphasis(Vec<Inline>),
    Strong(Vec<Inline>),
    /// Hyperlink with an absolute href.
    Link { href: String, children: Vec<Inline> },
}

/// Binary image embedded in the book.
///
/// Ids are unique within one book even when two assets share a source URL;
/// see [ImageIds](crate::images::ImageIds).
#[derive(Debug, Clone)]
pub struct ImageAsset {
    pub source_url: String,
    /// Manifest id, e.g. `img-3`.
    pub id: String,
    /// Path inside the archive relative to OEBPS, e.g. `images/img-3.png`.
    pub file_name: String,
    pub media_type: String,
    pub data: Vec<u8>,
}

/// Cover raster, normalized to a single PNG regardless of favicon format.
#[derive(Debug, Clone)]
pub struct CoverImage {
    pub data: Vec<u8>,
    pub media_type: String,
}

/// Assembled book handed to the EPUB writer. Transient: exists only between
/// the last fetch and the archive write.
#[derive(Debug, Clone)]
pub struct Book {
    pub title: String,
    pub site_url: String,
    pub description: Option<String>,
    pub cover: Option<CoverImage>,
    pub articles: Vec<Article>,
}

impl Block {
    /// True when the block carries no renderable content.
    pub fn is_empty(&self) -> bool {
        match self {
            Block::Heading { inlines, .. } | Block::Paragraph(inlines) => {
                inlines_text_len(inlines) == 0
            }
            Block::List { items, .. } => items.iter().all(|i| inlines_text_len(i) == 0),
            Block::Blockquote(blocks) => blocks.iter().all(|b| b.is_empty()),
            Block::Preformatted(text) => text.trim().is_empty(),
            Block::Image { src, .. } => src.is_empty(),
        }
    }
}

/// Total character count of the plain text inside a run of inlines.
pub fn inlines_text_len(inlines: &[Inline]) -> usize {
    inlines
        .iter()
        .map(|inline| match inline {
            Inline::Text(t) => t.trim().len(),
            Inline::Emphasis(children)
            | Inline::Strong(children)
            | Inline::Link { children, .. } => inlines_text_len(children),
        })
        .sum()
}
