//! feedbook: CLI converter turning an RSS/Atom feed into an EPUB with
//! article content, images, and a favicon-derived cover.

pub mod cli;
pub mod config;
pub mod cover;
pub mod epub;
pub mod extract;
pub mod feed;
pub mod fetch;
pub mod images;
pub mod model;

// Re-exports for CLI and consumers.
pub use epub::{write_epub, EpubError, EpubVersion};
pub use extract::{extract_article, ExtractError};
pub use feed::{parse_feed, FeedError};
pub use fetch::{FetchError, Fetched, HttpClient, HttpClientBuilder};
pub use images::{resolve_images, ImageIds};
