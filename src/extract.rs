//! Readable-content extraction. Fetches an item's page, scores candidate
//! containers by text mass versus link mass, and converts the winner into
//! the canonical block tree.
//!
//! This is best-effort by nature: the goal is a reasonable approximation of
//! "the article", not an exact match for every page layout.

use crate::fetch::{FetchError, HttpClient};
use crate::model::{inlines_text_len, Article, Block, Inline, Item};
use reqwest::Url;
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;

/// Containers worth scoring as "the article body".
const CANDIDATE_SELECTOR: &str = "article, main, section, div, td";

/// Elements that never contribute content (navigation, chrome, scripts).
const SKIP_TAGS: [&str; 12] = [
    "script", "style", "nav", "aside", "header", "footer", "form", "iframe", "noscript", "svg",
    "button", "select",
];

/// Minimum plain-text length for an extraction to count as content.
const MIN_CONTENT_CHARS: usize = 80;

/// Item-scoped extraction failure. The caller skips the item and continues.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Invalid article URL: {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("No readable content found at {url}")]
    NoContent { url: String },
}

/// Fetch the item's page and extract its main content.
pub fn extract_article(client: &mut HttpClient, item: &Item) -> Result<Article, ExtractError> {
    let fetched = client.fetch(&item.link)?;
    let html = String::from_utf8_lossy(&fetched.bytes);
    let base = Url::parse(&item.link).map_err(|e| ExtractError::InvalidUrl {
        url: item.link.clone(),
        reason: e.to_string(),
    })?;
    let blocks = extract_blocks(&html, &base).ok_or_else(|| ExtractError::NoContent {
        url: item.link.clone(),
    })?;
    Ok(Article {
        item: item.clone(),
        blocks,
        images: Vec::new(),
    })
}

/// Pure extraction from an HTML string. Returns None when nothing scores as
/// readable content.
pub fn extract_blocks(html: &str, base: &Url) -> Option<Vec<Block>> {
    let doc = Html::parse_document(html);
    let root = find_content_root(&doc)?;
    let mut collector = BlockCollector::new(base);
    collector.walk_children(root);
    collector.flush();
    let blocks: Vec<Block> = collector
        .blocks
        .into_iter()
        .filter(|b| !b.is_empty())
        .collect();
    if blocks_text_len(&blocks) < MIN_CONTENT_CHARS {
        return None;
    }
    Some(blocks)
}

/// Pick the candidate container with the highest content score. Falls back
/// to `<body>` when nothing else scores, so pages made of bare paragraphs
/// still extract.
fn find_content_root(doc: &Html) -> Option<ElementRef<'_>> {
    let candidates = Selector::parse(CANDIDATE_SELECTOR).ok()?;
    let body = Selector::parse("body").ok()?;

    let mut best: Option<(f64, ElementRef<'_>)> = None;
    for el in doc.select(&candidates) {
        let score = content_score(el);
        if score <= 0.0 {
            continue;
        }
        match best {
            Some((best_score, _)) if best_score >= score => {}
            _ => best = Some((score, el)),
        }
    }
    best.map(|(_, el)| el)
        .or_else(|| doc.select(&body).next())
}

/// Score a candidate by the text mass of its direct block children, with
/// link text subtracted so navigation lists score near zero. Scoring only
/// direct children keeps `<body>` from swallowing every deeper candidate.
fn content_score(el: ElementRef<'_>) -> f64 {
    let mut score = 0.0;
    for child in el.children().filter_map(ElementRef::wrap) {
        let name = child.value().name();
        if !matches!(
            name,
            "p" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "blockquote" | "pre" | "ul" | "ol"
        ) {
            continue;
        }
        let text = text_len(child) as f64;
        let links = link_text_len(child) as f64;
        score += text - 2.0 * links;
        if name == "p" {
            score += 25.0;
        }
    }
    score
}

fn text_len(el: ElementRef<'_>) -> usize {
    el.text().map(|t| t.trim().len()).sum()
}

fn link_text_len(el: ElementRef<'_>) -> usize {
    let links = match Selector::parse("a") {
        Ok(s) => s,
        Err(_) => return 0,
    };
    el.select(&links).map(text_len).sum()
}

fn blocks_text_len(blocks: &[Block]) -> usize {
    blocks
        .iter()
        .map(|b| match b {
            Block::Heading { inlines, .. } | Block::Paragraph(inlines) => {
                inlines_text_len(inlines)
            }
            Block::List { items, .. } => items.iter().map(|i| inlines_text_len(i)).sum(),
            Block::Blockquote(inner) => blocks_text_len(inner),
            Block::Preformatted(text) => text.trim().len(),
            Block::Image { .. } => 0,
        })
        .sum()
}

/// Walks a container and accumulates blocks. Loose inline content between
/// block elements is gathered into implicit paragraphs; images found in
/// inline position are hoisted to block level after the current paragraph.
struct BlockCollector<'a> {
    base: &'a Url,
    blocks: Vec<Block>,
    inline: Vec<Inline>,
    pending_images: Vec<Block>,
}

impl<'a> BlockCollector<'a> {
    fn new(base: &'a Url) -> Self {
        Self {
            base,
            blocks: Vec::new(),
            inline: Vec::new(),
            pending_images: Vec::new(),
        }
    }

    /// Close the implicit paragraph and emit any hoisted images.
    fn flush(&mut self) {
        if !self.inline.is_empty() {
            let inlines = std::mem::take(&mut self.inline);
            self.blocks.push(Block::Paragraph(inlines));
        }
        self.blocks.append(&mut self.pending_images);
    }

    fn walk_children(&mut self, el: ElementRef<'_>) {
        for child in el.children() {
            match child.value() {
                Node::Text(text) => self.push_text(&text.text),
                Node::Element(_) => {
                    if let Some(child_el) = ElementRef::wrap(child) {
                        self.walk_element(child_el);
                    }
                }
                _ => {}
            }
        }
    }

    fn walk_element(&mut self, el: ElementRef<'_>) {
        let name = el.value().name();
        if SKIP_TAGS.contains(&name) {
            return;
        }
        match name {
            "p" => {
                self.flush();
                let inlines = self.collect_inlines(el);
                self.blocks.push(Block::Paragraph(inlines));
                self.flush_images();
            }
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                self.flush();
                let level = name.as_bytes()[1] - b'0';
                let inlines = self.collect_inlines(el);
                self.blocks.push(Block::Heading { level, inlines });
                self.flush_images();
            }
            "ul" | "ol" => {
                self.flush();
                let ordered = name == "ol";
                // Direct children only; a nested list's items fold into the
                // inlines of the item that contains them.
                let items: Vec<Vec<Inline>> = el
                    .children()
                    .filter_map(ElementRef::wrap)
                    .filter(|c| c.value().name() == "li")
                    .map(|item| self.collect_inlines(item))
                    .collect();
                self.blocks.push(Block::List { ordered, items });
                self.flush_images();
            }
            "blockquote" => {
                self.flush();
                let mut inner = BlockCollector::new(self.base);
                inner.walk_children(el);
                inner.flush();
                let blocks: Vec<Block> =
                    inner.blocks.into_iter().filter(|b| !b.is_empty()).collect();
                if !blocks.is_empty() {
                    self.blocks.push(Block::Blockquote(blocks));
                }
            }
            "pre" => {
                self.flush();
                let text: String = el.text().collect();
                self.blocks.push(Block::Preformatted(text));
            }
            "img" => {
                self.flush();
                if let Some(img) = self.image_block(el) {
                    self.blocks.push(img);
                }
            }
            "br" => self.inline.push(Inline::Text(" ".to_string())),
            // Tables and their contents are deliberately not carried over.
            "table" => {}
            // Inline formatting in block position: treat as loose inline text.
            "em" | "i" | "strong" | "b" | "a" | "span" | "code" | "small" | "sub" | "sup"
            | "u" | "abbr" | "time" | "mark" => {
                let inlines = self.collect_inline_element(el);
                self.inline.extend(inlines);
            }
            // Generic containers: descend.
            _ => self.walk_children(el),
        }
    }

    fn flush_images(&mut self) {
        self.blocks.append(&mut self.pending_images);
    }

    fn push_text(&mut self, text: &str) {
        let collapsed = collapse_whitespace(text);
        if collapsed.trim().is_empty() {
            return;
        }
        self.inline.push(Inline::Text(collapsed));
    }

    /// Inline content of an element, hoisting any images to pending blocks.
    fn collect_inlines(&mut self, el: ElementRef<'_>) -> Vec<Inline> {
        let mut out = Vec::new();
        for child in el.children() {
            match child.value() {
                Node::Text(text) => {
                    let collapsed = collapse_whitespace(&text.text);
                    if !collapsed.trim().is_empty() {
                        out.push(Inline::Text(collapsed));
                    }
                }
                Node::Element(_) => {
                    if let Some(child_el) = ElementRef::wrap(child) {
                        out.extend(self.collect_inline_element(child_el));
                    }
                }
                _ => {}
            }
        }
        out
    }

    fn collect_inline_element(&mut self, el: ElementRef<'_>) -> Vec<Inline> {
        let name = el.value().name();
        if SKIP_TAGS.contains(&name) {
            return Vec::new();
        }
        match name {
            "em" | "i" => {
                let children = self.collect_inlines(el);
                if children.is_empty() {
                    Vec::new()
                } else {
                    vec![Inline::Emphasis(children)]
                }
            }
            "strong" | "b" => {
                let children = self.collect_inlines(el);
                if children.is_empty() {
                    Vec::new()
                } else {
                    vec![Inline::Strong(children)]
                }
            }
            "a" => {
                let children = self.collect_inlines(el);
                let href = el
                    .value()
                    .attr("href")
                    .and_then(|h| self.absolutize(h));
                match href {
                    Some(href) if !children.is_empty() => {
                        vec![Inline::Link { href, children }]
                    }
                    // Unresolvable or empty link: keep the text, drop the link.
                    _ => children,
                }
            }
            "img" => {
                if let Some(img) = self.image_block(el) {
                    self.pending_images.push(img);
                }
                Vec::new()
            }
            "br" => vec![Inline::Text(" ".to_string())],
            _ => self.collect_inlines(el),
        }
    }

    /// Build an image block with an absolute src. `data:` URIs and srcless
    /// tags yield None.
    fn image_block(&self, el: ElementRef<'_>) -> Option<Block> {
        let src = el.value().attr("src")?.trim();
        if src.is_empty() || src.starts_with("data:") {
            return None;
        }
        let src = self.absolutize(src)?;
        let alt = el.value().attr("alt").unwrap_or("").to_string();
        Some(Block::Image { src, alt })
    }

    fn absolutize(&self, href: &str) -> Option<String> {
        if href.starts_with("javascript:") {
            return None;
        }
        self.base.join(href).ok().map(|u| u.to_string())
    }
}

fn collapse_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_ws = false;
    for c in s.chars() {
        if c.is_whitespace() {
            if !last_ws {
                out.push(' ');
            }
            last_ws = true;
        } else {
            out.push(c);
            last_ws = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://example.com/posts/2024/story.html").expect("base url")
    }

    const ARTICLE_PAGE: &str = r#"<html>
<head><title>Story</title><script>var x = 1;</script></head>
<body>
  <nav><ul>
    <li><a href="/">Home</a></li>
    <li><a href="/about">About</a></li>
  </ul></nav>
  <div class="content">
    <h1>The Story Title</h1>
    <p>The first paragraph of the article has enough words to count as real
       content rather than navigation or boilerplate chrome.</p>
    <p>The <em>second</em> paragraph links to <a href="/related">a related
       post</a> and keeps <strong>bold text</strong> intact.</p>
    <p><img src="../images/photo.jpg" alt="A photo"/></p>
  </div>
  <aside><p>Subscribe to our newsletter for more content like this!</p></aside>
  <footer><p>Copyright notice and assorted legal boilerplate text.</p></footer>
</body></html>"#;

    #[test]
    fn extracts_article_body_not_navigation() {
        let blocks = extract_blocks(ARTICLE_PAGE, &base()).expect("content");
        let rendered = format!("{:?}", blocks);
        assert!(rendered.contains("first paragraph"));
        assert!(!rendered.contains("Home"));
        assert!(!rendered.contains("newsletter"));
    }

    #[test]
    fn preserves_heading_and_inline_formatting() {
        let blocks = extract_blocks(ARTICLE_PAGE, &base()).expect("content");
        assert!(matches!(
            blocks.first(),
            Some(Block::Heading { level: 1, .. })
        ));
        let has_emphasis = blocks.iter().any(|b| match b {
            Block::Paragraph(inlines) => inlines
                .iter()
                .any(|i| matches!(i, Inline::Emphasis(_))),
            _ => false,
        });
        assert!(has_emphasis);
    }

    #[test]
    fn relative_urls_are_absolutized() {
        let blocks = extract_blocks(ARTICLE_PAGE, &base()).expect("content");
        let mut link_href = None;
        let mut img_src = None;
        for block in &blocks {
            match block {
                Block::Paragraph(inlines) => {
                    for inline in inlines {
                        if let Inline::Link { href, .. } = inline {
                            link_href = Some(href.clone());
                        }
                    }
                }
                Block::Image { src, .. } => img_src = Some(src.clone()),
                _ => {}
            }
        }
        assert_eq!(link_href.as_deref(), Some("https://example.com/related"));
        assert_eq!(
            img_src.as_deref(),
            Some("https://example.com/posts/images/photo.jpg")
        );
    }

    #[test]
    fn inline_image_is_hoisted_to_block_level() {
        let html = r#"<html><body><div>
          <p>Some leading text that is long enough to pass the readable
             content threshold for extraction, with an inline image
             <img src="/pic.png" alt="pic"/> in the middle of it.</p>
        </div></body></html>"#;
        let blocks = extract_blocks(html, &base()).expect("content");
        assert!(matches!(blocks[0], Block::Paragraph(_)));
        assert!(blocks
            .iter()
            .any(|b| matches!(b, Block::Image { src, .. } if src == "https://example.com/pic.png")));
    }

    #[test]
    fn data_uri_images_are_dropped() {
        let html = r#"<html><body><div>
          <p>Long enough paragraph text so the density scorer accepts this
             container as the main readable content of the page.</p>
          <img src="data:image/png;base64,AAAA"/>
        </div></body></html>"#;
        let blocks = extract_blocks(html, &base()).expect("content");
        assert!(!blocks.iter().any(|b| matches!(b, Block::Image { .. })));
    }

    #[test]
    fn lists_and_blockquotes_survive() {
        let html = r#"<html><body><article>
          <p>An introductory paragraph that provides sufficient text mass for
             this article container to win the candidate scoring pass.</p>
          <ul><li>first point</li><li>second point</li></ul>
          <blockquote><p>Quoted wisdom from somewhere else.</p></blockquote>
        </article></body></html>"#;
        let blocks = extract_blocks(html, &base()).expect("content");
        assert!(blocks
            .iter()
            .any(|b| matches!(b, Block::List { ordered: false, items } if items.len() == 2)));
        assert!(blocks.iter().any(|b| matches!(b, Block::Blockquote(_))));
    }

    #[test]
    fn nested_list_items_are_not_duplicated() {
        let html = r#"<html><body><article>
          <p>An introductory paragraph that provides sufficient text mass for
             this article container to win the candidate scoring pass.</p>
          <ul>
            <li>outer alpha<ul><li>subpoint</li></ul></li>
            <li>outer beta</li>
          </ul>
        </article></body></html>"#;
        let blocks = extract_blocks(html, &base()).expect("content");
        let lists: Vec<_> = blocks
            .iter()
            .filter(|b| matches!(b, Block::List { .. }))
            .collect();
        assert_eq!(lists.len(), 1);
        if let Block::List { items, .. } = lists[0] {
            assert_eq!(items.len(), 2);
        }
        let rendered = format!("{:?}", blocks);
        assert_eq!(rendered.matches("subpoint").count(), 1);
    }

    #[test]
    fn page_without_content_yields_none() {
        let html = r#"<html><body>
          <nav><a href="/">Home</a><a href="/about">About</a></nav>
        </body></html>"#;
        assert!(extract_blocks(html, &base()).is_none());
    }

    #[test]
    fn scripts_and_styles_never_leak_into_content() {
        let html = r#"<html><body><div>
          <p>Enough visible paragraph text here for the container to be
             chosen as the main content by the scorer heuristic.</p>
          <script>alert("nope")</script>
          <style>p { color: red }</style>
        </div></body></html>"#;
        let blocks = extract_blocks(html, &base()).expect("content");
        let rendered = format!("{:?}", blocks);
        assert!(!rendered.contains("alert"));
        assert!(!rendered.contains("color"));
    }
}
