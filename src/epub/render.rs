//! Rendering of the canonical block tree to XHTML article bodies. The same
//! markup is valid in both the EPUB 2 (XHTML 1.1) and EPUB 3 (HTML5)
//! page templates.

use crate::model::{Block, Inline};

pub(crate) fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Render a block tree as an XHTML fragment.
pub fn render_blocks(blocks: &[Block]) -> String {
    let mut out = String::new();
    for block in blocks {
        render_block(&mut out, block);
    }
    out
}

fn render_block(out: &mut String, block: &Block) {
    match block {
        Block::Heading { level, inlines } => {
            let level = (*level).clamp(1, 6);
            out.push_str(&format!(
                "<h{l}>{}</h{l}>\n",
                render_inlines(inlines),
                l = level
            ));
        }
        Block::Paragraph(inlines) => {
            out.push_str(&format!("<p>{}</p>\n", render_inlines(inlines)));
        }
        Block::List { ordered, items } => {
            let tag = if *ordered { "ol" } else { "ul" };
            out.push_str(&format!("<{}>\n", tag));
            for item in items {
                out.push_str(&format!("  <li>{}</li>\n", render_inlines(item)));
            }
            out.push_str(&format!("</{}>\n", tag));
        }
        Block::Blockquote(blocks) => {
            out.push_str("<blockquote>\n");
            for inner in blocks {
                render_block(out, inner);
            }
            out.push_str("</blockquote>\n");
        }
        Block::Preformatted(text) => {
            out.push_str(&format!("<pre>{}</pre>\n", xml_escape(text)));
        }
        Block::Image { src, alt } => {
            out.push_str(&format!(
                "<p><img src=\"{}\" alt=\"{}\" /></p>\n",
                xml_escape(src),
                xml_escape(alt)
            ));
        }
    }
}

fn render_inlines(inlines: &[Inline]) -> String {
    let mut out = String::new();
    for inline in inlines {
        match inline {
            Inline::Text(t) => out.push_str(&xml_escape(t)),
            Inline::Emphasis(children) => {
                out.push_str(&format!("<em>{}</em>", render_inlines(children)));
            }
            Inline::Strong(children) => {
                out.push_str(&format!("<strong>{}</strong>", render_inlines(children)));
            }
            Inline::Link { href, children } => {
                out.push_str(&format!(
                    "<a href=\"{}\">{}</a>",
                    xml_escape(href),
                    render_inlines(children)
                ));
            }
        }
    }
    out
}
