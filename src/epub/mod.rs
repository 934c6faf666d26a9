//! EPUB writer. Consumes the assembled `Book` and writes EPUB 3 (default)
//! or EPUB 2 (mimetype, container, OPF, nav/NCX, cover, articles, images).
//!
//! The archive is written in one pass after all fetching is finished, so an
//! interrupted run never leaves a partial book behind a complete-looking
//! file.

mod render;

pub use render::render_blocks;

use crate::model::{Article, Book};
use render::xml_escape;
use std::io::{Seek, Write};
use std::path::Path;
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

const MIMETYPE: &[u8] = b"application/epub+zip";
const OEBPS_PREFIX: &str = "OEBPS/";

const CONTAINER_XML: &[u8] = b"<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<container version=\"1.0\" xmlns=\"urn:oasis:names:tc:opendocument:xmlns:container\">\n  <rootfiles>\n    <rootfile full-path=\"OEBPS/content.opf\" media-type=\"application/oebps-package+xml\"/>\n  </rootfiles>\n</container>";

/// EPUB format version. Default is EPUB 3; use `Epub2` for legacy readers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpubVersion {
    /// EPUB 3: OPF 3.0, nav.xhtml, HTML5 chapters. Optional toc.ncx.
    Epub3,
    /// EPUB 2: OPF 2.0, toc.ncx only, XHTML 1.1 chapters.
    Epub2,
}

/// Errors from the EPUB writer.
#[derive(Debug, Error)]
pub enum EpubError {
    #[error("Cannot write EPUB: book title is empty.")]
    EmptyTitle,

    #[error("Cannot write EPUB: no articles could be extracted.")]
    NoArticles,

    #[error("Failed to create EPUB file: {path}: {source}")]
    CreateFile {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write EPUB archive: {0}")]
    Zip(#[from] zip::result::ZipError),
}

impl From<std::io::Error> for EpubError {
    fn from(e: std::io::Error) -> Self {
        EpubError::Zip(zip::result::ZipError::Io(e))
    }
}

/// Write the assembled [Book](crate::model::Book) to an EPUB file.
///
/// Articles appear in the order given (the feed's order). Every resolved
/// image asset is embedded under `images/`. If `book.cover` is set, a cover
/// page plus `images/cover.png` are emitted and referenced from the guide.
pub fn write_epub(
    book: &Book,
    path: &Path,
    version: EpubVersion,
    epub3_include_ncx: bool,
    include_toc_page: bool,
) -> Result<(), EpubError> {
    validate_book(book)?;

    let path = path.to_path_buf();
    let file = std::fs::File::create(&path).map_err(|e| EpubError::CreateFile {
        path: path.clone(),
        source: e,
    })?;
    let mut zip = ZipWriter::new(file);

    let options_stored = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored)
        .unix_permissions(0o644);
    let options_deflate = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .unix_permissions(0o644);

    // Mimetype first, uncompressed (required by the EPUB container spec)
    zip.start_file("mimetype", options_stored)?;
    zip.write_all(MIMETYPE)?;

    zip.start_file("META-INF/container.xml", options_deflate)?;
    zip.write_all(CONTAINER_XML)?;

    write_opf(
        book,
        version,
        epub3_include_ncx,
        include_toc_page,
        &mut zip,
        options_deflate,
    )?;

    match version {
        EpubVersion::Epub3 => {
            write_nav_xhtml(book, &mut zip, options_deflate)?;
            if epub3_include_ncx {
                write_ncx(book, &mut zip, options_deflate)?;
            }
        }
        EpubVersion::Epub2 => write_ncx(book, &mut zip, options_deflate)?,
    }

    if book.cover.is_some() {
        write_cover_xhtml(book, &mut zip, options_deflate)?;
    }
    if include_toc_page {
        write_toc_page_xhtml(book, &mut zip, options_deflate)?;
    }
    write_articles(book, version, &mut zip, options_deflate)?;

    if let Some(cover) = &book.cover {
        zip.start_file(format!("{}images/cover.png", OEBPS_PREFIX), options_deflate)?;
        zip.write_all(&cover.data)?;
    }
    for article in &book.articles {
        for asset in &article.images {
            zip.start_file(
                format!("{}{}", OEBPS_PREFIX, asset.file_name),
                options_deflate,
            )?;
            zip.write_all(&asset.data)?;
        }
    }

    zip.finish()?;
    Ok(())
}

fn validate_book(book: &Book) -> Result<(), EpubError> {
    if book.title.trim().is_empty() {
        return Err(EpubError::EmptyTitle);
    }
    if book.articles.is_empty() {
        return Err(EpubError::NoArticles);
    }
    Ok(())
}

fn identifier(book: &Book) -> &str {
    if book.site_url.is_empty() {
        "urn:feedbook:book"
    } else {
        &book.site_url
    }
}

fn write_opf(
    book: &Book,
    version: EpubVersion,
    epub3_include_ncx: bool,
    include_toc_page: bool,
    zip: &mut ZipWriter<impl Write + Seek>,
    options: SimpleFileOptions,
) -> Result<(), EpubError> {
    let id = xml_escape(identifier(book));
    let title = xml_escape(&book.title);
    let source = xml_escape(&book.site_url);
    let description_el = book
        .description
        .as_ref()
        .map(|d| format!("    <dc:description>{}</dc:description>\n", xml_escape(d)))
        .unwrap_or_default();
    let has_ncx = matches!(version, EpubVersion::Epub2) || epub3_include_ncx;
    let has_cover = book.cover.is_some();

    let mut manifest = String::new();
    if matches!(version, EpubVersion::Epub3) {
        manifest.push_str(
            "  <item id=\"nav\" href=\"nav.xhtml\" media-type=\"application/xhtml+xml\" properties=\"nav\"/>\n",
        );
    }
    if has_ncx {
        manifest.push_str(
            "  <item id=\"ncx\" href=\"toc.ncx\" media-type=\"application/x-dtbncx+xml\"/>\n",
        );
    }
    if has_cover {
        manifest.push_str(
            "  <item id=\"cover-img\" href=\"images/cover.png\" media-type=\"image/png\"/>\n",
        );
        manifest.push_str(
            "  <item id=\"cover\" href=\"cover.xhtml\" media-type=\"application/xhtml+xml\"/>\n",
        );
    }
    if include_toc_page {
        manifest.push_str(
            "  <item id=\"toc-page\" href=\"toc.xhtml\" media-type=\"application/xhtml+xml\"/>\n",
        );
    }
    for (i, article) in book.articles.iter().enumerate() {
        manifest.push_str(&format!(
            "  <item id=\"article-{n}\" href=\"article-{n}.xhtml\" media-type=\"application/xhtml+xml\"/>\n",
            n = i + 1
        ));
        for asset in &article.images {
            manifest.push_str(&format!(
                "  <item id=\"{}\" href=\"{}\" media-type=\"{}\"/>\n",
                xml_escape(&asset.id),
                xml_escape(&asset.file_name),
                xml_escape(&asset.media_type)
            ));
        }
    }

    let mut spine = String::new();
    if has_cover {
        spine.push_str("  <itemref idref=\"cover\"/>\n");
    }
    if include_toc_page {
        spine.push_str("  <itemref idref=\"toc-page\"/>\n");
    }
    for (i, _) in book.articles.iter().enumerate() {
        spine.push_str(&format!("  <itemref idref=\"article-{}\"/>\n", i + 1));
    }

    let guide = if has_cover {
        "  <reference type=\"cover\" href=\"cover.xhtml\" title=\"Cover\"/>\n"
    } else {
        ""
    };

    let (opf_version, spine_attr, cover_meta) = match version {
        EpubVersion::Epub3 => ("3.0", String::new(), String::new()),
        EpubVersion::Epub2 => (
            "2.0",
            " toc=\"ncx\"".to_string(),
            if has_cover {
                "    <meta name=\"cover\" content=\"cover-img\"/>\n".to_string()
            } else {
                String::new()
            },
        ),
    };

    let opf = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" unique-identifier="book-id" version="{opf_version}"
  xmlns:dc="http://purl.org/dc/elements/1.1/">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:identifier id="book-id">{id}</dc:identifier>
    <dc:title>{title}</dc:title>
    <dc:creator>feedbook</dc:creator>
    <dc:language>en</dc:language>
    <dc:source>{source}</dc:source>
{description_el}{cover_meta}  </metadata>
  <manifest>
{manifest}  </manifest>
  <spine{spine_attr}>
{spine}  </spine>
  <guide>
{guide}  </guide>
</package>
"#
    );

    zip.start_file(format!("{}content.opf", OEBPS_PREFIX), options)?;
    zip.write_all(opf.as_bytes())?;
    Ok(())
}

fn write_nav_xhtml(
    book: &Book,
    zip: &mut ZipWriter<impl Write + Seek>,
    options: SimpleFileOptions,
) -> Result<(), EpubError> {
    let mut nav_links = String::new();
    for (i, article) in book.articles.iter().enumerate() {
        nav_links.push_str(&format!(
            "    <li><a href=\"article-{}.xhtml\">{}</a></li>\n",
            i + 1,
            xml_escape(&article.item.title)
        ));
    }
    let nav = format!(
        r#"<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
<head>
  <meta charset="UTF-8"/>
  <title>Table of Contents</title>
</head>
<body>
  <nav epub:type="toc">
    <h1>Contents</h1>
    <ol>
{}
    </ol>
  </nav>
</body>
</html>
"#,
        nav_links
    );
    zip.start_file(format!("{}nav.xhtml", OEBPS_PREFIX), options)?;
    zip.write_all(nav.as_bytes())?;
    Ok(())
}

fn write_ncx(
    book: &Book,
    zip: &mut ZipWriter<impl Write + Seek>,
    options: SimpleFileOptions,
) -> Result<(), EpubError> {
    let mut nav_points = String::new();
    for (i, article) in book.articles.iter().enumerate() {
        nav_points.push_str(&format!(
            r#"    <navPoint id="navpoint-{n}" playOrder="{n}">
      <navLabel><text>{label}</text></navLabel>
      <content src="article-{n}.xhtml"/>
    </navPoint>
"#,
            n = i + 1,
            label = xml_escape(&article.item.title)
        ));
    }
    let ncx = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <head>
    <meta name="dtb:uid" content="{}"/>
  </head>
  <docTitle>
    <text>{}</text>
  </docTitle>
  <navMap>
{}
  </navMap>
</ncx>
"#,
        xml_escape(identifier(book)),
        xml_escape(&book.title),
        nav_points
    );
    zip.start_file(format!("{}toc.ncx", OEBPS_PREFIX), options)?;
    zip.write_all(ncx.as_bytes())?;
    Ok(())
}

fn write_cover_xhtml(
    book: &Book,
    zip: &mut ZipWriter<impl Write + Seek>,
    options: SimpleFileOptions,
) -> Result<(), EpubError> {
    let description_line = book
        .description
        .as_ref()
        .map(|d| format!("    <p>{}</p>\n", xml_escape(d)))
        .unwrap_or_default();
    let cover_xhtml = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml">
<head>
  <meta charset="UTF-8"/>
  <title>Cover</title>
</head>
<body>
  <div style="text-align: center; padding: 2em;">
    <img src="images/cover.png" alt="Cover" style="max-width: 200px;"/>
    <h1>{}</h1>
{}  </div>
</body>
</html>
"#,
        xml_escape(&book.title),
        description_line
    );
    zip.start_file(format!("{}cover.xhtml", OEBPS_PREFIX), options)?;
    zip.write_all(cover_xhtml.as_bytes())?;
    Ok(())
}

/// Visible table-of-contents page placed after the cover.
fn write_toc_page_xhtml(
    book: &Book,
    zip: &mut ZipWriter<impl Write + Seek>,
    options: SimpleFileOptions,
) -> Result<(), EpubError> {
    let mut items = String::new();
    for (i, article) in book.articles.iter().enumerate() {
        items.push_str(&format!(
            "    <li><a href=\"article-{}.xhtml\">{}</a></li>\n",
            i + 1,
            xml_escape(&article.item.title)
        ));
    }
    let toc_xhtml = format!(
        r#"<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml">
<head>
  <meta charset="UTF-8"/>
  <title>Table of Contents</title>
</head>
<body>
  <h1>Table of Contents</h1>
  <ol>
{}
  </ol>
</body>
</html>
"#,
        items
    );
    zip.start_file(format!("{}toc.xhtml", OEBPS_PREFIX), options)?;
    zip.write_all(toc_xhtml.as_bytes())?;
    Ok(())
}

/// Header shown at the top of each article page: title, source link, and
/// published date when known.
fn article_header(article: &Article) -> String {
    let title = xml_escape(&article.item.title);
    let link = xml_escape(&article.item.link);
    let date_line = article
        .item
        .published
        .map(|d| format!("  <p>{}</p>\n", d.format("%Y-%m-%d")))
        .unwrap_or_default();
    format!(
        "<div class=\"article-header\">\n  <h1>{title}</h1>\n  <p><a href=\"{link}\">{link}</a></p>\n{date_line}</div>\n"
    )
}

fn write_articles(
    book: &Book,
    version: EpubVersion,
    zip: &mut ZipWriter<impl Write + Seek>,
    options: SimpleFileOptions,
) -> Result<(), EpubError> {
    for (i, article) in book.articles.iter().enumerate() {
        let title = xml_escape(&article.item.title);
        let body = format!("{}{}", article_header(article), render_blocks(&article.blocks));
        let doctype = match version {
            EpubVersion::Epub3 => "<!DOCTYPE html>".to_string(),
            EpubVersion::Epub2 => {
                "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<!DOCTYPE html PUBLIC \"-//W3C//DTD XHTML 1.1//EN\" \"http://www.w3.org/TR/xhtml11/DTD/xhtml11.dtd\">".to_string()
            }
        };
        let html = format!(
            r#"{doctype}
<html xmlns="http://www.w3.org/1999/xhtml">
<head>
  <meta charset="UTF-8"/>
  <title>{title}</title>
</head>
<body>
{body}
</body>
</html>
"#
        );
        let name = format!("{}article-{}.xhtml", OEBPS_PREFIX, i + 1);
        zip.start_file(name, options)?;
        zip.write_all(html.as_bytes())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Block, CoverImage, ImageAsset, Inline, Item};
    use chrono::{TimeZone, Utc};
    use std::io::Read;
    use zip::read::ZipArchive;

    fn sample_article() -> Article {
        Article {
            item: Item {
                title: "First Post".to_string(),
                link: "https://example.com/first".to_string(),
                published: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            },
            blocks: vec![
                Block::Paragraph(vec![Inline::Text("Opening paragraph.".into())]),
                Block::Image {
                    src: "images/img-1.png".into(),
                    alt: "pic".into(),
                },
            ],
            images: vec![ImageAsset {
                source_url: "https://example.com/pic.png".into(),
                id: "img-1".into(),
                file_name: "images/img-1.png".into(),
                media_type: "image/png".into(),
                data: vec![1, 2, 3],
            }],
        }
    }

    fn sample_book() -> Book {
        Book {
            title: "Test Feed".to_string(),
            site_url: "https://example.com/".to_string(),
            description: Some("A feed for testing".to_string()),
            cover: Some(CoverImage {
                data: vec![9, 9, 9],
                media_type: "image/png".into(),
            }),
            articles: vec![sample_article()],
        }
    }

    fn read_entry(zip: &mut ZipArchive<std::fs::File>, name: &str) -> String {
        let mut entry = zip.by_name(name).expect(name);
        let mut s = String::new();
        entry.read_to_string(&mut s).expect("read entry");
        s
    }

    #[test]
    fn rejects_empty_title() {
        let mut book = sample_book();
        book.title.clear();
        let path = std::env::temp_dir().join("feedbook_epub_void.epub");
        let result = write_epub(&book, &path, EpubVersion::Epub3, false, true);
        assert!(matches!(result, Err(EpubError::EmptyTitle)));
    }

    #[test]
    fn rejects_book_without_articles() {
        let mut book = sample_book();
        book.articles.clear();
        let path = std::env::temp_dir().join("feedbook_epub_void.epub");
        let result = write_epub(&book, &path, EpubVersion::Epub3, false, true);
        assert!(matches!(result, Err(EpubError::NoArticles)));
    }

    #[test]
    fn epub3_contains_expected_entries() {
        let book = sample_book();
        let path = std::env::temp_dir().join("feedbook_epub_test_epub3.epub");
        write_epub(&book, &path, EpubVersion::Epub3, false, true).unwrap();
        let file = std::fs::File::open(&path).unwrap();
        let zip = ZipArchive::new(file).unwrap();
        let names: Vec<String> = zip.file_names().map(String::from).collect();
        assert!(names.contains(&"mimetype".to_string()));
        assert!(names.contains(&"META-INF/container.xml".to_string()));
        assert!(names.contains(&"OEBPS/content.opf".to_string()));
        assert!(names.contains(&"OEBPS/nav.xhtml".to_string()));
        assert!(names.contains(&"OEBPS/cover.xhtml".to_string()));
        assert!(names.contains(&"OEBPS/images/cover.png".to_string()));
        assert!(names.contains(&"OEBPS/article-1.xhtml".to_string()));
        assert!(names.contains(&"OEBPS/images/img-1.png".to_string()));
        assert!(!names.iter().any(|n| n == "OEBPS/toc.ncx"));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn epub2_includes_ncx_and_opf_2() {
        let book = sample_book();
        let path = std::env::temp_dir().join("feedbook_epub_test_epub2.epub");
        write_epub(&book, &path, EpubVersion::Epub2, false, true).unwrap();
        let file = std::fs::File::open(&path).unwrap();
        let mut zip = ZipArchive::new(file).unwrap();
        let names: Vec<String> = zip.file_names().map(String::from).collect();
        assert!(names.contains(&"OEBPS/toc.ncx".to_string()));
        let opf = read_entry(&mut zip, "OEBPS/content.opf");
        assert!(opf.contains("version=\"2.0\""));
        assert!(opf.contains("spine toc=\"ncx\""));
        assert!(opf.contains("<meta name=\"cover\" content=\"cover-img\"/>"));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn manifest_lists_image_assets() {
        let book = sample_book();
        let path = std::env::temp_dir().join("feedbook_epub_test_manifest.epub");
        write_epub(&book, &path, EpubVersion::Epub3, false, false).unwrap();
        let file = std::fs::File::open(&path).unwrap();
        let mut zip = ZipArchive::new(file).unwrap();
        let opf = read_entry(&mut zip, "OEBPS/content.opf");
        assert!(opf.contains("id=\"img-1\" href=\"images/img-1.png\" media-type=\"image/png\""));
        assert!(opf.contains("<dc:source>https://example.com/</dc:source>"));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn description_appears_in_metadata_and_on_cover() {
        let book = sample_book();
        let path = std::env::temp_dir().join("feedbook_epub_test_description.epub");
        write_epub(&book, &path, EpubVersion::Epub3, false, false).unwrap();
        let file = std::fs::File::open(&path).unwrap();
        let mut zip = ZipArchive::new(file).unwrap();
        let opf = read_entry(&mut zip, "OEBPS/content.opf");
        assert!(opf.contains("<dc:description>A feed for testing</dc:description>"));
        let cover = read_entry(&mut zip, "OEBPS/cover.xhtml");
        assert!(cover.contains("<p>A feed for testing</p>"));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn missing_description_is_omitted_from_opf() {
        let mut book = sample_book();
        book.description = None;
        let path = std::env::temp_dir().join("feedbook_epub_test_no_description.epub");
        write_epub(&book, &path, EpubVersion::Epub3, false, false).unwrap();
        let file = std::fs::File::open(&path).unwrap();
        let mut zip = ZipArchive::new(file).unwrap();
        let opf = read_entry(&mut zip, "OEBPS/content.opf");
        assert!(!opf.contains("dc:description"));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn article_page_has_header_and_content() {
        let book = sample_book();
        let path = std::env::temp_dir().join("feedbook_epub_test_article.epub");
        write_epub(&book, &path, EpubVersion::Epub3, false, false).unwrap();
        let file = std::fs::File::open(&path).unwrap();
        let mut zip = ZipArchive::new(file).unwrap();
        let article = read_entry(&mut zip, "OEBPS/article-1.xhtml");
        assert!(article.contains("<h1>First Post</h1>"));
        assert!(article.contains("href=\"https://example.com/first\""));
        assert!(article.contains("<p>2024-01-01</p>"));
        assert!(article.contains("<p>Opening paragraph.</p>"));
        assert!(article.contains("img src=\"images/img-1.png\""));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn no_cover_omits_cover_entries() {
        let mut book = sample_book();
        book.cover = None;
        let path = std::env::temp_dir().join("feedbook_epub_test_nocover.epub");
        write_epub(&book, &path, EpubVersion::Epub3, false, false).unwrap();
        let file = std::fs::File::open(&path).unwrap();
        let mut zip = ZipArchive::new(file).unwrap();
        let names: Vec<String> = zip.file_names().map(String::from).collect();
        assert!(!names.iter().any(|n| n.contains("cover")));
        let opf = read_entry(&mut zip, "OEBPS/content.opf");
        assert!(!opf.contains("cover-img"));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn articles_appear_in_feed_order() {
        let mut book = sample_book();
        let mut second = sample_article();
        second.item.title = "Second Post".to_string();
        second.images.clear();
        second.blocks = vec![Block::Paragraph(vec![Inline::Text("More.".into())])];
        book.articles.push(second);
        let path = std::env::temp_dir().join("feedbook_epub_test_order.epub");
        write_epub(&book, &path, EpubVersion::Epub3, false, true).unwrap();
        let file = std::fs::File::open(&path).unwrap();
        let mut zip = ZipArchive::new(file).unwrap();
        let nav = read_entry(&mut zip, "OEBPS/nav.xhtml");
        let first_pos = nav.find("First Post").unwrap();
        let second_pos = nav.find("Second Post").unwrap();
        assert!(first_pos < second_pos);
        assert!(nav.contains("article-2.xhtml"));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn epub3_with_ncx_flag_includes_toc_ncx() {
        let book = sample_book();
        let path = std::env::temp_dir().join("feedbook_epub_test_ncx.epub");
        write_epub(&book, &path, EpubVersion::Epub3, true, false).unwrap();
        let file = std::fs::File::open(&path).unwrap();
        let zip = ZipArchive::new(file).unwrap();
        let names: Vec<String> = zip.file_names().map(String::from).collect();
        assert!(names.contains(&"OEBPS/toc.ncx".to_string()));
        std::fs::remove_file(&path).ok();
    }
}
