//! EPUB3 container serialization.

use std::io::{Seek, Write};
use std::path::Path;

use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::epub::EpubDocument;
use crate::error::{Error, Result};
use crate::markdown::escape_xml;
use crate::util::time_seed_nanos;

/// Write an [`EpubDocument`] to an EPUB file on disk.
///
/// Produces an EPUB3 container: stored `mimetype` first, container
/// descriptor, version-3 OPF package, `nav.xhtml` plus an NCX fallback
/// for older readers, one XHTML file per section, a shared stylesheet,
/// and the embedded images.
pub fn write_epub<P: AsRef<Path>>(document: &EpubDocument, path: P) -> Result<()> {
    let file = std::fs::File::create(path)?;
    write_epub_to_writer(document, file)
}

/// Write an [`EpubDocument`] to any [`Write`] + [`Seek`] destination.
pub fn write_epub_to_writer<W: Write + Seek>(document: &EpubDocument, writer: W) -> Result<()> {
    let mut zip = ZipWriter::new(writer);

    let options_stored =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    let options_deflate =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    // The mimetype entry must be first and uncompressed.
    zip.start_file("mimetype", options_stored).map_err(zip_err)?;
    zip.write_all(b"application/epub+zip")?;

    zip.start_file("META-INF/container.xml", options_deflate)
        .map_err(zip_err)?;
    zip.write_all(CONTAINER_XML.as_bytes())?;

    // Generate the identifier once so OPF and NCX stay consistent.
    let identifier = if document.metadata.identifier.is_empty() {
        format!("urn:uuid:{}", uuid_v4())
    } else {
        document.metadata.identifier.clone()
    };

    zip.start_file("OEBPS/content.opf", options_deflate)
        .map_err(zip_err)?;
    zip.write_all(generate_opf(document, &identifier).as_bytes())?;

    zip.start_file("OEBPS/nav.xhtml", options_deflate)
        .map_err(zip_err)?;
    zip.write_all(generate_nav(document).as_bytes())?;

    zip.start_file("OEBPS/toc.ncx", options_deflate)
        .map_err(zip_err)?;
    zip.write_all(generate_ncx(document, &identifier).as_bytes())?;

    zip.start_file("OEBPS/style.css", options_deflate)
        .map_err(zip_err)?;
    zip.write_all(STYLESHEET.as_bytes())?;

    for section in &document.sections {
        zip.start_file(format!("OEBPS/text/{}.xhtml", section.slug), options_deflate)
            .map_err(zip_err)?;
        zip.write_all(section_xhtml(&section.title, &section.body, &document.metadata.language).as_bytes())?;
    }

    for image in &document.images {
        zip.start_file(format!("OEBPS/images/{}", image.name), options_deflate)
            .map_err(zip_err)?;
        zip.write_all(&image.data)?;
    }

    zip.finish().map_err(zip_err)?;
    Ok(())
}

fn zip_err(e: zip::result::ZipError) -> Error {
    Error::EpubCreation(format!("container write failed: {e}"))
}

const CONTAINER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

const STYLESHEET: &str = r#"body {
  font-family: Georgia, serif;
  line-height: 1.6;
  margin: 2em;
}
h1, h2, h3, h4, h5, h6 {
  font-family: Arial, sans-serif;
  margin-top: 1.5em;
  margin-bottom: 0.5em;
}
table {
  border-collapse: collapse;
  width: 100%;
  margin: 1em 0;
}
th, td {
  border: 1px solid #ddd;
  padding: 8px;
  text-align: left;
}
th {
  background-color: #f2f2f2;
}
code {
  background-color: #f4f4f4;
  padding: 2px 5px;
  border-radius: 3px;
}
pre {
  background-color: #f4f4f4;
  padding: 1em;
  border-radius: 5px;
  overflow-x: auto;
}
div.math {
  margin: 1em 0;
  text-align: center;
}
img {
  max-width: 100%;
  height: auto;
}
"#;

/// Script tag that typesets the preserved TeX in reading systems with
/// scripting enabled; systems without it show the raw TeX source.
const MATH_SCRIPT: &str = r#"<script type="text/javascript" async="async"
  src="https://cdnjs.cloudflare.com/ajax/libs/mathjax/3.2.0/es5/tex-mml-chtml.js"></script>"#;

fn generate_opf(document: &EpubDocument, identifier: &str) -> String {
    let mut opf = String::new();

    opf.push_str(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="BookId">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
"#,
    );

    opf.push_str(&format!(
        "    <dc:identifier id=\"BookId\">{}</dc:identifier>\n",
        escape_xml(identifier)
    ));
    opf.push_str(&format!(
        "    <dc:title>{}</dc:title>\n",
        escape_xml(&document.metadata.title)
    ));

    let language = if document.metadata.language.is_empty() {
        "en"
    } else {
        &document.metadata.language
    };
    opf.push_str(&format!("    <dc:language>{language}</dc:language>\n"));

    for author in &document.metadata.authors {
        opf.push_str(&format!(
            "    <dc:creator>{}</dc:creator>\n",
            escape_xml(author)
        ));
    }

    let modified = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
    opf.push_str(&format!(
        "    <meta property=\"dcterms:modified\">{modified}</meta>\n"
    ));

    opf.push_str("  </metadata>\n  <manifest>\n");
    opf.push_str(
        "    <item id=\"nav\" href=\"nav.xhtml\" media-type=\"application/xhtml+xml\" properties=\"nav\"/>\n",
    );
    opf.push_str(
        "    <item id=\"ncx\" href=\"toc.ncx\" media-type=\"application/x-dtbncx+xml\"/>\n",
    );
    opf.push_str("    <item id=\"style\" href=\"style.css\" media-type=\"text/css\"/>\n");

    for section in &document.sections {
        opf.push_str(&format!(
            "    <item id=\"{}\" href=\"text/{}.xhtml\" media-type=\"application/xhtml+xml\"/>\n",
            href_to_id(&section.slug),
            escape_xml(&section.slug)
        ));
    }

    for image in &document.images {
        opf.push_str(&format!(
            "    <item id=\"{}\" href=\"images/{}\" media-type=\"{}\"/>\n",
            href_to_id(&image.name),
            escape_xml(&image.name),
            image.media_type
        ));
    }

    opf.push_str("  </manifest>\n  <spine toc=\"ncx\">\n");
    for section in &document.sections {
        opf.push_str(&format!(
            "    <itemref idref=\"{}\"/>\n",
            href_to_id(&section.slug)
        ));
    }
    opf.push_str("  </spine>\n</package>\n");
    opf
}

fn generate_nav(document: &EpubDocument) -> String {
    let mut nav = String::new();
    nav.push_str(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
<head>
  <title>Contents</title>
</head>
<body>
  <nav epub:type="toc" id="toc">
    <h1>Contents</h1>
    <ol>
"#,
    );
    for section in &document.sections {
        nav.push_str(&format!(
            "      <li><a href=\"text/{}.xhtml\">{}</a></li>\n",
            escape_xml(&section.slug),
            escape_xml(&section.title)
        ));
    }
    nav.push_str("    </ol>\n  </nav>\n</body>\n</html>\n");
    nav
}

fn generate_ncx(document: &EpubDocument, identifier: &str) -> String {
    let mut ncx = String::new();

    ncx.push_str(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <head>
    <meta name="dtb:uid" content=""#,
    );
    ncx.push_str(&escape_xml(identifier));
    ncx.push_str(
        r#""/>
    <meta name="dtb:depth" content="1"/>
    <meta name="dtb:totalPageCount" content="0"/>
    <meta name="dtb:maxPageNumber" content="0"/>
  </head>
  <docTitle>
    <text>"#,
    );
    ncx.push_str(&escape_xml(&document.metadata.title));
    ncx.push_str(
        r#"</text>
  </docTitle>
  <navMap>
"#,
    );

    for (i, section) in document.sections.iter().enumerate() {
        let play_order = i + 1;
        ncx.push_str(&format!(
            "    <navPoint id=\"navpoint-{play_order}\" playOrder=\"{play_order}\">\n"
        ));
        ncx.push_str(&format!(
            "      <navLabel><text>{}</text></navLabel>\n",
            escape_xml(&section.title)
        ));
        ncx.push_str(&format!(
            "      <content src=\"text/{}.xhtml\"/>\n",
            escape_xml(&section.slug)
        ));
        ncx.push_str("    </navPoint>\n");
    }

    ncx.push_str("  </navMap>\n</ncx>\n");
    ncx
}

fn section_xhtml(title: &str, body: &str, language: &str) -> String {
    let language = if language.is_empty() { "en" } else { language };
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xml:lang="{lang}">
<head>
  <title>{title}</title>
  <link rel="stylesheet" href="../style.css" type="text/css"/>
  {script}
</head>
<body>
{body}</body>
</html>
"#,
        lang = language,
        title = escape_xml(title),
        script = MATH_SCRIPT,
        body = body
    )
}

fn href_to_id(href: &str) -> String {
    let id = href.replace(['/', '.', ' ', '-'], "_");
    // XML ids must not start with a digit.
    if id.starts_with(|c: char| c.is_ascii_digit()) {
        format!("id_{id}")
    } else {
        id
    }
}

/// Generate a simple UUID v4 from a time-seeded PRNG (identifiers only,
/// not security-sensitive).
fn uuid_v4() -> String {
    let mut state = time_seed_nanos();
    let mut bytes = [0u8; 16];
    for byte in &mut bytes {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        *byte = (state >> 33) as u8;
    }

    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    let mut out = String::with_capacity(36);
    for (i, byte) in bytes.iter().enumerate() {
        if matches!(i, 4 | 6 | 8 | 10) {
            out.push('-');
        }
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epub::{EpubImage, EpubMetadata, EpubSection};

    fn sample_document() -> EpubDocument {
        EpubDocument {
            metadata: EpubMetadata::new("Sample Paper")
                .with_author("A. Author")
                .with_language("en"),
            sections: vec![EpubSection {
                title: "Introduction".to_string(),
                slug: "introduction".to_string(),
                body: "<p>Hello.</p>\n".to_string(),
            }],
            images: vec![EpubImage {
                name: "figure_001.png".to_string(),
                data: vec![0x89, 0x50, 0x4E, 0x47],
                media_type: "image/png",
            }],
        }
    }

    #[test]
    fn test_opf_lists_everything() {
        let opf = generate_opf(&sample_document(), "urn:uuid:x");
        assert!(opf.contains("version=\"3.0\""));
        assert!(opf.contains("properties=\"nav\""));
        assert!(opf.contains("dcterms:modified"));
        assert!(opf.contains("href=\"text/introduction.xhtml\""));
        assert!(opf.contains("href=\"images/figure_001.png\""));
        assert!(opf.contains("<itemref idref=\"introduction\"/>"));
    }

    #[test]
    fn test_nav_links_sections() {
        let nav = generate_nav(&sample_document());
        assert!(nav.contains("epub:type=\"toc\""));
        assert!(nav.contains("<a href=\"text/introduction.xhtml\">Introduction</a>"));
    }

    #[test]
    fn test_ncx_play_order() {
        let ncx = generate_ncx(&sample_document(), "urn:uuid:x");
        assert!(ncx.contains("playOrder=\"1\""));
        assert!(ncx.contains("<text>Introduction</text>"));
    }

    #[test]
    fn test_href_to_id_digit_prefix() {
        assert_eq!(href_to_id("3-results"), "id_3_results");
        assert_eq!(href_to_id("figure_001.png"), "figure_001_png");
    }

    #[test]
    fn test_uuid_shape() {
        let uuid = uuid_v4();
        assert_eq!(uuid.len(), 36);
        assert_eq!(uuid.as_bytes()[14], b'4');
    }

    #[test]
    fn test_section_xhtml_escapes_title() {
        let xhtml = section_xhtml("A & B", "<p>x</p>\n", "");
        assert!(xhtml.contains("<title>A &amp; B</title>"));
        assert!(xhtml.contains("xml:lang=\"en\""));
    }
}
