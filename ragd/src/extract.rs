//! Text extraction for plaintext, HTML, and PDF sources.
//!
//! Connectors supply bytes + a MIME type; this module returns plain UTF-8
//! text plus document metadata. Conforms to the extractor contract in
//! `ragd_core`: callers never see panics, only an `ExtractError` the
//! ingestion pipeline can record and skip past.

pub const MIME_PLAINTEXT: &str = "text/plain";
pub const MIME_MARKDOWN: &str = "text/markdown";
pub const MIME_HTML: &str = "text/html";
pub const MIME_PDF: &str = "application/pdf";

/// Extraction error (never panics; the pipeline records it and continues).
#[derive(Debug)]
pub enum ExtractError {
    UnsupportedContentType(String),
    Pdf(String),
    Io(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::UnsupportedContentType(ct) => {
                write!(f, "unsupported content-type: {}", ct)
            }
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
            ExtractError::Io(e) => write!(f, "could not read file: {}", e),
        }
    }
}

impl std::error::Error for ExtractError {}

/// Result of extracting one document: normalized text plus whatever
/// metadata the extractor could derive (title, page count).
#[derive(Debug, Clone, Default)]
pub struct ExtractionResult {
    pub text: String,
    pub page_count: Option<usize>,
    pub title: Option<String>,
}

/// Map a file extension to the MIME type `extract_text` expects.
pub fn content_type_for_extension(ext: &str) -> Option<&'static str> {
    match ext.to_lowercase().as_str() {
        "txt" => Some(MIME_PLAINTEXT),
        "md" | "markdown" => Some(MIME_MARKDOWN),
        "html" | "htm" => Some(MIME_HTML),
        "pdf" => Some(MIME_PDF),
        _ => None,
    }
}

pub fn extract_text(bytes: &[u8], content_type: &str) -> Result<ExtractionResult, ExtractError> {
    match content_type {
        MIME_PLAINTEXT | MIME_MARKDOWN => extract_plaintext(bytes),
        MIME_HTML => extract_html(bytes),
        MIME_PDF => extract_pdf(bytes),
        _ => Err(ExtractError::UnsupportedContentType(
            content_type.to_string(),
        )),
    }
}

fn extract_plaintext(bytes: &[u8]) -> Result<ExtractionResult, ExtractError> {
    let text = String::from_utf8_lossy(bytes).into_owned();
    Ok(ExtractionResult {
        text,
        page_count: None,
        title: None,
    })
}

/// Strips tags with a streaming scan rather than a full HTML parser: the
/// core never needs DOM structure, only normalized body text.
fn extract_html(bytes: &[u8]) -> Result<ExtractionResult, ExtractError> {
    let html = String::from_utf8_lossy(bytes);
    let title = extract_html_title(&html);

    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    let mut in_script_style = false;
    let mut tag_buf = String::new();

    for c in html.chars() {
        if in_tag {
            tag_buf.push(c);
            if c == '>' {
                in_tag = false;
                let lower = tag_buf.to_lowercase();
                if lower.starts_with("<script") || lower.starts_with("<style") {
                    in_script_style = true;
                } else if lower.starts_with("</script") || lower.starts_with("</style") {
                    in_script_style = false;
                } else if !in_script_style {
                    out.push(' ');
                }
                tag_buf.clear();
            }
            continue;
        }
        if c == '<' {
            in_tag = true;
            tag_buf.push(c);
            continue;
        }
        if !in_script_style {
            out.push(c);
        }
    }

    let normalized = out.split_whitespace().collect::<Vec<_>>().join(" ");
    Ok(ExtractionResult {
        text: unescape_html_entities(&normalized),
        page_count: None,
        title,
    })
}

fn extract_html_title(html: &str) -> Option<String> {
    let lower = html.to_lowercase();
    let start = lower.find("<title")?;
    let open_end = html[start..].find('>')? + start + 1;
    let close = html[open_end..].find("</title")? + open_end;
    Some(html[open_end..close].trim().to_string())
}

fn unescape_html_entities(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
}

fn extract_pdf(bytes: &[u8]) -> Result<ExtractionResult, ExtractError> {
    let text = pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))?;
    Ok(ExtractionResult {
        text,
        page_count: None,
        title: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_content_type_returns_error() {
        let err = extract_text(b"foo", "application/octet-stream").unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedContentType(_)));
    }

    #[test]
    fn invalid_pdf_returns_error() {
        let err = extract_text(b"not a pdf", MIME_PDF).unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn plaintext_passes_through() {
        let result = extract_text(b"hello world", MIME_PLAINTEXT).unwrap();
        assert_eq!(result.text, "hello world");
    }

    #[test]
    fn html_strips_tags_and_collapses_whitespace() {
        let html = b"<html><head><title>Hi</title></head><body><p>Hello   <b>world</b></p></body></html>";
        let result = extract_text(html, MIME_HTML).unwrap();
        assert_eq!(result.text, "Hello world");
        assert_eq!(result.title.as_deref(), Some("Hi"));
    }

    #[test]
    fn html_drops_script_and_style_content() {
        let html = b"<html><body><script>var x = 1;</script><p>Visible</p></body></html>";
        let result = extract_text(html, MIME_HTML).unwrap();
        assert_eq!(result.text, "Visible");
    }

    #[test]
    fn html_unescapes_entities() {
        let html = b"<p>A &amp; B &lt;tag&gt;</p>";
        let result = extract_text(html, MIME_HTML).unwrap();
        assert_eq!(result.text, "A & B <tag>");
    }

    #[test]
    fn content_type_for_extension_maps_known_extensions() {
        assert_eq!(content_type_for_extension("pdf"), Some(MIME_PDF));
        assert_eq!(content_type_for_extension("HTML"), Some(MIME_HTML));
        assert_eq!(content_type_for_extension("bin"), None);
    }
}
