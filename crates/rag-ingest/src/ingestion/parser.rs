//! Text extraction from raw file bytes

use crate::error::{Error, Result};

/// Turns file bytes into plain text.
///
/// `declared_type` is the lowercase file extension. Implementations return
/// an empty string for documents without extractable text and an error for
/// unreadable or unsupported input.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, filename: &str, declared_type: &str, data: &[u8]) -> Result<String>;
}

/// Built-in extractor for PDF, plain text and Markdown
#[derive(Debug, Clone, Copy, Default)]
pub struct FileParser;

impl FileParser {
    pub fn new() -> Self {
        Self
    }

    fn parse_text(filename: &str, data: &[u8]) -> Result<String> {
        let data = data.strip_prefix(b"\xEF\xBB\xBF".as_slice()).unwrap_or(data);
        match std::str::from_utf8(data) {
            Ok(text) => Ok(text.to_string()),
            Err(e) => {
                tracing::warn!("[{}] Invalid UTF-8 at byte {}, decoding lossily", filename, e.valid_up_to());
                Ok(String::from_utf8_lossy(data).into_owned())
            }
        }
    }

    #[cfg(feature = "pdf")]
    fn parse_pdf(filename: &str, data: &[u8]) -> Result<String> {
        if !data.starts_with(b"%PDF") {
            return Err(Error::file_parse(filename, "Missing %PDF header"));
        }

        // pdf-extract panics on some malformed font tables
        let primary = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            pdf_extract::extract_text_from_mem(data)
        }));

        let text = match primary {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                tracing::warn!("[{}] pdf-extract failed: {}, trying lopdf", filename, e);
                Self::extract_pdf_text_fallback(filename, data)?
            }
            Err(_) => {
                tracing::warn!("[{}] pdf-extract panicked, trying lopdf", filename);
                Self::extract_pdf_text_fallback(filename, data)?
            }
        };

        Ok(cleanup_pdf_text(&text))
    }

    /// Page-by-page extraction with lopdf
    #[cfg(feature = "pdf")]
    fn extract_pdf_text_fallback(filename: &str, data: &[u8]) -> Result<String> {
        let doc = lopdf::Document::load_mem(data)
            .map_err(|e| Error::file_parse(filename, format!("Failed to load PDF: {}", e)))?;

        if doc.is_encrypted() {
            return Err(Error::file_parse(filename, "PDF is encrypted"));
        }

        let mut all_text = String::new();
        for page_num in doc.get_pages().keys() {
            match doc.extract_text(&[*page_num]) {
                Ok(text) => {
                    all_text.push_str(&text);
                    all_text.push('\n');
                }
                Err(e) => tracing::debug!("[{}] No text on page {}: {}", filename, page_num, e),
            }
        }

        if all_text.trim().is_empty() {
            tracing::warn!("[{}] PDF has no extractable text, may be image-based", filename);
        }

        Ok(all_text)
    }
}

impl TextExtractor for FileParser {
    fn extract(&self, filename: &str, declared_type: &str, data: &[u8]) -> Result<String> {
        match declared_type.to_lowercase().as_str() {
            #[cfg(feature = "pdf")]
            "pdf" => Self::parse_pdf(filename, data),
            "txt" | "md" | "markdown" => Self::parse_text(filename, data),
            other => Err(Error::UnsupportedFileType(other.to_string())),
        }
    }
}

/// Normalize PDF text: ligatures, non-breaking spaces, NULs and blank lines.
#[cfg(feature = "pdf")]
fn cleanup_pdf_text(text: &str) -> String {
    text.replace('\0', "")
        .replace('\u{00A0}', " ")
        .replace('\u{FB00}', "ff")
        .replace('\u{FB01}', "fi")
        .replace('\u{FB02}', "fl")
        .replace('\u{FB03}', "ffi")
        .replace('\u{FB04}', "ffl")
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Lowercase extension of a path, used as the declared type
pub fn declared_type(path: &str) -> String {
    std::path::Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default()
}
