
use anyhow::{Context, Result, anyhow, bail};
use lopdf::content::Content;
use lopdf::{Document, Object};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;
use tracing::{debug, warn};

use crate::embeddings::chunking::char_len;

/// Extracted text shorter than this (after trimming) sends the cascade to the next strategy.
pub const MIN_EXTRACTED_CHARS: usize = 100;

/// One way of pulling text out of a PDF file.
pub trait TextExtractionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn extract(&self, path: &Path) -> Result<String>;
}

/// Whole-document extraction with `pdf-extract`, which handles font encodings well.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfExtractStrategy;

impl TextExtractionStrategy for PdfExtractStrategy {
    #[inline]
    fn name(&self) -> &'static str {
        "pdf-extract"
    }

    #[inline]
    fn extract(&self, path: &Path) -> Result<String> {
        // pdf-extract panics on some malformed fonts instead of returning an error
        match catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text(path))) {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => Err(anyhow!("pdf-extract failed: {}", e)),
            Err(_) => bail!("pdf-extract panicked while reading {}", path.display()),
        }
    }
}

/// Page-by-page extraction with `lopdf`. Pages that fail are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfTextStrategy;

impl TextExtractionStrategy for LopdfTextStrategy {
    #[inline]
    fn name(&self) -> &'static str {
        "lopdf"
    }

    #[inline]
    fn extract(&self, path: &Path) -> Result<String> {
        let doc = load_document(path)?;
        let mut pages = Vec::new();

        for page_number in doc.get_pages().keys() {
            match doc.extract_text(&[*page_number]) {
                Ok(text) => pages.push(text),
                Err(e) => debug!("lopdf could not read page {}: {}", page_number, e),
            }
        }

        Ok(pages.join("\n"))
    }
}

/// Last resort: walk each page's content stream and collect the operands of the
/// text-showing operators (`Tj`, `TJ`, `'`, `"`).
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentStreamStrategy;

impl TextExtractionStrategy for ContentStreamStrategy {
    #[inline]
    fn name(&self) -> &'static str {
        "content-stream"
    }

    #[inline]
    fn extract(&self, path: &Path) -> Result<String> {
        let doc = load_document(path)?;
        let mut pages = Vec::new();

        for (page_number, page_id) in doc.get_pages() {
            let content = match doc.get_page_content(page_id) {
                Ok(content) => content,
                Err(e) => {
                    debug!("No content stream for page {}: {}", page_number, e);
                    continue;
                }
            };
            let operations = match Content::decode(&content) {
                Ok(decoded) => decoded.operations,
                Err(e) => {
                    debug!("Undecodable content stream on page {}: {}", page_number, e);
                    continue;
                }
            };

            let mut page_text = String::new();
            for op in operations {
                match op.operator.as_str() {
                    "Tj" | "TJ" => {
                        for operand in &op.operands {
                            push_operand_text(operand, &mut page_text);
                        }
                    }
                    "'" | "\"" => {
                        page_text.push('\n');
                        for operand in &op.operands {
                            push_operand_text(operand, &mut page_text);
                        }
                    }
                    "ET" => page_text.push('\n'),
                    _ => {}
                }
            }
            pages.push(page_text);
        }

        Ok(pages.join("\n\n"))
    }
}

fn push_operand_text(operand: &Object, out: &mut String) {
    match operand {
        Object::String(bytes, _) => out.push_str(&decode_pdf_string(bytes)),
        Object::Array(items) => {
            for item in items {
                match item {
                    Object::String(bytes, _) => out.push_str(&decode_pdf_string(bytes)),
                    // Large negative kerning in a TJ array is a word gap
                    Object::Integer(n) if *n < -100 => out.push(' '),
                    Object::Real(n) if *n < -100.0 => out.push(' '),
                    _ => {}
                }
            }
        }
        _ => {}
    }
}

/// Decode a PDF string operand: UTF-16BE when it carries a BOM, then UTF-8, then Latin-1.
fn decode_pdf_string(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        if let Ok(text) = String::from_utf16(&units) {
            return text;
        }
    }

    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|&b| char::from(b)).collect(),
    }
}

fn load_document(path: &Path) -> Result<Document> {
    Document::load(path).with_context(|| format!("Failed to parse PDF {}", path.display()))
}

/// Text pulled from a PDF and the strategy that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText {
    pub strategy: &'static str,
    pub text: String,
}

/// Tries its strategies in order and keeps the first adequate result.
pub struct TextExtractor {
    strategies: Vec<Box<dyn TextExtractionStrategy>>,
}

impl Default for TextExtractor {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TextExtractor {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextExtractor")
            .field(
                "strategies",
                &self.strategies.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl TextExtractor {
    /// `pdf-extract`, then `lopdf` per page, then raw content-stream operators.
    #[inline]
    pub fn new() -> Self {
        Self::with_strategies(vec![
            Box::new(PdfExtractStrategy),
            Box::new(LopdfTextStrategy),
            Box::new(ContentStreamStrategy),
        ])
    }

    #[inline]
    pub fn with_strategies(strategies: Vec<Box<dyn TextExtractionStrategy>>) -> Self {
        Self { strategies }
    }

    /// `None` when every strategy fails or yields too little text.
    #[inline]
    pub fn extract(&self, path: &Path) -> Option<ExtractedText> {
        for strategy in &self.strategies {
            match strategy.extract(path) {
                Ok(text) if char_len(text.trim()) > MIN_EXTRACTED_CHARS => {
                    debug!(
                        "Extracted {} chars from {} with {}",
                        char_len(&text),
                        path.display(),
                        strategy.name()
                    );
                    return Some(ExtractedText {
                        strategy: strategy.name(),
                        text,
                    });
                }
                Ok(_) => debug!(
                    "{} produced too little text for {}",
                    strategy.name(),
                    path.display()
                ),
                Err(e) => debug!("{} failed for {}: {:#}", strategy.name(), path.display(), e),
            }
        }

        warn!("All text extraction strategies failed for {}", path.display());
        None
    }
}

/// Check that `path` is a loadable PDF with at least one page whose first page yields text.
#[inline]
pub fn validate_pdf(path: &Path) -> Result<()> {
    let doc = load_document(path)?;
    let pages = doc.get_pages();
    let Some(first_page) = pages.keys().next().copied() else {
        bail!("PDF {} has no pages", path.display());
    };

    doc.extract_text(&[first_page])
        .with_context(|| format!("Could not read text from first page of {}", path.display()))?;

    Ok(())
}
