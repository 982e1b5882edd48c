//! Turning PDF files on disk into preprocessed text and provenance metadata.

#[cfg(test)]
mod tests;

pub mod images;
pub mod pdf;

use anyhow::Context;
use fancy_regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, error};
use walkdir::WalkDir;

use crate::Result;
use crate::config::PreprocessingConfig;
use crate::store::SourceMetadata;

pub use images::{ExtractedImage, ImageDescriber, ImageProcessor, OllamaVisionDescriber};
pub use pdf::{TextExtractionStrategy, TextExtractor, validate_pdf};

static HEADER_FOOTER_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*[A-Z][A-Z \t]{19,}$").expect("valid regex"));
static PAGE_NUMBER_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*(?:[Pp]age[ \t]+)?\d{1,4}(?:[ \t]+of[ \t]+\d{1,4})?[ \t]*$")
        .expect("valid regex")
});
static URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:https?://|www\.)\S+").expect("valid regex"));
static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\w.+-]+@[\w-]+\.[\w.-]*\w").expect("valid regex"));
static ELLIPSIS_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.{3,}").expect("valid regex"));
static DASH_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-{3,}").expect("valid regex"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));
static YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:19|20)\d{2}\b").expect("valid regex"));

/// Recursively find `*.pdf` files under `dir`, sorted by path.
///
/// A missing directory is logged and yields no files.
#[inline]
pub fn discover_pdfs(dir: &Path) -> Vec<PathBuf> {
    if !dir.is_dir() {
        error!("Papers directory {} does not exist", dir.display());
        return Vec::new();
    }

    let mut pdfs: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|entry| !entry.file_type().is_dir() && is_pdf(entry.path()))
        .map(walkdir::DirEntry::into_path)
        .collect();

    pdfs.sort();
    debug!("Found {} PDF files in {}", pdfs.len(), dir.display());
    pdfs
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

/// Derive `(title, year)` from a file name such as `deep_learning-2015.pdf`.
#[inline]
pub fn metadata_from_filename(filename: &str) -> (String, Option<String>) {
    let stem = Path::new(filename)
        .file_stem()
        .map_or_else(|| filename.to_string(), |s| s.to_string_lossy().into_owned());
    let spaced = stem.replace(['_', '-'], " ");

    let year = YEAR
        .find(&spaced)
        .ok()
        .flatten()
        .map(|m| m.as_str().to_string());

    let without_year = YEAR.replace_all(&spaced, "");
    let title = without_year.split_whitespace().collect::<Vec<_>>().join(" ");

    if title.is_empty() {
        (stem, year)
    } else {
        (title, year)
    }
}

/// Build provenance for `path` from its file name and filesystem metadata.
#[inline]
pub fn source_metadata(path: &Path) -> Result<SourceMetadata> {
    let file_size = fs::metadata(path)
        .with_context(|| format!("Failed to stat {}", path.display()))?
        .len();
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let (title, year) = metadata_from_filename(&filename);

    Ok(SourceMetadata {
        filename,
        title,
        year,
        file_path: path.display().to_string(),
        file_size,
    })
}

/// Normalize raw extracted text before chunking.
///
/// Line-oriented cleanup (page numbers, all-caps running headers) happens first, while
/// line structure still exists. Everything after works on the flattened text.
#[inline]
pub fn preprocess_text(text: &str, config: &PreprocessingConfig) -> String {
    let mut text = text.to_string();

    if config.remove_page_numbers {
        text = PAGE_NUMBER_LINE.replace_all(&text, "").into_owned();
    }
    if config.remove_headers_footers {
        text = HEADER_FOOTER_LINE.replace_all(&text, "").into_owned();
    }

    let text = URL.replace_all(&text, "");
    let text = EMAIL.replace_all(&text, "");
    let text = ELLIPSIS_RUN.replace_all(&text, "...");
    let text = DASH_RUN.replace_all(&text, "---");
    let text = WHITESPACE.replace_all(&text, " ");

    text.trim().to_string()
}
