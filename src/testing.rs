//! Deterministic stand-ins for the model collaborators, plus a tiny PDF writer.

use anyhow::{Result, bail};
use flate2::Compression;
use flate2::write::ZlibEncoder;
use lopdf::{Dictionary, Document, Object, Stream};
use std::fmt::Write as _;
use std::io::Write as _;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::embeddings::Embedder;
use crate::extraction::{ExtractedImage, ImageDescriber};
use crate::llm::{GenerationOptions, LanguageModel};

pub(crate) const KEYWORD_DIMENSION: usize = 64;

/// Bag-of-words embedder: each lowercase word is hashed into one of
/// [`KEYWORD_DIMENSION`] buckets. Texts sharing words get similar vectors.
#[derive(Debug, Default)]
pub(crate) struct KeywordEmbedder {
    pub calls: AtomicUsize,
}

impl KeywordEmbedder {
    pub fn vector(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; KEYWORD_DIMENSION];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let word = word.to_lowercase();
            vector[bucket(&word)] += 1.0;
        }
        vector
    }
}

fn bucket(word: &str) -> usize {
    // FNV-1a
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in word.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    (hash % KEYWORD_DIMENSION as u64) as usize
}

impl Embedder for KeywordEmbedder {
    fn model_name(&self) -> &str {
        "keyword-test"
    }

    fn embed_raw(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }
}

/// Embedder that always fails.
#[derive(Debug, Default)]
pub(crate) struct FailingEmbedder;

impl Embedder for FailingEmbedder {
    fn model_name(&self) -> &str {
        "failing"
    }

    fn embed_raw(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("embedding service unavailable")
    }
}

/// Language model that records prompts and answers with a fixed reply, or fails.
#[derive(Debug)]
pub(crate) struct RecordingModel {
    reply: std::result::Result<String, String>,
    pub prompts: Mutex<Vec<String>>,
}

impl RecordingModel {
    pub fn answering(reply: &str) -> Self {
        Self {
            reply: Ok(reply.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: &str) -> Self {
        Self {
            reply: Err(error.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompt log lock").clone()
    }
}

impl LanguageModel for RecordingModel {
    fn generate(&self, prompt: &str, _options: &GenerationOptions) -> Result<String> {
        self.prompts
            .lock()
            .expect("prompt log lock")
            .push(prompt.to_string());
        match &self.reply {
            Ok(reply) => Ok(reply.clone()),
            Err(error) => bail!("{}", error),
        }
    }

    fn identifier(&self) -> String {
        "mock: recording".to_string()
    }
}

/// Describer that returns a fixed description, or fails for every image.
#[derive(Debug)]
pub(crate) struct StaticDescriber(pub std::result::Result<String, String>);

impl ImageDescriber for StaticDescriber {
    fn describe(&self, image: &ExtractedImage, _context: &str) -> Result<String> {
        match &self.0 {
            Ok(description) => Ok(format!("{} (page {})", description, image.page_number)),
            Err(error) => bail!("{}", error),
        }
    }
}

struct FixtureImage {
    filter: &'static str,
    width: i64,
    height: i64,
    data: Vec<u8>,
}

#[derive(Default)]
struct FixturePage {
    lines: Vec<String>,
    images: Vec<FixtureImage>,
}

/// Builds small but well-formed PDFs with Helvetica text and optional image XObjects.
#[derive(Default)]
pub(crate) struct PdfFixture {
    pages: Vec<FixturePage>,
}

impl PdfFixture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, lines: &[&str]) -> Self {
        self.pages.push(FixturePage {
            lines: lines.iter().map(|l| (*l).to_string()).collect(),
            images: Vec::new(),
        });
        self
    }

    /// Attach an image stream to the most recently added page.
    pub fn image(mut self, filter: &'static str, width: i64, height: i64, data: Vec<u8>) -> Self {
        if let Some(page) = self.pages.last_mut() {
            page.images.push(FixtureImage {
                filter,
                width,
                height,
                data,
            });
        }
        self
    }

    pub fn write(&self, path: &Path) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let catalog_id = doc.new_object_id();

        let mut font = Dictionary::new();
        font.set("Type", Object::Name(b"Font".to_vec()));
        font.set("Subtype", Object::Name(b"Type1".to_vec()));
        font.set("BaseFont", Object::Name(b"Helvetica".to_vec()));
        let font_id = doc.add_object(Object::Dictionary(font));

        let mut page_refs = Vec::new();
        for page in &self.pages {
            let mut content = String::new();
            let mut y = 750;
            for line in &page.lines {
                writeln!(
                    content,
                    "BT /F1 10 Tf 40 {} Td ({}) Tj ET",
                    y,
                    escape_pdf_text(line)
                )
                .expect("writing to a String cannot fail");
                y -= 14;
            }

            let mut xobjects = Dictionary::new();
            for (i, image) in page.images.iter().enumerate() {
                let mut dict = Dictionary::new();
                dict.set("Type", Object::Name(b"XObject".to_vec()));
                dict.set("Subtype", Object::Name(b"Image".to_vec()));
                dict.set("Width", Object::Integer(image.width));
                dict.set("Height", Object::Integer(image.height));
                dict.set("ColorSpace", Object::Name(b"DeviceRGB".to_vec()));
                dict.set("BitsPerComponent", Object::Integer(8));
                dict.set("Filter", Object::Name(image.filter.as_bytes().to_vec()));
                let image_id = doc.add_object(Object::Stream(Stream::new(dict, image.data.clone())));

                let name = format!("Im{}", i);
                xobjects.set(name.as_bytes().to_vec(), Object::Reference(image_id));
                writeln!(content, "q 100 0 0 100 40 40 cm /{} Do Q", name)
                    .expect("writing to a String cannot fail");
            }

            let content_id = doc.add_object(Object::Stream(Stream::new(
                Dictionary::new(),
                content.into_bytes(),
            )));

            let mut fonts = Dictionary::new();
            fonts.set("F1", Object::Reference(font_id));
            let mut resources = Dictionary::new();
            resources.set("Font", Object::Dictionary(fonts));
            if !page.images.is_empty() {
                resources.set("XObject", Object::Dictionary(xobjects));
            }

            let mut page_dict = Dictionary::new();
            page_dict.set("Type", Object::Name(b"Page".to_vec()));
            page_dict.set("Parent", Object::Reference(pages_id));
            page_dict.set("Contents", Object::Reference(content_id));
            page_dict.set("Resources", Object::Dictionary(resources));
            page_dict.set(
                "MediaBox",
                Object::Array(vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(612),
                    Object::Integer(792),
                ]),
            );
            let page_id = doc.add_object(Object::Dictionary(page_dict));
            page_refs.push(Object::Reference(page_id));
        }

        let mut pages_dict = Dictionary::new();
        pages_dict.set("Type", Object::Name(b"Pages".to_vec()));
        pages_dict.set(
            "Count",
            Object::Integer(i64::try_from(page_refs.len()).expect("page count fits")),
        );
        pages_dict.set("Kids", Object::Array(page_refs));
        doc.objects.insert(pages_id, Object::Dictionary(pages_dict));

        let mut catalog = Dictionary::new();
        catalog.set("Type", Object::Name(b"Catalog".to_vec()));
        catalog.set("Pages", Object::Reference(pages_id));
        doc.objects.insert(catalog_id, Object::Dictionary(catalog));
        doc.trailer.set("Root", Object::Reference(catalog_id));

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).expect("should serialize test PDF");
        std::fs::write(path, buffer).expect("should write test PDF");
    }
}

fn escape_pdf_text(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('(', "\\(")
        .replace(')', "\\)")
}

/// A minimal JPEG-looking payload of `len` bytes (SOI marker, filler, EOI marker).
pub(crate) fn fake_jpeg(len: usize) -> Vec<u8> {
    let mut data = vec![0xFF, 0xD8];
    data.resize(len.saturating_sub(2), 0x42);
    data.extend_from_slice(&[0xFF, 0xD9]);
    data
}

/// Noisy 8-bit pixels, raw and zlib-compressed. Noise keeps the compressed
/// stream about as large as the raw one.
pub(crate) fn flate_raster(width: usize, height: usize, channels: usize) -> (Vec<u8>, Vec<u8>) {
    let mut state: u32 = 0x2545_f491;
    let raw: Vec<u8> = (0..width * height * channels)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            state.to_le_bytes()[0]
        })
        .collect();

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&raw).expect("writing to a Vec cannot fail");
    let compressed = encoder.finish().expect("writing to a Vec cannot fail");
    (raw, compressed)
}
