//! Figures embedded in PDFs, turned into searchable text through a vision model.


use anyhow::{Context, Result, bail};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use flate2::read::ZlibDecoder;
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::ImageConfig;
use crate::embeddings::OllamaClient;
use crate::embeddings::chunking::char_len;
use crate::embeddings::ollama::{GenerateOptions, GenerateRequest};
use crate::store::{ChunkMetadata, ChunkRecord, ContentType, SourceMetadata};

const DESCRIPTION_CONTEXT: &str = "scientific paper";
const VISION_TEMPERATURE: f32 = 0.1;
const VISION_MAX_TOKENS: u32 = 200;

/// A raw image stream pulled out of a page's XObject resources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedImage {
    /// 1-based.
    pub page_number: u32,
    /// Position among the images kept from the same page.
    pub image_index: usize,
    pub format: String,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

/// Produces a natural-language description of an image.
pub trait ImageDescriber: Send + Sync {
    fn describe(&self, image: &ExtractedImage, context: &str) -> Result<String>;
}

/// Describes images with an Ollama vision model such as `llava`.
#[derive(Debug, Clone)]
pub struct OllamaVisionDescriber {
    client: OllamaClient,
    model: String,
}

impl OllamaVisionDescriber {
    #[inline]
    pub fn new(client: OllamaClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

impl ImageDescriber for OllamaVisionDescriber {
    #[inline]
    fn describe(&self, image: &ExtractedImage, context: &str) -> Result<String> {
        let request = GenerateRequest {
            model: self.model.clone(),
            prompt: vision_prompt(context),
            stream: false,
            images: vec![BASE64.encode(&image.data)],
            options: GenerateOptions {
                temperature: VISION_TEMPERATURE,
                num_predict: VISION_MAX_TOKENS,
            },
        };
        self.client.generate(&request)
    }
}

fn vision_prompt(context: &str) -> String {
    format!(
        "Analyze this image from a {context}. Provide a detailed description focusing on:
1. What type of figure/diagram/chart this is
2. Key data, labels, or text visible in the image
3. Scientific content, methodology, or results shown
4. Any important numerical values or trends

Be concise but thorough, focusing on scientifically relevant information."
    )
}

/// Extracts qualifying images from a PDF and wraps their descriptions into chunks.
pub struct ImageProcessor {
    config: ImageConfig,
    describer: Arc<dyn ImageDescriber>,
}

impl std::fmt::Debug for ImageProcessor {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageProcessor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ImageProcessor {
    #[inline]
    pub fn new(config: ImageConfig, describer: Arc<dyn ImageDescriber>) -> Self {
        Self { config, describer }
    }

    /// Processor backed by the configured Ollama vision model.
    #[inline]
    pub fn ollama(config: ImageConfig, client: OllamaClient) -> Self {
        let describer = OllamaVisionDescriber::new(client, config.vision_model.clone());
        Self::new(config, Arc::new(describer))
    }

    /// Image streams of at least `min_image_size` bytes, at most `max_images_per_page`
    /// per page, in page order. JPEG streams are kept as stored and 8-bit Flate
    /// RGB or gray rasters are re-encoded as PNG; anything else is skipped.
    #[inline]
    pub fn extract_images(&self, path: &Path) -> Result<Vec<ExtractedImage>> {
        let doc = Document::load(path)
            .with_context(|| format!("Failed to parse PDF {}", path.display()))?;
        let mut images = Vec::new();

        for (page_number, page_id) in doc.get_pages() {
            let mut kept_on_page = 0;
            for (name, stream_dict, data) in page_image_streams(&doc, page_id) {
                if kept_on_page >= self.config.max_images_per_page {
                    debug!(
                        "Page {} has more than {} images, ignoring the rest",
                        page_number, self.config.max_images_per_page
                    );
                    break;
                }
                if data.len() < self.config.min_image_size {
                    debug!(
                        "Skipping small image {} on page {} ({} bytes)",
                        String::from_utf8_lossy(&name),
                        page_number,
                        data.len()
                    );
                    continue;
                }
                let (format, encoded) = match encode_for_vision(stream_dict, data) {
                    Ok(encoded) => encoded,
                    Err(e) => {
                        debug!(
                            "Skipping image {} on page {}: {:#}",
                            String::from_utf8_lossy(&name),
                            page_number,
                            e
                        );
                        continue;
                    }
                };

                images.push(ExtractedImage {
                    page_number,
                    image_index: kept_on_page,
                    format: format.to_string(),
                    width: dimension(stream_dict, b"Width"),
                    height: dimension(stream_dict, b"Height"),
                    data: encoded,
                });
                kept_on_page += 1;
            }
        }

        info!("Extracted {} images from {}", images.len(), path.display());
        Ok(images)
    }

    /// Describe `image`, degrading to a placeholder on failure.
    #[inline]
    pub fn describe(&self, image: &ExtractedImage) -> String {
        match self.describer.describe(image, DESCRIPTION_CONTEXT) {
            Ok(description) => description,
            Err(e) => {
                warn!(
                    "Failed to describe image {} on page {}: {:#}",
                    image.image_index, image.page_number, e
                );
                format!("[Image description failed: {}]", e)
            }
        }
    }

    /// Image-description chunks for the PDF at `path`, numbered among themselves.
    ///
    /// Extraction failures yield no chunks.
    #[inline]
    pub fn image_chunks(
        &self,
        path: &Path,
        source: &SourceMetadata,
        min_chunk_size: usize,
    ) -> Vec<ChunkRecord> {
        let images = match self.extract_images(path) {
            Ok(images) => images,
            Err(e) => {
                warn!("Failed to extract images from {}: {:#}", path.display(), e);
                return Vec::new();
            }
        };

        let described: Vec<(ExtractedImage, String)> = images
            .into_iter()
            .enumerate()
            .map(|(i, image)| {
                debug!(
                    "Describing image {} from page {} of {}",
                    i + 1,
                    image.page_number,
                    source.filename
                );
                let description = self.describe(&image);
                (image, description)
            })
            .collect();

        build_image_chunks(&described, source, min_chunk_size)
    }
}

/// Wrap described images into chunks. Chunks under `min_chunk_size` are dropped
/// before numbering.
#[inline]
pub fn build_image_chunks(
    described: &[(ExtractedImage, String)],
    source: &SourceMetadata,
    min_chunk_size: usize,
) -> Vec<ChunkRecord> {
    let contents: Vec<(&ExtractedImage, String)> = described
        .iter()
        .map(|(image, description)| (image, image_chunk_content(image, description)))
        .filter(|(_, content)| char_len(content) >= min_chunk_size)
        .collect();

    let total_chunks = contents.len();
    contents
        .into_iter()
        .enumerate()
        .map(|(chunk_id, (image, content))| {
            let metadata = ChunkMetadata {
                content_type: ContentType::ImageDescription,
                page_number: Some(image.page_number),
                image_index: Some(image.image_index),
                image_format: Some(image.format.clone()),
                image_dimensions: Some((image.width, image.height)),
                ..ChunkMetadata::text(source.clone(), chunk_id, total_chunks, &content)
            };
            ChunkRecord::new(content, metadata)
        })
        .collect()
}

fn image_chunk_content(image: &ExtractedImage, description: &str) -> String {
    format!(
        "[IMAGE from page {}]\nImage Type: Figure/Diagram ({}, {}x{})\nDescription: {}",
        image.page_number,
        image.format,
        image.width,
        image.height,
        description.trim()
    )
}

/// `(resource name, stream dictionary, raw bytes)` for every image XObject on a page.
fn page_image_streams(doc: &Document, page_id: ObjectId) -> Vec<(Vec<u8>, &Dictionary, &[u8])> {
    let Some(xobjects) = page_resources(doc, page_id)
        .and_then(|resources| resources.get(b"XObject").ok())
        .and_then(|xobjects| resolve_dict(doc, xobjects))
    else {
        return Vec::new();
    };

    xobjects
        .iter()
        .filter_map(|(name, object)| {
            let stream = match object {
                Object::Reference(id) => doc.get_object(*id).ok()?.as_stream().ok()?,
                Object::Stream(stream) => stream,
                _ => return None,
            };
            let is_image = matches!(stream.dict.get(b"Subtype"), Ok(Object::Name(n)) if n.as_slice() == b"Image");
            is_image.then(|| (name.clone(), &stream.dict, stream.content.as_slice()))
        })
        .collect()
}

/// A page's `Resources`, inherited from the nearest ancestor that defines them.
fn page_resources(doc: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    let mut node = doc.get_dictionary(page_id).ok()?;
    loop {
        if let Some(resources) = node
            .get(b"Resources")
            .ok()
            .and_then(|resources| resolve_dict(doc, resources))
        {
            return Some(resources);
        }
        let Ok(Object::Reference(parent)) = node.get(b"Parent") else {
            return None;
        };
        node = doc.get_dictionary(*parent).ok()?;
    }
}

fn resolve_dict<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Dictionary> {
    match object {
        Object::Dictionary(dict) => Some(dict),
        Object::Reference(id) => doc.get_dictionary(*id).ok(),
        _ => None,
    }
}

/// Image file bytes a vision model can read, with their format name.
fn encode_for_vision(dict: &Dictionary, data: &[u8]) -> Result<(&'static str, Vec<u8>)> {
    let filters = stream_filters(dict);
    let [filter] = filters.as_slice() else {
        bail!("expected exactly one stream filter, found {}", filters.len());
    };

    match *filter {
        b"DCTDecode" => Ok(("jpeg", data.to_vec())),
        b"FlateDecode" => flate_to_png(dict, data).map(|png| ("png", png)),
        other => bail!("unsupported filter {}", String::from_utf8_lossy(other)),
    }
}

fn stream_filters(dict: &Dictionary) -> Vec<&[u8]> {
    match dict.get(b"Filter") {
        Ok(Object::Name(name)) => vec![name.as_slice()],
        Ok(Object::Array(filters)) => filters
            .iter()
            .filter_map(|filter| match filter {
                Object::Name(name) => Some(name.as_slice()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Inflate an unpredicted 8-bit DeviceRGB or DeviceGray raster and encode it as PNG.
fn flate_to_png(dict: &Dictionary, data: &[u8]) -> Result<Vec<u8>> {
    if !matches!(dict.get(b"BitsPerComponent"), Ok(Object::Integer(8))) {
        bail!("only 8 bits per component are supported");
    }
    let (color, channels) = match dict.get(b"ColorSpace") {
        Ok(Object::Name(name)) if name.as_slice() == b"DeviceRGB" => (png::ColorType::Rgb, 3),
        Ok(Object::Name(name)) if name.as_slice() == b"DeviceGray" => {
            (png::ColorType::Grayscale, 1)
        }
        _ => bail!("only DeviceRGB and DeviceGray color spaces are supported"),
    };

    let width = dimension(dict, b"Width");
    let height = dimension(dict, b"Height");
    let expected = (width as usize)
        .checked_mul(height as usize)
        .and_then(|pixels| pixels.checked_mul(channels))
        .filter(|&len| len > 0)
        .context("invalid image dimensions")?;

    // Predictor rows and oversized streams both fail the length check
    let mut pixels = Vec::with_capacity(expected);
    ZlibDecoder::new(data)
        .take(expected as u64 + 1)
        .read_to_end(&mut pixels)
        .context("Failed to inflate image stream")?;
    if pixels.len() != expected {
        bail!(
            "inflated {} bytes, expected {} for {}x{}",
            pixels.len(),
            expected,
            width,
            height
        );
    }

    let mut encoded = Vec::new();
    let mut encoder = png::Encoder::new(&mut encoded, width, height);
    encoder.set_color(color);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header()?;
    writer.write_image_data(&pixels)?;
    writer.finish()?;

    Ok(encoded)
}

fn dimension(dict: &Dictionary, key: &[u8]) -> u32 {
    match dict.get(key) {
        Ok(Object::Integer(value)) => u32::try_from(*value).unwrap_or(0),
        _ => 0,
    }
}
