// PDF content extraction
// Per-page text and embedded raster images; JPEG streams pass through,
// other rasters are decoded and re-encoded as PNG


use anyhow::{Context, bail};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::RagError;

/// Parent links followed when looking for inherited page resources
const MAX_RESOURCE_DEPTH: usize = 32;

pub const JPEG_MIME: &str = "image/jpeg";
pub const PNG_MIME: &str = "image/png";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    /// 1-based
    pub page_number: u32,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedImage {
    pub page_number: u32,
    /// A complete image file: the stored JPEG, or a PNG built from decoded samples
    pub bytes: Vec<u8>,
    /// MIME type of `bytes`
    pub mime_type: &'static str,
}

#[derive(Debug, Clone, Default)]
pub struct ExtractedPdf {
    pub pages: Vec<PageText>,
    pub images: Vec<ExtractedImage>,
}

impl ExtractedPdf {
    #[inline]
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

/// Read a PDF, returning its page texts in page order and its images in
/// page-then-appearance order
#[inline]
pub fn extract<P: AsRef<Path>>(path: P) -> Result<ExtractedPdf, RagError> {
    let path = path.as_ref();
    debug!("Loading PDF {}", path.display());

    let document = Document::load(path)
        .map_err(|e| RagError::Extraction(format!("{}: {}", path.display(), e)))?;

    let pages = document.get_pages();
    if pages.is_empty() {
        return Err(RagError::Extraction(format!(
            "{}: document has no pages",
            path.display()
        )));
    }

    let mut extracted = ExtractedPdf::default();

    for (&page_number, &page_id) in &pages {
        let text = document.extract_text(&[page_number]).unwrap_or_else(|e| {
            warn!(
                "Could not decode text on page {} of {}: {}",
                page_number,
                path.display(),
                e
            );
            String::new()
        });
        extracted.pages.push(PageText { page_number, text });

        for (bytes, mime_type) in page_images(&document, page_id, page_number) {
            extracted.images.push(ExtractedImage {
                page_number,
                bytes,
                mime_type,
            });
        }
    }

    info!(
        "Extracted {} pages and {} images from {}",
        extracted.pages.len(),
        extracted.images.len(),
        path.display()
    );

    Ok(extracted)
}

fn page_images(
    document: &Document,
    page_id: ObjectId,
    page_number: u32,
) -> Vec<(Vec<u8>, &'static str)> {
    let Some(xobjects) = page_resources(document, page_id)
        .and_then(|resources| resolve_dict(document, resources.get(b"XObject").ok()?))
    else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut images = Vec::new();

    for (_, value) in xobjects.iter() {
        // The same image may be registered under several names
        if let Object::Reference(id) = value {
            if !seen.insert(*id) {
                continue;
            }
        }

        let Ok((_, object)) = document.dereference(value) else {
            continue;
        };
        let Ok(stream) = object.as_stream() else {
            continue;
        };

        let is_image = stream
            .dict
            .get(b"Subtype")
            .and_then(Object::as_name)
            .is_ok_and(|name| name == b"Image");

        if !is_image || stream.content.is_empty() {
            continue;
        }

        match encode_image(document, stream) {
            Ok(image) => images.push(image),
            Err(e) => warn!("Skipping image on page {}: {:#}", page_number, e),
        }
    }

    images
}

/// The page's resource dictionary, inherited from the page tree when absent
fn page_resources(document: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    let mut node = document.get_object(page_id).ok()?.as_dict().ok()?;

    for _ in 0..MAX_RESOURCE_DEPTH {
        if let Some(resources) = node
            .get(b"Resources")
            .ok()
            .and_then(|value| resolve_dict(document, value))
        {
            return Some(resources);
        }

        node = resolve_dict(document, node.get(b"Parent").ok()?)?;
    }

    None
}

fn resolve_dict<'a>(document: &'a Document, value: &'a Object) -> Option<&'a Dictionary> {
    let (_, object) = document.dereference(value).ok()?;
    object.as_dict().ok()
}

/// Pixel layout named by an image's `/ColorSpace`
#[derive(Debug, Clone, PartialEq, Eq)]
enum ColorModel {
    Gray,
    Rgb,
    Cmyk,
    /// RGB palette, three bytes per entry
    Indexed(Vec<u8>),
}

impl ColorModel {
    fn components(&self) -> usize {
        match self {
            Self::Gray | Self::Indexed(_) => 1,
            Self::Rgb => 3,
            Self::Cmyk => 4,
        }
    }
}

/// Turn an image XObject into a standalone image file
fn encode_image(document: &Document, stream: &Stream) -> anyhow::Result<(Vec<u8>, &'static str)> {
    let filters = stream_filters(stream);

    match filters.last().map(Vec::as_slice) {
        Some(b"DCTDecode") if filters.len() == 1 => return Ok((stream.content.clone(), JPEG_MIME)),
        Some(b"DCTDecode" | b"JPXDecode" | b"JBIG2Decode" | b"CCITTFaxDecode") => {
            bail!(
                "unsupported image filter chain {}",
                filters
                    .iter()
                    .map(|f| String::from_utf8_lossy(f).into_owned())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
        _ => {}
    }

    let samples = if filters.is_empty() {
        stream.content.clone()
    } else {
        // lopdf declines to decode streams tagged as images
        let mut untagged = stream.clone();
        untagged.dict.remove(b"Subtype");
        untagged
            .decompressed_content()
            .context("could not decode image stream")?
    };

    let width = dict_u32(&stream.dict, b"Width")?;
    let height = dict_u32(&stream.dict, b"Height")?;

    let is_mask = stream
        .dict
        .get(b"ImageMask")
        .and_then(Object::as_bool)
        .unwrap_or(false);
    let (model, bits) = if is_mask {
        (ColorModel::Gray, 1)
    } else {
        let bits = stream
            .dict
            .get(b"BitsPerComponent")
            .and_then(Object::as_i64)
            .map_or(Ok(8), u8::try_from)
            .context("invalid BitsPerComponent")?;
        let space = stream
            .dict
            .get(b"ColorSpace")
            .context("image has no ColorSpace")?;
        (color_model(document, space)?, bits)
    };

    let png = encode_png(width, height, bits, &model, &samples)?;
    Ok((png, PNG_MIME))
}

fn stream_filters(stream: &Stream) -> Vec<Vec<u8>> {
    match stream.dict.get(b"Filter") {
        Ok(Object::Name(name)) => vec![name.clone()],
        Ok(Object::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_name().ok().map(<[u8]>::to_vec))
            .collect(),
        _ => Vec::new(),
    }
}

fn dict_u32(dict: &Dictionary, key: &[u8]) -> anyhow::Result<u32> {
    let value = dict
        .get(key)
        .and_then(Object::as_i64)
        .with_context(|| format!("image has no {}", String::from_utf8_lossy(key)))?;
    u32::try_from(value)
        .ok()
        .filter(|v| *v > 0)
        .with_context(|| format!("invalid {} {}", String::from_utf8_lossy(key), value))
}

fn color_model(document: &Document, space: &Object) -> anyhow::Result<ColorModel> {
    let (_, space) = document
        .dereference(space)
        .context("dangling ColorSpace reference")?;

    match space {
        Object::Name(name) => device_model(name),
        Object::Array(items) => {
            let family = items
                .first()
                .and_then(|item| item.as_name().ok())
                .context("empty ColorSpace array")?;
            match family {
                b"ICCBased" => {
                    let profile = items.get(1).context("ICCBased without profile")?;
                    let (_, profile) = document
                        .dereference(profile)
                        .context("dangling ICC profile")?;
                    let components = profile
                        .as_stream()
                        .ok()
                        .and_then(|stream| stream.dict.get(b"N").and_then(Object::as_i64).ok())
                        .context("ICC profile without N")?;
                    match components {
                        1 => Ok(ColorModel::Gray),
                        3 => Ok(ColorModel::Rgb),
                        4 => Ok(ColorModel::Cmyk),
                        n => bail!("unsupported ICC component count {}", n),
                    }
                }
                b"Indexed" | b"I" => indexed_model(document, items),
                other => device_model(other),
            }
        }
        _ => bail!("malformed ColorSpace"),
    }
}

fn device_model(name: &[u8]) -> anyhow::Result<ColorModel> {
    match name {
        b"DeviceGray" | b"CalGray" | b"G" => Ok(ColorModel::Gray),
        b"DeviceRGB" | b"CalRGB" | b"RGB" => Ok(ColorModel::Rgb),
        b"DeviceCMYK" | b"CMYK" => Ok(ColorModel::Cmyk),
        other => bail!("unsupported color space {}", String::from_utf8_lossy(other)),
    }
}

/// `[/Indexed base hival lookup]`, with the palette converted to RGB
fn indexed_model(document: &Document, items: &[Object]) -> anyhow::Result<ColorModel> {
    let [_, base, hival, lookup] = items else {
        bail!("Indexed color space needs four entries");
    };

    let base = color_model(document, base)?;
    let entries = document
        .dereference(hival)
        .ok()
        .and_then(|(_, value)| value.as_i64().ok())
        .and_then(|hival| usize::try_from(hival).ok())
        .context("invalid Indexed hival")?
        + 1;

    let (_, lookup) = document
        .dereference(lookup)
        .context("dangling Indexed lookup")?;
    let table = match lookup {
        Object::String(bytes, _) => bytes.clone(),
        Object::Stream(stream) if stream_filters(stream).is_empty() => stream.content.clone(),
        Object::Stream(stream) => stream
            .decompressed_content()
            .context("could not decode Indexed lookup")?,
        _ => bail!("malformed Indexed lookup"),
    };

    let width = base.components();
    let table = table
        .get(..entries * width)
        .context("Indexed lookup shorter than hival")?;

    let palette = match base {
        ColorModel::Rgb => table.to_vec(),
        ColorModel::Gray => table.iter().flat_map(|&g| [g, g, g]).collect(),
        ColorModel::Cmyk => cmyk_to_rgb(table),
        ColorModel::Indexed(_) => bail!("nested Indexed color space"),
    };
    Ok(ColorModel::Indexed(palette))
}

fn cmyk_to_rgb(samples: &[u8]) -> Vec<u8> {
    samples
        .chunks_exact(4)
        .flat_map(|px| {
            let k = 255 - u16::from(px[3]);
            let channel = |c: u8| ((255 - u16::from(c)) * k / 255) as u8;
            [channel(px[0]), channel(px[1]), channel(px[2])]
        })
        .collect()
}

/// PDF sample rows are byte-aligned and big-endian, as in PNG scanlines
fn encode_png(
    width: u32,
    height: u32,
    bits: u8,
    model: &ColorModel,
    samples: &[u8],
) -> anyhow::Result<Vec<u8>> {
    let row_bytes = (width as usize * model.components() * usize::from(bits)).div_ceil(8);
    let expected = row_bytes * height as usize;
    let samples = samples.get(..expected).with_context(|| {
        format!(
            "image data too short: {} bytes for {}x{} at {} bits",
            samples.len(),
            width,
            height,
            bits
        )
    })?;

    let (color, depth, data) = match model {
        ColorModel::Gray => (png::ColorType::Grayscale, bits, samples.to_vec()),
        ColorModel::Rgb if bits == 8 || bits == 16 => (png::ColorType::Rgb, bits, samples.to_vec()),
        ColorModel::Cmyk if bits == 8 => (png::ColorType::Rgb, 8, cmyk_to_rgb(samples)),
        ColorModel::Indexed(_) if bits <= 8 => (png::ColorType::Indexed, bits, samples.to_vec()),
        _ => bail!("unsupported {} bits per component for {:?}", bits, model),
    };
    let depth = png::BitDepth::from_u8(depth).with_context(|| format!("unsupported bit depth {}", depth))?;

    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, width, height);
        encoder.set_color(color);
        encoder.set_depth(depth);
        if let ColorModel::Indexed(palette) = model {
            encoder.set_palette(palette.clone());
        }
        let mut writer = encoder.write_header().context("PNG header")?;
        writer.write_image_data(&data).context("PNG data")?;
        writer.finish().context("PNG trailer")?;
    }
    Ok(out)
}
