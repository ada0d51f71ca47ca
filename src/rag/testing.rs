// Deterministic collaborators for engine, chat and web tests

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, Stream, dictionary};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use crate::config::Config;
use crate::database::{ChunkMetadata, ContentType, VectorRecord, VectorStore};
use crate::embeddings::Embedder;
use crate::llm::{ChatMessage, ChatModel, ContentPart, MessageContent};
use crate::rag::RagEngine;

pub(crate) const TEST_DIMENSION: usize = 256;

/// Bag-of-words hashing embedder; texts sharing words land close together
pub(crate) struct HashEmbedder {
    pub fail: AtomicBool,
    pub calls: AtomicUsize,
}

impl HashEmbedder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            fail: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn embed(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; TEST_DIMENSION];
        let lowered = text.to_lowercase();
        for token in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            vector[(hasher.finish() % TEST_DIMENSION as u64) as usize] += 1.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm == 0.0 {
            vector[TEST_DIMENSION - 1] = 1.0;
        } else {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

impl Embedder for HashEmbedder {
    fn embed_documents(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("embedding service unavailable");
        }
        Ok(texts.iter().map(|t| Self::embed(t)).collect())
    }

    fn dimension(&self) -> usize {
        TEST_DIMENSION
    }
}

/// Chat model stub that answers from a closure and records prompts
/// and image URLs
pub(crate) struct StubChatModel {
    reply: Box<dyn Fn(&str) -> anyhow::Result<String> + Send + Sync>,
    pub prompts: Mutex<Vec<String>>,
    pub image_urls: Mutex<Vec<String>>,
}

impl StubChatModel {
    pub fn new<F>(reply: F) -> Arc<Self>
    where
        F: Fn(&str) -> anyhow::Result<String> + Send + Sync + 'static,
    {
        Arc::new(Self {
            reply: Box::new(reply),
            prompts: Mutex::new(Vec::new()),
            image_urls: Mutex::new(Vec::new()),
        })
    }

    /// Replies with the fallback sentence unless the prompt context is non-empty
    pub fn grounded() -> Arc<Self> {
        Self::new(|prompt| {
            let context = prompt
                .split("Context:")
                .nth(1)
                .and_then(|rest| rest.split("Question:").next())
                .unwrap_or_default();
            if context.trim().is_empty() {
                Ok(crate::rag::FALLBACK_ANSWER.to_string())
            } else {
                Ok(format!("Based on the documents: {}", context.trim()))
            }
        })
    }

    pub fn failing(message: &'static str) -> Arc<Self> {
        Self::new(move |_| Err(anyhow::anyhow!(message)))
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().expect("lock").last().cloned()
    }
}

impl ChatModel for StubChatModel {
    fn complete(&self, messages: &[ChatMessage], _temperature: Option<f32>) -> anyhow::Result<String> {
        let prompt = messages
            .iter()
            .filter_map(|m| match &m.content {
                MessageContent::Text(text) => Some(text.clone()),
                MessageContent::Parts(_) => None,
            })
            .collect::<Vec<_>>()
            .join("\n");
        self.image_urls.lock().expect("lock").extend(
            messages
                .iter()
                .filter_map(|m| match &m.content {
                    MessageContent::Parts(parts) => Some(parts),
                    MessageContent::Text(_) => None,
                })
                .flatten()
                .filter_map(|part| match part {
                    ContentPart::ImageUrl { image_url } => Some(image_url.url.clone()),
                    ContentPart::Text { .. } => None,
                }),
        );
        self.prompts.lock().expect("lock").push(prompt.clone());
        (self.reply)(&prompt)
    }

    fn model_name(&self) -> &str {
        "stub-model"
    }
}

pub(crate) fn test_config(dir: &Path) -> Config {
    let mut config = Config {
        base_dir: dir.to_path_buf(),
        ..Config::default()
    };
    config.ollama.embedding_dimension = TEST_DIMENSION as u32;
    config
}

pub(crate) async fn test_store(config: &Config) -> VectorStore {
    VectorStore::new(config).await.expect("vector store opens")
}

/// Engine over a temp store with stubbed models
pub(crate) async fn test_engine(
    dir: &Path,
    embedder: Arc<HashEmbedder>,
    chat: Arc<StubChatModel>,
    vision: Arc<StubChatModel>,
) -> RagEngine {
    let config = test_config(dir);
    let store = test_store(&config).await;
    RagEngine::from_parts(config, embedder, store, chat, vision)
}

const FAKE_JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0xFF, 0xD9];

/// Builds a PDF with one page per entry; each page shows its text and,
/// when `images` is non-zero, registers that many distinct JPEG image XObjects
pub(crate) fn write_pdf(dir: &TempDir, name: &str, pages: &[(&str, usize)]) -> PathBuf {
    let pages = pages
        .iter()
        .enumerate()
        .map(|(index, (text, images))| {
            let streams = (0..*images)
                .map(|image| {
                    let mut bytes = FAKE_JPEG.to_vec();
                    bytes.push(index as u8);
                    bytes.push(image as u8);
                    Stream::new(
                        dictionary! {
                            "Type" => "XObject",
                            "Subtype" => "Image",
                            "Width" => 1,
                            "Height" => 1,
                            "ColorSpace" => "DeviceRGB",
                            "BitsPerComponent" => 8,
                            "Filter" => "DCTDecode",
                        },
                        bytes,
                    )
                })
                .collect();
            (*text, streams)
        })
        .collect::<Vec<_>>();
    write_pdf_with_images(dir, name, pages)
}

/// Uncompressed raster image XObject; `compress` applies FlateDecode
pub(crate) fn raster_image(
    width: i64,
    height: i64,
    color_space: Object,
    bits: i64,
    samples: Vec<u8>,
    compress: bool,
) -> Stream {
    let mut stream = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width,
            "Height" => height,
            "ColorSpace" => color_space,
            "BitsPerComponent" => bits,
        },
        samples,
    );
    if compress {
        stream.compress().expect("stream compresses");
    }
    stream
}

/// Like [`write_pdf`], with caller-supplied image streams per page
pub(crate) fn write_pdf_with_images(
    dir: &TempDir,
    name: &str,
    pages: Vec<(&str, Vec<Stream>)>,
) -> PathBuf {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
        "Encoding" => "WinAnsiEncoding",
    });

    let mut kids: Vec<Object> = Vec::new();
    for (text, images) in pages {
        let mut xobjects = Dictionary::new();
        for (image, stream) in images.into_iter().enumerate() {
            let image_id = doc.add_object(stream);
            xobjects.set(format!("Im{}", image), image_id);
        }

        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("content encodes"),
        ));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
                "XObject" => xobjects,
            },
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let path = dir.path().join(name);
    doc.save(&path).expect("pdf saves");
    path
}

/// Text record embedded with [`HashEmbedder`]
pub(crate) fn text_record(text: &str, page_number: u32) -> VectorRecord {
    VectorRecord {
        id: uuid::Uuid::new_v4().to_string(),
        vector: HashEmbedder::embed(text),
        text: text.to_string(),
        metadata: ChunkMetadata {
            source_path: "fixture.pdf".to_string(),
            page_number,
            content_type: ContentType::Text,
        },
        created_at: chrono::Utc::now().to_rfc3339(),
    }
}
