//! Attachment text extraction cascade.
//!
//! Order of attack for a downloaded attachment: cached text, then a local
//! format-specific extractor, then the external vision service when the local
//! output is short enough to suggest a scanned document. Extractor failures
//! degrade to empty output; they never abort the parent submission.

use anyhow::{Context, Result};
use base64::Engine;
use docx_rs::{read_docx, DocumentChild, ParagraphChild, RunChild};
use scraper::{Html, Node};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::cache::TextCache;
use crate::config::ExtractionConfig;

/// Instruction sent to the vision service, fixed and low-temperature.
const VISION_PROMPT: &str = "Extract all text from this document. Return only the raw text content.";

const VISION_TEMPERATURE: f64 = 0.1;
const VISION_MAX_OUTPUT_TOKENS: u32 = 8192;

/// Client for the external vision/document understanding service
/// (Gemini-style `generateContent` endpoint).
pub struct VisionExtractor {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    timeout: Duration,
    max_file_bytes: u64,
}

impl VisionExtractor {
    pub fn new(config: &ExtractionConfig, client: reqwest::Client, api_key: String) -> Self {
        Self {
            client,
            base_url: config.vision_base_url.trim_end_matches('/').to_string(),
            model: config.vision_model.clone(),
            api_key,
            timeout: Duration::from_secs(config.vision_timeout_secs),
            max_file_bytes: config.max_vision_file_bytes,
        }
    }

    /// Submit the file for text extraction. Files above the size ceiling are
    /// skipped without a network call.
    pub async fn extract(&self, file_path: &Path) -> Result<String> {
        let metadata = std::fs::metadata(file_path)
            .with_context(|| format!("Failed to stat attachment: {}", file_path.display()))?;
        if metadata.len() > self.max_file_bytes {
            warn!(
                "Attachment too large for vision extraction ({} bytes): {}",
                metadata.len(),
                file_path.display()
            );
            return Ok(String::new());
        }

        let data = std::fs::read(file_path)
            .with_context(|| format!("Failed to read attachment: {}", file_path.display()))?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(&data);

        let url = format!(
            "{}/v1/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );
        let payload = serde_json::json!({
            "contents": [{
                "parts": [
                    {"text": VISION_PROMPT},
                    {"inlineData": {"mimeType": mime_for(file_path), "data": encoded}}
                ]
            }],
            "generationConfig": {
                "temperature": VISION_TEMPERATURE,
                "maxOutputTokens": VISION_MAX_OUTPUT_TOKENS
            }
        });

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .timeout(self.timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("Vision request failed: HTTP {}", response.status());
        }

        let json: serde_json::Value = response.json().await?;
        let text = json
            .pointer("/candidates/0/content/parts/0/text")
            .and_then(|t| t.as_str())
            .ok_or_else(|| anyhow::anyhow!("Vision response missing text content"))?;

        Ok(text.trim().to_string())
    }
}

/// MIME type hint for the vision service, keyed by file extension.
fn mime_for(file_path: &Path) -> &'static str {
    match file_path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        _ => "application/pdf",
    }
}

/// The ordered fallback chain: cache, local extractor, vision service.
pub struct ExtractionCascade {
    cache: Arc<dyn TextCache>,
    vision: Option<VisionExtractor>,
    min_local_chars: usize,
}

impl ExtractionCascade {
    pub fn new(
        cache: Arc<dyn TextCache>,
        vision: Option<VisionExtractor>,
        min_local_chars: usize,
    ) -> Self {
        Self {
            cache,
            vision,
            min_local_chars,
        }
    }

    /// Cache lookup only, used to skip the download entirely on later runs.
    pub fn cached(&self, file_path: &Path) -> Option<String> {
        self.cache
            .get(file_path)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
    }

    /// Extract text from an attachment file. A cache hit returns immediately;
    /// otherwise the local extractor runs, then the vision service when local
    /// output is below the minimal-content threshold. The longer non-empty
    /// result wins and is cached before returning. Returns an empty string
    /// when nothing could be extracted.
    pub async fn extract(&self, file_path: &Path) -> String {
        if let Some(cached) = self.cache.get(file_path) {
            return cached.trim().to_string();
        }

        let mut best = extract_local(file_path);

        if best.trim().len() < self.min_local_chars {
            if let Some(vision) = &self.vision {
                debug!(
                    "Local extraction yielded {} chars for {}, trying vision service",
                    best.trim().len(),
                    file_path.display()
                );
                match vision.extract(file_path).await {
                    Ok(remote) if remote.trim().len() > best.trim().len() => best = remote,
                    Ok(_) => {}
                    Err(e) => debug!("Vision extraction failed for {}: {}", file_path.display(), e),
                }
            }
        }

        let best = best.trim().to_string();
        if !best.is_empty() {
            if let Err(e) = self.cache.put(file_path, &best) {
                warn!("Failed to cache extracted text for {}: {}", file_path.display(), e);
            }
        }
        best
    }
}

/// Run the format-specific local extractor. Any failure is caught and
/// reported as empty output.
pub fn extract_local(file_path: &Path) -> String {
    let extension = file_path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());

    let result = match extension.as_deref() {
        Some("txt") => std::fs::read_to_string(file_path).map_err(anyhow::Error::from),
        Some("pdf") => extract_pdf(file_path),
        Some("doc") | Some("docx") => extract_docx(file_path),
        Some("html") | Some("htm") => extract_html_file(file_path),
        other => {
            warn!(
                "Unsupported attachment type {:?}: {}",
                other,
                file_path.display()
            );
            return String::new();
        }
    };

    match result {
        Ok(text) => text,
        Err(e) => {
            warn!("Text extraction failed for {}: {}", file_path.display(), e);
            String::new()
        }
    }
}

fn extract_pdf(file_path: &Path) -> Result<String> {
    let data = std::fs::read(file_path)
        .with_context(|| format!("Failed to read PDF: {}", file_path.display()))?;
    let text = pdf_extract::extract_text_from_mem(&data)
        .with_context(|| format!("Failed to extract text from PDF: {}", file_path.display()))?;
    Ok(text)
}

/// Paragraph concatenation for word-processor documents.
fn extract_docx(file_path: &Path) -> Result<String> {
    let data = std::fs::read(file_path)
        .with_context(|| format!("Failed to read document: {}", file_path.display()))?;
    let docx = read_docx(&data)
        .with_context(|| format!("Failed to parse document: {}", file_path.display()))?;

    let mut paragraphs = Vec::new();
    for child in &docx.document.children {
        if let DocumentChild::Paragraph(paragraph) = child {
            let mut buffer = String::new();
            for para_child in &paragraph.children {
                if let ParagraphChild::Run(run) = para_child {
                    for run_child in &run.children {
                        match run_child {
                            RunChild::Text(text) => buffer.push_str(&text.text),
                            RunChild::Break(_) => buffer.push('\n'),
                            RunChild::Tab(_) => buffer.push('\t'),
                            _ => {}
                        }
                    }
                }
            }
            if !buffer.trim().is_empty() {
                paragraphs.push(buffer.trim().to_string());
            }
        }
    }
    Ok(paragraphs.join("\n"))
}

fn extract_html_file(file_path: &Path) -> Result<String> {
    let content = std::fs::read_to_string(file_path)
        .with_context(|| format!("Failed to read HTML: {}", file_path.display()))?;
    Ok(extract_html(&content))
}

/// Pull visible text out of an HTML document, skipping script and style
/// contents.
pub fn extract_html(content: &str) -> String {
    let document = Html::parse_document(content);
    let mut parts: Vec<String> = Vec::new();

    for node in document.tree.nodes() {
        if let Node::Text(text) = node.value() {
            let in_skipped = node
                .parent()
                .map(|p| match p.value() {
                    Node::Element(el) => matches!(el.name(), "script" | "style"),
                    _ => false,
                })
                .unwrap_or(false);
            if in_skipped {
                continue;
            }
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                parts.push(trimmed.to_string());
            }
        }
    }

    parts.join("\n")
}
