use std::fmt::{Debug, Formatter};
use std::io::Write;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::OnceLock;

use chrono::NaiveDateTime;
use encoding_rs::{UTF_16BE, WINDOWS_1252};
use lopdf::{Dictionary, Object, ObjectId};
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::detect::panic_message;
use crate::error::ExtractError;

/// Upload ceiling applied when the caller has no configured limit.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 200 * 1024 * 1024;

const MAX_PARENT_DEPTH: usize = 32;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageSize {
    pub page: u32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub creation_date: Option<String>,
    pub page_sizes: Vec<PageSize>,
}

/// An uploaded PDF that passed intake validation.
///
/// The bytes are mirrored into a temporary file for tools that need a path;
/// the file is removed when the document is dropped.
pub struct Document {
    name: String,
    bytes: Vec<u8>,
    file: NamedTempFile,
    pdf: lopdf::Document,
    page_count: u32,
    metadata: DocumentMetadata,
    page_texts: OnceLock<Option<Vec<String>>>,
}

impl Debug for Document {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("name", &self.name)
            .field("size", &self.bytes.len())
            .field("path", &self.file.path())
            .field("page_count", &self.page_count)
            .finish_non_exhaustive()
    }
}

impl Document {
    /// Validates `bytes` as a readable, unencrypted PDF with at least one page.
    pub fn load(name: &str, bytes: Vec<u8>, max_bytes: usize) -> Result<Self, ExtractError> {
        if bytes.len() > max_bytes {
            return Err(ExtractError::DocumentTooLarge {
                size: bytes.len(),
                limit: max_bytes,
            });
        }
        if bytes.is_empty() {
            return Err(ExtractError::InvalidDocument("uploaded file is empty".to_string()));
        }

        let mut file = tempfile::Builder::new()
            .prefix("pdf-table-genius-")
            .suffix(".pdf")
            .tempfile()?;
        file.write_all(&bytes)?;
        file.flush()?;

        let pdf = lopdf::Document::load_mem(&bytes).map_err(|error| {
            ExtractError::InvalidDocument(format!("file is not a readable PDF: {error}"))
        })?;
        if pdf.is_encrypted() {
            return Err(ExtractError::InvalidDocument(
                "PDF is encrypted; remove the password and upload it again".to_string(),
            ));
        }

        let pages = pdf.get_pages();
        if pages.is_empty() {
            return Err(ExtractError::InvalidDocument("PDF has no pages".to_string()));
        }
        let page_count = u32::try_from(pages.len())
            .map_err(|_| ExtractError::InvalidDocument("PDF has too many pages".to_string()))?;
        let metadata = read_metadata(&pdf);

        info!(
            file = name,
            size = bytes.len(),
            page_count,
            path = %file.path().display(),
            "loaded PDF document"
        );

        Ok(Self {
            name: name.to_string(),
            bytes,
            file,
            pdf,
            page_count,
            metadata,
            page_texts: OnceLock::new(),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    #[must_use]
    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    #[must_use]
    pub fn metadata(&self) -> &DocumentMetadata {
        &self.metadata
    }

    pub(crate) fn pdf(&self) -> &lopdf::Document {
        &self.pdf
    }

    /// Text of one page as split by `pdf-extract`, computed once per document.
    pub(crate) fn extracted_page_text(&self, page_number: u32) -> Option<&str> {
        let pages = self.page_texts.get_or_init(|| {
            let split = panic::catch_unwind(AssertUnwindSafe(|| {
                pdf_extract::extract_text_from_mem_by_pages(&self.bytes)
            }));
            match split {
                Ok(Ok(pages)) => Some(pages),
                Ok(Err(error)) => {
                    debug!(name = %self.name, %error, "pdf-extract could not split pages");
                    None
                }
                Err(payload) => {
                    warn!(
                        name = %self.name,
                        reason = panic_message(&*payload),
                        "pdf-extract panicked; falling back to the content streams"
                    );
                    None
                }
            }
        });
        let index = usize::try_from(page_number.checked_sub(1)?).ok()?;
        pages.as_ref()?.get(index).map(String::as_str)
    }
}

fn resolve<'a>(pdf: &'a lopdf::Document, object: &'a Object) -> Option<&'a Object> {
    match object {
        Object::Reference(id) => pdf.get_object(*id).ok(),
        other => Some(other),
    }
}

fn decode_info_string(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE_u8, 0xFF]) {
        let (text, _) = UTF_16BE.decode_without_bom_handling(rest);
        return text.into_owned();
    }
    let (text, _) = WINDOWS_1252.decode_without_bom_handling(bytes);
    text.into_owned()
}

fn info_string(pdf: &lopdf::Document, info: &Dictionary, key: &[u8]) -> Option<String> {
    let object = resolve(pdf, info.get(key).ok()?)?;
    let Object::String(bytes, _) = object else {
        return None;
    };
    let text = decode_info_string(bytes).trim().to_string();
    (!text.is_empty()).then_some(text)
}

/// Turns `D:YYYYMMDDHHmmSS...` into ISO form, keeping the raw value otherwise.
pub(crate) fn format_pdf_date(raw: &str) -> String {
    let digits = raw
        .trim()
        .trim_start_matches("D:")
        .chars()
        .take_while(char::is_ascii_digit)
        .collect::<String>();
    let padded = match digits.len() {
        8 => format!("{digits}000000"),
        12 => format!("{digits}00"),
        14 => digits,
        _ => return raw.to_string(),
    };
    NaiveDateTime::parse_from_str(&padded, "%Y%m%d%H%M%S")
        .map(|date| date.format("%Y-%m-%dT%H:%M:%S").to_string())
        .unwrap_or_else(|_| raw.to_string())
}

#[allow(clippy::cast_precision_loss)]
fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(value) => Some(*value as f32),
        Object::Real(value) => Some(*value),
        _ => None,
    }
}

fn media_box(pdf: &lopdf::Document, page_id: ObjectId) -> Option<(f32, f32)> {
    let mut node = pdf.get_object(page_id).ok()?.as_dict().ok()?;
    for _ in 0..MAX_PARENT_DEPTH {
        if let Some(rect) = node
            .get(b"MediaBox")
            .ok()
            .and_then(|object| resolve(pdf, object))
            .and_then(|object| object.as_array().ok())
        {
            let values = rect.iter().filter_map(number).collect::<Vec<_>>();
            if values.len() == 4 {
                return Some(((values[2] - values[0]).abs(), (values[3] - values[1]).abs()));
            }
        }
        let parent = node.get(b"Parent").ok()?.as_reference().ok()?;
        node = pdf.get_object(parent).ok()?.as_dict().ok()?;
    }
    None
}

fn read_metadata(pdf: &lopdf::Document) -> DocumentMetadata {
    let info = pdf
        .trailer
        .get(b"Info")
        .ok()
        .and_then(|object| resolve(pdf, object))
        .and_then(|object| object.as_dict().ok());

    let page_sizes = pdf
        .get_pages()
        .into_iter()
        .filter_map(|(page, page_id)| {
            media_box(pdf, page_id).map(|(width, height)| PageSize {
                page,
                width,
                height,
            })
        })
        .collect();

    let Some(info) = info else {
        return DocumentMetadata {
            page_sizes,
            ..DocumentMetadata::default()
        };
    };

    DocumentMetadata {
        title: info_string(pdf, info, b"Title"),
        author: info_string(pdf, info, b"Author"),
        creator: info_string(pdf, info, b"Creator"),
        producer: info_string(pdf, info, b"Producer"),
        creation_date: info_string(pdf, info, b"CreationDate").map(|raw| format_pdf_date(&raw)),
        page_sizes,
    }
}
