use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error("could not read \"{name}\": {source}")]
    Unreadable {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// A file staged for sending, fully held in memory. Immutable once created;
/// it is attached to exactly one outgoing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub mime_type: String,
    /// Base64-encoded file contents.
    pub data: String,
    /// Human-readable size, kilobytes with one decimal place.
    pub size_label: String,
}

impl Attachment {
    /// Reads the whole file into memory and encodes it. No size limit is
    /// enforced here and there is no retry; a failed read is surfaced to the
    /// user before send.
    pub fn from_file(path: &Path) -> Result<Self, AttachmentError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let bytes = fs::read(path).map_err(|source| AttachmentError::Unreadable {
            name: name.clone(),
            source,
        })?;
        Ok(Self::from_bytes(name, mime_for_path(path), &bytes))
    }

    pub fn from_bytes(name: String, mime_type: String, bytes: &[u8]) -> Self {
        Self {
            name,
            mime_type,
            data: BASE64.encode(bytes),
            size_label: size_label(bytes.len()),
        }
    }

    pub fn decode_data(&self) -> Result<Vec<u8>, base64::DecodeError> {
        BASE64.decode(&self.data)
    }

    /// Self-describing transport form, `data:<mime>;base64,<data>`.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }

    /// Image and PDF payloads are sent to the model as inline binary.
    pub fn is_inline_binary(&self) -> bool {
        self.mime_type.starts_with("image/") || self.mime_type == "application/pdf"
    }

    /// Text payloads are decoded and sent as literal context.
    pub fn is_text(&self) -> bool {
        self.mime_type.starts_with("text/")
    }
}

fn size_label(bytes: usize) -> String {
    format!("{:.1} KB", bytes as f64 / 1024.0)
}

pub fn mime_for_path(path: &Path) -> String {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "m4a" => "audio/mp4",
        "pdf" => "application/pdf",
        "txt" | "log" => "text/plain",
        "md" => "text/markdown",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        _ => "application/octet-stream",
    }
    .to_string()
}
