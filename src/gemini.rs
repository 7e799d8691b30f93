use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::attachment::Attachment;

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-3-flash-preview";

pub const SYSTEM_PROMPT: &str = "\
You are EduAI, the assistant for a campus communication portal used by \
students and faculty of a technical-education college.
Be helpful, professional, and knowledgeable about:
1. Diploma engineering subjects (Civil, Mechanical, Computer, IT, E&TC).
2. Exam patterns and syllabus schemes.
3. General academic guidance and soft skills.
4. Administrative tasks for faculty, like formatting emails and scheduling.
You can answer in English, Hindi, and Marathi as requested.
Keep responses concise but informative.";

/// Fallback texts delivered in-band when the provider call fails. The
/// consumer always sees a finite, well-formed message rather than an error.
pub const INVALID_KEY_FALLBACK: &str =
    "Error: Invalid API key. Please verify your credentials.";
pub const INTERRUPTED_FALLBACK: &str =
    "Error: The connection was interrupted while streaming the response.";

/// Tagged stream output. `End` is emitted exactly once, on every path,
/// including failure and cancellation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Fragment(String),
    End,
}

#[derive(Debug, Error)]
enum StreamError {
    #[error("http {status}: {body}")]
    Http { status: StatusCode, body: String },
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(untagged)]
pub enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize, PartialEq)]
pub struct InlineData {
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    pub data: String,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "systemInstruction")]
    system_instruction: Content,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

/// Assembles the request parts for one generation call. Image and PDF
/// attachments go first as inline binary; text attachments are decoded and
/// appended as literal context (decode failure is logged and the request
/// proceeds without that content); any other type becomes a note.
pub fn build_parts(prompt: &str, context: &str, attachment: Option<&Attachment>) -> Vec<Part> {
    let mut parts = vec![Part::Text {
        text: format!("{context}\n\nUser query: {prompt}"),
    }];

    if let Some(att) = attachment {
        if att.is_inline_binary() {
            parts.insert(
                0,
                Part::InlineData {
                    inline_data: InlineData {
                        mime_type: att.mime_type.clone(),
                        data: att.data.clone(),
                    },
                },
            );
        } else if att.is_text() {
            match att.decode_data() {
                Ok(bytes) => parts.push(Part::Text {
                    text: format!(
                        "\n\n[Attached document: {}]\n{}",
                        att.name,
                        String::from_utf8_lossy(&bytes)
                    ),
                }),
                Err(err) => {
                    warn!(name = %att.name, %err, "failed to decode text attachment, sending without it");
                }
            }
        } else {
            parts.push(Part::Text {
                text: format!(
                    "\n\n[Note: the user attached a file named \"{}\" of type {}.]",
                    att.name, att.mime_type
                ),
            });
        }
    }

    parts
}

fn fallback_for(err: &StreamError) -> &'static str {
    match err {
        StreamError::Http { status, body }
            if matches!(status.as_u16(), 401 | 403) || body.contains("API_KEY_INVALID") =>
        {
            INVALID_KEY_FALLBACK
        }
        _ => INTERRUPTED_FALLBACK,
    }
}

/// Text fragments carried by one SSE data frame.
fn frame_texts(value: &Value) -> Vec<String> {
    let Some(parts) = value
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };
    parts
        .iter()
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn from_env() -> Option<Self> {
        std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .map(|k| Self::new(&k))
    }

    /// Starts one streaming generation call. The returned receiver yields
    /// fragments in provider order and terminates with `End` on every path;
    /// provider failures are converted to a single classified fallback
    /// fragment. The sequence is finite, non-restartable, single-consumer.
    ///
    /// There is deliberately no timeout or retry; `cancel` is the only way
    /// to stop consumption early.
    pub fn stream_generate(
        &self,
        prompt: &str,
        context: &str,
        attachment: Option<Attachment>,
        cancel: CancellationToken,
    ) -> mpsc::UnboundedReceiver<StreamEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let this = self.clone();
        let prompt = prompt.to_string();
        let context = context.to_string();
        tokio::spawn(async move {
            if let Err(err) = this
                .run_stream(&prompt, &context, attachment.as_ref(), &cancel, &tx)
                .await
            {
                error!(%err, "gemini stream failed");
                let _ = tx.send(StreamEvent::Fragment(fallback_for(&err).to_string()));
            }
            let _ = tx.send(StreamEvent::End);
        });
        rx
    }

    async fn run_stream(
        &self,
        prompt: &str,
        context: &str,
        attachment: Option<&Attachment>,
        cancel: &CancellationToken,
        tx: &mpsc::UnboundedSender<StreamEvent>,
    ) -> Result<(), StreamError> {
        let url = format!(
            "{BASE_URL}/models/{}:streamGenerateContent?alt=sse&key={}",
            self.model, self.api_key
        );
        let body = GenerateRequest {
            contents: vec![Content {
                parts: build_parts(prompt, context, attachment),
            }],
            system_instruction: Content {
                parts: vec![Part::Text {
                    text: SYSTEM_PROMPT.to_string(),
                }],
            },
            generation_config: GenerationConfig { temperature: 0.7 },
        };

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StreamError::Http { status, body });
        }

        let mut buf: Vec<u8> = Vec::new();
        let mut stream = response.bytes_stream();
        loop {
            let chunk = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("stream cancelled");
                    break;
                }
                chunk = stream.next() => match chunk {
                    Some(chunk) => chunk?,
                    None => break,
                },
            };
            buf.extend_from_slice(&chunk);
            while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = buf.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&line);
                let Some(data) = line.strip_prefix("data:") else {
                    continue;
                };
                let data = data.trim();
                if data.is_empty() || data == "[DONE]" {
                    continue;
                }
                let Ok(value) = serde_json::from_str::<Value>(data) else {
                    continue;
                };
                for text in frame_texts(&value) {
                    if tx.send(StreamEvent::Fragment(text)).is_err() {
                        // Receiver dropped; nothing left to deliver to.
                        return Ok(());
                    }
                }
            }
        }
        Ok(())
    }
}
