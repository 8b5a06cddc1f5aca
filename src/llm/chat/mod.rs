pub mod gemini;

use async_trait::async_trait;
use futures::{ Stream, StreamExt };
use log::debug;
use serde::{ Deserialize, Serialize };
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;

use self::gemini::GeminiChatClient;
use super::{ LlmConfig, LlmError };

pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderRole {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextPart {
    pub text: String,
}

/// One entry of the provider-side dialogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderTurn {
    pub role: ProviderRole,
    pub parts: Vec<TextPart>,
}

impl ProviderTurn {
    pub fn text(role: ProviderRole, text: impl Into<String>) -> Self {
        Self {
            role,
            parts: vec![TextPart { text: text.into() }],
        }
    }
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Starts a generation over `turns` with `system_instruction` passed out of
    /// band. Fragments arrive in delivery order.
    async fn stream_generate(
        &self,
        turns: &[ProviderTurn],
        system_instruction: &str
    ) -> Result<FragmentStream, LlmError>;

    fn get_model(&self) -> String;

    /// Runs a generation to completion and joins the fragments.
    async fn generate(
        &self,
        turns: &[ProviderTurn],
        system_instruction: &str
    ) -> Result<String, LlmError> {
        let stream = self.stream_generate(turns, system_instruction).await?;
        collect_fragments(stream).await
    }
}

/// Concatenates fragments in order. If the stream fails after text has
/// arrived, the text so far is kept in [`LlmError::StreamAborted`].
pub async fn collect_fragments(mut stream: FragmentStream) -> Result<String, LlmError> {
    let mut text = String::new();
    let mut fragments = 0usize;
    while let Some(item) = stream.next().await {
        match item {
            Ok(fragment) => {
                fragments += 1;
                text.push_str(&fragment);
            }
            Err(e) if text.is_empty() => {
                return Err(e);
            }
            Err(e) => {
                return Err(LlmError::StreamAborted {
                    partial: text,
                    message: e.provider_message(),
                });
            }
        }
    }
    debug!("Collected {} fragments ({} bytes)", fragments, text.len());
    Ok(text)
}

pub fn new_client(config: &LlmConfig) -> Result<Arc<dyn ChatClient>, LlmError> {
    let client = GeminiChatClient::from_config(config)?;
    Ok(Arc::new(client))
}

/// Parses one response line: `Ok(None)` skips it, `Err` ends the stream.
pub type LineParser = fn(&str) -> Result<Option<String>, LlmError>;

/// Sends the request and streams the response body line by line through
/// `line_parser`.
///
/// Non-success statuses come back as [`LlmError::Api`] with the message
/// extracted by `error_parser`. Dropping the returned stream stops the reader.
pub async fn http_stream_generate(
    request: reqwest::RequestBuilder,
    line_parser: LineParser,
    error_parser: fn(&str) -> Option<String>
) -> Result<FragmentStream, LlmError> {
    let resp = request.send().await?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        let message = error_parser(&body).unwrap_or_else(|| {
            if body.trim().is_empty() { status.to_string() } else { body.trim().to_string() }
        });
        return Err(LlmError::Api { status: status.as_u16(), message });
    }

    let (stream, _reader) = spawn_line_reader(resp.bytes_stream(), line_parser);
    Ok(stream)
}

/// Reads `bytes` on a background task and forwards parsed fragments.
///
/// Lines are split on `\n` after buffering raw bytes, so lines and multi-byte
/// characters broken across chunks arrive whole. The task exits once the
/// returned stream is dropped, the body ends, or a line or chunk fails.
pub fn spawn_line_reader<S, B, E>(
    mut bytes: S,
    line_parser: LineParser
) -> (FragmentStream, JoinHandle<()>)
    where
        S: Stream<Item = Result<B, E>> + Unpin + Send + 'static,
        B: AsRef<[u8]> + Send + 'static,
        E: Into<LlmError> + Send + 'static
{
    let (tx, rx) = mpsc::channel(32);

    let reader = tokio::spawn(async move {
        let mut buffer: Vec<u8> = Vec::new();

        loop {
            let chunk = tokio::select! {
                _ = tx.closed() => {
                    debug!("Fragment receiver dropped, stopping provider stream");
                    return;
                }
                chunk = bytes.next() => chunk,
            };

            let lines: Vec<String> = match chunk {
                Some(Ok(buf)) => {
                    buffer.extend_from_slice(buf.as_ref());
                    let mut complete = Vec::new();
                    while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                        let line: Vec<u8> = buffer.drain(..=pos).collect();
                        complete.push(String::from_utf8_lossy(&line).into_owned());
                    }
                    complete
                }
                Some(Err(e)) => {
                    if tx.send(Err(e.into())).await.is_err() {
                        debug!("Fragment receiver dropped before body error was delivered");
                    }
                    return;
                }
                None if buffer.is_empty() => {
                    return;
                }
                None => vec![String::from_utf8_lossy(&std::mem::take(&mut buffer)).into_owned()],
            };

            for line in lines {
                let item = match line_parser(line.trim_end()) {
                    Ok(Some(tok)) => Ok(tok),
                    Ok(None) => continue,
                    Err(e) => Err(e),
                };
                let failed = item.is_err();
                if tx.send(item).await.is_err() {
                    debug!("Fragment receiver dropped, stopping provider stream");
                    return;
                }
                if failed {
                    return;
                }
            }
        }
    });

    (Box::pin(ReceiverStream::new(rx)), reader)
}
