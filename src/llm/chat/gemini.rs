use async_trait::async_trait;
use log::info;
use reqwest::Client as HttpClient;
use serde::{ Deserialize, Serialize };
use url::Url;

use super::{ http_stream_generate, ChatClient, FragmentStream, ProviderTurn, TextPart };
use crate::llm::{ LlmConfig, LlmError, DEFAULT_GEMINI_BASE_URL, DEFAULT_GEMINI_MODEL };

#[derive(Serialize)]
struct GeminiStreamRequest<'a> {
    contents: &'a [ProviderTurn],
    #[serde(rename = "systemInstruction")]
    system_instruction: GeminiSystemInstruction,
}

#[derive(Serialize)]
struct GeminiSystemInstruction {
    parts: Vec<TextPart>,
}

#[derive(Deserialize)]
struct GoogleChunk {
    #[serde(default)]
    candidates: Vec<GoogleCandidate>,
    error: Option<GoogleErrorDetail>,
}

#[derive(Deserialize)]
struct GoogleCandidate {
    content: Option<GoogleContent>,
}

#[derive(Deserialize)]
struct GoogleContent {
    #[serde(default)]
    parts: Vec<GooglePart>,
}

#[derive(Deserialize)]
struct GooglePart {
    text: Option<String>,
}

#[derive(Deserialize)]
struct GoogleErrorBody {
    error: GoogleErrorDetail,
}

#[derive(Deserialize)]
struct GoogleErrorDetail {
    #[serde(default)]
    code: Option<u16>,
    message: String,
}

/// Extracts the text of one `data:` line of a `streamGenerateContent?alt=sse`
/// response. Chunks carrying no text (finish reasons, safety ratings) yield
/// nothing; an `error` chunk ends the stream with that error.
fn parse_gemini_line(line: &str) -> Result<Option<String>, LlmError> {
    let Some(data) = line.trim().strip_prefix("data:").map(str::trim) else {
        return Ok(None);
    };
    if data.is_empty() {
        return Ok(None);
    }
    let Ok(chunk) = serde_json::from_str::<GoogleChunk>(data) else {
        return Ok(None);
    };

    if let Some(err) = chunk.error {
        return Err(LlmError::Api {
            status: err.code.unwrap_or(500),
            message: err.message,
        });
    }

    let text: String = chunk.candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    Ok(if text.is_empty() { None } else { Some(text) })
}

fn parse_gemini_error(body: &str) -> Option<String> {
    serde_json::from_str::<GoogleErrorBody>(body).ok().map(|b| b.error.message)
}

pub struct GeminiChatClient {
    http: HttpClient,
    api_key: String,
    model: String,
    base_url: Url,
}

impl GeminiChatClient {
    pub fn new(
        api_key: String,
        model: Option<String>,
        base_url: Option<String>
    ) -> Result<Self, LlmError> {
        if api_key.trim().is_empty() {
            return Err(LlmError::Config("Gemini API key is required".to_string()));
        }
        let chat_model = model.unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string());
        let raw_url = base_url.unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string());
        let base_url = Url::parse(raw_url.trim_end_matches('/')).map_err(|e|
            LlmError::Config(format!("invalid Gemini base URL '{}': {}", raw_url, e))
        )?;

        Ok(Self {
            http: HttpClient::new(),
            api_key,
            model: chat_model,
            base_url,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        Self::new(config.api_key.clone(), config.completion_model.clone(), config.base_url.clone())
    }

    fn stream_url(&self) -> String {
        format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url.as_str().trim_end_matches('/'),
            self.model
        )
    }
}

#[async_trait]
impl ChatClient for GeminiChatClient {
    async fn stream_generate(
        &self,
        turns: &[ProviderTurn],
        system_instruction: &str
    ) -> Result<FragmentStream, LlmError> {
        info!("GeminiChatClient::stream_generate() → model={} turns={}", self.model, turns.len());

        let payload = GeminiStreamRequest {
            contents: turns,
            system_instruction: GeminiSystemInstruction {
                parts: vec![TextPart { text: system_instruction.to_string() }],
            },
        };

        let request = self.http
            .post(self.stream_url())
            .header("x-goog-api-key", &self.api_key)
            .json(&payload);

        http_stream_generate(request, parse_gemini_line, parse_gemini_error).await
    }

    fn get_model(&self) -> String {
        self.model.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::chat::ProviderRole;
    use wiremock::matchers::{ body_json, header, method, path, query_param };
    use wiremock::{ Mock, MockServer, ResponseTemplate };

    fn client_for(server: &MockServer) -> GeminiChatClient {
        GeminiChatClient::new(
            "test-key".to_string(),
            Some("gemini-test".to_string()),
            Some(server.uri())
        ).unwrap()
    }

    fn sse(chunks: &[serde_json::Value]) -> String {
        chunks
            .iter()
            .map(|c| format!("data: {}\r\n\r\n", c))
            .collect()
    }

    fn text_chunk(text: &str) -> serde_json::Value {
        serde_json::json!({
            "candidates": [{ "content": { "role": "model", "parts": [{ "text": text }] } }]
        })
    }

    #[test]
    fn parses_text_from_data_line() {
        let line = format!("data: {}", text_chunk("Hello"));
        assert_eq!(parse_gemini_line(&line).unwrap(), Some("Hello".to_string()));
    }

    #[test]
    fn ignores_lines_without_text() {
        assert_eq!(parse_gemini_line("").unwrap(), None);
        assert_eq!(parse_gemini_line(": keep-alive").unwrap(), None);
        assert_eq!(
            parse_gemini_line(r#"data: {"candidates":[{"finishReason":"STOP"}]}"#).unwrap(),
            None
        );
        assert_eq!(parse_gemini_line(r#"data: {"usageMetadata":{}}"#).unwrap(), None);
        assert_eq!(parse_gemini_line("data: {not json").unwrap(), None);
    }

    #[test]
    fn error_chunk_becomes_api_error() {
        let line = r#"data: {"error":{"code":503,"message":"The model is overloaded.","status":"UNAVAILABLE"}}"#;
        match parse_gemini_line(line) {
            Err(LlmError::Api { status, message }) => {
                assert_eq!(status, 503);
                assert_eq!(message, "The model is overloaded.");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn joins_multiple_parts_of_one_chunk() {
        let line = r#"data: {"candidates":[{"content":{"parts":[{"text":"a"},{"text":"b"}]}}]}"#;
        assert_eq!(parse_gemini_line(line).unwrap(), Some("ab".to_string()));
    }

    #[test]
    fn extracts_google_error_message() {
        let body = r#"{"error":{"code":400,"message":"API key not valid. Please pass a valid API key.","status":"INVALID_ARGUMENT"}}"#;
        assert_eq!(
            parse_gemini_error(body).as_deref(),
            Some("API key not valid. Please pass a valid API key.")
        );
        assert_eq!(parse_gemini_error("<html>"), None);
    }

    #[test]
    fn rejects_empty_api_key() {
        assert!(matches!(GeminiChatClient::new(" ".into(), None, None), Err(LlmError::Config(_))));
    }

    #[tokio::test]
    async fn streams_and_concatenates_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-test:streamGenerateContent"))
            .and(query_param("alt", "sse"))
            .and(header("x-goog-api-key", "test-key"))
            .and(
                body_json(
                    serde_json::json!({
                        "contents": [{ "role": "user", "parts": [{ "text": "Hi" }] }],
                        "systemInstruction": { "parts": [{ "text": "Be nice." }] }
                    })
                )
            )
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(
                    sse(&[text_chunk("Hello"), text_chunk(", "), text_chunk("there!")]),
                    "text/event-stream"
                )
            )
            .mount(&server).await;

        let client = client_for(&server);
        let turns = vec![ProviderTurn::text(ProviderRole::User, "Hi")];
        let reply = client.generate(&turns, "Be nice.").await.unwrap();
        assert_eq!(reply, "Hello, there!");
    }

    #[tokio::test]
    async fn error_event_after_text_aborts_with_partial() {
        let server = MockServer::start().await;
        let error_chunk = serde_json::json!({
            "error": { "code": 500, "message": "An internal error has occurred", "status": "INTERNAL" }
        });
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(
                    sse(&[text_chunk("Hello"), error_chunk, text_chunk("never sent")]),
                    "text/event-stream"
                )
            )
            .mount(&server).await;

        let client = client_for(&server);
        let turns = vec![ProviderTurn::text(ProviderRole::User, "Hi")];
        match client.generate(&turns, "sys").await {
            Err(LlmError::StreamAborted { partial, message }) => {
                assert_eq!(partial, "Hello");
                assert_eq!(message, "An internal error has occurred");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn error_event_before_text_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(
                    sse(&[serde_json::json!({ "error": { "code": 429, "message": "Quota exceeded" } })]),
                    "text/event-stream"
                )
            )
            .mount(&server).await;

        let client = client_for(&server);
        let err = client.generate(&[], "sys").await.unwrap_err();
        assert!(matches!(err, LlmError::Api { status: 429, .. }));
    }

    #[tokio::test]
    async fn non_success_status_carries_provider_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(429).set_body_raw(
                    r#"{"error":{"code":429,"message":"Quota exceeded for quota metric","status":"RESOURCE_EXHAUSTED"}}"#,
                    "application/json"
                )
            )
            .mount(&server).await;

        let client = client_for(&server);
        let turns = vec![ProviderTurn::text(ProviderRole::User, "Hi")];
        match client.generate(&turns, "sys").await {
            Err(LlmError::Api { status, message }) => {
                assert_eq!(status, 429);
                assert_eq!(message, "Quota exceeded for quota metric");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unparseable_error_body_is_passed_through() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
            .mount(&server).await;

        let client = client_for(&server);
        let err = client.generate(&[], "sys").await.unwrap_err();
        assert_eq!(err.provider_message(), "upstream unavailable");
    }
}
