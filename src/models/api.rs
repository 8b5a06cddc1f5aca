use serde::{ Deserialize, Serialize };

fn default_role() -> String {
    "user".to_string()
}

#[derive(Deserialize, Debug, Clone)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default = "default_role")]
    pub role: String,
    /// Left empty by clients that want the server to assign an id.
    #[serde(default)]
    pub conversation_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ChatResponse {
    pub response: String,
    pub conversation_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ErrorResponse {
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub partial_response: Option<String>,
}
