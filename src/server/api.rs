use axum::{ extract::State, routing::post, Json, Router };
use log::info;
use tower::ServiceBuilder;
use tower_http::cors::{ Any, CorsLayer };
use uuid::Uuid;

use crate::agent::ChatAgent;
use crate::error::ChatError;
use crate::models::api::{ ChatRequest, ChatResponse };

#[derive(Clone)]
struct AppState {
    agent: ChatAgent,
}

pub fn router(agent: ChatAgent) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/chat/", post(chat_handler))
        .route("/chat", post(chat_handler))
        .layer(ServiceBuilder::new().layer(cors))
        .with_state(AppState { agent })
}

async fn chat_handler(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>
) -> Result<Json<ChatResponse>, ChatError> {
    let conversation_id = if req.conversation_id.trim().is_empty() {
        let generated = Uuid::new_v4().to_string();
        info!("No conversation id supplied, assigned '{}'", generated);
        generated
    } else {
        req.conversation_id
    };

    let response = state.agent.process_message(&conversation_id, &req.role, &req.message).await?;

    Ok(Json(ChatResponse { response, conversation_id }))
}
