pub mod agent;
pub mod cli;
pub mod error;
pub mod history;
pub mod llm;
pub mod models;
pub mod server;

use agent::ChatAgent;
use cli::Args;
use log::{ error, info };
use server::Server;
use std::error::Error;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    if args.gemini_api_key.trim().is_empty() {
        error!("GEMINI_API_KEY is set but empty");
        return Err("API key for Gemini (GEMINI_API_KEY) is missing".into());
    }

    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("Chat Model: {}", args.chat_model);
    info!("Chat Base URL: {}", args.chat_base_url);
    info!("Provider Timeout (s): {}", args.provider_timeout_secs);
    info!("Failed Turn Policy: {}", args.failed_turn_policy);
    info!("System Prompt: {}", args.system_prompt);
    info!("TLS Enabled: {}", args.enable_tls);
    info!("-------------------------");

    let agent = ChatAgent::new(&args)?;
    info!("Starting server on: {}", args.server_addr);
    let server = Server::new(args.server_addr.clone(), agent, args);
    server.run().await?;

    Ok(())
}
