use aion_agents::agents;
use aion_agents::gateway::GeminiGateway;
use aion_agents::history::{HistoryStore, InMemoryHistoryStore, PostgresHistoryStore};
use aion_agents::models::InvocationResult;
use aion_agents::runtime::AgentRuntime;
use std::io::{BufRead, Write};
use std::sync::Arc;
use tracing::{info, warn};

/// Derive a stable UUID from an external username so repeated sessions
/// hit the same conversation history.
fn stable_uuid_from_string(input: &str) -> uuid::Uuid {
    use sha2::{Digest, Sha256};

    let hash = Sha256::digest(input.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hash[..16]);

    // Set UUID version (4) and variant (RFC4122) bits.
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    uuid::Uuid::from_bytes(bytes)
}

fn build_history_store() -> Arc<dyn HistoryStore> {
    let database_url = std::env::var("POSTGRES_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .ok();

    if let Some(url) = database_url {
        match PostgresHistoryStore::connect_lazy(&url) {
            Ok(store) => {
                info!("Conversation history backend: postgres");
                return Arc::new(store);
            }
            Err(error) => {
                warn!(
                    "Failed to initialize postgres history backend, falling back to in-memory: {}",
                    error
                );
            }
        }
    }

    info!("Conversation history backend: in-memory");
    Arc::new(InMemoryHistoryStore::new())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    // Load environment variables
    dotenv::dotenv().ok();

    let gemini_api_key = std::env::var("GEMINI_API_KEY").unwrap_or_else(|_| {
        eprintln!("⚠️  GEMINI_API_KEY not set in .env");
        eprintln!("📌 Gateway calls will fail until it is configured");
        String::new()
    });

    let history = build_history_store();
    let gateway = Arc::new(GeminiGateway::new(gemini_api_key));

    let runtime = AgentRuntime::new(history, gateway);
    runtime.bootstrap().await;

    let username = std::env::var("AION_USER").unwrap_or_else(|_| "demo_user".to_string());
    let user_id = stable_uuid_from_string(&username);

    info!(user = %username, "AION chat ready");
    println!("AION personal-finance assistant");
    println!("Talking to {} as '{}' — Ctrl-D to exit.", agents::chatbot::NAME, username);

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();

    loop {
        print!("> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let message = line.trim();
        if message.is_empty() {
            continue;
        }

        match runtime.process(agents::chatbot::NAME, user_id, message).await {
            InvocationResult::Success { data } => {
                let reply = data
                    .get("message")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
                    .unwrap_or_else(|| data.to_string());
                println!("{}\n", reply);
            }
            InvocationResult::Error { message } => {
                eprintln!("error: {}\n", message);
            }
        }
    }

    println!("\nGoodbye!");
    Ok(())
}
