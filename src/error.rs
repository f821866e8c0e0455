//! Error types for the AION agent runtime

use thiserror::Error;

/// Result type alias for agent-runtime operations
pub type Result<T> = std::result::Result<T, AgentError>;

#[derive(Error, Debug)]
pub enum AgentError {

    // =============================
    // Orchestration Errors
    // =============================

    #[error("Tool '{tool}' not found for agent '{agent}'")]
    ToolNotFound { agent: String, tool: String },

    #[error("Tool execution failed: {0}")]
    ToolExecution(String),

    #[error("Agent '{0}' is not recognized or not available")]
    UnrecognizedAgent(String),

    #[error("No final answer produced within {rounds} tool rounds")]
    IterationCapExceeded { rounds: u32 },

    #[error("Delegation depth limit reached at depth {0}")]
    DelegationDepthExceeded(u32),

    #[error("Inference gateway error: {0}")]
    Gateway(String),

    #[error("Invalid model response: {0}")]
    InvalidResponse(String),

    #[error("Database error: {0}")]
    Database(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
