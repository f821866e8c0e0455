//! Specialized worker agents
//!
//! Each module owns one agent: its canonical definition, its tools, and
//! its [`AgentHandler`](crate::router::AgentHandler) implementation. The
//! composition root registers them all at bootstrap.

pub mod advisor;
pub mod budget;
pub mod chatbot;
pub mod coordinator;
pub mod expense;
pub mod onboarding;
