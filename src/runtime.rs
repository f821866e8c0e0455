//! Composition root
//!
//! Owns the registry, stores, gateway, and directory, and wires every
//! agent's definition, tools, and handler together. All shared state
//! lives here and is passed by handle; nothing in the crate is a global.

use crate::agents;
use crate::finance::FinanceStore;
use crate::gateway::InferenceGateway;
use crate::history::HistoryStore;
use crate::models::{CallContext, InvocationResult};
use crate::orchestrator::Orchestrator;
use crate::registry::AgentRegistry;
use crate::router::AgentDirectory;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

pub struct AgentRuntime {
    pub registry: Arc<AgentRegistry>,
    pub history: Arc<dyn HistoryStore>,
    pub gateway: Arc<dyn InferenceGateway>,
    pub finance: Arc<FinanceStore>,
    pub directory: Arc<AgentDirectory>,
    pub orchestrator: Arc<Orchestrator>,
}

impl AgentRuntime {
    pub fn new(history: Arc<dyn HistoryStore>, gateway: Arc<dyn InferenceGateway>) -> Self {
        let registry = Arc::new(AgentRegistry::new());
        let finance = Arc::new(FinanceStore::new());
        let directory = Arc::new(AgentDirectory::new());
        let orchestrator = Arc::new(Orchestrator::new(
            registry.clone(),
            history.clone(),
            gateway.clone(),
        ));

        Self {
            registry,
            history,
            gateway,
            finance,
            directory,
            orchestrator,
        }
    }

    /// Register every agent's definition, tools, and handler. Idempotent:
    /// definitions heal drift, tool registration is a no-op on repeat.
    pub async fn bootstrap(&self) {
        agents::budget::register(self).await;
        agents::expense::register(self).await;
        agents::advisor::register(self).await;
        agents::coordinator::register(self).await;
        agents::chatbot::register(self).await;
        agents::onboarding::register(self).await;

        let agents = self.directory.names().await;
        info!(?agents, "Agent runtime bootstrapped");
    }

    /// Entry point for external callers: route a user message to a named
    /// agent through the uniform worker contract.
    pub async fn process(
        &self,
        agent_name: &str,
        user_id: Uuid,
        message: &str,
    ) -> InvocationResult {
        let Some(handler) = self.directory.get(agent_name).await else {
            return InvocationResult::error(
                crate::error::AgentError::UnrecognizedAgent(agent_name.to_string()).to_string(),
            );
        };

        let ctx = CallContext::new(user_id, agent_name);
        handler.process(&ctx, message).await
    }
}
