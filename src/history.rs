//! Conversation history storage
//!
//! Append-only ordered log of turns per (agent, user) pair. The in-memory
//! backend serves development and tests; the Postgres backend persists the
//! log durably with lazily initialized schema. Appends are linearizable
//! per pair: the in-memory store appends under a single write lock, the
//! Postgres store relies on a sequence column so same-millisecond inserts
//! keep their order.

use crate::error::AgentError;
use crate::models::{Turn, TurnKind};
use crate::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use tokio::sync::{OnceCell, RwLock};
use uuid::Uuid;

/// Interface to the conversation log.
#[async_trait::async_trait]
pub trait HistoryStore: Send + Sync {
    /// Ordered turns for one (agent, user) pair, oldest first.
    async fn history(&self, agent: &str, user_id: Uuid) -> Result<Vec<Turn>>;

    /// Durable append. A storage failure propagates as a fatal error and
    /// is never silently dropped.
    async fn append(&self, agent: &str, user_id: Uuid, kind: TurnKind) -> Result<Turn>;

    /// Irreversible deletion of all turns for the pair; explicit reset
    /// only, never called by the orchestration loop.
    async fn clear(&self, agent: &str, user_id: Uuid) -> Result<()>;
}

//
// ================= In-Memory =================
//

pub struct InMemoryHistoryStore {
    turns: RwLock<HashMap<(String, Uuid), Vec<Turn>>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self {
            turns: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryHistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn history(&self, agent: &str, user_id: Uuid) -> Result<Vec<Turn>> {
        let turns = self.turns.read().await;
        Ok(turns
            .get(&(agent.to_string(), user_id))
            .cloned()
            .unwrap_or_default())
    }

    async fn append(&self, agent: &str, user_id: Uuid, kind: TurnKind) -> Result<Turn> {
        let turn = Turn::new(agent, user_id, kind);
        let mut turns = self.turns.write().await;
        turns
            .entry((agent.to_string(), user_id))
            .or_default()
            .push(turn.clone());
        Ok(turn)
    }

    async fn clear(&self, agent: &str, user_id: Uuid) -> Result<()> {
        let mut turns = self.turns.write().await;
        turns.remove(&(agent.to_string(), user_id));
        Ok(())
    }
}

//
// ================= Postgres =================
//

pub struct PostgresHistoryStore {
    pool: PgPool,
    schema_ready: OnceCell<()>,
}

impl PostgresHistoryStore {
    /// Build a store over a lazily connected pool; the first query opens
    /// the connection and creates the schema.
    pub fn connect_lazy(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(database_url)
            .map_err(|e| AgentError::Database(format!("Failed to configure pool: {}", e)))?;

        Ok(Self {
            pool,
            schema_ready: OnceCell::new(),
        })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            schema_ready: OnceCell::new(),
        }
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.schema_ready
            .get_or_try_init(|| async {
                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS agent_turns (
                      seq BIGSERIAL PRIMARY KEY,
                      turn_id UUID NOT NULL,
                      agent_name TEXT NOT NULL,
                      user_id UUID NOT NULL,
                      role TEXT NOT NULL,
                      payload TEXT NOT NULL,
                      created_at TIMESTAMPTZ NOT NULL
                    );
                    "#,
                )
                .execute(&self.pool)
                .await?;

                sqlx::query(
                    r#"
                    CREATE INDEX IF NOT EXISTS idx_agent_turns_pair
                    ON agent_turns (agent_name, user_id, seq);
                    "#,
                )
                .execute(&self.pool)
                .await?;

                Ok::<(), sqlx::Error>(())
            })
            .await
            .map_err(|e| {
                AgentError::Database(format!("Failed to initialize history schema: {}", e))
            })?;

        Ok(())
    }
}

fn db_err(context: &str, e: sqlx::Error) -> AgentError {
    AgentError::Database(format!("{}: {}", context, e))
}

#[async_trait::async_trait]
impl HistoryStore for PostgresHistoryStore {
    async fn history(&self, agent: &str, user_id: Uuid) -> Result<Vec<Turn>> {
        self.ensure_schema().await?;

        let rows = sqlx::query(
            r#"
            SELECT turn_id, payload, created_at
            FROM agent_turns
            WHERE agent_name = $1 AND user_id = $2
            ORDER BY seq ASC
            "#,
        )
        .bind(agent)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_err("Failed to load history", e))?;

        let mut turns = Vec::with_capacity(rows.len());
        for row in rows {
            let payload: String = row
                .try_get("payload")
                .map_err(|e| db_err("Missing payload column", e))?;
            let kind: TurnKind = serde_json::from_str(&payload)
                .map_err(|e| AgentError::Database(format!("Corrupt turn payload: {}", e)))?;

            turns.push(Turn {
                turn_id: row
                    .try_get("turn_id")
                    .map_err(|e| db_err("Missing turn_id column", e))?,
                agent: agent.to_string(),
                user_id,
                kind,
                timestamp: row
                    .try_get("created_at")
                    .map_err(|e| db_err("Missing created_at column", e))?,
            });
        }

        Ok(turns)
    }

    async fn append(&self, agent: &str, user_id: Uuid, kind: TurnKind) -> Result<Turn> {
        self.ensure_schema().await?;

        let turn = Turn::new(agent, user_id, kind);
        let payload = serde_json::to_string(&turn.kind)?;

        sqlx::query(
            r#"
            INSERT INTO agent_turns (turn_id, agent_name, user_id, role, payload, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(turn.turn_id)
        .bind(agent)
        .bind(user_id)
        .bind(turn.kind.role().to_string())
        .bind(payload)
        .bind(turn.timestamp)
        .execute(&self.pool)
        .await
        .map_err(|e| db_err("Failed to append turn", e))?;

        Ok(turn)
    }

    async fn clear(&self, agent: &str, user_id: Uuid) -> Result<()> {
        self.ensure_schema().await?;

        sqlx::query("DELETE FROM agent_turns WHERE agent_name = $1 AND user_id = $2")
            .bind(agent)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| db_err("Failed to clear history", e))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TurnRole;

    #[tokio::test]
    async fn test_history_preserves_append_order() {
        let store = InMemoryHistoryStore::new();
        let user_id = Uuid::new_v4();

        for i in 0..5 {
            store
                .append(
                    "chatbot_agent",
                    user_id,
                    TurnKind::UserText {
                        text: format!("message {}", i),
                    },
                )
                .await
                .unwrap();
        }

        let turns = store.history("chatbot_agent", user_id).await.unwrap();
        assert_eq!(turns.len(), 5);
        for (i, turn) in turns.iter().enumerate() {
            assert_eq!(
                turn.kind,
                TurnKind::UserText {
                    text: format!("message {}", i)
                }
            );
        }
        // Timestamps are non-decreasing in append order.
        for pair in turns.windows(2) {
            assert!(pair[0].timestamp <= pair[1].timestamp);
        }
    }

    #[tokio::test]
    async fn test_histories_are_scoped_per_pair() {
        let store = InMemoryHistoryStore::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        store
            .append("chatbot_agent", alice, TurnKind::UserText { text: "hi".into() })
            .await
            .unwrap();
        store
            .append("budget_agent", alice, TurnKind::UserText { text: "rent".into() })
            .await
            .unwrap();

        assert_eq!(store.history("chatbot_agent", alice).await.unwrap().len(), 1);
        assert_eq!(store.history("budget_agent", alice).await.unwrap().len(), 1);
        assert!(store.history("chatbot_agent", bob).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clear_removes_only_the_pair() {
        let store = InMemoryHistoryStore::new();
        let user_id = Uuid::new_v4();

        store
            .append("chatbot_agent", user_id, TurnKind::UserText { text: "hi".into() })
            .await
            .unwrap();
        store
            .append(
                "chatbot_agent",
                user_id,
                TurnKind::ModelText { text: "hello".into() },
            )
            .await
            .unwrap();
        store
            .append("budget_agent", user_id, TurnKind::UserText { text: "rent".into() })
            .await
            .unwrap();

        store.clear("chatbot_agent", user_id).await.unwrap();

        assert!(store.history("chatbot_agent", user_id).await.unwrap().is_empty());
        assert_eq!(store.history("budget_agent", user_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_append_returns_projected_role() {
        let store = InMemoryHistoryStore::new();
        let user_id = Uuid::new_v4();

        let turn = store
            .append(
                "chatbot_agent",
                user_id,
                TurnKind::ToolResult {
                    name: "call_advisor".into(),
                    result: crate::models::InvocationResult::success(serde_json::json!({})),
                },
            )
            .await
            .unwrap();

        assert_eq!(turn.kind.role(), TurnRole::User);
    }
}
