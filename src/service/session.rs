use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::config::LexiconConfig;
use crate::core::lexicon::Catalogue;
use crate::models::context::{Answer, ChatTurn, ColumnSummary, DatasetSummary};
use crate::models::table::Table;

/// One uploaded dataset with its lexicon and chat history.
///
/// The table and catalogue are immutable once built, so concurrent questions
/// share them freely; only the history is behind a lock.
pub struct Session {
    pub id: Uuid,
    pub name: String,
    pub table: Arc<Table>,
    pub catalogue: Catalogue,
    pub created_at: DateTime<Utc>,
    history: RwLock<Vec<ChatTurn>>,
}

impl Session {
    pub fn new(name: String, table: Table, lexicon: &LexiconConfig) -> anyhow::Result<Self> {
        let catalogue = Catalogue::build(&table, lexicon)?;
        Ok(Self {
            id: Uuid::new_v4(),
            name,
            table: Arc::new(table),
            catalogue,
            created_at: Utc::now(),
            history: RwLock::new(Vec::new()),
        })
    }

    pub fn summary(&self) -> DatasetSummary {
        DatasetSummary {
            session_id: self.id,
            name: self.name.clone(),
            rows: self.table.row_count(),
            columns: self
                .table
                .columns()
                .iter()
                .map(|c| ColumnSummary { name: c.name().to_string(), role: c.role() })
                .collect(),
            created_at: self.created_at,
        }
    }

    pub async fn record(&self, question: &str, answer: &Answer) {
        self.history.write().await.push(ChatTurn {
            question: question.to_string(),
            answer: answer.clone(),
            asked_at: Utc::now(),
        });
    }

    pub async fn history(&self) -> Vec<ChatTurn> {
        self.history.read().await.clone()
    }
}

pub struct SessionRegistry {
    sessions: DashMap<Uuid, Arc<Session>>,
    lexicon: LexiconConfig,
}

impl SessionRegistry {
    pub fn new(lexicon: LexiconConfig) -> Self {
        Self { sessions: DashMap::new(), lexicon }
    }

    pub fn create(&self, name: String, table: Table) -> anyhow::Result<Arc<Session>> {
        let session = Arc::new(Session::new(name, table, &self.lexicon)?);
        info!(id = %session.id, name = %session.name, rows = session.table.row_count(), "session created");
        self.sessions.insert(session.id, session.clone());
        Ok(session)
    }

    pub fn get(&self, id: &Uuid) -> Option<Arc<Session>> {
        self.sessions.get(id).map(|s| s.value().clone())
    }

    pub fn remove(&self, id: &Uuid) -> bool {
        let removed = self.sessions.remove(id).is_some();
        if removed {
            info!(%id, "session removed");
        }
        removed
    }

    /// Oldest first.
    pub fn list(&self) -> Vec<DatasetSummary> {
        let mut all: Vec<DatasetSummary> =
            self.sessions.iter().map(|entry| entry.value().summary()).collect();
        all.sort_by_key(|s| s.created_at);
        all
    }
}
