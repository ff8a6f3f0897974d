use base64::{engine::general_purpose, Engine as _};
use chrono::Local;
use rusqlite::{params, OptionalExtension};
use tokio_rusqlite::Connection;

use crate::error::{AppError, Result};
use crate::models::{GenerationResult, Statistics};

use super::schema::SCHEMA;

const CREDENTIAL_KEY: &str = "prototipal_api_key";
const HISTORY_KEY: &str = "prototipal_history";
const STATS_KEY: &str = "prototipal_stats";

pub const MAX_HISTORY: usize = 50;

/// Typed access to the three persisted records. Every public operation
/// swallows storage failures: they are logged and a safe default comes back.
pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;
        Self::with_connection(conn).await
    }

    pub async fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::with_connection(conn).await
    }

    async fn with_connection(conn: Connection) -> Result<Self> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    // Raw key-value access

    async fn get_entry(&self, key: &'static str) -> Result<Option<String>> {
        let value = self
            .conn
            .call(move |conn| {
                let value = conn
                    .query_row(
                        "SELECT value FROM kv_store WHERE key = ?1",
                        params![key],
                        |row| row.get::<_, String>(0),
                    )
                    .optional()?;
                Ok(value)
            })
            .await?;
        Ok(value)
    }

    async fn set_entry(&self, key: &'static str, value: String) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO kv_store (key, value) VALUES (?1, ?2)
                       ON CONFLICT(key) DO UPDATE SET
                           value = excluded.value,
                           updated_at = datetime('now')"#,
                    params![key, value],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // Credential

    pub async fn save_credential(&self, value: &str) -> bool {
        let encoded = general_purpose::STANDARD.encode(value.as_bytes());
        match self.set_entry(CREDENTIAL_KEY, encoded).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Failed to save API key: {}", e);
                false
            }
        }
    }

    pub async fn load_credential(&self) -> String {
        match self.try_load_credential().await {
            Ok(key) => key,
            Err(e) => {
                tracing::error!("Failed to load API key: {}", e);
                String::new()
            }
        }
    }

    async fn try_load_credential(&self) -> Result<String> {
        let Some(encoded) = self.get_entry(CREDENTIAL_KEY).await? else {
            return Ok(String::new());
        };
        let bytes = general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| AppError::Other(e.into()))?;
        String::from_utf8(bytes).map_err(|e| AppError::Other(e.into()))
    }

    // History

    pub async fn read_history(&self) -> Vec<GenerationResult> {
        match self.try_read_history().await {
            Ok(history) => history,
            Err(e) => {
                tracing::error!("Failed to get history: {}", e);
                Vec::new()
            }
        }
    }

    async fn try_read_history(&self) -> Result<Vec<GenerationResult>> {
        match self.get_entry(HISTORY_KEY).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Vec::new()),
        }
    }

    async fn write_history(&self, history: &[GenerationResult]) -> Result<()> {
        let raw = serde_json::to_string(history)?;
        self.set_entry(HISTORY_KEY, raw).await
    }

    /// Prepends `result` and keeps the newest [`MAX_HISTORY`] entries.
    pub async fn append_history(&self, result: &GenerationResult) -> bool {
        match self.try_append_history(result).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(id = %result.id, "Failed to save to history: {}", e);
                false
            }
        }
    }

    async fn try_append_history(&self, result: &GenerationResult) -> Result<()> {
        let mut history = self.try_read_history().await?;
        history.insert(0, result.clone());
        history.truncate(MAX_HISTORY);
        self.write_history(&history).await
    }

    pub async fn delete_history_entry(&self, id: &str) -> bool {
        match self.try_delete_history_entry(id).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(id, "Failed to delete history item: {}", e);
                false
            }
        }
    }

    async fn try_delete_history_entry(&self, id: &str) -> Result<()> {
        let mut history = self.try_read_history().await?;
        let before = history.len();
        history.retain(|item| item.id != id);
        if history.len() == before {
            tracing::debug!(id, "No history entry to delete");
            return Ok(());
        }
        self.write_history(&history).await
    }

    pub async fn clear_history(&self) -> bool {
        match self.write_history(&[]).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Failed to clear history: {}", e);
                false
            }
        }
    }

    // Statistics

    pub async fn read_stats(&self) -> Statistics {
        let outcome = async {
            match self.get_entry(STATS_KEY).await? {
                Some(raw) => Ok::<_, AppError>(serde_json::from_str(&raw)?),
                None => Ok(Statistics::default()),
            }
        }
        .await;

        outcome.unwrap_or_else(|e| {
            tracing::error!("Failed to get stats: {}", e);
            Statistics::default()
        })
    }

    /// Rebuilds the statistics from the stored history and persists them.
    ///
    /// The arguments describe the call that triggered the recompute but do
    /// not feed into it: history is the only source of truth.
    pub async fn recompute_stats(
        &self,
        processing_time: f64,
        has_video: bool,
        is_success: bool,
    ) -> Statistics {
        tracing::debug!(processing_time, has_video, is_success, "Recomputing stats");

        let outcome = async {
            let history = self.try_read_history().await?;
            let stats = Statistics::from_history(&history, Local::now());
            self.set_entry(STATS_KEY, serde_json::to_string(&stats)?).await?;
            Ok::<_, AppError>(stats)
        }
        .await;

        match outcome {
            Ok(stats) => stats,
            Err(e) => {
                tracing::error!("Failed to update stats: {}", e);
                self.read_stats().await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GeneratedAssets, GenerationRequest};

    fn request(n: usize) -> GenerationRequest {
        GenerationRequest {
            image_url: format!("https://cdn.example.com/{n}.png"),
            api_key: "0123456789abc".to_string(),
            email: String::new(),
            generate_video: false,
        }
    }

    fn success(n: usize) -> GenerationResult {
        GenerationResult::success(&request(n), GeneratedAssets::default(), 10.0)
    }

    fn failure(n: usize) -> GenerationResult {
        GenerationResult::failed(&request(n), "remote said no", 2.0)
    }

    async fn repo() -> Repository {
        Repository::in_memory().await.unwrap()
    }

    #[tokio::test]
    async fn credential_round_trip() {
        let repo = repo().await;
        assert_eq!(repo.load_credential().await, "");

        for key in ["longenoughkey123", "with spaces & ünïcødé", "x"] {
            assert!(repo.save_credential(key).await);
            assert_eq!(repo.load_credential().await, key);
        }
    }

    #[tokio::test]
    async fn credential_is_not_stored_in_plain_text() {
        let repo = repo().await;
        repo.save_credential("plain-secret-value").await;

        let raw = repo.get_entry(CREDENTIAL_KEY).await.unwrap().unwrap();
        assert_ne!(raw, "plain-secret-value");
        assert_eq!(raw, "cGxhaW4tc2VjcmV0LXZhbHVl");
    }

    #[tokio::test]
    async fn undecodable_credential_loads_as_empty() {
        let repo = repo().await;
        repo.set_entry(CREDENTIAL_KEY, "***not base64***".to_string())
            .await
            .unwrap();
        assert_eq!(repo.load_credential().await, "");
    }

    #[tokio::test]
    async fn history_is_newest_first_and_capped() {
        let repo = repo().await;
        let mut ids = Vec::new();
        for n in 0..51 {
            let result = success(n);
            ids.push(result.id.clone());
            assert!(repo.append_history(&result).await);
        }

        let history = repo.read_history().await;
        assert_eq!(history.len(), MAX_HISTORY);
        assert_eq!(history[0].id, ids[50]);
        assert_eq!(history[49].id, ids[1]);
        assert!(history.iter().all(|h| h.id != ids[0]));
    }

    #[tokio::test]
    async fn delete_removes_only_the_matching_entry() {
        let repo = repo().await;
        let a = success(1);
        let b = failure(2);
        repo.append_history(&a).await;
        repo.append_history(&b).await;

        assert!(repo.delete_history_entry(&a.id).await);
        let history = repo.read_history().await;
        assert_eq!(history, vec![b]);
    }

    #[tokio::test]
    async fn deleting_unknown_id_is_a_no_op() {
        let repo = repo().await;
        let a = success(1);
        repo.append_history(&a).await;

        assert!(repo.delete_history_entry("does-not-exist").await);
        assert_eq!(repo.read_history().await, vec![a]);
    }

    #[tokio::test]
    async fn clear_empties_history() {
        let repo = repo().await;
        repo.append_history(&success(1)).await;
        assert!(repo.clear_history().await);
        assert!(repo.read_history().await.is_empty());
    }

    #[tokio::test]
    async fn corrupt_history_reads_as_empty() {
        let repo = repo().await;
        repo.set_entry(HISTORY_KEY, "{not json".to_string()).await.unwrap();

        assert!(repo.read_history().await.is_empty());
        assert!(!repo.append_history(&success(1)).await);

        // Clearing replaces the corrupt value outright.
        assert!(repo.clear_history().await);
        assert!(repo.append_history(&success(2)).await);
        assert_eq!(repo.read_history().await.len(), 1);
    }

    #[tokio::test]
    async fn stats_default_when_absent_or_corrupt() {
        let repo = repo().await;
        assert_eq!(repo.read_stats().await, Statistics::default());

        repo.set_entry(STATS_KEY, "[]".to_string()).await.unwrap();
        assert_eq!(repo.read_stats().await, Statistics::default());
    }

    #[tokio::test]
    async fn recompute_uses_history_not_arguments() {
        let repo = repo().await;
        let empty = repo.recompute_stats(99.0, true, false).await;
        assert_eq!(empty.total_generations, 0);
        assert_eq!(empty.success_rate, 100);
        assert_eq!(empty.total_videos, 0);

        repo.append_history(&success(1)).await;
        repo.append_history(&failure(2)).await;
        repo.append_history(&success(3)).await;
        repo.append_history(&failure(4)).await;

        let stats = repo.recompute_stats(0.0, false, true).await;
        assert_eq!(stats.total_generations, 2);
        assert_eq!(stats.success_rate, 50);
        assert_eq!(stats.average_time, 10.0);
        assert_eq!(repo.read_stats().await, stats);
    }

    #[tokio::test]
    async fn storage_failures_degrade_to_defaults() {
        let repo = repo().await;
        repo.append_history(&success(1)).await;
        repo.conn
            .call(|conn| {
                conn.execute_batch("DROP TABLE kv_store")?;
                Ok(())
            })
            .await
            .unwrap();

        assert!(!repo.save_credential("longenoughkey123").await);
        assert_eq!(repo.load_credential().await, "");
        assert!(repo.read_history().await.is_empty());
        assert!(!repo.append_history(&success(2)).await);
        assert!(!repo.delete_history_entry("x").await);
        assert!(!repo.clear_history().await);
        assert_eq!(repo.recompute_stats(1.0, false, true).await, Statistics::default());
    }
}
