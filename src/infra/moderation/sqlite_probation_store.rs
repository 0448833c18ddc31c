// SQLite-backed probation store.
//
// Tables:
// - probation_members: one row per tracked member
//
// `save` replaces the whole table inside one transaction, so readers see
// either the old or the new registry, never a mix. Unreadable contents are
// quarantined by renaming the table to probation_members_corrupt_<timestamp>.

use crate::core::moderation::{Member, MemberState, PersistenceError, ProbationStore};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Row, Sqlite};
use std::path::Path;

const CREATE_MEMBERS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS probation_members (
        member_id INTEGER PRIMARY KEY,
        joined_at TEXT NOT NULL,
        state TEXT NOT NULL,
        clean_message_count INTEGER NOT NULL DEFAULT 0
    );
"#;

pub struct SqliteProbationStore {
    pool: Pool<Sqlite>,
}

impl SqliteProbationStore {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        // Ensure the file exists if it's a file path
        let path_str = database_url.trim_start_matches("sqlite://");
        let in_memory = database_url.contains(":memory:");
        if !in_memory && !Path::new(path_str).exists() {
            if let Some(parent) = Path::new(path_str).parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::File::create(path_str)?;
        }

        let conn_str = if database_url.starts_with("sqlite:") {
            database_url.to_string()
        } else {
            format!("sqlite://{}", database_url)
        };

        // Every connection to :memory: is its own database
        let mut options = SqlitePoolOptions::new();
        if in_memory {
            options = options.max_connections(1);
        }
        let pool = options.connect(&conn_str).await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), PersistenceError> {
        sqlx::query(CREATE_MEMBERS_TABLE)
            .execute(&self.pool)
            .await
            .map_err(|e| PersistenceError::StorageError(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl ProbationStore for SqliteProbationStore {
    async fn load(&self) -> Result<Vec<Member>, PersistenceError> {
        let rows = sqlx::query(
            "SELECT member_id, joined_at, state, clean_message_count FROM probation_members ORDER BY member_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PersistenceError::StorageError(e.to_string()))?;

        rows.iter().map(row_to_member).collect()
    }

    async fn save(&self, members: &[Member]) -> Result<(), PersistenceError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| PersistenceError::StorageError(e.to_string()))?;

        sqlx::query("DELETE FROM probation_members")
            .execute(&mut *tx)
            .await
            .map_err(|e| PersistenceError::StorageError(e.to_string()))?;

        for member in members {
            sqlx::query(
                r#"
                INSERT INTO probation_members (member_id, joined_at, state, clean_message_count)
                VALUES (?, ?, ?, ?)
                "#,
            )
            // Snowflakes fit in i64; the cast round-trips any u64 bit pattern anyway
            .bind(member.id as i64)
            .bind(member.joined_at.to_rfc3339_opts(SecondsFormat::Nanos, true))
            .bind(member.state.as_str())
            .bind(member.clean_message_count as i64)
            .execute(&mut *tx)
            .await
            .map_err(|e| PersistenceError::StorageError(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| PersistenceError::StorageError(e.to_string()))
    }

    async fn quarantine(&self) -> Result<(), PersistenceError> {
        let aside = format!(
            "probation_members_corrupt_{}",
            Utc::now().format("%Y%m%d%H%M%S%3f")
        );

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| PersistenceError::StorageError(e.to_string()))?;

        // Table names can't be bound; `aside` is built from digits only
        sqlx::query(&format!("ALTER TABLE probation_members RENAME TO {}", aside))
            .execute(&mut *tx)
            .await
            .map_err(|e| PersistenceError::StorageError(e.to_string()))?;

        sqlx::query(CREATE_MEMBERS_TABLE)
            .execute(&mut *tx)
            .await
            .map_err(|e| PersistenceError::StorageError(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| PersistenceError::StorageError(e.to_string()))?;

        tracing::warn!("Moved unreadable probation rows to table {}", aside);
        Ok(())
    }
}

fn row_to_member(row: &sqlx::sqlite::SqliteRow) -> Result<Member, PersistenceError> {
    let joined_at: String = row.get("joined_at");
    let state: String = row.get("state");

    Ok(Member {
        id: row.get::<i64, _>("member_id") as u64,
        joined_at: DateTime::parse_from_rfc3339(&joined_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| PersistenceError::Corrupt(format!("bad joined_at '{}': {}", joined_at, e)))?,
        state: state.parse::<MemberState>().map_err(PersistenceError::Corrupt)?,
        clean_message_count: row.get::<i64, _>("clean_message_count") as u32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::moderation::{ProbationConfig, ProbationRegistry};
    use chrono::TimeZone;
    use std::sync::Arc;

    fn joined() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap() + chrono::Duration::microseconds(42)
    }

    #[tokio::test]
    async fn test_empty_database_loads_empty() {
        let store = SqliteProbationStore::new("sqlite::memory:").await.unwrap();

        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let store = SqliteProbationStore::new("sqlite::memory:").await.unwrap();
        let members = vec![
            Member::new(5, joined()),
            Member {
                id: 1_234_567_890_123_456_789,
                joined_at: joined(),
                state: MemberState::Trusted,
                clean_message_count: 12,
            },
        ];

        store.save(&members).await.unwrap();
        assert_eq!(store.load().await.unwrap(), members);

        store.save(&members[..1]).await.unwrap();
        assert_eq!(store.load().await.unwrap(), members[..1].to_vec());
    }

    #[tokio::test]
    async fn test_unknown_state_is_corrupt() {
        let store = SqliteProbationStore::new("sqlite::memory:").await.unwrap();
        sqlx::query(
            "INSERT INTO probation_members (member_id, joined_at, state, clean_message_count) VALUES (1, '2024-01-01T00:00:00Z', 'banned', 0)",
        )
        .execute(&store.pool)
        .await
        .unwrap();

        assert!(matches!(
            store.load().await,
            Err(PersistenceError::Corrupt(_))
        ));
    }

    #[tokio::test]
    async fn test_registry_round_trip_through_sqlite() {
        let store = Arc::new(SqliteProbationStore::new("sqlite::memory:").await.unwrap());
        let config = ProbationConfig {
            clean_messages_to_trust: 2,
            window_secs: 3600,
        };

        let registry = ProbationRegistry::new(Arc::clone(&store), config);
        registry.enroll(1, joined());
        registry.enroll(2, joined());
        registry.record_clean_message(2, joined());
        registry.record_clean_message(2, joined());
        registry.persist().await.unwrap();

        let restored = ProbationRegistry::open(Arc::clone(&store), config).await;

        assert_eq!(restored.snapshot(), registry.snapshot());
        assert_eq!(restored.get_state(2), MemberState::Trusted);
    }

    #[tokio::test]
    async fn test_quarantine_keeps_unreadable_rows() {
        let store = SqliteProbationStore::new("sqlite::memory:").await.unwrap();
        sqlx::query(
            "INSERT INTO probation_members (member_id, joined_at, state, clean_message_count) VALUES (1, 'yesterday', 'new', 0)",
        )
        .execute(&store.pool)
        .await
        .unwrap();
        assert!(store.load().await.is_err());

        store.quarantine().await.unwrap();

        assert!(store.load().await.unwrap().is_empty());
        let aside: String = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name LIKE 'probation_members_corrupt_%'",
        )
        .fetch_one(&store.pool)
        .await
        .unwrap();
        let kept: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", aside))
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_eq!(kept, 1);
    }
}
