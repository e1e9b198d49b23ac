//! Durable `vm_name → VmRecord` mapping, grounded on
//! `repohub::database::Database`'s `SqlitePool` wrapper and
//! table-initialization style.
//!
//! SQLite gives per-record crash safety for free — each `put`/`delete` is
//! one statement committed inside SQLite's own journal — without hand
//! rolling a file format. This is the only state that carries across
//! controller restarts.

use std::path::Path;
use std::str::FromStr;

use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, info};

/// `vm_name → {profile, spawn_time}`. The `queue_name` copy
/// is a convenience so the need evaluator and reaper don't have to join
/// back against the profile table for every booting-VM check.
#[derive(Debug, Clone, FromRow)]
pub struct VmRecord {
    pub name: String,
    pub profile_id: String,
    pub queue_name: String,
    /// Unix seconds at which `CloudDriver::create` was issued.
    pub spawn_time: i64,
}

#[derive(Debug)]
pub enum RegistryStoreError {
    Open(sqlx::Error),
    Query(sqlx::Error),
}

impl std::fmt::Display for RegistryStoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryStoreError::Open(e) => write!(f, "could not open VM registry: {e}"),
            RegistryStoreError::Query(e) => write!(f, "VM registry query failed: {e}"),
        }
    }
}

impl std::error::Error for RegistryStoreError {}

impl From<sqlx::Error> for RegistryStoreError {
    fn from(err: sqlx::Error) -> Self {
        RegistryStoreError::Query(err)
    }
}

#[derive(Clone)]
pub struct VmRegistry {
    pool: SqlitePool,
}

impl VmRegistry {
    /// Opens (creating if missing) `<registry-dir>/vm_object_store.dat`.
    /// Creates `<registry-dir>` if it does not exist. Failure here is
    /// fatal at startup.
    pub async fn open(path: &Path) -> Result<Self, RegistryStoreError> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                info!(dir = %dir.display(), "creating VM registry directory");
                std::fs::create_dir_all(dir).map_err(|e| {
                    RegistryStoreError::Open(sqlx::Error::Io(e))
                })?;
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path.display()))
            .map_err(RegistryStoreError::Open)?
            .create_if_missing(true);

        let pool = SqlitePool::connect_with(options)
            .await
            .map_err(RegistryStoreError::Open)?;

        let registry = Self { pool };
        registry.initialize_schema().await?;
        info!(path = %path.display(), "VM registry opened");
        Ok(registry)
    }

    /// In-memory store, for tests.
    pub async fn open_in_memory() -> Result<Self, RegistryStoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(RegistryStoreError::Open)?;
        let pool = SqlitePool::connect_with(options)
            .await
            .map_err(RegistryStoreError::Open)?;
        let registry = Self { pool };
        registry.initialize_schema().await?;
        Ok(registry)
    }

    async fn initialize_schema(&self) -> Result<(), RegistryStoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS vm_records (
                name        TEXT PRIMARY KEY,
                profile_id  TEXT NOT NULL,
                queue_name  TEXT NOT NULL,
                spawn_time  INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Write before the cloud call, per the spawn protocol.
    pub async fn put(&self, record: &VmRecord) -> Result<(), RegistryStoreError> {
        sqlx::query(
            "INSERT OR REPLACE INTO vm_records (name, profile_id, queue_name, spawn_time) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(&record.name)
        .bind(&record.profile_id)
        .bind(&record.queue_name)
        .bind(record.spawn_time)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, name: &str) -> Result<Option<VmRecord>, RegistryStoreError> {
        let record = sqlx::query_as::<_, VmRecord>(
            "SELECT name, profile_id, queue_name, spawn_time FROM vm_records WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    /// Failures here are logged by the caller, not fatal — the record is
    /// reconsidered on the next tick.
    pub async fn delete(&self, name: &str) -> Result<(), RegistryStoreError> {
        sqlx::query("DELETE FROM vm_records WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await?;
        debug!(vm_name = %name, "removed VM registry record");
        Ok(())
    }

    pub async fn iter(&self) -> Result<Vec<VmRecord>, RegistryStoreError> {
        let records = sqlx::query_as::<_, VmRecord>(
            "SELECT name, profile_id, queue_name, spawn_time FROM vm_records",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    pub async fn names_for_profile(
        &self,
        profile_id: &str,
    ) -> Result<Vec<String>, RegistryStoreError> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM vm_records WHERE profile_id = ?")
                .bind(profile_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    pub async fn count_for_profile(&self, profile_id: &str) -> Result<u32, RegistryStoreError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM vm_records WHERE profile_id = ?")
                .bind(profile_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count as u32)
    }

    /// Count of a profile's VMs younger than `threshold_secs` as of `now`
    /// — the `booting` set the need evaluator subtracts from its desired
    /// spawn count.
    pub async fn count_booting(
        &self,
        profile_id: &str,
        now: i64,
        threshold_secs: i64,
    ) -> Result<u32, RegistryStoreError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM vm_records WHERE profile_id = ? AND (? - spawn_time) < ?",
        )
        .bind(profile_id)
        .bind(now)
        .bind(threshold_secs)
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, profile: &str, spawn_time: i64) -> VmRecord {
        VmRecord {
            name: name.to_string(),
            profile_id: profile.to_string(),
            queue_name: format!("{profile}.tasks"),
            spawn_time,
        }
    }

    #[tokio::test]
    async fn put_get_delete_round_trip() {
        let registry = VmRegistry::open_in_memory().await.unwrap();
        registry.put(&record("vm-1", "ingest", 1000)).await.unwrap();

        let fetched = registry.get("vm-1").await.unwrap().unwrap();
        assert_eq!(fetched.profile_id, "ingest");

        registry.delete("vm-1").await.unwrap();
        assert!(registry.get("vm-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn count_for_profile_is_scoped() {
        let registry = VmRegistry::open_in_memory().await.unwrap();
        registry.put(&record("vm-1", "ingest", 1000)).await.unwrap();
        registry.put(&record("vm-2", "ingest", 1000)).await.unwrap();
        registry.put(&record("vm-3", "export", 1000)).await.unwrap();

        assert_eq!(registry.count_for_profile("ingest").await.unwrap(), 2);
        assert_eq!(registry.count_for_profile("export").await.unwrap(), 1);
        assert_eq!(registry.count_for_profile("unknown").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn count_booting_respects_threshold() {
        let registry = VmRegistry::open_in_memory().await.unwrap();
        registry.put(&record("vm-1", "ingest", 1000)).await.unwrap();
        registry.put(&record("vm-2", "ingest", 500)).await.unwrap();

        let booting = registry.count_booting("ingest", 1100, 300).await.unwrap();
        assert_eq!(booting, 1); // vm-1 is 100s old, vm-2 is 600s old
    }

    #[tokio::test]
    async fn iter_lists_everything() {
        let registry = VmRegistry::open_in_memory().await.unwrap();
        registry.put(&record("vm-1", "ingest", 1000)).await.unwrap();
        registry.put(&record("vm-2", "export", 1000)).await.unwrap();

        let all = registry.iter().await.unwrap();
        assert_eq!(all.len(), 2);
    }
}
