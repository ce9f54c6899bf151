use std::path::Path;

use sqlx::{migrate::Migrator, sqlite::SqlitePoolOptions, FromRow, Pool, Sqlite};
use tokio::fs;

use crate::VmshareResult;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Migrator for the mounts database
pub static MOUNTS_DB_MIGRATOR: Migrator = sqlx::migrate!("lib/management/migrations");

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A recorded mount daemon.
#[derive(Debug, Clone, FromRow)]
pub struct MountRecord {
    /// Row id.
    pub id: i64,

    /// Machine profile the share is mounted into.
    pub profile: String,

    /// The shared host directory.
    pub host_dir: String,

    /// The guest mount point.
    pub guest_dir: String,

    /// Host address the guest connects to.
    pub ip: String,

    /// Share server port.
    pub port: i64,

    /// Pid of the daemon process.
    pub pid: i64,
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Initializes the mounts database, creating it and running migrations if
/// needed, and returns a connection pool.
pub async fn init_mounts_db(db_path: impl AsRef<Path>) -> VmshareResult<Pool<Sqlite>> {
    let db_path = db_path.as_ref();

    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent).await?;
    }

    // Create an empty database file if it doesn't exist
    if !db_path.exists() {
        fs::File::create(&db_path).await?;
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&format!("sqlite://{}?mode=rwc", db_path.display()))
        .await?;

    MOUNTS_DB_MIGRATOR.run(&pool).await?;

    Ok(pool)
}

/// Records the daemon for a profile, replacing any stale record.
pub async fn record_mount(
    pool: &Pool<Sqlite>,
    profile: &str,
    host_dir: &str,
    guest_dir: &str,
    ip: &str,
    port: u16,
    pid: u32,
) -> VmshareResult<()> {
    sqlx::query(
        r#"
        INSERT OR REPLACE INTO mounts (profile, host_dir, guest_dir, ip, port, pid)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(profile)
    .bind(host_dir)
    .bind(guest_dir)
    .bind(ip)
    .bind(port)
    .bind(pid)
    .execute(pool)
    .await?;

    Ok(())
}

/// Returns the recorded daemon for a profile, if any.
pub async fn get_mount(pool: &Pool<Sqlite>, profile: &str) -> VmshareResult<Option<MountRecord>> {
    let record = sqlx::query_as::<_, MountRecord>(
        r#"
        SELECT id, profile, host_dir, guest_dir, ip, port, pid
        FROM mounts
        WHERE profile = ?
        "#,
    )
    .bind(profile)
    .fetch_optional(pool)
    .await?;

    Ok(record)
}

/// Deletes the recorded daemon for a profile.
pub async fn delete_mount(pool: &Pool<Sqlite>, profile: &str) -> VmshareResult<()> {
    sqlx::query("DELETE FROM mounts WHERE profile = ?")
        .bind(profile)
        .execute(pool)
        .await?;

    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
