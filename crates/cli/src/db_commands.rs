use std::path::PathBuf;

use {clap::Subcommand, relaydesk_config::RelaydeskConfig};

#[derive(Subcommand)]
pub enum DbAction {
    /// Delete the database file completely.
    Reset,
    /// Clear all data from tables but keep the schema intact.
    Clear,
    /// Run all pending database migrations.
    Migrate,
}

/// Tables in deletion order (messages reference sessions).
const TABLES: &[&str] = &["chat_messages", "sessions", "whatsapp_settings"];

/// Path of the SQLite file behind the configured database.
///
/// `None` for in-memory databases.
fn db_path(config: &RelaydeskConfig) -> Option<PathBuf> {
    let Some(url) = config.database.url.as_deref().filter(|u| !u.trim().is_empty()) else {
        return Some(relaydesk_config::data_dir().join("relaydesk.db"));
    };
    let rest = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url);
    let path = rest.split('?').next().unwrap_or(rest);
    if path.is_empty() || path == ":memory:" {
        return None;
    }
    Some(PathBuf::from(path))
}

pub async fn handle_db(action: DbAction, config: &RelaydeskConfig) -> anyhow::Result<()> {
    match action {
        DbAction::Reset => reset_database(config),
        DbAction::Clear => clear_database(config).await,
        DbAction::Migrate => run_migrations(config).await,
    }
}

/// Delete the database file and the WAL/SHM files SQLite may have created.
fn reset_database(config: &RelaydeskConfig) -> anyhow::Result<()> {
    let Some(db) = db_path(config) else {
        println!("In-memory database, nothing to delete.");
        return Ok(());
    };

    let mut deleted = false;
    for suffix in ["", "-wal", "-shm"] {
        let mut name = db.clone().into_os_string();
        name.push(suffix);
        let path = PathBuf::from(name);
        if path.exists() {
            std::fs::remove_file(&path)?;
            println!("Deleted: {}", path.display());
            deleted = true;
        }
    }

    if deleted {
        println!("Database deleted. Run `relaydesk db migrate` to recreate it.");
    } else {
        println!("No database found at {}.", db.display());
    }
    Ok(())
}

async fn clear_database(config: &RelaydeskConfig) -> anyhow::Result<()> {
    if let Some(db) = db_path(config)
        && !db.exists()
    {
        println!("Database not found: {}", db.display());
        return Ok(());
    }

    let pool = relaydesk_gateway::server::connect_database(config).await?;
    clear_tables(&pool).await;
    pool.close().await;
    println!("Database cleared.");
    Ok(())
}

async fn clear_tables(pool: &sqlx::SqlitePool) {
    for table in TABLES {
        let query = format!("DELETE FROM {table}");
        if let Err(e) = sqlx::query(&query).execute(pool).await {
            eprintln!("Warning: could not clear {table}: {e}");
        } else {
            println!("Cleared table: {table}");
        }
    }
}

async fn run_migrations(config: &RelaydeskConfig) -> anyhow::Result<()> {
    println!("Running migrations...");
    let pool = relaydesk_gateway::server::connect_database(config).await?;
    pool.close().await;
    println!("All migrations complete.");
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use {super::*, tempfile::TempDir};

    fn config_for(url: &str) -> RelaydeskConfig {
        let mut config = RelaydeskConfig::default();
        config.database.url = Some(url.to_string());
        config
    }

    #[test]
    fn db_path_from_url() {
        assert_eq!(
            db_path(&config_for("sqlite:///var/lib/relaydesk/chat.db?mode=rwc")),
            Some(PathBuf::from("/var/lib/relaydesk/chat.db"))
        );
        assert_eq!(
            db_path(&config_for("sqlite:chat.db")),
            Some(PathBuf::from("chat.db"))
        );
        assert_eq!(db_path(&config_for("sqlite::memory:")), None);
        assert!(
            db_path(&RelaydeskConfig::default())
                .unwrap()
                .ends_with("relaydesk.db")
        );
    }

    #[tokio::test]
    async fn migrate_clear_and_reset() {
        let temp = TempDir::new().unwrap();
        let db = temp.path().join("relaydesk.db");
        let config = config_for(&format!("sqlite://{}", db.display()));

        run_migrations(&config).await.unwrap();
        // Migrations are idempotent.
        run_migrations(&config).await.unwrap();
        assert!(db.exists());

        let pool = relaydesk_gateway::server::connect_database(&config).await.unwrap();
        sqlx::query(
            "INSERT INTO whatsapp_settings (id, agent_phone, updated_at) VALUES (1, '0812', 0)",
        )
        .execute(&pool)
        .await
        .unwrap();
        clear_tables(&pool).await;
        let (count,): (i64,) = sqlx::query_as("SELECT count(*) FROM whatsapp_settings")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
        pool.close().await;

        reset_database(&config).unwrap();
        assert!(!db.exists());
    }
}
