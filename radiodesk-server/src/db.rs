use anyhow::Result;
use diesel::connection::SimpleConnection;
use diesel::r2d2::{self, ConnectionManager, CustomizeConnection};
use diesel::sqlite::SqliteConnection;

pub type DbPool = r2d2::Pool<ConnectionManager<SqliteConnection>>;
pub type DbConnection = r2d2::PooledConnection<ConnectionManager<SqliteConnection>>;

/// Applied to every pooled connection. Writers wait on the database lock
/// instead of failing with SQLITE_BUSY.
#[derive(Debug, Clone, Copy)]
struct SqlitePragmas {
    busy_timeout_ms: u32,
}

impl CustomizeConnection<SqliteConnection, r2d2::Error> for SqlitePragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), r2d2::Error> {
        conn.batch_execute(&format!(
            "PRAGMA busy_timeout = {}; PRAGMA foreign_keys = ON;",
            self.busy_timeout_ms
        ))
        .map_err(r2d2::Error::QueryError)
    }
}

pub fn create_pool(database_url: &str) -> Result<DbPool> {
    let manager = ConnectionManager::<SqliteConnection>::new(database_url);
    let pool = r2d2::Pool::builder()
        .connection_customizer(Box::new(SqlitePragmas {
            busy_timeout_ms: 5_000,
        }))
        .build(manager)?;
    Ok(pool)
}

pub fn run_migrations(conn: &mut DbConnection) -> Result<()> {
    use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

    const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

    conn.run_pending_migrations(MIGRATIONS)
        .map(|_| ())
        .map_err(|e| anyhow::anyhow!("Migration error: {}", e))
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use crate::models::{NewMount, NewStation};
    use diesel::prelude::*;
    use tempfile::TempDir;

    /// A migrated pool backed by a file in a fresh temp dir. Keep the dir
    /// alive for as long as the pool is used.
    pub fn test_pool() -> (DbPool, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let url = dir.path().join("radiodesk-test.db");
        let pool = create_pool(url.to_str().unwrap()).unwrap();
        run_migrations(&mut pool.get().unwrap()).unwrap();
        (pool, dir)
    }

    /// Inserts a station with one mount, returning (station_id, mount_id).
    pub fn seed_station(conn: &mut SqliteConnection, name: &str) -> (String, String) {
        use crate::schema::{mounts, stations};

        let station_id = uuid::Uuid::new_v4().to_string();
        let mount_id = uuid::Uuid::new_v4().to_string();

        diesel::insert_into(stations::table)
            .values(&NewStation {
                id: station_id.clone(),
                name: name.to_string(),
                description: None,
                timezone: "UTC".to_string(),
                active: true,
            })
            .execute(conn)
            .unwrap();
        diesel::insert_into(mounts::table)
            .values(&NewMount {
                id: mount_id.clone(),
                station_id: station_id.clone(),
                name: "main".to_string(),
                format: "mp3".to_string(),
                bitrate: 128,
            })
            .execute(conn)
            .unwrap();

        (station_id, mount_id)
    }
}
