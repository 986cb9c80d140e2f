use crate::auth::hash_password;
use crate::db::DbPool;
use crate::models::{NewMount, NewStation, NewUser, ROLE_ADMIN};
use anyhow::Result;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;

const DEFAULT_STATION: &str = "RadioDesk";
const DEFAULT_MOUNT: &str = "main";

pub fn seed_defaults(pool: &DbPool) -> Result<()> {
    let mut conn = pool.get()?;
    tracing::info!("Seeding default values...");

    seed_users(&mut conn)?;
    seed_station(&mut conn)?;

    Ok(())
}

fn seed_users(conn: &mut SqliteConnection) -> Result<()> {
    use crate::schema::users::dsl::*;

    let existing: i64 = users.count().get_result(conn)?;
    if existing == 0 {
        tracing::info!("Seeding user: admin");
        let new_user = NewUser {
            username: "admin".to_string(),
            password_hash: hash_password("admin")?,
            role: ROLE_ADMIN.to_string(),
        };
        diesel::insert_into(users).values(&new_user).execute(conn)?;
    }

    Ok(())
}

// A fresh install gets one station with one mount so the schedule is usable.
fn seed_station(conn: &mut SqliteConnection) -> Result<()> {
    use crate::schema::{mounts, stations};

    let existing: i64 = stations::table.count().get_result(conn)?;
    if existing > 0 {
        return Ok(());
    }

    tracing::info!("Seeding station: {}", DEFAULT_STATION);
    let station_id = uuid::Uuid::new_v4().to_string();
    conn.transaction::<_, diesel::result::Error, _>(|conn| {
        diesel::insert_into(stations::table)
            .values(&NewStation {
                id: station_id.clone(),
                name: DEFAULT_STATION.to_string(),
                description: None,
                timezone: "UTC".to_string(),
                active: true,
            })
            .execute(conn)?;
        diesel::insert_into(mounts::table)
            .values(&NewMount {
                id: uuid::Uuid::new_v4().to_string(),
                station_id: station_id.clone(),
                name: DEFAULT_MOUNT.to_string(),
                format: "mp3".to_string(),
                bitrate: 128,
            })
            .execute(conn)?;
        Ok(())
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::test_pool;

    #[test]
    fn seeding_is_idempotent() {
        let (pool, _dir) = test_pool();
        seed_defaults(&pool).unwrap();
        seed_defaults(&pool).unwrap();

        let mut conn = pool.get().unwrap();
        let users: i64 = crate::schema::users::table
            .count()
            .get_result(&mut conn)
            .unwrap();
        let mounts: i64 = crate::schema::mounts::table
            .count()
            .get_result(&mut conn)
            .unwrap();
        assert_eq!(users, 1);
        assert_eq!(mounts, 1);
    }
}
