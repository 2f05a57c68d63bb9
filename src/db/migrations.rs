use anyhow::{bail, Context, Result};
use rusqlite::Connection;

const SCHEMA_VERSION: i32 = 1;

/// Brings a fresh file up to the kv schema; an existing file must already be on it.
pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    let version: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .context("failed to read user_version pragma")?;

    match version {
        SCHEMA_VERSION => Ok(()),
        0 => {
            let tx = conn
                .transaction()
                .context("failed to open schema transaction")?;
            tx.execute_batch(include_str!("schemas/schema_v1.sql"))
                .context("failed to execute schema_v1.sql")?;
            tx.pragma_update(None, "user_version", SCHEMA_VERSION)
                .context("failed to update user_version pragma")?;
            tx.commit().context("failed to commit schema")
        }
        other => bail!(
            "recovery database has schema version {other}, expected {SCHEMA_VERSION}"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_the_schema_once_and_refuses_unknown_versions() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();
        run_migrations(&mut conn).unwrap();

        let version: i32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
        conn.execute("INSERT INTO kv_store (key, value, updated_at) VALUES ('k', 'v', 'now')", [])
            .unwrap();

        conn.pragma_update(None, "user_version", SCHEMA_VERSION + 1)
            .unwrap();
        assert!(run_migrations(&mut conn).is_err());
    }
}
