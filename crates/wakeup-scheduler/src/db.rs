//! Versioned schema for the `alarms` table.
//!
//! Steps are additive and applied in order inside one transaction; the
//! applied version is mirrored to `PRAGMA user_version`.

use rusqlite::Connection;

use crate::error::{AlarmError, Result};

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: u32,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        // AUTOINCREMENT: deleted ids are never handed out again.
        sql: "
            CREATE TABLE IF NOT EXISTS alarms (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                hour        INTEGER NOT NULL CHECK (hour BETWEEN 0 AND 23),
                minute      INTEGER NOT NULL CHECK (minute BETWEEN 0 AND 59),
                is_enabled  INTEGER NOT NULL DEFAULT 0
            );
        ",
    },
    Migration {
        version: 2,
        sql: "
            ALTER TABLE alarms ADD COLUMN is_vibration_enabled INTEGER NOT NULL DEFAULT 0;
            ALTER TABLE alarms ADD COLUMN sound_uri TEXT;
        ",
    },
    Migration {
        version: 3,
        sql: "
            -- bit 0 = Monday … bit 6 = Sunday; 0 means one-shot
            ALTER TABLE alarms ADD COLUMN weekdays INTEGER NOT NULL DEFAULT 0;
            CREATE INDEX IF NOT EXISTS idx_alarms_time ON alarms (hour, minute);
        ",
    },
];

/// Latest schema version this build knows about.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |m| m.version)
}

/// Bring `conn` up to [`latest_version`]. Safe to call on every start-up.
pub fn init_db(conn: &mut Connection) -> Result<()> {
    let current = current_version(conn)?;
    let latest = latest_version();

    if current > latest {
        return Err(AlarmError::UnsupportedSchemaVersion {
            db_version: current,
            latest_supported: latest,
        });
    }
    if current == latest {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        tx.execute_batch(migration.sql)?;
        tx.execute_batch(&format!("PRAGMA user_version = {};", migration.version))?;
    }
    tx.commit()?;
    tracing::info!(from = current, to = latest, "alarm schema migrated");
    Ok(())
}

pub fn current_version(conn: &Connection) -> Result<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}
