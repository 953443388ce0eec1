use std::{
    path::Path,
    sync::{Mutex, MutexGuard},
};

use rusqlite::Connection;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument};

use crate::{
    db::init_db,
    error::{AlarmError, Result},
    types::{AlarmId, AlarmRecord, NewAlarm, WeekdaySet},
};

/// Persistence gateway for alarm records.
///
/// Implementations are synchronous; the scheduler calls them from
/// `spawn_blocking` so callers on the async side never wait on disk I/O.
pub trait AlarmStore: Send + Sync {
    /// Persist a new alarm and return the id the store assigned.
    fn insert(&self, alarm: &NewAlarm) -> Result<AlarmId>;

    /// Overwrite every field of an existing alarm. `NotFound` if the row is gone.
    fn update(&self, record: &AlarmRecord) -> Result<()>;

    /// Remove one alarm. Deleting an unknown id is a no-op.
    fn delete(&self, id: AlarmId) -> Result<()>;

    fn get_by_id(&self, id: AlarmId) -> Result<Option<AlarmRecord>>;

    /// All alarms ordered by time of day.
    fn list_all(&self) -> Result<Vec<AlarmRecord>>;

    fn delete_all(&self) -> Result<()>;

    /// Counter that moves whenever another connection or process commits to
    /// the store. Writes made through this store do not move it.
    fn data_version(&self) -> Result<i64>;

    /// Full-snapshot change notifications.
    ///
    /// Snapshots are published after each write and may lag behind the most
    /// recent one; consumers should treat every value as possibly stale.
    fn observe_all(&self) -> watch::Receiver<Vec<AlarmRecord>>;
}

const SELECT_COLUMNS: &str =
    "SELECT id, hour, minute, is_enabled, weekdays, is_vibration_enabled, sound_uri FROM alarms";

/// SQLite-backed [`AlarmStore`].
///
/// Wraps a single connection in a `Mutex`; alarm volumes are tiny and every
/// statement is a point lookup or a short scan.
pub struct SqliteAlarmStore {
    db: Mutex<Connection>,
    snapshots: watch::Sender<Vec<AlarmRecord>>,
}

impl SqliteAlarmStore {
    /// Wrap an open connection, migrating its schema first.
    pub fn new(mut conn: Connection) -> Result<Self> {
        init_db(&mut conn)?;
        let initial = query_all(&conn)?;
        let (snapshots, _) = watch::channel(initial);
        Ok(Self {
            db: Mutex::new(conn),
            snapshots,
        })
    }

    /// Open (or create) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        info!(path = %path.display(), "alarm store opened");
        Self::new(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::new(Connection::open_in_memory()?)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Push a fresh snapshot to observers. A failed read is logged, not
    /// returned; the write it follows has already committed.
    fn publish(&self, conn: &Connection) {
        match query_all(conn) {
            Ok(all) => {
                self.snapshots.send_replace(all);
            }
            Err(e) => error!("alarm snapshot query failed: {e}"),
        }
    }
}

impl AlarmStore for SqliteAlarmStore {
    #[instrument(skip(self, alarm), fields(hour = alarm.hour, minute = alarm.minute))]
    fn insert(&self, alarm: &NewAlarm) -> Result<AlarmId> {
        crate::types::validate_time(alarm.hour, alarm.minute)?;
        let conn = self.conn();
        conn.execute(
            "INSERT INTO alarms
             (hour, minute, is_enabled, weekdays, is_vibration_enabled, sound_uri)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                alarm.hour,
                alarm.minute,
                alarm.enabled,
                alarm.weekdays.bits(),
                alarm.vibration_enabled,
                alarm.sound_uri,
            ],
        )?;
        let id = conn.last_insert_rowid();
        debug!(alarm_id = id, "alarm inserted");
        self.publish(&conn);
        Ok(id)
    }

    #[instrument(skip(self, record), fields(alarm_id = record.id))]
    fn update(&self, record: &AlarmRecord) -> Result<()> {
        record.validate()?;
        let conn = self.conn();
        let n = conn.execute(
            "UPDATE alarms
             SET hour = ?1, minute = ?2, is_enabled = ?3, weekdays = ?4,
                 is_vibration_enabled = ?5, sound_uri = ?6
             WHERE id = ?7",
            rusqlite::params![
                record.hour,
                record.minute,
                record.enabled,
                record.weekdays.bits(),
                record.vibration_enabled,
                record.sound_uri,
                record.id,
            ],
        )?;
        if n == 0 {
            return Err(AlarmError::NotFound { id: record.id });
        }
        self.publish(&conn);
        Ok(())
    }

    fn delete(&self, id: AlarmId) -> Result<()> {
        let conn = self.conn();
        let n = conn.execute("DELETE FROM alarms WHERE id = ?1", [id])?;
        if n == 0 {
            debug!(alarm_id = id, "delete of unknown alarm ignored");
            return Ok(());
        }
        debug!(alarm_id = id, "alarm deleted");
        self.publish(&conn);
        Ok(())
    }

    fn get_by_id(&self, id: AlarmId) -> Result<Option<AlarmRecord>> {
        let conn = self.conn();
        match conn.query_row(
            &format!("{SELECT_COLUMNS} WHERE id = ?1"),
            [id],
            row_to_record,
        ) {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(AlarmError::Store(e)),
        }
    }

    fn list_all(&self) -> Result<Vec<AlarmRecord>> {
        query_all(&self.conn())
    }

    fn delete_all(&self) -> Result<()> {
        let conn = self.conn();
        let n = conn.execute("DELETE FROM alarms", [])?;
        info!(count = n, "all alarms deleted");
        self.publish(&conn);
        Ok(())
    }

    fn data_version(&self) -> Result<i64> {
        let version = self
            .conn()
            .query_row("PRAGMA data_version", [], |row| row.get(0))?;
        Ok(version)
    }

    fn observe_all(&self) -> watch::Receiver<Vec<AlarmRecord>> {
        self.snapshots.subscribe()
    }
}

fn query_all(conn: &Connection) -> Result<Vec<AlarmRecord>> {
    let mut stmt = conn.prepare_cached(&format!("{SELECT_COLUMNS} ORDER BY hour, minute, id"))?;
    let records = stmt
        .query_map([], row_to_record)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(records)
}

/// Map a SQLite row to an `AlarmRecord`.
fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<AlarmRecord> {
    Ok(AlarmRecord {
        id: row.get(0)?,
        hour: row.get(1)?,
        minute: row.get(2)?,
        enabled: row.get(3)?,
        weekdays: WeekdaySet::from_bits(row.get(4)?),
        vibration_enabled: row.get(5)?,
        sound_uri: row.get(6)?,
    })
}
