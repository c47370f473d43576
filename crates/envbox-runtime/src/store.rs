//! Durable environment records and metric history in SQLite.
//!
//! The store is the source of truth across restarts; the in-memory
//! [`Registry`](crate::registry::Registry) is a cache in front of it.
//!
//! A namespace can be reused after termination, so every sample is tagged
//! with the `created_at` of the environment it was taken for. History and
//! latest-sample queries only ever return rows of one incarnation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use envbox_common::error::{EnvboxError, Result};
use envbox_common::types::{LifecycleState, Namespace, ResourceRequest, UnitId};
use rusqlite::types::ToSql;
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::environment::Environment;
use crate::metrics::{MetricSample, SampleSummary};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS environments (
    namespace        TEXT PRIMARY KEY,
    command          TEXT NOT NULL,
    cpu              REAL NOT NULL,
    memory_mb        INTEGER NOT NULL,
    io_weight        INTEGER NOT NULL,
    status           TEXT NOT NULL,
    unit_name        TEXT,
    main_pid         INTEGER,
    log_path         TEXT,
    created_at       TEXT NOT NULL,
    last_status      TEXT,
    last_pid         INTEGER,
    process_name     TEXT,
    last_cpu_percent REAL,
    last_memory_mb   REAL,
    last_sample_at   TEXT
);
CREATE TABLE IF NOT EXISTS env_metrics (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    namespace      TEXT NOT NULL,
    incarnation    TEXT NOT NULL,
    ts             TEXT NOT NULL,
    status         TEXT NOT NULL,
    cpu_percent    REAL NOT NULL,
    memory_mb      REAL NOT NULL,
    io_read_bytes  INTEGER NOT NULL,
    io_write_bytes INTEGER NOT NULL,
    pid            INTEGER,
    process_name   TEXT
);
CREATE INDEX IF NOT EXISTS env_metrics_namespace_id ON env_metrics (namespace, id);
";

const ENV_COLUMNS: &str = "namespace, command, cpu, memory_mb, io_weight, status, unit_name, \
     main_pid, log_path, created_at, last_status, last_pid, process_name, last_cpu_percent, \
     last_memory_mb, last_sample_at";

const SAMPLE_COLUMNS: &str =
    "namespace, ts, status, cpu_percent, memory_mb, io_read_bytes, io_write_bytes, pid, process_name";

/// SQLite-backed persistence for environments and samples.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Opens (creating if needed) the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created or the
    /// database cannot be opened or migrated.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| EnvboxError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let conn = Connection::open(path).map_err(storage)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .map_err(storage)?;
        tracing::debug!(path = %path.display(), "opened environment store");
        Self::init(conn)
    }

    /// Opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory().map_err(storage)?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA).map_err(storage)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Inserts a new environment.
    ///
    /// Returns `false` if the namespace is already taken.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn insert_environment(&self, env: &Environment) -> Result<bool> {
        let row = EnvRow::from(env);
        let changed = self
            .conn()
            .execute(
                &format!(
                    "INSERT OR IGNORE INTO environments ({ENV_COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)"
                ),
                &row.params()[..],
            )
            .map_err(storage)?;
        Ok(changed == 1)
    }

    /// Writes the current state of an existing or new environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn save_environment(&self, env: &Environment) -> Result<()> {
        let row = EnvRow::from(env);
        let _ = self
            .conn()
            .execute(
                &format!(
                    "INSERT OR REPLACE INTO environments ({ENV_COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)"
                ),
                &row.params()[..],
            )
            .map_err(storage)?;
        Ok(())
    }

    /// Loads one environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the row is corrupt.
    pub fn load_environment(&self, namespace: &Namespace) -> Result<Option<Environment>> {
        let row = self
            .conn()
            .query_row(
                &format!("SELECT {ENV_COLUMNS} FROM environments WHERE namespace = ?1"),
                params![namespace.as_str()],
                EnvRow::read,
            )
            .optional()
            .map_err(storage)?;
        row.map(Environment::try_from).transpose()
    }

    /// Returns whether a record exists for `namespace`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn contains(&self, namespace: &Namespace) -> Result<bool> {
        self.conn()
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM environments WHERE namespace = ?1)",
                params![namespace.as_str()],
                |row| row.get(0),
            )
            .map_err(storage)
    }

    /// Lists every stored environment ordered by namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row is corrupt.
    pub fn list_environments(&self) -> Result<Vec<Environment>> {
        let rows = {
            let conn = self.conn();
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {ENV_COLUMNS} FROM environments ORDER BY namespace"
                ))
                .map_err(storage)?;
            stmt
                .query_map([], EnvRow::read)
                .map_err(storage)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(storage)?
        };
        rows.into_iter().map(Environment::try_from).collect()
    }

    /// Deletes an environment record. Returns `false` if there was none.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn delete_environment(&self, namespace: &Namespace) -> Result<bool> {
        let changed = self
            .conn()
            .execute(
                "DELETE FROM environments WHERE namespace = ?1",
                params![namespace.as_str()],
            )
            .map_err(storage)?;
        Ok(changed > 0)
    }

    /// Appends a metric sample taken for the environment created at
    /// `incarnation`.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn append_sample(&self, sample: &MetricSample, incarnation: DateTime<Utc>) -> Result<()> {
        let _ = self
            .conn()
            .execute(
                &format!(
                    "INSERT INTO env_metrics (incarnation, {SAMPLE_COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
                ),
                params![
                    timestamp(incarnation),
                    sample.namespace.as_str(),
                    timestamp(sample.timestamp),
                    sample.status.as_str(),
                    f64::from(sample.cpu_percent),
                    sample.resident_memory_mb,
                    sample.io_read_bytes,
                    sample.io_write_bytes,
                    sample.pid,
                    sample.process_name,
                ],
            )
            .map_err(storage)?;
        Ok(())
    }

    /// Returns the metric history of `namespace`, oldest first.
    ///
    /// Only the current environment's samples are returned; for a namespace
    /// with no live record, those of its most recent incarnation.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row is corrupt.
    pub fn samples(&self, namespace: &Namespace) -> Result<Vec<MetricSample>> {
        let rows = {
            let conn = self.conn();
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {SAMPLE_COLUMNS} FROM env_metrics \
                     WHERE namespace = ?1 AND incarnation = COALESCE( \
                         (SELECT created_at FROM environments WHERE namespace = ?1), \
                         (SELECT incarnation FROM env_metrics WHERE namespace = ?1 \
                          ORDER BY id DESC LIMIT 1)) \
                     ORDER BY id"
                ))
                .map_err(storage)?;
            stmt
                .query_map(params![namespace.as_str()], SampleRow::read)
                .map_err(storage)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(storage)?
        };
        rows.into_iter().map(MetricSample::try_from).collect()
    }

    /// Returns the most recent sample of every stored environment.
    ///
    /// Samples left behind by a terminated environment of the same name are
    /// never reported for its successor.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row is corrupt.
    pub fn latest_samples(&self) -> Result<HashMap<Namespace, MetricSample>> {
        let rows = {
            let conn = self.conn();
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {SAMPLE_COLUMNS} FROM env_metrics WHERE id IN \
                     (SELECT MAX(m.id) FROM env_metrics m \
                      JOIN environments e \
                        ON e.namespace = m.namespace AND e.created_at = m.incarnation \
                      GROUP BY m.namespace)"
                ))
                .map_err(storage)?;
            stmt
                .query_map([], SampleRow::read)
                .map_err(storage)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(storage)?
        };
        rows.into_iter()
            .map(|row| MetricSample::try_from(row).map(|s| (s.namespace.clone(), s)))
            .collect()
    }

    /// Deletes the metric history of `namespace`.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn purge_samples(&self, namespace: &Namespace) -> Result<usize> {
        self.conn()
            .execute(
                "DELETE FROM env_metrics WHERE namespace = ?1",
                params![namespace.as_str()],
            )
            .map_err(storage)
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

#[allow(clippy::needless_pass_by_value)]
fn storage(e: rusqlite::Error) -> EnvboxError {
    EnvboxError::Storage {
        message: e.to_string(),
    }
}

fn timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| EnvboxError::Storage {
            message: format!("corrupt timestamp {value:?}: {e}"),
        })
}

/// Column values of one `environments` row.
struct EnvRow {
    namespace: String,
    command: String,
    cpu: f64,
    memory_mb: u64,
    io_weight: u32,
    status: String,
    unit_name: Option<String>,
    main_pid: Option<u32>,
    log_path: Option<String>,
    created_at: String,
    last_status: Option<String>,
    last_pid: Option<u32>,
    process_name: Option<String>,
    last_cpu_percent: Option<f64>,
    last_memory_mb: Option<f64>,
    last_sample_at: Option<String>,
}

impl EnvRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            namespace: row.get(0)?,
            command: row.get(1)?,
            cpu: row.get(2)?,
            memory_mb: row.get(3)?,
            io_weight: row.get(4)?,
            status: row.get(5)?,
            unit_name: row.get(6)?,
            main_pid: row.get(7)?,
            log_path: row.get(8)?,
            created_at: row.get(9)?,
            last_status: row.get(10)?,
            last_pid: row.get(11)?,
            process_name: row.get(12)?,
            last_cpu_percent: row.get(13)?,
            last_memory_mb: row.get(14)?,
            last_sample_at: row.get(15)?,
        })
    }

    fn params(&self) -> [&dyn ToSql; 16] {
        [
            &self.namespace,
            &self.command,
            &self.cpu,
            &self.memory_mb,
            &self.io_weight,
            &self.status,
            &self.unit_name,
            &self.main_pid,
            &self.log_path,
            &self.created_at,
            &self.last_status,
            &self.last_pid,
            &self.process_name,
            &self.last_cpu_percent,
            &self.last_memory_mb,
            &self.last_sample_at,
        ]
    }
}

impl From<&Environment> for EnvRow {
    fn from(env: &Environment) -> Self {
        let last = env.last_sample.as_ref();
        Self {
            namespace: env.namespace.to_string(),
            command: env.command.clone(),
            cpu: env.resources.cpu,
            memory_mb: env.resources.memory_mb,
            io_weight: env.resources.io_weight,
            status: env.status.as_str().to_string(),
            unit_name: env.unit.as_ref().map(ToString::to_string),
            main_pid: env.main_pid,
            log_path: env
                .log_path
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
            created_at: timestamp(env.created_at),
            last_status: last.map(|s| s.status.as_str().to_string()),
            last_pid: last.and_then(|s| s.pid),
            process_name: last.and_then(|s| s.process_name.clone()),
            last_cpu_percent: last.map(|s| f64::from(s.cpu_percent)),
            last_memory_mb: last.map(|s| s.resident_memory_mb),
            last_sample_at: last.map(|s| timestamp(s.timestamp)),
        }
    }
}

impl TryFrom<EnvRow> for Environment {
    type Error = EnvboxError;

    #[allow(clippy::cast_possible_truncation)]
    fn try_from(row: EnvRow) -> Result<Self> {
        let last_sample = match (row.last_sample_at, row.last_status) {
            (Some(at), Some(status)) => Some(SampleSummary {
                timestamp: parse_timestamp(&at)?,
                status: status.parse::<LifecycleState>()?,
                cpu_percent: row.last_cpu_percent.unwrap_or_default() as f32,
                resident_memory_mb: row.last_memory_mb.unwrap_or_default(),
                pid: row.last_pid,
                process_name: row.process_name,
            }),
            _ => None,
        };

        Ok(Self {
            namespace: Namespace::new(row.namespace)?,
            command: row.command,
            resources: ResourceRequest {
                cpu: row.cpu,
                memory_mb: row.memory_mb,
                io_weight: row.io_weight,
            },
            status: row.status.parse()?,
            unit: row.unit_name.map(UnitId::new),
            main_pid: row.main_pid,
            log_path: row.log_path.map(PathBuf::from),
            created_at: parse_timestamp(&row.created_at)?,
            last_sample,
        })
    }
}

/// Column values of one `env_metrics` row.
struct SampleRow {
    namespace: String,
    ts: String,
    status: String,
    cpu_percent: f64,
    memory_mb: f64,
    io_read_bytes: u64,
    io_write_bytes: u64,
    pid: Option<u32>,
    process_name: Option<String>,
}

impl SampleRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            namespace: row.get(0)?,
            ts: row.get(1)?,
            status: row.get(2)?,
            cpu_percent: row.get(3)?,
            memory_mb: row.get(4)?,
            io_read_bytes: row.get(5)?,
            io_write_bytes: row.get(6)?,
            pid: row.get(7)?,
            process_name: row.get(8)?,
        })
    }
}

impl TryFrom<SampleRow> for MetricSample {
    type Error = EnvboxError;

    #[allow(clippy::cast_possible_truncation)]
    fn try_from(row: SampleRow) -> Result<Self> {
        Ok(Self {
            namespace: Namespace::new(row.namespace)?,
            timestamp: parse_timestamp(&row.ts)?,
            status: row.status.parse()?,
            cpu_percent: row.cpu_percent as f32,
            resident_memory_mb: row.memory_mb,
            io_read_bytes: row.io_read_bytes,
            io_write_bytes: row.io_write_bytes,
            pid: row.pid,
            process_name: row.process_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use chrono::Duration;

    use super::*;
    use crate::backend::Launched;

    fn ns(name: &str) -> Namespace {
        Namespace::new(name).unwrap()
    }

    fn env(name: &str) -> Environment {
        Environment::new(ns(name), "sleep 1", ResourceRequest::default())
    }

    fn stored(store: &Store, name: &str) -> Environment {
        let env = env(name);
        assert!(store.insert_environment(&env).unwrap());
        env
    }

    fn sample(name: &str, status: LifecycleState, cpu: f32) -> MetricSample {
        MetricSample {
            cpu_percent: cpu,
            ..MetricSample::zeroed(ns(name), status, Utc::now(), Some(10))
        }
    }

    #[test]
    fn insert_refuses_duplicates() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.insert_environment(&env("a")).unwrap());
        assert!(!store.insert_environment(&env("a")).unwrap());
        assert!(store.contains(&ns("a")).unwrap());
        assert!(!store.contains(&ns("b")).unwrap());
    }

    #[test]
    fn saved_environment_round_trips() {
        let store = Store::open_in_memory().unwrap();
        let mut original = env("web");
        original.mark_launched(&Launched {
            unit: UnitId::new("envbox-web-12345678.service"),
            pid: Some(4321),
            log_path: PathBuf::from("/tmp/web/output.log"),
        });
        original.record_sample(&sample("web", LifecycleState::Running, 3.5));
        store.save_environment(&original).unwrap();

        let loaded = store.load_environment(&ns("web")).unwrap().unwrap();
        assert_eq!(loaded.status(), LifecycleState::Running);
        assert_eq!(loaded.unit(), original.unit());
        assert_eq!(loaded.main_pid(), Some(4321));
        assert_eq!(loaded.log_path(), original.log_path());
        assert_eq!(loaded.created_at(), original.created_at());
        let last = loaded.last_sample().unwrap();
        assert!((last.cpu_percent - 3.5).abs() < f32::EPSILON);
        assert_eq!(last.pid, Some(10));
    }

    #[test]
    fn delete_removes_only_the_named_row() {
        let store = Store::open_in_memory().unwrap();
        let _ = store.insert_environment(&env("a")).unwrap();
        let _ = store.insert_environment(&env("b")).unwrap();
        assert!(store.delete_environment(&ns("a")).unwrap());
        assert!(!store.delete_environment(&ns("a")).unwrap());
        let names: Vec<_> = store
            .list_environments()
            .unwrap()
            .into_iter()
            .map(|e| e.namespace().to_string())
            .collect();
        assert_eq!(names, ["b"]);
    }

    #[test]
    fn latest_sample_is_the_last_appended() {
        let store = Store::open_in_memory().unwrap();
        let a = stored(&store, "a").created_at();
        let b = stored(&store, "b").created_at();
        store.append_sample(&sample("a", LifecycleState::Running, 1.0), a).unwrap();
        store.append_sample(&sample("a", LifecycleState::Finished, 2.0), a).unwrap();
        store.append_sample(&sample("b", LifecycleState::Running, 9.0), b).unwrap();

        let latest = store.latest_samples().unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[&ns("a")].status, LifecycleState::Finished);
        assert!((latest[&ns("a")].cpu_percent - 2.0).abs() < f32::EPSILON);
        assert_eq!(store.samples(&ns("a")).unwrap().len(), 2);
    }

    #[test]
    fn purge_clears_history_of_one_namespace() {
        let store = Store::open_in_memory().unwrap();
        let a = stored(&store, "a").created_at();
        let b = stored(&store, "b").created_at();
        store.append_sample(&sample("a", LifecycleState::Running, 1.0), a).unwrap();
        store.append_sample(&sample("b", LifecycleState::Running, 1.0), b).unwrap();
        assert_eq!(store.purge_samples(&ns("a")).unwrap(), 1);
        assert!(store.samples(&ns("a")).unwrap().is_empty());
        assert_eq!(store.samples(&ns("b")).unwrap().len(), 1);
    }

    #[test]
    fn sample_timestamps_keep_microseconds() {
        let store = Store::open_in_memory().unwrap();
        let ts = Utc::now() - Duration::minutes(5);
        let mut s = sample("a", LifecycleState::Running, 0.0);
        s.timestamp = ts;
        store.append_sample(&s, Utc::now()).unwrap();
        let read = &store.samples(&ns("a")).unwrap()[0];
        assert!((read.timestamp - ts).num_microseconds().unwrap().abs() < 1);
    }

    #[test]
    fn reused_namespace_does_not_inherit_history() {
        let store = Store::open_in_memory().unwrap();
        let first = stored(&store, "a").created_at();
        store.append_sample(&sample("a", LifecycleState::Running, 4.0), first).unwrap();
        store.append_sample(&sample("a", LifecycleState::Terminated, 0.0), first).unwrap();
        assert!(store.delete_environment(&ns("a")).unwrap());

        // With no live record the last incarnation's history stays readable.
        assert_eq!(store.samples(&ns("a")).unwrap().len(), 2);
        assert!(store.latest_samples().unwrap().is_empty());

        let mut next = env("a");
        next.created_at = first + Duration::seconds(1);
        assert!(store.insert_environment(&next).unwrap());
        assert!(store.samples(&ns("a")).unwrap().is_empty());
        assert!(store.latest_samples().unwrap().is_empty());

        store
            .append_sample(&sample("a", LifecycleState::Running, 7.0), next.created_at())
            .unwrap();
        let history = store.samples(&ns("a")).unwrap();
        assert_eq!(history.len(), 1);
        assert!((history[0].cpu_percent - 7.0).abs() < f32::EPSILON);
        assert_eq!(store.latest_samples().unwrap()[&ns("a")].status, LifecycleState::Running);
    }

    #[test]
    fn file_database_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("envbox.db");
        {
            let store = Store::open(&path).unwrap();
            let _ = store.insert_environment(&env("kept")).unwrap();
        }
        let store = Store::open(&path).unwrap();
        assert!(store.load_environment(&ns("kept")).unwrap().is_some());
    }
}
