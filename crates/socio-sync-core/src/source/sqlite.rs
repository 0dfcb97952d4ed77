//! SQLite-backed ledger reader.

use super::SourceReader;
use crate::config::SyncDefaults;
use crate::error::{Result, SyncError};
use crate::models::SourceRecord;
use rusqlite::{params, params_from_iter, Connection, OpenFlags, OptionalExtension, Row};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

const SELECT_COLUMNS: &str = "SELECT CodigoEmpresa, PorParticipacion, Administrador,
        CargoAdministrador, DNI, RazonSocialEmpleado
     FROM Socios";

const VALID_FILTER: &str = "DNI IS NOT NULL AND DNI != ''";

/// Larger exclusion sets are filtered in memory instead of in SQL, to stay
/// under SQLite's bound-parameter limit.
const MAX_EXCLUDE_PARAMS: usize = 900;

/// Ledger stored in a SQLite database with a `Socios` table.
#[derive(Debug)]
pub struct SqliteLedger {
    db_path: Option<PathBuf>,
    conn: Arc<Mutex<Connection>>,
}

impl SqliteLedger {
    /// Open an existing ledger read-only.
    pub fn open(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if !db_path.exists() {
            return Err(SyncError::Connectivity {
                target: "ledger".to_string(),
                message: format!("database not found at {}", db_path.display()),
            });
        }

        let conn = Connection::open_with_flags(
            &db_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| SyncError::Connectivity {
            target: "ledger".to_string(),
            message: format!("failed to open {}: {}", db_path.display(), e),
        })?;
        conn.busy_timeout(SyncDefaults::LEDGER_BUSY_TIMEOUT)?;

        debug!("Opened ledger at {}", db_path.display());
        Ok(Self {
            db_path: Some(db_path),
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create (or open for writing) a ledger file and ensure the schema.
    pub fn create(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        let conn = Connection::open(db_path)?;
        Self::ensure_schema(&conn)?;
        Ok(Self {
            db_path: Some(db_path.to_path_buf()),
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory ledger with the schema in place.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::ensure_schema(&conn)?;
        Ok(Self {
            db_path: None,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn ensure_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS Socios (
                CodigoEmpresa INTEGER NOT NULL,
                PorParticipacion REAL NOT NULL DEFAULT 0,
                Administrador INTEGER NOT NULL DEFAULT 0,
                CargoAdministrador TEXT,
                DNI TEXT,
                RazonSocialEmpleado TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_socios_dni ON Socios(DNI);",
        )?;
        Ok(())
    }

    /// Insert a row. Used to seed fixture and demo ledgers.
    pub fn insert(&self, record: &SourceRecord) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO Socios (CodigoEmpresa, PorParticipacion, Administrador,
                                 CargoAdministrador, DNI, RazonSocialEmpleado)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.company_code,
                record.participation_percent,
                record.is_administrator,
                record.administrator_role,
                record.national_id,
                record.legal_name,
            ],
        )?;
        Ok(())
    }

    /// Run arbitrary SQL against the ledger. Test fixtures only.
    #[cfg(test)]
    pub(crate) fn execute_raw(&self, sql: &str) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute_batch(sql)?;
        Ok(())
    }

    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| SyncError::Database {
            message: "Failed to acquire ledger connection lock".to_string(),
            source: None,
        })
    }

    fn row_to_record(row: &Row) -> rusqlite::Result<SourceRecord> {
        let role: Option<String> = row.get(3)?;
        let legal_name: Option<String> = row.get(5)?;
        Ok(SourceRecord {
            company_code: row.get(0)?,
            participation_percent: row.get(1)?,
            is_administrator: row.get(2)?,
            administrator_role: role.unwrap_or_default(),
            national_id: row.get(4)?,
            legal_name: legal_name.unwrap_or_default(),
        })
    }

    /// Run a select and collect valid records, skipping unscannable rows.
    fn query_records(&self, sql: &str, args: &[String]) -> Result<Vec<SourceRecord>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(sql).map_err(load_error)?;
        let mut rows = stmt.query(params_from_iter(args.iter())).map_err(load_error)?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().map_err(load_error)? {
            match Self::row_to_record(row) {
                Ok(record) if record.is_valid() => records.push(record),
                Ok(_) => {}
                Err(e) => {
                    let err = SyncError::RowScan {
                        message: e.to_string(),
                    };
                    warn!("{}", err);
                }
            }
        }

        Ok(records)
    }
}

fn load_error(err: rusqlite::Error) -> SyncError {
    SyncError::Load {
        message: err.to_string(),
        source: Some(err),
    }
}

impl SourceReader for SqliteLedger {
    fn ping(&self) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map_err(|e| SyncError::Connectivity {
                target: "ledger".to_string(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<SourceRecord>> {
        let sql = format!("{} WHERE {} ORDER BY DNI", SELECT_COLUMNS, VALID_FILTER);
        let records = self.query_records(&sql, &[])?;
        debug!("Loaded {} socios from ledger", records.len());
        Ok(records)
    }

    fn load_excluding(&self, keys: &HashSet<String>) -> Result<Vec<SourceRecord>> {
        if keys.is_empty() {
            return self.load_all();
        }

        if keys.len() > MAX_EXCLUDE_PARAMS {
            let mut records = self.load_all()?;
            records.retain(|record| !keys.contains(&record.national_id));
            return Ok(records);
        }

        let mut args: Vec<String> = keys.iter().cloned().collect();
        args.sort();
        let placeholders = (1..=args.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "{} WHERE {} AND DNI NOT IN ({}) ORDER BY DNI",
            SELECT_COLUMNS, VALID_FILTER, placeholders
        );
        self.query_records(&sql, &args)
    }

    fn count_valid(&self) -> Result<usize> {
        let conn = self.lock_conn()?;
        let count: i64 = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM Socios WHERE {}", VALID_FILTER),
                [],
                |row| row.get(0),
            )
            .map_err(load_error)?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    fn get_by_national_id(&self, national_id: &str) -> Result<Option<SourceRecord>> {
        if national_id.is_empty() {
            return Err(SyncError::Validation {
                field: "national_id".to_string(),
                message: "DNI cannot be empty".to_string(),
            });
        }

        let conn = self.lock_conn()?;
        let record = conn
            .query_row(
                &format!("{} WHERE DNI = ?1", SELECT_COLUMNS),
                params![national_id],
                Self::row_to_record,
            )
            .optional()
            .map_err(load_error)?;
        Ok(record)
    }
}
