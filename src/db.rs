//! Relational storage of the clinic, on top of SQLite.
//!
//! One [`Database`] owns the connection. The queries are split by concern:
//! `access` (permissions, roles, users), `registry` (doctors, insurance
//! providers, patients) and `ledger` (appointments and the daily report).

mod access;
mod ledger;
mod registry;

pub use access::{NewRole, UserChanges};

use std::{fs::create_dir_all, io, path::Path};

use log::info;
use rusqlite::{ffi, Connection, ErrorCode};
use thiserror::Error;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS permissions (
    id          INTEGER PRIMARY KEY,
    name        TEXT NOT NULL UNIQUE,
    description TEXT
);

CREATE TABLE IF NOT EXISTS roles (
    id          INTEGER PRIMARY KEY,
    name        TEXT NOT NULL UNIQUE,
    description TEXT
);

CREATE TABLE IF NOT EXISTS role_permissions (
    role_id       INTEGER NOT NULL REFERENCES roles(id) ON DELETE CASCADE,
    permission_id INTEGER NOT NULL REFERENCES permissions(id) ON DELETE CASCADE,
    PRIMARY KEY (role_id, permission_id)
);

CREATE TABLE IF NOT EXISTS users (
    id            INTEGER PRIMARY KEY,
    username      TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    full_name     TEXT,
    role_id       INTEGER REFERENCES roles(id) ON DELETE SET NULL
);

CREATE TABLE IF NOT EXISTS doctors (
    id         INTEGER PRIMARY KEY,
    first_name TEXT NOT NULL,
    last_name  TEXT NOT NULL,
    specialty  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS insurance_providers (
    id   INTEGER PRIMARY KEY,
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS appointments (
    id                    INTEGER PRIMARY KEY,
    datetime              TEXT NOT NULL,
    patient_id            INTEGER NOT NULL REFERENCES patients(id),
    doctor_id             INTEGER NOT NULL REFERENCES doctors(id),
    specialty             TEXT NOT NULL,
    price_cents           INTEGER NOT NULL CHECK (price_cents >= 0),
    uses_insurance        INTEGER NOT NULL DEFAULT 0,
    insurance_provider_id INTEGER REFERENCES insurance_providers(id),
    paid                  INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS appointments_datetime ON appointments(datetime);
";

const PATIENTS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS patients (
    id                    INTEGER PRIMARY KEY,
    first_name            TEXT NOT NULL,
    last_name             TEXT NOT NULL,
    national_id           TEXT NOT NULL UNIQUE,
    phone                 TEXT,
    address               TEXT,
    insurance_provider_id INTEGER REFERENCES insurance_providers(id)
);
";

const FOREIGN_KEY_MESSAGE: &str = "FOREIGN KEY constraint failed";

pub struct Database {
    conn: Connection,
}

#[derive(Debug, Error)]
pub enum DBError {
    #[error("Storage failure: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Cannot prepare the database location: {0}")]
    Io(#[from] io::Error),
}

impl DBError {
    /// The write was refused by a `UNIQUE` constraint.
    pub fn is_unique_violation(&self) -> bool {
        self.constraint_code() == Some(ffi::SQLITE_CONSTRAINT_UNIQUE)
    }

    /// The write was refused by a `FOREIGN KEY` constraint.
    ///
    /// Databases created with `ON DELETE RESTRICT` columns report the refusal
    /// through the trigger code, with the foreign key message.
    pub fn is_foreign_key_violation(&self) -> bool {
        match self.constraint_code() {
            Some(ffi::SQLITE_CONSTRAINT_FOREIGNKEY) => true,
            Some(ffi::SQLITE_CONSTRAINT_TRIGGER) => {
                self.constraint_message() == Some(FOREIGN_KEY_MESSAGE)
            }
            _ => false,
        }
    }

    fn constraint_message(&self) -> Option<&str> {
        match self {
            DBError::Sqlite(rusqlite::Error::SqliteFailure(_, message)) => message.as_deref(),
            _ => None,
        }
    }

    fn constraint_code(&self) -> Option<i32> {
        match self {
            DBError::Sqlite(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                Some(err.extended_code)
            }
            _ => None,
        }
    }
}

impl Database {
    /// Opens (or creates) the database file and makes sure the schema exists.
    pub fn open(path: &Path) -> Result<Self, DBError> {
        if let Some(parent_dir) = path.parent() {
            if !parent_dir.as_os_str().is_empty() && !parent_dir.exists() {
                create_dir_all(parent_dir)?;
            }
        }

        if !path.exists() {
            info!("DB file not found, creating new database at {}", path.display());
        }

        Self::init(Connection::open(path)?)
    }

    /// A private database living in memory, used by tests and dry runs.
    pub fn open_in_memory() -> Result<Self, DBError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, DBError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(PATIENTS_TABLE)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Drops the patient table and creates it again, empty.
    ///
    /// Fails while appointments still reference patients.
    pub fn recreate_patients(&mut self) -> Result<(), DBError> {
        let tx = self.conn.transaction()?;
        tx.execute_batch("DROP TABLE IF EXISTS patients;")?;
        tx.execute_batch(PATIENTS_TABLE)?;
        tx.commit()?;
        info!("Patient table recreated");
        Ok(())
    }

    fn count(&self, table: &'static str) -> Result<i64, DBError> {
        let count = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
        Ok(count)
    }
}
