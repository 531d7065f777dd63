//! SQLite access for the analysis database.
//!
//! [`AnalysisDb`] owns the connection and the schema; [`Writer`] consumes
//! the walker's stream. The writer keeps exactly one module "open" at a
//! time: entity rows are counted against it, and when the next module
//! record arrives the open module's row is stamped with its final item
//! count and an `OK` status. Work committed for a module is never undone by
//! a later crash, which is what makes interrupted runs resumable.
//!
//! Foreign keys stay enforced except for the single statement inserting a
//! parentless root row. SQLite ignores `PRAGMA foreign_keys` inside a
//! transaction, so that statement runs in its own commit bracket.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::Serialize;

use crate::model::{Emit, ModuleStatus};
use crate::table::{Record, ALL_TABLES};

pub struct AnalysisDb {
    conn: Connection,
}

impl AnalysisDb {
    /// Open (creating if needed) the database at `path` and ensure the full
    /// schema exists. This is the one place where storage errors are fatal.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database {}", path.display()))?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .pragma_update(None, "foreign_keys", true)
            .context("Failed to enable foreign keys")?;
        self.conn
            .pragma_update(None, "journal_mode", "WAL")
            .context("Failed to set journal mode")?;
        for spec in ALL_TABLES {
            self.conn
                .execute_batch(&spec.create_ddl())
                .with_context(|| format!("Failed to create table {}", spec.name))?;
        }
        Ok(())
    }

    /// Names of modules recorded by earlier runs, selected by final status.
    /// Any storage error degrades to the empty set with a warning; redoing a
    /// module is always safe, losing one is not.
    pub fn stored_modules(&self, successful: bool, failed: bool) -> HashSet<String> {
        match self.try_stored_modules(successful, failed) {
            Ok(names) => names,
            Err(err) => {
                eprintln!("[houscan] Warning: could not read stored modules: {err}");
                HashSet::new()
            }
        }
    }

    fn try_stored_modules(&self, successful: bool, failed: bool) -> Result<HashSet<String>> {
        let exists: Option<String> = self
            .conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'modules'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        let mut names = HashSet::new();
        if exists.is_none() {
            return Ok(names);
        }
        if successful {
            let mut stmt = self
                .conn
                .prepare("SELECT name FROM modules WHERE status = 'OK'")?;
            for name in stmt.query_map([], |row| row.get::<_, String>(0))? {
                names.insert(name?);
            }
        }
        if failed {
            let mut stmt = self
                .conn
                .prepare("SELECT name FROM modules WHERE status <> 'OK'")?;
            for name in stmt.query_map([], |row| row.get::<_, String>(0))? {
                names.insert(name?);
            }
        }
        Ok(names)
    }

    pub fn stats(&self) -> Result<DbStats> {
        let total: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM modules", [], |row| row.get(0))?;
        let ok: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM modules WHERE status = 'OK'",
            [],
            |row| row.get(0),
        )?;
        let ignored: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM modules WHERE status = 'IGNORE'",
            [],
            |row| row.get(0),
        )?;
        let entities: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM module_data", [], |row| row.get(0))?;
        let mut kinds = BTreeMap::new();
        let mut stmt = self
            .conn
            .prepare("SELECT kind, COUNT(*) FROM module_data GROUP BY kind ORDER BY kind")?;
        for row in stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))? {
            let (kind, count) = row?;
            kinds.insert(kind, count);
        }
        Ok(DbStats {
            modules: total,
            modules_ok: ok,
            modules_ignored: ignored,
            modules_failed: total - ok - ignored,
            entities,
            entities_by_kind: kinds,
        })
    }

    /// Delete all stored rows, keeping the schema.
    pub fn clear(&self) -> Result<()> {
        // Reverse creation order so referencing tables empty first.
        for spec in ALL_TABLES.iter().rev() {
            self.conn
                .execute(&format!("DELETE FROM {}", spec.name), [])
                .with_context(|| format!("Failed to clear table {}", spec.name))?;
        }
        Ok(())
    }

    pub fn vacuum(&self) -> Result<()> {
        self.conn
            .execute_batch("VACUUM")
            .context("Failed to vacuum database")?;
        Ok(())
    }

    pub fn writer(&mut self) -> Writer<'_> {
        Writer {
            db: self,
            in_txn: false,
            current: None,
            item_count: 0,
            totals: WriteTotals::default(),
        }
    }

    fn insert(&self, record: &dyn Record) -> Result<()> {
        let spec = record.spec();
        let mut stmt = self.conn.prepare_cached(&spec.insert_sql())?;
        stmt.execute(params_from_iter(record.values()))
            .with_context(|| format!("Failed to insert into {}", spec.name))?;
        Ok(())
    }
}

/// Table counts reported by the `stats` subcommand.
#[derive(Debug, Serialize)]
pub struct DbStats {
    pub modules: i64,
    pub modules_ok: i64,
    pub modules_ignored: i64,
    pub modules_failed: i64,
    pub entities: i64,
    pub entities_by_kind: BTreeMap<String, i64>,
}

#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct WriteTotals {
    pub modules_opened: u64,
    pub modules_failed: u64,
    pub modules_ignored: u64,
    pub entities: u64,
}

/// Streaming consumer of [`Emit`] values.
pub struct Writer<'a> {
    db: &'a AnalysisDb,
    in_txn: bool,
    /// Name of the module whose items are currently streaming.
    current: Option<String>,
    item_count: i64,
    totals: WriteTotals,
}

impl Writer<'_> {
    pub fn write(&mut self, emit: &Emit) -> Result<()> {
        match emit {
            Emit::Module(rec) => {
                self.finalize_current()?;
                self.begin()?;
                self.db.insert(rec)?;
                self.commit()?;
                match &rec.status {
                    None => {
                        self.current = Some(rec.name.clone());
                        self.item_count = 0;
                        self.totals.modules_opened += 1;
                    }
                    Some(ModuleStatus::Ignore) => self.totals.modules_ignored += 1,
                    Some(ModuleStatus::Failed(_)) => self.totals.modules_failed += 1,
                    Some(ModuleStatus::Ok) => {}
                }
            }
            Emit::Entity(entity) => {
                self.item_count += 1;
                self.totals.entities += 1;
                if entity.parent_name.is_some() {
                    self.begin()?;
                    self.db.insert(entity)?;
                    if self.item_count % 100 == 0 {
                        self.commit()?;
                    }
                } else {
                    // Root row: FK off for this one statement, and the
                    // pragma only takes effect outside a transaction.
                    self.commit()?;
                    self.db.conn.pragma_update(None, "foreign_keys", false)?;
                    let root = self.db.insert(entity);
                    self.db.conn.pragma_update(None, "foreign_keys", true)?;
                    root?;
                }
            }
        }
        Ok(())
    }

    /// Stamp the open module's row with its item count and `OK` status.
    fn finalize_current(&mut self) -> Result<()> {
        let Some(name) = self.current.take() else {
            return Ok(());
        };
        self.begin()?;
        self.db.conn.execute(
            "UPDATE modules SET count = ?1, status = 'OK', reason = NULL WHERE name = ?2",
            params![self.item_count, name],
        )?;
        self.commit()?;
        self.item_count = 0;
        Ok(())
    }

    /// Finalize the open module and return run totals.
    pub fn finish(mut self) -> Result<WriteTotals> {
        self.finalize_current()?;
        self.commit()?;
        Ok(self.totals)
    }

    fn begin(&mut self) -> Result<()> {
        if !self.in_txn {
            self.db.conn.execute_batch("BEGIN")?;
            self.in_txn = true;
        }
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        if self.in_txn {
            self.db.conn.execute_batch("COMMIT")?;
            self.in_txn = false;
        }
        Ok(())
    }
}

impl Drop for Writer<'_> {
    fn drop(&mut self) {
        // Leave no dangling transaction if the pipeline bails mid-module.
        let _ = self.commit();
    }
}
