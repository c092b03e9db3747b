use anyhow::Context;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::db;
use crate::roster::ScoreSlot;
use crate::sheet::{CellWrite, GradeSheet, GradingConvention, TemplateSchema};
use crate::stats::{calculate_statistics, calculate_term_statistics, GradeStatistics, TermStatistics};
use crate::uploads::{UploadReceipt, UploadRequest, UploadTransport, RELATED_TYPE_GRADING};
use crate::workbook::{write_grid, EXPORT_SHEET_NAME};

pub const SESSION_KEY: &str = "editor.session";

/// Key-value storage for the in-progress editor state.
pub trait SessionStore {
    fn load(&self, key: &str) -> anyhow::Result<Option<String>>;
    fn save(&mut self, key: &str, value: &str) -> anyhow::Result<()>;
    fn clear(&mut self, key: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl SessionStore for MemoryStore {
    fn load(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn save(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn clear(&mut self, key: &str) -> anyhow::Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(workspace: &Path) -> anyhow::Result<Self> {
        Ok(Self {
            conn: db::open_db(workspace).context("failed to open session store")?,
        })
    }
}

impl SessionStore for SqliteStore {
    fn load(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self
            .conn
            .query_row(
                "SELECT value FROM editor_sessions WHERE key = ?",
                [key],
                |r| r.get(0),
            )
            .optional()?)
    }

    fn save(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        self.conn.execute(
            "INSERT INTO editor_sessions(key, value, updated_at) VALUES(?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET
               value = excluded.value,
               updated_at = excluded.updated_at",
            (key, value, Utc::now().to_rfc3339()),
        )?;
        Ok(())
    }

    fn clear(&mut self, key: &str) -> anyhow::Result<()> {
        self.conn
            .execute("DELETE FROM editor_sessions WHERE key = ?", [key])?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionPhase {
    Empty,
    Loaded,
    Editing,
    Finalizing,
    Uploaded,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no grade sheet is open")]
    NoSheet,
    #[error("failed to build workbook: {0:#}")]
    Export(anyhow::Error),
    #[error("upload failed: {0}")]
    Upload(String),
    #[error("session store: {0:#}")]
    Store(anyhow::Error),
}

impl SessionError {
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::NoSheet => "no_session",
            SessionError::Export(_) => "export_failed",
            SessionError::Upload(_) => "upload_failed",
            SessionError::Store(_) => "session_store_failed",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetMeta {
    pub file_name: String,
    pub class_name: String,
    pub term: String,
}

/// What survives a restart of the editor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub editor_data: Vec<Vec<String>>,
    pub editor_file_name: String,
    pub editor_class: String,
    pub term: String,
    #[serde(default)]
    pub stats: Option<GradeStatistics>,
    pub all_rows: Vec<Vec<String>>,
    #[serde(default)]
    pub convention: GradingConvention,
    #[serde(default)]
    pub schema: TemplateSchema,
}

pub struct EditorSession {
    store: Box<dyn SessionStore>,
    phase: SessionPhase,
    sheet: Option<GradeSheet>,
    meta: SheetMeta,
    stats: Option<GradeStatistics>,
}

impl EditorSession {
    pub fn new(store: Box<dyn SessionStore>) -> Self {
        Self {
            store,
            phase: SessionPhase::Empty,
            sheet: None,
            meta: SheetMeta::default(),
            stats: None,
        }
    }

    /// Pick up a sheet left in the store by an earlier run. Unreadable
    /// snapshots are discarded.
    pub fn restore(store: Box<dyn SessionStore>) -> Result<Self, SessionError> {
        let mut session = Self::new(store);
        let Some(raw) = session.store.load(SESSION_KEY).map_err(SessionError::Store)? else {
            return Ok(session);
        };
        match serde_json::from_str::<SessionSnapshot>(&raw) {
            Ok(snap) => {
                session.meta = SheetMeta {
                    file_name: snap.editor_file_name,
                    class_name: snap.editor_class,
                    term: snap.term,
                };
                session.stats = snap.stats;
                session.sheet = Some(GradeSheet {
                    display: snap.editor_data,
                    all_rows: snap.all_rows,
                    schema: snap.schema,
                    convention: snap.convention,
                });
                session.phase = SessionPhase::Editing;
                tracing::info!(file = %session.meta.file_name, "restored editor session");
            }
            Err(e) => {
                tracing::warn!(error = %e, "discarding unreadable editor session");
                session.store.clear(SESSION_KEY).map_err(SessionError::Store)?;
            }
        }
        Ok(session)
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn sheet(&self) -> Option<&GradeSheet> {
        self.sheet.as_ref()
    }

    pub fn meta(&self) -> &SheetMeta {
        &self.meta
    }

    pub fn last_stats(&self) -> Option<GradeStatistics> {
        self.stats
    }

    pub fn snapshot(&self) -> Option<SessionSnapshot> {
        let sheet = self.sheet.as_ref()?;
        Some(SessionSnapshot {
            editor_data: sheet.display.clone(),
            editor_file_name: self.meta.file_name.clone(),
            editor_class: self.meta.class_name.clone(),
            term: self.meta.term.clone(),
            stats: self.stats,
            all_rows: sheet.all_rows.clone(),
            convention: sheet.convention,
            schema: sheet.schema.clone(),
        })
    }

    /// Write-through to the store. Failures are logged, not returned.
    fn persist(&mut self) {
        let Some(snap) = self.snapshot() else {
            return;
        };
        let result = serde_json::to_string(&snap)
            .map_err(anyhow::Error::from)
            .and_then(|raw| self.store.save(SESSION_KEY, &raw));
        if let Err(e) = result {
            let msg = format!("{e:#}");
            tracing::warn!(error = %msg, "failed to persist editor session");
        }
    }

    pub fn load(&mut self, meta: SheetMeta, sheet: GradeSheet) {
        tracing::info!(
            file = %meta.file_name,
            class = %meta.class_name,
            rows = sheet.row_count(),
            convention = ?sheet.convention,
            "grade sheet loaded"
        );
        self.meta = meta;
        self.sheet = Some(sheet);
        self.stats = None;
        self.phase = SessionPhase::Loaded;
        self.persist();
    }

    fn sheet_mut(&mut self) -> Result<&mut GradeSheet, SessionError> {
        self.sheet.as_mut().ok_or(SessionError::NoSheet)
    }

    pub fn set_cell(&mut self, row: usize, col: usize, raw: &str) -> Result<CellWrite, SessionError> {
        let write = self.sheet_mut()?.set_cell(row, col, raw);
        if let CellWrite::Stored(_) = write {
            self.phase = SessionPhase::Editing;
            self.persist();
        }
        Ok(write)
    }

    pub fn set_side_field(&mut self, name: &str, raw: &str) -> Result<Option<String>, SessionError> {
        let stored = self.sheet_mut()?.set_side_field(name, raw);
        if stored.is_some() {
            self.phase = SessionPhase::Editing;
            self.persist();
        }
        Ok(stored)
    }

    pub fn statistics(&mut self, slot: ScoreSlot) -> Result<GradeStatistics, SessionError> {
        let sheet = self.sheet.as_ref().ok_or(SessionError::NoSheet)?;
        let stats = calculate_statistics(&sheet.records(), slot);
        self.stats = Some(stats);
        self.persist();
        Ok(stats)
    }

    pub fn term_statistics(&self) -> Result<TermStatistics, SessionError> {
        let sheet = self.sheet.as_ref().ok_or(SessionError::NoSheet)?;
        Ok(calculate_term_statistics(&sheet.term_counters()))
    }

    /// Serialize and hand the sheet to `transport`. On failure the sheet stays
    /// open for another attempt.
    pub fn finalize(
        &mut self,
        transport: &dyn UploadTransport,
        related_id: &str,
        uploaded_by: &str,
    ) -> Result<UploadReceipt, SessionError> {
        let sheet = self.sheet.as_ref().ok_or(SessionError::NoSheet)?;
        self.phase = SessionPhase::Finalizing;

        let bytes = match write_grid(&sheet.export_rows(), EXPORT_SHEET_NAME) {
            Ok(b) => b,
            Err(e) => {
                self.phase = SessionPhase::Editing;
                return Err(SessionError::Export(e));
            }
        };

        let req = UploadRequest {
            file_name: self.meta.file_name.clone(),
            bytes,
            related_type: RELATED_TYPE_GRADING.to_string(),
            related_id: related_id.to_string(),
            uploaded_by: uploaded_by.to_string(),
        };
        let failure = match transport.upload(req) {
            Ok(receipt) if receipt.success => {
                if let Err(e) = self.store.clear(SESSION_KEY) {
                    let msg = format!("{e:#}");
                    tracing::warn!(error = %msg, "failed to clear editor session");
                }
                self.sheet = None;
                self.stats = None;
                self.phase = SessionPhase::Uploaded;
                return Ok(receipt);
            }
            Ok(receipt) => receipt
                .message
                .unwrap_or_else(|| "upload rejected".to_string()),
            Err(e) => format!("{e:#}"),
        };

        tracing::warn!(file = %self.meta.file_name, error = %failure, "upload failed; sheet kept for retry");
        self.phase = SessionPhase::Editing;
        Err(SessionError::Upload(failure))
    }

    pub fn cancel(&mut self) -> Result<(), SessionError> {
        self.store.clear(SESSION_KEY).map_err(SessionError::Store)?;
        self.sheet = None;
        self.stats = None;
        self.meta = SheetMeta::default();
        self.phase = SessionPhase::Empty;
        Ok(())
    }

    /// Swap the backing store, carrying the open sheet over.
    pub fn replace_store(&mut self, store: Box<dyn SessionStore>) {
        self.store = store;
        self.persist();
    }
}
