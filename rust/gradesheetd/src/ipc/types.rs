use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::config::Args;
use crate::session::{EditorSession, MemoryStore};

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub args: Args,
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub session: EditorSession,
}

impl AppState {
    /// Until a workspace is selected the editor session lives in memory only.
    pub fn new(args: Args) -> Self {
        Self {
            args,
            workspace: None,
            db: None,
            session: EditorSession::new(Box::new(MemoryStore::default())),
        }
    }

    pub fn templates_root(&self) -> Option<PathBuf> {
        self.args.templates_root(self.workspace.as_deref())
    }
}
