use clap::Parser;
use rusqlite::Connection;
use std::path::{Path, PathBuf};

use crate::db;
use crate::sheet::ClassCatalog;

pub const TEMPLATES_DIR: &str = "grading-templates";
pub const SETTING_TWENTY_POINT_CLASSES: &str = "grading.twentyPointClasses";

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "gradesheetd")]
#[command(about = "Grade-sheet sidecar: JSON requests on stdin, JSON responses on stdout")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Args {
    /// Workspace directory to open at startup
    #[arg(long)]
    pub workspace: Option<PathBuf>,

    /// Folder holding <class>/<template>.xlsx files (default: <workspace>/grading-templates)
    #[arg(long)]
    pub templates_dir: Option<PathBuf>,

    /// Log level when RUST_LOG is not set (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Args {
    pub fn templates_root(&self, workspace: Option<&Path>) -> Option<PathBuf> {
        match (&self.templates_dir, workspace) {
            (Some(dir), _) => Some(dir.clone()),
            (None, Some(ws)) => Some(ws.join(TEMPLATES_DIR)),
            (None, None) => None,
        }
    }
}

/// Logs go to stderr; stdout carries the protocol.
pub fn setup_logging(args: &Args) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("gradesheetd={}", args.log_level)));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_level(true)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .try_init();
}

/// Class catalog for a workspace; falls back to the built-in list when the
/// setting is absent or malformed.
pub fn class_catalog(conn: Option<&Connection>) -> ClassCatalog {
    let Some(conn) = conn else {
        return ClassCatalog::default();
    };
    match db::settings_get_json(conn, SETTING_TWENTY_POINT_CLASSES) {
        Ok(Some(v)) => match serde_json::from_value::<Vec<String>>(v) {
            Ok(list) => ClassCatalog::new(list),
            Err(e) => {
                tracing::warn!(error = %e, "ignoring malformed {}", SETTING_TWENTY_POINT_CLASSES);
                ClassCatalog::default()
            }
        },
        Ok(None) => ClassCatalog::default(),
        Err(e) => {
            let msg = format!("{e:#}");
            tracing::warn!(error = %msg, "failed to read class catalog setting");
            ClassCatalog::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheet::GradingConvention;
    use serde_json::json;

    #[test]
    fn templates_root_prefers_flag() {
        let args = Args {
            templates_dir: Some(PathBuf::from("/t")),
            ..Args::default()
        };
        assert_eq!(args.templates_root(Some(Path::new("/ws"))), Some(PathBuf::from("/t")));
        let args = Args::default();
        assert_eq!(
            args.templates_root(Some(Path::new("/ws"))),
            Some(PathBuf::from("/ws").join(TEMPLATES_DIR))
        );
        assert_eq!(args.templates_root(None), None);
    }

    #[test]
    fn catalog_reads_workspace_setting() {
        let dir = tempfile::tempdir().expect("tempdir");
        let conn = db::open_db(dir.path()).expect("db");
        assert_eq!(
            class_catalog(Some(&conn)).convention_for("3AS"),
            GradingConvention::TwentyPoint
        );

        db::settings_set_json(&conn, SETTING_TWENTY_POINT_CLASSES, &json!(["CP"])).expect("set");
        let catalog = class_catalog(Some(&conn));
        assert_eq!(catalog.convention_for("cp"), GradingConvention::TwentyPoint);
        assert_eq!(catalog.convention_for("3AS"), GradingConvention::HundredPoint);

        db::settings_set_json(&conn, SETTING_TWENTY_POINT_CLASSES, &json!("oops")).expect("set");
        assert_eq!(
            class_catalog(Some(&conn)).convention_for("3AS"),
            GradingConvention::TwentyPoint
        );
    }
}
