use crate::config::SETTING_TWENTY_POINT_CLASSES;
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::session::{EditorSession, SessionStore, SqliteStore};
use serde_json::json;
use std::path::{Path, PathBuf};

const WRITABLE_SETTINGS: &[&str] = &[SETTING_TWENTY_POINT_CLASSES];

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "templatesRoot": state.templates_root().map(|p| p.to_string_lossy().to_string()),
            "sessionPhase": state.session.phase(),
        }),
    )
}

/// Open (or create) a workspace and move the editor session onto its store.
/// A sheet already open in memory is carried over; otherwise a sheet left
/// behind by an earlier run is restored.
pub fn select_workspace(state: &mut AppState, path: &Path) -> anyhow::Result<()> {
    let conn = db::open_db(path)?;
    let store: Box<dyn SessionStore> = Box::new(SqliteStore::open(path)?);

    if state.session.sheet().is_some() {
        state.session.replace_store(store);
    } else {
        state.session = EditorSession::restore(store)?;
    }

    state.workspace = Some(path.to_path_buf());
    state.db = Some(conn);
    tracing::info!(workspace = %path.to_string_lossy(), "workspace selected");
    Ok(())
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    match select_workspace(state, &path) {
        Ok(()) => ok(
            &req.id,
            json!({
                "workspacePath": path.to_string_lossy(),
                "sessionPhase": state.session.phase(),
            }),
        ),
        Err(e) => err(&req.id, "db_open_failed", format!("{e:#}"), None),
    }
}

fn handle_settings_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(key) = req.params.get("key").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing key", None);
    };
    match db::settings_get_json(conn, key) {
        Ok(value) => ok(&req.id, json!({ "key": key, "value": value })),
        Err(e) => err(&req.id, "db_query_failed", format!("{e:#}"), None),
    }
}

fn handle_settings_set(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(key) = req.params.get("key").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing key", None);
    };
    if !WRITABLE_SETTINGS.contains(&key) {
        return err(
            &req.id,
            "bad_params",
            "unknown setting",
            Some(json!({ "key": key, "allowed": WRITABLE_SETTINGS })),
        );
    }
    let Some(value) = req.params.get("value") else {
        return err(&req.id, "bad_params", "missing value", None);
    };
    if key == SETTING_TWENTY_POINT_CLASSES
        && serde_json::from_value::<Vec<String>>(value.clone()).is_err()
    {
        return err(
            &req.id,
            "bad_params",
            "value must be an array of class names",
            None,
        );
    }

    match db::settings_set_json(conn, key, value) {
        Ok(()) => ok(&req.id, json!({ "key": key, "value": value })),
        Err(e) => err(
            &req.id,
            "db_insert_failed",
            format!("{e:#}"),
            Some(json!({ "table": "settings" })),
        ),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        "settings.get" => Some(handle_settings_get(state, req)),
        "settings.set" => Some(handle_settings_set(state, req)),
        _ => None,
    }
}
