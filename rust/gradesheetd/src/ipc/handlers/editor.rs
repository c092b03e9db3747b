use crate::config::class_catalog;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{get_index, get_str, parse_param};
use crate::ipc::types::{AppState, Request};
use crate::roster::ScoreSlot;
use crate::session::{SessionError, SheetMeta};
use crate::sheet::{CellWrite, GradeSheet, TemplateSchema};
use crate::templates::read_template;
use crate::uploads::WorkspaceUploads;
use crate::workbook::read_first_sheet;
use serde_json::json;
use std::path::Path;

fn session_err(id: &str, e: SessionError) -> serde_json::Value {
    err(id, e.code(), e.to_string(), None)
}

fn editor_view(state: &AppState) -> serde_json::Value {
    let session = &state.session;
    let Some(sheet) = session.sheet() else {
        return json!({ "phase": session.phase() });
    };
    json!({
        "phase": session.phase(),
        "fileName": session.meta().file_name,
        "class": session.meta().class_name,
        "term": session.meta().term,
        "convention": sheet.convention,
        "maxGrade": sheet.convention.max_grade(),
        "rows": sheet.display,
        "sideFields": sheet.side_fields(),
        "stats": session.last_stats(),
    })
}

/// Shared tail of both open paths: cut the grid out of the workbook and
/// hand it to the session.
fn open_bytes(state: &mut AppState, req: &Request, bytes: &[u8], meta: SheetMeta) -> serde_json::Value {
    let schema: TemplateSchema = match parse_param(req, "schema") {
        Ok(s) => s.unwrap_or_default(),
        Err(resp) => return resp,
    };
    if let Err(msg) = schema.check_bounds() {
        return err(&req.id, "bad_params", msg, Some(json!({ "param": "schema" })));
    }
    let rows = match read_first_sheet(bytes) {
        Ok(r) => r,
        Err(e) => return err(&req.id, "workbook_invalid", format!("{e:#}"), None),
    };
    let convention = class_catalog(state.db.as_ref()).convention_for(&meta.class_name);
    let sheet = GradeSheet::from_template(rows, schema, convention);
    state.session.load(meta, sheet);
    ok(&req.id, editor_view(state))
}

fn handle_editor_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(root) = state.templates_root() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(class) = get_str(req, "class") else {
        return err(&req.id, "bad_params", "missing class", None);
    };
    let Some(file) = get_str(req, "templateFile") else {
        return err(&req.id, "bad_params", "missing templateFile", None);
    };
    let term = get_str(req, "term").unwrap_or("").to_string();

    let bytes = match read_template(&root, class, file) {
        Ok(b) => b,
        Err(e) => {
            return err(
                &req.id,
                "template_not_found",
                format!("{e:#}"),
                Some(json!({ "class": class, "templateFile": file })),
            )
        }
    };
    let meta = SheetMeta {
        file_name: file.to_string(),
        class_name: class.to_string(),
        term,
    };
    open_bytes(state, req, &bytes, meta)
}

fn handle_editor_open_file(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(path) = get_str(req, "path") else {
        return err(&req.id, "bad_params", "missing path", None);
    };
    let Some(class) = get_str(req, "class") else {
        return err(&req.id, "bad_params", "missing class", None);
    };
    let term = get_str(req, "term").unwrap_or("").to_string();

    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) => {
            return err(
                &req.id,
                "io_failed",
                e.to_string(),
                Some(json!({ "path": path })),
            )
        }
    };
    let file_name = Path::new(path)
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "grades.xlsx".to_string());
    let meta = SheetMeta {
        file_name,
        class_name: class.to_string(),
        term,
    };
    open_bytes(state, req, &bytes, meta)
}

fn handle_editor_state(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(&req.id, editor_view(state))
}

fn handle_editor_set_cell(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(row) = get_index(req, "row") else {
        return err(&req.id, "bad_params", "missing/invalid row", None);
    };
    let Some(col) = get_index(req, "col") else {
        return err(&req.id, "bad_params", "missing/invalid col", None);
    };
    let value = match req.params.get("value") {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        _ => String::new(),
    };

    match state.session.set_cell(row, col, &value) {
        Ok(CellWrite::Stored(v)) => ok(
            &req.id,
            json!({ "stored": true, "value": v, "phase": state.session.phase() }),
        ),
        // Echo the untouched value so the UI can revert its input.
        Ok(CellWrite::Ignored) => ok(
            &req.id,
            json!({
                "stored": false,
                "value": state.session.sheet().and_then(|s| s.cell(row, col)),
                "phase": state.session.phase(),
            }),
        ),
        Err(e) => session_err(&req.id, e),
    }
}

fn handle_side_fields_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    match state.session.sheet() {
        Some(sheet) => ok(&req.id, json!({ "fields": sheet.side_fields() })),
        None => session_err(&req.id, SessionError::NoSheet),
    }
}

fn handle_side_fields_set(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(field) = get_str(req, "field") else {
        return err(&req.id, "bad_params", "missing field", None);
    };
    let value = get_str(req, "value").unwrap_or("");

    match state.session.set_side_field(field, value) {
        Ok(Some(stored)) => ok(&req.id, json!({ "field": field, "value": stored })),
        Ok(None) => err(
            &req.id,
            "not_found",
            "unknown side field",
            Some(json!({ "field": field })),
        ),
        Err(e) => session_err(&req.id, e),
    }
}

fn handle_editor_records(state: &mut AppState, req: &Request) -> serde_json::Value {
    match state.session.sheet() {
        Some(sheet) => ok(&req.id, json!({ "records": sheet.records() })),
        None => session_err(&req.id, SessionError::NoSheet),
    }
}

fn handle_editor_stats(state: &mut AppState, req: &Request) -> serde_json::Value {
    let slot: ScoreSlot = match parse_param(req, "slot") {
        Ok(s) => s.unwrap_or_default(),
        Err(resp) => return resp,
    };
    match state.session.statistics(slot) {
        Ok(stats) => ok(&req.id, json!({ "stats": stats })),
        Err(e) => session_err(&req.id, e),
    }
}

fn handle_editor_term_stats(state: &mut AppState, req: &Request) -> serde_json::Value {
    match state.session.term_statistics() {
        Ok(term) => ok(&req.id, json!({ "term": term })),
        Err(e) => session_err(&req.id, e),
    }
}

fn handle_editor_finalize(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(workspace) = state.workspace.clone() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(related_id) = get_str(req, "relatedId") else {
        return err(&req.id, "bad_params", "missing relatedId", None);
    };
    let Some(uploaded_by) = get_str(req, "uploadedBy") else {
        return err(&req.id, "bad_params", "missing uploadedBy", None);
    };

    let transport = WorkspaceUploads::new(&workspace);
    match state.session.finalize(&transport, related_id, uploaded_by) {
        Ok(receipt) => ok(
            &req.id,
            json!({ "receipt": receipt, "phase": state.session.phase() }),
        ),
        Err(e) => err(
            &req.id,
            e.code(),
            e.to_string(),
            Some(json!({ "phase": state.session.phase() })),
        ),
    }
}

fn handle_editor_cancel(state: &mut AppState, req: &Request) -> serde_json::Value {
    match state.session.cancel() {
        Ok(()) => ok(&req.id, json!({ "phase": state.session.phase() })),
        Err(e) => session_err(&req.id, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "editor.open" => Some(handle_editor_open(state, req)),
        "editor.openFile" => Some(handle_editor_open_file(state, req)),
        "editor.state" => Some(handle_editor_state(state, req)),
        "editor.setCell" => Some(handle_editor_set_cell(state, req)),
        "editor.sideFields.get" => Some(handle_side_fields_get(state, req)),
        "editor.sideFields.set" => Some(handle_side_fields_set(state, req)),
        "editor.records" => Some(handle_editor_records(state, req)),
        "editor.stats" => Some(handle_editor_stats(state, req)),
        "editor.termStats" => Some(handle_editor_term_stats(state, req)),
        "editor.finalize" => Some(handle_editor_finalize(state, req)),
        "editor.cancel" => Some(handle_editor_cancel(state, req)),
        _ => None,
    }
}
