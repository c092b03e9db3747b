use crate::ipc::error::{err, ok};
use crate::ipc::helpers::parse_param;
use crate::ipc::types::{AppState, Request};
use crate::roster::{parse_cell_grid, parse_delimited, parse_list, ScoreSlot, StudentRecord};
use crate::sheet::GradingConvention;
use crate::stats::{calculate_statistics, calculate_term_statistics, TermCounters};
use crate::validate::{validate_input, InputKind};
use crate::workbook::read_first_sheet;
use serde_json::json;

fn handle_validate_input(_state: &mut AppState, req: &Request) -> serde_json::Value {
    let kind: InputKind = match parse_param(req, "kind") {
        Ok(Some(k)) => k,
        Ok(None) => return err(&req.id, "bad_params", "missing kind", None),
        Err(resp) => return resp,
    };
    let convention: GradingConvention = match parse_param(req, "convention") {
        Ok(c) => c.unwrap_or_default(),
        Err(resp) => return resp,
    };
    let raw = req.params.get("raw").and_then(|v| v.as_str()).unwrap_or("");
    ok(
        &req.id,
        json!({ "value": validate_input(kind, raw, convention) }),
    )
}

fn handle_parse_text(req: &Request, delimited: bool) -> serde_json::Value {
    let Some(text) = req.params.get("text").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing text", None);
    };
    let outcome = if delimited {
        parse_delimited(text)
    } else {
        parse_list(text)
    };
    ok(&req.id, json!(outcome))
}

fn handle_parse_workbook(_state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(path) = req.params.get("path").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing path", None);
    };
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
    match read_first_sheet(&bytes) {
        Ok(rows) => ok(&req.id, json!(parse_cell_grid(&rows))),
        Err(e) => err(&req.id, "workbook_invalid", format!("{e:#}"), None),
    }
}

fn handle_stats_calculate(_state: &mut AppState, req: &Request) -> serde_json::Value {
    let records: Vec<StudentRecord> = match parse_param(req, "records") {
        Ok(Some(r)) => r,
        Ok(None) => return err(&req.id, "bad_params", "missing records[]", None),
        Err(resp) => return resp,
    };
    let slot: ScoreSlot = match parse_param(req, "slot") {
        Ok(s) => s.unwrap_or_default(),
        Err(resp) => return resp,
    };
    ok(
        &req.id,
        json!({ "stats": calculate_statistics(&records, slot) }),
    )
}

fn handle_stats_term(_state: &mut AppState, req: &Request) -> serde_json::Value {
    let counters: TermCounters = match parse_param(req, "counters") {
        Ok(Some(c)) => c,
        Ok(None) => return err(&req.id, "bad_params", "missing counters", None),
        Err(resp) => return resp,
    };
    ok(
        &req.id,
        json!({ "term": calculate_term_statistics(&counters) }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "validate.input" => Some(handle_validate_input(state, req)),
        "roster.parseList" => Some(handle_parse_text(req, false)),
        "roster.parseDelimited" => Some(handle_parse_text(req, true)),
        "roster.parseWorkbook" => Some(handle_parse_workbook(state, req)),
        "stats.calculate" => Some(handle_stats_calculate(state, req)),
        "stats.term" => Some(handle_stats_term(state, req)),
        _ => None,
    }
}
