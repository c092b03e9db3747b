use crate::config::class_catalog;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{get_str, parse_param};
use crate::ipc::types::{AppState, Request};
use crate::roster::{clean_name, parse_gender, Gender, ScoreSlot, StudentRecord};
use crate::stats::calculate_statistics;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

/// One grade row as the UI sends it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GradeEntry {
    student_name: String,
    #[serde(default)]
    matricule: Option<String>,
    #[serde(default)]
    gender: Option<String>,
    #[serde(default)]
    grade: Option<f64>,
    #[serde(default)]
    remarks: Option<String>,
}

struct ReportRow {
    id: String,
    class_name: String,
    subject: String,
    term: String,
    teacher: Option<String>,
    created_at: String,
    updated_at: Option<String>,
}

impl ReportRow {
    fn to_json(&self) -> serde_json::Value {
        json!({
            "id": self.id,
            "className": self.class_name,
            "subject": self.subject,
            "term": self.term,
            "teacher": self.teacher,
            "createdAt": self.created_at,
            "updatedAt": self.updated_at,
        })
    }
}

fn load_report(conn: &Connection, report_id: &str) -> rusqlite::Result<Option<ReportRow>> {
    conn.query_row(
        "SELECT id, class_name, subject, term, teacher, created_at, updated_at
         FROM grade_reports WHERE id = ?",
        [report_id],
        |r| {
            Ok(ReportRow {
                id: r.get(0)?,
                class_name: r.get(1)?,
                subject: r.get(2)?,
                term: r.get(3)?,
                teacher: r.get(4)?,
                created_at: r.get(5)?,
                updated_at: r.get(6)?,
            })
        },
    )
    .optional()
}

fn load_grades(conn: &Connection, report_id: &str) -> rusqlite::Result<Vec<(String, StudentRecord, Option<String>)>> {
    let mut stmt = conn.prepare(
        "SELECT id, student_name, matricule, gender, grade, remarks
         FROM grades WHERE report_id = ?
         ORDER BY sort_order",
    )?;
    let rows = stmt
        .query_map([report_id], |r| {
            let id: String = r.get(0)?;
            let gender: String = r.get(3)?;
            let record = StudentRecord {
                name: r.get(1)?,
                matricule: r.get(2)?,
                gender: parse_gender(&gender).unwrap_or_default(),
                score_slot1: r.get(4)?,
                score_slot2: None,
            };
            Ok((id, record, r.get(5)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn grade_json(id: &str, record: &StudentRecord, remarks: Option<&str>) -> serde_json::Value {
    json!({
        "id": id,
        "studentName": record.name,
        "matricule": record.matricule,
        "gender": record.gender.as_str(),
        "grade": record.score_slot1,
        "remarks": remarks,
    })
}

fn next_sort_order(conn: &Connection, report_id: &str) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COALESCE(MAX(sort_order), -1) + 1 FROM grades WHERE report_id = ?",
        [report_id],
        |r| r.get(0),
    )
}

fn touch_report(conn: &Connection, report_id: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE grade_reports SET updated_at = ? WHERE id = ?",
        (Utc::now().to_rfc3339(), report_id),
    )
}

/// Checks an entry against the report's grading scale and normalizes it.
fn check_entry(
    conn: &Connection,
    class_name: &str,
    entry: GradeEntry,
) -> Result<(StudentRecord, Option<String>), String> {
    let name = entry.student_name.trim().to_string();
    if name.is_empty() {
        return Err("studentName must not be empty".to_string());
    }
    let gender = match entry.gender.as_deref() {
        None => Gender::default(),
        Some(g) => parse_gender(g).ok_or_else(|| format!("unknown gender: {g}"))?,
    };
    let max = class_catalog(Some(conn)).convention_for(class_name).max_grade();
    if let Some(g) = entry.grade {
        if !g.is_finite() || !(0.0..=max).contains(&g) {
            return Err(format!("grade must be between 0 and {max}"));
        }
    }
    let record = StudentRecord {
        name,
        matricule: entry
            .matricule
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty()),
        gender,
        score_slot1: entry.grade,
        score_slot2: None,
    };
    let remarks = entry
        .remarks
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty());
    Ok((record, remarks))
}

fn insert_grade(
    conn: &Connection,
    report_id: &str,
    record: &StudentRecord,
    remarks: Option<&str>,
    sort_order: i64,
) -> rusqlite::Result<String> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO grades(id, report_id, student_name, matricule, gender, grade, remarks, sort_order)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            report_id,
            &record.name,
            &record.matricule,
            record.gender.as_str(),
            record.score_slot1,
            remarks,
            sort_order,
        ),
    )?;
    Ok(id)
}

fn handle_reports_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "reports": [] }));
    };
    let class_filter = get_str(req, "className").map(str::to_string);

    let mut stmt = match conn.prepare(
        "SELECT
           r.id,
           r.class_name,
           r.subject,
           r.term,
           r.teacher,
           r.created_at,
           r.updated_at,
           (SELECT COUNT(*) FROM grades g WHERE g.report_id = r.id) AS grade_count
         FROM grade_reports r
         WHERE (?1 IS NULL OR r.class_name = ?1)
         ORDER BY r.created_at DESC, r.id",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([&class_filter], |r| {
            let report = ReportRow {
                id: r.get(0)?,
                class_name: r.get(1)?,
                subject: r.get(2)?,
                term: r.get(3)?,
                teacher: r.get(4)?,
                created_at: r.get(5)?,
                updated_at: r.get(6)?,
            };
            let grade_count: i64 = r.get(7)?;
            let mut v = report.to_json();
            v["gradeCount"] = json!(grade_count);
            Ok(v)
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(reports) => ok(&req.id, json!({ "reports": reports })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn required_text(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    match get_str(req, key).map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        Some(_) => Err(err(
            &req.id,
            "bad_params",
            format!("{key} must not be empty"),
            None,
        )),
        None => Err(err(&req.id, "bad_params", format!("missing {key}"), None)),
    }
}

fn handle_reports_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let class_name = match required_text(req, "className") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let subject = match required_text(req, "subject") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let term = match required_text(req, "term") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let teacher = get_str(req, "teacher")
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());

    let report = ReportRow {
        id: Uuid::new_v4().to_string(),
        class_name,
        subject,
        term,
        teacher,
        created_at: Utc::now().to_rfc3339(),
        updated_at: None,
    };
    if let Err(e) = conn.execute(
        "INSERT INTO grade_reports(id, class_name, subject, term, teacher, created_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &report.id,
            &report.class_name,
            &report.subject,
            &report.term,
            &report.teacher,
            &report.created_at,
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "grade_reports" })),
        );
    }

    tracing::info!(report = %report.id, class = %report.class_name, "grade report created");
    ok(&req.id, json!({ "report": report.to_json() }))
}

fn handle_reports_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(report_id) = get_str(req, "reportId") else {
        return err(&req.id, "bad_params", "missing reportId", None);
    };

    let report = match load_report(conn, report_id) {
        Ok(Some(r)) => r,
        Ok(None) => return err(&req.id, "not_found", "grade report not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let grades = match load_grades(conn, report_id) {
        Ok(g) => g,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let records: Vec<StudentRecord> = grades.iter().map(|(_, r, _)| r.clone()).collect();
    let stats = calculate_statistics(&records, ScoreSlot::First);
    let grades: Vec<serde_json::Value> = grades
        .iter()
        .map(|(id, r, remarks)| grade_json(id, r, remarks.as_deref()))
        .collect();

    ok(
        &req.id,
        json!({ "report": report.to_json(), "grades": grades, "stats": stats }),
    )
}

fn handle_reports_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(report_id) = get_str(req, "reportId") else {
        return err(&req.id, "bad_params", "missing reportId", None);
    };
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "missing patch", None);
    };

    let mut report = match load_report(conn, report_id) {
        Ok(Some(r)) => r,
        Ok(None) => return err(&req.id, "not_found", "grade report not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    for (key, value) in patch {
        let text = value.as_str().map(|s| s.trim().to_string());
        let slot = match key.as_str() {
            "className" => &mut report.class_name,
            "subject" => &mut report.subject,
            "term" => &mut report.term,
            "teacher" => {
                report.teacher = text.filter(|t| !t.is_empty());
                continue;
            }
            _ => {
                return err(
                    &req.id,
                    "bad_params",
                    "unknown patch field",
                    Some(json!({ "field": key })),
                )
            }
        };
        match text {
            Some(t) if !t.is_empty() => *slot = t,
            _ => {
                return err(
                    &req.id,
                    "bad_params",
                    format!("{key} must be a non-empty string"),
                    None,
                )
            }
        }
    }

    let updated_at = Utc::now().to_rfc3339();
    if let Err(e) = conn.execute(
        "UPDATE grade_reports
         SET class_name = ?, subject = ?, term = ?, teacher = ?, updated_at = ?
         WHERE id = ?",
        (
            &report.class_name,
            &report.subject,
            &report.term,
            &report.teacher,
            &updated_at,
            &report.id,
        ),
    ) {
        return err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "grade_reports" })),
        );
    }
    report.updated_at = Some(updated_at);

    ok(&req.id, json!({ "report": report.to_json() }))
}

fn handle_reports_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(report_id) = get_str(req, "reportId") else {
        return err(&req.id, "bad_params", "missing reportId", None);
    };

    match load_report(conn, report_id) {
        Ok(Some(_)) => {}
        Ok(None) => return err(&req.id, "not_found", "grade report not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    // No ON DELETE CASCADE; grades go first.
    for (table, sql) in [
        ("grades", "DELETE FROM grades WHERE report_id = ?"),
        ("grade_reports", "DELETE FROM grade_reports WHERE id = ?"),
    ] {
        if let Err(e) = tx.execute(sql, [report_id]) {
            let _ = tx.rollback();
            return err(
                &req.id,
                "db_delete_failed",
                e.to_string(),
                Some(json!({ "table": table })),
            );
        }
    }

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "deleted": true }))
}

fn handle_grades_add(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(report_id) = get_str(req, "reportId") else {
        return err(&req.id, "bad_params", "missing reportId", None);
    };
    let entry: GradeEntry = match parse_param(req, "entry") {
        Ok(Some(e)) => e,
        Ok(None) => return err(&req.id, "bad_params", "missing entry", None),
        Err(resp) => return resp,
    };

    let report = match load_report(conn, report_id) {
        Ok(Some(r)) => r,
        Ok(None) => return err(&req.id, "not_found", "grade report not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let (record, remarks) = match check_entry(conn, &report.class_name, entry) {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };

    let inserted = next_sort_order(conn, report_id)
        .and_then(|order| insert_grade(conn, report_id, &record, remarks.as_deref(), order))
        .and_then(|id| touch_report(conn, report_id).map(|_| id));
    match inserted {
        Ok(id) => ok(
            &req.id,
            json!({ "grade": grade_json(&id, &record, remarks.as_deref()) }),
        ),
        Err(e) => err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "grades" })),
        ),
    }
}

fn handle_grades_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(grade_id) = get_str(req, "gradeId") else {
        return err(&req.id, "bad_params", "missing gradeId", None);
    };
    let entry: GradeEntry = match parse_param(req, "entry") {
        Ok(Some(e)) => e,
        Ok(None) => return err(&req.id, "bad_params", "missing entry", None),
        Err(resp) => return resp,
    };

    let owner: Option<(String, String)> = match conn
        .query_row(
            "SELECT g.report_id, r.class_name
             FROM grades g JOIN grade_reports r ON r.id = g.report_id
             WHERE g.id = ?",
            [grade_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some((report_id, class_name)) = owner else {
        return err(&req.id, "not_found", "grade not found", None);
    };
    let (record, remarks) = match check_entry(conn, &class_name, entry) {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };

    let updated = conn
        .execute(
            "UPDATE grades
             SET student_name = ?, matricule = ?, gender = ?, grade = ?, remarks = ?
             WHERE id = ?",
            (
                &record.name,
                &record.matricule,
                record.gender.as_str(),
                record.score_slot1,
                &remarks,
                grade_id,
            ),
        )
        .and_then(|_| touch_report(conn, &report_id));
    match updated {
        Ok(_) => ok(
            &req.id,
            json!({ "grade": grade_json(grade_id, &record, remarks.as_deref()) }),
        ),
        Err(e) => err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "grades" })),
        ),
    }
}

fn handle_grades_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(grade_id) = get_str(req, "gradeId") else {
        return err(&req.id, "bad_params", "missing gradeId", None);
    };

    let report_id: Option<String> = match conn
        .query_row("SELECT report_id FROM grades WHERE id = ?", [grade_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some(report_id) = report_id else {
        return err(&req.id, "not_found", "grade not found", None);
    };

    let deleted = conn
        .execute("DELETE FROM grades WHERE id = ?", [grade_id])
        .and_then(|_| touch_report(conn, &report_id));
    match deleted {
        Ok(_) => ok(&req.id, json!({ "deleted": true })),
        Err(e) => err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "grades" })),
        ),
    }
}

/// Append parsed roster records to a report as grade rows, reading the
/// grade from `slot`.
fn handle_import_records(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(report_id) = get_str(req, "reportId") else {
        return err(&req.id, "bad_params", "missing reportId", None);
    };
    let records: Vec<StudentRecord> = match parse_param(req, "records") {
        Ok(Some(r)) => r,
        Ok(None) => return err(&req.id, "bad_params", "missing records[]", None),
        Err(resp) => return resp,
    };
    let slot: ScoreSlot = match parse_param(req, "slot") {
        Ok(s) => s.unwrap_or_default(),
        Err(resp) => return resp,
    };

    let report = match load_report(conn, report_id) {
        Ok(Some(r)) => r,
        Ok(None) => return err(&req.id, "not_found", "grade report not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let max = class_catalog(Some(conn))
        .convention_for(&report.class_name)
        .max_grade();

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    let mut order = match next_sort_order(&tx, report_id) {
        Ok(o) => o,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let mut imported = 0usize;
    let mut out_of_range = 0usize;
    let mut rejected = 0usize;
    for record in &records {
        let Some(name) = clean_name(&record.name) else {
            rejected += 1;
            continue;
        };
        // Scores outside the class scale are kept as ungraded rows.
        let grade = record
            .score(slot)
            .filter(|g| (0.0..=max).contains(g));
        if record.score(slot).is_some() && grade.is_none() {
            out_of_range += 1;
        }
        let row = StudentRecord {
            name,
            score_slot1: grade,
            score_slot2: None,
            ..record.clone()
        };
        if let Err(e) = insert_grade(&tx, report_id, &row, None, order) {
            let _ = tx.rollback();
            return err(
                &req.id,
                "db_insert_failed",
                e.to_string(),
                Some(json!({ "table": "grades" })),
            );
        }
        order += 1;
        imported += 1;
    }

    if let Err(e) = touch_report(&tx, report_id) {
        let _ = tx.rollback();
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    if out_of_range > 0 {
        tracing::warn!(report = %report_id, out_of_range, "imported grades outside the class scale were dropped");
    }
    if rejected > 0 {
        tracing::warn!(report = %report_id, rejected, "imported rows without a usable name were skipped");
    }
    ok(
        &req.id,
        json!({ "imported": imported, "outOfRange": out_of_range, "rejected": rejected }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "gradeReports.list" => Some(handle_reports_list(state, req)),
        "gradeReports.create" => Some(handle_reports_create(state, req)),
        "gradeReports.get" => Some(handle_reports_get(state, req)),
        "gradeReports.update" => Some(handle_reports_update(state, req)),
        "gradeReports.delete" => Some(handle_reports_delete(state, req)),
        "gradeReports.grades.add" => Some(handle_grades_add(state, req)),
        "gradeReports.grades.update" => Some(handle_grades_update(state, req)),
        "gradeReports.grades.delete" => Some(handle_grades_delete(state, req)),
        "gradeReports.importRecords" => Some(handle_import_records(state, req)),
        _ => None,
    }
}
