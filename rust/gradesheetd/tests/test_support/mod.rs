#![allow(dead_code)]

use rust_xlsxwriter::Workbook;
use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

pub fn temp_dir(prefix: &str) -> tempfile::TempDir {
    tempfile::Builder::new()
        .prefix(prefix)
        .tempdir()
        .expect("create temp dir")
}

pub fn spawn_sidecar_with(args: &[&str]) -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_gradesheetd");
    let mut child = Command::new(exe)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn gradesheetd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    spawn_sidecar_with(&[])
}

pub fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

pub fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

pub fn error_code(value: &serde_json::Value) -> Option<&str> {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
}

/// Writes a class template laid out the way the default schema expects:
/// counters at columns 9/10 of rows 1..=3, headers on row 7, students below.
pub fn write_template(path: &Path) {
    let mut rows: Vec<Vec<&str>> = vec![Vec::new(); 8];
    rows[0] = vec!["Lycée Ibn Khaldoun"];
    rows[1] = vec!["", "", "", "", "", "", "", "", "Cours", "24", "18"];
    rows[2] = vec!["", "", "", "", "", "", "", "", "Heures", "60", "45"];
    rows[3] = vec!["", "", "", "", "", "", "", "", "TP/TD", "6", "3"];
    rows[7] = vec!["N°", "Matricule", "Nom et Prénom", "Sexe", "Devoir", "Examen"];
    rows.push(vec!["1", "2201", "amel BENALI", "F", "14.5", "16"]);
    rows.push(vec!["2", "2202", "karim saadi", "M", "8", "9"]);
    rows.push(vec!["3", "2203", "Yasmine Haddad", "F", "", ""]);

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    for (r, row) in rows.iter().enumerate() {
        for (c, value) in row.iter().enumerate() {
            if value.is_empty() {
                continue;
            }
            sheet
                .write_string(r as u32, c as u16, *value)
                .expect("write template cell");
        }
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create template dir");
    }
    workbook.save(path).expect("save template");
}
