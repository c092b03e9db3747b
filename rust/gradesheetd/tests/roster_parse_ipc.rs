mod test_support;

use rust_xlsxwriter::Workbook;
use serde_json::json;
use test_support::{error_code, request, request_ok, spawn_sidecar, temp_dir};

#[test]
fn validate_input_follows_kind_and_convention() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let cases = [
        (json!({ "kind": "grade", "raw": "15.5abc" }), "15.5"),
        (json!({ "kind": "grade", "raw": "42" }), "20"),
        (
            json!({ "kind": "grade", "raw": "42", "convention": "hundredPoint" }),
            "42",
        ),
        (json!({ "kind": "grade", "raw": "abc" }), ""),
        (json!({ "kind": "counter", "raw": "3h30" }), "330"),
        (json!({ "kind": "text", "raw": "<i>Bien</i>" }), "iBien/i"),
    ];
    for (i, (params, expected)) in cases.into_iter().enumerate() {
        let res = request_ok(
            &mut stdin,
            &mut reader,
            &format!("v{i}"),
            "validate.input",
            params,
        );
        assert_eq!(res["value"], expected, "case {i}");
    }

    let bad = request(
        &mut stdin,
        &mut reader,
        "bad",
        "validate.input",
        json!({ "kind": "colour", "raw": "x" }),
    );
    assert_eq!(error_code(&bad), Some("bad_params"));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn pasted_lists_and_delimited_text_become_records() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let list = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "roster.parseList",
        json!({ "text": "1. amel benali, 2201, F\nKarim Saadi (M-778)\n\n12\n" }),
    );
    let records = list["records"].as_array().expect("records");
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["name"], "Amel Benali");
    assert_eq!(records[0]["matricule"], "2201");
    assert_eq!(records[0]["gender"], "female");
    assert_eq!(records[1]["name"], "Karim Saadi");
    assert_eq!(records[1]["matricule"], "M-778");
    assert_eq!(records[1]["gender"], "male");
    assert_eq!(list["skipped"], 1);
    assert_eq!(list["genderDefaulted"], 1);

    let delimited = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "roster.parseDelimited",
        json!({ "text": "Nom;Matricule;Sexe\nsara LARBI;3301;fille\n2202\tnadir amrani\tgarçon\n" }),
    );
    let records = delimited["records"].as_array().expect("records");
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["name"], "Sara Larbi");
    assert_eq!(records[0]["gender"], "female");
    assert_eq!(records[1]["name"], "Nadir Amrani");
    assert_eq!(records[1]["matricule"], "2202");
    assert_eq!(records[1]["gender"], "male");
    assert_eq!(delimited["genderDefaulted"], 0);

    let missing = request(&mut stdin, &mut reader, "3", "roster.parseList", json!({}));
    assert_eq!(error_code(&missing), Some("bad_params"));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn workbook_roster_uses_header_columns() {
    let dir = temp_dir("gradesheet-roster");
    let path = dir.path().join("liste.xlsx");

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.write_string(0, 0, "Classe 3AS").expect("title");
    sheet.write_string(2, 0, "Matricule").expect("header");
    sheet.write_string(2, 1, "Nom et prénom").expect("header");
    sheet.write_string(2, 2, "Sexe").expect("header");
    sheet.write_string(2, 3, "Note").expect("header");
    sheet.write_number(3, 0, 4401).expect("cell");
    sheet.write_string(3, 1, "lina mansouri").expect("cell");
    sheet.write_string(3, 2, "F").expect("cell");
    sheet.write_number(3, 3, 13.5).expect("cell");
    sheet.write_number(4, 0, 4402).expect("cell");
    sheet.write_string(4, 1, "omar belkacem").expect("cell");
    sheet.write_string(4, 2, "H").expect("cell");
    workbook.save(&path).expect("save workbook");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let parsed = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "roster.parseWorkbook",
        json!({ "path": path.to_string_lossy() }),
    );
    let records = parsed["records"].as_array().expect("records");
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["name"], "Lina Mansouri");
    assert_eq!(records[0]["matricule"], "4401");
    assert_eq!(records[0]["scoreSlot1"], 13.5);
    assert_eq!(records[1]["gender"], "male");
    assert_eq!(records[1]["scoreSlot1"], serde_json::Value::Null);

    let stats = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "stats.calculate",
        json!({ "records": parsed["records"], "slot": "first" }),
    );
    assert_eq!(stats["stats"]["totalStudents"], 1);
    assert_eq!(stats["stats"]["femaleAbove10"], 1);
    assert_eq!(stats["stats"]["averageGrade"], 13.5);

    let not_xlsx = dir.path().join("liste.xlsx.txt");
    std::fs::write(&not_xlsx, "plain text").expect("write");
    let invalid = request(
        &mut stdin,
        &mut reader,
        "3",
        "roster.parseWorkbook",
        json!({ "path": not_xlsx.to_string_lossy() }),
    );
    assert_eq!(error_code(&invalid), Some("workbook_invalid"));

    let missing = request(
        &mut stdin,
        &mut reader,
        "4",
        "roster.parseWorkbook",
        json!({ "path": dir.path().join("absent.xlsx").to_string_lossy() }),
    );
    assert_eq!(error_code(&missing), Some("io_failed"));

    let term = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "stats.term",
        json!({ "counters": { "coursesExpected": 20, "coursesDone": 5, "hoursDone": 4 } }),
    );
    assert_eq!(term["term"]["courses"]["percentage"], 25);
    assert_eq!(term["term"]["hours"]["percentage"], 0);

    drop(stdin);
    let _ = child.wait();
}
