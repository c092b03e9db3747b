use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    #[default]
    Male,
    Female,
}

impl Gender {
    pub fn as_str(self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScoreSlot {
    #[default]
    First,
    Second,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRecord {
    pub name: String,
    #[serde(default)]
    pub matricule: Option<String>,
    #[serde(default)]
    pub gender: Gender,
    #[serde(default)]
    pub score_slot1: Option<f64>,
    #[serde(default)]
    pub score_slot2: Option<f64>,
}

impl StudentRecord {
    fn named(name: String) -> Self {
        Self {
            name,
            matricule: None,
            gender: Gender::Male,
            score_slot1: None,
            score_slot2: None,
        }
    }

    pub fn score(&self, slot: ScoreSlot) -> Option<f64> {
        match slot {
            ScoreSlot::First => self.score_slot1,
            ScoreSlot::Second => self.score_slot2,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseOutcome {
    pub records: Vec<StudentRecord>,
    /// Non-blank rows that produced no record.
    pub skipped: usize,
    /// Records whose gender fell back to male because no token matched.
    pub gender_defaulted: usize,
}

impl ParseOutcome {
    fn push(&mut self, record: Option<StudentRecord>, gender_known: bool) {
        match record {
            Some(r) => {
                if !gender_known {
                    self.gender_defaulted += 1;
                }
                self.records.push(r);
            }
            None => self.skipped += 1,
        }
    }

    fn finish(self, source: &str) -> Self {
        tracing::debug!(
            source,
            records = self.records.len(),
            skipped = self.skipped,
            "roster parsed"
        );
        if self.gender_defaulted > 0 {
            tracing::warn!(
                source,
                count = self.gender_defaulted,
                "gender not recognized for some rows; defaulted to male"
            );
        }
        self
    }
}

const MALE_TOKENS: &[&str] = &[
    "male", "m", "masculin", "homme", "boy", "garçon", "garcon", "h",
];
const FEMALE_TOKENS: &[&str] = &["female", "f", "féminin", "feminin", "femme", "girl", "fille"];

const NAME_HEADERS: &[&str] = &[
    "name",
    "nom",
    "nom et prénom",
    "nom et prenom",
    "prénom",
    "prenom",
    "student",
    "élève",
    "eleve",
];
const MATRICULE_HEADERS: &[&str] = &["matricule", "id", "student id"];
const GENDER_HEADERS: &[&str] = &["gender", "sexe", "genre"];
const INDEX_HEADERS: &[&str] = &["n°", "no", "#", "num"];
const SCORE_HEADERS: &[&str] = &["note", "score", "grade", "devoir", "examen"];

static ORDINAL_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:\d+\.\s*)+").expect("ordinal prefix pattern"));
static THOUSANDS_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:\d+|\d{1,3}(?:,\d{3})+)$").expect("numeric id pattern"));
static NAME_PAREN_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?)\s*\(([^)]+)\)$").expect("paren id pattern"));
static NAME_DASH_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?)\s+-\s+(\S+)$").expect("dash id pattern"));
static NAME_TRAILING_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.+?)\s+([A-Z0-9-]*[0-9][A-Z0-9-]*)$").expect("trailing id pattern")
});

pub fn parse_gender(raw: &str) -> Option<Gender> {
    let t = raw.trim().to_lowercase();
    if MALE_TOKENS.contains(&t.as_str()) {
        Some(Gender::Male)
    } else if FEMALE_TOKENS.contains(&t.as_str()) {
        Some(Gender::Female)
    } else {
        None
    }
}

pub fn is_purely_numeric(raw: &str) -> bool {
    let t = raw.trim();
    t.chars().any(|c| c.is_ascii_digit())
        && t
            .chars()
            .all(|c| c.is_ascii_digit() || c == '.' || c == ',' || c.is_whitespace())
}

fn is_numeric_id(raw: &str) -> bool {
    THOUSANDS_NUMBER.is_match(raw.trim())
}

/// Strip ordinals and trailing periods, then title-case each word.
/// Returns `None` when nothing usable is left.
pub fn clean_name(raw: &str) -> Option<String> {
    let t = ORDINAL_PREFIX.replace(raw.trim(), "");
    let t = t
        .trim()
        .trim_end_matches(|c: char| c == '.' || c.is_whitespace());
    if t.is_empty() || is_purely_numeric(t) {
        return None;
    }
    Some(t.split_whitespace().map(title_case_word).collect::<Vec<_>>().join(" "))
}

fn title_case_word(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(|c| c.to_lowercase()))
            .collect(),
        None => String::new(),
    }
}

fn non_empty(raw: &str) -> Option<String> {
    let t = raw.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}

fn matricule_from(raw: &str) -> Option<String> {
    let t = raw.trim();
    if is_numeric_id(t) {
        Some(t.replace(',', ""))
    } else {
        non_empty(t)
    }
}

/// Parse a pasted class list, one student per line.
pub fn parse_list(text: &str) -> ParseOutcome {
    let mut out = ParseOutcome::default();
    for line in text.lines() {
        let t = line.trim();
        if t.is_empty() {
            continue;
        }
        if is_purely_numeric(t) {
            out.skipped += 1;
            continue;
        }
        let (record, gender_known) = if t.contains(',') {
            list_line_with_commas(t)
        } else {
            (list_line_plain(t), false)
        };
        out.push(record, gender_known);
    }
    out.finish("list")
}

fn list_line_with_commas(line: &str) -> (Option<StudentRecord>, bool) {
    let mut fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() > 1 && is_purely_numeric(fields[0]) {
        fields.remove(0);
    }
    let Some(name) = fields.first().and_then(|n| clean_name(n)) else {
        return (None, false);
    };
    let mut record = StudentRecord::named(name);
    let mut gender_known = false;

    if let Some(second) = fields.get(1) {
        if let Some(g) = parse_gender(second) {
            record.gender = g;
            gender_known = true;
        } else {
            record.matricule = matricule_from(second);
            if let Some(g) = fields.get(2).and_then(|f| parse_gender(f)) {
                record.gender = g;
                gender_known = true;
            }
        }
    }
    (Some(record), gender_known)
}

fn list_line_plain(line: &str) -> Option<StudentRecord> {
    for shape in [&*NAME_PAREN_ID, &*NAME_DASH_ID, &*NAME_TRAILING_ID] {
        if let Some(caps) = shape.captures(line) {
            let Some(name) = clean_name(&caps[1]) else {
                continue;
            };
            let mut record = StudentRecord::named(name);
            record.matricule = non_empty(&caps[2]);
            return Some(record);
        }
    }
    clean_name(line).map(StudentRecord::named)
}

fn split_delimited(line: &str) -> Vec<String> {
    let delim = if line.contains(',') {
        ','
    } else if line.contains(';') {
        ';'
    } else {
        '\t'
    };
    line.split(delim).map(|f| f.trim().to_string()).collect()
}

fn is_header_token(field: &str, tokens: &[&str]) -> bool {
    let f = field.trim().to_lowercase();
    tokens
        .iter()
        .any(|t| f == *t || f.starts_with(&format!("{t} ")))
}

fn is_header_like(fields: &[String]) -> bool {
    fields.iter().any(|f| {
        is_header_token(f, NAME_HEADERS)
            || is_header_token(f, MATRICULE_HEADERS)
            || is_header_token(f, GENDER_HEADERS)
    })
}

/// Parse CSV/Excel-derived text. The first of `,`, `;` or tab found on a line
/// is that line's delimiter.
pub fn parse_delimited(text: &str) -> ParseOutcome {
    let mut out = ParseOutcome::default();
    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let fields = split_delimited(line);
        accept_positional_row(&mut out, &fields);
    }
    out.finish("delimited")
}

fn accept_positional_row(out: &mut ParseOutcome, fields: &[String]) {
    let mut fields = fields.to_vec();
    while fields.last().is_some_and(|f| f.trim().is_empty()) {
        fields.pop();
    }
    if fields.iter().all(|f| f.trim().is_empty()) || is_header_like(&fields) {
        return;
    }
    let (record, gender_known) = record_from_positional(&fields);
    out.push(record, gender_known);
}

fn record_from_positional(fields: &[String]) -> (Option<StudentRecord>, bool) {
    let (name_raw, matricule_raw) = match fields {
        [only] => (only.as_str(), None),
        [first, second, ..] if is_numeric_id(first) => (second.as_str(), Some(first.as_str())),
        [first, second, ..] => (first.as_str(), Some(second.as_str())),
        [] => return (None, false),
    };
    let Some(name) = clean_name(name_raw) else {
        return (None, false);
    };
    let mut record = StudentRecord::named(name);
    record.matricule = matricule_raw.and_then(matricule_from);

    let gender = fields.get(2).and_then(|f| parse_gender(f));
    if let Some(g) = gender {
        record.gender = g;
    }
    (Some(record), gender.is_some())
}

#[derive(Debug, Default)]
struct HeaderMap {
    name: usize,
    matricule: Option<usize>,
    gender: Option<usize>,
    slot1: Option<usize>,
    slot2: Option<usize>,
}

fn header_map(row: &[String]) -> Option<HeaderMap> {
    let name = row.iter().position(|c| is_header_token(c, NAME_HEADERS))?;
    let mut map = HeaderMap {
        name,
        ..HeaderMap::default()
    };
    for (i, cell) in row.iter().enumerate() {
        if i == name {
            continue;
        }
        if map.matricule.is_none() && is_header_token(cell, MATRICULE_HEADERS) {
            map.matricule = Some(i);
        } else if map.gender.is_none() && is_header_token(cell, GENDER_HEADERS) {
            map.gender = Some(i);
        } else if is_header_token(cell, INDEX_HEADERS) {
            continue;
        } else if is_header_token(cell, SCORE_HEADERS) {
            if map.slot1.is_none() {
                map.slot1 = Some(i);
            } else if map.slot2.is_none() {
                map.slot2 = Some(i);
            }
        }
    }
    Some(map)
}

fn parse_score(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
}

/// Parse a spreadsheet cell grid. Columns are mapped by the first header row
/// that names a student column; grids without one fall back to positional rules.
pub fn parse_cell_grid(rows: &[Vec<String>]) -> ParseOutcome {
    let header = rows
        .iter()
        .enumerate()
        .find_map(|(i, row)| header_map(row).map(|m| (i, m)));

    let Some((header_idx, map)) = header else {
        let mut out = ParseOutcome::default();
        for row in rows {
            accept_positional_row(&mut out, row);
        }
        return out.finish("grid");
    };

    let mut out = ParseOutcome::default();
    for row in rows.iter().skip(header_idx + 1) {
        if row.iter().all(|c| c.trim().is_empty()) {
            continue;
        }
        let cell = |idx: Option<usize>| idx.and_then(|i| row.get(i)).map(String::as_str);
        let Some(name) = cell(Some(map.name)).and_then(clean_name) else {
            out.skipped += 1;
            continue;
        };
        let mut record = StudentRecord::named(name);
        record.matricule = cell(map.matricule).and_then(non_empty);
        let gender = cell(map.gender).and_then(parse_gender);
        if let Some(g) = gender {
            record.gender = g;
        }
        record.score_slot1 = cell(map.slot1).and_then(parse_score);
        record.score_slot2 = cell(map.slot2).and_then(parse_score);
        out.push(Some(record), gender.is_some());
    }
    out.finish("grid")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    #[test]
    fn delimited_numeric_first_column_is_matricule() {
        let out = parse_delimited("12,Jane Doe,Female");
        assert_eq!(out.records.len(), 1);
        let r = &out.records[0];
        assert_eq!(r.name, "Jane Doe");
        assert_eq!(r.matricule.as_deref(), Some("12"));
        assert_eq!(r.gender, Gender::Female);
        assert_eq!(out.gender_defaulted, 0);
    }

    #[test]
    fn numeric_lines_are_dropped() {
        assert!(parse_delimited("42").records.is_empty());
        assert!(parse_list("42").records.is_empty());
    }

    #[test]
    fn delimited_skips_headers_and_blank_rows() {
        let text = "Matricule;Nom;Sexe\n;;\n\n2024001;DUPONT marie;F\nali ben;A77;garçon\n";
        let out = parse_delimited(text);
        assert_eq!(out.records.len(), 2);
        assert_eq!(out.records[0].name, "Dupont Marie");
        assert_eq!(out.records[0].matricule.as_deref(), Some("2024001"));
        assert_eq!(out.records[0].gender, Gender::Female);
        assert_eq!(out.records[1].name, "Ali Ben");
        assert_eq!(out.records[1].matricule.as_deref(), Some("A77"));
        assert_eq!(out.records[1].gender, Gender::Male);
    }

    #[test]
    fn delimited_two_columns_default_to_male_and_are_counted() {
        let out = parse_delimited("Sara Lee\t9981");
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].matricule.as_deref(), Some("9981"));
        assert_eq!(out.records[0].gender, Gender::Male);
        assert_eq!(out.gender_defaulted, 1);
    }

    #[test]
    fn comma_takes_priority_over_other_delimiters() {
        let out = parse_delimited("1;Omar Haddad,7");
        assert_eq!(out.records[0].name, "1;omar Haddad");
        assert_eq!(out.records[0].matricule.as_deref(), Some("7"));
    }

    #[test]
    fn thousands_grouped_cell_is_matricule() {
        let rows = grid(&[&["1,234", "Omar Haddad"]]);
        let out = parse_cell_grid(&rows);
        assert_eq!(out.records[0].name, "Omar Haddad");
        assert_eq!(out.records[0].matricule.as_deref(), Some("1234"));
    }

    #[test]
    fn list_parser_handles_counters_gender_and_matricule() {
        let text = "1, jean dupont, M\n2, Amina Saleh, 2023-17, fille\nLeo Park, 88\n";
        let out = parse_list(text);
        assert_eq!(out.records.len(), 3);
        assert_eq!(out.records[0].name, "Jean Dupont");
        assert_eq!(out.records[0].gender, Gender::Male);
        assert_eq!(out.records[0].matricule, None);
        assert_eq!(out.records[1].matricule.as_deref(), Some("2023-17"));
        assert_eq!(out.records[1].gender, Gender::Female);
        assert_eq!(out.records[2].matricule.as_deref(), Some("88"));
        assert_eq!(out.gender_defaulted, 1);
    }

    #[test]
    fn list_parser_fallback_shapes() {
        let out = parse_list("Marie Curie (MC-01)\nPierre Curie - PC02\nIrene JOLIOT IJ2024\nplain name.");
        let got: Vec<(&str, Option<&str>)> = out
            .records
            .iter()
            .map(|r| (r.name.as_str(), r.matricule.as_deref()))
            .collect();
        assert_eq!(
            got,
            vec![
                ("Marie Curie", Some("MC-01")),
                ("Pierre Curie", Some("PC02")),
                ("Irene Joliot", Some("IJ2024")),
                ("Plain Name", None),
            ]
        );
    }

    #[test]
    fn clean_name_strips_ordinals_and_periods() {
        assert_eq!(clean_name("3. jane   DOE.").as_deref(), Some("Jane Doe"));
        assert_eq!(clean_name("1. 2. ali").as_deref(), Some("Ali"));
        assert_eq!(clean_name("12."), None);
        assert_eq!(clean_name("   "), None);
    }

    #[test]
    fn cell_grid_maps_columns_by_header() {
        let rows = grid(&[
            &["Class 3AS", "", ""],
            &["N°", "Nom et Prénom", "Note 1", "Note 2", "Matricule", "Sexe"],
            &["1", "jane doe", "12.5", "", "A1", "female"],
            &["2", "", "10", "11", "", ""],
            &["3", "omar", "", "7", "", ""],
        ]);
        let out = parse_cell_grid(&rows);
        assert_eq!(out.records.len(), 2);
        assert_eq!(out.skipped, 1);
        assert_eq!(out.records[0].score_slot1, Some(12.5));
        assert_eq!(out.records[0].score_slot2, None);
        assert_eq!(out.records[0].gender, Gender::Female);
        assert_eq!(out.records[1].name, "Omar");
        assert_eq!(out.records[1].score_slot2, Some(7.0));
    }

    #[test]
    fn cell_grid_without_header_is_positional() {
        let rows = grid(&[&["7", "Nadia Ali", "f"], &["", "", ""]]);
        let out = parse_cell_grid(&rows);
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].matricule.as_deref(), Some("7"));
        assert_eq!(out.records[0].gender, Gender::Female);
    }
}
