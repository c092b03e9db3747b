use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::roster::{clean_name, parse_gender, StudentRecord};
use crate::stats::TermCounters;
use crate::validate::{sanitize_text_input, validate_grade_input, validate_numeric_input};

pub const COL_INDEX: usize = 0;
pub const COL_NAME: usize = 1;
pub const COL_SCORE1: usize = 2;
pub const COL_SCORE2: usize = 3;
pub const COL_MATRICULE: usize = 4;
pub const COL_GENDER: usize = 5;
pub const DISPLAY_COLS: usize = 6;

/// Header row written on export. Each label is one `parse_cell_grid` maps back
/// to the same display column.
pub const DEFAULT_HEADERS: [&str; DISPLAY_COLS] =
    ["N°", "Nom et Prénom", "Note 1", "Note 2", "Matricule", "Sexe"];

pub const DEFAULT_TWENTY_POINT_CLASSES: &[&str] = &["1AM", "2AM", "3AM", "4AM", "1AS", "2AS", "3AS"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GradingConvention {
    #[default]
    TwentyPoint,
    HundredPoint,
}

impl GradingConvention {
    pub fn max_grade(self) -> f64 {
        match self {
            GradingConvention::TwentyPoint => 20.0,
            GradingConvention::HundredPoint => 100.0,
        }
    }
}

/// Maps class names to their grading convention.
#[derive(Debug, Clone)]
pub struct ClassCatalog {
    twenty_point: Vec<String>,
}

impl Default for ClassCatalog {
    fn default() -> Self {
        Self::new(DEFAULT_TWENTY_POINT_CLASSES.iter().map(|s| s.to_string()))
    }
}

impl ClassCatalog {
    pub fn new<I: IntoIterator<Item = String>>(twenty_point: I) -> Self {
        Self {
            twenty_point: twenty_point
                .into_iter()
                .map(|s| s.trim().to_ascii_uppercase())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    pub fn convention_for(&self, class_name: &str) -> GradingConvention {
        let key = class_name.trim().to_ascii_uppercase();
        if self.twenty_point.iter().any(|c| *c == key) {
            GradingConvention::TwentyPoint
        } else {
            GradingConvention::HundredPoint
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SideFieldKind {
    Counter,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SideField {
    pub row: usize,
    pub col: usize,
    pub kind: SideFieldKind,
}

/// Largest worksheet an xlsx file can hold.
pub const MAX_SHEET_ROWS: usize = 1_048_576;
pub const MAX_SHEET_COLS: usize = 16_384;

/// Where things live in the source template. Missing fields take the
/// default template's values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TemplateSchema {
    pub header_row: usize,
    pub index_col: usize,
    pub name_col: usize,
    pub score1_col: usize,
    pub score2_col: usize,
    pub matricule_col: Option<usize>,
    pub gender_col: Option<usize>,
    pub side_fields: BTreeMap<String, SideField>,
}

pub const FIELD_COURSES_EXPECTED: &str = "coursesExpected";
pub const FIELD_COURSES_DONE: &str = "coursesDone";
pub const FIELD_HOURS_EXPECTED: &str = "hoursExpected";
pub const FIELD_HOURS_DONE: &str = "hoursDone";
pub const FIELD_PRACTICAL_EXPECTED: &str = "practicalExpected";
pub const FIELD_PRACTICAL_DONE: &str = "practicalDone";
pub const FIELD_COMPETENCIES: &str = "competencies";

impl Default for TemplateSchema {
    fn default() -> Self {
        let counter = |row, col| SideField {
            row,
            col,
            kind: SideFieldKind::Counter,
        };
        let side_fields = BTreeMap::from([
            (FIELD_COURSES_EXPECTED.to_string(), counter(1, 9)),
            (FIELD_COURSES_DONE.to_string(), counter(1, 10)),
            (FIELD_HOURS_EXPECTED.to_string(), counter(2, 9)),
            (FIELD_HOURS_DONE.to_string(), counter(2, 10)),
            (FIELD_PRACTICAL_EXPECTED.to_string(), counter(3, 9)),
            (FIELD_PRACTICAL_DONE.to_string(), counter(3, 10)),
            (
                FIELD_COMPETENCIES.to_string(),
                SideField {
                    row: 5,
                    col: 8,
                    kind: SideFieldKind::Text,
                },
            ),
        ]);
        Self {
            header_row: 7,
            index_col: 0,
            matricule_col: Some(1),
            name_col: 2,
            gender_col: Some(3),
            score1_col: 4,
            score2_col: 5,
            side_fields,
        }
    }
}

impl TemplateSchema {
    /// Every coordinate must fit inside an xlsx worksheet.
    pub fn check_bounds(&self) -> Result<(), String> {
        if self.header_row >= MAX_SHEET_ROWS {
            return Err(format!("headerRow {} is outside the sheet", self.header_row));
        }
        let cols = [
            ("indexCol", Some(self.index_col)),
            ("nameCol", Some(self.name_col)),
            ("score1Col", Some(self.score1_col)),
            ("score2Col", Some(self.score2_col)),
            ("matriculeCol", self.matricule_col),
            ("genderCol", self.gender_col),
        ];
        for (name, col) in cols {
            if let Some(c) = col.filter(|c| *c >= MAX_SHEET_COLS) {
                return Err(format!("{name} {c} is outside the sheet"));
            }
        }
        for (name, f) in &self.side_fields {
            if f.row >= MAX_SHEET_ROWS || f.col >= MAX_SHEET_COLS {
                return Err(format!(
                    "side field {name} at ({}, {}) is outside the sheet",
                    f.row, f.col
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellWrite {
    Stored(String),
    Ignored,
}

/// Editable grade grid plus the source template it was cut from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeSheet {
    pub display: Vec<Vec<String>>,
    pub all_rows: Vec<Vec<String>>,
    pub schema: TemplateSchema,
    pub convention: GradingConvention,
}

fn cell_at(rows: &[Vec<String>], row: usize, col: usize) -> &str {
    rows.get(row)
        .and_then(|r| r.get(col))
        .map(|s| s.trim())
        .unwrap_or("")
}

impl GradeSheet {
    pub fn from_template(
        all_rows: Vec<Vec<String>>,
        schema: TemplateSchema,
        convention: GradingConvention,
    ) -> Self {
        let max = convention.max_grade();
        let source_cols = [
            Some(schema.index_col),
            Some(schema.name_col),
            Some(schema.score1_col),
            Some(schema.score2_col),
            schema.matricule_col,
            schema.gender_col,
        ];

        let header: Vec<String> = source_cols
            .iter()
            .zip(DEFAULT_HEADERS)
            .map(|(col, fallback)| {
                let v = col.map(|c| cell_at(&all_rows, schema.header_row, c)).unwrap_or("");
                if v.is_empty() {
                    fallback.to_string()
                } else {
                    v.to_string()
                }
            })
            .collect();

        let mut display = vec![header];
        for r in schema.header_row.saturating_add(1)..all_rows.len() {
            let Some(name) = clean_name(cell_at(&all_rows, r, schema.name_col)) else {
                continue;
            };
            let source = |col: Option<usize>| {
                col.map(|c| cell_at(&all_rows, r, c).to_string())
                    .unwrap_or_default()
            };
            let gender = parse_gender(&source(schema.gender_col))
                .unwrap_or_default()
                .as_str()
                .to_string();
            display.push(vec![
                display.len().to_string(),
                name,
                validate_grade_input(&source(Some(schema.score1_col)), max),
                validate_grade_input(&source(Some(schema.score2_col)), max),
                source(schema.matricule_col),
                gender,
            ]);
        }

        Self {
            display,
            all_rows,
            schema,
            convention,
        }
    }

    pub fn row_count(&self) -> usize {
        self.display.len().saturating_sub(1)
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&str> {
        self.display.get(row).and_then(|r| r.get(col)).map(String::as_str)
    }

    /// Only data rows in the two score columns accept writes; everything else
    /// is left untouched.
    pub fn set_cell(&mut self, row: usize, col: usize, raw: &str) -> CellWrite {
        if row == 0 || !(col == COL_SCORE1 || col == COL_SCORE2) {
            return CellWrite::Ignored;
        }
        let max = self.convention.max_grade();
        let Some(slot) = self.display.get_mut(row).and_then(|r| r.get_mut(col)) else {
            return CellWrite::Ignored;
        };
        let value = validate_grade_input(raw, max);
        *slot = value.clone();
        CellWrite::Stored(value)
    }

    pub fn side_field(&self, name: &str) -> Option<&str> {
        let f = self.schema.side_fields.get(name)?;
        Some(cell_at(&self.all_rows, f.row, f.col))
    }

    pub fn side_fields(&self) -> BTreeMap<String, String> {
        self.schema
            .side_fields
            .iter()
            .map(|(k, f)| (k.clone(), cell_at(&self.all_rows, f.row, f.col).to_string()))
            .collect()
    }

    /// Returns the stored value, or `None` for an unknown field name or one
    /// placed outside the sheet.
    pub fn set_side_field(&mut self, name: &str, raw: &str) -> Option<String> {
        let f = *self.schema.side_fields.get(name)?;
        if f.row >= MAX_SHEET_ROWS || f.col >= MAX_SHEET_COLS {
            return None;
        }
        let value = match f.kind {
            SideFieldKind::Counter => validate_numeric_input(raw),
            SideFieldKind::Text => sanitize_text_input(raw),
        };
        if self.all_rows.len() <= f.row {
            self.all_rows.resize_with(f.row + 1, Vec::new);
        }
        let row = &mut self.all_rows[f.row];
        if row.len() <= f.col {
            row.resize(f.col + 1, String::new());
        }
        row[f.col] = value.clone();
        Some(value)
    }

    pub fn term_counters(&self) -> TermCounters {
        let n = |name: &str| {
            self.side_field(name)
                .map(validate_numeric_input)
                .and_then(|d| d.parse::<u64>().ok())
                .unwrap_or(0)
        };
        TermCounters {
            courses_expected: n(FIELD_COURSES_EXPECTED),
            courses_done: n(FIELD_COURSES_DONE),
            hours_expected: n(FIELD_HOURS_EXPECTED),
            hours_done: n(FIELD_HOURS_DONE),
            practical_expected: n(FIELD_PRACTICAL_EXPECTED),
            practical_done: n(FIELD_PRACTICAL_DONE),
        }
    }

    /// The display grid as it is written out: the template's header labels
    /// are swapped for `DEFAULT_HEADERS` so the file parses back by column name.
    pub fn export_rows(&self) -> Vec<Vec<String>> {
        let mut rows = self.display.clone();
        if let Some(header) = rows.first_mut() {
            *header = DEFAULT_HEADERS.iter().map(|h| h.to_string()).collect();
        }
        rows
    }

    pub fn records(&self) -> Vec<StudentRecord> {
        self.display
            .iter()
            .skip(1)
            .filter_map(|row| {
                let cell = |c: usize| row.get(c).map(|s| s.trim()).unwrap_or("");
                let name = clean_name(cell(COL_NAME))?;
                let score = |c: usize| cell(c).parse::<f64>().ok().filter(|v| v.is_finite());
                Some(StudentRecord {
                    name,
                    matricule: Some(cell(COL_MATRICULE))
                        .filter(|m| !m.is_empty())
                        .map(str::to_string),
                    gender: parse_gender(cell(COL_GENDER)).unwrap_or_default(),
                    score_slot1: score(COL_SCORE1),
                    score_slot2: score(COL_SCORE2),
                })
            })
            .collect()
    }
}
