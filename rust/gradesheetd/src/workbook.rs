use anyhow::{anyhow, Context};
use calamine::{open_workbook_from_rs, Data, Range, Reader, Xlsx};
use rust_xlsxwriter::Workbook;
use std::io::Cursor;

use crate::sheet::{COL_INDEX, COL_SCORE1, COL_SCORE2};
use crate::validate::format_number;

pub const EXPORT_SHEET_NAME: &str = "Notes";

/// Read the first worksheet into a string grid addressed from A1, so fixed
/// template coordinates stay valid even when the used range starts lower.
pub fn read_first_sheet(bytes: &[u8]) -> anyhow::Result<Vec<Vec<String>>> {
    let mut workbook: Xlsx<_> =
        open_workbook_from_rs(Cursor::new(bytes)).context("failed to open xlsx workbook")?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| anyhow!("workbook has no worksheets"))?
        .context("failed to read first worksheet")?;
    Ok(range_to_grid(&range))
}

fn range_to_grid(range: &Range<Data>) -> Vec<Vec<String>> {
    let Some((start_row, start_col)) = range.start() else {
        return Vec::new();
    };
    let mut grid: Vec<Vec<String>> = vec![Vec::new(); start_row as usize];
    for row in range.rows() {
        let mut out = vec![String::new(); start_col as usize];
        out.extend(row.iter().map(cell_to_string));
        while out.last().is_some_and(|c| c.is_empty()) {
            out.pop();
        }
        grid.push(out);
    }
    grid
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) => format_number(*f),
        Data::Int(i) => i.to_string(),
        other => other.to_string(),
    }
}

/// Build a one-sheet workbook from the display grid. Index and score cells that
/// hold numbers are written as numbers so the sheet stays usable in Excel.
pub fn write_grid(rows: &[Vec<String>], sheet_name: &str) -> anyhow::Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet
        .set_name(sheet_name)
        .with_context(|| format!("invalid sheet name {sheet_name:?}"))?;

    for (r, row) in rows.iter().enumerate() {
        let r32 = u32::try_from(r).context("too many rows for xlsx")?;
        for (c, value) in row.iter().enumerate() {
            if value.is_empty() {
                continue;
            }
            let c16 = u16::try_from(c).context("too many columns for xlsx")?;
            let numeric = r > 0 && matches!(c, COL_INDEX | COL_SCORE1 | COL_SCORE2);
            match value.parse::<f64>() {
                Ok(n) if numeric && n.is_finite() => {
                    worksheet
                        .write_number(r32, c16, n)
                        .with_context(|| format!("failed to write number at ({r}, {c})"))?;
                }
                _ => {
                    worksheet
                        .write_string(r32, c16, value)
                        .with_context(|| format!("failed to write text at ({r}, {c})"))?;
                }
            }
        }
    }

    workbook
        .save_to_buffer()
        .context("failed to serialize workbook")
}
