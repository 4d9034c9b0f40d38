use crate::audit::LogEntry;
use crate::config::{LOG_COLUMNS, REQUIRED_COLUMNS};
#[cfg(feature = "web")]
use crate::error::TrackerResult;
use crate::task::Task;

/// Convert tasks to CSV format
///
/// This function exports the task table to CSV (Comma-Separated Values) format.
/// It creates a string where:
/// - The first row holds the sheet column names
/// - Values are comma-separated
/// - Special characters (commas, quotes, newlines) are properly escaped
///
/// # Arguments
/// * `tasks` - Tasks to export, in display order
///
/// # Returns
/// * `String` - CSV content
///
/// # Examples
/// ```
/// use task_tracker::downloader::tasks_to_csv;
/// use task_tracker::task::seed_tasks;
///
/// let today = chrono::NaiveDate::from_ymd_opt(2025, 11, 20).unwrap();
/// let csv = tasks_to_csv(&seed_tasks(today));
/// assert!(csv.starts_with("id,titulo,"));
/// ```
pub fn tasks_to_csv(tasks: &[Task]) -> String {
    let header: Vec<String> = REQUIRED_COLUMNS.iter().map(|c| c.to_string()).collect();
    let rows = tasks.iter().map(|t| t.to_row(&header));
    write_csv(&header, rows)
}

/// One cell of the XLSX export
#[derive(Debug, Clone, PartialEq)]
pub enum XlsxCell {
    Number(f64),
    Text(String),
}

/// A task's XLSX cells in column order; id and progress stay numeric
pub fn xlsx_row(task: &Task) -> Vec<XlsxCell> {
    let header: Vec<String> = REQUIRED_COLUMNS.iter().map(|c| c.to_string()).collect();
    task.to_row(&header)
        .into_iter()
        .zip(REQUIRED_COLUMNS)
        .map(|(value, column)| match column {
            "id" => XlsxCell::Number(task.id as f64),
            "progresso" => XlsxCell::Number(task.progress as f64),
            _ => XlsxCell::Text(value),
        })
        .collect()
}

/// Convert audit log entries to CSV format, one line per entry
pub fn log_to_csv(entries: &[LogEntry]) -> String {
    let header: Vec<String> = LOG_COLUMNS.iter().map(|c| c.to_string()).collect();
    write_csv(&header, entries.iter().map(LogEntry::to_row))
}

fn write_csv(header: &[String], rows: impl Iterator<Item = Vec<String>>) -> String {
    let mut csv_content = String::new();
    push_line(&mut csv_content, header);
    for row in rows {
        push_line(&mut csv_content, &row);
    }
    csv_content
}

fn push_line(out: &mut String, values: &[String]) {
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        // Handle value - escape commas, quotes, newlines as needed
        if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r') {
            let escaped = value.replace('"', "\"\"");
            out.push_str(&format!("\"{}\"", escaped));
        } else {
            out.push_str(value);
        }
    }
    out.push('\n');
}

/// Convert tasks to XLSX format
///
/// Writes the task table with a bold header row using the rust_xlsxwriter
/// library. Ids and progress are written as numbers so the sheet can sort
/// and sum them.
///
/// # Arguments
/// * `tasks` - Tasks to export
///
/// # Returns
/// * `TrackerResult<Vec<u8>>` - XLSX file content as bytes or an error
#[cfg(feature = "web")]
pub fn tasks_to_xlsx(tasks: &[Task]) -> TrackerResult<Vec<u8>> {
    use crate::error::TrackerError;
    use rust_xlsxwriter::{Format, Workbook};

    let export = |e: rust_xlsxwriter::XlsxError| TrackerError::Export(e.to_string());

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    let bold = Format::new().set_bold();

    for (c, column) in REQUIRED_COLUMNS.iter().enumerate() {
        worksheet
            .write_string_with_format(0, c as u16, *column, &bold)
            .map_err(export)?;
    }

    for (r, task) in tasks.iter().enumerate() {
        let row = (r + 1) as u32;
        for (c, cell) in xlsx_row(task).iter().enumerate() {
            let col = c as u16;
            match cell {
                XlsxCell::Number(n) => worksheet.write_number(row, col, *n),
                XlsxCell::Text(s) => worksheet.write_string(row, col, s),
            }
            .map_err(export)?;
        }
    }

    let buffer = workbook.save_to_buffer().map_err(export)?;
    Ok(buffer)
}
