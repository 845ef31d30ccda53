// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use crate::workbook::{CellValue, Workbook};
use rust_xlsxwriter::{Format, Workbook as XlsxWorkbook, XlsxError};
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{} is open in another program; close it and run again", .0.display())]
    Locked(PathBuf),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("spreadsheet error: {0}")]
    Xlsx(#[from] XlsxError),
}

pub fn output_path(output_dir: &Path, workbook: &Workbook) -> PathBuf {
    output_dir.join(workbook.file_name())
}

/// Office writes `~$name.xlsx` next to an open file, LibreOffice writes
/// `.~lock.name.xlsx#`. A file we cannot open for writing counts as locked too.
pub fn is_locked(path: &Path) -> bool {
    let (Some(dir), Some(name)) = (path.parent(), path.file_name()) else {
        return false;
    };
    let name = name.to_string_lossy();
    let owner_files = [format!("~${}", name), format!(".~lock.{}#", name)];
    if owner_files.iter().any(|f| dir.join(f).exists()) {
        return true;
    }

    if path.exists() {
        if let Err(e) = OpenOptions::new().append(true).open(path) {
            return e.kind() == ErrorKind::PermissionDenied;
        }
    }
    false
}

/// Write the workbook to `<output_dir>/<file name>`.
///
/// The document is written to a sibling temp file first and renamed into
/// place, so a failed save leaves any previous file intact.
pub fn save(workbook: &Workbook, output_dir: &Path) -> Result<PathBuf, StoreError> {
    let path = output_path(output_dir, workbook);
    if is_locked(&path) {
        return Err(StoreError::Locked(path));
    }

    fs::create_dir_all(output_dir)?;
    let tmp_path = path.with_extension("xlsx.tmp");
    let mut book = build_xlsx(workbook)?;
    book.save(&tmp_path)?;

    if let Err(e) = fs::rename(&tmp_path, &path) {
        let _ = fs::remove_file(&tmp_path);
        if e.kind() == ErrorKind::PermissionDenied {
            return Err(StoreError::Locked(path));
        }
        return Err(e.into());
    }

    debug!("Saved {}", path.display());
    Ok(path)
}

fn build_xlsx(workbook: &Workbook) -> Result<XlsxWorkbook, StoreError> {
    let mut book = XlsxWorkbook::new();
    let bold = Format::new().set_bold();

    for sheet in workbook.sheets() {
        let ws = book.add_worksheet();
        ws.set_name(&sheet.name)?;
        for ((row, col), cell) in sheet.cells() {
            match (&cell.value, cell.bold) {
                (CellValue::Number(n), true) => {
                    ws.write_number_with_format(row, col, *n, &bold)?;
                }
                (CellValue::Number(n), false) => {
                    ws.write_number(row, col, *n)?;
                }
                (CellValue::Text(s), true) => {
                    ws.write_string_with_format(row, col, s, &bold)?;
                }
                (CellValue::Text(s), false) => {
                    ws.write_string(row, col, s)?;
                }
            }
        }
        for (col, width) in sheet.column_widths() {
            ws.set_column_width(col, width)?;
        }
    }

    Ok(book)
}
