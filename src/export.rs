//! Flattening of extracted records into spreadsheet rows, and the spreadsheet
//! writer the analyzer hands them to.

use crate::types::ExtractedRecord;
use rust_xlsxwriter::{Format, Workbook, XlsxError};
use std::path::{Path, PathBuf};

pub const SHEET_NAME: &str = "Datos Extraídos";
pub const EXPORT_FILE_NAME: &str = "appphoto_data.xlsx";
pub const GRANDPARENT_SEPARATOR: &str = ", ";

pub const COLUMN_LABELS: [&str; 7] = [
    "Nombre Completo",
    "Fecha de Nacimiento",
    "Fecha de Bautismo",
    "Nombre del Padre",
    "Nombre de la Madre",
    "Abuelos Paternos",
    "Abuelos Maternos",
];

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("failed to build spreadsheet: {0}")]
    Workbook(#[from] XlsxError),

    #[error("failed to write spreadsheet: {0}")]
    Io(#[from] std::io::Error),
}

/// One spreadsheet row: human-readable column label to cell text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlatRecord {
    cells: Vec<(&'static str, String)>,
}

impl FlatRecord {
    pub fn get(&self, label: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(column, _)| *column == label)
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.cells.iter().map(|(column, value)| (*column, value.as_str()))
    }
}

fn text_cell(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn names_cell(value: &Option<Vec<String>>) -> String {
    value
        .as_ref()
        .map(|names| names.join(GRANDPARENT_SEPARATOR))
        .unwrap_or_default()
}

pub fn flatten_record(record: &ExtractedRecord) -> FlatRecord {
    let values = [
        text_cell(&record.full_name),
        text_cell(&record.birth_date),
        text_cell(&record.baptism_date),
        text_cell(&record.father_name),
        text_cell(&record.mother_name),
        names_cell(&record.paternal_grandparents),
        names_cell(&record.maternal_grandparents),
    ];
    FlatRecord {
        cells: COLUMN_LABELS.into_iter().zip(values).collect(),
    }
}

pub fn flatten_records(records: &[ExtractedRecord]) -> Vec<FlatRecord> {
    records.iter().map(flatten_record).collect()
}

/// Destination for flattened rows.
pub trait RecordExporter: Send + Sync {
    fn export_records(&self, rows: &[FlatRecord]) -> Result<(), ExportError>;
}

/// Serializes rows into an `.xlsx` workbook with a header row.
pub fn build_workbook(rows: &[FlatRecord]) -> Result<Vec<u8>, ExportError> {
    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(SHEET_NAME)?;

    for (col, label) in COLUMN_LABELS.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, *label, &header)?;
    }
    for (index, row) in rows.iter().enumerate() {
        let row_num = index as u32 + 1;
        for (col, (_, value)) in row.iter().enumerate() {
            worksheet.write_string(row_num, col as u16, value)?;
        }
    }

    Ok(workbook.save_to_buffer()?)
}

/// Writes `appphoto_data.xlsx` into a directory on native targets; in the
/// browser the workbook is offered as a download instead.
#[derive(Clone, Debug)]
pub struct XlsxExporter {
    output_dir: PathBuf,
}

impl XlsxExporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join(EXPORT_FILE_NAME)
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn deliver(&self, workbook: Vec<u8>) -> Result<(), ExportError> {
        std::fs::create_dir_all(&self.output_dir)?;
        let path = self.output_path();
        std::fs::write(&path, workbook)?;
        tracing::info!(path = %path.display(), "exported spreadsheet");
        Ok(())
    }

    #[cfg(target_arch = "wasm32")]
    fn deliver(&self, workbook: Vec<u8>) -> Result<(), ExportError> {
        use base64::Engine as _;
        use base64::engine::general_purpose::STANDARD as BASE64;

        const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
        let encoded = BASE64.encode(workbook);
        let script = format!(
            r#"const link = document.createElement('a');
link.href = 'data:{XLSX_MIME};base64,{encoded}';
link.download = '{EXPORT_FILE_NAME}';
document.body.appendChild(link);
link.click();
link.remove();"#
        );
        let _ = dioxus::document::eval(&script);
        Ok(())
    }
}

impl RecordExporter for XlsxExporter {
    fn export_records(&self, rows: &[FlatRecord]) -> Result<(), ExportError> {
        let workbook = build_workbook(rows)?;
        self.deliver(workbook)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grandparents_are_joined_and_nulls_become_empty() {
        let record = ExtractedRecord {
            paternal_grandparents: Some(vec!["A".to_string(), "B".to_string()]),
            ..Default::default()
        };
        let row = flatten_record(&record);

        assert_eq!(row.get("Abuelos Paternos"), Some("A, B"));
        for (label, value) in row.iter() {
            if label != "Abuelos Paternos" {
                assert_eq!(value, "", "{label} should be empty");
            }
        }
    }

    #[test]
    fn columns_follow_label_order() {
        let record = ExtractedRecord {
            full_name: Some("Ana Ruiz".to_string()),
            mother_name: Some("Lucía Pérez".to_string()),
            maternal_grandparents: Some(vec![]),
            ..Default::default()
        };
        let row = flatten_record(&record);
        let labels: Vec<&str> = row.iter().map(|(label, _)| label).collect();
        assert_eq!(labels, COLUMN_LABELS);
        assert_eq!(row.get("Nombre Completo"), Some("Ana Ruiz"));
        assert_eq!(row.get("Nombre de la Madre"), Some("Lucía Pérez"));
        assert_eq!(row.get("Abuelos Maternos"), Some(""));
    }

    #[test]
    fn workbook_is_a_zip_container() {
        let rows = flatten_records(&[ExtractedRecord::default()]);
        let bytes = build_workbook(&rows).unwrap();
        assert!(bytes.starts_with(b"PK"));
    }

    #[test]
    fn exporter_writes_into_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = XlsxExporter::new(dir.path().join("nested"));
        let rows = flatten_records(&[ExtractedRecord {
            full_name: Some("Ana".to_string()),
            ..Default::default()
        }]);

        exporter.export_records(&rows).unwrap();
        assert!(exporter.output_path().exists());
    }
}
