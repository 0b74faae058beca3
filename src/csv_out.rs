use std::io::Write;
use std::path::Path;

use csv::{Writer, WriterBuilder};

use crate::error::ExtractError;
use crate::model::Table;

fn write_table<W: Write>(writer: &mut Writer<W>, table: &Table) -> Result<(), ExtractError> {
    writer.write_record(&table.fields)?;
    for record in &table.records {
        writer.write_record(record.values.iter().map(crate::model::Value::to_cell))?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes `table` with a header row. Null integers become empty cells.
pub fn write_csv(path: &Path, table: &Table, delimiter: u8) -> Result<(), ExtractError> {
    let mut writer = WriterBuilder::new().delimiter(delimiter).from_path(path)?;
    write_table(&mut writer, table)
}

pub fn write_csv_to_string(table: &Table, delimiter: u8) -> Result<String, ExtractError> {
    let mut writer = WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(Vec::<u8>::new());
    write_table(&mut writer, table)?;

    let bytes = writer
        .into_inner()
        .map_err(|error| ExtractError::Csv(error.into_error().into()))?;
    String::from_utf8(bytes)
        .map_err(|error| ExtractError::InvalidOption(format!("invalid utf-8 csv output: {error}")))
}
