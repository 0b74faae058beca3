mod csv_out;
mod error;
mod geometry;
mod grid;
mod line_blocks;
mod locator;
mod model;
mod normalize;
mod options;
mod pdf_reader;
mod sheets;
mod warning;

use std::path::Path;

use crate::pdf_reader::{read_document, read_document_from_bytes};
use crate::sheets::parse_sheet;

pub use csv_out::{write_csv, write_csv_to_string};
pub use error::{ExtractError, SheetError};
pub use geometry::{
    ColumnLayout, ColumnPlan, DividerRule, Region, SnapRule, StopAnchor, TableGeometry,
    resolve_columns, resolve_region,
};
pub use grid::{GridOptions, extract_grid, page_lines};
pub use line_blocks::{LineSheet, parse_lap_chart_lines, parse_starting_grid_lines};
pub use locator::{HeaderCandidate, HeaderHit, find_image_header, locate_header, search, search_words};
pub use model::{Document, Drawing, LogicalRecord, Page, RawGrid, RawRow, Rect, Table, Value, Word};
pub use normalize::{
    NormalizeRules, OverflowFields, OverflowRule, SchemaVariant, normalize_grid,
    repair_overflow_row, select_schema, title_case,
};
pub use options::{ExtractOptions, HeaderImageTolerance, PageSelection};
pub use sheets::{SheetConfig, SheetKind, TableSheet};
pub use warning::{ExtractWarning, WarningCode};

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionReport {
    pub kind: SheetKind,
    pub row_count: usize,
    /// Page the table was anchored on, for anchored sheets.
    pub page: Option<u32>,
    pub warnings: Vec<ExtractWarning>,
}

fn validate(options: &ExtractOptions) -> Result<(), ExtractError> {
    options.validate().map_err(ExtractError::InvalidOption)
}

/// Parses an already loaded document. Every stage failure names `document.path`.
pub fn parse_document(
    document: &Document,
    kind: SheetKind,
    options: &ExtractOptions,
) -> Result<Table, ExtractError> {
    validate(options)?;
    parse_sheet(document, kind, options).map_err(|source| ExtractError::sheet(&document.path, source))
}

pub fn parse_pdf(
    input_pdf: &Path,
    kind: SheetKind,
    options: &ExtractOptions,
) -> Result<Table, ExtractError> {
    validate(options)?;
    let document = read_document(input_pdf, options.pages.as_ref())?;
    parse_document(&document, kind, options)
}

/// Same as [`parse_pdf`] for an in-memory PDF; errors name `label` as the path.
pub fn parse_pdf_bytes(
    label: &Path,
    input_pdf: &[u8],
    kind: SheetKind,
    options: &ExtractOptions,
) -> Result<Table, ExtractError> {
    validate(options)?;
    let document = read_document_from_bytes(label, input_pdf, options.pages.as_ref())?;
    parse_document(&document, kind, options)
}

pub fn extract_pdf_to_csv(
    input_pdf: &Path,
    output_csv: &Path,
    kind: SheetKind,
    options: &ExtractOptions,
) -> Result<ExtractionReport, ExtractError> {
    let table = parse_pdf(input_pdf, kind, options)?;
    write_csv(output_csv, &table, options.delimiter)?;

    Ok(ExtractionReport {
        kind,
        row_count: table.len(),
        page: table.page,
        warnings: table.warnings,
    })
}
