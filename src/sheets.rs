//! Per-document configuration and the one generic table parser driven by it.

use std::fmt;
use std::str::FromStr;

use tracing::debug;

use crate::error::SheetError;
use crate::geometry::{ColumnPlan, DividerRule, SnapRule, StopAnchor, resolve_columns, resolve_region};
use crate::grid::{GridOptions, extract_grid};
use crate::line_blocks::{LineSheet, parse_line_sheet};
use crate::locator::{HeaderCandidate, locate_header};
use crate::model::{Document, Table};
use crate::normalize::{NormalizeRules, OverflowRule, SchemaVariant, normalize_grid};
use crate::options::ExtractOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SheetKind {
    Qualifying,
    RaceClassification,
    SprintClassification,
    StartingGrid,
    PitStopSummary,
    LapChart,
}

impl SheetKind {
    pub const ALL: [Self; 6] = [
        Self::Qualifying,
        Self::RaceClassification,
        Self::SprintClassification,
        Self::StartingGrid,
        Self::PitStopSummary,
        Self::LapChart,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Qualifying => "quali",
            Self::RaceClassification => "race",
            Self::SprintClassification => "sprint",
            Self::StartingGrid => "grid",
            Self::PitStopSummary => "pit-stops",
            Self::LapChart => "lap-chart",
        }
    }

    #[must_use]
    pub const fn config(self) -> SheetConfig {
        match self {
            Self::Qualifying => SheetConfig::Table(QUALIFYING),
            Self::RaceClassification => SheetConfig::Table(RACE_CLASSIFICATION),
            Self::SprintClassification => SheetConfig::Table(SPRINT_CLASSIFICATION),
            Self::PitStopSummary => SheetConfig::Table(PIT_STOP_SUMMARY),
            Self::StartingGrid => SheetConfig::Lines(LineSheet::StartingGrid),
            Self::LapChart => SheetConfig::Lines(LineSheet::LapChart),
        }
    }
}

impl fmt::Display for SheetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SheetKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let wanted = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| {
                let known = Self::ALL.map(Self::as_str).join(", ");
                format!("unknown sheet kind '{value}', expected one of: {known}")
            })
    }
}

/// Landmarks, geometry and schema for a table anchored on a title.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TableSheet {
    pub headers: &'static [HeaderCandidate],
    pub stops: &'static [StopAnchor],
    pub columns: ColumnPlan,
    pub snap: Option<SnapRule>,
    /// Raw column that must be non-empty for a row to count.
    pub identity_column: usize,
    pub rules: NormalizeRules,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SheetConfig {
    Table(TableSheet),
    Lines(LineSheet),
}

const CLASSIFICATION_HEADERS: &[HeaderCandidate] = &[
    HeaderCandidate::text("Final Classification"),
    HeaderCandidate::provisional("Provisional Classification"),
    HeaderCandidate::Image,
];

const QUALI_NARROW: SchemaVariant = SchemaVariant {
    fields: &[
        "_", "no", "driver", "nat", "entrant", "q1", "q1_laps", "q1_time", "q2", "q2_laps",
        "q2_time", "q3", "q3_laps", "q3_time",
    ],
    probe: None,
    phase_groups: &[3, 3, 3],
};

const QUALI_WIDE: SchemaVariant = SchemaVariant {
    fields: &[
        "_", "no", "driver", "nat", "entrant", "q1", "q1_laps", "q1_laps_%", "q1_time", "q2",
        "q2_laps", "q2_time", "q3", "q3_laps", "q3_time",
    ],
    probe: Some((7, "%")),
    phase_groups: &[4, 3, 3],
};

pub const QUALIFYING: TableSheet = TableSheet {
    headers: CLASSIFICATION_HEADERS,
    stops: &[
        StopAnchor::Text("NOT CLASSIFIED - "),
        StopAnchor::Text("POLE POSITION LAP"),
        StopAnchor::Text("FASTEST LAP"),
        StopAnchor::Text("Formula One World Championship"),
    ],
    columns: ColumnPlan::Inferred {
        header_label: "DRIVER",
        leading_column: true,
    },
    snap: Some(SnapRule::Gap {
        left: "NAT",
        right: "ENTRANT",
        factor: 1.2,
    }),
    identity_column: 0,
    rules: NormalizeRules {
        variants: &[QUALI_NARROW, QUALI_WIDE],
        overflow: Some(OverflowRule {
            source_field: "_",
            trigger_field: "driver",
            number_field: "no",
            entrant_field: "entrant",
        }),
        drop_fields: &["_", "nat"],
        required_field: Some("no"),
        zero_if_empty: &[],
        title_case: &["driver"],
    },
};

const CLASSIFICATION_COLUMNS: ColumnPlan = ColumnPlan::Explicit {
    labels: &[
        "NO", "DRIVER", "NAT", "ENTRANT", "LAPS", "TIME", "GAP", "INT", "KM/H", "FASTEST", "ON",
        "PTS",
    ],
    dividers: &[
        DividerRule::LeftOf("NO"),
        DividerRule::Between("NO", "DRIVER"),
        DividerRule::LeftOf("NAT"),
        DividerRule::RightOf("NAT"),
        DividerRule::LeftOf("LAPS"),
        DividerRule::RightOf("LAPS"),
        DividerRule::Between("TIME", "GAP"),
        DividerRule::Between("GAP", "INT"),
        DividerRule::Between("INT", "KM/H"),
        DividerRule::LeftOf("FASTEST"),
        DividerRule::RightOf("FASTEST"),
        DividerRule::LeftOf("PTS"),
        DividerRule::RightOf("PTS"),
    ],
    clip_to_first_label: true,
};

const CLASSIFICATION_RULES: NormalizeRules = NormalizeRules {
    variants: &[SchemaVariant {
        fields: &[
            "driver_no", "driver", "nat", "entrant", "laps", "time", "gap", "int", "km/h",
            "fastest", "on", "points",
        ],
        probe: None,
        phase_groups: &[],
    }],
    overflow: None,
    drop_fields: &["driver", "nat", "int"],
    required_field: Some("driver_no"),
    zero_if_empty: &["points"],
    title_case: &[],
};

pub const RACE_CLASSIFICATION: TableSheet = TableSheet {
    headers: CLASSIFICATION_HEADERS,
    stops: &[StopAnchor::Text("FASTEST LAP")],
    columns: CLASSIFICATION_COLUMNS,
    snap: Some(SnapRule::Gap {
        left: "FASTEST",
        right: "ON",
        factor: 1.0,
    }),
    identity_column: 0,
    rules: CLASSIFICATION_RULES,
};

pub const SPRINT_CLASSIFICATION: TableSheet = TableSheet {
    headers: &[
        HeaderCandidate::text("Sprint Final Classification"),
        HeaderCandidate::provisional("Sprint Provisional Classification"),
        HeaderCandidate::text("Final Classification"),
        HeaderCandidate::provisional("Provisional Classification"),
        HeaderCandidate::Image,
    ],
    ..RACE_CLASSIFICATION
};

pub const PIT_STOP_SUMMARY: TableSheet = TableSheet {
    headers: &[HeaderCandidate::text("Pit Stop Summary"), HeaderCandidate::Image],
    stops: &[
        StopAnchor::Text("Formula One World Championship"),
        StopAnchor::PageBottom,
    ],
    columns: ColumnPlan::Inferred {
        header_label: "DRIVER",
        leading_column: false,
    },
    snap: Some(SnapRule::Fixed(6.0)),
    identity_column: 0,
    rules: NormalizeRules {
        variants: &[SchemaVariant {
            fields: &[
                "driver_no", "driver", "entrant", "lap", "local_time", "stop", "duration",
                "total_time",
            ],
            probe: None,
            phase_groups: &[],
        }],
        overflow: None,
        drop_fields: &[],
        required_field: Some("driver_no"),
        zero_if_empty: &[],
        title_case: &[],
    },
};

pub fn parse_table_sheet(
    document: &Document,
    sheet: &TableSheet,
    options: &ExtractOptions,
) -> Result<Table, SheetError> {
    let mut warnings = Vec::new();
    let hit = locate_header(document, sheet.headers, options, &mut warnings)?;
    let page = &document.pages[hit.page_index];
    debug!(page = page.number, anchor = hit.candidate.describe(), "located table header");

    let region = resolve_region(page, hit.rect, sheet.stops, options.y_tolerance)?;
    let geometry = resolve_columns(page, region, &sheet.columns, sheet.snap, options.y_tolerance)?;
    let grid = extract_grid(
        page,
        &geometry,
        &GridOptions {
            y_tolerance: options.y_tolerance,
            identity_column: sheet.identity_column,
        },
    );
    debug!(
        page = page.number,
        columns = grid.column_count(),
        rows = grid.rows.len(),
        "extracted raw grid"
    );

    let (fields, records) = normalize_grid(&grid, &sheet.rules, page.number, &mut warnings)?;
    let mut table = Table::new(fields);
    table.records = records;
    table.page = Some(page.number);
    table.warnings = warnings;
    Ok(table)
}

pub fn parse_sheet(
    document: &Document,
    kind: SheetKind,
    options: &ExtractOptions,
) -> Result<Table, SheetError> {
    match kind.config() {
        SheetConfig::Table(sheet) => parse_table_sheet(document, &sheet, options),
        SheetConfig::Lines(sheet) => Ok(parse_line_sheet(document, sheet, options)),
    }
}
