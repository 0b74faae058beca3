use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::grid::page_lines;
use crate::model::{Document, LogicalRecord, Table, Value};
use crate::normalize::title_case;
use crate::options::ExtractOptions;
use crate::warning::{ExtractWarning, WarningCode};

const NAME: &str = r"([A-Z][A-Za-zÀ-ÿ']+(?:\s+[A-Z][A-Za-zÀ-ÿ']+)*)";

static GRID_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"\b(\d{{1,2}})\b\s+(\d{{1,3}})\s+{NAME}"))
        .expect("grid entry pattern is valid")
});

static PIT_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"\b(\d{{1,3}})\b\s+{NAME}")).expect("pit entry pattern is valid")
});

const PIT_LANE_MARKER: &str = "START FROM THE PIT LANE";
const PIT_SECTION_END: [&str; 3] = ["PENALT", "DOCUMENT", "COPYRIGHT"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineSheet {
    StartingGrid,
    LapChart,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct GridEntry {
    position: Option<i64>,
    car: i64,
    driver: String,
    pit_lane: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GridSection {
    Grid,
    PitLane,
    Done,
}

/// Reads grid slots, then pit-lane starters, and orders them with pit-lane starters last.
#[must_use]
pub fn parse_starting_grid_lines(lines: &[String]) -> Table {
    let mut section = GridSection::Grid;
    let mut entries = Vec::new();

    for line in lines {
        let upper = line.to_uppercase();
        match section {
            GridSection::Grid if upper.contains(PIT_LANE_MARKER) => {
                section = GridSection::PitLane;
            }
            GridSection::Grid => {
                for caps in GRID_ENTRY.captures_iter(line) {
                    let (Ok(position), Ok(car)) = (caps[1].parse::<i64>(), caps[2].parse::<i64>()) else {
                        continue;
                    };
                    entries.push(GridEntry {
                        position: Some(position),
                        car,
                        driver: title_case(&caps[3]),
                        pit_lane: false,
                    });
                }
            }
            GridSection::PitLane if PIT_SECTION_END.iter().any(|kw| upper.contains(kw)) => {
                section = GridSection::Done;
            }
            GridSection::PitLane => {
                for caps in PIT_ENTRY.captures_iter(line) {
                    let Ok(car) = caps[1].parse::<i64>() else {
                        continue;
                    };
                    entries.push(GridEntry {
                        position: None,
                        car,
                        driver: title_case(&caps[2]),
                        pit_lane: true,
                    });
                }
            }
            GridSection::Done => break,
        }
    }

    entries.sort_by_key(|entry| (entry.pit_lane, entry.position.is_none(), entry.position));

    let mut table = Table::new(
        ["position", "car", "driver", "pit_lane"]
            .map(String::from)
            .to_vec(),
    );
    table.records = entries
        .into_iter()
        .map(|entry| {
            LogicalRecord::new(vec![
                Value::Int(entry.position),
                Value::Int(Some(entry.car)),
                Value::Text(entry.driver),
                Value::Bool(entry.pit_lane),
            ])
        })
        .collect();
    table
}

/// Reads `GRID` and `LAP n` rows; each number on the row is a car, listed by position.
#[must_use]
pub fn parse_lap_chart_lines(lines: &[String]) -> Table {
    let mut table = Table::new(
        ["lap", "position", "driver_no"]
            .map(String::from)
            .to_vec(),
    );

    for line in lines {
        let mut tokens = line.split_whitespace();
        let lap = match tokens.next() {
            Some(token) if token.eq_ignore_ascii_case("GRID") => 0,
            Some(token) if token.eq_ignore_ascii_case("LAP") => {
                match tokens.next().map(str::parse::<i64>) {
                    Some(Ok(lap)) => lap,
                    _ => continue,
                }
            }
            _ => continue,
        };

        let cars = tokens.map_while(|token| token.parse::<i64>().ok());
        for (position, car) in (1_i64..).zip(cars) {
            table.records.push(LogicalRecord::new(vec![
                Value::Int(Some(lap)),
                Value::Int(Some(position)),
                Value::Int(Some(car)),
            ]));
        }
    }
    table
}

/// Collects the document's text lines, falling back to whole-document text when
/// no page carries positioned words.
fn document_lines(document: &Document, options: &ExtractOptions, warnings: &mut Vec<ExtractWarning>) -> Vec<String> {
    let lines = page_lines(&document.pages, options.y_tolerance);
    if !lines.is_empty() {
        return lines;
    }

    let Some(text) = document.fallback_text.as_deref() else {
        return lines;
    };
    warn!(path = %document.path.display(), "no positioned text; reading plain text instead");
    warnings.push(ExtractWarning::new(
        WarningCode::TextFallbackUsed,
        "pages carry no positioned text; used plain text extraction",
    ));
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect()
}

#[must_use]
pub fn parse_line_sheet(document: &Document, sheet: LineSheet, options: &ExtractOptions) -> Table {
    let mut warnings = Vec::new();
    let lines = document_lines(document, options, &mut warnings);
    let mut table = match sheet {
        LineSheet::StartingGrid => parse_starting_grid_lines(&lines),
        LineSheet::LapChart => parse_lap_chart_lines(&lines),
    };
    debug!(?sheet, lines = lines.len(), rows = table.len(), "parsed line sheet");
    table.warnings = warnings;
    table
}
