//! Maps raw grid rows onto a fixed field list and repairs overflow rows.
//!
//! An overflow row is one where a long driver name pushed every value into
//! the first cell. The repair re-tokenises that cell with a small state
//! machine: position, car number, given names, ALL-CAPS surname, entrant,
//! then fixed-size lap-time groups.

use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use crate::error::SheetError;
use crate::model::{LogicalRecord, RawGrid, Value};
use crate::warning::{ExtractWarning, WarningCode};

static LAP_TIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d:\d{2}\.\d{3}$").expect("lap time pattern is valid"));

pub(crate) const MAX_PHASES: usize = 3;

/// One accepted physical layout of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaVariant {
    pub fields: &'static [&'static str],
    /// `(header cell index, text it must contain)` confirming the layout.
    pub probe: Option<(usize, &'static str)>,
    /// Tokens per session phase when rebuilding an overflow row.
    pub phase_groups: &'static [usize],
}

impl SchemaVariant {
    #[must_use]
    pub const fn column_count(&self) -> usize {
        self.fields.len()
    }
}

/// Which fields drive overflow detection and reconstruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverflowRule {
    /// Cell that receives the merged text.
    pub source_field: &'static str,
    /// Field left empty on a merged row.
    pub trigger_field: &'static str,
    pub number_field: &'static str,
    pub entrant_field: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeRules {
    pub variants: &'static [SchemaVariant],
    pub overflow: Option<OverflowRule>,
    pub drop_fields: &'static [&'static str],
    /// Rows with this field empty after repair are not data rows.
    pub required_field: Option<&'static str>,
    /// Empty values here become `"0"`.
    pub zero_if_empty: &'static [&'static str],
    pub title_case: &'static [&'static str],
}

pub fn select_schema<'a>(
    header: &[String],
    variants: &'a [SchemaVariant],
    page: u32,
) -> Result<&'a SchemaVariant, SheetError> {
    let count = header.len();
    variants
        .iter()
        .find(|variant| {
            variant.column_count() == count
                && variant.probe.is_none_or(|(index, needle)| {
                    header.get(index).is_some_and(|cell| cell.contains(needle))
                })
        })
        .ok_or(SheetError::UnexpectedColumnCount { page, count })
}

/// Mirrors `str.isupper`: at least one cased letter and no lowercase letters.
fn is_all_caps(token: &str) -> bool {
    token.chars().any(char::is_uppercase) && !token.chars().any(char::is_lowercase)
}

/// Upper-cases letters that follow a non-letter and lower-cases the rest.
#[must_use]
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev_alpha = false;
    for ch in text.chars() {
        if ch.is_alphabetic() {
            if prev_alpha {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(ch);
            prev_alpha = false;
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    ExpectPosition,
    ExpectNumber,
    ExpectGivenNames,
    ExpectSurname,
    ExpectEntrant,
    ExpectPhaseGroup,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverflowFields {
    pub number: i64,
    pub given_names: Vec<String>,
    pub surname: String,
    pub entrant: String,
    /// One entry per phase, each `group` tokens long; missing phases are empty strings.
    pub phases: Vec<Vec<String>>,
}

impl OverflowFields {
    #[must_use]
    pub fn driver(&self) -> String {
        let mut parts = self.given_names.clone();
        parts.push(self.surname.clone());
        parts.join(" ")
    }
}

/// Rebuilds the fields of a row whose values were merged into one cell.
///
/// `phase_groups[i]` is the token count of phase `i`; a group must open with
/// a `D:DD.DDD` lap time. Scanning stops at the first short or malformed group.
pub fn repair_overflow_row(cell: &str, phase_groups: &[usize]) -> Result<OverflowFields, String> {
    let tokens = cell.split_whitespace().collect::<Vec<_>>();
    let mut state = ScanState::ExpectPosition;
    let mut number = None;
    let mut given_names = Vec::new();
    let mut surname = None;
    let mut entrant = Vec::new();
    let mut phases: Vec<Vec<String>> = Vec::new();
    let mut index = 0;

    while index < tokens.len() {
        let token = tokens[index];
        match state {
            ScanState::ExpectPosition => {
                index += 1;
                state = ScanState::ExpectNumber;
            }
            ScanState::ExpectNumber => {
                number = Some(
                    token
                        .parse::<i64>()
                        .map_err(|_| format!("car number '{token}' is not an integer"))?,
                );
                index += 1;
                state = ScanState::ExpectGivenNames;
            }
            ScanState::ExpectGivenNames => {
                if is_all_caps(token) {
                    state = ScanState::ExpectSurname;
                } else {
                    given_names.push(token.to_string());
                    index += 1;
                }
            }
            ScanState::ExpectSurname => {
                surname = Some(token.to_string());
                index += 1;
                state = ScanState::ExpectEntrant;
            }
            ScanState::ExpectEntrant => {
                if LAP_TIME.is_match(token) {
                    state = ScanState::ExpectPhaseGroup;
                } else {
                    entrant.push(token);
                    index += 1;
                }
            }
            ScanState::ExpectPhaseGroup => {
                let Some(&group) = phase_groups.get(phases.len()) else {
                    break;
                };
                if phases.len() >= MAX_PHASES
                    || index + group > tokens.len()
                    || !LAP_TIME.is_match(token)
                {
                    break;
                }
                phases.push(
                    tokens[index..index + group]
                        .iter()
                        .map(ToString::to_string)
                        .collect(),
                );
                index += group;
            }
        }
    }

    let number = number.ok_or_else(|| "missing car number".to_string())?;
    let surname = surname.ok_or_else(|| "no ALL-CAPS surname token".to_string())?;
    if state != ScanState::ExpectPhaseGroup {
        return Err("no lap time token after the entrant".to_string());
    }

    for group in phase_groups.iter().take(MAX_PHASES).skip(phases.len()) {
        phases.push(vec![String::new(); *group]);
    }

    Ok(OverflowFields {
        number,
        given_names,
        surname,
        entrant: entrant.join(" "),
        phases,
    })
}

struct RowFields {
    names: &'static [&'static str],
    values: Vec<String>,
}

impl RowFields {
    fn get(&self, field: &str) -> &str {
        self.names
            .iter()
            .position(|name| *name == field)
            .and_then(|index| self.values.get(index))
            .map_or("", String::as_str)
    }

    fn set(&mut self, field: &str, value: String) {
        if let Some(index) = self.names.iter().position(|name| *name == field) {
            self.values[index] = value;
        }
    }
}

fn apply_overflow(
    row: &mut RowFields,
    rule: &OverflowRule,
    variant: &SchemaVariant,
) -> Result<bool, String> {
    let source = row.get(rule.source_field).trim().to_string();
    if !row.get(rule.trigger_field).trim().is_empty() || source.is_empty() {
        return Ok(false);
    }

    let repaired = repair_overflow_row(&source, variant.phase_groups)?;
    row.set(rule.number_field, repaired.number.to_string());
    row.set(rule.trigger_field, repaired.driver());
    row.set(rule.entrant_field, repaired.entrant.clone());

    let phase_fields = variant
        .fields
        .iter()
        .skip_while(|name| **name != rule.entrant_field)
        .skip(1)
        .copied()
        .collect::<Vec<_>>();
    for (field, value) in phase_fields.into_iter().zip(repaired.phases.into_iter().flatten()) {
        row.set(field, value);
    }
    Ok(true)
}

/// A row the grid extractor collapsed: several tokens in the first cell, the rest empty.
fn is_collapsed(raw: &[String]) -> bool {
    raw.len() > 1
        && raw[0].trim().contains(char::is_whitespace)
        && raw[1..].iter().all(|cell| cell.trim().is_empty())
}

pub fn output_fields(variant: &SchemaVariant, rules: &NormalizeRules) -> Vec<String> {
    variant
        .fields
        .iter()
        .filter(|name| !rules.drop_fields.contains(*name))
        .map(ToString::to_string)
        .collect()
}

pub fn normalize_grid(
    grid: &RawGrid,
    rules: &NormalizeRules,
    page: u32,
    warnings: &mut Vec<ExtractWarning>,
) -> Result<(Vec<String>, Vec<LogicalRecord>), SheetError> {
    let variant = select_schema(&grid.header, rules.variants, page)?;
    let fields = output_fields(variant, rules);

    let mut records = Vec::new();
    for (row_index, raw) in grid.rows.iter().enumerate() {
        let mut values = raw.clone();
        values.resize(variant.column_count(), String::new());
        let mut row = RowFields {
            names: variant.fields,
            values: values.into_iter().map(|value| value.trim().to_string()).collect(),
        };

        if rules.overflow.is_none() && is_collapsed(raw) {
            return Err(SheetError::UnparsableOverflowRow {
                page,
                row: row_index,
                reason: "values merged into the first cell and this table has no repair rule"
                    .to_string(),
            });
        }

        if let Some(rule) = &rules.overflow {
            let repaired = apply_overflow(&mut row, rule, variant).map_err(|reason| {
                SheetError::UnparsableOverflowRow {
                    page,
                    row: row_index,
                    reason,
                }
            })?;
            if repaired {
                warn!(page, row = row_index, "rebuilt overflow row from merged cell");
                warnings.push(
                    ExtractWarning::new(
                        WarningCode::OverflowRowRepaired,
                        format!("rebuilt merged row for car {}", row.get(rule.number_field)),
                    )
                    .with_page(page)
                    .with_row(row_index),
                );
            }
        }

        if rules
            .required_field
            .is_some_and(|field| row.get(field).is_empty())
        {
            continue;
        }
        for field in rules.zero_if_empty {
            if row.get(field).is_empty() {
                row.set(field, "0".to_string());
            }
        }
        for field in rules.title_case {
            let value = title_case(row.get(field));
            row.set(field, value);
        }

        records.push(LogicalRecord::new(
            fields.iter().map(|field| Value::text(row.get(field))).collect(),
        ));
    }

    Ok((fields, records))
}

#[cfg(test)]
mod tests {
    use super::{
        NormalizeRules, OverflowRule, SchemaVariant, is_all_caps, normalize_grid,
        repair_overflow_row, select_schema, title_case,
    };
    use crate::error::SheetError;
    use crate::model::{RawGrid, Value};
    use crate::warning::WarningCode;
    use pretty_assertions::assert_eq;

    const SHORT: SchemaVariant = SchemaVariant {
        fields: &["_", "no", "driver", "entrant", "q1", "q1_laps", "q1_time"],
        probe: None,
        phase_groups: &[3],
    };
    const WIDE: SchemaVariant = SchemaVariant {
        fields: &["_", "no", "driver", "entrant", "q1", "q1_laps", "q1_laps_%", "q1_time"],
        probe: Some((6, "%")),
        phase_groups: &[4],
    };

    fn strings(cells: &[&str]) -> Vec<String> {
        cells.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn rebuilds_the_documented_merged_cell() {
        let repaired = repair_overflow_row(
            "12 44 Lewis HAMILTON Mercedes 1:16.123 5 12:01:00 1:15.900 6 12:02:00",
            &[3, 3, 3],
        )
        .expect("row should be rebuilt");

        assert_eq!(repaired.number, 44);
        assert_eq!(title_case(&repaired.driver()), "Lewis Hamilton");
        assert_eq!(repaired.entrant, "Mercedes");
        assert_eq!(repaired.phases[0], strings(&["1:16.123", "5", "12:01:00"]));
        assert_eq!(repaired.phases[1], strings(&["1:15.900", "6", "12:02:00"]));
        assert_eq!(repaired.phases[2], strings(&["", "", ""]));
    }

    #[test]
    fn multi_word_given_names_and_entrant() {
        let repaired = repair_overflow_row(
            "1 12 Andrea Kimi ANTONELLI Mercedes-AMG PETRONAS F1 Team 1:15.001 3 14:05:10",
            &[3, 3, 3],
        )
        .expect("row should be rebuilt");
        assert_eq!(repaired.given_names, strings(&["Andrea", "Kimi"]));
        assert_eq!(repaired.surname, "ANTONELLI");
        assert_eq!(repaired.entrant, "Mercedes-AMG PETRONAS F1 Team");
        assert_eq!(repaired.phases.len(), 3);
    }

    #[test]
    fn lap_percentage_widens_only_the_first_group() {
        let repaired = repair_overflow_row(
            "2 4 Lando NORRIS McLaren 1:15.500 6 98.1 14:01:00 1:15.200 4 14:20:00",
            &[4, 3, 3],
        )
        .expect("row should be rebuilt");
        assert_eq!(repaired.phases[0], strings(&["1:15.500", "6", "98.1", "14:01:00"]));
        assert_eq!(repaired.phases[1], strings(&["1:15.200", "4", "14:20:00"]));
        assert_eq!(repaired.phases[2], strings(&["", "", ""]));
    }

    #[test]
    fn stops_at_a_group_not_opening_with_a_lap_time() {
        let repaired = repair_overflow_row(
            "5 10 Pierre GASLY Alpine 1:17.000 7 13:00:00 DNF 1 13:10:00",
            &[3, 3, 3],
        )
        .expect("row should be rebuilt");
        assert_eq!(repaired.phases[1], strings(&["", "", ""]));
    }

    #[test]
    fn rejects_rows_without_required_markers() {
        let not_a_number = repair_overflow_row("1 X Lewis HAMILTON Mercedes 1:16.123 5 12:01:00", &[3])
            .expect_err("number must parse");
        assert!(not_a_number.contains("not an integer"));

        let no_surname = repair_overflow_row("1 44 Lewis Hamilton 1:16.123 5 12:01:00", &[3])
            .expect_err("surname is required");
        assert!(no_surname.contains("surname"));

        let no_time = repair_overflow_row("1 44 Lewis HAMILTON Mercedes", &[3])
            .expect_err("a lap time is required");
        assert!(no_time.contains("lap time"));
    }

    #[test]
    fn caps_detection_matches_cased_letters_only() {
        assert!(is_all_caps("HAMILTON"));
        assert!(is_all_caps("F1"));
        assert!(!is_all_caps("Lewis"));
        assert!(!is_all_caps("1:16.123"));
    }

    #[test]
    fn title_case_handles_apostrophes_and_hyphens() {
        assert_eq!(title_case("Pato O'WARD"), "Pato O'Ward");
        assert_eq!(title_case("JEAN-ERIC"), "Jean-Eric");
    }

    #[test]
    fn schema_selection_branches_on_column_count() {
        let variants = [SHORT, WIDE];
        let short_header = strings(&["", "NO", "DRIVER", "ENTRANT", "Q1", "LAPS", "TIME"]);
        let wide_header = strings(&["", "NO", "DRIVER", "ENTRANT", "Q1", "LAPS", "%", "TIME"]);

        let short = select_schema(&short_header, &variants, 1).expect("7 columns");
        assert_eq!(short.fields.len(), 7);
        let wide = select_schema(&wide_header, &variants, 1).expect("8 columns");
        assert!(wide.fields.contains(&"q1_laps_%"));
    }

    #[test]
    fn column_count_without_matching_probe_is_rejected() {
        let variants = [SHORT, WIDE];
        let header = strings(&["", "NO", "DRIVER", "ENTRANT", "Q1", "LAPS", "GAP", "TIME"]);
        let err = select_schema(&header, &variants, 2).expect_err("probe fails");
        assert_eq!(err, SheetError::UnexpectedColumnCount { page: 2, count: 8 });
    }

    #[test]
    fn normalizes_regular_and_merged_rows() {
        const RULES: NormalizeRules = NormalizeRules {
            variants: &[SHORT, WIDE],
            overflow: Some(OverflowRule {
                source_field: "_",
                trigger_field: "driver",
                number_field: "no",
                entrant_field: "entrant",
            }),
            drop_fields: &["_"],
            required_field: Some("no"),
            zero_if_empty: &[],
            title_case: &["driver"],
        };
        let grid = RawGrid {
            header: strings(&["", "NO", "DRIVER", "ENTRANT", "Q1", "LAPS", "TIME"]),
            rows: vec![
                strings(&["1", "81", "Oscar PIASTRI", "McLaren", "1:15.000", "4", "14:00:00"]),
                strings(&["2 44 Lewis HAMILTON Scuderia Ferrari HP 1:16.123 5 12:01:00", "", "", "", "", "", ""]),
            ],
        };

        let mut warnings = Vec::new();
        let (fields, records) = normalize_grid(&grid, &RULES, 1, &mut warnings).expect("normalizes");

        assert_eq!(fields, strings(&["no", "driver", "entrant", "q1", "q1_laps", "q1_time"]));
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].values[1], Value::text("Oscar Piastri"));
        assert_eq!(
            records[1].values,
            vec![
                Value::text("44"),
                Value::text("Lewis Hamilton"),
                Value::text("Scuderia Ferrari HP"),
                Value::text("1:16.123"),
                Value::text("5"),
                Value::text("12:01:00"),
            ]
        );
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].code, WarningCode::OverflowRowRepaired);
        assert_eq!(warnings[0].row, Some(1));
    }

    #[test]
    fn empty_points_become_zero() {
        const RULES: NormalizeRules = NormalizeRules {
            variants: &[SchemaVariant {
                fields: &["driver_no", "points"],
                probe: None,
                phase_groups: &[],
            }],
            overflow: None,
            drop_fields: &[],
            required_field: Some("driver_no"),
            zero_if_empty: &["points"],
            title_case: &[],
        };
        let grid = RawGrid {
            header: strings(&["NO", "PTS"]),
            rows: vec![strings(&["1", "25"]), strings(&["18", ""])],
        };

        let (_, records) = normalize_grid(&grid, &RULES, 1, &mut Vec::new()).expect("normalizes");
        assert_eq!(records[1].values[1], Value::text("0"));
    }

    #[test]
    fn merged_row_without_repair_rule_is_rejected() {
        const RULES: NormalizeRules = NormalizeRules {
            variants: &[SchemaVariant {
                fields: &["driver_no", "driver", "lap"],
                probe: None,
                phase_groups: &[],
            }],
            overflow: None,
            drop_fields: &[],
            required_field: Some("driver_no"),
            zero_if_empty: &[],
            title_case: &[],
        };
        let grid = RawGrid {
            header: strings(&["NO", "DRIVER", "LAP"]),
            rows: vec![
                strings(&["16", "Charles LECLERC", "14"]),
                strings(&["12 Andrea Kimi ANTONELLI 14", "", ""]),
            ],
        };

        let err = normalize_grid(&grid, &RULES, 3, &mut Vec::new()).expect_err("merged row");
        assert!(matches!(
            err,
            SheetError::UnparsableOverflowRow { page: 3, row: 1, .. }
        ));
    }

    #[test]
    fn failed_repair_reports_page_and_row() {
        const RULES: NormalizeRules = NormalizeRules {
            variants: &[SHORT],
            overflow: Some(OverflowRule {
                source_field: "_",
                trigger_field: "driver",
                number_field: "no",
                entrant_field: "entrant",
            }),
            drop_fields: &["_"],
            required_field: Some("no"),
            zero_if_empty: &[],
            title_case: &[],
        };
        let grid = RawGrid {
            header: strings(&["", "NO", "DRIVER", "ENTRANT", "Q1", "LAPS", "TIME"]),
            rows: vec![strings(&["1 44 Lewis Hamilton Mercedes 1:16.123 5 12:01:00", "", "", "", "", "", ""])],
        };

        let err = normalize_grid(&grid, &RULES, 2, &mut Vec::new()).expect_err("no surname");
        match err {
            SheetError::UnparsableOverflowRow { page, row, reason } => {
                assert_eq!((page, row), (2, 0));
                assert!(reason.contains("surname"), "{reason}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
