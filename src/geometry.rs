use tracing::debug;

use crate::error::SheetError;
use crate::locator::{search, search_words};
use crate::model::{Page, Rect};

/// Rectangle of a page holding a table body. Always has positive area.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    pub page: u32,
    pub rect: Rect,
}

impl Region {
    pub fn new(page: u32, rect: Rect) -> Result<Self, SheetError> {
        if !(rect.x0 < rect.x1 && rect.y0 < rect.y1) {
            return Err(SheetError::MalformedRegion {
                page,
                detail: format!(
                    "({:.1}, {:.1}, {:.1}, {:.1}) has no area",
                    rect.x0, rect.y0, rect.x1, rect.y1
                ),
            });
        }
        Ok(Self { page, rect })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopAnchor {
    Text(&'static str),
    PageBottom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DividerRule {
    LeftOf(&'static str),
    RightOf(&'static str),
    /// Midpoint between the right edge of the first label and the left edge of the second.
    Between(&'static str, &'static str),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SnapRule {
    /// `(right.x0 - left.x1) * factor` for two labels known to be adjacent.
    Gap {
        left: &'static str,
        right: &'static str,
        factor: f32,
    },
    Fixed(f32),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColumnPlan {
    /// Fixed layout: dividers come from label positions.
    Explicit {
        labels: &'static [&'static str],
        dividers: &'static [DividerRule],
        /// Start the region at the first label's left edge instead of the page edge.
        clip_to_first_label: bool,
    },
    /// Dividers are inferred from the header row that contains `header_label`.
    Inferred {
        header_label: &'static str,
        /// Keep an unlabeled column between the region edge and the first label.
        leading_column: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnLayout {
    Explicit { dividers: Vec<f32> },
    Inferred { leading_column: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableGeometry {
    pub body: Region,
    pub header_row: Rect,
    pub layout: ColumnLayout,
    pub snap_tolerance: f32,
}

/// Builds the region between the header landmark and the first stop landmark below it.
pub fn resolve_region(
    page: &Page,
    header: Rect,
    stops: &[StopAnchor],
    y_tolerance: f32,
) -> Result<Region, SheetError> {
    let mut seen_above = false;
    for stop in stops {
        let bottom = match stop {
            StopAnchor::PageBottom => Some(page.height),
            StopAnchor::Text(label) => {
                let hits = search(page, label, None, y_tolerance);
                seen_above |= !hits.is_empty();
                hits.iter()
                    .find(|hit| hit.y0 >= header.y1)
                    .map(|hit| hit.y0)
            }
        };
        if let Some(bottom) = bottom {
            let region = Region::new(page.number, Rect::new(0.0, header.y1, page.width, bottom))?;
            debug!(page = page.number, rect = ?region.rect, "resolved table region");
            return Ok(region);
        }
    }

    if seen_above {
        return Err(SheetError::MalformedRegion {
            page: page.number,
            detail: "every stop landmark lies above the header".to_string(),
        });
    }
    Err(SheetError::LandmarkNotFound {
        label: stops
            .iter()
            .map(|stop| match stop {
                StopAnchor::Text(label) => *label,
                StopAnchor::PageBottom => "page bottom",
            })
            .collect::<Vec<_>>()
            .join(" / "),
    })
}

fn find_label(page: &Page, region: &Region, label: &str, y_tolerance: f32) -> Result<Rect, SheetError> {
    search_words(page, label, Some(region.rect), y_tolerance)
        .first()
        .copied()
        .ok_or_else(|| SheetError::MissingColumnLabel {
            page: page.number,
            label: label.to_string(),
        })
}

fn label_rect(labels: &[(&str, Rect)], page: u32, wanted: &str) -> Result<Rect, SheetError> {
    labels
        .iter()
        .find(|(name, _)| *name == wanted)
        .map(|(_, rect)| *rect)
        .ok_or_else(|| SheetError::MissingColumnLabel {
            page,
            label: wanted.to_string(),
        })
}

fn resolve_snap(
    page: &Page,
    region: &Region,
    snap: Option<SnapRule>,
    y_tolerance: f32,
) -> Result<f32, SheetError> {
    match snap {
        None => Ok(0.0),
        Some(SnapRule::Fixed(value)) => Ok(value.max(0.0)),
        Some(SnapRule::Gap {
            left,
            right,
            factor,
        }) => {
            let left = find_label(page, region, left, y_tolerance)?;
            let right = find_label(page, region, right, y_tolerance)?;
            Ok(((right.x0 - left.x1) * factor).max(0.0))
        }
    }
}

pub fn resolve_columns(
    page: &Page,
    region: Region,
    plan: &ColumnPlan,
    snap: Option<SnapRule>,
    y_tolerance: f32,
) -> Result<TableGeometry, SheetError> {
    let snap_tolerance = resolve_snap(page, &region, snap, y_tolerance)?;

    let (header_row, layout, left) = match plan {
        ColumnPlan::Explicit {
            labels,
            dividers,
            clip_to_first_label,
        } => {
            let found = labels
                .iter()
                .map(|label| Ok((*label, find_label(page, &region, label, y_tolerance)?)))
                .collect::<Result<Vec<_>, SheetError>>()?;

            let xs = dividers
                .iter()
                .map(|rule| {
                    Ok(match rule {
                        DividerRule::LeftOf(label) => label_rect(&found, page.number, label)?.x0,
                        DividerRule::RightOf(label) => label_rect(&found, page.number, label)?.x1,
                        DividerRule::Between(a, b) => {
                            let a = label_rect(&found, page.number, a)?;
                            let b = label_rect(&found, page.number, b)?;
                            (a.x1 + b.x0) * 0.5
                        }
                    })
                })
                .collect::<Result<Vec<_>, SheetError>>()?;

            if xs.len() < 2 || xs.windows(2).any(|pair| pair[0] >= pair[1]) {
                return Err(SheetError::MalformedRegion {
                    page: page.number,
                    detail: format!("column dividers are not strictly increasing: {xs:?}"),
                });
            }

            let header_row = found
                .iter()
                .skip(1)
                .fold(found[0].1, |acc, (_, rect)| acc.union(rect));
            let left = if *clip_to_first_label {
                found[0].1.x0
            } else {
                region.rect.x0
            };
            (header_row, ColumnLayout::Explicit { dividers: xs }, left)
        }
        ColumnPlan::Inferred {
            header_label,
            leading_column,
        } => {
            let anchor = find_label(page, &region, header_label, y_tolerance)?;
            let header_row = page
                .words
                .iter()
                .filter(|word| {
                    region.rect.contains_center_of(&word.rect)
                        && (word.rect.center_y() - anchor.center_y()).abs() <= y_tolerance
                })
                .fold(anchor, |acc, word| acc.union(&word.rect));
            (
                header_row,
                ColumnLayout::Inferred {
                    leading_column: *leading_column,
                },
                region.rect.x0,
            )
        }
    };

    let body = Region::new(
        page.number,
        Rect::new(left, header_row.y1, region.rect.x1, region.rect.y1),
    )?;
    debug!(page = page.number, ?layout, snap_tolerance, "resolved columns");

    Ok(TableGeometry {
        body,
        header_row,
        layout,
        snap_tolerance,
    })
}
