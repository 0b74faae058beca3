use crate::geometry::{ColumnLayout, TableGeometry};
use crate::locator::{TextLine, group_lines};
use crate::model::{Page, RawGrid, RawRow, Rect, Word};

pub(crate) const LABEL_JOIN_RATIO: f32 = 0.75;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridOptions {
    pub y_tolerance: f32,
    /// Raw column whose emptiness marks a spacer or continuation row.
    pub identity_column: usize,
}

/// Column holding `x`, or `None` outside the outer dividers.
fn column_of(dividers: &[f32], x: f32) -> Option<usize> {
    let (first, last) = (dividers.first()?, dividers.last()?);
    if x < *first || x >= *last {
        return None;
    }
    Some(dividers.partition_point(|d| *d <= x) - 1)
}

/// Largest amount by which `rect` reaches across any interior divider.
fn straddle(dividers: &[f32], rect: &Rect) -> f32 {
    let interior = dividers
        .get(1..dividers.len().saturating_sub(1))
        .unwrap_or_default();
    interior
        .iter()
        .filter(|d| rect.x0 < **d && **d < rect.x1)
        .map(|d| (d - rect.x0).min(rect.x1 - d))
        .fold(0.0, f32::max)
}

fn pad_row(mut row: RawRow, width: usize) -> RawRow {
    row.resize(width, String::new());
    row
}

fn join_cells(cells: Vec<Vec<String>>) -> RawRow {
    cells.into_iter().map(|parts| parts.join(" ")).collect()
}

/// Strict vertical-line segmentation. Words cut by a divider are split per character.
fn segment_explicit(words: &[&Word], dividers: &[f32], snap_tolerance: f32) -> RawRow {
    let columns = dividers.len().saturating_sub(1);
    let mut cells = vec![Vec::new(); columns];

    for word in words {
        if straddle(dividers, &word.rect) <= snap_tolerance {
            if let Some(column) = column_of(dividers, word.rect.center_x()) {
                cells[column].push(word.text.clone());
            }
            continue;
        }

        let mut current: Option<(usize, String)> = None;
        for (index, ch) in word.text.chars().enumerate() {
            let (x0, x1) = word.char_span(index);
            let column = column_of(dividers, (x0 + x1) * 0.5);
            match current.as_mut() {
                Some((open, fragment)) if Some(*open) == column => fragment.push(ch),
                _ => {
                    if let Some((open, fragment)) = current.take() {
                        cells[open].push(fragment);
                    }
                    current = column.map(|column| (column, ch.to_string()));
                }
            }
        }
        if let Some((open, fragment)) = current {
            cells[open].push(fragment);
        }
    }

    join_cells(cells)
}

fn header_phrases(header: &TextLine<'_>) -> Vec<(String, Rect)> {
    let join_gap = header.rect.height() * LABEL_JOIN_RATIO;
    let mut phrases: Vec<(String, Rect)> = Vec::new();
    for word in &header.words {
        match phrases.last_mut() {
            Some((text, rect)) if word.rect.x0 - rect.x1 <= join_gap => {
                text.push(' ');
                text.push_str(&word.text);
                *rect = rect.union(&word.rect);
            }
            _ => phrases.push((word.text.clone(), word.rect)),
        }
    }
    phrases
}

/// Inferred segmentation. Any word reaching across a divider by more than the
/// snap tolerance collapses the row into its first cell.
fn segment_inferred(words: &[&Word], dividers: &[f32], snap_tolerance: f32) -> RawRow {
    let columns = dividers.len().saturating_sub(1);
    if words
        .iter()
        .any(|word| straddle(dividers, &word.rect) > snap_tolerance)
    {
        let merged = words
            .iter()
            .map(|word| word.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        return pad_row(vec![merged], columns);
    }

    let mut cells = vec![Vec::new(); columns];
    let last = columns.saturating_sub(1);
    for word in words {
        let column = column_of(dividers, word.rect.center_x()).unwrap_or(
            if word.rect.center_x() < dividers[0] {
                0
            } else {
                last
            },
        );
        cells[column].push(word.text.clone());
    }
    join_cells(cells)
}

/// Rows with an empty identity cell are dropped.
#[must_use]
pub fn extract_grid(page: &Page, geometry: &TableGeometry, options: &GridOptions) -> RawGrid {
    let body = geometry.body.rect;
    let header_band = Rect::new(
        body.x0.min(geometry.header_row.x0),
        geometry.header_row.y0,
        body.x1,
        geometry.header_row.y1,
    );
    let header_words = page
        .words
        .iter()
        .filter(|word| header_band.contains_center_of(&word.rect));
    let header_line = group_lines(header_words, geometry.header_row.height().max(options.y_tolerance))
        .into_iter()
        .next();

    let (dividers, header) = match &geometry.layout {
        ColumnLayout::Explicit { dividers } => {
            let header = header_line
                .as_ref()
                .map(|line| segment_explicit(&line.words, dividers, geometry.snap_tolerance))
                .unwrap_or_else(|| vec![String::new(); dividers.len().saturating_sub(1)]);
            (dividers.clone(), header)
        }
        ColumnLayout::Inferred { leading_column } => {
            let phrases = header_line.as_ref().map(header_phrases).unwrap_or_default();
            let mut dividers = vec![body.x0];
            let mut header = Vec::new();
            if *leading_column {
                header.push(String::new());
            }
            for (index, (text, rect)) in phrases.into_iter().enumerate() {
                if index > 0 || *leading_column {
                    dividers.push(rect.x0);
                }
                header.push(text);
            }
            dividers.push(body.x1);
            (dividers, header)
        }
    };

    let body_words = page
        .words
        .iter()
        .filter(|word| body.contains_center_of(&word.rect));
    let rows = group_lines(body_words, options.y_tolerance)
        .iter()
        .map(|line| match geometry.layout {
            ColumnLayout::Explicit { .. } => {
                segment_explicit(&line.words, &dividers, geometry.snap_tolerance)
            }
            ColumnLayout::Inferred { .. } => {
                segment_inferred(&line.words, &dividers, geometry.snap_tolerance)
            }
        })
        .filter(|row| {
            row.get(options.identity_column)
                .is_some_and(|cell| !cell.trim().is_empty())
        })
        .collect();

    RawGrid { header, rows }
}

#[must_use]
pub fn page_lines(pages: &[Page], y_tolerance: f32) -> Vec<String> {
    pages
        .iter()
        .flat_map(|page| group_lines(&page.words, y_tolerance))
        .map(|line| line.text())
        .filter(|line| !line.trim().is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{GridOptions, column_of, extract_grid, page_lines, segment_explicit};
    use crate::geometry::{ColumnLayout, Region, TableGeometry};
    use crate::model::{Page, Rect, Word};
    use pretty_assertions::assert_eq;

    fn word(text: &str, x0: f32, y0: f32) -> Word {
        let width = text.chars().count() as f32 * 5.0;
        Word::new(text, Rect::new(x0, y0, x0 + width, y0 + 8.0))
    }

    fn geometry(layout: ColumnLayout, snap_tolerance: f32) -> TableGeometry {
        TableGeometry {
            body: Region::new(1, Rect::new(0.0, 28.0, 300.0, 200.0)).expect("region"),
            header_row: Rect::new(0.0, 20.0, 300.0, 28.0),
            layout,
            snap_tolerance,
        }
    }

    const OPTIONS: GridOptions = GridOptions {
        y_tolerance: 3.0,
        identity_column: 0,
    };

    #[test]
    fn finds_column_for_coordinate() {
        let dividers = [10.0, 20.0, 40.0];
        assert_eq!(column_of(&dividers, 5.0), None);
        assert_eq!(column_of(&dividers, 10.0), Some(0));
        assert_eq!(column_of(&dividers, 25.0), Some(1));
        assert_eq!(column_of(&dividers, 40.0), None);
    }

    #[test]
    fn explicit_mode_cuts_long_words_at_dividers() {
        let long = word("ABCDEF", 10.0, 0.0);
        let cells = segment_explicit(&[&long], &[10.0, 25.0, 40.0], 1.0);
        assert_eq!(cells, vec!["ABC", "DEF"]);
    }

    #[test]
    fn explicit_mode_keeps_slightly_misaligned_words_whole() {
        let nudged = word("1:32.456", 98.0, 0.0);
        let cells = segment_explicit(&[&nudged], &[0.0, 100.0, 200.0], 5.0);
        assert_eq!(cells, vec!["", "1:32.456"]);
    }

    #[test]
    fn explicit_grid_drops_rows_without_identity() {
        let mut page = Page::new(1, 300.0, 220.0);
        page.words = vec![
            word("NO", 0.0, 20.0),
            word("DRIVER", 50.0, 20.0),
            word("1", 0.0, 40.0),
            word("Max", 50.0, 40.0),
            word("VERSTAPPEN", 70.0, 40.0),
            word("Racing", 50.0, 52.0),
            word("44", 0.0, 64.0),
            word("Lewis", 50.0, 64.0),
            word("HAMILTON", 80.0, 64.0),
        ];
        let grid = extract_grid(
            &page,
            &geometry(
                ColumnLayout::Explicit {
                    dividers: vec![0.0, 40.0, 300.0],
                },
                0.0,
            ),
            &OPTIONS,
        );

        assert_eq!(grid.header, vec!["NO", "DRIVER"]);
        assert_eq!(
            grid.rows,
            vec![
                vec!["1".to_string(), "Max VERSTAPPEN".to_string()],
                vec!["44".to_string(), "Lewis HAMILTON".to_string()],
            ]
        );
    }

    #[test]
    fn inferred_grid_uses_header_phrases_and_leading_column() {
        let mut page = Page::new(1, 300.0, 220.0);
        page.words = vec![
            word("NO", 20.0, 20.0),
            word("TIME", 60.0, 20.0),
            word("OF", 83.0, 20.0),
            word("DAY", 96.0, 20.0),
            word("STOP", 150.0, 20.0),
            word("1", 5.0, 40.0),
            word("44", 20.0, 40.0),
            word("15:01:02", 60.0, 40.0),
            word("1", 152.0, 40.0),
        ];
        let grid = extract_grid(
            &page,
            &geometry(
                ColumnLayout::Inferred {
                    leading_column: true,
                },
                2.0,
            ),
            &OPTIONS,
        );

        assert_eq!(grid.header, vec!["", "NO", "TIME OF DAY", "STOP"]);
        assert_eq!(grid.rows, vec![vec!["1", "44", "15:01:02", "1"]]);
    }

    #[test]
    fn inferred_grid_collapses_overflowing_rows() {
        let mut page = Page::new(1, 300.0, 220.0);
        page.words = vec![
            word("NO", 20.0, 20.0),
            word("DRIVER", 50.0, 20.0),
            word("NAT", 120.0, 20.0),
            word("3", 5.0, 40.0),
            word("12", 20.0, 40.0),
            word("Andrea", 50.0, 40.0),
            word("ANTONELLI", 85.0, 40.0),
            word("ITA", 140.0, 40.0),
        ];
        let grid = extract_grid(
            &page,
            &geometry(
                ColumnLayout::Inferred {
                    leading_column: true,
                },
                2.0,
            ),
            &OPTIONS,
        );

        assert_eq!(grid.header.len(), 4);
        assert_eq!(grid.rows, vec![vec!["3 12 Andrea ANTONELLI ITA", "", "", ""]]);
    }

    #[test]
    fn page_lines_read_top_to_bottom() {
        let mut page = Page::new(1, 300.0, 220.0);
        page.words = vec![word("B", 10.0, 40.0), word("A", 10.0, 10.0), word("C", 30.0, 10.0)];
        assert_eq!(page_lines(&[page], 3.0), vec!["A C", "B"]);
    }
}
