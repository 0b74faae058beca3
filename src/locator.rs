//! Finding landmarks on a page: literal text matches, whole-word label
//! matches, and the grey banner some sheets draw instead of a text title.

use tracing::{debug, warn};

use crate::error::SheetError;
use crate::model::{Document, Page, Rect, Word};
use crate::options::{ExtractOptions, HeaderImageTolerance};
use crate::warning::{ExtractWarning, WarningCode};

/// Words sharing a baseline band, ordered left to right.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TextLine<'a> {
    pub words: Vec<&'a Word>,
    pub rect: Rect,
}

impl TextLine<'_> {
    pub fn text(&self) -> String {
        self.words
            .iter()
            .map(|word| word.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

pub(crate) fn group_lines<'a, I>(words: I, y_tolerance: f32) -> Vec<TextLine<'a>>
where
    I: IntoIterator<Item = &'a Word>,
{
    let mut sorted = words.into_iter().collect::<Vec<_>>();
    sorted.sort_by(|a, b| {
        a.rect
            .center_y()
            .total_cmp(&b.rect.center_y())
            .then(a.rect.x0.total_cmp(&b.rect.x0))
    });

    let mut lines: Vec<TextLine<'a>> = Vec::new();
    let mut anchor_y = f32::NEG_INFINITY;
    for word in sorted {
        let cy = word.rect.center_y();
        match lines.last_mut() {
            Some(line) if cy - anchor_y <= y_tolerance => {
                line.rect = line.rect.union(&word.rect);
                line.words.push(word);
            }
            _ => {
                anchor_y = cy;
                lines.push(TextLine {
                    words: vec![word],
                    rect: word.rect,
                });
            }
        }
    }

    for line in &mut lines {
        line.words.sort_by(|a, b| a.rect.x0.total_cmp(&b.rect.x0));
    }
    lines
}

fn words_in<'a>(page: &'a Page, clip: Option<Rect>) -> impl Iterator<Item = &'a Word> {
    page.words
        .iter()
        .filter(move |word| clip.is_none_or(|clip| clip.contains_center_of(&word.rect)))
}

pub(crate) fn page_text(page: &Page, y_tolerance: f32) -> String {
    group_lines(&page.words, y_tolerance)
        .iter()
        .map(TextLine::text)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Literal substring search ignoring case. Matches never span lines.
#[must_use]
pub fn search(page: &Page, needle: &str, clip: Option<Rect>, y_tolerance: f32) -> Vec<Rect> {
    let needle = needle.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }

    let mut hits = Vec::new();
    for line in group_lines(words_in(page, clip), y_tolerance) {
        let mut text = String::new();
        let mut spans: Vec<(f32, f32)> = Vec::new();
        for (index, word) in line.words.iter().enumerate() {
            if index > 0 {
                let prev = line.words[index - 1].rect.x1;
                text.push(' ');
                spans.push((prev, word.rect.x0.max(prev)));
            }
            for (char_index, ch) in word.text.chars().enumerate() {
                let span = word.char_span(char_index);
                for folded in ch.to_lowercase() {
                    text.push(folded);
                    spans.push(span);
                }
            }
        }

        let char_starts = text.char_indices().map(|(offset, _)| offset).collect::<Vec<_>>();
        for (offset, matched) in text.match_indices(needle.as_str()) {
            let Ok(first) = char_starts.binary_search(&offset) else {
                continue;
            };
            let last = first + matched.chars().count() - 1;
            hits.push(Rect::new(
                spans[first].0,
                line.rect.y0,
                spans[last].1,
                line.rect.y1,
            ));
        }
    }
    hits
}

/// Matches `label` only where its words equal a run of whole words on a line.
#[must_use]
pub fn search_words(page: &Page, label: &str, clip: Option<Rect>, y_tolerance: f32) -> Vec<Rect> {
    let wanted = label.split_whitespace().collect::<Vec<_>>();
    if wanted.is_empty() {
        return Vec::new();
    }

    let mut hits = Vec::new();
    for line in group_lines(words_in(page, clip), y_tolerance) {
        for window in line.words.windows(wanted.len()) {
            if window
                .iter()
                .zip(&wanted)
                .all(|(word, expected)| word.text == *expected)
            {
                let rect = window
                    .iter()
                    .skip(1)
                    .fold(window[0].rect, |acc, word| acc.union(&word.rect));
                hits.push(rect);
            }
        }
    }
    hits
}

/// Locates the grey banner standing in for a missing text title.
///
/// Zero matches is not an error; more than one means the page does not follow
/// the expected template.
pub fn find_image_header(
    page: &Page,
    tolerance: &HeaderImageTolerance,
) -> Result<Option<Rect>, SheetError> {
    let candidates = page
        .drawings
        .iter()
        .filter(|drawing| {
            let rect = drawing.rect;
            rect.width() > page.width * tolerance.min_width_ratio
                && rect.height() > tolerance.min_height
                && rect.height() < tolerance.max_height
                && drawing.fill.is_some_and(|fill| tolerance.fill_matches(fill))
        })
        .map(|drawing| drawing.rect)
        .collect::<Vec<_>>();

    match candidates.as_slice() {
        [] => Ok(None),
        [rect] => Ok(Some(*rect)),
        _ => Err(SheetError::AmbiguousHeaderImage {
            page: page.number,
            count: candidates.len(),
        }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderCandidate {
    /// A title string. `provisional` hits are used but reported.
    Text {
        label: &'static str,
        provisional: bool,
    },
    Image,
}

impl HeaderCandidate {
    #[must_use]
    pub const fn text(label: &'static str) -> Self {
        Self::Text {
            label,
            provisional: false,
        }
    }

    #[must_use]
    pub const fn provisional(label: &'static str) -> Self {
        Self::Text {
            label,
            provisional: true,
        }
    }

    pub(crate) fn describe(self) -> &'static str {
        match self {
            Self::Text { label, .. } => label,
            Self::Image => "header image",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeaderHit {
    pub page_index: usize,
    pub rect: Rect,
    pub candidate: HeaderCandidate,
}

fn is_cover_page(page: &Page, y_tolerance: f32) -> bool {
    page_text(page, y_tolerance).contains(".pdf")
}

/// Walks the pages in order and returns the first header landmark found.
///
/// Candidates are tried in priority order on each page before moving on.
/// Cover pages, recognised by a file name in their text, are skipped.
pub fn locate_header(
    document: &Document,
    candidates: &[HeaderCandidate],
    options: &ExtractOptions,
    warnings: &mut Vec<ExtractWarning>,
) -> Result<HeaderHit, SheetError> {
    for (page_index, page) in document.pages.iter().enumerate() {
        if is_cover_page(page, options.y_tolerance) {
            debug!(page = page.number, "skipping cover page");
            warnings.push(
                ExtractWarning::new(WarningCode::CoverPageSkipped, "skipped cover page")
                    .with_page(page.number),
            );
            continue;
        }

        for &candidate in candidates {
            let rect = match candidate {
                HeaderCandidate::Text { label, .. } => {
                    search(page, label, None, options.y_tolerance).first().copied()
                }
                HeaderCandidate::Image => find_image_header(page, &options.header_image)?,
            };
            let Some(rect) = rect else {
                continue;
            };

            match candidate {
                HeaderCandidate::Text {
                    label,
                    provisional: true,
                } => {
                    warn!(
                        page = page.number,
                        label, "found and using provisional classification, not the final one"
                    );
                    warnings.push(
                        ExtractWarning::new(
                            WarningCode::ProvisionalClassification,
                            format!("using provisional header '{label}'"),
                        )
                        .with_page(page.number),
                    );
                }
                HeaderCandidate::Image => {
                    warn!(page = page.number, "no text header; using header image");
                    warnings.push(
                        ExtractWarning::new(
                            WarningCode::ImageHeaderFallback,
                            "no text header found; anchored on the header image",
                        )
                        .with_page(page.number),
                    );
                }
                HeaderCandidate::Text { .. } => {}
            }

            return Ok(HeaderHit {
                page_index,
                rect,
                candidate,
            });
        }
    }

    Err(SheetError::LandmarkNotFound {
        label: candidates
            .iter()
            .map(|candidate| candidate.describe())
            .collect::<Vec<_>>()
            .join(" / "),
    })
}

#[cfg(test)]
mod tests {
    use super::{HeaderCandidate, find_image_header, locate_header, search, search_words};
    use crate::error::SheetError;
    use crate::model::{Document, Drawing, Page, Rect, Word};
    use crate::options::{ExtractOptions, HeaderImageTolerance};
    use crate::warning::WarningCode;

    fn word(text: &str, x0: f32, y0: f32) -> Word {
        let width = text.chars().count() as f32 * 5.0;
        Word::new(text, Rect::new(x0, y0, x0 + width, y0 + 8.0))
    }

    fn page_with(words: Vec<Word>) -> Page {
        let mut page = Page::new(1, 600.0, 800.0);
        page.words = words;
        page
    }

    fn banner(y0: f32, fill: [f32; 3]) -> Drawing {
        Drawing {
            rect: Rect::new(10.0, y0, 590.0, y0 + 20.0),
            fill: Some(fill),
        }
    }

    #[test]
    fn substring_search_spans_words_on_one_line() {
        let page = page_with(vec![
            word("Qualifying", 10.0, 50.0),
            word("Final", 70.0, 50.0),
            word("Classification", 100.0, 50.0),
        ]);

        let hits = search(&page, "Final Classification", None, 3.0);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].x0, 70.0);
        assert_eq!(hits[0].x1, 170.0);
        assert_eq!(hits[0].y1, 58.0);
    }

    #[test]
    fn substring_search_ignores_case() {
        let page = page_with(vec![
            word("QUALIFYING", 10.0, 50.0),
            word("SESSION", 70.0, 50.0),
            word("FINAL", 120.0, 50.0),
            word("CLASSIFICATION", 150.0, 50.0),
        ]);

        let hits = search(&page, "Final Classification", None, 3.0);
        assert_eq!(hits, vec![Rect::new(120.0, 50.0, 220.0, 58.0)]);
        assert!(search_words(&page, "Final", None, 3.0).is_empty());
    }

    #[test]
    fn whole_word_search_skips_partial_matches() {
        let page = page_with(vec![word("NOT", 10.0, 50.0), word("NO", 10.0, 80.0)]);

        assert_eq!(search(&page, "NO", None, 3.0).len(), 2);
        let hits = search_words(&page, "NO", None, 3.0);
        assert_eq!(hits, vec![Rect::new(10.0, 80.0, 20.0, 88.0)]);
    }

    #[test]
    fn prefers_final_over_provisional_and_flags_fallback() {
        let provisional = page_with(vec![
            word("Provisional", 10.0, 50.0),
            word("Classification", 70.0, 50.0),
        ]);
        let document = Document::new("quali.pdf", vec![provisional]);
        let candidates = [
            HeaderCandidate::text("Final Classification"),
            HeaderCandidate::provisional("Provisional Classification"),
        ];

        let mut warnings = Vec::new();
        let hit = locate_header(&document, &candidates, &ExtractOptions::default(), &mut warnings)
            .expect("provisional header should be accepted");
        assert_eq!(hit.page_index, 0);
        assert_eq!(hit.candidate, candidates[1]);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].code, WarningCode::ProvisionalClassification);
    }

    #[test]
    fn skips_cover_page_naming_a_pdf() {
        let cover = page_with(vec![
            word("2025_final_race_classification.pdf", 10.0, 50.0),
            word("Final", 10.0, 80.0),
            word("Classification", 40.0, 80.0),
        ]);
        let mut body = page_with(vec![word("Final", 10.0, 90.0), word("Classification", 40.0, 90.0)]);
        body.number = 2;
        let document = Document::new("race.pdf", vec![cover, body]);

        let mut warnings = Vec::new();
        let hit = locate_header(
            &document,
            &[HeaderCandidate::text("Final Classification")],
            &ExtractOptions::default(),
            &mut warnings,
        )
        .expect("header on second page");
        assert_eq!(hit.page_index, 1);
        assert_eq!(hit.rect.y0, 90.0);
    }

    #[test]
    fn image_header_accepts_one_grey_banner() {
        let mut page = page_with(Vec::new());
        page.drawings.push(banner(40.0, [0.72, 0.72, 0.72]));
        page.drawings.push(banner(100.0, [1.0, 1.0, 1.0]));

        let found = find_image_header(&page, &HeaderImageTolerance::default())
            .expect("single banner is not ambiguous");
        assert_eq!(found, Some(Rect::new(10.0, 40.0, 590.0, 60.0)));
    }

    #[test]
    fn image_header_rejects_narrow_or_tall_shapes() {
        let mut page = page_with(Vec::new());
        page.drawings.push(Drawing {
            rect: Rect::new(10.0, 40.0, 300.0, 60.0),
            fill: Some([0.72, 0.72, 0.72]),
        });
        page.drawings.push(Drawing {
            rect: Rect::new(10.0, 100.0, 590.0, 160.0),
            fill: Some([0.72, 0.72, 0.72]),
        });

        let found = find_image_header(&page, &HeaderImageTolerance::default())
            .expect("no candidate is not an error");
        assert_eq!(found, None);
    }

    #[test]
    fn two_grey_banners_are_ambiguous() {
        let mut page = page_with(Vec::new());
        page.drawings.push(banner(40.0, [0.72, 0.72, 0.72]));
        page.drawings.push(banner(300.0, [0.70, 0.71, 0.73]));

        let err = find_image_header(&page, &HeaderImageTolerance::default())
            .expect_err("two banners must fail");
        assert_eq!(err, SheetError::AmbiguousHeaderImage { page: 1, count: 2 });
    }

    #[test]
    fn missing_landmarks_name_every_candidate() {
        let document = Document::new("empty.pdf", vec![page_with(vec![word("Nothing", 10.0, 10.0)])]);
        let err = locate_header(
            &document,
            &[
                HeaderCandidate::text("Final Classification"),
                HeaderCandidate::Image,
            ],
            &ExtractOptions::default(),
            &mut Vec::new(),
        )
        .expect_err("no landmark");
        assert_eq!(
            err,
            SheetError::LandmarkNotFound {
                label: "Final Classification / header image".to_string()
            }
        );
    }
}
