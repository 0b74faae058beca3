#![allow(dead_code)]

use std::path::Path;

use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};

pub const PAGE_WIDTH: i64 = 842;
pub const PAGE_HEIGHT: i64 = 595;
pub const LEFT_MARGIN: i64 = 20;

/// One page of a fixture sheet. Line positions are baselines measured from the top.
#[derive(Debug, Clone, Default)]
pub struct SheetPage {
    pub lines: Vec<(i64, String)>,
    /// `(top, height)` of grey full-width banners.
    pub banners: Vec<(i64, i64)>,
}

impl SheetPage {
    pub fn text(lines: &[(i64, &str)]) -> Self {
        Self {
            lines: lines
                .iter()
                .map(|(y, line)| (*y, (*line).to_string()))
                .collect(),
            banners: Vec::new(),
        }
    }

    pub fn with_banner(mut self, top: i64, height: i64) -> Self {
        self.banners.push((top, height));
        self
    }
}

fn page_operations(page: &SheetPage) -> Vec<Operation> {
    let mut operations = Vec::new();
    for (top, height) in &page.banners {
        operations.extend([
            Operation::new("q", vec![]),
            Operation::new(
                "rg",
                vec![Object::Real(0.72), Object::Real(0.72), Object::Real(0.72)],
            ),
            Operation::new(
                "re",
                vec![
                    10.into(),
                    (PAGE_HEIGHT - top - height).into(),
                    (PAGE_WIDTH - 20).into(),
                    (*height).into(),
                ],
            ),
            Operation::new("f", vec![]),
            Operation::new("Q", vec![]),
        ]);
    }

    for (baseline, line) in &page.lines {
        operations.extend([
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 8.into()]),
            Operation::new(
                "Tm",
                vec![
                    1.into(),
                    0.into(),
                    0.into(),
                    1.into(),
                    LEFT_MARGIN.into(),
                    (PAGE_HEIGHT - baseline).into(),
                ],
            ),
            Operation::new("Tj", vec![Object::string_literal(line.as_str())]),
            Operation::new("ET", vec![]),
        ]);
    }
    operations
}

/// Writes a landscape PDF with 8pt Courier text at fixed positions.
pub fn create_sheet_pdf(path: &Path, pages: &[SheetPage]) -> Result<(), Box<dyn std::error::Error>> {
    let mut doc = Document::with_version("1.5");

    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut page_ids = Vec::new();
    for page in pages {
        let content = Content {
            operations: page_operations(page),
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        page_ids.push(page_id);
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => page_ids.iter().map(|id| (*id).into()).collect::<Vec<_>>(),
            "Count" => i64::try_from(page_ids.len())?,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    doc.save(path)?;
    Ok(())
}

pub const RACE_HEADER: &str = "NO  DRIVER           NAT  ENTRANT            LAPS  TIME              GAP       INT       KM/H    FASTEST  ON  PTS";

pub const RACE_ROWS: [&str; 4] = [
    "1   Max VERSTAPPEN   NED  Red Bull Racing    57    1:31:44.742                          210.1   1:32.608 39  25",
    "2   Lando NORRIS     GBR  McLaren            57    +2.345            +2.345    +2.345    209.8   1:32.900 41  18",
    "3   Lance STROLL     CAN  Aston Martin       56    1 LAP             1 LAP     +5.000    208.0   1:33.100 12",
    "    Max VERSTAPPEN",
];

/// A race classification page anchored on `title`, or on a grey banner when `title` is `None`.
pub fn race_page(title: Option<&str>) -> SheetPage {
    let mut lines = Vec::new();
    if let Some(title) = title {
        lines.push((60, title));
    }
    lines.push((100, RACE_HEADER));
    for (index, row) in RACE_ROWS.iter().enumerate() {
        lines.push((115 + 15 * i64::try_from(index).unwrap_or(0), *row));
    }
    lines.push((200, "FASTEST LAP"));

    let page = SheetPage::text(&lines);
    if title.is_none() {
        page.with_banner(45, 20)
    } else {
        page
    }
}
