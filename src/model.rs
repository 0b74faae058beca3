use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::ser::{SerializeMap, SerializeSeq, Serializer};

use crate::warning::ExtractWarning;

/// Axis-aligned rectangle in page units, origin top-left, y growing downward.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Rect {
    #[must_use]
    pub const fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    #[must_use]
    pub fn width(&self) -> f32 {
        (self.x1 - self.x0).max(0.0)
    }

    #[must_use]
    pub fn height(&self) -> f32 {
        (self.y1 - self.y0).max(0.0)
    }

    #[must_use]
    pub fn center_x(&self) -> f32 {
        (self.x0 + self.x1) * 0.5
    }

    #[must_use]
    pub fn center_y(&self) -> f32 {
        (self.y0 + self.y1) * 0.5
    }

    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    #[must_use]
    pub fn contains_center_of(&self, other: &Self) -> bool {
        let (cx, cy) = (other.center_x(), other.center_y());
        cx >= self.x0 && cx <= self.x1 && cy >= self.y0 && cy <= self.y1
    }
}

/// One positioned word: a whitespace-free run of glyphs on a single baseline.
#[derive(Debug, Clone, PartialEq)]
pub struct Word {
    pub text: String,
    pub rect: Rect,
}

impl Word {
    #[must_use]
    pub fn new(text: impl Into<String>, rect: Rect) -> Self {
        Self {
            text: text.into(),
            rect,
        }
    }

    /// Horizontal extent of the character at `index`, assuming uniform advance.
    #[must_use]
    pub fn char_span(&self, index: usize) -> (f32, f32) {
        let count = self.text.chars().count().max(1);
        let step = self.rect.width() / count as f32;
        let x0 = self.rect.x0 + step * index as f32;
        (x0, x0 + step)
    }
}

/// Filled or stroked vector shape. `fill` is RGB in `0.0..=1.0`.
#[derive(Debug, Clone, PartialEq)]
pub struct Drawing {
    pub rect: Rect,
    pub fill: Option<[f32; 3]>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub number: u32,
    pub width: f32,
    pub height: f32,
    pub words: Vec<Word>,
    pub drawings: Vec<Drawing>,
}

impl Page {
    #[must_use]
    pub fn new(number: u32, width: f32, height: f32) -> Self {
        Self {
            number,
            width,
            height,
            words: Vec::new(),
            drawings: Vec::new(),
        }
    }
}

/// A loaded paginated document. Read-only after loading.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub path: PathBuf,
    pub pages: Vec<Page>,
    /// Whole-document text from a second extractor, used when pages carry no words.
    pub fallback_text: Option<String>,
}

impl Document {
    #[must_use]
    pub fn new(path: impl AsRef<Path>, pages: Vec<Page>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            pages,
            fallback_text: None,
        }
    }
}

pub type RawRow = Vec<String>;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawGrid {
    pub header: RawRow,
    pub rows: Vec<RawRow>,
}

impl RawGrid {
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.header.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Text(String),
    Int(Option<i64>),
    Bool(bool),
}

impl Value {
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    /// Rendering used by CSV output: nullable ints become empty cells.
    #[must_use]
    pub fn to_cell(&self) -> String {
        match self {
            Self::Text(value) => value.clone(),
            Self::Int(Some(value)) => value.to_string(),
            Self::Int(None) => String::new(),
            Self::Bool(value) => value.to_string(),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// A schema-conformant row. Values line up with the owning table's field list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalRecord {
    pub values: Vec<Value>,
}

impl LogicalRecord {
    #[must_use]
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }
}

/// Ordered records of one document. Row order is rank order.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub fields: Vec<String>,
    pub records: Vec<LogicalRecord>,
    pub page: Option<u32>,
    pub warnings: Vec<ExtractWarning>,
}

impl Table {
    #[must_use]
    pub fn new(fields: Vec<String>) -> Self {
        Self {
            fields,
            records: Vec::new(),
            page: None,
            warnings: Vec::new(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn field_index(&self, field: &str) -> Option<usize> {
        self.fields.iter().position(|name| name == field)
    }

    #[must_use]
    pub fn get(&self, row: usize, field: &str) -> Option<&Value> {
        let index = self.field_index(field)?;
        self.records.get(row)?.values.get(index)
    }

    #[must_use]
    pub fn text(&self, row: usize, field: &str) -> Option<&str> {
        self.get(row, field).and_then(Value::as_str)
    }

    #[must_use]
    pub fn used_fallback(&self) -> bool {
        self.warnings.iter().any(|warning| {
            matches!(
                warning.code,
                crate::warning::WarningCode::ProvisionalClassification
                    | crate::warning::WarningCode::ImageHeaderFallback
            )
        })
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

struct RecordView<'a> {
    fields: &'a [String],
    record: &'a LogicalRecord,
}

impl Serialize for RecordView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (field, value) in self.fields.iter().zip(&self.record.values) {
            map.serialize_entry(field, value)?;
        }
        map.end()
    }
}

impl Serialize for Table {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.records.len()))?;
        for record in &self.records {
            seq.serialize_element(&RecordView {
                fields: &self.fields,
                record,
            })?;
        }
        seq.end()
    }
}
