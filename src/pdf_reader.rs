//! Loads a PDF into positioned words and filled shapes.
//!
//! Content streams are interpreted with `lopdf`. Only the operators that place
//! text or paint rectangles are tracked; everything else is ignored.

use std::collections::BTreeMap;
use std::path::Path;

use encoding_rs::{UTF_16BE, WINDOWS_1252};
use lopdf::content::Content;
use lopdf::{Dictionary, Object, ObjectId};
use tracing::debug;

use crate::error::ExtractError;
use crate::model::{Document, Drawing, Page, Rect, Word};
use crate::options::PageSelection;

type Matrix = [f32; 6];

const IDENTITY: Matrix = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];
const DEFAULT_GLYPH_WIDTH: f32 = 500.0;
const MONOSPACE_GLYPH_WIDTH: f32 = 600.0;
const DEFAULT_MEDIA_BOX: [f32; 4] = [0.0, 0.0, 612.0, 792.0];

fn multiply(m: &Matrix, n: &Matrix) -> Matrix {
    [
        m[0] * n[0] + m[1] * n[2],
        m[0] * n[1] + m[1] * n[3],
        m[2] * n[0] + m[3] * n[2],
        m[2] * n[1] + m[3] * n[3],
        m[4] * n[0] + m[5] * n[2] + n[4],
        m[4] * n[1] + m[5] * n[3] + n[5],
    ]
}

fn translate(tx: f32, ty: f32) -> Matrix {
    [1.0, 0.0, 0.0, 1.0, tx, ty]
}

fn apply(m: &Matrix, x: f32, y: f32) -> (f32, f32) {
    (x * m[0] + y * m[2] + m[4], x * m[1] + y * m[3] + m[5])
}

#[allow(clippy::cast_precision_loss, clippy::unnecessary_cast)]
fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(value) => Some(*value as f32),
        Object::Real(value) => Some(*value as f32),
        _ => None,
    }
}

fn numbers(operands: &[Object]) -> Vec<f32> {
    operands.iter().filter_map(number).collect()
}

fn split_text_into_pages(raw_text: &str) -> Vec<String> {
    let mut pages = raw_text
        .split('\u{000C}')
        .map(str::to_string)
        .collect::<Vec<_>>();
    if pages.last().is_some_and(String::is_empty) {
        pages.pop();
    }
    pages
}

fn looks_decoding_broken(text: &str) -> bool {
    if text.is_empty() {
        return false;
    }
    if text.contains("?Identity-H Unimplemented?") {
        return true;
    }

    let total = text.chars().count();
    let replacement = text.matches('\u{FFFD}').count();
    let control = text
        .chars()
        .filter(|ch| ch.is_control() && !matches!(ch, '\n' | '\r' | '\t'))
        .count();
    replacement * 8 > total || control * 5 > total
}

fn decode_pdf_bytes(encoding: Option<&str>, bytes: &[u8]) -> String {
    let decoded = lopdf::Document::decode_text(encoding, bytes);
    if !looks_decoding_broken(&decoded) {
        return decoded;
    }

    if bytes.starts_with(&[0xFE, 0xFF]) {
        let (utf16, had_errors) = UTF_16BE.decode_without_bom_handling(&bytes[2..]);
        if !had_errors && !utf16.is_empty() {
            return utf16.into_owned();
        }
    }

    if let Some(name) = encoding {
        let lower = name.to_ascii_lowercase();
        if lower.contains("identity-h") || lower.contains("ucs2") || lower.contains("utf16") {
            let (utf16, had_errors) = UTF_16BE.decode_without_bom_handling(bytes);
            if !had_errors && !utf16.is_empty() {
                return utf16.into_owned();
            }
        }
    }

    let (latin, _, _) = WINDOWS_1252.decode(bytes);
    latin.into_owned()
}

fn deref<'a>(document: &'a lopdf::Document, object: &'a Object) -> Option<&'a Object> {
    match object {
        Object::Reference(id) => document.get_object(*id).ok(),
        _ => Some(object),
    }
}

/// Glyph advances of one font, in thousandths of the font size.
#[derive(Debug, Clone)]
struct FontMetrics<'a> {
    encoding: Option<&'a str>,
    first_char: u32,
    widths: Vec<f32>,
    missing_width: f32,
}

impl<'a> FontMetrics<'a> {
    fn from_dictionary(document: &'a lopdf::Document, font: &'a Dictionary) -> Self {
        let base_font = font
            .get(b"BaseFont")
            .ok()
            .and_then(|object| object.as_name().ok())
            .map(|name| String::from_utf8_lossy(name).to_string())
            .unwrap_or_default();
        let missing_width = if base_font.contains("Courier") {
            MONOSPACE_GLYPH_WIDTH
        } else {
            DEFAULT_GLYPH_WIDTH
        };
        let first_char = font
            .get(b"FirstChar")
            .ok()
            .and_then(|object| object.as_i64().ok())
            .and_then(|value| u32::try_from(value).ok())
            .unwrap_or(0);
        let widths = font
            .get(b"Widths")
            .ok()
            .and_then(|object| deref(document, object))
            .and_then(|object| object.as_array().ok())
            .map(|items| items.iter().map(|item| number(item).unwrap_or(missing_width)).collect())
            .unwrap_or_default();

        Self {
            encoding: Some(font.get_font_encoding()),
            first_char,
            widths,
            missing_width,
        }
    }

    fn width(&self, code: u32) -> f32 {
        code.checked_sub(self.first_char)
            .and_then(|index| self.widths.get(index as usize))
            .copied()
            .unwrap_or(self.missing_width)
    }
}

#[derive(Debug, Clone)]
struct GraphicsState {
    ctm: Matrix,
    fill: [f32; 3],
    font: Option<Vec<u8>>,
    font_size: f32,
    char_spacing: f32,
    word_spacing: f32,
    leading: f32,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            ctm: IDENTITY,
            fill: [0.0, 0.0, 0.0],
            font: None,
            font_size: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            leading: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Glyph {
    ch: char,
    x0: f32,
    x1: f32,
    baseline: f32,
    size: f32,
}

/// Walks one page's content stream, collecting words and painted shapes.
struct PageInterpreter<'a> {
    fonts: BTreeMap<Vec<u8>, FontMetrics<'a>>,
    /// `(llx, ury)` of the media box; user space is shifted and flipped against it.
    origin: (f32, f32),
    state: GraphicsState,
    saved: Vec<GraphicsState>,
    text_matrix: Matrix,
    line_matrix: Matrix,
    path: Option<Rect>,
    pending: Vec<Glyph>,
    words: Vec<Word>,
    drawings: Vec<Drawing>,
}

impl<'a> PageInterpreter<'a> {
    fn new(fonts: BTreeMap<Vec<u8>, FontMetrics<'a>>, origin: (f32, f32)) -> Self {
        Self {
            fonts,
            origin,
            state: GraphicsState::default(),
            saved: Vec::new(),
            text_matrix: IDENTITY,
            line_matrix: IDENTITY,
            path: None,
            pending: Vec::new(),
            words: Vec::new(),
            drawings: Vec::new(),
        }
    }

    fn to_page(&self, x: f32, y: f32) -> (f32, f32) {
        (x - self.origin.0, self.origin.1 - y)
    }

    fn flush_word(&mut self) {
        let Some(first) = self.pending.first().copied() else {
            return;
        };
        let last = self.pending[self.pending.len() - 1];
        let size = self.pending.iter().map(|glyph| glyph.size).fold(0.0, f32::max);
        let text = self.pending.drain(..).map(|glyph| glyph.ch).collect::<String>();

        let (x0, top) = self.to_page(first.x0, first.baseline + 0.8 * size);
        let (x1, bottom) = self.to_page(last.x1, first.baseline - 0.2 * size);
        self.words.push(Word::new(text, Rect::new(x0, top, x1, bottom)));
    }

    fn push_glyph(&mut self, glyph: Glyph) {
        if glyph.ch.is_whitespace() {
            self.flush_word();
            return;
        }
        if let Some(last) = self.pending.last() {
            let tolerance = glyph.size.max(last.size);
            let broken = (glyph.baseline - last.baseline).abs() > 0.25 * tolerance
                || glyph.x0 - last.x1 > 0.3 * tolerance
                || glyph.x0 < last.x0;
            if broken {
                self.flush_word();
            }
        }
        self.pending.push(glyph);
    }

    fn show_string(&mut self, bytes: &[u8]) {
        let font = self
            .state
            .font
            .as_ref()
            .and_then(|name| self.fonts.get(name))
            .cloned();
        let text = decode_pdf_bytes(font.as_ref().and_then(|font| font.encoding), bytes);
        let per_byte = text.chars().count() == bytes.len();
        let size = self.state.font_size;

        for (index, ch) in text.chars().enumerate() {
            let width = match (&font, per_byte) {
                (Some(font), true) => font.width(u32::from(bytes[index])),
                (Some(font), false) => font.missing_width,
                (None, _) => DEFAULT_GLYPH_WIDTH,
            } / 1000.0
                * size;

            let render = multiply(&self.text_matrix, &self.state.ctm);
            let (x0, baseline) = apply(&render, 0.0, 0.0);
            let (x1, _) = apply(&render, width, 0.0);
            let scale = render[2].hypot(render[3]);
            self.push_glyph(Glyph {
                ch,
                x0,
                x1,
                baseline,
                size: size * scale,
            });

            let mut advance = width + self.state.char_spacing;
            if ch == ' ' {
                advance += self.state.word_spacing;
            }
            self.text_matrix = multiply(&translate(advance, 0.0), &self.text_matrix);
        }
    }

    fn move_line(&mut self, tx: f32, ty: f32) {
        self.line_matrix = multiply(&translate(tx, ty), &self.line_matrix);
        self.text_matrix = self.line_matrix;
    }

    fn extend_path(&mut self, points: &[(f32, f32)]) {
        for &(x, y) in points {
            let (ux, uy) = apply(&self.state.ctm, x, y);
            let (px, py) = self.to_page(ux, uy);
            let point = Rect::new(px, py, px, py);
            self.path = Some(self.path.map_or(point, |path| path.union(&point)));
        }
    }

    fn paint(&mut self, fill: Option<[f32; 3]>) {
        if let Some(rect) = self.path.take() {
            self.drawings.push(Drawing { rect, fill });
        }
    }

    fn run(&mut self, content: Content) {
        for operation in content.operations {
            let operands = &operation.operands;
            let values = numbers(operands);
            match operation.operator.as_str() {
                "q" => self.saved.push(self.state.clone()),
                "Q" => {
                    if let Some(state) = self.saved.pop() {
                        self.state = state;
                    }
                }
                "cm" => {
                    if let [a, b, c, d, e, f] = values[..] {
                        self.state.ctm = multiply(&[a, b, c, d, e, f], &self.state.ctm);
                    }
                }
                "BT" => {
                    self.text_matrix = IDENTITY;
                    self.line_matrix = IDENTITY;
                }
                "ET" => self.flush_word(),
                "Tf" => {
                    self.state.font = operands
                        .first()
                        .and_then(|operand| operand.as_name().ok())
                        .map(<[u8]>::to_vec);
                    if let Some(size) = operands.get(1).and_then(number) {
                        self.state.font_size = size;
                    }
                }
                "Tc" => self.state.char_spacing = values.first().copied().unwrap_or(0.0),
                "Tw" => self.state.word_spacing = values.first().copied().unwrap_or(0.0),
                "TL" => self.state.leading = values.first().copied().unwrap_or(0.0),
                "Td" => {
                    if let [tx, ty] = values[..] {
                        self.move_line(tx, ty);
                    }
                }
                "TD" => {
                    if let [tx, ty] = values[..] {
                        self.state.leading = -ty;
                        self.move_line(tx, ty);
                    }
                }
                "Tm" => {
                    if let [a, b, c, d, e, f] = values[..] {
                        self.line_matrix = [a, b, c, d, e, f];
                        self.text_matrix = self.line_matrix;
                    }
                }
                "T*" => self.move_line(0.0, -self.state.leading),
                "Tj" | "'" | "\"" => {
                    if operation.operator == "\"" {
                        if let [word_spacing, char_spacing, ..] = values[..] {
                            self.state.word_spacing = word_spacing;
                            self.state.char_spacing = char_spacing;
                        }
                    }
                    if operation.operator != "Tj" {
                        self.move_line(0.0, -self.state.leading);
                    }
                    if let Some(Object::String(bytes, _)) = operands.last() {
                        self.show_string(bytes);
                    }
                }
                "TJ" => {
                    let Some(Object::Array(items)) = operands.first() else {
                        continue;
                    };
                    for item in items {
                        match item {
                            Object::String(bytes, _) => self.show_string(bytes),
                            other => {
                                if let Some(adjust) = number(other) {
                                    let shift = -adjust / 1000.0 * self.state.font_size;
                                    self.text_matrix =
                                        multiply(&translate(shift, 0.0), &self.text_matrix);
                                }
                            }
                        }
                    }
                }
                "g" => {
                    if let [gray] = values[..] {
                        self.state.fill = [gray; 3];
                    }
                }
                "rg" => {
                    if let [r, g, b] = values[..] {
                        self.state.fill = [r, g, b];
                    }
                }
                "k" => {
                    if let [c, m, y, k] = values[..] {
                        self.state.fill = [(1.0 - c) * (1.0 - k), (1.0 - m) * (1.0 - k), (1.0 - y) * (1.0 - k)];
                    }
                }
                "sc" | "scn" => match values[..] {
                    [gray] => self.state.fill = [gray; 3],
                    [r, g, b] => self.state.fill = [r, g, b],
                    _ => {}
                },
                "re" => {
                    if let [x, y, w, h] = values[..] {
                        self.extend_path(&[(x, y), (x + w, y + h)]);
                    }
                }
                "m" | "l" | "c" | "v" | "y" => {
                    let points = values
                        .chunks_exact(2)
                        .map(|pair| (pair[0], pair[1]))
                        .collect::<Vec<_>>();
                    self.extend_path(&points);
                }
                "f" | "F" | "f*" | "B" | "B*" | "b" | "b*" => self.paint(Some(self.state.fill)),
                "S" | "s" => self.paint(None),
                "n" => self.path = None,
                _ => {}
            }
        }
        self.flush_word();
    }
}

fn media_box(document: &lopdf::Document, page_id: ObjectId) -> [f32; 4] {
    let mut dictionary = document.get_dictionary(page_id).ok();
    let mut depth = 0;
    while let Some(current) = dictionary {
        if let Some(values) = current
            .get(b"MediaBox")
            .ok()
            .and_then(|object| deref(document, object))
            .and_then(|object| object.as_array().ok())
            .map(|items| numbers(items))
            && let [x0, y0, x1, y1] = values[..]
        {
            return [x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1)];
        }

        depth += 1;
        if depth > 32 {
            break;
        }
        dictionary = current
            .get(b"Parent")
            .and_then(Object::as_reference)
            .and_then(|id| document.get_dictionary(id))
            .ok();
    }
    DEFAULT_MEDIA_BOX
}

fn read_page(
    document: &lopdf::Document,
    number: u32,
    page_id: ObjectId,
) -> Result<Page, ExtractError> {
    let [x0, y0, x1, y1] = media_box(document, page_id);
    let fonts = document
        .get_page_fonts(page_id)
        .into_iter()
        .map(|(name, font)| (name, FontMetrics::from_dictionary(document, font)))
        .collect::<BTreeMap<_, _>>();

    let raw_content = document.get_page_content(page_id)?;
    let content = Content::decode(&raw_content)?;

    let mut interpreter = PageInterpreter::new(fonts, (x0, y1));
    interpreter.run(content);

    let mut page = Page::new(number, x1 - x0, y1 - y0);
    page.words = interpreter.words;
    page.drawings = interpreter.drawings;
    debug!(
        page = number,
        words = page.words.len(),
        drawings = page.drawings.len(),
        "read page"
    );
    Ok(page)
}

fn read_pages(
    document: &lopdf::Document,
    page_selection: Option<&PageSelection>,
) -> Result<Vec<Page>, ExtractError> {
    let mut pages = Vec::new();
    for (page_no, page_id) in document.get_pages() {
        if page_selection.is_some_and(|selection| !selection.contains(page_no)) {
            continue;
        }
        pages.push(read_page(document, page_no, page_id)?);
    }

    if pages.is_empty() {
        return Err(ExtractError::NoPagesSelected);
    }
    Ok(pages)
}

/// Keeps only the selected pages of a form-feed separated text dump.
fn select_plain_text(text: &str, pages: &[Page], total_pages: usize) -> Option<String> {
    let split = split_text_into_pages(text);
    let selected = if split.len() == total_pages {
        pages
            .iter()
            .filter_map(|page| split.get((page.number as usize).checked_sub(1)?))
            .cloned()
            .collect::<Vec<_>>()
            .join("\n")
    } else {
        text.to_string()
    };
    Some(selected).filter(|text| !text.trim().is_empty())
}

fn needs_plain_text(pages: &[Page]) -> bool {
    pages.iter().all(|page| page.words.is_empty())
}

pub(crate) fn read_document(
    input_pdf: &Path,
    page_selection: Option<&PageSelection>,
) -> Result<Document, ExtractError> {
    let pdf = lopdf::Document::load(input_pdf)?;
    let pages = read_pages(&pdf, page_selection)?;

    let fallback_text = if needs_plain_text(&pages) {
        pdf_extract::extract_text(input_pdf)
            .ok()
            .and_then(|text| select_plain_text(&text, &pages, pdf.get_pages().len()))
    } else {
        None
    };

    let mut document = Document::new(input_pdf, pages);
    document.fallback_text = fallback_text;
    Ok(document)
}

pub(crate) fn read_document_from_bytes(
    label: &Path,
    input_pdf: &[u8],
    page_selection: Option<&PageSelection>,
) -> Result<Document, ExtractError> {
    let pdf = lopdf::Document::load_mem(input_pdf)?;
    let pages = read_pages(&pdf, page_selection)?;

    let fallback_text = if needs_plain_text(&pages) {
        pdf_extract::extract_text_from_mem(input_pdf)
            .ok()
            .and_then(|text| select_plain_text(&text, &pages, pdf.get_pages().len()))
    } else {
        None
    };

    let mut document = Document::new(label, pages);
    document.fallback_text = fallback_text;
    Ok(document)
}
