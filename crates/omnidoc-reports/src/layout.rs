//! Page drawing primitives on top of `lopdf`.
//!
//! Coordinates are PDF user space: origin at the bottom-left corner, y
//! growing upwards, one unit per point.

use crate::encoding::to_win_ansi;
use crate::ReportError;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};

/// A4 portrait, in points.
pub const A4_WIDTH: f32 = 595.0;
pub const A4_HEIGHT: f32 = 842.0;

/// Built-in fonts available on every page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Font {
    Regular,
    Bold,
}

impl Font {
    pub(crate) fn resource_name(self) -> &'static str {
        match self {
            Self::Regular => "OmnidocF1",
            Self::Bold => "OmnidocF2",
        }
    }

    fn base_font(self) -> &'static str {
        match self {
            Self::Regular => "Helvetica",
            Self::Bold => "Helvetica-Bold",
        }
    }

    /// Rough advance width of `text` at `size`, good enough for wrapping and
    /// centring with Helvetica.
    pub fn approx_width(self, text: &str, size: f32) -> f32 {
        let factor = match self {
            Self::Regular => 0.5,
            Self::Bold => 0.55,
        };
        text.chars().count() as f32 * size * factor
    }
}

pub(crate) fn render_err(e: impl std::fmt::Display) -> ReportError {
    ReportError::Render(e.to_string())
}

/// A single line of text at a fixed position.
#[derive(Debug, Clone, PartialEq)]
pub struct TextLine {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub font: Font,
}

/// Drawing operations for one page.
#[derive(Debug, Default)]
pub struct PageCanvas {
    operations: Vec<Operation>,
}

impl PageCanvas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&mut self, font: Font, size: f32, x: f32, y: f32, text: &str) {
        self.operations.extend([
            Operation::new("BT", vec![]),
            Operation::new(
                "Tf",
                vec![Object::Name(font.resource_name().into()), Object::Real(size)],
            ),
            Operation::new("Td", vec![Object::Real(x), Object::Real(y)]),
            Operation::new(
                "Tj",
                vec![Object::String(to_win_ansi(text), StringFormat::Literal)],
            ),
            Operation::new("ET", vec![]),
        ]);
    }

    pub fn line(&mut self, text: &TextLine) {
        self.text(text.font, text.size, text.x, text.y, &text.text);
    }

    /// Horizontal rule from `x1` to `x2` at height `y`.
    pub fn rule(&mut self, x1: f32, x2: f32, y: f32) {
        self.operations.extend([
            Operation::new("w", vec![Object::Real(0.5)]),
            Operation::new("m", vec![Object::Real(x1), Object::Real(y)]),
            Operation::new("l", vec![Object::Real(x2), Object::Real(y)]),
            Operation::new("S", vec![]),
        ]);
    }

    /// Encodes the page content, wrapped in a saved graphics state.
    pub fn encode(self) -> Result<Vec<u8>, ReportError> {
        let mut operations = Vec::with_capacity(self.operations.len() + 2);
        operations.push(Operation::new("q", vec![]));
        operations.extend(self.operations);
        operations.push(Operation::new("Q", vec![]));
        Content { operations }.encode().map_err(render_err)
    }
}

fn font_dictionary(font: Font) -> Dictionary {
    dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => font.base_font(),
        "Encoding" => "WinAnsiEncoding",
    }
}

/// Adds both fonts to `doc` and returns their object ids.
pub(crate) fn add_fonts(doc: &mut Document) -> (ObjectId, ObjectId) {
    let regular = doc.add_object(font_dictionary(Font::Regular));
    let bold = doc.add_object(font_dictionary(Font::Bold));
    (regular, bold)
}

/// Assembles pages into a fresh A4 document and serializes it.
pub fn build_document(pages: Vec<PageCanvas>) -> Result<Vec<u8>, ReportError> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let (regular, bold) = add_fonts(&mut doc);
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            Font::Regular.resource_name() => regular,
            Font::Bold.resource_name() => bold,
        },
    });

    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
    for page in pages {
        let content_id = doc.add_object(Stream::new(dictionary! {}, page.encode()?));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    let pages_dict = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => count,
        "Resources" => resources_id,
        "MediaBox" => vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Real(A4_WIDTH),
            Object::Real(A4_HEIGHT),
        ],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    save(&mut doc)
}

pub(crate) fn save(doc: &mut Document) -> Result<Vec<u8>, ReportError> {
    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).map_err(render_err)?;
    Ok(bytes)
}

/// Splits `text` into lines no wider than `max_width`.
pub fn wrap(text: &str, font: Font, size: f32, max_width: f32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{} {}", current, word)
        };
        if !current.is_empty() && font.approx_width(&candidate, size) > max_width {
            lines.push(std::mem::take(&mut current));
            current = word.to_string();
        } else {
            current = candidate;
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Top-to-bottom writer that starts a new page when the cursor reaches the
/// bottom margin.
pub struct FlowWriter {
    pages: Vec<PageCanvas>,
    current: PageCanvas,
    cursor: f32,
    margin: f32,
}

impl FlowWriter {
    pub fn new(margin: f32) -> Self {
        Self {
            pages: Vec::new(),
            current: PageCanvas::new(),
            cursor: A4_HEIGHT - margin,
            margin,
        }
    }

    pub fn cursor(&self) -> f32 {
        self.cursor
    }

    pub fn page_count(&self) -> usize {
        self.pages.len() + 1
    }

    /// Starts a new page when fewer than `needed` points remain.
    pub fn ensure_space(&mut self, needed: f32) {
        if self.cursor - needed < self.margin {
            self.new_page();
        }
    }

    pub fn new_page(&mut self) {
        let finished = std::mem::take(&mut self.current);
        self.pages.push(finished);
        self.cursor = A4_HEIGHT - self.margin;
    }

    pub fn move_down(&mut self, amount: f32) {
        self.cursor -= amount;
    }

    /// Writes wrapped text at the left margin plus `indent`.
    pub fn paragraph(&mut self, font: Font, size: f32, indent: f32, text: &str) {
        let leading = size * 1.4;
        let width = A4_WIDTH - 2.0 * self.margin - indent;
        for line in wrap(text, font, size, width) {
            self.ensure_space(leading);
            self.cursor -= leading;
            let x = self.margin + indent;
            self.current.text(font, size, x, self.cursor, &line);
        }
    }

    /// Writes a single line centred on the page.
    pub fn centered(&mut self, font: Font, size: f32, text: &str) {
        let leading = size * 1.4;
        self.ensure_space(leading);
        self.cursor -= leading;
        let x = ((A4_WIDTH - font.approx_width(text, size)) / 2.0).max(self.margin);
        self.current.text(font, size, x, self.cursor, text);
    }

    pub fn rule(&mut self) {
        self.ensure_space(6.0);
        self.cursor -= 6.0;
        self.current
            .rule(self.margin, A4_WIDTH - self.margin, self.cursor);
    }

    /// Direct access to the current page for fixed-position drawing.
    pub fn canvas(&mut self) -> &mut PageCanvas {
        &mut self.current
    }

    pub fn finish(mut self) -> Result<Vec<u8>, ReportError> {
        self.pages.push(self.current);
        build_document(self.pages)
    }
}
