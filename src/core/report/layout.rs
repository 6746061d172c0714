// PDF layout of a session report
// A4 portrait, built-in Helvetica. printpdf places the origin at the bottom
// left, so the writer keeps a cursor measured from the bottom edge and moves
// it down as content is added.

use crate::core::report::fetch::FetchResult;
use crate::core::report::{ReportError, ReportResult};
use crate::models::policy::ViolationKind;
use crate::models::session::{SessionInfo, SnapshotStats};
use chrono::{DateTime, Utc};
use printpdf::image_crate::{DynamicImage, GenericImageView};
use printpdf::{
    BuiltinFont, Color, Image, ImageTransform, IndirectFontRef, Line, Mm, PdfDocument,
    PdfDocumentReference, PdfLayerReference, Point, Rgb,
};

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 20.0;
const VALUE_COLUMN: f32 = 65.0;

const SNAPSHOT_BOX: (f32, f32) = (160.0, 90.0);
const IDENTITY_BOX: (f32, f32) = (40.0, 30.0);
const IMAGE_DPI: f32 = 300.0;
const BLOCKS_PER_PAGE: usize = 2;
const MAX_ERROR_CHARS: usize = 90;

const PT_TO_MM: f32 = 0.3528;

const TEXT: (u8, u8, u8) = (0x2C, 0x3E, 0x50);
const HEADING: (u8, u8, u8) = (0x34, 0x49, 0x5E);
const RED: (u8, u8, u8) = (0xE7, 0x4C, 0x3C);
const GREEN: (u8, u8, u8) = (0x27, 0xAE, 0x60);
const IDENTITY: (u8, u8, u8) = (0x29, 0x80, 0xB9);
const FRAME: (u8, u8, u8) = (0xBD, 0xC3, 0xC7);

/// One snapshot slot in the "Captured Snapshots" section
pub struct SnapshotBlock {
    /// 1-based position in the report
    pub number: usize,
    pub taken_at: DateTime<Utc>,
    pub violation: Option<ViolationKind>,
    pub is_identity: bool,
    pub image: FetchResult,
}

/// Everything needed to draw the report, owned so it can move to a blocking thread
pub struct ReportContent {
    pub session: SessionInfo,
    pub stats: SnapshotStats,
    pub generated_at: DateTime<Utc>,
    pub blocks: Vec<SnapshotBlock>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LayoutSummary {
    pub pages: usize,
    pub blocks: usize,
    pub images: usize,
    pub failed: usize,
}

/// Draw the whole report and serialize it
pub fn render(content: &ReportContent) -> ReportResult<(Vec<u8>, LayoutSummary)> {
    let mut pen = Pen::new("Proctoring Session Report")?;
    let mut summary = LayoutSummary::default();

    pen.text("Proctoring Session Report", 20.0, true, HEADING);
    pen.text(
        &format!("Generated: {}", content.generated_at.format("%Y-%m-%d %H:%M:%S")),
        10.0,
        false,
        TEXT,
    );
    pen.gap(6.0);

    session_section(&mut pen, content);
    pen.gap(6.0);
    statistics_section(&mut pen, content);

    if content.blocks.is_empty() {
        pen.gap(6.0);
        pen.text("Captured Snapshots", 14.0, true, HEADING);
        pen.text("No snapshots available", 11.0, false, TEXT);
    } else {
        pen.new_page();
        pen.text("Captured Snapshots", 14.0, true, HEADING);
        pen.gap(2.0);

        for (position, block) in content.blocks.iter().enumerate() {
            if position > 0 && position % BLOCKS_PER_PAGE == 0 {
                pen.new_page();
            }
            if snapshot_block(&mut pen, block) {
                summary.images += 1;
            } else {
                summary.failed += 1;
            }
            summary.blocks += 1;
            pen.gap(8.0);
        }
    }

    summary.pages = pen.pages;
    let bytes = pen
        .doc
        .save_to_bytes()
        .map_err(|e| ReportError::Render(e.to_string()))?;
    Ok((bytes, summary))
}

fn session_section(pen: &mut Pen, content: &ReportContent) {
    let session = &content.session;
    pen.text("Session Information", 14.0, true, HEADING);
    pen.row("Student", &session.student_name, TEXT);
    pen.row("Subject", &session.subject_name, TEXT);
    pen.row("Session ID", &session.id, TEXT);
    pen.row(
        "Date",
        &session.created_at_utc().format("%Y-%m-%d %H:%M:%S").to_string(),
        TEXT,
    );

    let identity = content
        .blocks
        .first()
        .filter(|b| b.is_identity)
        .and_then(|b| b.image.as_ref().ok());

    match identity {
        Some(image) => {
            pen.label("Identity photo");
            pen.gap(1.0);
            pen.image(image, VALUE_COLUMN, IDENTITY_BOX, IDENTITY, 1.2);
        }
        None if session.identity_snapshot_id.is_some() => {
            pen.row("Identity photo", "Unavailable", RED);
        }
        None => pen.row("Identity photo", "Not provided", TEXT),
    }
}

fn statistics_section(pen: &mut Pen, content: &ReportContent) {
    pen.text("Violations Statistics", 14.0, true, HEADING);

    let detected = content.session.result.violations();
    if detected.is_empty() {
        pen.text("No violations detected", 11.0, false, GREEN);
    } else {
        for kind in detected {
            pen.row(kind.caption(), "Yes", RED);
        }
    }

    pen.row("Total snapshots", &content.stats.total.to_string(), TEXT);
    pen.row("Violation snapshots", &content.stats.violations.to_string(), TEXT);
}

/// Returns whether an image was placed
fn snapshot_block(pen: &mut Pen, block: &SnapshotBlock) -> bool {
    let caption = if block.is_identity {
        format!("Snapshot #{} (identity photo)", block.number)
    } else {
        format!("Snapshot #{}", block.number)
    };
    pen.text(&caption, 12.0, true, HEADING);
    pen.text(
        &format!("Time: {}", block.taken_at.format("%Y-%m-%d %H:%M:%S")),
        10.0,
        false,
        TEXT,
    );
    match block.violation {
        Some(kind) => pen.text(&format!("Violation: {}", kind.caption()), 10.0, false, RED),
        None => pen.text("No violation", 10.0, false, GREEN),
    }
    pen.gap(2.0);

    let failure = match &block.image {
        Ok(image) => {
            let frame = if block.is_identity { IDENTITY } else { FRAME };
            if pen.image(image, MARGIN, SNAPSHOT_BOX, frame, 0.8) {
                return true;
            }
            "image has no pixels".to_string()
        }
        Err(e) => e.to_string(),
    };

    let mut line = format!("Failed to load snapshot #{}: {}", block.number, failure);
    if line.chars().count() > MAX_ERROR_CHARS {
        line = line.chars().take(MAX_ERROR_CHARS).collect::<String>() + "...";
    }
    pen.text(&line, 10.0, false, RED);
    false
}

// ==============================================================================
// Drawing primitives
// ==============================================================================

struct Pen {
    doc: PdfDocumentReference,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    layer: PdfLayerReference,
    /// Distance of the next line's top from the bottom edge, in mm
    cursor: f32,
    pages: usize,
}

impl Pen {
    fn new(title: &str) -> ReportResult<Self> {
        let (doc, page, layer) =
            PdfDocument::new(title, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
        let regular = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| ReportError::Render(e.to_string()))?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| ReportError::Render(e.to_string()))?;
        let layer = doc.get_page(page).get_layer(layer);

        Ok(Self {
            doc,
            regular,
            bold,
            layer,
            cursor: PAGE_HEIGHT - MARGIN,
            pages: 1,
        })
    }

    fn new_page(&mut self) {
        let (page, layer) = self
            .doc
            .add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.cursor = PAGE_HEIGHT - MARGIN;
        self.pages += 1;
    }

    fn gap(&mut self, mm: f32) {
        self.cursor -= mm;
    }

    fn draw_text(&self, text: &str, size: f32, bold: bool, color: (u8, u8, u8), x: f32) {
        let font = if bold { &self.bold } else { &self.regular };
        self.layer.set_fill_color(rgb(color));
        self.layer
            .use_text(text, size, Mm(x), Mm(self.cursor - size * PT_TO_MM), font);
    }

    fn advance(&mut self, size: f32) {
        self.cursor -= size * PT_TO_MM * 1.6;
    }

    fn text(&mut self, text: &str, size: f32, bold: bool, color: (u8, u8, u8)) {
        self.draw_text(text, size, bold, color, MARGIN);
        self.advance(size);
    }

    fn label(&mut self, label: &str) {
        self.draw_text(label, 10.0, true, TEXT, MARGIN);
    }

    /// Two-column table row
    fn row(&mut self, label: &str, value: &str, color: (u8, u8, u8)) {
        self.label(label);
        self.draw_text(value, 10.0, false, color, VALUE_COLUMN);
        self.advance(10.0);
    }

    /// Place `image` scaled to fit `bounds`, top edge at the cursor, inside a
    /// frame. Returns false for an image with no pixels.
    fn image(
        &mut self,
        image: &DynamicImage,
        x: f32,
        bounds: (f32, f32),
        frame: (u8, u8, u8),
        thickness: f32,
    ) -> bool {
        let (px_width, px_height) = image.dimensions();
        if px_width == 0 || px_height == 0 {
            return false;
        }

        let native_width = px_width as f32 / IMAGE_DPI * 25.4;
        let native_height = px_height as f32 / IMAGE_DPI * 25.4;
        let scale = (bounds.0 / native_width).min(bounds.1 / native_height);
        let width = native_width * scale;
        let height = native_height * scale;
        let bottom = self.cursor - height;

        Image::from_dynamic_image(image).add_to_layer(
            self.layer.clone(),
            ImageTransform {
                translate_x: Some(Mm(x)),
                translate_y: Some(Mm(bottom)),
                scale_x: Some(scale),
                scale_y: Some(scale),
                dpi: Some(IMAGE_DPI),
                ..Default::default()
            },
        );

        self.layer.set_outline_color(rgb(frame));
        self.layer.set_outline_thickness(thickness);
        self.layer.add_line(Line {
            points: vec![
                (Point::new(Mm(x), Mm(bottom)), false),
                (Point::new(Mm(x + width), Mm(bottom)), false),
                (Point::new(Mm(x + width), Mm(self.cursor)), false),
                (Point::new(Mm(x), Mm(self.cursor)), false),
            ],
            is_closed: true,
        });

        self.cursor = bottom - 2.0;
        true
    }
}

fn rgb((r, g, b): (u8, u8, u8)) -> Color {
    Color::Rgb(Rgb::new(
        r as f32 / 255.0,
        g as f32 / 255.0,
        b as f32 / 255.0,
        None,
    ))
}
