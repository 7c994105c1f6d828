//! Typed content blocks and the paginated document renderer.
//!
//! The assembler produces an ordered list of [`Block`]s; rendering to a
//! binary document goes through the [`DocumentRenderer`] seam with a
//! header/footer callback invoked per page. The built-in renderer writes
//! a minimal self-contained PDF: Helvetica text, DCT-encoded chart
//! images, one content stream per page.

use std::path::PathBuf;

use image::codecs::jpeg::JpegEncoder;
use image::GenericImageView;
use tracing::warn;

use crate::error::{PipelineError, Result};

#[derive(Debug, Clone)]
pub enum Block {
    /// Section heading; level 1-3 selects the visual style.
    Heading { text: String, level: u8 },
    Paragraph(String),
    /// Pre-formatted table-of-contents line; level selects the style.
    TocLine { text: String, level: u8 },
    /// Chart image, scaled to the content width.
    Image(PathBuf),
    Caption(String),
    /// Vertical gap in points.
    Spacer(f32),
    PageBreak,
}

/// Per-page chrome supplied by the caller.
#[derive(Debug, Clone)]
pub struct PageDecoration {
    pub header: String,
    pub footer: String,
}

pub trait DocumentRenderer {
    /// Render blocks into a single paginated binary document. `decorate`
    /// is invoked once per physical page with its 1-based number.
    fn render(
        &self,
        blocks: &[Block],
        decorate: &dyn Fn(u32) -> PageDecoration,
    ) -> Result<Vec<u8>>;
}

const PAGE_W: f32 = 595.28; // A4
const PAGE_H: f32 = 841.89;
const MARGIN: f32 = 50.0;
const HEADER_SPACE: f32 = 30.0;
const FOOTER_SPACE: f32 = 30.0;
const CONTENT_W: f32 = PAGE_W - 2.0 * MARGIN;
const MAX_IMAGE_H: f32 = 320.0;

#[derive(Debug, Default)]
pub struct PdfRenderer;

enum Draw {
    Text { x: f32, y: f32, bold: bool, size: f32, text: String },
    Line { x1: f32, y1: f32, x2: f32, y2: f32 },
    Image { index: usize, x: f32, y: f32, w: f32, h: f32 },
}

struct JpegImage {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl DocumentRenderer for PdfRenderer {
    fn render(
        &self,
        blocks: &[Block],
        decorate: &dyn Fn(u32) -> PageDecoration,
    ) -> Result<Vec<u8>> {
        let (pages, images) = layout(blocks);
        if pages.iter().all(|p| p.is_empty()) {
            return Err(PipelineError::Report("document has no content".into()));
        }
        Ok(serialize(pages, images, decorate))
    }
}

/// Flow blocks into pages of draw commands.
fn layout(blocks: &[Block]) -> (Vec<Vec<Draw>>, Vec<JpegImage>) {
    let top = PAGE_H - MARGIN - HEADER_SPACE;
    let bottom = MARGIN + FOOTER_SPACE;

    let mut pages: Vec<Vec<Draw>> = Vec::new();
    let mut images: Vec<JpegImage> = Vec::new();
    let mut page: Vec<Draw> = Vec::new();
    let mut y = top;

    macro_rules! break_page {
        () => {{
            pages.push(std::mem::take(&mut page));
            y = top;
        }};
    }

    for block in blocks {
        match block {
            Block::PageBreak => break_page!(),
            Block::Spacer(h) => {
                y -= h;
                if y < bottom {
                    break_page!();
                }
            }
            Block::Heading { text, level } => {
                let (size, gap) = match level {
                    1 => (20.0, 14.0),
                    2 => (14.0, 10.0),
                    _ => (12.0, 8.0),
                };
                flow_text(text, size, true, gap, &mut page, &mut pages, &mut y, top, bottom);
            }
            Block::Paragraph(text) => {
                flow_text(text, 10.0, false, 6.0, &mut page, &mut pages, &mut y, top, bottom);
            }
            Block::TocLine { text, level } => {
                // Three visual styles by nesting level.
                let (size, bold) = match level {
                    1 => (11.0, true),
                    2 => (10.0, false),
                    _ => (9.0, false),
                };
                flow_text(text, size, bold, 2.0, &mut page, &mut pages, &mut y, top, bottom);
            }
            Block::Caption(text) => {
                flow_text(text, 9.0, false, 10.0, &mut page, &mut pages, &mut y, top, bottom);
            }
            Block::Image(path) => {
                let Some(jpeg) = load_as_jpeg(path) else {
                    warn!(path = %path.display(), "chart image unreadable, skipping embed");
                    continue;
                };
                let scale = (CONTENT_W / jpeg.width as f32)
                    .min(MAX_IMAGE_H / jpeg.height as f32)
                    .min(1.5);
                let w = jpeg.width as f32 * scale;
                let h = jpeg.height as f32 * scale;
                if y - h < bottom {
                    break_page!();
                }
                y -= h;
                images.push(jpeg);
                page.push(Draw::Image { index: images.len() - 1, x: MARGIN, y, w, h });
                y -= 8.0;
            }
        }
    }
    if !page.is_empty() || pages.is_empty() {
        pages.push(page);
    }
    (pages, images)
}

#[allow(clippy::too_many_arguments)]
fn flow_text(
    text: &str,
    size: f32,
    bold: bool,
    gap_after: f32,
    page: &mut Vec<Draw>,
    pages: &mut Vec<Vec<Draw>>,
    y: &mut f32,
    top: f32,
    bottom: f32,
) {
    let line_height = size * 1.35;
    for line in wrap(text, size) {
        if *y - line_height < bottom {
            pages.push(std::mem::take(page));
            *y = top;
        }
        *y -= line_height;
        page.push(Draw::Text { x: MARGIN, y: *y, bold, size, text: line });
    }
    *y -= gap_after;
}

/// Greedy word wrap with an approximate average glyph width.
fn wrap(text: &str, size: f32) -> Vec<String> {
    let max_chars = ((CONTENT_W / (size * 0.5)) as usize).max(8);
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if !current.is_empty() && current.chars().count() + 1 + word.chars().count() > max_chars {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

fn load_as_jpeg(path: &std::path::Path) -> Option<JpegImage> {
    let bytes = std::fs::read(path).ok()?;
    let img = image::load_from_memory(&bytes).ok()?;
    let (width, height) = img.dimensions();
    let rgb = img.to_rgb8();
    let mut data = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut data, 80);
    rgb.write_with_encoder(encoder).ok()?;
    Some(JpegImage { data, width, height })
}

/// Assemble the PDF object graph: catalog, page tree, two standard
/// fonts, image XObjects, then a content stream and page object per page.
fn serialize(
    pages: Vec<Vec<Draw>>,
    images: Vec<JpegImage>,
    decorate: &dyn Fn(u32) -> PageDecoration,
) -> Vec<u8> {
    let font_regular = 3usize;
    let font_bold = 4usize;
    let first_image_obj = 5usize;
    let first_page_obj = first_image_obj + images.len();
    let page_count = pages.len();
    let total_objects = first_page_obj + 2 * page_count - 1;

    let mut buf: Vec<u8> = Vec::new();
    let mut offsets: Vec<usize> = vec![0; total_objects + 1];
    buf.extend_from_slice(b"%PDF-1.4\n");

    let mut start_obj = |buf: &mut Vec<u8>, offsets: &mut Vec<usize>, id: usize| {
        offsets[id] = buf.len();
        buf.extend_from_slice(format!("{} 0 obj\n", id).as_bytes());
    };

    start_obj(&mut buf, &mut offsets, 1);
    buf.extend_from_slice(b"<< /Type /Catalog /Pages 2 0 R >>\nendobj\n");

    let kids: Vec<String> =
        (0..page_count).map(|i| format!("{} 0 R", first_page_obj + 2 * i + 1)).collect();
    start_obj(&mut buf, &mut offsets, 2);
    buf.extend_from_slice(
        format!("<< /Type /Pages /Kids [{}] /Count {} >>\nendobj\n", kids.join(" "), page_count)
            .as_bytes(),
    );

    start_obj(&mut buf, &mut offsets, font_regular);
    buf.extend_from_slice(
        b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>\nendobj\n",
    );
    start_obj(&mut buf, &mut offsets, font_bold);
    buf.extend_from_slice(
        b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica-Bold >>\nendobj\n",
    );

    for (i, img) in images.iter().enumerate() {
        start_obj(&mut buf, &mut offsets, first_image_obj + i);
        buf.extend_from_slice(
            format!(
                "<< /Type /XObject /Subtype /Image /Width {} /Height {} /ColorSpace /DeviceRGB /BitsPerComponent 8 /Filter /DCTDecode /Length {} >>\nstream\n",
                img.width,
                img.height,
                img.data.len()
            )
            .as_bytes(),
        );
        buf.extend_from_slice(&img.data);
        buf.extend_from_slice(b"\nendstream\nendobj\n");
    }

    let xobject_dict: String = (0..images.len())
        .map(|i| format!("/Im{} {} 0 R", i, first_image_obj + i))
        .collect::<Vec<_>>()
        .join(" ");

    for (pi, draws) in pages.iter().enumerate() {
        let page_no = (pi + 1) as u32;
        let mut content = String::new();
        for draw in draws {
            emit_draw(&mut content, draw);
        }
        emit_decoration(&mut content, &decorate(page_no));

        let content_id = first_page_obj + 2 * pi;
        let page_id = content_id + 1;
        let stream = latin1(&content);

        start_obj(&mut buf, &mut offsets, content_id);
        buf.extend_from_slice(format!("<< /Length {} >>\nstream\n", stream.len()).as_bytes());
        buf.extend_from_slice(&stream);
        buf.extend_from_slice(b"\nendstream\nendobj\n");

        start_obj(&mut buf, &mut offsets, page_id);
        buf.extend_from_slice(
            format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {:.2} {:.2}] /Resources << /Font << /F1 {} 0 R /F2 {} 0 R >> /XObject << {} >> >> /Contents {} 0 R >>\nendobj\n",
                PAGE_W, PAGE_H, font_regular, font_bold, xobject_dict, content_id
            )
            .as_bytes(),
        );
    }

    let xref_start = buf.len();
    buf.extend_from_slice(format!("xref\n0 {}\n", total_objects + 1).as_bytes());
    buf.extend_from_slice(b"0000000000 65535 f \n");
    for id in 1..=total_objects {
        buf.extend_from_slice(format!("{:010} 00000 n \n", offsets[id]).as_bytes());
    }
    buf.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            total_objects + 1,
            xref_start
        )
        .as_bytes(),
    );
    buf
}

fn emit_draw(content: &mut String, draw: &Draw) {
    match draw {
        Draw::Text { x, y, bold, size, text } => {
            let font = if *bold { "F2" } else { "F1" };
            content.push_str(&format!(
                "BT /{} {:.1} Tf {:.2} {:.2} Td ({}) Tj ET\n",
                font,
                size,
                x,
                y,
                escape_text(text)
            ));
        }
        Draw::Line { x1, y1, x2, y2 } => {
            content.push_str(&format!("{:.2} {:.2} m {:.2} {:.2} l S\n", x1, y1, x2, y2));
        }
        Draw::Image { index, x, y, w, h } => {
            content.push_str(&format!(
                "q {:.2} 0 0 {:.2} {:.2} {:.2} cm /Im{} Do Q\n",
                w, h, x, y, index
            ));
        }
    }
}

fn emit_decoration(content: &mut String, deco: &PageDecoration) {
    if !deco.header.is_empty() {
        emit_draw(
            content,
            &Draw::Text {
                x: MARGIN,
                y: PAGE_H - 40.0,
                bold: false,
                size: 9.0,
                text: deco.header.clone(),
            },
        );
        emit_draw(
            content,
            &Draw::Line { x1: MARGIN, y1: PAGE_H - 45.0, x2: PAGE_W - MARGIN, y2: PAGE_H - 45.0 },
        );
    }
    if !deco.footer.is_empty() {
        emit_draw(
            content,
            &Draw::Text {
                x: PAGE_W / 2.0 - 20.0,
                y: 30.0,
                bold: false,
                size: 9.0,
                text: deco.footer.clone(),
            },
        );
        emit_draw(content, &Draw::Line { x1: MARGIN, y1: 50.0, x2: PAGE_W - MARGIN, y2: 50.0 });
    }
}

/// PDF string escaping; glyphs outside Latin-1 degrade to '?'.
fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '(' => out.push_str("\\("),
            ')' => out.push_str("\\)"),
            '\\' => out.push_str("\\\\"),
            c if (c as u32) < 256 => out.push(c),
            _ => out.push('?'),
        }
    }
    out
}

fn latin1(text: &str) -> Vec<u8> {
    text.chars().map(|c| if (c as u32) < 256 { c as u8 } else { b'?' }).collect()
}
