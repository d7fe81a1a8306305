//! Raster rendering: [`DrawingDescription`] → 1200×800 PNG schematic.
//!
//! Rendering is split in two phases. [`plan`] turns the drawing into a flat
//! list of [`DrawOp`]s using integer pixel geometry; [`paint`] executes them
//! on an `RgbImage` with `imageproc`. Planning is pure, so the geometry can
//! be tested without decoding pixels, and a layout that cannot be planned is
//! dropped as a whole before anything is painted.
//!
//! ## Layout
//!
//! ```text
//! y=20   title
//! y=55   divider
//! y=70…  environment / format / elements / analysis status
//! y=160  drawing frame 1100×500 (170 when a vision confidence is shown)
//!        ├─ AI-guided: percentage boxes over the whole frame
//!        └─ template : per-format recipe in the frame inset by 100/50 px
//!        cutouts line, warning box, footer at y=775
//! ```
//!
//! ## Why spawn_blocking?
//!
//! Painting a 1200×800 canvas and PNG-encoding it is CPU-bound work;
//! [`render_drawing`] moves it off the async worker threads.

use crate::analysis::VisionAnalysis;
use crate::error::MarmoError;
use crate::model::{active_tags, prefix_chars, DrawingDescription, LayoutFormat};
use crate::pipeline::encode::encode_png;
use ab_glyph::{FontVec, PxScale};
use chrono::{DateTime, Local};
use image::{Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_circle_mut, draw_hollow_rect_mut,
    draw_line_segment_mut, draw_polygon_mut, draw_text_mut,
};
use imageproc::point::Point;
use imageproc::rect::Rect;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const CANVAS_WIDTH: u32 = 1200;
pub const CANVAS_HEIGHT: u32 = 800;

const FRAME_X: i32 = 50;
const FRAME_WIDTH: i32 = 1100;
const FRAME_HEIGHT: i32 = 500;
const FRAME_TOP_WITH_ANALYSIS: i32 = 170;
const FRAME_TOP_FORM_ONLY: i32 = 160;
const GRID_SPACING: i32 = 50;
const MARGIN_X: i32 = 100;
const MARGIN_Y: i32 = 50;

/// Largest pixel offset accepted from a percentage coordinate.
const MAX_LAYOUT_OFFSET: f64 = 100_000.0;

mod palette {
    use image::Rgb;

    pub const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
    pub const PRIMARY: Rgb<u8> = Rgb([70, 100, 90]);
    pub const SECONDARY: Rgb<u8> = Rgb([120, 160, 140]);
    pub const TEXT: Rgb<u8> = Rgb([30, 30, 30]);
    pub const TITLE: Rgb<u8> = Rgb([50, 50, 50]);
    pub const GRID: Rgb<u8> = Rgb([240, 240, 240]);
    pub const CUTOUT: Rgb<u8> = Rgb([200, 50, 50]);
    pub const FRAME_FILL: Rgb<u8> = Rgb([250, 250, 250]);
    pub const STONE_FILL: Rgb<u8> = Rgb([200, 220, 210]);
    pub const CUTOUT_FILL: Rgb<u8> = Rgb([255, 220, 220]);
    pub const AI_CUTOUT_FILL: Rgb<u8> = Rgb([255, 200, 200]);
    pub const WARNING_FILL: Rgb<u8> = Rgb([255, 245, 240]);
    pub const MUTED: Rgb<u8> = Rgb([150, 150, 150]);
    pub const FOOTER: Rgb<u8> = Rgb([180, 180, 180]);
}

mod text_size {
    pub const TITLE: f32 = 24.0;
    pub const SUBTITLE: f32 = 16.0;
    pub const BODY: f32 = 12.0;
    pub const NOTE: f32 = 10.0;
}

/// Everything the renderer needs, owned so it can cross into `spawn_blocking`.
#[derive(Debug, Clone)]
pub struct RenderJob {
    pub drawing: DrawingDescription,
    /// Raw layout code from the form (`reto`, `l`, …); selects the template.
    pub format_code: String,
    pub session_id: String,
    pub generated_at: DateTime<Local>,
}

/// One primitive in canvas pixel coordinates. Rectangle corners and circle
/// radii are inclusive, outlines grow inwards from the edge.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    Rect {
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
        fill: Option<Rgb<u8>>,
        outline: Rgb<u8>,
        width: i32,
    },
    Line {
        from: (i32, i32),
        to: (i32, i32),
        color: Rgb<u8>,
        width: i32,
    },
    Circle {
        center: (i32, i32),
        radius: i32,
        fill: Option<Rgb<u8>>,
        outline: Rgb<u8>,
        width: i32,
    },
    Polygon {
        points: Vec<(i32, i32)>,
        fill: Option<Rgb<u8>>,
        outline: Rgb<u8>,
        width: i32,
    },
    Text {
        x: i32,
        y: i32,
        text: String,
        color: Rgb<u8>,
        size: f32,
    },
}

fn rect(x1: i32, y1: i32, x2: i32, y2: i32, fill: Option<Rgb<u8>>, outline: Rgb<u8>, width: i32) -> DrawOp {
    DrawOp::Rect { x1, y1, x2, y2, fill, outline, width }
}

fn line(from: (i32, i32), to: (i32, i32), color: Rgb<u8>, width: i32) -> DrawOp {
    DrawOp::Line { from, to, color, width }
}

fn text(x: i32, y: i32, s: impl Into<String>, color: Rgb<u8>, size: f32) -> DrawOp {
    DrawOp::Text { x, y, text: s.into(), color, size }
}

/// The drawing frame in canvas pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Frame {
    fn right(&self) -> i32 {
        self.x + self.width
    }

    fn bottom(&self) -> i32 {
        self.y + self.height
    }

    fn inset(&self, dx: i32, dy: i32) -> Frame {
        Frame {
            x: self.x + dx,
            y: self.y + dy,
            width: self.width - 2 * dx,
            height: self.height - 2 * dy,
        }
    }
}

// ── Entry points ─────────────────────────────────────────────────────────

/// Render on the blocking pool.
pub async fn render_drawing(job: RenderJob, font: Option<Arc<FontVec>>) -> Result<Vec<u8>, MarmoError> {
    tokio::task::spawn_blocking(move || render_blocking(&job, font.as_deref()))
        .await
        .map_err(|e| MarmoError::Internal(format!("Render task panicked: {e}")))?
}

/// Plan, paint and PNG-encode a drawing.
pub fn render_blocking(job: &RenderJob, font: Option<&FontVec>) -> Result<Vec<u8>, MarmoError> {
    let ops = plan(job);
    let mut canvas = RgbImage::from_pixel(CANVAS_WIDTH, CANVAS_HEIGHT, palette::WHITE);
    paint(&mut canvas, &ops, font);
    let png = encode_png(canvas).map_err(|e| MarmoError::RenderFailed(e.to_string()))?;
    debug!("Rendered {} draw ops → {} bytes PNG", ops.len(), png.len());
    Ok(png)
}

/// Plain white canvas, used when a render fails.
pub fn blank_canvas_png() -> Result<Vec<u8>, MarmoError> {
    let canvas = RgbImage::from_pixel(CANVAS_WIDTH, CANVAS_HEIGHT, palette::WHITE);
    encode_png(canvas).map_err(|e| MarmoError::RenderFailed(e.to_string()))
}

// ── Planning ─────────────────────────────────────────────────────────────

/// Turn a drawing into draw operations.
pub fn plan(job: &RenderJob) -> Vec<DrawOp> {
    let drawing = &job.drawing;
    let analysis = drawing.ai_analysis.as_ref();
    let mut ops = Vec::new();

    let frame_top = plan_header(&mut ops, drawing, analysis);
    let frame = Frame {
        x: FRAME_X,
        y: frame_top,
        width: FRAME_WIDTH,
        height: FRAME_HEIGHT,
    };
    plan_frame(&mut ops, frame);

    match analysis.filter(|a| a.stone_layout.is_some()) {
        Some(analysis) => match plan_ai_layout(analysis, frame) {
            Ok(layout) => ops.extend(layout),
            Err(e) => warn!("Discarding AI-guided layout, frame left empty: {e}"),
        },
        None => {
            let area = frame.inset(MARGIN_X, MARGIN_Y);
            plan_template(&mut ops, LayoutFormat::from_code(&job.format_code), area);
            plan_elements(&mut ops, &drawing.elements, area);
            plan_cutouts(&mut ops, &drawing.cutouts, area);
        }
    }

    plan_footer(&mut ops, job, frame);
    ops
}

/// Header block. Returns the frame's top edge.
fn plan_header(ops: &mut Vec<DrawOp>, drawing: &DrawingDescription, analysis: Option<&VisionAnalysis>) -> i32 {
    ops.push(text(30, 20, "MARMOVIEW - DESENHO CONCEITUAL", palette::TITLE, text_size::TITLE));
    ops.push(line((30, 55), (1170, 55), palette::GRID, 2));
    ops.push(text(
        30,
        70,
        format!("Ambiente: {}", drawing.environment.to_uppercase()),
        palette::TEXT,
        text_size::SUBTITLE,
    ));
    ops.push(text(
        30,
        95,
        format!("Configuração: {}", drawing.format),
        palette::TEXT,
        text_size::BODY,
    ));

    let elements = active_tags(&drawing.elements);
    if !elements.is_empty() {
        ops.push(text(
            30,
            115,
            format!("Elementos: {}", capitalized_list(elements)),
            palette::SECONDARY,
            text_size::BODY,
        ));
    }

    match analysis.and_then(VisionAnalysis::confidence_label) {
        Some(confidence) => {
            ops.push(text(
                30,
                135,
                format!("✓ Análise IA aplicada - Confiança: {confidence}%"),
                palette::PRIMARY,
                text_size::BODY,
            ));
            FRAME_TOP_WITH_ANALYSIS
        }
        None => {
            ops.push(text(
                30,
                135,
                "⚠ Desenho baseado em formulário (sem análise de IA)",
                palette::MUTED,
                text_size::NOTE,
            ));
            FRAME_TOP_FORM_ONLY
        }
    }
}

fn plan_frame(ops: &mut Vec<DrawOp>, f: Frame) {
    ops.push(rect(f.x, f.y, f.right(), f.bottom(), Some(palette::FRAME_FILL), palette::TITLE, 2));
    for dx in (0..f.width).step_by(GRID_SPACING as usize) {
        ops.push(line((f.x + dx, f.y), (f.x + dx, f.bottom()), palette::GRID, 1));
    }
    for dy in (0..f.height).step_by(GRID_SPACING as usize) {
        ops.push(line((f.x, f.y + dy), (f.right(), f.y + dy), palette::GRID, 1));
    }
}

#[derive(Debug, Error)]
#[error("percentage {value} does not map onto the canvas")]
struct LayoutError {
    value: f64,
}

/// `origin + trunc(percent / 100 × extent)`.
fn map_percent(origin: i32, percent: f64, extent: i32) -> Result<i32, LayoutError> {
    let offset = (percent / 100.0 * f64::from(extent)).trunc();
    if !offset.is_finite() || offset.abs() > MAX_LAYOUT_OFFSET {
        return Err(LayoutError { value: percent });
    }
    Ok(origin + offset as i32)
}

/// Element boxes and cutouts positioned by the vision model over the whole
/// frame. Any unmappable coordinate rejects the entire layout.
fn plan_ai_layout(analysis: &VisionAnalysis, f: Frame) -> Result<Vec<DrawOp>, LayoutError> {
    let mut ops = Vec::new();

    let positions = analysis
        .stone_layout
        .as_ref()
        .map(|l| l.positions.as_slice())
        .unwrap_or_default();
    for pos in positions {
        let x1 = map_percent(f.x, pos.x_start(), f.width)?;
        let x2 = map_percent(f.x, pos.x_end(), f.width)?;
        let y1 = map_percent(f.y, pos.y_start(), f.height)?;
        let y2 = map_percent(f.y, pos.y_end(), f.height)?;

        ops.push(rect(x1, y1, x2, y2, Some(palette::STONE_FILL), palette::PRIMARY, 4));
        let label_y = if y1 > f.y + 30 { y1 - 20 } else { y1 + 5 };
        ops.push(text(
            x1 + 10,
            label_y,
            pos.element_name().to_uppercase(),
            palette::PRIMARY,
            text_size::BODY,
        ));
    }

    for cutout in &analysis.cutouts_positions {
        let cx = map_percent(f.x, cutout.x(), f.width)?;
        let cy = map_percent(f.y, cutout.y(), f.height)?;
        let radius = cutout.radius();
        ops.push(DrawOp::Circle {
            center: (cx, cy),
            radius,
            fill: Some(palette::AI_CUTOUT_FILL),
            outline: palette::CUTOUT,
            width: 3,
        });
        ops.push(text(
            cx + radius + 5,
            cy - 10,
            prefix_chars(cutout.kind_name(), 3).to_uppercase(),
            palette::CUTOUT,
            text_size::BODY,
        ));
    }

    if !analysis.drawing_instructions.is_empty() {
        let caption = instruction_caption(&analysis.drawing_instructions);
        ops.push(text(f.x, f.bottom() + 10, format!("ℹ {caption}"), palette::PRIMARY, text_size::BODY));
    }

    Ok(ops)
}

/// First two instructions joined with ` | `, at most 100 characters.
fn instruction_caption(instructions: &[String]) -> String {
    let joined = instructions
        .iter()
        .take(2)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" | ");
    if joined.chars().count() > 100 {
        format!("{}...", prefix_chars(&joined, 97))
    } else {
        joined
    }
}

fn scaled(value: i32, ratio: f64) -> i32 {
    (f64::from(value) * ratio) as i32
}

/// Countertop geometry for a layout code inside the inset drawing area.
fn plan_template(ops: &mut Vec<DrawOp>, format: Option<LayoutFormat>, a: Frame) {
    let fill = Some(palette::SECONDARY);
    let stroke = palette::PRIMARY;
    let label = palette::TITLE;
    let size = text_size::BODY;
    let (bx, by, w, h) = (a.x, a.y, a.width, a.height);

    match format {
        Some(LayoutFormat::Linear) => {
            let rw = scaled(w, 0.8);
            let rh = scaled(h, 0.25);
            let x = bx + (w - rw) / 2;
            let y = by + h / 3;
            ops.push(rect(x, y, x + rw, y + rh, fill, stroke, 4));
            ops.push(text(x + 10, y + 10, "BANCADA", label, size));
            ops.push(line((bx, y - 20), (bx + w, y - 20), label, 3));
            ops.push(text(bx + 10, y - 35, "PAREDE", palette::MUTED, size));
        }
        Some(LayoutFormat::LShape) => {
            let (w1, h1) = (scaled(w, 0.6), scaled(h, 0.2));
            let (x1, y1) = (bx + 50, by + 50);
            ops.push(rect(x1, y1, x1 + w1, y1 + h1, fill, stroke, 4));
            ops.push(text(x1 + 10, y1 + 10, "BANCADA 1", label, size));

            let (w2, h2) = (scaled(h, 0.2), scaled(h, 0.5));
            let (x2, y2) = (x1, y1 + h1);
            ops.push(rect(x2, y2, x2 + w2, y2 + h2, fill, stroke, 4));
            ops.push(text(x2 + 10, y2 + 20, "BANCADA 2", label, size));

            ops.push(line((bx, y1 - 15), (bx + w, y1 - 15), label, 2));
            ops.push(line((x2 - 15, y1), (x2 - 15, by + h), label, 2));
        }
        Some(LayoutFormat::UShape) => {
            let thickness = scaled(h, 0.18);
            let (x1, y1) = (bx + 50, by + 40);
            let side_h = scaled(h, 0.7);
            ops.push(rect(x1, y1, x1 + thickness, y1 + side_h, fill, stroke, 4));
            ops.push(text(x1 + 5, y1 + 20, "BANC.\nLAT.", label, size));

            let back_w = scaled(w, 0.7);
            ops.push(rect(x1, y1, x1 + back_w, y1 + thickness, fill, stroke, 4));
            ops.push(text(x1 + back_w / 2 - 30, y1 + 10, "BANCADA FUNDO", label, size));

            let x3 = x1 + back_w - thickness;
            ops.push(rect(x3, y1, x3 + thickness, y1 + side_h, fill, stroke, 4));
            ops.push(text(x3 + 5, y1 + 20, "BANC.\nLAT.", label, size));
        }
        Some(LayoutFormat::Island) => {
            let (iw, ih) = (scaled(w, 0.4), scaled(h, 0.35));
            let (ix, iy) = (bx + (w - iw) / 2, by + (h - ih) / 2);
            ops.push(rect(ix, iy, ix + iw, iy + ih, fill, stroke, 5));
            ops.push(text(ix + iw / 2 - 20, iy + ih / 2, "ILHA", label, size));

            let (ww, wh) = (scaled(w, 0.6), scaled(h, 0.15));
            let (wx, wy) = (bx + (w - ww) / 2, by + 30);
            ops.push(rect(wx, wy, wx + ww, wy + wh, Some(palette::STONE_FILL), palette::SECONDARY, 3));
            ops.push(text(wx + 10, wy + 5, "BANCADA PAREDE", label, size));
        }
        Some(LayoutFormat::Peninsula) => {
            let (w1, h1) = (scaled(w, 0.7), scaled(h, 0.2));
            let (x1, y1) = (bx + 40, by + 40);
            ops.push(rect(x1, y1, x1 + w1, y1 + h1, fill, stroke, 4));
            ops.push(text(x1 + 10, y1 + 10, "BANCADA PRINCIPAL", label, size));

            let (w2, h2) = (scaled(h, 0.25), scaled(h, 0.45));
            let (x2, y2) = (x1 + w1 - w2, y1 + h1);
            ops.push(rect(x2, y2, x2 + w2, y2 + h2, fill, stroke, 4));
            ops.push(text(x2 + 10, y2 + 20, "PENÍNSULA", label, size));
        }
        Some(LayoutFormat::Irregular) | Some(LayoutFormat::Other) | None => {
            ops.push(DrawOp::Polygon {
                points: vec![
                    (bx + 100, by + 80),
                    (bx + w - 150, by + 50),
                    (bx + w - 100, by + h - 150),
                    (bx + w - 250, by + h - 80),
                    (bx + 80, by + h - 100),
                ],
                fill,
                outline: stroke,
                width: 4,
            });
            ops.push(text(bx + w / 2 - 50, by + h / 2, "FORMATO IRREGULAR", label, size));
        }
    }
}

/// Relative marker position for a known element tag.
fn element_anchor(tag: &str) -> Option<(f64, f64)> {
    Some(match tag {
        "bancada" => (0.3, 0.3),
        "pia" => (0.5, 0.4),
        "cooktop" => (0.6, 0.35),
        "mesa" => (0.4, 0.6),
        "soleira" => (0.7, 0.2),
        _ => return None,
    })
}

fn plan_elements(ops: &mut Vec<DrawOp>, elements: &[String], a: Frame) {
    for tag in active_tags(elements).iter().take(4) {
        let Some((rx, ry)) = element_anchor(tag) else {
            continue;
        };
        let x = a.x + scaled(a.width, rx);
        let y = a.y + scaled(a.height, ry);
        ops.push(DrawOp::Circle {
            center: (x, y),
            radius: 25,
            fill: None,
            outline: palette::SECONDARY,
            width: 3,
        });
        ops.push(text(
            x - 20,
            y - 5,
            prefix_chars(tag, 3).to_uppercase(),
            palette::SECONDARY,
            text_size::NOTE,
        ));
    }
}

/// Cutout markers spaced evenly along a band at 40% of the area height.
fn plan_cutouts(ops: &mut Vec<DrawOp>, cutouts: &[String], a: Frame) {
    let cutouts = active_tags(cutouts);
    if cutouts.is_empty() {
        return;
    }
    let spacing = a.width / (cutouts.len() as i32 + 1);
    let y = a.y + scaled(a.height, 0.4);

    for (i, cutout) in cutouts.iter().take(5).enumerate() {
        let x = a.x + spacing * (i as i32 + 1);
        ops.push(DrawOp::Circle {
            center: (x, y),
            radius: 20,
            fill: Some(palette::CUTOUT_FILL),
            outline: palette::CUTOUT,
            width: 3,
        });
        if cutout != "nenhum" {
            ops.push(text(
                x - 15,
                y - 8,
                prefix_chars(cutout, 4).to_uppercase(),
                palette::CUTOUT,
                text_size::NOTE,
            ));
        }
    }
}

fn plan_footer(ops: &mut Vec<DrawOp>, job: &RenderJob, f: Frame) {
    let mut y = f.bottom() + 20;

    let cutouts = active_tags(&job.drawing.cutouts);
    if !cutouts.is_empty() {
        ops.push(text(
            f.x,
            y,
            format!("Recortes previstos: {}", capitalized_list(cutouts)),
            palette::CUTOUT,
            text_size::BODY,
        ));
        y += 20;
    }

    y += 10;
    ops.push(rect(f.x, y, f.right(), y + 60, Some(palette::WARNING_FILL), palette::CUTOUT, 2));
    y += 10;
    ops.push(text(
        f.x + 20,
        y,
        "⚠ IMPORTANTE - DESENHO CONCEITUAL",
        palette::CUTOUT,
        text_size::SUBTITLE,
    ));
    y += 25;
    ops.push(text(
        f.x + 20,
        y,
        "• Não utilizar para fabricação • Requer medição precisa em campo • Sem escala exata",
        palette::TEXT,
        text_size::NOTE,
    ));

    ops.push(text(
        30,
        775,
        format!(
            "MarmoView v1.0 - Gerado em {}",
            job.generated_at.format("%d/%m/%Y %H:%M")
        ),
        palette::FOOTER,
        text_size::NOTE,
    ));
    ops.push(text(
        900,
        775,
        format!("Sessão: {}", prefix_chars(&job.session_id, 12)),
        palette::FOOTER,
        text_size::NOTE,
    ));
}

/// First five tags, each capitalised, joined with `, `.
fn capitalized_list(tags: &[String]) -> String {
    tags.iter()
        .take(5)
        .map(|t| capitalize(t))
        .collect::<Vec<_>>()
        .join(", ")
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

// ── Painting ─────────────────────────────────────────────────────────────

/// Execute draw operations in order. Text is skipped when no font is loaded.
pub fn paint(canvas: &mut RgbImage, ops: &[DrawOp], font: Option<&FontVec>) {
    for op in ops {
        match op {
            DrawOp::Rect { x1, y1, x2, y2, fill, outline, width } => {
                paint_rect(canvas, (*x1, *y1, *x2, *y2), *fill, *outline, *width)
            }
            DrawOp::Line { from, to, color, width } => paint_line(canvas, *from, *to, *color, *width),
            DrawOp::Circle { center, radius, fill, outline, width } => {
                if *radius <= 0 {
                    continue;
                }
                if let Some(fill) = fill {
                    draw_filled_circle_mut(canvas, *center, *radius, *fill);
                }
                for k in 0..(*width).max(1).min(*radius) {
                    draw_hollow_circle_mut(canvas, *center, radius - k, *outline);
                }
            }
            DrawOp::Polygon { points, fill, outline, width } => {
                paint_polygon(canvas, points, *fill, *outline, *width)
            }
            DrawOp::Text { x, y, text, color, size } => {
                if let Some(font) = font {
                    let line_height = (size * 1.2) as i32;
                    for (i, row) in text.lines().enumerate() {
                        draw_text_mut(canvas, *color, *x, y + line_height * i as i32, PxScale::from(*size), font, row);
                    }
                }
            }
        }
    }
}

fn paint_rect(canvas: &mut RgbImage, (x1, y1, x2, y2): (i32, i32, i32, i32), fill: Option<Rgb<u8>>, outline: Rgb<u8>, width: i32) {
    let (left, right) = (x1.min(x2), x1.max(x2));
    let (top, bottom) = (y1.min(y2), y1.max(y2));
    let (w, h) = (right - left + 1, bottom - top + 1);

    if let Some(fill) = fill {
        draw_filled_rect_mut(canvas, Rect::at(left, top).of_size(w as u32, h as u32), fill);
    }
    for k in 0..width.max(1) {
        let (iw, ih) = (w - 2 * k, h - 2 * k);
        if iw <= 0 || ih <= 0 {
            break;
        }
        draw_hollow_rect_mut(canvas, Rect::at(left + k, top + k).of_size(iw as u32, ih as u32), outline);
    }
}

/// Square-brush thick line: the segment is repeated at every offset of a
/// `width`×`width` brush.
fn paint_line(canvas: &mut RgbImage, from: (i32, i32), to: (i32, i32), color: Rgb<u8>, width: i32) {
    let width = width.max(1);
    let (lo, hi) = (-(width - 1) / 2, width / 2);
    for dx in lo..=hi {
        for dy in lo..=hi {
            draw_line_segment_mut(
                canvas,
                ((from.0 + dx) as f32, (from.1 + dy) as f32),
                ((to.0 + dx) as f32, (to.1 + dy) as f32),
                color,
            );
        }
    }
}

fn paint_polygon(canvas: &mut RgbImage, points: &[(i32, i32)], fill: Option<Rgb<u8>>, outline: Rgb<u8>, width: i32) {
    let mut pts: Vec<(i32, i32)> = points.to_vec();
    pts.dedup();
    if pts.len() > 1 && pts.first() == pts.last() {
        pts.pop();
    }
    if pts.len() < 3 {
        return;
    }
    if let Some(fill) = fill {
        let poly: Vec<Point<i32>> = pts.iter().map(|&(x, y)| Point::new(x, y)).collect();
        draw_polygon_mut(canvas, &poly, fill);
    }
    for (i, &start) in pts.iter().enumerate() {
        let end = pts[(i + 1) % pts.len()];
        paint_line(canvas, start, end, outline, width);
    }
}

// ── Fonts ────────────────────────────────────────────────────────────────

const FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/Library/Fonts/Arial.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Load the label font: `preferred` first, then common system locations.
pub fn load_font(preferred: Option<&Path>) -> Option<FontVec> {
    let candidates = preferred
        .into_iter()
        .map(Path::to_path_buf)
        .chain(FONT_CANDIDATES.iter().map(|p| Path::new(p).to_path_buf()));

    for path in candidates {
        let Ok(bytes) = std::fs::read(&path) else {
            continue;
        };
        match FontVec::try_from_vec(bytes) {
            Ok(font) => {
                info!("Drawing labels use font {}", path.display());
                return Some(font);
            }
            Err(e) => warn!("Ignoring font {}: {e}", path.display()),
        }
    }
    warn!("No TrueType font found; drawings will be rendered without labels");
    None
}
