//! PDF report: [`DrawingDescription`] → single A4 page.
//!
//! The page uses the two standard Type1 fonts Helvetica and Helvetica-Bold
//! with `WinAnsiEncoding`, so no font has to be embedded. Text is converted
//! to WinAnsi bytes by [`winansi`]; characters outside that code page are
//! written as `?`.
//!
//! Coordinates follow PDF conventions: points, origin bottom-left.

use crate::error::MarmoError;
use crate::model::{prefix_chars, DrawingDescription, SessionId};
use chrono::{DateTime, Local};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream, StringFormat};
use tracing::debug;

const PAGE_WIDTH: f32 = 595.28;
const PAGE_HEIGHT: f32 = 841.89;
const CM: f32 = 28.3465;

const REGULAR: &str = "F1";
const BOLD: &str = "F2";

const WARNING_RED: (f32, f32, f32) = (0.7, 0.0, 0.0);
const BLACK: (f32, f32, f32) = (0.0, 0.0, 0.0);

/// `marmoview_desenho_{first 8 chars of id}.pdf`
pub fn report_filename(id: &SessionId) -> String {
    format!("marmoview_desenho_{}.pdf", id.short(8))
}

/// Build the report and serialise it.
pub fn build_report(
    session_id: &SessionId,
    drawing: &DrawingDescription,
    generated_at: DateTime<Local>,
) -> Result<Vec<u8>, MarmoError> {
    let content = page_content(session_id, drawing, generated_at);
    let encoded = content
        .encode()
        .map_err(|e| MarmoError::PdfFailed(e.to_string()))?;

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let regular_id = doc.add_object(standard_font("Helvetica"));
    let bold_id = doc.add_object(standard_font("Helvetica-Bold"));
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            REGULAR => regular_id,
            BOLD => bold_id,
        },
    });
    let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
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

    let mut buf = Vec::new();
    doc.save_to(&mut buf)
        .map_err(|e| MarmoError::PdfFailed(e.to_string()))?;
    debug!("PDF report for {} → {} bytes", session_id.short(8), buf.len());
    Ok(buf)
}

fn standard_font(base: &str) -> lopdf::Dictionary {
    dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => Object::Name(base.as_bytes().to_vec()),
        "Encoding" => "WinAnsiEncoding",
    }
}

/// Page layout. Vertical positions are measured down from the top edge.
fn page_content(id: &SessionId, drawing: &DrawingDescription, generated_at: DateTime<Local>) -> Content {
    let mut page = PageWriter::default();
    let left = 2.0 * CM;
    let indent = 2.5 * CM;
    let top = PAGE_HEIGHT;

    // ── Header ───────────────────────────────────────────────────────────
    page.text(BOLD, 16.0, left, top - 2.0 * CM, "MARMOVIEW");
    page.text(REGULAR, 10.0, left, top - 2.5 * CM, &format!("Projeto: #{}", id.short(8)));
    page.text(
        REGULAR,
        10.0,
        left,
        top - 3.0 * CM,
        &format!("Data: {}", generated_at.format("%d/%m/%Y %H:%M")),
    );
    page.line(left, top - 3.5 * CM, PAGE_WIDTH - 2.0 * CM, top - 3.5 * CM);

    page.text(BOLD, 14.0, left, top - 4.5 * CM, &drawing.title);

    // ── Metadata ─────────────────────────────────────────────────────────
    let mut y = top - 5.5 * CM;
    page.text(REGULAR, 10.0, left, y, &format!("Ambiente: {}", drawing.environment));
    y -= 0.6 * CM;
    page.text(REGULAR, 10.0, left, y, &format!("Formato: {}", drawing.format));
    y -= 0.6 * CM;
    page.text(
        REGULAR,
        10.0,
        left,
        y,
        &format!("Elementos: {}", drawing.elements.join(", ")),
    );
    y -= 0.6 * CM;
    if !drawing.cutouts.is_empty() {
        page.text(
            REGULAR,
            10.0,
            left,
            y,
            &format!("Recortes: {}", drawing.cutouts.join(", ")),
        );
        y -= 0.6 * CM;
    }

    // ── Drawing placeholder ──────────────────────────────────────────────
    y -= 1.0 * CM;
    page.text(BOLD, 12.0, left, y, "Desenho Conceitual:");
    y -= 1.0 * CM;
    page.rect(left, y - 10.0 * CM, PAGE_WIDTH - 4.0 * CM, 10.0 * CM);
    let shapes = drawing
        .shapes
        .iter()
        .map(|s| s.description.as_str())
        .collect::<Vec<_>>()
        .join(" | ");
    page.text(REGULAR, 9.0, indent, y - 5.0 * CM, &shapes);

    // ── Characteristics ──────────────────────────────────────────────────
    y -= 11.0 * CM;
    page.text(BOLD, 10.0, left, y, "Características Observadas:");
    y -= 0.6 * CM;
    page.text(REGULAR, 9.0, indent, y, prefix_chars(&drawing.characteristics, 200));

    // ── Warnings ─────────────────────────────────────────────────────────
    y -= 2.0 * CM;
    page.fill_color(WARNING_RED);
    page.text(BOLD, 11.0, left, y, "AVISOS IMPORTANTES:");
    page.fill_color(BLACK);
    y -= 0.7 * CM;
    for note in &drawing.notes {
        page.text(REGULAR, 9.0, indent, y, &format!("• {note}"));
        y -= 0.5 * CM;
    }

    // ── Footer ───────────────────────────────────────────────────────────
    page.text(REGULAR, 8.0, left, 2.0 * CM, "MarmoView v1.0.0 - Sistema IA para Marmoraria");
    page.text(
        REGULAR,
        8.0,
        left,
        1.5 * CM,
        "\"Quem mede, manda.\" - Desenho requer validacao em campo.",
    );

    page.finish()
}

/// Accumulates content-stream operators.
#[derive(Default)]
struct PageWriter {
    ops: Vec<Operation>,
}

impl PageWriter {
    fn text(&mut self, font: &str, size: f32, x: f32, y: f32, s: &str) {
        self.ops.extend([
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![Object::Name(font.as_bytes().to_vec()), size.into()]),
            Operation::new("Td", vec![x.into(), y.into()]),
            Operation::new("Tj", vec![Object::String(winansi(s), StringFormat::Literal)]),
            Operation::new("ET", vec![]),
        ]);
    }

    fn line(&mut self, x1: f32, y1: f32, x2: f32, y2: f32) {
        self.ops.extend([
            Operation::new("m", vec![x1.into(), y1.into()]),
            Operation::new("l", vec![x2.into(), y2.into()]),
            Operation::new("S", vec![]),
        ]);
    }

    fn rect(&mut self, x: f32, y: f32, w: f32, h: f32) {
        self.ops.extend([
            Operation::new("re", vec![x.into(), y.into(), w.into(), h.into()]),
            Operation::new("S", vec![]),
        ]);
    }

    fn fill_color(&mut self, (r, g, b): (f32, f32, f32)) {
        self.ops
            .push(Operation::new("rg", vec![r.into(), g.into(), b.into()]));
    }

    fn finish(self) -> Content {
        Content {
            operations: self.ops,
        }
    }
}

/// Encode text for a `WinAnsiEncoding` font.
pub(crate) fn winansi(s: &str) -> Vec<u8> {
    s.chars()
        .map(|c| match c {
            '\u{20}'..='\u{7E}' | '\u{A0}'..='\u{FF}' => c as u32 as u8,
            '€' => 0x80,
            '…' => 0x85,
            '‘' => 0x91,
            '’' => 0x92,
            '“' => 0x93,
            '”' => 0x94,
            '•' => 0x95,
            '–' => 0x96,
            '—' => 0x97,
            _ => b'?',
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FormInput, Session};
    use crate::pipeline::compose::compose;

    fn drawing(cutouts: &[&str]) -> (SessionId, DrawingDescription) {
        let session = Session::new(
            SessionId::generate(),
            vec![],
            FormInput {
                env_type: "cozinha".into(),
                format: "l".into(),
                stone_elements: vec!["bancada".into(), "ilha".into()],
                cutouts: cutouts.iter().map(|s| s.to_string()).collect(),
                characteristics: "x".repeat(300),
                ..Default::default()
            },
        );
        let d = compose(&session, None);
        (session.id, d)
    }

    fn strings(content: &Content) -> Vec<Vec<u8>> {
        content
            .operations
            .iter()
            .filter(|op| op.operator == "Tj")
            .filter_map(|op| match op.operands.first() {
                Some(Object::String(bytes, _)) => Some(bytes.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn report_is_a_single_page_pdf() {
        let (id, d) = drawing(&["pia"]);
        let pdf = build_report(&id, &d, Local::now()).unwrap();
        assert!(pdf.starts_with(b"%PDF"));
        let doc = Document::load_mem(&pdf).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn filename_uses_short_id() {
        let (id, _) = drawing(&[]);
        let name = report_filename(&id);
        assert_eq!(name, format!("marmoview_desenho_{}.pdf", &id.as_str()[..8]));
    }

    #[test]
    fn page_carries_header_and_notes() {
        let (id, d) = drawing(&["pia"]);
        let texts = strings(&page_content(&id, &d, Local::now()));
        assert_eq!(texts[0], b"MARMOVIEW");
        assert!(texts.contains(&winansi(&format!("Projeto: #{}", id.short(8)))));
        assert!(texts.contains(&winansi("Recortes: pia")));
        assert!(texts.contains(&winansi("Configuração em L | Bancada principal | Ilha central")));
        let bullets = texts.iter().filter(|t| t.first() == Some(&0x95)).count();
        assert_eq!(bullets, 4);
    }

    #[test]
    fn cutouts_line_only_when_present() {
        let (id, d) = drawing(&[]);
        let texts = strings(&page_content(&id, &d, Local::now()));
        assert!(!texts.iter().any(|t| t.starts_with(b"Recortes")));
    }

    #[test]
    fn characteristics_are_capped() {
        let (id, d) = drawing(&[]);
        let texts = strings(&page_content(&id, &d, Local::now()));
        assert!(texts.contains(&vec![b'x'; 200]));
    }

    #[test]
    fn winansi_maps_portuguese_and_bullets() {
        assert_eq!(winansi("ção"), vec![0xE7, 0xE3, b'o']);
        assert_eq!(winansi("• ok"), vec![0x95, b' ', b'o', b'k']);
        assert_eq!(winansi("✓"), vec![b'?']);
    }
}
