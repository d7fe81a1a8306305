//! Request-level orchestration of the pipeline stages.
//!
//! Both entry points follow the same shape: snapshot the session, run the
//! slow stages without holding the store lock, then write the results back
//! in one [`SessionStore::update`](crate::session::SessionStore::update).
//! A session that expires mid-generation surfaces as `SessionNotFound`.

use crate::analysis::VisionAnalysis;
use crate::error::MarmoError;
use crate::model::{DrawingDescription, SessionId, SessionStatus};
use crate::pipeline::compose::compose;
use crate::pipeline::pdf::build_report;
use crate::pipeline::render::{blank_canvas_png, render_drawing, RenderJob};
use crate::server::AppState;
use bytes::Bytes;
use chrono::Local;
use std::time::Instant;
use tracing::{debug, info, warn};

/// What a drawing generation produced.
#[derive(Debug, Clone)]
pub struct DrawingOutcome {
    pub drawing: DrawingDescription,
    pub ai_analysis: Option<VisionAnalysis>,
}

/// Analyse, compose, render and store a drawing for the session.
///
/// The optional collaborators never fail the request: without a vision
/// analysis the form-driven template is drawn, and a failed image
/// generation keeps the local render.
pub async fn generate_drawing(state: &AppState, session_id: &str) -> Result<DrawingOutcome, MarmoError> {
    let start = Instant::now();
    let snapshot = state.store.get(session_id)?;
    info!("Generating drawing for session {}", snapshot.id.short(8));

    // ── Step 1: Vision analysis (optional) ───────────────────────────────
    let ai_analysis = match &state.vision {
        Some(vision) => vision.analyze(&snapshot.images, &snapshot.form).await,
        None => {
            debug!("Vision analysis not configured");
            None
        }
    };

    // ── Step 2: Describe ─────────────────────────────────────────────────
    let drawing = compose(&snapshot, ai_analysis.as_ref());

    // ── Step 3: Render locally ───────────────────────────────────────────
    let job = RenderJob {
        drawing: drawing.clone(),
        format_code: snapshot.form.format.clone(),
        session_id: snapshot.id.to_string(),
        generated_at: Local::now(),
    };
    let mut image = match render_drawing(job, state.font.clone()).await {
        Ok(png) => png,
        Err(e) => {
            warn!("Render failed, storing a blank canvas: {e}");
            blank_canvas_png()?
        }
    };

    // ── Step 4: Replace with a generated image (optional) ────────────────
    if let (Some(generator), Some(first)) = (&state.image_gen, snapshot.images.first()) {
        if let Some(generated) = generator.generate(first, &snapshot.form).await {
            image = generated;
        }
    }

    // ── Step 5: Store ────────────────────────────────────────────────────
    let image = Bytes::from(image);
    state.store.update(session_id, |session| {
        session.drawing = Some(drawing.clone());
        session.drawing_image = Some(image);
        // A failed analysis keeps the one stored by an earlier run.
        if ai_analysis.is_some() {
            session.ai_analysis = ai_analysis.clone();
        }
        session.advance(SessionStatus::DrawingCreated);
    })?;

    info!(
        "Drawing ready for session {} in {:?} (AI analysis: {})",
        snapshot.id.short(8),
        start.elapsed(),
        if ai_analysis.is_some() { "yes" } else { "no" }
    );
    Ok(DrawingOutcome {
        drawing,
        ai_analysis,
    })
}

/// Build the PDF report for a session that already has a drawing.
pub async fn export_pdf(state: &AppState, session_id: &str) -> Result<(SessionId, Vec<u8>), MarmoError> {
    let snapshot = state.store.get(session_id)?;
    let drawing = snapshot.drawing.ok_or(MarmoError::DrawingNotReady)?;
    let id = snapshot.id;

    let report_id = id.clone();
    let pdf = tokio::task::spawn_blocking(move || build_report(&report_id, &drawing, Local::now()))
        .await
        .map_err(|e| MarmoError::Internal(format!("PDF task panicked: {e}")))??;

    state
        .store
        .update(session_id, |session| session.advance(SessionStatus::PdfGenerated))?;
    info!("PDF exported for session {} ({} bytes)", id.short(8), pdf.len());
    Ok((id, pdf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ServerConfig, VisionSettings};
    use crate::model::{FormInput, ImageKind, UploadedImage};
    use crate::pipeline::vision::VisionAnalyzer;
    use edgequake_llm::MockProvider;
    use image::{DynamicImage, ImageFormat, RgbImage};
    use std::io::Cursor;
    use std::sync::Arc;

    fn photo() -> UploadedImage {
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::new(8, 8))
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        UploadedImage {
            filename: "foto.png".into(),
            data: Bytes::from(buf),
            width: 8,
            height: 8,
            kind: ImageKind::Png,
        }
    }

    fn state() -> AppState {
        AppState::new(ServerConfig::default())
    }

    fn kitchen() -> FormInput {
        FormInput {
            env_type: "cozinha".into(),
            format: "l".into(),
            stone_elements: vec!["bancada".into(), "ilha".into()],
            cutouts: vec!["pia".into()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let s = state();
        assert!(matches!(
            generate_drawing(&s, "missing").await,
            Err(MarmoError::SessionNotFound)
        ));
        assert!(matches!(
            export_pdf(&s, "missing").await,
            Err(MarmoError::SessionNotFound)
        ));
    }

    #[tokio::test]
    async fn pdf_requires_drawing() {
        let s = state();
        let id = s.store.create(vec![], kitchen());
        assert!(matches!(
            export_pdf(&s, id.as_str()).await,
            Err(MarmoError::DrawingNotReady)
        ));
    }

    #[tokio::test]
    async fn drawing_then_pdf_advances_status() {
        let s = state();
        let id = s.store.create(vec![], kitchen());

        let outcome = generate_drawing(&s, id.as_str()).await.unwrap();
        assert_eq!(outcome.drawing.format, "Em L");
        assert!(outcome.ai_analysis.is_none());

        let session = s.store.get(id.as_str()).unwrap();
        assert_eq!(session.status, SessionStatus::DrawingCreated);
        let png = session.drawing_image.unwrap();
        assert!(png.starts_with(b"\x89PNG"));

        let (pdf_id, pdf) = export_pdf(&s, id.as_str()).await.unwrap();
        assert_eq!(pdf_id, id);
        assert!(pdf.starts_with(b"%PDF"));
        assert_eq!(
            s.store.get(id.as_str()).unwrap().status,
            SessionStatus::PdfGenerated
        );

        // Regenerating keeps the furthest status reached.
        generate_drawing(&s, id.as_str()).await.unwrap();
        assert_eq!(
            s.store.get(id.as_str()).unwrap().status,
            SessionStatus::PdfGenerated
        );
    }

    #[tokio::test]
    async fn failed_reanalysis_keeps_earlier_analysis() {
        let provider = MockProvider::new();
        provider
            .add_response(r#"{"confidence": 77, "drawing_instructions": ["Bancada junto à parede"]}"#)
            .await;
        // The queue is then empty and the mock answers with plain text,
        // which does not parse as an analysis.
        let vision = VisionAnalyzer::new(Arc::new(provider), VisionSettings::default());
        let s = state().with_vision(vision);
        let id = s.store.create(vec![photo()], kitchen());

        let first = generate_drawing(&s, id.as_str()).await.unwrap();
        assert_eq!(first.ai_analysis.as_ref().and_then(|a| a.confidence), Some(77.0));

        let second = generate_drawing(&s, id.as_str()).await.unwrap();
        assert!(second.ai_analysis.is_none());

        let stored = s.store.get(id.as_str()).unwrap().ai_analysis.unwrap();
        assert_eq!(stored.confidence, Some(77.0));
    }
}
