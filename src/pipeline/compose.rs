//! Drawing composition: session + optional analysis → [`DrawingDescription`].
//!
//! Pure and deterministic. The same inputs always yield the same
//! description, which is what makes the render and PDF stages reproducible.

use crate::analysis::VisionAnalysis;
use crate::model::{DrawingDescription, Environment, LayoutFormat, Session, Shape};

/// Fixed notes attached to every drawing, in display order.
pub const DRAWING_NOTES: [&str; 4] = [
    "DESENHO CONCEITUAL - NÃO UTILIZAR PARA FABRICAÇÃO",
    "Requer medição precisa em campo",
    "Sem escala ou dimensões",
    "Representa interpretação visual do ambiente",
];

/// Build the drawing description for a session.
pub fn compose(session: &Session, analysis: Option<&VisionAnalysis>) -> DrawingDescription {
    let form = &session.form;
    let environment = Environment::label_for(&form.env_type);

    DrawingDescription {
        title: format!("Desenho Conceitual - {environment}"),
        environment: environment.to_string(),
        format: LayoutFormat::label_for(&form.format).to_string(),
        elements: form.stone_elements.clone(),
        cutouts: form.cutouts.clone(),
        characteristics: form.characteristics.clone(),
        images_analyzed: session.images.len(),
        shapes: shapes_for(&form.format, &form.stone_elements),
        ai_analysis: analysis.cloned(),
        notes: DRAWING_NOTES.iter().map(|n| n.to_string()).collect(),
    }
}

/// Descriptive shapes: one for a recognised format, then one per recognised
/// element tag.
fn shapes_for(format: &str, elements: &[String]) -> Vec<Shape> {
    let mut shapes = Vec::new();

    match LayoutFormat::from_code(format) {
        Some(LayoutFormat::LShape) => shapes.push(Shape::new("L-shape", "Configuração em L")),
        Some(LayoutFormat::UShape) => shapes.push(Shape::new("U-shape", "Configuração em U")),
        Some(LayoutFormat::Linear) => shapes.push(Shape::new("linear", "Configuração linear")),
        Some(LayoutFormat::Island) => {
            shapes.push(Shape::new("island", "Ilha central destacada"))
        }
        _ => {}
    }

    for element in elements {
        match element.as_str() {
            "bancada" => shapes.push(Shape::new("rectangle", "Bancada principal")),
            "ilha" => shapes.push(Shape::new("rectangle", "Ilha central")),
            "nicho" => shapes.push(Shape::new("small-rect", "Nicho/Prateleira")),
            _ => {}
        }
    }

    shapes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FormInput, SessionId};

    fn session(env: &str, format: &str, elements: &[&str], cutouts: &[&str]) -> Session {
        Session::new(
            SessionId::generate(),
            vec![],
            FormInput {
                env_type: env.into(),
                format: format.into(),
                stone_elements: elements.iter().map(|s| s.to_string()).collect(),
                cutouts: cutouts.iter().map(|s| s.to_string()).collect(),
                characteristics: "Parede com azulejo".into(),
                ..Default::default()
            },
        )
    }

    #[test]
    fn kitchen_l_with_bancada_and_ilha() {
        let d = compose(&session("cozinha", "l", &["bancada", "ilha"], &["pia"]), None);
        assert_eq!(d.title, "Desenho Conceitual - Cozinha Residencial");
        assert_eq!(d.environment, "Cozinha Residencial");
        assert_eq!(d.format, "Em L");
        let kinds: Vec<_> = d.shapes.iter().map(|s| s.kind.as_str()).collect();
        assert_eq!(kinds, ["L-shape", "rectangle", "rectangle"]);
        assert_eq!(d.cutouts, vec!["pia"]);
        assert!(d.ai_analysis.is_none());
    }

    #[test]
    fn notes_are_fixed() {
        let expected = [
            "DESENHO CONCEITUAL - NÃO UTILIZAR PARA FABRICAÇÃO",
            "Requer medição precisa em campo",
            "Sem escala ou dimensões",
            "Representa interpretação visual do ambiente",
        ];
        let plain = compose(&session("banheiro", "reto", &[], &[]), None);
        assert_eq!(plain.notes, expected);

        let analysis = VisionAnalysis {
            confidence: Some(95.0),
            ..Default::default()
        };
        let guided = compose(&session("cozinha", "l", &["bancada"], &["pia"]), Some(&analysis));
        assert_eq!(guided.notes, expected);
    }

    #[test]
    fn unknown_codes_yield_no_shapes() {
        let d = compose(&session("garagem", "zigue", &["soleira", "mesa"], &[]), None);
        assert_eq!(d.environment, "Não especificado");
        assert_eq!(d.format, "Não especificado");
        assert!(d.shapes.is_empty());
    }

    #[test]
    fn peninsula_has_no_format_shape() {
        let d = compose(&session("cozinha", "pensula", &["nicho"], &[]), None);
        assert_eq!(d.shapes, vec![Shape::new("small-rect", "Nicho/Prateleira")]);
    }

    #[test]
    fn composition_is_deterministic() {
        let s = session("lavabo", "u", &["bancada"], &["cuba"]);
        let a = VisionAnalysis {
            confidence: Some(40.0),
            ..Default::default()
        };
        assert_eq!(compose(&s, Some(&a)), compose(&s, Some(&a)));
        assert_eq!(compose(&s, Some(&a)).ai_analysis, Some(a));
    }
}
