//! Prompts for the vision model and the image-generation services.
//!
//! Every prompt lives here so that wording changes never touch the calling
//! code, and so tests can inspect prompts without a live model.

use crate::model::FormInput;

/// System message for the layout-analysis call.
pub const VISION_SYSTEM_PROMPT: &str = "Você é um especialista em marmoraria, design de \
interiores e desenho técnico para fabricação de pedras naturais. Responda sempre com um \
único objeto JSON válido, sem markdown e sem texto adicional.";

/// Build the user instruction for the layout-analysis call.
///
/// The form answers are embedded so the model can reconcile what the client
/// declared with what the photos show. The schema block is the contract
/// parsed by [`crate::analysis::VisionAnalysis`].
pub fn vision_user_prompt(form: &FormInput) -> String {
    let env = non_empty(&form.env_type, "não especificado");
    let format = non_empty(&form.format, "não especificado");
    let characteristics = non_empty(&form.characteristics, "Nenhuma");

    format!(
        r#"CONTEXTO:
As imagens mostram um ambiente do tipo "{env}" que receberá pedra natural.

DADOS DO FORMULÁRIO:
- Tipo de ambiente: {env}
- Formato desejado: {format}
- Elementos de pedra: {elements}
- Recortes necessários: {cutouts}
- Características descritas: {characteristics}

TAREFA:
Descreva o espaço com detalhe suficiente para um desenho técnico conceitual.
Retorne um objeto JSON com estas chaves:

1. "layout_analysis": texto descrevendo paredes, móveis e estruturas visíveis.
2. "space_dimensions": {{"width_ratio": número, "depth_ratio": número, "height_estimate": altura em cm (240 se desconhecida)}}.
3. "stone_layout": {{"main_surface": texto, "positions": [{{"element": nome (bancada/ilha/nicho/...), "x_start": 0-100, "x_end": 0-100, "y_start": 0-100, "y_end": 0-100, "description": texto}}]}}.
4. "cutouts_positions": [{{"type": pia/cooktop/torneira/..., "x": 0-100, "y": 0-100, "size": "pequeno" | "médio" | "grande", "notes": texto}}].
5. "format_recommendation": como o formato "{format}" se encaixa no espaço.
6. "visual_references": lista de cores, texturas e estilos observados.
7. "drawing_instructions": lista de instruções objetivas para o desenho.
8. "challenges": lista de pontos de atenção.
9. "confidence": confiança da análise, de 0 a 100.

REGRAS:
- Coordenadas são porcentagens (0-100) da largura e da altura do desenho.
- Quando algo não for visível, use valores padrão razoáveis para o ambiente.
- Responda APENAS com o JSON."#,
        elements = join_or(&form.stone_elements, "nenhum"),
        cutouts = join_or(&form.cutouts, "nenhum"),
    )
}

// ── Image generation ─────────────────────────────────────────────────────

/// English description of the room type for image models.
pub fn environment_description(code: &str) -> &'static str {
    match code {
        "cozinha" => "kitchen countertop",
        "banheiro" => "bathroom vanity",
        "area-gourmet" => "gourmet area",
        "lavabo" => "powder room",
        _ => "interior space",
    }
}

/// English description of the layout for image models.
pub fn format_description(code: &str) -> &'static str {
    match code {
        "reto" => "linear straight layout",
        "l" => "L-shaped layout",
        "u" => "U-shaped layout",
        "ilha" => "island configuration",
        "pensula" => "peninsula layout",
        "irregular" => "custom irregular shape",
        _ => "custom layout",
    }
}

/// Text-to-image prompt (OpenAI Images).
pub fn blueprint_prompt(form: &FormInput) -> String {
    format!(
        "Professional technical architectural blueprint drawing of {} with {}. \
Top-down view, marble or granite countertop installation layout. \
Clean lines, precise measurements indicators, professional CAD style, \
minimalist design, high quality technical illustration with detailed stone placement",
        environment_description(&form.env_type),
        format_description(&form.format),
    )
}

/// Image-to-image prompt (Gradio space), sent alongside the first photo.
pub fn technical_drawing_prompt(form: &FormInput) -> String {
    format!(
        "Technical architectural drawing of {} with {}, \
marble or granite countertop installation, \
professional blueprint style, clean lines, top-down view, \
precise measurements indication, technical illustration, \
high quality architectural rendering, detailed stone layout",
        environment_description(&form.env_type),
        format_description(&form.format),
    )
}

fn non_empty<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.trim().is_empty() {
        fallback
    } else {
        value
    }
}

fn join_or(tags: &[String], fallback: &str) -> String {
    if tags.is_empty() {
        fallback.to_string()
    } else {
        tags.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kitchen_l() -> FormInput {
        FormInput {
            env_type: "cozinha".into(),
            format: "l".into(),
            stone_elements: vec!["bancada".into(), "ilha".into()],
            cutouts: vec!["pia".into()],
            ..Default::default()
        }
    }

    #[test]
    fn vision_prompt_embeds_form_and_schema() {
        let p = vision_user_prompt(&kitchen_l());
        assert!(p.contains("bancada, ilha"));
        assert!(p.contains("Recortes necessários: pia"));
        assert!(p.contains("Características descritas: Nenhuma"));
        for key in [
            "layout_analysis",
            "space_dimensions",
            "stone_layout",
            "cutouts_positions",
            "format_recommendation",
            "visual_references",
            "drawing_instructions",
            "challenges",
            "confidence",
        ] {
            assert!(p.contains(key), "prompt is missing {key}");
        }
    }

    #[test]
    fn image_prompts_use_english_descriptions() {
        let form = kitchen_l();
        assert!(blueprint_prompt(&form).contains("kitchen countertop with L-shaped layout"));
        assert!(technical_drawing_prompt(&form).contains("kitchen countertop with L-shaped layout"));
    }

    #[test]
    fn unknown_codes_get_generic_descriptions() {
        assert_eq!(environment_description("sala"), "interior space");
        assert_eq!(format_description("zigue-zague"), "custom layout");
    }
}
