//! Vision-model layout analysis.
//!
//! The model is asked for a JSON document (see [`crate::prompts`]) but its
//! answer is untrusted: any key may be missing, carry the wrong type, or hold
//! a number written as a string. Every field here deserialises leniently and
//! falls back to a documented default instead of failing the whole document.
//! Only a response that is not a JSON object at all is rejected.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Parsed answer of the vision model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisionAnalysis {
    #[serde(default, deserialize_with = "lenient::string", skip_serializing_if = "Option::is_none")]
    pub layout_analysis: Option<String>,

    #[serde(default, deserialize_with = "lenient::object", skip_serializing_if = "Option::is_none")]
    pub space_dimensions: Option<SpaceDimensions>,

    /// Presence of this key selects the AI-guided drawing path.
    #[serde(default, deserialize_with = "lenient::object", skip_serializing_if = "Option::is_none")]
    pub stone_layout: Option<StoneLayout>,

    #[serde(default, deserialize_with = "lenient::objects")]
    pub cutouts_positions: Vec<CutoutPosition>,

    #[serde(default, deserialize_with = "lenient::string", skip_serializing_if = "Option::is_none")]
    pub format_recommendation: Option<String>,

    #[serde(default, deserialize_with = "lenient::strings")]
    pub visual_references: Vec<String>,

    #[serde(default, deserialize_with = "lenient::strings")]
    pub drawing_instructions: Vec<String>,

    #[serde(default, deserialize_with = "lenient::strings")]
    pub challenges: Vec<String>,

    /// 0–100 when present.
    #[serde(default, deserialize_with = "lenient::number", skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpaceDimensions {
    #[serde(default, deserialize_with = "lenient::number")]
    pub width_ratio: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub depth_ratio: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub height_estimate: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoneLayout {
    #[serde(default, deserialize_with = "lenient::string")]
    pub main_surface: Option<String>,
    #[serde(default, deserialize_with = "lenient::objects")]
    pub positions: Vec<ElementPosition>,
}

/// A stone element as a percentage bounding box of the drawing frame.
///
/// Missing coordinates span the whole frame on that axis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementPosition {
    #[serde(default, deserialize_with = "lenient::string")]
    pub element: Option<String>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub x_start: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub x_end: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub y_start: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub y_end: Option<f64>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub description: Option<String>,
}

impl ElementPosition {
    pub fn element_name(&self) -> &str {
        self.element.as_deref().unwrap_or("")
    }
    pub fn x_start(&self) -> f64 {
        self.x_start.unwrap_or(0.0)
    }
    pub fn x_end(&self) -> f64 {
        self.x_end.unwrap_or(100.0)
    }
    pub fn y_start(&self) -> f64 {
        self.y_start.unwrap_or(0.0)
    }
    pub fn y_end(&self) -> f64 {
        self.y_end.unwrap_or(100.0)
    }
}

/// A cutout centre in frame percentages plus a size class.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CutoutPosition {
    #[serde(rename = "type", default, deserialize_with = "lenient::string")]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub x: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub y: Option<f64>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub size: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub notes: Option<String>,
}

impl CutoutPosition {
    pub fn kind_name(&self) -> &str {
        self.kind.as_deref().unwrap_or("")
    }
    pub fn x(&self) -> f64 {
        self.x.unwrap_or(50.0)
    }
    pub fn y(&self) -> f64 {
        self.y.unwrap_or(50.0)
    }
    pub fn size(&self) -> &str {
        self.size.as_deref().unwrap_or("médio")
    }

    /// Drawn circle radius in pixels for the size class.
    pub fn radius(&self) -> i32 {
        match self.size() {
            "pequeno" => 15,
            "médio" => 25,
            _ => 35,
        }
    }
}

impl VisionAnalysis {
    /// Parse the model's raw text answer.
    ///
    /// Accepts the JSON object bare, wrapped in a ```json fence, or
    /// surrounded by stray prose. Anything that is not an object is an error.
    pub fn from_model_text(text: &str) -> Result<Self, serde_json::Error> {
        let body = extract_json(text);
        let value: Value = serde_json::from_str(body)?;
        if !value.is_object() {
            return Err(<serde_json::Error as serde::de::Error>::custom(
                "expected a JSON object",
            ));
        }
        serde_json::from_value(value)
    }

    /// Confidence formatted for display, without a trailing `.0`.
    pub fn confidence_label(&self) -> Option<String> {
        self.confidence.map(|c| {
            if c.fract() == 0.0 {
                format!("{c:.0}")
            } else {
                format!("{c}")
            }
        })
    }
}

static RE_JSON_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:json|JSON)?\s*\n(.*?)\n?```\s*$").unwrap());

fn extract_json(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(caps) = RE_JSON_FENCE.captures(trimmed) {
        if let Some(m) = caps.get(1) {
            return m.as_str();
        }
    }
    if trimmed.starts_with('{') {
        return trimmed;
    }
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if end > start => &trimmed[start..=end],
        _ => trimmed,
    }
}

/// Field deserialisers that never fail on a well-formed JSON value.
mod lenient {
    use super::*;
    use serde::de::DeserializeOwned;

    pub fn string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    }

    pub fn number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        let n = match Value::deserialize(d)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().trim_end_matches('%').parse::<f64>().ok(),
            _ => None,
        };
        Ok(n.filter(|v| v.is_finite()))
    }

    pub fn strings<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Array(items) => items
                .into_iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s),
                    _ => None,
                })
                .collect(),
            Value::String(s) => vec![s],
            _ => Vec::new(),
        })
    }

    pub fn object<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        Ok(match Value::deserialize(d)? {
            v @ Value::Object(_) => serde_json::from_value(v).ok(),
            _ => None,
        })
    }

    pub fn objects<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        Ok(match Value::deserialize(d)? {
            Value::Array(items) => items
                .into_iter()
                .filter(Value::is_object)
                .filter_map(|v| serde_json::from_value(v).ok())
                .collect(),
            _ => Vec::new(),
        })
    }
}
