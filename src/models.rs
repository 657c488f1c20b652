use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A row in the `test` table. `id` and `created_at` are assigned by the
/// store and never sent on create.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TestRecord {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CreateTestRecord {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

/// Partial update; absent fields are left untouched by the store.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct UpdateTestRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

/// Venice image generation models exposed to the UI.
pub const IMAGE_MODELS: &[(&str, &str)] = &[
    ("fluently-xl", "Fluently XL"),
    ("sdxl-turbo", "SDXL Turbo"),
    ("realistic-vision", "Realistic Vision"),
    ("dreamshaper", "Dreamshaper"),
];

pub const STYLE_PRESETS: &[&str] = &[
    "3D Model",
    "Analog Film",
    "Anime",
    "Cinematic",
    "Comic Book",
    "Digital Art",
    "Enhance",
    "Fantasy Art",
    "Isometric",
    "Line Art",
    "Low Poly",
    "Neon Punk",
    "Origami",
    "Photographic",
    "Pixel Art",
    "Sketch",
    "Watercolor",
];

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Webp,
    Png,
    Jpg,
}

impl ImageFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Webp => "webp",
            Self::Png => "png",
            Self::Jpg => "jpg",
        }
    }
}

/// Request body for image generation. Unknown fields are kept in `extra`
/// so the proxy forwards the caller's body verbatim to Venice.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ImageGenerationParams {
    pub model: String,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style_preset: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub steps: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cfg_scale: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lora_strength: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub safe_mode: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hide_watermark: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<ImageFormat>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ImageGenerationResponse {
    pub id: String,
    pub images: Vec<String>,
    pub timing: ImageTiming,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ImageTiming {
    pub inference_duration: f64,
    pub inference_preprocessing_time: f64,
    pub inference_queue_time: f64,
    pub total: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn create_record_defaults_is_active() {
        let rec: CreateTestRecord = serde_json::from_str(r#"{"name":"A"}"#).unwrap();
        assert_eq!(rec.is_active, true);
        assert_eq!(rec.description, None);
    }

    #[test]
    fn update_record_skips_absent_fields() {
        let patch = UpdateTestRecord { name: Some("B".into()), ..Default::default() };
        let json = serde_json::to_value(&patch).unwrap();
        assert_eq!(json, serde_json::json!({"name": "B"}));
    }

    #[test]
    fn generation_params_forward_unknown_fields() {
        let body = serde_json::json!({
            "model": "fluently-xl",
            "prompt": "a lighthouse",
            "format": "png",
            "embed_exif_metadata": true,
        });
        let params: ImageGenerationParams = serde_json::from_value(body.clone()).unwrap();
        assert_eq!(params.format, Some(ImageFormat::Png));
        let forwarded = serde_json::to_value(&params).unwrap();
        assert_eq!(forwarded, body);
    }

    #[test]
    fn timing_uses_camel_case_wire_names() {
        let timing: ImageTiming = serde_json::from_value(serde_json::json!({
            "inferenceDuration": 1.5,
            "inferencePreprocessingTime": 0.1,
            "inferenceQueueTime": 0.2,
            "total": 1.8,
        }))
        .unwrap();
        assert_eq!(timing.inference_duration, 1.5);
        assert_eq!(timing.total, 1.8);
    }
}
