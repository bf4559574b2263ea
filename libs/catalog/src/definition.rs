use serde::{Deserialize, Serialize};

use crate::cost::{CostModel, Estimate};
use crate::credits::Credits;

pub const DEFAULT_UPLOAD_FIELD: &str = "file";
pub const IMAGE_FIELD_TYPE: &str = "image";

/// Body encoding a downstream service expects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestEncoding {
    #[default]
    FormData,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestSpec {
    #[serde(rename = "type", default)]
    pub encoding: RequestEncoding,
    /// Multipart field name the downstream service reads the upload from.
    #[serde(default = "default_upload_field")]
    pub field: String,
}

impl Default for RequestSpec {
    fn default() -> Self {
        Self {
            encoding: RequestEncoding::default(),
            field: default_upload_field(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingSpec {
    pub estimated: Credits,
    /// Fixed per-call price. Absent means the price is derived from latency.
    #[serde(default)]
    pub price: Option<Credits>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputField {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
    /// Dashboard hint: render previews of this field blurred.
    #[serde(default)]
    pub blur: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputField {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub blur: bool,
}

/// Static description of one proxied downstream capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiDefinition {
    /// Slug taken from the `[api.<id>]` table key.
    #[serde(skip_deserializing)]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub one_liner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default = "enabled_by_default")]
    pub implemented: bool,
    /// Environment variables that must be set before the API can be called.
    #[serde(default, skip_serializing)]
    pub env: Vec<String>,
    #[serde(default, skip_serializing)]
    pub url: Option<String>,
    /// Environment variable that overrides `url` when set.
    #[serde(default, skip_serializing)]
    pub url_env: Option<String>,
    #[serde(default)]
    pub request: RequestSpec,
    pub pricing: PricingSpec,
    #[serde(default)]
    pub inputs: Vec<InputField>,
    #[serde(default)]
    pub outputs: Vec<OutputField>,
}

impl ApiDefinition {
    pub fn cost_model(&self) -> CostModel {
        match self.pricing.price {
            Some(price) => CostModel::Fixed(price),
            None => CostModel::DurationProportional {
                baseline: self.pricing.estimated,
            },
        }
    }

    pub fn estimate(&self) -> Estimate {
        Estimate {
            estimated: self.pricing.estimated,
            model: self.cost_model(),
        }
    }

    pub fn accepts_file(&self) -> bool {
        self.request.encoding == RequestEncoding::FormData
    }

    /// Declared outputs the downstream service returns as base64 images.
    pub fn image_outputs(&self) -> impl Iterator<Item = &OutputField> {
        self.outputs
            .iter()
            .filter(|output| output.kind == IMAGE_FIELD_TYPE)
    }

    /// Downstream endpoint, preferring the `url_env` override.
    pub fn endpoint_with<F>(&self, lookup: F) -> Option<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.url_env
            .as_deref()
            .and_then(|var| lookup(var))
            .filter(|value| !value.trim().is_empty())
            .or_else(|| self.url.clone())
    }
}

fn default_upload_field() -> String {
    DEFAULT_UPLOAD_FIELD.to_string()
}

fn enabled_by_default() -> bool {
    true
}
