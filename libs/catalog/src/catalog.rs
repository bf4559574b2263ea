use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};

use crate::cost::{CostEstimator, Estimate};
use crate::credits::Credits;
use crate::definition::ApiDefinition;
use crate::error::CatalogError;

#[derive(Debug, Clone, Copy, Deserialize)]
struct GlobalSwitch {
    #[serde(default = "switch_on")]
    enabled: bool,
}

impl Default for GlobalSwitch {
    fn default() -> Self {
        Self { enabled: true }
    }
}

fn switch_on() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    apis: GlobalSwitch,
    #[serde(default)]
    api: BTreeMap<String, ApiDefinition>,
}

/// An API definition that passed every runtime gate, paired with the
/// downstream endpoint it should be dispatched to.
#[derive(Debug, Clone)]
pub struct ResolvedApi {
    pub definition: ApiDefinition,
    pub endpoint: String,
}

impl ResolvedApi {
    pub fn id(&self) -> &str {
        &self.definition.id
    }

    pub fn estimate(&self) -> Estimate {
        self.definition.estimate()
    }
}

/// Immutable view of the API catalog loaded at startup.
#[derive(Debug, Clone)]
pub struct Catalog {
    globally_enabled: bool,
    apis: BTreeMap<String, ApiDefinition>,
}

impl Catalog {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let catalog = Self::from_toml_str(&raw)?;
        info!(
            path = %path.display(),
            apis = catalog.apis.len(),
            enabled = catalog.globally_enabled,
            "loaded API catalog"
        );
        Ok(catalog)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = toml::from_str(raw)?;
        let mut apis = BTreeMap::new();

        for (id, mut definition) in file.api {
            validate_definition(&id, &definition)?;
            definition.id = id.clone();
            debug!(api_id = %id, model = ?definition.cost_model(), "registered API definition");
            apis.insert(id, definition);
        }

        Ok(Self {
            globally_enabled: file.apis.enabled,
            apis,
        })
    }

    pub fn get(&self, api_id: &str) -> Option<&ApiDefinition> {
        self.apis.get(api_id)
    }

    pub fn is_enabled(&self, api_id: &str) -> bool {
        self.globally_enabled
            && self
                .apis
                .get(api_id)
                .map(|definition| definition.enabled)
                .unwrap_or(false)
    }

    /// Enabled definitions in id order.
    pub fn enabled(&self) -> impl Iterator<Item = &ApiDefinition> {
        let globally_enabled = self.globally_enabled;
        self.apis
            .values()
            .filter(move |definition| globally_enabled && definition.enabled)
    }

    pub fn len(&self) -> usize {
        self.apis.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apis.is_empty()
    }

    /// Runs every configuration gate against the process environment.
    pub fn resolve(&self, api_id: &str) -> Result<ResolvedApi, CatalogError> {
        self.resolve_with(api_id, |name| std::env::var(name).ok())
    }

    /// Gates are checked in order: existence, enablement, required
    /// environment, implementation status, endpoint.
    pub fn resolve_with<F>(&self, api_id: &str, lookup: F) -> Result<ResolvedApi, CatalogError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let definition = self
            .apis
            .get(api_id)
            .ok_or_else(|| CatalogError::NotFound(api_id.to_string()))?;

        if !self.is_enabled(api_id) {
            return Err(CatalogError::Disabled(api_id.to_string()));
        }

        if let Some(missing) = definition
            .env
            .iter()
            .find(|var| lookup(var.as_str()).map_or(true, |value| value.trim().is_empty()))
        {
            return Err(CatalogError::MissingEnv(missing.clone()));
        }

        if !definition.implemented {
            return Err(CatalogError::NotImplemented(api_id.to_string()));
        }

        let endpoint = definition
            .endpoint_with(&lookup)
            .ok_or_else(|| CatalogError::MissingEndpoint(api_id.to_string()))?;

        Ok(ResolvedApi {
            definition: definition.clone(),
            endpoint,
        })
    }
}

impl CostEstimator for Catalog {
    fn estimate(&self, api_id: &str) -> Result<Estimate, CatalogError> {
        if !self.is_enabled(api_id) {
            return Err(CatalogError::NotFound(api_id.to_string()));
        }
        self.apis
            .get(api_id)
            .map(ApiDefinition::estimate)
            .ok_or_else(|| CatalogError::NotFound(api_id.to_string()))
    }
}

fn validate_definition(id: &str, definition: &ApiDefinition) -> Result<(), CatalogError> {
    let invalid = |reason: &str| CatalogError::InvalidDefinition {
        api_id: id.to_string(),
        reason: reason.to_string(),
    };

    if id.is_empty()
        || !id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
    {
        return Err(invalid("id must be a lowercase slug"));
    }
    if definition.name.trim().is_empty() {
        return Err(invalid("name cannot be empty"));
    }
    if definition.pricing.estimated.is_negative() {
        return Err(invalid("estimated cost cannot be negative"));
    }
    if definition
        .pricing
        .price
        .map(Credits::is_negative)
        .unwrap_or(false)
    {
        return Err(invalid("price cannot be negative"));
    }
    if definition.request.field.trim().is_empty() {
        return Err(invalid("request field cannot be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [api.echo]
        name = "Echo"
        url = "http://localhost:9000/echo"

        [api.echo.pricing]
        estimated = 0.5
    "#;

    #[test]
    fn missing_global_switch_defaults_to_enabled() {
        let catalog = Catalog::from_toml_str(MINIMAL).unwrap();
        assert!(catalog.is_enabled("echo"));
        assert_eq!(catalog.get("echo").unwrap().id, "echo");
    }

    #[test]
    fn rejects_non_slug_ids() {
        let raw = MINIMAL.replace("api.echo", "api.Echo");
        let err = Catalog::from_toml_str(&raw).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidDefinition { .. }));
    }

    #[test]
    fn rejects_negative_pricing() {
        let raw = MINIMAL.replace("estimated = 0.5", "estimated = -0.5");
        let err = Catalog::from_toml_str(&raw).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidDefinition { .. }));
    }

    #[test]
    fn estimate_hides_disabled_apis() {
        let raw = format!("[apis]\nenabled = false\n{MINIMAL}");
        let catalog = Catalog::from_toml_str(&raw).unwrap();
        assert!(matches!(
            catalog.estimate("echo"),
            Err(CatalogError::NotFound(_))
        ));
    }
}
