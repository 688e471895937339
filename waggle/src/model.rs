//! Model catalog: context windows, pricing, and model-class predicates.
//!
//! The catalog is a versioned data table consulted by model id. A built-in
//! table covers the common hosted models; deployments with custom models load
//! their own table from JSON and/or set `assume_model_exists` on the agent.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Per-model pricing in USD per million tokens.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ModelPricing {
    /// Cost per million input tokens.
    pub input_per_mtok: f64,
    /// Cost per million output tokens.
    pub output_per_mtok: f64,
    /// Cost per million cached input tokens.
    #[serde(default)]
    pub cached_per_mtok: f64,
}

/// Catalog entry for one model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Input-token budget of the model.
    pub context_window: u64,
    /// Pricing table.
    pub pricing: ModelPricing,
}

/// Versioned catalog of known models.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelCatalog {
    models: HashMap<String, ModelInfo>,
}

/// Context window assumed when a model is not in the catalog.
pub const DEFAULT_CONTEXT_WINDOW: u64 = 200_000;

impl ModelCatalog {
    /// Catalog with the built-in model table.
    #[must_use]
    pub fn builtin() -> Self {
        let mut models = HashMap::new();
        let mut add = |id: &str, window: u64, input: f64, output: f64, cached: f64| {
            models.insert(
                id.to_string(),
                ModelInfo {
                    context_window: window,
                    pricing: ModelPricing {
                        input_per_mtok: input,
                        output_per_mtok: output,
                        cached_per_mtok: cached,
                    },
                },
            );
        };

        add("gpt-4o", 128_000, 2.50, 10.00, 1.25);
        add("gpt-4o-mini", 128_000, 0.15, 0.60, 0.075);
        add("gpt-4.1", 1_047_576, 2.00, 8.00, 0.50);
        add("gpt-4.1-mini", 1_047_576, 0.40, 1.60, 0.10);
        add("gpt-5", 400_000, 1.25, 10.00, 0.125);
        add("gpt-5-mini", 400_000, 0.25, 2.00, 0.025);
        add("o3", 200_000, 2.00, 8.00, 0.50);
        add("o4-mini", 200_000, 1.10, 4.40, 0.275);
        add("claude-sonnet-4-5", 200_000, 3.00, 15.00, 0.30);
        add("claude-haiku-4-5", 200_000, 1.00, 5.00, 0.10);
        add("claude-opus-4-1", 200_000, 15.00, 75.00, 1.50);

        Self { models }
    }

    /// Load a catalog from a JSON file mapping model id to [`ModelInfo`].
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let models: HashMap<String, ModelInfo> = serde_json::from_str(&raw)?;
        Ok(Self { models })
    }

    /// Add or replace an entry.
    pub fn insert(&mut self, model_id: impl Into<String>, info: ModelInfo) {
        self.models.insert(model_id.into(), info);
    }

    /// Look up a model by id.
    ///
    /// Ids are matched exactly first, then by the longest registered prefix so
    /// that dated releases (`gpt-4o-2024-08-06`) resolve to their family.
    #[must_use]
    pub fn lookup(&self, model_id: &str) -> Option<&ModelInfo> {
        if let Some(info) = self.models.get(model_id) {
            return Some(info);
        }
        self.models
            .iter()
            .filter(|(id, _)| model_id.starts_with(id.as_str()))
            .max_by_key(|(id, _)| id.len())
            .map(|(_, info)| info)
    }

    /// Whether the model is present in the catalog.
    #[must_use]
    pub fn contains(&self, model_id: &str) -> bool {
        self.lookup(model_id).is_some()
    }

    /// Context window for a model, falling back to
    /// [`DEFAULT_CONTEXT_WINDOW`] for unknown ids.
    #[must_use]
    pub fn context_window(&self, model_id: &str) -> u64 {
        self.lookup(model_id)
            .map_or(DEFAULT_CONTEXT_WINDOW, |info| info.context_window)
    }

    /// Pricing for a model, zero for unknown ids.
    #[must_use]
    pub fn pricing(&self, model_id: &str) -> ModelPricing {
        self.lookup(model_id)
            .map(|info| info.pricing)
            .unwrap_or_default()
    }
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Whether the model belongs to a reasoning class.
///
/// Reasoning models take a `reasoning_effort` parameter and reject
/// `temperature`; everything else gets plain sampling parameters.
#[must_use]
pub fn is_reasoning_model(model_id: &str) -> bool {
    let name = model_id.split('/').next_back().unwrap_or(model_id);
    name.starts_with("o1")
        || name.starts_with("o3")
        || name.starts_with("o4")
        || name.starts_with("gpt-5")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_and_prefix_lookup() {
        let catalog = ModelCatalog::builtin();
        assert!(catalog.contains("gpt-4o"));
        assert!(catalog.contains("gpt-4o-2024-08-06"));
        assert!(!catalog.contains("totally-made-up"));
    }

    #[test]
    fn prefix_lookup_prefers_longest() {
        let catalog = ModelCatalog::builtin();
        // gpt-4o-mini-… must resolve to gpt-4o-mini, not gpt-4o.
        let info = catalog.lookup("gpt-4o-mini-2024-07-18").expect("entry");
        assert!((info.pricing.input_per_mtok - 0.15).abs() < f64::EPSILON);
    }

    #[test]
    fn unknown_model_defaults() {
        let catalog = ModelCatalog::builtin();
        assert_eq!(catalog.context_window("mystery"), DEFAULT_CONTEXT_WINDOW);
        assert!((catalog.pricing("mystery").input_per_mtok).abs() < f64::EPSILON);
    }

    #[test]
    fn reasoning_classes() {
        assert!(is_reasoning_model("o3"));
        assert!(is_reasoning_model("o4-mini"));
        assert!(is_reasoning_model("gpt-5-mini"));
        assert!(is_reasoning_model("openai/o1-preview"));
        assert!(!is_reasoning_model("gpt-4o"));
        assert!(!is_reasoning_model("claude-sonnet-4-5"));
    }
}
