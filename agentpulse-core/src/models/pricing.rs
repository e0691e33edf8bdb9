use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::metrics::round_to;

/// Per-1K-token rates for one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelPricing {
    pub model: String,
    #[serde(alias = "input_price_per_1k")]
    pub input_price_per_1k: f64,
    #[serde(alias = "output_price_per_1k")]
    pub output_price_per_1k: f64,
}

impl ModelPricing {
    pub fn new(model: impl Into<String>, input_price_per_1k: f64, output_price_per_1k: f64) -> Self {
        Self {
            model: model.into(),
            input_price_per_1k,
            output_price_per_1k,
        }
    }

    pub fn calculate_cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        let input_cost = (input_tokens as f64 / 1000.0) * self.input_price_per_1k;
        let output_cost = (output_tokens as f64 / 1000.0) * self.output_price_per_1k;
        input_cost + output_cost
    }
}

#[derive(Debug, Clone)]
pub struct PricingTable {
    models: HashMap<String, ModelPricing>,
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::from_models(vec![
            ModelPricing::new("Claude Opus", 0.015, 0.075),
            ModelPricing::new("Claude Sonnet", 0.003, 0.015),
            ModelPricing::new("Claude Haiku", 0.00025, 0.00125),
            ModelPricing::new("GPT-4", 0.03, 0.06),
            ModelPricing::new("GPT-4o", 0.005, 0.015),
            ModelPricing::new("GPT-3.5-Turbo", 0.0005, 0.0015),
        ])
    }
}

impl PricingTable {
    pub fn from_models(models: Vec<ModelPricing>) -> Self {
        Self {
            models: models.into_iter().map(|m| (m.model.clone(), m)).collect(),
        }
    }

    /// Default table with `overrides` replacing or extending entries by model name.
    pub fn with_overrides(overrides: &[ModelPricing]) -> Self {
        let mut table = Self::default();
        for pricing in overrides {
            table.models.insert(pricing.model.clone(), pricing.clone());
        }
        table
    }

    pub fn get(&self, model: &str) -> Option<&ModelPricing> {
        self.models.get(model)
    }

    /// Estimated cost rounded to six decimals; unknown models cost nothing.
    pub fn estimate(&self, model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
        self.get(model)
            .map(|p| round_to(p.calculate_cost(input_tokens, output_tokens), 6))
            .unwrap_or(0.0)
    }

    pub fn models(&self) -> impl Iterator<Item = &ModelPricing> {
        self.models.values()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
