//! Static registry of the vision models the navigation service accepts.

use crate::protocol::{NavigationStep, TokenUsage};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    Fast,
    Balanced,
    Premium,
}

#[derive(Debug, Clone, Serialize)]
pub struct VisionModel {
    pub id: &'static str,
    pub display_name: &'static str,
    pub provider: &'static str,
    pub input_cost_per_1m_tokens: f64,
    pub output_cost_per_1m_tokens: f64,
    pub tier: ModelTier,
    pub recommended: bool,
}

impl VisionModel {
    /// Cost in USD of one step's usage.
    pub fn cost(&self, usage: &TokenUsage) -> f64 {
        (usage.prompt_tokens as f64 * self.input_cost_per_1m_tokens
            + usage.completion_tokens as f64 * self.output_cost_per_1m_tokens)
            / 1_000_000.0
    }
}

const VISION_MODELS: &[VisionModel] = &[
    VisionModel {
        id: "gpt-4o",
        display_name: "GPT-4o",
        provider: "openai",
        input_cost_per_1m_tokens: 2.5,
        output_cost_per_1m_tokens: 10.0,
        tier: ModelTier::Balanced,
        recommended: true,
    },
    VisionModel {
        id: "gpt-4o-mini",
        display_name: "GPT-4o mini",
        provider: "openai",
        input_cost_per_1m_tokens: 0.15,
        output_cost_per_1m_tokens: 0.6,
        tier: ModelTier::Fast,
        recommended: false,
    },
    VisionModel {
        id: "claude-3-5-sonnet",
        display_name: "Claude 3.5 Sonnet",
        provider: "anthropic",
        input_cost_per_1m_tokens: 3.0,
        output_cost_per_1m_tokens: 15.0,
        tier: ModelTier::Premium,
        recommended: true,
    },
    VisionModel {
        id: "claude-3-5-haiku",
        display_name: "Claude 3.5 Haiku",
        provider: "anthropic",
        input_cost_per_1m_tokens: 0.8,
        output_cost_per_1m_tokens: 4.0,
        tier: ModelTier::Fast,
        recommended: false,
    },
    VisionModel {
        id: "gemini-2.0-flash",
        display_name: "Gemini 2.0 Flash",
        provider: "google",
        input_cost_per_1m_tokens: 0.1,
        output_cost_per_1m_tokens: 0.4,
        tier: ModelTier::Fast,
        recommended: false,
    },
    VisionModel {
        id: "gemini-1.5-pro",
        display_name: "Gemini 1.5 Pro",
        provider: "google",
        input_cost_per_1m_tokens: 1.25,
        output_cost_per_1m_tokens: 5.0,
        tier: ModelTier::Premium,
        recommended: false,
    },
];

pub struct ModelRegistry;

impl ModelRegistry {
    pub fn all() -> &'static [VisionModel] {
        VISION_MODELS
    }

    pub fn find(id: &str) -> Option<&'static VisionModel> {
        VISION_MODELS.iter().find(|m| m.id == id)
    }

    pub fn contains(id: &str) -> bool {
        Self::find(id).is_some()
    }

    pub fn recommended() -> impl Iterator<Item = &'static VisionModel> {
        VISION_MODELS.iter().filter(|m| m.recommended)
    }

    /// `None` when the model is not registered.
    pub fn estimate_cost(model: &str, usage: &TokenUsage) -> Option<f64> {
        Self::find(model).map(|m| m.cost(usage))
    }

    pub fn session_cost(model: &str, steps: &[NavigationStep]) -> Option<f64> {
        let m = Self::find(model)?;
        Some(steps.iter().map(|s| m.cost(&s.tokens_used)).sum())
    }
}
