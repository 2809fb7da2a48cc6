//! Credit pricing per model tier, and the static model catalogue.

use serde::Serialize;

/// Shortest video the backend produces, in seconds.
pub const MIN_DURATION_SECS: u32 = 5;
/// Longest video the backend produces, in seconds.
pub const MAX_DURATION_SECS: u32 = 10;
/// Typical end-to-end generation time quoted to callers.
pub const ESTIMATED_TIME_MINUTES: u32 = 2;

/// Supported aspect ratios, as the remote backend spells them.
pub const SUPPORTED_RATIOS: &[&str] = &["16:9", "9:16", "1:1"];

/// Generation model tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ModelTier {
    #[serde(rename = "gen3a_turbo")]
    Gen3aTurbo,
    #[serde(rename = "gen3a")]
    Gen3a,
}

impl ModelTier {
    /// Tier used when a request names no model or an unknown one.
    pub const DEFAULT: ModelTier = ModelTier::Gen3aTurbo;

    /// Every tier, cheapest first.
    pub const ALL: [ModelTier; 2] = [ModelTier::Gen3aTurbo, ModelTier::Gen3a];

    /// Resolve a model id. Unknown ids fall back to [`ModelTier::DEFAULT`].
    pub fn resolve(model: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|tier| tier.id() == model)
            .unwrap_or(Self::DEFAULT)
    }

    pub fn id(&self) -> &'static str {
        match self {
            Self::Gen3aTurbo => "gen3a_turbo",
            Self::Gen3a => "gen3a",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Gen3aTurbo => "Gen-3 Alpha Turbo",
            Self::Gen3a => "Gen-3 Alpha",
        }
    }

    pub fn quality(&self) -> &'static str {
        match self {
            Self::Gen3aTurbo => "turbo",
            Self::Gen3a => "standard",
        }
    }

    pub fn cost_per_second(&self) -> u32 {
        match self {
            Self::Gen3aTurbo => 5,
            Self::Gen3a => 10,
        }
    }

    fn description(&self) -> &'static str {
        match self {
            Self::Gen3aTurbo => "Fast, high-quality video generation with Runway Gen-3 Alpha Turbo",
            Self::Gen3a => "Premium quality video generation with Runway Gen-3 Alpha",
        }
    }
}

impl std::fmt::Display for ModelTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// Per-second rate breakdown of an estimate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CostBreakdown {
    pub base_model: ModelTier,
    pub cost_per_second: u32,
    pub total_seconds: u32,
    pub total_credits: u32,
}

/// Result of [`estimate_cost`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CostEstimate {
    /// The tier actually priced (after fallback).
    pub model: ModelTier,
    pub duration: u32,
    pub cost_credits: u32,
    pub cost_breakdown: CostBreakdown,
    pub estimated_time_minutes: u32,
    pub quality: &'static str,
}

/// Price a generation: `cost_per_second[model] * duration`.
///
/// Unknown models are priced at the default tier rather than rejected.
pub fn estimate_cost(duration: u32, model: &str) -> CostEstimate {
    let tier = ModelTier::resolve(model);
    let cost_credits = tier.cost_per_second() * duration;
    CostEstimate {
        model: tier,
        duration,
        cost_credits,
        cost_breakdown: CostBreakdown {
            base_model: tier,
            cost_per_second: tier.cost_per_second(),
            total_seconds: duration,
            total_credits: cost_credits,
        },
        estimated_time_minutes: ESTIMATED_TIME_MINUTES,
        quality: tier.quality(),
    }
}

/// Catalogue entry returned by the models endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub max_duration: u32,
    pub quality: &'static str,
    pub cost_per_second: u32,
    pub supports_image_input: bool,
    pub supports_text_input: bool,
    pub aspect_ratios: &'static [&'static str],
}

/// The static model catalogue.
pub fn list_models() -> Vec<ModelInfo> {
    ModelTier::ALL
        .into_iter()
        .map(|tier| ModelInfo {
            id: tier.id(),
            name: tier.display_name(),
            description: tier.description(),
            max_duration: MAX_DURATION_SECS,
            quality: tier.quality(),
            cost_per_second: tier.cost_per_second(),
            supports_image_input: true,
            supports_text_input: true,
            aspect_ratios: SUPPORTED_RATIOS,
        })
        .collect()
}
