//! ModelRegistry & Router (C4).
//!
//! Resolves `(role, tier)` to a concrete `ModelDescriptor`, and exposes
//! `ascend` for the escalation controller to climb tiers. Grounded on the
//! source's `AgentConfig` builder idiom (`agent/types.rs`), generalized
//! from a single agent-type-to-model mapping into the fixed
//! role x tier matrix the design calls for.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::AppConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    General,
    Code,
    Content,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    VeryFast,
    Fast,
    General,
    Escalation,
    God,
}

impl Tier {
    const ORDER: [Tier; 5] = [
        Tier::VeryFast,
        Tier::Fast,
        Tier::General,
        Tier::Escalation,
        Tier::God,
    ];

    /// Next tier in the escalation sequence. Saturates at `God`: past god
    /// it returns itself, so callers can loop `ascend` without checking.
    pub fn next(self) -> Tier {
        let idx = Self::ORDER.iter().position(|t| *t == self).unwrap_or(0);
        Self::ORDER.get(idx + 1).copied().unwrap_or(Tier::God)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeedTier {
    VeryFast,
    Fast,
    Medium,
    Slow,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostTier {
    Free,
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QualityTier {
    Poor,
    Good,
    VeryGood,
    Excellent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub id: String,
    pub role: Role,
    pub tier: Tier,
    pub speed_tier: SpeedTier,
    pub cost_tier: CostTier,
    pub quality_tier: QualityTier,
    pub context_window: u32,
    pub supports_streaming: bool,
    /// Which configured backend (§6.5, §6.7) to dispatch `generate` to.
    pub backend: String,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    #[error("no model resolves for role={0:?} tier={1:?}, and no fallback entry exists")]
    Unresolved(Role, Tier),
}

/// Holds the `(role, tier) -> ModelDescriptor` matrix and enforces the
/// safety rule that a paid backend is only ever resolved if its config
/// entry is `enabled=true`.
pub struct ModelRegistry {
    table: HashMap<(Role, Tier), ModelDescriptor>,
}

impl ModelRegistry {
    /// Build the default free-tier-only registry, entirely backed by the
    /// local Ollama backend, mirroring the "default resolved set must not
    /// include any paid backend" safety rule.
    pub fn from_config(config: &AppConfig) -> Self {
        let mut table = HashMap::new();

        let ollama_enabled = config
            .backends
            .get("ollama")
            .map(|b| b.enabled)
            .unwrap_or(true);

        if ollama_enabled {
            for role in [Role::General, Role::Code, Role::Content] {
                for (tier, model_id, ctx) in [
                    (Tier::VeryFast, "llama3.2:1b", 4096),
                    (Tier::Fast, "llama3.2:3b", 8192),
                    (Tier::General, "llama3.1:8b", 16384),
                    (Tier::Escalation, "llama3.1:70b", 32768),
                    (Tier::God, "llama3.1:70b", 32768),
                ] {
                    table.insert(
                        (role, tier),
                        ModelDescriptor {
                            id: model_id.to_string(),
                            role,
                            tier,
                            speed_tier: match tier {
                                Tier::VeryFast => SpeedTier::VeryFast,
                                Tier::Fast => SpeedTier::Fast,
                                Tier::General => SpeedTier::Medium,
                                _ => SpeedTier::Slow,
                            },
                            cost_tier: CostTier::Free,
                            quality_tier: match tier {
                                Tier::VeryFast | Tier::Fast => QualityTier::Good,
                                Tier::General => QualityTier::VeryGood,
                                _ => QualityTier::Excellent,
                            },
                            context_window: ctx,
                            supports_streaming: true,
                            backend: "ollama".to_string(),
                        },
                    );
                }
            }
        }

        // Any additional backend declared `enabled=true` in config may
        // override individual (role, tier) entries, including paid ones --
        // but only because the operator opted in explicitly.
        for (name, backend) in &config.backends {
            if name == "ollama" || !backend.enabled {
                continue;
            }
            for (role_tier, model_id) in &backend.model_map {
                if let Some((role_str, tier_str)) = role_tier.split_once(':') {
                    if let (Some(role), Some(tier)) = (parse_role(role_str), parse_tier(tier_str)) {
                        table.insert(
                            (role, tier),
                            ModelDescriptor {
                                id: model_id.clone(),
                                role,
                                tier,
                                speed_tier: SpeedTier::Medium,
                                cost_tier: if backend.cost_tier == "free" {
                                    CostTier::Free
                                } else {
                                    CostTier::Medium
                                },
                                quality_tier: QualityTier::Excellent,
                                context_window: 32768,
                                supports_streaming: false,
                                backend: name.clone(),
                            },
                        );
                    }
                }
            }
        }

        Self { table }
    }

    /// Resolution order: exact (role,tier) -> (role,general) ->
    /// (general,tier) -> (general,general).
    pub fn pick(&self, role: Role, tier: Tier) -> Result<ModelDescriptor, RegistryError> {
        if let Some(d) = self.table.get(&(role, tier)) {
            return Ok(d.clone());
        }
        if let Some(d) = self.table.get(&(role, Tier::General)) {
            return Ok(d.clone());
        }
        if let Some(d) = self.table.get(&(Role::General, tier)) {
            return Ok(d.clone());
        }
        if let Some(d) = self.table.get(&(Role::General, Tier::General)) {
            return Ok(d.clone());
        }
        Err(RegistryError::Unresolved(role, tier))
    }

    /// Ascend to the next tier's descriptor for the same role. Past
    /// `God` it returns the same descriptor (via `Tier::next`'s saturation).
    pub fn ascend(&self, descriptor: &ModelDescriptor) -> Result<ModelDescriptor, RegistryError> {
        self.pick(descriptor.role, descriptor.tier.next())
    }
}

fn parse_role(s: &str) -> Option<Role> {
    match s {
        "general" => Some(Role::General),
        "code" => Some(Role::Code),
        "content" => Some(Role::Content),
        _ => None,
    }
}

fn parse_tier(s: &str) -> Option<Tier> {
    match s {
        "veryfast" => Some(Tier::VeryFast),
        "fast" => Some(Tier::Fast),
        "general" => Some(Tier::General),
        "escalation" => Some(Tier::Escalation),
        "god" => Some(Tier::God),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_ascension_saturates_at_god() {
        assert_eq!(Tier::VeryFast.next(), Tier::Fast);
        assert_eq!(Tier::Escalation.next(), Tier::God);
        assert_eq!(Tier::God.next(), Tier::God);
    }

    #[test]
    fn default_registry_resolves_exact_role_tier() {
        let registry = ModelRegistry::from_config(&AppConfig::default());
        let d = registry.pick(Role::Code, Tier::Fast).unwrap();
        assert_eq!(d.tier, Tier::Fast);
        assert_eq!(d.cost_tier, CostTier::Free);
    }

    #[test]
    fn default_registry_never_resolves_a_paid_backend() {
        let registry = ModelRegistry::from_config(&AppConfig::default());
        for tier in Tier::ORDER {
            for role in [Role::General, Role::Code, Role::Content] {
                let d = registry.pick(role, tier).unwrap();
                assert_eq!(d.cost_tier, CostTier::Free);
            }
        }
    }

    #[test]
    fn ascend_climbs_tiers_for_same_role() {
        let registry = ModelRegistry::from_config(&AppConfig::default());
        let start = registry.pick(Role::Code, Tier::VeryFast).unwrap();
        let next = registry.ascend(&start).unwrap();
        assert_eq!(next.tier, Tier::Fast);
    }
}
