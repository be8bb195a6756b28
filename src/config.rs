//! Layered configuration (`<root>/config.yaml`, overridable via `--config`).
//!
//! Mirrors every tunable named in the design by name rather than hardcoding
//! it at the call site, following the builder-config idiom the rest of the
//! crate uses for its collaborators.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

fn default_root() -> String {
    "./agency-root".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub gate1: f32,
    pub min_quality: f32,
    pub max_age_secs: i64,
    pub stage2_temperature: f32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            gate1: 0.90,
            min_quality: 0.70,
            max_age_secs: 60 * 60 * 24 * 30,
            stage2_temperature: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationWeights {
    pub syntax: f32,
    pub structure: f32,
    pub imports: f32,
    pub undefined: f32,
    pub tool_call: f32,
    pub type_check: f32,
    pub security: f32,
    pub complexity: f32,
}

impl Default for ValidationWeights {
    fn default() -> Self {
        Self {
            syntax: 0.25,
            structure: 0.15,
            imports: 0.10,
            undefined: 0.15,
            tool_call: 0.10,
            type_check: 0.10,
            security: 0.10,
            complexity: 0.05,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub weights: ValidationWeights,
    pub max_cc: u32,
    pub min_mi: f32,
    pub tool_install_timeout_secs: u64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            weights: ValidationWeights::default(),
            max_cc: 15,
            min_mi: 20.0,
            tool_install_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationConfig {
    pub max_escalations: u32,
    pub min_accept_quality: f32,
    pub pattern_similarity_threshold: f32,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            max_escalations: 4,
            min_accept_quality: 0.75,
            pattern_similarity_threshold: 0.85,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PressureLevel {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PressureLevelSettings {
    pub min_quality: f32,
    pub max_latency_ms: u64,
    pub optimization: String,
    pub can_reject: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PressureConfig {
    pub high: PressureLevelSettings,
    pub medium: PressureLevelSettings,
    pub low: PressureLevelSettings,
    pub grace_ms: u64,
}

impl Default for PressureConfig {
    fn default() -> Self {
        Self {
            high: PressureLevelSettings {
                min_quality: 0.60,
                max_latency_ms: 1_000,
                optimization: "none".into(),
                can_reject: true,
            },
            medium: PressureLevelSettings {
                min_quality: 0.75,
                max_latency_ms: 10_000,
                optimization: "local-only".into(),
                can_reject: true,
            },
            low: PressureLevelSettings {
                min_quality: 0.85,
                max_latency_ms: u64::MAX,
                optimization: "full".into(),
                can_reject: false,
            },
            grace_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolutionConfig {
    pub budget: usize,
    pub drift_threshold: f32,
    pub rolling_window: usize,
    pub schedule_cron: String,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            budget: 5,
            drift_threshold: 0.15,
            rolling_window: 20,
            schedule_cron: "0 0 3 * * *".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub enabled: bool,
    pub base_url: Option<String>,
    #[serde(default)]
    pub model_map: HashMap<String, String>,
    #[serde(default)]
    pub cost_tier: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub root: String,
    pub cache: CacheConfig,
    pub validation: ValidationConfig,
    pub escalation: EscalationConfig,
    pub pressure: PressureConfig,
    pub evolution: EvolutionConfig,
    pub backends: HashMap<String, BackendConfig>,
    pub dangerous_tools_acknowledged: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        let mut backends = HashMap::new();
        backends.insert(
            "ollama".to_string(),
            BackendConfig {
                enabled: true,
                base_url: Some("http://localhost:11434".to_string()),
                model_map: HashMap::new(),
                cost_tier: "free".to_string(),
            },
        );
        Self {
            root: default_root(),
            cache: CacheConfig::default(),
            validation: ValidationConfig::default(),
            escalation: EscalationConfig::default(),
            pressure: PressureConfig::default(),
            evolution: EvolutionConfig::default(),
            backends,
            dangerous_tools_acknowledged: false,
        }
    }
}

impl AppConfig {
    /// Load from an explicit path, falling back to defaults if absent.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let candidate = path.map(|p| p.to_path_buf()).unwrap_or_else(|| {
            std::path::PathBuf::from("config.yaml")
        });

        if !candidate.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(&candidate)
            .with_context(|| format!("reading config file {}", candidate.display()))?;
        let mut cfg: AppConfig = serde_yaml::from_str(&raw)
            .with_context(|| format!("parsing config file {}", candidate.display()))?;

        // Env overrides, highest precedence, mirroring the "opt-in only" rule for API keys.
        if let Ok(root) = std::env::var("CODEGEN_CORE_ROOT") {
            cfg.root = root;
        }
        Ok(cfg)
    }

    pub fn paid_backends_enabled(&self) -> bool {
        self.backends
            .values()
            .any(|b| b.enabled && b.cost_tier != "free")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_no_enabled_paid_backend() {
        let cfg = AppConfig::default();
        assert!(!cfg.paid_backends_enabled());
    }

    #[test]
    fn default_config_round_trips_through_yaml() {
        let cfg = AppConfig::default();
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        let back: AppConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.cache.gate1, cfg.cache.gate1);
    }

    #[test]
    fn load_missing_file_falls_back_to_defaults() {
        let cfg = AppConfig::load(Some(Path::new("/nonexistent/path/config.yaml"))).unwrap();
        assert_eq!(cfg.root, default_root());
    }
}
