//! PressureManager (C14): a read-mostly gauge of how much headroom the
//! rest of the pipeline has to spend on quality right now.
//!
//! Grounded on the teacher's `MemoryManager`/`ResourceStatus`
//! (`memory/manager.rs`): the same `sysinfo`-backed RAM-percentage probe
//! and Healthy/Warning/Critical banding, repurposed here into the
//! High/Medium/Low pressure gauge the design names, with an explicit
//! hint able to override the probe (§5: "written only by its own probe
//! loop, read everywhere else").

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Timelike;
use sysinfo::System;

use crate::config::{PressureConfig, PressureLevel, PressureLevelSettings};

fn level_to_u8(level: PressureLevel) -> u8 {
    match level {
        PressureLevel::High => 0,
        PressureLevel::Medium => 1,
        PressureLevel::Low => 2,
    }
}

fn u8_to_level(v: u8) -> PressureLevel {
    match v {
        0 => PressureLevel::High,
        1 => PressureLevel::Medium,
        _ => PressureLevel::Low,
    }
}

pub struct PressureManager {
    config: PressureConfig,
    system: Mutex<System>,
    current: AtomicU8,
    explicit_hint: Mutex<Option<PressureLevel>>,
}

impl PressureManager {
    pub fn new(config: PressureConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            system: Mutex::new(System::new_all()),
            current: AtomicU8::new(level_to_u8(PressureLevel::Medium)),
            explicit_hint: Mutex::new(None),
        })
    }

    /// An operator- or caller-supplied override. Takes priority over the
    /// automatic probe until cleared with `clear_hint`.
    pub fn set_hint(&self, level: Option<PressureLevel>) {
        *self.explicit_hint.lock().unwrap() = level;
    }

    pub fn level(&self) -> PressureLevel {
        u8_to_level(self.current.load(Ordering::Relaxed))
    }

    pub fn settings(&self) -> PressureLevelSettings {
        match self.level() {
            PressureLevel::High => self.config.high.clone(),
            PressureLevel::Medium => self.config.medium.clone(),
            PressureLevel::Low => self.config.low.clone(),
        }
    }

    /// Re-derives the level: explicit hint, else a CPU/RAM load heuristic,
    /// else a time-of-day business-hours window, else `Medium`.
    pub fn refresh(&self) {
        if let Some(hint) = *self.explicit_hint.lock().unwrap() {
            self.current.store(level_to_u8(hint), Ordering::Relaxed);
            return;
        }

        let ram_percent = {
            let mut system = self.system.lock().unwrap();
            system.refresh_memory();
            let total = system.total_memory().max(1) as f64;
            let used = system.used_memory() as f64;
            used / total * 100.0
        };

        let load_level = if ram_percent >= 85.0 {
            PressureLevel::High
        } else if ram_percent >= 60.0 {
            PressureLevel::Medium
        } else {
            PressureLevel::Low
        };

        let level = if load_level != PressureLevel::Low {
            load_level
        } else {
            business_hours_level()
        };

        self.current.store(level_to_u8(level), Ordering::Relaxed);
    }

    /// `(accept, suggested_level)`: whether a result of `quality` meeting
    /// `latency_ms` clears the bar for the current level, and if not,
    /// which level it *would* clear (quality negotiation, §4.12).
    pub fn negotiate(&self, quality: f32, latency_ms: u64) -> (bool, PressureLevel) {
        let settings = self.settings();
        if quality >= settings.min_quality && latency_ms <= settings.max_latency_ms {
            return (true, self.level());
        }
        for candidate in [PressureLevel::High, PressureLevel::Medium, PressureLevel::Low] {
            let candidate_settings = match candidate {
                PressureLevel::High => &self.config.high,
                PressureLevel::Medium => &self.config.medium,
                PressureLevel::Low => &self.config.low,
            };
            if quality >= candidate_settings.min_quality && latency_ms <= candidate_settings.max_latency_ms {
                return (!settings.can_reject, candidate);
            }
        }
        (!settings.can_reject, PressureLevel::Low)
    }

    pub fn grace_ms(&self) -> u64 {
        self.config.grace_ms
    }
}

/// 9am-6pm local is treated as business hours (`Medium`); outside that
/// window there is more headroom for `Low`-pressure full-quality runs.
fn business_hours_level() -> PressureLevel {
    let hour = chrono::Local::now().hour();
    if (9..18).contains(&hour) {
        PressureLevel::Medium
    } else {
        PressureLevel::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_hint_overrides_the_automatic_probe() {
        let manager = PressureManager::new(PressureConfig::default());
        manager.set_hint(Some(PressureLevel::High));
        manager.refresh();
        assert_eq!(manager.level(), PressureLevel::High);
    }

    #[test]
    fn negotiate_accepts_when_quality_and_latency_clear_the_current_bar() {
        let manager = PressureManager::new(PressureConfig::default());
        manager.set_hint(Some(PressureLevel::Low));
        manager.refresh();
        let (accepted, level) = manager.negotiate(0.9, 500);
        assert!(accepted);
        assert_eq!(level, PressureLevel::Low);
    }

    #[test]
    fn negotiate_suggests_a_looser_level_when_the_current_bar_is_not_met() {
        let manager = PressureManager::new(PressureConfig::default());
        manager.set_hint(Some(PressureLevel::Low));
        manager.refresh();
        let (accepted, suggested) = manager.negotiate(0.70, 500);
        assert!(!accepted);
        assert_ne!(suggested, PressureLevel::Low);
    }
}
