//! Simulation Configuration
//!
//! Loaded from an optional TOML file, then overridden from `EGRESS_*`
//! environment variables, then from command-line flags in `main`.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::navigation::Strategy;
use crate::types::{Error, Result};

/// Complete simulation configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub building: BuildingConfig,
    pub population: PopulationConfig,
    pub timing: TimingConfig,
    pub hazards: HazardConfig,
    pub navigation: NavigationConfig,
}

/// Grid size and generator seed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildingConfig {
    pub floors: usize,
    pub rows: usize,
    pub cols: usize,
    /// Random when unset
    pub seed: Option<u64>,
}

impl Default for BuildingConfig {
    fn default() -> Self {
        Self {
            floors: 2,
            rows: 6,
            cols: 6,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PopulationConfig {
    pub occupants: usize,
    pub reduced_mobility_probability: f64,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            occupants: 8,
            reduced_mobility_probability: 0.16,
        }
    }
}

/// Delays and intervals, in milliseconds unless noted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub tick_ms: u64,
    pub step_ms: u64,
    pub reduced_step_ms: u64,
    pub elevator_transit_ms: u64,
    pub stair_per_floor_ms: u64,
    pub reduced_stair_per_floor_ms: u64,
    pub elevator_reply_timeout_ms: u64,
    pub evacuation_retry_ms: u64,
    pub responder_work_ms: u64,
    pub incident_interval_ms: u64,
    pub dispatch_timeout_ms: u64,
    pub max_redispatch: u32,
    pub run_duration_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            tick_ms: 50,
            step_ms: 200,
            reduced_step_ms: 500,
            elevator_transit_ms: 800,
            stair_per_floor_ms: 600,
            reduced_stair_per_floor_ms: 1800,
            elevator_reply_timeout_ms: 1000,
            evacuation_retry_ms: 1000,
            responder_work_ms: 2000,
            incident_interval_ms: 5000,
            dispatch_timeout_ms: 15000,
            max_redispatch: 3,
            run_duration_secs: 40,
        }
    }
}

impl TimingConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn elevator_reply_timeout(&self) -> Duration {
        Duration::from_millis(self.elevator_reply_timeout_ms)
    }

    pub fn evacuation_retry(&self) -> Duration {
        Duration::from_millis(self.evacuation_retry_ms)
    }

    pub fn responder_work(&self) -> Duration {
        Duration::from_millis(self.responder_work_ms)
    }

    pub fn incident_interval(&self) -> Duration {
        Duration::from_millis(self.incident_interval_ms)
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch_timeout_ms)
    }

    pub fn run_duration(&self) -> Duration {
        Duration::from_secs(self.run_duration_secs)
    }
}

/// Hazard probabilities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HazardConfig {
    /// Per adjacency edge, when a fire starts
    pub fire_spread_probability: f64,
    /// Per room, when an earthquake hits
    pub earthquake_damage_probability: f64,
    pub escalation_fire_probability: f64,
    pub escalation_lock_probability: f64,
    pub escalation_aftershock_probability: f64,
}

impl Default for HazardConfig {
    fn default() -> Self {
        Self {
            fire_spread_probability: 0.05,
            earthquake_damage_probability: 0.5,
            escalation_fire_probability: 0.01,
            escalation_lock_probability: 0.01,
            escalation_aftershock_probability: 0.01,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    pub strategy: Strategy,
}

impl SimulationConfig {
    /// Load from a TOML file; missing keys keep their defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Apply `EGRESS_*` overrides from the process environment
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Apply `EGRESS_*` overrides from an arbitrary lookup
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = parse_var(&lookup, "EGRESS_FLOORS")? {
            self.building.floors = v;
        }
        if let Some(v) = parse_var(&lookup, "EGRESS_ROWS")? {
            self.building.rows = v;
        }
        if let Some(v) = parse_var(&lookup, "EGRESS_COLS")? {
            self.building.cols = v;
        }
        if let Some(v) = parse_var(&lookup, "EGRESS_OCCUPANTS")? {
            self.population.occupants = v;
        }
        if let Some(v) = parse_var(&lookup, "EGRESS_SEED")? {
            self.building.seed = Some(v);
        }
        if let Some(v) = parse_var(&lookup, "EGRESS_DURATION_SECS")? {
            self.timing.run_duration_secs = v;
        }
        Ok(())
    }

    /// Reject values the simulation cannot run with
    pub fn validate(&self) -> Result<()> {
        let b = &self.building;
        if b.floors == 0 || b.rows == 0 || b.cols == 0 {
            return Err(Error::Config(format!(
                "building dimensions must be non-zero, got {}x{}x{}",
                b.floors, b.rows, b.cols
            )));
        }

        let probabilities = [
            (
                "population.reduced_mobility_probability",
                self.population.reduced_mobility_probability,
            ),
            (
                "hazards.fire_spread_probability",
                self.hazards.fire_spread_probability,
            ),
            (
                "hazards.earthquake_damage_probability",
                self.hazards.earthquake_damage_probability,
            ),
            (
                "hazards.escalation_fire_probability",
                self.hazards.escalation_fire_probability,
            ),
            (
                "hazards.escalation_lock_probability",
                self.hazards.escalation_lock_probability,
            ),
            (
                "hazards.escalation_aftershock_probability",
                self.hazards.escalation_aftershock_probability,
            ),
        ];
        for (name, p) in probabilities {
            if !(0.0..=1.0).contains(&p) {
                return Err(Error::Config(format!("{name} must be within [0, 1], got {p}")));
            }
        }
        let escalation = self.hazards.escalation_fire_probability
            + self.hazards.escalation_lock_probability
            + self.hazards.escalation_aftershock_probability;
        if escalation > 1.0 {
            return Err(Error::Config(format!(
                "escalation probabilities sum to {escalation}, more than 1"
            )));
        }

        let t = &self.timing;
        let intervals = [
            ("timing.tick_ms", t.tick_ms),
            ("timing.step_ms", t.step_ms),
            ("timing.reduced_step_ms", t.reduced_step_ms),
            ("timing.elevator_reply_timeout_ms", t.elevator_reply_timeout_ms),
            ("timing.evacuation_retry_ms", t.evacuation_retry_ms),
            ("timing.incident_interval_ms", t.incident_interval_ms),
            ("timing.dispatch_timeout_ms", t.dispatch_timeout_ms),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(Error::Config(format!("{name} must be greater than zero")));
            }
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("{key}={raw:?} is not a valid value"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = SimulationConfig::default();
        config.validate().unwrap();
        assert_eq!(config.population.reduced_mobility_probability, 0.16);
        assert_eq!(config.navigation.strategy, Strategy::Optimal);
    }

    #[test]
    fn test_load_partial_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[building]
floors = 4
seed = 9

[timing]
step_ms = 10

[navigation]
strategy = "greedy"
"#
        )
        .unwrap();

        let config = SimulationConfig::load(file.path()).unwrap();
        assert_eq!(config.building.floors, 4);
        assert_eq!(config.building.seed, Some(9));
        assert_eq!(config.building.rows, BuildingConfig::default().rows);
        assert_eq!(config.timing.step_ms, 10);
        assert_eq!(config.navigation.strategy, Strategy::Greedy);
    }

    #[test]
    fn test_bad_toml_is_a_config_error() {
        assert!(matches!(
            SimulationConfig::from_toml("[building]\nfloors = \"many\""),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            SimulationConfig::load("/definitely/not/here.toml"),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("EGRESS_FLOORS", "3"),
            ("EGRESS_OCCUPANTS", " 12 "),
            ("EGRESS_SEED", "77"),
        ]);
        let mut config = SimulationConfig::default();
        config
            .apply_env_with(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.building.floors, 3);
        assert_eq!(config.population.occupants, 12);
        assert_eq!(config.building.seed, Some(77));
        assert_eq!(config.building.cols, BuildingConfig::default().cols);

        let bad = |key: &str| (key == "EGRESS_ROWS").then(|| "wide".to_string());
        assert!(config.apply_env_with(bad).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = SimulationConfig::default();
        config.building.cols = 0;
        assert!(config.validate().is_err());

        let mut config = SimulationConfig::default();
        config.hazards.fire_spread_probability = 1.5;
        assert!(config.validate().is_err());

        let mut config = SimulationConfig::default();
        config.timing.tick_ms = 0;
        assert!(config.validate().is_err());
    }
}
