use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{SCORE_MAX, SCORE_MIN};
use crate::EngineError;

/// Tunables for the rank-based grade interpolator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StrategyConfig {
    pub breakout_bonus: f64,
    pub reports_remaining_factor: f64,
    pub ballast_deduction: f64,
    pub min_ballast_grade: f64,
    pub max_grade_cap: f64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            breakout_bonus: 0.30,
            reports_remaining_factor: 0.10,
            ballast_deduction: 0.20,
            min_ballast_grade: 3.60,
            max_grade_cap: 4.90,
        }
    }
}

impl StrategyConfig {
    /// Validates interpolator bounds.
    ///
    /// # Errors
    /// Returns [`EngineError::Configuration`] when a factor is negative or a
    /// grade bound falls outside the grading scale.
    pub fn validate(&self) -> Result<(), EngineError> {
        for (name, value) in [
            ("breakout_bonus", self.breakout_bonus),
            ("reports_remaining_factor", self.reports_remaining_factor),
            ("ballast_deduction", self.ballast_deduction),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(EngineError::Configuration(format!(
                    "{name} MUST be a finite value >= 0.0"
                )));
            }
        }

        for (name, value) in [
            ("min_ballast_grade", self.min_ballast_grade),
            ("max_grade_cap", self.max_grade_cap),
        ] {
            if !(SCORE_MIN..=SCORE_MAX).contains(&value) {
                return Err(EngineError::Configuration(format!(
                    "{name} MUST be in [{SCORE_MIN:.2}, {SCORE_MAX:.2}]"
                )));
            }
        }

        if self.min_ballast_grade > self.max_grade_cap {
            return Err(EngineError::Configuration(
                "min_ballast_grade cannot exceed max_grade_cap".to_string(),
            ));
        }

        Ok(())
    }

    /// Decodes and validates a strategy config from JSON. Missing fields
    /// take their default values.
    ///
    /// # Errors
    /// Returns [`EngineError::Configuration`] when decoding or validation fails.
    pub fn from_json(value: &Value) -> Result<Self, EngineError> {
        let config: Self = serde_json::from_value(value.clone()).map_err(|err| {
            EngineError::Configuration(format!("invalid strategy config JSON payload: {err}"))
        })?;
        config.validate()?;
        Ok(config)
    }
}

/// Tunables for the water-filling budget optimizer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OptimizerConfig {
    pub target_aggregate: f64,
    pub margin: f64,
    pub min_increment: f64,
    pub tolerance: f64,
    pub working_floor: f64,
    pub working_ceiling: f64,
    pub max_raise_rounds: u32,
    pub max_cut_rounds: u32,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            target_aggregate: 4.10,
            margin: 0.05,
            min_increment: 0.01,
            tolerance: 0.009,
            working_floor: 2.00,
            working_ceiling: 5.00,
            max_raise_rounds: 100,
            max_cut_rounds: 200,
        }
    }
}

impl OptimizerConfig {
    /// Validates optimizer bounds.
    ///
    /// # Errors
    /// Returns [`EngineError::Configuration`] when targets leave the grading
    /// scale, the working band is inverted, or the step is not positive.
    pub fn validate(&self) -> Result<(), EngineError> {
        for (name, value) in [
            ("target_aggregate", self.target_aggregate),
            ("working_floor", self.working_floor),
            ("working_ceiling", self.working_ceiling),
        ] {
            if !(SCORE_MIN..=SCORE_MAX).contains(&value) {
                return Err(EngineError::Configuration(format!(
                    "{name} MUST be in [{SCORE_MIN:.2}, {SCORE_MAX:.2}]"
                )));
            }
        }

        if self.working_floor >= self.working_ceiling {
            return Err(EngineError::Configuration(
                "working_floor MUST be below working_ceiling".to_string(),
            ));
        }

        if !self.min_increment.is_finite() || self.min_increment < 0.01 {
            return Err(EngineError::Configuration(
                "min_increment MUST be >= 0.01".to_string(),
            ));
        }

        for (name, value) in [("margin", self.margin), ("tolerance", self.tolerance)] {
            if !value.is_finite() || value < 0.0 {
                return Err(EngineError::Configuration(format!(
                    "{name} MUST be a finite value >= 0.0"
                )));
            }
        }

        Ok(())
    }

    /// Decodes and validates an optimizer config from JSON. Missing fields
    /// take their default values.
    ///
    /// # Errors
    /// Returns [`EngineError::Configuration`] when decoding or validation fails.
    pub fn from_json(value: &Value) -> Result<Self, EngineError> {
        let config: Self = serde_json::from_value(value.clone()).map_err(|err| {
            EngineError::Configuration(format!("invalid optimizer config JSON payload: {err}"))
        })?;
        config.validate()?;
        Ok(config)
    }

    #[must_use]
    pub fn with_target(mut self, target_aggregate: f64) -> Self {
        self.target_aggregate = target_aggregate;
        self
    }
}

/// Bands around the ideal cumulative average used to pick a per-cycle
/// target for future groups.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TargetConfig {
    pub ideal_target: f64,
    pub safe_zone_min: f64,
    pub safe_zone_max: f64,
    pub max_limit: f64,
    pub min_limit: f64,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            ideal_target: 4.00,
            safe_zone_min: 3.80,
            safe_zone_max: 4.20,
            max_limit: 4.40,
            min_limit: 3.60,
        }
    }
}

impl TargetConfig {
    /// Bands of 0.20 and 0.40 either side of `ideal_target`, held inside
    /// the working scale of 2.00 to 5.00.
    #[must_use]
    pub fn around(ideal_target: f64) -> Self {
        Self {
            ideal_target,
            safe_zone_min: (ideal_target - 0.20).max(2.00),
            safe_zone_max: (ideal_target + 0.20).min(SCORE_MAX),
            max_limit: (ideal_target + 0.40).min(SCORE_MAX),
            min_limit: (ideal_target - 0.40).max(2.00),
        }
    }

    /// Validates band ordering.
    ///
    /// # Errors
    /// Returns [`EngineError::Configuration`] when a bound leaves the grading
    /// scale or the bands are not nested around the ideal target.
    pub fn validate(&self) -> Result<(), EngineError> {
        let ordered = [
            ("min_limit", self.min_limit),
            ("safe_zone_min", self.safe_zone_min),
            ("ideal_target", self.ideal_target),
            ("safe_zone_max", self.safe_zone_max),
            ("max_limit", self.max_limit),
        ];
        for (name, value) in ordered {
            if !(SCORE_MIN..=SCORE_MAX).contains(&value) {
                return Err(EngineError::Configuration(format!(
                    "{name} MUST be in [{SCORE_MIN:.2}, {SCORE_MAX:.2}]"
                )));
            }
        }
        for pair in ordered.windows(2) {
            if pair[0].1 > pair[1].1 {
                return Err(EngineError::Configuration(format!(
                    "{} MUST NOT exceed {}",
                    pair[0].0, pair[1].0
                )));
            }
        }
        Ok(())
    }

    /// Decodes and validates a target config from JSON.
    ///
    /// # Errors
    /// Returns [`EngineError::Configuration`] when decoding or validation fails.
    pub fn from_json(value: &Value) -> Result<Self, EngineError> {
        let config: Self = serde_json::from_value(value.clone()).map_err(|err| {
            EngineError::Configuration(format!("invalid target config JSON payload: {err}"))
        })?;
        config.validate()?;
        Ok(config)
    }
}
