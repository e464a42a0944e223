// Rust guideline compliant 2026-10-10

//! Deterministic fraud rules for the transaction pipeline.
//!
//! [`RuleEngine::evaluate`] checks every rule against an event and returns a
//! [`Verdict`]. The engine holds only its immutable [`RuleConfig`]: the same
//! input always yields the same verdict, so a redelivered event is safe to
//! re-evaluate.

use std::collections::BTreeSet;
use std::ops::Range;

use chrono::{DateTime, NaiveDateTime, Timelike as _};
use domain::{AnalysisEvent, RuleId, Verdict};

/// Naive timestamp layouts accepted when the value carries no UTC offset.
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"];
/// `%z` accepts `+0200` as well as `+02:00`.
const OFFSET_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%dT%H:%M%z"];

// ---------------------------------------------------------------------------
// RuleConfigError
// ---------------------------------------------------------------------------

/// Errors raised while building a [`RuleConfig`].
#[derive(Debug, thiserror::Error)]
pub enum RuleConfigError {
    /// The supplied configuration is invalid.
    #[error("invalid rule configuration: {reason}")]
    InvalidConfig {
        /// Human-readable description of the problem.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// RuleConfig + builder
// ---------------------------------------------------------------------------

/// Thresholds and sets the rules compare against.
///
/// Construct via [`RuleConfig::builder`] or use [`RuleConfig::default`].
#[derive(Debug, Clone, PartialEq)]
pub struct RuleConfig {
    high_amount_threshold: f64,
    risky_locations: BTreeSet<String>,
    risky_hours: Range<u32>,
}

/// Builder for [`RuleConfig`].
///
/// Obtain via [`RuleConfig::builder`]; finalize with [`build`](Self::build).
#[derive(Debug)]
pub struct RuleConfigBuilder {
    high_amount_threshold: f64,
    risky_locations: BTreeSet<String>,
    risky_hours: Range<u32>,
}

impl RuleConfig {
    /// Create a builder preloaded with the production rule values:
    /// threshold `5000.00`, locations `{"Panamá", "Islas Caimán", "Suiza"}`,
    /// hours `2..4`.
    #[must_use]
    pub fn builder() -> RuleConfigBuilder {
        RuleConfigBuilder {
            high_amount_threshold: 5000.00,
            risky_locations: ["Panamá", "Islas Caimán", "Suiza"]
                .into_iter()
                .map(str::to_owned)
                .collect(),
            risky_hours: 2..4,
        }
    }

    /// Amounts strictly above this value trigger the high-amount rule.
    #[must_use]
    pub fn high_amount_threshold(&self) -> f64 {
        self.high_amount_threshold
    }

    /// Locations that trigger the risky-location rule (exact match).
    #[must_use]
    pub fn risky_locations(&self) -> &BTreeSet<String> {
        &self.risky_locations
    }

    /// Half-open hour-of-day window that triggers the risky-hour rule.
    #[must_use]
    pub fn risky_hours(&self) -> Range<u32> {
        self.risky_hours.clone()
    }
}

impl Default for RuleConfig {
    fn default() -> Self {
        let b = Self::builder();
        Self {
            high_amount_threshold: b.high_amount_threshold,
            risky_locations: b.risky_locations,
            risky_hours: b.risky_hours,
        }
    }
}

impl RuleConfigBuilder {
    /// Override the high-amount threshold.
    #[must_use]
    pub fn high_amount_threshold(mut self, threshold: f64) -> Self {
        self.high_amount_threshold = threshold;
        self
    }

    /// Replace the risky-location set.
    #[must_use]
    pub fn risky_locations<I, S>(mut self, locations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.risky_locations = locations.into_iter().map(Into::into).collect();
        self
    }

    /// Override the risky hour window (`start..end`, 24-hour clock).
    #[must_use]
    pub fn risky_hours(mut self, hours: Range<u32>) -> Self {
        self.risky_hours = hours;
        self
    }

    /// Validate and build the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RuleConfigError::InvalidConfig`] when the threshold is
    /// negative or not finite, or the hour window is empty or exceeds 24.
    #[must_use = "the Result must be checked; use ? or unwrap"]
    pub fn build(self) -> Result<RuleConfig, RuleConfigError> {
        if !self.high_amount_threshold.is_finite() || self.high_amount_threshold < 0.0 {
            return Err(RuleConfigError::InvalidConfig {
                reason: format!(
                    "high_amount_threshold must be finite and >= 0, got {}",
                    self.high_amount_threshold
                ),
            });
        }
        if self.risky_hours.start >= self.risky_hours.end || self.risky_hours.end > 24 {
            return Err(RuleConfigError::InvalidConfig {
                reason: format!(
                    "risky_hours must be a non-empty window within 0..24, got {:?}",
                    self.risky_hours
                ),
            });
        }
        Ok(RuleConfig {
            high_amount_threshold: self.high_amount_threshold,
            risky_locations: self.risky_locations,
            risky_hours: self.risky_hours,
        })
    }
}

// ---------------------------------------------------------------------------
// RuleEngine
// ---------------------------------------------------------------------------

/// Stateless evaluator of the fraud rules.
///
/// Every rule is checked on every call; the triggered list is always complete
/// and ordered `HighAmount`, `RiskyLocation`, `RiskyHour`.
#[derive(Debug, Clone, Default)]
pub struct RuleEngine {
    config: RuleConfig,
}

impl RuleEngine {
    /// Create an engine over `config`.
    #[must_use]
    pub fn new(config: RuleConfig) -> Self {
        Self { config }
    }

    /// The configuration this engine evaluates against.
    #[must_use]
    pub fn config(&self) -> &RuleConfig {
        &self.config
    }

    /// Evaluate all rules against raw attributes.
    ///
    /// An unparseable `timestamp` leaves the risky-hour rule untriggered; the
    /// other rules are still applied.
    #[must_use]
    pub fn evaluate(&self, amount: f64, location: &str, timestamp: &str) -> Verdict {
        let mut triggered = Vec::with_capacity(3);
        if self.is_high_amount(amount) {
            triggered.push(RuleId::HighAmount);
        }
        if self.is_risky_location(location) {
            triggered.push(RuleId::RiskyLocation);
        }
        if self.is_risky_hour(timestamp) {
            triggered.push(RuleId::RiskyHour);
        }
        Verdict::new(triggered)
    }

    /// Evaluate all rules against a decoded event.
    #[must_use]
    pub fn evaluate_event(&self, event: &AnalysisEvent) -> Verdict {
        self.evaluate(event.amount, &event.location, &event.timestamp)
    }

    fn is_high_amount(&self, amount: f64) -> bool {
        amount > self.config.high_amount_threshold
    }

    fn is_risky_location(&self, location: &str) -> bool {
        self.config.risky_locations.contains(location)
    }

    fn is_risky_hour(&self, timestamp: &str) -> bool {
        match hour_of(timestamp) {
            Some(hour) => self.config.risky_hours.contains(&hour),
            None => {
                tracing::debug!(timestamp, "rule_engine.risky_hour.unparseable");
                false
            }
        }
    }
}

/// Hour of day of an ISO-8601 timestamp.
///
/// With an explicit offset the hour is read in that offset; naive values
/// are taken as-is. Returns `None` for anything unparseable.
fn hour_of(timestamp: &str) -> Option<u32> {
    let timestamp = timestamp.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(timestamp) {
        return Some(dt.hour());
    }
    if let Some(dt) = OFFSET_FORMATS
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(timestamp, fmt).ok())
    {
        return Some(dt.hour());
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(timestamp, fmt).ok())
        // Hour-only (`2024-05-01T03`): chrono needs a minute field.
        .or_else(|| NaiveDateTime::parse_from_str(&format!("{timestamp}:00"), "%Y-%m-%dT%H:%M").ok())
        .map(|dt| dt.hour())
}
