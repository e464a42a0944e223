// Rust guideline compliant 2026-10-10

//! Random transaction requests for load testing.
//!
//! Configuration via [`GeneratorConfig::builder`]; output is reproducible when
//! a seed is fixed.

use std::cell::RefCell;

use domain::NewTransaction;
use rand::{Rng, SeedableRng, rngs::StdRng};

/// Location pool; the last three are on the default risky list.
const LOCATIONS: &[&str] = &[
    "Madrid",
    "Barcelona",
    "Lima",
    "Bogotá",
    "Ciudad de México",
    "Buenos Aires",
    "Panamá",
    "Islas Caimán",
    "Suiza",
];

/// Errors raised while building a [`GeneratorConfig`].
#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    /// The supplied configuration is invalid.
    #[error("invalid generator configuration: {reason}")]
    InvalidConfig {
        /// Human-readable description of the problem.
        reason: String,
    },
}

/// Runtime configuration for a [`TransactionGenerator`].
#[derive(Debug)]
pub struct GeneratorConfig {
    /// Upper bound of generated amounts, in cents.
    pub max_amount_cents: u32,
    /// Optional RNG seed. `None` seeds from the OS.
    pub seed: Option<u64>,
}

/// Builder for [`GeneratorConfig`].
#[derive(Debug)]
pub struct GeneratorConfigBuilder {
    max_amount_cents: u32,
    seed: Option<u64>,
}

impl GeneratorConfig {
    /// Create a builder.
    ///
    /// Default values: `max_amount_cents = 1_000_000` (10 000.00), `seed = None`.
    #[must_use]
    pub fn builder() -> GeneratorConfigBuilder {
        GeneratorConfigBuilder { max_amount_cents: 1_000_000, seed: None }
    }
}

impl GeneratorConfigBuilder {
    /// Override the amount upper bound, in cents.
    #[must_use]
    pub fn max_amount_cents(mut self, cents: u32) -> Self {
        self.max_amount_cents = cents;
        self
    }

    /// Fix the RNG seed for deterministic output.
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Validate and build the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`GeneratorError::InvalidConfig`] when `max_amount_cents` is zero.
    #[must_use = "the Result must be checked; use ? or unwrap"]
    pub fn build(self) -> Result<GeneratorConfig, GeneratorError> {
        if self.max_amount_cents == 0 {
            return Err(GeneratorError::InvalidConfig {
                reason: "max_amount_cents must be >= 1".to_owned(),
            });
        }
        Ok(GeneratorConfig { max_amount_cents: self.max_amount_cents, seed: self.seed })
    }
}

/// Produces random [`NewTransaction`] requests.
#[derive(Debug)]
pub struct TransactionGenerator {
    config: GeneratorConfig,
    rng: RefCell<StdRng>,
}

impl TransactionGenerator {
    /// Create a generator from `config`.
    #[must_use]
    pub fn new(config: GeneratorConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self { config, rng: RefCell::new(rng) }
    }

    /// Generate one request.
    ///
    /// Amounts are whole cents in `[0.01, max_amount_cents / 100]`; origin and
    /// destination accounts always differ.
    #[must_use]
    pub fn next_transaction(&self) -> NewTransaction {
        let mut rng = self.rng.borrow_mut();
        let origin = rng.random_range(0..10_000_000_000u64);
        let mut destination = rng.random_range(0..10_000_000_000u64);
        if destination == origin {
            destination = (destination + 1) % 10_000_000_000;
        }
        // All cent values up to u32::MAX are exact as f64.
        let amount = f64::from(rng.random_range(1..=self.config.max_amount_cents)) / 100.0;
        let location = LOCATIONS[rng.random_range(0..LOCATIONS.len())].to_owned();

        NewTransaction {
            origin_account: format!("ES{origin:010}"),
            destination_account: format!("ES{destination:010}"),
            amount,
            location,
        }
    }
}
