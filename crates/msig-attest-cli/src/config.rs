//! CLI configuration: optional TOML file plus environment variable overrides.
//!
//! Priority: command-line flags > environment variables > config file > defaults.

use anyhow::{Context, Result};
use msig_attest_core::{Coin, KeyOrder, OutputType, SignOptions, VerifyOptions};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttestConfig {
    /// Logging and concurrency
    #[serde(default)]
    pub general: GeneralSection,

    /// Protocol parameters every cosigner and the verifier must share
    #[serde(default)]
    pub protocol: ProtocolSection,

    /// Verifier exit policy
    #[serde(default)]
    pub verify: VerifySection,
}

/// Logging and concurrency
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralSection {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Addresses processed in parallel
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for GeneralSection {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            workers: default_workers(),
        }
    }
}

/// Protocol parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolSection {
    /// Coin: "btc", "bch", "ltc", "doge"
    #[serde(default = "default_coin")]
    pub coin: String,

    /// Multisig output type: "legacy", "witness", "nested-witness"
    #[serde(default = "default_output_type")]
    pub output_type: String,

    /// Key order in the multisig script: "preserve" or "sorted"
    #[serde(default = "default_key_order")]
    pub key_order: String,
}

impl Default for ProtocolSection {
    fn default() -> Self {
        Self {
            coin: default_coin(),
            output_type: default_output_type(),
            key_order: default_key_order(),
        }
    }
}

/// Verifier exit policy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerifySection {
    /// Exit non-zero when more addresses than this fail
    pub max_failures: Option<usize>,
}

// ============================================================================
// Default value functions
// ============================================================================

fn default_log_level() -> String {
    "info".to_string()
}

fn default_workers() -> usize {
    4
}

fn default_coin() -> String {
    "btc".to_string()
}

fn default_output_type() -> String {
    "legacy".to_string()
}

fn default_key_order() -> String {
    "preserve".to_string()
}

// ============================================================================
// Loading & environment override
// ============================================================================

impl AttestConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: AttestConfig =
            toml::from_str(&contents).with_context(|| "Failed to parse TOML config")?;
        Ok(config)
    }

    /// Load from `path` if given, else start from defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Apply environment variable overrides.
    ///
    /// Supported env vars:
    /// - `MSIG_ATTEST_LOG_LEVEL`
    /// - `MSIG_ATTEST_WORKERS`
    /// - `MSIG_ATTEST_COIN`
    /// - `MSIG_ATTEST_OUTPUT_TYPE`
    /// - `MSIG_ATTEST_KEY_ORDER`
    /// - `MSIG_ATTEST_MAX_FAILURES`
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply `MSIG_ATTEST_*` overrides looked up through `var`.
    pub fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("MSIG_ATTEST_LOG_LEVEL") {
            self.general.log_level = v;
        }
        if let Some(v) = var("MSIG_ATTEST_WORKERS") {
            if let Ok(workers) = v.parse::<usize>() {
                self.general.workers = workers;
            }
        }
        if let Some(v) = var("MSIG_ATTEST_COIN") {
            self.protocol.coin = v;
        }
        if let Some(v) = var("MSIG_ATTEST_OUTPUT_TYPE") {
            self.protocol.output_type = v;
        }
        if let Some(v) = var("MSIG_ATTEST_KEY_ORDER") {
            self.protocol.key_order = v;
        }
        if let Some(v) = var("MSIG_ATTEST_MAX_FAILURES") {
            if let Ok(max) = v.parse::<usize>() {
                self.verify.max_failures = Some(max);
            }
        }
    }

    pub fn coin(&self) -> Result<Coin> {
        self.protocol
            .coin
            .parse()
            .with_context(|| format!("protocol.coin = {:?}", self.protocol.coin))
    }

    pub fn output_type(&self) -> Result<OutputType> {
        self.protocol
            .output_type
            .parse()
            .with_context(|| format!("protocol.output_type = {:?}", self.protocol.output_type))
    }

    pub fn key_order(&self) -> Result<KeyOrder> {
        self.protocol
            .key_order
            .parse()
            .with_context(|| format!("protocol.key_order = {:?}", self.protocol.key_order))
    }

    /// Validate that the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.general.workers > 0, "general.workers must be > 0");
        self.coin()?;
        self.output_type()?;
        self.key_order()?;
        Ok(())
    }

    pub fn sign_options(&self) -> Result<SignOptions> {
        Ok(SignOptions {
            coin: self.coin()?,
            output_type: self.output_type()?,
            key_order: self.key_order()?,
            workers: self.general.workers,
        })
    }

    /// Verifier options; `witness` forces the bare witness output type.
    pub fn verify_options(&self, witness: bool) -> Result<VerifyOptions> {
        let output_type = if witness {
            OutputType::Witness
        } else {
            self.output_type()?
        };
        Ok(VerifyOptions {
            coin: self.coin()?,
            output_type,
            key_order: self.key_order()?,
            workers: self.general.workers,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
