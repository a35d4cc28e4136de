//! Workflow configuration.
//!
//! Loaded in three layers: built-in defaults, an optional TOML file, then
//! `OOH_*` environment overrides. The merged result is validated before use.

use std::path::{Path, PathBuf};

use ooh_storage::RetryPolicy;
use serde::{Deserialize, Serialize};

use crate::sequence::SequenceFormat;

/// Largest zero-padding width; `u64::MAX` has 20 digits.
const MAX_WIDTH: usize = 18;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid value for {var}: {value:?}")]
    Env { var: &'static str, value: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Collection names of every document kind the workflow touches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Collections {
    pub plans: String,
    pub campaigns: String,
    pub pending_invoices: String,
    pub sales_orders: String,
    pub purchase_orders: String,
    pub counters: String,
    pub markers: String,
}

impl Default for Collections {
    fn default() -> Self {
        Self {
            plans: "plans".to_string(),
            campaigns: "campaigns".to_string(),
            pending_invoices: "pendingInvoices".to_string(),
            sales_orders: "salesOrderEntries".to_string(),
            purchase_orders: "purchaseOrderEntries".to_string(),
            counters: "counters".to_string(),
            markers: "derivationMarkers".to_string(),
        }
    }
}

impl Collections {
    fn named(&self) -> [(&'static str, &str); 7] {
        [
            ("plans", &self.plans),
            ("campaigns", &self.campaigns),
            ("pending_invoices", &self.pending_invoices),
            ("sales_orders", &self.sales_orders),
            ("purchase_orders", &self.purchase_orders),
            ("counters", &self.counters),
            ("markers", &self.markers),
        ]
    }
}

/// Invoice numbering: counter name and display format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvoiceConfig {
    pub counter: String,
    pub prefix: String,
    pub width: usize,
}

impl Default for InvoiceConfig {
    fn default() -> Self {
        Self {
            counter: "invoiceNumber".to_string(),
            prefix: "INV-".to_string(),
            width: 5,
        }
    }
}

impl InvoiceConfig {
    pub fn format(&self) -> SequenceFormat {
        SequenceFormat::new(self.prefix.clone(), self.width)
    }
}

/// Plan status vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanConfig {
    pub status_field: String,
    /// Field stamped with the version of the write that last changed the
    /// status.
    pub status_version_field: String,
    pub confirmed_status: String,
    pub converted_status: String,
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            status_field: "status".to_string(),
            status_version_field: "statusVersion".to_string(),
            confirmed_status: "confirmed".to_string(),
            converted_status: "Converted".to_string(),
        }
    }
}

/// Top-level workflow configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub collections: Collections,
    pub invoice: InvoiceConfig,
    pub plan: PlanConfig,
    pub transaction: RetryPolicy,
}

impl WorkflowConfig {
    /// Defaults, then `path` if given, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `OOH_*` overrides looked up through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(prefix) = lookup("OOH_INVOICE_PREFIX") {
            self.invoice.prefix = prefix;
        }
        if let Some(width) = lookup("OOH_INVOICE_WIDTH") {
            self.invoice.width = parse_env("OOH_INVOICE_WIDTH", width)?;
        }
        if let Some(status) = lookup("OOH_CONFIRMED_STATUS") {
            self.plan.confirmed_status = status;
        }
        if let Some(attempts) = lookup("OOH_TX_MAX_ATTEMPTS") {
            self.transaction.max_attempts = parse_env("OOH_TX_MAX_ATTEMPTS", attempts)?;
        }
        if let Some(backoff) = lookup("OOH_TX_BACKOFF_MS") {
            self.transaction.backoff_ms = parse_env("OOH_TX_BACKOFF_MS", backoff)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.invoice.width == 0 || self.invoice.width > MAX_WIDTH {
            return Err(ConfigError::Invalid(format!(
                "invoice.width must be between 1 and {MAX_WIDTH}, got {}",
                self.invoice.width
            )));
        }
        if self.transaction.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "transaction.max_attempts must be at least 1".to_string(),
            ));
        }
        for (key, name) in self.collections.named() {
            if name.is_empty() || name.contains('/') {
                return Err(ConfigError::Invalid(format!(
                    "collections.{key} must be a non-empty name without '/', got {name:?}"
                )));
            }
        }
        if self.invoice.counter.is_empty() || self.invoice.counter.contains('/') {
            return Err(ConfigError::Invalid(format!(
                "invoice.counter must be a non-empty name without '/', got {:?}",
                self.invoice.counter
            )));
        }
        if self.plan.status_field == self.plan.status_version_field {
            return Err(ConfigError::Invalid(
                "plan.status_field and plan.status_version_field must differ".to_string(),
            ));
        }
        if self.plan.confirmed_status == self.plan.converted_status {
            return Err(ConfigError::Invalid(
                "plan.confirmed_status and plan.converted_status must differ".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Env { var, value })
}
