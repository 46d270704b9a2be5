//! Service configuration loaded from environment variables.

use std::time::Duration;

use billing::InventoryClientConfig;
use inventory::{FailureMode, LedgerConfig};
use saga::{ConfirmFailurePolicy, SagaConfig};
use thiserror::Error;

/// A variable was set to a value that cannot be used.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid value {value:?} for {key}: {reason}")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
    pub reason: String,
}

/// Settings shared by both services.
///
/// - `HOST` bind address (default: `"0.0.0.0"`)
/// - `PORT` listen port (default depends on the service)
/// - `RUST_LOG` tracing filter directive (default: `"info"`)
/// - `DATABASE_URL` PostgreSQL URL; in-memory storage when unset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
}

impl ServerConfig {
    fn load(
        lookup: &impl Fn(&str) -> Option<String>,
        default_port: u16,
    ) -> Result<Self, ConfigError> {
        let port = match lookup("PORT") {
            Some(raw) => raw.trim().parse().map_err(|e: std::num::ParseIntError| ConfigError {
                key: "PORT",
                value: raw.clone(),
                reason: e.to_string(),
            })?,
            None => default_port,
        };

        Ok(Self {
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            log_level: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
        })
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Inventory service configuration.
///
/// Adds `FAILURE_MODE` (`none`, `reserve`, `confirm`, `cancel`) on top of
/// [`ServerConfig`]; the default port is 8080.
#[derive(Debug, Clone)]
pub struct InventoryServiceConfig {
    pub server: ServerConfig,
    pub ledger: LedgerConfig,
}

impl InventoryServiceConfig {
    pub const DEFAULT_PORT: u16 = 8080;

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let server = ServerConfig::load(&lookup, Self::DEFAULT_PORT)?;
        let failure_mode = parse_var::<FailureMode>(&lookup, "FAILURE_MODE")?.unwrap_or_default();

        Ok(Self {
            server,
            ledger: LedgerConfig { failure_mode },
        })
    }
}

/// Billing service configuration.
///
/// Adds on top of [`ServerConfig`] (default port 8081):
/// - `INVENTORY_SERVICE_URL` (default: `"http://inventory-service:8080"`)
/// - `INVENTORY_TIMEOUT_SECS` per-call timeout; transport default when unset
/// - `CONFIRM_FAILURE_POLICY` (`cancel_failed_item`, `leave_failed_item_reserved`)
#[derive(Debug, Clone)]
pub struct BillingServiceConfig {
    pub server: ServerConfig,
    pub inventory: InventoryClientConfig,
    pub saga: SagaConfig,
}

impl BillingServiceConfig {
    pub const DEFAULT_PORT: u16 = 8081;
    pub const DEFAULT_INVENTORY_URL: &'static str = "http://inventory-service:8080";

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let server = ServerConfig::load(&lookup, Self::DEFAULT_PORT)?;

        let base_url = lookup("INVENTORY_SERVICE_URL")
            .unwrap_or_else(|| Self::DEFAULT_INVENTORY_URL.to_string());
        let mut inventory = InventoryClientConfig::new(base_url);
        if let Some(secs) = parse_var::<u64>(&lookup, "INVENTORY_TIMEOUT_SECS")? {
            inventory = inventory.with_timeout(Duration::from_secs(secs));
        }

        let confirm_failure_policy =
            parse_var::<ConfirmFailurePolicy>(&lookup, "CONFIRM_FAILURE_POLICY")?.unwrap_or_default();

        Ok(Self {
            server,
            inventory,
            saga: SagaConfig {
                confirm_failure_policy,
            },
        })
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| ConfigError {
                key,
                value: raw.clone(),
                reason: e.to_string(),
            })
        })
        .transpose()
}
