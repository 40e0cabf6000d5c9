//! Controller configuration from environment variables.

use crate::error::ControllerError;
use std::env;
use std::net::SocketAddr;

const DEFAULT_METRICS_ADDR: &str = "0.0.0.0:8080";

/// Runtime configuration for the Lease Controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Namespace to watch; `None` watches all namespaces
    pub namespace: Option<String>,
    /// Let multi-tenant leases fall back to free single-tenant networks
    pub allow_multi_to_use_single: bool,
    /// Assign whatever networks are free instead of waiting for all of them
    pub partial_network_fulfillment: bool,
    /// Listen address for `/metrics` and `/healthz`
    pub metrics_addr: SocketAddr,
}

impl ControllerConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let namespace = lookup("WATCH_NAMESPACE").filter(|ns| !ns.trim().is_empty());

        let allow_multi_to_use_single = match lookup("ALLOW_MULTI_TO_USE_SINGLE") {
            Some(value) => parse_bool("ALLOW_MULTI_TO_USE_SINGLE", &value)?,
            None => false,
        };
        let partial_network_fulfillment = match lookup("PARTIAL_NETWORK_FULFILLMENT") {
            Some(value) => parse_bool("PARTIAL_NETWORK_FULFILLMENT", &value)?,
            None => true,
        };

        let metrics_addr = lookup("METRICS_ADDR").unwrap_or_else(|| DEFAULT_METRICS_ADDR.to_string());
        let metrics_addr = metrics_addr.parse::<SocketAddr>().map_err(|e| {
            ControllerError::InvalidConfig(format!("METRICS_ADDR '{metrics_addr}' is not a socket address: {e}"))
        })?;

        Ok(Self {
            namespace,
            allow_multi_to_use_single,
            partial_network_fulfillment,
            metrics_addr,
        })
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ControllerError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(ControllerError::InvalidConfig(format!(
            "{key} must be a boolean, got '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<ControllerConfig, ControllerError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ControllerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.namespace, None);
        assert!(!config.allow_multi_to_use_single);
        assert!(config.partial_network_fulfillment);
        assert_eq!(config.metrics_addr, "0.0.0.0:8080".parse().unwrap());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("WATCH_NAMESPACE", "vsphere-infra-helpers"),
            ("ALLOW_MULTI_TO_USE_SINGLE", "TRUE"),
            ("PARTIAL_NETWORK_FULFILLMENT", "no"),
            ("METRICS_ADDR", "127.0.0.1:9090"),
        ])
        .unwrap();
        assert_eq!(config.namespace.as_deref(), Some("vsphere-infra-helpers"));
        assert!(config.allow_multi_to_use_single);
        assert!(!config.partial_network_fulfillment);
        assert_eq!(config.metrics_addr.port(), 9090);
    }

    #[test]
    fn test_blank_namespace_watches_everything() {
        let config = config_from(&[("WATCH_NAMESPACE", "  ")]).unwrap();
        assert_eq!(config.namespace, None);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            config_from(&[("ALLOW_MULTI_TO_USE_SINGLE", "maybe")]),
            Err(ControllerError::InvalidConfig(_))
        ));
        assert!(matches!(
            config_from(&[("METRICS_ADDR", "localhost")]),
            Err(ControllerError::InvalidConfig(_))
        ));
    }
}
