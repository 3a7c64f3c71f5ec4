use std::env;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use log::{info, warn};

use crate::optimizer::PackingConfig;

/// Complete application configuration, loaded from environment variables or default values.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub optimizer: OptimizerConfig,
}

impl AppConfig {
    /// Creates a configuration from the currently available environment variables.
    pub fn from_env() -> Self {
        Self::from_source(&env_string)
    }

    fn from_source(source: &impl Fn(&str) -> Option<String>) -> Self {
        Self {
            api: ApiConfig::from_source(source),
            optimizer: OptimizerConfig::from_source(source),
        }
    }
}

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    bind_ip: IpAddr,
    display_host: String,
    port: u16,
}

impl ApiConfig {
    const DEFAULT_HOST: &'static str = "0.0.0.0";
    const DEFAULT_BIND_IP: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
    const DEFAULT_PORT: u16 = 8080;
    const HOST_VAR: &'static str = "LOAD_PLANNER_API_HOST";
    const PORT_VAR: &'static str = "LOAD_PLANNER_API_PORT";

    fn from_source(source: &impl Fn(&str) -> Option<String>) -> Self {
        let host_value = source(Self::HOST_VAR).unwrap_or_else(|| Self::DEFAULT_HOST.to_string());
        let (bind_ip, effective_host) = match host_value.parse::<IpAddr>() {
            Ok(ip) => (ip, host_value),
            Err(err) => {
                warn!(
                    "⚠️ Could not parse {} ('{}'): {}. Using {}.",
                    Self::HOST_VAR,
                    host_value,
                    err,
                    Self::DEFAULT_HOST
                );
                (Self::DEFAULT_BIND_IP, Self::DEFAULT_HOST.to_string())
            }
        };

        let port = match source(Self::PORT_VAR) {
            Some(raw) => match raw.parse::<u16>() {
                Ok(value) if value != 0 => value,
                Ok(_) => {
                    warn!(
                        "⚠️ {} must not be 0. Using {}.",
                        Self::PORT_VAR,
                        Self::DEFAULT_PORT
                    );
                    Self::DEFAULT_PORT
                }
                Err(err) => {
                    warn!(
                        "⚠️ Could not parse {} ('{}'): {}. Using {}.",
                        Self::PORT_VAR,
                        raw,
                        err,
                        Self::DEFAULT_PORT
                    );
                    Self::DEFAULT_PORT
                }
            },
            None => Self::DEFAULT_PORT,
        };

        Self {
            bind_ip,
            display_host: effective_host,
            port,
        }
    }

    /// Socket address to bind the server to.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.port)
    }

    /// Visible hostname for logging and hints.
    pub fn display_host(&self) -> &str {
        &self.display_host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Indicates whether binding to all interfaces.
    pub fn binds_to_all_interfaces(&self) -> bool {
        match self.bind_ip {
            IpAddr::V4(addr) => addr == Ipv4Addr::UNSPECIFIED,
            IpAddr::V6(addr) => addr == Ipv6Addr::UNSPECIFIED,
        }
    }

    /// Checks whether the hostname matches the default value.
    pub fn uses_default_host(&self) -> bool {
        self.display_host == Self::DEFAULT_HOST
    }
}

/// Configuration of the placement engine.
#[derive(Clone, Debug)]
pub struct OptimizerConfig {
    packing: PackingConfig,
}

impl OptimizerConfig {
    const SUPPORT_RATIO_VAR: &'static str = "LOAD_PLANNER_SUPPORT_RATIO";
    const GENERAL_EPSILON_VAR: &'static str = "LOAD_PLANNER_GENERAL_EPSILON";
    const HEIGHT_EPSILON_VAR: &'static str = "LOAD_PLANNER_HEIGHT_EPSILON";
    const ALLOW_ROTATION_VAR: &'static str = "LOAD_PLANNER_ALLOW_ROTATIONS";
    const PARALLEL_SEARCH_VAR: &'static str = "LOAD_PLANNER_PARALLEL_SEARCH";
    const TIME_BUDGET_VAR: &'static str = "LOAD_PLANNER_TIME_BUDGET_MS";
    const MAX_INSTANCES_VAR: &'static str = "LOAD_PLANNER_MAX_INSTANCES";

    pub fn new(packing: PackingConfig) -> Self {
        Self { packing }
    }

    fn from_source(source: &impl Fn(&str) -> Option<String>) -> Self {
        let support_ratio = load_f64_with_warning(
            source,
            Self::SUPPORT_RATIO_VAR,
            PackingConfig::DEFAULT_SUPPORT_RATIO,
            |value| (0.0..=1.0).contains(&value),
            "must be between 0 and 1",
            "Adjusted minimum support may lead to unstable stacks",
        );

        let general_epsilon = load_f64_with_warning(
            source,
            Self::GENERAL_EPSILON_VAR,
            PackingConfig::DEFAULT_GENERAL_EPSILON,
            |value| value > 0.0,
            "must be greater than 0",
            "Adjusted tolerances may cause numerical instabilities",
        );

        let height_epsilon = load_f64_with_warning(
            source,
            Self::HEIGHT_EPSILON_VAR,
            PackingConfig::DEFAULT_HEIGHT_EPSILON,
            |value| value > 0.0,
            "must be greater than 0",
            "Adjusted height tolerance may cause unexpected support decisions",
        );

        let allow_item_rotation = load_bool(
            source,
            Self::ALLOW_ROTATION_VAR,
            PackingConfig::DEFAULT_ALLOW_ITEM_ROTATION,
        );
        let parallel_search = load_bool(
            source,
            Self::PARALLEL_SEARCH_VAR,
            PackingConfig::DEFAULT_PARALLEL_SEARCH,
        );

        let time_budget = source(Self::TIME_BUDGET_VAR).and_then(|raw| match raw.parse::<u64>() {
            Ok(ms) => Some(Duration::from_millis(ms)),
            Err(err) => {
                warn!(
                    "⚠️ Could not parse {} ('{}') as milliseconds: {}. Running without a budget.",
                    Self::TIME_BUDGET_VAR,
                    raw,
                    err
                );
                None
            }
        });

        let max_instances = match source(Self::MAX_INSTANCES_VAR) {
            Some(raw) => match raw.parse::<u64>() {
                Ok(value) if value > 0 => value,
                Ok(_) => {
                    warn!(
                        "⚠️ {} must be at least 1. Using {}.",
                        Self::MAX_INSTANCES_VAR,
                        PackingConfig::DEFAULT_MAX_INSTANCES
                    );
                    PackingConfig::DEFAULT_MAX_INSTANCES
                }
                Err(err) => {
                    warn!(
                        "⚠️ Could not parse {} ('{}'): {}. Using {}.",
                        Self::MAX_INSTANCES_VAR,
                        raw,
                        err,
                        PackingConfig::DEFAULT_MAX_INSTANCES
                    );
                    PackingConfig::DEFAULT_MAX_INSTANCES
                }
            },
            None => PackingConfig::DEFAULT_MAX_INSTANCES,
        };

        let packing = PackingConfig::builder()
            .support_ratio(support_ratio)
            .general_epsilon(general_epsilon)
            .height_epsilon(height_epsilon)
            .allow_item_rotation(allow_item_rotation)
            .parallel_search(parallel_search)
            .time_budget(time_budget)
            .max_instances(max_instances)
            .build();

        Self { packing }
    }

    /// Returns the configured PackingConfig.
    pub fn packing_config(&self) -> PackingConfig {
        self.packing
    }
}

fn env_string(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_owned())
            }
        }
        Err(env::VarError::NotPresent) => None,
        Err(err) => {
            warn!(
                "⚠️ Access to {} failed: {}. Using default value.",
                name, err
            );
            None
        }
    }
}

fn parse_bool(raw: &str, var_name: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        other => {
            warn!(
                "⚠️ Could not interpret {} ('{}') as boolean value. Using default value.",
                var_name, other
            );
            None
        }
    }
}

fn load_bool(source: &impl Fn(&str) -> Option<String>, var_name: &str, default: bool) -> bool {
    source(var_name)
        .and_then(|raw| parse_bool(&raw, var_name))
        .unwrap_or(default)
}

fn load_f64_with_warning(
    source: &impl Fn(&str) -> Option<String>,
    var_name: &str,
    default: f64,
    validator: impl Fn(f64) -> bool,
    invalid_hint: &str,
    notice: &str,
) -> f64 {
    match source(var_name) {
        Some(raw) => match raw.parse::<f64>() {
            Ok(value) if validator(value) => {
                let tolerance = (default.abs().max(1.0)) * 1e-9;
                if (value - default).abs() > tolerance {
                    info!("⚠️ {} ({} = {}).", notice, var_name, value);
                }
                value
            }
            Ok(_) => {
                warn!(
                    "⚠️ {} contains invalid value '{}': {}. Using {}.",
                    var_name, raw, invalid_hint, default
                );
                default
            }
            Err(err) => {
                warn!(
                    "⚠️ Could not parse {} ('{}') as number: {}. Using {}.",
                    var_name, raw, err, default
                );
                default
            }
        },
        None => default,
    }
}
