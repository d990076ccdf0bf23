//! Admin access policy settings (`ADMIN_*` environment variables).
//!
//! The policy is validated as a whole. Any malformed value makes the loader
//! log an error and fall back to [`AccessPolicyConfig::default`], which
//! disables every restriction.

use serde::Deserialize;
use std::env;

use crate::services::access_gate::AccessPolicy;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccessPolicyConfig {
    pub ip_allowlist: IpAllowlistConfig,
    pub geo: GeoConfig,
    pub time: TimeAccessConfig,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IpAllowlistConfig {
    pub enabled: bool,
    pub allowed_ips: Vec<String>,
    pub allowed_cidrs: Vec<String>,
    /// Proxies in front of the service that append to `x-forwarded-for`.
    /// Zero trusts the first listed hop, so the edge must overwrite the header.
    pub trusted_proxy_hops: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeoConfig {
    pub enabled: bool,
    pub allowed_countries: Vec<String>,
    pub blocked_countries: Vec<String>,
    /// Header set by the CDN with the ISO country code of the client.
    pub country_header: String,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            allowed_countries: Vec::new(),
            blocked_countries: Vec::new(),
            country_header: "cf-ipcountry".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimeAccessConfig {
    pub enabled: bool,
    pub business_hours_start: String,
    pub business_hours_end: String,
    pub timezone: String,
    /// 0 = Sunday through 6 = Saturday.
    pub business_days: Vec<u8>,
    pub maintenance_windows: Vec<MaintenanceWindowConfig>,
}

impl Default for TimeAccessConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            business_hours_start: "09:00".to_string(),
            business_hours_end: "17:00".to_string(),
            timezone: "UTC".to_string(),
            business_days: vec![1, 2, 3, 4, 5],
            maintenance_windows: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceWindowConfig {
    pub start_time: String,
    pub end_time: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub days: Vec<u8>,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl AccessPolicyConfig {
    /// Read the policy from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read the policy through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let parsed = match Self::parse(&lookup) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!(error = %e, "Invalid admin access policy, using defaults");
                return Self::default();
            }
        };

        if let Err(e) = AccessPolicy::compile(&parsed) {
            tracing::error!(error = %e, "Invalid admin access policy, using defaults");
            return Self::default();
        }

        parsed
    }

    fn parse<F>(lookup: &F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let flag = |key: &str| -> Result<bool, anyhow::Error> {
            match lookup(key) {
                None => Ok(false),
                Some(v) => match v.trim().to_lowercase().as_str() {
                    "true" | "1" | "yes" => Ok(true),
                    "false" | "0" | "no" | "" => Ok(false),
                    other => Err(anyhow::anyhow!("{} is not a boolean: {}", key, other)),
                },
            }
        };
        let list = |key: &str| -> Vec<String> {
            lookup(key)
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default()
        };
        let upper = |key: &str| -> Vec<String> {
            list(key).into_iter().map(|c| c.to_uppercase()).collect()
        };

        let trusted_proxy_hops = match lookup("ADMIN_TRUSTED_PROXY_HOPS") {
            Some(raw) if !raw.trim().is_empty() => raw
                .trim()
                .parse::<usize>()
                .map_err(|_| anyhow::anyhow!("Invalid ADMIN_TRUSTED_PROXY_HOPS: {}", raw))?,
            _ => 0,
        };

        let defaults = TimeAccessConfig::default();
        let business_days = match lookup("ADMIN_BUSINESS_DAYS") {
            Some(raw) => raw
                .split(',')
                .map(|d| d.trim())
                .filter(|d| !d.is_empty())
                .map(|d| {
                    d.parse::<u8>()
                        .map_err(|_| anyhow::anyhow!("Invalid business day: {}", d))
                })
                .collect::<Result<Vec<_>, _>>()?,
            None => defaults.business_days.clone(),
        };

        let maintenance_windows = match lookup("ADMIN_MAINTENANCE_WINDOWS") {
            Some(raw) if !raw.trim().is_empty() => {
                serde_json::from_str::<Vec<MaintenanceWindowConfig>>(&raw)
                    .map_err(|e| anyhow::anyhow!("Invalid ADMIN_MAINTENANCE_WINDOWS: {}", e))?
            }
            _ => Vec::new(),
        };

        Ok(Self {
            ip_allowlist: IpAllowlistConfig {
                enabled: flag("ADMIN_IP_ALLOWLIST_ENABLED")?,
                allowed_ips: list("ADMIN_ALLOWED_IPS"),
                allowed_cidrs: list("ADMIN_ALLOWED_CIDRS"),
                trusted_proxy_hops,
            },
            geo: GeoConfig {
                enabled: flag("ADMIN_GEO_RESTRICTIONS_ENABLED")?,
                allowed_countries: upper("ADMIN_ALLOWED_COUNTRIES"),
                blocked_countries: upper("ADMIN_BLOCKED_COUNTRIES"),
                country_header: lookup("ADMIN_COUNTRY_HEADER")
                    .map(|h| h.trim().to_lowercase())
                    .filter(|h| !h.is_empty())
                    .unwrap_or_else(|| GeoConfig::default().country_header),
            },
            time: TimeAccessConfig {
                enabled: flag("ADMIN_TIME_BASED_ACCESS_ENABLED")?,
                business_hours_start: lookup("ADMIN_BUSINESS_HOURS_START")
                    .unwrap_or(defaults.business_hours_start),
                business_hours_end: lookup("ADMIN_BUSINESS_HOURS_END")
                    .unwrap_or(defaults.business_hours_end),
                timezone: lookup("ADMIN_TIMEZONE").unwrap_or(defaults.timezone),
                business_days,
                maintenance_windows,
            },
        })
    }
}
