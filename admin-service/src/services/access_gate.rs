//! Admin access gate.
//!
//! Pure policy evaluation: given the client address, an optional country code
//! and the current instant, decide whether an admin route may be served.
//! Checks run in order IP, geography, time; the first failing check decides
//! the deny reason.

use chrono::{DateTime, Datelike, Timelike, Utc};
use chrono_tz::Tz;
use ipnet::IpNet;
use std::collections::HashSet;
use std::fmt;
use std::net::IpAddr;
use thiserror::Error;

use crate::config::{AccessPolicyConfig, MaintenanceWindowConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    IpBlocked,
    GeoBlocked,
    TimeBlocked,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::IpBlocked => "IP_BLOCKED",
            DenyReason::GeoBlocked => "GEO_BLOCKED",
            DenyReason::TimeBlocked => "TIME_BLOCKED",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Allow,
    Deny(DenyReason),
}

impl AccessDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AccessDecision::Allow)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum PolicyError {
    #[error("invalid IP address in allowlist: {0}")]
    InvalidIp(String),
    #[error("invalid CIDR range: {0}")]
    InvalidCidr(String),
    #[error("invalid time of day (expected HH:MM): {0}")]
    InvalidTime(String),
    #[error("unknown timezone: {0}")]
    InvalidTimezone(String),
    #[error("day of week out of range 0-6: {0}")]
    InvalidDay(u8),
}

/// Recurring daily window in minutes since midnight, inclusive at both ends.
/// `start > end` wraps past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyWindow {
    start: u16,
    end: u16,
}

impl DailyWindow {
    pub fn parse(start: &str, end: &str) -> Result<Self, PolicyError> {
        Ok(Self {
            start: parse_minute_of_day(start)?,
            end: parse_minute_of_day(end)?,
        })
    }

    pub fn contains(&self, minute_of_day: u16) -> bool {
        if self.start <= self.end {
            minute_of_day >= self.start && minute_of_day <= self.end
        } else {
            minute_of_day >= self.start || minute_of_day <= self.end
        }
    }
}

fn parse_minute_of_day(value: &str) -> Result<u16, PolicyError> {
    let invalid = || PolicyError::InvalidTime(value.to_string());
    let (h, m) = value.trim().split_once(':').ok_or_else(invalid)?;
    if h.is_empty() || h.len() > 2 || m.len() != 2 {
        return Err(invalid());
    }
    let hours: u16 = h.parse().map_err(|_| invalid())?;
    let minutes: u16 = m.parse().map_err(|_| invalid())?;
    if hours > 23 || minutes > 59 {
        return Err(invalid());
    }
    Ok(hours * 60 + minutes)
}

fn parse_timezone(name: &str) -> Result<Tz, PolicyError> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| PolicyError::InvalidTimezone(name.to_string()))
}

/// Day-of-week set, bit 0 = Sunday.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DaySet(u8);

impl DaySet {
    fn from_days(days: &[u8]) -> Result<Self, PolicyError> {
        days.iter().try_fold(DaySet(0), |acc, &d| {
            if d > 6 {
                Err(PolicyError::InvalidDay(d))
            } else {
                Ok(DaySet(acc.0 | (1 << d)))
            }
        })
    }

    fn contains(&self, day_from_sunday: u32) -> bool {
        day_from_sunday < 7 && self.0 & (1 << day_from_sunday) != 0
    }
}

#[derive(Debug, Clone)]
struct IpRule {
    exact: HashSet<IpAddr>,
    ranges: Vec<IpNet>,
}

impl IpRule {
    fn allows(&self, ip: Option<&str>) -> bool {
        let Some(raw) = ip else {
            return false;
        };
        let ip = match raw.trim().parse::<IpAddr>() {
            Ok(ip) => ip.to_canonical(),
            Err(_) => {
                tracing::warn!(ip = %raw, "Unparseable client address, treating as not allowlisted");
                return false;
            }
        };
        self.exact.contains(&ip) || self.ranges.iter().any(|net| net.contains(&ip))
    }
}

#[derive(Debug, Clone)]
struct GeoRule {
    allowed: Vec<String>,
    blocked: Vec<String>,
}

impl GeoRule {
    fn allows(&self, country: Option<&str>) -> bool {
        // CDN placeholder codes for unknown/Tor origins count as unknown
        let country = match country.map(|c| c.trim().to_uppercase()) {
            Some(c) if !c.is_empty() && c != "XX" && c != "T1" => c,
            _ => return true,
        };
        if !self.allowed.is_empty() {
            return self.allowed.contains(&country);
        }
        !self.blocked.contains(&country)
    }
}

#[derive(Debug, Clone)]
struct MaintenanceWindow {
    window: DailyWindow,
    timezone: Tz,
    days: DaySet,
}

impl MaintenanceWindow {
    fn compile(config: &MaintenanceWindowConfig) -> Result<Self, PolicyError> {
        Ok(Self {
            window: DailyWindow::parse(&config.start_time, &config.end_time)?,
            timezone: parse_timezone(&config.timezone)?,
            // No listed days means the window never opens
            days: DaySet::from_days(&config.days)?,
        })
    }

    fn is_active(&self, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&self.timezone);
        self.days.contains(local.weekday().num_days_from_sunday())
            && self.window.contains((local.hour() * 60 + local.minute()) as u16)
    }
}

#[derive(Debug, Clone)]
struct TimeRule {
    timezone: Tz,
    days: DaySet,
    hours: DailyWindow,
    maintenance: Vec<MaintenanceWindow>,
}

impl TimeRule {
    fn allows(&self, now: DateTime<Utc>) -> bool {
        if self.maintenance.iter().any(|w| w.is_active(now)) {
            return false;
        }
        let local = now.with_timezone(&self.timezone);
        self.days.contains(local.weekday().num_days_from_sunday())
            && self.hours.contains((local.hour() * 60 + local.minute()) as u16)
    }
}

/// Compiled admin access policy.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    ip: Option<IpRule>,
    geo: Option<GeoRule>,
    time: Option<TimeRule>,
}

impl AccessPolicy {
    /// Policy with every check disabled.
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Validate and compile a policy. Every section is validated, including
    /// disabled ones, so a bad value never lies dormant.
    pub fn compile(config: &AccessPolicyConfig) -> Result<Self, PolicyError> {
        let exact = config
            .ip_allowlist
            .allowed_ips
            .iter()
            .map(|ip| {
                ip.trim()
                    .parse::<IpAddr>()
                    .map(|ip| ip.to_canonical())
                    .map_err(|_| PolicyError::InvalidIp(ip.clone()))
            })
            .collect::<Result<HashSet<_>, _>>()?;
        let ranges = config
            .ip_allowlist
            .allowed_cidrs
            .iter()
            .map(|cidr| {
                cidr.trim()
                    .parse::<IpNet>()
                    .map(|net| net.trunc())
                    .map_err(|_| PolicyError::InvalidCidr(cidr.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let time = TimeRule {
            timezone: parse_timezone(&config.time.timezone)?,
            days: DaySet::from_days(&config.time.business_days)?,
            hours: DailyWindow::parse(
                &config.time.business_hours_start,
                &config.time.business_hours_end,
            )?,
            maintenance: config
                .time
                .maintenance_windows
                .iter()
                .map(MaintenanceWindow::compile)
                .collect::<Result<Vec<_>, _>>()?,
        };

        Ok(Self {
            ip: config
                .ip_allowlist
                .enabled
                .then_some(IpRule { exact, ranges }),
            geo: config.geo.enabled.then(|| GeoRule {
                allowed: config.geo.allowed_countries.clone(),
                blocked: config.geo.blocked_countries.clone(),
            }),
            time: config.time.enabled.then_some(time),
        })
    }

    pub fn is_restricted(&self) -> bool {
        self.ip.is_some() || self.geo.is_some() || self.time.is_some()
    }

    pub fn evaluate(
        &self,
        ip: Option<&str>,
        country: Option<&str>,
        now: DateTime<Utc>,
    ) -> AccessDecision {
        if let Some(rule) = &self.ip {
            if !rule.allows(ip) {
                return AccessDecision::Deny(DenyReason::IpBlocked);
            }
        }
        if let Some(rule) = &self.geo {
            if !rule.allows(country) {
                return AccessDecision::Deny(DenyReason::GeoBlocked);
            }
        }
        if let Some(rule) = &self.time {
            if !rule.allows(now) {
                return AccessDecision::Deny(DenyReason::TimeBlocked);
            }
        }
        AccessDecision::Allow
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GeoConfig, IpAllowlistConfig, TimeAccessConfig};
    use chrono::TimeZone;

    fn ip_policy(ips: &[&str], cidrs: &[&str]) -> AccessPolicy {
        AccessPolicy::compile(&AccessPolicyConfig {
            ip_allowlist: IpAllowlistConfig {
                enabled: true,
                allowed_ips: ips.iter().map(|s| s.to_string()).collect(),
                allowed_cidrs: cidrs.iter().map(|s| s.to_string()).collect(),
                trusted_proxy_hops: 0,
            },
            ..Default::default()
        })
        .unwrap()
    }

    fn time_policy(time: TimeAccessConfig) -> AccessPolicy {
        AccessPolicy::compile(&AccessPolicyConfig {
            time: TimeAccessConfig {
                enabled: true,
                ..time
            },
            ..Default::default()
        })
        .unwrap()
    }

    // 2024-01-15 is a Monday
    fn monday(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, hour, minute, 0).unwrap()
    }

    #[test]
    fn disabled_policy_allows_everything() {
        let policy = AccessPolicy::compile(&AccessPolicyConfig::default()).unwrap();
        assert!(!policy.is_restricted());
        assert_eq!(
            policy.evaluate(Some("8.8.8.8"), Some("KP"), monday(3, 0)),
            AccessDecision::Allow
        );
        assert_eq!(policy.evaluate(None, None, monday(3, 0)), AccessDecision::Allow);
    }

    #[test]
    fn exact_ip_match_is_allowed() {
        let policy = ip_policy(&["192.168.1.100"], &[]);
        assert_eq!(
            policy.evaluate(Some("192.168.1.100"), None, monday(12, 0)),
            AccessDecision::Allow
        );
    }

    #[test]
    fn ip_outside_every_range_is_blocked() {
        let policy = ip_policy(&[], &["192.168.2.0/24", "10.0.0.0/8"]);
        assert_eq!(
            policy.evaluate(Some("172.16.0.1"), None, monday(12, 0)),
            AccessDecision::Deny(DenyReason::IpBlocked)
        );
    }

    #[test]
    fn every_address_inside_a_cidr_is_allowed() {
        let policy = ip_policy(&[], &["192.168.2.0/24"]);
        for host in 0..=255u8 {
            let ip = format!("192.168.2.{}", host);
            assert!(policy.evaluate(Some(&ip), None, monday(12, 0)).is_allowed(), "{}", ip);
        }
        assert!(!policy.evaluate(Some("192.168.3.0"), None, monday(12, 0)).is_allowed());
        assert!(!policy.evaluate(Some("192.168.1.255"), None, monday(12, 0)).is_allowed());
    }

    #[test]
    fn host_bits_in_cidr_are_masked() {
        let policy = ip_policy(&[], &["10.1.2.3/16"]);
        assert!(policy.evaluate(Some("10.1.200.7"), None, monday(12, 0)).is_allowed());
        assert!(!policy.evaluate(Some("10.2.0.1"), None, monday(12, 0)).is_allowed());
    }

    #[test]
    fn ipv4_mapped_ipv6_matches_ipv4_rules() {
        let policy = ip_policy(&[], &["10.0.0.0/8"]);
        assert!(policy.evaluate(Some("::ffff:10.9.8.7"), None, monday(12, 0)).is_allowed());
    }

    #[test]
    fn unknown_or_garbage_ip_is_blocked_when_enabled() {
        let policy = ip_policy(&["192.168.1.100"], &["10.0.0.0/8"]);
        assert_eq!(
            policy.evaluate(None, None, monday(12, 0)),
            AccessDecision::Deny(DenyReason::IpBlocked)
        );
        assert_eq!(
            policy.evaluate(Some("not-an-ip"), None, monday(12, 0)),
            AccessDecision::Deny(DenyReason::IpBlocked)
        );
    }

    #[test]
    fn invalid_cidr_fails_compilation() {
        let err = AccessPolicy::compile(&AccessPolicyConfig {
            ip_allowlist: IpAllowlistConfig {
                enabled: true,
                allowed_ips: vec![],
                allowed_cidrs: vec!["300.0.0.0/8".to_string()],
                trusted_proxy_hops: 0,
            },
            ..Default::default()
        })
        .unwrap_err();
        assert_eq!(err, PolicyError::InvalidCidr("300.0.0.0/8".to_string()));
    }

    fn geo_policy(allowed: &[&str], blocked: &[&str]) -> AccessPolicy {
        AccessPolicy::compile(&AccessPolicyConfig {
            geo: GeoConfig {
                enabled: true,
                allowed_countries: allowed.iter().map(|s| s.to_string()).collect(),
                blocked_countries: blocked.iter().map(|s| s.to_string()).collect(),
                ..GeoConfig::default()
            },
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn allowed_country_list_takes_precedence() {
        let policy = geo_policy(&["US", "GB"], &["US"]);
        assert!(policy.evaluate(None, Some("us"), monday(12, 0)).is_allowed());
        assert_eq!(
            policy.evaluate(None, Some("FR"), monday(12, 0)),
            AccessDecision::Deny(DenyReason::GeoBlocked)
        );
    }

    #[test]
    fn blocked_countries_apply_without_allow_list() {
        let policy = geo_policy(&[], &["KP", "IR"]);
        assert!(!policy.evaluate(None, Some("KP"), monday(12, 0)).is_allowed());
        assert!(policy.evaluate(None, Some("DE"), monday(12, 0)).is_allowed());
    }

    #[test]
    fn unknown_country_is_permissive() {
        let policy = geo_policy(&["US"], &[]);
        assert!(policy.evaluate(None, None, monday(12, 0)).is_allowed());
        assert!(policy.evaluate(None, Some("XX"), monday(12, 0)).is_allowed());
    }

    #[test]
    fn business_hours_boundaries_are_inclusive() {
        let policy = time_policy(TimeAccessConfig::default());
        assert!(!policy.evaluate(None, None, monday(8, 59)).is_allowed());
        assert!(policy.evaluate(None, None, monday(9, 0)).is_allowed());
        assert!(policy.evaluate(None, None, monday(17, 0)).is_allowed());
        assert_eq!(
            policy.evaluate(None, None, monday(17, 1)),
            AccessDecision::Deny(DenyReason::TimeBlocked)
        );
    }

    #[test]
    fn weekends_are_outside_default_business_days() {
        let policy = time_policy(TimeAccessConfig::default());
        let sunday = Utc.with_ymd_and_hms(2024, 1, 14, 12, 0, 0).unwrap();
        assert!(!policy.evaluate(None, None, sunday).is_allowed());
    }

    #[test]
    fn overnight_window_wraps_midnight() {
        let policy = time_policy(TimeAccessConfig {
            business_hours_start: "22:00".to_string(),
            business_hours_end: "06:00".to_string(),
            business_days: vec![0, 1, 2, 3, 4, 5, 6],
            ..TimeAccessConfig::default()
        });
        assert!(policy.evaluate(None, None, monday(23, 30)).is_allowed());
        assert!(policy.evaluate(None, None, monday(6, 0)).is_allowed());
        assert!(!policy.evaluate(None, None, monday(12, 0)).is_allowed());
    }

    #[test]
    fn business_hours_follow_configured_timezone() {
        let policy = time_policy(TimeAccessConfig {
            timezone: "America/New_York".to_string(),
            ..TimeAccessConfig::default()
        });
        // 14:00 UTC is 09:00 EST
        assert!(policy.evaluate(None, None, monday(14, 0)).is_allowed());
        // 13:00 UTC is 08:00 EST
        assert!(!policy.evaluate(None, None, monday(13, 0)).is_allowed());
    }

    #[test]
    fn maintenance_window_denies_inside_business_hours() {
        let policy = time_policy(TimeAccessConfig {
            maintenance_windows: vec![MaintenanceWindowConfig {
                start_time: "12:00".to_string(),
                end_time: "13:00".to_string(),
                timezone: "UTC".to_string(),
                days: vec![1],
            }],
            ..TimeAccessConfig::default()
        });
        assert!(policy.evaluate(None, None, monday(11, 59)).is_allowed());
        assert_eq!(
            policy.evaluate(None, None, monday(12, 30)),
            AccessDecision::Deny(DenyReason::TimeBlocked)
        );
        let tuesday = Utc.with_ymd_and_hms(2024, 1, 16, 12, 30, 0).unwrap();
        assert!(policy.evaluate(None, None, tuesday).is_allowed());
    }

    #[test]
    fn maintenance_window_without_days_never_applies() {
        let policy = time_policy(TimeAccessConfig {
            maintenance_windows: vec![MaintenanceWindowConfig {
                start_time: "12:00".to_string(),
                end_time: "13:00".to_string(),
                timezone: "UTC".to_string(),
                days: vec![],
            }],
            ..TimeAccessConfig::default()
        });
        assert!(policy.evaluate(None, None, monday(12, 30)).is_allowed());
    }

    #[test]
    fn ip_check_runs_before_geo_and_time() {
        let policy = AccessPolicy::compile(&AccessPolicyConfig {
            ip_allowlist: IpAllowlistConfig {
                enabled: true,
                allowed_ips: vec!["1.1.1.1".to_string()],
                allowed_cidrs: vec![],
                trusted_proxy_hops: 0,
            },
            geo: GeoConfig {
                enabled: true,
                blocked_countries: vec!["KP".to_string()],
                ..GeoConfig::default()
            },
            time: TimeAccessConfig {
                enabled: true,
                ..TimeAccessConfig::default()
            },
        })
        .unwrap();
        let sunday = Utc.with_ymd_and_hms(2024, 1, 14, 3, 0, 0).unwrap();
        assert_eq!(
            policy.evaluate(Some("2.2.2.2"), Some("KP"), sunday),
            AccessDecision::Deny(DenyReason::IpBlocked)
        );
        assert_eq!(
            policy.evaluate(Some("1.1.1.1"), Some("KP"), sunday),
            AccessDecision::Deny(DenyReason::GeoBlocked)
        );
        assert_eq!(
            policy.evaluate(Some("1.1.1.1"), Some("DE"), sunday),
            AccessDecision::Deny(DenyReason::TimeBlocked)
        );
    }

    #[test]
    fn time_parsing_rejects_garbage() {
        assert!(DailyWindow::parse("24:00", "17:00").is_err());
        assert!(DailyWindow::parse("09:60", "17:00").is_err());
        assert!(DailyWindow::parse("9", "17:00").is_err());
        assert!(DailyWindow::parse("9:00", "17:00").is_ok());
    }
}
