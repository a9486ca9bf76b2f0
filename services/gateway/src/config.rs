//! Process configuration read from the environment.
//!
//! Every key is optional; unset keys fall back to the component defaults.
//! The environment is collected through the `config` crate into a flat
//! [`EnvSettings`], then mapped onto the component configs. Times, the UTC
//! offset, the drop policy and seed funds keep their own parsers.

use std::net::SocketAddr;
use std::time::Duration;

use chrono::{FixedOffset, NaiveTime};
use market_data::{DropPolicy, FanoutConfig, FeedConfig};
use matching_engine::MatchingConfig;
use rust_decimal::Decimal;
use scheduler::ScheduleConfig;
use serde::Deserialize;
use thiserror::Error;
use types::ids::UserId;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read environment: {0}")]
    Source(#[from] ::config::ConfigError),

    #[error("{key}: cannot parse {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub bind_addr: SocketAddr,
    pub feed: FeedConfig,
    pub fanout: FanoutConfig,
    pub matching: MatchingConfig,
    pub schedule: ScheduleConfig,
    /// Fallback quote endpoint for square-off; disabled when unset
    pub quote_api_url: Option<String>,
    pub quote_api_token: String,
    /// Funds records created at boot, `user=cash` pairs
    pub seed_funds: Vec<(UserId, Decimal)>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            feed: FeedConfig::default(),
            fanout: FanoutConfig::default(),
            matching: MatchingConfig::default(),
            schedule: ScheduleConfig::default(),
            quote_api_url: None,
            quote_api_token: String::new(),
            seed_funds: Vec::new(),
        }
    }
}

/// Recognised environment keys, lowercased by the `config` crate.
#[derive(Debug, Default, Deserialize)]
pub struct EnvSettings {
    pub bind_addr: Option<SocketAddr>,
    pub upstream_ws_url: Option<String>,
    pub upstream_token: Option<String>,
    pub reconnect_base_ms: Option<u64>,
    pub reconnect_max_ms: Option<u64>,
    pub reconnect_max_attempts: Option<u32>,
    pub match_queue_capacity: Option<usize>,
    pub session_outbox_capacity: Option<usize>,
    pub drop_policy: Option<String>,
    pub square_off_at: Option<String>,
    pub cancel_pending_at: Option<String>,
    pub cleanup_at: Option<String>,
    pub schedule_utc_offset: Option<String>,
    pub retention_days: Option<i64>,
    pub quote_api_url: Option<String>,
    pub quote_api_token: Option<String>,
    pub seed_funds: Option<String>,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_source(::config::Environment::default())
    }

    /// Load from explicit `KEY=value` pairs instead of the process
    /// environment.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map: ::config::Map<String, String> = vars
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        Self::from_source(::config::Environment::default().source(Some(map)))
    }

    fn from_source(source: ::config::Environment) -> Result<Self, ConfigError> {
        let settings: EnvSettings = ::config::Config::builder()
            .add_source(source)
            .build()?
            .try_deserialize()?;
        settings.apply(Self::default())
    }
}

impl EnvSettings {
    fn apply(self, mut config: GatewayConfig) -> Result<GatewayConfig, ConfigError> {
        if let Some(addr) = self.bind_addr {
            config.bind_addr = addr;
        }

        if let Some(url) = self.upstream_ws_url {
            config.feed.url = url;
        }
        if let Some(token) = self.upstream_token {
            config.feed.token = token;
        }
        if let Some(ms) = self.reconnect_base_ms {
            config.feed.reconnect_base = Duration::from_millis(ms);
        }
        if let Some(ms) = self.reconnect_max_ms {
            config.feed.reconnect_max = Duration::from_millis(ms);
        }
        if let Some(attempts) = self.reconnect_max_attempts {
            config.feed.max_attempts = attempts;
        }

        if let Some(capacity) = self.match_queue_capacity {
            config.matching.queue_capacity = capacity;
        }
        if let Some(capacity) = self.session_outbox_capacity {
            config.fanout.outbox_capacity = capacity;
        }
        if let Some(raw) = self.drop_policy {
            config.fanout.drop_policy = parse_drop_policy(&raw)?;
        }

        if let Some(raw) = self.square_off_at {
            config.schedule.square_off_at = parse_time("SQUARE_OFF_AT", &raw)?;
        }
        if let Some(raw) = self.cancel_pending_at {
            config.schedule.cancel_pending_at = parse_time("CANCEL_PENDING_AT", &raw)?;
        }
        if let Some(raw) = self.cleanup_at {
            config.schedule.cleanup_at = parse_time("CLEANUP_AT", &raw)?;
        }
        if let Some(raw) = self.schedule_utc_offset {
            config.schedule.utc_offset = parse_offset(&raw)?;
        }
        if let Some(days) = self.retention_days {
            config.schedule.retention_days = days;
        }

        config.quote_api_url = self.quote_api_url.filter(|url| !url.is_empty());
        if let Some(token) = self.quote_api_token {
            config.quote_api_token = token;
        }
        if let Some(raw) = self.seed_funds {
            config.seed_funds = parse_seed_funds(&raw)?;
        }

        Ok(config)
    }
}

fn invalid(key: &'static str, value: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.into(),
    }
}

fn parse_time(key: &'static str, raw: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M").map_err(|err| invalid(key, raw, err.to_string()))
}

fn parse_drop_policy(raw: &str) -> Result<DropPolicy, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "drop_newest" | "drop-newest" => Ok(DropPolicy::DropNewest),
        "disconnect" => Ok(DropPolicy::Disconnect),
        _ => Err(invalid("DROP_POLICY", raw, "expected drop_newest or disconnect")),
    }
}

/// `+05:30`, `-04:00` or `Z`
fn parse_offset(raw: &str) -> Result<FixedOffset, ConfigError> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("z") {
        return FixedOffset::east_opt(0).ok_or_else(|| invalid("SCHEDULE_UTC_OFFSET", raw, "out of range"));
    }
    let (sign, rest) = match trimmed.split_at_checked(1) {
        Some(("+", rest)) => (1, rest),
        Some(("-", rest)) => (-1, rest),
        _ => return Err(invalid("SCHEDULE_UTC_OFFSET", raw, "expected +HH:MM or -HH:MM")),
    };
    let time = NaiveTime::parse_from_str(rest, "%H:%M")
        .map_err(|err| invalid("SCHEDULE_UTC_OFFSET", raw, err.to_string()))?;
    let seconds = time.signed_duration_since(NaiveTime::MIN).num_seconds();
    let seconds = i32::try_from(seconds).map_err(|err| invalid("SCHEDULE_UTC_OFFSET", raw, err.to_string()))?;
    FixedOffset::east_opt(sign * seconds).ok_or_else(|| invalid("SCHEDULE_UTC_OFFSET", raw, "out of range"))
}

fn parse_seed_funds(raw: &str) -> Result<Vec<(UserId, Decimal)>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (user, cash) = pair
                .split_once('=')
                .ok_or_else(|| invalid("SEED_FUNDS", pair, "expected user=cash"))?;
            let user = user
                .trim()
                .parse::<UserId>()
                .map_err(|err| invalid("SEED_FUNDS", pair, err.to_string()))?;
            let cash = cash
                .trim()
                .parse::<Decimal>()
                .map_err(|err| invalid("SEED_FUNDS", pair, err.to_string()))?;
            Ok((user, cash))
        })
        .collect()
}
