//! Session, token and anomaly detection configuration.

use serde::Deserialize;

/// Configuration for token issuance and session lifecycle.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC-SHA256 secret for access tokens.
    pub access_token_secret: String,
    /// HMAC-SHA256 secret for refresh tokens. Must differ from the access
    /// secret so neither token kind can stand in for the other.
    pub refresh_token_secret: String,
    /// Access token lifetime in seconds (default: 900 = 15 minutes).
    pub access_token_lifetime_secs: u64,
    /// Refresh token lifetime in seconds (default: 604_800 = 7 days).
    /// Also the TTL of every session record.
    pub refresh_token_lifetime_secs: u64,
    /// JWT issuer (`iss` claim).
    pub jwt_issuer: String,
    /// JWT audience (`aud` claim).
    pub jwt_audience: String,
    /// How long an invalidated session is retained for audit
    /// (default: 86_400 = 24 hours).
    pub invalidated_retention_secs: u64,
    /// Floor for blacklist entries whose expiry cannot be derived
    /// (default: 60 seconds).
    pub min_blacklist_ttl_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            access_token_secret: String::new(),
            refresh_token_secret: String::new(),
            access_token_lifetime_secs: 900,
            refresh_token_lifetime_secs: 604_800,
            jwt_issuer: "warden".into(),
            jwt_audience: "warden-clients".into(),
            invalidated_retention_secs: 86_400,
            min_blacklist_ttl_secs: 60,
        }
    }
}

impl AuthConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.access_token_secret.len() < 32 || self.refresh_token_secret.len() < 32 {
            return Err("token secrets must be at least 32 bytes".into());
        }
        if self.access_token_secret == self.refresh_token_secret {
            return Err("access and refresh token secrets must differ".into());
        }
        if self.access_token_lifetime_secs == 0
            || self.access_token_lifetime_secs >= self.refresh_token_lifetime_secs
        {
            return Err("access token lifetime must be non-zero and shorter than refresh".into());
        }
        if self.jwt_issuer.is_empty() || self.jwt_audience.is_empty() {
            return Err("issuer and audience must be set".into());
        }
        Ok(())
    }
}

/// Per-factor weights. Scores are sums of these.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnomalyWeights {
    pub new_device: u32,
    pub new_ip_address: u32,
    pub suspicious_ip: u32,
    pub bot_user_agent: u32,
    pub rapid_device_switching: u32,
    pub new_timezone: u32,
}

impl Default for AnomalyWeights {
    fn default() -> Self {
        Self {
            new_device: 30,
            new_ip_address: 20,
            suspicious_ip: 40,
            bot_user_agent: 25,
            rapid_device_switching: 35,
            new_timezone: 30,
        }
    }
}

/// Minimum score for each risk level above low.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RiskThresholds {
    pub medium: u32,
    pub high: u32,
    pub critical: u32,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            medium: 40,
            high: 60,
            critical: 80,
        }
    }
}

/// Device tracking and anomaly detection.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    pub weights: AnomalyWeights,
    pub thresholds: RiskThresholds,
    /// Rolling window for rapid device switching (default: 24 hours).
    pub rapid_switch_window_secs: u64,
    /// Rapid switching fires when more than this many distinct devices
    /// are seen within the window (default: 2).
    pub rapid_switch_max_devices: usize,
    /// CIDR ranges treated as suspicious (e.g. `198.51.100.0/24`).
    pub suspicious_ip_ranges: Vec<String>,
    /// IPs at or below this reputation count as suspicious (default: -30).
    pub suspicious_reputation: i64,
    /// Reputation subtracted from the request IP on medium or higher risk
    /// (default: 10).
    pub reputation_penalty: i64,
    /// Case-insensitive regexes matched against the user-agent.
    pub bot_user_agent_patterns: Vec<String>,
    /// Devices kept per account (default: 20).
    pub device_history_limit: usize,
    /// Session ids kept on one device record (default: 10).
    pub device_session_limit: usize,
    /// Known IPs, and separately known timezones, kept per account
    /// (default: 50).
    pub known_value_limit: usize,
    /// Device history, known IP and known timezone TTL
    /// (default: 2_592_000 = 30 days).
    pub device_history_ttl_secs: u64,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            weights: AnomalyWeights::default(),
            thresholds: RiskThresholds::default(),
            rapid_switch_window_secs: 24 * 60 * 60,
            rapid_switch_max_devices: 2,
            suspicious_ip_ranges: Vec::new(),
            suspicious_reputation: -30,
            reputation_penalty: 10,
            bot_user_agent_patterns: [
                r"bot\b",
                r"crawl",
                r"spider",
                r"scrap",
                r"headless",
                r"phantomjs",
                r"selenium",
                r"puppeteer",
                r"playwright",
                r"^curl/",
                r"^wget/",
                r"python-requests",
                r"python-urllib",
                r"go-http-client",
                r"^java/",
                r"okhttp",
                r"libwww-perl",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            device_history_limit: 20,
            device_session_limit: 10,
            known_value_limit: 50,
            device_history_ttl_secs: 30 * 24 * 60 * 60,
        }
    }
}

impl AnomalyConfig {
    pub fn validate(&self) -> Result<(), String> {
        let t = &self.thresholds;
        if !(t.medium <= t.high && t.high <= t.critical) {
            return Err("risk thresholds must satisfy medium <= high <= critical".into());
        }
        if self.device_session_limit == 0 || self.known_value_limit == 0 {
            return Err("device session and known value limits must be non-zero".into());
        }
        if self.device_history_limit == 0 {
            return Err("device history limit must be non-zero".into());
        }
        if self.rapid_switch_window_secs == 0 {
            return Err("rapid switch window must be non-zero".into());
        }
        Ok(())
    }
}
