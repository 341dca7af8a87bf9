//! Server settings loaded from the environment.

use std::collections::HashMap;

use pipehub_core::event::DEFAULT_EVENT_TTL_SECONDS;
use pipehub_core::driver::DEFAULT_TICK_SECONDS;

/// Default long-poll budget for listen and pop calls, in seconds.
pub const DEFAULT_LISTEN_WAIT_BUDGET_SECONDS: u64 = 30;

/// One static API token mapped to a principal. The entry format in
/// `API_TOKENS` is `username:token[:group1;group2]`, comma-separated;
/// membership in the `admin` group grants administrative calls.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiTokenEntry {
    pub username: String,
    pub token: String,
    pub groups: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct HubSettings {
    pub bind_addr: String,
    /// Path of the sqlite database holding the three collections.
    pub store_url: String,
    /// JWT signing key for the external auth collaborator; unused by the
    /// static-token resolver in this crate.
    pub secret_key: Option<String>,
    pub event_ttl_seconds: u64,
    pub driver_tick_seconds: u64,
    pub listen_wait_budget_seconds: u64,
    pub cloud_events_source: String,
    pub api_tokens: Vec<ApiTokenEntry>,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8001".to_string(),
            store_url: "pipehub.db".to_string(),
            secret_key: None,
            event_ttl_seconds: DEFAULT_EVENT_TTL_SECONDS,
            driver_tick_seconds: DEFAULT_TICK_SECONDS,
            listen_wait_budget_seconds: DEFAULT_LISTEN_WAIT_BUDGET_SECONDS,
            cloud_events_source: "https://pipehub.local/".to_string(),
            api_tokens: Vec::new(),
        }
    }
}

impl HubSettings {
    pub fn from_env() -> Result<Self, String> {
        let mut envs = HashMap::new();
        for key in [
            "BIND_ADDR",
            "STORE_URL",
            "SECRET_KEY",
            "EVENT_HISTORY_TTL_SECONDS",
            "DRIVER_TICK_SECONDS",
            "LISTEN_WAIT_BUDGET_SECONDS",
            "CLOUD_EVENTS_SOURCE",
            "API_TOKENS",
        ] {
            if let Ok(value) = std::env::var(key) {
                envs.insert(key.to_string(), value);
            }
        }
        Self::from_env_map(&envs)
    }

    pub fn from_env_map(envs: &HashMap<String, String>) -> Result<Self, String> {
        let mut settings = Self::default();
        if let Some(value) = non_empty(envs, "BIND_ADDR") {
            settings.bind_addr = value;
        }
        if let Some(value) = non_empty(envs, "STORE_URL") {
            settings.store_url = value;
        }
        settings.secret_key = non_empty(envs, "SECRET_KEY");
        if let Some(value) = non_empty(envs, "EVENT_HISTORY_TTL_SECONDS") {
            settings.event_ttl_seconds = parse_seconds("EVENT_HISTORY_TTL_SECONDS", &value)?;
        }
        if let Some(value) = non_empty(envs, "DRIVER_TICK_SECONDS") {
            settings.driver_tick_seconds = parse_seconds("DRIVER_TICK_SECONDS", &value)?;
        }
        if let Some(value) = non_empty(envs, "LISTEN_WAIT_BUDGET_SECONDS") {
            settings.listen_wait_budget_seconds =
                parse_seconds("LISTEN_WAIT_BUDGET_SECONDS", &value)?;
        }
        if let Some(value) = non_empty(envs, "CLOUD_EVENTS_SOURCE") {
            settings.cloud_events_source = value;
        }
        if let Some(value) = non_empty(envs, "API_TOKENS") {
            settings.api_tokens = parse_api_tokens(&value)?;
        }
        Ok(settings)
    }
}

fn non_empty(envs: &HashMap<String, String>, key: &str) -> Option<String> {
    envs.get(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_seconds(key: &str, value: &str) -> Result<u64, String> {
    let seconds: u64 = value
        .parse()
        .map_err(|_| format!("invalid {key}='{value}'. expected seconds"))?;
    if seconds == 0 {
        return Err(format!("invalid {key}='{value}'. must be positive"));
    }
    Ok(seconds)
}

fn parse_api_tokens(value: &str) -> Result<Vec<ApiTokenEntry>, String> {
    let mut entries = Vec::new();
    for raw in value.split(',') {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        let mut fields = raw.splitn(3, ':');
        let username = fields.next().unwrap_or_default().trim();
        let token = fields.next().unwrap_or_default().trim();
        if username.is_empty() || token.is_empty() {
            return Err(format!(
                "invalid API_TOKENS entry '{raw}'. expected username:token[:group1;group2]"
            ));
        }
        let groups = fields
            .next()
            .map(|g| {
                g.split(';')
                    .map(str::trim)
                    .filter(|g| !g.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        entries.push(ApiTokenEntry {
            username: username.to_string(),
            token: token.to_string(),
            groups,
        });
    }
    Ok(entries)
}
