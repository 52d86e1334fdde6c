use tracing::warn;

pub const ENV_DAPP_DENYLIST: &str = "WC_BRIDGE_DAPP_DENYLIST";
pub const ENV_EVENT_BUFFER: &str = "WC_BRIDGE_EVENT_BUFFER";
pub const ENV_REQUEST_BUFFER: &str = "WC_BRIDGE_REQUEST_BUFFER";
pub const ENV_RESPOND_TIMEOUT_MS: &str = "WC_BRIDGE_RESPOND_TIMEOUT_MS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// dApp names vetoed before a proposal is shown. Matched case-insensitively.
    pub dapp_denylist: Vec<String>,
    pub event_buffer: usize,
    pub request_buffer: usize,
    /// Host-side bound on transport awaits.
    pub respond_timeout_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            dapp_denylist: Vec::new(),
            event_buffer: 64,
            request_buffer: 32,
            respond_timeout_ms: 30_000,
        }
    }
}

impl BridgeConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Unparseable values keep their default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(raw) = lookup(ENV_DAPP_DENYLIST) {
            config.dapp_denylist = raw
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_owned)
                .collect();
        }
        if let Some(v) = parse(&lookup, ENV_EVENT_BUFFER) {
            config.event_buffer = v;
        }
        if let Some(v) = parse(&lookup, ENV_REQUEST_BUFFER) {
            config.request_buffer = v;
        }
        if let Some(v) = parse(&lookup, ENV_RESPOND_TIMEOUT_MS) {
            config.respond_timeout_ms = v;
        }
        config
    }
}

fn parse<F, T>(lookup: &F, key: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparseable config value");
            None
        }
    }
}
