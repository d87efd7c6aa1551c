use std::{env, net::IpAddr, time::Duration};

use akiba_common::{parse_boolean_flag, Secret};
use log::*;

const DEFAULT_AKIBA_HOST: &str = "127.0.0.1";
const DEFAULT_AKIBA_PORT: u16 = 8360;
const DEFAULT_CACHE_TTL_SECS: u64 = 30;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
const DEFAULT_LEDGER_POLL_SECS: u64 = 15;
const DEFAULT_PENDING_TTL_HOURS: i64 = 2;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// If true, the X-Forwarded-For header will be used to determine the client's IP address, rather than the
    /// connection's remote address.
    pub use_x_forwarded_for: bool,
    /// If true, the Forwarded header will be used to determine the client's IP address, rather than the
    /// connection's remote address.
    pub use_forwarded: bool,
    /// TTL for the cached balance/goal/transaction read views.
    pub cache_ttl: Duration,
    /// How often the expiry sweep runs.
    pub sweep_interval: Duration,
    /// How long a dispatched operation waits for its confirmation before the sweep expires it.
    pub pending_ttl: chrono::Duration,
    pub ledger: LedgerConfig,
    pub mpesa: MpesaConfig,
    pub notifier: NotifierConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_AKIBA_HOST.to_string(),
            port: DEFAULT_AKIBA_PORT,
            database_url: String::default(),
            use_x_forwarded_for: false,
            use_forwarded: false,
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            pending_ttl: chrono::Duration::hours(DEFAULT_PENDING_TTL_HOURS),
            ledger: LedgerConfig::default(),
            mpesa: MpesaConfig::default(),
            notifier: NotifierConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("AKIBA_HOST").ok().unwrap_or_else(|| DEFAULT_AKIBA_HOST.into());
        let port = env::var("AKIBA_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for AKIBA_PORT. {e} Using the default, {DEFAULT_AKIBA_PORT}, \
                         instead."
                    );
                    DEFAULT_AKIBA_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_AKIBA_PORT);
        let database_url = env::var("AKIBA_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ AKIBA_DATABASE_URL is not set. Please set it to the URL for the Akiba database.");
            String::default()
        });
        let use_x_forwarded_for = parse_boolean_flag(env::var("AKIBA_USE_X_FORWARDED_FOR").ok(), false);
        let use_forwarded = parse_boolean_flag(env::var("AKIBA_USE_FORWARDED").ok(), false);
        let cache_ttl = duration_from_env("AKIBA_CACHE_TTL_SECS", DEFAULT_CACHE_TTL_SECS);
        let sweep_interval = duration_from_env("AKIBA_SWEEP_INTERVAL_SECS", DEFAULT_SWEEP_INTERVAL_SECS);
        let pending_ttl = env::var("AKIBA_PENDING_TTL_HOURS")
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .map(chrono::Duration::hours)
            .unwrap_or_else(|| chrono::Duration::hours(DEFAULT_PENDING_TTL_HOURS));
        Self {
            host,
            port,
            database_url,
            use_x_forwarded_for,
            use_forwarded,
            cache_ttl,
            sweep_interval,
            pending_ttl,
            ledger: LedgerConfig::from_env_or_defaults(),
            mpesa: MpesaConfig::from_env_or_defaults(),
            notifier: NotifierConfig::from_env_or_defaults(),
        }
    }
}

fn duration_from_env(var: &str, default_secs: u64) -> Duration {
    env::var(var)
        .ok()
        .and_then(|s| {
            s.parse::<u64>()
                .map_err(|e| warn!("🪛️ Invalid configuration value for {var}. {e}"))
                .ok()
        })
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(default_secs))
}

//-------------------------------------------------  LedgerConfig  ----------------------------------------------------
/// Connection details for the ledger relay, the service that submits pre-signed transactions to the savings
/// contract and exposes its event log. This backend never holds chain keys.
#[derive(Clone, Debug, Default)]
pub struct LedgerConfig {
    pub relay_url: String,
    pub api_key: Secret<String>,
    pub poll_interval: Duration,
}

impl LedgerConfig {
    pub fn from_env_or_defaults() -> Self {
        let relay_url = env::var("AKIBA_LEDGER_RELAY_URL").ok().unwrap_or_else(|| {
            error!("🪛️ AKIBA_LEDGER_RELAY_URL is not set. On-chain operations will fail until it is configured.");
            String::default()
        });
        let api_key = Secret::new(env::var("AKIBA_LEDGER_API_KEY").ok().unwrap_or_default());
        let poll_interval = duration_from_env("AKIBA_LEDGER_POLL_SECS", DEFAULT_LEDGER_POLL_SECS);
        Self { relay_url, api_key, poll_interval }
    }
}

//-------------------------------------------------  MpesaConfig  -----------------------------------------------------
#[derive(Clone, Debug, Default)]
pub struct MpesaConfig {
    pub base_url: String,
    pub consumer_key: String,
    pub consumer_secret: Secret<String>,
    pub shortcode: String,
    pub passkey: Secret<String>,
    pub callback_url: String,
    /// If supplied, requests against the webhook endpoint will be checked against a whitelist of provider IP
    /// addresses. To explicitly disable the whitelist, set this to "false", "none", or "0".
    pub whitelist: Option<Vec<IpAddr>>,
}

impl MpesaConfig {
    pub fn from_env_or_defaults() -> Self {
        let base_url = env::var("AKIBA_MPESA_BASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ AKIBA_MPESA_BASE_URL is not set. Mobile-money operations will fail until it is configured.");
            String::default()
        });
        let consumer_key = env::var("AKIBA_MPESA_CONSUMER_KEY").ok().unwrap_or_else(|| {
            error!("🪛️ AKIBA_MPESA_CONSUMER_KEY is not set. Please set it to the API key for the payment gateway.");
            String::default()
        });
        let consumer_secret = Secret::new(env::var("AKIBA_MPESA_CONSUMER_SECRET").ok().unwrap_or_else(|| {
            error!("🪛️ AKIBA_MPESA_CONSUMER_SECRET is not set. Please set it to the secret for the payment gateway.");
            String::default()
        }));
        let shortcode = env::var("AKIBA_MPESA_SHORTCODE").ok().unwrap_or_default();
        let passkey = Secret::new(env::var("AKIBA_MPESA_PASSKEY").ok().unwrap_or_default());
        let callback_url = env::var("AKIBA_MPESA_CALLBACK_URL").ok().unwrap_or_else(|| {
            warn!("🪛️ AKIBA_MPESA_CALLBACK_URL is not set. The provider will not be able to deliver callbacks.");
            String::default()
        });
        let whitelist = env::var("AKIBA_MPESA_IP_WHITELIST").ok().and_then(|s| {
            if ["none", "false", "0"].contains(&s.to_lowercase().as_str()) {
                info!(
                    "🪛️ Payment provider IP whitelist is disabled. If this is not what you want, set \
                     AKIBA_MPESA_IP_WHITELIST to a comma-separated list of IP addresses to enable it."
                );
                return None;
            }
            let ip_addrs = s
                .split(',')
                .filter_map(|s| {
                    s.trim()
                        .parse()
                        .map_err(|e| {
                            warn!("🪛️ Ignoring invalid IP address ({s}) in AKIBA_MPESA_IP_WHITELIST: {e}");
                            None::<IpAddr>
                        })
                        .ok()
                })
                .collect::<Vec<IpAddr>>();
            Some(ip_addrs)
        });
        match &whitelist {
            Some(whitelist) if whitelist.is_empty() => {
                warn!(
                    "🚨️ The payment provider IP whitelist was configured, but is empty. The server will run, but \
                     won't authorise any incoming callbacks."
                );
            },
            None => {
                info!(
                    "🪛️ No payment provider IP whitelist is set. Callbacks are validated by correlation id \
                     matching only."
                );
            },
            Some(v) => {
                let addrs = v.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(", ");
                info!("🪛️ Payment provider IP whitelist: {addrs}");
            },
        }
        Self { base_url, consumer_key, consumer_secret, shortcode, passkey, callback_url, whitelist }
    }
}

//-------------------------------------------------  NotifierConfig  --------------------------------------------------
#[derive(Clone, Debug, Default)]
pub struct NotifierConfig {
    pub sms_url: String,
    pub api_key: Secret<String>,
    pub sender_id: String,
}

impl NotifierConfig {
    pub fn from_env_or_defaults() -> Self {
        let sms_url = env::var("AKIBA_SMS_URL").ok().unwrap_or_else(|| {
            info!("🪛️ AKIBA_SMS_URL is not set. Settlement notifications will only be logged.");
            String::default()
        });
        let api_key = Secret::new(env::var("AKIBA_SMS_API_KEY").ok().unwrap_or_default());
        let sender_id = env::var("AKIBA_SMS_SENDER_ID").ok().unwrap_or_else(|| "AKIBA".to_string());
        Self { sms_url, api_key, sender_id }
    }
}
