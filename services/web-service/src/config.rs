use leaseaudit_common::{env_opt, env_or, env_string};
use std::time::Duration;

use crate::checkout::{CheckoutConfig, DEFAULT_STRIPE_API_BASE};

pub const MIN_DOWNLOAD_TTL_SECS: u64 = 600;
pub const MAX_DOWNLOAD_TTL_SECS: u64 = 3600;

#[derive(Clone)]
pub struct WebConfig {
    pub port: u16,
    pub worker_url: Option<String>,
    pub worker_key: Option<String>,
    pub worker_timeout: Duration,
    pub download_ttl_secs: u64,
    pub max_upload_bytes: usize,
    pub leads_notify_email: Option<String>,
    pub checkout: Option<CheckoutConfig>,
}

impl WebConfig {
    pub fn from_env() -> Self {
        let checkout = match (env_opt("STRIPE_SECRET_KEY"), env_opt("STRIPE_PRICE_ID")) {
            (Some(secret_key), Some(price_id)) => Some(CheckoutConfig {
                api_base: env_string("STRIPE_API_BASE", DEFAULT_STRIPE_API_BASE),
                secret_key,
                price_id,
                success_url: env_string(
                    "CHECKOUT_SUCCESS_URL",
                    "http://localhost:3000/audit/success?session_id={CHECKOUT_SESSION_ID}",
                ),
                cancel_url: env_string("CHECKOUT_CANCEL_URL", "http://localhost:3000/audit"),
            }),
            _ => None,
        };

        Self {
            port: env_or("PORT", 8080u16),
            worker_url: env_opt("LEASE_WORKER_URL"),
            worker_key: env_opt("LEASE_WORKER_KEY"),
            worker_timeout: Duration::from_secs(env_or("WORKER_TIMEOUT_SECS", 300u64)),
            download_ttl_secs: clamp_download_ttl(env_or(
                "DOWNLOAD_URL_TTL_SECS",
                MAX_DOWNLOAD_TTL_SECS,
            )),
            max_upload_bytes: env_or("MAX_UPLOAD_BYTES", 25 * 1024 * 1024usize),
            leads_notify_email: env_opt("LEADS_NOTIFY_EMAIL"),
            checkout,
        }
    }
}

pub fn clamp_download_ttl(secs: u64) -> u64 {
    secs.clamp(MIN_DOWNLOAD_TTL_SECS, MAX_DOWNLOAD_TTL_SECS)
}
