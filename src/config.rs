use std::env;

use anyhow::{Context, Result};

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";
const DEFAULT_CRYPTO_API_BASE_URL: &str = "https://api.nowpayments.io";

#[derive(Clone, Debug)]
pub struct StripeSettings {
    pub secret_key: String,
    pub webhook_secret: String,
}

#[derive(Clone, Debug)]
pub struct CryptoSettings {
    pub api_key: String,
    pub ipn_secret: String,
    pub api_base_url: String,
}

#[derive(Clone, Debug)]
pub struct AccountingSettings {
    pub webhook_url: String,
    pub api_key: Option<String>,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub stripe: StripeSettings,
    pub crypto: CryptoSettings,
    /// Absent when no accounting endpoint is configured.
    pub accounting: Option<AccountingSettings>,
    pub run_migrations: bool,
    pub sentry_dsn: Option<String>,
    pub json_logs: bool,
}

fn required(key: &str) -> Result<String> {
    env::var(key).with_context(|| format!("{key} must be set"))
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn flag(value: Option<String>) -> bool {
    matches!(
        value.as_deref().map(str::to_ascii_lowercase).as_deref(),
        Some("1" | "true" | "yes" | "on")
    )
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let accounting = optional("ACCOUNTING_WEBHOOK_URL").map(|webhook_url| AccountingSettings {
            webhook_url,
            api_key: optional("ACCOUNTING_API_KEY"),
        });

        Ok(Config {
            database_url: required("DATABASE_URL")?,
            bind_addr: optional("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            stripe: StripeSettings {
                secret_key: required("STRIPE_SECRET_KEY")?,
                webhook_secret: required("STRIPE_WEBHOOK_SECRET")?,
            },
            crypto: CryptoSettings {
                api_key: required("CRYPTO_API_KEY")?,
                ipn_secret: required("CRYPTO_IPN_SECRET")?,
                api_base_url: optional("CRYPTO_API_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_CRYPTO_API_BASE_URL.to_string()),
            },
            accounting,
            run_migrations: flag(optional("RUN_MIGRATIONS")),
            sentry_dsn: optional("SENTRY_DSN"),
            json_logs: optional("LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        })
    }
}
