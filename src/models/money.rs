use serde::{Deserialize, Serialize};

/// Currencies Stripe settles without a fractional unit.
const ZERO_DECIMAL_CURRENCIES: &[&str] = &[
    "bif", "clp", "djf", "gnf", "jpy", "kmf", "krw", "mga", "pyg", "rwf", "ugx", "vnd", "vuv",
    "xaf", "xof", "xpf",
];

const THREE_DECIMAL_CURRENCIES: &[&str] = &["bhd", "jod", "kwd", "omr", "tnd"];

/// Number of minor units in one major unit of `currency`.
pub fn minor_unit_scale(currency: &str) -> i64 {
    let currency = currency.to_ascii_lowercase();
    if ZERO_DECIMAL_CURRENCIES.contains(&currency.as_str()) {
        1
    } else if THREE_DECIMAL_CURRENCIES.contains(&currency.as_str()) {
        1000
    } else {
        100
    }
}

/// A settled amount kept in integer minor units alongside its currency, so the
/// minor/major conversion is always explicit about its scale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amount {
    pub minor: i64,
    pub currency: String,
}

impl Amount {
    pub fn from_minor(minor: i64, currency: &str) -> Self {
        Self {
            minor,
            currency: currency.to_ascii_lowercase(),
        }
    }

    /// Converts a major-unit value (e.g. `5.25` USD) using the currency's scale.
    /// Returns `None` for NaN/infinite input or values that overflow `i64`.
    pub fn from_major(major: f64, currency: &str) -> Option<Self> {
        if !major.is_finite() {
            return None;
        }
        let scaled = (major * minor_unit_scale(currency) as f64).round();
        if scaled.abs() >= i64::MAX as f64 {
            return None;
        }
        Some(Self::from_minor(scaled as i64, currency))
    }

    pub fn major(&self) -> f64 {
        self.minor as f64 / minor_unit_scale(&self.currency) as f64
    }
}
