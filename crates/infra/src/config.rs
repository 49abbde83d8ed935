//! Runtime configuration of the point-of-sale core.

use std::time::Duration;

use kardex_accounting::ChartOfAccounts;

pub const COMMAND_TIMEOUT_ENV: &str = "KARDEX_COMMAND_TIMEOUT_MS";
pub const MAX_RETRIES_ENV: &str = "KARDEX_MAX_RETRIES";
pub const ACCOUNT_CASH_ENV: &str = "KARDEX_ACCOUNT_CASH";
pub const ACCOUNT_RECEIVABLE_ENV: &str = "KARDEX_ACCOUNT_RECEIVABLE";
pub const ACCOUNT_REVENUE_ENV: &str = "KARDEX_ACCOUNT_REVENUE";
pub const ACCOUNT_TAX_ENV: &str = "KARDEX_ACCOUNT_TAX";
pub const DEFAULT_PERIOD_ENV: &str = "KARDEX_DEFAULT_PERIOD";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PosConfig {
    /// Upper bound on one command execution, retries included.
    pub command_timeout: Duration,
    /// Extra attempts after a concurrency conflict.
    pub max_retries: u32,
    pub accounts: ChartOfAccounts,
    /// Period code used when no accounting period covers a sale's date.
    pub default_period: String,
}

impl Default for PosConfig {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_millis(5_000),
            max_retries: 3,
            accounts: ChartOfAccounts::default(),
            default_period: "DEFAULT".to_string(),
        }
    }
}

impl PosConfig {
    /// Read overrides from the process environment.
    ///
    /// Unset variables keep their defaults; unparsable ones are logged and
    /// ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(ms) = parsed::<u64>(&lookup, COMMAND_TIMEOUT_ENV) {
            if ms == 0 {
                tracing::warn!(var = COMMAND_TIMEOUT_ENV, "zero timeout ignored; using default");
            } else {
                config.command_timeout = Duration::from_millis(ms);
            }
        }
        if let Some(retries) = parsed::<u32>(&lookup, MAX_RETRIES_ENV) {
            config.max_retries = retries;
        }

        let accounts = &mut config.accounts;
        for (var, slot) in [
            (ACCOUNT_CASH_ENV, &mut accounts.cash),
            (ACCOUNT_RECEIVABLE_ENV, &mut accounts.receivable),
            (ACCOUNT_REVENUE_ENV, &mut accounts.revenue),
            (ACCOUNT_TAX_ENV, &mut accounts.tax_payable),
            (DEFAULT_PERIOD_ENV, &mut config.default_period),
        ] {
            if let Some(value) = text(&lookup, var) {
                *slot = value;
            }
        }

        config
    }
}

fn text(lookup: &impl Fn(&str) -> Option<String>, var: &str) -> Option<String> {
    let value = lookup(var)?;
    let value = value.trim();
    if value.is_empty() {
        tracing::warn!(var, "empty value ignored; using default");
        return None;
    }
    Some(value.to_string())
}

fn parsed<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, var: &str) -> Option<T> {
    let raw = text(lookup, var)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(var, value = %raw, "invalid value ignored; using default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> PosConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        PosConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_without_overrides() {
        let c = config(&[]);
        assert_eq!(c, PosConfig::default());
        assert_eq!(c.command_timeout, Duration::from_secs(5));
        assert_eq!(c.max_retries, 3);
        assert_eq!(c.accounts.cash, "1101");
        assert_eq!(c.default_period, "DEFAULT");
    }

    #[test]
    fn overrides_are_applied() {
        let c = config(&[
            (COMMAND_TIMEOUT_ENV, "250"),
            (MAX_RETRIES_ENV, "0"),
            (ACCOUNT_TAX_ENV, " 2408 "),
            (DEFAULT_PERIOD_ENV, "2026-00"),
        ]);
        assert_eq!(c.command_timeout, Duration::from_millis(250));
        assert_eq!(c.max_retries, 0);
        assert_eq!(c.accounts.tax_payable, "2408");
        assert_eq!(c.accounts.revenue, "4101");
        assert_eq!(c.default_period, "2026-00");
    }

    #[test]
    fn invalid_values_fall_back_to_defaults() {
        let c = config(&[
            (COMMAND_TIMEOUT_ENV, "soon"),
            (MAX_RETRIES_ENV, "-1"),
            (ACCOUNT_CASH_ENV, "   "),
        ]);
        assert_eq!(c, PosConfig::default());

        assert_eq!(config(&[(COMMAND_TIMEOUT_ENV, "0")]).command_timeout, Duration::from_secs(5));
    }
}
