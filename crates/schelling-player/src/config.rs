//! Service configuration from environment variables.

use schelling_core::{Address, ValidationError};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} must be set when LEDGER_RPC_URL is set")]
    Missing { var: &'static str },

    #[error("{var} is not a valid number: {value:?}")]
    InvalidNumber { var: &'static str, value: String },

    #[error("{var} must be greater than zero")]
    ZeroInterval { var: &'static str },

    #[error("{var}: {source}")]
    InvalidAddress {
        var: &'static str,
        source: ValidationError,
    },
}

/// Where round state comes from
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LedgerMode {
    /// In-process mock contract with a generated demo round
    Demo,
    /// Live contract behind a JSON-RPC node
    Rpc {
        url: String,
        contract: Address,
        participant: Address,
    },
}

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub ledger: LedgerMode,
    /// Participant address; a demo participant is generated when unset
    pub participant: Option<Address>,
    pub store_dir: PathBuf,
    pub poll_interval: Duration,
    pub confirm_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any variable source (tests pass a map)
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = number(&lookup, "PORT", 3001)?;
        let poll_interval = seconds(&lookup, "POLL_INTERVAL_SECS", 5)?;
        let confirm_timeout = seconds(&lookup, "CONFIRM_TIMEOUT_SECS", 120)?;
        let store_dir = lookup("STORE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(".schelling"));
        let participant = address(&lookup, "PARTICIPANT")?;

        let ledger = match lookup("LEDGER_RPC_URL").filter(|url| !url.is_empty()) {
            None => LedgerMode::Demo,
            Some(url) => {
                let contract = address(&lookup, "CONTRACT_ADDRESS")?
                    .ok_or(ConfigError::Missing { var: "CONTRACT_ADDRESS" })?;
                let participant =
                    participant.ok_or(ConfigError::Missing { var: "PARTICIPANT" })?;
                LedgerMode::Rpc {
                    url,
                    contract,
                    participant,
                }
            }
        };

        Ok(Self {
            port,
            ledger,
            participant,
            store_dir,
            poll_interval,
            confirm_timeout,
        })
    }
}

fn number<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(var) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { var, value }),
    }
}

/// Non-zero duration in whole seconds
fn seconds<F>(lookup: &F, var: &'static str, default: u64) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match number(lookup, var, default)? {
        0 => Err(ConfigError::ZeroInterval { var }),
        secs => Ok(Duration::from_secs(secs)),
    }
}

fn address<F>(lookup: &F, var: &'static str) -> Result<Option<Address>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(var)
        .map(|value| value.trim().parse())
        .transpose()
        .map_err(|source| ConfigError::InvalidAddress { var, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|var| vars.get(var).cloned())
    }

    #[test]
    fn test_defaults_to_demo_mode() {
        let config = config(&[]).unwrap();
        assert_eq!(config.port, 3001);
        assert_eq!(config.ledger, LedgerMode::Demo);
        assert_eq!(config.participant, None);
        assert_eq!(config.store_dir, PathBuf::from(".schelling"));
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.confirm_timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_rpc_mode() {
        let config = config(&[
            ("LEDGER_RPC_URL", "http://localhost:8545"),
            ("CONTRACT_ADDRESS", "0x1111111111111111111111111111111111111111"),
            ("PARTICIPANT", "0x2222222222222222222222222222222222222222"),
            ("POLL_INTERVAL_SECS", "2"),
        ])
        .unwrap();

        match config.ledger {
            LedgerMode::Rpc {
                url,
                contract,
                participant,
            } => {
                assert_eq!(url, "http://localhost:8545");
                assert_eq!(contract.as_bytes(), &[0x11; 20]);
                assert_eq!(participant.as_bytes(), &[0x22; 20]);
            }
            other => panic!("expected rpc mode, got {:?}", other),
        }
        assert_eq!(config.poll_interval, Duration::from_secs(2));
    }

    #[test]
    fn test_rpc_mode_requires_contract_and_participant() {
        let missing_contract = config(&[("LEDGER_RPC_URL", "http://localhost:8545")]);
        assert!(matches!(
            missing_contract,
            Err(ConfigError::Missing { var: "CONTRACT_ADDRESS" })
        ));

        let missing_participant = config(&[
            ("LEDGER_RPC_URL", "http://localhost:8545"),
            ("CONTRACT_ADDRESS", "0x1111111111111111111111111111111111111111"),
        ]);
        assert!(matches!(
            missing_participant,
            Err(ConfigError::Missing { var: "PARTICIPANT" })
        ));
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            config(&[("PORT", "eighty")]),
            Err(ConfigError::InvalidNumber { var: "PORT", .. })
        ));
        assert!(matches!(
            config(&[("PARTICIPANT", "0x12")]),
            Err(ConfigError::InvalidAddress {
                var: "PARTICIPANT",
                ..
            })
        ));
    }

    #[test]
    fn test_rejects_zero_intervals() {
        assert!(matches!(
            config(&[("POLL_INTERVAL_SECS", "0")]),
            Err(ConfigError::ZeroInterval {
                var: "POLL_INTERVAL_SECS"
            })
        ));
        assert!(matches!(
            config(&[("CONFIRM_TIMEOUT_SECS", "0")]),
            Err(ConfigError::ZeroInterval {
                var: "CONFIRM_TIMEOUT_SECS"
            })
        ));
        assert_eq!(
            config(&[("POLL_INTERVAL_SECS", "1")]).unwrap().poll_interval,
            Duration::from_secs(1)
        );
    }
}
