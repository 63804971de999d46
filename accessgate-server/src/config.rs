//! Quota server configuration.
//!
//! Loads configuration from a TOML file with support for environment variable
//! expansion in string values. Variables use `$VAR` or `${VAR}` syntax.
//!
//! # Example Configuration
//!
//! ```toml
//! host = "0.0.0.0"
//! port = 4022
//! price = "0.01"
//! resources = ["query", "export"]
//!
//! [ledger]
//! address = "0x00000000000000000000000000000000000000aa"
//! owner = "$LEDGER_OWNER"
//! minimum_payment = "0.01"
//!
//! [token]
//! chain_id = 84532
//! address = "0x036CbD53842c5426634e7929541eC2318f3dCF7e"
//!
//! [token.balances]
//! "0x0000000000000000000000000000000000000001" = "25.00"
//!
//! [subscription]
//! query_limit = 100
//! expiration_days = 30
//! ```
//!
//! # Environment Variables
//!
//! - `CONFIG` - Path to configuration file (default: `config.toml`)
//! - `HOST` - Override server bind address
//! - `PORT` - Override server port

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use accessgate::amount::{AmountError, parse_units};
use accessgate::config::{LedgerConfig, SubscriptionPolicy};
use accessgate_evm::chain::{ChainId, TokenDomain, find_network};
use accessgate_evm::{BASE_SEPOLIA, DEFAULT_TOKEN_DECIMALS, USDC_BASE_SEPOLIA};
use alloy_primitives::{Address, U256};
use clap::Parser;
use serde::{Deserialize, Serialize};

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "accessgate-server", author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, env = "CONFIG", default_value = "config.toml")]
    pub config: PathBuf,
}

/// Errors loading or resolving the configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("Failed to read {path}: {source}")]
    Read {
        /// Configuration file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The file is not valid TOML for [`ServerConfig`].
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    /// A money amount did not convert to token units.
    #[error("Invalid amount for `{field}`: {source}")]
    Amount {
        /// Offending setting.
        field: String,
        /// The conversion error.
        #[source]
        source: AmountError,
    },
    /// A genesis balance is keyed by something other than an address.
    #[error("Invalid address `{0}` in token.balances")]
    Address(String),
    /// The token is not a known deployment and has no explicit domain.
    #[error("Unknown token {token} on chain {chain_id}: set token.name and token.version")]
    UnknownToken {
        /// Configured chain.
        chain_id: ChainId,
        /// Configured token.
        token: Address,
    },
}

/// Top-level server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address (default: `0.0.0.0`).
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Server port (default: `4022`).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Price of a protected call paid inline with a payment header, as a
    /// decimal string in whole tokens.
    #[serde(default = "default_price")]
    pub price: String,

    /// Resources served under `/protected/{resource}`.
    #[serde(default = "default_resources")]
    pub resources: Vec<String>,

    /// Seconds between sweeps of expired subscriptions.
    #[serde(default = "default_purge_interval_secs")]
    pub purge_interval_secs: u64,

    /// The pull-payment ledger payments are redeemed through.
    pub ledger: LedgerSection,

    /// The ERC-3009 token payments are made in.
    #[serde(default)]
    pub token: TokenSection,

    /// Defaults for new subscriptions.
    #[serde(default)]
    pub subscription: SubscriptionPolicy,
}

/// `[ledger]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSection {
    /// Ledger address; the payee of every authorization.
    pub address: Address,
    /// Ledger owner, who receives withdrawals.
    pub owner: Address,
    /// Minimum redeemable payment in whole tokens.
    #[serde(default = "default_minimum_payment")]
    pub minimum_payment: String,
}

/// `[token]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenSection {
    /// Chain the token lives on (default: Base Sepolia).
    pub chain_id: ChainId,
    /// Token contract (default: USDC on Base Sepolia).
    pub address: Address,
    /// EIP-712 domain name; looked up for known tokens when absent.
    pub name: Option<String>,
    /// EIP-712 domain version; looked up for known tokens when absent.
    pub version: Option<String>,
    /// Token decimals; looked up for known tokens when absent.
    pub decimals: Option<u8>,
    /// Genesis balances of the in-process token, in whole tokens.
    pub balances: BTreeMap<String, String>,
}

impl Default for TokenSection {
    fn default() -> Self {
        Self {
            chain_id: BASE_SEPOLIA,
            address: USDC_BASE_SEPOLIA,
            name: None,
            version: None,
            decimals: None,
            balances: BTreeMap::new(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

const fn default_port() -> u16 {
    4022
}

fn default_price() -> String {
    "0.01".to_owned()
}

fn default_resources() -> Vec<String> {
    vec!["query".to_owned()]
}

const fn default_purge_interval_secs() -> u64 {
    60
}

fn default_minimum_payment() -> String {
    "0".to_owned()
}

impl ServerConfig {
    /// Loads configuration from `path`.
    ///
    /// All `$VAR` / `${VAR}` references are expanded from the process
    /// environment before parsing. `HOST` and `PORT` env vars override the
    /// file values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        let mut config = Self::parse(&content)?;

        if let Some(host) = std::env::var("HOST").ok().and_then(|h| h.parse().ok()) {
            config.host = host;
        }
        if let Some(port) = std::env::var("PORT").ok().and_then(|p| p.parse().ok()) {
            config.port = port;
        }
        Ok(config)
    }

    /// Parses configuration text after environment expansion.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on invalid TOML.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(&expand_env_vars(content))?)
    }

    /// EIP-712 domain of the configured token.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownToken`] when the token is not a known
    /// deployment and the name or version is missing.
    pub fn token_domain(&self) -> Result<TokenDomain, ConfigError> {
        let token = &self.token;
        match (&token.name, &token.version) {
            (Some(name), Some(version)) => Ok(TokenDomain::new(
                name.clone(),
                version.clone(),
                token.chain_id,
                token.address,
            )),
            _ => TokenDomain::known(token.chain_id, token.address).ok_or(
                ConfigError::UnknownToken {
                    chain_id: token.chain_id,
                    token: token.address,
                },
            ),
        }
    }

    /// Decimals of the configured token.
    #[must_use]
    pub fn decimals(&self) -> u8 {
        self.token.decimals.unwrap_or_else(|| {
            find_network(self.token.chain_id)
                .and_then(|network| network.find_asset(self.token.address).map(|a| a.decimals))
                .unwrap_or(DEFAULT_TOKEN_DECIMALS)
        })
    }

    /// Ledger parameters with the minimum converted to token units.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Amount`] for a malformed minimum.
    pub fn ledger_config(&self) -> Result<LedgerConfig, ConfigError> {
        Ok(LedgerConfig {
            address: self.ledger.address,
            owner: self.ledger.owner,
            minimum_payment: self.amount("ledger.minimum_payment", &self.ledger.minimum_payment)?,
        })
    }

    /// Inline protected-call price in token units.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Amount`] for a malformed price.
    pub fn price_units(&self) -> Result<U256, ConfigError> {
        self.amount("price", &self.price)
    }

    /// Genesis balances in token units.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Address`] or [`ConfigError::Amount`].
    pub fn genesis_balances(&self) -> Result<Vec<(Address, U256)>, ConfigError> {
        self.token
            .balances
            .iter()
            .map(|(account, amount)| {
                let address = account
                    .parse()
                    .map_err(|_| ConfigError::Address(account.clone()))?;
                let units = self.amount(&format!("token.balances.{account}"), amount)?;
                Ok((address, units))
            })
            .collect()
    }

    /// Interval of the expired-subscription sweep.
    #[must_use]
    pub const fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_secs)
    }

    fn amount(&self, field: &str, value: &str) -> Result<U256, ConfigError> {
        parse_units(value, self.decimals()).map_err(|source| ConfigError::Amount {
            field: field.to_owned(),
            source,
        })
    }
}

/// Expands `$VAR` and `${VAR}` from the environment. Unset variables and a
/// lone `$` are kept verbatim.
fn expand_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find('$') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let (name, consumed) = if let Some(inner) = after.strip_prefix('{') {
            match inner.find('}') {
                Some(end) => (&inner[..end], end + 2),
                None => ("", 0),
            }
        } else {
            let end = after
                .find(|c: char| !c.is_ascii_alphanumeric() && c != '_')
                .unwrap_or(after.len());
            (&after[..end], end)
        };

        let value = (!name.is_empty())
            .then(|| std::env::var(name).ok())
            .flatten();
        match value {
            Some(value) => out.push_str(&value),
            None => out.push_str(&rest[start..=start + consumed]),
        }
        rest = &rest[start + 1 + consumed..];
    }
    out.push_str(rest);
    out
}
