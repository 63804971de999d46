//! EVM chain primitives.
//!
//! Chain ids, CAIP-2 network identifiers, token asset data, and the EIP-712
//! domain a token's authorizations are signed under.

use alloy_primitives::Address;
use alloy_sol_types::{Eip712Domain, eip712_domain};
use serde::{Deserialize, Serialize};

use crate::networks::known_networks;

/// An EIP-155 chain ID (e.g., 8453 for Base, 84532 for Base Sepolia).
pub type ChainId = u64;

/// Formats a chain ID as a CAIP-2 identifier.
///
/// Example: `caip2(8453)` returns `"eip155:8453"`.
#[must_use]
pub fn caip2(chain_id: ChainId) -> String {
    format!("eip155:{chain_id}")
}

/// Parses a CAIP-2 identifier into an EIP-155 chain ID.
///
/// Returns `None` if the input is not a valid `eip155:` prefixed string.
#[must_use]
pub fn parse_caip2(caip: &str) -> Option<ChainId> {
    caip.strip_prefix("eip155:").and_then(|s| s.parse().ok())
}

/// Asset information for a token on a specific network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetInfo {
    /// Contract address.
    pub address: Address,
    /// Number of decimals.
    pub decimals: u8,
    /// EIP-712 domain name for the token contract.
    pub name: String,
    /// EIP-712 domain version for the token contract.
    pub version: String,
}

/// Configuration for a known EVM network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    /// CAIP-2 network identifier (e.g., `"eip155:8453"`).
    pub network: String,
    /// EIP-155 chain ID.
    pub chain_id: ChainId,
    /// Tokens deployed on the network.
    pub assets: Vec<AssetInfo>,
}

impl NetworkConfig {
    /// Finds an asset by its contract address.
    #[must_use]
    pub fn find_asset(&self, address: Address) -> Option<&AssetInfo> {
        self.assets.iter().find(|a| a.address == address)
    }
}

/// Looks up a known network by chain ID.
#[must_use]
pub fn find_network(chain_id: ChainId) -> Option<NetworkConfig> {
    known_networks().into_iter().find(|n| n.chain_id == chain_id)
}

/// The EIP-712 domain of an ERC-3009 token: `{name, version, chainId, verifyingContract}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenDomain {
    /// Token name as used in the domain separator.
    pub name: String,
    /// Token version as used in the domain separator.
    pub version: String,
    /// Chain the token is deployed on.
    pub chain_id: ChainId,
    /// Token contract address.
    pub verifying_contract: Address,
}

impl TokenDomain {
    /// Domain for a token with explicit name and version.
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        chain_id: ChainId,
        verifying_contract: Address,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            chain_id,
            verifying_contract,
        }
    }

    /// Domain of a known token deployment.
    #[must_use]
    pub fn known(chain_id: ChainId, token: Address) -> Option<Self> {
        let network = find_network(chain_id)?;
        let asset = network.find_asset(token)?;
        Some(Self::new(
            asset.name.clone(),
            asset.version.clone(),
            chain_id,
            token,
        ))
    }

    /// CAIP-2 identifier of the domain's chain.
    #[must_use]
    pub fn network(&self) -> String {
        caip2(self.chain_id)
    }

    /// The domain in the form `alloy-sol-types` hashes against.
    #[must_use]
    pub fn eip712(&self) -> Eip712Domain {
        eip712_domain! {
            name: self.name.clone(),
            version: self.version.clone(),
            chain_id: self.chain_id,
            verifying_contract: self.verifying_contract,
        }
    }
}
