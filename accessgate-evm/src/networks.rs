//! Known EVM networks and their USDC deployments.

use alloy_primitives::{Address, address};

use crate::chain::{AssetInfo, ChainId, NetworkConfig, caip2};

/// Base Mainnet chain ID.
pub const BASE_MAINNET: ChainId = 8453;

/// Base Sepolia (testnet) chain ID.
pub const BASE_SEPOLIA: ChainId = 84532;

/// Ethereum Mainnet chain ID.
pub const ETHEREUM_MAINNET: ChainId = 1;

/// Polygon Mainnet chain ID.
pub const POLYGON_MAINNET: ChainId = 137;

/// Polygon Amoy (testnet) chain ID.
pub const POLYGON_AMOY: ChainId = 80002;

/// Avalanche C-Chain chain ID.
pub const AVALANCHE_MAINNET: ChainId = 43114;

/// Avalanche Fuji (testnet) chain ID.
pub const AVALANCHE_FUJI: ChainId = 43113;

/// USDC contract address on Base Mainnet.
pub const USDC_BASE: Address = address!("833589fCD6eDb6E08f4c7C32D4f71b54bdA02913");

/// USDC contract address on Base Sepolia.
pub const USDC_BASE_SEPOLIA: Address = address!("036CbD53842c5426634e7929541eC2318f3dCF7e");

/// USDC contract address on Ethereum Mainnet.
pub const USDC_ETHEREUM: Address = address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48");

/// USDC contract address on Polygon Mainnet.
pub const USDC_POLYGON: Address = address!("3c499c542cEF5E3811e1192ce70d8cC03d5c3359");

/// USDC contract address on Polygon Amoy.
pub const USDC_POLYGON_AMOY: Address = address!("41E94Eb71Ef8C9fAE0235d1e472b21E21B5a4dbF");

/// USDC contract address on Avalanche C-Chain.
pub const USDC_AVALANCHE: Address = address!("B97EF9Ef8734C71904D8002F8b6Bc66Dd9c48a6E");

/// USDC contract address on Avalanche Fuji.
pub const USDC_AVALANCHE_FUJI: Address = address!("5425890298aed601595a70AB815c96711a31Bc65");

/// Default EIP-712 domain name for USDC on mainnets.
pub const DEFAULT_USDC_NAME: &str = "USD Coin";

/// EIP-712 domain name used by Circle's testnet USDC deployments.
pub const TESTNET_USDC_NAME: &str = "USDC";

/// Default EIP-712 domain version for USDC.
pub const DEFAULT_USDC_VERSION: &str = "2";

/// Default token decimals for USDC.
pub const DEFAULT_TOKEN_DECIMALS: u8 = 6;

const USDC_DEPLOYMENTS: [(ChainId, Address, &str); 7] = [
    (BASE_MAINNET, USDC_BASE, DEFAULT_USDC_NAME),
    (BASE_SEPOLIA, USDC_BASE_SEPOLIA, TESTNET_USDC_NAME),
    (ETHEREUM_MAINNET, USDC_ETHEREUM, DEFAULT_USDC_NAME),
    (POLYGON_MAINNET, USDC_POLYGON, DEFAULT_USDC_NAME),
    (POLYGON_AMOY, USDC_POLYGON_AMOY, TESTNET_USDC_NAME),
    (AVALANCHE_MAINNET, USDC_AVALANCHE, DEFAULT_USDC_NAME),
    (AVALANCHE_FUJI, USDC_AVALANCHE_FUJI, TESTNET_USDC_NAME),
];

/// Returns network configurations for all known EVM networks.
#[must_use]
pub fn known_networks() -> Vec<NetworkConfig> {
    USDC_DEPLOYMENTS
        .iter()
        .map(|&(chain_id, usdc, name)| NetworkConfig {
            network: caip2(chain_id),
            chain_id,
            assets: vec![usdc_asset(usdc, name, DEFAULT_USDC_VERSION)],
        })
        .collect()
}

/// Returns all CAIP-2 network identifiers for known EVM networks.
#[must_use]
pub fn known_network_ids() -> Vec<String> {
    known_networks().into_iter().map(|n| n.network).collect()
}

/// USDC address on a known network.
#[must_use]
pub fn usdc_address(chain_id: ChainId) -> Option<Address> {
    USDC_DEPLOYMENTS
        .iter()
        .find(|(id, _, _)| *id == chain_id)
        .map(|(_, usdc, _)| *usdc)
}

fn usdc_asset(address: Address, name: &str, version: &str) -> AssetInfo {
    AssetInfo {
        address,
        decimals: DEFAULT_TOKEN_DECIMALS,
        name: name.to_owned(),
        version: version.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_ids_are_caip2() {
        let ids = known_network_ids();
        assert!(ids.contains(&"eip155:8453".to_owned()));
        assert!(ids.iter().all(|id| id.starts_with("eip155:")));
    }

    #[test]
    fn usdc_lookup() {
        assert_eq!(usdc_address(BASE_MAINNET), Some(USDC_BASE));
        assert_eq!(usdc_address(999_999), None);
    }
}
