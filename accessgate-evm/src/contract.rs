//! Solidity interface definitions for the access ledgers and their token.
//!
//! - [`IAccessLedger`]: calls, custom errors, and events of all three
//!   ledger variants
//! - [`IFundsToken`]: the ERC-3009 + ERC-20 subset the ledgers settle through

use alloy_sol_types::sol;

sol! {
    /// Union ABI of the pull-payment, admin-mediated, and content-linked
    /// ledgers. A deployed ledger implements the subset its variant needs.
    #[allow(missing_docs)]
    #[allow(clippy::too_many_arguments)]
    #[derive(Debug, PartialEq, Eq)]
    interface IAccessLedger {
        error PaymentBelowMinimum(uint256 sent, uint256 required);
        error NotWhitelisted(address account);
        error AlreadyMinted(address account);
        error ReferenceAlreadyMinted(uint256 referenceId);
        error NothingToWithdraw();
        error WithdrawalFailed(bytes reason);
        error NotAdmin(address account);
        error NotOwner(address account);
        error InvalidRecipient();
        error InvalidReferenceId();
        error NonexistentCredential(uint256 tokenId);
        error SignatureInvalid();
        error AuthorizationUsed();
        error AuthorizationNotYetValid();
        error AuthorizationExpired();
        error CallerMustBePayee();
        error AuthorizationToZeroAddress();
        error InsufficientBalance(uint256 available, uint256 required);

        event PaymentReceived(address indexed payer, uint256 amount, bytes32 nonce);
        event NFTMinted(address indexed recipient, uint256 indexed tokenId);
        event CredentialLinked(uint256 indexed tokenId, uint256 indexed referenceId);
        event Withdrawal(address indexed owner, uint256 amount);
        event AdminChanged(address indexed previous, address indexed current);
        event OwnershipTransferred(address indexed previous, address indexed current);
        event BaseURIChanged(string uri);
        event MinimumPaymentChanged(uint256 previous, uint256 current);

        function redeemAuthorization(
            address from,
            uint256 value,
            uint256 validAfter,
            uint256 validBefore,
            bytes32 nonce,
            uint8 v,
            bytes32 r,
            bytes32 s
        ) external;
        function mintAccessCredential() external returns (uint256);
        function mint(address to) external returns (uint256);
        function mintBatch(address[] recipients) external returns (uint256);
        function mintWithReference(address to, uint256 referenceId) external returns (uint256);
        function setAdmin(address newAdmin) external;
        function transferOwnership(address newOwner) external;
        function setMinimumPayment(uint256 minimum) external;
        function setBaseURI(string uri) external;
        function withdraw() external returns (uint256);

        function tokenURI(uint256 tokenId) external view returns (string);
        function isEligible(address account) external view returns (bool);
        function canMint(address account) external view returns (bool);
        function getBalance() external view returns (uint256);
        function hasMinted(address account) external view returns (bool);
        function referenceToToken(uint256 referenceId) external view returns (uint256);
        function tokenToReference(uint256 tokenId) external view returns (uint256);
        function totalIssued() external view returns (uint256);
        function minimumPayment() external view returns (uint256);
        function admin() external view returns (address);
        function owner() external view returns (address);
    }
}

sol! {
    /// ERC-3009 + ERC-20 subset of a USDC-style token, `(v, r, s)` variants only.
    #[allow(missing_docs)]
    #[allow(clippy::too_many_arguments)]
    #[derive(Debug, PartialEq, Eq)]
    interface IFundsToken {
        error TransferAmountExceedsBalance(uint256 available, uint256 required);
        error TransferToZeroAddress();

        function balanceOf(address account) external view returns (uint256);
        function authorizationState(address authorizer, bytes32 nonce) external view returns (bool);
        function transfer(address to, uint256 value) external returns (bool);
        function transferWithAuthorization(
            address from,
            address to,
            uint256 value,
            uint256 validAfter,
            uint256 validBefore,
            bytes32 nonce,
            uint8 v,
            bytes32 r,
            bytes32 s
        ) external;
        function receiveWithAuthorization(
            address from,
            address to,
            uint256 value,
            uint256 validAfter,
            uint256 validBefore,
            bytes32 nonce,
            uint8 v,
            bytes32 r,
            bytes32 s
        ) external;
    }
}
