//! Constants shared across the deployment pipeline

use ethers::utils::keccak256;

/// The placeholder tag resolving to the active signer's public address
pub const DEPLOYER_WALLET_TAG: &str = "DEPLOYER_WALLET";

/// Alias of [`DEPLOYER_WALLET_TAG`] accepted inside initializer argument
/// lists
pub const DEV_WALLET_TAG: &str = "DEV_WALLET";

/// The placeholder tag resolving to the chain's null-address sentinel
pub const ZERO_ADDRESS_TAG: &str = "ZERO_ADDRESS";

/// The prefix of placeholder tags resolving to a sibling contract's
/// deployed address
pub const CONTRACT_TAG_PREFIX: &str = "CONTRACT_";

/// The prefix of placeholder tags resolving to ABI-encoded initializer
/// call-data for a proxy's implementation contract
pub const ENCODE_INITIALIZER_TAG_PREFIX: &str = "ENCODE_INITIALIZE_FUNCTION_";

/// The suffix shared by all role-constant placeholder tags
pub const ROLE_TAG_SUFFIX: &str = "_ROLE";

/// The role-constant tags recognized by the placeholder resolver.
///
/// Any other `*_ROLE`-shaped token is rejected at manifest load rather than
/// silently passed through as a literal string argument.
pub const RECOGNIZED_ROLES: [&str; 5] = [
    "DEFAULT_ADMIN_ROLE",
    "MINTER_ROLE",
    "BURNER_ROLE",
    "PAUSER_ROLE",
    "URI_SETTER_ROLE",
];

/// The admin role, which by convention is the zero hash rather than the
/// keccak-256 hash of its name
pub const DEFAULT_ADMIN_ROLE: &str = "DEFAULT_ADMIN_ROLE";

/// The artifact file name of the proxy deployed in front of upgradable
/// implementations when the manifest entry does not name one
pub const DEFAULT_PROXY_FILE_NAME: &str = "TransparentUpgradeableProxy";

/// The constructor argument name subject to tenant prefixing, used to
/// namespace per-tenant token names
pub const TENANT_NAME_ARG: &str = "name";

/// Computes the well-known 32-byte hash constant for a named role.
///
/// `DEFAULT_ADMIN_ROLE` is the zero hash; every other role is the keccak-256
/// hash of its name, matching the convention of role-based access control
/// contracts.
pub fn role_hash(role: &str) -> [u8; 32] {
    if role == DEFAULT_ADMIN_ROLE {
        [0u8; 32]
    } else {
        keccak256(role.as_bytes())
    }
}
