//! Constants used in the deployment pipeline

/// The number of confirmations to wait for the contract deployment
/// transaction
pub const NUM_DEPLOY_CONFIRMATIONS: usize = 0;

/// The storage slot containing the implementation contract address in the
/// upgradeable proxy.
///
/// This is specified in EIP1967: https://eips.ethereum.org/EIPS/eip-1967#logic-contract-address
pub const IMPLEMENTATION_STORAGE_SLOT: &str =
    "0x360894a13ba1a3210667c828492db98dca3e2076cc3735a920a3ca505d382bbc";

/// The storage slot containing the proxy admin contract address in the
/// upgradeable proxy.
///
/// This is specified in EIP1967: https://eips.ethereum.org/EIPS/eip-1967#admin-address
pub const PROXY_ADMIN_STORAGE_SLOT: &str =
    "0xb53127684a568b3173ae13b9f8a6016e243e63b6e8ee1178d6a717850b5d6103";

/// The number of bytes stored in a single storage slot
pub const NUM_BYTES_STORAGE_SLOT: usize = 32;

/// The number of bytes in an Ethereum address
pub const NUM_BYTES_ADDRESS: usize = 20;

/// The name of the initializer method called on upgradable implementations
/// in place of a constructor
pub const INITIALIZER_FUNCTION_NAME: &str = "initialize";

/// The name of the ownership getter on the proxy admin contract
pub const OWNER_FUNCTION_NAME: &str = "owner";

/// The registry entry point adding an extension to a proxy
pub const ADD_EXTENSION_FUNCTION: &str = "addExtension";

/// The registry entry point replacing an extension's facet
pub const REPLACE_EXTENSION_FUNCTION: &str = "replaceExtension";

/// The registry entry point removing an extension by name
pub const REMOVE_EXTENSION_FUNCTION: &str = "removeExtension";

/// The maximum number of attempts for a single RPC operation, counting the
/// initial try
pub const MAX_RPC_ATTEMPTS: usize = 4;

/// The delay before the first RPC retry; doubles per subsequent attempt
pub const INITIAL_RETRY_DELAY_MS: u64 = 500;

/// The number of attempts to acquire the per-contract deploy lock
pub const LOCK_ACQUIRE_ATTEMPTS: usize = 10;

/// The delay between deploy-lock acquisition attempts
pub const LOCK_RETRY_DELAY_MS: u64 = 500;

/// The subdirectory of the chain state directory holding checksum marker
/// files
pub const CHECKSUMS_DIR_SEGMENT: &str = "checksums";

/// The subdirectory of the chain state directory holding deployment records
pub const RECORDS_DIR_SEGMENT: &str = "records";

/// The subdirectory of the chain state directory holding deploy lock files
pub const LOCKS_DIR_SEGMENT: &str = "locks";

/// The suffix of the per-(type, tenant) pointer file holding the latest
/// deployment record
pub const LATEST_RECORD_SUFFIX: &str = "latest";

/// The extension of compiled artifact, record, and pointer files
pub const JSON_EXTENSION: &str = "json";

/// The extension of deploy lock files
pub const LOCK_EXTENSION: &str = "lock";

/// The subdirectory of the artifacts root holding upgradeable-variant
/// artifacts
pub const UPGRADEABLE_PATH_SEGMENT: &str = "upgradeable";

/// The file name of the JSON-lines inventory sink, under the state
/// directory
pub const INVENTORY_FILE_NAME: &str = "inventory.jsonl";

/// The name of the forge command used for source verification
pub const FORGE_COMMAND: &str = "forge";

/// The forge subcommand used for source verification
pub const VERIFY_CONTRACT_COMMAND: &str = "verify-contract";

/// The default state directory, relative to the working directory
pub const DEFAULT_STATE_DIR: &str = ".deployments";
