//! System-wide constants and default paths.

/// Default output directory for synthesized stacks, state, and assets.
pub const DEFAULT_OUT_DIR: &str = "cirrus.out";

/// Subdirectory of the output directory holding packaged artifacts.
pub const ASSETS_DIR: &str = "assets";

/// Suffix of a synthesized stack document (`{stack}.stack.json`).
pub const STACK_FILE_SUFFIX: &str = ".stack.json";

/// Suffix of a persisted stack state file (`{stack}.state.json`).
pub const STATE_FILE_SUFFIX: &str = ".state.json";

/// Region used when the configuration does not name one.
pub const DEFAULT_REGION: &str = "eu-west-1";

/// Port the managed database listens on unless configured otherwise.
pub const DEFAULT_DB_PORT: u16 = 5432;

/// SHA-256 digest length in hex characters.
pub const SHA256_HEX_LENGTH: usize = 64;

/// Number of hash characters embedded in generated archive file names.
pub const ARCHIVE_HASH_PREFIX_LENGTH: usize = 16;

/// Longest name accepted for globally unique resources (bucket naming rules).
pub const MAX_GLOBAL_NAME_LENGTH: usize = 63;

/// Version of the synthesis document format.
pub const DOCUMENT_FORMAT_VERSION: u32 = 1;

/// Application name used in CLI output and document metadata.
pub const APP_NAME: &str = "cirrus";

/// Binary name for the CLI.
pub const BIN_NAME: &str = "cirrus";
