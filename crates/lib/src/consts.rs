pub const APP_NAME: &str = "kiln";

/// Length of the truncated hex hash used for fingerprints.
pub const OBJ_HASH_PREFIX_LEN: usize = 20;

/// Length of the output key suffix appended to default artifact names.
pub const OUTPUT_KEY_LEN: usize = 8;

pub const FINGERPRINT_VERSION: u32 = 1;
pub const CACHE_FORMAT_VERSION: u32 = 1;

pub const CACHE_DIR: &str = "cache";
pub const LOCK_FILENAME: &str = ".lock";
pub const ARTIFACT_EXTENSION: &str = "kxb";

pub const DEFAULT_OUTPUT_DIR: &str = "bin";
pub const DEFAULT_INTERMEDIATE_DIR: &str = "obj";
pub const DEFAULT_CONFIGURATION: &str = "Debug";

pub const ENV_SOURCE_ROOT: &str = "KILN_SOURCE_ROOT";
pub const ENV_OUTPUT_DIR: &str = "KILN_OUTPUT_DIR";
pub const ENV_INTERMEDIATE_DIR: &str = "KILN_INTERMEDIATE_DIR";
pub const ENV_PLATFORM: &str = "KILN_PLATFORM";
pub const ENV_PROFILE: &str = "KILN_PROFILE";
pub const ENV_CONFIGURATION: &str = "KILN_CONFIGURATION";
