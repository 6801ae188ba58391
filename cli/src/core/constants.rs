// =============================================================================
// Application Identity
// =============================================================================

/// Application name in lowercase (for paths, log targets and identifiers)
pub const APP_NAME_LOWER: &str = "tabpreview";

/// Unix-style dotfile folder name
pub const APP_DOT_FOLDER: &str = ".tabpreview";

// =============================================================================
// Configuration Files
// =============================================================================

/// Config file name
pub const CONFIG_FILE_NAME: &str = "tabpreview.json";

/// Environment variable for config file path
pub const ENV_CONFIG: &str = "TABPREVIEW_CONFIG";

// =============================================================================
// Environment Variables
// =============================================================================

/// Environment variable for debug mode
pub const ENV_DEBUG: &str = "TABPREVIEW_DEBUG";

/// Environment variable for log level/filter
pub const ENV_LOG: &str = "TABPREVIEW_LOG";

/// Environment variable for the backend base URL
pub const ENV_API_URL: &str = "TABPREVIEW_API_URL";

/// Environment variable for the bearer token
pub const ENV_TOKEN: &str = "TABPREVIEW_TOKEN";

/// Environment variable for the user id sent as `userId`
pub const ENV_USER_ID: &str = "TABPREVIEW_USER_ID";

// =============================================================================
// Backend Defaults
// =============================================================================

/// Default backend base URL
pub const DEFAULT_API_URL: &str = "http://localhost:8080/api";

/// Default timeout for non-upload requests
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// Output
// =============================================================================

/// Rows printed by default in table output
pub const DEFAULT_PREVIEW_LIMIT: usize = 20;

/// Widest cell printed in table output, in characters
pub const MAX_CELL_WIDTH: usize = 40;

/// Exit status of a run cancelled by Ctrl+C or SIGTERM
pub const EXIT_CANCELLED: i32 = 130;
