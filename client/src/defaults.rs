//! Contains the default values for the configuration and various constants.

use shared::constants::DEFAULT_PORT;

/// The address of the file server, overridden by the `SERVER_ADDR` environment variable.
pub fn server_addr() -> String {
    format!("127.0.0.1:{DEFAULT_PORT}")
}

/// The name of the folder that contains the application data.
pub const APP_FOLDER_NAME: &str = "ftplite";

/// The name of the configuration database.
pub const CONFIG_DB_FILE: &str = "client.db";

/// Extension of files that are still being downloaded.
pub const PARTIAL_DOWNLOAD_EXTENSION: &str = "part";

/// Length of a freshly generated resume token, in bytes before hex encoding.
pub const RESUME_TOKEN_BYTES: usize = 16;
