//! System-wide constants and default paths.

use std::path::PathBuf;
use std::sync::OnceLock;

/// Base directory for envbox data when no home directory is usable.
pub const SYSTEM_DATA_DIR: &str = "/var/lib/envbox";

/// Returns the data directory, preferring `$HOME/.envbox` and falling back
/// to `/var/lib/envbox` when no writable home exists.
fn resolve_data_dir() -> PathBuf {
    if let Ok(home) = std::env::var("HOME") {
        let user_dir = PathBuf::from(home).join(".envbox");
        if std::fs::create_dir_all(&user_dir).is_ok() {
            return user_dir;
        }
    }
    PathBuf::from(SYSTEM_DATA_DIR)
}

static DATA_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Returns the resolved data directory for this session.
pub fn data_dir() -> &'static PathBuf {
    DATA_DIR.get_or_init(resolve_data_dir)
}

/// Directory (relative to the data dir) holding one sub-directory per namespace.
pub const ENVIRONMENTS_DIR: &str = "environments";

/// File name of the combined stdout/stderr log inside a namespace directory.
pub const OUTPUT_LOG: &str = "output.log";

/// File name of the SQLite database inside the data dir.
pub const DATABASE_FILE: &str = "envbox.db";

/// Prefix of every isolation unit created by envbox.
pub const UNIT_PREFIX: &str = "envbox";

/// Maximum namespace length in characters.
pub const MAX_NAMESPACE_LEN: usize = 64;

/// Default CPU request (logical cores) when a create request omits it.
pub const DEFAULT_CPU: f64 = 1.0;

/// Default memory request in MB when a create request omits it.
pub const DEFAULT_MEMORY_MB: u64 = 128;

/// Default advisory I/O weight when a create request omits it.
pub const DEFAULT_IO_WEIGHT: u32 = 1;

/// Default HTTP bind address.
pub const DEFAULT_BIND: &str = "0.0.0.0:5000";

/// Binary name for the CLI.
pub const BIN_NAME: &str = "envctl";
