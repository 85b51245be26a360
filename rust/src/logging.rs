use std::fs::OpenOptions;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use tracing_subscriber::EnvFilter;

const LOG_FILE: &str = "annotext.log";

static INIT: OnceLock<()> = OnceLock::new();

/// Install the global subscriber once per process. Logs go to
/// `<data_dir>/annotext.log`, or stderr when that file can't be opened.
/// `RUST_LOG` overrides the default `info` filter.
pub fn init_logging(data_dir: &Path) {
    INIT.get_or_init(|| {
        let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
        let _ = std::fs::create_dir_all(data_dir);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(data_dir.join(LOG_FILE));

        let installed = match file {
            Ok(file) => tracing_subscriber::fmt()
                .with_env_filter(filter())
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init(),
            Err(_) => tracing_subscriber::fmt()
                .with_env_filter(filter())
                .with_writer(std::io::stderr)
                .try_init(),
        };
        // Host apps and tests may have installed their own subscriber already.
        if installed.is_ok() {
            tracing::info!(data_dir = %data_dir.display(), "logging initialized");
        }
    });
}
