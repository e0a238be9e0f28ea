use std::{
    fs::{self, File, OpenOptions},
    io::Write as _,
    path::Path,
};

use tokio::sync::Mutex;
use tracing::{info, warn};

/// Append-only line sink. Opened once at startup; a setup failure
/// downgrades to tracing output rather than disabling the owning plugin.
#[derive(Debug, Default)]
pub(crate) struct LineSink {
    file: Option<Mutex<File>>,
}

impl LineSink {
    pub(crate) fn open(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty())
            && let Err(e) = fs::create_dir_all(dir)
        {
            warn!(error = %e, path = %path.display(), "Failed to create log directory");
            return Self::default();
        }
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => {
                info!(path = %path.display(), "Logging to file");
                Self {
                    file: Some(Mutex::new(file)),
                }
            }
            Err(e) => {
                warn!(error = %e, path = %path.display(), "Failed to open log file");
                Self::default()
            }
        }
    }

    pub(crate) async fn write_line(&self, line: &str) {
        match &self.file {
            Some(file) => {
                let mut file = file.lock().await;
                if let Err(e) = writeln!(file, "{line}") {
                    warn!(error = %e, "Failed to append log line");
                }
            }
            None => info!("{line}"),
        }
    }
}
