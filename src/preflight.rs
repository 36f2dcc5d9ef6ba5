//! Startup checks
//!
//! Everything here runs before the first job is dispatched. Any failure is a
//! [`StartupError`] and aborts the session without touching the ledger.

use crate::config::ToolsConfig;
use crate::db::Ledger;
use crate::error::StartupError;
use crate::Result;
use std::path::{Path, PathBuf};

/// Locations of the external binaries a run needs
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolPaths {
    /// spotdl executable
    pub spotdl: PathBuf,
    /// ffmpeg executable
    pub ffmpeg: PathBuf,
}

/// Resolve spotdl and ffmpeg
///
/// Explicitly configured paths must point at existing files. Otherwise the
/// binary is searched for on `PATH` (unless `search_path` is off). All missing
/// tools are reported together.
pub fn ensure_tools(tools: &ToolsConfig) -> Result<ToolPaths> {
    let spotdl = resolve_tool("spotdl", tools.spotdl_path.as_deref(), tools.search_path);
    let ffmpeg = resolve_tool("ffmpeg", tools.ffmpeg_path.as_deref(), tools.search_path);

    match (spotdl, ffmpeg) {
        (Some(spotdl), Some(ffmpeg)) => {
            tracing::debug!(spotdl = %spotdl.display(), ffmpeg = %ffmpeg.display(), "tools found");
            Ok(ToolPaths { spotdl, ffmpeg })
        }
        (spotdl, ffmpeg) => {
            let mut missing = Vec::new();
            if spotdl.is_none() {
                missing.push("spotdl".to_string());
            }
            if ffmpeg.is_none() {
                missing.push("ffmpeg".to_string());
            }
            Err(StartupError::MissingTools { missing }.into())
        }
    }
}

fn resolve_tool(name: &str, configured: Option<&Path>, search_path: bool) -> Option<PathBuf> {
    if let Some(path) = configured {
        if path.is_file() {
            return Some(path.to_path_buf());
        }
        tracing::warn!(tool = name, path = %path.display(), "configured tool path does not exist");
        return None;
    }

    if !search_path {
        return None;
    }

    which::which(name).ok()
}

/// Make sure `dest` exists and accepts new files
pub async fn ensure_writable(dest: &Path) -> Result<()> {
    let unwritable = |e: std::io::Error| StartupError::DestinationUnwritable {
        path: dest.to_path_buf(),
        reason: e.to_string(),
    };

    tokio::fs::create_dir_all(dest).await.map_err(unwritable)?;

    let probe = dest.join(format!(".sopti-write-test-{}", std::process::id()));
    tokio::fs::write(&probe, b"").await.map_err(unwritable)?;
    if let Err(e) = tokio::fs::remove_file(&probe).await {
        tracing::warn!(path = %probe.display(), error = %e, "failed to remove write probe");
    }

    Ok(())
}

/// Open the ledger, reporting failure as a startup error
pub async fn open_ledger(path: &Path) -> Result<Ledger> {
    Ledger::open(path).await.map_err(|e| {
        StartupError::LedgerUnavailable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }
        .into()
    })
}
