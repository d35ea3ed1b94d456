//! Atomic file writes (temp file + rename).
//!
//! A reader never observes a partially written tracker, pointer or marker:
//! the new contents land in a sibling temp file which then replaces the target.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::error::{FlowError, Result};

pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path.parent().ok_or_else(|| {
        FlowError::Internal(anyhow::anyhow!("path missing parent {}", path.display()))
    })?;
    fs::create_dir_all(parent).map_err(|err| FlowError::io(parent, err))?;
    let tmp_path = temp_path(path);
    debug!(path = %path.display(), "atomic write");
    fs::write(&tmp_path, contents).map_err(|err| FlowError::io(&tmp_path, err))?;
    fs::rename(&tmp_path, path).map_err(|err| FlowError::io(path, err))?;
    Ok(())
}

/// Serialize `value` to pretty-printed JSON with trailing newline.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)
        .map_err(|err| FlowError::Internal(anyhow::Error::new(err).context("serialize json")))?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("state"));
    name.push(".tmp");
    path.with_file_name(name)
}
