//! Filesystem helpers shared by the pipeline stages

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Characters that are unsafe in a path component on at least one supported platform
const UNSAFE_PATH_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Make a string safe to use as a single path component.
///
/// Path separators, reserved characters and control characters are dropped,
/// whitespace runs collapse to one space, and leading dots are stripped so the
/// result can never be `.`/`..` or a hidden file. Returns `None` when nothing
/// usable remains.
///
/// ```
/// use audiobook_dl::utils::sanitize_component;
///
/// assert_eq!(sanitize_component("Part 1: The Road").as_deref(), Some("Part 1 The Road"));
/// assert_eq!(sanitize_component("../.."), None);
/// ```
pub fn sanitize_component(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    let mut pending_space = false;

    for c in raw.chars() {
        if c.is_control() || UNSAFE_PATH_CHARS.contains(&c) {
            continue;
        }
        if c.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        out.push(c);
    }

    let trimmed = out.trim_start_matches('.').trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Truncate to at most `max_chars` characters without splitting a character
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => s[..idx].trim_end().to_string(),
        None => s.to_string(),
    }
}

/// Sibling path used while a file is being written (`name.ext.part`).
///
/// Writers produce the `.part` file and rename it into place only after the
/// write finished, so a file carrying its final name is always complete.
pub fn part_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    path.with_file_name(name)
}

/// Rename a finished `.part` file onto its final name
pub async fn promote_part(path: &Path) -> Result<()> {
    tokio::fs::rename(part_path(path), path)
        .await
        .map_err(|e| Error::storage(format!("failed to finalize {}", path.display()), e))
}

/// Remove a directory tree, logging instead of failing.
///
/// Used on cleanup paths where the job outcome is already decided.
pub async fn remove_dir_best_effort(path: &Path) {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => tracing::debug!(path = %path.display(), "removed directory"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove directory"),
    }
}

/// Check that `required` bytes plus a `reserve` fit on the filesystem holding `dir`.
///
/// A failed space query is logged and treated as "enough space" so that
/// unsupported filesystems do not block downloads.
pub fn ensure_free_space(dir: &Path, required: u64, reserve: u64) -> Result<()> {
    let needed = required.saturating_add(reserve);
    match get_available_space(existing_ancestor(dir)) {
        Ok(available) if available < needed => Err(Error::InsufficientSpace {
            required: needed,
            available,
        }),
        Ok(_) => Ok(()),
        Err(e) => {
            tracing::warn!(path = %dir.display(), error = %e, "disk space check failed, continuing");
            Ok(())
        }
    }
}

/// Nearest ancestor of `path` that exists (the path itself when it does)
fn existing_ancestor(path: &Path) -> &Path {
    path.ancestors()
        .find(|p| p.exists())
        .unwrap_or_else(|| Path::new("."))
}

/// Get available disk space for a given path
///
/// Uses statvfs on Unix and GetDiskFreeSpaceExW on Windows.
pub fn get_available_space(path: &Path) -> std::io::Result<u64> {
    #[cfg(unix)]
    {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

        // SAFETY: c_path is a valid NUL-terminated string, stat is zero-initialized
        // and only read after statvfs reports success.
        unsafe {
            let mut stat: libc::statvfs = std::mem::zeroed();
            if libc::statvfs(c_path.as_ptr(), &mut stat) != 0 {
                return Err(std::io::Error::last_os_error());
            }

            // f_bavail: blocks available to unprivileged users
            #[allow(clippy::unnecessary_cast)]
            let available = (stat.f_bavail as u64).saturating_mul(stat.f_frsize as u64);
            Ok(available)
        }
    }

    #[cfg(windows)]
    {
        use std::os::windows::ffi::OsStrExt;
        use winapi::um::fileapi::GetDiskFreeSpaceExW;

        let wide_path: Vec<u16> = path
            .as_os_str()
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();

        // SAFETY: wide_path is NUL-terminated and every out pointer refers to a live u64.
        unsafe {
            let mut free_bytes_available: u64 = 0;
            let mut total_bytes: u64 = 0;
            let mut total_free_bytes: u64 = 0;

            if GetDiskFreeSpaceExW(
                wide_path.as_ptr(),
                &mut free_bytes_available as *mut u64 as *mut _,
                &mut total_bytes as *mut u64 as *mut _,
                &mut total_free_bytes as *mut u64 as *mut _,
            ) == 0
            {
                return Err(std::io::Error::last_os_error());
            }

            Ok(free_bytes_available)
        }
    }

    #[cfg(not(any(unix, windows)))]
    {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "disk space checking is not supported on this platform",
        ))
    }
}
