//! Packaging converted chapters into one archive

use crate::error::{Error, Result};
use crate::utils::part_path;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tokio::task::spawn_blocking;
use tracing::{debug, info};
use zip::CompressionMethod;
use zip::write::FileOptions;

/// A finished archive
#[derive(Debug, Clone)]
pub struct PackagedArchive {
    /// Final archive path
    pub path: PathBuf,
    /// Entry names in archive order
    pub entries: Vec<String>,
    /// Archive size in bytes
    pub size: u64,
}

/// Builds the per-book zip archive
#[derive(Debug, Clone, Copy, Default)]
pub struct Packager;

impl Packager {
    /// Chapter files of `output_dir` in name order (regular files only,
    /// unfinished `.part` files excluded)
    pub fn chapter_files(output_dir: &Path) -> Result<Vec<PathBuf>> {
        let entries = std::fs::read_dir(output_dir)
            .map_err(|e| Error::storage(format!("failed to read {}", output_dir.display()), e))?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry
                .map_err(|e| Error::storage(format!("failed to read {}", output_dir.display()), e))?;
            let path = entry.path();
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            let is_partial = path.extension().is_some_and(|ext| ext == "part");
            if is_file && !is_partial {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Zip every chapter file of `output_dir` into `archive_path`.
    ///
    /// The archive is written next to its destination as a `.part` file and
    /// moved into place once complete, so `archive_path` either does not exist
    /// or is a whole archive. An existing file at `archive_path` is never
    /// replaced: it belongs to a registered book. Any failure is a
    /// [`Error::Storage`] and leaves no file of this call behind.
    pub async fn package(&self, output_dir: &Path, archive_path: &Path) -> Result<PackagedArchive> {
        let files = Self::chapter_files(output_dir)?;
        if files.is_empty() {
            return Err(Error::Storage(format!(
                "nothing to package in {}",
                output_dir.display()
            )));
        }

        if let Some(parent) = archive_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::storage(format!("failed to create {}", parent.display()), e))?;
        }

        let partial = part_path(archive_path);
        let target = partial.clone();
        debug!(files = files.len(), archive = %archive_path.display(), "packaging chapters");

        let written = spawn_blocking(move || write_zip(&target, &files))
            .await
            .map_err(|e| Error::Storage(format!("packaging task panicked: {}", e)))
            .and_then(|r| r);

        let entries = match written {
            Ok(entries) => entries,
            Err(e) => {
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(e);
            }
        };

        // hard_link fails instead of replacing an existing target
        let finalized = tokio::fs::hard_link(&partial, archive_path).await;
        let _ = tokio::fs::remove_file(&partial).await;
        match finalized {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(Error::Storage(format!(
                    "archive {} already exists",
                    archive_path.display()
                )));
            }
            Err(e) => {
                return Err(Error::storage(
                    format!("failed to finalize {}", archive_path.display()),
                    e,
                ));
            }
        }

        let size = tokio::fs::metadata(archive_path)
            .await
            .map(|m| m.len())
            .unwrap_or(0);

        info!(
            archive = %archive_path.display(),
            entries = entries.len(),
            bytes = size,
            "archive written"
        );

        Ok(PackagedArchive {
            path: archive_path.to_path_buf(),
            entries,
            size,
        })
    }
}

fn write_zip(target: &Path, files: &[PathBuf]) -> Result<Vec<String>> {
    let storage = |what: &str, e: &dyn std::fmt::Display| {
        Error::Storage(format!("{} {}: {}", what, target.display(), e))
    };

    let file = File::create(target).map_err(|e| storage("failed to create", &e))?;
    let mut writer = zip::ZipWriter::new(BufWriter::new(file));
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(true);

    let mut entries = Vec::with_capacity(files.len());
    for path in files {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::Storage(format!("invalid file name: {}", path.display())))?;

        writer
            .start_file(name.as_str(), options)
            .map_err(|e| storage("failed to add entry to", &e))?;
        let mut source = File::open(path)
            .map_err(|e| Error::storage(format!("failed to open {}", path.display()), e))?;
        std::io::copy(&mut source, &mut writer).map_err(|e| storage("failed to write", &e))?;
        entries.push(name);
    }

    let mut inner = writer.finish().map_err(|e| storage("failed to finish", &e))?;
    inner.flush().map_err(|e| storage("failed to flush", &e))?;
    inner
        .get_ref()
        .sync_all()
        .map_err(|e| storage("failed to sync", &e))?;

    Ok(entries)
}
