//! Locating model artifacts under the source root and copying them into
//! place.

use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context, Result};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use walkdir::WalkDir;

use modelreg_common::ModelFormat;

/// Maps a model's source location onto the local source root.
///
/// `s3://bucket/key` becomes `{root}/bucket/key`; plain paths are taken
/// relative to the root; without a location the model id (a hub repository
/// name such as `org/name`) is used.
pub fn resolve_source(root: &Path, location: Option<&str>, model_id: &str) -> Result<PathBuf> {
    let relative = match location.filter(|l| !l.is_empty()) {
        Some(loc) => match loc.split_once("://") {
            Some(("s3" | "gs" | "file", rest)) => rest,
            Some((scheme, _)) => bail!("unsupported source scheme {scheme:?}"),
            None => loc,
        },
        None => model_id,
    };
    join_within(root, relative)
}

/// Joins `relative` under `root`, refusing anything that would escape it.
pub fn join_within(root: &Path, relative: &str) -> Result<PathBuf> {
    let relative = Path::new(relative.trim_start_matches('/'));
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        bail!("path {relative:?} escapes its root");
    }
    Ok(root.join(relative))
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CopyStats {
    pub files: u64,
    pub bytes: u64,
}

const CHUNK: usize = 1 << 20;

/// Copies `src` into a hidden sibling of `target` and moves it into place
/// once complete, replacing whatever was there. The staging directory is
/// removed when the copy fails or `cancel` fires.
pub fn install_tree(src: &Path, target: &Path, cancel: &CancellationToken) -> Result<CopyStats> {
    let name = target
        .file_name()
        .with_context(|| format!("destination {} has no name", target.display()))?
        .to_string_lossy();
    let staging = target.with_file_name(format!(".{name}.partial-{}", Uuid::new_v4().simple()));

    let installed = copy_tree(src, &staging, cancel).and_then(|stats| {
        remove_if_present(target)?;
        std::fs::rename(&staging, target)
            .with_context(|| format!("move {} into place", target.display()))?;
        Ok(stats)
    });
    if installed.is_err() {
        if let Err(e) = remove_if_present(&staging) {
            tracing::warn!(path = %staging.display(), error = %e, "failed to remove partial copy");
        }
    }
    installed
}

fn remove_if_present(path: &Path) -> Result<()> {
    let removed = match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(path),
        Ok(_) => std::fs::remove_file(path),
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => Err(e),
    };
    removed.with_context(|| format!("remove {}", path.display()))
}

/// Copies a file or a directory tree to `dest`. A single file lands inside
/// `dest` under its own name. Stops with an error once `cancel` fires.
pub fn copy_tree(src: &Path, dest: &Path, cancel: &CancellationToken) -> Result<CopyStats> {
    let meta = std::fs::metadata(src)
        .with_context(|| format!("source {} is not readable", src.display()))?;
    std::fs::create_dir_all(dest).with_context(|| format!("create {}", dest.display()))?;

    let mut stats = CopyStats::default();
    if meta.is_file() {
        let name = src
            .file_name()
            .with_context(|| format!("source {} has no file name", src.display()))?;
        stats.bytes += copy_file(src, &dest.join(name), cancel)?;
        stats.files += 1;
        return Ok(stats);
    }

    for entry in WalkDir::new(src).min_depth(1) {
        if cancel.is_cancelled() {
            bail!("copy cancelled");
        }
        let entry = entry?;
        let rel = entry.path().strip_prefix(src)?;
        let target = dest.join(rel);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)
                .with_context(|| format!("create {}", target.display()))?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            stats.bytes += copy_file(entry.path(), &target, cancel)?;
            stats.files += 1;
        }
    }
    if stats.files == 0 {
        bail!("source {} contains no files", src.display());
    }
    Ok(stats)
}

fn copy_file(from: &Path, to: &Path, cancel: &CancellationToken) -> Result<u64> {
    let mut reader = File::open(from).with_context(|| format!("open {}", from.display()))?;
    let mut writer = File::create(to).with_context(|| format!("create {}", to.display()))?;
    let mut buf = vec![0u8; CHUNK];
    let mut copied = 0u64;
    loop {
        if cancel.is_cancelled() {
            bail!("copy cancelled");
        }
        let n = reader
            .read(&mut buf)
            .with_context(|| format!("read {}", from.display()))?;
        if n == 0 {
            break;
        }
        writer
            .write_all(&buf[..n])
            .with_context(|| format!("write {}", to.display()))?;
        copied += n as u64;
    }
    writer.flush()?;
    Ok(copied)
}

/// Formats found in a copied tree, and the first GGUF file relative to it.
pub fn detect_formats(dir: &Path) -> (Vec<ModelFormat>, Option<PathBuf>) {
    let gguf = WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .find(|e| e.path().extension().is_some_and(|ext| ext == "gguf"))
        .and_then(|e| e.path().strip_prefix(dir).ok().map(Path::to_path_buf));

    match gguf {
        Some(path) => (vec![ModelFormat::Gguf], Some(path)),
        None => (vec![ModelFormat::HuggingFace], None),
    }
}
