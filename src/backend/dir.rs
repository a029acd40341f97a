//! Directory layer backend.
//!
//! Every layer is a directory `<home>/<id>/` holding:
//!
//! - `Files/`: the entries the layer adds or changes
//! - `tombstones`: one relative path per line that the layer deletes
//!
//! Read-only layers store only their diff. A writable layer made by
//! [`create_layer`](LayerBackend::create_layer) is a full copy of its parent
//! chain, built base to top with each layer's tombstones applied before its
//! files, and is what a bundle's `root.path` points at. It also records the
//! size it inherited in `baseline`.

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use super::quota::{apparent_size, BASELINE_FILE};
use super::{EntryKind, FileMeta, LayerBackend, LayerWriter};
use crate::error::{Error, Result};
use crate::lock::CreateLock;

/// Directory inside a layer holding its contents.
pub const FILES_DIR: &str = "Files";
/// File inside a layer listing the paths it deletes.
pub const TOMBSTONES_FILE: &str = "tombstones";

const DESTROY_ATTEMPTS: u32 = 3;

pub struct DirLayerBackend {
    home: PathBuf,
    lock_path: PathBuf,
}

impl DirLayerBackend {
    pub fn new(home: PathBuf, lock_path: PathBuf) -> Self {
        Self { home, lock_path }
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    fn layer_dir(&self, id: &str) -> Result<PathBuf> {
        let valid = !id.is_empty()
            && !id.starts_with('.')
            && !id.contains(['/', '\\'])
            && Path::new(id).components().count() == 1;
        if !valid {
            return Err(Error::Backend(format!("invalid layer id '{}'", id)));
        }
        Ok(self.home.join(id))
    }
}

impl LayerBackend for DirLayerBackend {
    fn layer_exists(&self, id: &str) -> Result<bool> {
        Ok(self.layer_dir(id)?.is_dir())
    }

    fn create_layer(&self, id: &str, parent_paths: &[PathBuf]) -> Result<()> {
        let dir = self.layer_dir(id)?;
        fs::create_dir_all(&self.home)?;
        let _lock = CreateLock::acquire(&self.lock_path)?;

        if dir.exists() {
            debug!(layer_id = id, "layer created concurrently, keeping it");
            return Ok(());
        }

        let staging = tempfile::Builder::new()
            .prefix(".create-")
            .tempdir_in(&self.home)?;
        let files = staging.path().join(FILES_DIR);
        fs::create_dir(&files)?;

        for parent in parent_paths.iter().rev() {
            apply_layer(parent, &files)?;
        }
        fs::write(
            staging.path().join(BASELINE_FILE),
            apparent_size(&files)?.to_string(),
        )?;

        // The staging dir is gone after the rename; its drop then finds
        // nothing to clean up.
        fs::rename(staging.path(), &dir)?;
        debug!(layer_id = id, parents = parent_paths.len(), "layer created");
        Ok(())
    }

    fn destroy_layer(&self, id: &str) -> Result<()> {
        let dir = self.layer_dir(id)?;
        let mut failures = Vec::new();
        for attempt in 1..=DESTROY_ATTEMPTS {
            match fs::remove_dir_all(&dir) {
                Ok(()) => return Ok(()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
                Err(e) => {
                    warn!(layer_id = id, attempt, error = %e, "destroy attempt failed");
                    failures.push(format!("attempt {}: {}", attempt, e));
                }
            }
        }
        Err(Error::Backend(format!(
            "destroy layer {}: {}",
            id,
            failures.join("; ")
        )))
    }

    fn mount_path(&self, id: &str) -> Result<PathBuf> {
        let dir = self.layer_dir(id)?;
        if dir.is_dir() {
            Ok(dir.join(FILES_DIR))
        } else {
            Ok(PathBuf::new())
        }
    }

    fn new_layer_writer(
        &self,
        id: &str,
        parent_paths: &[PathBuf],
    ) -> Result<Box<dyn LayerWriter>> {
        let dir = self.layer_dir(id)?;
        fs::create_dir_all(&self.home)?;
        {
            let _lock = CreateLock::acquire(&self.lock_path)?;
            fs::create_dir(&dir).map_err(|e| {
                Error::backend(format!("allocate layer {}", dir.display()), e)
            })?;
            fs::create_dir(dir.join(FILES_DIR))?;
        }
        Ok(Box::new(DirLayerWriter {
            root: dir.clone(),
            files: dir.join(FILES_DIR),
            parents: parent_paths.to_vec(),
            tombstones: Vec::new(),
            current: None,
        }))
    }
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

struct DirLayerWriter {
    root: PathBuf,
    files: PathBuf,
    /// Newest first.
    parents: Vec<PathBuf>,
    tombstones: Vec<String>,
    current: Option<File>,
}

impl DirLayerWriter {
    fn resolve(&self, name: &str) -> Result<PathBuf> {
        Ok(self.files.join(relative(name)?))
    }
}

impl Write for DirLayerWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.current.as_mut() {
            Some(f) => f.write(buf),
            None => Err(io::Error::other("no regular file entry is open")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.current.as_mut() {
            Some(f) => f.flush(),
            None => Ok(()),
        }
    }
}

impl LayerWriter for DirLayerWriter {
    fn add(&mut self, name: &str, meta: &FileMeta) -> Result<()> {
        self.current = None;
        let path = self.resolve(name)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        match &meta.kind {
            EntryKind::Dir => {
                fs::create_dir_all(&path)?;
                set_mode(&path, meta.mode | 0o700)?;
            }
            EntryKind::File => {
                remove_path(&path)?;
                let file = File::create(&path)?;
                set_mode(&path, meta.mode)?;
                self.current = Some(file);
            }
            EntryKind::Symlink { target } => {
                remove_path(&path)?;
                symlink(target, &path)?;
            }
            EntryKind::Special => {
                debug!(name, "skipping special file");
            }
        }
        Ok(())
    }

    fn add_link(&mut self, name: &str, target: &str) -> Result<()> {
        self.current = None;
        let path = self.resolve(name)?;
        let rel = relative(target)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        remove_path(&path)?;

        let own = self.files.join(&rel);
        if own.symlink_metadata().is_ok() {
            fs::hard_link(&own, &path)?;
            return Ok(());
        }

        // Parents are immutable and shared; copy rather than link into them.
        for parent in &self.parents {
            let candidate = parent.join(FILES_DIR).join(&rel);
            if candidate.is_file() {
                fs::copy(&candidate, &path)?;
                return Ok(());
            }
        }

        Err(Error::Backend(format!(
            "hard link target '{}' for '{}' not found in layer or parents",
            target, name
        )))
    }

    fn remove(&mut self, name: &str) -> Result<()> {
        self.current = None;
        let rel = relative(name)?;
        remove_path(&self.files.join(&rel))?;
        self.tombstones.push(rel.to_string_lossy().into_owned());
        Ok(())
    }

    fn close(mut self: Box<Self>) -> Result<()> {
        if let Some(mut f) = self.current.take() {
            f.flush()?;
        }
        if !self.tombstones.is_empty() {
            let mut out = File::create(self.root.join(TOMBSTONES_FILE))?;
            for t in &self.tombstones {
                writeln!(out, "{}", t)?;
            }
            out.sync_all()?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Validate a `/`-separated entry name and turn it into a relative path.
fn relative(name: &str) -> Result<PathBuf> {
    let path = Path::new(name);
    if name.is_empty() || !path.components().all(|c| matches!(c, Component::Normal(_))) {
        return Err(Error::Backend(format!("invalid entry name '{}'", name)));
    }
    Ok(path.to_path_buf())
}

/// Apply one read-only layer on top of `dest`: tombstones first, then files.
fn apply_layer(layer: &Path, dest: &Path) -> Result<()> {
    let tombstones = layer.join(TOMBSTONES_FILE);
    if tombstones.exists() {
        for line in BufReader::new(File::open(&tombstones)?).lines() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            remove_path(&dest.join(relative(&line)?))?;
        }
    }

    let src = layer.join(FILES_DIR);
    if !src.is_dir() {
        return Ok(());
    }
    for entry in WalkDir::new(&src).min_depth(1) {
        let entry = entry.map_err(|e| Error::backend(format!("walk {}", src.display()), e))?;
        let rel = entry
            .path()
            .strip_prefix(&src)
            .map_err(|e| Error::backend("walk", e))?;
        let target = dest.join(rel);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            if target.symlink_metadata().map(|m| !m.is_dir()).unwrap_or(false) {
                remove_path(&target)?;
            }
            fs::create_dir_all(&target)?;
        } else if file_type.is_symlink() {
            remove_path(&target)?;
            symlink(fs::read_link(entry.path())?, &target)?;
        } else {
            remove_path(&target)?;
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Remove a file, symlink, or directory tree; missing paths are fine.
fn remove_path(path: &Path) -> io::Result<()> {
    match path.symlink_metadata() {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn symlink(target: impl AsRef<Path>, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink(target: impl AsRef<Path>, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
