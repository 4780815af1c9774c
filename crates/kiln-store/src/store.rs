//! Content-addressed file store (CAS) with garbage-collection roots.
//!
//! Layout:
//! ```text
//! dstore/
//! ├── <64-hex>            # content-addressed blob, read-only
//! └── gcroots/
//!     └── <64-hex>/
//!         └── <R>         # symlink back to the referrer, R = fingerprint(referrer)
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::os::unix::fs::{symlink, PermissionsExt};
use std::path::{Path, PathBuf};

use kiln_core::{EngineError, Result};

use crate::hash;

/// A handle onto a content-addressed store rooted at `dstore`.
pub struct Store {
    root: PathBuf,
}

impl Store {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, hash: &str) -> PathBuf {
        self.root.join(hash)
    }

    fn gcroots_dir(&self, hash: &str) -> PathBuf {
        self.root.join("gcroots").join(hash)
    }

    /// Ingest a file by path. Idempotent: if the blob already exists, no
    /// copy occurs. Returns the content address.
    pub fn copy_to_store(&self, path: &Path) -> Result<String> {
        let content_hash = hash::hash_file(path)?;
        let dest = self.blob_path(&content_hash);
        if !dest.exists() {
            fs::create_dir_all(&self.root)?;
            fs::copy(path, &dest)?;
            let mut perms = fs::metadata(&dest)?.permissions();
            perms.set_mode(perms.mode() & !0o222);
            fs::set_permissions(&dest, perms)?;
        }
        Ok(content_hash)
    }

    /// Ingest in-memory bytes, same contract as [`Store::copy_to_store`].
    pub fn import_data(&self, data: &[u8]) -> Result<String> {
        let content_hash = hash::hash_bytes(data);
        let dest = self.blob_path(&content_hash);
        if !dest.exists() {
            fs::create_dir_all(&self.root)?;
            fs::write(&dest, data)?;
            let mut perms = fs::metadata(&dest)?.permissions();
            perms.set_mode(perms.mode() & !0o222);
            fs::set_permissions(&dest, perms)?;
        }
        Ok(content_hash)
    }

    /// Ingest a batch of paths, each prefixed with `prefix` (typically a
    /// job's workdir with a trailing separator, or empty) and then passed
    /// through environment-variable expansion. Paths that already resolve
    /// inside the store are recognized by basename rather than copied again.
    pub fn import_paths(
        &self,
        names: &[(String, Option<String>)],
        prefix: &str,
    ) -> Result<BTreeMap<String, String>> {
        fs::create_dir_all(&self.root)?;
        let canonical_root = self.root.canonicalize().unwrap_or_else(|_| self.root.clone());

        let mut out = BTreeMap::new();
        for (name, pinned) in names {
            let combined = format!("{prefix}{name}");
            let expanded = kiln_core::envsubst::expand(&combined);
            let full = PathBuf::from(expanded);

            let content_hash = match full.canonicalize() {
                Ok(canonical) if canonical.starts_with(&canonical_root) => canonical
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(|s| s.to_string())
                    .ok_or_else(|| EngineError::NotFound(full.display().to_string()))?,
                _ => {
                    if let Some(pinned) = pinned {
                        if self.blob_path(pinned).exists() {
                            pinned.clone()
                        } else {
                            self.copy_to_store(&full)?
                        }
                    } else {
                        self.copy_to_store(&full)?
                    }
                }
            };
            out.insert(name.clone(), content_hash);
        }
        Ok(out)
    }

    /// Create (or replace) a symlink at `path` pointing at `dstore/<hash>`.
    /// When `gcroot` is set, also register a back-reference under
    /// `gcroots/<hash>/`.
    pub fn link_to_store(
        &self,
        path: &Path,
        content_hash: &str,
        relative: bool,
        gcroot: bool,
    ) -> Result<()> {
        let target = self.blob_path(content_hash);
        if !target.exists() {
            return Err(EngineError::NotFound(format!(
                "{content_hash} not in store {}",
                self.root.display()
            )));
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let link_target = if relative {
            pathdiff::diff_paths(&target, path.parent().unwrap_or(Path::new(".")))
                .unwrap_or_else(|| target.clone())
        } else {
            target
                .canonicalize()
                .unwrap_or_else(|_| target.clone())
        };

        if path.symlink_metadata().is_ok() {
            fs::remove_file(path)?;
        }
        symlink(&link_target, path)?;

        if gcroot {
            self.register_gc_root(content_hash, path, relative)?;
        }
        Ok(())
    }

    fn register_gc_root(&self, content_hash: &str, referrer: &Path, relative: bool) -> Result<()> {
        let root_dir = self.gcroots_dir(content_hash);
        fs::create_dir_all(&root_dir)?;

        let fingerprint = hash::referrer_fingerprint(referrer);
        let root_link = root_dir.join(&fingerprint);

        let link_target = if relative {
            pathdiff::diff_paths(referrer, &root_dir).unwrap_or_else(|| referrer.to_path_buf())
        } else {
            referrer
                .canonicalize()
                .unwrap_or_else(|_| referrer.to_path_buf())
        };

        if root_link.symlink_metadata().is_ok() {
            fs::remove_file(&root_link)?;
        }
        symlink(&link_target, &root_link)?;
        Ok(())
    }

    /// Verify every regular file directly under `dstore` re-hashes to its
    /// own filename. Returns `true` iff the store is internally consistent.
    pub fn verify_store(&self) -> Result<bool> {
        if !self.root.exists() {
            return Ok(true);
        }

        let mut ok = true;
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let path = entry.path();
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if !hash::is_valid_address(&name) {
                log::warn!("store entry has malformed name: {name}");
                ok = false;
                continue;
            }
            let actual = hash::hash_file(&path)?;
            if actual != name {
                log::warn!("store entry {name} content hash mismatch: got {actual}");
                ok = false;
            }
        }
        Ok(ok)
    }

    /// Resolve `path` to its content address, requiring that it lies
    /// strictly inside `dstore`.
    pub fn hash_from_store_path(&self, path: &Path) -> Result<String> {
        let canonical_root = self
            .root
            .canonicalize()
            .map_err(|_| EngineError::NotFound(self.root.display().to_string()))?;
        let canonical_path = path
            .canonicalize()
            .map_err(|_| EngineError::NotFound(path.display().to_string()))?;

        if !canonical_path.starts_with(&canonical_root) {
            return Err(EngineError::NotInStore {
                path: path.to_path_buf(),
                store: self.root.clone(),
            });
        }

        canonical_path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|s| s.to_string())
            .ok_or_else(|| EngineError::NotFound(path.display().to_string()))
    }

    /// Two-phase garbage collection. Returns the number of blobs removed.
    pub fn clean_garbage(&self) -> Result<usize> {
        let mut removed = 0;
        let gcroots = self.root.join("gcroots");

        // Phase A: reap dead roots, then delete blobs left with no roots.
        if gcroots.exists() {
            for entry in fs::read_dir(&gcroots)? {
                let entry = entry?;
                if !entry.file_type()?.is_dir() {
                    continue;
                }
                let hash_name = entry.file_name().to_string_lossy().into_owned();
                let root_dir = entry.path();

                let mut alive = 0usize;
                for root_entry in fs::read_dir(&root_dir)? {
                    let root_entry = root_entry?;
                    let link = root_entry.path();
                    match fs::canonicalize(&link) {
                        Ok(resolved)
                            if resolved.file_name().and_then(|n| n.to_str())
                                == Some(hash_name.as_str()) =>
                        {
                            alive += 1;
                        }
                        _ => {
                            fs::remove_file(&link)?;
                        }
                    }
                }

                if alive == 0 {
                    fs::remove_dir(&root_dir)?;
                    let blob = self.blob_path(&hash_name);
                    if blob.exists() {
                        let mut perms = fs::metadata(&blob)?.permissions();
                        perms.set_mode(perms.mode() | 0o200);
                        fs::set_permissions(&blob, perms)?;
                        fs::remove_file(&blob)?;
                        removed += 1;
                    }
                }
            }
        }

        // Phase B: orphan sweep — any blob with no gcroots/<hash> directory at all.
        if self.root.exists() {
            for entry in fs::read_dir(&self.root)? {
                let entry = entry?;
                if !entry.file_type()?.is_file() {
                    continue;
                }
                let name = entry.file_name().to_string_lossy().into_owned();
                if !hash::is_valid_address(&name) {
                    continue;
                }
                if !self.gcroots_dir(&name).exists() {
                    let path = entry.path();
                    let mut perms = fs::metadata(&path)?.permissions();
                    perms.set_mode(perms.mode() | 0o200);
                    fs::set_permissions(&path, perms)?;
                    fs::remove_file(&path)?;
                    removed += 1;
                }
            }
        }

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_to_store_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("dstore"));
        let src = dir.path().join("src.txt");
        fs::write(&src, b"hello").unwrap();

        let h1 = store.copy_to_store(&src).unwrap();
        let h2 = store.copy_to_store(&src).unwrap();
        assert_eq!(h1, h2);
        assert_eq!(h1, hash::hash_bytes(b"hello"));
    }

    #[test]
    fn ingested_blob_is_read_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("dstore"));
        let src = dir.path().join("src.txt");
        fs::write(&src, b"hello").unwrap();
        let h = store.copy_to_store(&src).unwrap();

        let perms = fs::metadata(store.root().join(&h)).unwrap().permissions();
        assert_eq!(perms.mode() & 0o200, 0);
    }

    #[test]
    fn import_data_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("dstore"));
        let h = store.import_data(b"bytes").unwrap();
        assert_eq!(fs::read(store.root().join(&h)).unwrap(), b"bytes");
    }

    #[test]
    fn import_paths_prefixes_before_expanding_env() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("dstore"));
        let workdir = dir.path().join("job");
        fs::create_dir_all(&workdir).unwrap();
        fs::write(workdir.join("out.txt"), b"payload").unwrap();

        std::env::set_var("KILN_STORE_TEST_SUFFIX", "out.txt");
        let prefix = format!("{}/", workdir.display());
        let names = vec![("$KILN_STORE_TEST_SUFFIX".to_string(), None)];
        let hashes = store.import_paths(&names, &prefix).unwrap();
        std::env::remove_var("KILN_STORE_TEST_SUFFIX");

        assert_eq!(
            hashes.get("$KILN_STORE_TEST_SUFFIX").unwrap(),
            &hash::hash_bytes(b"payload")
        );
    }

    #[test]
    fn import_paths_recognizes_path_already_in_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("dstore"));
        let h = store.import_data(b"already-there").unwrap();
        let in_store_path = store.root().join(&h);

        let names = vec![(in_store_path.display().to_string(), None)];
        let hashes = store.import_paths(&names, "").unwrap();
        assert_eq!(hashes.get(&in_store_path.display().to_string()).unwrap(), &h);
    }

    #[test]
    fn import_paths_accepts_valid_pinned_hash_without_copy() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("dstore"));
        let h = store.import_data(b"pinned").unwrap();

        let names = vec![("/does/not/exist.txt".to_string(), Some(h.clone()))];
        let hashes = store.import_paths(&names, "").unwrap();
        assert_eq!(hashes.get("/does/not/exist.txt").unwrap(), &h);
    }

    #[test]
    fn link_to_store_relative_resolves_to_blob() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("dstore"));
        let h = store.import_data(b"data").unwrap();

        let link = dir.path().join("out").join("y.txt");
        store.link_to_store(&link, &h, true, false).unwrap();

        assert_eq!(fs::read(&link).unwrap(), b"data");
        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
    }

    #[test]
    fn link_to_store_gcroot_registers_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("dstore"));
        let h = store.import_data(b"data").unwrap();

        let link = dir.path().join("outputs").join("y.txt");
        store.link_to_store(&link, &h, true, true).unwrap();

        let root_dir = store.root().join("gcroots").join(&h);
        assert!(root_dir.exists());
        assert_eq!(fs::read_dir(&root_dir).unwrap().count(), 1);
    }

    #[test]
    fn verify_store_detects_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("dstore"));
        let h = store.import_data(b"original").unwrap();
        assert!(store.verify_store().unwrap());

        let blob = store.root().join(&h);
        let mut perms = fs::metadata(&blob).unwrap().permissions();
        perms.set_mode(0o644);
        fs::set_permissions(&blob, perms).unwrap();
        fs::write(&blob, b"corrupted").unwrap();

        assert!(!store.verify_store().unwrap());
    }

    #[test]
    fn hash_from_store_path_rejects_outside() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("dstore"));
        fs::create_dir_all(store.root()).unwrap();
        let outside = dir.path().join("elsewhere.txt");
        fs::write(&outside, b"x").unwrap();

        assert!(matches!(
            store.hash_from_store_path(&outside),
            Err(EngineError::NotInStore { .. })
        ));
    }

    #[test]
    fn hash_from_store_path_accepts_inside() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("dstore"));
        let h = store.import_data(b"inside").unwrap();

        let resolved = store.hash_from_store_path(&store.root().join(&h)).unwrap();
        assert_eq!(resolved, h);
    }

    #[test]
    fn gc_preserves_rooted_blob() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("dstore"));
        let h = store.import_data(b"kept").unwrap();
        let link = dir.path().join("outputs").join("kept.txt");
        store.link_to_store(&link, &h, true, true).unwrap();

        let removed = store.clean_garbage().unwrap();
        assert_eq!(removed, 0);
        assert!(store.root().join(&h).exists());
    }

    #[test]
    fn gc_removes_unrooted_blob() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("dstore"));
        let h = store.import_data(b"orphan").unwrap();

        let removed = store.clean_garbage().unwrap();
        assert_eq!(removed, 1);
        assert!(!store.root().join(&h).exists());
    }

    #[test]
    fn gc_reaps_dangling_root_then_removes_blob() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("dstore"));
        let h = store.import_data(b"rooted-then-orphaned").unwrap();
        let link = dir.path().join("outputs").join("f.txt");
        store.link_to_store(&link, &h, true, true).unwrap();

        fs::remove_file(&link).unwrap();

        let removed = store.clean_garbage().unwrap();
        assert_eq!(removed, 1);
        assert!(!store.root().join(&h).exists());
    }
}
