use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use time::OffsetDateTime;

use crate::error::{IngestError, Result};
use crate::store::{Area, ObjectMeta, ObjectStore, StoreLayout};
use crate::util::sanitize::is_contained;

const TMP_PREFIX: &str = ".ingest-tmp";

/// Directory-backed object store; one root per area.
pub struct FsObjectStore {
    layout: StoreLayout,
}

impl FsObjectStore {
    pub fn new(layout: StoreLayout) -> Result<Self> {
        for area in [Area::Staging, Area::Archive, Area::Error] {
            fs::create_dir_all(layout.root(area))?;
        }
        Ok(Self { layout })
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    fn path_for(&self, area: Area, key: &str) -> Result<PathBuf> {
        if !is_contained(key) {
            return Err(IngestError::Store(format!("unsafe key in {area}: {key:?}")));
        }
        Ok(self.layout.root(area).join(key))
    }

    /// Remove now-empty directories between `path` and the area root.
    fn prune_empty_parents(&self, area: Area, path: &Path) {
        let root = self.layout.root(area);
        let mut cur = path.parent();
        while let Some(dir) = cur {
            if dir == root || !dir.starts_with(root) {
                break;
            }
            // fails when non-empty, which ends the walk
            if fs::remove_dir(dir).is_err() {
                break;
            }
            cur = dir.parent();
        }
    }
}

fn key_of(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();
    Some(parts.join("/"))
}

impl ObjectStore for FsObjectStore {
    fn list(&self, area: Area, prefix: &str) -> Result<Vec<ObjectMeta>> {
        let root = self.layout.root(area);
        // walk the deepest directory fully covered by the prefix
        let dir_part = match prefix.rfind('/') {
            Some(i) => &prefix[..i],
            None => "",
        };
        let start = if dir_part.is_empty() {
            root.to_path_buf()
        } else {
            self.path_for(area, dir_part)?
        };
        if !start.is_dir() {
            return Ok(Vec::new());
        }

        let mut out = Vec::new();
        for entry in walkdir::WalkDir::new(&start).sort_by_file_name() {
            let entry = entry.map_err(|e| IngestError::Store(format!("list {area}: {e}")))?;
            if !entry.file_type().is_file() {
                continue;
            }
            if entry.file_name().to_string_lossy().starts_with(TMP_PREFIX) {
                continue;
            }
            let Some(key) = key_of(root, entry.path()) else {
                continue;
            };
            if !key.starts_with(prefix) {
                continue;
            }
            let md = entry
                .metadata()
                .map_err(|e| IngestError::Store(format!("stat {key}: {e}")))?;
            out.push(ObjectMeta {
                key,
                size: md.len(),
                modified: md.modified().ok().map(OffsetDateTime::from),
            });
        }
        out.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(out)
    }

    fn open(&self, area: Area, key: &str) -> Result<Box<dyn Read + Send + '_>> {
        let f = File::open(self.path_for(area, key)?)?;
        Ok(Box::new(f))
    }

    fn put(&self, area: Area, key: &str, src: &mut dyn Read) -> Result<u64> {
        let dst = self.path_for(area, key)?;
        let parent = dst
            .parent()
            .ok_or_else(|| IngestError::Store(format!("no parent for {key}")))?;
        fs::create_dir_all(parent)?;

        // write beside the target, then rename over it
        let mut tmp = tempfile::Builder::new()
            .prefix(TMP_PREFIX)
            .tempfile_in(parent)?;
        let n = io::copy(src, tmp.as_file_mut())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&dst).map_err(|e| IngestError::Io(e.error))?;
        Ok(n)
    }

    fn head(&self, area: Area, key: &str) -> Result<Option<u64>> {
        match fs::metadata(self.path_for(area, key)?) {
            Ok(md) if md.is_file() => Ok(Some(md.len())),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, area: Area, key: &str) -> Result<()> {
        let path = self.path_for(area, key)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                self.prune_empty_parents(area, &path);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
