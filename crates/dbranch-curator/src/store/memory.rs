//! In-process store backend.
//!
//! Models the parts of the content store the curator relies on: a set of
//! resolvable immutable objects, pins, and a mutable path overlay. Used by the
//! curator and server test suites.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use dbranch_core::ContentId;
use parking_lot::Mutex;

use super::{EntryStat, StoreBackend};
use crate::{Error, Result};

#[derive(Default)]
struct Overlay {
    /// Mutable path -> content address.
    files: BTreeMap<String, ContentId>,
    dirs: BTreeSet<String>,
}

/// Store backend held entirely in memory.
pub struct MemoryBackend {
    objects: Mutex<HashMap<ContentId, Vec<u8>>>,
    pins: Mutex<HashSet<ContentId>>,
    overlay: Mutex<Overlay>,
    available: AtomicBool,
    mutations: AtomicUsize,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        let mut overlay = Overlay::default();
        overlay.dirs.insert("/".to_string());
        Self {
            objects: Mutex::new(HashMap::new()),
            pins: Mutex::new(HashSet::new()),
            overlay: Mutex::new(overlay),
            available: AtomicBool::new(true),
            mutations: AtomicUsize::new(0),
        }
    }

    /// Make bytes resolvable by content address, as if a peer provided them.
    pub fn put_object(&self, data: impl AsRef<[u8]>) -> ContentId {
        let data = data.as_ref();
        let cid = content_id_for(data);
        self.objects.lock().insert(cid.clone(), data.to_vec());
        cid
    }

    /// Simulate the store going down (`false`) or coming back (`true`).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn is_pinned(&self, cid: &ContentId) -> bool {
        self.pins.lock().contains(cid)
    }

    /// Number of overlay mutations performed so far.
    pub fn mutation_count(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::StoreUnavailable("memory backend offline".to_string()))
        }
    }

    fn mutated(&self) {
        self.mutations.fetch_add(1, Ordering::SeqCst);
    }

    fn object(&self, cid: &ContentId) -> Option<Vec<u8>> {
        self.objects.lock().get(cid).cloned()
    }
}

fn content_id_for(data: &[u8]) -> ContentId {
    let mut hasher = DefaultHasher::new();
    data.hash(&mut hasher);
    ContentId::new(format!("bafymem{:016x}", hasher.finish()))
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

fn parent(path: &str) -> &str {
    match path.rsplit_once('/') {
        Some(("", _)) => "/",
        Some((parent, _)) => parent,
        None => "/",
    }
}

fn ancestors(path: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = parent(path);
    loop {
        out.push(current.to_string());
        if current == "/" {
            break;
        }
        current = parent(current);
    }
    out
}

#[async_trait]
impl StoreBackend for MemoryBackend {
    async fn stat(&self, path: &str) -> Result<EntryStat> {
        self.check_available()?;
        let path = normalize(path);
        let cid = self
            .overlay
            .lock()
            .files
            .get(&path)
            .cloned()
            .ok_or_else(|| Error::NotFound(path.clone()))?;
        let size = self.object(&cid).map(|d| d.len() as u64).unwrap_or(0);
        Ok(EntryStat { hash: cid, size })
    }

    async fn copy(&self, source: &str, dest: &str) -> Result<()> {
        self.check_available()?;
        let cid = source
            .strip_prefix("/ipfs/")
            .map(ContentId::new)
            .ok_or_else(|| Error::Store(format!("unsupported copy source {}", source)))?;
        if self.object(&cid).is_none() {
            return Err(Error::ContentUnavailable(cid.to_string()));
        }
        let dest = normalize(dest);
        let mut overlay = self.overlay.lock();
        if overlay.files.contains_key(&dest) {
            return Err(Error::Store(format!("{} already exists", dest)));
        }
        for dir in ancestors(&dest) {
            overlay.dirs.insert(dir);
        }
        overlay.files.insert(dest, cid);
        drop(overlay);
        self.mutated();
        Ok(())
    }

    async fn pin(&self, cid: &ContentId) -> Result<()> {
        self.check_available()?;
        if self.object(cid).is_none() {
            return Err(Error::ContentUnavailable(cid.to_string()));
        }
        self.pins.lock().insert(cid.clone());
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<()> {
        self.check_available()?;
        let path = normalize(path);
        if self.overlay.lock().files.remove(&path).is_none() {
            return Err(Error::NotFound(path));
        }
        self.mutated();
        Ok(())
    }

    async fn list(&self, dir: &str) -> Result<Vec<String>> {
        self.check_available()?;
        let dir = normalize(dir);
        let overlay = self.overlay.lock();
        if !overlay.dirs.contains(&dir) {
            return Err(Error::NotFound(dir));
        }
        let mut names: BTreeSet<String> = overlay
            .files
            .keys()
            .chain(overlay.dirs.iter())
            .filter(|p| p.as_str() != dir && parent(p) == dir)
            .filter_map(|p| p.rsplit_once('/').map(|(_, name)| name.to_string()))
            .collect();
        names.remove("");
        Ok(names.into_iter().collect())
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        self.check_available()?;
        let path = normalize(path);
        let cid = self
            .overlay
            .lock()
            .files
            .get(&path)
            .cloned()
            .ok_or_else(|| Error::NotFound(path.clone()))?;
        self.object(&cid)
            .ok_or_else(|| Error::ContentUnavailable(cid.to_string()))
    }

    async fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        self.check_available()?;
        let cid = self.put_object(data);
        let path = normalize(path);
        let mut overlay = self.overlay.lock();
        for dir in ancestors(&path) {
            overlay.dirs.insert(dir);
        }
        overlay.files.insert(path, cid);
        drop(overlay);
        self.mutated();
        Ok(())
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        self.check_available()?;
        let path = normalize(path);
        let mut overlay = self.overlay.lock();
        for dir in ancestors(&path) {
            overlay.dirs.insert(dir);
        }
        overlay.dirs.insert(path);
        Ok(())
    }

    async fn is_up(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}
