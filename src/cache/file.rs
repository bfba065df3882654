use super::{Cache, CacheError, LockToken, check_key};
use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use walkdir::WalkDir;

const MEMBERS_DIR: &str = "members";
const LOCKS_DIR: &str = "locks";

/// Cache kept in a directory, shared by every process that points at it.
///
/// Layout:
///
/// ```text
/// <dir>/members/<unique key>        empty marker, one per cached key
/// <dir>/locks/<unique key>.lock     "<expiry unix millis> <owner token>"
/// ```
///
/// Lock files are created with `create_new`, which the filesystem
/// guarantees is atomic, so only one process wins. A lock whose expiry has
/// passed is removed and re-acquired. Release removes the file only while it
/// still names the releasing token.
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn member_path(&self, key: &str) -> Result<PathBuf, CacheError> {
        check_key(key)?;
        Ok(self.dir.join(MEMBERS_DIR).join(key))
    }

    fn lock_path(&self, key: &str) -> Result<PathBuf, CacheError> {
        check_key(key)?;
        Ok(self.dir.join(LOCKS_DIR).join(format!("{key}.lock")))
    }

    /// Whether the lock at `path` may be reclaimed. Locks without a readable
    /// expiry (the holder died between creating and writing the file) fall
    /// back to the file's modification time plus `ttl`.
    fn lock_expired(path: &Path, ttl: Duration) -> io::Result<bool> {
        let now = unix_millis(SystemTime::now());
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(true),
            Err(e) => return Err(e),
        };
        if let Some(expires) = content
            .split_whitespace()
            .next()
            .and_then(|field| field.parse::<u128>().ok())
        {
            return Ok(expires <= now);
        }
        let modified = fs::metadata(path)?.modified()?;
        Ok(unix_millis(modified) + ttl.as_millis() <= now)
    }
}

/// Owner token recorded in a lock file body.
fn lock_owner(content: &str) -> Option<&str> {
    content.split_whitespace().nth(1)
}

fn unix_millis(t: SystemTime) -> u128 {
    t.duration_since(UNIX_EPOCH).unwrap_or_default().as_millis()
}

fn ensure_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) => fs::create_dir_all(parent),
        None => Ok(()),
    }
}

impl Cache for FileCache {
    fn exists(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.member_path(key)?.is_file())
    }

    fn add(&self, key: &str) -> Result<bool, CacheError> {
        let path = self.member_path(key)?;
        ensure_parent(&path)?;
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn remove(&self, key: &str) -> Result<bool, CacheError> {
        match fs::remove_file(self.member_path(key)?) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn clear(&self) -> Result<bool, CacheError> {
        let members = self.dir.join(MEMBERS_DIR);
        let had_any = !self.all()?.is_empty();
        match fs::remove_dir_all(&members) {
            Ok(()) => Ok(had_any),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn all(&self) -> Result<Vec<String>, CacheError> {
        let members = self.dir.join(MEMBERS_DIR);
        if !members.is_dir() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        for entry in WalkDir::new(&members) {
            let entry = entry.map_err(io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&members) else {
                continue;
            };
            let parts: Vec<&str> = relative
                .components()
                .filter_map(|c| match c {
                    Component::Normal(s) => s.to_str(),
                    _ => None,
                })
                .collect();
            keys.push(parts.join("/"));
        }
        keys.sort();
        Ok(keys)
    }

    fn acquire_generation_lock(
        &self,
        key: &str,
        ttl: Duration,
    ) -> Result<Option<LockToken>, CacheError> {
        let path = self.lock_path(key)?;
        ensure_parent(&path)?;
        let expires = unix_millis(SystemTime::now() + ttl);
        let token = LockToken::new();

        // Second attempt only happens after reclaiming an expired lock.
        for _ in 0..2 {
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
            {
                Ok(mut file) => {
                    file.write_all(format!("{expires} {token}").as_bytes())?;
                    return Ok(Some(token));
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    if !Self::lock_expired(&path, ttl)? {
                        return Ok(None);
                    }
                    tracing::info!(key, "reclaiming expired generation lock");
                    match fs::remove_file(&path) {
                        Ok(()) => {}
                        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                        Err(e) => return Err(e.into()),
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(None)
    }

    fn release_generation_lock(&self, key: &str, token: &LockToken) -> Result<bool, CacheError> {
        let path = self.lock_path(key)?;
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        if lock_owner(&content) != Some(token.as_str()) {
            return Ok(false);
        }
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
