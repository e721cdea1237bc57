//! Remote tree walker
//!
//! Shared engine behind the GitHub, Gist, Google Drive, Google Photos and
//! Dropbox strategies. A [`RemoteSource`] exposes a paginated listing of
//! containers and leaves; the [`Walker`] traverses it depth-first and brings
//! the local backup root in line with it:
//!
//! - items whose server path matches an exclusion pattern are skipped before
//!   anything else and never cached or deleted
//! - a leaf moved remotely (same modification time, new path) is renamed
//!   locally instead of downloaded again
//! - a leaf is transferred only when its fingerprint says the local copy is
//!   missing or outdated
//! - sources that mirror deletions get every cache entry not seen during a
//!   complete walk removed together with its local file
//!
//! Cache entries are keyed by remote item id and flushed after every page.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, error, info, warn};

use super::{BackupJob, Context, StrategyError};
use crate::config::{CacheEntry, JsonStore};
use crate::utils::fs::{create_folder, md5_file, remove_path, sanitize_name};
use crate::utils::Interrupt;

/// What a remote item is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    /// Folder or album; its children are listed with the item's locator
    Container,
    /// Regular file
    File,
    /// Document exported to a local format on download
    Document,
    /// Source repository, synced into a directory
    Repository,
}

/// How to tell whether the local copy is current
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fingerprint {
    /// Content checksum that can be verified against the local file
    Md5(String),
    /// Server-side version tag, only comparable with the cache
    Opaque(String),
    /// Modification time only
    Modified(DateTime<Utc>),
    /// Nothing; an existing local file is considered current
    None,
}

impl Fingerprint {
    /// Value stored as the cache entry's checksum
    fn cache_value(&self) -> Option<String> {
        match self {
            Fingerprint::Md5(sum) | Fingerprint::Opaque(sum) => Some(sum.clone()),
            Fingerprint::Modified(_) | Fingerprint::None => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RemoteItem {
    /// Stable identifier, the cache key
    pub id: String,
    /// Name of the item inside its container
    pub name: String,
    pub kind: ItemKind,
    /// Whatever the source needs to list or download the item
    pub locator: String,
    pub fingerprint: Fingerprint,
    pub modified: Option<DateTime<Utc>>,
}

impl RemoteItem {
    pub fn container(id: &str, name: &str, locator: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            kind: ItemKind::Container,
            locator: locator.to_string(),
            fingerprint: Fingerprint::None,
            modified: None,
        }
    }
}

/// One page of a container listing
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub items: Vec<RemoteItem>,
    pub next_page_token: Option<String>,
}

/// A paginated remote hierarchy
pub trait RemoteSource {
    /// Locator of the root container
    fn root(&self) -> String;

    /// List one page of `container`'s children
    fn list_page(&mut self, container: &str, page_token: Option<&str>) -> anyhow::Result<Page>;

    /// Transfer a leaf to `dest`; the parent directory exists
    fn download(&mut self, item: &RemoteItem, dest: &Path) -> anyhow::Result<()>;

    /// Whether items gone from the remote are deleted locally
    fn mirrors_deletions(&self) -> bool {
        false
    }
}

/// Exclusion patterns, regular expressions anchored at the start of the
/// server path (`/folder/file.txt`)
#[derive(Debug, Clone, Default)]
pub struct ExcludeSet {
    patterns: Vec<Regex>,
}

impl ExcludeSet {
    pub fn new(patterns: &[String]) -> Result<Self, StrategyError> {
        let patterns = patterns
            .iter()
            .filter(|p| !p.trim().is_empty())
            .map(|p| {
                Regex::new(&format!("^(?:{})", p)).map_err(|e| {
                    StrategyError::InvalidConfig(format!("Invalid exclude pattern '{}': {}", p, e))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(path))
    }
}

/// Outcome of a walk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkStats {
    pub transferred: usize,
    pub moved: usize,
    pub unchanged: usize,
    pub excluded: usize,
    pub removed: usize,
    pub failed: usize,
}

struct Pending {
    locator: String,
    /// Raw remote names from the root down
    prefix: Vec<String>,
}

pub struct Walker<'a> {
    cache: &'a mut JsonStore,
    root: PathBuf,
    exclude: ExcludeSet,
    stamp: String,
    interrupt: Interrupt,
    stats: WalkStats,
    complete: bool,
}

impl<'a> Walker<'a> {
    pub fn new(
        cache: &'a mut JsonStore,
        root: &Path,
        exclude: ExcludeSet,
        stamp: &str,
        interrupt: Interrupt,
    ) -> Self {
        Self {
            cache,
            root: root.to_path_buf(),
            exclude,
            stamp: stamp.to_string(),
            interrupt,
            stats: WalkStats::default(),
            complete: true,
        }
    }

    /// Walk the whole tree of `source`
    pub fn run(mut self, source: &mut dyn RemoteSource) -> Result<WalkStats, StrategyError> {
        self.cache.set_write_through(false);

        let mut stack = vec![Pending {
            locator: source.root(),
            prefix: Vec::new(),
        }];

        while let Some(pending) = stack.pop() {
            self.check_interrupt()?;
            let mut children = Vec::new();
            let mut page_token: Option<String> = None;

            loop {
                let page = match source.list_page(&pending.locator, page_token.as_deref()) {
                    Ok(page) => page,
                    Err(e) => {
                        let path = server_path(&pending.prefix, None);
                        if self.interrupt.is_set() {
                            debug!("Listing {} stopped by interrupt: {:#}", path, e);
                        } else {
                            error!("Failed to list {}: {:#}", path, e);
                        }
                        self.complete = false;
                        break;
                    }
                };

                for item in page.items {
                    self.check_interrupt()?;
                    self.visit(source, item, &pending.prefix, &mut children);
                }
                self.cache.write()?;

                match page.next_page_token {
                    Some(next) if page_token.as_deref() == Some(next.as_str()) => {
                        warn!("Listing repeated page token, stopping pagination");
                        self.complete = false;
                        break;
                    }
                    Some(next) => page_token = Some(next),
                    None => break,
                }
            }

            // Reverse so the first child is walked first
            stack.extend(children.into_iter().rev());
        }

        if source.mirrors_deletions() {
            if self.complete {
                self.remove_stale()?;
            } else {
                warn!("Listing was incomplete, not removing deleted items");
            }
        }

        self.cache.write()?;
        info!(
            "{} transferred, {} moved, {} unchanged, {} excluded, {} removed, {} failed",
            self.stats.transferred,
            self.stats.moved,
            self.stats.unchanged,
            self.stats.excluded,
            self.stats.removed,
            self.stats.failed
        );

        Ok(self.stats)
    }

    fn visit(
        &mut self,
        source: &mut dyn RemoteSource,
        item: RemoteItem,
        prefix: &[String],
        children: &mut Vec<Pending>,
    ) {
        let path = server_path(prefix, Some(&item.name));
        if self.exclude.is_match(&path) {
            debug!("Excluded {}", path);
            self.stats.excluded += 1;
            return;
        }

        if item.kind == ItemKind::Container {
            let mut child_prefix = prefix.to_vec();
            child_prefix.extend(
                item.name
                    .split('/')
                    .filter(|segment| !segment.is_empty())
                    .map(str::to_string),
            );
            children.push(Pending {
                locator: item.locator,
                prefix: child_prefix,
            });
            return;
        }

        let relative = local_relative(prefix, &item.name);
        let target = join_relative(&self.root, &relative);
        let entry = self.entry(&item.id);

        if self.try_move(&item, &entry, &relative, &target) {
            self.stats.moved += 1;
            return;
        }

        if is_up_to_date(&item, &entry, &relative, &target) {
            debug!("Up to date: {}", path);
            self.stats.unchanged += 1;
            let entry = CacheEntry {
                path: Some(relative),
                checksum: item.fingerprint.cache_value().or(entry.checksum),
                modified: item.modified.or(entry.modified),
                last_seen: Some(self.stamp.clone()),
            };
            self.store_entry(&item.id, &entry);
            return;
        }

        if let Some(parent) = target.parent() {
            if let Err(e) = create_folder(parent) {
                error!("Failed to create {:?}: {}", parent, e);
                self.stats.failed += 1;
                self.mark_seen(&item.id, entry);
                return;
            }
        }

        match source.download(&item, &target) {
            Ok(()) => {
                info!("Downloaded {}", path);
                self.stats.transferred += 1;

                // Superseded versions live under a different name
                if let Some(old) = entry.path.as_deref().filter(|old| *old != relative) {
                    let old_target = join_relative(&self.root, old);
                    match remove_path(&old_target) {
                        Ok(()) => debug!("Removed superseded {}", old),
                        Err(e) => warn!("Failed to remove superseded {}: {}", old, e),
                    }
                }

                let entry = CacheEntry {
                    path: Some(relative),
                    checksum: item.fingerprint.cache_value(),
                    modified: item.modified,
                    last_seen: Some(self.stamp.clone()),
                };
                self.store_entry(&item.id, &entry);
            }
            Err(e) if self.interrupt.is_set() => {
                debug!("Download of {} stopped by interrupt: {:#}", path, e);
                self.mark_seen(&item.id, entry);
            }
            Err(e) => {
                error!("Failed to download {}: {:#}", path, e);
                self.stats.failed += 1;
                self.mark_seen(&item.id, entry);
            }
        }
    }

    /// Rename a moved item locally; false when no move applies
    fn try_move(
        &mut self,
        item: &RemoteItem,
        entry: &CacheEntry,
        relative: &str,
        target: &Path,
    ) -> bool {
        let (Some(old), Some(cached_modified), Some(modified)) =
            (entry.path.as_deref(), entry.modified, item.modified)
        else {
            return false;
        };

        if cached_modified != modified || old == relative || target.exists() {
            return false;
        }

        let old_target = join_relative(&self.root, old);
        if !old_target.exists() {
            return false;
        }

        let renamed = target
            .parent()
            .map_or(Ok(()), create_folder)
            .and_then(|_| fs::rename(&old_target, target));

        if let Err(e) = renamed {
            warn!("Failed to move {} to {}: {}", old, relative, e);
            return false;
        }

        info!("Moved {} to {}", old, relative);
        let entry = CacheEntry {
            path: Some(relative.to_string()),
            checksum: item.fingerprint.cache_value().or_else(|| entry.checksum.clone()),
            modified: Some(modified),
            last_seen: Some(self.stamp.clone()),
        };
        self.store_entry(&item.id, &entry);
        true
    }

    /// Keep what this page already synced before unwinding
    fn check_interrupt(&mut self) -> Result<(), StrategyError> {
        if let Err(e) = self.interrupt.check() {
            self.cache.write()?;
            return Err(e.into());
        }
        Ok(())
    }

    fn remove_stale(&mut self) -> Result<(), StrategyError> {
        for key in self.cache.keys() {
            let entry = self.entry(&key);
            if entry.last_seen.as_deref() == Some(self.stamp.as_str()) {
                continue;
            }

            if let Some(relative) = entry.path.as_deref() {
                if self.exclude.is_match(&format!("/{}", relative)) {
                    continue;
                }

                let target = join_relative(&self.root, relative);
                if target.exists() {
                    match remove_path(&target) {
                        Ok(()) => {
                            info!("Removed {} (deleted remotely)", relative);
                            self.stats.removed += 1;
                        }
                        Err(e) => {
                            warn!("Failed to remove {}: {}", relative, e);
                            continue;
                        }
                    }
                }
            }

            self.cache.delete_in(&[&key])?;
        }
        Ok(())
    }

    fn entry(&self, id: &str) -> CacheEntry {
        self.cache
            .get_in(&[id])
            .and_then(|value| serde_json::from_value(value.clone()).ok())
            .unwrap_or_default()
    }

    fn mark_seen(&mut self, id: &str, mut entry: CacheEntry) {
        entry.last_seen = Some(self.stamp.clone());
        self.store_entry(id, &entry);
    }

    fn store_entry(&mut self, id: &str, entry: &CacheEntry) {
        let value = serde_json::to_value(entry).unwrap_or(Value::Null);
        if let Err(e) = self.cache.set_in(&[id], value) {
            warn!("Failed to update cache for {}: {}", id, e);
        }
    }
}

/// Walk `source` into the job's backup path using the alias cache
pub fn walk(
    ctx: &Context,
    job: &BackupJob,
    source: &mut dyn RemoteSource,
) -> Result<WalkStats, StrategyError> {
    let mut cache = ctx.cache_store(&job.alias)?;
    let exclude = ExcludeSet::new(&job.config.exclude)?;

    Walker::new(
        &mut cache,
        &job.backup_path,
        exclude,
        &job.stamp,
        ctx.interrupt.clone(),
    )
    .run(source)
}

fn is_up_to_date(item: &RemoteItem, entry: &CacheEntry, relative: &str, target: &Path) -> bool {
    if !target.exists() {
        return false;
    }

    let same_path = entry.path.as_deref() == Some(relative);

    match &item.fingerprint {
        Fingerprint::Md5(sum) => {
            (same_path && entry.checksum.as_deref() == Some(sum.as_str()))
                || md5_file(target)
                    .map(|local| local.eq_ignore_ascii_case(sum))
                    .unwrap_or(false)
        }
        Fingerprint::Opaque(tag) => same_path && entry.checksum.as_deref() == Some(tag.as_str()),
        Fingerprint::Modified(modified) => {
            (same_path && entry.modified == Some(*modified))
                || local_modified(target).map_or(false, |local| local > *modified)
        }
        Fingerprint::None => true,
    }
}

fn local_modified(path: &Path) -> Option<DateTime<Utc>> {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .map(|time: SystemTime| DateTime::<Utc>::from(time))
}

/// `/a/b/name` as seen on the remote
fn server_path(prefix: &[String], name: Option<&str>) -> String {
    let mut path = String::new();
    for segment in prefix.iter().map(String::as_str).chain(name) {
        path.push('/');
        path.push_str(segment);
    }
    if path.is_empty() {
        path.push('/');
    }
    path
}

/// `a/b/name` below the backup root, each segment made filesystem safe
fn local_relative(prefix: &[String], name: &str) -> String {
    prefix
        .iter()
        .map(String::as_str)
        .chain(std::iter::once(name))
        .map(sanitize_name)
        .collect::<Vec<_>>()
        .join("/")
}

fn join_relative(root: &Path, relative: &str) -> PathBuf {
    relative
        .split('/')
        .filter(|segment| !segment.is_empty())
        .fold(root.to_path_buf(), |path, segment| path.join(segment))
}
