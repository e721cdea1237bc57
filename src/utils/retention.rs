//! Generation pruning for versioned aliases
//!
//! A generation is any immediate child of the backup directory named
//! `<alias>_<stamp>`, file or directory, where the stamp starts with a digit.
//! Aliases that extend another alias's name (`db` and `db_prod`) can then
//! share a backup directory. Generations are ranked by
//! modification time, newest first, ties broken by name so the ranking does
//! not depend on listing order.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};

use super::fs::remove_path;

/// Keep the newest `keep` generations of `prefix` in `dir`, delete the rest
///
/// Returns the removed paths. Entries that fail to delete are logged and
/// skipped, so a second call retries them.
pub fn prune(dir: &Path, keep: usize, prefix: &str) -> io::Result<Vec<PathBuf>> {
    let mut generations = generations(dir, prefix)?;

    if generations.len() <= keep {
        debug!(
            "{} generation(s) of '{}' present, keeping all",
            generations.len(),
            prefix
        );
        return Ok(Vec::new());
    }

    generations.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| b.name.cmp(&a.name)));

    let mut removed = Vec::new();
    for generation in generations.into_iter().skip(keep) {
        match remove_path(&generation.path) {
            Ok(()) => {
                info!("Removed old version {}", generation.name);
                removed.push(generation.path);
            }
            Err(e) => warn!("Failed to remove old version {:?}: {}", generation.path, e),
        }
    }

    Ok(removed)
}

struct Generation {
    name: String,
    path: PathBuf,
    modified: SystemTime,
}

fn generations(dir: &Path, prefix: &str) -> io::Result<Vec<Generation>> {
    let marker = format!("{}_", prefix);

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    Ok(entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            let stamped = name
                .strip_prefix(&marker)
                .is_some_and(|rest| rest.starts_with(|c: char| c.is_ascii_digit()));
            if !stamped {
                return None;
            }
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            Some(Generation {
                name,
                path: entry.path(),
                modified,
            })
        })
        .collect())
}
