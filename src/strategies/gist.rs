//! Gist backup
//!
//! Gists follow the GitHub repository modes: a live clone of the gist
//! repository, or in archive mode a zip of all its files named
//! `<gist id>-<first file stem>-<version>.zip`. The version is derived from
//! `updated_at`, so an edited gist replaces its previous archive.

use serde::Deserialize;
use sha1::{Digest, Sha1};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::github::{sync_repository, GithubApi, API_URL};
use super::walker::{self, Fingerprint, ItemKind, Page, RemoteItem, RemoteSource};
use super::{BackupJob, Context, Strategy, StrategyError};
use crate::config::StrategyKind;
use crate::utils::executor::CommandExecutor;
use crate::utils::fs::{create_tmp_folder, remove_path, sanitize_name, zip_dir};

#[derive(Debug, Deserialize)]
struct GistFile {
    filename: String,
    raw_url: String,
}

#[derive(Debug, Deserialize)]
struct Gist {
    id: String,
    git_pull_url: String,
    updated_at: String,
    // Ordered by file name
    #[serde(default)]
    files: BTreeMap<String, GistFile>,
}

/// First ten hex digits of the SHA-1 of `updated_at`
fn gist_version(updated_at: &str) -> String {
    let digest = Sha1::digest(updated_at.as_bytes());
    hex::encode(digest)[..10].to_string()
}

fn archive_name(gist: &Gist, version: &str) -> String {
    let stem = gist
        .files
        .keys()
        .next()
        .map(|name| {
            Path::new(name)
                .file_stem()
                .map_or_else(|| name.clone(), |s| s.to_string_lossy().into_owned())
        })
        .unwrap_or_default();
    format!("{}-{}-{}.zip", gist.id, stem, version)
}

struct GistSource {
    api: GithubApi,
    executor: Arc<dyn CommandExecutor>,
    archive: bool,
    timeout: Option<Duration>,
    tmp_root: PathBuf,
    /// Files of archived gists by item id, filled while listing
    files: BTreeMap<String, Vec<GistFile>>,
}

impl GistSource {
    fn gist_item(&mut self, gist: Gist) -> RemoteItem {
        let version = gist_version(&gist.updated_at);

        if !self.archive {
            return RemoteItem {
                name: gist.id.clone(),
                id: gist.id,
                kind: ItemKind::Repository,
                locator: gist.git_pull_url,
                fingerprint: Fingerprint::Opaque(version),
                modified: None,
            };
        }

        let name = archive_name(&gist, &version);
        self.files
            .insert(gist.id.clone(), gist.files.into_values().collect());

        RemoteItem {
            locator: gist.id.clone(),
            id: gist.id,
            name,
            kind: ItemKind::File,
            fingerprint: Fingerprint::Opaque(version),
            modified: None,
        }
    }

    fn archive(&self, item: &RemoteItem, dest: &Path) -> anyhow::Result<()> {
        info!("Archiving {}", item.id);
        let staging = create_tmp_folder(&self.tmp_root)?;

        let result = (|| -> anyhow::Result<()> {
            for file in self.files.get(&item.id).into_iter().flatten() {
                self.api
                    .download(&file.raw_url, &staging.join(sanitize_name(&file.filename)))?;
            }
            zip_dir(&staging, dest)
        })();

        if let Err(e) = remove_path(&staging) {
            warn!("Failed to remove staging folder {:?}: {}", staging, e);
        }
        result
    }
}

impl RemoteSource for GistSource {
    fn root(&self) -> String {
        format!("{}/users/{}/gists", API_URL, self.api.username())
    }

    fn list_page(&mut self, container: &str, page_token: Option<&str>) -> anyhow::Result<Page> {
        let (gists, next) = self.api.get_page::<Gist>(page_token.unwrap_or(container))?;

        Ok(Page {
            items: gists.into_iter().map(|gist| self.gist_item(gist)).collect(),
            next_page_token: next,
        })
    }

    fn download(&mut self, item: &RemoteItem, dest: &Path) -> anyhow::Result<()> {
        match item.kind {
            ItemKind::Repository => {
                info!("Syncing {}", item.id);
                sync_repository(self.executor.as_ref(), &item.locator, dest, self.timeout)
            }
            _ => self.archive(item, dest),
        }
    }
}

pub struct GistStrategy;

impl GistStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl Strategy for GistStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Gist
    }

    fn start_backup(&mut self, ctx: &mut Context, job: &BackupJob) -> Result<(), StrategyError> {
        if !job.config.archive {
            ctx.require_program("git")?;
        }

        let tmp_root = ctx.tmp_folder()?;
        let mut source = GistSource {
            api: GithubApi::new(job.settings()?)?,
            executor: ctx.executor.clone(),
            archive: job.config.archive,
            timeout: job.timeout(),
            tmp_root,
            files: BTreeMap::new(),
        };

        walker::walk(ctx, job, &mut source).map(|_| ())
    }
}
