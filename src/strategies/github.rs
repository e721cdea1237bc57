//! GitHub backup
//!
//! Every repository of the configured user is either kept as a live clone
//! (`git clone`, then `git pull --rebase` on later runs) or, in archive mode,
//! downloaded as the zipball of its latest tag. A repository is only touched
//! again when its `pushed_at` (or latest tag) changed.

use anyhow::Context as _;
use reqwest::blocking::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use super::walker::{self, Fingerprint, ItemKind, Page, RemoteItem, RemoteSource};
use super::{BackupJob, Context, Strategy, StrategyError};
use crate::config::StrategyKind;
use crate::utils::executor::CommandExecutor;
use crate::utils::fs::write_stream;
use crate::utils::oauth::{check_status, http_client};

pub const API_URL: &str = "https://api.github.com";

#[derive(Debug, Deserialize)]
pub struct GithubSettings {
    pub username: String,
    pub token: String,
}

/// Basic-auth access to the GitHub REST API
pub struct GithubApi {
    http: Client,
    username: String,
    token: String,
}

impl GithubApi {
    pub fn new(settings: GithubSettings) -> anyhow::Result<Self> {
        Ok(Self {
            http: http_client()?,
            username: settings.username,
            token: settings.token,
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn get(&self, url: &str) -> anyhow::Result<Response> {
        let response = self
            .http
            .get(url)
            .basic_auth(&self.username, Some(&self.token))
            .header("Accept", "application/vnd.github+json")
            .send()
            .with_context(|| format!("Request to {} failed", url))?;
        Ok(check_status(response)?)
    }

    /// One page of a listing plus the URL of the next page
    pub fn get_page<T: DeserializeOwned>(
        &self,
        url: &str,
    ) -> anyhow::Result<(Vec<T>, Option<String>)> {
        let response = self.get(url)?;
        let next = response
            .headers()
            .get("Link")
            .and_then(|link| link.to_str().ok())
            .and_then(next_page_url);
        Ok((response.json()?, next))
    }

    pub fn download(&self, url: &str, dest: &Path) -> anyhow::Result<()> {
        let mut response = self.get(url)?;
        write_stream(dest, &mut response)?;
        Ok(())
    }
}

/// Target of `rel="next"` in a `Link` header
pub fn next_page_url(link: &str) -> Option<String> {
    link.split(',').find_map(|part| {
        let (target, params) = part.split_once(';')?;
        params
            .split(';')
            .any(|p| p.trim() == "rel=\"next\"")
            .then(|| target.trim().trim_start_matches('<').trim_end_matches('>').to_string())
    })
}

/// Clone `url` into `dest`, or pull when a clone already exists
pub fn sync_repository(
    executor: &dyn CommandExecutor,
    url: &str,
    dest: &Path,
    timeout: Option<Duration>,
) -> anyhow::Result<()> {
    let dest_str = dest.to_string_lossy();
    if dest.join(".git").is_dir() {
        executor.run_command("git", &["-C", &dest_str, "pull", "--rebase", url], None, timeout)?;
    } else {
        executor.run_command("git", &["clone", url, &dest_str], None, timeout)?;
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct Repository {
    id: u64,
    name: String,
    clone_url: String,
    tags_url: String,
    default_branch: Option<String>,
    pushed_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Tag {
    name: String,
    zipball_url: String,
}

struct GithubSource {
    api: GithubApi,
    executor: Arc<dyn CommandExecutor>,
    archive: bool,
    timeout: Option<Duration>,
}

impl GithubSource {
    fn repository_item(repo: Repository) -> RemoteItem {
        let pushed = repo.pushed_at.clone().unwrap_or_default();
        RemoteItem {
            id: repo.id.to_string(),
            name: repo.name,
            kind: ItemKind::Repository,
            locator: repo.clone_url,
            fingerprint: Fingerprint::Opaque(pushed),
            modified: None,
        }
    }
}

/// Archive items for `repos`; a repository whose tags cannot be read is
/// logged and left out of this page
fn archive_items<F>(username: &str, repos: Vec<Repository>, mut tags_of: F) -> Vec<RemoteItem>
where
    F: FnMut(&Repository) -> anyhow::Result<Vec<Tag>>,
{
    repos
        .into_iter()
        .filter_map(|repo| match tags_of(&repo) {
            Ok(tags) => Some(archive_item(username, repo, tags.into_iter().next())),
            Err(e) => {
                error!("Failed to read tags of {}: {:#}", repo.name, e);
                None
            }
        })
        .collect()
}

fn archive_item(username: &str, repo: Repository, latest: Option<Tag>) -> RemoteItem {
    let (name, locator, version) = match latest {
        Some(tag) => (
            format!("{}-{}.zip", repo.name, tag.name),
            tag.zipball_url,
            tag.name,
        ),
        None => (
            format!("{}.zip", repo.name),
            format!(
                "https://github.com/{}/{}/archive/{}.zip",
                username,
                repo.name,
                repo.default_branch.as_deref().unwrap_or("main")
            ),
            repo.pushed_at.unwrap_or_default(),
        ),
    };

    RemoteItem {
        id: repo.id.to_string(),
        name,
        kind: ItemKind::File,
        locator,
        fingerprint: Fingerprint::Opaque(version),
        modified: None,
    }
}

impl RemoteSource for GithubSource {
    fn root(&self) -> String {
        format!("{}/users/{}/repos", API_URL, self.api.username())
    }

    fn list_page(&mut self, container: &str, page_token: Option<&str>) -> anyhow::Result<Page> {
        let (repos, next) = self.api.get_page::<Repository>(page_token.unwrap_or(container))?;

        let items = if self.archive {
            let api = &self.api;
            archive_items(api.username(), repos, |repo| {
                api.get_page::<Tag>(&repo.tags_url).map(|(tags, _)| tags)
            })
        } else {
            repos.into_iter().map(GithubSource::repository_item).collect()
        };

        Ok(Page {
            items,
            next_page_token: next,
        })
    }

    fn download(&mut self, item: &RemoteItem, dest: &Path) -> anyhow::Result<()> {
        match item.kind {
            ItemKind::Repository => {
                info!("Syncing {}", item.name);
                sync_repository(self.executor.as_ref(), &item.locator, dest, self.timeout)
            }
            _ => self.api.download(&item.locator, dest),
        }
    }
}

pub struct GithubStrategy;

impl GithubStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl Strategy for GithubStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Github
    }

    fn start_backup(&mut self, ctx: &mut Context, job: &BackupJob) -> Result<(), StrategyError> {
        if !job.config.archive {
            ctx.require_program("git")?;
        }

        let mut source = GithubSource {
            api: GithubApi::new(job.settings()?)?,
            executor: ctx.executor.clone(),
            archive: job.config.archive,
            timeout: job.timeout(),
        };

        walker::walk(ctx, job, &mut source).map(|_| ())
    }
}
