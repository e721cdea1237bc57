//! Dropbox backup
//!
//! Walks the account folder by folder with `list_folder`, comparing files by
//! their `content_hash`. Files deleted on Dropbox are removed locally.

use chrono::{DateTime, Utc};
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::json;
use std::path::Path;

use super::walker::{self, Fingerprint, ItemKind, Page, RemoteItem, RemoteSource};
use super::{BackupJob, Context, Strategy, StrategyError};
use crate::config::StrategyKind;
use crate::utils::fs::write_stream;
use crate::utils::oauth::{check_status, http_client};

const API_URL: &str = "https://api.dropboxapi.com/2/files";
const CONTENT_URL: &str = "https://content.dropboxapi.com/2/files/download";

#[derive(Debug, Deserialize)]
struct DropboxSettings {
    token: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = ".tag", rename_all = "lowercase")]
enum Entry {
    Folder {
        id: String,
        name: String,
        path_lower: String,
    },
    File {
        id: String,
        name: String,
        content_hash: Option<String>,
        server_modified: Option<DateTime<Utc>>,
    },
    Deleted {},
}

#[derive(Debug, Deserialize)]
struct ListFolderResult {
    entries: Vec<Entry>,
    cursor: String,
    has_more: bool,
}

impl From<ListFolderResult> for Page {
    fn from(result: ListFolderResult) -> Self {
        let items = result
            .entries
            .into_iter()
            .filter_map(|entry| match entry {
                Entry::Folder {
                    id,
                    name,
                    path_lower,
                } => Some(RemoteItem::container(&id, &name, &path_lower)),
                Entry::File {
                    id,
                    name,
                    content_hash,
                    server_modified,
                } => Some(RemoteItem {
                    locator: id.clone(),
                    id,
                    name,
                    kind: ItemKind::File,
                    fingerprint: match (content_hash, server_modified) {
                        (Some(hash), _) => Fingerprint::Opaque(hash),
                        (None, Some(modified)) => Fingerprint::Modified(modified),
                        (None, None) => Fingerprint::None,
                    },
                    modified: server_modified,
                }),
                Entry::Deleted {} => None,
            })
            .collect();

        Page {
            items,
            next_page_token: result.has_more.then_some(result.cursor),
        }
    }
}

struct DropboxSource {
    http: Client,
    token: String,
}

impl RemoteSource for DropboxSource {
    fn root(&self) -> String {
        // The account root is the empty path
        String::new()
    }

    fn list_page(&mut self, container: &str, page_token: Option<&str>) -> anyhow::Result<Page> {
        let request = match page_token {
            Some(cursor) => self
                .http
                .post(format!("{}/list_folder/continue", API_URL))
                .json(&json!({ "cursor": cursor })),
            None => self
                .http
                .post(format!("{}/list_folder", API_URL))
                .json(&json!({ "path": container, "recursive": false })),
        };

        let response = check_status(request.bearer_auth(&self.token).send()?)?;
        let result: ListFolderResult = response.json()?;
        Ok(result.into())
    }

    fn download(&mut self, item: &RemoteItem, dest: &Path) -> anyhow::Result<()> {
        let argument = json!({ "path": item.locator }).to_string();
        let response = self
            .http
            .post(CONTENT_URL)
            .bearer_auth(&self.token)
            .header("Dropbox-API-Arg", argument)
            .send()?;

        let mut response = check_status(response)?;
        write_stream(dest, &mut response)?;
        Ok(())
    }

    fn mirrors_deletions(&self) -> bool {
        true
    }
}

pub struct DropboxStrategy;

impl DropboxStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl Strategy for DropboxStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Dropbox
    }

    fn start_backup(&mut self, ctx: &mut Context, job: &BackupJob) -> Result<(), StrategyError> {
        let settings: DropboxSettings = job.settings()?;
        let mut source = DropboxSource {
            http: http_client()?,
            token: settings.token,
        };

        walker::walk(ctx, job, &mut source).map(|_| ())
    }
}
