//! Google Drive backup
//!
//! Mirrors the whole drive below the backup path. Regular files are compared
//! by MD5, Google documents are exported (Docs and Slides to PDF, Sheets to
//! XLSX) and compared by modification time. Files deleted on Drive are
//! removed locally.

use chrono::{DateTime, Utc};
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::Path;
use tracing::debug;

use super::google::{self, GoogleSettings, DRIVE_SCOPE};
use super::walker::{self, Fingerprint, ItemKind, Page, RemoteItem, RemoteSource};
use super::{BackupJob, Context, Strategy, StrategyError};
use crate::config::StrategyKind;
use crate::managers::registration::Prompter;
use crate::utils::fs::write_stream;
use crate::utils::oauth::OAuthClient;

const API_URL: &str = "https://www.googleapis.com/drive/v3/files";
const FIELDS: &str = "nextPageToken,files(id,name,mimeType,modifiedTime,trashed,md5Checksum)";

const FOLDER: &str = "application/vnd.google-apps.folder";
const DOCUMENT: &str = "application/vnd.google-apps.document";
const SPREADSHEET: &str = "application/vnd.google-apps.spreadsheet";
const PRESENTATION: &str = "application/vnd.google-apps.presentation";
const GOOGLE_APPS: &str = "application/vnd.google-apps.";

const PDF: &str = "application/pdf";
const XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    name: String,
    mime_type: String,
    modified_time: Option<DateTime<Utc>>,
    #[serde(default)]
    trashed: bool,
    md5_checksum: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    next_page_token: Option<String>,
}

/// Walker item for a listed file; `None` for files that are not backed up
fn drive_item(file: DriveFile) -> Option<RemoteItem> {
    if file.trashed {
        return None;
    }

    let export = |mime: &str| format!("{}/{}/export?mimeType={}", API_URL, file.id, mime);

    let (kind, name, locator, fingerprint) = match file.mime_type.as_str() {
        FOLDER => return Some(RemoteItem::container(&file.id, &file.name, &file.id)),
        DOCUMENT | PRESENTATION => (
            ItemKind::Document,
            format!("{}_converted.pdf", file.name),
            export(PDF),
            file.modified_time.map_or(Fingerprint::None, Fingerprint::Modified),
        ),
        SPREADSHEET => (
            ItemKind::Document,
            format!("{}.xlsx", file.name),
            export(XLSX),
            file.modified_time.map_or(Fingerprint::None, Fingerprint::Modified),
        ),
        other if other.starts_with(GOOGLE_APPS) => {
            debug!("Skipping {} ({} cannot be exported)", file.name, other);
            return None;
        }
        _ => (
            ItemKind::File,
            file.name.clone(),
            format!("{}/{}?alt=media", API_URL, file.id),
            match (&file.md5_checksum, file.modified_time) {
                (Some(sum), _) => Fingerprint::Md5(sum.clone()),
                (None, Some(modified)) => Fingerprint::Modified(modified),
                (None, None) => Fingerprint::None,
            },
        ),
    };

    Some(RemoteItem {
        id: file.id,
        name,
        kind,
        locator,
        fingerprint,
        modified: file.modified_time,
    })
}

struct DriveSource {
    client: OAuthClient,
}

impl RemoteSource for DriveSource {
    fn root(&self) -> String {
        "root".to_string()
    }

    fn list_page(&mut self, container: &str, page_token: Option<&str>) -> anyhow::Result<Page> {
        let query = format!("'{}' in parents", container);
        let mut params = vec![
            ("q", query.as_str()),
            ("fields", FIELDS),
            ("pageSize", "100"),
        ];
        if let Some(token) = page_token {
            params.push(("pageToken", token));
        }

        let list: FileList = self
            .client
            .send(|http: &Client| http.get(API_URL).query(&params))?
            .json()?;

        Ok(Page {
            items: list.files.into_iter().filter_map(drive_item).collect(),
            next_page_token: list.next_page_token,
        })
    }

    fn download(&mut self, item: &RemoteItem, dest: &Path) -> anyhow::Result<()> {
        let mut response = self.client.send(|http: &Client| http.get(&item.locator))?;
        write_stream(dest, &mut response)?;
        Ok(())
    }

    fn mirrors_deletions(&self) -> bool {
        true
    }
}

pub struct GoogleDriveStrategy;

impl GoogleDriveStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl Strategy for GoogleDriveStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::GoogleDrive
    }

    fn configure(
        &mut self,
        _alias: &str,
        settings: &mut Map<String, Value>,
        prompter: &mut dyn Prompter,
    ) -> anyhow::Result<()> {
        google::authorize(DRIVE_SCOPE, settings, prompter)
    }

    fn start_backup(&mut self, ctx: &mut Context, job: &BackupJob) -> Result<(), StrategyError> {
        let settings: GoogleSettings = job.settings()?;
        let mut source = DriveSource {
            client: google::client(settings)?,
        };

        let walked = walker::walk(ctx, job, &mut source);
        google::persist_token(ctx, &job.alias, &source.client);
        walked.map(|_| ())
    }
}
