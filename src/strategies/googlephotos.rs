//! Google Photos backup
//!
//! Albums are stored as `<year>/<album title>/<filename>`, the year taken from
//! a leading `YYYY-` in the title. Media items carry no checksum, so an
//! existing file is never downloaded again.

use chrono::{DateTime, Utc};
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::path::Path;

use super::google::{self, GoogleSettings, PHOTOS_SCOPE};
use super::walker::{self, Fingerprint, ItemKind, Page, RemoteItem, RemoteSource};
use super::{BackupJob, Context, Strategy, StrategyError};
use crate::config::StrategyKind;
use crate::managers::registration::Prompter;
use crate::utils::fs::write_stream;
use crate::utils::oauth::OAuthClient;

const API_URL: &str = "https://photoslibrary.googleapis.com/v1";
const ROOT: &str = "albums";
const ALBUM_PREFIX: &str = "album:";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Album {
    id: String,
    #[serde(default)]
    title: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AlbumList {
    #[serde(default)]
    albums: Vec<Album>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MediaMetadata {
    creation_time: Option<DateTime<Utc>>,
    width: Option<String>,
    height: Option<String>,
    video: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MediaItem {
    id: String,
    filename: String,
    base_url: String,
    media_metadata: MediaMetadata,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MediaList {
    #[serde(default)]
    media_items: Vec<MediaItem>,
    next_page_token: Option<String>,
}

/// Year folder of an album, `0000` when the title carries none
fn album_year(title: &str) -> &str {
    match title.as_bytes() {
        [a, b, c, d, b'-', ..] if [a, b, c, d].iter().all(|x| x.is_ascii_digit()) => &title[..4],
        _ => "0000",
    }
}

fn album_item(album: Album) -> RemoteItem {
    let title = album.title.replace('/', "_");
    RemoteItem::container(
        &album.id,
        &format!("{}/{}", album_year(&title), title),
        &format!("{}{}", ALBUM_PREFIX, album.id),
    )
}

fn media_item(album_id: &str, item: MediaItem) -> RemoteItem {
    let metadata = &item.media_metadata;
    let suffix = if metadata.video.is_some() {
        "=dv".to_string()
    } else {
        format!(
            "=w{}-h{}",
            metadata.width.as_deref().unwrap_or("0"),
            metadata.height.as_deref().unwrap_or("0")
        )
    };

    RemoteItem {
        id: format!("{}:{}", album_id, item.id),
        name: item.filename,
        kind: ItemKind::File,
        locator: format!("{}{}", item.base_url, suffix),
        fingerprint: Fingerprint::None,
        modified: metadata.creation_time,
    }
}

struct PhotosSource {
    client: OAuthClient,
}

impl PhotosSource {
    fn albums(&mut self, page_token: Option<&str>) -> anyhow::Result<Page> {
        let mut params = vec![("pageSize", "50")];
        if let Some(token) = page_token {
            params.push(("pageToken", token));
        }

        let list: AlbumList = self
            .client
            .send(|http: &Client| http.get(format!("{}/albums", API_URL)).query(&params))?
            .json()?;

        Ok(Page {
            items: list.albums.into_iter().map(album_item).collect(),
            next_page_token: list.next_page_token,
        })
    }

    fn media(&mut self, album_id: &str, page_token: Option<&str>) -> anyhow::Result<Page> {
        let mut body = json!({ "albumId": album_id, "pageSize": 100 });
        if let Some(token) = page_token {
            body["pageToken"] = json!(token);
        }

        let list: MediaList = self
            .client
            .send(|http: &Client| {
                http.post(format!("{}/mediaItems:search", API_URL)).json(&body)
            })?
            .json()?;

        Ok(Page {
            items: list
                .media_items
                .into_iter()
                .map(|item| media_item(album_id, item))
                .collect(),
            next_page_token: list.next_page_token,
        })
    }
}

impl RemoteSource for PhotosSource {
    fn root(&self) -> String {
        ROOT.to_string()
    }

    fn list_page(&mut self, container: &str, page_token: Option<&str>) -> anyhow::Result<Page> {
        match container.strip_prefix(ALBUM_PREFIX) {
            Some(album_id) => self.media(album_id, page_token),
            None => self.albums(page_token),
        }
    }

    fn download(&mut self, item: &RemoteItem, dest: &Path) -> anyhow::Result<()> {
        let mut response = self.client.send(|http: &Client| http.get(&item.locator))?;
        write_stream(dest, &mut response)?;
        Ok(())
    }
}

pub struct GooglePhotosStrategy;

impl GooglePhotosStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl Strategy for GooglePhotosStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::GooglePhotos
    }

    fn configure(
        &mut self,
        _alias: &str,
        settings: &mut Map<String, Value>,
        prompter: &mut dyn Prompter,
    ) -> anyhow::Result<()> {
        google::authorize(PHOTOS_SCOPE, settings, prompter)
    }

    fn start_backup(&mut self, ctx: &mut Context, job: &BackupJob) -> Result<(), StrategyError> {
        let settings: GoogleSettings = job.settings()?;
        let mut source = PhotosSource {
            client: google::client(settings)?,
        };

        let walked = walker::walk(ctx, job, &mut source);
        google::persist_token(ctx, &job.alias, &source.client);
        walked.map(|_| ())
    }
}
