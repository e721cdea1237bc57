//! Fake remotes and counting helpers
//!
//! [`FakeRemote`] is an in-memory paginated tree implementing the walker's
//! [`RemoteSource`]. Clones share state, so a test can hand one clone to a
//! [`WalkingStrategy`] and inspect transfers through another. The same goes
//! for [`RecordingMailer`].
//!
//! [`SignalledExecutor`] and [`FakeRemote::interrupt_on_download`] stand in
//! for a Ctrl+C that also kills the running child.

use account_backup::config::StrategyKind;
use account_backup::managers::logging::LogCounter;
use account_backup::managers::notification::{MailMessage, Mailer};
use account_backup::strategies::walker::{self, Fingerprint, ItemKind, Page, RemoteItem, RemoteSource};
use account_backup::strategies::{BackupJob, Context, Strategy, StrategyError};
use account_backup::utils::executor::mock::MockExecutor;
use account_backup::utils::{CommandExecutor, Interrupt};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::process::Output;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;

/// Locator of the fake root container
pub const ROOT: &str = "root";

/// Modification time given to every new item
pub fn base_time() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap_or_default()
}

#[derive(Default)]
struct State {
    children: HashMap<String, Vec<RemoteItem>>,
    contents: HashMap<String, String>,
    downloads: Vec<String>,
    failing: HashSet<String>,
    broken_listings: HashSet<String>,
    page_size: Option<usize>,
    mirrors: bool,
    interrupting: Option<(String, Interrupt)>,
}

impl State {
    fn item_mut(&mut self, id: &str) -> Option<&mut RemoteItem> {
        self.children
            .values_mut()
            .flat_map(|items| items.iter_mut())
            .find(|item| item.id == id)
    }

    fn take(&mut self, id: &str) -> Option<RemoteItem> {
        for items in self.children.values_mut() {
            if let Some(pos) = items.iter().position(|item| item.id == id) {
                return Some(items.remove(pos));
            }
        }
        None
    }
}

/// In-memory remote tree keyed by container locator
#[derive(Clone, Default)]
pub struct FakeRemote {
    state: Arc<Mutex<State>>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Propagate remote deletions, like Drive and Dropbox
    pub fn mirroring(self) -> Self {
        self.state.lock().mirrors = true;
        self
    }

    /// Split every listing into pages of `size` items
    pub fn with_page_size(self, size: usize) -> Self {
        self.state.lock().page_size = Some(size);
        self
    }

    /// Add a file with an MD5 fingerprint under `parent`
    pub fn add_file(&self, parent: &str, id: &str, name: &str, checksum: &str) -> &Self {
        let mut state = self.state.lock();
        state.children.entry(parent.to_string()).or_default().push(RemoteItem {
            id: id.to_string(),
            name: name.to_string(),
            kind: ItemKind::File,
            locator: id.to_string(),
            fingerprint: Fingerprint::Md5(checksum.to_string()),
            modified: Some(base_time()),
        });
        state.contents.insert(id.to_string(), format!("{} {}", name, checksum));
        self
    }

    /// Add a folder under `parent`; its locator is its id
    pub fn add_folder(&self, parent: &str, id: &str, name: &str) -> &Self {
        self.state
            .lock()
            .children
            .entry(parent.to_string())
            .or_default()
            .push(RemoteItem::container(id, name, id));
        self
    }

    /// New content and checksum, one second later
    pub fn change(&self, id: &str, checksum: &str) {
        let mut state = self.state.lock();
        let name = match state.item_mut(id) {
            Some(item) => {
                item.fingerprint = Fingerprint::Md5(checksum.to_string());
                item.modified = item.modified.map(|m| m + chrono::Duration::seconds(1));
                item.name.clone()
            }
            None => panic!("No item {}", id),
        };
        state.contents.insert(id.to_string(), format!("{} {}", name, checksum));
    }

    /// Move an item to `parent` under `name`, keeping its modification time
    pub fn relocate(&self, id: &str, parent: &str, name: &str) {
        let mut state = self.state.lock();
        let mut item = state.take(id).unwrap_or_else(|| panic!("No item {}", id));
        item.name = name.to_string();
        state.children.entry(parent.to_string()).or_default().push(item);
    }

    pub fn remove(&self, id: &str) {
        self.state.lock().take(id);
    }

    /// Make downloads of `id` fail
    pub fn fail_download(&self, id: &str) {
        self.state.lock().failing.insert(id.to_string());
    }

    /// Make listings of the container `locator` fail
    pub fn fail_listing(&self, locator: &str) {
        self.state.lock().broken_listings.insert(locator.to_string());
    }

    /// Raise `interrupt` while `id` downloads, then fail that download
    pub fn interrupt_on_download(&self, id: &str, interrupt: &Interrupt) {
        self.state.lock().interrupting = Some((id.to_string(), interrupt.clone()));
    }

    /// Ids downloaded so far, in order
    pub fn downloads(&self) -> Vec<String> {
        self.state.lock().downloads.clone()
    }

    pub fn clear_downloads(&self) {
        self.state.lock().downloads.clear();
    }
}

impl RemoteSource for FakeRemote {
    fn root(&self) -> String {
        ROOT.to_string()
    }

    fn list_page(&mut self, container: &str, page_token: Option<&str>) -> anyhow::Result<Page> {
        let state = self.state.lock();
        if state.broken_listings.contains(container) {
            anyhow::bail!("listing {} failed", container);
        }

        let items = state.children.get(container).cloned().unwrap_or_default();
        let start: usize = page_token.map(str::parse).transpose()?.unwrap_or(0);
        let end = state
            .page_size
            .map_or(items.len(), |size| (start + size).min(items.len()));

        Ok(Page {
            items: items[start.min(end)..end].to_vec(),
            next_page_token: (end < items.len()).then(|| end.to_string()),
        })
    }

    fn download(&mut self, item: &RemoteItem, dest: &Path) -> anyhow::Result<()> {
        let mut state = self.state.lock();
        if state.failing.contains(&item.id) {
            anyhow::bail!("download of {} failed", item.id);
        }
        if let Some((_, interrupt)) = state.interrupting.as_ref().filter(|(id, _)| *id == item.id) {
            interrupt.trigger();
            anyhow::bail!("download of {} cancelled", item.id);
        }
        let content = state.contents.get(&item.id).cloned().unwrap_or_default();
        std::fs::write(dest, content)?;
        state.downloads.push(item.id.clone());
        Ok(())
    }

    fn mirrors_deletions(&self) -> bool {
        self.state.lock().mirrors
    }
}

/// Strategy walking a [`FakeRemote`] under the Dropbox schema
pub struct WalkingStrategy {
    pub remote: FakeRemote,
}

impl WalkingStrategy {
    pub fn new(remote: &FakeRemote) -> Self {
        Self {
            remote: remote.clone(),
        }
    }
}

impl Strategy for WalkingStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Dropbox
    }

    fn start_backup(&mut self, ctx: &mut Context, job: &BackupJob) -> Result<(), StrategyError> {
        walker::walk(ctx, job, &mut self.remote).map(|_| ())
    }
}

/// Mailer keeping every message instead of sending it
#[derive(Clone, Default)]
pub struct RecordingMailer {
    sent: Arc<Mutex<Vec<MailMessage>>>,
    fail: bool,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mailer whose every send fails
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<MailMessage> {
        self.sent.lock().clone()
    }
}

impl Mailer for RecordingMailer {
    fn send(&self, message: &MailMessage) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("connection refused");
        }
        self.sent.lock().push(message.clone());
        Ok(())
    }
}

/// Executor whose children die from the Ctrl+C they share with the run
///
/// Every command raises the interrupt, then fails the way a killed
/// `mysqldump` or `rsync` does. Lookups of programs go to the wrapped mock.
pub struct SignalledExecutor {
    inner: MockExecutor,
    interrupt: Interrupt,
}

impl SignalledExecutor {
    pub fn new(inner: MockExecutor, interrupt: &Interrupt) -> Self {
        Self {
            inner,
            interrupt: interrupt.clone(),
        }
    }

    fn killed(&self, command: &str) -> anyhow::Result<Output> {
        self.interrupt.trigger();
        anyhow::bail!("{} terminated by signal 2", command)
    }
}

impl CommandExecutor for SignalledExecutor {
    fn run_command(
        &self,
        program: &str,
        _args: &[&str],
        _working_dir: Option<&Path>,
        _timeout: Option<Duration>,
    ) -> anyhow::Result<Output> {
        self.killed(program)
    }

    fn run_shell_command(
        &self,
        command: &str,
        _working_dir: Option<&Path>,
        _timeout: Option<Duration>,
    ) -> anyhow::Result<Output> {
        self.killed(command)
    }

    fn program_available(&self, program: &str) -> bool {
        self.inner.program_available(program)
    }
}

/// Run `f` with a subscriber feeding `counter`
pub fn with_counter<T>(counter: &LogCounter, f: impl FnOnce() -> T) -> T {
    let subscriber = tracing_subscriber::registry().with(counter.layer());
    tracing::subscriber::with_default(subscriber, f)
}
