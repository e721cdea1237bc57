//! Fluent API for building test configurations
//!
//! Namespaces are plain JSON, the way the add flow stores them.

use account_backup::config::{AppPaths, JsonStore, GENERAL_NAMESPACE};
use serde_json::{json, Map, Value};
use std::path::Path;

/// Builder for config stores
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    namespaces: Map<String, Value>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a raw alias namespace
    pub fn alias(mut self, name: &str, namespace: Value) -> Self {
        self.namespaces.insert(name.to_string(), namespace);
        self
    }

    /// Add a MySQL alias dumping `db_name`
    pub fn mysql(self, name: &str, backup_path: &Path, db_name: &str, versions: u32) -> Self {
        self.alias(
            name,
            json!({
                "type": "mysql",
                "backup_path": backup_path,
                "db_host": "localhost",
                "db_port": 3306,
                "db_name": db_name,
                "db_user": "backup",
                "db_pass": "secret",
                "versions": versions,
            }),
        )
    }

    /// Add an alias valid for a tree-walking remote (Dropbox schema)
    pub fn remote(self, name: &str, backup_path: &Path) -> Self {
        self.remote_excluding(name, backup_path, &[])
    }

    pub fn remote_excluding(self, name: &str, backup_path: &Path, exclude: &[&str]) -> Self {
        self.alias(
            name,
            json!({
                "type": "dropbox",
                "backup_path": backup_path,
                "token": "test-token",
                "exclude": exclude,
            }),
        )
    }

    /// Add a WordPress alias
    pub fn wordpress(self, name: &str, backup_path: &Path, versions: u32) -> Self {
        self.alias(
            name,
            json!({
                "type": "wordpress",
                "backup_path": backup_path,
                "ssh_host": "example.com",
                "ssh_user": "deploy",
                "ssh_pass": "secret",
                "path": "/var/www/blog",
                "remote_zip": true,
                "archive": true,
                "exclude": [],
                "db_host": "localhost",
                "db_port": 3306,
                "db_name": "blog",
                "db_user": "wp",
                "db_pass": "secret",
                "versions": versions,
            }),
        )
    }

    /// Set mail credentials in the `general` namespace
    pub fn mail(self, user: &str, pass: &str, failure_only: bool) -> Self {
        self.alias(
            GENERAL_NAMESPACE,
            json!({
                "mail_user": user,
                "mail_pass": pass,
                "failure_only": failure_only,
            }),
        )
    }

    pub fn build(self) -> Map<String, Value> {
        self.namespaces
    }

    /// Write the namespaces to the config store under `paths`
    pub fn persist(self, paths: &AppPaths) -> JsonStore {
        let mut store = JsonStore::open(paths.config_file()).expect("Failed to open config");
        for (name, namespace) in self.namespaces {
            store
                .set_in(&[&name], namespace)
                .expect("Failed to write namespace");
        }
        store
    }
}
