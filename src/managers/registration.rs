//! Interactive alias registration
//!
//! The `add` flow asks for an alias name, a backup type and a backup path,
//! then walks the type's schema field by field. Strategy overrides replace
//! prompts, and strategies with an extra setup step (OAuth consent) run it
//! last. The namespace is written to the config store in one go.

use anyhow::{Context, Result};
use dialoguer::{Confirm, Input, Password, Select};
use serde_json::{Map, Value};
use tracing::info;

use crate::config::{
    validate_alias_name, AppPaths, FieldType, GeneralConfig, JsonStore, Schema, StrategyKind,
    GENERAL_NAMESPACE,
};
use crate::strategies::build_strategy;

/// Source of answers for the add flow
pub trait Prompter {
    /// Free-text answer; a blank answer yields `default` when given
    fn input(&mut self, prompt: &str, default: Option<&str>) -> Result<String>;

    /// Hidden answer
    fn password(&mut self, prompt: &str) -> Result<String>;

    fn confirm(&mut self, prompt: &str, default: bool) -> Result<bool>;

    /// Index of the chosen item
    fn select(&mut self, prompt: &str, items: &[&str], default: usize) -> Result<usize>;

    /// Show information to the user
    fn message(&mut self, text: &str);
}

/// Terminal prompts
#[derive(Debug, Default)]
pub struct DialoguerPrompter;

impl Prompter for DialoguerPrompter {
    fn input(&mut self, prompt: &str, default: Option<&str>) -> Result<String> {
        let mut input = Input::<String>::new().with_prompt(prompt).allow_empty(true);
        if let Some(default) = default {
            input = input.default(default.to_string());
        }
        Ok(input.interact_text()?)
    }

    fn password(&mut self, prompt: &str) -> Result<String> {
        Ok(Password::new()
            .with_prompt(prompt)
            .allow_empty_password(true)
            .interact()?)
    }

    fn confirm(&mut self, prompt: &str, default: bool) -> Result<bool> {
        Ok(Confirm::new().with_prompt(prompt).default(default).interact()?)
    }

    fn select(&mut self, prompt: &str, items: &[&str], default: usize) -> Result<usize> {
        Ok(Select::new()
            .with_prompt(prompt)
            .items(items)
            .default(default)
            .interact()?)
    }

    fn message(&mut self, text: &str) {
        println!("{}", text);
    }
}

/// Scripted prompter for tests
/// Available for use in external test crates
pub mod mock {
    use super::*;
    use std::collections::VecDeque;

    /// Answers prompts from a fixed script, in order
    #[derive(Debug, Default)]
    pub struct ScriptedPrompter {
        answers: VecDeque<String>,
        /// Prompts and messages shown so far
        pub transcript: Vec<String>,
    }

    impl ScriptedPrompter {
        pub fn new<I, S>(answers: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            Self {
                answers: answers.into_iter().map(Into::into).collect(),
                transcript: Vec::new(),
            }
        }

        pub fn remaining(&self) -> usize {
            self.answers.len()
        }

        fn next(&mut self, prompt: &str) -> Result<String> {
            self.transcript.push(prompt.to_string());
            self.answers
                .pop_front()
                .with_context(|| format!("No scripted answer for '{}'", prompt))
        }
    }

    impl Prompter for ScriptedPrompter {
        fn input(&mut self, prompt: &str, default: Option<&str>) -> Result<String> {
            let answer = self.next(prompt)?;
            Ok(match default {
                Some(default) if answer.is_empty() => default.to_string(),
                _ => answer,
            })
        }

        fn password(&mut self, prompt: &str) -> Result<String> {
            self.next(prompt)
        }

        fn confirm(&mut self, prompt: &str, default: bool) -> Result<bool> {
            let answer = self.next(prompt)?;
            Ok(match answer.to_lowercase().as_str() {
                "" => default,
                "y" | "yes" => true,
                _ => false,
            })
        }

        /// Accepts an item label or an index
        fn select(&mut self, prompt: &str, items: &[&str], default: usize) -> Result<usize> {
            let answer = self.next(prompt)?;
            if answer.is_empty() {
                return Ok(default);
            }
            items
                .iter()
                .position(|item| item.eq_ignore_ascii_case(&answer))
                .or_else(|| answer.parse().ok().filter(|i| *i < items.len()))
                .with_context(|| format!("'{}' is not one of {:?}", answer, items))
        }

        fn message(&mut self, text: &str) {
            self.transcript.push(text.to_string());
        }
    }
}

/// Drives the `add` flow against the config store
pub struct RegistrationManager<'a> {
    config: &'a mut JsonStore,
    paths: &'a AppPaths,
}

impl<'a> RegistrationManager<'a> {
    pub fn new(config: &'a mut JsonStore, paths: &'a AppPaths) -> Self {
        Self { config, paths }
    }

    /// Register a new alias; returns its name
    pub fn add(&mut self, prompter: &mut dyn Prompter) -> Result<String> {
        let alias = self.ask_alias(prompter)?;

        let labels: Vec<&str> = StrategyKind::ALL.iter().map(|k| k.display_name()).collect();
        let kind = StrategyKind::ALL[prompter.select("Type", &labels, 0)?];
        let mut strategy = build_strategy(kind);

        let mut settings = Map::new();
        settings.insert("type".to_string(), Value::String(kind.tag().to_string()));

        let default_path = self.paths.default_backup_path(&alias);
        let backup_path = prompter.input("Backup path", Some(&default_path.to_string_lossy()))?;
        settings.insert("backup_path".to_string(), Value::String(backup_path));

        let overrides = strategy.overrides();
        let schema = Schema::for_kind(kind)?;

        for field in &schema.fields {
            if let Some(value) = overrides.get(&field.key) {
                settings.insert(field.key.clone(), value.clone());
                continue;
            }

            // Fields without a prompt are filled by the strategy's own setup
            let Some(prompt) = field.prompt.as_deref() else {
                continue;
            };
            let prompt = format!("{}{}", prompt, field.default_hint());

            loop {
                let answer = match field.field_type {
                    FieldType::Password => prompter.password(&prompt)?,
                    _ => prompter.input(&prompt, None)?,
                };
                match field.parse_answer(&answer) {
                    Ok(Some(value)) => {
                        settings.insert(field.key.clone(), value);
                        break;
                    }
                    Ok(None) => break,
                    Err(e) => prompter.message(&e.to_string()),
                }
            }
        }

        for (key, value) in overrides {
            settings.entry(key).or_insert(value);
        }

        strategy
            .configure(&alias, &mut settings, prompter)
            .with_context(|| format!("Failed to set up {}", alias))?;

        self.config.set_in(&[&alias], Value::Object(settings))?;
        info!("Added {} ({})", alias, kind.display_name());

        Ok(alias)
    }

    fn ask_alias(&self, prompter: &mut dyn Prompter) -> Result<String> {
        loop {
            let alias = prompter.input("Alias", None)?.trim().to_string();
            if let Err(e) = validate_alias_name(&alias) {
                prompter.message(&e.to_string());
                continue;
            }
            if self.config.get_in(&[&alias]).is_some() {
                prompter.message(&format!("Alias {} already exists", alias));
                continue;
            }
            return Ok(alias);
        }
    }

    /// Ask for mail credentials unless they are already stored
    ///
    /// Returns whether new credentials were saved.
    pub fn configure_mail(&mut self, prompter: &mut dyn Prompter) -> Result<bool> {
        let mut general: GeneralConfig = self
            .config
            .get_as(GENERAL_NAMESPACE)?
            .unwrap_or_default();

        if !general.mail_user.is_empty() {
            return Ok(false);
        }

        if !prompter.confirm("Send reports by mail?", true)? {
            return Ok(false);
        }

        general.mail_user = prompter.input("Mail address", None)?.trim().to_string();
        general.mail_pass = prompter.password("Mail password")?;
        let host = prompter.input("SMTP host", Some(&general.smtp_host))?;
        general.smtp_host = host.trim().to_string();

        self.config.set(GENERAL_NAMESPACE, &general)?;
        info!("Saved mail settings for {}", general.mail_user);
        Ok(true)
    }
}
