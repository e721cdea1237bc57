//! Mail notification manager
//!
//! Sends the run report to the configured account's own address. Clean runs
//! stay silent unless `general.failure_only` is off or a processed alias asks
//! to always be reported.

use anyhow::{Context, Result};
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::config::GeneralConfig;
use crate::managers::backup::BatchSummary;

/// Fixed subject of every report
pub const SUBJECT: &str = "Backup My Accounts";

/// Outbound report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub html_body: String,
    pub attachments: Vec<PathBuf>,
}

/// Mail transport
#[cfg_attr(test, mockall::automock)]
pub trait Mailer {
    fn send(&self, message: &MailMessage) -> Result<()>;
}

/// SMTP transport with STARTTLS and credential login
pub struct SmtpMailer {
    host: String,
    port: u16,
    username: String,
    password: String,
}

impl SmtpMailer {
    pub fn new(general: &GeneralConfig) -> Self {
        Self {
            host: general.smtp_host.clone(),
            port: general.smtp_port,
            username: general.mail_user.clone(),
            password: general.mail_pass.clone(),
        }
    }
}

impl Mailer for SmtpMailer {
    fn send(&self, message: &MailMessage) -> Result<()> {
        let from: Mailbox = message
            .from
            .parse()
            .with_context(|| format!("Invalid sender address '{}'", message.from))?;

        let mut builder = Message::builder().from(from).subject(&message.subject);
        for recipient in &message.to {
            let to: Mailbox = recipient
                .parse()
                .with_context(|| format!("Invalid recipient address '{}'", recipient))?;
            builder = builder.to(to);
        }

        let mut body = MultiPart::mixed().singlepart(SinglePart::html(message.html_body.clone()));
        for path in &message.attachments {
            let content =
                fs::read(path).with_context(|| format!("Failed to read attachment {:?}", path))?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "attachment.log".to_string());
            body = body.singlepart(Attachment::new(name).body(content, ContentType::TEXT_PLAIN));
        }

        let email = builder.multipart(body).context("Failed to build mail")?;

        let transport = SmtpTransport::starttls_relay(&self.host)
            .with_context(|| format!("Failed to connect to {}", self.host))?
            .port(self.port)
            .credentials(Credentials::new(
                self.username.clone(),
                self.password.clone(),
            ))
            .build();

        transport.send(&email).context("Failed to send mail")?;
        debug!("Mail sent via {}:{}", self.host, self.port);
        Ok(())
    }
}

/// Decides whether and what to mail after a batch
pub struct NotificationManager {
    general: GeneralConfig,
    mailer: Box<dyn Mailer>,
}

impl NotificationManager {
    pub fn new(general: GeneralConfig, mailer: Box<dyn Mailer>) -> Self {
        Self { general, mailer }
    }

    /// Manager sending through SMTP with the `general` credentials
    pub fn smtp(general: GeneralConfig) -> Self {
        let mailer = SmtpMailer::new(&general);
        Self::new(general, Box::new(mailer))
    }

    /// Mail credentials present and the batch is worth reporting
    pub fn should_notify(&self, summary: &BatchSummary) -> bool {
        if !self.general.mail_configured() {
            return false;
        }

        !summary.total.is_clean()
            || !self.general.failure_only
            || summary.reports.iter().any(|report| report.notify_always)
    }

    /// Build the report for `summary`, attaching the run log when given
    pub fn build_message(&self, summary: &BatchSummary, log_file: Option<PathBuf>) -> MailMessage {
        let mut body = String::from("<h1>Backup complete</h1>");
        body.push_str(&format!("<p>{} Warning(s)</p>", summary.total.warnings));
        body.push_str(&format!("<p>{} Error(s)</p>", summary.total.errors));

        if !summary.reports.is_empty() {
            body.push_str("<table><tr><th>Alias</th><th>Warnings</th><th>Errors</th><th>Duration</th></tr>");
            for report in &summary.reports {
                body.push_str(&format!(
                    "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                    escape_html(&report.alias),
                    report.result.warnings,
                    report.result.errors,
                    format_duration(report.elapsed_secs)
                ));
            }
            body.push_str("</table>");
        }

        MailMessage {
            from: self.general.mail_user.clone(),
            to: vec![self.general.mail_user.clone()],
            subject: SUBJECT.to_string(),
            html_body: body,
            attachments: log_file.into_iter().filter(|p| p.exists()).collect(),
        }
    }

    /// Send the report if warranted; returns whether a mail went out
    ///
    /// Send failures are logged as warnings and never fail the run.
    pub fn notify(&self, summary: &BatchSummary, log_file: Option<PathBuf>) -> bool {
        if !self.should_notify(summary) {
            debug!("No notification needed");
            return false;
        }

        let message = self.build_message(summary, log_file);
        match self.mailer.send(&message) {
            Ok(()) => {
                info!("Sent report to {}", self.general.mail_user);
                true
            }
            Err(e) => {
                warn!("Failed to send report: {:#}", e);
                false
            }
        }
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Format duration in human-readable form
fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        let minutes = seconds / 60;
        let secs = seconds % 60;
        if secs == 0 {
            format!("{}m", minutes)
        } else {
            format!("{}m {}s", minutes, secs)
        }
    } else {
        let hours = seconds / 3600;
        let minutes = (seconds % 3600) / 60;
        if minutes == 0 {
            format!("{}h", hours)
        } else {
            format!("{}h {}m", hours, minutes)
        }
    }
}
