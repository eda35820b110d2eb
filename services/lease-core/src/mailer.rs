use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::models::{Lead, LeaseAbstract};

pub const DEFAULT_RESEND_API_BASE: &str = "https://api.resend.com";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), String>;
}

/// Transactional email through the Resend HTTP API.
pub struct ResendMailer {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
}

impl ResendMailer {
    pub fn new(api_base: &str, api_key: String, timeout: Duration) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| format!("build mail client failed: {err}"))?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), String> {
        let response = self
            .client
            .post(format!("{}/emails", self.api_base))
            .bearer_auth(&self.api_key)
            .json(message)
            .send()
            .await
            .map_err(|err| format!("send email failed: {err}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("email provider returned {status}: {body}"));
        }
        tracing::info!(to = ?message.to, subject = message.subject.as_str(), "email sent");
        Ok(())
    }
}

/// Writes messages to the log instead of sending them; keeps a copy of each.
#[derive(Default)]
pub struct LogMailer {
    sent: Mutex<Vec<EmailMessage>>,
}

impl LogMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), String> {
        tracing::info!(
            to = ?message.to,
            subject = message.subject.as_str(),
            "email delivery disabled, message logged"
        );
        self.sent.lock().await.push(message.clone());
        Ok(())
    }
}

pub fn report_ready_email(
    from: &str,
    to: &str,
    audit_id: &str,
    lease: &LeaseAbstract,
    download_url: &str,
    ttl_secs: u64,
) -> EmailMessage {
    let tenant = lease
        .tenant_name
        .as_deref()
        .map(|tenant| format!(" for {}", escape_html(tenant)))
        .unwrap_or_default();
    let html = format!(
        "<p>Your CAM/NNN lease audit{tenant} is ready.</p>\
<p><a href=\"{url}\">Download your lease abstract (PDF)</a></p>\
<p>This link expires in {window}. You can request a fresh link from your audit page at any time.</p>\
<p style=\"color:#666;font-size:12px\">Audit reference: {id}</p>",
        url = escape_html(download_url),
        window = describe_window(ttl_secs),
        id = escape_html(audit_id),
    );
    EmailMessage {
        from: from.to_string(),
        to: vec![to.to_string()],
        subject: "Your lease audit is ready".to_string(),
        html,
    }
}

pub fn lead_notification_email(from: &str, to: &str, lead: &Lead) -> EmailMessage {
    let optional = |value: &Option<String>| {
        value
            .as_deref()
            .map(escape_html)
            .unwrap_or_else(|| "-".to_string())
    };
    let html = format!(
        "<p>New lead from the website.</p><ul>\
<li>Email: {email}</li><li>Name: {name}</li><li>Company: {company}</li>\
<li>Source: {source}</li></ul><p>{message}</p>",
        email = escape_html(&lead.email),
        name = optional(&lead.name),
        company = optional(&lead.company),
        source = optional(&lead.source),
        message = optional(&lead.message),
    );
    EmailMessage {
        from: from.to_string(),
        to: vec![to.to_string()],
        subject: format!("New lead: {}", lead.email),
        html,
    }
}

fn describe_window(ttl_secs: u64) -> String {
    match ttl_secs {
        secs if secs >= 86_400 && secs % 86_400 == 0 => plural(secs / 86_400, "day"),
        secs if secs >= 3_600 && secs % 3_600 == 0 => plural(secs / 3_600, "hour"),
        secs => plural(secs.div_ceil(60).max(1), "minute"),
    }
}

fn plural(count: u64, unit: &str) -> String {
    if count == 1 {
        format!("1 {unit}")
    } else {
        format!("{count} {unit}s")
    }
}

pub fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}
