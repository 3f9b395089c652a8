//! Outgoing mail
//!
//! Account activation and password reset messages are rendered from embedded
//! templates and handed to a [`Mailer`]. Delivery happens on a spawned task so
//! a slow or unreachable SMTP relay never holds up a request.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use once_cell::sync::Lazy;
use std::sync::Arc;
use tera::{Context as TeraContext, Tera};

use crate::config::MailConfig;
use crate::models::User;

pub const ACTIVATION_SUBJECT: &str = "Account Activation Request";
pub const RESET_SUBJECT: &str = "Password Reset Request";

const ACTIVATE_TEMPLATE: &str = r#"<p>Dear {{ username }},</p>
<p>Welcome to Educatia! To activate your account, visit the following link:</p>
<p><a href="{{ link | safe }}">{{ link | safe }}</a></p>
<p>The link expires in {{ minutes }} minutes. If you did not register, simply ignore this email.</p>
"#;

const RESET_TEMPLATE: &str = r#"<p>Dear {{ username }},</p>
<p>To reset your password, visit the following link:</p>
<p><a href="{{ link | safe }}">{{ link | safe }}</a></p>
<p>If you did not make this request then simply ignore this email and no changes will be made.</p>
"#;

static TEMPLATES: Lazy<Tera> = Lazy::new(|| {
    let mut tera = Tera::default();
    if let Err(e) = tera.add_raw_templates(vec![
        ("mail/activate_account.html", ACTIVATE_TEMPLATE),
        ("mail/reset_password.html", RESET_TEMPLATE),
    ]) {
        tracing::error!("Failed to load mail templates: {}", e);
    }
    tera
});

/// A rendered message ready for delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

/// Delivery backend
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: OutgoingMail) -> Result<()>;
}

/// Delivers through an SMTP relay
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn from_config(config: &MailConfig) -> Result<Self> {
        let host = config
            .server
            .as_deref()
            .ok_or_else(|| anyhow!("SMTP server not configured"))?;

        let builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .map_err(|e| anyhow!("Failed to create SMTP transport: {}", e))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
        };
        let mut builder = builder.port(config.port);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        let from = config
            .from_address()
            .parse::<Mailbox>()
            .map_err(|e| anyhow!("Invalid from address: {}", e))?;

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<()> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(mail
                .to
                .parse()
                .map_err(|e| anyhow!("Invalid to address: {}", e))?)
            .subject(mail.subject)
            .header(ContentType::TEXT_HTML)
            .body(mail.html_body)
            .map_err(|e| anyhow!("Failed to build email: {}", e))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| anyhow!("Failed to send email: {}", e))?;
        Ok(())
    }
}

/// Writes messages to the log. Used when no SMTP server is configured.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<()> {
        tracing::info!(to = %mail.to, subject = %mail.subject, "Mail not delivered (no SMTP server configured)\n{}", mail.html_body);
        Ok(())
    }
}

/// Pick the mailer for a configuration
pub fn mailer_from_config(config: &MailConfig) -> Result<Arc<dyn Mailer>> {
    if config.server.is_some() {
        Ok(Arc::new(SmtpMailer::from_config(config)?))
    } else {
        Ok(Arc::new(LogMailer))
    }
}

/// Renders account mails and dispatches them in the background
pub struct MailService {
    mailer: Arc<dyn Mailer>,
    public_url: String,
    token_minutes: i64,
}

impl MailService {
    pub fn new(mailer: Arc<dyn Mailer>, public_url: impl Into<String>, token_expiration_secs: i64) -> Self {
        Self {
            mailer,
            public_url: public_url.into().trim_end_matches('/').to_string(),
            token_minutes: token_expiration_secs / 60,
        }
    }

    pub fn activation_link(&self, token: &str) -> String {
        format!("{}/api/v1/auth/activate_account/{}", self.public_url, token)
    }

    pub fn reset_link(&self, token: &str) -> String {
        format!("{}/api/v1/auth/reset_password/{}", self.public_url, token)
    }

    pub fn render_activation(&self, user: &User, token: &str) -> Result<OutgoingMail> {
        self.render(
            user,
            ACTIVATION_SUBJECT,
            "mail/activate_account.html",
            &self.activation_link(token),
        )
    }

    pub fn render_reset(&self, user: &User, token: &str) -> Result<OutgoingMail> {
        self.render(
            user,
            RESET_SUBJECT,
            "mail/reset_password.html",
            &self.reset_link(token),
        )
    }

    /// Render and queue the activation mail
    pub fn send_activation(&self, user: &User, token: &str) -> Result<()> {
        let mail = self.render_activation(user, token)?;
        self.dispatch(mail);
        Ok(())
    }

    /// Render and queue the password reset mail
    pub fn send_reset(&self, user: &User, token: &str) -> Result<()> {
        let mail = self.render_reset(user, token)?;
        self.dispatch(mail);
        Ok(())
    }

    /// Deliver on a background task; failures are logged
    pub fn dispatch(&self, mail: OutgoingMail) -> tokio::task::JoinHandle<()> {
        let mailer = self.mailer.clone();
        tokio::spawn(async move {
            let to = mail.to.clone();
            if let Err(e) = mailer.send(mail).await {
                tracing::error!(to = %to, "Failed to deliver mail: {:#}", e);
            }
        })
    }

    fn render(&self, user: &User, subject: &str, template: &str, link: &str) -> Result<OutgoingMail> {
        let mut context = TeraContext::new();
        context.insert("username", &user.username);
        context.insert("link", link);
        context.insert("minutes", &self.token_minutes);

        let html_body = TEMPLATES
            .render(template, &context)
            .with_context(|| format!("Failed to render {}", template))?;

        Ok(OutgoingMail {
            to: user.email.clone(),
            subject: subject.to_string(),
            html_body,
        })
    }
}

/// Keeps every message in memory
#[cfg(test)]
#[derive(Default)]
pub struct RecordingMailer {
    sent: std::sync::Mutex<Vec<OutgoingMail>>,
}

#[cfg(test)]
impl RecordingMailer {
    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Wait until at least `count` messages arrived, or give up after a second
    pub async fn wait_for(&self, count: usize) -> Vec<OutgoingMail> {
        for _ in 0..100 {
            let sent = self.sent();
            if sent.len() >= count {
                return sent;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        self.sent()
    }
}

#[cfg(test)]
#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<()> {
        self.sent
            .lock()
            .map_err(|_| anyhow!("mailer lock poisoned"))?
            .push(mail);
        Ok(())
    }
}
