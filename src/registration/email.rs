//! Activation email rendering and delivery abstractions.
//!
//! Two templates drive the activation email:
//! `registration/activation_email_subject.txt` for the subject and
//! `registration/activation_email.txt` for the body. Both receive an
//! [`ActivationEmailContext`]. Rendered subjects are joined into a single
//! line before sending.
//!
//! The default sender for local dev is `LogEmailSender`, which logs and
//! returns `Ok(())`. `MemoryOutbox` keeps messages in memory for tests and
//! for embedding applications that deliver asynchronously.

use anyhow::{Result, anyhow};
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::info;

use super::session::Site;
use super::store::UserRecord;

pub const ACTIVATION_EMAIL_SUBJECT_TEMPLATE: &str = "registration/activation_email_subject.txt";
pub const ACTIVATION_EMAIL_BODY_TEMPLATE: &str = "registration/activation_email.txt";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub subject: String,
    pub body: String,
    pub from_email: String,
    pub to_email: String,
}

/// Email delivery abstraction.
pub trait EmailSender: Send + Sync {
    /// Deliver a message or return an error.
    fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Local dev sender that logs the message instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

impl EmailSender for LogEmailSender {
    fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            to_email = %message.to_email,
            from_email = %message.from_email,
            subject = %message.subject,
            body = %message.body,
            "activation email send stub"
        );
        Ok(())
    }
}

/// Collects sent messages in memory.
#[derive(Debug, Default)]
pub struct MemoryOutbox {
    messages: Mutex<Vec<EmailMessage>>,
}

impl MemoryOutbox {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn messages(&self) -> Vec<EmailMessage> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EmailSender for MemoryOutbox {
    fn send(&self, message: &EmailMessage) -> Result<()> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.clone());
        Ok(())
    }
}

/// Values available to activation email templates.
#[derive(Clone, Debug, Serialize)]
pub struct ActivationEmailContext {
    pub activation_key: String,
    pub activation_url: String,
    pub site: Site,
}

pub trait TemplateRenderer: Send + Sync {
    /// # Errors
    /// Unknown template names or rendering failures.
    fn render(&self, template: &str, context: &ActivationEmailContext) -> Result<String>;
}

/// Built-in plain-text activation templates.
#[derive(Clone, Copy, Debug, Default)]
pub struct BuiltinTemplates;

impl TemplateRenderer for BuiltinTemplates {
    fn render(&self, template: &str, context: &ActivationEmailContext) -> Result<String> {
        match template {
            ACTIVATION_EMAIL_SUBJECT_TEMPLATE => Ok(format!(
                "Finish setting up your {} account\n",
                context.site.name
            )),
            ACTIVATION_EMAIL_BODY_TEMPLATE => Ok(format!(
                "Thanks for signing up at {name}!\n\n\
                 You're already logged in. To choose a username and password, \
                 open this link:\n\n{url}\n\n\
                 Activation key: {key}\n\n-- \n{name} ({domain})\n",
                name = context.site.name,
                domain = context.site.domain,
                url = context.activation_url,
                key = context.activation_key,
            )),
            other => Err(anyhow!("unknown template: {other}")),
        }
    }
}

/// Line boundaries: CR, LF, VT, FF, the FS/GS/RS separators, NEL, U+2028, U+2029.
const fn is_line_break(c: char) -> bool {
    matches!(
        c,
        '\n' | '\r'
            | '\u{0b}'
            | '\u{0c}'
            | '\u{1c}'
            | '\u{1d}'
            | '\u{1e}'
            | '\u{85}'
            | '\u{2028}'
            | '\u{2029}'
    )
}

/// Build the frontend activation link included in outbound emails.
#[must_use]
pub fn build_activation_url(frontend_base_url: &str, activation_key: &str) -> String {
    let base = frontend_base_url.trim_end_matches('/');
    format!("{base}/activate/{activation_key}")
}

/// Renders and sends activation emails.
#[derive(Clone)]
pub struct ActivationMailer {
    sender: Arc<dyn EmailSender>,
    templates: Arc<dyn TemplateRenderer>,
    from_email: String,
    frontend_base_url: String,
}

impl ActivationMailer {
    #[must_use]
    pub fn new(
        sender: Arc<dyn EmailSender>,
        templates: Arc<dyn TemplateRenderer>,
        from_email: String,
        frontend_base_url: String,
    ) -> Self {
        Self {
            sender,
            templates,
            from_email,
            frontend_base_url,
        }
    }

    /// Render both templates for `user` and hand the message to the sender.
    ///
    /// # Errors
    /// Template or delivery failures.
    pub fn send_activation_email(
        &self,
        user: &UserRecord,
        site: &Site,
        activation_key: &str,
    ) -> Result<EmailMessage> {
        let context = ActivationEmailContext {
            activation_key: activation_key.to_string(),
            activation_url: build_activation_url(&self.frontend_base_url, activation_key),
            site: site.clone(),
        };

        let subject = self
            .templates
            .render(ACTIVATION_EMAIL_SUBJECT_TEMPLATE, &context)?;
        // Email subject must not contain newlines
        let subject: String = subject.chars().filter(|c| !is_line_break(*c)).collect();

        let body = self
            .templates
            .render(ACTIVATION_EMAIL_BODY_TEMPLATE, &context)?;

        let message = EmailMessage {
            subject,
            body,
            from_email: self.from_email.clone(),
            to_email: user.email.clone(),
        };
        self.sender.send(&message)?;
        Ok(message)
    }
}

impl std::fmt::Debug for ActivationMailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivationMailer")
            .field("from_email", &self.from_email)
            .field("frontend_base_url", &self.frontend_base_url)
            .finish_non_exhaustive()
    }
}
