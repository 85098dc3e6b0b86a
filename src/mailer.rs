// src/mailer.rs
use crate::config::Config;
use crate::error::MailError;
use askama::Template;
use async_trait::async_trait;
use lettre::message::{Mailbox, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use parking_lot::Mutex;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError>;
}

fn mailbox(address: &str) -> Result<Mailbox, MailError> {
    address
        .parse::<Mailbox>()
        .map_err(|e| MailError::Address(format!("{}: {}", address, e)))
}

/// SMTPS relay (implicit TLS) with optional credentials.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn from_config(config: &Config) -> Result<Self, MailError> {
        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)?.port(config.smtp_port);
        if !config.smtp_username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.smtp_username.clone(),
                config.smtp_password.clone(),
            ));
        }
        Ok(SmtpMailer {
            transport: builder.build(),
            from: mailbox(&config.default_from_email)?,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        let email = Message::builder()
            .from(self.from.clone())
            .to(mailbox(&message.to)?)
            .subject(message.subject.clone())
            .header(ContentType::TEXT_HTML)
            .body(message.html_body.clone())?;
        self.transport.send(email).await?;
        Ok(())
    }
}

/// Keeps sent messages in memory; recipients marked as failing are rejected.
#[derive(Default)]
pub struct MemoryMailer {
    sent: Mutex<Vec<EmailMessage>>,
    failing: Mutex<HashSet<String>>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for(&self, address: &str) {
        self.failing.lock().insert(address.to_string());
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        if self.failing.lock().contains(&message.to) {
            return Err(MailError::Rejected(message.to.clone()));
        }
        tracing::debug!("Captured email to {}: {}", message.to, message.subject);
        self.sent.lock().push(message.clone());
        Ok(())
    }
}

#[derive(Template)]
#[template(path = "emails/course_update.html")]
struct CourseUpdateTemplate<'a> {
    greeting: &'a str,
    course_title: &'a str,
    site_name: &'a str,
}

/// Subject and HTML body of a course update notice.
pub fn course_update_email(
    site_name: &str,
    course_title: &str,
    recipient: &str,
    recipient_name: &str,
) -> Result<EmailMessage, MailError> {
    let greeting = if recipient_name.trim().is_empty() {
        recipient
    } else {
        recipient_name
    };
    let html_body = CourseUpdateTemplate {
        greeting,
        course_title,
        site_name,
    }
    .render()?;
    Ok(EmailMessage {
        to: recipient.to_string(),
        subject: format!("Course update: {}", course_title),
        html_body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_email_names_course_and_user() {
        let email =
            course_update_email("My Platform", "Rust <basics>", "u@example.com", "Ann").unwrap();
        assert_eq!(email.subject, "Course update: Rust <basics>");
        assert!(email.html_body.contains("Hello, Ann!"));
        assert!(email.html_body.contains("Rust &lt;basics&gt;"));
    }

    #[test]
    fn update_email_escapes_markup_in_names() {
        let email = course_update_email(
            "Site",
            "O'Reilly's <script>alert(1)</script>",
            "u@example.com",
            "Ann \"the <b>bold</b>\" O'Hara",
        )
        .unwrap();
        assert!(!email.html_body.contains("<script>"));
        assert!(!email.html_body.contains("<b>"));
        assert!(!email.html_body.contains("O'Reilly"));
        assert!(!email.html_body.contains("O'Hara"));
        assert!(email.html_body.contains("O&#x27;Reilly&#x27;s &lt;script&gt;"));
        assert!(email.html_body.contains("&quot;the &lt;b&gt;"));
    }

    #[test]
    fn greeting_falls_back_to_address() {
        let email = course_update_email("Site", "Go", "u@example.com", " ").unwrap();
        assert!(email.html_body.contains("Hello, u@example.com!"));
    }

    #[tokio::test]
    async fn memory_mailer_records_and_rejects() {
        let mailer = MemoryMailer::new();
        mailer.fail_for("bad@example.com");
        let ok = course_update_email("S", "C", "good@example.com", "").unwrap();
        let bad = course_update_email("S", "C", "bad@example.com", "").unwrap();

        assert!(mailer.send(&ok).await.is_ok());
        assert!(matches!(mailer.send(&bad).await, Err(MailError::Rejected(_))));
        assert_eq!(mailer.sent(), vec![ok]);
    }
}
