//! SMTP digest delivery.

use std::path::{Path, PathBuf};

use lettre::message::header::ContentType;
use lettre::message::{Attachment, Body, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::warn;

use super::{Notifier, NotifyError, Result};
use crate::config::AlertsConfig;
use crate::render::{Digest, render_html, render_plain_text};

/// Email channel: sends the digest to the internal recipients, and a
/// logo-free variant to the Teams channel inbound address when configured.
#[derive(Debug)]
pub struct EmailNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    sender: String,
    recipients: Vec<String>,
    teams_channel_email: Option<String>,
    logo_path: Option<PathBuf>,
}

impl EmailNotifier {
    /// Builds the channel from configuration. Port 465 uses implicit TLS;
    /// anything else negotiates STARTTLS.
    pub fn from_config(config: &AlertsConfig) -> Result<Self> {
        let smtp = &config.smtp;
        let builder = if smtp.port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&smtp.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.host)
        }
        .map_err(|e| NotifyError::Email(e.to_string()))?;

        let transport = builder
            .port(smtp.port)
            .credentials(Credentials::new(smtp.user.clone(), smtp.pass.clone()))
            .build();

        Ok(EmailNotifier {
            transport,
            sender: smtp.user.clone(),
            recipients: config.recipients.clone(),
            teams_channel_email: config.teams_channel_email.clone(),
            logo_path: config.logo_path.clone(),
        })
    }

    /// Reads the configured logo, or `None` when unset or unreadable. A
    /// missing logo downgrades the email rather than failing the channel.
    async fn load_logo(&self) -> Option<(Body, ContentType)> {
        let path = self.logo_path.as_deref()?;
        let content_type = image_content_type(path)?;
        match tokio::fs::read(path).await {
            Ok(bytes) => Some((Body::new(bytes), content_type)),
            Err(error) => {
                warn!(path = %path.display(), %error, "logo unreadable, sending without it");
                None
            }
        }
    }

    async fn send_digest(
        &self,
        digest: &Digest,
        recipients: &[String],
        logo: Option<(Body, ContentType)>,
    ) -> Result<()> {
        let sender: Mailbox = self
            .sender
            .parse()
            .map_err(|_| NotifyError::Email(format!("invalid sender address '{}'", self.sender)))?;

        let mut builder = Message::builder().from(sender).subject(digest.subject());
        for recipient in recipients {
            let to: Mailbox = recipient.parse().map_err(|_| {
                NotifyError::Email(format!("invalid recipient address '{recipient}'"))
            })?;
            builder = builder.to(to);
        }

        let plain = render_plain_text(digest);
        let html = render_html(digest, logo.is_some());

        let body = match logo {
            Some((logo_body, content_type)) => MultiPart::alternative()
                .singlepart(
                    SinglePart::builder()
                        .header(ContentType::TEXT_PLAIN)
                        .body(plain),
                )
                .multipart(
                    MultiPart::related()
                        .singlepart(
                            SinglePart::builder()
                                .header(ContentType::TEXT_HTML)
                                .body(html),
                        )
                        .singlepart(
                            Attachment::new_inline("company_logo".to_string())
                                .body(logo_body, content_type),
                        ),
                ),
            None => MultiPart::alternative_plain_html(plain, html),
        };

        let message = builder
            .multipart(body)
            .map_err(|e| NotifyError::Email(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| NotifyError::Email(e.to_string()))?;
        Ok(())
    }
}

impl Notifier for EmailNotifier {
    fn name(&self) -> &str {
        "email"
    }

    /// Sends the internal digest; the outcome of that send is the channel's
    /// outcome. The Teams channel inbound copy is best-effort: a failure
    /// there is logged and does not fail the channel.
    async fn deliver(&self, digest: &Digest) -> Result<()> {
        if self.recipients.is_empty() {
            return Err(NotifyError::Email("no recipients configured".to_string()));
        }

        let logo = self.load_logo().await;
        self.send_digest(digest, &self.recipients, logo).await?;

        if let Some(address) = &self.teams_channel_email {
            let to = std::slice::from_ref(address);
            if let Err(error) = self.send_digest(digest, to, None).await {
                warn!(%address, %error, "teams channel email copy failed");
            }
        }
        Ok(())
    }
}

/// Content type for the inline logo, by file extension.
fn image_content_type(path: &Path) -> Option<ContentType> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        _ => return None,
    };
    ContentType::parse(mime).ok()
}
