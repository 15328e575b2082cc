use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{Address, AsyncTransport, Tokio1Executor};

/// Sends one HTML email. The SMTP sender is the production implementation.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_html(&self, to: &str, subject: &str, html: &str) -> Result<()>;
}

pub struct EmailSender {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

/// Lower-cased, syntactically valid address, or `None`.
pub fn normalize_address(raw: &str) -> Option<String> {
    let email = raw.trim().to_lowercase();
    email.parse::<Address>().ok().map(|_| email)
}

impl EmailSender {
    /// `None` (with one warning) when SMTP settings are missing or invalid.
    pub fn from_env() -> Option<Self> {
        match Self::try_from_env() {
            Ok(s) => Some(s),
            Err(e) => {
                tracing::warn!(error = ?e, "SMTP not configured, email delivery disabled");
                None
            }
        }
    }

    fn try_from_env() -> Result<Self> {
        let host = std::env::var("SMTP_HOST").context("SMTP_HOST missing")?;
        let user = std::env::var("SMTP_USER").context("SMTP_USER missing")?;
        let pass = std::env::var("SMTP_PASS").context("SMTP_PASS missing")?;
        let from_addr = std::env::var("NEWSLETTER_FROM").context("NEWSLETTER_FROM missing")?;

        let creds = Credentials::new(user, pass);
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&host)
            .context("invalid SMTP_HOST")?
            .credentials(creds)
            .build();
        let from = from_addr.parse().context("invalid NEWSLETTER_FROM")?;

        Ok(Self { mailer, from })
    }
}

#[async_trait]
impl Mailer for EmailSender {
    async fn send_html(&self, to: &str, subject: &str, html: &str) -> Result<()> {
        let to: Mailbox = to.parse().with_context(|| format!("invalid recipient {to}"))?;
        let msg = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .header(header::ContentType::TEXT_HTML)
            .body(html.to_string())
            .context("build email")?;

        self.mailer.send(msg).await.context("send email")?;
        Ok(())
    }
}
