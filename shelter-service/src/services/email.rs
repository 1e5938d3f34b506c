use async_trait::async_trait;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials, Message,
    SmtpTransport, Transport,
};
use service_core::error::AppError;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Mutex,
};
use std::time::Duration;

use crate::config::SmtpConfig;

#[async_trait]
pub trait EmailProvider: Send + Sync {
    async fn send_invitation_email(
        &self,
        to_email: &str,
        invitation_token: &str,
        base_url: &str,
    ) -> Result<(), AppError>;

    async fn send_password_reset_email(
        &self,
        to_email: &str,
        reset_token: &str,
        base_url: &str,
    ) -> Result<(), AppError>;

    async fn send_welcome_email(&self, to_email: &str, login_url: &str) -> Result<(), AppError>;
}

#[derive(Clone)]
pub struct EmailService {
    mailer: SmtpTransport,
    from_email: String,
}

impl EmailService {
    pub fn new(config: &SmtpConfig) -> Result<Self, AppError> {
        let mailer = if config.user.is_empty() {
            // Unauthenticated local relay (mailpit, mailhog).
            SmtpTransport::builder_dangerous(&config.host)
                .port(config.port)
                .timeout(Some(Duration::from_secs(10)))
                .build()
        } else {
            let creds = Credentials::new(config.user.clone(), config.password.clone());
            SmtpTransport::starttls_relay(&config.host)
                .map_err(|e| AppError::InternalError(anyhow::anyhow!(e.to_string())))?
                .credentials(creds)
                .port(config.port)
                .timeout(Some(Duration::from_secs(10)))
                .build()
        };

        tracing::info!(host = %config.host, port = config.port, "Email service initialized");

        Ok(Self {
            mailer,
            from_email: config.mail_from.clone(),
        })
    }

    async fn send_email(
        &self,
        to_email: &str,
        subject: &str,
        plain_body: String,
        html_body: String,
    ) -> Result<(), AppError> {
        let address_error =
            |e: lettre::address::AddressError| AppError::EmailError(format!("Invalid address: {}", e));

        let email = Message::builder()
            .from(self.from_email.parse().map_err(address_error)?)
            .to(to_email.parse().map_err(address_error)?)
            .subject(subject)
            .multipart(
                lettre::message::MultiPart::alternative()
                    .singlepart(
                        lettre::message::SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(plain_body),
                    )
                    .singlepart(
                        lettre::message::SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body),
                    ),
            )
            .map_err(|e| AppError::InternalError(e.into()))?;

        // SmtpTransport is blocking.
        let mailer = self.mailer.clone();
        let result = tokio::task::spawn_blocking(move || mailer.send(&email))
            .await
            .map_err(|e| AppError::InternalError(e.into()))?;

        match result {
            Ok(_) => {
                tracing::info!(to = %to_email, subject = %subject, "Email sent");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, to = %to_email, "Failed to send email");
                Err(AppError::EmailError(e.to_string()))
            }
        }
    }
}

fn action_email(title: &str, intro: &str, link: &str, label: &str, footer: &str) -> (String, String) {
    let html = format!(
        r#"<html>
    <body style="font-family: Arial, sans-serif;">
        <h2>{title}</h2>
        <p>{intro}</p>
        <p><a href="{link}" style="background-color: #2e7d32; color: white; padding: 12px 18px; text-decoration: none; border-radius: 4px;">{label}</a></p>
        <p style="color: #666; font-size: 12px;">{footer}</p>
    </body>
</html>"#
    );
    let plain = format!("{title}\n\n{intro}\n\n{link}\n\n{footer}");
    (plain, html)
}

#[async_trait]
impl EmailProvider for EmailService {
    async fn send_invitation_email(
        &self,
        to_email: &str,
        invitation_token: &str,
        base_url: &str,
    ) -> Result<(), AppError> {
        let link = format!("{}?token={}", base_url, invitation_token);
        let (plain, html) = action_email(
            "You have been invited to the shelter team",
            "Follow the link below to create your account.",
            &link,
            "Create account",
            "If you were not expecting this invitation, you can ignore this email.",
        );
        self.send_email(to_email, "Shelter team invitation", plain, html)
            .await
    }

    async fn send_password_reset_email(
        &self,
        to_email: &str,
        reset_token: &str,
        base_url: &str,
    ) -> Result<(), AppError> {
        let link = format!("{}?token={}", base_url, reset_token);
        let (plain, html) = action_email(
            "Password reset request",
            "We received a request to reset your password. Follow the link below to set a new one.",
            &link,
            "Reset password",
            "If you didn't request this, please ignore this email.",
        );
        self.send_email(to_email, "Reset your password", plain, html)
            .await
    }

    async fn send_welcome_email(&self, to_email: &str, login_url: &str) -> Result<(), AppError> {
        let (plain, html) = action_email(
            "Welcome aboard",
            "Your account is ready. You can sign in now.",
            login_url,
            "Sign in",
            "Thank you for helping the animals.",
        );
        self.send_email(to_email, "Welcome to the shelter", plain, html)
            .await
    }
}

/// Mail captured by [`MockEmailService`].
#[derive(Debug, Clone, PartialEq)]
pub struct SentEmail {
    pub kind: &'static str,
    pub to: String,
    pub token: Option<String>,
}

/// Records mails instead of sending them. A failing instance rejects every send.
#[derive(Default)]
pub struct MockEmailService {
    sent: Mutex<Vec<SentEmail>>,
    failing: AtomicBool,
}

impl MockEmailService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let mock = Self::default();
        mock.set_failing(true);
        mock
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn last_token(&self, kind: &str) -> Option<String> {
        self.sent()
            .into_iter()
            .rev()
            .find(|m| m.kind == kind)
            .and_then(|m| m.token)
    }

    fn record(&self, kind: &'static str, to: &str, token: Option<&str>) -> Result<(), AppError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::EmailError("mock mailer is failing".to_string()));
        }
        self.sent
            .lock()
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Mock mailer mutex poisoned: {}", e)))?
            .push(SentEmail {
                kind,
                to: to.to_string(),
                token: token.map(str::to_string),
            });
        Ok(())
    }
}

#[async_trait]
impl EmailProvider for MockEmailService {
    async fn send_invitation_email(
        &self,
        to_email: &str,
        invitation_token: &str,
        _base_url: &str,
    ) -> Result<(), AppError> {
        self.record("invitation", to_email, Some(invitation_token))
    }

    async fn send_password_reset_email(
        &self,
        to_email: &str,
        reset_token: &str,
        _base_url: &str,
    ) -> Result<(), AppError> {
        self.record("reset", to_email, Some(reset_token))
    }

    async fn send_welcome_email(&self, to_email: &str, _login_url: &str) -> Result<(), AppError> {
        self.record("welcome", to_email, None)
    }
}
