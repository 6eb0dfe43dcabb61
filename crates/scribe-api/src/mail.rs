//! Outgoing account mail. Delivery is behind the `Mailer` trait; the stock
//! implementation only logs.

use tracing::info;

#[derive(Debug, Clone)]
pub struct Email {
    pub from: Option<String>,
    pub to: String,
    pub subject: String,
    pub body: String,
}

pub trait Mailer: Send + Sync {
    fn send(&self, email: Email) -> anyhow::Result<()>;
}

/// Writes each message to the log instead of delivering it.
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send(&self, email: Email) -> anyhow::Result<()> {
        info!(
            from = email.from.as_deref().unwrap_or("-"),
            to = %email.to,
            subject = %email.subject,
            "Outgoing mail\n{}",
            email.body
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    Confirm,
    ChangeEmail,
    ResetPassword,
}

impl Template {
    pub fn subject(self) -> &'static str {
        match self {
            Self::Confirm => "Confirm Your Account",
            Self::ChangeEmail => "Confirm Your Email Address",
            Self::ResetPassword => "Reset Your Password",
        }
    }

    /// Route the emailed token is presented to.
    pub fn path(self) -> &'static str {
        match self {
            Self::Confirm | Self::ChangeEmail => "/auth/confirm/",
            Self::ResetPassword => "/auth/reset_password/",
        }
    }

    pub fn render(self, username: &str, link: &str) -> String {
        let action = match self {
            Self::Confirm => "To confirm your account please open the following link:",
            Self::ChangeEmail => "To confirm your new email address please open the following link:",
            Self::ResetPassword => "To reset your password please open the following link:",
        };
        format!(
            "Dear {username},\n\n{action}\n\n{link}\n\n\
             If you did not ask for this, you can ignore this message.\n"
        )
    }
}
