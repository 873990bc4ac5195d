//! Activation confirmation e-mail.
//!
//! Sent after the activation commit, so failures are never surfaced to the
//! caller: the send is attempted a fixed number of times and then abandoned
//! with a warning.

use std::time::Duration;

use async_trait::async_trait;
use lettre::{
    message::Mailbox,
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use secrecy::ExposeSecret;

use crate::config::Config;

const MAX_ATTEMPTS: u32 = 3;
const SMTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(thiserror::Error, Debug)]
pub enum MailerError {
    #[error("Invalid mailbox: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("Message build failed: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Sends the activation confirmation with bounded retries. An `Err`
    /// means every attempt failed.
    async fn send_activation_email(
        &self,
        recipient: &str,
        titular: &str,
    ) -> Result<(), MailerError>;
}

pub fn build_activation_email(
    from: &str,
    recipient: &str,
    titular: &str,
) -> Result<Message, MailerError> {
    let message = Message::builder()
        .from(from.parse::<Mailbox>()?)
        .to(recipient.parse::<Mailbox>()?)
        .subject("Cartão aprovado")
        .body(format!(
            "Olá, {titular}!\n\n\
             Seu cartão foi aprovado e já está ativo para uso.\n\n\
             Equipe de Cartões"
        ))?;

    Ok(message)
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpMailer {
    pub fn from_config(config: &Config) -> Self {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host)
            .port(config.smtp_port)
            .credentials(Credentials::new(
                config.smtp_user.clone(),
                config.smtp_pass.expose_secret().clone(),
            ))
            .timeout(Some(SMTP_TIMEOUT))
            .build();

        Self {
            transport,
            from: config.smtp_from.clone(),
        }
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_activation_email(
        &self,
        recipient: &str,
        titular: &str,
    ) -> Result<(), MailerError> {
        let message = build_activation_email(&self.from, recipient, titular)?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.transport.send(message.clone()).await {
                Ok(_) => {
                    tracing::info!(recipient, attempt, "Activation e-mail sent");
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(
                        recipient,
                        attempt,
                        error = %e,
                        "Activation e-mail attempt failed"
                    );
                    if attempt >= MAX_ATTEMPTS {
                        return Err(MailerError::Smtp(e));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_activation_email() {
        let message = build_activation_email(
            "cartoes@empresa.com.br",
            "JOAODASILVA@EMAIL.COM",
            "JOAO DA SILVA",
        )
        .unwrap();

        let rendered = String::from_utf8(message.formatted()).unwrap();
        assert!(rendered.contains("JOAO DA SILVA"));
        assert!(rendered.contains("ativo para uso"));
    }

    #[test]
    fn test_invalid_recipient_rejected() {
        let result = build_activation_email("cartoes@empresa.com.br", "not an address", "JOAO");
        assert!(matches!(result, Err(MailerError::Address(_))));
    }
}
