use secrecy::Secret;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,

    // Bearer tokens bound to each card
    pub jwt_secret: Secret<String>,
    pub token_expiration_minutes: i64,

    // At-rest encryption of card number / CVV
    pub encryption_key: Secret<String>,

    // RabbitMQ
    pub rabbitmq_host: String,
    pub rabbitmq_port: u16,
    pub rabbitmq_default_user: String,
    pub rabbitmq_default_pass: Secret<String>,
    pub card_exchange: String,
    pub approval_routing_key: String,
    pub approval_queue: String,

    // SMTP relay for the activation confirmation
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_user: String,
    pub smtp_pass: Secret<String>,
    pub smtp_from: String,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        // Load .env file if it exists (for local development)
        let _ = dotenvy::dotenv();

        let config = config::Config::builder()
            .add_source(config::Environment::default())
            .build()?;

        Ok(Self {
            database_url: config.get("database_url")?,
            host: config.get("host").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: config.get("port")?,

            jwt_secret: Secret::new(config.get("jwt_secret")?),
            token_expiration_minutes: config.get("token_expiration_minutes").unwrap_or(60),

            encryption_key: Secret::new(config.get("encryption_key")?),

            rabbitmq_host: config.get("rabbitmq_host")?,
            rabbitmq_port: config.get("rabbitmq_port").unwrap_or(5672),
            rabbitmq_default_user: config.get("rabbitmq_default_user")?,
            rabbitmq_default_pass: Secret::new(config.get("rabbitmq_default_pass")?),
            card_exchange: config
                .get("card_exchange")
                .unwrap_or_else(|_| "card_exchange".to_string()),
            approval_routing_key: config
                .get("approval_routing_key")
                .unwrap_or_else(|_| "approval_rk".to_string()),
            approval_queue: config
                .get("approval_queue")
                .unwrap_or_else(|_| "approval_queue".to_string()),

            smtp_host: config.get("smtp_host")?,
            smtp_port: config.get("smtp_port").unwrap_or(587),
            smtp_user: config.get("smtp_user")?,
            smtp_pass: Secret::new(config.get("smtp_pass")?),
            smtp_from: config.get("smtp_from")?,
        })
    }
}
