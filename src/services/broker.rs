//! RabbitMQ publish/consume contract for the card approval workflow.
//!
//! Both sides open a fresh connection per call and close it before
//! returning; there is no pooling and no long-lived consumer. The service
//! layer depends on the [`Broker`] trait, so implementations are free to
//! pool connections internally without changing the contract.

use async_trait::async_trait;
use futures::StreamExt;
use lapin::{
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, ExchangeDeclareOptions,
        QueueDeclareOptions,
    },
    types::{AMQPValue, FieldTable},
    BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind,
};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Config;
use crate::models::Card;

pub const ACTION_SEND_CARD_TO_APPROVAL: &str = "send_card_to_approval";

/// Wire format shared by the approval-request publish and the
/// activation-confirmation consume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalMessage {
    pub action: String,
    pub data: ApprovalData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalData {
    pub uuid: Uuid,
    pub titular_cartao: String,
    pub cpf_titular: String,
    pub email: String,
}

impl ApprovalMessage {
    pub fn for_card(card: &Card) -> Self {
        Self {
            action: ACTION_SEND_CARD_TO_APPROVAL.to_string(),
            data: ApprovalData {
                uuid: card.uuid,
                titular_cartao: card.titular_cartao.clone(),
                cpf_titular: card.cpf_titular.clone(),
                email: card.email.clone(),
            },
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum BrokerError {
    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),

    #[error("Broker payload error: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Queue closed before a matching message arrived")]
    QueueClosed,
}

#[async_trait]
pub trait Broker: Send + Sync {
    /// Publishes a persistent message to a durable direct exchange.
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        message: &ApprovalMessage,
    ) -> Result<(), BrokerError>;

    /// Blocks until a message whose embedded card UUID matches arrives on
    /// the queue, acks it and returns it. Non-matching deliveries are left
    /// unacked and get requeued when the per-call connection closes.
    ///
    /// There is no built-in timeout: if the expected message never shows
    /// up this waits forever, so callers should impose an external
    /// deadline (e.g. `tokio::time::timeout`).
    async fn drain_until_match(
        &self,
        queue: &str,
        card_uuid: Uuid,
    ) -> Result<ApprovalMessage, BrokerError>;
}

pub struct RabbitBroker {
    uri: String,
}

impl RabbitBroker {
    pub fn from_config(config: &Config) -> Self {
        let uri = format!(
            "amqp://{}:{}@{}:{}",
            config.rabbitmq_default_user,
            config.rabbitmq_default_pass.expose_secret(),
            config.rabbitmq_host,
            config.rabbitmq_port,
        );

        Self { uri }
    }

    async fn connect(&self) -> Result<(Connection, Channel), BrokerError> {
        let connection = Connection::connect(&self.uri, ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;
        Ok((connection, channel))
    }
}

#[async_trait]
impl Broker for RabbitBroker {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        message: &ApprovalMessage,
    ) -> Result<(), BrokerError> {
        let (connection, channel) = self.connect().await?;

        channel
            .exchange_declare(
                exchange,
                ExchangeKind::Direct,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        let body = serde_json::to_vec(message)?;

        channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                &body,
                BasicProperties::default().with_delivery_mode(2),
            )
            .await?
            .await?;

        tracing::info!(
            exchange,
            routing_key,
            card_uuid = %message.data.uuid,
            "Approval request published"
        );

        connection.close(200, "done").await.ok();

        Ok(())
    }

    async fn drain_until_match(
        &self,
        queue: &str,
        card_uuid: Uuid,
    ) -> Result<ApprovalMessage, BrokerError> {
        let (connection, channel) = self.connect().await?;

        let mut arguments = FieldTable::default();
        arguments.insert(
            "x-overflow".into(),
            AMQPValue::LongString("reject-publish".into()),
        );

        channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                arguments,
            )
            .await?;

        let mut consumer = channel
            .basic_consume(
                queue,
                "cartoes_api_activation",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        while let Some(delivery) = consumer.next().await {
            let delivery = delivery?;

            match serde_json::from_slice::<ApprovalMessage>(&delivery.data) {
                Ok(message) if message.data.uuid == card_uuid => {
                    delivery.ack(BasicAckOptions::default()).await?;

                    tracing::info!(queue, card_uuid = %card_uuid, "Matched approval message");

                    connection.close(200, "done").await.ok();
                    return Ok(message);
                }
                Ok(_) => {
                    // not ours; requeued on disconnect
                }
                Err(e) => {
                    tracing::warn!(queue, error = %e, "Skipping malformed broker message");
                }
            }
        }

        connection.close(200, "done").await.ok();
        Err(BrokerError::QueueClosed)
    }
}
