//! AMQP 0-9-1 broker channel backed by `lapin`.

use std::fmt;

use async_trait::async_trait;
use lapin::options::{BasicPublishOptions, ConfirmSelectOptions, ExchangeDeclareOptions};
use lapin::publisher_confirm::Confirmation;
use lapin::types::{AMQPValue, FieldTable, LongString, ShortString};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use tracing::info;

use super::broker::{BrokerChannel, BrokerMessage};
use crate::error::DeliveryError;

const PERSISTENT: u8 = 2;
const TRANSIENT: u8 = 1;
const REPLY_SUCCESS: u16 = 200;

fn broker_error(err: lapin::Error) -> DeliveryError {
    DeliveryError::Broker(err.to_string())
}

/// Maps the broker's answer to a confirmed publish onto a delivery result.
fn confirmation_result(confirmation: Confirmation) -> Result<(), DeliveryError> {
    match confirmation {
        Confirmation::Ack(None) => Ok(()),
        Confirmation::Ack(Some(returned)) => Err(DeliveryError::Broker(format!(
            "message returned by broker: {} {}",
            returned.reply_code,
            returned.reply_text.as_str()
        ))),
        Confirmation::Nack(_) => Err(DeliveryError::Broker("publish rejected by broker".to_string())),
        Confirmation::NotRequested => Err(DeliveryError::Broker(
            "publisher confirms are not enabled on this channel".to_string(),
        )),
    }
}

/// Channel over a live AMQP connection.
pub struct AmqpChannel {
    connection: Connection,
    channel: Channel,
}

impl fmt::Debug for AmqpChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AmqpChannel")
            .field("channel_id", &self.channel.id())
            .finish_non_exhaustive()
    }
}

impl AmqpChannel {
    /// Connects to `url` and opens one channel in publisher-confirm mode.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Broker`] if the connection or channel fails.
    pub async fn connect(url: &str) -> Result<Self, DeliveryError> {
        let connection = Connection::connect(url, ConnectionProperties::default())
            .await
            .map_err(broker_error)?;
        let channel = connection.create_channel().await.map_err(broker_error)?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(broker_error)?;
        info!(channel_id = channel.id(), "connected to AMQP broker");
        Ok(Self {
            connection,
            channel,
        })
    }
}

#[async_trait]
impl BrokerChannel for AmqpChannel {
    async fn declare_exchange(&self, exchange: &str) -> Result<(), DeliveryError> {
        self.channel
            .exchange_declare(
                exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..ExchangeDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(broker_error)
    }

    async fn publish(&self, message: BrokerMessage) -> Result<(), DeliveryError> {
        let mut headers = FieldTable::default();
        for (name, value) in message.headers {
            headers.insert(ShortString::from(name), AMQPValue::LongString(LongString::from(value)));
        }
        let properties = BasicProperties::default()
            .with_content_type(ShortString::from(message.content_type))
            .with_delivery_mode(if message.persistent { PERSISTENT } else { TRANSIENT })
            .with_headers(headers);

        let confirm = self
            .channel
            .basic_publish(
                &message.exchange,
                &message.routing_key,
                BasicPublishOptions::default(),
                &message.body,
                properties,
            )
            .await
            .map_err(broker_error)?;
        confirmation_result(confirm.await.map_err(broker_error)?)
    }

    async fn close(&self) -> Result<(), DeliveryError> {
        self.channel
            .close(REPLY_SUCCESS, "client closing")
            .await
            .map_err(broker_error)?;
        self.connection
            .close(REPLY_SUCCESS, "client closing")
            .await
            .map_err(broker_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ack_is_delivered() {
        assert!(confirmation_result(Confirmation::Ack(None)).is_ok());
    }

    #[test]
    fn test_nack_is_a_broker_error() {
        let err = confirmation_result(Confirmation::Nack(None)).unwrap_err();
        assert!(matches!(err, DeliveryError::Broker(ref reason) if reason.contains("rejected")));
    }

    #[test]
    fn test_unconfirmed_publish_is_an_error() {
        assert!(matches!(
            confirmation_result(Confirmation::NotRequested),
            Err(DeliveryError::Broker(_))
        ));
    }
}
