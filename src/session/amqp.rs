//! RabbitMQ session over a single lapin channel.

use super::BrokerSession;
use crate::config::BrokerConfig;
use crate::error::MoverError;
use crate::message::{Message, Publication};
use async_trait::async_trait;
use lapin::{
    message::Delivery,
    options::{
        BasicAckOptions, BasicGetOptions, BasicNackOptions, BasicPublishOptions,
        ConfirmSelectOptions,
    },
    publisher_confirm::Confirmation,
    BasicProperties, Channel, Connection, ConnectionProperties,
};

/// Messages are republished through the default exchange, which routes by queue name.
const DEFAULT_EXCHANGE: &str = "";

/// A connection and one channel to a RabbitMQ broker.
pub struct AmqpSession {
    connection: Connection,
    channel: Channel,
    confirms: bool,
}

impl AmqpSession {
    /// Connects to the broker and opens the channel used for the whole run.
    pub async fn connect(config: &BrokerConfig) -> Result<Self, MoverError> {
        log::info!("Connecting to RabbitMQ at {}...", config.redacted_url());

        let connection = Connection::connect(&config.url, ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;

        if config.publisher_confirms {
            channel.confirm_select(ConfirmSelectOptions::default()).await?;
            log::info!("Publisher confirms enabled on channel {}", channel.id());
        }

        Ok(Self {
            connection,
            channel,
            confirms: config.publisher_confirms,
        })
    }

    /// Closes the channel and then the connection.
    ///
    /// Any message still reserved by this channel is redelivered by the broker.
    pub async fn close(self) -> Result<(), MoverError> {
        self.channel.close(200, "OK").await?;
        self.connection.close(200, "OK").await?;
        Ok(())
    }

    fn properties_for(publication: &Publication) -> BasicProperties {
        let mut properties = BasicProperties::default();
        if let Some(ref content_type) = publication.content_type {
            properties = properties.with_content_type(content_type.as_str().into());
        }
        if let Some(ref headers) = publication.headers {
            properties = properties.with_headers(headers.clone());
        }
        properties
    }
}

fn message_from_delivery(delivery: Delivery) -> Message {
    let content_type = delivery
        .properties
        .content_type()
        .as_ref()
        .map(|ct| ct.to_string());
    let headers = delivery.properties.headers().clone().unwrap_or_default();

    Message {
        delivery_tag: delivery.delivery_tag,
        redelivered: delivery.redelivered,
        content_type,
        headers,
        body: delivery.data,
    }
}

#[async_trait]
impl BrokerSession for AmqpSession {
    async fn try_pull(&self, queue: &str, no_ack: bool) -> Result<Option<Message>, MoverError> {
        let pulled = self
            .channel
            .basic_get(queue, BasicGetOptions { no_ack })
            .await?;

        Ok(pulled.map(|get| {
            log::debug!(
                "Pulled message {} from '{}', {} more waiting",
                get.delivery.delivery_tag,
                queue,
                get.message_count
            );
            message_from_delivery(get.delivery)
        }))
    }

    async fn publish(&self, publication: &Publication) -> Result<(), MoverError> {
        let confirmation = self
            .channel
            .basic_publish(
                DEFAULT_EXCHANGE,
                &publication.queue,
                BasicPublishOptions::default(),
                &publication.body,
                Self::properties_for(publication),
            )
            .await?
            .await?;

        if self.confirms && confirmation.is_nack() {
            return Err(MoverError::PublishRejected {
                queue: publication.queue.clone(),
            });
        }
        if let Confirmation::Ack(Some(returned)) = confirmation {
            log::warn!(
                "Broker returned message published to '{}': {}",
                publication.queue,
                returned.reply_text
            );
        }
        Ok(())
    }

    async fn ack(&self, message: &Message) -> Result<(), MoverError> {
        self.channel
            .basic_ack(message.delivery_tag, BasicAckOptions::default())
            .await?;
        Ok(())
    }

    async fn nack(&self, message: &Message, requeue: bool) -> Result<(), MoverError> {
        self.channel
            .basic_nack(
                message.delivery_tag,
                BasicNackOptions { requeue, ..Default::default() },
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lapin::types::{AMQPValue, FieldTable};

    #[test]
    fn test_properties_carry_content_type_and_headers() {
        let mut headers = FieldTable::default();
        headers.insert("enqueue.topic".into(), AMQPValue::LongString("C".into()));
        let publication = Publication {
            queue: "C".to_string(),
            content_type: Some("application/json".to_string()),
            headers: Some(headers.clone()),
            body: b"{}".to_vec(),
        };

        let properties = AmqpSession::properties_for(&publication);
        assert_eq!(
            properties.content_type().as_ref().map(|ct| ct.as_str()),
            Some("application/json")
        );
        assert_eq!(properties.headers().as_ref(), Some(&headers));
    }

    #[test]
    fn test_properties_without_metadata_are_empty() {
        let publication = Publication {
            queue: "B".to_string(),
            content_type: None,
            headers: None,
            body: Vec::new(),
        };

        let properties = AmqpSession::properties_for(&publication);
        assert!(properties.content_type().is_none());
        assert!(properties.headers().is_none());
    }
}
