// Rust guideline compliant 2026-10-12

//! AMQP 0-9-1 adapter for the broker ports, built on `lapin`.
//!
//! Each [`AmqpConnector::open`] creates one connection with one channel in
//! publisher-confirm mode. Messages are published to the default exchange
//! with the queue name as routing key, as persistent JSON.

use domain::{BrokerChannel, BrokerError, Connector, Delivery};
use futures::StreamExt as _;
use futures::stream::BoxStream;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions, BasicQosOptions,
    ConfirmSelectOptions, QueueDeclareOptions,
};
use lapin::publisher_confirm::Confirmation;
use lapin::types::FieldTable;
use lapin::{BasicProperties, Connection, ConnectionProperties};

/// AMQP delivery mode for messages that survive a broker restart.
const PERSISTENT: u8 = 2;

fn map_error(error: lapin::Error) -> BrokerError {
    match error {
        lapin::Error::InvalidChannelState(_)
        | lapin::Error::InvalidConnectionState(_)
        | lapin::Error::IOError(_) => BrokerError::ChannelClosed,
        other => BrokerError::Protocol { reason: other.to_string() },
    }
}

// ----- Connector -----

/// Opens connections to the broker at `uri`.
#[derive(Debug, Clone)]
pub struct AmqpConnector {
    uri: String,
}

impl AmqpConnector {
    /// Create a connector for an `amqp://` URI.
    #[must_use]
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into() }
    }
}

impl Connector for AmqpConnector {
    type Channel = AmqpChannel;

    async fn open(&self) -> Result<AmqpChannel, BrokerError> {
        let connection = Connection::connect(&self.uri, ConnectionProperties::default())
            .await
            .map_err(|e| BrokerError::Connect { reason: e.to_string() })?;
        let channel = connection
            .create_channel()
            .await
            .map_err(|e| BrokerError::Connect { reason: e.to_string() })?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(map_error)?;
        Ok(AmqpChannel { connection, channel })
    }
}

// ----- Channel -----

/// One AMQP connection and its single channel.
#[derive(Debug)]
pub struct AmqpChannel {
    connection: Connection,
    channel: lapin::Channel,
}

impl BrokerChannel for AmqpChannel {
    type Delivery = AmqpDelivery;
    type Deliveries = BoxStream<'static, Result<AmqpDelivery, BrokerError>>;

    fn is_open(&self) -> bool {
        self.connection.status().connected() && self.channel.status().connected()
    }

    async fn declare_queue(&self, queue: &str) -> Result<(), BrokerError> {
        let options = QueueDeclareOptions { durable: true, ..QueueDeclareOptions::default() };
        self.channel
            .queue_declare(queue, options, FieldTable::default())
            .await
            .map_err(map_error)?;
        Ok(())
    }

    async fn set_prefetch(&self, count: u16) -> Result<(), BrokerError> {
        self.channel
            .basic_qos(count, BasicQosOptions::default())
            .await
            .map_err(map_error)
    }

    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<(), BrokerError> {
        let properties = BasicProperties::default()
            .with_delivery_mode(PERSISTENT)
            .with_content_type("application/json".into());
        let confirmation = self
            .channel
            .basic_publish("", queue, BasicPublishOptions::default(), payload, properties)
            .await
            .map_err(map_error)?
            .await
            .map_err(map_error)?;
        match confirmation {
            Confirmation::Nack(_) => Err(BrokerError::Protocol {
                reason: "broker refused the message".to_owned(),
            }),
            Confirmation::Ack(_) | Confirmation::NotRequested => Ok(()),
        }
    }

    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<Self::Deliveries, BrokerError> {
        let consumer = self
            .channel
            .basic_consume(queue, consumer_tag, BasicConsumeOptions::default(), FieldTable::default())
            .await
            .map_err(map_error)?;
        Ok(consumer
            .map(|next| next.map(|inner| AmqpDelivery { inner }).map_err(map_error))
            .boxed())
    }

    async fn close(&self) -> Result<(), BrokerError> {
        if self.channel.status().connected() {
            self.channel.close(200, "closing").await.map_err(map_error)?;
        }
        if self.connection.status().connected() {
            self.connection.close(200, "closing").await.map_err(map_error)?;
        }
        Ok(())
    }
}

// ----- Delivery -----

/// A message received on an [`AmqpChannel`].
#[derive(Debug)]
pub struct AmqpDelivery {
    inner: lapin::message::Delivery,
}

impl Delivery for AmqpDelivery {
    fn payload(&self) -> &[u8] {
        &self.inner.data
    }

    fn redelivered(&self) -> bool {
        self.inner.redelivered
    }

    async fn ack(&self) -> Result<(), BrokerError> {
        self.inner.acker.ack(BasicAckOptions::default()).await.map_err(map_error)
    }

    async fn requeue(&self) -> Result<(), BrokerError> {
        let options = BasicNackOptions { requeue: true, multiple: false };
        self.inner.acker.nack(options).await.map_err(map_error)
    }
}
