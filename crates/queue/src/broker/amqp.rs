//! AMQP 0-9-1 transport (RabbitMQ) over `lapin`.

use async_trait::async_trait;
use futures::StreamExt;
use lapin::acker::Acker;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
    BasicRejectOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};

use super::transport::{
    BrokerError, BrokerResult, BrokerTransport, DeliveryAcker, OutgoingMessage, RawDelivery,
    RawDeliveryStream, Topology,
};

/// Persistent delivery mode.
const DELIVERY_MODE_PERSISTENT: u8 = 2;

/// Unacknowledged deliveries a consumer may hold at once.
const PREFETCH: u16 = 1;

pub struct AmqpTransport {
    // Kept so the connection lives as long as the channel.
    _connection: Connection,
    channel: Channel,
}

impl AmqpTransport {
    pub async fn connect(url: &str) -> BrokerResult<Self> {
        let connection = Connection::connect(url, ConnectionProperties::default())
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;
        let channel = connection
            .create_channel()
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;

        tracing::info!("Connected to AMQP broker");
        Ok(Self {
            _connection: connection,
            channel,
        })
    }
}

#[async_trait]
impl BrokerTransport for AmqpTransport {
    async fn declare(&self, topology: &Topology) -> BrokerResult<()> {
        let durable_exchange = ExchangeDeclareOptions {
            durable: true,
            ..Default::default()
        };
        let durable_queue = QueueDeclareOptions {
            durable: true,
            ..Default::default()
        };
        let declare_err = |e: lapin::Error| BrokerError::Declare(e.to_string());

        // Dead-letter side first so the main queue's arguments point at
        // something that exists.
        self.channel
            .exchange_declare(
                &topology.dead_letter_exchange,
                ExchangeKind::Direct,
                durable_exchange,
                FieldTable::default(),
            )
            .await
            .map_err(declare_err)?;
        self.channel
            .queue_declare(&topology.dead_letter_queue, durable_queue, FieldTable::default())
            .await
            .map_err(declare_err)?;
        self.channel
            .queue_bind(
                &topology.dead_letter_queue,
                &topology.dead_letter_exchange,
                &topology.dead_letter_routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(declare_err)?;

        self.channel
            .exchange_declare(
                &topology.exchange,
                ExchangeKind::Direct,
                durable_exchange,
                FieldTable::default(),
            )
            .await
            .map_err(declare_err)?;

        let mut arguments = FieldTable::default();
        arguments.insert(
            "x-dead-letter-exchange".into(),
            AMQPValue::LongString(topology.dead_letter_exchange.clone().into()),
        );
        arguments.insert(
            "x-dead-letter-routing-key".into(),
            AMQPValue::LongString(topology.dead_letter_routing_key.clone().into()),
        );
        self.channel
            .queue_declare(&topology.queue, durable_queue, arguments)
            .await
            .map_err(declare_err)?;
        self.channel
            .queue_bind(
                &topology.queue,
                &topology.exchange,
                &topology.routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(declare_err)?;

        tracing::info!(
            exchange = %topology.exchange,
            queue = %topology.queue,
            dead_letter_exchange = %topology.dead_letter_exchange,
            "Declared broker topology",
        );
        Ok(())
    }

    async fn publish(&self, message: OutgoingMessage) -> BrokerResult<()> {
        let mut properties = BasicProperties::default()
            .with_content_type(message.content_type.as_str().into())
            .with_message_id(message.message_id.as_str().into());
        if message.persistent {
            properties = properties.with_delivery_mode(DELIVERY_MODE_PERSISTENT);
        }

        self.channel
            .basic_publish(
                &message.exchange,
                &message.routing_key,
                BasicPublishOptions::default(),
                &message.body,
                properties,
            )
            .await
            .map_err(|e| BrokerError::Publish(e.to_string()))?
            .await
            .map_err(|e| BrokerError::Publish(e.to_string()))?;
        Ok(())
    }

    async fn consume(&self, queue: &str, consumer_tag: &str) -> BrokerResult<RawDeliveryStream> {
        self.channel
            .basic_qos(PREFETCH, BasicQosOptions::default())
            .await
            .map_err(|e| BrokerError::Consume(e.to_string()))?;

        let consumer = self
            .channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::Consume(e.to_string()))?;

        let stream = consumer.map(|item| {
            item.map(|delivery| RawDelivery {
                message_id: delivery
                    .properties
                    .message_id()
                    .as_ref()
                    .map(|id| id.as_str().to_string()),
                body: delivery.data,
                redelivered: delivery.redelivered,
                acker: Box::new(AmqpAcker(delivery.acker)),
            })
            .map_err(|e| BrokerError::Consume(e.to_string()))
        });
        Ok(stream.boxed())
    }
}

struct AmqpAcker(Acker);

#[async_trait]
impl DeliveryAcker for AmqpAcker {
    async fn ack(&self) -> BrokerResult<()> {
        self.0
            .ack(BasicAckOptions::default())
            .await
            .map(|_| ())
            .map_err(|e| BrokerError::Ack(e.to_string()))
    }

    async fn reject(&self) -> BrokerResult<()> {
        self.0
            .reject(BasicRejectOptions { requeue: false })
            .await
            .map(|_| ())
            .map_err(|e| BrokerError::Ack(e.to_string()))
    }
}
