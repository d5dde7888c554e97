//! RabbitMQ Broker Client
//!
//! Owns exactly one connection + channel pair and survives broker restarts
//! without dropping queued publishes or silently stopping consumption.
//!
//! Topology: a durable `x-delayed-message` exchange in front of the durable
//! task queue. Each message carries its own `x-delay` header (milliseconds)
//! and is released to its routing key only after that delay elapses, so
//! items with different delays share one exchange/queue pair.
//!
//! Concurrency discipline: all publish paths and the reconnect routine share
//! the pair mutex (publishes serialize against reconnection). Whether a
//! reconnect is already running is a separate atomic flag, compare-and-swap
//! guarded; at most one reconnect attempt runs at a time, losers back off.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{
    BasicConsumeOptions, BasicPublishOptions, ExchangeDeclareOptions, QueueBindOptions,
    QueueDeclareOptions,
};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use tokio::sync::{mpsc, Mutex};
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use armada_core::application::constants::{
    DELAYED_EXCHANGE, INSTANT_QUEUE, RESULT_QUEUE, TASK_QUEUE,
};
use armada_core::error::{AppError, Result};
use armada_core::port::Broker;

use crate::config::AmqpConfig;

/// Buffer between the consume loop and the caller's receiver.
const DELIVERY_BUFFER: usize = 64;

fn map_amqp_error(err: lapin::Error) -> AppError {
    AppError::Broker(err.to_string())
}

struct ChannelPair {
    connection: Connection,
    channel: Channel,
}

struct BrokerInner {
    config: AmqpConfig,
    /// Publish lock; also held for the duration of a publish-path reconnect.
    pair: Mutex<ChannelPair>,
    /// Single-flight guard for reconnect attempts.
    reconnecting: AtomicBool,
    /// Set once by close(); permanent.
    closed: AtomicBool,
}

/// RabbitMQ-backed implementation of the Broker port.
pub struct AmqpBroker {
    inner: Arc<BrokerInner>,
}

impl AmqpBroker {
    /// Dial the broker and declare the queue/exchange topology. Failure
    /// here is fatal to startup by design.
    pub async fn connect(config: AmqpConfig) -> Result<Self> {
        info!(url = %config.redacted_url(), "connecting to broker");
        let pair = dial(&config).await?;
        declare_topology(&pair.channel).await?;

        Ok(Self {
            inner: Arc::new(BrokerInner {
                config,
                pair: Mutex::new(pair),
                reconnecting: AtomicBool::new(false),
                closed: AtomicBool::new(false),
            }),
        })
    }
}

async fn dial(config: &AmqpConfig) -> Result<ChannelPair> {
    let connect = Connection::connect(
        &config.url,
        ConnectionProperties::default().with_connection_name("armada-master".into()),
    );
    let connection = timeout(config.dial_timeout, connect)
        .await
        .map_err(|_| AppError::Broker("broker dial timed out".to_string()))?
        .map_err(map_amqp_error)?;
    let channel = connection.create_channel().await.map_err(map_amqp_error)?;
    Ok(ChannelPair {
        connection,
        channel,
    })
}

/// Declare the durable topology: delayed exchange, the three queues, and
/// the task-queue binding. Re-run after every reconnect.
async fn declare_topology(channel: &Channel) -> Result<()> {
    let mut args = FieldTable::default();
    args.insert(
        "x-delayed-type".into(),
        AMQPValue::LongString("direct".into()),
    );
    channel
        .exchange_declare(
            DELAYED_EXCHANGE,
            ExchangeKind::Custom("x-delayed-message".to_string()),
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            args,
        )
        .await
        .map_err(map_amqp_error)?;

    for queue in [TASK_QUEUE, RESULT_QUEUE, INSTANT_QUEUE] {
        channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(map_amqp_error)?;
    }

    channel
        .queue_bind(
            TASK_QUEUE,
            DELAYED_EXCHANGE,
            TASK_QUEUE,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await
        .map_err(map_amqp_error)?;

    debug!("broker topology declared");
    Ok(())
}

impl BrokerInner {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Bounded publish: retry with a reconnect between attempts, fail only
    /// after the attempt budget is spent.
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
        properties: BasicProperties,
    ) -> Result<()> {
        if self.is_closed() {
            return Err(AppError::Broker("broker client is closed".to_string()));
        }

        let mut pair = self.pair.lock().await;
        for attempt in 1..=self.config.max_publish_attempts {
            match pair
                .channel
                .basic_publish(
                    exchange,
                    routing_key,
                    BasicPublishOptions::default(),
                    body,
                    properties.clone(),
                )
                .await
            {
                Ok(confirm) => match confirm.await {
                    Ok(_) => return Ok(()),
                    Err(e) => {
                        warn!(attempt, routing_key, error = %e, "publish confirmation failed")
                    }
                },
                Err(e) => warn!(attempt, routing_key, error = %e, "publish failed"),
            }
            if self.is_closed() {
                break;
            }
            self.reconnect_locked(&mut pair).await;
        }

        Err(AppError::Broker(format!(
            "publish to {routing_key} failed after {} attempts",
            self.config.max_publish_attempts
        )))
    }

    async fn reconnect(&self) {
        let mut pair = self.pair.lock().await;
        self.reconnect_locked(&mut pair).await;
    }

    /// Replace the connection/channel pair. Concurrent failures collapse
    /// into the one attempt that wins the CAS; everyone else backs off and
    /// retries their own operation against the fresh pair.
    async fn reconnect_locked(&self, pair: &mut ChannelPair) {
        if self
            .reconnecting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("reconnect already in progress, backing off");
            sleep(self.config.reconnect_delay).await;
            return;
        }

        for attempt in 1..=self.config.max_reconnect_attempts {
            if self.is_closed() {
                break;
            }
            info!(attempt, "reconnecting to broker");
            close_pair(pair, self.config.close_timeout).await;

            match dial(&self.config).await {
                Ok(fresh) => match declare_topology(&fresh.channel).await {
                    Ok(()) => {
                        *pair = fresh;
                        info!(attempt, "broker reconnected");
                        self.reconnecting.store(false, Ordering::Release);
                        return;
                    }
                    Err(e) => warn!(attempt, error = %e, "topology declaration failed"),
                },
                Err(e) => warn!(attempt, error = %e, "reconnect attempt failed"),
            }
            sleep(self.config.reconnect_delay).await;
        }

        // Dormant until the next publish/consume failure retriggers us.
        error!(
            attempts = self.config.max_reconnect_attempts,
            "giving up on reconnect"
        );
        self.reconnecting.store(false, Ordering::Release);
    }

    /// Consume loop: subscribe, forward deliveries, reconnect and
    /// resubscribe whenever the stream errors or ends. Exits when the
    /// client is closed or the receiver is dropped.
    async fn consume_loop(self: Arc<Self>, queue: String, tx: mpsc::Sender<Vec<u8>>) {
        loop {
            if self.is_closed() {
                return;
            }
            if self.reconnecting.load(Ordering::Acquire) {
                sleep(self.config.reconnect_delay).await;
                continue;
            }

            let channel = self.pair.lock().await.channel.clone();
            let mut consumer = match channel
                .basic_consume(
                    &queue,
                    "",
                    BasicConsumeOptions {
                        no_ack: true,
                        ..Default::default()
                    },
                    FieldTable::default(),
                )
                .await
            {
                Ok(consumer) => consumer,
                Err(e) => {
                    warn!(queue = %queue, error = %e, "failed to open consumer");
                    self.reconnect().await;
                    continue;
                }
            };
            debug!(queue = %queue, "consumer subscribed");

            // The stream yields an error or ends when the channel or the
            // connection dies; either way we fall through to reconnect.
            while let Some(delivery) = consumer.next().await {
                match delivery {
                    Ok(delivery) => {
                        if tx.send(delivery.data).await.is_err() {
                            debug!(queue = %queue, "delivery receiver dropped, stopping consumer");
                            return;
                        }
                    }
                    Err(e) => {
                        warn!(queue = %queue, error = %e, "delivery stream error");
                        break;
                    }
                }
            }

            if self.is_closed() {
                return;
            }
            warn!(queue = %queue, "consumer stream ended, reconnecting");
            self.reconnect().await;
        }
    }
}

/// Close channel and connection, each under the grace period; a close that
/// does not return in time is abandoned rather than blocking shutdown.
async fn close_pair(pair: &ChannelPair, grace: Duration) {
    match timeout(grace, pair.channel.close(200, "closing")).await {
        Ok(Ok(())) => debug!("channel closed"),
        Ok(Err(e)) => debug!(error = %e, "channel close reported error"),
        Err(_) => warn!("channel close timed out, abandoning"),
    }
    match timeout(grace, pair.connection.close(200, "closing")).await {
        Ok(Ok(())) => debug!("connection closed"),
        Ok(Err(e)) => debug!(error = %e, "connection close reported error"),
        Err(_) => warn!("connection close timed out, abandoning"),
    }
}

fn persistent_json() -> BasicProperties {
    BasicProperties::default()
        .with_delivery_mode(2)
        .with_content_type("application/json".into())
}

#[async_trait]
impl Broker for AmqpBroker {
    async fn publish_now(&self, body: Vec<u8>, routing_key: &str) -> Result<()> {
        // Default exchange routes straight to the queue named by the key.
        self.inner
            .publish("", routing_key, &body, persistent_json())
            .await
    }

    async fn publish_delayed(
        &self,
        body: Vec<u8>,
        routing_key: &str,
        delay: Duration,
    ) -> Result<()> {
        let mut headers = FieldTable::default();
        headers.insert("x-delay".into(), AMQPValue::LongLongInt(delay.as_millis() as i64));
        let properties = persistent_json().with_headers(headers);
        self.inner
            .publish(DELAYED_EXCHANGE, routing_key, &body, properties)
            .await
    }

    async fn consume(&self, queue: &str) -> Result<mpsc::Receiver<Vec<u8>>> {
        if self.inner.is_closed() {
            return Err(AppError::Broker("broker client is closed".to_string()));
        }
        let (tx, rx) = mpsc::channel(DELIVERY_BUFFER);
        tokio::spawn(Arc::clone(&self.inner).consume_loop(queue.to_string(), tx));
        Ok(rx)
    }

    async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("closing broker client");
        let pair = self.inner.pair.lock().await;
        close_pair(&pair, self.inner.config.close_timeout).await;
    }
}

// Integration tests require RabbitMQ with the delayed-message plugin:
//   docker run -d -p 5672:5672 heidiks/rabbitmq-delayed-message-exchange
// Then: cargo test -p armada-infra-amqp -- --ignored
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires RabbitMQ running"]
    async fn connect_and_close() {
        let broker = AmqpBroker::connect(AmqpConfig::from_env()).await.unwrap();
        broker.close().await;

        let err = broker.publish_now(b"{}".to_vec(), TASK_QUEUE).await;
        assert!(err.is_err(), "publish after close must fail");
    }

    #[tokio::test]
    #[ignore = "requires RabbitMQ running"]
    async fn publish_consume_roundtrip() {
        let broker = AmqpBroker::connect(AmqpConfig::from_env()).await.unwrap();
        let queue = RESULT_QUEUE;

        let mut rx = broker.consume(queue).await.unwrap();
        let payload = serde_json::json!({"probe": uuid::Uuid::new_v4().to_string()});
        broker
            .publish_now(serde_json::to_vec(&payload).unwrap(), queue)
            .await
            .unwrap();

        let body = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("delivery within 5s")
            .expect("stream open");
        let received: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(received, payload);

        broker.close().await;
    }

    #[tokio::test]
    #[ignore = "requires RabbitMQ running"]
    async fn delayed_publish_is_withheld() {
        let broker = AmqpBroker::connect(AmqpConfig::from_env()).await.unwrap();

        let mut rx = broker.consume(TASK_QUEUE).await.unwrap();
        broker
            .publish_delayed(b"{\"later\":true}".to_vec(), TASK_QUEUE, Duration::from_secs(2))
            .await
            .unwrap();

        // Not visible immediately.
        assert!(
            tokio::time::timeout(Duration::from_millis(500), rx.recv())
                .await
                .is_err(),
            "message must still be parked in the delayed exchange"
        );
        // Visible after the delay.
        let body = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("delivery after delay")
            .expect("stream open");
        assert_eq!(body, b"{\"later\":true}");

        broker.close().await;
    }
}
