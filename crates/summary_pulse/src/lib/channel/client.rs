use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, MutexGuard,
};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::{net::TcpStream, sync::mpsc, task::JoinHandle};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use super::{ChannelEvent, CommandChannel, EventFilter, OutboundMessage, WireEvent};

type Subscriber = (EventFilter, mpsc::UnboundedSender<ChannelEvent>);
type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Persistent client for the service's push channel.
///
/// A background driver owns the socket: it connects, pumps messages, and on
/// any unexpected close waits one reconnect delay before trying again. The
/// client handle itself only flips flags and passes messages, so every
/// operation here is cheap and non-blocking.
#[derive(Clone)]
pub struct PushChannelClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    reconnect_delay: Duration,
    connected: AtomicBool,
    subscribers: Mutex<Vec<Subscriber>>,
    outbound: Mutex<Option<mpsc::UnboundedSender<OutboundMessage>>>,
    driver: Mutex<Option<DriverHandle>>,
}

struct DriverHandle {
    join: JoinHandle<()>,
    cancel: CancellationToken,
}

impl PushChannelClient {
    pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

    pub fn new() -> Self {
        Self::with_reconnect_delay(Self::DEFAULT_RECONNECT_DELAY)
    }

    pub fn with_reconnect_delay(reconnect_delay: Duration) -> Self {
        PushChannelClient {
            inner: Arc::new(ClientInner {
                reconnect_delay,
                connected: AtomicBool::new(false),
                subscribers: Mutex::new(Vec::new()),
                outbound: Mutex::new(None),
                driver: Mutex::new(None),
            }),
        }
    }

    /// Starts the background driver for `endpoint`. Calling this while a
    /// driver is already running is a no-op.
    pub fn connect(&self, endpoint: impl Into<String>) {
        let mut driver = lock(&self.inner.driver);
        if let Some(handle) = driver.as_ref() {
            if !handle.join.is_finished() {
                tracing::debug!("Channel driver already running; ignoring connect");
                return;
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        *lock(&self.inner.outbound) = Some(tx);

        let cancel = CancellationToken::new();
        let join = tokio::spawn(drive(
            self.inner.clone(),
            endpoint.into(),
            rx,
            cancel.clone(),
        ));
        *driver = Some(DriverHandle { join, cancel });
    }

    /// Tears the connection down and cancels any pending reconnect.
    pub async fn disconnect(&self) {
        let handle = lock(&self.inner.driver).take();
        if let Some(DriverHandle { join, cancel }) = handle {
            cancel.cancel();
            if let Err(e) = join.await {
                if !e.is_cancelled() {
                    tracing::warn!(error = %e, "Channel driver ended abnormally");
                }
            }
        }
        *lock(&self.inner.outbound) = None;
        self.inner.connected.store(false, Ordering::Relaxed);
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Relaxed)
    }

    /// Subscribes to events matching `filter`; [`EventFilter::Any`] sees
    /// everything. Dropping the receiver removes the subscription.
    pub fn on(&self, filter: EventFilter) -> mpsc::UnboundedReceiver<ChannelEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.inner.subscribers).push((filter, tx));
        rx
    }

    /// Sends a message immediately or drops it. There is no queueing: a
    /// message handed over while disconnected is logged and gone.
    pub fn send(&self, message: OutboundMessage) -> bool {
        if !self.is_connected() {
            tracing::warn!("Channel not connected; dropping outbound message");
            return false;
        }
        let delivered = lock(&self.inner.outbound)
            .as_ref()
            .is_some_and(|tx| tx.send(message).is_ok());
        if !delivered {
            tracing::warn!("Channel driver unavailable; dropped outbound message");
        }
        delivered
    }
}

impl Default for PushChannelClient {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandChannel for PushChannelClient {
    fn send(&self, message: OutboundMessage) -> bool {
        PushChannelClient::send(self, message)
    }

    fn subscribe(&self, filter: EventFilter) -> mpsc::UnboundedReceiver<ChannelEvent> {
        self.on(filter)
    }
}

impl ClientInner {
    fn fan_out(&self, event: ChannelEvent) {
        let mut subscribers = lock(&self.subscribers);
        subscribers.retain(|(filter, tx)| {
            if filter.matches(&event) {
                tx.send(event.clone()).is_ok()
            } else {
                !tx.is_closed()
            }
        });
    }

    fn handle_text(&self, text: &str) {
        match serde_json::from_str::<WireEvent>(text) {
            Ok(event) => match event.normalize() {
                Some(event) => self.fan_out(event),
                None => tracing::debug!("Dropping task-scoped message without an id"),
            },
            Err(e) => tracing::debug!(error = %e, "Ignoring unrecognized channel message"),
        }
    }
}

/// Connection driver. The loop body is connect, pump the session, then wait
/// one reconnect delay; the single sleep site is what keeps reconnect
/// attempts from compounding.
async fn drive(
    inner: Arc<ClientInner>,
    endpoint: String,
    mut outbound: mpsc::UnboundedReceiver<OutboundMessage>,
    cancel: CancellationToken,
) {
    loop {
        let attempt = tokio::select! {
            _ = cancel.cancelled() => break,
            attempt = connect_async(endpoint.as_str()) => attempt,
        };

        match attempt {
            Ok((socket, _)) => {
                tracing::info!(endpoint = %endpoint, "Channel connected");
                inner.connected.store(true, Ordering::Relaxed);
                inner.fan_out(ChannelEvent::Connected);
                run_session(socket, &inner, &mut outbound, &cancel).await;
                inner.connected.store(false, Ordering::Relaxed);
                discard_pending(&mut outbound);
                inner.fan_out(ChannelEvent::Closed {
                    reconnecting: !cancel.is_cancelled(),
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, endpoint = %endpoint, "Channel connect failed");
                inner.fan_out(ChannelEvent::TransportError {
                    message: e.to_string(),
                });
            }
        }

        if cancel.is_cancelled() {
            break;
        }
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(inner.reconnect_delay) => {}
        }
    }
    inner.connected.store(false, Ordering::Relaxed);
}

async fn run_session(
    socket: Socket,
    inner: &ClientInner,
    outbound: &mut mpsc::UnboundedReceiver<OutboundMessage>,
    cancel: &CancellationToken,
) {
    let (mut sink, mut stream) = socket.split();
    let mut outbound_open = true;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                return;
            }
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => inner.handle_text(text.as_str()),
                Some(Ok(Message::Ping(payload))) => {
                    let _ = sink.send(Message::Pong(payload)).await;
                }
                Some(Ok(Message::Close(_))) => {
                    tracing::info!("Channel closed by server");
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "Channel read failed");
                    inner.fan_out(ChannelEvent::TransportError {
                        message: e.to_string(),
                    });
                    return;
                }
                None => {
                    tracing::info!("Channel stream ended");
                    return;
                }
            },
            command = outbound.recv(), if outbound_open => match command {
                Some(command) => match serde_json::to_string(&command) {
                    Ok(json) => {
                        if let Err(e) = sink.send(Message::Text(json.into())).await {
                            tracing::warn!(error = %e, "Channel write failed; dropping message");
                            inner.fan_out(ChannelEvent::TransportError {
                                message: e.to_string(),
                            });
                            return;
                        }
                    }
                    Err(e) => tracing::error!(error = %e, "Failed to serialize outbound message"),
                },
                None => outbound_open = false,
            },
        }
    }
}

fn discard_pending(outbound: &mut mpsc::UnboundedReceiver<OutboundMessage>) {
    let mut dropped = 0_usize;
    while outbound.try_recv().is_ok() {
        dropped += 1;
    }
    if dropped > 0 {
        tracing::warn!(count = dropped, "Dropped outbound messages from closed session");
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
