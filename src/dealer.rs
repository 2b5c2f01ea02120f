//! Websocket client for the Spotify dealer.
//!
//! The dealer pushes connect-state updates for the active device over a
//! websocket. This module handles:
//! * Connecting with the access token
//! * Keeping the connection alive with periodic pings
//! * Routing messages into the shared [`SessionState`]
//! * Reporting changes as [`Event`]s
//!
//! # Lifecycle
//!
//! A connection moves through `Disconnected → Connecting → Connected` and
//! back to `Disconnected` when either side closes it. While connected two
//! tasks run: the receive loop, which is the only writer of the session
//! state, and the keep-alive loop. Both share one cancellation token, so
//! that the end of one ends the other.
//!
//! The client does not reconnect. Hosts wait for [`Client::closed`] and
//! decide themselves when to start again.
//!
//! # Example
//!
//! ```no_run
//! use vrcosc_spotify::{config::Config, dealer::Client, http};
//!
//! async fn example(config: Config) -> vrcosc_spotify::error::Result<()> {
//!     let http_client = http::Client::new(&config)?;
//!     let mut client = Client::new(&config, http_client);
//!     let mut events = client.events().expect("events taken once");
//!
//!     client.start().await?;
//!     while let Some(event) = events.recv().await {
//!         println!("{event}");
//!     }
//!     client.stop().await;
//!     Ok(())
//! }
//! ```

use std::{fmt, sync::Arc, time::Duration};

use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use tokio::{
    net::TcpStream,
    sync::{mpsc, watch, Mutex},
    task::JoinHandle,
};
use tokio_tungstenite::{tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::{
    api::PlayerApi,
    config::Config,
    error::{Error, Result},
    events::Event,
    http,
    protocol::dealer::Envelope,
    router::Router,
    state::SessionState,
};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Sink = SplitSink<Socket, Message>;
type Stream = SplitStream<Socket>;

/// Connection status of the client.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum Status {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

/// Tasks and send half of a live connection.
struct Connection {
    cancel: CancellationToken,
    sink: Arc<Mutex<Sink>>,
    receiver: JoinHandle<()>,
    keepalive: JoinHandle<()>,
}

/// Dealer client.
pub struct Client {
    dealer_url: Url,
    request_url: Url,
    connect_timeout: Duration,
    keepalive_interval: Duration,
    stop_grace: Duration,
    max_frame_size: usize,

    router: Router,
    api: PlayerApi,

    status: Arc<watch::Sender<Status>>,
    state: Arc<watch::Sender<SessionState>>,

    event_tx: mpsc::UnboundedSender<Event>,
    event_rx: Option<mpsc::UnboundedReceiver<Event>>,

    connection: Option<Connection>,
}

impl Client {
    /// Creates a disconnected client.
    #[must_use]
    pub fn new(config: &Config, http_client: http::Client) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (status, _) = watch::channel(Status::Disconnected);
        let (state, _) = watch::channel(SessionState::new());

        let api = PlayerApi::new(
            Arc::new(http_client),
            config.api_url.clone(),
            config.access_token.clone(),
        );

        Self {
            dealer_url: config.dealer_url.clone(),
            request_url: config.dealer_request_url(),
            connect_timeout: config.connect_timeout,
            keepalive_interval: config.keepalive_interval,
            stop_grace: config.stop_grace,
            max_frame_size: config.max_frame_size,

            router: Router::new(),
            api,

            status: Arc::new(status),
            state: Arc::new(state),

            event_tx,
            event_rx: Some(event_rx),

            connection: None,
        }
    }

    /// Replaces the router used for new connections.
    #[must_use]
    pub fn with_router(mut self, router: Router) -> Self {
        self.router = router;
        self
    }

    /// Returns the current connection status.
    #[must_use]
    pub fn status(&self) -> Status {
        *self.status.borrow()
    }

    /// Subscribes to session state snapshots.
    ///
    /// The receiver is notified only when the state actually changed.
    #[must_use]
    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Takes the event receiver. Returns `None` after the first call.
    pub fn events(&mut self) -> Option<mpsc::UnboundedReceiver<Event>> {
        self.event_rx.take()
    }

    /// Connects to the dealer and starts the connection tasks.
    ///
    /// Every connection starts from an empty [`SessionState`], so the first
    /// volume and shuffle mode are reported again after a restart. Cancel
    /// safe: dropping the future before it completes leaves the client
    /// disconnected.
    ///
    /// # Errors
    ///
    /// Returns `FailedPrecondition` when the client is already connected,
    /// `DeadlineExceeded` when the handshake takes longer than the connect
    /// timeout, or an error when the websocket cannot be connected.
    pub async fn start(&mut self) -> Result<()> {
        if self.status() != Status::Disconnected {
            return Err(Error::failed_precondition(format!(
                "dealer client is already {}",
                self.status()
            )));
        }

        // Release a connection that ended on its own.
        self.stop().await;

        info!("connecting to {}", self.dealer_url);
        let connecting = Connecting::new(Arc::clone(&self.status));

        let handshake = tokio_tungstenite::connect_async(self.request_url.as_str());
        let socket = match tokio::time::timeout(self.connect_timeout, handshake).await {
            Ok(Ok((socket, response))) => {
                debug!("handshake response: {}", response.status());
                socket
            }
            Ok(Err(e)) => {
                error!("error connecting to dealer: {e}");
                return Err(e.into());
            }
            Err(_) => {
                error!("dealer handshake timed out");
                return Err(Error::deadline_exceeded(format!(
                    "dealer handshake took longer than {:?}",
                    self.connect_timeout
                )));
            }
        };

        let (sink, stream) = socket.split();
        let sink = Arc::new(Mutex::new(sink));
        let cancel = CancellationToken::new();

        let empty = SessionState::new();
        self.state.send_if_modified(|state| {
            let modified = *state != empty;
            *state = empty;
            modified
        });

        // Report the connection before any task can report its end.
        connecting.connected();
        self.emit(Event::Connected);
        info!("connected to dealer");

        let receiver = Receiver {
            router: self.router.clone(),
            api: self.api.clone(),
            status: Arc::clone(&self.status),
            state: Arc::clone(&self.state),
            event_tx: self.event_tx.clone(),
            cancel: cancel.clone(),
            max_frame_size: self.max_frame_size,
        };

        let receiver = tokio::spawn(receiver.run(stream));
        let keepalive = tokio::spawn(keepalive(
            Arc::clone(&sink),
            self.keepalive_interval,
            cancel.clone(),
        ));

        self.connection = Some(Connection {
            cancel,
            sink,
            receiver,
            keepalive,
        });

        Ok(())
    }

    /// Stops the connection.
    ///
    /// Waits up to the grace period for the connection tasks to finish,
    /// then closes the websocket. Errors while closing are only logged.
    /// Calling this while disconnected does nothing.
    pub async fn stop(&mut self) {
        let Some(Connection {
            cancel,
            sink,
            mut receiver,
            mut keepalive,
        }) = self.connection.take()
        else {
            return;
        };

        cancel.cancel();

        let joined = tokio::time::timeout(self.stop_grace, async {
            let _ = (&mut receiver).await;
            let _ = (&mut keepalive).await;
        })
        .await;

        if joined.is_err() {
            warn!(
                "connection tasks did not stop within {:?}, aborting",
                self.stop_grace
            );
            let reported = receiver.is_finished();
            receiver.abort();
            keepalive.abort();
            if !reported {
                self.emit(Event::Disconnected);
            }
        }

        let mut sink = sink.lock().await;
        match tokio::time::timeout(self.stop_grace, sink.close()).await {
            Ok(Ok(())) => trace!("websocket closed"),
            Ok(Err(e)) => debug!("error closing websocket: {e}"),
            Err(_) => debug!("timeout closing websocket"),
        }

        self.status.send_replace(Status::Disconnected);
        info!("disconnected from dealer");
    }

    /// Waits until the connection has ended.
    ///
    /// Returns immediately when disconnected. Cancel safe, so it can be
    /// used in `tokio::select!`.
    pub async fn closed(&self) {
        let mut status = self.status.subscribe();
        // The sender lives in `self`, so this cannot fail.
        let _ = status
            .wait_for(|status| *status == Status::Disconnected)
            .await;
    }

    /// Waits until the connection has ended and releases it.
    pub async fn join(&mut self) {
        self.closed().await;
        self.stop().await;
    }

    fn emit(&self, event: Event) {
        if self.event_tx.send(event).is_err() {
            trace!("no event receiver for {event}");
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if let Some(connection) = &self.connection {
            connection.cancel.cancel();
        }
    }
}

/// Marks the client as connecting until dropped.
///
/// Unless the handshake succeeded, dropping resets the status to
/// `Disconnected`, also when the `start` future itself is dropped.
struct Connecting {
    status: Arc<watch::Sender<Status>>,
    done: bool,
}

impl Connecting {
    fn new(status: Arc<watch::Sender<Status>>) -> Self {
        status.send_replace(Status::Connecting);
        Self {
            status,
            done: false,
        }
    }

    fn connected(mut self) {
        self.done = true;
        self.status.send_replace(Status::Connected);
    }
}

impl Drop for Connecting {
    fn drop(&mut self) {
        if !self.done {
            self.status.send_replace(Status::Disconnected);
        }
    }
}

/// State of the receive loop.
struct Receiver {
    router: Router,
    api: PlayerApi,
    status: Arc<watch::Sender<Status>>,
    state: Arc<watch::Sender<SessionState>>,
    event_tx: mpsc::UnboundedSender<Event>,
    cancel: CancellationToken,
    max_frame_size: usize,
}

impl Receiver {
    async fn run(mut self, mut stream: Stream) {
        loop {
            let frame = tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    trace!("receive loop cancelled");
                    break;
                }
                frame = stream.next() => frame,
            };

            match frame {
                Some(Ok(Message::Text(text))) => self.handle_text(text.as_str()),
                Some(Ok(Message::Binary(data))) => {
                    trace!("ignoring binary frame with {} bytes", data.len());
                }
                Some(Ok(Message::Close(frame))) => {
                    info!("connection closed by dealer: {frame:?}");
                    break;
                }
                // Websocket pings are answered by the transport.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!("error receiving frame: {e}");
                    break;
                }
                None => {
                    debug!("dealer stream ended");
                    break;
                }
            }
        }

        self.cancel.cancel();
        if self.event_tx.send(Event::Disconnected).is_err() {
            trace!("no event receiver for {}", Event::Disconnected);
        }
        self.status.send_replace(Status::Disconnected);
    }

    fn handle_text(&mut self, text: &str) {
        // Do not parse exceedingly large frames to prevent out of memory
        // conditions.
        if text.len() > self.max_frame_size {
            error!("ignoring oversized frame with {} bytes", text.len());
            return;
        }

        trace!("received: {text}");
        let envelope = match Envelope::parse(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("ignoring malformed frame: {e}");
                return;
            }
        };
        debug!("received {envelope}");

        let mut state = *self.state.borrow();
        let dispatch = self.router.dispatch(&envelope, &mut state);
        self.state.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            true
        });

        if let Some(connection_id) = dispatch.enable_notifications {
            let api = self.api.clone();
            tokio::spawn(async move {
                if let Err(e) = api.enable_notifications(&connection_id).await {
                    error!("error enabling player notifications: {e}");
                }
            });
        }

        if let Some(event) = dispatch.event {
            debug!("{event}, now {state}");
            if self.event_tx.send(event).is_err() {
                trace!("no event receiver for {event}");
            }
        }
    }
}

/// Sends a ping every `interval` until cancelled.
///
/// A failed send ends the connection.
async fn keepalive<S>(sink: Arc<Mutex<S>>, interval: Duration, cancel: CancellationToken)
where
    S: futures_util::Sink<Message> + Unpin,
    S::Error: fmt::Display,
{
    let ping = Envelope::ping_frame();
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(interval) => {}
        }

        trace!("sending ping");
        let result = sink.lock().await.send(Message::text(ping.clone())).await;
        if let Err(e) = result {
            error!("error sending ping: {e}");
            cancel.cancel();
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        pin::Pin,
        task::{Context, Poll},
    };

    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use protobuf::Message as _;
    use serde_json::json;
    use tokio::net::TcpListener;

    use super::*;
    use crate::{
        api,
        error::ErrorKind,
        protocol::dealer::{protos::connect_state::SetVolumeCommand, volume::Volume},
    };

    const TIMEOUT: Duration = Duration::from_secs(5);

    struct Harness {
        client: Client,
        events: mpsc::UnboundedReceiver<Event>,
        sockets: mpsc::UnboundedReceiver<Socket>,
    }

    impl Harness {
        /// Server side of the next accepted connection.
        async fn accept(&mut self) -> Socket {
            tokio::time::timeout(TIMEOUT, self.sockets.recv())
                .await
                .unwrap()
                .unwrap()
        }
    }

    fn config(dealer_url: Url, keepalive_interval: Duration) -> Config {
        let mut config = Config::with_token("BQDtoken".parse().unwrap()).unwrap();
        config.dealer_url = dealer_url;
        // Nothing listens here, so a stray call fails fast.
        config.api_url = Url::parse("http://127.0.0.1:9/").unwrap();
        config.keepalive_interval = keepalive_interval;
        config
    }

    async fn harness(apply: impl FnOnce(&mut Config)) -> Harness {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dealer_url = Url::parse(&format!("ws://{}/", listener.local_addr().unwrap())).unwrap();

        let (socket_tx, sockets) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let socket = tokio_tungstenite::accept_async(MaybeTlsStream::Plain(stream))
                    .await
                    .unwrap();
                if socket_tx.send(socket).is_err() {
                    break;
                }
            }
        });

        let mut config = config(dealer_url, Duration::from_secs(30));
        apply(&mut config);

        let http_client = http::Client::new(&config).unwrap();
        let mut client = Client::new(&config, http_client);
        let events = client.events().unwrap();

        Harness {
            client,
            events,
            sockets,
        }
    }

    async fn next_event(events: &mut mpsc::UnboundedReceiver<Event>) -> Event {
        tokio::time::timeout(TIMEOUT, events.recv())
            .await
            .unwrap()
            .unwrap()
    }

    fn volume_frame(volume: u32, connection_id: Option<&str>) -> Message {
        let payload = SetVolumeCommand {
            volume,
            ..Default::default()
        }
        .write_to_bytes()
        .unwrap();

        let mut frame = json!({
            "type": "message",
            "uri": Router::VOLUME_URI,
            "payloads": [STANDARD.encode(payload)],
        });
        if let Some(id) = connection_id {
            frame["headers"] = json!({ "Spotify-Connection-Id": id });
        }
        Message::text(frame.to_string())
    }

    #[tokio::test]
    async fn volume_message_updates_state() {
        let mut harness = harness(|_| {}).await;
        harness.client.start().await.unwrap();
        let mut server = harness.accept().await;
        assert_eq!(next_event(&mut harness.events).await, Event::Connected);
        assert_eq!(harness.client.status(), Status::Connected);

        let mut state = harness.client.state();
        server.send(volume_frame(32_768, None)).await.unwrap();

        assert_eq!(
            next_event(&mut harness.events).await,
            Event::VolumeChanged(Volume::from_percent(50))
        );
        let volume = tokio::time::timeout(TIMEOUT, state.wait_for(|s| s.volume().is_some()))
            .await
            .unwrap()
            .unwrap()
            .volume();
        assert_eq!(volume, Some(Volume::from_percent(50)));

        harness.client.stop().await;
    }

    #[tokio::test]
    async fn drops_oversized_and_malformed_frames() {
        let mut harness = harness(|config| config.max_frame_size = 256).await;
        harness.client.start().await.unwrap();
        let mut server = harness.accept().await;
        assert_eq!(next_event(&mut harness.events).await, Event::Connected);

        let payload = STANDARD.encode(
            SetVolumeCommand {
                volume: 10,
                ..Default::default()
            }
            .write_to_bytes()
            .unwrap(),
        );
        let oversized = json!({
            "type": "message",
            "uri": Router::VOLUME_URI,
            "payloads": [payload],
            "padding": "x".repeat(512),
        });
        server.send(Message::text(oversized.to_string())).await.unwrap();
        server.send(Message::text("{not json".to_owned())).await.unwrap();
        server.send(Message::binary(vec![1, 2, 3])).await.unwrap();
        server.send(volume_frame(20, None)).await.unwrap();

        assert_eq!(
            next_event(&mut harness.events).await,
            Event::VolumeChanged(Volume::from_percent(20))
        );
        harness.client.stop().await;
    }

    #[tokio::test]
    async fn enables_notifications_for_connection_id() {
        let (api_url, request) = api::tests::responder("204 No Content").await;
        let mut harness = harness(|config| config.api_url = api_url).await;
        harness.client.start().await.unwrap();
        let mut server = harness.accept().await;

        server.send(volume_frame(40, Some("NzYz"))).await.unwrap();

        let head = tokio::time::timeout(TIMEOUT, request)
            .await
            .unwrap()
            .unwrap();
        assert!(head.starts_with("PUT /v1/me/notifications/player?connection_id=NzYz "));
        harness.client.stop().await;
    }

    #[tokio::test]
    async fn sends_pings_until_stopped() {
        let mut harness =
            harness(|config| config.keepalive_interval = Duration::from_millis(50)).await;
        harness.client.start().await.unwrap();
        let mut server = harness.accept().await;

        for _ in 0..2 {
            let frame = tokio::time::timeout(TIMEOUT, server.next())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            assert_eq!(frame, Message::text(r#"{"type":"ping"}"#.to_owned()));
        }

        harness.client.stop().await;

        // A ping sent before cancellation may still be queued, but none
        // follows the close frame.
        let mut closed = false;
        while let Ok(Some(Ok(frame))) = tokio::time::timeout(TIMEOUT, server.next()).await {
            if frame.is_close() {
                closed = true;
            } else {
                assert!(!closed && frame.is_text(), "unexpected frame: {frame:?}");
            }
        }
        assert!(closed);
    }

    #[tokio::test]
    async fn no_ping_when_stopped_before_interval() {
        let mut harness =
            harness(|config| config.keepalive_interval = Duration::from_millis(200)).await;
        harness.client.start().await.unwrap();
        let mut server = harness.accept().await;
        harness.client.stop().await;

        tokio::time::sleep(Duration::from_millis(400)).await;
        while let Ok(Some(Ok(frame))) = tokio::time::timeout(TIMEOUT, server.next()).await {
            assert!(frame.is_close(), "unexpected frame after stop: {frame:?}");
        }
    }

    #[tokio::test]
    async fn server_close_ends_connection() {
        let mut harness = harness(|_| {}).await;
        harness.client.start().await.unwrap();
        let mut server = harness.accept().await;
        assert_eq!(next_event(&mut harness.events).await, Event::Connected);

        server.close(None).await.unwrap();

        assert_eq!(next_event(&mut harness.events).await, Event::Disconnected);
        tokio::time::timeout(TIMEOUT, harness.client.closed())
            .await
            .unwrap();
        assert_eq!(harness.client.status(), Status::Disconnected);

        harness.client.join().await;
        assert!(harness.client.connection.is_none());
    }

    #[tokio::test]
    async fn stop_while_receive_pending() {
        let mut harness = harness(|_| {}).await;
        harness.client.start().await.unwrap();
        let _server = harness.accept().await;
        assert_eq!(next_event(&mut harness.events).await, Event::Connected);

        tokio::time::timeout(TIMEOUT, harness.client.stop())
            .await
            .unwrap();
        assert_eq!(next_event(&mut harness.events).await, Event::Disconnected);
        assert_eq!(harness.client.status(), Status::Disconnected);

        // Stopping again is a no-op.
        harness.client.stop().await;
        assert!(harness.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn start_twice_fails() {
        let mut harness = harness(|_| {}).await;
        harness.client.start().await.unwrap();
        let _server = harness.accept().await;

        let err = harness.client.start().await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::FailedPrecondition);
        assert_eq!(harness.client.status(), Status::Connected);
        harness.client.stop().await;
    }

    #[tokio::test]
    async fn connect_failure_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dealer_url = Url::parse(&format!("ws://{}/", listener.local_addr().unwrap())).unwrap();
        drop(listener);

        let config = config(dealer_url, Duration::from_secs(30));
        let mut client = Client::new(&config, http::Client::new(&config).unwrap());
        let mut events = client.events().unwrap();

        assert!(client.start().await.is_err());
        assert_eq!(client.status(), Status::Disconnected);
        assert!(events.try_recv().is_err());
        assert!(client.events().is_none());
    }

    #[tokio::test]
    async fn restart_reports_state_again() {
        let mut harness = harness(|_| {}).await;

        for _ in 0..2 {
            harness.client.start().await.unwrap();
            let mut server = harness.accept().await;
            assert_eq!(next_event(&mut harness.events).await, Event::Connected);
            assert_eq!(harness.client.state().borrow().volume(), None);

            server.send(volume_frame(50, None)).await.unwrap();
            assert_eq!(
                next_event(&mut harness.events).await,
                Event::VolumeChanged(Volume::from_percent(50))
            );

            harness.client.stop().await;
            assert_eq!(next_event(&mut harness.events).await, Event::Disconnected);
        }
    }

    /// Accepts TCP connections but never answers the websocket handshake.
    async fn silent_dealer() -> (Url, JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dealer_url = Url::parse(&format!("ws://{}/", listener.local_addr().unwrap())).unwrap();

        let handle = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        (dealer_url, handle)
    }

    #[tokio::test]
    async fn dropped_start_leaves_client_disconnected() {
        let (dealer_url, _server) = silent_dealer().await;
        let mut config = config(dealer_url, Duration::from_secs(30));
        config.connect_timeout = Duration::from_millis(300);
        let mut client = Client::new(&config, http::Client::new(&config).unwrap());

        let dropped = tokio::time::timeout(Duration::from_millis(50), client.start()).await;
        assert!(dropped.is_err());
        assert_eq!(client.status(), Status::Disconnected);
        tokio::time::timeout(TIMEOUT, client.closed())
            .await
            .unwrap();

        // Starting again is allowed and runs into the handshake timeout.
        let err = client.start().await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::DeadlineExceeded);
        assert_eq!(client.status(), Status::Disconnected);
    }

    /// Records sent frames, or fails every send.
    struct Recorder {
        tx: mpsc::UnboundedSender<Message>,
        fail: bool,
    }

    impl futures_util::Sink<Message> for Recorder {
        type Error = io::Error;

        fn poll_ready(
            self: Pin<&mut Self>,
            _: &mut Context<'_>,
        ) -> Poll<std::result::Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn start_send(self: Pin<&mut Self>, item: Message) -> std::result::Result<(), Self::Error> {
            if self.fail {
                return Err(io::Error::from(io::ErrorKind::BrokenPipe));
            }
            let _ = self.tx.send(item);
            Ok(())
        }

        fn poll_flush(
            self: Pin<&mut Self>,
            _: &mut Context<'_>,
        ) -> Poll<std::result::Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn poll_close(
            self: Pin<&mut Self>,
            _: &mut Context<'_>,
        ) -> Poll<std::result::Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }
    }

    /// Lets spawned tasks run up to their next timer.
    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn one_ping_per_interval() {
        let interval = Duration::from_secs(30);
        let (tx, mut sent) = mpsc::unbounded_channel();
        let sink = Arc::new(Mutex::new(Recorder { tx, fail: false }));
        let cancel = CancellationToken::new();

        let task = tokio::spawn(keepalive(sink, interval, cancel.clone()));
        settle().await;

        for _ in 0..3 {
            tokio::time::advance(interval - Duration::from_secs(1)).await;
            settle().await;
            assert!(sent.try_recv().is_err());

            tokio::time::advance(Duration::from_secs(1)).await;
            settle().await;
            assert_eq!(
                sent.try_recv().unwrap(),
                Message::text(r#"{"type":"ping"}"#.to_owned())
            );
            assert!(sent.try_recv().is_err());
        }

        // Cancelled halfway through an interval.
        tokio::time::advance(interval / 2).await;
        cancel.cancel();
        task.await.unwrap();

        tokio::time::advance(interval * 2).await;
        settle().await;
        assert!(sent.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_ping_cancels_connection() {
        let (tx, mut sent) = mpsc::unbounded_channel();
        let sink = Arc::new(Mutex::new(Recorder { tx, fail: true }));
        let cancel = CancellationToken::new();

        let task = tokio::spawn(keepalive(sink, Duration::from_secs(30), cancel.clone()));
        tokio::time::timeout(Duration::from_secs(60), cancel.cancelled())
            .await
            .unwrap();
        task.await.unwrap();
        assert!(sent.try_recv().is_err());
    }
}
