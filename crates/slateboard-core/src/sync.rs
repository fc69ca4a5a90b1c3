//! WebSocket transport for the board session.
//!
//! A background thread owns the socket; the caller interacts through a
//! command channel (outbound frames, close) and polls an event channel.
//! Connection loss is never terminal: the thread keeps reconnecting with
//! bounded exponential backoff plus full jitter until told to close.

use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, TryRecvError, channel};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rand::Rng;
use tungstenite::{Message as WsMessage, connect};
use url::Url;

/// Connection state as observed from drained events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Events surfaced from the transport thread.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Socket is open; the session should flush its queue now and expect
    /// the server's connect-time full push shortly after.
    Connected,
    /// Socket was lost; the session must discard its replica.
    Disconnected,
    /// One received text frame.
    Frame(String),
    /// Connection attempt or read failed; a reconnect is already pending.
    Error { message: String },
}

/// Commands sent to the transport thread.
enum WsCommand {
    Send(String),
    Close,
}

/// Bounded exponential backoff with full jitter.
#[derive(Debug)]
pub struct ReconnectPolicy {
    base: Duration,
    cap: Duration,
    attempt: u32,
}

impl ReconnectPolicy {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap,
            attempt: 0,
        }
    }

    /// Next delay to wait before reconnecting; grows until the cap.
    pub fn next_delay(&mut self) -> Duration {
        let exp = self
            .base
            .saturating_mul(1u32.checked_shl(self.attempt).unwrap_or(u32::MAX));
        let ceiling = exp.min(self.cap);
        self.attempt = self.attempt.saturating_add(1);
        let millis = ceiling.as_millis() as u64;
        Duration::from_millis(rand::rng().random_range(0..=millis))
    }

    /// Call after a successful connection so the next outage starts small.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(250), Duration::from_secs(30))
    }
}

/// WebSocket transport running on a background thread.
pub struct BoardTransport {
    state: ConnectionState,
    events: Vec<TransportEvent>,
    cmd_tx: Option<Sender<WsCommand>>,
    event_rx: Option<Receiver<TransportEvent>>,
    _thread: Option<JoinHandle<()>>,
}

impl BoardTransport {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            events: Vec::new(),
            cmd_tx: None,
            event_rx: None,
            _thread: None,
        }
    }

    /// Start connecting to a `ws://` or `wss://` URL. The thread keeps the
    /// connection alive (reconnecting on loss) until [`disconnect`] or drop.
    ///
    /// [`disconnect`]: BoardTransport::disconnect
    pub fn connect(&mut self, url: &str) -> Result<(), String> {
        if self.cmd_tx.is_some() {
            return Err("already connected".to_string());
        }

        let parsed = Url::parse(url).map_err(|e| format!("invalid URL: {}", e))?;
        if parsed.scheme() != "ws" && parsed.scheme() != "wss" {
            return Err(format!("invalid WebSocket URL scheme: {}", parsed.scheme()));
        }

        self.state = ConnectionState::Connecting;

        let (cmd_tx, cmd_rx) = channel::<WsCommand>();
        let (event_tx, event_rx) = channel::<TransportEvent>();
        let url = url.to_string();

        let handle = thread::spawn(move || {
            connection_loop(&url, &cmd_rx, &event_tx);
        });

        self.cmd_tx = Some(cmd_tx);
        self.event_rx = Some(event_rx);
        self._thread = Some(handle);
        Ok(())
    }

    /// Stop the transport thread. The session should already have been
    /// told the transport is unusable.
    pub fn disconnect(&mut self) {
        if let Some(tx) = self.cmd_tx.take() {
            let _ = tx.send(WsCommand::Close);
        }
        self.event_rx = None;
        self._thread = None;
        self.state = ConnectionState::Disconnected;
    }

    /// Hand one text frame to the socket.
    pub fn send(&self, frame: &str) -> Result<(), String> {
        match &self.cmd_tx {
            Some(tx) => tx
                .send(WsCommand::Send(frame.to_string()))
                .map_err(|e| format!("send failed: {}", e)),
            None => Err("not connected".to_string()),
        }
    }

    /// Drain pending events (non-blocking), updating the observed state.
    pub fn poll_events(&mut self) -> Vec<TransportEvent> {
        if let Some(rx) = &self.event_rx {
            while let Ok(event) = rx.try_recv() {
                match &event {
                    TransportEvent::Connected => self.state = ConnectionState::Connected,
                    TransportEvent::Disconnected => self.state = ConnectionState::Connecting,
                    _ => {}
                }
                self.events.push(event);
            }
        }
        std::mem::take(&mut self.events)
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}

impl Default for BoardTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BoardTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Connect-read-reconnect loop run on the transport thread.
fn connection_loop(
    url: &str,
    cmd_rx: &Receiver<WsCommand>,
    event_tx: &Sender<TransportEvent>,
) {
    let mut policy = ReconnectPolicy::default();
    loop {
        match connect(url) {
            Ok((mut socket, response)) => {
                log::info!("connected to {}, status {}", url, response.status());
                policy.reset();
                let _ = event_tx.send(TransportEvent::Connected);

                // Short read timeout so the loop can interleave commands.
                if let tungstenite::stream::MaybeTlsStream::Plain(tcp) = socket.get_mut() {
                    let _ = tcp.set_read_timeout(Some(Duration::from_millis(50)));
                    let _ = tcp.set_write_timeout(Some(Duration::from_secs(5)));
                }

                let closed = loop {
                    match cmd_rx.try_recv() {
                        Ok(WsCommand::Send(frame)) => {
                            if let Err(e) = socket.send(WsMessage::Text(frame)) {
                                log::error!("socket send error: {}", e);
                                break false;
                            }
                        }
                        Ok(WsCommand::Close) => {
                            let _ = socket.close(None);
                            break true;
                        }
                        Err(TryRecvError::Disconnected) => break true,
                        Err(TryRecvError::Empty) => {}
                    }

                    match socket.read() {
                        Ok(WsMessage::Text(frame)) => {
                            let _ = event_tx.send(TransportEvent::Frame(frame));
                        }
                        Ok(WsMessage::Ping(data)) => {
                            let _ = socket.send(WsMessage::Pong(data));
                        }
                        Ok(WsMessage::Close(_)) => break false,
                        Ok(_) => {}
                        Err(tungstenite::Error::Io(ref e))
                            if e.kind() == std::io::ErrorKind::WouldBlock
                                || e.kind() == std::io::ErrorKind::TimedOut => {}
                        Err(e) => {
                            log::error!("socket read error: {}", e);
                            break false;
                        }
                    }
                };

                let _ = event_tx.send(TransportEvent::Disconnected);
                if closed {
                    return;
                }
            }
            Err(e) => {
                log::warn!("connection to {} failed: {}", url, e);
                let _ = event_tx.send(TransportEvent::Error {
                    message: format!("connection failed: {}", e),
                });
            }
        }

        // Back off before the next attempt, still honoring Close. Frames
        // queued while down are dropped; the session re-syncs from the
        // server's full push on reconnect.
        let delay = policy.next_delay();
        log::info!("reconnecting to {} in {:?}", url, delay);
        let deadline = std::time::Instant::now() + delay;
        loop {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            if remaining.is_zero() {
                break;
            }
            match cmd_rx.recv_timeout(remaining) {
                Ok(WsCommand::Close) | Err(RecvTimeoutError::Disconnected) => return,
                Ok(WsCommand::Send(_)) => {}
                Err(RecvTimeoutError::Timeout) => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_to_cap() {
        let mut policy = ReconnectPolicy::new(Duration::from_millis(100), Duration::from_secs(2));
        let mut last_ceiling = Duration::ZERO;
        for attempt in 0..8 {
            let delay = policy.next_delay();
            let ceiling = Duration::from_millis(100)
                .saturating_mul(1 << attempt)
                .min(Duration::from_secs(2));
            assert!(delay <= ceiling, "delay {:?} above ceiling {:?}", delay, ceiling);
            assert!(ceiling >= last_ceiling);
            last_ceiling = ceiling;
        }
        assert_eq!(last_ceiling, Duration::from_secs(2));
    }

    #[test]
    fn test_backoff_reset() {
        let mut policy = ReconnectPolicy::new(Duration::from_millis(100), Duration::from_secs(2));
        for _ in 0..6 {
            policy.next_delay();
        }
        policy.reset();
        // After a reset the ceiling is back down to the base.
        let delay = policy.next_delay();
        assert!(delay <= Duration::from_millis(100));
    }

    #[test]
    fn test_rejects_non_ws_url() {
        let mut transport = BoardTransport::new();
        assert!(transport.connect("http://example.com").is_err());
        assert!(transport.connect("not a url").is_err());
    }
}
