//! Board client: one session wired to one transport.
//!
//! The UI layer constructs a [`BoardClient`] at session start, calls
//! [`BoardClient::tick`] from its update loop, and drops (or
//! [`BoardClient::shutdown`]s) it at session end.

use crate::session::BoardSession;
use crate::sync::{BoardTransport, TransportEvent};

/// Explicit per-session context tying a [`BoardSession`] to its transport.
pub struct BoardClient {
    session: BoardSession,
    transport: BoardTransport,
}

impl BoardClient {
    /// Connect to a room on a relay server. `server_url` is the ws base
    /// (e.g. `ws://host:8081`), `room` the path-like room identifier.
    pub fn connect(server_url: &str, room: &str, client_id: &str) -> Result<Self, String> {
        let url = format!(
            "{}/{}",
            server_url.trim_end_matches('/'),
            room.trim_start_matches('/')
        );
        let mut transport = BoardTransport::new();
        transport.connect(&url)?;
        Ok(Self {
            session: BoardSession::new(client_id),
            transport,
        })
    }

    /// Drive the client: absorb transport events into the session and
    /// flush anything the session wants to send. Call this regularly.
    pub fn tick(&mut self) {
        for event in self.transport.poll_events() {
            match event {
                TransportEvent::Connected => {
                    for frame in self.session.transport_opened() {
                        if let Err(e) = self.transport.send(&frame) {
                            log::error!("flush failed: {}", e);
                        }
                    }
                }
                TransportEvent::Disconnected => self.session.transport_closed(),
                TransportEvent::Frame(frame) => {
                    if let Err(e) = self.session.handle_frame(&frame) {
                        log::warn!("bad frame from server: {}", e);
                    }
                }
                TransportEvent::Error { message } => {
                    log::warn!("transport: {}", message);
                }
            }
        }

        for frame in self.session.take_outgoing() {
            if let Err(e) = self.transport.send(&frame) {
                log::error!("send failed: {}", e);
            }
        }
    }

    pub fn session(&self) -> &BoardSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut BoardSession {
        &mut self.session
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Tear the connection down explicitly.
    pub fn shutdown(&mut self) {
        self.transport.disconnect();
        self.session.transport_closed();
    }
}
