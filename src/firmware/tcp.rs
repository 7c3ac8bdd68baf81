//! TCP streaming transport.
//!
//! One client at a time. The listener and the client socket are
//! non-blocking, so `send` never stalls the forwarding task: a socket
//! that cannot take more data reports backpressure instead.

use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::time::Duration;

use ads8689_stream::event::{LinkEvent, LinkState};
use ads8689_stream::forward::Transport;
use ads8689_stream::logging::timestamp_us;
use ads8689_stream::wire;
use ads8689_stream::{rt_info, rt_warn, NET_LOG_STREAM};

use super::FirmwareError;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(2);

pub struct TcpTransport {
    listener: TcpListener,
    client: Option<TcpStream>,
    /// Tail of an accepted block the socket only took partially.
    backlog: Vec<u8>,
    link: &'static LinkState,
}

impl TcpTransport {
    pub fn bind(port: u16, link: &'static LinkState) -> Result<Self, FirmwareError> {
        let listener = TcpListener::bind(("0.0.0.0", port))?;
        listener.set_nonblocking(true)?;
        rt_info!(NET_LOG_STREAM, timestamp_us(), "listening on port {}", port);
        Ok(Self {
            listener,
            client: None,
            backlog: Vec::with_capacity(wire::MAX_PACKET_BYTES),
            link,
        })
    }

    fn try_accept(&mut self) {
        let (mut stream, peer) = match self.listener.accept() {
            Ok(accepted) => accepted,
            Err(_) => return,
        };

        let mut request = [0u8; 128];
        let accepted = stream.set_nonblocking(false).is_ok()
            && stream.set_read_timeout(Some(HANDSHAKE_TIMEOUT)).is_ok()
            && matches!(stream.read(&mut request), Ok(n) if wire::is_connection_request(&request[..n]))
            && stream.set_nonblocking(true).is_ok();

        if !accepted {
            rt_warn!(NET_LOG_STREAM, timestamp_us(), "rejected {}: bad handshake", peer);
            let _ = stream.shutdown(Shutdown::Both);
            return;
        }

        let _ = stream.set_nodelay(true);
        rt_info!(NET_LOG_STREAM, timestamp_us(), "client {} streaming", peer);
        self.backlog.clear();
        self.client = Some(stream);
        self.link.handle(LinkEvent::ClientConnected);
    }

    fn disconnect(&mut self) {
        if let Some(stream) = self.client.take() {
            let _ = stream.shutdown(Shutdown::Both);
            self.backlog.clear();
            self.link.handle(LinkEvent::ClientDisconnected);
            rt_warn!(NET_LOG_STREAM, timestamp_us(), "client disconnected");
        }
    }

    /// Push out the backlog. `false` while the socket is still full.
    fn flush_backlog(&mut self) -> bool {
        while !self.backlog.is_empty() {
            let Some(stream) = self.client.as_mut() else {
                return false;
            };
            match stream.write(&self.backlog) {
                Ok(0) => {
                    self.disconnect();
                    return false;
                }
                Ok(n) => {
                    self.backlog.drain(..n);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return false,
                Err(_) => {
                    self.disconnect();
                    return false;
                }
            }
        }
        true
    }
}

impl Transport for TcpTransport {
    fn send(&mut self, bytes: &[u8]) -> bool {
        if self.client.is_none() {
            self.try_accept();
        }
        if !self.flush_backlog() {
            return false;
        }
        let Some(stream) = self.client.as_mut() else {
            return false;
        };

        match stream.write(bytes) {
            Ok(0) => {
                self.disconnect();
                false
            }
            Ok(n) => {
                // Keep the remainder so the block is never split or repeated.
                self.backlog.extend_from_slice(&bytes[n..]);
                true
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => false,
            Err(_) => {
                self.disconnect();
                false
            }
        }
    }
}
