//! Link events from the network collaborators.
//!
//! Wi-Fi and the TCP server report state changes as [`LinkEvent`]s; one
//! dispatcher updates [`LinkState`], which the forwarding transport and
//! the supervisor consult. Nothing here is touched from interrupt context.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// State change reported by a network collaborator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkEvent {
    WifiConnected { ip: [u8; 4] },
    WifiDisconnected,
    ClientConnected,
    ClientDisconnected,
}

/// Link status flags.
pub struct LinkState {
    wifi_up: AtomicBool,
    ip: AtomicU32,
    client: AtomicBool,
    /// Client sessions since boot.
    sessions: AtomicU32,
}

impl LinkState {
    pub const fn new() -> Self {
        Self {
            wifi_up: AtomicBool::new(false),
            ip: AtomicU32::new(0),
            client: AtomicBool::new(false),
            sessions: AtomicU32::new(0),
        }
    }

    /// Apply one event.
    pub fn handle(&self, event: LinkEvent) {
        match event {
            LinkEvent::WifiConnected { ip } => {
                self.ip.store(u32::from_be_bytes(ip), Ordering::Relaxed);
                self.wifi_up.store(true, Ordering::Release);
            }
            LinkEvent::WifiDisconnected => {
                self.wifi_up.store(false, Ordering::Release);
                // A client cannot outlive the station link.
                self.client.store(false, Ordering::Release);
                self.ip.store(0, Ordering::Relaxed);
            }
            LinkEvent::ClientConnected => {
                self.sessions.fetch_add(1, Ordering::Relaxed);
                self.client.store(true, Ordering::Release);
            }
            LinkEvent::ClientDisconnected => {
                self.client.store(false, Ordering::Release);
            }
        }
    }

    pub fn wifi_up(&self) -> bool {
        self.wifi_up.load(Ordering::Acquire)
    }

    /// Station address, `None` while disconnected.
    pub fn ip(&self) -> Option<[u8; 4]> {
        if self.wifi_up() {
            Some(self.ip.load(Ordering::Relaxed).to_be_bytes())
        } else {
            None
        }
    }

    /// A client completed the handshake and is still connected.
    pub fn client_connected(&self) -> bool {
        self.client.load(Ordering::Acquire)
    }

    pub fn sessions(&self) -> u32 {
        self.sessions.load(Ordering::Relaxed)
    }
}

impl Default for LinkState {
    fn default() -> Self {
        Self::new()
    }
}
