use std::cell::RefCell;
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::rc::Rc;

/// Failures surfaced by a probe channel. Send failures are reported and
/// probing continues; they never abort the engine.
#[derive(thiserror::Error, Debug)]
pub enum ChannelError {
    #[error("channel is closed")]
    Closed,
    #[error("send failed: {0}")]
    Io(#[from] io::Error),
}

/// Bidirectional message channel the engine probes over.
///
/// The engine owns the send side; the collaborator owns the receive loop and
/// forwards inbound payloads to `handle_message`. Delivery is unreliable in
/// both directions.
pub trait ProbeChannel {
    fn is_open(&self) -> bool;
    fn send(&mut self, payload: &str) -> Result<(), ChannelError>;
    fn close(&mut self) -> Result<(), ChannelError>;
}

/// Shared handle so the scheduler and the session controller refer to one
/// channel instance; identity comparisons use `Rc::ptr_eq`.
pub type ChannelHandle = Rc<RefCell<dyn ProbeChannel>>;

/// Datagram channel to a reflector endpoint.
pub struct UdpChannel {
    socket: UdpSocket,
    peer: SocketAddr,
    open: bool,
}

impl UdpChannel {
    pub fn connect(peer: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.set_nonblocking(true)?;
        Ok(Self {
            socket,
            peer,
            open: true,
        })
    }

    /// Drains one inbound datagram from the peer, if any is waiting.
    pub fn try_recv(&mut self) -> Option<String> {
        let mut buf = [0u8; 2048];
        loop {
            match self.socket.recv_from(&mut buf) {
                Ok((amt, src)) => {
                    if src != self.peer {
                        continue;
                    }
                    return Some(String::from_utf8_lossy(&buf[..amt]).into_owned());
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return None,
                Err(e) => {
                    tracing::warn!(error = %e, "receive failed");
                    return None;
                }
            }
        }
    }
}

impl ProbeChannel for UdpChannel {
    fn is_open(&self) -> bool {
        self.open
    }

    fn send(&mut self, payload: &str) -> Result<(), ChannelError> {
        if !self.open {
            return Err(ChannelError::Closed);
        }
        self.socket.send_to(payload.as_bytes(), self.peer)?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), ChannelError> {
        self.open = false;
        Ok(())
    }
}
