//! Readiness notification for the process supervisor.

use std::ffi::OsString;

/// Receives the one-time "every listener is up" notification.
pub trait ReadinessNotifier: Send + Sync {
    fn notify_ready(&self);
}

/// Sends `READY=1` to the service manager socket named by `$NOTIFY_SOCKET`.
#[derive(Debug, Clone, Default)]
pub struct SystemdNotifier {
    socket: Option<OsString>,
}

impl SystemdNotifier {
    pub fn from_env() -> Self {
        Self {
            socket: std::env::var_os("NOTIFY_SOCKET").filter(|s| !s.is_empty()),
        }
    }

    pub fn with_socket(socket: impl Into<OsString>) -> Self {
        Self {
            socket: Some(socket.into()),
        }
    }

    /// Returns `Ok(false)` when no socket is configured.
    pub fn send(&self, state: &str) -> std::io::Result<bool> {
        match &self.socket {
            Some(socket) => send_datagram(socket, state.as_bytes()).map(|()| true),
            None => Ok(false),
        }
    }
}

impl ReadinessNotifier for SystemdNotifier {
    fn notify_ready(&self) {
        match self.send("READY=1") {
            Ok(true) => tracing::info!("Readiness reported to service manager"),
            Ok(false) => tracing::debug!("NOTIFY_SOCKET not set, skipping readiness notification"),
            Err(e) => tracing::warn!(error = %e, "Failed to report readiness"),
        }
    }
}

#[cfg(unix)]
fn send_datagram(socket: &OsString, message: &[u8]) -> std::io::Result<()> {
    use std::os::unix::ffi::OsStrExt;
    use std::os::unix::net::UnixDatagram;

    let sock = UnixDatagram::unbound()?;
    match socket.as_bytes().strip_prefix(b"@") {
        Some(name) => send_abstract(&sock, name, message),
        None => sock.send_to(message, socket).map(|_| ()),
    }
}

#[cfg(target_os = "linux")]
fn send_abstract(
    sock: &std::os::unix::net::UnixDatagram,
    name: &[u8],
    message: &[u8],
) -> std::io::Result<()> {
    use std::os::linux::net::SocketAddrExt;
    use std::os::unix::net::SocketAddr;

    let addr = SocketAddr::from_abstract_name(name)?;
    sock.send_to_addr(message, &addr).map(|_| ())
}

#[cfg(all(unix, not(target_os = "linux")))]
fn send_abstract(
    _sock: &std::os::unix::net::UnixDatagram,
    _name: &[u8],
    _message: &[u8],
) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "abstract notify sockets are only supported on Linux",
    ))
}

#[cfg(not(unix))]
fn send_datagram(_socket: &OsString, _message: &[u8]) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "notify sockets require a Unix platform",
    ))
}
