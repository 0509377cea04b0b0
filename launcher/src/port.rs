use std::net::{SocketAddr, TcpListener};
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::{Instant, sleep};

use crate::error::LaunchError;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Bind `addr` once and release it, so an occupied port fails before the
/// server is spawned.
pub fn ensure_port_free(addr: SocketAddr) -> Result<(), LaunchError> {
    match TcpListener::bind(addr) {
        Ok(listener) => {
            drop(listener);
            Ok(())
        }
        Err(source) => Err(LaunchError::PortBind { addr, source }),
    }
}

/// Poll until something accepts TCP connections on `addr` or `timeout`
/// passes. Returns whether a connection succeeded.
pub async fn wait_until_accepting(addr: SocketAddr, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if TcpStream::connect(addr).await.is_ok() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(POLL_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use std::net::{SocketAddr, TcpListener};
    use std::time::Duration;

    use super::{ensure_port_free, wait_until_accepting};
    use crate::error::LaunchError;

    #[test]
    fn occupied_port_is_a_bind_error() {
        let held = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = held.local_addr().unwrap();
        let err = ensure_port_free(addr).unwrap_err();
        assert!(matches!(err, LaunchError::PortBind { addr: a, .. } if a == addr));

        drop(held);
        ensure_port_free(addr).unwrap();
    }

    #[tokio::test]
    async fn readiness_follows_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        assert!(wait_until_accepting(addr, Duration::from_secs(1)).await);

        drop(listener);
        assert!(!wait_until_accepting(addr, Duration::from_millis(120)).await);
    }
}
