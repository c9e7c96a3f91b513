//! The GABP connector: an external collaborator per spec.md §6. The core
//! only needs its boolean outcome; the wire protocol itself is out of scope
//! for this repository.

use async_trait::async_trait;
use tracing::debug;

/// Synchronous from the Serialized Starter's point of view: it either
/// connects within the starter's own `gabp_connect_timeout`, or doesn't.
#[async_trait]
pub trait GabpConnector: Send + Sync {
    async fn attempt_connection(&self, game_id: &str, port: u16, token: &str) -> bool;
}

/// The default connector when nothing else is wired in. Reports failure
/// without attempting any I/O, so `StartWithVerification` still succeeds
/// with `gabp_connected = false` rather than blocking on a handshake no
/// game on the other end will ever answer.
#[derive(Debug, Default)]
pub struct NullGabpConnector;

#[async_trait]
impl GabpConnector for NullGabpConnector {
    async fn attempt_connection(&self, game_id: &str, port: u16, _token: &str) -> bool {
        debug!(game_id, port, "no GABP connector configured; reporting not connected");
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_connector_always_reports_false() {
        let connector = NullGabpConnector;
        assert!(!connector.attempt_connection("g1", 4000, "tok").await);
    }
}
