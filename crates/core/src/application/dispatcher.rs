// Notification Dispatcher - fire-and-forget fan-out to an owner's connections

use super::registry::{ConnectionHandle, ConnectionRegistry};
use crate::domain::timestamp::to_rfc3339;
use crate::domain::{InvoiceStatus, PackageStatus, ServerMessage};
use crate::port::{StatusNotifier, TimeProvider};
use std::sync::Arc;
use tracing::debug;

pub struct NotificationDispatcher {
    registry: Arc<ConnectionRegistry>,
    time_provider: Arc<dyn TimeProvider>,
}

impl NotificationDispatcher {
    pub fn new(registry: Arc<ConnectionRegistry>, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            registry,
            time_provider,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    fn timestamp(&self) -> String {
        to_rfc3339(self.time_provider.now_millis())
    }

    /// Greet, then register, so `connected` is always the first message
    pub fn attach(&self, connection: ConnectionHandle) {
        self.send_connected(&connection);
        self.registry.register(connection);
    }

    pub fn send_connected(&self, connection: &ConnectionHandle) -> bool {
        connection.try_deliver(ServerMessage::Connected {
            user_id: connection.owner_id().to_string(),
            timestamp: self.timestamp(),
        })
    }

    /// Deliver to every current connection of the owner; returns the delivered count
    pub fn broadcast(&self, owner_id: &str, message: ServerMessage) -> usize {
        let connections = self.registry.connections_for(owner_id);
        if connections.is_empty() {
            debug!(owner_id = %owner_id, kind = message.kind(), "No live connections, event skipped");
            return 0;
        }

        let delivered = connections
            .iter()
            .filter(|conn| conn.try_deliver(message.clone()))
            .count();
        debug!(
            owner_id = %owner_id,
            kind = message.kind(),
            delivered,
            connections = connections.len(),
            "Event dispatched"
        );
        delivered
    }
}

impl StatusNotifier for NotificationDispatcher {
    fn invoice_status(
        &self,
        owner_id: &str,
        invoice_id: &str,
        status: InvoiceStatus,
        package_id: Option<&str>,
    ) {
        let message = ServerMessage::InvoiceStatusUpdate {
            invoice_id: invoice_id.to_string(),
            status,
            package_id: package_id.map(str::to_string),
            timestamp: self.timestamp(),
        };
        self.broadcast(owner_id, message);
    }

    fn package_status(&self, owner_id: &str, package_id: &str, status: PackageStatus) {
        let message = ServerMessage::PackageStatusUpdate {
            package_id: package_id.to_string(),
            status,
            timestamp: self.timestamp(),
        };
        self.broadcast(owner_id, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::credential_verifier::mocks::StaticCredentialVerifier;
    use crate::port::time_provider::mocks::SteppingClock;
    use tokio::sync::mpsc::error::TryRecvError;

    fn dispatcher() -> NotificationDispatcher {
        let registry = Arc::new(ConnectionRegistry::new(Arc::new(
            StaticCredentialVerifier::new(),
        )));
        NotificationDispatcher::new(registry, Arc::new(SteppingClock::new(0, 1_000)))
    }

    #[test]
    fn test_notify_without_connections_is_noop() {
        let dispatcher = dispatcher();
        dispatcher.invoice_status("ghost", "inv-1", InvoiceStatus::Queued, None);
        dispatcher.package_status("ghost", "pkg-1", PackageStatus::Processing);
        assert_eq!(dispatcher.registry().connection_count(), 0);
    }

    #[test]
    fn test_events_arrive_in_call_order() {
        let dispatcher = dispatcher();
        let (conn, mut rx) = ConnectionHandle::channel("owner");
        dispatcher.registry().register(conn);

        for status in [
            InvoiceStatus::Queued,
            InvoiceStatus::Processing,
            InvoiceStatus::Processed,
        ] {
            dispatcher.invoice_status("owner", "inv-1", status, Some("pkg-1"));
        }

        let mut seen = Vec::new();
        while let Ok(ServerMessage::InvoiceStatusUpdate {
            status, package_id, ..
        }) = rx.try_recv()
        {
            assert_eq!(package_id.as_deref(), Some("pkg-1"));
            seen.push(status);
        }
        assert_eq!(
            seen,
            vec![
                InvoiceStatus::Queued,
                InvoiceStatus::Processing,
                InvoiceStatus::Processed
            ]
        );
    }

    #[test]
    fn test_fan_out_skips_closed_connections() {
        let dispatcher = dispatcher();
        let (open, mut open_rx) = ConnectionHandle::channel("owner");
        let (closed, closed_rx) = ConnectionHandle::channel("owner");
        let (other, mut other_rx) = ConnectionHandle::channel("someone-else");
        drop(closed_rx);
        dispatcher.registry().register(open);
        dispatcher.registry().register(closed);
        dispatcher.registry().register(other);

        let delivered = dispatcher.broadcast(
            "owner",
            ServerMessage::PackageStatusUpdate {
                package_id: "pkg-1".into(),
                status: PackageStatus::Completed,
                timestamp: "2024-01-01T00:00:00.000Z".into(),
            },
        );

        assert_eq!(delivered, 1);
        assert!(matches!(
            open_rx.try_recv(),
            Ok(ServerMessage::PackageStatusUpdate { .. })
        ));
        assert_eq!(other_rx.try_recv().unwrap_err(), TryRecvError::Empty);
    }

    #[test]
    fn test_connected_greeting() {
        let dispatcher = dispatcher();
        let (conn, mut rx) = ConnectionHandle::channel("user-7");
        assert!(dispatcher.send_connected(&conn));

        match rx.try_recv().unwrap() {
            ServerMessage::Connected { user_id, timestamp } => {
                assert_eq!(user_id, "user-7");
                assert_eq!(timestamp, "1970-01-01T00:00:00.000Z");
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_attach_greets_before_events() {
        let dispatcher = dispatcher();
        let (conn, mut rx) = ConnectionHandle::channel("user-7");
        dispatcher.attach(conn);
        dispatcher.invoice_status("user-7", "inv-1", InvoiceStatus::Queued, None);

        assert!(matches!(rx.try_recv(), Ok(ServerMessage::Connected { .. })));
        assert!(matches!(
            rx.try_recv(),
            Ok(ServerMessage::InvoiceStatusUpdate { .. })
        ));
        assert_eq!(dispatcher.registry().connection_count(), 1);
    }
}
