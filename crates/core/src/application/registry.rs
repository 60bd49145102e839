// Connection Registry - live push connections keyed by owner

use crate::domain::{OwnerId, ServerMessage};
use crate::port::{AuthError, CredentialVerifier};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// WebSocket close code for a rejected handshake (policy violation)
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;

/// Outbound messages buffered per connection before events are dropped
pub const CONNECTION_BUFFER: usize = 64;

pub type ConnectionId = Uuid;

/// Non-owning handle to one live connection
///
/// The transport task owns the socket; the registry only holds the sending half
/// of the connection's outbound channel.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    owner_id: OwnerId,
    sender: mpsc::Sender<ServerMessage>,
}

impl ConnectionHandle {
    pub fn new(owner_id: impl Into<String>, sender: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id: owner_id.into(),
            sender,
        }
    }

    /// Create a handle together with the receiving half of its outbound channel
    pub fn channel(owner_id: impl Into<String>) -> (Self, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(CONNECTION_BUFFER);
        (Self::new(owner_id, tx), rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Non-blocking send; a full or closed channel misses the message
    pub fn try_deliver(&self, message: ServerMessage) -> bool {
        match self.sender.try_send(message) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(msg)) => {
                debug!(connection_id = %self.id, kind = msg.kind(), "Connection buffer full, event dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(msg)) => {
                debug!(connection_id = %self.id, kind = msg.kind(), "Connection closed, event dropped");
                false
            }
        }
    }
}

/// Handshake failure, turned into a close frame by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRejection {
    pub code: u16,
    pub reason: String,
}

impl HandshakeRejection {
    fn policy_violation(reason: &str) -> Self {
        Self {
            code: CLOSE_POLICY_VIOLATION,
            reason: reason.to_string(),
        }
    }
}

impl std::fmt::Display for HandshakeRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.reason, self.code)
    }
}

pub struct ConnectionRegistry {
    connections: DashMap<OwnerId, HashMap<ConnectionId, ConnectionHandle>>,
    verifier: Arc<dyn CredentialVerifier>,
}

impl ConnectionRegistry {
    pub fn new(verifier: Arc<dyn CredentialVerifier>) -> Self {
        Self {
            connections: DashMap::new(),
            verifier,
        }
    }

    /// Verify a handshake: the token must decode to the claimed owner
    pub fn authenticate(
        &self,
        token: Option<&str>,
        claimed_owner: Option<&str>,
    ) -> Result<OwnerId, HandshakeRejection> {
        let (token, claimed_owner) = match (token, claimed_owner) {
            (Some(t), Some(o)) if !t.is_empty() && !o.is_empty() => (t, o),
            _ => {
                warn!("Push handshake without token or userId");
                return Err(HandshakeRejection::policy_violation(
                    "Missing token or userId",
                ));
            }
        };

        match self.verifier.verify(token) {
            Ok(claims) if claims.owner_id == claimed_owner => Ok(claims.owner_id),
            Ok(claims) => {
                warn!(
                    claimed = %claimed_owner,
                    token_owner = %claims.owner_id,
                    "Push handshake userId mismatch"
                );
                Err(HandshakeRejection::policy_violation(
                    &AuthError::OwnerMismatch.to_string(),
                ))
            }
            Err(e) => {
                warn!(claimed = %claimed_owner, error = %e, "Push handshake token rejected");
                Err(HandshakeRejection::policy_violation(
                    "Token verification failed",
                ))
            }
        }
    }

    pub fn register(&self, connection: ConnectionHandle) {
        let owner_id = connection.owner_id.clone();
        let connection_id = connection.id;
        let count = {
            let mut entry = self.connections.entry(owner_id.clone()).or_default();
            entry.insert(connection_id, connection);
            entry.len()
        };
        info!(owner_id = %owner_id, connection_id = %connection_id, connections = count, "Connection registered");
    }

    /// Remove a connection; the owner entry goes away with its last connection
    pub fn unregister(&self, owner_id: &str, connection_id: ConnectionId) {
        let removed = self
            .connections
            .get_mut(owner_id)
            .map(|mut set| set.remove(&connection_id).is_some())
            .unwrap_or(false);
        self.connections.remove_if(owner_id, |_, set| set.is_empty());

        if removed {
            info!(owner_id = %owner_id, connection_id = %connection_id, "Connection unregistered");
        }
    }

    /// Snapshot of the owner's connections (possibly empty)
    pub fn connections_for(&self, owner_id: &str) -> Vec<ConnectionHandle> {
        self.connections
            .get(owner_id)
            .map(|set| set.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn owner_count(&self) -> usize {
        self.connections.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::credential_verifier::{Claims, MockCredentialVerifier};

    fn registry_with(verifier: MockCredentialVerifier) -> ConnectionRegistry {
        ConnectionRegistry::new(Arc::new(verifier))
    }

    fn open_registry() -> ConnectionRegistry {
        registry_with(MockCredentialVerifier::new())
    }

    fn claims(owner: &str) -> Claims {
        Claims {
            owner_id: owner.to_string(),
            issued_at: None,
            expires_at: None,
        }
    }

    #[test]
    fn test_register_unregister_leaves_remaining_connection() {
        let registry = open_registry();
        let (c1, _rx1) = ConnectionHandle::channel("owner");
        let (c2, _rx2) = ConnectionHandle::channel("owner");
        let c1_id = c1.id();
        let c2_id = c2.id();

        registry.register(c1);
        registry.register(c2);
        registry.unregister("owner", c1_id);

        let remaining = registry.connections_for("owner");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id(), c2_id);
    }

    #[test]
    fn test_owner_entry_removed_with_last_connection() {
        let registry = open_registry();
        let (c1, _rx) = ConnectionHandle::channel("owner");
        let id = c1.id();
        registry.register(c1);
        assert_eq!(registry.owner_count(), 1);

        registry.unregister("owner", id);
        assert_eq!(registry.owner_count(), 0);
        assert!(registry.connections_for("owner").is_empty());

        // Unknown ids are ignored
        registry.unregister("owner", id);
        registry.unregister("nobody", Uuid::new_v4());
        assert_eq!(registry.connection_count(), 0);
    }

    #[test]
    fn test_owners_are_isolated() {
        let registry = open_registry();
        let (a, _ra) = ConnectionHandle::channel("alice");
        let (b, _rb) = ConnectionHandle::channel("bob");
        registry.register(a);
        registry.register(b);

        assert_eq!(registry.connections_for("alice").len(), 1);
        assert_eq!(registry.connections_for("bob").len(), 1);
        assert_eq!(registry.connection_count(), 2);
        assert_eq!(registry.owner_count(), 2);
    }

    #[test]
    fn test_handshake_accepts_matching_owner() {
        let mut verifier = MockCredentialVerifier::new();
        verifier
            .expect_verify()
            .withf(|token| token.to_string() == "good-token")
            .returning(|_| Ok(claims("user-1")));

        let registry = registry_with(verifier);
        assert_eq!(
            registry.authenticate(Some("good-token"), Some("user-1")),
            Ok("user-1".to_string())
        );
    }

    #[test]
    fn test_handshake_rejects_missing_values_without_verifying() {
        let mut verifier = MockCredentialVerifier::new();
        verifier.expect_verify().never();
        let registry = registry_with(verifier);

        for (token, owner) in [(None, Some("u")), (Some("t"), None), (Some(""), Some("u"))] {
            let rejection = registry.authenticate(token, owner).unwrap_err();
            assert_eq!(rejection.code, CLOSE_POLICY_VIOLATION);
            assert_eq!(rejection.reason, "Missing token or userId");
        }
    }

    #[test]
    fn test_handshake_rejects_owner_mismatch() {
        let mut verifier = MockCredentialVerifier::new();
        verifier
            .expect_verify()
            .returning(|_| Ok(claims("someone-else")));

        let rejection = registry_with(verifier)
            .authenticate(Some("token"), Some("user-1"))
            .unwrap_err();
        assert_eq!(rejection.code, 1008);
        assert_eq!(rejection.reason, "Token does not belong to the claimed user");
    }

    #[test]
    fn test_handshake_rejects_invalid_token() {
        let mut verifier = MockCredentialVerifier::new();
        verifier
            .expect_verify()
            .returning(|_| Err(AuthError::Expired));

        let rejection = registry_with(verifier)
            .authenticate(Some("stale"), Some("user-1"))
            .unwrap_err();
        assert_eq!(rejection.code, 1008);
        assert_eq!(rejection.reason, "Token verification failed");
    }

    #[tokio::test]
    async fn test_concurrent_registration() {
        let registry = Arc::new(open_registry());
        let mut tasks = Vec::new();

        for i in 0..16 {
            let registry = Arc::clone(&registry);
            tasks.push(tokio::spawn(async move {
                let owner = format!("owner-{}", i % 4);
                let mut receivers = Vec::new();
                let mut ids = Vec::new();
                for _ in 0..10 {
                    let (handle, rx) = ConnectionHandle::channel(owner.clone());
                    ids.push(handle.id());
                    receivers.push(rx);
                    registry.register(handle);
                }
                for id in ids.iter().take(5) {
                    registry.unregister(&owner, *id);
                }
                receivers
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(registry.connection_count(), 16 * 5);
        assert_eq!(registry.owner_count(), 4);
    }

    #[test]
    fn test_try_deliver_to_closed_connection() {
        let (handle, rx) = ConnectionHandle::channel("owner");
        drop(rx);
        assert!(handle.is_closed());
        assert!(!handle.try_deliver(ServerMessage::Connected {
            user_id: "owner".into(),
            timestamp: "2024-01-01T00:00:00.000Z".into(),
        }));
    }
}
