//! Fan-out of one message to every registered session.

use std::sync::Arc;

use crate::message::Message;

use super::registry::SessionRegistry;

/// Delivers messages to all sessions in the registry's current snapshot.
///
/// Delivery failures are strictly per-recipient: a session whose connection
/// is gone gets a warning in the log and the pass continues. Failed
/// deliveries are never retried and never remove the session here; removal
/// belongs to the connection task that owns the session.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    registry: Arc<SessionRegistry>,
}

impl Broadcaster {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    pub fn broadcast(&self, message: &Message) {
        self.registry.for_each(|session| {
            if let Err(e) = session.deliver(message.clone()) {
                tracing::warn!(
                    user = %session.user(),
                    conn_id = session.conn_id(),
                    error = %e,
                    "failed to deliver broadcast to session"
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::super::registry::Session;
    use super::*;

    fn register(
        registry: &SessionRegistry,
        user: &str,
        conn_id: u64,
    ) -> mpsc::UnboundedReceiver<Message> {
        let (sender, receiver) = mpsc::unbounded_channel();
        assert!(registry.add(Session::new(user, conn_id, sender)));
        receiver
    }

    #[test]
    fn test_broadcast_reaches_every_session_including_the_sender() {
        // テスト項目: ブロードキャストが送信者自身を含む全セッションに届く
        // given (前提条件):
        let registry = Arc::new(SessionRegistry::new());
        let mut alice_rx = register(&registry, "alice", 1);
        let mut bob_rx = register(&registry, "bob", 2);
        let broadcaster = Broadcaster::new(Arc::clone(&registry));

        // when (操作):
        broadcaster.broadcast(&Message::send("alice", "hi"));

        // then (期待する結果):
        assert_eq!(alice_rx.try_recv().expect("alice receives").content, "hi");
        assert_eq!(bob_rx.try_recv().expect("bob receives").content, "hi");
    }

    #[test]
    fn test_one_dead_recipient_does_not_stop_the_pass() {
        // テスト項目: 1 件の配送失敗が残りのセッションへの配送を妨げない
        // given (前提条件):
        let registry = Arc::new(SessionRegistry::new());
        let mut alice_rx = register(&registry, "alice", 1);
        let bob_rx = register(&registry, "bob", 2);
        let mut carol_rx = register(&registry, "carol", 3);
        drop(bob_rx); // bob's connection is gone but the session lingers

        let broadcaster = Broadcaster::new(Arc::clone(&registry));

        // when (操作):
        broadcaster.broadcast(&Message::send("alice", "still here?"));

        // then (期待する結果):
        assert!(alice_rx.try_recv().is_ok());
        assert!(carol_rx.try_recv().is_ok());
        // 配送失敗してもセッションは登録されたまま
        assert_eq!(registry.len(), 3);
    }
}
