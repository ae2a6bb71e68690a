//! The session registry: a copy-on-write set of logged-in users.
//!
//! Broadcasts iterate a snapshot while join/leave mutate the set from other
//! connection tasks. Reads vastly outnumber writes here, so writers pay the
//! cost: they clone the set, mutate the clone, and swap it in atomically.
//! A pass over a snapshot is never disturbed by a concurrent add or remove.

use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, RwLock};

use tokio::sync::mpsc;

use crate::message::Message;

/// Outbound channel toward one client, drained by that connection's writer
/// task.
pub type SessionSender = mpsc::UnboundedSender<Message>;

/// Error returned when delivering to a session whose connection has gone.
pub type DeliveryError = mpsc::error::SendError<Message>;

/// One logged-in user: a display name bound to the outbound channel of the
/// connection it joined on.
///
/// Identity is the `(user, conn_id)` pair. The same display name joining
/// again on a different connection is a distinct session; the same pair
/// joining twice is the same session.
#[derive(Debug, Clone)]
pub struct Session {
    user: String,
    conn_id: u64,
    sender: SessionSender,
}

impl Session {
    pub fn new(user: impl Into<String>, conn_id: u64, sender: SessionSender) -> Self {
        Self {
            user: user.into(),
            conn_id,
            sender,
        }
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn conn_id(&self) -> u64 {
        self.conn_id
    }

    /// Queue a message on this session's outbound channel.
    pub fn deliver(&self, message: Message) -> Result<(), DeliveryError> {
        self.sender.send(message)
    }
}

impl PartialEq for Session {
    fn eq(&self, other: &Self) -> bool {
        self.user == other.user && self.conn_id == other.conn_id
    }
}

impl Eq for Session {}

impl Hash for Session {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.user.hash(state);
        self.conn_id.hash(state);
    }
}

/// Concurrent set of active sessions.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<Arc<HashSet<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a session. Returns `false` without mutating anything if an
    /// equal session is already registered, making join idempotent.
    pub fn add(&self, session: Session) -> bool {
        let mut current = self.sessions.write().expect("session set lock poisoned");
        if current.contains(&session) {
            return false;
        }
        let mut next = (**current).clone();
        next.insert(session);
        *current = Arc::new(next);
        true
    }

    /// Remove a session. Returns `true` if it was present.
    pub fn remove(&self, session: &Session) -> bool {
        let mut current = self.sessions.write().expect("session set lock poisoned");
        if !current.contains(session) {
            return false;
        }
        let mut next = (**current).clone();
        next.remove(session);
        *current = Arc::new(next);
        true
    }

    pub fn contains(&self, session: &Session) -> bool {
        self.snapshot().contains(session)
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// The set of sessions as of some moment within this call.
    pub fn snapshot(&self) -> Arc<HashSet<Session>> {
        Arc::clone(&self.sessions.read().expect("session set lock poisoned"))
    }

    /// Visit every session in the current snapshot. Membership changes made
    /// concurrently by other tasks do not affect an in-progress pass.
    pub fn for_each(&self, mut visitor: impl FnMut(&Session)) {
        for session in self.snapshot().iter() {
            visitor(session);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(user: &str, conn_id: u64) -> (Session, mpsc::UnboundedReceiver<Message>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Session::new(user, conn_id, sender), receiver)
    }

    #[test]
    fn test_add_is_idempotent() {
        // テスト項目: 同一セッションを二度 add しても登録は一件のまま
        // given (前提条件):
        let registry = SessionRegistry::new();
        let (alice, _rx) = session("alice", 1);

        // when (操作):
        let first = registry.add(alice.clone());
        let second = registry.add(alice);

        // then (期待する結果):
        assert!(first);
        assert!(!second);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_same_user_on_another_connection_is_a_distinct_session() {
        // テスト項目: 同じ表示名でも接続が異なれば別セッションとして共存する
        // given (前提条件):
        let registry = SessionRegistry::new();
        let (first, _rx1) = session("alice", 1);
        let (second, _rx2) = session("alice", 2);

        // when (操作):
        registry.add(first);
        registry.add(second);

        // then (期待する結果):
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_remove_reports_presence() {
        // テスト項目: remove は対象が登録されていたかどうかを返す
        // given (前提条件):
        let registry = SessionRegistry::new();
        let (alice, _rx) = session("alice", 1);
        registry.add(alice.clone());

        // when (操作):
        let removed = registry.remove(&alice);
        let removed_again = registry.remove(&alice);

        // then (期待する結果):
        assert!(removed);
        assert!(!removed_again);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_snapshot_is_unaffected_by_later_mutation() {
        // テスト項目: 取得済みスナップショットは後続の変更の影響を受けない
        // given (前提条件):
        let registry = SessionRegistry::new();
        let (alice, _rx1) = session("alice", 1);
        let (bob, _rx2) = session("bob", 2);
        registry.add(alice.clone());
        registry.add(bob);

        // when (操作):
        let snapshot = registry.snapshot();
        registry.remove(&alice);

        // then (期待する結果):
        assert_eq!(snapshot.len(), 2);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_no_delivery_after_removal_completes() {
        // テスト項目: remove 完了後に同一スレッドで配送しても対象には届かない
        // given (前提条件):
        let registry = SessionRegistry::new();
        let (alice, mut alice_rx) = session("alice", 1);
        let (bob, mut bob_rx) = session("bob", 2);
        registry.add(alice.clone());
        registry.add(bob);

        // when (操作):
        registry.remove(&alice);
        registry.for_each(|s| {
            s.deliver(Message::send("bob", "hi")).ok();
        });

        // then (期待する結果):
        assert!(alice_rx.try_recv().is_err());
        assert_eq!(bob_rx.try_recv().expect("bob receives").content, "hi");
    }

    #[test]
    fn test_concurrent_mutation_and_iteration() {
        // テスト項目: add / remove / for_each の並行実行が破綻しない
        // given (前提条件):
        let registry = Arc::new(SessionRegistry::new());
        let mut receivers = Vec::new();
        for i in 0..8 {
            let (s, rx) = session(&format!("user-{i}"), i);
            registry.add(s);
            receivers.push(rx);
        }

        // when (操作):
        let mut handles = Vec::new();
        for t in 0..4u64 {
            let registry = Arc::clone(&registry);
            handles.push(std::thread::spawn(move || {
                for i in 0..200u64 {
                    let conn_id = 100 + t * 1000 + i;
                    let (sender, _rx) = mpsc::unbounded_channel();
                    let churn = Session::new(format!("churn-{t}"), conn_id, sender);
                    assert!(registry.add(churn.clone()));
                    let mut seen = 0;
                    registry.for_each(|_| seen += 1);
                    assert!(seen >= 8);
                    assert!(registry.remove(&churn));
                }
            }));
        }
        for handle in handles {
            handle.join().expect("churn thread panicked");
        }

        // then (期待する結果):
        assert_eq!(registry.len(), 8);
    }
}
