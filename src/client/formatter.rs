//! Transcript rendering for the client.

use std::io;

use crate::message::{Action, Message};

/// Renders received messages and connection events as transcript lines.
pub struct TranscriptFormatter;

impl TranscriptFormatter {
    /// Render one received message.
    pub fn format_message(message: &Message) -> String {
        match message.action {
            Action::Join => format!("{} joined", message.user),
            Action::Send => format!("{}: {}", message.user, message.content),
            Action::Leave => format!("{} left", message.user),
        }
    }

    /// Inline line for a login attempt that never got a connection.
    pub fn format_connection_failed(error: &io::Error) -> String {
        format!("connection failed: {error}")
    }

    /// Inline line for a connection that died mid-cycle.
    pub fn format_connection_lost(error: &io::Error) -> String {
        format!("connection lost: {error}")
    }

    /// Inline line for a server that closed the stream without an echo.
    pub fn format_connection_closed() -> String {
        "connection closed by server".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_join() {
        // テスト項目: JOIN が「user joined」として描画される
        // given (前提条件):
        let message = Message::join("alice");

        // when (操作):
        let line = TranscriptFormatter::format_message(&message);

        // then (期待する結果):
        assert_eq!(line, "alice joined");
    }

    #[test]
    fn test_format_send() {
        // テスト項目: SEND が「user: content」として描画される
        // given (前提条件):
        let message = Message::send("alice", "hi");

        // when (操作):
        let line = TranscriptFormatter::format_message(&message);

        // then (期待する結果):
        assert_eq!(line, "alice: hi");
    }

    #[test]
    fn test_format_leave() {
        // テスト項目: LEAVE が「user left」として描画される
        // given (前提条件):
        let message = Message::leave("bob");

        // when (操作):
        let line = TranscriptFormatter::format_message(&message);

        // then (期待する結果):
        assert_eq!(line, "bob left");
    }

    #[test]
    fn test_format_connection_failed_includes_the_cause() {
        // テスト項目: 接続失敗の行に原因が含まれる
        let error = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        let line = TranscriptFormatter::format_connection_failed(&error);
        assert!(line.starts_with("connection failed:"));
        assert!(line.contains("refused"));
    }
}
