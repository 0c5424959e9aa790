//! Backend route table

use crate::types::{ConversationId, StreamId};

pub const SEND_MESSAGE: &str = "/chat/send";
pub const CONVERSATIONS: &str = "/chat/conversations";
pub const AUTH_REFRESH: &str = "/auth/refresh";

pub fn stream(stream_id: &StreamId) -> String {
    format!("/chat/stream/{}", stream_id)
}

pub fn history(id: &ConversationId) -> String {
    format!("/chat/history/{}", id)
}

pub fn conversation(id: &ConversationId) -> String {
    format!("/chat/conversations/{}", id)
}

pub fn rename_conversation(id: &ConversationId) -> String {
    format!("/chat/conversations/{}/rename", id)
}

pub fn pin_conversation(id: &ConversationId) -> String {
    format!("/chat/conversations/{}/pin", id)
}

/// Join a base URL and a route, tolerating a trailing slash on the base
pub fn join(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_trims_trailing_slash() {
        assert_eq!(
            join("http://localhost:5000/", SEND_MESSAGE),
            "http://localhost:5000/chat/send"
        );
        assert_eq!(
            join("http://localhost:5000", &stream(&StreamId::new("abc"))),
            "http://localhost:5000/chat/stream/abc"
        );
    }
}
