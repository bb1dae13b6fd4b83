//! Opaque identifiers. A random v4 UUID behind a short type prefix, so ids
//! from different tables can't be confused in logs or payloads.

use uuid::Uuid;

pub const CONVERSATION_PREFIX: &str = "conv_";
pub const MESSAGE_PREFIX: &str = "msg_";
pub const CHAT_PREFIX: &str = "chat_";

fn prefixed(prefix: &str) -> String {
    format!("{}{}", prefix, Uuid::new_v4())
}

pub fn conversation_id() -> String {
    prefixed(CONVERSATION_PREFIX)
}

pub fn message_id() -> String {
    prefixed(MESSAGE_PREFIX)
}

pub fn chat_id() -> String {
    prefixed(CHAT_PREFIX)
}

/// Storage name for an uploaded file: fresh UUID plus the original extension.
pub fn upload_file_name(extension: Option<&str>) -> String {
    match extension {
        Some(ext) if !ext.is_empty() => format!("{}.{}", Uuid::new_v4(), ext),
        _ => Uuid::new_v4().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_carry_their_prefix() {
        assert!(conversation_id().starts_with("conv_"));
        assert!(message_id().starts_with("msg_"));
        assert!(chat_id().starts_with("chat_"));
    }

    #[test]
    fn ids_do_not_repeat() {
        let ids: HashSet<String> = (0..1000).map(|_| message_id()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn upload_name_keeps_extension() {
        let name = upload_file_name(Some("png"));
        assert!(name.ends_with(".png"));
        assert_eq!(name.len(), 36 + 4);

        let bare = upload_file_name(None);
        assert!(Uuid::parse_str(&bare).is_ok());
    }
}
