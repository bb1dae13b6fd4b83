use super::{ConversationState, ExchangeRecord, ExchangeStore, RecordedExchange};
use crate::helpers::ids;
use crate::models::{ChatHistory, Conversation, Message, MessageMetadata, MessageRole};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::types::Json;
use std::sync::Mutex;

/// Write that fails on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    Conversation,
    UserMessage,
    AssistantMessage,
    ChatHistory,
}

#[derive(Debug, Clone, Default)]
pub struct Tables {
    pub conversations: Vec<Conversation>,
    pub messages: Vec<Message>,
    pub history: Vec<ChatHistory>,
}

/// In-memory store. Writes go to a staged copy of the tables that replaces
/// the committed copy only when all four writes succeeded.
#[derive(Default)]
pub struct MemoryExchangeStore {
    title_max_chars: usize,
    tables: Mutex<Tables>,
    fail_at: Mutex<Option<FailPoint>>,
}

impl MemoryExchangeStore {
    pub fn new(title_max_chars: usize) -> Self {
        Self {
            title_max_chars,
            ..Default::default()
        }
    }

    pub fn fail_at(&self, point: Option<FailPoint>) {
        *self.fail_at.lock().unwrap() = point;
    }

    pub fn tables(&self) -> Tables {
        self.tables.lock().unwrap().clone()
    }

    /// Seed a conversation holding `messages` stored messages.
    pub fn seed_conversation(&self, conversation_id: &str, owner_user_id: i64, messages: usize) {
        let mut tables = self.tables.lock().unwrap();
        tables.conversations.push(conversation(conversation_id, "", "seed", owner_user_id, "seed"));
        for i in 0..messages {
            let role = if i % 2 == 0 { MessageRole::User } else { MessageRole::Assistant };
            tables.messages.push(message(conversation_id, None, role, "seed", MessageMetadata::default()));
        }
    }

    fn check(&self, point: FailPoint) -> Result<(), String> {
        if *self.fail_at.lock().unwrap() == Some(point) {
            return Err(format!("injected failure at {:?}", point));
        }
        Ok(())
    }
}

fn conversation(
    conversation_id: &str,
    remote_conversation_id: &str,
    session_id: &str,
    owner_user_id: i64,
    title: &str,
) -> Conversation {
    let now = Utc::now();
    Conversation {
        id: 0,
        conversation_id: conversation_id.to_string(),
        remote_conversation_id: remote_conversation_id.to_string(),
        session_id: session_id.to_string(),
        owner_user_id,
        title: title.to_string(),
        created_at: now,
        updated_at: now,
        deleted_at: None,
    }
}

fn message(
    conversation_id: &str,
    parent: Option<&str>,
    role: MessageRole,
    content: &str,
    metadata: MessageMetadata,
) -> Message {
    let now = Utc::now();
    Message {
        id: 0,
        message_id: ids::message_id(),
        conversation_id: conversation_id.to_string(),
        parent_message_id: parent.map(str::to_string),
        role: role.to_string(),
        content: content.to_string(),
        metadata: Json(metadata),
        created_at: now,
        updated_at: now,
        deleted_at: None,
    }
}

#[async_trait]
impl ExchangeStore for MemoryExchangeStore {
    async fn conversation_state(
        &self,
        conversation_id: &str,
        user_id: i64,
    ) -> Result<Option<ConversationState>, String> {
        let tables = self.tables.lock().unwrap();
        let conversation = tables.conversations.iter().find(|c| {
            c.conversation_id == conversation_id && c.owner_user_id == user_id && c.deleted_at.is_none()
        });

        Ok(conversation.map(|c| ConversationState {
            remote_conversation_id: c.remote_conversation_id.clone(),
            message_count: tables
                .messages
                .iter()
                .filter(|m| m.conversation_id == conversation_id && m.deleted_at.is_none())
                .count() as i64,
        }))
    }

    async fn record_exchange(&self, exchange: &ExchangeRecord) -> Result<RecordedExchange, String> {
        let mut staged = self.tables();

        let requested = exchange.requested_conversation_id.trim();
        let existing = if Conversation::is_new_sentinel(requested) {
            None
        } else {
            staged.conversations.iter_mut().find(|c| {
                c.conversation_id == requested
                    && c.owner_user_id == exchange.user_id
                    && c.deleted_at.is_none()
            })
        };

        self.check(FailPoint::Conversation)?;
        let (conversation, created) = match existing {
            Some(c) => {
                c.updated_at = Utc::now();
                if c.remote_conversation_id.is_empty() {
                    c.remote_conversation_id = exchange.remote_conversation_id.clone();
                }
                (c.clone(), false)
            }
            None => {
                let c = conversation(
                    &ids::conversation_id(),
                    &exchange.remote_conversation_id,
                    &exchange.session_id,
                    exchange.user_id,
                    &Conversation::title_from(&exchange.user_content, self.title_max_chars),
                );
                staged.conversations.push(c.clone());
                (c, true)
            }
        };

        self.check(FailPoint::UserMessage)?;
        let user_message = message(
            &conversation.conversation_id,
            None,
            MessageRole::User,
            &exchange.user_content,
            MessageMetadata::for_user(exchange.attachment.as_ref()),
        );
        staged.messages.push(user_message.clone());

        self.check(FailPoint::AssistantMessage)?;
        let assistant_message = message(
            &conversation.conversation_id,
            Some(&user_message.message_id),
            MessageRole::Assistant,
            &exchange.assistant_content,
            MessageMetadata::for_assistant(exchange.api_response.clone(), Utc::now()),
        );
        staged.messages.push(assistant_message.clone());

        self.check(FailPoint::ChatHistory)?;
        let now = Utc::now();
        let history = ChatHistory {
            id: 0,
            chat_id: ids::chat_id(),
            conversation_id: conversation.conversation_id.clone(),
            session_id: exchange.session_id.clone(),
            user_text: exchange.user_content.clone(),
            assistant_text: exchange.assistant_content.clone(),
            file_name: exchange.attachment.as_ref().map(|a| a.name.clone()),
            file_url: exchange.attachment.as_ref().map(|a| a.url.clone()),
            file_type: exchange.attachment.as_ref().map(|a| a.content_type.clone()),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        staged.history.push(history.clone());

        *self.tables.lock().unwrap() = staged;

        Ok(RecordedExchange {
            conversation_id: conversation.conversation_id,
            remote_conversation_id: conversation.remote_conversation_id,
            user_message_id: user_message.message_id,
            assistant_message_id: assistant_message.message_id,
            chat_id: history.chat_id,
            created,
        })
    }
}
