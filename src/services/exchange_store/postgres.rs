use super::{ConversationState, ExchangeRecord, ExchangeStore, RecordedExchange};
use crate::db;
use crate::helpers::ids;
use crate::models::{Conversation, MessageMetadata, MessageRole};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;

pub struct PgExchangeStore {
    pool: PgPool,
    title_max_chars: usize,
}

impl PgExchangeStore {
    pub fn new(pool: PgPool, title_max_chars: usize) -> Self {
        Self {
            pool,
            title_max_chars,
        }
    }
}

#[async_trait]
impl ExchangeStore for PgExchangeStore {
    async fn conversation_state(
        &self,
        conversation_id: &str,
        user_id: i64,
    ) -> Result<Option<ConversationState>, String> {
        let conversation =
            match db::conversation::fetch_owned(&self.pool, conversation_id, user_id).await? {
                Some(conversation) => conversation,
                None => return Ok(None),
            };
        let message_count = db::message::count_live(&self.pool, conversation_id).await?;

        Ok(Some(ConversationState {
            remote_conversation_id: conversation.remote_conversation_id,
            message_count,
        }))
    }

    #[tracing::instrument(
        name = "Record chat exchange.",
        skip(self, exchange),
        fields(user_id = exchange.user_id, requested = %exchange.requested_conversation_id)
    )]
    async fn record_exchange(&self, exchange: &ExchangeRecord) -> Result<RecordedExchange, String> {
        // rolled back on drop, so every early return below undoes the writes
        let mut tx = self.pool.begin().await.map_err(|err| {
            tracing::error!("Failed to begin transaction: {:?}", err);
            "Failed to begin transaction".to_string()
        })?;

        let touched = if Conversation::is_new_sentinel(&exchange.requested_conversation_id) {
            None
        } else {
            db::conversation::touch_owned(
                &mut *tx,
                exchange.requested_conversation_id.trim(),
                exchange.user_id,
                &exchange.remote_conversation_id,
            )
            .await?
        };

        let created = touched.is_none();
        let conversation = match touched {
            Some(conversation) => conversation,
            None => {
                db::conversation::insert(
                    &mut *tx,
                    &ids::conversation_id(),
                    &exchange.remote_conversation_id,
                    &exchange.session_id,
                    exchange.user_id,
                    &Conversation::title_from(&exchange.user_content, self.title_max_chars),
                )
                .await?
            }
        };

        let user_message = db::message::insert(
            &mut *tx,
            &ids::message_id(),
            &conversation.conversation_id,
            None,
            MessageRole::User,
            &exchange.user_content,
            &MessageMetadata::for_user(exchange.attachment.as_ref()),
        )
        .await?;

        let assistant_message = db::message::insert(
            &mut *tx,
            &ids::message_id(),
            &conversation.conversation_id,
            Some(&user_message.message_id),
            MessageRole::Assistant,
            &exchange.assistant_content,
            &MessageMetadata::for_assistant(exchange.api_response.clone(), Utc::now()),
        )
        .await?;

        let history = db::chat_history::insert(
            &mut *tx,
            &ids::chat_id(),
            &conversation.conversation_id,
            &exchange.session_id,
            &exchange.user_content,
            &exchange.assistant_content,
            exchange.attachment.as_ref(),
        )
        .await?;

        tx.commit().await.map_err(|err| {
            tracing::error!("Failed to commit exchange: {:?}", err);
            "Failed to commit exchange".to_string()
        })?;

        tracing::info!(
            conversation_id = %conversation.conversation_id,
            created,
            "Exchange saved"
        );

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
