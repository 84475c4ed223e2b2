use super::{ConversationStore, InsertOutcome, MessageLog};
use crate::error::{AppError, AppResult, Resource};
use crate::models::{
    stored_now, Conversation, Message, MessageContent, MessageSummary, ParticipantState,
    PendingMessage, UserId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{GenericClient, Pool};
use std::collections::HashMap;
use tokio_postgres::types::Json;
use tokio_postgres::Row;
use uuid::Uuid;

const CONVERSATION_COLUMNS: &str = "id, is_group, name, avatar_url, last_message, seen_by, \
     created_at, updated_at, dissolved_at";

const MESSAGE_COLUMNS: &str = "id, conversation_id, sender_id, content, sequence_number, created_at";

/// PostgreSQL-backed conversation store and message log.
///
/// Every mutation is a single conditional statement (or a short transaction),
/// never a read-modify-write of the whole conversation row.
#[derive(Clone)]
pub struct PostgresStore {
    pool: Pool,
}

impl PostgresStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    async fn load_participants<C: GenericClient>(
        client: &C,
        ids: &[Uuid],
    ) -> AppResult<HashMap<Uuid, Vec<ParticipantState>>> {
        let rows = client
            .query(
                r#"
                SELECT conversation_id, user_id, joined_at, muted, delete_watermark
                FROM conversation_participants
                WHERE conversation_id = ANY($1)
                ORDER BY ordinal ASC
                "#,
                &[&ids],
            )
            .await?;

        let mut grouped: HashMap<Uuid, Vec<ParticipantState>> = HashMap::new();
        for row in rows {
            grouped
                .entry(row.get("conversation_id"))
                .or_default()
                .push(ParticipantState {
                    user_id: UserId::from(row.get::<_, String>("user_id")),
                    joined_at: row.get("joined_at"),
                    muted: row.get("muted"),
                    delete_watermark: row.get("delete_watermark"),
                });
        }
        Ok(grouped)
    }

    async fn hydrate<C: GenericClient>(client: &C, rows: Vec<Row>) -> AppResult<Vec<Conversation>> {
        let ids: Vec<Uuid> = rows.iter().map(|row| row.get("id")).collect();
        let mut participants = Self::load_participants(client, &ids).await?;
        Ok(rows
            .iter()
            .map(|row| {
                let id: Uuid = row.get("id");
                conversation_from_row(row, participants.remove(&id).unwrap_or_default())
            })
            .collect())
    }

    async fn require_conversation<C: GenericClient>(client: &C, id: Uuid) -> AppResult<()> {
        let row = client
            .query_opt("SELECT 1 FROM conversations WHERE id = $1", &[&id])
            .await?;
        match row {
            Some(_) => Ok(()),
            None => Err(AppError::NotFound(Resource::Conversation)),
        }
    }

    /// Maps "no row changed" to `false`, or to NotFound when the conversation is gone
    async fn changed_or_missing<C: GenericClient>(
        client: &C,
        id: Uuid,
        affected: u64,
    ) -> AppResult<bool> {
        if affected > 0 {
            return Ok(true);
        }
        Self::require_conversation(client, id).await?;
        Ok(false)
    }
}

/// OFFSET/LIMIT argument; saturates instead of wrapping negative
fn pg_count(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn conversation_from_row(row: &Row, participants: Vec<ParticipantState>) -> Conversation {
    let last_message: Option<Json<MessageSummary>> = row.get("last_message");
    let seen_by: Vec<String> = row.get("seen_by");
    Conversation {
        id: row.get("id"),
        is_group: row.get("is_group"),
        name: row.get("name"),
        avatar_url: row.get("avatar_url"),
        participants,
        last_message: last_message.map(|Json(summary)| summary),
        seen_by: seen_by.into_iter().map(UserId::from).collect(),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        dissolved_at: row.get("dissolved_at"),
    }
}

fn message_from_row(row: &Row) -> Message {
    let Json(content): Json<MessageContent> = row.get("content");
    Message {
        id: row.get("id"),
        conversation_id: row.get("conversation_id"),
        sender_id: UserId::from(row.get::<_, String>("sender_id")),
        content,
        sequence_number: row.get("sequence_number"),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl ConversationStore for PostgresStore {
    async fn insert_conversation(&self, conversation: &Conversation) -> AppResult<InsertOutcome> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let seen_by: Vec<&str> = conversation.seen_by.iter().map(UserId::as_str).collect();
        let inserted = tx
            .execute(
                r#"
                INSERT INTO conversations
                    (id, is_group, direct_key, name, avatar_url, seen_by, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (direct_key) WHERE is_group = FALSE DO NOTHING
                "#,
                &[
                    &conversation.id,
                    &conversation.is_group,
                    &conversation.direct_key(),
                    &conversation.name,
                    &conversation.avatar_url,
                    &seen_by,
                    &conversation.created_at,
                    &conversation.updated_at,
                ],
            )
            .await?;

        if inserted == 0 {
            tx.rollback().await?;
            return Ok(InsertOutcome::DirectExists);
        }

        for participant in &conversation.participants {
            tx.execute(
                r#"
                INSERT INTO conversation_participants
                    (conversation_id, user_id, joined_at, muted, delete_watermark)
                VALUES ($1, $2, $3, $4, $5)
                "#,
                &[
                    &conversation.id,
                    &participant.user_id.as_str(),
                    &participant.joined_at,
                    &participant.muted,
                    &participant.delete_watermark,
                ],
            )
            .await?;
        }

        tx.commit().await?;
        Ok(InsertOutcome::Inserted)
    }

    async fn get_conversation(&self, id: Uuid) -> AppResult<Option<Conversation>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                &format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = $1"),
                &[&id],
            )
            .await?;
        Ok(Self::hydrate(&client, rows).await?.pop())
    }

    async fn find_direct(&self, direct_key: &str) -> AppResult<Option<Conversation>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                &format!(
                    "SELECT {CONVERSATION_COLUMNS} FROM conversations \
                     WHERE direct_key = $1 AND is_group = FALSE"
                ),
                &[&direct_key],
            )
            .await?;
        Ok(Self::hydrate(&client, rows).await?.pop())
    }

    async fn list_for_user(
        &self,
        user_id: &UserId,
        skip: usize,
        limit: usize,
    ) -> AppResult<Vec<Conversation>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                &format!(
                    r#"
                    SELECT {CONVERSATION_COLUMNS}
                    FROM conversations c
                    WHERE EXISTS (
                        SELECT 1 FROM conversation_participants p
                        WHERE p.conversation_id = c.id AND p.user_id = $1
                    )
                    ORDER BY c.updated_at DESC, c.id DESC
                    OFFSET $2 LIMIT $3
                    "#
                ),
                &[&user_id.as_str(), &pg_count(skip), &pg_count(limit)],
            )
            .await?;
        Self::hydrate(&client, rows).await
    }

    async fn add_participant(&self, id: Uuid, participant: &ParticipantState) -> AppResult<bool> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;
        Self::require_conversation(&tx, id).await?;

        let inserted = tx
            .execute(
                r#"
                INSERT INTO conversation_participants
                    (conversation_id, user_id, joined_at, muted, delete_watermark)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (conversation_id, user_id) DO NOTHING
                "#,
                &[
                    &id,
                    &participant.user_id.as_str(),
                    &participant.joined_at,
                    &participant.muted,
                    &participant.delete_watermark,
                ],
            )
            .await?;

        if inserted > 0 {
            tx.execute(
                "UPDATE conversations SET updated_at = $2 WHERE id = $1",
                &[&id, &participant.joined_at],
            )
            .await?;
        }
        tx.commit().await?;
        Ok(inserted > 0)
    }

    async fn remove_participant(
        &self,
        id: Uuid,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let removed = tx
            .execute(
                "DELETE FROM conversation_participants WHERE conversation_id = $1 AND user_id = $2",
                &[&id, &user_id.as_str()],
            )
            .await?;

        if removed == 0 {
            Self::require_conversation(&tx, id).await?;
            tx.rollback().await?;
            return Ok(false);
        }

        tx.execute(
            r#"
            UPDATE conversations
            SET seen_by = array_remove(seen_by, $2),
                updated_at = $3,
                dissolved_at = CASE
                    WHEN NOT EXISTS (
                        SELECT 1 FROM conversation_participants WHERE conversation_id = $1
                    ) THEN $3
                    ELSE dissolved_at
                END
            WHERE id = $1
            "#,
            &[&id, &user_id.as_str(), &now],
        )
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn set_name(&self, id: Uuid, name: &str, now: DateTime<Utc>) -> AppResult<()> {
        let client = self.pool.get().await?;
        let affected = client
            .execute(
                "UPDATE conversations SET name = $2, updated_at = $3 WHERE id = $1",
                &[&id, &name, &now],
            )
            .await?;
        Self::changed_or_missing(&client, id, affected).await.map(|_| ())
    }

    async fn set_avatar(&self, id: Uuid, url: Option<&str>, now: DateTime<Utc>) -> AppResult<()> {
        let client = self.pool.get().await?;
        let affected = client
            .execute(
                "UPDATE conversations SET avatar_url = $2, updated_at = $3 WHERE id = $1",
                &[&id, &url, &now],
            )
            .await?;
        Self::changed_or_missing(&client, id, affected).await.map(|_| ())
    }

    async fn set_muted(&self, id: Uuid, user_id: &UserId, muted: bool) -> AppResult<bool> {
        let client = self.pool.get().await?;
        let affected = client
            .execute(
                r#"
                UPDATE conversation_participants SET muted = $3
                WHERE conversation_id = $1 AND user_id = $2
                "#,
                &[&id, &user_id.as_str(), &muted],
            )
            .await?;
        Self::changed_or_missing(&client, id, affected).await
    }

    async fn set_delete_watermark(
        &self,
        id: Uuid,
        user_id: &UserId,
        watermark: DateTime<Utc>,
    ) -> AppResult<bool> {
        let client = self.pool.get().await?;
        let affected = client
            .execute(
                r#"
                UPDATE conversation_participants SET delete_watermark = $3
                WHERE conversation_id = $1 AND user_id = $2
                "#,
                &[&id, &user_id.as_str(), &watermark],
            )
            .await?;
        Self::changed_or_missing(&client, id, affected).await
    }

    async fn set_last_message(
        &self,
        id: Uuid,
        summary: &MessageSummary,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let client = self.pool.get().await?;
        let seen_by = vec![summary.sender_id.as_str()];
        let affected = client
            .execute(
                r#"
                UPDATE conversations
                SET last_message = $2,
                    last_message_at = $3,
                    seen_by = $4,
                    updated_at = $5
                WHERE id = $1
                  AND (last_message_at IS NULL OR last_message_at <= $3)
                "#,
                &[&id, &Json(summary), &summary.created_at, &seen_by, &now],
            )
            .await?;
        Self::changed_or_missing(&client, id, affected).await
    }

    async fn recall_last_message(&self, id: Uuid, message_id: Uuid) -> AppResult<bool> {
        let client = self.pool.get().await?;
        let affected = client
            .execute(
                r#"
                UPDATE conversations
                SET last_message = jsonb_set(last_message, '{content}', $3)
                WHERE id = $1 AND last_message->>'message_id' = $2
                "#,
                &[&id, &message_id.to_string(), &Json(&MessageContent::Recalled)],
            )
            .await?;
        Ok(affected > 0)
    }

    async fn add_seen(&self, id: Uuid, user_id: &UserId) -> AppResult<()> {
        let client = self.pool.get().await?;
        let affected = client
            .execute(
                r#"
                UPDATE conversations
                SET seen_by = CASE
                    WHEN $2 = ANY(seen_by) THEN seen_by
                    ELSE array_append(seen_by, $2)
                END
                WHERE id = $1
                "#,
                &[&id, &user_id.as_str()],
            )
            .await?;
        Self::changed_or_missing(&client, id, affected).await.map(|_| ())
    }
}

#[async_trait]
impl MessageLog for PostgresStore {
    async fn insert_message(&self, pending: PendingMessage) -> AppResult<Message> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let sequence_number: i64 = tx
            .query_opt(
                "UPDATE conversations SET message_seq = message_seq + 1 WHERE id = $1 RETURNING message_seq",
                &[&pending.conversation_id],
            )
            .await?
            .map(|row| row.get(0))
            .ok_or(AppError::NotFound(Resource::Conversation))?;

        tx.execute(
            r#"
            INSERT INTO messages (id, conversation_id, sender_id, content, sequence_number, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
            &[
                &pending.id,
                &pending.conversation_id,
                &pending.sender_id.as_str(),
                &Json(&pending.content),
                &sequence_number,
                &pending.created_at,
            ],
        )
        .await?;

        tx.commit().await?;
        Ok(pending.into_message(sequence_number))
    }

    async fn get_message(&self, id: Uuid) -> AppResult<Option<Message>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1"),
                &[&id],
            )
            .await?;
        Ok(row.as_ref().map(message_from_row))
    }

    async fn replace_content(
        &self,
        id: Uuid,
        content: &MessageContent,
    ) -> AppResult<Option<Message>> {
        let client = self.pool.get().await?;
        let recalled_at = content.is_recalled().then(stored_now);
        let row = client
            .query_opt(
                &format!(
                    r#"
                    UPDATE messages
                    SET content = $2, recalled_at = COALESCE($3, recalled_at)
                    WHERE id = $1
                    RETURNING {MESSAGE_COLUMNS}
                    "#
                ),
                &[&id, &Json(content), &recalled_at],
            )
            .await?;
        Ok(row.as_ref().map(message_from_row))
    }

    async fn list_newest_first(
        &self,
        conversation_id: Uuid,
        after: Option<DateTime<Utc>>,
        skip: usize,
        limit: usize,
    ) -> AppResult<Vec<Message>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                &format!(
                    r#"
                    SELECT {MESSAGE_COLUMNS}
                    FROM messages
                    WHERE conversation_id = $1
                      AND ($2::timestamptz IS NULL OR created_at > $2)
                    ORDER BY created_at DESC, sequence_number DESC
                    OFFSET $3 LIMIT $4
                    "#
                ),
                &[&conversation_id, &after, &pg_count(skip), &pg_count(limit)],
            )
            .await?;
        Ok(rows.iter().map(message_from_row).collect())
    }
}
