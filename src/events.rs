use crate::error::{AppError, Result};
use crate::models::TicketEvent;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Outbound event sink. The engine's responsibility ends at a successful
/// enqueue; delivery is at-least-once and handled downstream. Engine state
/// is always persisted before an event is enqueued.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn enqueue(&self, event: TicketEvent) -> Result<()>;
}

/// Event sink backed by a bounded tokio channel, feeding whatever
/// notification worker the surrounding system runs.
pub struct ChannelEventSink {
    tx: mpsc::Sender<TicketEvent>,
}

impl ChannelEventSink {
    /// Create a sink and the receiving half for the downstream consumer
    pub fn new(queue_size: usize) -> (Self, mpsc::Receiver<TicketEvent>) {
        let (tx, rx) = mpsc::channel(queue_size);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl EventSink for ChannelEventSink {
    async fn enqueue(&self, event: TicketEvent) -> Result<()> {
        let kind = event.kind;
        let ticket_id = event.ticket_id;

        self.tx
            .send(event)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to queue event: {}", e)))?;

        tracing::debug!(ticket_id = %ticket_id, kind = %kind, "Event queued");
        Ok(())
    }
}

/// System-authored audit comment, recorded on status/assignee changes
#[derive(Debug, Clone)]
pub struct Comment {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub author_id: Option<Uuid>,
    pub body: String,
    pub is_internal: bool,
    pub created_at: DateTime<Utc>,
}

/// Comment-creation collaborator. `author_id = None` marks a
/// system-authored comment.
#[async_trait]
pub trait CommentWriter: Send + Sync {
    async fn add_comment(
        &self,
        ticket_id: Uuid,
        author_id: Option<Uuid>,
        body: String,
        is_internal: bool,
        now: DateTime<Utc>,
    ) -> Result<Comment>;
}

/// In-memory comment log for the MVP binary and tests
#[derive(Clone, Default)]
pub struct InMemoryCommentLog {
    comments: Arc<DashMap<Uuid, Vec<Comment>>>,
}

impl InMemoryCommentLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn comments_for(&self, ticket_id: &Uuid) -> Vec<Comment> {
        self.comments
            .get(ticket_id)
            .map(|entry| entry.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CommentWriter for InMemoryCommentLog {
    async fn add_comment(
        &self,
        ticket_id: Uuid,
        author_id: Option<Uuid>,
        body: String,
        is_internal: bool,
        now: DateTime<Utc>,
    ) -> Result<Comment> {
        let comment = Comment {
            id: Uuid::new_v4(),
            ticket_id,
            author_id,
            body,
            is_internal,
            created_at: now,
        };

        self.comments
            .entry(ticket_id)
            .or_default()
            .push(comment.clone());

        tracing::debug!(ticket_id = %ticket_id, comment_id = %comment.id, "Comment recorded");
        Ok(comment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventKind;

    #[tokio::test]
    async fn test_channel_sink_delivers_in_order() {
        let (sink, mut rx) = ChannelEventSink::new(8);
        let ticket_id = Uuid::new_v4();

        sink.enqueue(TicketEvent::new(ticket_id, EventKind::Created, Utc::now()))
            .await
            .unwrap();
        sink.enqueue(TicketEvent::new(ticket_id, EventKind::Updated, Utc::now()))
            .await
            .unwrap();

        assert_eq!(rx.recv().await.unwrap().kind, EventKind::Created);
        assert_eq!(rx.recv().await.unwrap().kind, EventKind::Updated);
    }

    #[tokio::test]
    async fn test_enqueue_fails_when_consumer_gone() {
        let (sink, rx) = ChannelEventSink::new(1);
        drop(rx);

        let err = sink
            .enqueue(TicketEvent::new(Uuid::new_v4(), EventKind::Created, Utc::now()))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "INTERNAL_ERROR");
    }

    #[tokio::test]
    async fn test_comment_log_records_system_comments() {
        let log = InMemoryCommentLog::new();
        let ticket_id = Uuid::new_v4();

        log.add_comment(
            ticket_id,
            None,
            "status changed from New to Triaged".to_string(),
            true,
            Utc::now(),
        )
        .await
        .unwrap();

        let comments = log.comments_for(&ticket_id);
        assert_eq!(comments.len(), 1);
        assert!(comments[0].author_id.is_none());
        assert!(comments[0].is_internal);
    }
}
