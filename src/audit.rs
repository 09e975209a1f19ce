use std::future::Future;

use chrono::Utc;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::models::{AuditRecord, UserId};

/// Append-only destination for audit records.
///
/// Appends are advisory: a failed append is logged by the caller and never
/// undoes the change it describes.
pub trait AuditSink: Send + Sync {
    fn append(&self, record: AuditRecord) -> impl Future<Output = Result<()>> + Send;
}

impl AuditRecord {
    pub fn new(
        actor_id: UserId,
        action: &str,
        entity_type: &str,
        entity_id: i64,
        details: impl Into<String>,
    ) -> Self {
        Self {
            actor_id,
            action: action.to_string(),
            entity_type: entity_type.to_string(),
            entity_id,
            details: details.into(),
            created_at: Utc::now().naive_utc(),
        }
    }
}

/// Keeps records in memory; used by tests and the in-memory demo.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().await.clone()
    }
}

impl AuditSink for MemoryAuditSink {
    async fn append(&self, record: AuditRecord) -> Result<()> {
        self.records.lock().await.push(record);
        Ok(())
    }
}

/// Emits each record as a structured `tracing` event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    async fn append(&self, record: AuditRecord) -> Result<()> {
        tracing::info!(
            actor_id = record.actor_id.0,
            action = %record.action,
            entity_type = %record.entity_type,
            entity_id = record.entity_id,
            details = %record.details,
            created_at = %record.created_at,
            "audit"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_sink_keeps_append_order() {
        let sink = MemoryAuditSink::new();
        sink.append(AuditRecord::new(UserId(1), "create_category", "category", 10, "first"))
            .await
            .expect("append should succeed");
        sink.append(AuditRecord::new(UserId(1), "delete_category", "category", 10, "second"))
            .await
            .expect("append should succeed");

        let records = sink.records().await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].action, "create_category");
        assert_eq!(records[1].details, "second");
    }
}
