//! Shared test fixtures: scripted connectors and store helpers.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Mutex;

use merx_connector::{
    Connector, ConnectorError, ConnectorResult, ExternalRecord, Page, PushOutcome, PushRecord,
    SyncFilters,
};
use merx_core::EntityKind;

/// Connector that serves a fixed script of pages and records every
/// fetch and push it sees.
pub struct ScriptedConnector {
    system: String,
    pages: Vec<Vec<ExternalRecord>>,
    estimated: Option<u64>,
    fail_auth: AtomicBool,
    pub fetch_calls: AtomicUsize,
    pub pushed: Mutex<Vec<PushRecord>>,
}

impl ScriptedConnector {
    pub fn new(system: &str, pages: Vec<Vec<ExternalRecord>>) -> Self {
        Self {
            system: system.to_string(),
            pages,
            estimated: None,
            fail_auth: AtomicBool::new(false),
            fetch_calls: AtomicUsize::new(0),
            pushed: Mutex::new(Vec::new()),
        }
    }

    pub fn with_estimated_total(mut self, total: u64) -> Self {
        self.estimated = Some(total);
        self
    }

    /// Make every subsequent fetch fail with an authentication error.
    pub fn break_auth(&self) {
        self.fail_auth.store(true, Ordering::SeqCst);
    }

    pub fn fetches(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    fn system_name(&self) -> &str {
        &self.system
    }

    async fn authenticate(&self) -> ConnectorResult<()> {
        Ok(())
    }

    async fn test_connection(&self) -> ConnectorResult<bool> {
        Ok(true)
    }

    async fn fetch_page(
        &self,
        _entity: EntityKind,
        cursor: Option<&str>,
        _filters: &SyncFilters,
    ) -> ConnectorResult<Page> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_auth.load(Ordering::SeqCst) {
            return Err(ConnectorError::authentication("token revoked"));
        }

        let index: usize = match cursor {
            Some(c) => c
                .parse()
                .map_err(|_| ConnectorError::InvalidCursor { cursor: c.into() })?,
            None => 0,
        };
        let items = self.pages.get(index).cloned().unwrap_or_default();
        let has_more = index + 1 < self.pages.len();
        Ok(Page {
            items,
            has_more,
            next_cursor: has_more.then(|| (index + 1).to_string()),
        })
    }

    async fn apply_record(
        &self,
        _entity: EntityKind,
        record: &PushRecord,
    ) -> ConnectorResult<PushOutcome> {
        let mut pushed = self.pushed.lock().await;
        pushed.push(record.clone());
        match &record.external_id {
            Some(id) => Ok(PushOutcome {
                external_id: id.clone(),
                created: false,
            }),
            None => Ok(PushOutcome {
                external_id: format!("gen-{}", pushed.len()),
                created: true,
            }),
        }
    }

    fn estimated_total(&self, _entity: EntityKind) -> Option<u64> {
        self.estimated
    }
}

/// Build an inventory record with the given SKU and quantity.
pub fn inventory_record(external_id: &str, sku: &str, quantity: i64) -> ExternalRecord {
    ExternalRecord::new(
        external_id,
        EntityKind::Inventory,
        serde_json::json!({"sku": sku, "quantity": quantity}),
    )
}
