//! The connector trait.

use async_trait::async_trait;

use merx_core::EntityKind;

use crate::error::ConnectorResult;
use crate::types::{Page, PushOutcome, PushRecord, SyncFilters};

/// Adapter for one external commerce/ERP platform.
///
/// Implemented once per platform, consumed by the sync orchestrator.
/// `fetch_page` drives the pull direction; `apply_record` the push
/// direction. Connectors are expected to retry transient conditions
/// internally where their platform allows it; errors that escape are
/// classified by [`ConnectorError`](crate::ConnectorError).
#[async_trait]
pub trait Connector: Send + Sync {
    /// Stable name of the external system (e.g. `"shopline"`, `"erp"`).
    ///
    /// Used as the conflict source label and the `last_source` marker
    /// on store writes, so it must not change between runs.
    fn system_name(&self) -> &str;

    /// Establish or refresh credentials with the platform.
    async fn authenticate(&self) -> ConnectorResult<()>;

    /// Lightweight connectivity check.
    async fn test_connection(&self) -> ConnectorResult<bool>;

    /// Fetch one page of records.
    ///
    /// `cursor` is `None` for the first page; subsequent calls pass
    /// the `next_cursor` of the previous page. Implementations apply
    /// `filters` server-side where the platform supports it.
    async fn fetch_page(
        &self,
        entity: EntityKind,
        cursor: Option<&str>,
        filters: &SyncFilters,
    ) -> ConnectorResult<Page>;

    /// Create or update one record on the platform (push direction).
    async fn apply_record(
        &self,
        entity: EntityKind,
        record: &PushRecord,
    ) -> ConnectorResult<PushOutcome>;

    /// Total record count for progress estimation, when the platform
    /// reports one. Streaming platforms return `None`.
    fn estimated_total(&self, entity: EntityKind) -> Option<u64> {
        let _ = entity;
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConnectorError;
    use crate::types::ExternalRecord;

    struct FixedConnector;

    #[async_trait]
    impl Connector for FixedConnector {
        fn system_name(&self) -> &str {
            "fixed"
        }

        async fn authenticate(&self) -> ConnectorResult<()> {
            Ok(())
        }

        async fn test_connection(&self) -> ConnectorResult<bool> {
            Ok(true)
        }

        async fn fetch_page(
            &self,
            entity: EntityKind,
            _cursor: Option<&str>,
            _filters: &SyncFilters,
        ) -> ConnectorResult<Page> {
            Ok(Page::last(vec![ExternalRecord::new(
                "ext-1",
                entity,
                serde_json::json!({"sku": "S-1"}),
            )]))
        }

        async fn apply_record(
            &self,
            _entity: EntityKind,
            record: &PushRecord,
        ) -> ConnectorResult<PushOutcome> {
            match &record.external_id {
                Some(id) => Ok(PushOutcome {
                    external_id: id.clone(),
                    created: false,
                }),
                None => Err(ConnectorError::rejected("create not supported")),
            }
        }
    }

    #[tokio::test]
    async fn test_fixed_connector_fetch() {
        let connector = FixedConnector;
        assert!(connector.test_connection().await.unwrap());

        let page = connector
            .fetch_page(EntityKind::Product, None, &SyncFilters::none())
            .await
            .unwrap();
        assert_eq!(page.items.len(), 1);
        assert!(!page.has_more);
        assert_eq!(connector.estimated_total(EntityKind::Product), None);
    }

    #[tokio::test]
    async fn test_fixed_connector_push() {
        let connector = FixedConnector;
        let outcome = connector
            .apply_record(
                EntityKind::Product,
                &PushRecord {
                    external_id: Some("ext-9".to_string()),
                    attributes: serde_json::json!({}),
                },
            )
            .await
            .unwrap();
        assert_eq!(outcome.external_id, "ext-9");
        assert!(!outcome.created);
    }
}
