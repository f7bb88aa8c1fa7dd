//! # Merx Core
//!
//! Shared foundation for the merx reconciliation engine:
//!
//! - The fixed set of [`EntityKind`]s the engine reconciles
//! - [`StoredRecord`], the internal store's unit of data
//! - The [`StoreWriter`] seam consumed by the sync orchestrator and the
//!   bulk operations engine, with in-memory and Postgres implementations
//! - Inventory calculations (available quantity, stock status, reorder
//!   and safety-stock suggestions) used for validation and derived state
//!
//! The store is the single serialization point for all mutations. It
//! provides atomic single-record writes only; multi-record consistency
//! is the caller's concern (the bulk engine's rollback mechanism).

pub mod entity;
pub mod error;
pub mod inventory;
pub mod memory;
pub mod postgres;
pub mod record;
pub mod store;

pub use entity::EntityKind;
pub use error::{StoreError, StoreResult};
pub use inventory::{
    available_quantity, reorder_suggestion, safety_stock, stock_status, validate_inventory,
    validate_quantities, z_score, StockStatus,
};
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use record::{natural_key, overlay_attributes, StoredRecord};
pub use store::{StorePage, StoreWriter};
