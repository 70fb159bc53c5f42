//! Infrastructure layer: sequence allocation, invoice persistence, reference
//! data lookup and the service façade that ties them to the pricing engine.
//!
//! Pricing, freight allocation and aggregation are pure and live in
//! `proforma-invoicing`. The only contended resource is the sequence counter,
//! reached exclusively through [`sequence::SequenceAllocator`].

pub mod config;
pub mod error;
pub mod reference;
pub mod retry;
pub mod sequence;
pub mod service;
pub mod store;

pub use config::EngineConfig;
pub use error::EngineError;
pub use reference::{InMemoryReferenceData, ReferenceData};
pub use retry::{BackoffStrategy, RetryPolicy};
pub use sequence::SequenceAllocator;
pub use service::{ComputeInvoice, InvoiceService, ItemRequest};
pub use store::{
    ConfiguredStore, InMemoryInvoiceStore, InvoiceStore, PostgresInvoiceStore, StoreError,
};
