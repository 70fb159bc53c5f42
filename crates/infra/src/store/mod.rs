//! Durable storage for sequence counters and numbered invoices.
//!
//! The counter and the invoice row are written in one unit of work by
//! [`InvoiceStore::commit_invoice`], so a crash can never leave an advanced
//! counter without its invoice (or the reverse). [`InvoiceStore::next_sequence`]
//! is the standalone increment; invoices numbered that way go through
//! [`InvoiceStore::insert_invoice`], where the `(prefix, year, sequence)`
//! uniqueness constraint is the backstop.

pub mod configured;
pub mod in_memory;
pub mod postgres;

pub use configured::ConfiguredStore;
pub use in_memory::InMemoryInvoiceStore;
pub use postgres::PostgresInvoiceStore;

use std::sync::Arc;

use thiserror::Error;

use proforma_core::{DomainError, InvoiceId};
use proforma_invoicing::{Invoice, InvoiceDraft, InvoiceNumber, NumberFormat, SequenceKey};

/// Store operation error.
///
/// These are infrastructure failures, except `Domain`, which carries a domain
/// failure raised inside a unit of work (the unit of work was rolled back).
#[derive(Debug, Error)]
pub enum StoreError {
    /// Transient contention: unique violation on the counter path,
    /// serialization failure or deadlock.
    #[error("store conflict: {0}")]
    Conflict(String),

    /// The invoice number or id is already taken.
    #[error("duplicate invoice: {0}")]
    Duplicate(String),

    #[error("store backend error: {0}")]
    Backend(String),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// Counter and invoice persistence.
///
/// ## Implementation requirements
///
/// - Counters start at zero and only ever move forward by one per increment.
/// - A value returned from `next_sequence` or used by `commit_invoice` has
///   been durably recorded before the call returns.
/// - No two stored invoices share `(prefix, year, sequence)`.
/// - `commit_invoice` is all-or-nothing.
pub trait InvoiceStore: Send + Sync {
    /// Advance the counter for `key` and return the new value.
    fn next_sequence(&self, key: &SequenceKey) -> Result<u64, StoreError>;

    /// Advance the counter for `key`, number `draft` with the new value and
    /// persist it, atomically.
    fn commit_invoice(
        &self,
        key: &SequenceKey,
        format: &NumberFormat,
        draft: InvoiceDraft,
    ) -> Result<Invoice, StoreError>;

    /// Persist an invoice numbered by an earlier `next_sequence`.
    fn insert_invoice(&self, invoice: &Invoice) -> Result<(), StoreError>;

    /// Last value issued for `key` (zero if none).
    fn current_sequence(&self, key: &SequenceKey) -> Result<u64, StoreError>;

    fn load_invoice(&self, id: InvoiceId) -> Result<Option<Invoice>, StoreError>;

    fn find_by_number(&self, number: &InvoiceNumber) -> Result<Option<Invoice>, StoreError>;
}

impl<S> InvoiceStore for Arc<S>
where
    S: InvoiceStore + ?Sized,
{
    fn next_sequence(&self, key: &SequenceKey) -> Result<u64, StoreError> {
        (**self).next_sequence(key)
    }

    fn commit_invoice(
        &self,
        key: &SequenceKey,
        format: &NumberFormat,
        draft: InvoiceDraft,
    ) -> Result<Invoice, StoreError> {
        (**self).commit_invoice(key, format, draft)
    }

    fn insert_invoice(&self, invoice: &Invoice) -> Result<(), StoreError> {
        (**self).insert_invoice(invoice)
    }

    fn current_sequence(&self, key: &SequenceKey) -> Result<u64, StoreError> {
        (**self).current_sequence(key)
    }

    fn load_invoice(&self, id: InvoiceId) -> Result<Option<Invoice>, StoreError> {
        (**self).load_invoice(id)
    }

    fn find_by_number(&self, number: &InvoiceNumber) -> Result<Option<Invoice>, StoreError> {
        (**self).find_by_number(number)
    }
}
