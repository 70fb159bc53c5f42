//! Invoice number allocation.
//!
//! All counter access goes through [`SequenceAllocator`]. Contention reported
//! by the store (`StoreError::Conflict`) is retried with the configured
//! [`RetryPolicy`]; anything else fails immediately.

use tracing::{debug, instrument, warn};

use proforma_core::DomainError;
use proforma_invoicing::{Invoice, InvoiceDraft, InvoiceNumber, NumberFormat, SequenceKey};

use crate::error::EngineError;
use crate::retry::RetryPolicy;
use crate::store::{InvoiceStore, StoreError};

#[derive(Debug, Clone)]
pub struct SequenceAllocator<S> {
    store: S,
    format: NumberFormat,
    retry: RetryPolicy,
}

impl<S: InvoiceStore> SequenceAllocator<S> {
    pub fn new(store: S, format: NumberFormat, retry: RetryPolicy) -> Self {
        Self {
            store,
            format,
            retry,
        }
    }

    pub fn format(&self) -> &NumberFormat {
        &self.format
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Reserve the next sequence value for `(prefix, year)`.
    ///
    /// The value is durable once returned. If the caller never stores an
    /// invoice under it, the number is burned and leaves a gap.
    #[instrument(skip(self), err)]
    pub fn allocate(&self, prefix: &str, year: i32) -> Result<u64, EngineError> {
        let key = self.format.key(prefix, year)?;
        self.with_retry(&key, || self.store.next_sequence(&key))
    }

    /// [`allocate`](Self::allocate), formatted.
    pub fn allocate_number(&self, prefix: &str, year: i32) -> Result<InvoiceNumber, EngineError> {
        let key = self.format.key(prefix, year)?;
        let value = self.with_retry(&key, || self.store.next_sequence(&key))?;
        Ok(self.format.number(&key, value)?)
    }

    /// Number `draft` and persist it in the same unit of work as the counter
    /// increment. The year comes from the draft's issue date.
    #[instrument(skip(self, draft), fields(invoice_id = %draft.id), err)]
    pub fn commit(&self, prefix: &str, draft: InvoiceDraft) -> Result<Invoice, EngineError> {
        let key = self.format.key(prefix, draft.year())?;
        self.with_retry(&key, || {
            self.store.commit_invoice(&key, &self.format, draft.clone())
        })
    }

    /// Persist `draft` under a number obtained earlier from
    /// [`allocate_number`](Self::allocate_number).
    ///
    /// A number that is already stored is reported as
    /// `EngineError::Store(StoreError::Duplicate)` and never retried.
    #[instrument(skip(self, draft), fields(invoice_number = %number), err)]
    pub fn commit_with_number(
        &self,
        number: InvoiceNumber,
        draft: InvoiceDraft,
    ) -> Result<Invoice, EngineError> {
        let invoice = draft.into_invoice(number)?;
        self.store.insert_invoice(&invoice)?;
        Ok(invoice)
    }

    /// The number the next allocation would most likely receive.
    ///
    /// Nothing is reserved; a concurrent caller may take it first.
    pub fn preview_next(&self, prefix: &str, year: i32) -> Result<InvoiceNumber, EngineError> {
        let key = self.format.key(prefix, year)?;
        let current = self.store.current_sequence(&key)?;
        Ok(self.format.number(&key, current.saturating_add(1))?)
    }

    fn with_retry<T>(
        &self,
        key: &SequenceKey,
        mut op: impl FnMut() -> Result<T, StoreError>,
    ) -> Result<T, EngineError> {
        let mut attempt = 1u32;
        loop {
            match op() {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(key = %key, attempt, "sequence allocated after retry");
                    }
                    return Ok(value);
                }
                Err(StoreError::Conflict(reason)) => {
                    if !self.retry.should_retry(attempt) {
                        warn!(key = %key, attempts = attempt, reason = %reason, "sequence allocation gave up");
                        return Err(DomainError::AllocationFailed {
                            attempts: attempt,
                            reason,
                        }
                        .into());
                    }

                    let delay = self.retry.delay_for_attempt(attempt);
                    debug!(
                        key = %key,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        reason = %reason,
                        "sequence counter contended, retrying"
                    );
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                    attempt += 1;
                }
                Err(other) => return Err(other.into()),
            }
        }
    }
}
