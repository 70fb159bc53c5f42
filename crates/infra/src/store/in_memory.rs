use std::collections::HashMap;
use std::sync::Mutex;

use proforma_core::{Entity, InvoiceId};
use proforma_invoicing::{Invoice, InvoiceDraft, InvoiceNumber, NumberFormat, Prefix, SequenceKey};

use super::{InvoiceStore, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct NumberKey {
    prefix: Prefix,
    year: i32,
    sequence: u32,
}

impl From<&InvoiceNumber> for NumberKey {
    fn from(number: &InvoiceNumber) -> Self {
        Self {
            prefix: number.prefix().clone(),
            year: number.year(),
            sequence: number.sequence(),
        }
    }
}

#[derive(Debug, Default)]
struct State {
    counters: HashMap<SequenceKey, u64>,
    invoices: HashMap<InvoiceId, Invoice>,
    /// Uniqueness index on `(prefix, year, sequence)`.
    numbers: HashMap<NumberKey, InvoiceId>,
}

impl State {
    fn check_unique(&self, invoice: &Invoice) -> Result<(), StoreError> {
        if self.invoices.contains_key(invoice.id()) {
            return Err(StoreError::Duplicate(format!("invoice id {}", invoice.id())));
        }
        if self.numbers.contains_key(&NumberKey::from(invoice.number())) {
            return Err(StoreError::Duplicate(invoice.number().to_string()));
        }
        Ok(())
    }

    fn insert(&mut self, invoice: Invoice) {
        self.numbers
            .insert(NumberKey::from(invoice.number()), *invoice.id());
        self.invoices.insert(*invoice.id(), invoice);
    }
}

/// In-memory invoice store.
///
/// Intended for tests/dev. One mutex guards counters and invoices together,
/// which makes every operation a unit of work.
#[derive(Debug, Default)]
pub struct InMemoryInvoiceStore {
    state: Mutex<State>,
}

impl InMemoryInvoiceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invoice_count(&self) -> Result<usize, StoreError> {
        Ok(self.lock()?.invoices.len())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, State>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }
}

impl InvoiceStore for InMemoryInvoiceStore {
    fn next_sequence(&self, key: &SequenceKey) -> Result<u64, StoreError> {
        let mut state = self.lock()?;
        let counter = state.counters.entry(key.clone()).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    fn commit_invoice(
        &self,
        key: &SequenceKey,
        format: &NumberFormat,
        draft: InvoiceDraft,
    ) -> Result<Invoice, StoreError> {
        let mut state = self.lock()?;
        let next = state.counters.get(key).copied().unwrap_or(0) + 1;

        // Nothing is written until every check passed.
        let number = format.number(key, next)?;
        let invoice = draft.into_invoice(number)?;
        state.check_unique(&invoice)?;

        state.counters.insert(key.clone(), next);
        state.insert(invoice.clone());
        Ok(invoice)
    }

    fn insert_invoice(&self, invoice: &Invoice) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        state.check_unique(invoice)?;
        state.insert(invoice.clone());
        Ok(())
    }

    fn current_sequence(&self, key: &SequenceKey) -> Result<u64, StoreError> {
        Ok(self.lock()?.counters.get(key).copied().unwrap_or(0))
    }

    fn load_invoice(&self, id: InvoiceId) -> Result<Option<Invoice>, StoreError> {
        Ok(self.lock()?.invoices.get(&id).cloned())
    }

    fn find_by_number(&self, number: &InvoiceNumber) -> Result<Option<Invoice>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .numbers
            .get(&NumberKey::from(number))
            .and_then(|id| state.invoices.get(id))
            .cloned())
    }
}
