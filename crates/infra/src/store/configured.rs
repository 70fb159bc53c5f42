//! Store selection from [`EngineConfig`].
//!
//! `DATABASE_URL` set: Postgres, connected and migrated. Unset: in-memory.

use tracing::{info, instrument};

use proforma_core::InvoiceId;
use proforma_invoicing::{Invoice, InvoiceDraft, InvoiceNumber, NumberFormat, SequenceKey};

use super::{InMemoryInvoiceStore, InvoiceStore, PostgresInvoiceStore, StoreError};
use crate::config::EngineConfig;

pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// The store an [`EngineConfig`] asks for.
#[derive(Debug)]
pub enum ConfiguredStore {
    InMemory(InMemoryInvoiceStore),
    Postgres(PostgresInvoiceStore),
}

impl ConfiguredStore {
    /// Connect and migrate Postgres when `database_url` is set, otherwise
    /// start an empty in-memory store.
    ///
    /// Must run on the runtime the Postgres store will later block on.
    #[instrument(skip(config), fields(persistent = config.database_url.is_some()), err)]
    pub async fn from_config(config: &EngineConfig) -> Result<Self, StoreError> {
        let Some(url) = config.database_url.as_deref() else {
            info!("DATABASE_URL not set, using in-memory invoice store");
            return Ok(Self::InMemory(InMemoryInvoiceStore::new()));
        };

        let store = PostgresInvoiceStore::connect(url, DEFAULT_MAX_CONNECTIONS).await?;
        store.run_migrations().await?;
        info!("using postgres invoice store");
        Ok(Self::Postgres(store))
    }

    pub fn is_persistent(&self) -> bool {
        matches!(self, Self::Postgres(_))
    }

    fn inner(&self) -> &dyn InvoiceStore {
        match self {
            Self::InMemory(store) => store,
            Self::Postgres(store) => store,
        }
    }
}

impl InvoiceStore for ConfiguredStore {
    fn next_sequence(&self, key: &SequenceKey) -> Result<u64, StoreError> {
        self.inner().next_sequence(key)
    }

    fn commit_invoice(
        &self,
        key: &SequenceKey,
        format: &NumberFormat,
        draft: InvoiceDraft,
    ) -> Result<Invoice, StoreError> {
        self.inner().commit_invoice(key, format, draft)
    }

    fn insert_invoice(&self, invoice: &Invoice) -> Result<(), StoreError> {
        self.inner().insert_invoice(invoice)
    }

    fn current_sequence(&self, key: &SequenceKey) -> Result<u64, StoreError> {
        self.inner().current_sequence(key)
    }

    fn load_invoice(&self, id: InvoiceId) -> Result<Option<Invoice>, StoreError> {
        self.inner().load_invoice(id)
    }

    fn find_by_number(&self, number: &InvoiceNumber) -> Result<Option<Invoice>, StoreError> {
        self.inner().find_by_number(number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unset_database_url_selects_the_in_memory_store() {
        let config = EngineConfig::default();
        let store = ConfiguredStore::from_config(&config).await.unwrap();
        assert!(!store.is_persistent());

        let key = config.number_format.key("SW", 2026).unwrap();
        assert_eq!(store.next_sequence(&key).unwrap(), 1);
        assert_eq!(store.current_sequence(&key).unwrap(), 1);
    }

    #[tokio::test]
    async fn unreachable_database_is_a_backend_error() {
        let config = EngineConfig {
            database_url: Some("not a url".into()),
            ..EngineConfig::default()
        };
        let err = ConfiguredStore::from_config(&config).await.unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
    }
}
