mod common;

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::thread;

use proptest::prelude::*;

use rust_decimal::Decimal;

use proforma_core::{ClientId, Entity, InvoiceId, ReferenceRate};
use proforma_infra::{
    EngineError, InMemoryInvoiceStore, InvoiceStore, ReferenceData, RetryPolicy,
    SequenceAllocator, StoreError,
};
use proforma_invoicing::{
    DeliveryTerm, Invoice, InvoiceAggregator, InvoiceDraft, InvoiceNumber, InvoiceTerms,
    NumberFormat, PricingEngine, SequenceKey,
};

use common::*;

fn allocator(store: Arc<InMemoryInvoiceStore>) -> SequenceAllocator<Arc<InMemoryInvoiceStore>> {
    SequenceAllocator::new(store, NumberFormat::default(), test_config().retry)
}

/// A finalized FOB draft built straight from the fixtures.
fn draft() -> InvoiceDraft {
    let data = reference_data();
    let config = pricing_configuration();
    let engine = PricingEngine::new(SUPPLIER);
    let sofa = data.catalog_unit(SOFA).unwrap().unwrap();
    let items = vec![
        engine
            .price_item(&sofa, Decimal::ONE, DeliveryTerm::FreeOnBoard)
            .unwrap(),
    ];
    let reference = ReferenceRate::new(Decimal::new(5, 0)).unwrap();
    let terms = InvoiceTerms {
        supplier_id: SUPPLIER,
        delivery_term: DeliveryTerm::FreeOnBoard,
        reference_rate: reference,
        risk_rate: config.derive_risk_rate(reference).unwrap(),
    };
    let finalized = InvoiceAggregator::default()
        .finalize(
            &terms,
            items,
            &config,
            &freight_definition().resolve(SUPPLIER).unwrap(),
        )
        .unwrap();

    InvoiceDraft {
        id: InvoiceId::new(),
        client_id: ClientId::new(),
        issued_on: issued_on(),
        configuration_id: CONFIGURATION,
        freight_definition_id: FREIGHT,
        finalized,
    }
}

#[test]
fn three_concurrent_allocations_get_one_two_three() {
    init_tracing();
    let allocator = allocator(Arc::new(InMemoryInvoiceStore::new()));

    let mut values: Vec<u64> = thread::scope(|scope| {
        let handles: Vec<_> = (0..3)
            .map(|_| scope.spawn(|| allocator.allocate("SW", 2026).unwrap()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    values.sort_unstable();

    assert_eq!(values, vec![1, 2, 3]);
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 32,
        ..ProptestConfig::default()
    })]

    /// Property: N concurrent allocations for one key yield exactly 1..=N.
    #[test]
    fn concurrent_allocations_are_unique_and_dense(threads in 1usize..6, per_thread in 1usize..25) {
        let allocator = allocator(Arc::new(InMemoryInvoiceStore::new()));

        let mut values: Vec<u64> = thread::scope(|scope| {
            let handles: Vec<_> = (0..threads)
                .map(|_| {
                    scope.spawn(|| {
                        (0..per_thread)
                            .map(|_| allocator.allocate("SW", 2026).unwrap())
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles.into_iter().flat_map(|h| h.join().unwrap()).collect()
        });
        values.sort_unstable();

        let expected: Vec<u64> = (1..=(threads * per_thread) as u64).collect();
        prop_assert_eq!(values, expected);
    }
}

#[test]
fn keys_are_independent_under_concurrency() {
    let allocator = allocator(Arc::new(InMemoryInvoiceStore::new()));

    let results: Vec<(String, u64)> = thread::scope(|scope| {
        let handles: Vec<_> = ["SW", "MX", "SW", "MX", "SW"]
            .into_iter()
            .map(|prefix| {
                let allocator = &allocator;
                scope.spawn(move || (prefix.to_string(), allocator.allocate(prefix, 2026).unwrap()))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let mut sw: Vec<u64> = results.iter().filter(|(p, _)| p == "SW").map(|(_, v)| *v).collect();
    let mut mx: Vec<u64> = results.iter().filter(|(p, _)| p == "MX").map(|(_, v)| *v).collect();
    sw.sort_unstable();
    mx.sort_unstable();

    assert_eq!(sw, vec![1, 2, 3]);
    assert_eq!(mx, vec![1, 2]);
}

#[test]
fn unused_numbers_leave_gaps_but_never_repeat() {
    let store = Arc::new(InMemoryInvoiceStore::new());
    let allocator = allocator(Arc::clone(&store));

    let burned = allocator.allocate_number("SW", 2026).unwrap();
    assert_eq!(burned.sequence(), 1);

    let committed = allocator.commit("SW", draft()).unwrap();
    assert_eq!(committed.number().sequence(), 2);
    assert!(store.find_by_number(&burned).unwrap().is_none());
}

#[test]
fn pre_allocated_numbers_are_stored_once() {
    let store = Arc::new(InMemoryInvoiceStore::new());
    let allocator = allocator(Arc::clone(&store));

    let number = allocator.allocate_number("SW", 2026).unwrap();
    let first = allocator.commit_with_number(number.clone(), draft()).unwrap();
    assert_eq!(first.number(), &number);

    let err = allocator.commit_with_number(number, draft()).unwrap_err();
    assert!(matches!(err, EngineError::Store(StoreError::Duplicate(_))));
    assert!(!err.is_retryable());
    assert_eq!(store.invoice_count().unwrap(), 1);
}

#[test]
fn number_from_another_year_is_rejected() {
    let allocator = allocator(Arc::new(InMemoryInvoiceStore::new()));

    let number = allocator.allocate_number("SW", 2025).unwrap();
    let err = allocator.commit_with_number(number, draft()).unwrap_err();
    assert!(matches!(err, EngineError::ConsistencyViolation(_)));
}

#[test]
fn narrow_widths_run_out() {
    let store = Arc::new(InMemoryInvoiceStore::new());
    let allocator = SequenceAllocator::new(
        Arc::clone(&store),
        NumberFormat::new(2, 7).unwrap(),
        RetryPolicy::no_retry(),
    );

    for _ in 0..99 {
        allocator.allocate_number("SW", 2026).unwrap();
    }
    let err = allocator.allocate_number("SW", 2026).unwrap_err();
    assert!(matches!(
        err,
        EngineError::SequenceExhausted { value: 100, width: 2, .. }
    ));

    // The atomic path rolls back instead of storing an unformattable number.
    let err = allocator.commit("SW", draft()).unwrap_err();
    assert!(matches!(err, EngineError::SequenceExhausted { .. }));
    assert_eq!(store.invoice_count().unwrap(), 0);
}

/// Reports contention on the first attempt of every commit, or on all of
/// them when `always` is set.
struct Flaky {
    inner: InMemoryInvoiceStore,
    seen: Mutex<HashSet<InvoiceId>>,
    always: bool,
}

impl Flaky {
    fn new(always: bool) -> Self {
        Self {
            inner: InMemoryInvoiceStore::new(),
            seen: Mutex::new(HashSet::new()),
            always,
        }
    }

    fn contend(&self, id: InvoiceId) -> Result<(), StoreError> {
        let first_attempt = self.seen.lock().unwrap().insert(id);
        if first_attempt || self.always {
            return Err(StoreError::Conflict("deadlock detected".into()));
        }
        Ok(())
    }
}

impl InvoiceStore for Flaky {
    fn next_sequence(&self, key: &SequenceKey) -> Result<u64, StoreError> {
        self.inner.next_sequence(key)
    }

    fn commit_invoice(
        &self,
        key: &SequenceKey,
        format: &NumberFormat,
        draft: InvoiceDraft,
    ) -> Result<Invoice, StoreError> {
        self.contend(draft.id)?;
        self.inner.commit_invoice(key, format, draft)
    }

    fn insert_invoice(&self, invoice: &Invoice) -> Result<(), StoreError> {
        self.inner.insert_invoice(invoice)
    }

    fn current_sequence(&self, key: &SequenceKey) -> Result<u64, StoreError> {
        self.inner.current_sequence(key)
    }

    fn load_invoice(&self, id: InvoiceId) -> Result<Option<Invoice>, StoreError> {
        self.inner.load_invoice(id)
    }

    fn find_by_number(&self, number: &InvoiceNumber) -> Result<Option<Invoice>, StoreError> {
        self.inner.find_by_number(number)
    }
}

#[test]
fn contended_commits_are_retried_without_duplicates() {
    let allocator = SequenceAllocator::new(
        Flaky::new(false),
        NumberFormat::default(),
        test_config().retry,
    );

    let invoices: Vec<Invoice> = thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                scope.spawn(|| {
                    (0..6)
                        .map(|_| allocator.commit("SW", draft()).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles.into_iter().flat_map(|h| h.join().unwrap()).collect()
    });

    let numbers: HashSet<u32> = invoices.iter().map(|i| i.number().sequence()).collect();
    assert_eq!(numbers.len(), 24);
    assert_eq!(numbers, (1..=24).collect::<HashSet<u32>>());

    for invoice in &invoices {
        let stored = allocator.store().load_invoice(*invoice.id()).unwrap().unwrap();
        assert_eq!(stored.number(), invoice.number());
    }
}

#[test]
fn persistent_contention_gives_up_with_allocation_failed() {
    let allocator = SequenceAllocator::new(
        Flaky::new(true),
        NumberFormat::default(),
        RetryPolicy::fixed(4, std::time::Duration::from_millis(1)),
    );

    let err = allocator.commit("SW", draft()).unwrap_err();
    assert!(matches!(err, EngineError::AllocationFailed { attempts: 4, .. }));
    assert!(err.is_retryable());
    assert_eq!(allocator.store().inner.invoice_count().unwrap(), 0);
}
