use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chrono::{TimeZone, Utc};
use proforma_core::{
    CatalogUnitId, ConfigurationId, FreightComponentId, FreightDefinitionId, Percentage,
    ReferenceRate, RiskRate, SupplierId,
};
use proforma_invoicing::{
    CatalogUnit, ComponentSetting, DeliveryTerm, Dimensions, FreeCarrierCosts, FreeOnBoardCosts,
    FreightAllocator, FreightComponent, FreightDefinition, InvoiceAggregator, InvoiceTerms,
    PricedItem, PricingConfiguration, PricingEngine,
};
use rust_decimal::Decimal;

const SUPPLIER: SupplierId = SupplierId::new(1);

fn configuration() -> PricingConfiguration {
    PricingConfiguration {
        id: ConfigurationId::new(1),
        effective_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        supplier_id: None,
        currency_reduction: Decimal::new(20, 2),
        tax: Percentage::new(Decimal::new(12, 0)).unwrap(),
        commission: Percentage::new(Decimal::new(5, 0)).unwrap(),
        margin: Percentage::new(Decimal::new(18, 0)).unwrap(),
        free_carrier: FreeCarrierCosts {
            border_road_freight: Decimal::new(1800, 0),
            carrier_handover_expenses: Decimal::new(350, 0),
        },
        free_on_board: FreeOnBoardCosts {
            port_freight: Decimal::new(3200, 0),
            port_documentation: Decimal::new(240, 0),
            customs_clearance: Decimal::new(510, 0),
            courier: Decimal::new(12050, 2),
        },
    }
}

fn priced_items(count: usize) -> Vec<PricedItem> {
    let engine = PricingEngine::new(SUPPLIER);
    (0..count)
        .map(|i| {
            let dims = Dimensions::centimeters(
                Decimal::from(80 + (i % 40) as i64),
                Decimal::from(60 + (i % 25) as i64),
                Decimal::from(45 + (i % 30) as i64),
            )
            .unwrap();
            let unit = CatalogUnit::new(
                CatalogUnitId::new(i as i64 + 1),
                SUPPLIER,
                format!("module {i}"),
                Decimal::new(99_990 + (i as i64 * 1_337) % 250_000, 2),
                dims,
            )
            .unwrap();
            engine
                .price_item(&unit, Decimal::from(1 + (i % 6) as i64), DeliveryTerm::FreeOnBoard)
                .unwrap()
        })
        .collect()
}

fn bench_freight_allocation(c: &mut Criterion) {
    let mut group = c.benchmark_group("freight_allocation");

    for item_count in [1, 10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*item_count as u64));
        group.bench_with_input(
            BenchmarkId::new("allocate", item_count),
            item_count,
            |b, &count| {
                let items = priced_items(count);
                let rate = RiskRate::new(Decimal::new(537, 2)).unwrap();
                b.iter(|| {
                    FreightAllocator::allocate(black_box(&items), Decimal::new(1_834_575, 2), rate)
                        .unwrap()
                });
            },
        );
    }

    group.finish();
}

fn bench_invoice_finalization(c: &mut Criterion) {
    let mut group = c.benchmark_group("invoice_finalization");
    let config = configuration();
    let freight = FreightDefinition {
        id: FreightDefinitionId::new(1),
        name: "40HC".into(),
        components: (1..=6)
            .map(|i| FreightComponent {
                id: FreightComponentId::new(i),
                name: format!("component {i}"),
                nominal: ComponentSetting::included(Decimal::new(125_050 * i, 2)),
                overrides: Vec::new(),
            })
            .collect(),
    }
    .resolve(SUPPLIER)
    .unwrap();
    let terms = InvoiceTerms {
        supplier_id: SUPPLIER,
        delivery_term: DeliveryTerm::FreeOnBoard,
        reference_rate: ReferenceRate::new(Decimal::new(557, 2)).unwrap(),
        risk_rate: RiskRate::new(Decimal::new(537, 2)).unwrap(),
    };
    let aggregator = InvoiceAggregator::default();

    for item_count in [1, 10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*item_count as u64));
        group.bench_with_input(
            BenchmarkId::new("finalize", item_count),
            item_count,
            |b, &count| {
                let items = priced_items(count);
                b.iter(|| {
                    aggregator
                        .finalize(&terms, black_box(items.clone()), &config, &freight)
                        .unwrap()
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_freight_allocation, bench_invoice_finalization);
criterion_main!(benches);
