#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use proforma_core::{
    CatalogUnitId, ClientId, ConfigurationId, FreightComponentId, FreightDefinitionId, Percentage,
    ReferenceRate, SupplierId,
};
use proforma_infra::{
    ComputeInvoice, EngineConfig, InMemoryInvoiceStore, InMemoryReferenceData, InvoiceService,
    ItemRequest, RetryPolicy,
};
use proforma_invoicing::{
    CatalogUnit, ComponentSetting, DeliveryTerm, Dimensions, FreeCarrierCosts, FreeOnBoardCosts,
    FreightComponent, FreightDefinition, PricingConfiguration,
};

pub const SUPPLIER: SupplierId = SupplierId::new(1);
pub const OTHER_SUPPLIER: SupplierId = SupplierId::new(2);
pub const CONFIGURATION: ConfigurationId = ConfigurationId::new(10);
pub const FREIGHT: FreightDefinitionId = FreightDefinitionId::new(20);

pub const SOFA: CatalogUnitId = CatalogUnitId::new(100);
pub const ARMCHAIR: CatalogUnitId = CatalogUnitId::new(101);
pub const FLAT_PANEL: CatalogUnitId = CatalogUnitId::new(102);
pub const FOREIGN_UNIT: CatalogUnitId = CatalogUnitId::new(103);

pub fn init_tracing() {
    let _ = proforma_observability::init();
}

pub fn test_config() -> EngineConfig {
    EngineConfig {
        retry: RetryPolicy::fixed(5, Duration::from_millis(1)),
        ..EngineConfig::default()
    }
}

/// FOB fixed costs add up to 1500; FCA to 800.
pub fn pricing_configuration() -> PricingConfiguration {
    PricingConfiguration {
        id: CONFIGURATION,
        effective_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        supplier_id: None,
        currency_reduction: dec!(0.50),
        tax: Percentage::ZERO,
        commission: Percentage::ZERO,
        margin: Percentage::ZERO,
        free_carrier: FreeCarrierCosts {
            border_road_freight: dec!(600),
            carrier_handover_expenses: dec!(200),
        },
        free_on_board: FreeOnBoardCosts {
            port_freight: dec!(1000),
            port_documentation: dec!(100),
            customs_clearance: dec!(300),
            courier: dec!(100),
        },
    }
}

/// Resolves to 400.00 for every supplier.
pub fn freight_definition() -> FreightDefinition {
    FreightDefinition {
        id: FREIGHT,
        name: "truck to port".into(),
        components: vec![
            FreightComponent {
                id: FreightComponentId::new(1),
                name: "road".into(),
                nominal: ComponentSetting::included(dec!(350)),
                overrides: Vec::new(),
            },
            FreightComponent {
                id: FreightComponentId::new(2),
                name: "loading".into(),
                nominal: ComponentSetting::included(dec!(50)),
                overrides: Vec::new(),
            },
        ],
    }
}

fn cube(id: CatalogUnitId, supplier: SupplierId, description: &str, price: Decimal) -> CatalogUnit {
    // 1 m³
    let dims = Dimensions::centimeters(dec!(100), dec!(100), dec!(100)).unwrap();
    CatalogUnit::new(id, supplier, description, price, dims).unwrap()
}

pub fn reference_data() -> InMemoryReferenceData {
    let data = InMemoryReferenceData::new();
    data.insert_configuration(pricing_configuration()).unwrap();
    data.insert_freight_definition(freight_definition()).unwrap();
    data.insert_catalog_unit(cube(SOFA, SUPPLIER, "Sofa, 3 seats", dec!(1000)).with_code("SOF-3"))
        .unwrap();
    data.insert_catalog_unit(cube(ARMCHAIR, SUPPLIER, "Armchair", dec!(500))).unwrap();
    data.insert_catalog_unit(
        CatalogUnit::new(
            FLAT_PANEL,
            SUPPLIER,
            "Panel without depth",
            dec!(80),
            Dimensions::centimeters(dec!(100), Decimal::ZERO, dec!(100)).unwrap(),
        )
        .unwrap(),
    )
    .unwrap();
    data.insert_catalog_unit(cube(FOREIGN_UNIT, OTHER_SUPPLIER, "Ottoman", dec!(300)))
        .unwrap();
    data
}

pub type MemoryService = InvoiceService<Arc<InMemoryInvoiceStore>, InMemoryReferenceData>;

pub fn service() -> (MemoryService, Arc<InMemoryInvoiceStore>) {
    let store = Arc::new(InMemoryInvoiceStore::new());
    let service = InvoiceService::new(Arc::clone(&store), reference_data(), &test_config()).unwrap();
    (service, store)
}

pub fn issued_on() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 15).unwrap()
}

/// Sofa ×1 and armchair ×3, FOB, reference rate 5.00, derived risk rate.
pub fn fob_request() -> ComputeInvoice {
    ComputeInvoice {
        client_id: ClientId::new(),
        supplier_id: SUPPLIER,
        delivery_term: DeliveryTerm::FreeOnBoard,
        items: vec![
            ItemRequest {
                catalog_unit_id: SOFA,
                quantity: dec!(1),
            },
            ItemRequest {
                catalog_unit_id: ARMCHAIR,
                quantity: dec!(3),
            },
        ],
        freight_definition_id: FREIGHT,
        configuration_id: None,
        reference_rate: ReferenceRate::new(dec!(5.00)).unwrap(),
        risk_rate: None,
        issued_on: issued_on(),
        prefix: None,
    }
}
