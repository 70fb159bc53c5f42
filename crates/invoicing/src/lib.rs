//! Proforma invoice pricing engine.
//!
//! This crate contains the business rules for pricing export invoices,
//! implemented purely as deterministic domain logic (no IO, no storage, no
//! clocks): every function takes already-fetched inputs and returns values.
//!
//! Flow for one invoice:
//!
//! 1. [`PricingEngine::price_item`] turns a catalog unit + quantity into a base value.
//! 2. [`FreightDefinition::resolve`] turns a freight basis into a total for the supplier.
//! 3. [`FreightAllocator`] spreads that total across items by volume.
//! 4. [`InvoiceAggregator::finalize`] composes item totals and invoice totals.
//!
//! Numbering lives in [`number`]; the counter behind it is infrastructure.

pub mod aggregator;
pub mod catalog;
pub mod configuration;
pub mod delivery;
pub mod freight;
pub mod invoice;
pub mod number;
pub mod pricing;

pub use aggregator::{InvoiceAggregator, InvoiceTerms, PercentageMode};
pub use catalog::{CatalogUnit, Dimensions, LengthUnit};
pub use configuration::{FixedCost, FreeCarrierCosts, FreeOnBoardCosts, PricingConfiguration};
pub use delivery::DeliveryTerm;
pub use freight::{
    ComponentSetting, FreightAllocation, FreightAllocator, FreightComponent, FreightDefinition,
    FreightShare, ResolvedComponent, ResolvedFreight, SupplierOverride, apportion,
};
pub use invoice::{
    FinalizedInvoice, Invoice, InvoiceDraft, InvoiceItem, InvoiceStatus, InvoiceTotals,
    ItemFreight,
};
pub use number::{InvoiceNumber, NumberFormat, Prefix, SequenceKey};
pub use pricing::{PricedItem, PricingEngine};
