//! `proforma-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! the error taxonomy shared by every layer, strongly-typed identifiers, and the
//! money / exchange-rate value objects the pricing engine computes with.

pub mod entity;
pub mod error;
pub mod id;
pub mod money;
pub mod value_object;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{
    CatalogUnitId, ClientId, ConfigurationId, FreightComponentId, FreightDefinitionId, InvoiceId,
    SupplierId,
};
pub use money::{
    ConversionRate, MONEY_SCALE, Percentage, RateKind, ReferenceRate, RiskRate, round_money,
};
pub use value_object::ValueObject;
