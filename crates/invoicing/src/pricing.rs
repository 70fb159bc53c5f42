//! Per-item pricing.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use proforma_core::{CatalogUnitId, DomainError, DomainResult, Entity, SupplierId, round_money};

use crate::catalog::{CatalogUnit, Dimensions};
use crate::delivery::DeliveryTerm;

/// An item priced in base currency, before freight and percentages.
///
/// Carries the catalog snapshot the invoice item is later built from, so the
/// catalog unit itself is not needed after pricing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedItem {
    pub catalog_unit_id: CatalogUnitId,
    pub supplier_id: SupplierId,
    pub code: Option<String>,
    pub description: String,
    pub dimensions: Dimensions,
    pub unit_volume_m3: Decimal,
    /// Unit volume times quantity; the weight used for freight apportioning.
    pub line_volume_m3: Decimal,
    pub quantity: Decimal,
    pub unit_fabric_price: Decimal,
    pub delivery_term: DeliveryTerm,
    pub base_value: Decimal,
}

/// Prices items for one supplier's invoice.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PricingEngine {
    supplier_id: SupplierId,
}

impl PricingEngine {
    pub fn new(supplier_id: SupplierId) -> Self {
        Self { supplier_id }
    }

    pub fn supplier_id(&self) -> SupplierId {
        self.supplier_id
    }

    /// `base_value = unit_fabric_price × quantity`, rounded to cents.
    ///
    /// The delivery term is recorded on the item; it does not change the base
    /// value. Fixed components are added at invoice level.
    pub fn price_item(
        &self,
        unit: &CatalogUnit,
        quantity: Decimal,
        term: DeliveryTerm,
    ) -> DomainResult<PricedItem> {
        if quantity <= Decimal::ZERO {
            return Err(DomainError::validation(format!(
                "catalog unit {}: quantity must be positive (got {quantity})",
                unit.id()
            )));
        }
        if unit.supplier_id() != self.supplier_id {
            return Err(DomainError::validation(format!(
                "catalog unit {} belongs to supplier {}, not {}",
                unit.id(),
                unit.supplier_id(),
                self.supplier_id
            )));
        }

        let overflow = || DomainError::consistency(format!("catalog unit {}: pricing overflowed", unit.id()));
        let base_value = unit
            .unit_fabric_price()
            .checked_mul(quantity)
            .map(round_money)
            .ok_or_else(overflow)?;
        let line_volume_m3 = unit.volume_m3().checked_mul(quantity).ok_or_else(overflow)?;

        Ok(PricedItem {
            catalog_unit_id: *unit.id(),
            supplier_id: unit.supplier_id(),
            code: unit.code().map(str::to_owned),
            description: unit.description().to_owned(),
            dimensions: *unit.dimensions(),
            unit_volume_m3: unit.volume_m3(),
            line_volume_m3,
            quantity,
            unit_fabric_price: unit.unit_fabric_price(),
            delivery_term: term,
            base_value,
        })
    }
}
