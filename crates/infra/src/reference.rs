//! Read-only reference data the engine prices against: catalog units, pricing
//! configurations and freight definitions.

use std::collections::HashMap;
use std::sync::RwLock;

use proforma_core::{CatalogUnitId, ConfigurationId, Entity, FreightDefinitionId, SupplierId};
use proforma_invoicing::{CatalogUnit, FreightDefinition, PricingConfiguration};

use crate::store::StoreError;

pub trait ReferenceData: Send + Sync {
    fn catalog_unit(&self, id: CatalogUnitId) -> Result<Option<CatalogUnit>, StoreError>;

    fn configuration(&self, id: ConfigurationId) -> Result<Option<PricingConfiguration>, StoreError>;

    /// Configuration in force for `supplier`: the newest supplier-scoped one,
    /// else the newest global one.
    fn latest_configuration(
        &self,
        supplier: SupplierId,
    ) -> Result<Option<PricingConfiguration>, StoreError>;

    fn freight_definition(
        &self,
        id: FreightDefinitionId,
    ) -> Result<Option<FreightDefinition>, StoreError>;
}

/// In-memory reference data (tests/dev).
#[derive(Debug, Default)]
pub struct InMemoryReferenceData {
    catalog: RwLock<HashMap<CatalogUnitId, CatalogUnit>>,
    configurations: RwLock<HashMap<ConfigurationId, PricingConfiguration>>,
    freight: RwLock<HashMap<FreightDefinitionId, FreightDefinition>>,
}

impl InMemoryReferenceData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_catalog_unit(&self, unit: CatalogUnit) -> Result<(), StoreError> {
        self.catalog
            .write()
            .map_err(|_| poisoned())?
            .insert(*unit.id(), unit);
        Ok(())
    }

    pub fn insert_configuration(&self, config: PricingConfiguration) -> Result<(), StoreError> {
        self.configurations
            .write()
            .map_err(|_| poisoned())?
            .insert(config.id, config);
        Ok(())
    }

    pub fn insert_freight_definition(&self, definition: FreightDefinition) -> Result<(), StoreError> {
        self.freight
            .write()
            .map_err(|_| poisoned())?
            .insert(definition.id, definition);
        Ok(())
    }
}

fn poisoned() -> StoreError {
    StoreError::Backend("lock poisoned".to_string())
}

impl ReferenceData for InMemoryReferenceData {
    fn catalog_unit(&self, id: CatalogUnitId) -> Result<Option<CatalogUnit>, StoreError> {
        Ok(self.catalog.read().map_err(|_| poisoned())?.get(&id).cloned())
    }

    fn configuration(&self, id: ConfigurationId) -> Result<Option<PricingConfiguration>, StoreError> {
        Ok(self
            .configurations
            .read()
            .map_err(|_| poisoned())?
            .get(&id)
            .cloned())
    }

    fn latest_configuration(
        &self,
        supplier: SupplierId,
    ) -> Result<Option<PricingConfiguration>, StoreError> {
        let configurations = self.configurations.read().map_err(|_| poisoned())?;

        // Ties on effective_at go to the higher id.
        let newest = |scoped: Option<SupplierId>| {
            configurations
                .values()
                .filter(|c| c.supplier_id == scoped)
                .max_by_key(|c| (c.effective_at, c.id))
                .cloned()
        };

        Ok(newest(Some(supplier)).or_else(|| newest(None)))
    }

    fn freight_definition(
        &self,
        id: FreightDefinitionId,
    ) -> Result<Option<FreightDefinition>, StoreError> {
        Ok(self.freight.read().map_err(|_| poisoned())?.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use proforma_core::Percentage;
    use proforma_invoicing::{FreeCarrierCosts, FreeOnBoardCosts};
    use rust_decimal::Decimal;

    fn config(id: i64, supplier: Option<i64>, day: u32) -> PricingConfiguration {
        PricingConfiguration {
            id: ConfigurationId::new(id),
            effective_at: Utc.with_ymd_and_hms(2026, 3, day, 0, 0, 0).unwrap(),
            supplier_id: supplier.map(SupplierId::new),
            currency_reduction: Decimal::ZERO,
            tax: Percentage::ZERO,
            commission: Percentage::ZERO,
            margin: Percentage::ZERO,
            free_carrier: FreeCarrierCosts {
                border_road_freight: Decimal::ZERO,
                carrier_handover_expenses: Decimal::ZERO,
            },
            free_on_board: FreeOnBoardCosts {
                port_freight: Decimal::ZERO,
                port_documentation: Decimal::ZERO,
                customs_clearance: Decimal::ZERO,
                courier: Decimal::ZERO,
            },
        }
    }

    #[test]
    fn supplier_scoped_configuration_wins_over_global() {
        let data = InMemoryReferenceData::new();
        data.insert_configuration(config(1, None, 1)).unwrap();
        data.insert_configuration(config(2, None, 20)).unwrap();
        data.insert_configuration(config(3, Some(7), 5)).unwrap();
        data.insert_configuration(config(4, Some(7), 10)).unwrap();

        let for_seven = data.latest_configuration(SupplierId::new(7)).unwrap().unwrap();
        assert_eq!(for_seven.id, ConfigurationId::new(4));

        let for_other = data.latest_configuration(SupplierId::new(8)).unwrap().unwrap();
        assert_eq!(for_other.id, ConfigurationId::new(2));
    }

    #[test]
    fn missing_configuration_is_none() {
        let data = InMemoryReferenceData::new();
        assert!(data.latest_configuration(SupplierId::new(1)).unwrap().is_none());
        assert!(data.configuration(ConfigurationId::new(1)).unwrap().is_none());
    }
}
