//! Freight bases and volume-proportional freight allocation.
//!
//! A freight definition is resolved once per invoice into a single base
//! currency total (supplier overrides and exclusions applied per component).
//! That total is then spread over the invoice items by volume share.
//!
//! ## Rounding
//!
//! Every share but the last is rounded to cents (half away from zero); the
//! last item (insertion order) takes the remainder. The shares therefore
//! always add up to the rounded total exactly, and the last share is off its
//! exact value by at most the accumulated rounding of the others.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use proforma_core::{
    ConversionRate, DomainError, DomainResult, Entity, FreightComponentId, FreightDefinitionId,
    RateKind, SupplierId, round_money,
};

use crate::pricing::PricedItem;

/// Value and exclusion flag of a freight component.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentSetting {
    pub value: Decimal,
    /// Excluded components stay visible in the breakdown but add nothing.
    pub excluded: bool,
}

impl ComponentSetting {
    pub fn included(value: Decimal) -> Self {
        Self {
            value,
            excluded: false,
        }
    }

    pub fn excluded(value: Decimal) -> Self {
        Self {
            value,
            excluded: true,
        }
    }
}

/// Supplier-specific replacement for a component's nominal setting.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplierOverride {
    pub supplier_id: SupplierId,
    pub setting: ComponentSetting,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreightComponent {
    pub id: FreightComponentId,
    pub name: String,
    pub nominal: ComponentSetting,
    #[serde(default)]
    pub overrides: Vec<SupplierOverride>,
}

impl FreightComponent {
    pub fn override_for(&self, supplier: SupplierId) -> Option<&SupplierOverride> {
        self.overrides.iter().find(|o| o.supplier_id == supplier)
    }

    fn resolve(&self, supplier: SupplierId) -> DomainResult<ResolvedComponent> {
        if self
            .overrides
            .iter()
            .filter(|o| o.supplier_id == supplier)
            .count()
            > 1
        {
            return Err(DomainError::validation(format!(
                "freight component {} has more than one override for supplier {supplier}",
                self.id
            )));
        }

        let overridden = self.override_for(supplier);
        let setting = overridden.map_or(self.nominal, |o| o.setting);
        if setting.value.is_sign_negative() && !setting.value.is_zero() {
            return Err(DomainError::validation(format!(
                "freight component {} ('{}') has a negative value",
                self.id, self.name
            )));
        }

        Ok(ResolvedComponent {
            component_id: self.id,
            name: self.name.clone(),
            value: setting.value,
            excluded: setting.excluded,
            overridden: overridden.is_some(),
        })
    }
}

/// A named freight basis made of ordered components.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreightDefinition {
    pub id: FreightDefinitionId,
    pub name: String,
    pub components: Vec<FreightComponent>,
}

impl FreightDefinition {
    /// Resolve every component for `supplier` and sum the included ones.
    pub fn resolve(&self, supplier: SupplierId) -> DomainResult<ResolvedFreight> {
        let components = self
            .components
            .iter()
            .map(|c| c.resolve(supplier))
            .collect::<DomainResult<Vec<_>>>()?;

        let total = components
            .iter()
            .filter(|c| !c.excluded)
            .try_fold(Decimal::ZERO, |acc, c| acc.checked_add(c.value))
            .map(round_money)
            .ok_or_else(|| DomainError::consistency("freight component sum overflowed"))?;

        Ok(ResolvedFreight {
            definition_id: self.id,
            supplier_id: supplier,
            components,
            total,
        })
    }
}

impl Entity for FreightDefinition {
    type Id = FreightDefinitionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// A component's final value for one supplier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedComponent {
    pub component_id: FreightComponentId,
    pub name: String,
    pub value: Decimal,
    pub excluded: bool,
    pub overridden: bool,
}

/// Freight total (base currency) with its per-component breakdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedFreight {
    pub definition_id: FreightDefinitionId,
    pub supplier_id: SupplierId,
    pub components: Vec<ResolvedComponent>,
    pub total: Decimal,
}

/// Split `total` (rounded to cents) across `weights`.
///
/// Every share but the last is rounded to cents on its own; the last takes
/// whatever is left, so the shares always add up to the rounded total.
///
/// Fails with a validation error when the weights add up to zero, and with a
/// consistency violation if the leftover for the last share is negative
/// (rounded leading shares overshooting a near-zero last share).
pub fn apportion(total: Decimal, weights: &[Decimal]) -> DomainResult<Vec<Decimal>> {
    if total.is_sign_negative() && !total.is_zero() {
        return Err(DomainError::validation(format!(
            "amount to apportion must not be negative (got {total})"
        )));
    }
    let weight_sum = weight_sum(weights)?;
    let target = round_money(total);

    let Some((_, leading)) = weights.split_last() else {
        return Err(DomainError::validation("nothing to apportion across"));
    };

    let mut shares = Vec::with_capacity(weights.len());
    let mut assigned = Decimal::ZERO;
    for weight in leading {
        let share = target
            .checked_mul(*weight)
            .and_then(|scaled| scaled.checked_div(weight_sum))
            .map(round_money)
            .ok_or_else(|| DomainError::consistency("apportioning overflowed"))?;
        assigned = assigned
            .checked_add(share)
            .ok_or_else(|| DomainError::consistency("apportioning overflowed"))?;
        shares.push(share);
    }

    let residual = target - assigned;
    if residual.is_sign_negative() && !residual.is_zero() {
        return Err(DomainError::consistency(format!(
            "rounded shares exceed {target} by {}; last share would be negative",
            -residual
        )));
    }
    shares.push(residual);

    let reconciled: Decimal = shares.iter().sum();
    if reconciled != target {
        return Err(DomainError::consistency(format!(
            "apportioned shares sum to {reconciled}, expected {target}"
        )));
    }
    Ok(shares)
}

fn weight_sum(weights: &[Decimal]) -> DomainResult<Decimal> {
    let mut sum = Decimal::ZERO;
    for weight in weights {
        if weight.is_sign_negative() && !weight.is_zero() {
            return Err(DomainError::validation(format!(
                "item volume must not be negative (got {weight})"
            )));
        }
        sum = sum
            .checked_add(*weight)
            .ok_or_else(|| DomainError::consistency("total volume overflowed"))?;
    }
    if sum.is_zero() {
        return Err(DomainError::validation(
            "total volume is zero; freight cannot be allocated",
        ));
    }
    Ok(sum)
}

/// One item's part of the invoice freight.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreightShare {
    pub volume_m3: Decimal,
    /// `volume / total volume`, unrounded.
    pub fraction: Decimal,
    pub base: Decimal,
    pub settlement: Decimal,
}

/// Freight spread over an invoice's items, in both currencies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreightAllocation {
    pub total_base: Decimal,
    pub total_settlement: Decimal,
    /// Rate used for the settlement column.
    pub rate_kind: RateKind,
    pub shares: Vec<FreightShare>,
}

/// Volume-proportional freight allocation.
pub struct FreightAllocator;

impl FreightAllocator {
    /// Allocate `total_base` across priced items by their line volume.
    pub fn allocate<R: ConversionRate>(
        items: &[PricedItem],
        total_base: Decimal,
        rate: R,
    ) -> DomainResult<FreightAllocation> {
        let volumes: Vec<Decimal> = items.iter().map(|item| item.line_volume_m3).collect();
        Self::allocate_volumes(&volumes, total_base, rate)
    }

    pub fn allocate_volumes<R: ConversionRate>(
        volumes: &[Decimal],
        total_base: Decimal,
        rate: R,
    ) -> DomainResult<FreightAllocation> {
        let fractions = Self::volume_fractions(volumes)?;
        let base = apportion(total_base, volumes)?;

        // Settlement shares are apportioned from the converted total so they
        // reconcile the same way the base shares do.
        let total_base = round_money(total_base);
        let total_settlement = round_money(rate.to_settlement(total_base)?);
        let settlement = apportion(total_settlement, volumes)?;

        let shares = volumes
            .iter()
            .zip(fractions)
            .zip(base.into_iter().zip(settlement))
            .map(|((volume, fraction), (base, settlement))| FreightShare {
                volume_m3: *volume,
                fraction,
                base,
                settlement,
            })
            .collect();

        Ok(FreightAllocation {
            total_base,
            total_settlement,
            rate_kind: R::KIND,
            shares,
        })
    }

    /// Each volume divided by the total volume.
    pub fn volume_fractions(volumes: &[Decimal]) -> DomainResult<Vec<Decimal>> {
        let total = weight_sum(volumes)?;
        volumes
            .iter()
            .map(|v| {
                v.checked_div(total)
                    .ok_or_else(|| DomainError::consistency("volume fraction overflowed"))
            })
            .collect()
    }
}
