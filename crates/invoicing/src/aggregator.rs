//! Invoice finalization: item totals and invoice rollup.

use core::fmt;
use core::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use proforma_core::{
    ConversionRate, DomainError, DomainResult, ReferenceRate, RiskRate, SupplierId, round_money,
};

use crate::configuration::PricingConfiguration;
use crate::delivery::DeliveryTerm;
use crate::freight::{FreightAllocator, ResolvedFreight, apportion};
use crate::invoice::{FinalizedInvoice, InvoiceItem, InvoiceTotals, ItemFreight};
use crate::pricing::PricedItem;

/// How tax, commission and margin are applied to an item subtotal.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PercentageMode {
    /// `subtotal × (1 + tax) × (1 + commission) × (1 + margin)`
    #[default]
    Sequential,
    /// `subtotal × (1 + tax + commission + margin)`
    Summed,
}

impl PercentageMode {
    pub fn as_str(self) -> &'static str {
        match self {
            PercentageMode::Sequential => "sequential",
            PercentageMode::Summed => "summed",
        }
    }

    /// Apply the configuration's percentages to `subtotal` (unrounded).
    pub fn apply(self, subtotal: Decimal, config: &PricingConfiguration) -> DomainResult<Decimal> {
        let overflow = || DomainError::consistency("percentage adjustment overflowed");
        match self {
            PercentageMode::Sequential => [config.tax, config.commission, config.margin]
                .into_iter()
                .try_fold(subtotal, |running, pct| running.checked_mul(pct.markup_factor()))
                .ok_or_else(overflow),
            PercentageMode::Summed => {
                let factor = Decimal::ONE
                    + config.tax.fraction()
                    + config.commission.fraction()
                    + config.margin.fraction();
                subtotal.checked_mul(factor).ok_or_else(overflow)
            }
        }
    }
}

impl fmt::Display for PercentageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PercentageMode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequential" => Ok(PercentageMode::Sequential),
            "summed" => Ok(PercentageMode::Summed),
            other => Err(DomainError::validation(format!(
                "unknown percentage mode '{other}'"
            ))),
        }
    }
}

/// Invoice-level inputs captured once at creation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceTerms {
    pub supplier_id: SupplierId,
    pub delivery_term: DeliveryTerm,
    pub reference_rate: ReferenceRate,
    pub risk_rate: RiskRate,
}

/// Composes priced items, freight and configuration into a finalized invoice.
///
/// Per item, in base currency:
///
/// ```text
/// subtotal = base value + freight share + fixed cost share
/// total    = round(percentages applied to subtotal)
/// ```
///
/// `total` is then converted once with the reference rate and once with the
/// risk rate. Invoice totals are sums of the item columns.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct InvoiceAggregator {
    mode: PercentageMode,
}

impl InvoiceAggregator {
    pub fn new(mode: PercentageMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> PercentageMode {
        self.mode
    }

    pub fn finalize(
        &self,
        terms: &InvoiceTerms,
        items: Vec<PricedItem>,
        config: &PricingConfiguration,
        freight: &ResolvedFreight,
    ) -> DomainResult<FinalizedInvoice> {
        if items.is_empty() {
            return Err(DomainError::validation("invoice has no items"));
        }
        config.validate()?;
        if !config.applies_to(terms.supplier_id) {
            return Err(DomainError::validation(format!(
                "configuration {} does not apply to supplier {}",
                config.id, terms.supplier_id
            )));
        }
        if freight.supplier_id != terms.supplier_id {
            return Err(DomainError::validation(format!(
                "freight was resolved for supplier {}, invoice is for {}",
                freight.supplier_id, terms.supplier_id
            )));
        }
        for item in &items {
            if item.delivery_term != terms.delivery_term {
                return Err(DomainError::validation(format!(
                    "catalog unit {} was priced {} on a {} invoice",
                    item.catalog_unit_id, item.delivery_term, terms.delivery_term
                )));
            }
            if item.supplier_id != terms.supplier_id {
                return Err(DomainError::validation(format!(
                    "catalog unit {} belongs to supplier {}, not {}",
                    item.catalog_unit_id, item.supplier_id, terms.supplier_id
                )));
            }
        }

        let allocation = FreightAllocator::allocate(&items, freight.total, terms.risk_rate)?;
        let volumes: Vec<Decimal> = items.iter().map(|item| item.line_volume_m3).collect();
        let fixed_total = config.fixed_costs(terms.delivery_term)?;
        let fixed_shares = apportion(fixed_total, &volumes)?;

        let mut finalized_items = Vec::with_capacity(items.len());
        for (index, ((item, share), fixed)) in items
            .into_iter()
            .zip(allocation.shares)
            .zip(fixed_shares)
            .enumerate()
        {
            let subtotal = item
                .base_value
                .checked_add(share.base)
                .and_then(|value| value.checked_add(fixed))
                .ok_or_else(|| {
                    DomainError::consistency(format!("line {} subtotal overflowed", index + 1))
                })?;
            let total_base = round_money(self.mode.apply(subtotal, config)?);
            let total_settlement = round_money(terms.reference_rate.to_settlement(total_base)?);
            let total_risk_settlement = round_money(terms.risk_rate.to_settlement(total_base)?);

            finalized_items.push(InvoiceItem {
                line: u32::try_from(index + 1)
                    .map_err(|_| DomainError::validation("too many invoice lines"))?,
                catalog_unit_id: item.catalog_unit_id,
                code: item.code,
                description: item.description,
                dimensions: item.dimensions,
                unit_volume_m3: item.unit_volume_m3,
                volume_m3: item.line_volume_m3,
                quantity: item.quantity,
                unit_fabric_price: item.unit_fabric_price,
                delivery_term: item.delivery_term,
                base_value: item.base_value,
                freight: ItemFreight {
                    volume_fraction: share.fraction,
                    base: share.base,
                    settlement: share.settlement,
                },
                fixed_costs: fixed,
                total_base,
                total_settlement,
                total_risk_settlement,
            });
        }

        let totals = InvoiceTotals::sum_of(&finalized_items)?;
        if totals.freight_base != allocation.total_base
            || totals.fixed_costs_base != round_money(fixed_total)
        {
            return Err(DomainError::consistency(format!(
                "allocated freight {} / fixed costs {} do not match {} / {}",
                totals.freight_base, totals.fixed_costs_base, allocation.total_base, fixed_total
            )));
        }

        let finalized = FinalizedInvoice {
            supplier_id: terms.supplier_id,
            delivery_term: terms.delivery_term,
            reference_rate: terms.reference_rate,
            risk_rate: terms.risk_rate,
            percentage_mode: self.mode,
            items: finalized_items,
            totals,
        };
        finalized.verify()?;
        Ok(finalized)
    }
}
