//! Pricing configuration snapshots.
//!
//! A configuration row is never edited once an invoice has referenced it;
//! parameter changes create a new row with a later `effective_at`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use proforma_core::{
    ConfigurationId, DomainError, DomainResult, Entity, Percentage, ReferenceRate, RiskRate,
    SupplierId,
};

use crate::delivery::DeliveryTerm;

/// Fixed components added when the invoice is quoted free-carrier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FreeCarrierCosts {
    /// Road freight from the factory to the border crossing.
    pub border_road_freight: Decimal,
    pub carrier_handover_expenses: Decimal,
}

/// Fixed components added when the invoice is quoted free-on-board.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FreeOnBoardCosts {
    /// Road freight from the factory to the port of loading.
    pub port_freight: Decimal,
    pub port_documentation: Decimal,
    pub customs_clearance: Decimal,
    pub courier: Decimal,
}

/// One named fixed cost, in base currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedCost {
    pub name: &'static str,
    pub amount: Decimal,
}

/// Business parameters effective when an invoice is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingConfiguration {
    pub id: ConfigurationId,
    pub effective_at: DateTime<Utc>,
    /// `None` for the global configuration.
    pub supplier_id: Option<SupplierId>,
    /// Subtracted from the reference rate to obtain the risk rate.
    pub currency_reduction: Decimal,
    pub tax: Percentage,
    pub commission: Percentage,
    pub margin: Percentage,
    pub free_carrier: FreeCarrierCosts,
    pub free_on_board: FreeOnBoardCosts,
}

impl PricingConfiguration {
    /// Check the amounts a configuration row must satisfy before it is used.
    pub fn validate(&self) -> DomainResult<()> {
        if self.currency_reduction.is_sign_negative() && !self.currency_reduction.is_zero() {
            return Err(DomainError::validation(format!(
                "configuration {}: currency reduction must not be negative",
                self.id
            )));
        }

        for term in DeliveryTerm::ALL {
            for cost in self.fixed_cost_components(term) {
                if cost.amount.is_sign_negative() && !cost.amount.is_zero() {
                    return Err(DomainError::validation(format!(
                        "configuration {}: fixed cost '{}' must not be negative",
                        self.id, cost.name
                    )));
                }
            }
        }
        Ok(())
    }

    /// Whether this configuration may price an invoice for `supplier`.
    pub fn applies_to(&self, supplier: SupplierId) -> bool {
        self.supplier_id.is_none_or(|scoped| scoped == supplier)
    }

    /// The fixed components the delivery term selects.
    ///
    /// Ex-works selects none; free-carrier and free-on-board never mix.
    pub fn fixed_cost_components(&self, term: DeliveryTerm) -> Vec<FixedCost> {
        match term {
            DeliveryTerm::ExWorks => Vec::new(),
            DeliveryTerm::FreeCarrier => vec![
                FixedCost {
                    name: "border_road_freight",
                    amount: self.free_carrier.border_road_freight,
                },
                FixedCost {
                    name: "carrier_handover_expenses",
                    amount: self.free_carrier.carrier_handover_expenses,
                },
            ],
            DeliveryTerm::FreeOnBoard => vec![
                FixedCost {
                    name: "port_freight",
                    amount: self.free_on_board.port_freight,
                },
                FixedCost {
                    name: "port_documentation",
                    amount: self.free_on_board.port_documentation,
                },
                FixedCost {
                    name: "customs_clearance",
                    amount: self.free_on_board.customs_clearance,
                },
                FixedCost {
                    name: "courier",
                    amount: self.free_on_board.courier,
                },
            ],
        }
    }

    /// Sum of the fixed components for `term`, in base currency.
    pub fn fixed_costs(&self, term: DeliveryTerm) -> DomainResult<Decimal> {
        self.fixed_cost_components(term)
            .iter()
            .try_fold(Decimal::ZERO, |acc, cost| acc.checked_add(cost.amount))
            .ok_or_else(|| DomainError::consistency("fixed cost sum overflowed"))
    }

    /// Risk rate obtained by reducing the reference rate.
    pub fn derive_risk_rate(&self, reference: ReferenceRate) -> DomainResult<RiskRate> {
        let reduced = reference.value() - self.currency_reduction;
        RiskRate::new(reduced).map_err(|_| {
            DomainError::validation(format!(
                "reference rate {reference} minus currency reduction {} leaves no positive risk rate",
                self.currency_reduction
            ))
        })
    }
}

impl Entity for PricingConfiguration {
    type Id = ConfigurationId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
