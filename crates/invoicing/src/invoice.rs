//! Finalized invoice records.
//!
//! Items are immutable snapshots taken at finalization; the invoice owns them
//! by value and refers to everything else (client, supplier, configuration,
//! freight definition, catalog units) by identifier.

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use proforma_core::{
    CatalogUnitId, ClientId, ConfigurationId, DomainError, DomainResult, Entity,
    FreightDefinitionId, InvoiceId, ReferenceRate, RiskRate, SupplierId,
};

use crate::aggregator::PercentageMode;
use crate::catalog::Dimensions;
use crate::delivery::DeliveryTerm;
use crate::number::InvoiceNumber;

/// Lifecycle status. Only the initial state is modelled.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    Open,
}

impl InvoiceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            InvoiceStatus::Open => "OPEN",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "OPEN" => Ok(InvoiceStatus::Open),
            other => Err(DomainError::validation(format!(
                "unknown invoice status '{other}'"
            ))),
        }
    }
}

/// Freight attributed to one item.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFreight {
    pub volume_fraction: Decimal,
    pub base: Decimal,
    /// Converted with the invoice's risk rate.
    pub settlement: Decimal,
}

/// One invoice line, frozen at finalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceItem {
    /// 1-based position; the last position absorbs rounding residuals.
    pub line: u32,
    pub catalog_unit_id: CatalogUnitId,
    pub code: Option<String>,
    pub description: String,
    pub dimensions: Dimensions,
    pub unit_volume_m3: Decimal,
    pub volume_m3: Decimal,
    pub quantity: Decimal,
    pub unit_fabric_price: Decimal,
    pub delivery_term: DeliveryTerm,
    pub base_value: Decimal,
    pub freight: ItemFreight,
    /// This item's share of the delivery term's fixed components.
    pub fixed_costs: Decimal,
    pub total_base: Decimal,
    /// `total_base` at the reference rate.
    pub total_settlement: Decimal,
    /// `total_base` at the risk rate.
    pub total_risk_settlement: Decimal,
}

/// Invoice-level rollup; every field is a sum over the items.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InvoiceTotals {
    pub fabric_base: Decimal,
    pub freight_base: Decimal,
    pub freight_settlement: Decimal,
    pub fixed_costs_base: Decimal,
    pub total_base: Decimal,
    pub total_settlement: Decimal,
    pub total_risk_settlement: Decimal,
}

impl InvoiceTotals {
    pub fn sum_of(items: &[InvoiceItem]) -> DomainResult<Self> {
        fn add(acc: Decimal, value: Decimal, column: &str) -> DomainResult<Decimal> {
            acc.checked_add(value)
                .ok_or_else(|| DomainError::consistency(format!("{column} total overflowed")))
        }

        items.iter().try_fold(Self::default(), |acc, item| {
            Ok(Self {
                fabric_base: add(acc.fabric_base, item.base_value, "fabric")?,
                freight_base: add(acc.freight_base, item.freight.base, "freight")?,
                freight_settlement: add(
                    acc.freight_settlement,
                    item.freight.settlement,
                    "freight settlement",
                )?,
                fixed_costs_base: add(acc.fixed_costs_base, item.fixed_costs, "fixed costs")?,
                total_base: add(acc.total_base, item.total_base, "base")?,
                total_settlement: add(acc.total_settlement, item.total_settlement, "settlement")?,
                total_risk_settlement: add(
                    acc.total_risk_settlement,
                    item.total_risk_settlement,
                    "risk settlement",
                )?,
            })
        })
    }
}

/// Output of the aggregator: priced, allocated and rolled-up, but not numbered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizedInvoice {
    pub supplier_id: SupplierId,
    pub delivery_term: DeliveryTerm,
    pub reference_rate: ReferenceRate,
    pub risk_rate: RiskRate,
    pub percentage_mode: PercentageMode,
    pub items: Vec<InvoiceItem>,
    pub totals: InvoiceTotals,
}

impl FinalizedInvoice {
    /// Re-check item/invoice consistency.
    pub fn verify(&self) -> DomainResult<()> {
        if self.items.is_empty() {
            return Err(DomainError::validation("invoice has no items"));
        }
        for (index, item) in self.items.iter().enumerate() {
            let expected_line = u32::try_from(index + 1)
                .map_err(|_| DomainError::consistency("too many invoice lines"))?;
            if item.line != expected_line {
                return Err(DomainError::consistency(format!(
                    "item at position {} is numbered {}",
                    index + 1,
                    item.line
                )));
            }
            if item.delivery_term != self.delivery_term {
                return Err(DomainError::consistency(format!(
                    "line {} was priced {} on a {} invoice",
                    item.line, item.delivery_term, self.delivery_term
                )));
            }
            if item.total_base.is_sign_negative() && !item.total_base.is_zero() {
                return Err(DomainError::consistency(format!(
                    "line {} has a negative total",
                    item.line
                )));
            }
        }

        let recomputed = InvoiceTotals::sum_of(&self.items)?;
        if recomputed != self.totals {
            return Err(DomainError::consistency(format!(
                "invoice totals diverge from item totals: {:?} != {:?}",
                self.totals, recomputed
            )));
        }

        if self.reference_rate.value() == self.risk_rate.value()
            && self.totals.total_settlement != self.totals.total_risk_settlement
        {
            return Err(DomainError::consistency(
                "equal rates produced different settlement totals",
            ));
        }
        Ok(())
    }
}

/// Everything needed to persist an invoice except its number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceDraft {
    pub id: InvoiceId,
    pub client_id: ClientId,
    pub issued_on: NaiveDate,
    pub configuration_id: ConfigurationId,
    pub freight_definition_id: FreightDefinitionId,
    pub finalized: FinalizedInvoice,
}

impl InvoiceDraft {
    /// The sequence year comes from the issue date.
    pub fn year(&self) -> i32 {
        self.issued_on.year()
    }

    /// Attach the allocated number, producing the persisted record.
    pub fn into_invoice(self, number: InvoiceNumber) -> DomainResult<Invoice> {
        if number.year() != self.year() {
            return Err(DomainError::consistency(format!(
                "number {number} does not belong to year {}",
                self.year()
            )));
        }
        self.finalized.verify()?;

        let FinalizedInvoice {
            supplier_id,
            delivery_term,
            reference_rate,
            risk_rate,
            percentage_mode,
            items,
            totals,
        } = self.finalized;

        Ok(Invoice {
            id: self.id,
            number,
            status: InvoiceStatus::Open,
            client_id: self.client_id,
            supplier_id,
            issued_on: self.issued_on,
            delivery_term,
            reference_rate,
            risk_rate,
            percentage_mode,
            configuration_id: self.configuration_id,
            freight_definition_id: self.freight_definition_id,
            items,
            totals,
        })
    }
}

/// A numbered, persisted proforma invoice.
///
/// Only built through [`InvoiceDraft::into_invoice`], so it serializes but
/// never deserializes; readers rebuild the draft and number it again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invoice {
    id: InvoiceId,
    number: InvoiceNumber,
    status: InvoiceStatus,
    client_id: ClientId,
    supplier_id: SupplierId,
    issued_on: NaiveDate,
    delivery_term: DeliveryTerm,
    reference_rate: ReferenceRate,
    risk_rate: RiskRate,
    percentage_mode: PercentageMode,
    configuration_id: ConfigurationId,
    freight_definition_id: FreightDefinitionId,
    items: Vec<InvoiceItem>,
    totals: InvoiceTotals,
}

impl Invoice {
    pub fn number(&self) -> &InvoiceNumber {
        &self.number
    }

    pub fn status(&self) -> InvoiceStatus {
        self.status
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    pub fn supplier_id(&self) -> SupplierId {
        self.supplier_id
    }

    pub fn issued_on(&self) -> NaiveDate {
        self.issued_on
    }

    pub fn delivery_term(&self) -> DeliveryTerm {
        self.delivery_term
    }

    pub fn reference_rate(&self) -> ReferenceRate {
        self.reference_rate
    }

    pub fn risk_rate(&self) -> RiskRate {
        self.risk_rate
    }

    pub fn percentage_mode(&self) -> PercentageMode {
        self.percentage_mode
    }

    pub fn configuration_id(&self) -> ConfigurationId {
        self.configuration_id
    }

    pub fn freight_definition_id(&self) -> FreightDefinitionId {
        self.freight_definition_id
    }

    pub fn items(&self) -> &[InvoiceItem] {
        &self.items
    }

    pub fn totals(&self) -> &InvoiceTotals {
        &self.totals
    }
}

impl Entity for Invoice {
    type Id = InvoiceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::{InvoiceAggregator, InvoiceTerms};
    use crate::catalog::CatalogUnit;
    use crate::configuration::{FreeCarrierCosts, FreeOnBoardCosts, PricingConfiguration};
    use crate::freight::ResolvedFreight;
    use crate::number::NumberFormat;
    use crate::pricing::PricingEngine;
    use chrono::{TimeZone, Utc};
    use proforma_core::Percentage;
    use rust_decimal_macros::dec;

    fn test_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 14).unwrap()
    }

    fn finalized() -> FinalizedInvoice {
        let supplier = SupplierId::new(4);
        let unit = CatalogUnit::new(
            CatalogUnitId::new(1),
            supplier,
            "Dining chair",
            dec!(310.40),
            Dimensions::centimeters(dec!(50), dec!(55), dec!(90)).unwrap(),
        )
        .unwrap();
        let items = vec![
            PricingEngine::new(supplier)
                .price_item(&unit, dec!(8), DeliveryTerm::FreeCarrier)
                .unwrap(),
        ];
        let config = PricingConfiguration {
            id: ConfigurationId::new(2),
            effective_at: Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap(),
            supplier_id: Some(supplier),
            currency_reduction: dec!(0.2),
            tax: Percentage::new(dec!(3)).unwrap(),
            commission: Percentage::ZERO,
            margin: Percentage::new(dec!(15)).unwrap(),
            free_carrier: FreeCarrierCosts {
                border_road_freight: dec!(450),
                carrier_handover_expenses: dec!(80),
            },
            free_on_board: FreeOnBoardCosts::default(),
        };
        let freight = ResolvedFreight {
            definition_id: FreightDefinitionId::new(3),
            supplier_id: supplier,
            components: Vec::new(),
            total: dec!(720),
        };
        let terms = InvoiceTerms {
            supplier_id: supplier,
            delivery_term: DeliveryTerm::FreeCarrier,
            reference_rate: ReferenceRate::new(dec!(5.31)).unwrap(),
            risk_rate: RiskRate::new(dec!(5.11)).unwrap(),
        };
        InvoiceAggregator::default()
            .finalize(&terms, items, &config, &freight)
            .unwrap()
    }

    fn draft() -> InvoiceDraft {
        InvoiceDraft {
            id: InvoiceId::new(),
            client_id: ClientId::new(),
            issued_on: test_date(),
            configuration_id: ConfigurationId::new(2),
            freight_definition_id: FreightDefinitionId::new(3),
            finalized: finalized(),
        }
    }

    #[test]
    fn into_invoice_attaches_number_and_opens() {
        let format = NumberFormat::default();
        let key = format.key("sw", 2026).unwrap();
        let draft = draft();
        let items = draft.finalized.items.clone();

        let invoice = draft.into_invoice(format.number(&key, 12).unwrap()).unwrap();
        assert_eq!(invoice.number().to_string(), "SW00012-2026");
        assert_eq!(invoice.status(), InvoiceStatus::Open);
        assert_eq!(invoice.items(), items.as_slice());
        assert_eq!(invoice.totals().total_base, items[0].total_base);
    }

    #[test]
    fn number_from_another_year_is_refused() {
        let format = NumberFormat::default();
        let key = format.key("SW", 2025).unwrap();
        let err = draft().into_invoice(format.number(&key, 1).unwrap()).unwrap_err();
        assert!(matches!(err, DomainError::ConsistencyViolation(_)));
    }

    #[test]
    fn tampered_totals_fail_verification() {
        let mut invoice = finalized();
        assert!(invoice.verify().is_ok());

        invoice.totals.total_base += dec!(0.01);
        assert!(matches!(
            invoice.verify(),
            Err(DomainError::ConsistencyViolation(_))
        ));
    }

    #[test]
    fn overflowing_totals_are_a_consistency_violation() {
        let mut items = finalized().items;
        items[0].total_base = Decimal::MAX;
        items.push(items[0].clone());

        let err = InvoiceTotals::sum_of(&items).unwrap_err();
        assert!(matches!(err, DomainError::ConsistencyViolation(msg) if msg.contains("base")));
    }

    #[test]
    fn deserialized_drafts_are_verified_before_numbering() {
        let format = NumberFormat::default();
        let key = format.key("SW", 2026).unwrap();

        let mut json = serde_json::to_value(draft()).unwrap();
        let restored: InvoiceDraft = serde_json::from_value(json.clone()).unwrap();
        assert!(restored.into_invoice(format.number(&key, 1).unwrap()).is_ok());

        json["finalized"]["totals"]["total_base"] = serde_json::json!("1.00");
        let tampered: InvoiceDraft = serde_json::from_value(json).unwrap();
        let err = tampered.into_invoice(format.number(&key, 2).unwrap()).unwrap_err();
        assert!(matches!(err, DomainError::ConsistencyViolation(_)));
    }

    #[test]
    fn status_has_a_stable_wire_name() {
        assert_eq!(InvoiceStatus::Open.as_str(), "OPEN");
        assert_eq!(InvoiceStatus::parse("OPEN").unwrap(), InvoiceStatus::Open);
        assert_eq!(serde_json::to_string(&InvoiceStatus::Open).unwrap(), "\"OPEN\"");
        assert!(InvoiceStatus::parse("CANCELLED").is_err());
    }
}
