//! Invoice service façade.
//!
//! Fetches reference data, runs the pure engine (pricing, freight, aggregation)
//! and hands the finalized draft to the [`SequenceAllocator`], which numbers and
//! persists it in one unit of work. Nothing is numbered until every
//! computation and check has passed.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use proforma_core::{
    CatalogUnitId, ClientId, ConfigurationId, FreightDefinitionId, InvoiceId, ReferenceRate,
    RiskRate, SupplierId,
};
use proforma_invoicing::{
    DeliveryTerm, Invoice, InvoiceAggregator, InvoiceDraft, InvoiceNumber, InvoiceTerms,
    PricingConfiguration, PricingEngine,
};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::reference::ReferenceData;
use crate::sequence::SequenceAllocator;
use crate::store::InvoiceStore;

/// One requested invoice line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRequest {
    pub catalog_unit_id: CatalogUnitId,
    pub quantity: Decimal,
}

/// Input of [`InvoiceService::compute_invoice`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeInvoice {
    pub client_id: ClientId,
    pub supplier_id: SupplierId,
    pub delivery_term: DeliveryTerm,
    pub items: Vec<ItemRequest>,
    pub freight_definition_id: FreightDefinitionId,
    /// `None` picks the configuration in force for the supplier.
    pub configuration_id: Option<ConfigurationId>,
    pub reference_rate: ReferenceRate,
    /// `None` derives it from the reference rate and the configuration.
    pub risk_rate: Option<RiskRate>,
    /// Issue date; its calendar year selects the sequence.
    pub issued_on: NaiveDate,
    /// `None` uses the configured default prefix.
    pub prefix: Option<String>,
}

pub struct InvoiceService<S, R> {
    allocator: SequenceAllocator<S>,
    reference: R,
    aggregator: InvoiceAggregator,
    default_prefix: String,
}

impl<S: InvoiceStore, R: ReferenceData> InvoiceService<S, R> {
    pub fn new(store: S, reference: R, config: &EngineConfig) -> Result<Self, EngineError> {
        let default_prefix = config
            .number_format
            .normalize_prefix(&config.default_prefix)?
            .as_str()
            .to_string();

        Ok(Self {
            allocator: SequenceAllocator::new(store, config.number_format, config.retry.clone()),
            reference,
            aggregator: InvoiceAggregator::new(config.percentage_mode),
            default_prefix,
        })
    }

    pub fn allocator(&self) -> &SequenceAllocator<S> {
        &self.allocator
    }

    pub fn reference(&self) -> &R {
        &self.reference
    }

    /// Reserve a number without creating an invoice. Unused numbers are gaps.
    pub fn allocate_invoice_number(
        &self,
        prefix: Option<&str>,
        year: i32,
    ) -> Result<InvoiceNumber, EngineError> {
        self.allocator
            .allocate_number(prefix.unwrap_or(&self.default_prefix), year)
    }

    /// Non-binding: a concurrent request may still take the shown number.
    pub fn preview_next_number(
        &self,
        prefix: Option<&str>,
        year: i32,
    ) -> Result<InvoiceNumber, EngineError> {
        self.allocator
            .preview_next(prefix.unwrap_or(&self.default_prefix), year)
    }

    #[instrument(
        skip(self, request),
        fields(
            client_id = %request.client_id,
            supplier_id = %request.supplier_id,
            delivery_term = %request.delivery_term,
            items = request.items.len(),
        ),
        err
    )]
    pub fn compute_invoice(&self, request: ComputeInvoice) -> Result<Invoice, EngineError> {
        if request.items.is_empty() {
            return Err(EngineError::Validation("invoice has no items".into()));
        }

        let supplier = request.supplier_id;
        let config = self.configuration_for(supplier, request.configuration_id)?;
        let freight = self
            .reference
            .freight_definition(request.freight_definition_id)?
            .ok_or_else(|| {
                EngineError::Validation(format!(
                    "freight definition {} not found",
                    request.freight_definition_id
                ))
            })?
            .resolve(supplier)?;

        let risk_rate = match request.risk_rate {
            Some(rate) => rate,
            None => config.derive_risk_rate(request.reference_rate)?,
        };

        let engine = PricingEngine::new(supplier);
        let mut priced = Vec::with_capacity(request.items.len());
        for line in &request.items {
            let unit = self
                .reference
                .catalog_unit(line.catalog_unit_id)?
                .ok_or_else(|| {
                    EngineError::Validation(format!(
                        "catalog unit {} not found",
                        line.catalog_unit_id
                    ))
                })?;
            priced.push(engine.price_item(&unit, line.quantity, request.delivery_term)?);
        }

        let terms = InvoiceTerms {
            supplier_id: supplier,
            delivery_term: request.delivery_term,
            reference_rate: request.reference_rate,
            risk_rate,
        };
        let finalized = self.aggregator.finalize(&terms, priced, &config, &freight)?;

        let draft = InvoiceDraft {
            id: InvoiceId::new(),
            client_id: request.client_id,
            issued_on: request.issued_on,
            configuration_id: config.id,
            freight_definition_id: request.freight_definition_id,
            finalized,
        };

        let prefix = request.prefix.as_deref().unwrap_or(&self.default_prefix);
        let invoice = self.allocator.commit(prefix, draft)?;

        info!(
            invoice_number = %invoice.number(),
            total_base = %invoice.totals().total_base,
            total_settlement = %invoice.totals().total_settlement,
            "proforma invoice created"
        );
        Ok(invoice)
    }

    pub fn load_invoice(&self, id: InvoiceId) -> Result<Option<Invoice>, EngineError> {
        Ok(self.allocator.store().load_invoice(id)?)
    }

    fn configuration_for(
        &self,
        supplier: SupplierId,
        id: Option<ConfigurationId>,
    ) -> Result<PricingConfiguration, EngineError> {
        match id {
            Some(id) => self.reference.configuration(id)?.ok_or_else(|| {
                EngineError::Validation(format!("pricing configuration {id} not found"))
            }),
            None => self.reference.latest_configuration(supplier)?.ok_or_else(|| {
                EngineError::Validation(format!(
                    "no pricing configuration applies to supplier {supplier}"
                ))
            }),
        }
    }
}
