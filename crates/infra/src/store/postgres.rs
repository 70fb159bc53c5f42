//! Postgres-backed invoice store.
//!
//! The counter lives in `invoice_sequences` and is advanced with a single
//! upsert (`INSERT … ON CONFLICT … DO UPDATE … RETURNING`), which takes the row
//! lock for the rest of the transaction. `commit_invoice` runs that upsert and
//! the invoice inserts in one transaction.
//!
//! ## Error Mapping
//!
//! | PostgreSQL Error Code | StoreError | Scenario |
//! |----------------------|------------|----------|
//! | `23505` (unique violation) | `Conflict` / `Duplicate` | counter path / pre-numbered insert |
//! | `40001` (serialization failure) | `Conflict` | concurrent counter update under stricter isolation |
//! | `40P01` (deadlock detected) | `Conflict` | lock ordering clash between two units of work |
//! | any other / connection failures | `Backend` | |
//!
//! ## Runtime
//!
//! The [`InvoiceStore`] trait is synchronous. The store keeps the handle of
//! the runtime it was created on and blocks on it; from inside a runtime this
//! requires the multi-threaded flavor.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{FromRow, Postgres, Row, Transaction};
use tokio::runtime::Handle;
use tracing::{debug, instrument};

use proforma_core::{
    CatalogUnitId, ClientId, ConfigurationId, Entity, FreightDefinitionId, InvoiceId,
    ReferenceRate, RiskRate, SupplierId,
};
use proforma_invoicing::{
    DeliveryTerm, Dimensions, FinalizedInvoice, Invoice, InvoiceDraft, InvoiceItem,
    InvoiceNumber, InvoiceStatus, InvoiceTotals, ItemFreight, LengthUnit, NumberFormat,
    PercentageMode, SequenceKey,
};

use super::{InvoiceStore, StoreError};

const INVOICE_COLUMNS: &str = r#"
    id, prefix, year, sequence, number_width, status, client_id, supplier_id,
    issued_on, delivery_term, reference_rate, risk_rate, percentage_mode,
    configuration_id, freight_definition_id, fabric_base, freight_base,
    freight_settlement, fixed_costs_base, total_base, total_settlement,
    total_risk_settlement
"#;

/// Postgres-backed invoice store.
#[derive(Debug, Clone)]
pub struct PostgresInvoiceStore {
    pool: Arc<PgPool>,
    runtime: Handle,
}

impl PostgresInvoiceStore {
    pub fn new(pool: PgPool, runtime: Handle) -> Self {
        Self {
            pool: Arc::new(pool),
            runtime,
        }
    }

    /// Connect a pool on the current runtime.
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;

        debug!("postgres pool established");
        Ok(Self::new(pool, Handle::current()))
    }

    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&*self.pool)
            .await
            .map_err(|e| StoreError::Backend(format!("migration failed: {e}")))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    #[instrument(skip(self), fields(key = %key), err)]
    pub async fn increment(&self, key: &SequenceKey) -> Result<u64, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        let value = increment_counter(&mut tx, key).await?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(value)
    }

    /// Advance the counter and insert the numbered invoice in one transaction.
    #[instrument(skip(self, format, draft), fields(key = %key, invoice_id = %draft.id), err)]
    pub async fn commit(
        &self,
        key: &SequenceKey,
        format: &NumberFormat,
        draft: InvoiceDraft,
    ) -> Result<Invoice, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let next = increment_counter(&mut tx, key).await?;
        let invoice = match format
            .number(key, next)
            .and_then(|number| draft.into_invoice(number))
        {
            Ok(invoice) => invoice,
            Err(err) => {
                tx.rollback()
                    .await
                    .map_err(|e| map_sqlx_error("rollback", e))?;
                return Err(err.into());
            }
        };

        insert_invoice_rows(&mut tx, &invoice)
            .await
            .map_err(|e| {
                // Someone stored this number without going through the counter.
                if is_unique_violation(&e) {
                    StoreError::Conflict(format!("invoice number {} already stored", invoice.number()))
                } else {
                    map_sqlx_error("insert_invoice", e)
                }
            })?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        debug!(invoice_number = %invoice.number(), "invoice committed");
        Ok(invoice)
    }

    #[instrument(skip(self, invoice), fields(invoice_number = %invoice.number()), err)]
    pub async fn insert(&self, invoice: &Invoice) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        insert_invoice_rows(&mut tx, invoice).await.map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Duplicate(invoice.number().to_string())
            } else {
                map_sqlx_error("insert_invoice", e)
            }
        })?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    pub async fn current(&self, key: &SequenceKey) -> Result<u64, StoreError> {
        let row = sqlx::query(
            "SELECT last_number FROM invoice_sequences WHERE prefix = $1 AND year = $2",
        )
        .bind(key.prefix.as_str())
        .bind(key.year)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("current_sequence", e))?;

        match row {
            Some(row) => {
                let value: i64 = row
                    .try_get("last_number")
                    .map_err(|e| StoreError::Backend(format!("failed to read last_number: {e}")))?;
                to_u64(value, "last_number")
            }
            None => Ok(0),
        }
    }

    #[instrument(skip(self), fields(invoice_id = %id), err)]
    pub async fn load(&self, id: InvoiceId) -> Result<Option<Invoice>, StoreError> {
        let row = sqlx::query(&format!("SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_invoice", e))?;

        match row {
            Some(row) => self.hydrate(&row).await.map(Some),
            None => Ok(None),
        }
    }

    pub async fn load_by_number(&self, number: &InvoiceNumber) -> Result<Option<Invoice>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE prefix = $1 AND year = $2 AND sequence = $3"
        ))
        .bind(number.prefix().as_str())
        .bind(number.year())
        .bind(i64::from(number.sequence()))
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_by_number", e))?;

        match row {
            Some(row) => self.hydrate(&row).await.map(Some),
            None => Ok(None),
        }
    }

    async fn hydrate(&self, row: &PgRow) -> Result<Invoice, StoreError> {
        let header = InvoiceRow::from_row(row)
            .map_err(|e| StoreError::Backend(format!("failed to deserialize invoice row: {e}")))?;

        let item_rows = sqlx::query(
            r#"
            SELECT
                line, catalog_unit_id, code, description, width, depth, height,
                length_unit, unit_volume_m3, volume_m3, quantity, unit_fabric_price,
                delivery_term, base_value, volume_fraction, freight_base,
                freight_settlement, fixed_costs, total_base, total_settlement,
                total_risk_settlement
            FROM invoice_items
            WHERE invoice_id = $1
            ORDER BY line ASC
            "#,
        )
        .bind(header.id)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_invoice_items", e))?;

        let mut items = Vec::with_capacity(item_rows.len());
        for row in &item_rows {
            let item = InvoiceItemRow::from_row(row)
                .map_err(|e| StoreError::Backend(format!("failed to deserialize item row: {e}")))?;
            items.push(item.into_item()?);
        }

        header.into_invoice(items)
    }

    fn block_on<F: Future>(&self, fut: F) -> F::Output {
        if Handle::try_current().is_ok() {
            tokio::task::block_in_place(|| self.runtime.block_on(fut))
        } else {
            self.runtime.block_on(fut)
        }
    }
}

impl InvoiceStore for PostgresInvoiceStore {
    fn next_sequence(&self, key: &SequenceKey) -> Result<u64, StoreError> {
        self.block_on(self.increment(key))
    }

    fn commit_invoice(
        &self,
        key: &SequenceKey,
        format: &NumberFormat,
        draft: InvoiceDraft,
    ) -> Result<Invoice, StoreError> {
        self.block_on(self.commit(key, format, draft))
    }

    fn insert_invoice(&self, invoice: &Invoice) -> Result<(), StoreError> {
        self.block_on(self.insert(invoice))
    }

    fn current_sequence(&self, key: &SequenceKey) -> Result<u64, StoreError> {
        self.block_on(self.current(key))
    }

    fn load_invoice(&self, id: InvoiceId) -> Result<Option<Invoice>, StoreError> {
        self.block_on(self.load(id))
    }

    fn find_by_number(&self, number: &InvoiceNumber) -> Result<Option<Invoice>, StoreError> {
        self.block_on(self.load_by_number(number))
    }
}

async fn increment_counter(
    tx: &mut Transaction<'_, Postgres>,
    key: &SequenceKey,
) -> Result<u64, StoreError> {
    let row = sqlx::query(
        r#"
        INSERT INTO invoice_sequences (prefix, year, last_number)
        VALUES ($1, $2, 1)
        ON CONFLICT (prefix, year)
        DO UPDATE SET
            last_number = invoice_sequences.last_number + 1,
            updated_at = NOW()
        RETURNING last_number
        "#,
    )
    .bind(key.prefix.as_str())
    .bind(key.year)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("increment_sequence", e))?;

    let value: i64 = row
        .try_get("last_number")
        .map_err(|e| StoreError::Backend(format!("failed to read last_number: {e}")))?;
    to_u64(value, "last_number")
}

async fn insert_invoice_rows(
    tx: &mut Transaction<'_, Postgres>,
    invoice: &Invoice,
) -> Result<(), sqlx::Error> {
    let number = invoice.number();
    let totals = invoice.totals();

    sqlx::query(
        r#"
        INSERT INTO invoices (
            id, prefix, year, sequence, number_width, number, status, client_id,
            supplier_id, issued_on, delivery_term, reference_rate, risk_rate,
            percentage_mode, configuration_id, freight_definition_id, fabric_base,
            freight_base, freight_settlement, fixed_costs_base, total_base,
            total_settlement, total_risk_settlement
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                $16, $17, $18, $19, $20, $21, $22, $23)
        "#,
    )
    .bind(invoice.id().as_uuid())
    .bind(number.prefix().as_str())
    .bind(number.year())
    .bind(i64::from(number.sequence()))
    .bind(i16::from(number.width()))
    .bind(number.to_string())
    .bind(invoice.status().as_str())
    .bind(invoice.client_id().as_uuid())
    .bind(invoice.supplier_id().get())
    .bind(invoice.issued_on())
    .bind(invoice.delivery_term().code())
    .bind(invoice.reference_rate().value())
    .bind(invoice.risk_rate().value())
    .bind(invoice.percentage_mode().as_str())
    .bind(invoice.configuration_id().get())
    .bind(invoice.freight_definition_id().get())
    .bind(totals.fabric_base)
    .bind(totals.freight_base)
    .bind(totals.freight_settlement)
    .bind(totals.fixed_costs_base)
    .bind(totals.total_base)
    .bind(totals.total_settlement)
    .bind(totals.total_risk_settlement)
    .execute(&mut **tx)
    .await?;

    for item in invoice.items() {
        sqlx::query(
            r#"
            INSERT INTO invoice_items (
                invoice_id, line, catalog_unit_id, code, description, width, depth,
                height, length_unit, unit_volume_m3, volume_m3, quantity,
                unit_fabric_price, delivery_term, base_value, volume_fraction,
                freight_base, freight_settlement, fixed_costs, total_base,
                total_settlement, total_risk_settlement
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
                    $15, $16, $17, $18, $19, $20, $21, $22)
            "#,
        )
        .bind(invoice.id().as_uuid())
        .bind(item.line as i32)
        .bind(item.catalog_unit_id.get())
        .bind(item.code.as_deref())
        .bind(&item.description)
        .bind(item.dimensions.width)
        .bind(item.dimensions.depth)
        .bind(item.dimensions.height)
        .bind(item.dimensions.unit.as_str())
        .bind(item.unit_volume_m3)
        .bind(item.volume_m3)
        .bind(item.quantity)
        .bind(item.unit_fabric_price)
        .bind(item.delivery_term.code())
        .bind(item.base_value)
        .bind(item.freight.volume_fraction)
        .bind(item.freight.base)
        .bind(item.freight.settlement)
        .bind(item.fixed_costs)
        .bind(item.total_base)
        .bind(item.total_settlement)
        .bind(item.total_risk_settlement)
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

fn to_u64(value: i64, column: &str) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::Backend(format!("negative {column}: {value}")))
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") | Some("40001") | Some("40P01") => StoreError::Conflict(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {operation}"))
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Backend(format!("timed out acquiring a connection in {operation}"))
        }
        _ => StoreError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}

/// Check if an error is a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "23505";
        }
    }
    false
}

// SQLx row types

#[derive(Debug)]
struct InvoiceRow {
    id: uuid::Uuid,
    prefix: String,
    year: i32,
    sequence: i64,
    number_width: i16,
    status: String,
    client_id: uuid::Uuid,
    supplier_id: i64,
    issued_on: NaiveDate,
    delivery_term: String,
    reference_rate: Decimal,
    risk_rate: Decimal,
    percentage_mode: String,
    configuration_id: i64,
    freight_definition_id: i64,
    totals: InvoiceTotals,
}

impl<'r> FromRow<'r, PgRow> for InvoiceRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(InvoiceRow {
            id: row.try_get("id")?,
            prefix: row.try_get("prefix")?,
            year: row.try_get("year")?,
            sequence: row.try_get("sequence")?,
            number_width: row.try_get("number_width")?,
            status: row.try_get("status")?,
            client_id: row.try_get("client_id")?,
            supplier_id: row.try_get("supplier_id")?,
            issued_on: row.try_get("issued_on")?,
            delivery_term: row.try_get("delivery_term")?,
            reference_rate: row.try_get("reference_rate")?,
            risk_rate: row.try_get("risk_rate")?,
            percentage_mode: row.try_get("percentage_mode")?,
            configuration_id: row.try_get("configuration_id")?,
            freight_definition_id: row.try_get("freight_definition_id")?,
            totals: InvoiceTotals {
                fabric_base: row.try_get("fabric_base")?,
                freight_base: row.try_get("freight_base")?,
                freight_settlement: row.try_get("freight_settlement")?,
                fixed_costs_base: row.try_get("fixed_costs_base")?,
                total_base: row.try_get("total_base")?,
                total_settlement: row.try_get("total_settlement")?,
                total_risk_settlement: row.try_get("total_risk_settlement")?,
            },
        })
    }
}

impl InvoiceRow {
    /// Rebuild the invoice through the same path that created it, so stored
    /// rows are re-verified on the way out.
    fn into_invoice(self, items: Vec<InvoiceItem>) -> Result<Invoice, StoreError> {
        InvoiceStatus::parse(&self.status)?;

        let width = u8::try_from(self.number_width)
            .map_err(|_| StoreError::Backend(format!("bad number width {}", self.number_width)))?;
        let format = NumberFormat::new(width, self.prefix.len().max(1))?;
        let key = format.key(&self.prefix, self.year)?;
        let number = format.number(&key, to_u64(self.sequence, "sequence")?)?;

        let finalized = FinalizedInvoice {
            supplier_id: SupplierId::new(self.supplier_id),
            delivery_term: self.delivery_term.parse::<DeliveryTerm>()?,
            reference_rate: ReferenceRate::new(self.reference_rate)?,
            risk_rate: RiskRate::new(self.risk_rate)?,
            percentage_mode: self.percentage_mode.parse::<PercentageMode>()?,
            items,
            totals: self.totals,
        };

        let draft = InvoiceDraft {
            id: InvoiceId::from_uuid(self.id),
            client_id: ClientId::from_uuid(self.client_id),
            issued_on: self.issued_on,
            configuration_id: ConfigurationId::new(self.configuration_id),
            freight_definition_id: FreightDefinitionId::new(self.freight_definition_id),
            finalized,
        };
        Ok(draft.into_invoice(number)?)
    }
}

#[derive(Debug)]
struct InvoiceItemRow {
    line: i32,
    catalog_unit_id: i64,
    code: Option<String>,
    description: String,
    width: Decimal,
    depth: Decimal,
    height: Decimal,
    length_unit: String,
    unit_volume_m3: Decimal,
    volume_m3: Decimal,
    quantity: Decimal,
    unit_fabric_price: Decimal,
    delivery_term: String,
    base_value: Decimal,
    volume_fraction: Decimal,
    freight_base: Decimal,
    freight_settlement: Decimal,
    fixed_costs: Decimal,
    total_base: Decimal,
    total_settlement: Decimal,
    total_risk_settlement: Decimal,
}

impl<'r> FromRow<'r, PgRow> for InvoiceItemRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(InvoiceItemRow {
            line: row.try_get("line")?,
            catalog_unit_id: row.try_get("catalog_unit_id")?,
            code: row.try_get("code")?,
            description: row.try_get("description")?,
            width: row.try_get("width")?,
            depth: row.try_get("depth")?,
            height: row.try_get("height")?,
            length_unit: row.try_get("length_unit")?,
            unit_volume_m3: row.try_get("unit_volume_m3")?,
            volume_m3: row.try_get("volume_m3")?,
            quantity: row.try_get("quantity")?,
            unit_fabric_price: row.try_get("unit_fabric_price")?,
            delivery_term: row.try_get("delivery_term")?,
            base_value: row.try_get("base_value")?,
            volume_fraction: row.try_get("volume_fraction")?,
            freight_base: row.try_get("freight_base")?,
            freight_settlement: row.try_get("freight_settlement")?,
            fixed_costs: row.try_get("fixed_costs")?,
            total_base: row.try_get("total_base")?,
            total_settlement: row.try_get("total_settlement")?,
            total_risk_settlement: row.try_get("total_risk_settlement")?,
        })
    }
}

impl InvoiceItemRow {
    fn into_item(self) -> Result<InvoiceItem, StoreError> {
        Ok(InvoiceItem {
            line: u32::try_from(self.line)
                .map_err(|_| StoreError::Backend(format!("bad line number {}", self.line)))?,
            catalog_unit_id: CatalogUnitId::new(self.catalog_unit_id),
            code: self.code,
            description: self.description,
            dimensions: Dimensions::new(
                self.width,
                self.depth,
                self.height,
                LengthUnit::parse(&self.length_unit)?,
            )?,
            unit_volume_m3: self.unit_volume_m3,
            volume_m3: self.volume_m3,
            quantity: self.quantity,
            unit_fabric_price: self.unit_fabric_price,
            delivery_term: self.delivery_term.parse::<DeliveryTerm>()?,
            base_value: self.base_value,
            freight: ItemFreight {
                volume_fraction: self.volume_fraction,
                base: self.freight_base,
                settlement: self.freight_settlement,
            },
            fixed_costs: self.fixed_costs,
            total_base: self.total_base,
            total_settlement: self.total_settlement,
            total_risk_settlement: self.total_risk_settlement,
        })
    }
}
