//! Catalog units as seen by the pricing engine.
//!
//! A catalog unit is a module (furniture piece) in a given fabric. The engine
//! only reads it: its unit fabric price and the dimensions its volume is
//! derived from.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use proforma_core::{CatalogUnitId, DomainError, DomainResult, Entity, SupplierId, ValueObject};

/// Cubic centimeters in one cubic meter.
pub const CM3_PER_M3: i64 = 1_000_000;

/// Unit the catalog dimensions are recorded in.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LengthUnit {
    Centimeters,
    Meters,
}

impl LengthUnit {
    pub fn as_str(self) -> &'static str {
        match self {
            LengthUnit::Centimeters => "centimeters",
            LengthUnit::Meters => "meters",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "centimeters" => Ok(LengthUnit::Centimeters),
            "meters" => Ok(LengthUnit::Meters),
            other => Err(DomainError::validation(format!("unknown length unit '{other}'"))),
        }
    }

    /// Divisor turning `width × depth × height` in this unit into m³.
    fn cubic_divisor(self) -> Decimal {
        match self {
            LengthUnit::Centimeters => Decimal::from(CM3_PER_M3),
            LengthUnit::Meters => Decimal::ONE,
        }
    }
}

/// Outer dimensions of a catalog unit.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: Decimal,
    pub depth: Decimal,
    pub height: Decimal,
    pub unit: LengthUnit,
}

impl ValueObject for Dimensions {}

impl Dimensions {
    pub fn new(width: Decimal, depth: Decimal, height: Decimal, unit: LengthUnit) -> DomainResult<Self> {
        for (name, value) in [("width", width), ("depth", depth), ("height", height)] {
            if value.is_sign_negative() && !value.is_zero() {
                return Err(DomainError::validation(format!(
                    "{name} must not be negative (got {value})"
                )));
            }
        }
        Ok(Self {
            width,
            depth,
            height,
            unit,
        })
    }

    pub fn centimeters(width: Decimal, depth: Decimal, height: Decimal) -> DomainResult<Self> {
        Self::new(width, depth, height, LengthUnit::Centimeters)
    }

    /// Volume in cubic meters.
    ///
    /// This is the only place unit conversion happens; everything downstream
    /// reuses the catalog unit's volume.
    pub fn volume_m3(&self) -> DomainResult<Decimal> {
        self.width
            .checked_mul(self.depth)
            .and_then(|area| area.checked_mul(self.height))
            .and_then(|raw| raw.checked_div(self.unit.cubic_divisor()))
            .ok_or_else(|| DomainError::consistency("volume computation overflowed"))
    }
}

/// A priced catalog unit (module + fabric).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogUnit {
    id: CatalogUnitId,
    supplier_id: SupplierId,
    code: Option<String>,
    description: String,
    unit_fabric_price: Decimal,
    dimensions: Dimensions,
    volume_m3: Decimal,
}

impl CatalogUnit {
    pub fn new(
        id: CatalogUnitId,
        supplier_id: SupplierId,
        description: impl Into<String>,
        unit_fabric_price: Decimal,
        dimensions: Dimensions,
    ) -> DomainResult<Self> {
        if unit_fabric_price.is_sign_negative() && !unit_fabric_price.is_zero() {
            return Err(DomainError::validation(format!(
                "catalog unit {id}: fabric price must not be negative"
            )));
        }
        let volume_m3 = dimensions.volume_m3()?;
        Ok(Self {
            id,
            supplier_id,
            code: None,
            description: description.into(),
            unit_fabric_price,
            dimensions,
            volume_m3,
        })
    }

    /// Attach the catalog's short code (e.g. `"SOF-210"`).
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn supplier_id(&self) -> SupplierId {
        self.supplier_id
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn unit_fabric_price(&self) -> Decimal {
        self.unit_fabric_price
    }

    pub fn dimensions(&self) -> &Dimensions {
        &self.dimensions
    }

    /// Volume of one unit, derived once from the dimensions.
    pub fn volume_m3(&self) -> Decimal {
        self.volume_m3
    }
}

impl Entity for CatalogUnit {
    type Id = CatalogUnitId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
