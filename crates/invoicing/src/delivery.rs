//! Delivery terms (Incoterms subset) an invoice can be quoted under.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use proforma_core::DomainError;

/// Delivery-term mode of an invoice.
///
/// The term decides which fixed cost components of the pricing configuration
/// are added at invoice level; it never changes an item's base value.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeliveryTerm {
    /// Goods are made available at the factory; no fixed components.
    #[serde(rename = "EXW")]
    ExWorks,
    /// Handed to the carrier at the border; the two free-carrier components apply.
    #[serde(rename = "FCA")]
    FreeCarrier,
    /// Loaded on board at the port; the four free-on-board components apply.
    #[serde(rename = "FOB")]
    FreeOnBoard,
}

impl DeliveryTerm {
    pub const ALL: [DeliveryTerm; 3] = [
        DeliveryTerm::ExWorks,
        DeliveryTerm::FreeCarrier,
        DeliveryTerm::FreeOnBoard,
    ];

    /// Three-letter Incoterms code.
    pub fn code(self) -> &'static str {
        match self {
            DeliveryTerm::ExWorks => "EXW",
            DeliveryTerm::FreeCarrier => "FCA",
            DeliveryTerm::FreeOnBoard => "FOB",
        }
    }
}

impl fmt::Display for DeliveryTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for DeliveryTerm {
    type Err = DomainError;

    /// Accepts the Incoterms code or the spelled-out term, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['_', ' '], "-");
        match normalized.as_str() {
            "exw" | "ex-works" => Ok(DeliveryTerm::ExWorks),
            "fca" | "free-carrier" => Ok(DeliveryTerm::FreeCarrier),
            "fob" | "free-on-board" => Ok(DeliveryTerm::FreeOnBoard),
            _ => Err(DomainError::validation(format!(
                "unknown delivery term '{}'",
                s.trim()
            ))),
        }
    }
}
