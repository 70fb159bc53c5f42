//! Invoice numbers: `{prefix}{zero-padded sequence}-{year}`, e.g. `SW00001-2026`.
//!
//! The padded width and the prefix length are configuration, bounded to small
//! fixed widths. A sequence that no longer fits the width is an error, never a
//! wraparound.

use core::fmt;

use serde::{Deserialize, Serialize};

use proforma_core::{DomainError, DomainResult, ValueObject};

/// Widest padding supported (fits `u32` sequences).
pub const MAX_NUMBER_WIDTH: u8 = 9;
pub const DEFAULT_NUMBER_WIDTH: u8 = 5;
pub const DEFAULT_MAX_PREFIX_LEN: usize = 7;

/// A normalized invoice prefix: upper-case ASCII alphanumerics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Prefix(String);

impl Prefix {
    /// Trim, upper-case and check a raw prefix.
    pub fn parse(raw: &str, max_len: usize) -> DomainResult<Self> {
        let normalized = raw.trim().to_ascii_uppercase();
        if normalized.is_empty() {
            return Err(DomainError::validation("invoice prefix must not be empty"));
        }
        if normalized.len() > max_len {
            return Err(DomainError::validation(format!(
                "invoice prefix '{normalized}' exceeds {max_len} characters"
            )));
        }
        if !normalized.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(DomainError::validation(format!(
                "invoice prefix '{normalized}' must be alphanumeric"
            )));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl ValueObject for Prefix {}

/// Key of one sequence counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SequenceKey {
    pub prefix: Prefix,
    pub year: i32,
}

impl SequenceKey {
    pub fn new(prefix: Prefix, year: i32) -> DomainResult<Self> {
        if !(1..=9999).contains(&year) {
            return Err(DomainError::validation(format!(
                "invoice year {year} is out of range"
            )));
        }
        Ok(Self { prefix, year })
    }
}

impl fmt::Display for SequenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.prefix, self.year)
    }
}

/// Padding width and prefix bound for invoice numbers.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberFormat {
    width: u8,
    max_prefix_len: usize,
}

impl Default for NumberFormat {
    fn default() -> Self {
        Self {
            width: DEFAULT_NUMBER_WIDTH,
            max_prefix_len: DEFAULT_MAX_PREFIX_LEN,
        }
    }
}

impl NumberFormat {
    pub fn new(width: u8, max_prefix_len: usize) -> DomainResult<Self> {
        if !(1..=MAX_NUMBER_WIDTH).contains(&width) {
            return Err(DomainError::validation(format!(
                "number width must be between 1 and {MAX_NUMBER_WIDTH} (got {width})"
            )));
        }
        if max_prefix_len == 0 {
            return Err(DomainError::validation("maximum prefix length must be positive"));
        }
        Ok(Self {
            width,
            max_prefix_len,
        })
    }

    pub fn width(&self) -> u8 {
        self.width
    }

    pub fn max_prefix_len(&self) -> usize {
        self.max_prefix_len
    }

    /// Largest sequence the width can display.
    pub fn capacity(&self) -> u64 {
        10u64.pow(u32::from(self.width)) - 1
    }

    pub fn normalize_prefix(&self, raw: &str) -> DomainResult<Prefix> {
        Prefix::parse(raw, self.max_prefix_len)
    }

    /// Build the counter key for a raw prefix and a year.
    pub fn key(&self, raw_prefix: &str, year: i32) -> DomainResult<SequenceKey> {
        SequenceKey::new(self.normalize_prefix(raw_prefix)?, year)
    }

    /// Format `sequence` under `key`, failing when it does not fit the width.
    pub fn number(&self, key: &SequenceKey, sequence: u64) -> DomainResult<InvoiceNumber> {
        if sequence == 0 {
            return Err(DomainError::validation("invoice sequence starts at 1"));
        }
        if sequence > self.capacity() {
            return Err(DomainError::SequenceExhausted {
                key: key.to_string(),
                value: sequence,
                width: self.width,
            });
        }
        let sequence = u32::try_from(sequence).map_err(|_| DomainError::SequenceExhausted {
            key: key.to_string(),
            value: sequence,
            width: self.width,
        })?;
        Ok(InvoiceNumber {
            prefix: key.prefix.clone(),
            year: key.year,
            sequence,
            width: self.width,
        })
    }

    /// Parse a displayed number back into its parts.
    ///
    /// The width disambiguates where the prefix ends, since prefixes may end in
    /// digits themselves.
    pub fn parse(&self, s: &str) -> DomainResult<InvoiceNumber> {
        let invalid = || DomainError::validation(format!("malformed invoice number '{s}'"));
        let s = s.trim();
        let (head, year) = s.rsplit_once('-').ok_or_else(invalid)?;
        if year.is_empty() || !year.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let year: i32 = year.parse().map_err(|_| invalid())?;

        let width = usize::from(self.width);
        if head.len() <= width || !head.is_ascii() {
            return Err(invalid());
        }
        let (prefix, digits) = head.split_at(head.len() - width);
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let sequence: u64 = digits.parse().map_err(|_| invalid())?;

        let key = self.key(prefix, year)?;
        self.number(&key, sequence)
    }
}

/// A formatted invoice number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvoiceNumber {
    prefix: Prefix,
    year: i32,
    sequence: u32,
    width: u8,
}

impl InvoiceNumber {
    pub fn prefix(&self) -> &Prefix {
        &self.prefix
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Zero-padded digit count of the sequence part.
    pub fn width(&self) -> u8 {
        self.width
    }

    pub fn key(&self) -> SequenceKey {
        SequenceKey {
            prefix: self.prefix.clone(),
            year: self.year,
        }
    }
}

impl fmt::Display for InvoiceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{:0width$}-{}",
            self.prefix,
            self.sequence,
            self.year,
            width = usize::from(self.width)
        )
    }
}

impl ValueObject for InvoiceNumber {}
