//! Document number generation.

use serde::{Deserialize, Serialize};

use cadence_core::{DomainError, DomainResult, ValueObject};

/// Document types that draw from a per-tenant numbering sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Invoice,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Invoice => "invoice",
        }
    }
}

/// Per-tenant, per-document-kind numbering scheme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberingConfig {
    pub prefix: String,
    pub suffix: String,
    pub zero_pad_width: u8,
    pub pad_with_zeros: bool,
    pub starting_number: u64,
}

impl ValueObject for NumberingConfig {}

impl Default for NumberingConfig {
    fn default() -> Self {
        Self {
            prefix: "INV-".to_string(),
            suffix: String::new(),
            zero_pad_width: 4,
            pad_with_zeros: true,
            starting_number: 1,
        }
    }
}

impl NumberingConfig {
    pub const MAX_PAD_WIDTH: u8 = 12;

    pub fn validate(&self) -> DomainResult<()> {
        if self.starting_number < 1 {
            return Err(DomainError::validation("starting number must be at least 1"));
        }
        if !(1..=Self::MAX_PAD_WIDTH).contains(&self.zero_pad_width) {
            return Err(DomainError::validation(format!(
                "zero pad width must be in 1..={}, got {}",
                Self::MAX_PAD_WIDTH,
                self.zero_pad_width
            )));
        }
        Ok(())
    }
}

/// `prefix + number + suffix`, where `number = starting_number + sequence_index`,
/// zero-padded to `zero_pad_width` when `pad_with_zeros` is set.
///
/// `sequence_index` is the zero-based position in the tenant's sequence. Padding
/// never truncates: numbers wider than the pad width are printed in full.
pub fn format_number(config: &NumberingConfig, sequence_index: u64) -> String {
    let number = config.starting_number.saturating_add(sequence_index);
    if config.pad_with_zeros {
        let width = usize::from(config.zero_pad_width);
        format!("{}{:0width$}{}", config.prefix, number, config.suffix)
    } else {
        format!("{}{}{}", config.prefix, number, config.suffix)
    }
}
