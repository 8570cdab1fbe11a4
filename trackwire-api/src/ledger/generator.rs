//! Catalog code candidate generation
//!
//! Generates syntactically valid UPC/ISRC candidates. Candidates are not
//! unique by construction; the `codes.code_value` UNIQUE constraint decides,
//! and the ledger regenerates on collision.

use chrono::{Datelike, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use trackwire_common::CodeKind;

/// Candidate code generator with injected randomness
///
/// The RNG is owned, not ambient, so collision and retry paths can be made
/// deterministic in tests by seeding it (and pinning the ISRC year).
pub struct CodeGenerator {
    rng: StdRng,
    country: String,
    registrant: String,
    year_override: Option<u32>,
}

impl CodeGenerator {
    /// Generator with entropy-seeded randomness and the current year
    pub fn new(country: impl Into<String>, registrant: impl Into<String>) -> Self {
        Self::with_rng(country, registrant, StdRng::from_entropy())
    }

    /// Generator with a caller-supplied RNG
    pub fn with_rng(
        country: impl Into<String>,
        registrant: impl Into<String>,
        rng: StdRng,
    ) -> Self {
        Self {
            rng,
            country: country.into(),
            registrant: registrant.into(),
            year_override: None,
        }
    }

    /// Pin the two-digit ISRC year (tests)
    pub fn with_year(mut self, year: u32) -> Self {
        self.year_override = Some(year % 100);
        self
    }

    /// Produce one candidate value of the given kind
    pub fn generate(&mut self, kind: CodeKind) -> String {
        match kind {
            // 12-digit numeric string, leading zeros permitted
            CodeKind::Upc => format!("{:012}", self.rng.gen_range(0..1_000_000_000_000u64)),
            // CC-XXX-YY-NNNNN
            CodeKind::Isrc => {
                let year = self
                    .year_override
                    .unwrap_or_else(|| (Utc::now().year().rem_euclid(100)) as u32);
                let designation = self.rng.gen_range(0..100_000u32);
                format!(
                    "{}-{}-{:02}-{:05}",
                    self.country, self.registrant, year, designation
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::format::validate_format;

    fn seeded(seed: u64) -> CodeGenerator {
        CodeGenerator::with_rng("US", "ABC", StdRng::seed_from_u64(seed)).with_year(24)
    }

    #[test]
    fn upc_is_twelve_digits() {
        let mut generator = seeded(1);
        for _ in 0..100 {
            let value = generator.generate(CodeKind::Upc);
            assert_eq!(value.len(), 12);
            assert!(value.chars().all(|c| c.is_ascii_digit()), "{}", value);
        }
    }

    #[test]
    fn isrc_matches_pinned_year_shape() {
        let mut generator = seeded(2);
        for _ in 0..100 {
            let value = generator.generate(CodeKind::Isrc);
            assert!(value.starts_with("US-ABC-24-"), "{}", value);
            assert_eq!(value.len(), 15);
        }
    }

    #[test]
    fn generated_values_pass_format_validation() {
        let mut generator = seeded(3);
        for _ in 0..100 {
            assert!(validate_format(CodeKind::Upc, &generator.generate(CodeKind::Upc)));
            assert!(validate_format(CodeKind::Isrc, &generator.generate(CodeKind::Isrc)));
        }
    }

    #[test]
    fn same_seed_same_sequence() {
        let mut a = seeded(4);
        let mut b = seeded(4);
        for _ in 0..10 {
            assert_eq!(a.generate(CodeKind::Upc), b.generate(CodeKind::Upc));
        }
    }
}
