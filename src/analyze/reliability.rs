// src/analyze/reliability.rs
//! Source-count proxy for reliability: more cited people and organizations,
//! more likely the piece is sourced. Not calibrated.

pub const BASE_SCORE: usize = 40;
pub const PER_SOURCE: usize = 5;

/// `min(100, 40 + 5 × distinct_sources)`.
pub fn reliability_score(distinct_sources: usize) -> u8 {
    BASE_SCORE
        .saturating_add(PER_SOURCE.saturating_mul(distinct_sources))
        .min(100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_with_sources_and_saturates() {
        assert_eq!(reliability_score(0), 40);
        assert_eq!(reliability_score(3), 55);
        assert_eq!(reliability_score(12), 100);
        assert_eq!(reliability_score(usize::MAX), 100);
    }
}
