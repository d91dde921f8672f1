//! Shared query parameter types for API handlers.

use serde::Deserialize;

/// Maximum page size for task listings.
pub const MAX_LIMIT: i64 = 100;

/// Default page size for task listings.
pub const DEFAULT_LIMIT: i64 = 50;

/// Generic pagination parameters (`?limit=&offset=`).
#[derive(Debug, Default, Deserialize)]
pub struct PaginationParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PaginationParams {
    /// Clamp into the allowed range.
    pub fn clamp(&self) -> (i64, i64) {
        let limit = self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        let offset = self.offset.unwrap_or(0).max(0);
        (limit, offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_unset() {
        let (limit, offset) = PaginationParams::default().clamp();
        assert_eq!(limit, DEFAULT_LIMIT);
        assert_eq!(offset, 0);
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let params = PaginationParams {
            limit: Some(10_000),
            offset: Some(-3),
        };
        assert_eq!(params.clamp(), (MAX_LIMIT, 0));

        let params = PaginationParams {
            limit: Some(0),
            offset: Some(7),
        };
        assert_eq!(params.clamp(), (1, 7));
    }
}
