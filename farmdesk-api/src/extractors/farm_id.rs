//! Path extractor for farm identifiers.
//!
//! Farm ids are warehouse-assigned integers. Anything in the `:id` segment
//! that does not parse as one is rejected with the fixed `Invalid id` error
//! before a handler runs.

use axum::{
    async_trait,
    extract::{FromRequestParts, Path},
    http::request::Parts,
};

use crate::error::ApiError;

/// Integer farm identifier taken from the `:id` path segment.
///
/// # Example
///
/// ```rust,ignore
/// async fn delete_farm(FarmId(id): FarmId) -> ApiResult<impl IntoResponse> {
///     // id is i64
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FarmId(pub i64);

impl FarmId {
    /// Parse a raw path segment.
    pub fn parse(raw: &str) -> Result<Self, ApiError> {
        raw.trim()
            .parse::<i64>()
            .map(FarmId)
            .map_err(|_| ApiError::invalid_id())
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for FarmId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw): Path<String> = Path::from_request_parts(parts, state)
            .await
            .map_err(|e| {
                tracing::debug!(path = %parts.uri.path(), error = %e, "Failed to extract id segment");
                ApiError::invalid_id()
            })?;
        FarmId::parse(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use proptest::prelude::*;

    #[test]
    fn test_parse_accepts_integers() {
        assert_eq!(FarmId::parse("42").ok(), Some(FarmId(42)));
        assert_eq!(FarmId::parse("-3").ok(), Some(FarmId(-3)));
    }

    #[test]
    fn test_parse_rejects_non_integers() {
        for raw in ["abc", "1.5", "", "12abc", "99999999999999999999"] {
            let err = FarmId::parse(raw).err();
            assert_eq!(err.map(|e| e.code), Some(ErrorCode::InvalidId), "input {raw:?}");
        }
    }

    proptest! {
        #[test]
        fn prop_any_integer_id_parses(id in any::<i64>()) {
            prop_assert_eq!(FarmId::parse(&id.to_string()).ok(), Some(FarmId(id)));
            prop_assert_eq!(FarmId::parse(&format!(" {} ", id)).ok(), Some(FarmId(id)));
        }
    }
}
