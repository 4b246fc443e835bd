//! Farm record model.
//!
//! A farm row has twelve columns in a fixed order. Each column has a
//! canonical (Korean) key used by the warehouse table and the API, and an
//! English fallback key accepted on input and in raw results.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::coerce;
use crate::error::{CoreError, CoreResult};

// ============================================================================
// FIELD CATALOG
// ============================================================================

/// One column of the farm table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FarmField {
    Id,
    Name,
    Region,
    Badge,
    OwnerId,
    Owner,
    FeedCompany,
    ManagerId,
    Manager,
    ContractStatus,
    ContractStart,
    ContractEnd,
}

/// Value type carried by a farm column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Integer,
    Text,
    Date,
}

impl FarmField {
    /// All columns in positional order.
    pub const ALL: [FarmField; 12] = [
        FarmField::Id,
        FarmField::Name,
        FarmField::Region,
        FarmField::Badge,
        FarmField::OwnerId,
        FarmField::Owner,
        FarmField::FeedCompany,
        FarmField::ManagerId,
        FarmField::Manager,
        FarmField::ContractStatus,
        FarmField::ContractStart,
        FarmField::ContractEnd,
    ];

    /// Columns a client may write. The identifier is assigned by the warehouse.
    pub const EDITABLE: [FarmField; 11] = [
        FarmField::Name,
        FarmField::Region,
        FarmField::Badge,
        FarmField::OwnerId,
        FarmField::Owner,
        FarmField::FeedCompany,
        FarmField::ManagerId,
        FarmField::Manager,
        FarmField::ContractStatus,
        FarmField::ContractStart,
        FarmField::ContractEnd,
    ];

    /// Column name in the warehouse table and key in API payloads.
    pub const fn canonical_key(self) -> &'static str {
        match self {
            FarmField::Id => "농장ID",
            FarmField::Name => "농장명",
            FarmField::Region => "지역",
            FarmField::Badge => "뱃지",
            FarmField::OwnerId => "농장주ID",
            FarmField::Owner => "농장주",
            FarmField::FeedCompany => "사료회사",
            FarmField::ManagerId => "관리자ID",
            FarmField::Manager => "관리자",
            FarmField::ContractStatus => "계약상태",
            FarmField::ContractStart => "계약시작일",
            FarmField::ContractEnd => "계약종료일",
        }
    }

    /// English key consulted when the canonical key is absent.
    pub const fn fallback_key(self) -> &'static str {
        match self {
            FarmField::Id => "id",
            FarmField::Name => "name",
            FarmField::Region => "region",
            FarmField::Badge => "badge",
            FarmField::OwnerId => "ownerId",
            FarmField::Owner => "owner",
            FarmField::FeedCompany => "feedCompany",
            FarmField::ManagerId => "managerId",
            FarmField::Manager => "manager",
            FarmField::ContractStatus => "contractStatus",
            FarmField::ContractStart => "contractStart",
            FarmField::ContractEnd => "contractEnd",
        }
    }

    /// Named parameter marker used in statements (`:name`).
    pub const fn param_name(self) -> &'static str {
        match self {
            FarmField::Id => "id",
            FarmField::Name => "name",
            FarmField::Region => "region",
            FarmField::Badge => "badge",
            FarmField::OwnerId => "owner_id",
            FarmField::Owner => "owner",
            FarmField::FeedCompany => "feed_company",
            FarmField::ManagerId => "manager_id",
            FarmField::Manager => "manager",
            FarmField::ContractStatus => "contract_status",
            FarmField::ContractStart => "contract_start",
            FarmField::ContractEnd => "contract_end",
        }
    }

    pub const fn kind(self) -> FieldKind {
        match self {
            FarmField::Id | FarmField::OwnerId | FarmField::ManagerId => FieldKind::Integer,
            FarmField::ContractStart | FarmField::ContractEnd => FieldKind::Date,
            _ => FieldKind::Text,
        }
    }

    /// Index of this column in the positional (tuple) encoding.
    pub const fn position(self) -> usize {
        self as usize
    }
}

/// Resolve a field in a key/value row: canonical key, then fallback key.
///
/// A key holding JSON `null` counts as absent.
pub(crate) fn lookup_keyed(
    row: &serde_json::Map<String, Value>,
    field: FarmField,
) -> Option<&Value> {
    row.get(field.canonical_key())
        .filter(|v| !v.is_null())
        .or_else(|| row.get(field.fallback_key()).filter(|v| !v.is_null()))
}

// ============================================================================
// FARM RECORD
// ============================================================================

/// Canonical farm record as served by `GET /api/farms`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FarmRecord {
    #[serde(rename = "농장ID", alias = "id", default)]
    pub id: Option<i64>,
    #[serde(rename = "농장명", alias = "name", default)]
    pub name: Option<String>,
    #[serde(rename = "지역", alias = "region", default)]
    pub region: Option<String>,
    #[serde(rename = "뱃지", alias = "badge", default)]
    pub badge: Option<String>,
    #[serde(rename = "농장주ID", alias = "ownerId", default)]
    pub owner_id: Option<i64>,
    #[serde(rename = "농장주", alias = "owner", default)]
    pub owner: Option<String>,
    #[serde(rename = "사료회사", alias = "feedCompany", default)]
    pub feed_company: Option<String>,
    #[serde(rename = "관리자ID", alias = "managerId", default)]
    pub manager_id: Option<i64>,
    #[serde(rename = "관리자", alias = "manager", default)]
    pub manager: Option<String>,
    #[serde(rename = "계약상태", alias = "contractStatus", default)]
    pub contract_status: Option<String>,
    #[serde(rename = "계약시작일", alias = "contractStart", default)]
    pub contract_start: Option<NaiveDate>,
    #[serde(rename = "계약종료일", alias = "contractEnd", default)]
    pub contract_end: Option<NaiveDate>,
}

impl FarmRecord {
    /// Build a record by resolving each column through `lookup`.
    pub fn from_lookup<'a, F>(lookup: F) -> Self
    where
        F: Fn(FarmField) -> Option<&'a Value>,
    {
        let int = |f| lookup(f).and_then(coerce::integer);
        let text = |f| lookup(f).and_then(coerce::text);
        let date = |f| lookup(f).and_then(coerce::date);

        Self {
            id: int(FarmField::Id),
            name: text(FarmField::Name),
            region: text(FarmField::Region),
            badge: text(FarmField::Badge),
            owner_id: int(FarmField::OwnerId),
            owner: text(FarmField::Owner),
            feed_company: text(FarmField::FeedCompany),
            manager_id: int(FarmField::ManagerId),
            manager: text(FarmField::Manager),
            contract_status: text(FarmField::ContractStatus),
            contract_start: date(FarmField::ContractStart),
            contract_end: date(FarmField::ContractEnd),
        }
    }

    /// The editable part of this record.
    pub fn input(&self) -> FarmInput {
        FarmInput {
            name: self.name.clone(),
            region: self.region.clone(),
            badge: self.badge.clone(),
            owner_id: self.owner_id,
            owner: self.owner.clone(),
            feed_company: self.feed_company.clone(),
            manager_id: self.manager_id,
            manager: self.manager.clone(),
            contract_status: self.contract_status.clone(),
            contract_start: self.contract_start,
            contract_end: self.contract_end,
        }
    }
}

// ============================================================================
// FARM INPUT
// ============================================================================

/// Editable fields of a create or update request.
///
/// Built leniently from a JSON body: ids that are not numeric and dates that
/// do not parse become `None`, which is written to the warehouse as NULL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FarmInput {
    #[serde(rename = "농장명")]
    pub name: Option<String>,
    #[serde(rename = "지역")]
    pub region: Option<String>,
    #[serde(rename = "뱃지")]
    pub badge: Option<String>,
    #[serde(rename = "농장주ID")]
    pub owner_id: Option<i64>,
    #[serde(rename = "농장주")]
    pub owner: Option<String>,
    #[serde(rename = "사료회사")]
    pub feed_company: Option<String>,
    #[serde(rename = "관리자ID")]
    pub manager_id: Option<i64>,
    #[serde(rename = "관리자")]
    pub manager: Option<String>,
    #[serde(rename = "계약상태")]
    pub contract_status: Option<String>,
    #[serde(rename = "계약시작일")]
    pub contract_start: Option<NaiveDate>,
    #[serde(rename = "계약종료일")]
    pub contract_end: Option<NaiveDate>,
}

impl FarmInput {
    /// Read the editable fields from a JSON object body.
    ///
    /// Any identifier in the body is ignored.
    pub fn from_json(body: &Value) -> CoreResult<Self> {
        let row = body.as_object().ok_or_else(|| CoreError::InvalidBody {
            reason: "expected a JSON object".to_string(),
        })?;
        Ok(FarmRecord::from_lookup(|field| lookup_keyed(row, field)).input())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_positions_follow_catalog_order() {
        for (index, field) in FarmField::ALL.iter().enumerate() {
            assert_eq!(field.position(), index);
        }
        assert_eq!(FarmField::EDITABLE.len(), FarmField::ALL.len() - 1);
        assert!(!FarmField::EDITABLE.contains(&FarmField::Id));
    }

    #[test]
    fn test_record_serializes_with_canonical_keys() -> Result<(), serde_json::Error> {
        let record = FarmRecord {
            id: Some(3),
            region: Some("Seoul".to_string()),
            contract_start: NaiveDate::from_ymd_opt(2024, 1, 1),
            ..Default::default()
        };
        let value = serde_json::to_value(&record)?;

        assert_eq!(value["농장ID"], json!(3));
        assert_eq!(value["지역"], json!("Seoul"));
        assert_eq!(value["계약시작일"], json!("2024-01-01"));
        assert_eq!(value["농장명"], Value::Null);
        Ok(())
    }

    #[test]
    fn test_input_from_json_prefers_canonical_keys() -> CoreResult<()> {
        let body = json!({
            "농장명": "Farm A",
            "name": "ignored",
            "region": "Busan",
            "농장주ID": "5",
            "관리자ID": "abc",
            "계약시작일": "2024-01-01",
            "계약종료일": "someday",
            "농장ID": 99
        });
        let input = FarmInput::from_json(&body)?;

        assert_eq!(input.name.as_deref(), Some("Farm A"));
        assert_eq!(input.region.as_deref(), Some("Busan"));
        assert_eq!(input.owner_id, Some(5));
        assert_eq!(input.manager_id, None);
        assert_eq!(input.contract_start, NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(input.contract_end, None);
        Ok(())
    }

    #[test]
    fn test_input_null_canonical_falls_back() -> CoreResult<()> {
        let input = FarmInput::from_json(&json!({"지역": null, "region": "Jeju"}))?;
        assert_eq!(input.region.as_deref(), Some("Jeju"));
        Ok(())
    }

    #[test]
    fn test_input_rejects_non_object() {
        let err = FarmInput::from_json(&json!([1, 2, 3]));
        assert!(matches!(err, Err(CoreError::InvalidBody { .. })));
    }
}
