use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::database::query_builder::ListColumns;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Class {
    pub id: Uuid,
    pub tenant_id: Uuid,
    /// Business key, unique within the tenant.
    pub code: String,
    pub name: String,
    pub grade_level: Option<i32>,
    pub academic_year: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct NewClass {
    #[validate(length(min = 1, max = 30))]
    pub code: String,
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(range(min = 0, max = 13))]
    pub grade_level: Option<i32>,
    #[validate(length(min = 4, max = 20))]
    pub academic_year: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ClassChanges {
    #[validate(length(min = 1, max = 30))]
    pub code: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    #[validate(range(min = 0, max = 13))]
    pub grade_level: Option<i32>,
    #[validate(length(min = 4, max = 20))]
    pub academic_year: Option<String>,
}

pub const CLASS_COLUMNS: ListColumns = ListColumns {
    search: &["c.code", "c.name"],
    sort: &[
        ("code", "c.code"),
        ("name", "c.name"),
        ("grade_level", "c.grade_level"),
        ("created_at", "c.created_at"),
    ],
    default_sort: "c.code",
    id_column: "c.id",
};
