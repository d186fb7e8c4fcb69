use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::database::query_builder::ListColumns;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Student {
    pub id: Uuid,
    pub tenant_id: Uuid,
    /// Membership of the student's own account in this tenant.
    pub tenant_user_id: Uuid,
    pub class_id: Option<Uuid>,
    pub student_number: String,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct NewStudent {
    pub tenant_user_id: Uuid,
    pub class_id: Option<Uuid>,
    #[validate(length(min = 1, max = 50))]
    pub student_number: String,
    #[validate(length(min = 1, max = 100))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100))]
    pub last_name: String,
    pub date_of_birth: Option<NaiveDate>,
}

/// Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct StudentChanges {
    /// `Some(Some(id))` moves the student, `Some(None)` (an explicit `null`)
    /// unassigns it, `None` leaves it alone.
    #[serde(default, deserialize_with = "explicit_null", skip_serializing_if = "Option::is_none")]
    pub class_id: Option<Option<Uuid>>,
    #[validate(length(min = 1, max = 50))]
    pub student_number: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub first_name: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub last_name: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
}

/// Keeps a present `null` apart from a missing field.
fn explicit_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Entity-specific list filter.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StudentFilter {
    pub class_id: Option<Uuid>,
}

pub const STUDENT_COLUMNS: ListColumns = ListColumns {
    search: &["s.student_number", "s.first_name", "s.last_name"],
    sort: &[
        ("student_number", "s.student_number"),
        ("first_name", "s.first_name"),
        ("last_name", "s.last_name"),
        ("created_at", "s.created_at"),
    ],
    default_sort: "s.created_at",
    id_column: "s.id",
};
