use serde::{Deserialize, Serialize};
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use crate::config::PaginationConfig;
use crate::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn to_sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        if raw.eq_ignore_ascii_case("asc") {
            Some(SortDirection::Asc)
        } else if raw.eq_ignore_ascii_case("desc") {
            Some(SortDirection::Desc)
        } else {
            None
        }
    }
}

/// Whitelisted columns for one entity's list endpoint.
///
/// Column expressions are pushed into SQL verbatim, so they must only ever
/// come from these constants.
#[derive(Debug, Clone, Copy)]
pub struct ListColumns {
    /// Text columns matched by `search` (case-insensitive substring).
    pub search: &'static [&'static str],
    /// `(api name, sql expression)` pairs accepted by `sort_by`.
    pub sort: &'static [(&'static str, &'static str)],
    pub default_sort: &'static str,
    /// Tiebreaker keeping pages stable.
    pub id_column: &'static str,
}

impl ListColumns {
    pub fn sort_expression(&self, sort_by: Option<&str>) -> Option<&'static str> {
        match sort_by {
            None => Some(self.default_sort),
            Some(name) => self
                .sort
                .iter()
                .find(|(api, _)| api.eq_ignore_ascii_case(name))
                .map(|(_, sql)| *sql),
        }
    }

    pub fn sort_names(&self) -> Vec<&'static str> {
        self.sort.iter().map(|(api, _)| *api).collect()
    }
}

/// Raw list parameters as they arrive on the query string.
///
/// Kept as strings so parse failures turn into a 400 with a field name
/// instead of a generic query rejection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub search: Option<String>,
    pub sort_by: Option<String>,
    pub sort_dir: Option<String>,
}

impl ListParams {
    /// Apply defaults and bounds. `limit` above the configured maximum is capped.
    pub fn resolve(&self, pagination: &PaginationConfig) -> Result<ListQuery, ApiError> {
        let page = match self.page.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            None => 1,
            Some(raw) => match raw.parse::<u32>() {
                Ok(page) if page >= 1 => page,
                _ => return Err(field_error("page", "must be an integer >= 1")),
            },
        };

        let requested = match self.limit.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            None => pagination.default_limit,
            Some(raw) => match raw.parse::<u32>() {
                Ok(limit) if limit >= 1 => limit,
                _ => return Err(field_error("limit", "must be an integer >= 1")),
            },
        };
        let limit = if requested > pagination.max_limit {
            tracing::warn!(
                "Limit {} exceeds max {}, capping to max",
                requested,
                pagination.max_limit
            );
            pagination.max_limit
        } else {
            requested
        };

        let sort_dir = match self.sort_dir.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            None => SortDirection::Asc,
            Some(raw) => {
                SortDirection::parse(raw).ok_or_else(|| field_error("sort_dir", "must be asc or desc"))?
            }
        };

        Ok(ListQuery {
            page,
            limit,
            search: self
                .search
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            sort_by: self
                .sort_by
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            sort_dir,
        })
    }
}

fn field_error(field: &str, reason: &str) -> ApiError {
    let mut fields = std::collections::HashMap::new();
    fields.insert(field.to_string(), reason.to_string());
    ApiError::validation_failed(format!("invalid {}", field), Some(fields))
}

/// Validated list request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub page: u32,
    pub limit: u32,
    pub search: Option<String>,
    pub sort_by: Option<String>,
    pub sort_dir: SortDirection,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: PaginationConfig::default().default_limit,
            search: None,
            sort_by: None,
            sort_dir: SortDirection::Asc,
        }
    }
}

impl ListQuery {
    pub fn offset(&self) -> i64 {
        (self.page as i64 - 1) * self.limit as i64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMeta {
    pub page: u32,
    pub limit: u32,
    pub total_rows: i64,
    pub total_pages: i64,
}

impl PageMeta {
    pub fn new(page: u32, limit: u32, total_rows: i64) -> Self {
        let limit_rows = limit.max(1) as i64;
        let total_rows = total_rows.max(0);
        Self {
            page,
            limit,
            total_rows,
            total_pages: (total_rows + limit_rows - 1) / limit_rows,
        }
    }
}

/// One page of results plus its meta.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub meta: PageMeta,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, query: &ListQuery, total_rows: i64) -> Self {
        Self {
            items,
            meta: PageMeta::new(query.page, query.limit, total_rows),
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            meta: self.meta,
        }
    }
}

/// Escape LIKE metacharacters so user input only ever matches literally.
pub fn like_pattern(search: &str) -> String {
    let mut escaped = String::with_capacity(search.len() + 2);
    escaped.push('%');
    for c in search.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// `WHERE <tenant_column> = $n [AND (<search>)]`.
pub fn push_tenant_filter<'a>(
    builder: &mut QueryBuilder<'a, Postgres>,
    tenant_column: &str,
    tenant_id: Uuid,
    columns: &ListColumns,
    search: Option<&str>,
) {
    builder.push(" WHERE ");
    builder.push(tenant_column);
    builder.push(" = ");
    builder.push_bind(tenant_id);

    if let Some(search) = search {
        if columns.search.is_empty() {
            return;
        }
        let pattern = like_pattern(search);
        builder.push(" AND (");
        for (i, column) in columns.search.iter().enumerate() {
            if i > 0 {
                builder.push(" OR ");
            }
            builder.push(*column);
            builder.push(" ILIKE ");
            builder.push_bind(pattern.clone());
        }
        builder.push(")");
    }
}

/// `ORDER BY ... LIMIT $n OFFSET $m`. Unknown `sort_by` falls back to the default column;
/// services reject it before reaching here.
pub fn push_order_and_page<'a>(
    builder: &mut QueryBuilder<'a, Postgres>,
    columns: &ListColumns,
    query: &ListQuery,
) {
    let sort = columns
        .sort_expression(query.sort_by.as_deref())
        .unwrap_or(columns.default_sort);

    builder.push(" ORDER BY ");
    builder.push(sort);
    builder.push(" ");
    builder.push(query.sort_dir.to_sql());
    builder.push(", ");
    builder.push(columns.id_column);
    builder.push(" ASC LIMIT ");
    builder.push_bind(query.limit as i64);
    builder.push(" OFFSET ");
    builder.push_bind(query.offset());
}

#[cfg(test)]
mod tests {
    use super::*;

    const COLUMNS: ListColumns = ListColumns {
        search: &["s.first_name", "s.last_name"],
        sort: &[("last_name", "s.last_name"), ("created_at", "s.created_at")],
        default_sort: "s.created_at",
        id_column: "s.id",
    };

    fn params(page: Option<&str>, limit: Option<&str>) -> ListParams {
        ListParams {
            page: page.map(str::to_string),
            limit: limit.map(str::to_string),
            ..ListParams::default()
        }
    }

    #[test]
    fn total_pages_rounds_up() {
        assert_eq!(PageMeta::new(1, 10, 0).total_pages, 0);
        assert_eq!(PageMeta::new(1, 10, 1).total_pages, 1);
        assert_eq!(PageMeta::new(1, 10, 10).total_pages, 1);
        assert_eq!(PageMeta::new(3, 10, 25).total_pages, 3);
        assert_eq!(PageMeta::new(1, 7, 50).total_pages, 8);
    }

    #[test]
    fn defaults_apply() {
        let query = ListParams::default().resolve(&PaginationConfig::default()).unwrap();
        assert_eq!(query.page, 1);
        assert_eq!(query.limit, 10);
        assert_eq!(query.offset(), 0);
        assert_eq!(query.sort_dir, SortDirection::Asc);
    }

    #[test]
    fn limit_is_capped_and_offset_follows_page() {
        let query = params(Some("3"), Some("500"))
            .resolve(&PaginationConfig::default())
            .unwrap();
        assert_eq!(query.limit, 100);
        assert_eq!(query.offset(), 200);
    }

    #[test]
    fn rejects_out_of_range_values() {
        let config = PaginationConfig::default();
        assert!(params(Some("0"), None).resolve(&config).is_err());
        assert!(params(Some("-2"), None).resolve(&config).is_err());
        assert!(params(None, Some("0")).resolve(&config).is_err());
        assert!(params(None, Some("ten")).resolve(&config).is_err());

        let bad_dir = ListParams {
            sort_dir: Some("sideways".into()),
            ..ListParams::default()
        };
        assert!(bad_dir.resolve(&config).is_err());
    }

    #[test]
    fn sort_lookup_is_whitelisted() {
        assert_eq!(COLUMNS.sort_expression(None), Some("s.created_at"));
        assert_eq!(COLUMNS.sort_expression(Some("LAST_NAME")), Some("s.last_name"));
        assert_eq!(COLUMNS.sort_expression(Some("password_hash")), None);
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("ann"), "%ann%");
        assert_eq!(like_pattern("50%_off\\"), "%50\\%\\_off\\\\%");
    }

    #[test]
    fn builds_tenant_scoped_sql() {
        let query = ListQuery {
            page: 2,
            limit: 10,
            search: Some("ann".into()),
            sort_by: Some("last_name".into()),
            sort_dir: SortDirection::Desc,
        };
        let mut builder = QueryBuilder::<Postgres>::new("SELECT s.* FROM students s");
        push_tenant_filter(&mut builder, "s.tenant_id", Uuid::nil(), &COLUMNS, query.search.as_deref());
        push_order_and_page(&mut builder, &COLUMNS, &query);

        assert_eq!(
            builder.sql(),
            "SELECT s.* FROM students s WHERE s.tenant_id = $1 AND (s.first_name ILIKE $2 OR s.last_name ILIKE $3) \
             ORDER BY s.last_name DESC, s.id ASC LIMIT $4 OFFSET $5"
        );
    }
}
