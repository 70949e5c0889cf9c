//! Listing filters and pagination metadata

use serde::Serialize;

/// Page/sort parameters for list queries
#[derive(Debug, Clone)]
pub struct Filters {
    pub page: i64,
    pub page_size: i64,
    pub sort: String,
    /// Accepted sort keys; a leading `-` selects descending order
    pub sort_safe_list: &'static [&'static str],
}

impl Filters {
    /// Column to order by. Falls back to `id` when the sort key is not in the
    /// safe list, so the value is always safe to splice into SQL.
    pub fn sort_column(&self) -> &'static str {
        self.sort_safe_list
            .iter()
            .find(|safe| **safe == self.sort)
            .map(|safe| safe.trim_start_matches('-'))
            .unwrap_or("id")
    }

    pub fn sort_direction(&self) -> &'static str {
        if self.sort.starts_with('-') {
            "DESC"
        } else {
            "ASC"
        }
    }

    pub fn is_permitted_sort(&self) -> bool {
        self.sort_safe_list.contains(&self.sort.as_str())
    }

    pub fn limit(&self) -> i64 {
        self.page_size
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).max(0) * self.page_size
    }
}

/// Pagination metadata returned alongside list results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Metadata {
    #[serde(skip_serializing_if = "is_zero")]
    pub current_page: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub page_size: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub first_page: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub last_page: i64,
    #[serde(skip_serializing_if = "is_zero")]
    pub total_records: i64,
}

fn is_zero(value: &i64) -> bool {
    *value == 0
}

impl Metadata {
    pub fn calculate(total_records: i64, page: i64, page_size: i64) -> Self {
        if total_records == 0 || page_size <= 0 {
            return Self::default();
        }

        Self {
            current_page: page,
            page_size,
            first_page: 1,
            last_page: (total_records + page_size - 1) / page_size,
            total_records,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAFE: &[&str] = &["id", "name", "-id", "-name"];

    fn filters(sort: &str) -> Filters {
        Filters {
            page: 3,
            page_size: 20,
            sort: sort.to_string(),
            sort_safe_list: SAFE,
        }
    }

    #[test]
    fn test_sort_column_and_direction() {
        assert_eq!(filters("name").sort_column(), "name");
        assert_eq!(filters("name").sort_direction(), "ASC");
        assert_eq!(filters("-name").sort_column(), "name");
        assert_eq!(filters("-name").sort_direction(), "DESC");
    }

    #[test]
    fn test_unknown_sort_falls_back_to_id() {
        let f = filters("name; DROP TABLE users");
        assert!(!f.is_permitted_sort());
        assert_eq!(f.sort_column(), "id");
    }

    #[test]
    fn test_offset() {
        assert_eq!(filters("id").offset(), 40);
        assert_eq!(filters("id").limit(), 20);
    }

    #[test]
    fn test_metadata() {
        let meta = Metadata::calculate(45, 2, 20);
        assert_eq!(meta.first_page, 1);
        assert_eq!(meta.last_page, 3);
        assert_eq!(meta.current_page, 2);
        assert_eq!(meta.total_records, 45);

        assert_eq!(Metadata::calculate(0, 1, 20), Metadata::default());
    }
}
