//! Pagination, sort and filter parameters for a collection view.
//!
//! A [`Query`] describes "what page is currently shown". It is owned by one
//! view, mutated by user actions, and handed by reference to a fetcher.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::defaults;
use crate::error::{Error, Result};
use crate::models::EntityKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }

    pub fn flipped(self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `(column, value)` filter entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub column: String,
    pub value: String,
}

/// Ordered filter list with unique columns.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilterSet {
    entries: Vec<Filter>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a filter. Rejects a column that is already present.
    pub fn add(&mut self, column: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let column = column.into();
        if self.contains(&column) {
            return Err(Error::DuplicateFilter(column));
        }
        self.entries.push(Filter {
            column,
            value: value.into(),
        });
        Ok(())
    }

    /// Change the value of an existing filter.
    pub fn set_value(&mut self, column: &str, value: impl Into<String>) -> Result<()> {
        let entry = self
            .entries
            .iter_mut()
            .find(|f| f.column == column)
            .ok_or_else(|| Error::InvalidInput(format!("No filter on column {}", column)))?;
        entry.value = value.into();
        Ok(())
    }

    /// Retarget the filter at `index` to another column, keeping columns unique.
    pub fn set_column(&mut self, index: usize, column: impl Into<String>) -> Result<()> {
        let column = column.into();
        if self
            .entries
            .iter()
            .enumerate()
            .any(|(i, f)| i != index && f.column == column)
        {
            return Err(Error::DuplicateFilter(column));
        }
        let entry = self
            .entries
            .get_mut(index)
            .ok_or_else(|| Error::InvalidInput(format!("No filter at position {}", index)))?;
        entry.column = column;
        Ok(())
    }

    /// Remove the filter on `column`, returning it if present.
    pub fn remove(&mut self, column: &str) -> Option<Filter> {
        let idx = self.entries.iter().position(|f| f.column == column)?;
        Some(self.entries.remove(idx))
    }

    pub fn contains(&self, column: &str) -> bool {
        self.entries.iter().any(|f| f.column == column)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Filter> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Filters with a non-empty value; empty ones are placeholders in the UI.
    pub fn active(&self) -> impl Iterator<Item = &Filter> {
        self.entries.iter().filter(|f| !f.value.is_empty())
    }
}

/// Paginated, sorted, filtered view definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub page: u32,
    pub page_size: u32,
    pub sort_column: String,
    pub sort_direction: SortDirection,
    pub filters: FilterSet,
}

impl Default for Query {
    fn default() -> Self {
        Self {
            page: defaults::FIRST_PAGE,
            page_size: defaults::PAGE_SIZE,
            sort_column: defaults::SORT_COLUMN.to_string(),
            sort_direction: SortDirection::Asc,
            filters: FilterSet::new(),
        }
    }
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_sort(mut self, column: impl Into<String>, direction: SortDirection) -> Self {
        self.sort_column = column.into();
        self.sort_direction = direction;
        self
    }

    /// `sort` request parameter: `"<column>,<direction>"`.
    pub fn sort_param(&self) -> String {
        format!("{},{}", self.sort_column, self.sort_direction)
    }

    /// Column header click: same column flips direction, new column sorts ascending.
    pub fn toggle_sort(&mut self, column: &str) {
        if self.sort_column == column {
            self.sort_direction = self.sort_direction.flipped();
        } else {
            self.sort_column = column.to_string();
            self.sort_direction = SortDirection::Asc;
        }
    }

    pub fn set_page(&mut self, page: u32) {
        self.page = page;
    }

    /// First allowed column not yet used by a filter.
    pub fn next_available_filter_column(&self, kind: EntityKind) -> Option<&'static str> {
        kind.filter_columns()
            .iter()
            .copied()
            .find(|col| !self.filters.contains(col))
    }

    /// Add an empty filter on the next unused column.
    pub fn add_next_filter(&mut self, kind: EntityKind) -> Result<&'static str> {
        let column = self.next_available_filter_column(kind).ok_or_else(|| {
            Error::InvalidInput(format!("All {} filters are already added", kind))
        })?;
        self.filters.add(column, "")?;
        Ok(column)
    }

    /// JSON body for the filtered listing endpoint.
    pub fn filter_params(&self) -> Map<String, JsonValue> {
        self.filters
            .active()
            .map(|f| (f.column.clone(), JsonValue::String(f.value.clone())))
            .collect()
    }

    pub fn has_active_filters(&self) -> bool {
        self.filters.active().next().is_some()
    }

    /// Check input constraints before a fetch.
    pub fn validate(&self, kind: EntityKind) -> Result<()> {
        if self.page_size == 0 {
            return Err(Error::InvalidInput("Page size must be positive".to_string()));
        }
        let allowed = kind.filter_columns();
        if let Some(bad) = self.filters.iter().find(|f| !allowed.contains(&f.column.as_str())) {
            return Err(Error::InvalidInput(format!(
                "Column {} cannot be filtered for {}",
                bad.column, kind
            )));
        }
        Ok(())
    }
}

/// One page of a remote collection.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResult<T> {
    #[serde(rename = "content")]
    pub items: Vec<T>,
    pub total_pages: u32,
}

impl<T> PageResult<T> {
    pub fn new(items: Vec<T>, total_pages: u32) -> Self {
        Self { items, total_pages }
    }

    /// Enforce the page invariants against the query that produced it.
    ///
    /// Extra rows beyond `page_size` are dropped and a zero page count (empty
    /// collection) becomes one.
    pub fn normalized(mut self, query: &Query) -> Self {
        let limit = query.page_size as usize;
        if self.items.len() > limit {
            tracing::warn!(
                received = self.items.len(),
                page_size = limit,
                "Server returned more rows than requested, truncating"
            );
            self.items.truncate(limit);
        }
        self.total_pages = self.total_pages.max(1);
        self
    }
}
