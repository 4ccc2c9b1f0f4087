use std::cmp::Reverse;

use crate::api::{Initiative, Status};

use super::importance::ImportanceMap;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum StatusFilter {
    #[default]
    All,
    Only(Status),
}

impl StatusFilter {
    pub fn parse(value: &str) -> Option<Self> {
        if value.trim().eq_ignore_ascii_case("all") {
            return Some(Self::All);
        }
        Status::parse(value).map(Self::Only)
    }

    pub fn status(self) -> Option<Status> {
        match self {
            Self::All => None,
            Self::Only(status) => Some(status),
        }
    }

    pub fn matches(self, record: &Initiative) -> bool {
        match self {
            Self::All => true,
            Self::Only(status) => record.status == status,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Only(status) => status.label(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SortOrder {
    #[default]
    Descending,
    Ascending,
}

impl SortOrder {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "desc" | "descending" => Some(Self::Descending),
            "asc" | "ascending" => Some(Self::Ascending),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Projection<'a> {
    pub records: Vec<&'a Initiative>,
    pub no_results: bool,
}

impl<'a> Projection<'a> {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_owned(self) -> Vec<Initiative> {
        self.records.into_iter().cloned().collect()
    }
}

fn category_matches(category_filter: Option<&str>, record: &Initiative) -> bool {
    match category_filter.map(str::trim) {
        None | Some("") => true,
        Some(wanted) if wanted.eq_ignore_ascii_case("all") => true,
        Some(wanted) => record.category.as_deref().map(str::trim) == Some(wanted),
    }
}

/// Visible subset of the accumulator. Without importance scores the
/// accumulator order is kept as is; with scores the sort is stable.
pub fn project<'a>(
    accumulator: &'a [Initiative],
    status_filter: StatusFilter,
    category_filter: Option<&str>,
    importance: &ImportanceMap,
    sort_order: SortOrder,
) -> Projection<'a> {
    let mut records: Vec<&Initiative> = accumulator
        .iter()
        .filter(|r| status_filter.matches(r))
        .filter(|r| category_matches(category_filter, r))
        .collect();

    if !importance.is_empty() {
        match sort_order {
            SortOrder::Descending => records.sort_by_key(|r| Reverse(importance.score(r.id))),
            SortOrder::Ascending => records.sort_by_key(|r| importance.score(r.id)),
        }
    }

    let no_results = records.is_empty();
    Projection {
        records,
        no_results,
    }
}
