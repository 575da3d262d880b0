//! Owner filters and the SQL text built from them.
//!
//! The catalog is read through a derived table that exposes the same
//! `owner, table_name` columns regardless of the underlying catalog view, so
//! the filter clause is always expressed against `owner`.

use crate::types::WorkItem;

/// Catalog projection every filter clause is appended to.
pub const CATALOG_SELECT: &str = "SELECT owner, table_name FROM (\
SELECT schemaname::text AS owner, tablename::text AS table_name \
FROM pg_catalog.pg_tables) AS catalog";

/// Which schemas a run covers. The two modes are mutually exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnerFilter {
    /// Every schema except the listed ones.
    Exclude(Vec<String>),
    /// Exactly one schema.
    Include(String),
}

impl OwnerFilter {
    /// Exclusion filter from a raw, possibly quoted, comma-separated list.
    pub fn exclude_from_list(raw: &str) -> Self {
        OwnerFilter::Exclude(parse_owner_list(raw))
    }

    /// The `WHERE ...` clause restricting the catalog query.
    ///
    /// An empty exclusion list still yields a valid clause that matches
    /// every table.
    pub fn where_clause(&self) -> String {
        match self {
            OwnerFilter::Exclude(owners) if owners.is_empty() => {
                "WHERE owner IS NOT NULL".to_string()
            }
            OwnerFilter::Exclude(owners) => {
                let list: Vec<String> = owners.iter().map(|o| quote_literal(o)).collect();
                format!("WHERE owner NOT IN ({})", list.join(","))
            }
            OwnerFilter::Include(owner) => format!("WHERE owner = {}", quote_literal(owner)),
        }
    }
}

/// Split a configured owner list into bare names.
///
/// Quote characters around each entry and surrounding whitespace are
/// stripped; empty entries are dropped, so `""` yields an empty list.
///
/// ```
/// use rowtally_core::filter::parse_owner_list;
/// assert_eq!(parse_owner_list("'sys1', 'sys2' ,'sys3'"), vec!["sys1", "sys2", "sys3"]);
/// ```
pub fn parse_owner_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|part| {
            part.trim_matches(|c: char| c == '\'' || c == '"' || c.is_whitespace())
                .to_string()
        })
        .filter(|owner| !owner.is_empty())
        .collect()
}

/// Full catalog listing statement for `filter`.
pub fn catalog_query(filter: &OwnerFilter) -> String {
    format!("{} {}", CATALOG_SELECT, filter.where_clause())
}

/// `SELECT COUNT(*)` against the quote-delimited table reference.
pub fn count_query(item: &WorkItem) -> String {
    format!("SELECT COUNT(*) FROM {}", item.qualified_name())
}

/// Double-quote an identifier, doubling any embedded `"`.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Single-quote a string literal, doubling any embedded `'`.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
