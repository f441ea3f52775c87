//! Access to the relational store that holds ingested geometry tables.
//!
//! The catalog describes datasets; the spatial store holds their rows. Statistics,
//! schema reconciliation and dataset generation all go through [`SpatialStore`] so
//! they can run against PostGIS in production and an in-memory table in tests.

mod mock_store;
mod postgis;

pub use mock_store::{ntile_minimums, MockStore, MockTable};
pub use postgis::PostgisStore;

use crate::catalog::{DataAttribute, Dataset, Extent, SourceType};
use anyhow::Result;
use async_trait::async_trait;
use std::fmt::Debug;

/// The rows a statistics query reads from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relation {
    /// A physical table, referenced by name.
    Table(String),
    /// A SQL query used as a derived table.
    Query(String),
}

impl Relation {
    /// The relation backing a dataset, or `None` for sources the store cannot query.
    pub fn for_dataset(dataset: &Dataset) -> Option<Self> {
        if !dataset.source_type.supports_statistics() {
            return None;
        }
        let source = dataset.source.clone();
        Some(match dataset.source_type {
            SourceType::Sql => Self::Query(source),
            _ => Self::Table(source),
        })
    }

    /// SQL usable after `FROM`.
    pub fn to_sql(&self) -> String {
        match self {
            Self::Table(name) => quote_ident(name),
            Self::Query(sql) => format!("({}) AS src", sql.trim().trim_end_matches(';')),
        }
    }
}

/// Quote an identifier for PostgreSQL, doubling embedded quotes.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// SQL expression selecting an attribute's values: its override, else its quoted field.
pub fn attribute_expression(attribute: &DataAttribute) -> String {
    match attribute.sql.as_deref().map(str::trim) {
        Some(sql) if !sql.is_empty() => sql.to_string(),
        _ => quote_ident(&attribute.field),
    }
}

/// Read and DDL operations the ingestion pipeline and statistics engine need.
#[async_trait]
pub trait SpatialStore: Debug + Send + Sync {
    /// Connection string handed to the convert tool as its destination (`PG:...`).
    fn connection_string(&self) -> &str;

    /// Global minimum and maximum of a numeric expression.
    async fn numeric_bounds(
        &self,
        relation: &Relation,
        expression: &str,
    ) -> Result<(Option<f64>, Option<f64>)>;

    /// Partition the non-null values into `buckets` equal-count buckets ordered
    /// ascending and return the minimum of each bucket, in bucket order.
    async fn bucket_minimums(
        &self,
        relation: &Relation,
        expression: &str,
        buckets: u32,
    ) -> Result<Vec<f64>>;

    /// Up to `limit` distinct non-null values as text, ascending.
    async fn distinct_values(
        &self,
        relation: &Relation,
        expression: &str,
        limit: usize,
    ) -> Result<Vec<String>>;

    /// `ALTER COLUMN ... SET DATA TYPE` with an explicit cast.
    async fn alter_column_type(&self, table: &str, column: &str, sql_type: &str) -> Result<()>;

    async fn drop_column(&self, table: &str, column: &str) -> Result<()>;

    /// Geometry type of the first non-null geometry, e.g. `ST_MultiPolygon`.
    async fn geometry_type(&self, table: &str, geometry_column: &str) -> Result<Option<String>>;

    async fn extent(&self, table: &str, geometry_column: &str) -> Result<Option<Extent>>;

    /// Total on-disk size of the table including indexes and toast.
    async fn relation_size(&self, table: &str) -> Result<Option<i64>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::AttributeType;

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("name"), "\"name\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_relation_follows_source_type() {
        let mut dataset = Dataset {
            id: "dset1".to_string(),
            name: "parcels".to_string(),
            description: None,
            attribution: None,
            source_type: SourceType::Table,
            source: "parcels".to_string(),
            geometry_column: "wkb_geometry".to_string(),
            geometry_type: None,
            minzoom: 0.0,
            maxzoom: 22.0,
            cache_control: None,
            is_private: true,
            extent: None,
            size_bytes: None,
            owner: None,
            upload_id: None,
            created_at: chrono::Utc::now(),
            attributes: Vec::new(),
        };
        assert_eq!(
            Relation::for_dataset(&dataset),
            Some(Relation::Table("parcels".to_string()))
        );

        dataset.source_type = SourceType::Sql;
        dataset.source = "SELECT * FROM parcels".to_string();
        assert_eq!(
            Relation::for_dataset(&dataset),
            Some(Relation::Query("SELECT * FROM parcels".to_string()))
        );

        dataset.source_type = SourceType::Tilelive;
        assert_eq!(Relation::for_dataset(&dataset), None);
    }

    #[test]
    fn test_query_relation_is_wrapped() {
        let relation = Relation::Query("SELECT * FROM parcels;".to_string());
        assert_eq!(relation.to_sql(), "(SELECT * FROM parcels) AS src");
    }

    #[test]
    fn test_attribute_expression_prefers_sql_override() {
        let mut attribute = DataAttribute::new("a", "d", "pop", AttributeType::Number, 0);
        assert_eq!(attribute_expression(&attribute), "\"pop\"");

        attribute.sql = Some("pop / area".to_string());
        assert_eq!(attribute_expression(&attribute), "pop / area");

        attribute.sql = Some("   ".to_string());
        assert_eq!(attribute_expression(&attribute), "\"pop\"");
    }
}
