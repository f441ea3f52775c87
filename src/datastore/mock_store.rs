//! In-memory spatial store for tests.
//!
//! Tables are column maps of JSON values. Only plain quoted column expressions
//! (`"field"`) can be evaluated; anything else is reported as a query error, which
//! is also how tests exercise statistics failures.

use crate::catalog::Extent;
use crate::datastore::{Relation, SpatialStore};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

/// One table held by [`MockStore`].
#[derive(Debug, Clone, Default)]
pub struct MockTable {
    pub columns: BTreeMap<String, Vec<Value>>,
    pub geometry_type: Option<String>,
    pub extent: Option<Extent>,
    pub size_bytes: Option<i64>,
}

impl MockTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_column(mut self, name: &str, values: Vec<Value>) -> Self {
        self.columns.insert(name.to_string(), values);
        self
    }

    pub fn with_geometry(mut self, geometry_type: &str, extent: Extent) -> Self {
        self.geometry_type = Some(geometry_type.to_string());
        self.extent = Some(extent);
        self
    }
}

#[derive(Debug)]
pub struct MockStore {
    tables: Mutex<HashMap<String, MockTable>>,
    /// DDL statements applied, in completion order.
    ddl_log: Mutex<Vec<String>>,
    failing_columns: Mutex<HashSet<String>>,
    connection: String,
}

impl Default for MockStore {
    fn default() -> Self {
        Self {
            tables: Mutex::default(),
            ddl_log: Mutex::default(),
            failing_columns: Mutex::default(),
            connection: "PG:dbname=mock".to_string(),
        }
    }
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_table(&self, name: &str, table: MockTable) {
        self.tables.lock().unwrap().insert(name.to_string(), table);
    }

    pub fn table(&self, name: &str) -> Option<MockTable> {
        self.tables.lock().unwrap().get(name).cloned()
    }

    /// Make every query or DDL statement touching `column` fail.
    pub fn fail_column(&self, column: &str) {
        self.failing_columns
            .lock()
            .unwrap()
            .insert(column.to_string());
    }

    pub fn ddl_log(&self) -> Vec<String> {
        self.ddl_log.lock().unwrap().clone()
    }

    fn column_values(&self, relation: &Relation, expression: &str) -> Result<Vec<Value>> {
        let Relation::Table(table) = relation else {
            bail!("Mock store cannot evaluate derived relations");
        };
        let column = expression
            .strip_prefix('"')
            .and_then(|e| e.strip_suffix('"'))
            .ok_or_else(|| anyhow!("Mock store cannot evaluate expression {}", expression))?;
        self.check_column(column)?;
        let tables = self.tables.lock().unwrap();
        let table = tables
            .get(table)
            .ok_or_else(|| anyhow!("relation \"{}\" does not exist", table))?;
        table
            .columns
            .get(column)
            .cloned()
            .ok_or_else(|| anyhow!("column \"{}\" does not exist", column))
    }

    fn numbers(&self, relation: &Relation, expression: &str) -> Result<Vec<f64>> {
        let mut numbers = Vec::new();
        for value in self.column_values(relation, expression)? {
            match value {
                Value::Null => {}
                Value::Number(n) => numbers.extend(n.as_f64()),
                Value::String(s) => numbers.push(
                    s.parse::<f64>()
                        .map_err(|_| anyhow!("invalid input syntax for type double: {}", s))?,
                ),
                other => bail!("cannot cast {} to double", other),
            }
        }
        numbers.sort_by(f64::total_cmp);
        Ok(numbers)
    }

    fn check_column(&self, column: &str) -> Result<()> {
        if self.failing_columns.lock().unwrap().contains(column) {
            bail!("simulated failure on column \"{}\"", column);
        }
        Ok(())
    }

    fn with_table<T>(&self, table: &str, f: impl FnOnce(&mut MockTable) -> T) -> Result<T> {
        let mut tables = self.tables.lock().unwrap();
        let table = tables
            .get_mut(table)
            .ok_or_else(|| anyhow!("relation \"{}\" does not exist", table))?;
        Ok(f(table))
    }
}

/// Minimum of each bucket after splitting ascending `sorted` values into `buckets`
/// equal-count groups. Earlier buckets take the remainder, one extra row each.
pub fn ntile_minimums(sorted: &[f64], buckets: usize) -> Vec<f64> {
    if sorted.is_empty() || buckets == 0 {
        return Vec::new();
    }
    let base = sorted.len() / buckets;
    let extra = sorted.len() % buckets;
    let mut minimums = Vec::with_capacity(buckets);
    let mut offset = 0;
    for bucket in 0..buckets {
        let size = base + usize::from(bucket < extra);
        if size == 0 {
            break;
        }
        minimums.push(sorted[offset]);
        offset += size;
    }
    minimums
}

#[async_trait]
impl SpatialStore for MockStore {
    fn connection_string(&self) -> &str {
        &self.connection
    }

    async fn numeric_bounds(
        &self,
        relation: &Relation,
        expression: &str,
    ) -> Result<(Option<f64>, Option<f64>)> {
        let numbers = self.numbers(relation, expression)?;
        Ok((numbers.first().copied(), numbers.last().copied()))
    }

    async fn bucket_minimums(
        &self,
        relation: &Relation,
        expression: &str,
        buckets: u32,
    ) -> Result<Vec<f64>> {
        let numbers = self.numbers(relation, expression)?;
        Ok(ntile_minimums(&numbers, buckets as usize))
    }

    async fn distinct_values(
        &self,
        relation: &Relation,
        expression: &str,
        limit: usize,
    ) -> Result<Vec<String>> {
        let mut distinct: Vec<String> = self
            .column_values(relation, expression)?
            .into_iter()
            .filter_map(|value| match value {
                Value::Null => None,
                Value::String(s) => Some(s),
                other => Some(other.to_string()),
            })
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect();
        distinct.truncate(limit);
        Ok(distinct)
    }

    async fn alter_column_type(&self, table: &str, column: &str, sql_type: &str) -> Result<()> {
        self.check_column(column)?;
        let exists = self.with_table(table, |t| t.columns.contains_key(column))?;
        if !exists {
            bail!("column \"{}\" does not exist", column);
        }
        self.ddl_log
            .lock()
            .unwrap()
            .push(format!("ALTER {}.{} TYPE {}", table, column, sql_type));
        Ok(())
    }

    async fn drop_column(&self, table: &str, column: &str) -> Result<()> {
        self.check_column(column)?;
        let removed = self.with_table(table, |t| t.columns.remove(column).is_some())?;
        if !removed {
            bail!("column \"{}\" does not exist", column);
        }
        self.ddl_log
            .lock()
            .unwrap()
            .push(format!("DROP {}.{}", table, column));
        Ok(())
    }

    async fn geometry_type(&self, table: &str, _geometry_column: &str) -> Result<Option<String>> {
        self.with_table(table, |t| t.geometry_type.clone())
    }

    async fn extent(&self, table: &str, _geometry_column: &str) -> Result<Option<Extent>> {
        self.with_table(table, |t| t.extent)
    }

    async fn relation_size(&self, table: &str) -> Result<Option<i64>> {
        self.with_table(table, |t| t.size_bytes)
    }
}
