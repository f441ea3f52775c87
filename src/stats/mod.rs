//! Attribute statistics: numeric bounds and quantile boundaries, or categorical buckets.
//!
//! Attributes are processed concurrently and each is persisted as soon as its own
//! queries finish. A failure stops the remaining work but leaves attributes that were
//! already persisted in place, so the computation must be safe to re-run.

use crate::catalog::{AttributeType, CatalogManager, DataAttribute, Dataset};
use crate::datastore::{attribute_expression, Relation, SpatialStore};
use futures::future::try_join_all;
use thiserror::Error;
use tracing::{debug, info};

/// Maximum number of distinct values for a string attribute to count as categorical.
pub const CATEGORY_LIMIT: usize = 7;

#[derive(Debug, Error)]
pub enum StatisticsError {
    #[error("statistics query failed for attribute '{field}': {source}")]
    Query {
        field: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to store statistics for attribute '{field}': {source}")]
    Persist {
        field: String,
        #[source]
        source: anyhow::Error,
    },
}

impl StatisticsError {
    fn query(attribute: &DataAttribute, source: anyhow::Error) -> Self {
        Self::Query {
            field: attribute.field.clone(),
            source,
        }
    }
}

/// Compute and persist statistics for every attribute of `dataset`.
///
/// Returns the updated attributes. Datasets that are not backed by a table or SQL
/// query are skipped and yield an empty list.
#[tracing::instrument(
    name = "compute_dataset_statistics",
    skip(catalog, store, dataset),
    fields(mapstudio.dataset_id = %dataset.id, mapstudio.attribute_count = dataset.attributes.len())
)]
pub async fn compute_dataset_statistics(
    catalog: &dyn CatalogManager,
    store: &dyn SpatialStore,
    dataset: &Dataset,
) -> Result<Vec<DataAttribute>, StatisticsError> {
    let Some(relation) = Relation::for_dataset(dataset) else {
        debug!(
            source_type = dataset.source_type.as_str(),
            "Skipping statistics for non-relational dataset"
        );
        return Ok(Vec::new());
    };

    let updated = try_join_all(dataset.attributes.iter().map(|attribute| {
        let relation = &relation;
        async move {
            let computed = compute_attribute_statistics(store, relation, attribute).await?;
            catalog
                .update_attribute_statistics(&computed)
                .await
                .map_err(|source| StatisticsError::Persist {
                    field: computed.field.clone(),
                    source,
                })?;
            Ok::<_, StatisticsError>(computed)
        }
    }))
    .await?;

    info!(attributes = updated.len(), "Attribute statistics updated");
    Ok(updated)
}

/// Compute statistics for one attribute without persisting them.
pub async fn compute_attribute_statistics(
    store: &dyn SpatialStore,
    relation: &Relation,
    attribute: &DataAttribute,
) -> Result<DataAttribute, StatisticsError> {
    let expression = attribute_expression(attribute);
    let mut computed = attribute.clone();

    match attribute.attribute_type {
        AttributeType::Number => {
            let (minimum, maximum) = store
                .numeric_bounds(relation, &expression)
                .await
                .map_err(|e| StatisticsError::query(attribute, e))?;
            let (quantiles_5, quantiles_10) = futures::try_join!(
                quantile_boundaries(store, relation, &expression, 5, maximum),
                quantile_boundaries(store, relation, &expression, 10, maximum),
            )
            .map_err(|e| StatisticsError::query(attribute, e))?;

            computed.minimum = minimum;
            computed.maximum = maximum;
            computed.quantiles_5 = quantiles_5;
            computed.quantiles_10 = quantiles_10;
            computed.categorical = false;
            computed.categories = None;
        }
        AttributeType::String => {
            let values = store
                .distinct_values(relation, &expression, CATEGORY_LIMIT + 1)
                .await
                .map_err(|e| StatisticsError::query(attribute, e))?;

            computed.minimum = None;
            computed.maximum = None;
            computed.quantiles_5 = None;
            computed.quantiles_10 = None;
            if values.len() <= CATEGORY_LIMIT {
                computed.categorical = true;
                computed.categories = Some(values);
            } else {
                computed.categorical = false;
                computed.categories = None;
            }
        }
    }

    Ok(computed)
}

/// Bucket minimums followed by the global maximum. `None` when there are no values.
async fn quantile_boundaries(
    store: &dyn SpatialStore,
    relation: &Relation,
    expression: &str,
    buckets: u32,
    maximum: Option<f64>,
) -> anyhow::Result<Option<Vec<f64>>> {
    let mut boundaries = store
        .bucket_minimums(relation, expression, buckets)
        .await?;
    match maximum {
        Some(max) if !boundaries.is_empty() => {
            boundaries.push(max);
            Ok(Some(boundaries))
        }
        _ => Ok(None),
    }
}
