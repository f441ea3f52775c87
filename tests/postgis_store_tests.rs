//! PostGIS spatial store tests. Skipped when no container runtime is available.

use chrono::Utc;
use mapstudio::catalog::{
    AttributeType, CatalogManager, DataAttribute, Dataset, MockCatalog, SourceType,
};
use mapstudio::datastore::{PostgisStore, Relation, SpatialStore};
use mapstudio::stats::compute_dataset_statistics;
use testcontainers::{runners::AsyncRunner, ContainerAsync, GenericImage, ImageExt};

const TEST_PASSWORD: &str = "studio-test";

/// Start a PostGIS-enabled PostgreSQL container
/// Uses kartoza/postgis which has multi-arch support (amd64 + arm64)
async fn start_postgis_container() -> Option<ContainerAsync<GenericImage>> {
    let started = GenericImage::new("kartoza/postgis", "16-3.4")
        .with_exposed_port(5432.into())
        .with_wait_for(testcontainers::core::WaitFor::message_on_stdout(
            "restarting in foreground",
        ))
        .with_env_var("POSTGRES_USER", "postgres")
        .with_env_var("POSTGRES_PASSWORD", TEST_PASSWORD)
        .with_env_var("POSTGRES_DB", "postgres")
        .start()
        .await;
    match started {
        Ok(container) => Some(container),
        Err(e) => {
            eprintln!("skipping postgis test: {}", e);
            None
        }
    }
}

/// Wait for the database to be ready for connections
async fn connect_store(container: &ContainerAsync<GenericImage>) -> PostgisStore {
    let port = container.get_host_port_ipv4(5432).await.unwrap();
    let url = format!(
        "postgres://postgres:{}@localhost:{}/postgres",
        TEST_PASSWORD, port
    );
    for attempt in 1..=30 {
        if let Ok(store) = PostgisStore::connect(&url).await {
            if sqlx::query("SELECT 1").execute(store.pool()).await.is_ok() {
                return store;
            }
        }
        if attempt < 30 {
            tokio::time::sleep(tokio::time::Duration::from_secs(1)).await;
        }
    }
    panic!("Failed to connect to PostGIS after 30 attempts");
}

async fn create_parcels(store: &PostgisStore) {
    for statement in [
        "CREATE EXTENSION IF NOT EXISTS postgis",
        "CREATE TABLE parcels (
            ogc_fid SERIAL PRIMARY KEY,
            zoning TEXT,
            area TEXT,
            wkb_geometry geometry(MultiPolygon, 4326)
        )",
        "INSERT INTO parcels (zoning, area, wkb_geometry)
         SELECT
            CASE WHEN n % 3 = 0 THEN 'commercial' WHEN n % 3 = 1 THEN 'residential' ELSE 'industrial' END,
            n::text,
            ST_Multi(ST_MakeEnvelope(-122.5 + n * 0.01, 37.7, -122.49 + n * 0.01, 37.71, 4326))
         FROM generate_series(1, 10) AS n",
    ] {
        sqlx::query(statement).execute(store.pool()).await.unwrap();
    }
}

fn parcels_dataset() -> Dataset {
    Dataset {
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
        created_at: Utc::now(),
        attributes: Vec::new(),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_postgis_store_operations() {
    let Some(container) = start_postgis_container().await else {
        return;
    };
    let store = connect_store(&container).await;
    create_parcels(&store).await;

    // Text columns loaded by the converter are retyped before statistics run.
    store
        .alter_column_type("parcels", "area", "double precision")
        .await
        .unwrap();

    let relation = Relation::Table("parcels".to_string());
    assert_eq!(
        store.numeric_bounds(&relation, "\"area\"").await.unwrap(),
        (Some(1.0), Some(10.0))
    );
    assert_eq!(
        store.bucket_minimums(&relation, "\"area\"", 5).await.unwrap(),
        vec![1.0, 3.0, 5.0, 7.0, 9.0]
    );
    assert_eq!(
        store
            .distinct_values(&relation, "\"zoning\"", 8)
            .await
            .unwrap(),
        vec!["commercial", "industrial", "residential"]
    );

    let derived = Relation::Query("SELECT area * 2 AS doubled FROM parcels".to_string());
    assert_eq!(
        store.numeric_bounds(&derived, "\"doubled\"").await.unwrap(),
        (Some(2.0), Some(20.0))
    );

    assert_eq!(
        store
            .geometry_type("parcels", "wkb_geometry")
            .await
            .unwrap()
            .as_deref(),
        Some("ST_MultiPolygon")
    );
    let extent = store
        .extent("parcels", "wkb_geometry")
        .await
        .unwrap()
        .unwrap();
    assert!((extent.min_x - -122.49).abs() < 1e-9);
    assert!((extent.max_y - 37.71).abs() < 1e-9);
    assert!(store.relation_size("parcels").await.unwrap().unwrap_or(0) > 0);

    store.drop_column("parcels", "zoning").await.unwrap();
    assert!(store
        .distinct_values(&relation, "\"zoning\"", 8)
        .await
        .is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_statistics_against_postgis() {
    let Some(container) = start_postgis_container().await else {
        return;
    };
    let store = connect_store(&container).await;
    create_parcels(&store).await;
    store
        .alter_column_type("parcels", "area", "double precision")
        .await
        .unwrap();

    let catalog = MockCatalog::new();
    let mut dataset = parcels_dataset();
    catalog.create_dataset(&dataset).await.unwrap();
    for attribute in [
        DataAttribute::new("attr_zoning", "dset1", "zoning", AttributeType::String, 0),
        DataAttribute::new("attr_area", "dset1", "area", AttributeType::Number, 1),
    ] {
        catalog.create_attribute(&attribute).await.unwrap();
        dataset.attributes.push(attribute);
    }

    let updated = compute_dataset_statistics(&catalog, &store, &dataset)
        .await
        .unwrap();

    assert!(updated[0].categorical);
    assert_eq!(updated[0].categories.as_ref().map(Vec::len), Some(3));
    assert_eq!(
        updated[1].quantiles_5,
        Some(vec![1.0, 3.0, 5.0, 7.0, 9.0, 10.0])
    );
    assert_eq!(updated[1].quantiles_10.as_ref().map(Vec::len), Some(11));
}
