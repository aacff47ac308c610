//! End-to-end introspection of a real SQLite file.
//!
//! Builds a shop schema on disk with sqlx, registers it, runs the full
//! pipeline against an in-memory admin database and checks what was stored.

use std::path::PathBuf;
use std::sync::Arc;

use catalog::config::InspectorSettings;
use catalog::inference::{EdgeOrigin, WarningKind};
use catalog::inspector::LiveCatalogSource;
use catalog::model::{DataType, Dialect, RelationType, TableKind};
use catalog::registry::{NewConnection, SeaOrmConnectionRegistry};
use catalog::store::SeaOrmMetadataStore;
use catalog::{IntrospectError, Introspector};
use migration::{Migrator, MigratorTrait};
use sea_orm::Database;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{ConnectOptions, Connection, Executor};
use uuid::Uuid;

const SHOP: &str = "
    CREATE TABLE customers (
        id INTEGER PRIMARY KEY,
        name VARCHAR(120) NOT NULL
    );
    CREATE TABLE orders (
        id INTEGER PRIMARY KEY,
        customer_id INTEGER NOT NULL REFERENCES customers(id) ON DELETE CASCADE,
        total DECIMAL(10,2),
        placed_at DATETIME DEFAULT CURRENT_TIMESTAMP
    );
    CREATE TABLE order_items (
        order_id INTEGER NOT NULL REFERENCES orders(id),
        product_id INTEGER NOT NULL REFERENCES products(id),
        quantity INTEGER NOT NULL DEFAULT 1,
        PRIMARY KEY (order_id, product_id)
    );
";

const PRODUCTS: &str = "
    CREATE TABLE products (
        id INTEGER PRIMARY KEY,
        sku TEXT NOT NULL UNIQUE
    );
";

struct SourceFile(PathBuf);

impl SourceFile {
    async fn create(sql: &str) -> Self {
        let path = std::env::temp_dir().join(format!("catalog-e2e-{}.db", Uuid::now_v7()));
        let mut conn = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .connect()
            .await
            .unwrap();
        conn.execute(sql).await.unwrap();
        conn.close().await.unwrap();
        Self(path)
    }
}

impl Drop for SourceFile {
    fn drop(&mut self) {
        std::fs::remove_file(&self.0).ok();
    }
}

async fn setup(file: &SourceFile) -> (Introspector, Arc<SeaOrmConnectionRegistry>, Uuid) {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    Migrator::up(&db, None).await.unwrap();

    let registry = Arc::new(SeaOrmConnectionRegistry::new(db.clone()));
    let id = registry
        .register(NewConnection {
            name: "shop".to_string(),
            dialect: Dialect::Sqlite,
            host: String::new(),
            port: None,
            database: file.0.to_string_lossy().into_owned(),
            namespace: None,
            username: String::new(),
            password: String::new(),
        })
        .await
        .unwrap()
        .id;

    let introspector = Introspector::new(
        registry.clone(),
        Arc::new(SeaOrmMetadataStore::new(db)),
        Arc::new(LiveCatalogSource::new(InspectorSettings::default())),
    );
    (introspector, registry, id)
}

#[tokio::test]
async fn test_shop_with_products() {
    let file = SourceFile::create(&format!("{PRODUCTS}{SHOP}")).await;
    let (introspector, registry, id) = setup(&file).await;

    let summary = introspector.introspect(id).await.unwrap();
    assert_eq!(summary.tables_count, 4);
    assert_eq!(summary.relations_count, 3);
    assert!(summary.warnings.is_empty());

    let record = registry.get(id).await.unwrap().unwrap();
    assert_eq!(record.status, "active");
    assert_eq!(record.last_introspection_at, Some(summary.completed_at));

    let tables = introspector.get_tables(id).await.unwrap();
    let names: Vec<&str> = tables.iter().map(|t| t.table_name.as_str()).collect();
    assert_eq!(names, vec!["customers", "order_items", "orders", "products"]);
    assert!(tables.iter().all(|t| t.schema_name == "main" && t.table_type == TableKind::Table));

    let orders = tables.iter().find(|t| t.table_name == "orders").unwrap();
    let ordinals: Vec<i32> = orders.columns.iter().map(|c| c.ordinal_position).collect();
    assert_eq!(ordinals, vec![1, 2, 3, 4]);
    let total = orders.column("total").unwrap();
    assert_eq!(total.data_type, DataType::Decimal);
    assert_eq!((total.precision, total.scale), (Some(10), Some(2)));
    assert_eq!(orders.column("placed_at").unwrap().data_type, DataType::Timestamp);
    assert!(orders.column("customer_id").unwrap().is_foreign_key);

    let items = tables.iter().find(|t| t.table_name == "order_items").unwrap();
    assert_eq!(items.primary_key().count(), 2);

    let relations = introspector.get_relations(id).await.unwrap();
    let item_relations: Vec<_> = relations
        .iter()
        .filter(|r| r.source_table_id == items.id)
        .collect();
    assert_eq!(item_relations.len(), 2);
    assert!(item_relations
        .iter()
        .all(|r| r.relation_type == RelationType::ManyToOne));

    let view = introspector.get_relation_view(id).await.unwrap();
    assert_eq!(view.junctions.len(), 1);
    assert_eq!(view.junctions[0].table_name, "order_items");
    let products = tables.iter().find(|t| t.table_name == "products").unwrap();
    assert!(view.edges.iter().any(|e| e.origin == EdgeOrigin::Junction
        && e.source_table_id == orders.id
        && e.target_table_id == products.id
        && e.via_table_id == Some(items.id)));
}

#[tokio::test]
async fn test_shop_without_products_drops_reference() {
    let file = SourceFile::create(SHOP).await;
    let (introspector, _, id) = setup(&file).await;

    let summary = introspector.introspect(id).await.unwrap();
    assert_eq!(summary.tables_count, 3);
    assert_eq!(summary.relations_count, 2);
    assert_eq!(summary.warning_count(), 1);
    assert_eq!(summary.warnings[0].kind, WarningKind::UnresolvedReference);
    assert_eq!(summary.warnings[0].table_name, "order_items");

    let tables = introspector.get_tables(id).await.unwrap();
    let items = tables.iter().find(|t| t.table_name == "order_items").unwrap();
    assert!(items.column("order_id").unwrap().is_foreign_key);
    assert!(!items.column("product_id").unwrap().is_foreign_key);

    // One remaining link is not a junction.
    assert!(introspector.get_relation_view(id).await.unwrap().junctions.is_empty());
}

#[tokio::test]
async fn test_reference_spelled_in_other_case_resolves() {
    let file = SourceFile::create(
        "CREATE TABLE customers (id INTEGER PRIMARY KEY, name TEXT);
         CREATE TABLE orders (
             id INTEGER PRIMARY KEY,
             customer_id INTEGER REFERENCES Customers(ID)
         );
         CREATE TABLE invoices (
             id INTEGER PRIMARY KEY,
             Order_Id INTEGER UNIQUE REFERENCES ORDERS
         );",
    )
    .await;
    let (introspector, _, id) = setup(&file).await;

    let summary = introspector.introspect(id).await.unwrap();
    assert!(summary.warnings.is_empty(), "{:?}", summary.warnings);
    assert_eq!(summary.relations_count, 2);

    let named = introspector.get_named_relations(id).await.unwrap();
    let spelled: Vec<String> = named
        .iter()
        .map(|n| {
            format!(
                "{}.{} -> {}.{} ({})",
                n.source_table_name,
                n.source_column_name,
                n.target_table_name,
                n.target_column_name,
                n.relation.relation_type.as_str()
            )
        })
        .collect();
    assert_eq!(
        spelled,
        vec![
            "invoices.Order_Id -> orders.id (one_to_one)",
            "orders.customer_id -> customers.id (many_to_one)",
        ]
    );

    let tables = introspector.get_tables(id).await.unwrap();
    let orders = tables.iter().find(|t| t.table_name == "orders").unwrap();
    let customer_id = orders.column("customer_id").unwrap();
    assert!(customer_id.is_foreign_key);
    assert_eq!(customer_id.foreign_key_table.as_deref(), Some("customers"));
    assert_eq!(customer_id.foreign_key_column.as_deref(), Some("id"));
    assert!(orders.comment.is_none());
}

#[tokio::test]
async fn test_second_run_is_identical() {
    let file = SourceFile::create(&format!("{PRODUCTS}{SHOP}")).await;
    let (introspector, _, id) = setup(&file).await;

    introspector.introspect(id).await.unwrap();
    let tables = introspector.get_tables(id).await.unwrap();
    let relations = introspector.get_relations(id).await.unwrap();

    introspector.introspect(id).await.unwrap();
    assert_eq!(introspector.get_tables(id).await.unwrap(), tables);
    assert_eq!(introspector.get_relations(id).await.unwrap(), relations);
}

#[tokio::test]
async fn test_missing_file_marks_connection_error() {
    let file = SourceFile::create(SHOP).await;
    let (introspector, registry, id) = setup(&file).await;
    std::fs::remove_file(&file.0).unwrap();

    let err = introspector.introspect(id).await.unwrap_err();
    assert!(matches!(err, IntrospectError::Connectivity { dialect: Dialect::Sqlite, .. }), "{err}");
    assert!(!file.0.exists());

    let record = registry.get(id).await.unwrap().unwrap();
    assert_eq!(record.status, "error");
    assert_eq!(record.last_introspection_at, None);
}
