// SQLite CatalogRepository Implementation

use crate::error::{is_constraint_violation, map_sqlx_error};
use async_trait::async_trait;
use catalog_ingest_core::domain::{Price, Product};
use catalog_ingest_core::error::Result;
use catalog_ingest_core::port::{CatalogRepository, ItemFailure, TimeProvider, UpsertReport};
use sqlx::{Acquire, SqlitePool};
use std::sync::Arc;
use tracing::debug;

pub struct SqliteCatalogRepository {
    pool: SqlitePool,
    time_provider: Arc<dyn TimeProvider>,
}

impl SqliteCatalogRepository {
    pub fn new(pool: SqlitePool, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            pool,
            time_provider,
        }
    }
}

#[async_trait]
impl CatalogRepository for SqliteCatalogRepository {
    /// One transaction per batch, one savepoint per product: a constraint
    /// violation rolls back only that product, any other error the batch.
    async fn upsert_batch(&self, products: &[Product]) -> Result<UpsertReport> {
        let now = self.time_provider.now_millis();
        let mut report = UpsertReport::default();
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        for (index, product) in products.iter().enumerate() {
            let mut savepoint = Acquire::begin(&mut *tx).await.map_err(map_sqlx_error)?;
            let result = sqlx::query(
                r#"
                INSERT INTO products (sku, name, price_minor, category, stock, image_url, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT (sku) DO UPDATE SET
                    name = excluded.name,
                    price_minor = excluded.price_minor,
                    category = excluded.category,
                    stock = excluded.stock,
                    image_url = excluded.image_url,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&product.sku)
            .bind(&product.name)
            .bind(product.price.minor_units())
            .bind(&product.category)
            .bind(product.stock)
            .bind(&product.image_url)
            .bind(now)
            .execute(&mut *savepoint)
            .await;

            match result {
                Ok(_) => {
                    savepoint.commit().await.map_err(map_sqlx_error)?;
                    report.applied += 1;
                }
                Err(e) if is_constraint_violation(&e) => {
                    savepoint.rollback().await.map_err(map_sqlx_error)?;
                    let reason = map_sqlx_error(e).to_string();
                    debug!(sku = %product.sku, reason = %reason, "Product refused");
                    report.failures.push(ItemFailure {
                        index,
                        sku: product.sku.clone(),
                        reason,
                    });
                }
                // Dropping the transaction rolls the whole batch back
                Err(e) => return Err(map_sqlx_error(e)),
            }
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(report)
    }

    async fn find_by_sku(&self, sku: &str) -> Result<Option<Product>> {
        let row = sqlx::query_as::<_, ProductRow>(
            "SELECT sku, name, price_minor, category, stock, image_url FROM products WHERE sku = ?",
        )
        .bind(sku)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(ProductRow::into_product))
    }

    async fn count(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    sku: String,
    name: String,
    price_minor: i64,
    category: String,
    stock: i64,
    image_url: String,
}

impl ProductRow {
    fn into_product(self) -> Product {
        Product {
            sku: self.sku,
            name: self.name,
            price: Price::from_minor_units(self.price_minor),
            category: self.category,
            stock: self.stock,
            image_url: self.image_url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{test_db, TestDb};
    use catalog_ingest_core::port::time_provider::SystemTimeProvider;

    fn product(sku: &str, name: &str, price_minor: i64, stock: i64) -> Product {
        Product {
            sku: sku.to_string(),
            name: name.to_string(),
            price: Price::from_minor_units(price_minor),
            category: "tools".to_string(),
            stock,
            image_url: String::new(),
        }
    }

    async fn repo() -> (TestDb, SqliteCatalogRepository) {
        let db = test_db().await;
        let repo = SqliteCatalogRepository::new(db.pool.clone(), Arc::new(SystemTimeProvider));
        (db, repo)
    }

    #[tokio::test]
    async fn test_upsert_inserts_then_replaces() {
        let (_db, repo) = repo().await;

        let report = repo
            .upsert_batch(&[product("A", "Hammer", 1999, 3), product("B", "Saw", 500, 1)])
            .await
            .unwrap();
        assert_eq!(report.applied, 2);
        assert!(report.failures.is_empty());

        repo.upsert_batch(&[product("A", "Claw hammer", 2499, 5)])
            .await
            .unwrap();

        assert_eq!(repo.count().await.unwrap(), 2);
        let a = repo.find_by_sku("A").await.unwrap().unwrap();
        assert_eq!(a.name, "Claw hammer");
        assert_eq!(a.price.to_string(), "24.99");
        assert_eq!(a.stock, 5);
    }

    #[tokio::test]
    async fn test_same_batch_twice_is_idempotent() {
        let (_db, repo) = repo().await;
        let batch = vec![product("A", "Hammer", 1999, 3), product("B", "Saw", 500, 1)];

        repo.upsert_batch(&batch).await.unwrap();
        let first = repo.find_by_sku("B").await.unwrap();
        repo.upsert_batch(&batch).await.unwrap();

        assert_eq!(repo.count().await.unwrap(), 2);
        assert_eq!(repo.find_by_sku("B").await.unwrap(), first);
    }

    #[tokio::test]
    async fn test_constraint_violation_refuses_only_that_item() {
        let (_db, repo) = repo().await;
        let long_sku = "X".repeat(100);

        let report = repo
            .upsert_batch(&[
                product("A", "Hammer", 1999, 3),
                product(&long_sku, "Too long", 100, 1),
                product("C", "Chisel", 700, 2),
            ])
            .await
            .unwrap();

        assert_eq!(report.applied, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].index, 1);
        assert!(report.failures[0].reason.contains("constraint"));
        assert!(repo.find_by_sku("C").await.unwrap().is_some());
        assert!(repo.find_by_sku(&long_sku).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let (_db, repo) = repo().await;
        let report = repo.upsert_batch(&[]).await.unwrap();
        assert_eq!(report, UpsertReport::default());
    }
}
