// Catalog Repository Port
// The only contract the pipeline needs from the surrounding product store.

use crate::domain::{Product, Sku};
use crate::error::Result;
use async_trait::async_trait;

/// A product the repository refused while the rest of its batch committed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    /// Position in the slice passed to `upsert_batch`
    pub index: usize,
    pub sku: Sku,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpsertReport {
    pub applied: u64,
    pub failures: Vec<ItemFailure>,
}

#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Insert-or-replace by SKU inside one transaction.
    ///
    /// `Err` means nothing from the batch was applied (PersistenceError);
    /// per-item refusals are reported in `UpsertReport::failures`.
    async fn upsert_batch(&self, products: &[Product]) -> Result<UpsertReport>;

    /// Find product by SKU
    async fn find_by_sku(&self, sku: &str) -> Result<Option<Product>>;

    /// Number of products in the catalog
    async fn count(&self) -> Result<i64>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory catalog with failure injection
    #[derive(Default)]
    pub struct InMemoryCatalog {
        products: Mutex<HashMap<Sku, Product>>,
        batch_sizes: Mutex<Vec<usize>>,
        rejected_skus: Mutex<HashMap<Sku, String>>,
        fail_next: Mutex<usize>,
        always_fail: Mutex<bool>,
    }

    impl InMemoryCatalog {
        pub fn new() -> Self {
            Self::default()
        }

        /// Every upsert_batch call fails with a PersistenceError
        pub fn new_always_failing() -> Self {
            let catalog = Self::default();
            *catalog.always_fail.lock().unwrap() = true;
            catalog
        }

        /// The next `n` upsert_batch calls fail with a PersistenceError
        pub fn fail_next(&self, n: usize) {
            *self.fail_next.lock().unwrap() = n;
        }

        /// Refuse this SKU as a per-item failure
        pub fn reject_sku(&self, sku: impl Into<String>, reason: impl Into<String>) {
            self.rejected_skus
                .lock()
                .unwrap()
                .insert(sku.into(), reason.into());
        }

        /// Sizes of every upsert_batch call that reached the store
        pub fn batch_sizes(&self) -> Vec<usize> {
            self.batch_sizes.lock().unwrap().clone()
        }

        pub fn get(&self, sku: &str) -> Option<Product> {
            self.products.lock().unwrap().get(sku).cloned()
        }

        pub fn len(&self) -> usize {
            self.products.lock().unwrap().len()
        }

        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }
    }

    #[async_trait]
    impl CatalogRepository for InMemoryCatalog {
        async fn upsert_batch(&self, products: &[Product]) -> Result<UpsertReport> {
            self.batch_sizes.lock().unwrap().push(products.len());

            if *self.always_fail.lock().unwrap() {
                return Err(AppError::Persistence("catalog unavailable".to_string()));
            }
            {
                let mut fail_next = self.fail_next.lock().unwrap();
                if *fail_next > 0 {
                    *fail_next -= 1;
                    return Err(AppError::Persistence("catalog unavailable".to_string()));
                }
            }

            let rejected = self.rejected_skus.lock().unwrap().clone();
            let mut store = self.products.lock().unwrap();
            let mut report = UpsertReport::default();
            for (index, product) in products.iter().enumerate() {
                if let Some(reason) = rejected.get(&product.sku) {
                    report.failures.push(ItemFailure {
                        index,
                        sku: product.sku.clone(),
                        reason: reason.clone(),
                    });
                    continue;
                }
                store.insert(product.sku.clone(), product.clone());
                report.applied += 1;
            }
            Ok(report)
        }

        async fn find_by_sku(&self, sku: &str) -> Result<Option<Product>> {
            Ok(self.get(sku))
        }

        async fn count(&self) -> Result<i64> {
            Ok(self.len() as i64)
        }
    }
}
