//! The narrow catalog interfaces the pipeline is allowed to touch, plus
//! their Postgres implementation.
//!
//! Reads are batched per chunk (`= ANY($1)` on sku/id slices) and writes go
//! through multi-row statements, so a 200-row chunk costs a handful of
//! round-trips regardless of how many products it touches.

use std::collections::{BTreeMap, HashMap};

use anyhow::{Context, Result};
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use sqlx::QueryBuilder;
use tracing::instrument;

use crate::model::{OfferRow, ProductSnapshot, StockState};
use crate::pricing::Coefficient;

use super::db::Db;

/// Catalog surface consumed by the reconciliation engine and sync batcher.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Batch SKU resolution; unknown SKUs are simply absent from the result.
    async fn resolve_skus(&self, skus: &[String]) -> Result<HashMap<String, i64>>;

    /// Preloads everything the merge stage needs for the given products.
    async fn load_snapshots(&self, ids: &[i64]) -> Result<HashMap<i64, ProductSnapshot>>;

    /// Replaces each product's full offer collection.
    async fn write_offers(&self, offers: &BTreeMap<i64, Vec<OfferRow>>) -> Result<()>;

    /// Persists derived stock status (and the best-offer pair) per product.
    async fn write_stock_status(&self, states: &BTreeMap<i64, StockState>) -> Result<()>;

    /// Merges supplier side fields into each product's attribute document.
    async fn write_extra_fields(
        &self,
        fields: &BTreeMap<i64, BTreeMap<String, String>>,
    ) -> Result<()>;
}

/// Where markup coefficients come from; the resolver does matching and
/// caching on top of `list_all`.
#[async_trait]
pub trait CoefficientSource: Send + Sync {
    async fn list_all(&self) -> Result<Vec<Coefficient>>;
}

/// Postgres-backed implementation of both store traits.
pub struct PgCatalogStore {
    db: Db,
}

impl PgCatalogStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CatalogStore for PgCatalogStore {
    #[instrument(skip(self, skus), fields(skus = skus.len()))]
    async fn resolve_skus(&self, skus: &[String]) -> Result<HashMap<String, i64>> {
        if skus.is_empty() {
            return Ok(HashMap::new());
        }
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT sku, id FROM products WHERE sku = ANY($1)")
                .bind(skus)
                .persistent(false)
                .fetch_all(&self.db.pool)
                .await
                .context("resolving skus")?;
        Ok(rows.into_iter().collect())
    }

    #[instrument(skip(self, ids), fields(products = ids.len()))]
    async fn load_snapshots(&self, ids: &[i64]) -> Result<HashMap<i64, ProductSnapshot>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let products: Vec<(
            i64,
            String,
            i32,
            Option<BigDecimal>,
            String,
            String,
            Option<String>,
        )> = sqlx::query_as(
            "SELECT id, sku, local_stock_quantity, base_price, product_type, brand, external_ref
             FROM products WHERE id = ANY($1)",
        )
        .bind(ids)
        .persistent(false)
        .fetch_all(&self.db.pool)
        .await
        .context("loading product snapshots")?;

        let offer_rows: Vec<(i64, i32, i32, BigDecimal)> = sqlx::query_as(
            "SELECT product_id, supplier_id, quantity, price
             FROM product_offers WHERE product_id = ANY($1)
             ORDER BY product_id, position, supplier_id",
        )
        .bind(ids)
        .persistent(false)
        .fetch_all(&self.db.pool)
        .await
        .context("loading offer rows")?;

        let mut map: HashMap<i64, ProductSnapshot> = products
            .into_iter()
            .map(
                |(id, sku, local_stock_quantity, base_price, product_type, brand, external_ref)| {
                    (
                        id,
                        ProductSnapshot {
                            product_id: id,
                            sku,
                            local_stock_quantity,
                            base_price,
                            product_type,
                            brand,
                            external_ref,
                            offers: Vec::new(),
                        },
                    )
                },
            )
            .collect();
        for (product_id, supplier_id, quantity, price) in offer_rows {
            if let Some(snapshot) = map.get_mut(&product_id) {
                snapshot.offers.push(OfferRow {
                    supplier_id,
                    quantity,
                    price,
                });
            }
        }
        Ok(map)
    }

    #[instrument(skip(self, offers), fields(products = offers.len()))]
    async fn write_offers(&self, offers: &BTreeMap<i64, Vec<OfferRow>>) -> Result<()> {
        if offers.is_empty() {
            return Ok(());
        }
        let ids: Vec<i64> = offers.keys().copied().collect();
        let total_rows: usize = offers.values().map(Vec::len).sum();

        let mut tx = self.db.pool.begin().await.context("begin offer write")?;
        sqlx::query("DELETE FROM product_offers WHERE product_id = ANY($1)")
            .bind(&ids)
            .persistent(false)
            .execute(&mut *tx)
            .await
            .context("clearing offer rows")?;

        if total_rows > 0 {
            let mut qb: QueryBuilder<'_, sqlx::Postgres> = QueryBuilder::new(
                "INSERT INTO product_offers (product_id, supplier_id, position, quantity, price) ",
            );
            qb.push_values(
                offers.iter().flat_map(|(id, rows)| {
                    rows.iter()
                        .enumerate()
                        .map(move |(position, row)| (*id, position as i32, row))
                }),
                |mut b, (id, position, row)| {
                    b.push_bind(id)
                        .push_bind(row.supplier_id)
                        .push_bind(position)
                        .push_bind(row.quantity)
                        .push_bind(row.price.clone());
                },
            );
            qb.build().persistent(false).execute(&mut *tx).await?;
        }
        tx.commit().await.context("committing offer write")?;
        Ok(())
    }

    #[instrument(skip(self, states), fields(products = states.len()))]
    async fn write_stock_status(&self, states: &BTreeMap<i64, StockState>) -> Result<()> {
        if states.is_empty() {
            return Ok(());
        }
        let mut qb: QueryBuilder<'_, sqlx::Postgres> = QueryBuilder::new(
            "UPDATE products AS p SET stock_status = v.status,
                 best_offer_quantity = v.best_quantity,
                 best_offer_price = v.best_price,
                 updated_at = now()
             FROM (",
        );
        qb.push_values(states.iter(), |mut b, (id, state)| {
            b.push_bind(*id)
                .push_bind(state.status.as_str())
                .push_bind(state.best_offer.as_ref().map(|o| o.quantity))
                .push_bind(state.best_offer.as_ref().map(|o| o.price.clone()));
        });
        qb.push(") AS v(id, status, best_quantity, best_price) WHERE p.id = v.id");
        qb.build()
            .persistent(false)
            .execute(&self.db.pool)
            .await
            .context("writing stock status")?;
        Ok(())
    }

    #[instrument(skip(self, fields), fields(products = fields.len()))]
    async fn write_extra_fields(
        &self,
        fields: &BTreeMap<i64, BTreeMap<String, String>>,
    ) -> Result<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut tx = self.db.pool.begin().await.context("begin attribute write")?;
        for (id, patch) in fields {
            let value = serde_json::to_value(patch).context("encoding extra fields")?;
            sqlx::query(
                "UPDATE products
                 SET attributes = COALESCE(attributes, '{}'::jsonb) || $2, updated_at = now()
                 WHERE id = $1",
            )
            .bind(*id)
            .bind(value)
            .persistent(false)
            .execute(&mut *tx)
            .await
            .context("merging extra fields")?;
        }
        tx.commit().await.context("committing attribute write")?;
        Ok(())
    }
}

#[async_trait]
impl CoefficientSource for PgCatalogStore {
    #[instrument(skip(self))]
    async fn list_all(&self) -> Result<Vec<Coefficient>> {
        let rows: Vec<(String, Option<String>, Option<String>, BigDecimal)> = sqlx::query_as(
            "SELECT supplier, product_type, brand, multiplier FROM price_coefficients ORDER BY id",
        )
        .persistent(false)
        .fetch_all(&self.db.pool)
        .await
        .context("loading coefficient table")?;

        Ok(rows
            .into_iter()
            .map(|(supplier, product_type, brand, multiplier)| Coefficient {
                supplier,
                // legacy rows used '' for the wildcard
                product_type: product_type.filter(|v| !v.trim().is_empty()),
                brand: brand.filter(|v| !v.trim().is_empty()),
                multiplier,
            })
            .collect())
    }
}
