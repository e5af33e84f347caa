//! # Category Repository
//!
//! Product categories ("Pain Relief", "Vitamins", ...).

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use apothecary_core::validation::validate_category_name;
use apothecary_core::Category;

/// Repository for category database operations.
#[derive(Debug, Clone)]
pub struct CategoryRepository {
    pool: SqlitePool,
}

impl CategoryRepository {
    /// Creates a new CategoryRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CategoryRepository { pool }
    }

    /// Creates a category. Names are unique.
    pub async fn create(&self, name: &str) -> DbResult<Category> {
        validate_category_name(name)?;

        let category = Category {
            id: Uuid::new_v4().to_string(),
            name: name.trim().to_string(),
            created_at: Utc::now(),
        };

        debug!(name = %category.name, "Inserting category");

        sqlx::query("INSERT INTO categories (id, name, created_at) VALUES (?1, ?2, ?3)")
            .bind(&category.id)
            .bind(&category.name)
            .bind(category.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| match DbError::from(e) {
                DbError::UniqueViolation { field, .. } => DbError::duplicate(field, &category.name),
                other => other,
            })?;

        Ok(category)
    }

    /// Gets a category by name (exact match).
    pub async fn get_by_name(&self, name: &str) -> DbResult<Option<Category>> {
        let category = sqlx::query_as::<_, Category>(
            "SELECT id, name, created_at FROM categories WHERE name = ?1",
        )
        .bind(name.trim())
        .fetch_optional(&self.pool)
        .await?;

        Ok(category)
    }

    /// Lists all categories by name.
    pub async fn list(&self) -> DbResult<Vec<Category>> {
        let categories =
            sqlx::query_as::<_, Category>("SELECT id, name, created_at FROM categories ORDER BY name")
                .fetch_all(&self.pool)
                .await?;

        Ok(categories)
    }

    /// Renames a category.
    pub async fn rename(&self, id: &str, name: &str) -> DbResult<()> {
        validate_category_name(name)?;

        let result = sqlx::query("UPDATE categories SET name = ?2 WHERE id = ?1")
            .bind(id)
            .bind(name.trim())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Category", id));
        }

        Ok(())
    }

    /// Deletes a category. Its products become uncategorised.
    pub async fn delete(&self, id: &str) -> DbResult<()> {
        debug!(id = %id, "Deleting category");

        let result = sqlx::query("DELETE FROM categories WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Category", id));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use apothecary_core::NewProduct;

    #[tokio::test]
    async fn test_category_lifecycle() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let vitamins = db.categories().create("Vitamins").await.unwrap();
        db.categories().create("Pain Relief").await.unwrap();

        let names: Vec<String> = db
            .categories()
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["Pain Relief", "Vitamins"]);

        assert!(matches!(
            db.categories().create("Vitamins").await,
            Err(DbError::UniqueViolation { .. })
        ));

        db.categories().rename(&vitamins.id, "Supplements").await.unwrap();
        assert!(db.categories().get_by_name("Supplements").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_uncategorises_products() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let category = db.categories().create("Vitamins").await.unwrap();
        let product = db
            .products()
            .create(&NewProduct {
                name: "Vitamin C 1000mg".to_string(),
                sku: "VC1000".to_string(),
                category_id: Some(category.id.clone()),
                base_price_minor: 18000,
                price_minor: 25000,
                stock: 200,
                expiry_date: None,
                supplier: None,
            })
            .await
            .unwrap();

        db.categories().delete(&category.id).await.unwrap();

        let product = db.products().get_by_id(&product.id).await.unwrap().unwrap();
        assert_eq!(product.category_id, None);
    }
}
