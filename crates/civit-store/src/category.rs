use std::future::Future;
use std::str::FromStr;

use crate::Store;
use crate::dao::{CategoryCount, CategoryKind, CategoryRecord};

pub trait CategoryStore: Send + Sync + 'static {
    /// Replace every category of `model_id` in one transaction.
    fn replace_categories(
        &self,
        model_id: i64,
        categories: &[(CategoryKind, String)],
    ) -> impl Future<Output = Result<(), sqlx::Error>> + Send;
    fn list_categories(
        &self,
        model_id: i64,
    ) -> impl Future<Output = Result<Vec<CategoryRecord>, sqlx::Error>> + Send;
    /// Model count per category, largest first.
    fn category_counts(
        &self,
        kind: Option<CategoryKind>,
    ) -> impl Future<Output = Result<Vec<CategoryCount>, sqlx::Error>> + Send;
    fn models_in_category(
        &self,
        kind: CategoryKind,
        name: &str,
    ) -> impl Future<Output = Result<Vec<i64>, sqlx::Error>> + Send;
}

fn parse_kind(raw: &str) -> Option<CategoryKind> {
    CategoryKind::from_str(raw)
        .map_err(|e| tracing::warn!(raw = %raw, error = %e, "unknown category kind; skipping row"))
        .ok()
}

impl CategoryStore for Store {
    async fn replace_categories(
        &self,
        model_id: i64,
        categories: &[(CategoryKind, String)],
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM categories WHERE model_id = ?1")
            .bind(model_id)
            .execute(&mut *tx)
            .await?;
        for (kind, name) in categories {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            sqlx::query("INSERT OR IGNORE INTO categories (model_id, kind, name) VALUES (?1, ?2, ?3)")
                .bind(model_id)
                .bind(kind.as_str())
                .bind(name)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn list_categories(&self, model_id: i64) -> Result<Vec<CategoryRecord>, sqlx::Error> {
        let rows: Vec<(i64, String, String)> = sqlx::query_as(
            "SELECT model_id, kind, name FROM categories WHERE model_id = ?1 ORDER BY kind, name",
        )
        .bind(model_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .filter_map(|(model_id, kind, name)| {
                parse_kind(&kind).map(|kind| CategoryRecord { model_id, kind, name })
            })
            .collect())
    }

    async fn category_counts(&self, kind: Option<CategoryKind>) -> Result<Vec<CategoryCount>, sqlx::Error> {
        let rows: Vec<(String, String, i64)> = sqlx::query_as(
            "SELECT kind, name, COUNT(*) AS n FROM categories WHERE (?1 IS NULL OR kind = ?1) \
             GROUP BY kind, name ORDER BY n DESC, kind, name",
        )
        .bind(kind.map(CategoryKind::as_str))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .filter_map(|(kind, name, count)| parse_kind(&kind).map(|kind| CategoryCount { kind, name, count }))
            .collect())
    }

    async fn models_in_category(&self, kind: CategoryKind, name: &str) -> Result<Vec<i64>, sqlx::Error> {
        let rows: Vec<(i64,)> = sqlx::query_as(
            "SELECT model_id FROM categories WHERE kind = ?1 AND name = ?2 ORDER BY model_id",
        )
        .bind(kind.as_str())
        .bind(name)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ModelStore;
    use crate::testing::{memory_store, sample};

    fn cats(items: &[(CategoryKind, &str)]) -> Vec<(CategoryKind, String)> {
        items.iter().map(|(k, n)| (*k, (*n).to_owned())).collect()
    }

    #[tokio::test]
    async fn replace_and_count() {
        let store = memory_store().await;
        store.upsert_model(sample(1, "a", "LORA", 1)).await.unwrap();
        store.upsert_model(sample(2, "b", "LORA", 1)).await.unwrap();

        store
            .replace_categories(
                1,
                &cats(&[
                    (CategoryKind::Type, "lora"),
                    (CategoryKind::BaseModel, "sdxl"),
                    (CategoryKind::Tag, "anime"),
                    (CategoryKind::Tag, "anime"),
                    (CategoryKind::Tag, "  "),
                ]),
            )
            .await
            .unwrap();
        store
            .replace_categories(2, &cats(&[(CategoryKind::Type, "lora"), (CategoryKind::Tag, "style")]))
            .await
            .unwrap();

        assert_eq!(store.list_categories(1).await.unwrap().len(), 3);

        let types = store.category_counts(Some(CategoryKind::Type)).await.unwrap();
        assert_eq!(types, vec![CategoryCount { kind: CategoryKind::Type, name: "lora".into(), count: 2 }]);
        assert_eq!(store.category_counts(None).await.unwrap()[0].count, 2);
        assert_eq!(store.models_in_category(CategoryKind::Tag, "anime").await.unwrap(), vec![1]);

        // Replacing drops the old set.
        store
            .replace_categories(1, &cats(&[(CategoryKind::Tag, "style")]))
            .await
            .unwrap();
        assert_eq!(store.models_in_category(CategoryKind::Tag, "style").await.unwrap(), vec![1, 2]);
        assert!(store.models_in_category(CategoryKind::Tag, "anime").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn deleting_a_model_drops_its_categories() {
        let store = memory_store().await;
        store.upsert_model(sample(9, "gone", "Checkpoint", 1)).await.unwrap();
        store
            .replace_categories(9, &cats(&[(CategoryKind::Type, "checkpoint")]))
            .await
            .unwrap();
        store.delete_model(9).await.unwrap();
        assert!(store.list_categories(9).await.unwrap().is_empty());
    }
}
