use std::future::Future;

use crate::dao::{ModelFilter, ModelRecord};
use crate::{Store, parse_rfc3339_or_now};

pub trait ModelStore: Send + Sync + 'static {
    /// Insert or refresh a model. `first_seen_at` of an existing row is kept.
    fn upsert_model(&self, record: ModelRecord) -> impl Future<Output = Result<(), sqlx::Error>> + Send;
    fn get_model(&self, id: i64) -> impl Future<Output = Result<Option<ModelRecord>, sqlx::Error>> + Send;
    fn list_models(
        &self,
        filter: &ModelFilter,
    ) -> impl Future<Output = Result<Vec<ModelRecord>, sqlx::Error>> + Send;
    /// Case-insensitive substring match on the model name.
    fn search_models(
        &self,
        name: &str,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<ModelRecord>, sqlx::Error>> + Send;
    fn count_models(&self) -> impl Future<Output = Result<i64, sqlx::Error>> + Send;
    /// Returns whether a row was removed.
    fn delete_model(&self, id: i64) -> impl Future<Output = Result<bool, sqlx::Error>> + Send;
}

const MODEL_COLUMNS: &str = "id, name, model_type, nsfw, tags, creator, allow_no_credit, allow_commercial_use, \
     allow_derivatives, allow_different_license, download_count, favorite_count, comment_count, rating_count, \
     rating, thumbs_up_count, base_model, latest_version_id, raw_json, first_seen_at, last_seen_at";

#[derive(sqlx::FromRow)]
struct ModelRow {
    id: i64,
    name: String,
    model_type: String,
    nsfw: bool,
    tags: String,
    creator: Option<String>,
    allow_no_credit: bool,
    allow_commercial_use: String,
    allow_derivatives: bool,
    allow_different_license: bool,
    download_count: i64,
    favorite_count: i64,
    comment_count: i64,
    rating_count: i64,
    rating: f64,
    thumbs_up_count: i64,
    base_model: Option<String>,
    latest_version_id: Option<i64>,
    raw_json: String,
    first_seen_at: String,
    last_seen_at: String,
}

/// Escape `LIKE` wildcards so user text matches literally (with `ESCAPE '\'`).
fn escape_like(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn decode_list(raw: &str, field: &'static str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_else(|e| {
        tracing::warn!(raw = %raw, error = %e, field, "failed to decode list column; using empty");
        Vec::new()
    })
}

fn encode_list(values: &[String]) -> String {
    serde_json::to_string(values).unwrap_or_else(|_| "[]".to_owned())
}

impl From<ModelRow> for ModelRecord {
    fn from(row: ModelRow) -> Self {
        ModelRecord {
            id: row.id,
            name: row.name,
            model_type: row.model_type,
            nsfw: row.nsfw,
            tags: decode_list(&row.tags, "tags"),
            creator: row.creator,
            allow_no_credit: row.allow_no_credit,
            allow_commercial_use: decode_list(&row.allow_commercial_use, "allow_commercial_use"),
            allow_derivatives: row.allow_derivatives,
            allow_different_license: row.allow_different_license,
            download_count: row.download_count,
            favorite_count: row.favorite_count,
            comment_count: row.comment_count,
            rating_count: row.rating_count,
            rating: row.rating,
            thumbs_up_count: row.thumbs_up_count,
            base_model: row.base_model,
            latest_version_id: row.latest_version_id,
            raw_json: row.raw_json,
            first_seen_at: parse_rfc3339_or_now(&row.first_seen_at, "first_seen_at"),
            last_seen_at: parse_rfc3339_or_now(&row.last_seen_at, "last_seen_at"),
        }
    }
}

impl ModelStore for Store {
    async fn upsert_model(&self, record: ModelRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO models \
             (id, name, model_type, nsfw, tags, creator, allow_no_credit, allow_commercial_use, \
              allow_derivatives, allow_different_license, download_count, favorite_count, comment_count, \
              rating_count, rating, thumbs_up_count, base_model, latest_version_id, raw_json, \
              first_seen_at, last_seen_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21) \
             ON CONFLICT(id) DO UPDATE SET \
               name = excluded.name, model_type = excluded.model_type, nsfw = excluded.nsfw, \
               tags = excluded.tags, creator = excluded.creator, allow_no_credit = excluded.allow_no_credit, \
               allow_commercial_use = excluded.allow_commercial_use, \
               allow_derivatives = excluded.allow_derivatives, \
               allow_different_license = excluded.allow_different_license, \
               download_count = excluded.download_count, favorite_count = excluded.favorite_count, \
               comment_count = excluded.comment_count, rating_count = excluded.rating_count, \
               rating = excluded.rating, thumbs_up_count = excluded.thumbs_up_count, \
               base_model = excluded.base_model, latest_version_id = excluded.latest_version_id, \
               raw_json = excluded.raw_json, last_seen_at = excluded.last_seen_at",
        )
        .bind(record.id)
        .bind(&record.name)
        .bind(&record.model_type)
        .bind(record.nsfw)
        .bind(encode_list(&record.tags))
        .bind(&record.creator)
        .bind(record.allow_no_credit)
        .bind(encode_list(&record.allow_commercial_use))
        .bind(record.allow_derivatives)
        .bind(record.allow_different_license)
        .bind(record.download_count)
        .bind(record.favorite_count)
        .bind(record.comment_count)
        .bind(record.rating_count)
        .bind(record.rating)
        .bind(record.thumbs_up_count)
        .bind(&record.base_model)
        .bind(record.latest_version_id)
        .bind(&record.raw_json)
        .bind(record.first_seen_at.to_rfc3339())
        .bind(record.last_seen_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_model(&self, id: i64) -> Result<Option<ModelRecord>, sqlx::Error> {
        let row: Option<ModelRow> = sqlx::query_as(&format!("SELECT {MODEL_COLUMNS} FROM models WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(ModelRecord::from))
    }

    async fn list_models(&self, filter: &ModelFilter) -> Result<Vec<ModelRecord>, sqlx::Error> {
        let limit = filter.limit.map(i64::from).unwrap_or(-1);
        let rows: Vec<ModelRow> = sqlx::query_as(&format!(
            "SELECT {MODEL_COLUMNS} FROM models \
             WHERE (?1 IS NULL OR model_type = ?1 COLLATE NOCASE) \
               AND (?2 IS NULL OR base_model = ?2 COLLATE NOCASE) \
               AND (?3 IS NULL OR creator = ?3 COLLATE NOCASE) \
               AND (?4 IS NULL OR nsfw = ?4) \
             ORDER BY download_count DESC, id ASC LIMIT ?5"
        ))
        .bind(&filter.model_type)
        .bind(&filter.base_model)
        .bind(&filter.creator)
        .bind(filter.nsfw)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ModelRecord::from).collect())
    }

    async fn search_models(&self, name: &str, limit: u32) -> Result<Vec<ModelRecord>, sqlx::Error> {
        let pattern = format!("%{}%", escape_like(name.trim()));
        let rows: Vec<ModelRow> = sqlx::query_as(&format!(
            "SELECT {MODEL_COLUMNS} FROM models WHERE name LIKE ?1 ESCAPE '\\' \
             ORDER BY download_count DESC, id ASC LIMIT ?2"
        ))
        .bind(&pattern)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ModelRecord::from).collect())
    }

    async fn count_models(&self) -> Result<i64, sqlx::Error> {
        let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM models")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    async fn delete_model(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM models WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{memory_store, sample};
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn search_treats_wildcards_literally() {
        let store = memory_store().await;
        store.upsert_model(sample(1, "100% Real", "LORA", 5)).await.unwrap();
        store.upsert_model(sample(2, "100 Real", "LORA", 50)).await.unwrap();
        store.upsert_model(sample(3, "snake_case", "LORA", 5)).await.unwrap();
        store.upsert_model(sample(4, "snakeXcase", "LORA", 50)).await.unwrap();

        let hits = store.search_models("100%", 10).await.unwrap();
        assert_eq!(hits.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1]);
        let hits = store.search_models("e_c", 10).await.unwrap();
        assert_eq!(hits.iter().map(|r| r.id).collect::<Vec<_>>(), vec![3]);
        assert_eq!(store.search_models("real", 10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn upsert_roundtrip_and_first_seen_is_kept() {
        let store = memory_store().await;
        let mut rec = sample(1, "Detail Tweaker", "LORA", 10);
        let first_seen = Utc::now() - Duration::days(3);
        rec.first_seen_at = first_seen;
        store.upsert_model(rec.clone()).await.unwrap();

        let got = store.get_model(1).await.unwrap().unwrap();
        assert_eq!(got.name, "Detail Tweaker");
        assert_eq!(got.tags, vec!["anime", "style"]);
        assert_eq!(got.creator.as_deref(), Some("alice"));
        assert_eq!(got.base_model.as_deref(), Some("SDXL 1.0"));
        assert_eq!(got.latest_version_id, Some(10));
        assert_eq!(got.model().unwrap().id, 1);

        let mut newer = sample(1, "Detail Tweaker XL", "LORA", 20);
        newer.first_seen_at = Utc::now();
        store.upsert_model(newer).await.unwrap();
        let got = store.get_model(1).await.unwrap().unwrap();
        assert_eq!(got.name, "Detail Tweaker XL");
        assert_eq!(got.download_count, 20);
        assert_eq!(got.first_seen_at.timestamp(), first_seen.timestamp());
        assert_eq!(store.count_models().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn list_filters_and_orders_by_downloads() {
        let store = memory_store().await;
        store.upsert_model(sample(1, "a", "LORA", 5)).await.unwrap();
        store.upsert_model(sample(2, "b", "Checkpoint", 50)).await.unwrap();
        store.upsert_model(sample(3, "c", "LORA", 500)).await.unwrap();

        let all = store.list_models(&ModelFilter::default()).await.unwrap();
        assert_eq!(all.iter().map(|m| m.id).collect::<Vec<_>>(), vec![3, 2, 1]);

        let loras = store
            .list_models(&ModelFilter { model_type: Some("lora".into()), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(loras.iter().map(|m| m.id).collect::<Vec<_>>(), vec![3, 1]);

        let limited = store
            .list_models(&ModelFilter { limit: Some(1), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);

        let none = store
            .list_models(&ModelFilter { nsfw: Some(true), ..Default::default() })
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn search_and_delete() {
        let store = memory_store().await;
        store.upsert_model(sample(1, "Pony Realism", "Checkpoint", 1)).await.unwrap();
        store.upsert_model(sample(2, "Anime Lineart", "LORA", 1)).await.unwrap();

        let hits = store.search_models("pony", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, 1);

        assert!(store.delete_model(1).await.unwrap());
        assert!(!store.delete_model(1).await.unwrap());
        assert!(store.get_model(1).await.unwrap().is_none());
    }
}
