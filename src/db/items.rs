use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{clamp_limit, ItemStore};
use crate::error::AppResult;
use crate::models::{Item, ItemFilter, ItemRow, ItemStatus, ItemType, NewItem, StatusChange};

const ITEM_COLUMNS: &str = "id, name, description, location, college, contact, item_type, \
     reporter_email, image_url, ai_category, identifier_hash, identifier_token, status, \
     feedback, police_case_id, verified_at, created_at, updated_at";

pub struct PgItemStore {
    pool: PgPool,
}

impl PgItemStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn into_items(rows: Vec<ItemRow>) -> AppResult<Vec<Item>> {
        rows.into_iter().map(Item::try_from).collect()
    }
}

#[tonic::async_trait]
impl ItemStore for PgItemStore {
    async fn insert(&self, item: NewItem) -> AppResult<Item> {
        let sql = format!(
            "INSERT INTO items (id, name, description, location, college, contact, item_type, \
             reporter_email, image_url, ai_category, identifier_hash, identifier_token, status, \
             created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, 'active', $13, $13) \
             RETURNING {}",
            ITEM_COLUMNS
        );

        let row: ItemRow = sqlx::query_as(&sql)
            .bind(Uuid::new_v4())
            .bind(&item.name)
            .bind(&item.description)
            .bind(&item.location)
            .bind(&item.college)
            .bind(&item.contact)
            .bind(item.item_type.as_str())
            .bind(&item.reporter_email)
            .bind(&item.image_url)
            .bind(&item.ai_category)
            .bind(&item.identifier_hash)
            .bind(&item.identifier_token)
            .bind(item.created_at)
            .fetch_one(&self.pool)
            .await?;

        Item::try_from(row)
    }

    async fn get(&self, id: Uuid) -> AppResult<Option<Item>> {
        let sql = format!("SELECT {} FROM items WHERE id = $1", ITEM_COLUMNS);
        let row: Option<ItemRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Item::try_from).transpose()
    }

    async fn list(&self, filter: &ItemFilter) -> AppResult<Vec<Item>> {
        // Build dynamic WHERE clause
        let mut conditions = Vec::new();
        let mut param_idx = 1u32;

        if filter.item_type.is_some() {
            conditions.push(format!("item_type = ${}", param_idx));
            param_idx += 1;
        }
        if filter.status.is_some() {
            conditions.push(format!("status = ${}", param_idx));
            param_idx += 1;
        }
        if filter.college.is_some() {
            conditions.push(format!("college = ${}", param_idx));
            param_idx += 1;
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let sql = format!(
            "SELECT {} FROM items {} ORDER BY created_at DESC LIMIT ${}",
            ITEM_COLUMNS, where_clause, param_idx
        );

        let mut query = sqlx::query_as::<_, ItemRow>(&sql);
        if let Some(item_type) = filter.item_type {
            query = query.bind(item_type.as_str());
        }
        if let Some(status) = filter.status {
            query = query.bind(status.as_str());
        }
        if let Some(ref college) = filter.college {
            query = query.bind(college);
        }

        let rows = query
            .bind(clamp_limit(filter.limit))
            .fetch_all(&self.pool)
            .await?;

        Self::into_items(rows)
    }

    async fn match_candidates(
        &self,
        item_type: ItemType,
        college: &str,
        token: Option<&str>,
        limit: i64,
    ) -> AppResult<Vec<Item>> {
        let sql = format!(
            "SELECT {} FROM items \
             WHERE item_type = $1 AND status = 'active' AND college = $2 \
               AND identifier_hash IS NOT NULL \
               AND ($3::text IS NULL OR identifier_token IS NULL OR identifier_token = $3) \
             ORDER BY created_at DESC LIMIT $4",
            ITEM_COLUMNS
        );

        let rows: Vec<ItemRow> = sqlx::query_as(&sql)
            .bind(item_type.as_str())
            .bind(college)
            .bind(token)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Self::into_items(rows)
    }

    async fn escalation_pool(
        &self,
        created_before: DateTime<Utc>,
        college: Option<&str>,
    ) -> AppResult<Vec<Item>> {
        let sql = format!(
            "SELECT {} FROM items \
             WHERE ((item_type = 'lost' AND status = 'active' AND created_at <= $1) \
                    OR status = 'escalated') \
               AND ($2::text IS NULL OR college = $2) \
             ORDER BY created_at ASC",
            ITEM_COLUMNS
        );

        let rows: Vec<ItemRow> = sqlx::query_as(&sql)
            .bind(created_before)
            .bind(college)
            .fetch_all(&self.pool)
            .await?;

        Self::into_items(rows)
    }

    async fn compare_and_set_status(
        &self,
        id: Uuid,
        expected: ItemStatus,
        change: &StatusChange,
    ) -> AppResult<Option<Item>> {
        let sql = format!(
            "UPDATE items SET status = $1, \
             feedback = COALESCE($2, feedback), \
             police_case_id = COALESCE($3, police_case_id), \
             verified_at = COALESCE($4, verified_at), \
             updated_at = NOW() \
             WHERE id = $5 AND status = $6 \
             RETURNING {}",
            ITEM_COLUMNS
        );

        let (case_id, verified_at) = match &change.police_case {
            Some(case) => (Some(case.case_id.as_str()), Some(case.verified_at)),
            None => (None, None),
        };

        let row: Option<ItemRow> = sqlx::query_as(&sql)
            .bind(change.status.as_str())
            .bind(&change.feedback)
            .bind(case_id)
            .bind(verified_at)
            .bind(id)
            .bind(expected.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Item::try_from).transpose()
    }

    async fn case_id_exists(&self, case_id: &str) -> AppResult<bool> {
        let result: Option<(i32,)> =
            sqlx::query_as("SELECT 1 FROM items WHERE police_case_id = $1 LIMIT 1")
                .bind(case_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(result.is_some())
    }

    async fn delete(&self, id: Uuid) -> AppResult<bool> {
        let rows_affected = sqlx::query("DELETE FROM items WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(rows_affected > 0)
    }

    async fn delete_created_before(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<Item>> {
        let sql = format!(
            "DELETE FROM items WHERE created_at < $1 RETURNING {}",
            ITEM_COLUMNS
        );
        let rows: Vec<ItemRow> = sqlx::query_as(&sql)
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await?;

        Self::into_items(rows)
    }
}
