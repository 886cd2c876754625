// Postgres 文档集合
// 所有集合共用一张 documents 表，文档整体存放在 JSONB 列中

use std::marker::PhantomData;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{Collection, DocQuery, Document, SearchField, Sort, StoreError};

pub struct PgCollection<D> {
    pool: PgPool,
    _marker: PhantomData<fn() -> D>,
}

impl<D: Document> PgCollection<D> {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            _marker: PhantomData,
        }
    }

    fn push_conditions(builder: &mut QueryBuilder<'_, Postgres>, query: &DocQuery) {
        builder.push(" WHERE collection = ").push_bind(D::COLLECTION);

        if query.active_only {
            builder.push(" AND active");
        }

        if let Some(filter) = &query.filter {
            builder.push(" AND body @> ").push_bind(Json(filter.clone()));
        }

        if let Some(search) = query.search.as_ref().filter(|s| !s.fields.is_empty()) {
            let pattern = like_pattern(&search.term);
            builder.push(" AND (");
            for (index, field) in search.fields.iter().enumerate() {
                if index > 0 {
                    builder.push(" OR ");
                }
                match field {
                    SearchField::Text(name) => {
                        builder
                            .push("body ->> ")
                            .push_bind(*name)
                            .push(" ILIKE ")
                            .push_bind(pattern.clone());
                    }
                    SearchField::TextArray(name) => {
                        builder
                            .push("EXISTS (SELECT 1 FROM jsonb_array_elements_text(COALESCE(body -> ")
                            .push_bind(*name)
                            .push(", '[]'::jsonb)) AS item WHERE item ILIKE ")
                            .push_bind(pattern.clone())
                            .push(")");
                    }
                }
            }
            builder.push(")");
        }
    }

    fn push_order(builder: &mut QueryBuilder<'_, Postgres>, sort: Sort) {
        match sort {
            Sort::Newest => {
                builder.push(" ORDER BY created_at DESC, id");
            }
            Sort::Oldest => {
                builder.push(" ORDER BY created_at ASC, id");
            }
            Sort::FieldDesc(path) => {
                let path: Vec<String> = path.iter().map(|segment| segment.to_string()).collect();
                builder
                    .push(" ORDER BY (body #>> ")
                    .push_bind(path)
                    .push(")::bigint DESC NULLS LAST, created_at DESC, id");
            }
        }
    }
}

#[async_trait]
impl<D: Document> Collection<D> for PgCollection<D> {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<D>, StoreError> {
        let body = sqlx::query_scalar::<_, Json<D>>(
            "SELECT body FROM documents WHERE collection = $1 AND id = $2",
        )
        .bind(D::COLLECTION)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(body.map(|Json(doc)| doc))
    }

    async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<D>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let bodies = sqlx::query_scalar::<_, Json<D>>(
            "SELECT body FROM documents WHERE collection = $1 AND id = ANY($2) ORDER BY created_at DESC",
        )
        .bind(D::COLLECTION)
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(bodies.into_iter().map(|Json(doc)| doc).collect())
    }

    async fn find(&self, query: &DocQuery) -> Result<Vec<D>, StoreError> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT body FROM documents");
        Self::push_conditions(&mut builder, query);
        Self::push_order(&mut builder, query.sort);
        if let Some(limit) = query.limit {
            builder
                .push(" LIMIT ")
                .push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
        }
        if query.skip > 0 {
            builder
                .push(" OFFSET ")
                .push_bind(i64::try_from(query.skip).unwrap_or(i64::MAX));
        }

        let bodies = builder
            .build_query_scalar::<Json<D>>()
            .fetch_all(&self.pool)
            .await?;

        Ok(bodies.into_iter().map(|Json(doc)| doc).collect())
    }

    async fn count(&self, query: &DocQuery) -> Result<u64, StoreError> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM documents");
        Self::push_conditions(&mut builder, query);

        let total: i64 = builder
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        Ok(u64::try_from(total).unwrap_or_default())
    }

    async fn insert(&self, doc: &D) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO documents (collection, id, active, body, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            "#,
        )
        .bind(D::COLLECTION)
        .bind(doc.id())
        .bind(doc.is_active())
        .bind(Json(doc))
        .bind(doc.created_at())
        .execute(&self.pool)
        .await
        .map_err(write_error::<D>)?;

        tracing::debug!("Inserted {} document {}", D::COLLECTION, doc.id());
        Ok(())
    }

    async fn replace(&self, doc: &D) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE documents
            SET active = $3, body = $4, updated_at = NOW()
            WHERE collection = $1 AND id = $2
            "#,
        )
        .bind(D::COLLECTION)
        .bind(doc.id())
        .bind(doc.is_active())
        .bind(Json(doc))
        .execute(&self.pool)
        .await
        .map_err(write_error::<D>)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Missing {
                collection: D::COLLECTION,
                id: doc.id(),
            });
        }
        Ok(())
    }

    async fn deactivate_matching(&self, filter: &Value) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE documents
            SET active = FALSE,
                body = jsonb_set(body, '{isActive}', 'false'::jsonb),
                updated_at = NOW()
            WHERE collection = $1 AND active AND body @> $2
            "#,
        )
        .bind(D::COLLECTION)
        .bind(Json(filter))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

/// 唯一约束冲突转换为 `StoreError::Duplicate`
fn write_error<D: Document>(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            let constraint = db_err.constraint().unwrap_or_default();
            let field = D::UNIQUE_FIELDS
                .iter()
                .find(|field| constraint.contains(*field))
                .copied()
                .unwrap_or("id");
            return StoreError::Duplicate(field.to_string());
        }
    }
    StoreError::Database(err)
}

/// 转义 LIKE 通配符后包成子串匹配模式
fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}
