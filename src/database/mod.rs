// 数据库模块
// 所有实体都以 JSON 文档的形式存放，`Collection` 抽象出文档的读写，
// 生产环境使用 Postgres (JSONB)，测试和本地演示使用内存实现

pub mod documents;
pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Group, Post, User};

pub use memory::MemoryCollection;
pub use postgres::PgCollection;

/// 可存入集合的文档
pub trait Document: Serialize + DeserializeOwned + Clone + Send + Sync + Unpin + 'static {
    /// 集合名称
    const COLLECTION: &'static str;
    /// 需要全局唯一的顶层字段
    const UNIQUE_FIELDS: &'static [&'static str] = &[];

    fn id(&self) -> Uuid;
    fn is_active(&self) -> bool;
    fn created_at(&self) -> DateTime<Utc>;

    /// 保存前的钩子：重新计算派生字段并刷新更新时间
    fn before_save(&mut self);
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("duplicate value for {0}")]
    Duplicate(String),
    #[error("{collection} document {id} does not exist")]
    Missing { collection: &'static str, id: Uuid },
}

/// 排序方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Sort {
    #[default]
    Newest,
    Oldest,
    /// 按 JSON 路径上的数值降序，相同时按创建时间降序
    FieldDesc(&'static [&'static str]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchField {
    Text(&'static str),
    TextArray(&'static str),
}

/// 不区分大小写的子串搜索，任一字段命中即可
#[derive(Debug, Clone, PartialEq)]
pub struct TextSearch {
    pub term: String,
    pub fields: Vec<SearchField>,
}

/// 文档查询条件
#[derive(Debug, Clone, Default)]
pub struct DocQuery {
    /// JSON 包含过滤，语义同 Postgres 的 `@>`
    pub filter: Option<Value>,
    pub active_only: bool,
    pub search: Option<TextSearch>,
    pub sort: Sort,
    pub skip: u64,
    pub limit: Option<u64>,
}

impl DocQuery {
    pub fn active() -> Self {
        Self {
            active_only: true,
            ..Self::default()
        }
    }

    pub fn filter(mut self, filter: Value) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn search(mut self, term: Option<String>, fields: &[SearchField]) -> Self {
        self.search = term.map(|term| TextSearch {
            term,
            fields: fields.to_vec(),
        });
        self
    }

    pub fn sort(mut self, sort: Sort) -> Self {
        self.sort = sort;
        self
    }

    pub fn page(mut self, skip: u64, limit: u32) -> Self {
        self.skip = skip;
        self.limit = Some(u64::from(limit));
        self
    }
}

/// 文档集合
#[async_trait]
pub trait Collection<D: Document>: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<D>, StoreError>;

    async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<D>, StoreError>;

    async fn find(&self, query: &DocQuery) -> Result<Vec<D>, StoreError>;

    /// 统计满足条件的文档数，忽略分页参数
    async fn count(&self, query: &DocQuery) -> Result<u64, StoreError>;

    async fn insert(&self, doc: &D) -> Result<(), StoreError>;

    async fn replace(&self, doc: &D) -> Result<(), StoreError>;

    /// 批量停用匹配的文档，返回受影响的数量
    async fn deactivate_matching(&self, filter: &Value) -> Result<u64, StoreError>;

    async fn find_active(&self, id: Uuid) -> Result<Option<D>, StoreError> {
        Ok(self.find_by_id(id).await?.filter(|doc| doc.is_active()))
    }

    async fn create(&self, doc: &mut D) -> Result<(), StoreError> {
        doc.before_save();
        self.insert(doc).await
    }

    async fn save(&self, doc: &mut D) -> Result<(), StoreError> {
        doc.before_save();
        self.replace(doc).await
    }
}

/// 应用使用的全部集合
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn Collection<User>>,
    pub groups: Arc<dyn Collection<Group>>,
    pub posts: Arc<dyn Collection<Post>>,
}

impl Stores {
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            users: Arc::new(PgCollection::new(pool.clone())),
            groups: Arc::new(PgCollection::new(pool.clone())),
            posts: Arc::new(PgCollection::new(pool)),
        }
    }

    pub fn memory() -> Self {
        Self {
            users: Arc::new(MemoryCollection::default()),
            groups: Arc::new(MemoryCollection::default()),
            posts: Arc::new(MemoryCollection::default()),
        }
    }
}
