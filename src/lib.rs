use std::sync::Arc;

use config::Config;
use database::Stores;
use media::MediaStorage;
use redis::Client as RedisClient;

pub mod common;
pub mod config;
pub mod database;
pub mod error;
pub mod media;
pub mod middleware;
pub mod models;
pub mod operations;
pub mod router;
pub mod routes;
pub mod utils;

#[derive(Clone)]
pub struct AppState {
    pub stores: Stores,
    pub config: Arc<Config>,
    /// 未配置 Redis 时为空，限流随之关闭
    pub redis: Option<Arc<RedisClient>>,
    pub media: Arc<dyn MediaStorage>,
}
