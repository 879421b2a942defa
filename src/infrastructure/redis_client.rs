// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use redis::aio::MultiplexedConnection;
use redis::RedisResult;

/// Redis客户端
///
/// 队列与任务仓库共用的连接入口。多路复用连接可廉价克隆，
/// 每次操作克隆一份即可并发使用。
#[derive(Clone)]
pub struct RedisClient {
    /// 多路复用连接
    connection: MultiplexedConnection,
    /// 键前缀
    key_prefix: String,
}

impl RedisClient {
    /// 连接 Redis 并验证可用性
    ///
    /// # 参数
    ///
    /// * `redis_url` - Redis连接URL
    /// * `key_prefix` - 所有键的前缀
    ///
    /// # 返回值
    ///
    /// * `Ok(RedisClient)` - Redis客户端实例
    /// * `Err(RedisError)` - 连接失败
    pub async fn connect(redis_url: &str, key_prefix: &str) -> RedisResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let mut connection = client.get_multiplexed_async_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut connection).await?;
        Ok(Self {
            connection,
            key_prefix: key_prefix.to_string(),
        })
    }

    /// 获取一个可独立使用的连接
    pub fn connection(&self) -> MultiplexedConnection {
        self.connection.clone()
    }

    /// 拼接带前缀的键
    pub fn key(&self, parts: &[&str]) -> String {
        let mut key = self.key_prefix.clone();
        for part in parts {
            key.push(':');
            key.push_str(part);
        }
        key
    }
}
