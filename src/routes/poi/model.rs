use chrono::{DateTime, Utc};
use redis::{AsyncCommands, Client as RedisClient};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::utils::calculate_distance;

// 缓存相关常量
const POI_LOCATION_CACHE_PREFIX: &str = "poi:loc:"; // POI位置查询缓存前缀
const POI_CACHE_EXPIRE: u64 = 120; // 缓存过期时间，单位秒

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct Poi {
    pub poi_id: String,
    pub name: String,
    pub category: String,
    pub description: String,
    pub latitude: f64,
    pub longitude: f64,
    pub creator_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NearbyPoi {
    #[serde(flatten)]
    pub poi: Poi,
    pub distance: f64,
}

#[derive(Debug, Deserialize)]
pub struct CreatePoiRequest {
    pub name: String,
    pub category: String,
    pub description: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl Poi {
    pub async fn create(
        pool: &PgPool,
        req: CreatePoiRequest,
        creator_id: &str,
    ) -> AppResult<Self> {
        let poi_id = Uuid::new_v4().to_string();

        let poi = sqlx::query_as::<_, Poi>(
            r#"
            INSERT INTO pois (poi_id, name, category, description, latitude, longitude,
                              creator_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
            RETURNING poi_id, name, category, description, latitude, longitude,
                      creator_id, created_at
            "#,
        )
        .bind(&poi_id)
        .bind(&req.name)
        .bind(&req.category)
        .bind(&req.description)
        .bind(req.latitude)
        .bind(req.longitude)
        .bind(creator_id)
        .fetch_one(pool)
        .await?;

        Ok(poi)
    }

    pub async fn find_by_id(pool: &PgPool, poi_id: &str) -> AppResult<Option<Self>> {
        let poi = sqlx::query_as::<_, Poi>(
            r#"
            SELECT poi_id, name, category, description, latitude, longitude,
                   creator_id, created_at
            FROM pois
            WHERE poi_id = $1
            "#,
        )
        .bind(poi_id)
        .fetch_optional(pool)
        .await?;

        Ok(poi)
    }

    /// 按半径查附近的POI：先用经纬度包围盒粗筛，再精确计算距离过滤。
    /// 结果短缓存，不做失效，POI变化以分钟计时可以接受。
    pub async fn find_nearby(
        pool: &PgPool,
        redis: &Arc<RedisClient>,
        latitude: f64,
        longitude: f64,
        radius: f64,
    ) -> AppResult<Vec<NearbyPoi>> {
        // 坐标精确到小数点后两位作为缓存key
        let lat_rounded = (latitude * 100.0).round() / 100.0;
        let lon_rounded = (longitude * 100.0).round() / 100.0;
        let cache_key = format!(
            "{}{}:{}:{}",
            POI_LOCATION_CACHE_PREFIX, lat_rounded, lon_rounded, radius
        );

        if let Ok(mut conn) = redis.get_multiplexed_async_connection().await {
            let cached: redis::RedisResult<String> = conn.get(&cache_key).await;

            if let Ok(json_str) = cached {
                if let Ok(pois) = serde_json::from_str::<Vec<NearbyPoi>>(&json_str) {
                    tracing::debug!("Get nearby pois from cache: {}", cache_key);
                    return Ok(pois);
                }
            }
        }

        // 1度纬度约111km
        let lat_range = radius / 111000.0;
        let lon_range = radius / (111000.0 * latitude.to_radians().cos());

        let pois = sqlx::query_as::<_, Poi>(
            r#"
            SELECT poi_id, name, category, description, latitude, longitude,
                   creator_id, created_at
            FROM pois
            WHERE
                latitude BETWEEN ($1::DOUBLE PRECISION - $3::DOUBLE PRECISION)
                AND ($1::DOUBLE PRECISION + $3::DOUBLE PRECISION)
                AND longitude BETWEEN ($2::DOUBLE PRECISION - $4::DOUBLE PRECISION)
                AND ($2::DOUBLE PRECISION + $4::DOUBLE PRECISION)
            "#,
        )
        .bind(latitude)
        .bind(longitude)
        .bind(lat_range)
        .bind(lon_range)
        .fetch_all(pool)
        .await?;

        // 精确计算距离并过滤、排序
        let mut nearby: Vec<NearbyPoi> = pois
            .into_iter()
            .filter_map(|poi| {
                let distance =
                    calculate_distance(latitude, longitude, poi.latitude, poi.longitude);
                (distance <= radius).then_some(NearbyPoi { poi, distance })
            })
            .collect();
        nearby.sort_by(|a, b| a.distance.total_cmp(&b.distance));

        if let Ok(mut conn) = redis.get_multiplexed_async_connection().await {
            if let Ok(json_str) = serde_json::to_string(&nearby) {
                let _: Result<(), redis::RedisError> =
                    conn.set_ex(&cache_key, json_str, POI_CACHE_EXPIRE).await;
                tracing::debug!("Set nearby pois to cache: {}", cache_key);
            }
        }

        Ok(nearby)
    }

    pub async fn delete(pool: &PgPool, poi_id: &str) -> AppResult<()> {
        let removed = sqlx::query("DELETE FROM pois WHERE poi_id = $1")
            .bind(poi_id)
            .execute(pool)
            .await?
            .rows_affected();

        if removed == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }
}
