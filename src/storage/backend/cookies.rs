use chrono::{DateTime, Utc};
use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, sea_query::Expr};
use tracing::debug;

use super::SeaOrmStorage;
use super::converters::model_to_cookie;
use crate::errors::Result;
use crate::storage::models::TrackingCookie;

use migration::entities::tracking_cookie;

/// Cookie 消费的 compare-and-set：只有未转化且未过期的 Cookie 会被标记
pub(super) async fn consume_cookie<C: ConnectionTrait>(
    conn: &C,
    cookie_value: &str,
    now: DateTime<Utc>,
) -> std::result::Result<bool, DbErr> {
    let result = tracking_cookie::Entity::update_many()
        .col_expr(tracking_cookie::Column::ConvertedAt, Expr::value(Some(now)))
        .filter(tracking_cookie::Column::CookieValue.eq(cookie_value))
        .filter(tracking_cookie::Column::ConvertedAt.is_null())
        .filter(tracking_cookie::Column::ExpiresAt.gt(now))
        .exec(conn)
        .await?;

    Ok(result.rows_affected == 1)
}

impl SeaOrmStorage {
    pub async fn find_cookie(&self, cookie_value: &str) -> Result<Option<TrackingCookie>> {
        let db = &self.db;
        let model = self
            .retry
            .run("find_cookie", || async {
                tracking_cookie::Entity::find_by_id(cookie_value.to_string())
                    .one(db)
                    .await
            })
            .await?;
        Ok(model.map(model_to_cookie))
    }

    /// 删除 cutoff 之前已过期的 Cookie（已转化的也一并删除，转化记录保留 click_id）
    pub async fn purge_cookies_expired_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let db = &self.db;
        let deleted = self
            .retry
            .run("purge_cookies", || async {
                tracking_cookie::Entity::delete_many()
                    .filter(tracking_cookie::Column::ExpiresAt.lt(cutoff))
                    .exec(db)
                    .await
            })
            .await?
            .rows_affected;

        debug!("Purged {} expired tracking cookies", deleted);
        Ok(deleted)
    }
}
