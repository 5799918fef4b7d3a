use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::pool::Pool;
use sqlx::postgres::Postgres;
use sqlx::QueryBuilder;
use uuid::Uuid;

use super::{CouponFilter, CouponPage, CouponQuery, CouponStore, MediaCatalog, StoreError};
use crate::types::{Coupon, CouponRow, MediaItem, MediaRow, MediaType, NewCoupon, NewMedia};

fn into_coupons(rows: Vec<CouponRow>) -> Result<Vec<Coupon>, StoreError> {
    Ok(rows
        .into_iter()
        .map(Coupon::try_from)
        .collect::<Result<Vec<_>, _>>()?)
}

fn into_media(rows: Vec<MediaRow>) -> Result<Vec<MediaItem>, StoreError> {
    Ok(rows
        .into_iter()
        .map(MediaItem::try_from)
        .collect::<Result<Vec<_>, _>>()?)
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &CouponFilter) {
    if let Some(coupon_type) = filter.coupon_type {
        builder.push(" and type = ").push_bind(coupon_type.as_str());
    }
    if let Some(redeemed) = filter.redeemed {
        builder.push(" and redeemed = ").push_bind(redeemed);
    }
    if let Some(from) = filter.created_from {
        builder.push(" and created_at >= ").push_bind(from);
    }
    if let Some(to) = filter.created_to {
        builder.push(" and created_at <= ").push_bind(to);
    }
}

pub struct PgCouponStore {
    pool: Pool<Postgres>,
}

impl PgCouponStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CouponStore for PgCouponStore {
    async fn insert_batch(&self, coupons: &[NewCoupon]) -> Result<Vec<Coupon>, StoreError> {
        let codes: Vec<String> = coupons.iter().map(|c| c.code.clone()).collect();
        let types: Vec<String> = coupons
            .iter()
            .map(|c| c.coupon_type.as_str().to_string())
            .collect();
        let expires_at: Vec<Option<DateTime<Utc>>> = coupons.iter().map(|c| c.expires_at).collect();

        // https://github.com/launchbadge/sqlx/blob/main/FAQ.md#how-can-i-bind-an-array-to-a-values-clause-how-can-i-do-bulk-inserts
        let q = "--sql
            insert into coupons (code, type, expires_at)
            select * from unnest($1::text[], $2::text[], $3::timestamptz[])
            returning *;
        ";

        let rows = sqlx::query_as::<_, CouponRow>(q)
            .bind(&codes)
            .bind(&types)
            .bind(&expires_at)
            .fetch_all(&self.pool)
            .await?;

        into_coupons(rows)
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<Coupon>, StoreError> {
        let q = "--sql
            select *
            from coupons
            where code = $1;
        ";

        let row = sqlx::query_as::<_, CouponRow>(q)
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Coupon::try_from).transpose()?)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Coupon>, StoreError> {
        let q = "--sql
            select *
            from coupons
            where id = $1;
        ";

        let row = sqlx::query_as::<_, CouponRow>(q)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Coupon::try_from).transpose()?)
    }

    async fn mark_redeemed(
        &self,
        id: Uuid,
        redeemed_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<Coupon>, StoreError> {
        let q = "--sql
            update coupons
            set redeemed = true, redeemed_at = $2, expires_at = $3
            where id = $1 and redeemed = false
            returning *;
        ";

        let row = sqlx::query_as::<_, CouponRow>(q)
            .bind(id)
            .bind(redeemed_at)
            .bind(expires_at)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Coupon::try_from).transpose()?)
    }

    async fn list(&self, query: &CouponQuery) -> Result<CouponPage, StoreError> {
        let mut count = QueryBuilder::<Postgres>::new("select count(*) from coupons where true");
        push_filters(&mut count, &query.filter);
        let total: i64 = count
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        let mut select = QueryBuilder::<Postgres>::new("select * from coupons where true");
        push_filters(&mut select, &query.filter);
        select
            .push(" order by ")
            .push(query.sort.column())
            .push(if query.ascending {
                " asc nulls last"
            } else {
                " desc nulls last"
            })
            .push(" limit ")
            .push_bind(query.limit)
            .push(" offset ")
            .push_bind(query.offset);

        let rows = select
            .build_query_as::<CouponRow>()
            .fetch_all(&self.pool)
            .await?;

        Ok(CouponPage {
            coupons: into_coupons(rows)?,
            total,
        })
    }

    async fn export(&self, filter: &CouponFilter) -> Result<Vec<Coupon>, StoreError> {
        let mut select = QueryBuilder::<Postgres>::new("select * from coupons where true");
        push_filters(&mut select, filter);
        select.push(" order by created_at desc");

        let rows = select
            .build_query_as::<CouponRow>()
            .fetch_all(&self.pool)
            .await?;

        into_coupons(rows)
    }
}

pub struct PgMediaCatalog {
    pool: Pool<Postgres>,
}

impl PgMediaCatalog {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MediaCatalog for PgMediaCatalog {
    async fn insert(&self, media: &NewMedia) -> Result<MediaItem, StoreError> {
        let q = "--sql
            insert into media (file_name, original_filename, type, file_size, storage_file_id, uploaded_at)
            values ($1, $2, $3, $4, $5, $6)
            returning *;
        ";

        let row = sqlx::query_as::<_, MediaRow>(q)
            .bind(&media.file_name)
            .bind(&media.original_filename)
            .bind(media.media_type.as_str())
            .bind(media.file_size)
            .bind(&media.storage_file_id)
            .bind(media.uploaded_at)
            .fetch_one(&self.pool)
            .await?;

        Ok(MediaItem::try_from(row)?)
    }

    async fn find(&self, id: Uuid) -> Result<Option<MediaItem>, StoreError> {
        let q = "--sql
            select *
            from media
            where id = $1;
        ";

        let row = sqlx::query_as::<_, MediaRow>(q)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(MediaItem::try_from).transpose()?)
    }

    async fn find_many(&self, ids: &[Uuid]) -> Result<Vec<MediaItem>, StoreError> {
        let q = "--sql
            select *
            from media
            where id = any($1);
        ";

        let rows = sqlx::query_as::<_, MediaRow>(q)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;

        into_media(rows)
    }

    async fn list(&self, scope: Option<MediaType>) -> Result<Vec<MediaItem>, StoreError> {
        let rows = match scope {
            Some(media_type) => {
                let q = "--sql
                    select *
                    from media
                    where type = $1
                    order by uploaded_at desc;
                ";
                sqlx::query_as::<_, MediaRow>(q)
                    .bind(media_type.as_str())
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                let q = "--sql
                    select *
                    from media
                    order by uploaded_at desc;
                ";
                sqlx::query_as::<_, MediaRow>(q)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        into_media(rows)
    }

    async fn delete_many(&self, ids: &[Uuid]) -> Result<u64, StoreError> {
        let q = "--sql
            delete from media
            where id = any($1);
        ";

        let result = sqlx::query(q).bind(ids).execute(&self.pool).await?;

        Ok(result.rows_affected())
    }
}
