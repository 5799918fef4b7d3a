//! In-memory collaborators and a ready-to-route test store.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{
    AdminAuth, CouponFilter, CouponPage, CouponQuery, CouponSort, CouponStore, MediaCatalog,
    Store, StoreError,
};
use crate::storage::fake::FakeStorage;
use crate::storage::RetryPolicy;
use crate::token::TokenKeys;
use crate::types::{Coupon, CouponType, MediaItem, MediaType, NewCoupon, NewMedia};

pub const TEST_COUPON_SECRET: &str = "test-coupon-secret";
pub const TEST_ADMIN_SECRET: &str = "test-admin-secret";

fn matches(filter: &CouponFilter, coupon: &Coupon) -> bool {
    filter.coupon_type.map_or(true, |t| t == coupon.coupon_type)
        && filter.redeemed.map_or(true, |r| r == coupon.redeemed)
        && filter.created_from.map_or(true, |from| coupon.created_at >= from)
        && filter.created_to.map_or(true, |to| coupon.created_at <= to)
}

#[derive(Default)]
pub struct MemoryCouponStore {
    coupons: Mutex<Vec<Coupon>>,
}

impl MemoryCouponStore {
    pub fn insert(&self, coupon: Coupon) {
        self.coupons.lock().unwrap().push(coupon);
    }

    pub fn get(&self, id: Uuid) -> Option<Coupon> {
        self.coupons
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.coupons.lock().unwrap().len()
    }
}

#[async_trait]
impl CouponStore for MemoryCouponStore {
    async fn insert_batch(&self, coupons: &[NewCoupon]) -> Result<Vec<Coupon>, StoreError> {
        let now = Utc::now();
        let created: Vec<Coupon> = coupons
            .iter()
            .map(|c| Coupon {
                id: Uuid::new_v4(),
                code: c.code.clone(),
                coupon_type: c.coupon_type,
                redeemed: false,
                redeemed_at: None,
                expires_at: c.expires_at,
                created_at: now,
            })
            .collect();
        self.coupons.lock().unwrap().extend(created.iter().cloned());
        Ok(created)
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<Coupon>, StoreError> {
        Ok(self
            .coupons
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.code == code)
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Coupon>, StoreError> {
        Ok(self.get(id))
    }

    async fn mark_redeemed(
        &self,
        id: Uuid,
        redeemed_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<Coupon>, StoreError> {
        let mut coupons = self.coupons.lock().unwrap();
        let coupon = coupons.iter_mut().find(|c| c.id == id && !c.redeemed);
        Ok(coupon.map(|c| {
            c.redeemed = true;
            c.redeemed_at = Some(redeemed_at);
            c.expires_at = Some(expires_at);
            c.clone()
        }))
    }

    async fn list(&self, query: &CouponQuery) -> Result<CouponPage, StoreError> {
        let mut matching: Vec<Coupon> = self
            .coupons
            .lock()
            .unwrap()
            .iter()
            .filter(|c| matches(&query.filter, c))
            .cloned()
            .collect();

        matching.sort_by(|a, b| {
            let ordering = match query.sort {
                CouponSort::CreatedAt => a.created_at.cmp(&b.created_at),
                CouponSort::ExpiresAt => a.expires_at.cmp(&b.expires_at),
                CouponSort::RedeemedAt => a.redeemed_at.cmp(&b.redeemed_at),
                CouponSort::Code => a.code.cmp(&b.code),
                CouponSort::Type => a.coupon_type.as_str().cmp(b.coupon_type.as_str()),
                CouponSort::Redeemed => a.redeemed.cmp(&b.redeemed),
            };
            if query.ascending {
                ordering
            } else {
                ordering.reverse()
            }
        });

        let total = matching.len() as i64;
        let coupons = matching
            .into_iter()
            .skip(query.offset.max(0) as usize)
            .take(query.limit.max(0) as usize)
            .collect();

        Ok(CouponPage { coupons, total })
    }

    async fn export(&self, filter: &CouponFilter) -> Result<Vec<Coupon>, StoreError> {
        let mut matching: Vec<Coupon> = self
            .coupons
            .lock()
            .unwrap()
            .iter()
            .filter(|c| matches(filter, c))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching)
    }
}

#[derive(Default)]
pub struct MemoryMediaCatalog {
    items: Mutex<Vec<MediaItem>>,
}

impl MemoryMediaCatalog {
    pub fn ids(&self) -> Vec<Uuid> {
        self.items.lock().unwrap().iter().map(|m| m.id).collect()
    }
}

#[async_trait]
impl MediaCatalog for MemoryMediaCatalog {
    async fn insert(&self, media: &NewMedia) -> Result<MediaItem, StoreError> {
        let item = MediaItem {
            id: Uuid::new_v4(),
            file_name: media.file_name.clone(),
            original_filename: media.original_filename.clone(),
            media_type: media.media_type,
            file_size: media.file_size,
            uploaded_at: media.uploaded_at,
            storage_file_id: media.storage_file_id.clone(),
        };
        self.items.lock().unwrap().push(item.clone());
        Ok(item)
    }

    async fn find(&self, id: Uuid) -> Result<Option<MediaItem>, StoreError> {
        Ok(self
            .items
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.id == id)
            .cloned())
    }

    async fn find_many(&self, ids: &[Uuid]) -> Result<Vec<MediaItem>, StoreError> {
        Ok(self
            .items
            .lock()
            .unwrap()
            .iter()
            .filter(|m| ids.contains(&m.id))
            .cloned()
            .collect())
    }

    async fn list(&self, scope: Option<MediaType>) -> Result<Vec<MediaItem>, StoreError> {
        let mut items: Vec<MediaItem> = self
            .items
            .lock()
            .unwrap()
            .iter()
            .filter(|m| scope.map_or(true, |t| t == m.media_type))
            .cloned()
            .collect();
        items.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        Ok(items)
    }

    async fn delete_many(&self, ids: &[Uuid]) -> Result<u64, StoreError> {
        let mut items = self.items.lock().unwrap();
        let before = items.len();
        items.retain(|m| !ids.contains(&m.id));
        Ok((before - items.len()) as u64)
    }
}

/// A [`Store`] wired to in-memory collaborators, plus handles to inspect them.
pub struct TestStore {
    pub store: Arc<Store>,
    pub coupons: Arc<MemoryCouponStore>,
    pub media: Arc<MemoryMediaCatalog>,
    pub storage: Arc<FakeStorage>,
}

impl TestStore {
    pub fn new() -> Self {
        Self::with_password_hash(None)
    }

    pub fn with_password_hash(password_hash: Option<String>) -> Self {
        let coupons = Arc::new(MemoryCouponStore::default());
        let media = Arc::new(MemoryMediaCatalog::default());
        let storage = Arc::new(FakeStorage::default());

        let store = Arc::new(Store {
            coupons: coupons.clone(),
            media: media.clone(),
            storage: storage.clone(),
            access_keys: TokenKeys::access(TEST_COUPON_SECRET),
            admin: AdminAuth {
                keys: TokenKeys::admin(TEST_ADMIN_SECRET),
                password_hash,
                cookie_secure: false,
            },
            upload_retry: RetryPolicy {
                max_attempts: 5,
                base_delay: Duration::from_millis(1),
            },
        });

        Self {
            store,
            coupons,
            media,
            storage,
        }
    }

    pub fn coupon(
        &self,
        coupon_type: CouponType,
        expires_at: Option<DateTime<Utc>>,
        redeemed: bool,
    ) -> Coupon {
        let coupon = Coupon {
            id: Uuid::new_v4(),
            code: crate::coupon::generate_code(&mut rand::thread_rng()),
            coupon_type,
            redeemed,
            redeemed_at: redeemed.then(Utc::now),
            expires_at,
            created_at: Utc::now(),
        };
        self.coupons.insert(coupon.clone());
        coupon
    }

    /// Registers a catalog entry and puts its bytes into fake storage.
    pub async fn media(
        &self,
        file_name: &str,
        media_type: MediaType,
        data: &'static [u8],
    ) -> MediaItem {
        self.storage.put(file_name, data);
        self.media
            .insert(&NewMedia {
                file_name: file_name.to_string(),
                original_filename: Some(format!("original {file_name}")),
                media_type,
                file_size: data.len() as i64,
                storage_file_id: Some(format!("id-{file_name}")),
                uploaded_at: Utc::now(),
            })
            .await
            .unwrap()
    }

    pub fn admin_token(&self) -> String {
        crate::token::issue_admin_token(&self.store.admin.keys, Utc::now())
            .unwrap()
            .token
    }

    pub fn access_token(&self, coupon_id: Uuid) -> String {
        crate::token::issue_access_token(&self.store.access_keys, coupon_id, Utc::now())
            .unwrap()
            .token
    }
}
