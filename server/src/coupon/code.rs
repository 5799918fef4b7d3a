use chrono::{DateTime, Duration, Utc};
use rand::Rng;

use crate::error::{AppError, AppResult};
use crate::types::{CouponType, NewCoupon};

const ALPHANUMERIC: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

pub const MAX_BATCH: u32 = 100;

fn segment<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    (0..len)
        .map(|_| ALPHANUMERIC[rng.gen_range(0..ALPHANUMERIC.len())] as char)
        .collect()
}

/// `XXXX-###-XXX`. Uniqueness is left to the database index.
pub fn generate_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!(
        "{}-{}-{}",
        segment(rng, 4),
        rng.gen_range(100..=999),
        segment(rng, 3)
    )
}

pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

#[cfg(test)]
pub fn is_well_formed(code: &str) -> bool {
    let parts: Vec<&str> = code.split('-').collect();
    let upper_alnum = |s: &str| s.bytes().all(|b| ALPHANUMERIC.contains(&b));

    match parts.as_slice() {
        [head, digits, tail] => {
            head.len() == 4
                && upper_alnum(head)
                && tail.len() == 3
                && upper_alnum(tail)
                && digits
                    .parse::<u16>()
                    .map_or(false, |n| (100..=999).contains(&n) && digits.len() == 3)
        }
        _ => false,
    }
}

/// Validated generation request.
#[derive(Debug, Clone, Copy)]
pub struct BatchRequest {
    pub coupon_type: CouponType,
    pub count: u32,
    pub expires_in_days: Option<i64>,
}

impl BatchRequest {
    pub fn parse(
        coupon_type: Option<&str>,
        count: Option<i64>,
        expires_in_days: Option<i64>,
    ) -> AppResult<Self> {
        let coupon_type = coupon_type
            .unwrap_or_default()
            .parse::<CouponType>()
            .map_err(|_| AppError::InvalidArgument("Invalid coupon type".to_string()))?;

        let count = count.unwrap_or(1);
        if !(1..=MAX_BATCH as i64).contains(&count) {
            return Err(AppError::InvalidArgument(format!(
                "Count must be between 1 and {MAX_BATCH}"
            )));
        }

        if let Some(days) = expires_in_days {
            if days < 1 {
                return Err(AppError::InvalidArgument(
                    "expires_in_days must be positive".to_string(),
                ));
            }
        }

        Ok(Self {
            coupon_type,
            count: count as u32,
            expires_in_days,
        })
    }

    pub fn build<R: Rng + ?Sized>(&self, rng: &mut R, now: DateTime<Utc>) -> Vec<NewCoupon> {
        let expires_at = self.expires_in_days.map(|days| now + Duration::days(days));
        (0..self.count)
            .map(|_| NewCoupon {
                code: generate_code(rng),
                coupon_type: self.coupon_type,
                expires_at,
            })
            .collect()
    }
}
