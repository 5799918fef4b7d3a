use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

use crate::error::{AppError, AppResult};
use crate::types::Coupon;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
    Txt,
}

impl ExportFormat {
    /// `excel` is served as JSON for the dashboard to convert. Unknown formats
    /// fall back to JSON as well.
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(str::to_ascii_lowercase).as_deref() {
            Some("csv") => Self::Csv,
            Some("txt") => Self::Txt,
            _ => Self::Json,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Txt => "txt",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Csv => "text/csv",
            Self::Json => "application/json",
            Self::Txt => "text/plain",
        }
    }

    pub fn file_name(self, now: DateTime<Utc>) -> String {
        format!("coupons_{}.{}", now.format("%Y-%m-%d"), self.extension())
    }

    pub fn render(self, coupons: &[Coupon]) -> AppResult<String> {
        match self {
            Self::Csv => Ok(render_csv(coupons)),
            Self::Txt => Ok(render_txt(coupons)),
            Self::Json => serde_json::to_string_pretty(coupons)
                .map_err(|err| AppError::Internal(format!("failed to serialize export: {err}"))),
        }
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

fn yes_no(redeemed: bool) -> &'static str {
    if redeemed {
        "Yes"
    } else {
        "No"
    }
}

fn render_csv(coupons: &[Coupon]) -> String {
    let mut lines = vec!["Code,Type,Redeemed,Expires At,Created At".to_string()];
    lines.extend(coupons.iter().map(|coupon| {
        format!(
            "\"{}\",\"{}\",\"{}\",\"{}\",\"{}\"",
            coupon.code,
            coupon.coupon_type,
            yes_no(coupon.redeemed),
            coupon
                .expires_at
                .map(|at| at.to_rfc3339())
                .unwrap_or_else(|| "Never".to_string()),
            timestamp(coupon.created_at),
        )
    }));
    lines.join("\n")
}

fn render_txt(coupons: &[Coupon]) -> String {
    coupons
        .iter()
        .map(|coupon| {
            format!(
                "Coupon: {}\nType: {}\nRedeemed: {}\nExpires: {}\nCreated: {}\n{}",
                coupon.code,
                coupon.coupon_type.as_str().to_ascii_uppercase(),
                yes_no(coupon.redeemed).to_ascii_uppercase(),
                coupon
                    .expires_at
                    .map(|at| at.format("%Y-%m-%d").to_string())
                    .unwrap_or_else(|| "Never".to_string()),
                timestamp(coupon.created_at),
                "=".repeat(40),
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Accepts RFC 3339 timestamps or plain `YYYY-MM-DD` dates. A plain end date
/// covers its whole day.
pub fn parse_date_bound(value: &str, end_of_day: bool) -> AppResult<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(value) {
        return Ok(at.with_timezone(&Utc));
    }

    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| AppError::InvalidArgument(format!("Invalid date: {value}")))?;
    let time = if end_of_day {
        NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999)
    } else {
        NaiveTime::from_hms_opt(0, 0, 0)
    }
    .ok_or_else(|| AppError::Internal("invalid time of day".to_string()))?;

    Ok(date.and_time(time).and_utc())
}
