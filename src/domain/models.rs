use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    NoShow,
    Completed,
    Expired,
}

impl BookingStatus {
    /// Statuses eligible for bulk confirm/payment operations. Pending and
    /// confirmed slots are interchangeable when merging a straddling
    /// reservation.
    pub fn is_checkable(self) -> bool {
        matches!(self, Self::Pending | Self::Confirmed)
    }

    /// Active statuses sort ahead of terminal ones so a cancelled slot never
    /// splits an otherwise continuous active reservation.
    pub fn sort_group(self) -> u8 {
        match self {
            Self::Pending | Self::Confirmed | Self::Completed => 0,
            Self::Cancelled | Self::NoShow | Self::Expired => 1,
        }
    }
}

/// One reserved time slot for one facility, as fetched from the backend.
/// The backend is trusted for `start < end` and a non-empty facility id;
/// malformed records are merged best-effort on their literal field values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BookingRecord {
    pub id: String,
    pub facility_id: String,
    pub time_slot_start: DateTime<Utc>,
    pub time_slot_end: DateTime<Utc>,
    pub status: BookingStatus,
    #[serde(deserialize_with = "deserialize_price")]
    pub total_price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_paid: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_phone: Option<String>,
}

// The backend emits totalPrice as either a JSON number or a numeric string
// depending on which service produced the record.
fn deserialize_price<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PriceRepr {
        Number(f64),
        Text(String),
    }

    match PriceRepr::deserialize(deserializer)? {
        PriceRepr::Number(value) => Ok(value),
        PriceRepr::Text(value) => value
            .trim()
            .parse::<f64>()
            .map_err(|error| serde::de::Error::custom(format!("invalid totalPrice '{value}': {error}"))),
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginCredentials {
    pub phone: String,
    pub password: String,
}

/// The one process-wide token session. Created on login, updated in place on
/// a successful refresh, cleared on refresh failure or logout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl AuthSession {
    pub fn is_active_at(&self, now: DateTime<Utc>, leeway_seconds: i64) -> bool {
        self.expires_at > now + chrono::Duration::seconds(leeway_seconds)
            && !self.access_token.trim().is_empty()
    }
}
