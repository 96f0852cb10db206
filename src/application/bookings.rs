use crate::application::request::{ApiClient, ApiRequest};
use crate::domain::consolidation::{consolidate_bookings, BookingGroup};
use crate::domain::models::BookingRecord;
use crate::infrastructure::auth_client::AuthClient;
use crate::infrastructure::credential_store::CredentialStore;
use crate::infrastructure::error::ApiError;
use crate::infrastructure::transport::HttpTransport;
use chrono::{DateTime, SecondsFormat, Utc};

const BOOKINGS_PATH: &str = "owner/bookings";

/// Filters for the owner's booking list. All optional; the backend returns
/// every booking for the owner's facilities when empty.
#[derive(Debug, Clone, Default)]
pub struct BookingQuery {
    pub facility_id: Option<String>,
    pub time_from: Option<DateTime<Utc>>,
    pub time_to: Option<DateTime<Utc>>,
}

/// Owner-facing booking reads: fetches raw slot bookings through the
/// session-aware pipeline and consolidates them for the schedule screens.
pub struct BookingService<S, A, T>
where
    S: CredentialStore,
    A: AuthClient,
    T: HttpTransport,
{
    api: ApiClient<S, A, T>,
}

impl<S, A, T> BookingService<S, A, T>
where
    S: CredentialStore,
    A: AuthClient,
    T: HttpTransport,
{
    pub fn new(api: ApiClient<S, A, T>) -> Self {
        Self { api }
    }

    pub fn api(&self) -> &ApiClient<S, A, T> {
        &self.api
    }

    pub async fn list_bookings(&self, query: &BookingQuery) -> Result<Vec<BookingRecord>, ApiError> {
        let mut request = ApiRequest::get(BOOKINGS_PATH);
        if let Some(facility_id) = query.facility_id.as_deref() {
            request = request.query("facilityId", facility_id);
        }
        if let Some(time_from) = query.time_from {
            request = request.query(
                "timeFrom",
                time_from.to_rfc3339_opts(SecondsFormat::Secs, true),
            );
        }
        if let Some(time_to) = query.time_to {
            request = request.query("timeTo", time_to.to_rfc3339_opts(SecondsFormat::Secs, true));
        }

        // A missing or unparseable payload reads as an empty schedule.
        Ok(self.api.send(request).await?.unwrap_or_default())
    }

    /// The merged view the schedule screens render: raw slots in, one group
    /// per continuous reservation out.
    pub async fn schedule(&self, query: &BookingQuery) -> Result<Vec<BookingGroup>, ApiError> {
        let bookings = self.list_bookings(query).await?;
        Ok(consolidate_bookings(&bookings))
    }
}
