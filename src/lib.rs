pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::bookings::{BookingQuery, BookingService};
pub use application::request::{ApiClient, ApiConfig, ApiRequest};
pub use application::session::SessionManager;
pub use domain::consolidation::{consolidate_bookings, BookingGroup, MERGE_TOLERANCE_MS};
pub use domain::models::{AuthSession, BookingRecord, BookingStatus, LoginCredentials};
pub use infrastructure::auth_client::{AuthClient, ReqwestAuthClient, TokenExchangeResponse};
pub use infrastructure::credential_store::{
    CredentialStore, InMemoryCredentialStore, KeyringCredentialStore,
};
pub use infrastructure::error::ApiError;
pub use infrastructure::transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
