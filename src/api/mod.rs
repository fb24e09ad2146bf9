//! Remote admin API: authenticated requests with retry and credential refresh.

mod client;
mod credential;
mod customers;
mod retry;

pub use client::{ApiClient, ApiOutcome, ApiResponse};
pub use credential::ApiCredential;
pub use customers::{NewCustomer, RegistrationOutcome};
pub use retry::RetryPolicy;
