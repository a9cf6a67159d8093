pub mod service_account;
pub mod token_provider;

pub use service_account::ServiceAccountKey;
pub use token_provider::{AccessTokenSource, ServiceAccountTokenProvider};
