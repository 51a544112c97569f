//! Icon API providers and query dispatch.
//!
//! - [`ApiConfigRegistry`]: provider name to host list and limits
//! - [`ApiModule`]: how queries are built and sent ([`HttpApiModule`] by default)
//! - [`QueryDispatcher`]: sends queries, rotating hosts on failure

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod http;
pub mod module;

pub use config::{
    ApiConfig, ApiConfigRegistry, DEFAULT_MAX_URL, DEFAULT_TIMEOUT, PUBLIC_API_HOSTS,
    PartialApiConfig, Resources,
};
pub use dispatcher::{QueryDispatcher, QueryResult};
pub use error::{ApiError, DispatchError};
pub use http::HttpApiModule;
pub use module::{ApiModule, ApiQuery, QueryOutcome, prepare_icon_queries};
