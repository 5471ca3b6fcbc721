mod api;
mod auth;
mod cache;
mod client;
mod diff;
mod endpoints;
mod error;
mod logger;
mod poller;
pub mod protocol;
mod retry;
mod store;
mod token;
mod translator;
mod transport;
mod types;

pub use api::ApiClient;
pub use auth::AuthSession;
pub use cache::{PRESET_MATCH_TOLERANCE_C, StateCache, active_preset};
pub use client::{K30Client, K30ClientBuilder, SessionConfig};
pub use endpoints::{DeviceEndpoint, ENDPOINTS, PollGroup, ValueKind, lookup};
pub use error::{Error, Result};
pub use logger::MessageLogMode;
pub use poller::{PollReport, Poller};
pub use retry::RetryPolicy;
pub use store::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use token::TokenStore;
pub use translator::{CommandTranslator, PendingCommand};
pub use transport::{
    HttpRequest, HttpResponse, Method, ReqwestTransport, RequestBody, Transport, TransportError,
};
pub use types::*;
