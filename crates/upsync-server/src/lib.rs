//! # upsync-server
//!
//! HTTP surface of the upsync update server: the client web service (SOAP
//! over HTTP), the stub auth and reporting services, and the
//! content-addressed payload routes.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod routes;
pub mod server;
pub mod soap;
pub mod state;

pub use config::ServerConfig;
pub use error::{ServiceError, ServiceResult};
pub use server::{Server, app_router};
pub use state::AppState;
