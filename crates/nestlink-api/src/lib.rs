//! NestLink API
//!
//! The SmartThings-facing side of the bridge: decoding of ST-Schema webhook
//! requests, the handlers for each interaction type and the HTTP server.
//!
//! ```text
//!  POST /nest ──▶ decode_request ──▶ SchemaHandler ──▶ SmartDeviceManagement
//!                 (json, ≤100KB,      │
//!                  validated)         └──▶ OAuthClient + StateFile (grant)
//!  GET /oauth ──▶ partner connections redirect
//!  GET /api/health
//! ```

pub mod body;
pub mod error;
pub mod handler;
pub mod redirect;
pub mod server;

pub use body::decode_request;
pub use error::{HandlerError, RequestError, Result};
pub use handler::{HandlerConfig, HandlerReply, SchemaHandler};
pub use redirect::authorization_url;
pub use server::{router, serve, AppState, ServerConfig};
