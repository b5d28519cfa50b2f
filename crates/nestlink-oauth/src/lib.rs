//! NestLink OAuth
//!
//! Token lifecycle for the SmartThings state callback.
//!
//! ## State Machine
//!
//! ```text
//!  no token ──authorization code──▶ valid ──time──▶ near expiry
//!                                     ▲                 │
//!                                     └────refresh──────┤
//!                                                       ▼
//!                                   refresh failed (needs a new grant)
//! ```
//!
//! - `state`: the OAuth state and its on-disk representation
//! - `flows`: authorization code and refresh token exchanges
//! - `token`: [`TokenManager`], which hands out valid tokens and serializes refreshes

pub mod error;
pub mod flows;
pub mod state;
pub mod token;

pub use error::{OAuthError, Result};
pub use flows::{OAuthClient, OAuthClientConfig};
pub use state::{OAuthState, StateFile};
pub use token::{CallbackCredentials, TokenManager, TokenProvider};
