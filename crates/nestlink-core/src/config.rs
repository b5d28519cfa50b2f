//! Shared configuration defaults.
//!
//! Every crate reads its defaults from here so the CLI, the HTTP server and
//! the event pipeline agree on the same values.

/// Default remote endpoints.
pub mod endpoints {
    /// Smart Device Management REST API.
    pub const SDM_API: &str = "https://smartdevicemanagement.googleapis.com/v1";
    /// Cloud Pub/Sub REST API.
    pub const PUBSUB_API: &str = "https://pubsub.googleapis.com/v1";
    /// Partner connections manager, used by the OAuth redirect.
    pub const PARTNER_CONNECTIONS: &str = "https://nestservices.google.com/partnerconnections";
    /// GCE metadata server token endpoint.
    pub const METADATA_TOKEN: &str =
        "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";
    /// Google OAuth token endpoint, used when a key file names none.
    pub const GOOGLE_TOKEN: &str = "https://oauth2.googleapis.com/token";
}

/// Environment variable names.
pub mod env_vars {
    pub const CONFIG_FILE: &str = "NESTLINK_CONFIG";
    pub const LISTEN: &str = "NESTLINK_LISTEN";
    pub const LOG_LEVEL: &str = "NESTLINK_LOG_LEVEL";
    pub const LOG_FORMAT: &str = "NESTLINK_LOG_FORMAT";
    pub const LOG_LOCATION: &str = "NESTLINK_LOG_LOCATION";
    pub const ST_CLIENT_SECRET: &str = "NESTLINK_ST_CLIENT_SECRET";
    pub const ST_OAUTH_STATE_FILE: &str = "NESTLINK_ST_OAUTH_STATE_FILE";
    pub const GOOGLE_PROJECT_ID: &str = "NESTLINK_GOOGLE_PROJECT_ID";
    pub const PUBSUB_PROJECT_ID: &str = "NESTLINK_PUBSUB_PROJECT_ID";
    pub const PUBSUB_SUBSCRIPTION: &str = "NESTLINK_PUBSUB_SUBSCRIPTION";
    pub const PUBSUB_TOKEN: &str = "NESTLINK_PUBSUB_TOKEN";
    pub const PUBSUB_TOKEN_FILE: &str = "NESTLINK_PUBSUB_TOKEN_FILE";
    pub const PUBSUB_CREDENTIALS_FILE: &str = "NESTLINK_PUBSUB_CREDENTIALS_FILE";
}

/// ST-Schema protocol constants.
pub mod schema {
    pub const NAME: &str = "st-schema";
    pub const VERSION: &str = "1.0";
    /// Device profile used for every discovered thermostat.
    pub const THERMOSTAT_PROFILE_ID: &str = "bd2e8c4a-0e4b-475f-b8ff-273fb5f5cef5";
    pub const MANUFACTURER: &str = "Google";
    pub const THERMOSTAT_MODEL: &str = "Nest Thermostat";
    /// Maximum accepted size of an inbound request body.
    pub const MAX_BODY_BYTES: usize = 100 * 1024;
}

/// HTTP server defaults.
pub mod server {
    pub const DEFAULT_LISTEN: &str = "0.0.0.0:4343";
    pub const DEFAULT_SHUTDOWN_SECS: u64 = 15;
    pub const DEFAULT_OAUTH_STATE_FILE: &str = "st-oauth.json";
}

/// Device API defaults.
pub mod devices {
    pub const DEFAULT_TIMEOUT_SECS: u64 = 15;
    /// How long a fan timer runs when switched on from SmartThings.
    pub const FAN_TIMER_SECS: u64 = 3600;
}

/// Event pipeline defaults.
pub mod events {
    pub const DEFAULT_MAX_AGE_SECS: u64 = 1200;
    pub const DEFAULT_PULL_BATCH: usize = 10;
    pub const DEFAULT_PULL_BACKOFF_SECS: u64 = 5;
    pub const DEFAULT_WORKERS: usize = 10;
    pub const DEFAULT_CALLBACK_TIMEOUT_SECS: u64 = 15;
}

/// OAuth defaults.
pub mod oauth {
    /// A token closer than this to expiry is refreshed before use.
    pub const DEFAULT_MIN_VALIDITY_SECS: i64 = 60;
    pub const DEFAULT_TIMEOUT_SECS: u64 = 15;
}
