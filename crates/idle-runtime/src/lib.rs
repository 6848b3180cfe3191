#![deny(warnings)]

//! Runtime for Idle Tycoon: the progression engine, ad multiplier tracking,
//! per-account serialization, click rate limiting, config loading and the
//! typed request boundary.

pub mod api;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod locks;
pub mod ratelimit;

pub use api::{Api, ApiResponse, Request};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{database_url, load_config, ConfigError};
pub use engine::Engine;
pub use error::{ErrorKind, GameError};
