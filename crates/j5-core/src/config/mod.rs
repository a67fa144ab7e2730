//! Unified configuration layer.
//!
//! Every environment-variable read goes through this module; other code uses
//! the structured configs instead of calling `std::env::var` directly.
//!
//! - `loader`: `env_or`, `env_optional`, `env_bool`, `env_parse`, `.env` loading
//! - `schema`: `ScriptConfig`, `HttpConfig`, `ObservabilityConfig`
//! - `env_keys`: key constants

pub mod env_keys;
pub mod loader;
pub mod schema;

pub use loader::{env_bool, env_optional, env_or, env_parse, load_dotenv};
pub use schema::{HttpConfig, ObservabilityConfig, ScriptConfig};
