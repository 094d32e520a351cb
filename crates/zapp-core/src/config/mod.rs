//! Agent configuration: zapp.toml schema, parsing and path placeholders.

pub mod parser;
pub mod paths;
pub mod schema;
pub mod store;

pub use parser::{parse_zapp_toml, parse_zapp_toml_str, to_toml};
pub use paths::PathResolver;
pub use schema::{
    BatchConfig, BatchPolicy, FuseConfig, FusionConfig, TimeoutConfig, ZappConfig,
};
pub use store::{ConfigSource, ConfigStore};
