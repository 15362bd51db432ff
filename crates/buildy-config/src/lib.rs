//! KDL configuration parsing for buildy.
//!
//! The whole configuration is read once at startup into an immutable
//! [`Config`] and handed to each component explicitly.

pub mod error;
pub mod system;

pub use error::{ConfigError, ConfigResult};
pub use system::{
    Config, NotifyConfig, PipelineConfig, PollConfig, PostConfig, SourceConfig, load_config,
    parse_config, parse_config_with_env,
};
