//! Logger initialisation

use log::LevelFilter;

use crate::config::Environment;

/// Default verbosity for each deployment environment.
pub fn default_level(environment: Environment) -> LevelFilter
{   match environment
    {   Environment::Development => LevelFilter::Debug
      , Environment::Staging => LevelFilter::Info
      , Environment::Production => LevelFilter::Warn
    }
}

/// Install `env_logger` at the environment's default level. `RUST_LOG`
/// still takes precedence. Calling this again is a no-op.
pub fn init(environment: Environment)
{   let level = default_level(environment);
    let env = env_logger::Env::default().default_filter_or(level.as_str());
    if env_logger::Builder::from_env(env)
      .format_timestamp_millis()
      .try_init()
      .is_ok()
    {   log::debug!("Logging initialised for {} at {}", environment, level);
    }
}
