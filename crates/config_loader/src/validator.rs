//! Configuration validation
//!
//! Rules:
//! - worker count is zero or a power of two
//! - sink buffer size > 0
//! - flush interval > 0
//! - output directory is non-empty

use contracts::{ContractError, RunConfig};

/// Validate a parsed run configuration.
///
/// Returns the first violation encountered, or Ok(()).
pub fn validate(config: &RunConfig) -> Result<(), ContractError> {
    validate_dispatcher(config)?;
    validate_output(config)?;
    Ok(())
}

fn validate_dispatcher(config: &RunConfig) -> Result<(), ContractError> {
    let workers = config.dispatcher.workers;
    if workers != 0 && !workers.is_power_of_two() {
        return Err(ContractError::config_validation(
            "dispatcher.workers",
            format!("worker pool size {workers} must be a power of 2 (or 0 for synchronous mode)"),
        ));
    }
    if config.dispatcher.queue_capacity == 0 {
        return Err(ContractError::config_validation(
            "dispatcher.queue_capacity",
            "queue capacity must be greater than 0",
        ));
    }
    if config.dispatcher.flush_interval_secs == 0 {
        return Err(ContractError::config_validation(
            "dispatcher.flush_interval_secs",
            "flush interval must be greater than 0",
        ));
    }
    Ok(())
}

fn validate_output(config: &RunConfig) -> Result<(), ContractError> {
    if config.output.buffer_size == 0 {
        return Err(ContractError::config_validation(
            "output.buffer_size",
            "sink buffer size must be greater than 0",
        ));
    }
    if config.output.dir.as_os_str().is_empty() {
        return Err(ContractError::config_validation(
            "output.dir",
            "output directory must not be empty",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{DispatcherSettings, OutputSettings, TopologySettings};
    use std::path::PathBuf;

    fn base_config() -> RunConfig {
        RunConfig {
            dispatcher: DispatcherSettings::default(),
            output: OutputSettings {
                dir: PathBuf::from("/tmp/out"),
                buffer_size: 4096,
            },
            topology: TopologySettings {
                path: PathBuf::from("/tmp/nodes.conf"),
            },
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(validate(&base_config()).is_ok());
    }

    #[test]
    fn test_zero_workers_is_valid() {
        let mut config = base_config();
        config.dispatcher.workers = 0;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_non_power_of_two_workers_fails() {
        let mut config = base_config();
        config.dispatcher.workers = 12;
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("power of 2"));
    }

    #[test]
    fn test_zero_buffer_size_fails() {
        let mut config = base_config();
        config.output.buffer_size = 0;
        assert!(validate(&config).is_err());
    }
}
