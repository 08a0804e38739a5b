use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Progress band satisfies 0 < lower < upper < 100
/// - Progress throttle and exec timeout are not 0
/// - Size ceiling, when set, is not 0
/// - Bundle URLs, when a bundle is configured, are not empty
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let conversion = &config.conversion;
    let (lower, upper) = (conversion.progress_band_lower, conversion.progress_band_upper);
    if !(lower > 0.0 && lower < upper && upper < 100.0) {
        return Err(ConfigError::ValidationError(format!(
            "conversion progress band must satisfy 0 < lower < upper < 100, got {lower}..{upper}"
        )));
    }

    if conversion.progress_throttle_ms == 0 {
        return Err(ConfigError::ValidationError(
            "conversion.progress_throttle_ms cannot be 0".to_string(),
        ));
    }

    if conversion.max_file_size_bytes == Some(0) {
        return Err(ConfigError::ValidationError(
            "conversion.max_file_size_bytes cannot be 0".to_string(),
        ));
    }

    if config.engine.exec_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "engine.exec_timeout_secs cannot be 0".to_string(),
        ));
    }

    if let Some(bundle) = &config.engine.bundle {
        let urls = [
            ("core_url", &bundle.core_url),
            ("payload_url", &bundle.payload_url),
            ("bootstrap_url", &bundle.bootstrap_url),
        ];
        for (name, url) in urls {
            if url.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "engine.bundle.{name} cannot be empty"
                )));
            }
        }
        if bundle.fetch_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "engine.bundle.fetch_timeout_secs cannot be 0".to_string(),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConversionConfig;
    use crate::engine::BundleConfig;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_inverted_band_fails() {
        let config = Config {
            conversion: ConversionConfig {
                progress_band_lower: 95.0,
                progress_band_upper: 20.0,
                ..Default::default()
            },
            ..Default::default()
        };
        let result = validate_config(&config);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_validate_band_touching_bounds_fails() {
        let config = Config {
            conversion: ConversionConfig {
                progress_band_upper: 100.0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_zero_throttle_fails() {
        let config = Config {
            conversion: ConversionConfig {
                progress_throttle_ms: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_empty_bundle_url_fails() {
        let mut config = Config::default();
        config.engine.bundle = Some(BundleConfig {
            payload_url: "  ".to_string(),
            ..Default::default()
        });

        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("payload_url"));
    }
}
