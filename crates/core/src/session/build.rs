use std::sync::Arc;

use super::machine::ConversionSession;
use crate::adapter::{create_adapter, AdapterParts, EngineAdapter};
use crate::config::Config;
use crate::engine::{BundleSource, EngineError, FfmpegEngine, HttpBundleFetcher, MediaEngine};
use crate::media::{FfprobeProber, InputValidator};
use crate::resources::ResourceStore;

/// Factory function to build a session backed by ffmpeg from config.
///
/// Host capabilities are detected here, once; the adapter choice is fixed
/// for the session's lifetime.
pub fn session_from_config(config: &Config) -> Result<ConversionSession<EngineAdapter>, EngineError> {
    let resources = ResourceStore::new();

    let bundle = match &config.engine.bundle {
        Some(bundle) => {
            let fetcher = HttpBundleFetcher::from_config(bundle)?;
            BundleSource::remote(bundle.clone(), Arc::new(fetcher))
        }
        None => BundleSource::Local,
    };

    let engine_config = config.engine.clone();
    let factory = move || -> Arc<dyn MediaEngine> {
        Arc::new(FfmpegEngine::new(engine_config.clone()))
    };

    let adapter = create_adapter(
        config.adapter.mode,
        AdapterParts {
            factory: Arc::new(factory),
            bundle,
            capabilities: config.host.capabilities(),
            estimator: config.conversion.estimator(),
            resources: resources.clone(),
        },
    );

    let prober = FfprobeProber::new(
        config.engine.ffprobe_path.clone(),
        config.engine.ffmpeg_path.clone(),
    );
    let validator = InputValidator::new(resources.clone())
        .with_max_file_size(config.conversion.max_file_size_bytes)
        .with_prober(Arc::new(prober))
        .with_preview(config.conversion.preview_enabled);

    Ok(ConversionSession::new(adapter, validator, resources))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{AdapterKind, AdapterPreference, TranscodeAdapter};
    use crate::config::load_config_from_str;
    use crate::session::ConversionStatus;

    #[test]
    fn test_session_from_explicit_direct_config() {
        let mut config = Config::default();
        config.adapter.mode = AdapterPreference::Direct;

        let session = session_from_config(&config).unwrap();

        assert_eq!(session.adapter().kind(), AdapterKind::Direct);
        assert_eq!(session.status(), ConversionStatus::Idle);
        assert!(!session.adapter().is_ready());
    }

    #[test]
    fn test_auto_mode_follows_host_override() {
        let config = load_config_from_str(
            r#"
[host]
isolated_execution = false
"#,
        )
        .unwrap();

        let session = session_from_config(&config).unwrap();
        assert_eq!(session.adapter().kind(), AdapterKind::Direct);
    }

    #[test]
    fn test_session_with_remote_bundle() {
        let config = load_config_from_str(
            r#"
[adapter]
mode = "isolated"

[engine.bundle]
fetch_timeout_secs = 5
"#,
        )
        .unwrap();

        let session = session_from_config(&config).unwrap();
        assert_eq!(session.adapter().kind(), AdapterKind::Isolated);
    }
}
