//! The write, exec, read, cleanup sequence shared by both adapters.

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::debug;

use crate::engine::{
    mp3_extract_args, EngineError, FileData, MediaEngine, INPUT_FILE_NAME, MP3_BITRATE_KBPS,
    OUTPUT_FILE_NAME,
};
use crate::media::replace_extension;
use crate::progress::{steps, EstimatorConfig, ProgressEstimator, ProgressSnapshot};

/// Capacity of the raw engine progress channel.
const ENGINE_PROGRESS_BUFFER: usize = 64;

/// Input for one transcode.
#[derive(Debug, Clone)]
pub struct TranscodeJob {
    pub file_name: String,
    pub duration_secs: Option<f64>,
    pub bytes: Bytes,
}

/// Raw transcode result before it is registered as a resource.
#[derive(Debug, Clone)]
pub struct TranscodedAudio {
    pub name: String,
    pub bytes: Bytes,
    pub bitrate_kbps: u32,
    pub duration_secs: Option<f64>,
}

/// Runs one MP3 extraction on a loaded engine.
///
/// Temporary engine files are deleted on both the success and the failure
/// path. Cleanup failures are logged and never replace the original result.
pub async fn run_transcode(
    engine: &dyn MediaEngine,
    job: TranscodeJob,
    estimator: EstimatorConfig,
    progress: &mpsc::Sender<ProgressSnapshot>,
) -> Result<TranscodedAudio, EngineError> {
    if !engine.is_loaded() {
        return Err(EngineError::NotLoaded);
    }

    let mut estimator = ProgressEstimator::new(estimator, job.duration_secs);
    let result = transcode_steps(engine, &job, &mut estimator, progress).await;

    for name in [INPUT_FILE_NAME, OUTPUT_FILE_NAME] {
        if let Err(e) = engine.delete_file(name).await {
            debug!(file = name, error = %e, "Failed to delete temporary engine file");
        }
    }

    let bytes = result?;
    Ok(TranscodedAudio {
        name: replace_extension(&job.file_name, "mp3"),
        bytes,
        bitrate_kbps: MP3_BITRATE_KBPS,
        duration_secs: job.duration_secs,
    })
}

async fn transcode_steps(
    engine: &dyn MediaEngine,
    job: &TranscodeJob,
    estimator: &mut ProgressEstimator,
    progress: &mpsc::Sender<ProgressSnapshot>,
) -> Result<Bytes, EngineError> {
    let band = estimator.band();
    let _ = progress.try_send(estimator.mark(0.0, steps::LOADING_FILE));

    engine.write_file(INPUT_FILE_NAME, job.bytes.clone()).await?;
    let _ = progress.try_send(estimator.mark(band.lower, steps::CONVERTING));

    let args = mp3_extract_args(INPUT_FILE_NAME, OUTPUT_FILE_NAME);
    let (raw_tx, mut raw_rx) = mpsc::channel(ENGINE_PROGRESS_BUFFER);

    // The raw sender lives inside the exec future, so the forwarding loop
    // ends as soon as exec settles.
    let exec = engine.exec(&args, raw_tx);
    let forward = async {
        while let Some(event) = raw_rx.recv().await {
            if let Some(snapshot) = estimator.observe(event) {
                let _ = progress.try_send(snapshot);
            }
        }
    };
    let (exec_result, ()) = tokio::join!(exec, forward);
    exec_result?;

    let _ = progress.try_send(estimator.mark(band.upper, steps::FINALIZING));

    match engine.read_file(OUTPUT_FILE_NAME).await? {
        FileData::Binary(bytes) => Ok(bytes),
        FileData::Text(_) => Err(EngineError::NonBinaryOutput {
            name: OUTPUT_FILE_NAME.to_string(),
        }),
    }
}
