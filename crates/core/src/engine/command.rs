//! The fixed MP3 extraction command.

/// Output bitrate. Not configurable.
pub const MP3_BITRATE_KBPS: u32 = 128;
pub const MP3_SAMPLE_RATE_HZ: u32 = 44_100;
pub const MP3_CHANNELS: u8 = 2;

/// Name of the input file inside the engine's private filesystem.
pub const INPUT_FILE_NAME: &str = "input_video";
/// Name of the output file inside the engine's private filesystem.
pub const OUTPUT_FILE_NAME: &str = "output.mp3";

/// MIME type of the produced artifact.
pub const MP3_MIME_TYPE: &str = "audio/mpeg";

/// Builds the engine arguments that strip the video track and encode the
/// audio as 44.1 kHz stereo MP3 at the fixed bitrate.
pub fn mp3_extract_args(input: &str, output: &str) -> Vec<String> {
    vec![
        "-i".to_string(),
        input.to_string(),
        // Drop video
        "-vn".to_string(),
        "-ar".to_string(),
        MP3_SAMPLE_RATE_HZ.to_string(),
        "-ac".to_string(),
        MP3_CHANNELS.to_string(),
        "-b:a".to_string(),
        format!("{}k", MP3_BITRATE_KBPS),
        "-f".to_string(),
        "mp3".to_string(),
        output.to_string(),
    ]
}
