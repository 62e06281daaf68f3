use thiserror::Error;

/// Errors originating from audio capture.
#[derive(Error, Debug)]
pub enum CaptureError {
    /// Another capture holds the device.
    #[error("A capture is already in progress")]
    Busy,

    /// No audio input device found.
    #[error("No audio input device found")]
    NoInputDevice,

    /// The stream delivered no samples.
    #[error("No audio data recorded")]
    NoFrames,

    /// Audio stream error.
    #[error("Audio stream error: {0}")]
    Stream(String),

    /// Clip file could not be written.
    #[error("Cannot write clip: {0}")]
    Io(#[from] std::io::Error),

    /// WAV encoder failure.
    #[error("Cannot encode WAV: {0}")]
    Wav(#[from] hound::Error),
}
