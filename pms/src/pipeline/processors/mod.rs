//! Pipeline stage implementations backed by external tools.

mod ffmpeg;
mod ffprobe;
mod traits;
mod ytdlp;

pub use ffmpeg::{FfmpegNormalizer, normalized_path};
pub use ffprobe::{FfprobeProber, UNKNOWN_TAG, parse_probe_output};
pub use traits::{
    AcquireRequest, Acquirer, JobProcessor, NormalizeOptions, Normalizer, Prober, TrackMetadata,
};
pub use ytdlp::{YtDlpAcquirer, audio_quality_arg};
