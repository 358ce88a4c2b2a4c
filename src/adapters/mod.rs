// Adapters - External system implementations

pub mod exec_ffmpeg;
pub mod fs_tokio;
pub mod json_store;
pub mod probe_ffprobe;

// Re-export adapters
pub use exec_ffmpeg::FfmpegAdapter;
pub use fs_tokio::TokioFsAdapter;
pub use json_store::JsonFileStore;
pub use probe_ffprobe::FFprobeAdapter;
