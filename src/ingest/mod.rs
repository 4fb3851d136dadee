//! Input decoding.
//!
//! This module turns request payloads into RGB frames:
//! - base64 / data-URL payload text (`payload`)
//! - encoded still images (`image`)
//! - video frame sources (`video`; FFmpeg behind the ingest-video-ffmpeg feature)
//!
//! Decoding happens in memory. The only file ever written is the scoped
//! temporary copy of a video payload that FFmpeg needs to open, and it is
//! removed when the source is dropped.

pub mod image;
pub mod payload;
pub mod video;
#[cfg(feature = "ingest-video-ffmpeg")]
pub(crate) mod video_ffmpeg;

pub use self::image::decode_image;
pub use payload::decode_base64_payload;
pub use video::{open_video, FrameSource, MemoryFrameSource};
