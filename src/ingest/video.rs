//! Video frame sources.
//!
//! A `FrameSource` yields decoded frames in order until the stream ends.
//! The source is responsible for:
//! - Decoding frames in-memory, in presentation order
//! - Converting every frame to RGB24
//! - Signalling end of stream with `Ok(None)`
//!
//! Decode faults are reported as errors; the frame pipeline treats them as
//! fatal for the whole video.

use anyhow::Result;
use std::collections::VecDeque;

#[cfg(feature = "ingest-video-ffmpeg")]
use super::video_ffmpeg::FfmpegVideoSource;
use crate::frame::RgbFrame;

/// Ordered source of decoded video frames.
pub trait FrameSource {
    /// Next decoded frame, or `None` once the stream is exhausted.
    fn next_frame(&mut self) -> Result<Option<RgbFrame>>;

    /// Get frame statistics.
    fn stats(&self) -> VideoStats;
}

/// Statistics for a frame source.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VideoStats {
    pub frames_decoded: u64,
}

/// Open an encoded video payload (e.g. MP4) for frame-by-frame decoding.
pub fn open_video(bytes: &[u8]) -> Result<Box<dyn FrameSource>> {
    #[cfg(feature = "ingest-video-ffmpeg")]
    {
        Ok(Box::new(FfmpegVideoSource::from_bytes(bytes)?))
    }
    #[cfg(not(feature = "ingest-video-ffmpeg"))]
    {
        let _ = bytes;
        Err(anyhow::anyhow!(
            "video decoding requires the ingest-video-ffmpeg feature"
        ))
    }
}

// ----------------------------------------------------------------------------
// In-memory source for tests and pre-decoded input
// ----------------------------------------------------------------------------

/// Frame source over already-decoded frames.
#[derive(Debug, Default)]
pub struct MemoryFrameSource {
    frames: VecDeque<RgbFrame>,
    frames_decoded: u64,
}

impl MemoryFrameSource {
    pub fn new(frames: impl IntoIterator<Item = RgbFrame>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
            frames_decoded: 0,
        }
    }
}

impl FrameSource for MemoryFrameSource {
    fn next_frame(&mut self) -> Result<Option<RgbFrame>> {
        let frame = self.frames.pop_front();
        if frame.is_some() {
            self.frames_decoded += 1;
        }
        Ok(frame)
    }

    fn stats(&self) -> VideoStats {
        VideoStats {
            frames_decoded: self.frames_decoded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_source_drains_in_order() -> Result<()> {
        let mut source = MemoryFrameSource::new(vec![
            RgbFrame::filled(1, 1, [1, 1, 1]),
            RgbFrame::filled(1, 1, [2, 2, 2]),
        ]);
        assert_eq!(source.next_frame()?.map(|f| f.pixels()[0]), Some(1));
        assert_eq!(source.next_frame()?.map(|f| f.pixels()[0]), Some(2));
        assert!(source.next_frame()?.is_none());
        assert!(source.next_frame()?.is_none());
        assert_eq!(source.stats().frames_decoded, 2);
        Ok(())
    }

    #[cfg(not(feature = "ingest-video-ffmpeg"))]
    #[test]
    fn video_requires_decoder_feature() {
        assert!(open_video(b"\x00\x00\x00\x18ftypmp42").is_err());
    }
}
