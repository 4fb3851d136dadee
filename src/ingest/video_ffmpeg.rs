//! Video frame source using FFmpeg.
//!
//! FFmpeg opens inputs by path, so the encoded payload is written to a
//! scoped temporary file that lives exactly as long as the source. Frames are
//! decoded in-memory and converted to RGB24.

use anyhow::{Context, Result};
use ffmpeg_next as ffmpeg;
use std::io::Write;
use tempfile::NamedTempFile;

use super::video::{FrameSource, VideoStats};
use crate::frame::RgbFrame;

pub(crate) struct FfmpegVideoSource {
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    frames_decoded: u64,
    eof_sent: bool,
    // Declared last so the file outlives the demuxer reading from it.
    _payload: NamedTempFile,
}

impl FfmpegVideoSource {
    pub(crate) fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;

        let mut payload = tempfile::Builder::new()
            .prefix("posture-video-")
            .suffix(".mp4")
            .tempfile()
            .context("create temporary video file")?;
        payload
            .write_all(bytes)
            .context("write temporary video file")?;
        payload.flush().context("flush temporary video file")?;

        let input = ffmpeg::format::input(&payload.path())
            .context("failed to open video payload with ffmpeg")?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow::anyhow!("payload has no video track"))?;
        let stream_index = input_stream.index();
        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        log::debug!(
            "video payload opened: {}x{} ({} bytes)",
            decoder.width(),
            decoder.height(),
            bytes.len()
        );

        Ok(Self {
            input,
            stream_index,
            decoder,
            scaler,
            frames_decoded: 0,
            eof_sent: false,
            _payload: payload,
        })
    }

    fn receive(&mut self) -> Result<Option<RgbFrame>> {
        let mut decoded = ffmpeg::frame::Video::empty();
        if self.decoder.receive_frame(&mut decoded).is_err() {
            return Ok(None);
        }
        let mut rgb_frame = ffmpeg::frame::Video::empty();
        self.scaler
            .run(&decoded, &mut rgb_frame)
            .context("scale frame to RGB")?;
        let (pixels, width, height) = frame_to_pixels(&rgb_frame)?;
        self.frames_decoded += 1;
        Ok(Some(RgbFrame::new(pixels, width, height)?))
    }
}

impl FrameSource for FfmpegVideoSource {
    fn next_frame(&mut self) -> Result<Option<RgbFrame>> {
        if let Some(frame) = self.receive()? {
            return Ok(Some(frame));
        }

        while !self.eof_sent {
            let stream_index = self.stream_index;
            let next_packet = self
                .input
                .packets()
                .find(|(stream, _)| stream.index() == stream_index)
                .map(|(_, packet)| packet);
            match next_packet {
                Some(packet) => {
                    self.decoder
                        .send_packet(&packet)
                        .context("send packet to ffmpeg decoder")?;
                }
                None => {
                    // Flush frames buffered inside the decoder.
                    self.decoder.send_eof().context("flush ffmpeg decoder")?;
                    self.eof_sent = true;
                }
            }
            if let Some(frame) = self.receive()? {
                return Ok(Some(frame));
            }
        }

        self.receive()
    }

    fn stats(&self) -> VideoStats {
        VideoStats {
            frames_decoded: self.frames_decoded,
        }
    }
}

fn frame_to_pixels(frame: &ffmpeg::frame::Video) -> Result<(Vec<u8>, u32, u32)> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    if stride == row_bytes {
        return Ok((data[..row_bytes * height as usize].to_vec(), width, height));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(
            data.get(start..end)
                .context("ffmpeg frame row is out of bounds")?,
        );
    }

    Ok((pixels, width, height))
}
