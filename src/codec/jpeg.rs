//! JPEG still-frame encoder
//!
//! Video is sent as independent JPEG stills, so there is no inter-frame
//! state beyond statistics.

use image::{ImageBuffer, ImageEncoder, Rgba};
use std::io::Cursor;

use super::to_base64;
use crate::error::CodecError;
use crate::video::RgbaFrame;

/// JPEG encoder with fixed quality
pub struct JpegEncoder {
    /// Quality 1-100
    quality: u8,
    frames_encoded: u64,
    bytes_produced: u64,
}

impl JpegEncoder {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
            frames_encoded: 0,
            bytes_produced: 0,
        }
    }

    /// Scale a frame to `width`×`height` and encode it as JPEG
    pub fn encode(&mut self, frame: &RgbaFrame, width: u32, height: u32) -> Result<Vec<u8>, CodecError> {
        if width == 0 || height == 0 {
            return Err(CodecError::InvalidFrame(format!("target size {}x{}", width, height)));
        }

        let img: ImageBuffer<Rgba<u8>, Vec<u8>> =
            ImageBuffer::from_raw(frame.width, frame.height, frame.data.clone()).ok_or_else(|| {
                CodecError::InvalidFrame(format!(
                    "{} bytes do not hold a {}x{} RGBA frame",
                    frame.data.len(),
                    frame.width,
                    frame.height
                ))
            })?;

        let img = if frame.width != width || frame.height != height {
            image::imageops::resize(&img, width, height, image::imageops::FilterType::Triangle)
        } else {
            img
        };

        let rgb_img = image::DynamicImage::ImageRgba8(img).to_rgb8();

        let mut jpeg_data = Vec::new();
        let encoder =
            image::codecs::jpeg::JpegEncoder::new_with_quality(Cursor::new(&mut jpeg_data), self.quality);
        encoder
            .write_image(
                rgb_img.as_raw(),
                rgb_img.width(),
                rgb_img.height(),
                image::ExtendedColorType::Rgb8,
            )
            .map_err(|e| CodecError::Jpeg(e.to_string()))?;

        self.frames_encoded += 1;
        self.bytes_produced += jpeg_data.len() as u64;
        Ok(jpeg_data)
    }

    /// Encode straight to the base64 wire form
    pub fn encode_base64(&mut self, frame: &RgbaFrame, width: u32, height: u32) -> Result<String, CodecError> {
        self.encode(frame, width, height).map(|jpeg| to_base64(&jpeg))
    }

    pub fn frames_encoded(&self) -> u64 {
        self.frames_encoded
    }

    pub fn bytes_produced(&self) -> u64 {
        self.bytes_produced
    }
}
