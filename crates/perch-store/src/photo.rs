//! Photo artifact encoding
//!
//! Photos are encoded from the full-resolution frame (the detection stream
//! is downsampled; artifacts are not). The capture metadata travels as a
//! JPEG comment (COM) segment — container metadata, not pixel data.

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder};
use img_parts::jpeg::{markers, Jpeg, JpegSegment};

use perch_core::{Error, Frame, PixelFormat, Result};

use crate::CaptureMetadata;

/// Encode `frame` as a JPEG with `meta` embedded.
pub fn encode_photo(frame: &Frame, quality: u8, meta: &CaptureMetadata) -> Result<Vec<u8>> {
    let expected = frame.format.frame_size(frame.resolution);
    if frame.data.len() != expected {
        return Err(Error::Encode(format!(
            "truncated frame: {} bytes, expected {expected}",
            frame.data.len()
        )));
    }

    let rgb = match frame.format {
        PixelFormat::Rgb24 => frame.data.to_vec(),
        PixelFormat::Yuv420 => yuv420_to_rgb(
            &frame.data,
            frame.resolution.width as usize,
            frame.resolution.height as usize,
        ),
    };

    let mut jpeg_bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg_bytes, quality)
        .write_image(
            &rgb,
            frame.resolution.width,
            frame.resolution.height,
            ExtendedColorType::Rgb8,
        )
        .map_err(|e| Error::Encode(format!("jpeg encode: {e}")))?;

    embed_comment(jpeg_bytes, &meta.to_json()?)
}

/// Insert `comment` as a COM segment near the front of the JPEG.
fn embed_comment(jpeg_bytes: Vec<u8>, comment: &str) -> Result<Vec<u8>> {
    let mut jpeg = Jpeg::from_bytes(Bytes::from(jpeg_bytes))
        .map_err(|e| Error::Encode(format!("jpeg parse: {e}")))?;
    let segment = JpegSegment::new_with_contents(
        markers::COM,
        Bytes::copy_from_slice(comment.as_bytes()),
    );
    // After APP0 when present, so JFIF stays first.
    let pos = jpeg.segments().len().min(1);
    jpeg.segments_mut().insert(pos, segment);

    let mut out = Vec::new();
    jpeg.encoder()
        .write_to(&mut out)
        .map_err(|e| Error::Encode(format!("jpeg write: {e}")))?;
    Ok(out)
}

/// Extract the embedded metadata from an encoded photo. The viewer reads the
/// same segment; tests use this to verify the embedding survives encoding.
pub fn read_embedded_metadata(jpeg_bytes: &[u8]) -> Result<CaptureMetadata> {
    let jpeg = Jpeg::from_bytes(Bytes::copy_from_slice(jpeg_bytes))
        .map_err(|e| Error::Encode(format!("jpeg parse: {e}")))?;
    let segment = jpeg
        .segments()
        .iter()
        .find(|s| s.marker() == markers::COM)
        .ok_or_else(|| Error::Encode("no metadata segment in photo".into()))?;
    let json = String::from_utf8(segment.contents().to_vec())
        .map_err(|e| Error::Encode(format!("metadata segment is not UTF-8: {e}")))?;
    CaptureMetadata::from_json(&json)
}

/// Planar I420 to packed RGB, BT.601 integer math.
fn yuv420_to_rgb(data: &[u8], width: usize, height: usize) -> Vec<u8> {
    let y_plane = &data[..width * height];
    let u_plane = &data[width * height..width * height + (width / 2) * (height / 2)];
    let v_plane = &data[width * height + (width / 2) * (height / 2)..];

    let mut rgb = vec![0u8; width * height * 3];
    for row in 0..height {
        for col in 0..width {
            let y = y_plane[row * width + col] as i32;
            let chroma = (row / 2) * (width / 2) + col / 2;
            let u = u_plane[chroma] as i32;
            let v = v_plane[chroma] as i32;

            let c = 298 * (y - 16);
            let d = u - 128;
            let e = v - 128;
            let p = (row * width + col) * 3;
            rgb[p] = clamp_u8((c + 409 * e + 128) >> 8);
            rgb[p + 1] = clamp_u8((c - 100 * d - 208 * e + 128) >> 8);
            rgb[p + 2] = clamp_u8((c + 516 * d + 128) >> 8);
        }
    }
    rgb
}

fn clamp_u8(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}
