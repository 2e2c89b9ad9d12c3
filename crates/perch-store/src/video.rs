//! Video artifact muxing
//!
//! Buffered raw frames are piped into an ffmpeg child that encodes H.264
//! into MP4. Capture metadata goes into the container's `comment` tag, with
//! `creation_time` set so players and the viewer agree on when the clip was
//! shot. Blocking; the writer worker calls this off the capture loop.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

use tracing::{debug, info};

use perch_core::{Error, Frame, PixelFormat, Resolution, Result};

use crate::CaptureMetadata;

/// ffmpeg argument list: raw frames on stdin, MP4 at `output`.
fn mux_args(
    resolution: Resolution,
    format: PixelFormat,
    fps: u32,
    meta_json: &str,
    created: &str,
    output: &Path,
) -> Vec<String> {
    let pix_fmt = match format {
        PixelFormat::Rgb24 => "rgb24",
        PixelFormat::Yuv420 => "yuv420p",
    };
    vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-y".to_string(),
        "-f".to_string(),
        "rawvideo".to_string(),
        "-pix_fmt".to_string(),
        pix_fmt.to_string(),
        "-video_size".to_string(),
        format!("{}x{}", resolution.width, resolution.height),
        "-framerate".to_string(),
        fps.to_string(),
        "-i".to_string(),
        "pipe:0".to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-preset".to_string(),
        "veryfast".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        "-metadata".to_string(),
        format!("comment={meta_json}"),
        "-metadata".to_string(),
        format!("creation_time={created}"),
        "-f".to_string(),
        "mp4".to_string(),
        output.to_string_lossy().into_owned(),
    ]
}

/// Mux the buffered clip to `output` (expected to be the temporary path; the
/// caller renames on success).
pub fn mux_clip(frames: &[Frame], fps: u32, meta: &CaptureMetadata, output: &Path) -> Result<()> {
    let first = frames
        .first()
        .ok_or_else(|| Error::WriteFailure("empty clip buffer".into()))?;
    let meta_json = meta.to_json()?;
    let created = meta.captured_at.to_rfc3339();
    let args = mux_args(
        first.resolution,
        first.format,
        fps,
        &meta_json,
        &created,
        output,
    );
    debug!(?args, "spawning ffmpeg muxer");

    let mut child = Command::new("ffmpeg")
        .args(&args)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| Error::WriteFailure(format!("failed to spawn ffmpeg (is it installed?): {e}")))?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| Error::WriteFailure("no stdin on ffmpeg child".into()))?;
    for frame in frames {
        stdin
            .write_all(&frame.data)
            .map_err(|e| Error::WriteFailure(format!("ffmpeg stdin write: {e}")))?;
    }
    drop(stdin); // EOF lets ffmpeg finalize the file

    let out = child
        .wait_with_output()
        .map_err(|e| Error::WriteFailure(format!("ffmpeg wait: {e}")))?;
    if !out.status.success() {
        let stderr = String::from_utf8_lossy(&out.stderr);
        return Err(Error::WriteFailure(format!(
            "ffmpeg exited with {}: {}",
            out.status,
            stderr.trim()
        )));
    }
    info!(
        frames = frames.len(),
        path = %output.display(),
        "clip muxed"
    );
    Ok(())
}
