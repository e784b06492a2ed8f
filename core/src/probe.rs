//! External media-metadata probe, spec §4.2. Shells out to an
//! `ffprobe`-compatible binary and parses its JSON report, reading
//! `-show_streams` color-transfer/primaries and side-data-list fields for
//! HDR detection.

use crate::error::{ReencodeError, Result};
use serde_json::Value;
use std::path::Path;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct ProbeResult {
    pub codec: Option<String>,
    pub bitrate: Option<i64>,
    pub file_size: Option<i64>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub is_hdr: bool,
    pub duration: Option<f64>,
    pub is_hevc: bool,
    pub is_4k: bool,
}

#[derive(Debug, Clone)]
pub struct Prober {
    probe_binary: String,
}

impl Prober {
    pub fn new(probe_binary: impl Into<String>) -> Self {
        Self {
            probe_binary: probe_binary.into(),
        }
    }

    pub async fn probe(&self, path: &Path) -> Result<ProbeResult> {
        let path_str = path.to_string_lossy().to_string();
        debug!(path = %path_str, "probing file");

        let output = Command::new(&self.probe_binary)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
                &path_str,
            ])
            .output()
            .await
            .map_err(ReencodeError::Io)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            return Err(ReencodeError::ProbeFailed(stderr));
        }

        let json_str = String::from_utf8_lossy(&output.stdout);
        let parsed: Value = serde_json::from_str(&json_str)
            .map_err(|e| ReencodeError::ProbeFailed(format!("invalid ffprobe json: {e}")))?;

        parse_probe_json(&parsed)
    }
}

fn parse_probe_json(json: &Value) -> Result<ProbeResult> {
    let streams = json["streams"].as_array().cloned().unwrap_or_default();
    let video = streams
        .iter()
        .find(|s| s["codec_type"].as_str() == Some("video"));

    let Some(video) = video else {
        return Err(ReencodeError::NoVideoStream("no video stream found".into()));
    };

    let codec = video["codec_name"].as_str().map(|s| s.to_string());
    let width = video["width"].as_i64().map(|w| w as i32);
    let height = video["height"].as_i64().map(|h| h as i32);

    // Rule: stream bitrate if present, else container bitrate, else null.
    let bitrate = video["bit_rate"]
        .as_str()
        .and_then(|s| s.parse::<i64>().ok())
        .or_else(|| json["format"]["bit_rate"].as_str().and_then(|s| s.parse::<i64>().ok()));

    let file_size = json["format"]["size"].as_str().and_then(|s| s.parse::<i64>().ok());
    let duration = json["format"]["duration"].as_str().and_then(|s| s.parse::<f64>().ok());

    let is_hevc = codec
        .as_deref()
        .map(|c| {
            let c = c.to_lowercase();
            c == "hevc" || c == "h265"
        })
        .unwrap_or(false);

    let is_4k = width.map(|w| w >= 3840).unwrap_or(false) || height.map(|h| h >= 2160).unwrap_or(false);

    let is_hdr = detect_hdr(video);

    Ok(ProbeResult {
        codec,
        bitrate,
        file_size,
        width,
        height,
        is_hdr,
        duration,
        is_hevc,
        is_4k,
    })
}

fn detect_hdr(video: &Value) -> bool {
    let color_transfer = video["color_transfer"].as_str().unwrap_or("").to_lowercase();
    if matches!(color_transfer.as_str(), "smpte2084" | "arib-std-b67" | "smpte428") {
        return true;
    }

    let color_primaries = video["color_primaries"].as_str().unwrap_or("").to_lowercase();
    if color_primaries == "bt2020" {
        return true;
    }

    if let Some(side_data_list) = video["side_data_list"].as_array() {
        for side_data in side_data_list {
            let ty = side_data["side_data_type"].as_str().unwrap_or("").to_lowercase();
            if ty.contains("hdr") || ty.contains("dolby vision") {
                return true;
            }
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_basic_h264_stream() {
        let value = json!({
            "streams": [
                {"codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080,
                 "bit_rate": "10000000", "color_transfer": "bt709", "color_primaries": "bt709"}
            ],
            "format": {"size": "5368709120", "duration": "3600.0"}
        });
        let result = parse_probe_json(&value).unwrap();
        assert_eq!(result.codec.as_deref(), Some("h264"));
        assert!(!result.is_hevc);
        assert!(!result.is_4k);
        assert!(!result.is_hdr);
        assert_eq!(result.bitrate, Some(10_000_000));
    }

    #[test]
    fn detects_hevc_case_insensitive() {
        let value = json!({
            "streams": [{"codec_type": "video", "codec_name": "HEVC", "width": 1920, "height": 1080}],
            "format": {}
        });
        let result = parse_probe_json(&value).unwrap();
        assert!(result.is_hevc);
    }

    #[test]
    fn detects_4k_by_width_or_height() {
        let value = json!({
            "streams": [{"codec_type": "video", "codec_name": "h264", "width": 3840, "height": 1600}],
            "format": {}
        });
        assert!(parse_probe_json(&value).unwrap().is_4k);

        let value = json!({
            "streams": [{"codec_type": "video", "codec_name": "h264", "width": 1920, "height": 2160}],
            "format": {}
        });
        assert!(parse_probe_json(&value).unwrap().is_4k);
    }

    #[test]
    fn detects_hdr_from_transfer_and_side_data() {
        let value = json!({
            "streams": [{"codec_type": "video", "codec_name": "hevc", "color_transfer": "smpte2084"}],
            "format": {}
        });
        assert!(parse_probe_json(&value).unwrap().is_hdr);

        let value = json!({
            "streams": [{"codec_type": "video", "codec_name": "hevc",
                "side_data_list": [{"side_data_type": "Dolby Vision Configuration"}]}],
            "format": {}
        });
        assert!(parse_probe_json(&value).unwrap().is_hdr);
    }

    #[test]
    fn missing_video_stream_errors() {
        let value = json!({"streams": [{"codec_type": "audio"}], "format": {}});
        let err = parse_probe_json(&value).unwrap_err();
        assert!(matches!(err, ReencodeError::NoVideoStream(_)));
    }
}
