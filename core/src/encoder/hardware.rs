//! Hardware HEVC encoder presence check, spec §4.5/§6. Detects encoder
//! availability by invoking `<transcoder> -encoders` and checking for
//! `hevc_nvenc`; absence is a startup warning, not a fatal error.

use tokio::process::Command;
use tracing::{info, warn};

const HEVC_NVENC_ENCODER: &str = "hevc_nvenc";

/// Probe the transcoder binary's own `-encoders` listing for `hevc_nvenc`.
pub async fn detect_hevc_nvenc(transcoder_binary: &str) -> bool {
    let output = match Command::new(transcoder_binary).arg("-encoders").output().await {
        Ok(o) => o,
        Err(e) => {
            warn!(error = %e, "hardware detection: failed to invoke transcoder binary");
            return false;
        }
    };

    if !output.status.success() {
        warn!("hardware detection: transcoder -encoders exited non-zero");
        return false;
    }

    let listing = String::from_utf8_lossy(&output.stdout);
    let available = listing.contains(HEVC_NVENC_ENCODER);
    if available {
        info!("hardware HEVC encoder {} detected", HEVC_NVENC_ENCODER);
    } else {
        warn!("hardware HEVC encoder {} not found; transcodes will fail", HEVC_NVENC_ENCODER);
    }
    available
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_binary_is_unavailable_not_fatal() {
        let available = detect_hevc_nvenc("/nonexistent/ffmpeg-binary-for-tests").await;
        assert!(!available);
    }
}
