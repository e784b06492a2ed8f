//! Transcode plan builder, spec §4.5 table. A pure function of probed
//! metadata, settings, and fixed encoder config: same inputs, same argument
//! vector, every time.

use crate::probe::ProbeResult;
use crate::settings::EncodingSettings;

/// Fixed encoder configuration that is not part of the mutable `Setting`
/// entity (spec §4.5: "configured, not hardcoded here" / process
/// environment), read once at process start.
#[derive(Debug, Clone)]
pub struct PlanConfig {
    pub nvenc_preset: String,
    pub crf_fallback: u32,
    pub max_bitrate_fallback_bps: i64,
    pub buf_size_fallback_bps: i64,
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            nvenc_preset: "p5".to_string(),
            crf_fallback: 23,
            max_bitrate_fallback_bps: 8_000_000,
            buf_size_fallback_bps: 16_000_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResolutionClass {
    P1080OrHigher,
    P720OrLower,
    Other,
}

fn resolution_class(effective_height: i32) -> ResolutionClass {
    if effective_height >= 1080 {
        ResolutionClass::P1080OrHigher
    } else if effective_height <= 720 {
        ResolutionClass::P720OrLower
    } else {
        ResolutionClass::Other
    }
}

#[derive(Debug, Clone)]
pub struct TranscodePlan {
    pub args: Vec<String>,
}

/// Build the full ffmpeg-style argument vector for one transcode attempt.
/// `hw_decode` toggles hardware decode (spec §4.5 step d retries with it
/// disabled on first failure).
pub fn build_plan(
    input_path: &str,
    output_path: &str,
    probe: &ProbeResult,
    settings: &EncodingSettings,
    config: &PlanConfig,
    hw_decode: bool,
) -> TranscodePlan {
    let downscaling = probe.is_4k && settings.scale_4k_to_1080p;

    // Downscaled 4K is treated as 1080p for cap purposes.
    let effective_height = if downscaling {
        1080
    } else {
        probe.height.unwrap_or(1080)
    };
    let class = resolution_class(effective_height);

    let mut args = Vec::new();

    if hw_decode {
        args.push("-hwaccel".to_string());
        args.push("cuda".to_string());
        args.push("-hwaccel_output_format".to_string());
        args.push("cuda".to_string());
    }

    args.push("-i".to_string());
    args.push(input_path.to_string());

    let filters = build_filter_chain(probe, downscaling, hw_decode);
    if !filters.is_empty() {
        args.push("-vf".to_string());
        args.push(filters.join(","));
    }

    args.push("-map".to_string());
    args.push("0".to_string());

    args.push("-c:v".to_string());
    args.push("hevc_nvenc".to_string());
    args.push("-preset".to_string());
    args.push(config.nvenc_preset.clone());

    match probe.bitrate {
        Some(bitrate) => {
            let cap_bps = cap_bps_for(class, settings);
            let target = ((bitrate as f64) * settings.bitrate_factor).floor() as i64;
            let target = target.min(cap_bps);
            args.push("-b:v".to_string());
            args.push(target.to_string());
        }
        None => {
            args.push("-rc".to_string());
            args.push("vbr".to_string());
            args.push("-cq".to_string());
            args.push(config.crf_fallback.to_string());
            args.push("-maxrate".to_string());
            args.push(config.max_bitrate_fallback_bps.to_string());
            args.push("-bufsize".to_string());
            args.push(config.buf_size_fallback_bps.to_string());
        }
    }

    args.push("-c:a".to_string());
    args.push("copy".to_string());
    args.push("-c:s".to_string());
    args.push("copy".to_string());
    args.push("-f".to_string());
    args.push("matroska".to_string());
    args.push(output_path.to_string());

    TranscodePlan { args }
}

fn cap_bps_for(class: ResolutionClass, settings: &EncodingSettings) -> i64 {
    let mbps = match class {
        ResolutionClass::P1080OrHigher => settings.bitrate_cap_1080p,
        ResolutionClass::P720OrLower => settings.bitrate_cap_720p,
        ResolutionClass::Other => settings.bitrate_cap_other,
    };
    (mbps * 1_000_000.0) as i64
}

fn build_filter_chain(probe: &ProbeResult, downscaling: bool, hw_decode: bool) -> Vec<String> {
    let mut filters = Vec::new();

    if downscaling {
        if hw_decode {
            filters.push("scale_cuda=1920:1080".to_string());
        } else {
            filters.push("scale=1920:-2".to_string());
        }
    }

    if probe.is_hdr {
        if hw_decode && downscaling {
            filters.push("hwdownload".to_string());
            filters.push("format=nv12".to_string());
        }
        filters.push("zscale=t=linear".to_string());
        filters.push("format=gbrpf32le".to_string());
        filters.push("zscale=p=bt709".to_string());
        filters.push("tonemap=tonemap=hable:desat=0".to_string());
        filters.push("zscale=t=bt709:m=bt709:r=tv".to_string());
        filters.push("format=yuv420p".to_string());
    }

    filters
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe(bitrate: Option<i64>, height: Option<i32>, is_4k: bool, is_hdr: bool) -> ProbeResult {
        ProbeResult {
            bitrate,
            height,
            is_4k,
            is_hdr,
            ..Default::default()
        }
    }

    #[test]
    fn same_inputs_produce_identical_plan() {
        let p = probe(Some(20_000_000), Some(2160), true, true);
        let settings = EncodingSettings::default();
        let config = PlanConfig::default();
        let a = build_plan("/scratch/in.mkv", "/scratch/out.mkv", &p, &settings, &config, true);
        let b = build_plan("/scratch/in.mkv", "/scratch/out.mkv", &p, &settings, &config, true);
        assert_eq!(a.args, b.args);
    }

    #[test]
    fn bitrate_target_is_capped_by_resolution_tier() {
        let p = probe(Some(100_000_000), Some(1080), false, false);
        let mut settings = EncodingSettings::default();
        settings.bitrate_factor = 0.5;
        settings.bitrate_cap_1080p = 6.0;
        let config = PlanConfig::default();
        let plan = build_plan("/in.mkv", "/out.mkv", &p, &settings, &config, true);
        let idx = plan.args.iter().position(|a| a == "-b:v").unwrap();
        let value: i64 = plan.args[idx + 1].parse().unwrap();
        assert_eq!(value, 6_000_000);
    }

    #[test]
    fn missing_bitrate_uses_crf_fallback() {
        let p = probe(None, Some(1080), false, false);
        let settings = EncodingSettings::default();
        let config = PlanConfig::default();
        let plan = build_plan("/in.mkv", "/out.mkv", &p, &settings, &config, true);
        assert!(plan.args.iter().any(|a| a == "-cq"));
        assert!(!plan.args.iter().any(|a| a == "-b:v"));
    }

    #[test]
    fn downscaled_4k_gets_scale_filter_and_1080p_cap() {
        let p = probe(Some(40_000_000), Some(2160), true, false);
        let mut settings = EncodingSettings::default();
        settings.scale_4k_to_1080p = true;
        settings.bitrate_cap_1080p = 6.0;
        let config = PlanConfig::default();
        let plan = build_plan("/in.mkv", "/out.mkv", &p, &settings, &config, true);
        let vf_idx = plan.args.iter().position(|a| a == "-vf").unwrap();
        assert!(plan.args[vf_idx + 1].contains("scale_cuda=1920:1080"));
        let idx = plan.args.iter().position(|a| a == "-b:v").unwrap();
        let value: i64 = plan.args[idx + 1].parse().unwrap();
        assert_eq!(value, 6_000_000);
    }

    #[test]
    fn hdr_chain_includes_tonemap_and_gpu_download_when_downscaling() {
        let p = probe(Some(20_000_000), Some(2160), true, true);
        let settings = EncodingSettings::default();
        let config = PlanConfig::default();
        let plan = build_plan("/in.mkv", "/out.mkv", &p, &settings, &config, true);
        let vf_idx = plan.args.iter().position(|a| a == "-vf").unwrap();
        let chain = &plan.args[vf_idx + 1];
        assert!(chain.contains("hwdownload"));
        assert!(chain.contains("tonemap=tonemap=hable:desat=0"));
        assert!(chain.contains("format=yuv420p"));
    }
}
