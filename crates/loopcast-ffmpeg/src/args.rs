//! ffmpeg command lines.

use std::path::Path;

use loopcast_ipc::redact_key;

use crate::{FfmpegSettings, MasterConfig};

/// Feeder: read one pre-normalized file at native rate and stream-copy it as
/// MPEG-TS to stdout. H.264 is rewritten to Annex B so segments concatenate.
pub fn feeder_args(settings: &FfmpegSettings, input: &Path) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-nostdin".into(),
        "-loglevel".into(),
        settings.log_level.clone(),
        "-re".into(),
        "-i".into(),
        input.to_string_lossy().into_owned(),
    ];
    args.extend(
        [
            "-map", "0:v:0", "-map", "0:a:0?", "-c", "copy", "-bsf:v", "h264_mp4toannexb", "-f",
            "mpegts", "pipe:1",
        ]
        .map(String::from),
    );
    args
}

/// Master: read the concatenated MPEG-TS from stdin, re-encode with wallclock
/// timestamps (segments restart their own clocks at every file boundary),
/// optionally mix in looping background audio, and publish as FLV.
pub fn master_args(settings: &FfmpegSettings, config: &MasterConfig) -> Vec<String> {
    let bitrate = config.video_bitrate_kbps();
    let gop = settings
        .fps
        .saturating_mul(settings.keyframe_interval_secs)
        .max(1);

    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        settings.log_level.clone(),
        "-use_wallclock_as_timestamps".into(),
        "1".into(),
        "-fflags".into(),
        "+genpts+discardcorrupt".into(),
        "-f".into(),
        "mpegts".into(),
        "-i".into(),
        "pipe:0".into(),
    ];

    match config.overlay() {
        Some(overlay) => {
            args.extend(["-stream_loop", "-1", "-i"].map(String::from));
            args.push(overlay.path.to_string_lossy().into_owned());
            args.push("-filter_complex".into());
            args.push(format!(
                "[1:a]volume={:.2}[bg];[0:a][bg]amix=inputs=2:duration=first:dropout_transition=0,aresample=async=1[aout]",
                overlay.weight
            ));
            args.extend(["-map", "0:v:0", "-map", "[aout]"].map(String::from));
        }
        None => {
            args.extend(["-map", "0:v:0", "-map", "0:a:0?", "-af", "aresample=async=1"].map(String::from));
        }
    }

    args.extend(["-c:v", "libx264", "-preset"].map(String::from));
    args.push(settings.preset.clone());
    args.extend([
        "-b:v".to_string(),
        format!("{bitrate}k"),
        "-maxrate".to_string(),
        format!("{bitrate}k"),
        "-bufsize".to_string(),
        format!("{}k", bitrate.saturating_mul(2)),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-r".to_string(),
        settings.fps.to_string(),
        "-g".to_string(),
        gop.to_string(),
        "-keyint_min".to_string(),
        gop.to_string(),
        "-sc_threshold".to_string(),
        "0".to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-b:a".to_string(),
        format!("{}k", settings.audio_bitrate_kbps),
        "-ar".to_string(),
        settings.audio_sample_rate.to_string(),
        "-ac".to_string(),
        "2".to_string(),
        "-f".to_string(),
        "flv".to_string(),
        config.endpoint().publish_url(),
    ]);
    args
}

/// Copy of `args` with stream keys masked, for logging.
pub fn redact_args(args: &[String]) -> Vec<String> {
    args.iter().map(|arg| redact_arg(arg)).collect()
}

/// Mask the key of every RTMP URL inside a free-form log line, such as
/// ffmpeg's `Error opening output rtmp://host/app/KEY: I/O error`.
pub(crate) fn redact_line(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut rest = line;
    while let Some(start) = find_rtmp_url(rest) {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let end = tail
            .find(|c: char| c.is_whitespace() || c == '\'' || c == '"')
            .unwrap_or(tail.len());
        let token = &tail[..end];
        let url = token.trim_end_matches([':', ',', ';', '.']);
        out.push_str(&redact_arg(url));
        out.push_str(&token[url.len()..]);
        rest = &tail[end..];
    }
    out.push_str(rest);
    out
}

fn find_rtmp_url(text: &str) -> Option<usize> {
    match (text.find("rtmp://"), text.find("rtmps://")) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn redact_arg(arg: &str) -> String {
    if !(arg.starts_with("rtmp://") || arg.starts_with("rtmps://")) {
        return arg.to_string();
    }
    match arg.rsplit_once('/') {
        Some((base, key)) if !base.ends_with('/') => format!("{base}/{}", redact_key(key)),
        _ => arg.to_string(),
    }
}
