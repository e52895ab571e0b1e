//! Media probing with ffprobe.

use std::path::Path;

use serde_json::Value;

use super::runner::{ToolCommand, ToolError, ToolRunner};

/// Get the container duration of a media file in seconds.
pub fn probe_duration(runner: &ToolRunner, ffprobe: &str, path: &Path) -> Result<f64, ToolError> {
    let command = ToolCommand::new(ffprobe)
        .args(["-v", "error", "-show_entries", "format=duration"])
        .args(["-of", "default=noprint_wrappers=1:nokey=1"])
        .arg(path);
    let output = runner.run(&command)?;

    parse_duration(&output.stdout).ok_or_else(|| {
        ToolError::bad_output(
            command.tool_name(),
            format!("no duration reported for {}", path.display()),
        )
    })
}

/// Get the frame rate of the first video stream, if it can be determined.
///
/// Probe failures are logged and reported as `None`; callers fall back to
/// a configured default. Cancellation still propagates.
pub fn probe_frame_rate(
    runner: &ToolRunner,
    ffprobe: &str,
    path: &Path,
) -> Result<Option<f64>, ToolError> {
    let command = ToolCommand::new(ffprobe)
        .args(["-v", "error", "-select_streams", "v:0"])
        .args(["-show_entries", "stream=r_frame_rate,avg_frame_rate"])
        .args(["-of", "json"])
        .arg(path);

    let output = match runner.run(&command) {
        Ok(output) => output,
        Err(e) if e.is_cancelled() => return Err(e),
        Err(e) => {
            runner
                .logger()
                .warn(&format!("Could not probe frame rate: {}", e));
            return Ok(None);
        }
    };

    let json: Value = match serde_json::from_str(&output.stdout) {
        Ok(v) => v,
        Err(e) => {
            runner
                .logger()
                .warn(&format!("Unreadable ffprobe output: {}", e));
            return Ok(None);
        }
    };

    Ok(frame_rate_from_json(&json))
}

fn parse_duration(stdout: &str) -> Option<f64> {
    stdout
        .lines()
        .filter_map(|l| l.trim().parse::<f64>().ok())
        .find(|d| d.is_finite() && *d > 0.0)
}

fn frame_rate_from_json(json: &Value) -> Option<f64> {
    let stream = json.get("streams")?.as_array()?.first()?;
    // r_frame_rate is more reliable than avg_frame_rate for constant-rate video
    ["r_frame_rate", "avg_frame_rate"]
        .iter()
        .filter_map(|key| stream.get(*key).and_then(|v| v.as_str()))
        .find_map(parse_fps_fraction)
}

/// Parse an ffprobe rate such as `24000/1001` or `25`.
pub fn parse_fps_fraction(rate: &str) -> Option<f64> {
    let fps = match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => rate.trim().parse().ok()?,
    };
    (fps.is_finite() && fps > 0.0).then_some(fps)
}
