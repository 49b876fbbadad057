//! Frame/time conversion and display helpers

/// Convert a frame count at `sample_rate` into seconds
pub fn frames_to_seconds(frames: u64, sample_rate: u32) -> f32 {
    if sample_rate == 0 {
        return 0.0;
    }
    (frames as f64 / sample_rate as f64) as f32
}

/// Convert seconds into a frame index at `sample_rate`, clamping negatives to 0
pub fn seconds_to_frames(seconds: f32, sample_rate: u32) -> u64 {
    if seconds <= 0.0 || !seconds.is_finite() {
        return 0;
    }
    (seconds as f64 * sample_rate as f64) as u64
}

/// Format seconds as `M:SS.s` for playback progress display
pub fn format_clock(seconds: f32) -> String {
    let seconds = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
    let minutes = (seconds / 60.0).floor() as u64;
    let secs = seconds - minutes as f32 * 60.0;
    format!("{}:{:04.1}", minutes, secs)
}
