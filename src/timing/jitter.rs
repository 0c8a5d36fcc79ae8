//! Deterministic per-sample sub-pixel jitter.
//!
//! Offsets come from a Halton (2, 3) sequence indexed by the absolute sample index within the
//! run, so re-rendering the same frame reproduces the same jitter pattern.

/// Halton sequences lose precision quickly in `f32`; cycle well before that.
const HALTON_CYCLE: u64 = 1 << 13;

/// Radical inverse of `index` in `base`, in `[0, 1)`.
pub fn halton(mut index: u32, base: u32) -> f32 {
    let mut result = 0.0f32;
    let mut fraction = 1.0f32;
    let inv_base = 1.0 / base as f32;
    while index > 0 {
        fraction *= inv_base;
        result += fraction * (index % base) as f32;
        index /= base;
    }
    result
}

/// Sub-pixel offset in `[-0.5, 0.5)` for one sample of one output frame.
///
/// Negative `frame_index` values (warm-up and pre-roll frames) are clamped to 0 so they do not
/// perturb the sequence seen by real frames. Returns `(0, 0)` when a frame has a single sample.
pub fn sample_jitter(
    frame_index: i64,
    temporal_index: u32,
    temporal_count: u32,
    spatial_index: u32,
    spatial_count: u32,
) -> (f32, f32) {
    let temporal_count = temporal_count.max(1);
    let spatial_count = spatial_count.max(1);
    let samples_per_frame = u64::from(temporal_count) * u64::from(spatial_count);
    if samples_per_frame <= 1 {
        return (0.0, 0.0);
    }

    let frame = frame_index.max(0) as u64;
    let within_frame =
        u64::from(temporal_index) * u64::from(spatial_count) + u64::from(spatial_index);
    let index =
        (frame.wrapping_mul(samples_per_frame).wrapping_add(within_frame)) % HALTON_CYCLE + 1;

    let index = index as u32;
    (halton(index, 2) - 0.5, halton(index, 3) - 0.5)
}

#[cfg(test)]
#[path = "../../tests/unit/timing/jitter.rs"]
mod tests;
