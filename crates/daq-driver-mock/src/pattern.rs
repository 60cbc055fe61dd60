//! Synthetic signal generation for mock sources.

use std::f64::consts::TAU;

/// Simple pseudo-random number generator (LCG) for reproducible noise.
/// Uses the same algorithm as glibc for predictable cross-platform behavior.
#[inline]
fn prng(seed: u64) -> u64 {
    seed.wrapping_mul(1103515245).wrapping_add(12345) & 0x7fffffff
}

/// Noise in `[-amplitude, amplitude)` for a given channel and row.
fn noise(channel: usize, row: u64, amplitude: f64) -> f64 {
    let seed = prng(row.wrapping_mul(2654435761) ^ (channel as u64).wrapping_mul(40503));
    let unit = (seed & 0xFFFF) as f64 / 65536.0;
    (unit * 2.0 - 1.0) * amplitude
}

/// One analog input sample in volts.
///
/// Channel `c` carries a `(c + 1)` Hz sine of 1 V amplitude with a phase offset
/// and a few millivolts of deterministic noise, so interleave order is visible
/// in the output and two runs with the same rate produce identical files.
pub fn analog_sample(channel: usize, row: u64, rate_hz: u32) -> f64 {
    let t = row as f64 / f64::from(rate_hz.max(1));
    let freq = (channel + 1) as f64;
    let phase = channel as f64 * 0.5;
    (TAU * freq * t + phase).sin() + noise(channel, row, 0.005)
}

/// Fill one interleaved row of `out.len()` channels.
pub fn analog_row(row: u64, rate_hz: u32, out: &mut [f64]) {
    for (channel, slot) in out.iter_mut().enumerate() {
        *slot = analog_sample(channel, row, rate_hz);
    }
}

/// Flex sensor angle in degrees for line `index` at `rate_hz`.
///
/// A slow 0.25 Hz bend of +-30 degrees, quantized to 0.01 degree like the
/// sensor's own two-decimal output.
pub fn flex_angle(index: u64, rate_hz: u32) -> f64 {
    let t = index as f64 / f64::from(rate_hz.max(1));
    let raw = 30.0 * (TAU * 0.25 * t).sin() + noise(0, index, 0.05);
    (raw * 100.0).round() / 100.0
}
