//! Easing curves used by the entrance animation.
//!
//! All functions take a normalised progress in `[0, 1]` and return exact
//! endpoint values at `0` and `1`.

use std::f32::consts::{PI, TAU};

const ELASTIC_PERIOD: f32 = TAU / 3.0;

/// Normalises `elapsed / duration` into `[0, 1]`. NaN and negative inputs map
/// to `0`, anything past the duration maps to exactly `1`.
#[inline]
pub fn clamp_progress(elapsed_ms: f64, duration_ms: f64) -> f32 {
    if duration_ms <= 0.0 {
        return 1.0;
    }
    let ratio = elapsed_ms / duration_ms;
    if ratio.is_nan() || ratio <= 0.0 {
        0.0
    } else if ratio >= 1.0 {
        1.0
    } else {
        ratio as f32
    }
}

/// Exponentially damped sine that overshoots past `1` before settling there.
#[inline]
pub fn elastic_out(t: f32) -> f32 {
    if t <= 0.0 {
        return 0.0;
    }
    if t >= 1.0 {
        return 1.0;
    }
    2f32.powf(-10.0 * t) * ((t * 10.0 - 0.75) * ELASTIC_PERIOD).sin() + 1.0
}

#[inline]
pub fn cubic_out(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    let inv = 1.0 - t;
    1.0 - inv * inv * inv
}

/// Hermite blend, `3t² - 2t³`.
#[inline]
pub fn smooth_step(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Interpolation that lands exactly on `b` when `t == 1`, even when `t`
/// came out of an overshooting curve.
#[inline]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a * (1.0 - t) + b * t
}

/// Wraps an angle into `(-π, π]`.
#[inline]
pub fn wrap_angle(angle: f32) -> f32 {
    let wrapped = (angle + PI).rem_euclid(TAU) - PI;
    if wrapped <= -PI {
        wrapped + TAU
    } else {
        wrapped
    }
}
