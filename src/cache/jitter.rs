//! Randomised expirations.
//!
//! Keys written together with the same base TTL would otherwise expire together
//! and send a burst of misses to the durable store. Each TTL is drawn uniformly
//! from `base ± base * percent / 100`.

use std::time::Duration;

use plaza_api_types::JitterReport;
use rand::Rng;

/// Draw a jittered TTL using the thread-local RNG.
pub fn jittered_ttl(base: Duration, percent: u32) -> Duration {
    jittered_ttl_with(&mut rand::thread_rng(), base, percent)
}

/// Draw a jittered TTL from `rng`.
///
/// `percent` outside `1..=100` disables jitter. A draw that lands on zero is
/// floored to a tenth of the base so the key is never written already expired.
pub fn jittered_ttl_with<R: Rng>(rng: &mut R, base: Duration, percent: u32) -> Duration {
    if percent == 0 || percent > 100 {
        return base;
    }
    let base_ms = i64::try_from(base.as_millis()).unwrap_or(i64::MAX);
    let spread = base_ms.saturating_mul(i64::from(percent)) / 100;
    if spread == 0 {
        return base;
    }

    let offset = rng.gen_range(-spread..=spread);
    let ttl_ms = base_ms.saturating_add(offset);
    if ttl_ms <= 0 {
        return floor(base);
    }
    Duration::from_millis(ttl_ms as u64)
}

fn floor(base: Duration) -> Duration {
    (base / 10).max(Duration::from_millis(1))
}

/// Bounds every jittered draw falls within (before floor clamping).
pub fn jitter_bounds(base: Duration, percent: u32) -> (Duration, Duration) {
    if percent == 0 || percent > 100 {
        return (base, base);
    }
    let spread = base * percent / 100;
    (base.saturating_sub(spread), base + spread)
}

/// Sample `iterations` draws and summarise their distribution.
pub fn sample_jitter(base: Duration, percent: u32, iterations: u32) -> JitterReport {
    let mut rng = rand::thread_rng();
    let (expected_min, expected_max) = jitter_bounds(base, percent);

    let mut min_ms = u64::MAX;
    let mut max_ms = 0_u64;
    let mut total = 0_u128;
    for _ in 0..iterations {
        let ttl = jittered_ttl_with(&mut rng, base, percent).as_millis() as u64;
        min_ms = min_ms.min(ttl);
        max_ms = max_ms.max(ttl);
        total += u128::from(ttl);
    }
    if iterations == 0 {
        min_ms = 0;
    }

    JitterReport {
        base_ms: base.as_millis() as u64,
        percent,
        samples: iterations,
        min_ms,
        max_ms,
        mean_ms: if iterations == 0 {
            0.0
        } else {
            total as f64 / f64::from(iterations)
        },
        expected_min_ms: expected_min.as_millis() as u64,
        expected_max_ms: expected_max.as_millis() as u64,
    }
}
