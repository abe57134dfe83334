#![allow(dead_code)]

use framelabel::ir::Region;
use proptest::prelude::*;
use proptest::strategy::BoxedStrategy;
use proptest::test_runner::{Config as ProptestConfig, FileFailurePersistence};

/// Pixel tolerance for a normalize/denormalize round trip.
pub const EPS_ROUNDTRIP: f64 = 1e-4;

pub fn proptest_config() -> ProptestConfig {
    let cases = std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(64);

    let mut config = ProptestConfig::with_failure_persistence(FileFailurePersistence::WithSource(
        "proptest-regressions",
    ));
    config.cases = cases;
    config.max_shrink_iters = 1024;
    config
}

pub fn arb_frame_size() -> BoxedStrategy<(u32, u32)> {
    (1u32..=4096, 1u32..=4096).boxed()
}

/// A non-degenerate region lying inside a `width` x `height` frame.
pub fn arb_region_within(width: u32, height: u32) -> BoxedStrategy<Region> {
    let w = width as f64;
    let h = height as f64;
    (0.0..w, 0.0..h, 0.0..1.0f64, 0.0..1.0f64)
        .prop_filter_map("region has no area", move |(x, y, fw, fh)| {
            let width = (w - x) * fw;
            let height = (h - y) * fh;
            (width > 1e-3 && height > 1e-3).then(|| Region::new(x, y, width, height))
        })
        .boxed()
}

pub fn arb_frame_and_region() -> BoxedStrategy<((u32, u32), Region)> {
    arb_frame_size()
        .prop_flat_map(|(w, h)| (Just((w, h)), arb_region_within(w, h)))
        .boxed()
}

/// Label text with random case and surrounding whitespace.
pub fn arb_label_variant() -> BoxedStrategy<(String, String)> {
    ("[a-z]{1,12}", "[ \t]{0,3}", "[ \t]{0,3}", any::<u64>())
        .prop_map(|(base, lead, trail, case_bits)| {
            let varied: String = base
                .chars()
                .enumerate()
                .map(|(i, c)| {
                    if (case_bits >> (i % 64)) & 1 == 1 {
                        c.to_ascii_uppercase()
                    } else {
                        c
                    }
                })
                .collect();
            (base, format!("{lead}{varied}{trail}"))
        })
        .boxed()
}

pub fn assert_regions_close(a: &Region, b: &Region, eps: f64) -> Result<(), String> {
    let pairs = [
        ("x", a.x, b.x),
        ("y", a.y, b.y),
        ("width", a.width, b.width),
        ("height", a.height, b.height),
    ];
    for (name, left, right) in pairs {
        if (left - right).abs() > eps {
            return Err(format!("{name} differs: {left} vs {right} (eps {eps})"));
        }
    }
    Ok(())
}

/// Tolerance after a label file round trip (six decimal places).
pub fn eps_label_file(image_w: u32, image_h: u32) -> f64 {
    image_w.max(image_h) as f64 * 1e-6
}
