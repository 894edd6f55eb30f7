//! Viseme cues and the shape-weight interpolation that animates them.
//!
//! Cues come out of rhubarb-lip-sync as letter shapes (`A`..`H`, `X` for
//! rest). The animator samples [`interpolate`] once per frame with the time
//! elapsed since the segment started playing.

use crate::defaults::LERP_DURATION_SECS;
use crate::pipeline::types::{ShapeWeights, VisemeCue};
use serde::Deserialize;

/// Blendshape weights for each rhubarb mouth shape.
///
/// Unknown shapes have no entry and animate as an all-zero table.
pub fn shape_table(shape: &str) -> &'static [(&'static str, f64)] {
    match shape {
        "A" => &[("jawOpen", 0.0), ("mouthClose", 1.0)],
        "B" => &[("jawOpen", 0.2), ("mouthClose", 0.0)],
        "C" => &[("jawOpen", 0.5), ("mouthFunnel", 0.3), ("mouthOpen", 0.7)],
        "D" => &[("jawOpen", 0.8), ("mouthOpen", 1.0)],
        "E" => &[("jawOpen", 0.4), ("mouthPucker", 0.6)],
        "F" => &[("jawOpen", 0.2), ("mouthPucker", 0.9)],
        "G" => &[("jawOpen", 0.1), ("mouthFunnel", 0.5), ("mouthClose", 0.3)],
        "H" => &[("jawOpen", 0.3), ("mouthOpen", 0.4)],
        _ => &[],
    }
}

/// Base weights for a shape as an owned map.
pub fn shape_weights(shape: &str) -> ShapeWeights {
    shape_table(shape)
        .iter()
        .map(|(name, weight)| ((*name).to_string(), *weight))
        .collect()
}

/// Linear blend from `a` to `b` over the union of their keys.
///
/// Missing entries count as zero.
pub fn blend(a: &ShapeWeights, b: &ShapeWeights, t: f64) -> ShapeWeights {
    let mut result = ShapeWeights::new();
    for key in a.keys().chain(b.keys()) {
        if result.contains_key(key) {
            continue;
        }
        let va = a.get(key).copied().unwrap_or(0.0);
        let vb = b.get(key).copied().unwrap_or(0.0);
        result.insert(key.clone(), va + (vb - va) * t);
    }
    result
}

/// Shape weights at `elapsed` seconds into a segment.
///
/// Returns an empty map when no cue covers `elapsed`. During the final
/// [`LERP_DURATION_SECS`] of a cue that has a successor, the weights
/// crossfade toward the successor's table.
pub fn interpolate(cues: &[VisemeCue], elapsed: f64) -> ShapeWeights {
    let Some(position) = cues.iter().position(|cue| cue.contains(elapsed)) else {
        return ShapeWeights::new();
    };

    let current = &cues[position];
    let current_shapes = shape_weights(&current.shape);

    if let Some(next) = cues.get(position + 1) {
        let remaining = current.end() - elapsed;
        if remaining <= LERP_DURATION_SECS {
            let t = 1.0 - remaining / LERP_DURATION_SECS;
            return blend(&current_shapes, &shape_weights(&next.shape), t);
        }
    }

    current_shapes
}

/// JSON document printed by `rhubarb --exportFormat json`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RhubarbOutput {
    pub mouth_cues: Vec<RhubarbCue>,
}

/// One entry of rhubarb's `mouthCues` array.
#[derive(Debug, Clone, Deserialize)]
pub struct RhubarbCue {
    pub start: f64,
    pub end: f64,
    pub value: String,
}

/// Converts rhubarb cues to full-weight viseme cues.
pub fn map_rhubarb_cues(output: RhubarbOutput) -> Vec<VisemeCue> {
    output
        .mouth_cues
        .into_iter()
        .map(|cue| VisemeCue {
            time: cue.start,
            duration: cue.end - cue.start,
            shape: cue.value,
            weight: 1.0,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cue(time: f64, shape: &str, duration: f64) -> VisemeCue {
        VisemeCue {
            time,
            shape: shape.to_string(),
            weight: 1.0,
            duration,
        }
    }

    #[test]
    fn test_empty_cues_yield_empty_weights() {
        for t in [-1.0, 0.0, 0.3, 100.0] {
            assert!(interpolate(&[], t).is_empty());
        }
    }

    #[test]
    fn test_single_cue_at_start_matches_table() {
        let cues = [cue(0.0, "D", 0.5)];
        assert_eq!(interpolate(&cues, 0.0), shape_weights("D"));
    }

    #[test]
    fn test_last_cue_never_blends() {
        let cues = [cue(0.0, "C", 0.5)];
        assert_eq!(interpolate(&cues, 0.49), shape_weights("C"));
    }

    #[test]
    fn test_outside_all_cues_is_idle() {
        let cues = [cue(0.2, "B", 0.3)];
        assert!(interpolate(&cues, 0.1).is_empty());
        assert!(interpolate(&cues, 0.5).is_empty());
    }

    #[test]
    fn test_unknown_shape_is_empty_table() {
        let cues = [cue(0.0, "viseme_aa", 0.5)];
        assert!(interpolate(&cues, 0.1).is_empty());
        assert!(shape_weights("Z").is_empty());
        assert!(shape_weights("X").is_empty());
    }

    #[test]
    fn test_blend_window_moves_monotonically_toward_next_cue() {
        // D: jawOpen 0.8, mouthOpen 1.0 → A: jawOpen 0.0, mouthClose 1.0
        let cues = [cue(0.0, "D", 0.5), cue(0.5, "A", 0.5)];
        let samples: Vec<ShapeWeights> = [0.421, 0.44, 0.46, 0.48, 0.499]
            .iter()
            .map(|t| interpolate(&cues, *t))
            .collect();

        for pair in samples.windows(2) {
            let (earlier, later) = (&pair[0], &pair[1]);
            assert!(later["jawOpen"] < earlier["jawOpen"]);
            assert!(later["mouthOpen"] < earlier["mouthOpen"]);
            assert!(later["mouthClose"] > earlier["mouthClose"]);
        }

        let last = &samples[samples.len() - 1];
        assert!(last["mouthClose"] > 0.9);
        assert!(last["jawOpen"] < 0.1);
    }

    #[test]
    fn test_before_blend_window_is_pure_table() {
        let cues = [cue(0.0, "D", 0.5), cue(0.5, "A", 0.5)];
        assert_eq!(interpolate(&cues, 0.3), shape_weights("D"));
    }

    #[test]
    fn test_blend_halfway() {
        let cues = [cue(0.0, "E", 0.5), cue(0.5, "F", 0.5)];
        let weights = interpolate(&cues, 0.46);
        assert!((weights["jawOpen"] - 0.3).abs() < 1e-9);
        assert!((weights["mouthPucker"] - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_blend_covers_union_of_keys() {
        let a = shape_weights("C");
        let b = shape_weights("A");
        let mid = blend(&a, &b, 0.5);
        let keys: Vec<&str> = mid.keys().map(String::as_str).collect();
        assert_eq!(keys, ["jawOpen", "mouthClose", "mouthFunnel", "mouthOpen"]);
        assert!((mid["mouthFunnel"] - 0.15).abs() < 1e-9);
        assert!((mid["mouthClose"] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_map_rhubarb_cues() {
        let output: RhubarbOutput = serde_json::from_str(
            r#"{
                "metadata": {"soundFile": "audio.wav", "duration": 1.0},
                "mouthCues": [
                    {"start": 0.0, "end": 0.5, "value": "B"},
                    {"start": 0.5, "end": 1.0, "value": "D"}
                ]
            }"#,
        )
        .unwrap();

        let cues = map_rhubarb_cues(output);
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[0], cue(0.0, "B", 0.5));
        assert_eq!(cues[1].shape, "D");
        assert!((cues[1].duration - 0.5).abs() < 1e-9);
    }
}
