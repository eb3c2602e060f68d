//! Face matcher: nearest known signature under a fixed Euclidean threshold,
//! with at most one acceptance per roll number per photo.

use std::collections::HashSet;

use crate::types::{BoundingBox, DetectedFace, Embedding, KnownFace};

/// A face is accepted only when its nearest known distance is strictly below this.
pub const MATCH_DISTANCE_THRESHOLD: f32 = 0.45;

/// Result of comparing one probe signature against the known list.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub matched: bool,
    /// Distance to the nearest known signature (`f32::INFINITY` if the list is empty).
    pub distance: f32,
    /// Index into the known list of the nearest entry, if any.
    pub index: Option<usize>,
}

/// A detected face accepted as a given student.
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptedMatch {
    pub roll_no: String,
    pub bbox: BoundingBox,
    pub distance: f32,
}

/// Strategy for comparing a probe signature against the known list.
pub trait Matcher {
    fn compare(&self, probe: &Embedding, known: &[KnownFace]) -> MatchResult;
}

/// Euclidean nearest-neighbour matcher.
#[derive(Debug, Clone, Copy)]
pub struct EuclideanMatcher {
    threshold: f32,
}

impl Default for EuclideanMatcher {
    fn default() -> Self {
        Self {
            threshold: MATCH_DISTANCE_THRESHOLD,
        }
    }
}

impl EuclideanMatcher {
    pub fn with_threshold(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Whether a nearest distance is close enough to accept.
    pub fn accepts(&self, distance: f32) -> bool {
        distance < self.threshold
    }
}

impl Matcher for EuclideanMatcher {
    fn compare(&self, probe: &Embedding, known: &[KnownFace]) -> MatchResult {
        let mut best_dist = f32::INFINITY;
        let mut best_idx: Option<usize> = None;

        // Strict `<` keeps the earliest entry on equal distances.
        for (i, face) in known.iter().enumerate() {
            let dist = probe.euclidean_distance(&face.signature);
            if dist < best_dist {
                best_dist = dist;
                best_idx = Some(i);
            }
        }

        MatchResult {
            matched: best_idx.is_some() && self.accepts(best_dist),
            distance: best_dist,
            index: best_idx,
        }
    }
}

/// Match every detected face, in detection order, against the known list.
///
/// Faces whose nearest distance is at or above the threshold are dropped.
/// When two faces resolve to the same roll number the first one wins and the
/// later one is dropped.
pub fn match_faces<M: Matcher>(
    matcher: &M,
    known: &[KnownFace],
    detected: &[DetectedFace],
) -> Vec<AcceptedMatch> {
    let mut accepted = Vec::new();
    if known.is_empty() {
        return accepted;
    }

    let mut seen: HashSet<&str> = HashSet::new();
    for (n, face) in detected.iter().enumerate() {
        let result = matcher.compare(&face.signature, known);
        let Some(idx) = result.index.filter(|_| result.matched) else {
            tracing::debug!(face = n, distance = result.distance, "face unmatched");
            continue;
        };

        let roll_no = known[idx].roll_no.as_str();
        if !seen.insert(roll_no) {
            tracing::debug!(face = n, roll_no, "duplicate match in photo dropped");
            continue;
        }

        accepted.push(AcceptedMatch {
            roll_no: roll_no.to_string(),
            bbox: face.bbox,
            distance: result.distance,
        });
    }

    accepted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn known(roll: &str, values: Vec<f32>) -> KnownFace {
        KnownFace {
            roll_no: roll.into(),
            signature: Embedding::new(values),
        }
    }

    fn face(values: Vec<f32>) -> DetectedFace {
        DetectedFace {
            bbox: BoundingBox { x: 0.0, y: 0.0, width: 10.0, height: 10.0 },
            signature: Embedding::new(values),
        }
    }

    #[test]
    fn test_threshold_constant_pinned() {
        assert_eq!(MATCH_DISTANCE_THRESHOLD, 0.45);
        assert_eq!(EuclideanMatcher::default().threshold(), 0.45);
    }

    #[test]
    fn test_accepts_boundary() {
        let m = EuclideanMatcher::default();
        assert!(m.accepts(0.449999));
        assert!(!m.accepts(0.45));
        assert!(!m.accepts(0.450001));
    }

    #[test]
    fn test_compare_boundary_distances() {
        let m = EuclideanMatcher::default();
        let gallery = vec![known("R1", vec![0.0])];

        let below = m.compare(&Embedding::new(vec![0.449999]), &gallery);
        assert!(below.matched);

        let at = m.compare(&Embedding::new(vec![0.45]), &gallery);
        assert_eq!(at.distance, 0.45);
        assert!(!at.matched);

        let above = m.compare(&Embedding::new(vec![0.450001]), &gallery);
        assert!(!above.matched);
    }

    #[test]
    fn test_compare_scans_whole_gallery() {
        // Nearest entry is the last one.
        let gallery = vec![
            known("decoy1", vec![1.0, 0.0]),
            known("decoy2", vec![0.0, 1.0]),
            known("match", vec![0.1, 0.1]),
        ];
        let result = EuclideanMatcher::default().compare(&Embedding::new(vec![0.1, 0.1]), &gallery);
        assert!(result.matched);
        assert_eq!(result.index, Some(2));
        assert_eq!(result.distance, 0.0);
    }

    #[test]
    fn test_compare_empty_gallery() {
        let result = EuclideanMatcher::default().compare(&Embedding::new(vec![0.0]), &[]);
        assert!(!result.matched);
        assert_eq!(result.index, None);
        assert_eq!(result.distance, f32::INFINITY);
    }

    #[test]
    fn test_match_faces_empty_known_is_empty() {
        let detected = vec![face(vec![0.0]), face(vec![1.0])];
        assert!(match_faces(&EuclideanMatcher::default(), &[], &detected).is_empty());
    }

    #[test]
    fn test_match_faces_first_detection_wins() {
        let gallery = vec![known("R1", vec![0.0, 0.0]), known("R2", vec![5.0, 5.0])];
        let mut second = face(vec![0.1, 0.0]);
        second.bbox.x = 99.0;
        let detected = vec![face(vec![0.2, 0.0]), second];

        let out = match_faces(&EuclideanMatcher::default(), &gallery, &detected);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].roll_no, "R1");
        // The first detection is kept even though the second one is closer.
        assert_eq!(out[0].bbox.x, 0.0);
        assert!((out[0].distance - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_match_faces_no_roll_twice() {
        let gallery = vec![
            known("A", vec![0.0, 0.0]),
            known("B", vec![1.0, 0.0]),
            known("C", vec![0.0, 1.0]),
        ];
        let detected = vec![
            face(vec![0.05, 0.0]),
            face(vec![0.95, 0.0]),
            face(vec![0.0, 0.05]),
            face(vec![0.0, 0.0]),
            face(vec![1.0, 0.05]),
            face(vec![0.0, 0.98]),
        ];
        let out = match_faces(&EuclideanMatcher::default(), &gallery, &detected);
        let rolls: Vec<&str> = out.iter().map(|m| m.roll_no.as_str()).collect();
        assert_eq!(rolls, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_match_faces_random_sets_never_repeat_a_roll() {
        use rand::rngs::StdRng;
        use rand::seq::SliceRandom;
        use rand::{Rng, SeedableRng};

        let matcher = EuclideanMatcher::default();
        for seed in 0..300u64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let dim = rng.gen_range(1..=4);
            let random_vec = |rng: &mut StdRng| (0..dim).map(|_| rng.gen_range(-1.0f32..1.0)).collect::<Vec<_>>();

            // Roll numbers may repeat in the gallery, as with re-registered photos.
            let gallery: Vec<KnownFace> = (0..rng.gen_range(0..6))
                .map(|_| {
                    let roll = format!("R{}", rng.gen_range(0..4));
                    known(&roll, random_vec(&mut rng))
                })
                .collect();

            let mut detected: Vec<DetectedFace> = Vec::new();
            for _ in 0..rng.gen_range(0..10) {
                let values = match gallery.choose(&mut rng) {
                    Some(k) if rng.gen_bool(0.7) => k
                        .signature
                        .values
                        .iter()
                        .map(|v| v + rng.gen_range(-0.3f32..0.3))
                        .collect(),
                    _ => random_vec(&mut rng),
                };
                detected.push(face(values));
            }
            detected.shuffle(&mut rng);
            for (i, d) in detected.iter_mut().enumerate() {
                d.bbox.x = i as f32;
            }

            let out = match_faces(&matcher, &gallery, &detected);

            let mut rolls: Vec<&str> = out.iter().map(|m| m.roll_no.as_str()).collect();
            let total = rolls.len();
            rolls.sort_unstable();
            rolls.dedup();
            assert_eq!(rolls.len(), total, "seed {seed}: roll recorded twice");
            if gallery.is_empty() {
                assert!(out.is_empty(), "seed {seed}");
            }

            // Accepted faces keep detection order, sit under the threshold, and
            // are the first detection resolving to their roll.
            let order: Vec<f32> = out.iter().map(|m| m.bbox.x).collect();
            assert!(order.windows(2).all(|w| w[0] < w[1]), "seed {seed}");
            for m in &out {
                assert!(m.distance < MATCH_DISTANCE_THRESHOLD, "seed {seed}");
                let first = detected.iter().position(|d| {
                    let r = matcher.compare(&d.signature, &gallery);
                    r.matched && r.index.map(|i| gallery[i].roll_no == m.roll_no).unwrap_or(false)
                });
                assert_eq!(first, Some(m.bbox.x as usize), "seed {seed}");
            }
        }
    }

    #[test]
    fn test_match_faces_mixed_known_and_unknown() {
        // R1 nearest at 0.3, R2 nearest at 0.6.
        let gallery = vec![known("R1", vec![0.0, 0.0]), known("R2", vec![10.0, 0.0])];
        let detected = vec![face(vec![0.3, 0.0]), face(vec![10.0, 0.6])];
        let out = match_faces(&EuclideanMatcher::default(), &gallery, &detected);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].roll_no, "R1");
    }

    #[test]
    fn test_match_faces_equal_distance_prefers_earlier_known() {
        let gallery = vec![known("first", vec![1.0]), known("second", vec![-1.0])];
        let m = EuclideanMatcher::with_threshold(2.0);
        let out = match_faces(&m, &gallery, &[face(vec![0.0])]);
        assert_eq!(out[0].roll_no, "first");
    }
}
