//! Semantic placement of new nodes
//!
//! The layout square is [-1, 1]² with +y up. Every node falls into one of three
//! vertical bands: sky elements sit near the top, underground elements near the
//! bottom and everything else in the surface band between them.
//!
//! Placement is deterministic: the same graph and the same node always give
//! the same position.

use crate::graph::{LayoutBand, Position, SceneGraph, SemanticType};
use std::f64::consts::PI;

/// Inclusive y-range of each band
pub const SKY_BAND: (f64, f64) = (0.55, 0.95);
pub const SURFACE_BAND: (f64, f64) = (-0.35, 0.45);
pub const UNDERGROUND_BAND: (f64, f64) = (-0.95, -0.55);

/// Horizontal extent used for spreading siblings
const X_SPREAD: f64 = 0.85;

/// Step between successive spiral rings when resolving a collision
const SPIRAL_STEP: f64 = 0.05;

const MAX_SPIRAL_STEPS: usize = 512;

const COLLISION_EPSILON: f64 = 1e-9;

const SKY_WORDS: &[&str] = &[
    "sky", "cloud", "clouds", "canopy", "tower", "watchtower", "roof", "rooftop", "rooftops",
    "top", "high", "spire", "summit", "peak", "airship", "balcony", "belfry", "attic",
];

const UNDERGROUND_WORDS: &[&str] = &[
    "underground", "cave", "caves", "cavern", "dungeon", "cellar", "below", "root", "roots",
    "crypt", "catacomb", "catacombs", "mine", "tunnel", "sewer", "sewers", "basement", "vault",
];

pub fn band_range(band: LayoutBand) -> (f64, f64) {
    match band {
        LayoutBand::Sky => SKY_BAND,
        LayoutBand::Surface => SURFACE_BAND,
        LayoutBand::Underground => UNDERGROUND_BAND,
    }
}

/// Band for a node: the semantic type decides first, then name keywords
pub fn infer_band(semantic_type: &SemanticType, name: &str) -> LayoutBand {
    if let Some(band) = semantic_type.band() {
        return band;
    }

    let lowered = name.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    if words.iter().any(|w| UNDERGROUND_WORDS.contains(w)) {
        LayoutBand::Underground
    } else if words.iter().any(|w| SKY_WORDS.contains(w)) {
        LayoutBand::Sky
    } else {
        LayoutBand::Surface
    }
}

/// Band an existing position falls in, if any
pub fn band_of(position: Position) -> Option<LayoutBand> {
    [LayoutBand::Sky, LayoutBand::Surface, LayoutBand::Underground]
        .into_iter()
        .find(|band| {
            let (lo, hi) = band_range(*band);
            position.y >= lo && position.y <= hi
        })
}

/// Position for a node about to join `graph`
///
/// x is spread over the band by the number of siblings already in it and y
/// is the band centre nudged per sibling. An exact collision with an
/// existing node is resolved by [`resolve_collision`].
pub fn place(graph: &SceneGraph, semantic_type: &SemanticType, name: &str) -> Position {
    let band = infer_band(semantic_type, name);
    let siblings = graph
        .nodes()
        .filter(|n| infer_band(&n.semantic_type, &n.name) == band)
        .count();

    let (lo, hi) = band_range(band);
    let centre = (lo + hi) / 2.0;
    let quarter = (hi - lo) / 4.0;

    let x = spread(siblings) * X_SPREAD;
    let y = centre + (((siblings % 3) as f64) - 1.0) * quarter;

    resolve_collision(graph, Position::new(x, y), band)
}

/// Low-discrepancy sequence over [-1, 1]: 0, then alternating sides
fn spread(index: usize) -> f64 {
    if index == 0 {
        return 0.0;
    }
    let golden = (5f64.sqrt() - 1.0) / 2.0;
    ((index as f64) * golden).fract() * 2.0 - 1.0
}

fn occupied(graph: &SceneGraph, candidate: Position) -> bool {
    graph.nodes().any(|n| {
        (n.position.x - candidate.x).abs() < COLLISION_EPSILON
            && (n.position.y - candidate.y).abs() < COLLISION_EPSILON
    })
}

/// Step along a golden-angle spiral until `candidate` no longer coincides
/// with an existing node; results are clamped into `band`
pub fn resolve_collision(graph: &SceneGraph, candidate: Position, band: LayoutBand) -> Position {
    if !occupied(graph, candidate) {
        return candidate;
    }

    let golden_angle = PI * (3.0 - 5f64.sqrt());
    let (lo, hi) = band_range(band);
    let mut last = candidate;

    for k in 1..=MAX_SPIRAL_STEPS {
        let radius = SPIRAL_STEP * k as f64;
        let angle = golden_angle * k as f64;
        let next = Position::new(
            (candidate.x + radius * angle.cos()).clamp(-1.0, 1.0),
            (candidate.y + radius * angle.sin()).clamp(lo, hi),
        );
        if !occupied(graph, next) {
            return next;
        }
        last = next;
    }

    last
}
