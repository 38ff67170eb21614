//! Segment trail sampler
//!
//! A body only ever records where its head has been. This module turns that
//! raw, unevenly spaced trail into the list of visible segments that clients
//! draw and the server collides against:
//!
//! - the segment count follows the body's mass, but approaches it a small
//!   step per tick so bodies grow and shrink smoothly
//! - segments are laid out at fixed arc-length spacing from the head; the
//!   spacing widens slightly for long bodies
//! - a fractional segment count produces one extra tail segment with partial
//!   opacity, so growth fades in instead of popping
//!
//! The 100 segment cap is enforced when computing the target, when clamping
//! the smoothed count and while emitting segments.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::game::constants::segments::*;
use crate::util::vec2::Vec2;

/// One rendered/collidable body segment
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VisibleSegment {
    pub x: f32,
    pub y: f32,
    pub opacity: f32,
}

impl VisibleSegment {
    #[inline]
    pub fn position(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }
}

/// Raw head history, newest point first
#[derive(Debug, Clone, Default)]
pub struct Trail {
    points: VecDeque<Vec2>,
}

impl Trail {
    pub fn new(head: Vec2) -> Self {
        let mut points = VecDeque::with_capacity(64);
        points.push_front(head);
        Self { points }
    }

    /// Record a new head position.
    ///
    /// A point is only added once the head has moved `TRAIL_SAMPLE_DISTANCE`
    /// away from the newest one; otherwise the newest point follows the head.
    pub fn record(&mut self, head: Vec2) {
        let should_push = self
            .points
            .front()
            .map(|p| p.distance_to(head) >= TRAIL_SAMPLE_DISTANCE)
            .unwrap_or(true);

        if should_push {
            self.points.push_front(head);
        } else if let Some(front) = self.points.front_mut() {
            *front = head;
        }
    }

    /// Drop the oldest points beyond the mass-proportional limit
    pub fn truncate_for_mass(&mut self, mass: f32) {
        let keep = max_trail_points(mass);
        while self.points.len() > keep {
            self.points.pop_back();
        }
    }

    /// Shift every point, used when a body is slid without steering
    pub fn translate(&mut self, offset: Vec2) {
        for p in self.points.iter_mut() {
            *p += offset;
        }
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &VecDeque<Vec2> {
        &self.points
    }
}

impl From<Vec<Vec2>> for Trail {
    fn from(points: Vec<Vec2>) -> Self {
        Self {
            points: VecDeque::from(points),
        }
    }
}

/// Number of trail points retained for a body of `mass`
pub fn max_trail_points(mass: f32) -> usize {
    target_segment_count(mass) * TRAIL_POINTS_PER_SEGMENT + TRAIL_POINT_SLACK
}

/// Segment count a body of `mass` converges to
pub fn target_segment_count(mass: f32) -> usize {
    if !mass.is_finite() || mass <= 0.0 {
        return 0;
    }
    ((mass / MASS_PER_SEGMENT).floor() as usize).min(MAX_SEGMENTS)
}

/// Arc-length spacing for a body currently showing `segment_count` segments
pub fn segment_spacing(segment_count: f32) -> f32 {
    BASE_SPACING * (1.0 + segment_count.max(0.0) * SPACING_GROWTH)
}

/// Persistent per-body sampling state
#[derive(Debug, Clone)]
pub struct TrailSampler {
    current_segment_count: f32,
}

impl TrailSampler {
    /// A sampler already settled on the segment count for `mass`
    pub fn new(mass: f32) -> Self {
        Self {
            current_segment_count: (target_segment_count(mass) as f32)
                .clamp(1.0, MAX_SEGMENTS as f32),
        }
    }

    pub fn current_segment_count(&self) -> f32 {
        self.current_segment_count
    }

    /// Step the smoothed count one tick toward the mass-derived target
    pub fn advance(&mut self, mass: f32) -> f32 {
        if !self.current_segment_count.is_finite() {
            self.current_segment_count = 1.0;
        }

        let target = target_segment_count(mass) as f32;
        let diff = target - self.current_segment_count;
        if diff.abs() <= GROWTH_STEP {
            self.current_segment_count = target;
        } else {
            self.current_segment_count += GROWTH_STEP * diff.signum();
        }

        self.current_segment_count = self.current_segment_count.clamp(1.0, MAX_SEGMENTS as f32);
        self.current_segment_count
    }

    /// Advance one tick and resample `trail`
    pub fn sample(&mut self, trail: &Trail, mass: f32) -> Vec<VisibleSegment> {
        let count = self.advance(mass);
        resample(trail, count)
    }
}

/// Lay out `segment_count` segments along `trail`, head first.
///
/// Returns an empty list for an empty or corrupt trail.
pub fn resample(trail: &Trail, segment_count: f32) -> Vec<VisibleSegment> {
    let points = trail.points();
    if points.is_empty() || !segment_count.is_finite() {
        return Vec::new();
    }
    if points.iter().any(|p| !p.is_finite()) {
        return Vec::new();
    }

    let count = segment_count.clamp(1.0, MAX_SEGMENTS as f32);
    let full = count.floor() as usize;
    let fraction = count - full as f32;
    let wanted = if fraction > f32::EPSILON { full + 1 } else { full }.min(MAX_SEGMENTS);

    let tail_opacity = fraction.clamp(MIN_TAIL_OPACITY, 1.0);
    let opacity_at = |index: usize| if index < full { 1.0 } else { tail_opacity };

    let spacing = segment_spacing(count);
    let mut segments = Vec::with_capacity(wanted);

    let head = points[0];
    segments.push(VisibleSegment {
        x: head.x,
        y: head.y,
        opacity: opacity_at(0),
    });

    let mut travelled = 0.0;
    for (a, b) in points.iter().zip(points.iter().skip(1)) {
        if segments.len() >= wanted {
            break;
        }

        let edge = a.distance_to(*b);
        if edge <= 1e-4 {
            continue;
        }

        while segments.len() < wanted {
            let index = segments.len();
            let at = index as f32 * spacing;
            if at > travelled + edge {
                break;
            }
            let p = a.lerp(*b, (at - travelled) / edge);
            segments.push(VisibleSegment {
                x: p.x,
                y: p.y,
                opacity: opacity_at(index),
            });
        }

        travelled += edge;
    }

    segments.truncate(MAX_SEGMENTS);
    segments
}
