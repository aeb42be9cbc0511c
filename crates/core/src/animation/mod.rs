//! Marker-driven overlay animation.
//!
//! [`compute_frame_state`] is the pure per-frame math; [`OverlayDriver`] is the
//! `Hidden → Entering → Steady` state machine that applies it to the
//! [`OverlayNode`] and issues playback commands.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::{
    config::AnimationConfig,
    easing::{cubic_out, elastic_out, lerp, smooth_step},
    scene::{AnimatedGroup, OverlayNode, Pose},
    timeline::AnimationTimeline,
    video::Playback,
    Result,
};

/// Below this horizontal distance the yaw is undefined and the previous one is kept.
const MIN_BILLBOARD_DISTANCE: f32 = 1e-5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverlayPhase {
    Hidden,
    Entering,
    Steady,
}

/// Start and end values of the entrance animation for one node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntranceParams {
    pub duration_ms: f64,
    pub start_scale: f32,
    pub end_scale: f32,
    pub rise_start: f32,
    pub rise_end: f32,
}

impl EntranceParams {
    pub fn for_node(node: &OverlayNode, config: &AnimationConfig) -> Self {
        Self {
            duration_ms: config.duration_ms,
            start_scale: config.start_scale,
            end_scale: config.end_scale,
            rise_start: node.grounded_rise(config.start_scale),
            rise_end: node.grounded_rise(config.end_scale) + config.hover_height,
        }
    }
}

/// Everything the renderer needs for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameState {
    pub progress: f32,
    pub scale: f32,
    pub rise: f32,
    /// World-space pivot position.
    pub position: Vec3,
    pub yaw: f32,
    pub opacity: f32,
}

impl FrameState {
    pub fn animated_group(&self) -> AnimatedGroup {
        AnimatedGroup {
            scale: self.scale,
            rise: self.rise,
            yaw: self.yaw,
            opacity: self.opacity,
        }
    }
}

/// Yaw around the vertical axis that turns the plane's +Z towards the camera.
/// Only the horizontal offset matters; pitch and roll are never corrected.
pub fn billboard_yaw(object: Vec3, camera: Vec3) -> f32 {
    let delta = camera - object;
    delta.x.atan2(delta.z)
}

pub fn compute_frame_state(
    timeline: &AnimationTimeline,
    now_ms: f64,
    anchor: &Pose,
    camera: &Pose,
    node: &OverlayNode,
    params: &EntranceParams,
) -> FrameState {
    let progress = timeline.progress(now_ms);
    let scale = lerp(params.start_scale, params.end_scale, elastic_out(progress));
    let rise = lerp(params.rise_start, params.rise_end, cubic_out(progress));
    let opacity = smooth_step(progress);
    let position = node.world_position(anchor, rise);

    let horizontal = (camera.position - position) * Vec3::new(1.0, 0.0, 1.0);
    let yaw = if horizontal.length() < MIN_BILLBOARD_DISTANCE {
        node.animated.yaw
    } else {
        billboard_yaw(position, camera.position)
    };

    FrameState {
        progress,
        scale,
        rise,
        position,
        yaw,
        opacity,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Marker became visible; the entrance restarted from its start pose.
    Acquired,
    /// Entrance finished; playback was requested if the video was paused.
    Settled,
    /// Marker was lost; the node is hidden and playback paused.
    Lost,
}

/// Outcome of one [`OverlayDriver::tick`].
#[derive(Debug, Default)]
pub struct TickReport {
    pub transitions: Vec<Transition>,
    /// Result of the play request issued when the entrance settled.
    pub playback: Option<Result<()>>,
    pub frame: Option<FrameState>,
}

impl TickReport {
    pub fn has(&self, transition: Transition) -> bool {
        self.transitions.contains(&transition)
    }
}

#[derive(Debug, Clone)]
pub struct OverlayDriver {
    phase: OverlayPhase,
    timeline: Option<AnimationTimeline>,
    params: EntranceParams,
}

impl OverlayDriver {
    pub fn new(params: EntranceParams) -> Self {
        Self {
            phase: OverlayPhase::Hidden,
            timeline: None,
            params,
        }
    }

    pub fn phase(&self) -> OverlayPhase {
        self.phase
    }

    pub fn timeline(&self) -> Option<&AnimationTimeline> {
        self.timeline.as_ref()
    }

    pub fn params(&self) -> &EntranceParams {
        &self.params
    }

    /// Advances the state machine by one rendered frame. `anchor` is `None`
    /// whenever the marker is not visible this frame.
    pub fn tick<P: Playback + ?Sized>(
        &mut self,
        now_ms: f64,
        anchor: Option<&Pose>,
        camera: &Pose,
        node: &mut OverlayNode,
        playback: &mut P,
    ) -> TickReport {
        let mut report = TickReport::default();

        let Some(anchor) = anchor else {
            if self.hide(node, playback) {
                report.transitions.push(Transition::Lost);
            }
            return report;
        };

        if self.phase == OverlayPhase::Hidden {
            node.reset(self.params.start_scale);
            node.visible = true;
            self.timeline = Some(AnimationTimeline::start(now_ms, self.params.duration_ms));
            self.phase = OverlayPhase::Entering;
            report.transitions.push(Transition::Acquired);
        }

        let params = self.params;
        let timeline = self
            .timeline
            .get_or_insert_with(|| AnimationTimeline::start(now_ms, params.duration_ms));
        let state = compute_frame_state(timeline, now_ms, anchor, camera, node, &params);
        node.animated = state.animated_group();

        if self.phase == OverlayPhase::Entering && timeline.update(now_ms) {
            self.phase = OverlayPhase::Steady;
            report.transitions.push(Transition::Settled);
            if playback.is_paused() {
                report.playback = Some(playback.play());
            }
        }

        report.frame = Some(state);
        report
    }

    /// Checkpoints and pauses playback, resets the node to its start pose and
    /// clears the timeline. Returns `false` if already hidden.
    pub fn hide<P: Playback + ?Sized>(&mut self, node: &mut OverlayNode, playback: &mut P) -> bool {
        if self.phase == OverlayPhase::Hidden {
            return false;
        }
        playback.checkpoint();
        playback.pause();
        node.reset(self.params.start_scale);
        self.timeline = None;
        self.phase = OverlayPhase::Hidden;
        true
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::{PI, TAU};

    use super::*;
    use crate::{easing::wrap_angle, OverlayError};

    #[derive(Default)]
    struct FakePlayback {
        paused: bool,
        reject: bool,
        plays: usize,
        pauses: usize,
        time: f64,
        checkpoints: Vec<f64>,
    }

    impl Playback for FakePlayback {
        fn is_paused(&self) -> bool {
            self.paused
        }

        fn play(&mut self) -> Result<()> {
            self.plays += 1;
            if self.reject {
                return Err(OverlayError::AutoplayRejected("gesture required".into()));
            }
            self.paused = false;
            Ok(())
        }

        fn pause(&mut self) {
            self.pauses += 1;
            self.paused = true;
        }

        fn checkpoint(&mut self) -> f64 {
            self.checkpoints.push(self.time);
            self.time
        }
    }

    fn fixture() -> (OverlayDriver, OverlayNode, FakePlayback) {
        let node = OverlayNode::for_video(1280, 720, 1.0);
        let params = EntranceParams::for_node(&node, &AnimationConfig::default());
        let playback = FakePlayback {
            paused: true,
            ..Default::default()
        };
        (OverlayDriver::new(params), node, playback)
    }

    fn anchor() -> Pose {
        Pose::flat_marker(Vec3::new(0.0, 0.0, -2.0))
    }

    fn camera() -> Pose {
        Pose::IDENTITY
    }

    #[test]
    fn entrance_overshoots_then_settles_exactly() {
        let (mut driver, mut node, mut video) = fixture();
        let anchor = anchor();

        let first = driver.tick(0.0, Some(&anchor), &camera(), &mut node, &mut video);
        assert!(first.has(Transition::Acquired));
        let frame = first.frame.unwrap();
        assert!((frame.scale - 0.01).abs() < 1e-6);
        assert_eq!(frame.opacity, 0.0);

        let mid = driver.tick(750.0, Some(&anchor), &camera(), &mut node, &mut video);
        assert!(mid.frame.unwrap().scale > 1.0);
        assert_eq!(driver.phase(), OverlayPhase::Entering);

        let done = driver.tick(1500.0, Some(&anchor), &camera(), &mut node, &mut video);
        assert!(done.has(Transition::Settled));
        let frame = done.frame.unwrap();
        assert_eq!(frame.scale, 1.0);
        assert_eq!(frame.opacity, 1.0);
        assert_eq!(frame.progress, 1.0);
        assert_eq!(driver.phase(), OverlayPhase::Steady);
        assert_eq!(video.plays, 1);
    }

    #[test]
    fn huge_time_jump_clamps_progress() {
        let (mut driver, mut node, mut video) = fixture();
        let anchor = anchor();
        driver.tick(0.0, Some(&anchor), &camera(), &mut node, &mut video);

        let report = driver.tick(1.0e9, Some(&anchor), &camera(), &mut node, &mut video);
        let frame = report.frame.unwrap();
        assert_eq!(frame.progress, 1.0);
        assert_eq!(frame.scale, 1.0);
        assert!(frame.rise.is_finite());
    }

    #[test]
    fn loss_mid_entrance_hides_and_checkpoints() {
        let (mut driver, mut node, mut video) = fixture();
        let anchor = anchor();
        driver.tick(0.0, Some(&anchor), &camera(), &mut node, &mut video);
        driver.tick(250.0, Some(&anchor), &camera(), &mut node, &mut video);
        video.time = 0.4;

        let lost = driver.tick(500.0, None, &camera(), &mut node, &mut video);

        assert!(lost.has(Transition::Lost));
        assert!(!node.visible);
        assert!(video.paused);
        assert_eq!(video.checkpoints, vec![0.4]);
        assert!(driver.timeline().is_none());

        let again = driver.tick(900.0, Some(&anchor), &camera(), &mut node, &mut video);
        assert!(again.has(Transition::Acquired));
        assert_eq!(again.frame.unwrap().progress, 0.0);
        assert_eq!(driver.timeline().unwrap().start_ms, 900.0);
    }

    #[test]
    fn every_reacquisition_restarts_from_start_pose() {
        let (mut driver, mut node, mut video) = fixture();
        let anchor = anchor();
        let mut now = 0.0;

        for visible_frames in [3usize, 40, 1, 95, 12] {
            for frame in 0..visible_frames {
                let report = driver.tick(now, Some(&anchor), &camera(), &mut node, &mut video);
                if frame == 0 {
                    let state = report.frame.unwrap();
                    assert!((state.scale - 0.01).abs() < 1e-6);
                    assert_eq!(state.opacity, 0.0);
                    assert!(node.bottom_edge().abs() < 1e-6);
                }
                now += 16.0;
            }
            driver.tick(now, None, &camera(), &mut node, &mut video);
            assert_eq!(driver.phase(), OverlayPhase::Hidden);
            assert!(node.bottom_edge().abs() < 1e-6);
            now += 16.0;
        }
    }

    #[test]
    fn autoplay_rejection_is_reported_not_fatal() {
        let (mut driver, mut node, mut video) = fixture();
        video.reject = true;
        let anchor = anchor();
        driver.tick(0.0, Some(&anchor), &camera(), &mut node, &mut video);

        let report = driver.tick(2000.0, Some(&anchor), &camera(), &mut node, &mut video);

        assert!(matches!(
            report.playback,
            Some(Err(OverlayError::AutoplayRejected(_)))
        ));
        assert_eq!(driver.phase(), OverlayPhase::Steady);
        let next = driver.tick(2016.0, Some(&anchor), &camera(), &mut node, &mut video);
        assert!(next.frame.is_some());
        assert!(next.playback.is_none());
    }

    #[test]
    fn steady_keeps_facing_the_camera() {
        let (mut driver, mut node, mut video) = fixture();
        let anchor = Pose::flat_marker(Vec3::ZERO);
        driver.tick(0.0, Some(&anchor), &camera(), &mut node, &mut video);
        driver.tick(2000.0, Some(&anchor), &camera(), &mut node, &mut video);

        let side = Pose::from_position(Vec3::new(3.0, 1.0, 0.0));
        let frame = driver
            .tick(2016.0, Some(&anchor), &side, &mut node, &mut video)
            .frame
            .unwrap();

        assert!((frame.yaw - PI / 2.0).abs() < 1e-5);
        assert_eq!(frame.scale, 1.0);
        assert_eq!(node.animated.yaw, frame.yaw);
    }

    #[test]
    fn billboard_yaw_is_continuous_around_a_full_orbit() {
        let centre = Vec3::new(0.0, 0.5, 0.0);
        let steps = 360;
        let radius = 2.0;
        let yaw_at = |theta: f32| {
            let camera = centre + Vec3::new(radius * theta.sin(), 0.8, radius * theta.cos());
            billboard_yaw(centre, camera)
        };

        let start = yaw_at(0.0);
        let mut previous = start;
        for i in 1..=steps {
            let theta = TAU * i as f32 / steps as f32;
            let yaw = yaw_at(theta);
            let step = wrap_angle(yaw - previous);
            assert!(step.abs() < 0.05, "jump of {step} at step {i}");
            previous = yaw;
        }
        assert!(wrap_angle(previous - start).abs() < 1e-4);
    }

    #[test]
    fn camera_directly_above_keeps_previous_yaw() {
        let (mut driver, mut node, mut video) = fixture();
        let anchor = Pose::flat_marker(Vec3::ZERO);
        node.animated.yaw = 0.7;
        let timeline = AnimationTimeline::start(0.0, 1500.0);
        let rise = driver.params().rise_start;
        let above = Pose::from_position(node.world_position(&anchor, rise) + Vec3::Y * 3.0);

        let state = compute_frame_state(&timeline, 0.0, &anchor, &above, &node, driver.params());
        assert_eq!(state.yaw, 0.7);

        driver.tick(0.0, Some(&anchor), &above, &mut node, &mut video);
        assert_eq!(node.animated.yaw, 0.7);
    }
}
