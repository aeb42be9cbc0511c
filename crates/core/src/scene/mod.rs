use std::f32::consts::FRAC_PI_2;

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Position and orientation in world space.
///
/// Tracking anchors follow the usual image-target convention: the marker lies
/// in the anchor's local XY plane and +Z points out of the print.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Pose {
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    pub fn from_position(position: Vec3) -> Self {
        Self::new(position, Quat::IDENTITY)
    }

    /// Anchor for a marker lying flat on a Y-up floor.
    pub fn flat_marker(position: Vec3) -> Self {
        Self::new(position, Quat::from_rotation_x(-FRAC_PI_2))
    }

    pub fn transform_point(&self, local: Vec3) -> Vec3 {
        self.position + self.rotation * local
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceOrientation {
    Landscape,
    Portrait,
}

impl SourceOrientation {
    pub fn from_dimensions(width: u32, height: u32) -> Self {
        if height > width {
            Self::Portrait
        } else {
            Self::Landscape
        }
    }
}

/// Per-frame mutable part of the overlay: everything the animation touches.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnimatedGroup {
    pub scale: f32,
    /// Height of the pivot above the marker plane.
    pub rise: f32,
    /// World-space yaw around the vertical axis.
    pub yaw: f32,
    pub opacity: f32,
}

/// World placement of the standee handed to the renderer each frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeTransform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: f32,
    pub opacity: f32,
    pub visible: bool,
}

/// The video-carrying standee: a fixed orientation-correction group wrapping an
/// animated group whose pivot sits at the plane's centre.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayNode {
    /// Reported to hosts only. The plane's aspect already follows the source,
    /// so landscape and portrait share the same correction rotation.
    orientation: SourceOrientation,
    correction: Quat,
    width: f32,
    height: f32,
    pub animated: AnimatedGroup,
    pub visible: bool,
}

impl OverlayNode {
    /// Builds the standee for a decoded video. The plane spans the marker's
    /// width and keeps the source aspect ratio, so portrait sources stand taller.
    pub fn for_video(video_width: u32, video_height: u32, marker_width: f32) -> Self {
        let orientation = SourceOrientation::from_dimensions(video_width, video_height);
        let aspect = if video_width == 0 {
            1.0
        } else {
            video_height as f32 / video_width as f32
        };
        let width = marker_width.max(f32::EPSILON);
        let height = width * aspect.max(f32::EPSILON);

        let mut node = Self {
            orientation,
            // Stands the XY-plane quad up out of the marker plane.
            correction: Quat::from_rotation_x(FRAC_PI_2),
            width,
            height,
            animated: AnimatedGroup {
                scale: 1.0,
                rise: height * 0.5,
                yaw: 0.0,
                opacity: 1.0,
            },
            visible: false,
        };
        node.reset(0.01);
        node
    }

    pub fn orientation(&self) -> SourceOrientation {
        self.orientation
    }

    pub fn correction(&self) -> Quat {
        self.correction
    }

    pub fn size(&self) -> (f32, f32) {
        (self.width, self.height)
    }

    pub fn half_height(&self) -> f32 {
        self.height * 0.5
    }

    /// Rise that puts the bottom edge exactly on the marker plane at `scale`.
    pub fn grounded_rise(&self, scale: f32) -> f32 {
        self.half_height() * scale
    }

    /// Distance between the plane's bottom edge and the marker plane.
    pub fn bottom_edge(&self) -> f32 {
        self.animated.rise - self.half_height() * self.animated.scale
    }

    /// Returns the animated group to its entrance start pose and hides the node.
    /// Yaw is kept so re-acquisition does not flick the plane around.
    pub fn reset(&mut self, start_scale: f32) {
        self.animated.scale = start_scale;
        self.animated.rise = self.grounded_rise(start_scale);
        self.animated.opacity = 0.0;
        self.visible = false;
    }

    /// World position of the pivot for the given marker anchor.
    pub fn world_position(&self, anchor: &Pose, rise: f32) -> Vec3 {
        anchor.transform_point(self.correction * Vec3::new(0.0, rise, 0.0))
    }

    /// Full world transform of the animated group: anchor, then correction,
    /// then yaw around the standee's vertical axis.
    pub fn world_transform(&self, anchor: &Pose) -> NodeTransform {
        NodeTransform {
            position: self.world_position(anchor, self.animated.rise),
            rotation: anchor.rotation * self.correction * Quat::from_rotation_y(self.animated.yaw),
            scale: self.animated.scale,
            opacity: self.animated.opacity,
            visible: self.visible,
        }
    }
}
