use std::sync::Arc;

use crate::{
    resources::{ResourceKind, ResourceRegistry},
    scene::{NodeTransform, OverlayNode},
    video::VideoTexture,
    Result,
};

/// Identifier of an object living on the renderer side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GpuHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuKind {
    VideoTexture,
    Material,
    Geometry,
    Node,
    RenderTarget,
}

/// Sized drawing region the overlay is attached to.
pub trait RenderSurface: Send + Sync {
    /// Measured `(width, height)` in pixels; `(0, 0)` until layout has run.
    fn measured_size(&self) -> (u32, u32);

    fn create_renderer(&self) -> Result<Arc<dyn Renderer>>;
}

/// Rendering backend that owns GPU-side objects.
pub trait Renderer: Send + Sync {
    fn allocate(&self, kind: GpuKind, label: &str) -> GpuHandle;

    fn free(&self, handle: GpuHandle);

    /// Attaches `node` under the anchor group so it is drawn.
    fn attach(&self, node: GpuHandle);

    fn detach(&self, node: GpuHandle);

    /// Places, scales and fades `node` for the coming frame.
    fn apply_node(&self, node: GpuHandle, transform: &NodeTransform);

    /// Uploads the latest decoded video frame. May fail transiently.
    fn upload_video_frame(&self, texture: GpuHandle) -> Result<()>;

    /// Releases the renderer itself; no further calls are made afterwards.
    fn dispose(&self);
}

/// GPU objects backing one overlay node.
#[derive(Debug, Clone, Copy)]
pub struct OverlayScene {
    pub texture: GpuHandle,
    pub material: GpuHandle,
    pub geometry: GpuHandle,
    pub node: GpuHandle,
    pub render_target: GpuHandle,
}

impl OverlayScene {
    /// Allocates the standee's GPU objects and registers their teardown.
    /// The renderer itself is registered too, so the registry ends up owning
    /// every GPU-side resource.
    pub fn build(
        renderer: Arc<dyn Renderer>,
        node: &OverlayNode,
        registry: &ResourceRegistry,
    ) -> Self {
        let (width, height) = node.size();
        let label = format!("standee {width:.2}x{height:.2}");

        let render_target = renderer.allocate(GpuKind::RenderTarget, "camera passthrough");
        let texture = renderer.allocate(GpuKind::VideoTexture, "video texture");
        let material = renderer.allocate(GpuKind::Material, "video material");
        let geometry = renderer.allocate(GpuKind::Geometry, &label);
        let overlay = renderer.allocate(GpuKind::Node, "overlay node");
        renderer.attach(overlay);

        for (kind, handle, name) in [
            (ResourceKind::Texture, texture, "video texture"),
            (ResourceKind::Material, material, "video material"),
            (ResourceKind::Geometry, geometry, "standee geometry"),
        ] {
            let renderer = renderer.clone();
            registry.register(kind, name, move || renderer.free(handle));
        }

        let detach = renderer.clone();
        registry.register(ResourceKind::OverlayNode, "overlay node", move || {
            detach.detach(overlay);
            detach.free(overlay);
        });

        let target = renderer.clone();
        registry.register(ResourceKind::RenderTarget, "render target", move || {
            target.free(render_target)
        });

        registry.register(ResourceKind::Renderer, "renderer", move || renderer.dispose());

        Self {
            texture,
            material,
            geometry,
            node: overlay,
            render_target,
        }
    }

    pub fn sync_node(&self, renderer: &dyn Renderer, transform: &NodeTransform) {
        renderer.apply_node(self.node, transform);
    }

    /// Pushes the decoded frame to the GPU if the texture asked for it.
    pub fn sync_texture(&self, renderer: &dyn Renderer, texture: &mut VideoTexture) -> Result<()> {
        if texture.take_needs_update() {
            renderer.upload_video_frame(self.texture)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::{scene::Pose, sim::SimRenderer};

    fn scene_on(sim: &SimRenderer, registry: &ResourceRegistry) -> (OverlayScene, OverlayNode) {
        let node = OverlayNode::for_video(1280, 720, 1.0);
        let renderer: Arc<dyn Renderer> = Arc::new(sim.clone());
        (OverlayScene::build(renderer, &node, registry), node)
    }

    #[test]
    fn teardown_frees_everything_before_disposing_the_renderer() {
        let sim = SimRenderer::default();
        let registry = ResourceRegistry::new();
        scene_on(&sim, &registry);
        assert_eq!(sim.probe().live, 5);
        assert_eq!(sim.probe().attached, 1);

        registry.release_all();

        let counts = sim.probe();
        assert_eq!(counts.live, 0);
        assert_eq!(counts.attached, 0);
        assert_eq!(counts.disposals, 1);
        assert_eq!(counts.calls_after_dispose, 0);
    }

    #[test]
    fn sync_node_hands_the_world_transform_to_the_renderer() {
        let sim = SimRenderer::default();
        let registry = ResourceRegistry::new();
        let (scene, mut node) = scene_on(&sim, &registry);
        node.visible = true;

        let anchor = Pose::flat_marker(Vec3::new(0.5, 0.0, -3.0));
        let transform = node.world_transform(&anchor);
        scene.sync_node(&sim, &transform);

        let counts = sim.probe();
        assert_eq!(counts.node_updates, 1);
        let applied = counts.last_node.unwrap();
        assert!(applied.visible);
        assert!((applied.position.z + 3.0).abs() < 1e-5);
        assert!((applied.position.y - node.animated.rise).abs() < 1e-5);
    }
}
