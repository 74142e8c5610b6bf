use glam::{Vec2, Vec3};

use crate::assets::{AssetEvent, AssetLoader, TextureData};
use crate::camera::OrthoCamera;
use crate::clock::{Clock, FrameStats};
use crate::config::{PLANE_PIXEL_SCALE, SPIN_AXIS, SPIN_STEP, SceneConfig, ToneMapping};
use crate::controls::{OrbitControls, PointerButtons};
use crate::error::{RenderResult, SceneResult};
use crate::material::{Material, StandardMaterial, TransmissionMaterial};
use crate::model::ModelAsset;
use crate::pointer::{Pointer, intersect_z_plane};
use crate::scene::{AmbientLight, DrawItem, Environment, MeshData, MeshId, NodeId, SceneGraph, Transform};
use crate::tween::PositionTween;
use crate::viewport::Viewport;

// ======================================
// === RENDER TARGET SEAM ===
// ======================================

/// Everything needed to draw one frame.
pub struct Frame<'a> {
    pub camera: &'a OrthoCamera,
    pub environment: &'a Environment,
    pub items: Vec<DrawItem<'a>>,
    pub viewport: Viewport,
    pub time: f32,
    pub tone_mapping: ToneMapping,
    pub exposure: f32,
    pub auto_clear: bool,
}

/// What the scene logic needs from a renderer. The GPU implementation lives
/// in `renderer`; tests record the calls instead.
pub trait RenderTarget {
    fn resize(&mut self, viewport: &Viewport);
    fn upload_mesh(&mut self, id: MeshId, mesh: &MeshData);
    fn upload_texture(&mut self, key: &str, texture: &TextureData);
    fn set_environment(&mut self, texture: &TextureData);
    fn draw(&mut self, frame: &Frame<'_>) -> RenderResult<()>;
}

// ======================================
// === SCENE STATE ===
// ======================================

/// Nodes of the attached model, in scene graph ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModelHandle {
    pub root: NodeId,
    pub blob: NodeId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelState {
    Unloaded,
    Loaded(ModelHandle),
}

/// Owns the scene and drives it from host events and the frame loop.
pub struct SceneOrchestrator<T: RenderTarget> {
    config: SceneConfig,
    target: T,
    viewport: Viewport,
    pointer: Pointer,
    cursor: Vec2,
    camera: OrthoCamera,
    controls: OrbitControls,
    scene: SceneGraph,
    environment: Environment,
    plane: NodeId,
    model: ModelState,
    tween: PositionTween,
    clock: Clock,
    stats: FrameStats,
    assets: AssetLoader,
}

impl<T: RenderTarget> SceneOrchestrator<T> {
    /// Builds the scene and starts loading the environment map, the plane
    /// texture and the model.
    pub fn new(config: SceneConfig, target: T, viewport: Viewport) -> Self {
        let orchestrator = Self::assemble(config, target, viewport);

        let config = &orchestrator.config;
        let assets = &orchestrator.assets;
        assets.load_environment(config.asset_path(&config.environment_map));
        assets.load_texture(config.asset_path(&config.plane_texture));
        assets.load_model(config.asset_path(&config.model), config.decoder_dir());

        orchestrator
    }

    /// Scene construction without any asset requests.
    pub(crate) fn assemble(config: SceneConfig, mut target: T, viewport: Viewport) -> Self {
        let mut camera = OrthoCamera::new(viewport.aspect(), config.frustum_scale);
        let controls = OrbitControls::new(Vec3::ZERO);
        controls.update(&mut camera);

        let environment = Environment {
            map: Some(config.asset_path(&config.environment_map)),
            ambient: AmbientLight {
                color: Vec3::ONE,
                intensity: config.ambient_intensity,
            },
            environment_intensity: 1.0,
            background_blurriness: config.background_blurriness,
            background_intensity: config.background_intensity,
        };

        let mut scene = SceneGraph::new();
        let plane_mesh = scene.add_mesh(MeshData::plane(
            viewport.width * PLANE_PIXEL_SCALE,
            viewport.height * PLANE_PIXEL_SCALE,
        ));
        if let Some(mesh) = scene.mesh(plane_mesh) {
            target.upload_mesh(plane_mesh, mesh);
        }
        let plane = scene.add_node("Plane", Transform::IDENTITY, None);
        let plane_material = StandardMaterial::glowing(
            &config.asset_path(&config.plane_texture),
            config.plane_emissive_intensity,
        );
        if let Err(e) = scene.set_renderable(plane, plane_mesh, Material::Standard(plane_material)) {
            log::error!("Background plane: {}", e);
        }

        let tween = PositionTween::new(Vec3::ZERO, config.tween_duration);

        let mut orchestrator = Self {
            config,
            target,
            viewport,
            pointer: Pointer::default(),
            cursor: Vec2::ZERO,
            camera,
            controls,
            scene,
            environment,
            plane,
            model: ModelState::Unloaded,
            tween,
            clock: Clock::new(),
            stats: FrameStats::default(),
            assets: AssetLoader::new(),
        };
        orchestrator.resize(viewport);
        orchestrator
    }

    // === HOST EVENTS ===

    pub fn resize(&mut self, viewport: Viewport) {
        self.viewport = viewport;
        self.camera.set_aspect(viewport.aspect());
        self.target.resize(&viewport);
        log::debug!(
            "Resized to {}x{} @{}x",
            viewport.width,
            viewport.height,
            viewport.pixel_ratio
        );
    }

    /// Pointer move in CSS pixels. Drives the orbit controls while a button
    /// is held and always retargets the model tween to the pointer's
    /// projection on the z = 0 plane.
    pub fn pointer_moved(&mut self, x: f32, y: f32, now_ms: f64) {
        self.cursor = Vec2::new(x, y);
        self.controls
            .pointer_moved(self.cursor, self.viewport.height, &mut self.camera);

        let ndc = self.pointer.update(x, y, self.viewport.width, self.viewport.height);
        if let Some(point) = intersect_z_plane(&self.camera, ndc) {
            self.tween
                .retarget(point * self.config.pointer_target_scale, now_ms);
        }
    }

    pub fn pointer_button(&mut self, button: PointerButtons, pressed: bool) {
        self.controls.button(button, pressed, self.cursor);
    }

    /// Wheel input in lines; positive zooms in.
    pub fn wheel(&mut self, delta: f32) {
        self.controls.zoom(&mut self.camera, delta);
    }

    // === ASSETS ===

    pub fn apply_asset(&mut self, event: AssetEvent) {
        match event {
            AssetEvent::Environment { path, result } => match result {
                Ok(texture) => {
                    log::info!(
                        "Environment {} ready ({}x{}, {} levels)",
                        path,
                        texture.width(),
                        texture.height(),
                        texture.mip_level_count()
                    );
                    self.target.set_environment(&texture);
                }
                Err(e) => log::error!("{}", e),
            },
            AssetEvent::Texture { path, result } => match result {
                Ok(texture) => {
                    log::info!("Texture {} ready", path);
                    self.target.upload_texture(&path, &texture);
                }
                Err(e) => log::error!("{}", e),
            },
            AssetEvent::Model { path, result } => match result.map(|asset| self.install_model(asset)) {
                Ok(Ok(handle)) => log::info!("Model {} attached at {:?}", path, handle.root),
                Ok(Err(e)) => log::error!("Model {}: {}", path, e),
                Err(e) => log::error!("{}", e),
            },
        }
    }

    /// Swaps the blob's material for glass and attaches the model. A model
    /// without the blob node is rejected and left out of the scene.
    pub fn install_model(&mut self, asset: ModelAsset) -> SceneResult<ModelHandle> {
        let ModelAsset { mut graph, root } = asset;
        let blob = graph.find_by_name(root, &self.config.blob_node)?;
        graph.replace_material(blob, Material::Transmission(TransmissionMaterial::blob()))?;

        let offset = self.scene.attach(graph, None);
        for id in offset.mesh_ids() {
            if let Some(mesh) = self.scene.mesh(id) {
                self.target.upload_mesh(id, mesh);
            }
        }

        let handle = ModelHandle {
            root: offset.node(root),
            blob: offset.node(blob),
        };
        self.scene.set_translation(handle.root, self.tween.value())?;
        self.model = ModelState::Loaded(handle);
        Ok(handle)
    }

    // === FRAME LOOP ===

    /// One iteration of the render loop at host time `now_ms`.
    pub fn frame(&mut self, now_ms: f64) -> RenderResult<()> {
        let delta = self.clock.get_delta();
        self.stats.record(delta);

        for event in self.assets.drain() {
            self.apply_asset(event);
        }

        match self.model {
            ModelState::Unloaded => {}
            ModelState::Loaded(handle) => {
                if let Err(e) = self.animate_model(handle, now_ms) {
                    log::error!("Model update: {}", e);
                }
            }
        }

        let frame = Frame {
            camera: &self.camera,
            environment: &self.environment,
            items: self.scene.draw_list(),
            viewport: self.viewport,
            time: (now_ms / 1000.0) as f32,
            tone_mapping: self.config.tone_mapping,
            exposure: self.config.exposure,
            auto_clear: self.config.auto_clear,
        };
        self.target.draw(&frame)
    }

    fn animate_model(&mut self, handle: ModelHandle, now_ms: f64) -> SceneResult<()> {
        // Fixed step per frame, independent of elapsed time.
        self.scene.rotate_on_axis(handle.root, SPIN_AXIS, SPIN_STEP)?;

        let position = self.tween.advance(now_ms);
        self.scene.set_translation(handle.root, position)?;

        let time = (now_ms / 1000.0) as f32;
        let mut glass_nodes = vec![handle.blob];
        glass_nodes.extend(self.scene.node(handle.blob)?.children.iter().copied());
        for id in glass_nodes {
            if let Some(Material::Transmission(glass)) = self.scene.material_mut(id) {
                glass.time = time;
            }
        }
        Ok(())
    }

    // === ACCESSORS ===

    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn camera(&self) -> &OrthoCamera {
        &self.camera
    }

    pub fn pointer(&self) -> &Pointer {
        &self.pointer
    }

    pub fn scene(&self) -> &SceneGraph {
        &self.scene
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn plane(&self) -> NodeId {
        self.plane
    }

    pub fn model_state(&self) -> ModelState {
        self.model
    }

    pub fn tween(&self) -> &PositionTween {
        &self.tween
    }

    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    pub fn assets(&self) -> &AssetLoader {
        &self.assets
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    pub fn target_mut(&mut self) -> &mut T {
        &mut self.target
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AssetError, SceneError};
    use glam::Quat;

    const EPS: f32 = 1e-4;

    #[derive(Debug, Clone, PartialEq)]
    struct DrawRecord {
        items: usize,
        transmissive: usize,
        time: f32,
        auto_clear: bool,
    }

    #[derive(Default)]
    struct RecordingTarget {
        resizes: Vec<Viewport>,
        meshes: Vec<MeshId>,
        textures: Vec<String>,
        environments: usize,
        draws: Vec<DrawRecord>,
    }

    impl RenderTarget for RecordingTarget {
        fn resize(&mut self, viewport: &Viewport) {
            self.resizes.push(*viewport);
        }

        fn upload_mesh(&mut self, id: MeshId, _mesh: &MeshData) {
            self.meshes.push(id);
        }

        fn upload_texture(&mut self, key: &str, _texture: &TextureData) {
            self.textures.push(key.to_string());
        }

        fn set_environment(&mut self, _texture: &TextureData) {
            self.environments += 1;
        }

        fn draw(&mut self, frame: &Frame<'_>) -> RenderResult<()> {
            self.draws.push(DrawRecord {
                items: frame.items.len(),
                transmissive: frame.items.iter().filter(|i| i.material.is_transmissive()).count(),
                time: frame.time,
                auto_clear: frame.auto_clear,
            });
            Ok(())
        }
    }

    fn orchestrator() -> SceneOrchestrator<RecordingTarget> {
        SceneOrchestrator::assemble(
            SceneConfig::default(),
            RecordingTarget::default(),
            Viewport::new(1920.0, 1080.0, 1.0),
        )
    }

    fn model(blob_name: &str) -> ModelAsset {
        let mut graph = SceneGraph::new();
        let root = graph.add_node("Scene", Transform::IDENTITY, None);
        let mesh = graph.add_mesh(MeshData::plane(1.0, 1.0));
        let blob = graph.add_node(blob_name, Transform::IDENTITY, Some(root));
        graph
            .set_renderable(blob, mesh, Material::default())
            .expect("node exists");
        ModelAsset { graph, root }
    }

    fn loaded() -> (SceneOrchestrator<RecordingTarget>, ModelHandle) {
        let mut orchestrator = orchestrator();
        let handle = orchestrator.install_model(model("Sphere")).expect("blob present");
        (orchestrator, handle)
    }

    #[test]
    fn assembly_sizes_plane_and_runs_initial_resize() {
        let orchestrator = orchestrator();
        let target = orchestrator.target();
        assert_eq!(target.resizes, vec![Viewport::new(1920.0, 1080.0, 1.0)]);
        assert_eq!(target.meshes, vec![MeshId(0)]);

        let plane = orchestrator.scene().node(orchestrator.plane()).expect("plane");
        let mesh = orchestrator
            .scene()
            .mesh(plane.renderable.as_ref().expect("plane renders").mesh)
            .expect("mesh stored");
        assert!((mesh.positions[1][0] - 9.6).abs() < EPS);
        assert!((mesh.positions[1][1] - 5.4).abs() < EPS);
        assert_eq!(orchestrator.environment().background_blurriness, 3.0);
        assert_eq!(orchestrator.environment().background_intensity, 3.0);
    }

    #[test]
    fn draws_before_model_loads() {
        let mut orchestrator = orchestrator();
        orchestrator.frame(0.0).expect("draw");
        orchestrator.frame(16.0).expect("draw");

        assert_eq!(orchestrator.model_state(), ModelState::Unloaded);
        let draws = &orchestrator.target().draws;
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[0].items, 1);
        assert_eq!(draws[0].transmissive, 0);
        assert!(!draws[0].auto_clear);
    }

    #[test]
    fn resize_recomputes_frustum() {
        let mut orchestrator = orchestrator();
        orchestrator.resize(Viewport::new(800.0, 400.0, 2.0));

        let camera = orchestrator.camera();
        assert!((camera.right - 8.8).abs() < EPS);
        assert!((camera.left + 8.8).abs() < EPS);
        assert!((camera.top - 4.4).abs() < EPS);
        assert_eq!(camera.frustum_scale, 4.4);
        assert_eq!(
            orchestrator.target().resizes.last(),
            Some(&Viewport::new(800.0, 400.0, 2.0))
        );
    }

    #[test]
    fn model_spins_a_fixed_step_per_frame() {
        let (mut orchestrator, handle) = loaded();
        // Wildly uneven host timestamps must not change the step.
        for now in [0.0, 5.0, 4000.0, 4001.0] {
            orchestrator.frame(now).expect("draw");
        }

        let rotation = orchestrator.scene().node(handle.root).expect("root").transform.rotation;
        let expected = Quat::from_axis_angle(SPIN_AXIS.normalize(), 4.0 * SPIN_STEP);
        assert!(rotation.dot(expected).abs() > 1.0 - 1e-6);
        assert_eq!(orchestrator.target().draws.last().map(|d| d.transmissive), Some(1));
    }

    #[test]
    fn model_arrives_through_the_loader() {
        let mut orchestrator = orchestrator();
        orchestrator
            .assets()
            .sender()
            .send(AssetEvent::Model {
                path: "assets/blob.glb".to_string(),
                result: Ok(model("Sphere")),
            })
            .expect("receiver alive");

        orchestrator.frame(0.0).expect("draw");
        assert!(matches!(orchestrator.model_state(), ModelState::Loaded(_)));
        // Plane plus the blob's mesh.
        assert_eq!(orchestrator.target().meshes, vec![MeshId(0), MeshId(1)]);
        assert_eq!(orchestrator.target().draws[0].items, 2);
    }

    #[test]
    fn model_without_blob_is_not_attached() {
        let mut orchestrator = orchestrator();
        let nodes_before = orchestrator.scene().len();

        let result = orchestrator.install_model(model("Cube"));
        assert_eq!(result, Err(SceneError::NodeNotFound("Sphere".to_string())));
        assert_eq!(orchestrator.model_state(), ModelState::Unloaded);
        assert_eq!(orchestrator.scene().len(), nodes_before);
        orchestrator.frame(0.0).expect("loop keeps running");
    }

    #[test]
    fn pointer_tweens_model_towards_projection() {
        let (mut orchestrator, handle) = loaded();
        orchestrator.pointer_moved(1920.0, 540.0, 0.0);
        assert_eq!(orchestrator.pointer().ndc, Vec2::new(1.0, 0.0));

        let point = intersect_z_plane(orchestrator.camera(), Vec2::new(1.0, 0.0)).expect("hits plane");
        let target = orchestrator.tween().target().expect("tween running");
        assert!((target - point * 50.0).length() < EPS);

        orchestrator.frame(500.0).expect("draw");
        let halfway = orchestrator.scene().node(handle.root).expect("root").transform.translation;
        assert!((halfway.x - target.x * 0.75).abs() < target.x.abs() * 1e-4);

        orchestrator.frame(1000.0).expect("draw");
        let end = orchestrator.scene().node(handle.root).expect("root").transform.translation;
        assert!((end - target).length() < EPS);
    }

    #[test]
    fn pointer_before_load_is_kept_for_later() {
        let mut orchestrator = orchestrator();
        orchestrator.pointer_moved(0.0, 0.0, 0.0);
        orchestrator.frame(2000.0).expect("draw");
        // Nothing advances the tween while there is no model.
        assert!(orchestrator.tween().is_active());
        let target = orchestrator.tween().target().expect("tween running");

        let handle = orchestrator.install_model(model("Sphere")).expect("blob present");
        orchestrator.frame(2000.0).expect("draw");
        let translation = orchestrator.scene().node(handle.root).expect("root").transform.translation;
        assert!((translation - target).length() < EPS);
        assert!(!orchestrator.tween().is_active());
    }

    #[test]
    fn glass_time_follows_host_clock() {
        let (mut orchestrator, handle) = loaded();
        orchestrator.frame(2500.0).expect("draw");

        let node = orchestrator.scene().node(handle.blob).expect("blob");
        let Some(Material::Transmission(glass)) = node.renderable.as_ref().map(|r| &r.material) else {
            panic!("blob wears glass");
        };
        assert_eq!(glass.time, 2.5);
        assert_eq!(glass.samples, 10);
        assert_eq!(orchestrator.target().draws[0].time, 2.5);
    }

    #[test]
    fn asset_failures_leave_scene_running() {
        let mut orchestrator = orchestrator();
        orchestrator.apply_asset(AssetEvent::Environment {
            path: "assets/49TH_STREET.jpg".to_string(),
            result: Err(AssetError::Fetch {
                path: "assets/49TH_STREET.jpg".to_string(),
                reason: "HTTP 404".to_string(),
            }),
        });
        orchestrator.apply_asset(AssetEvent::Texture {
            path: "assets/text.jpg".to_string(),
            result: Ok(TextureData::solid([255, 255, 255, 255])),
        });

        orchestrator.frame(0.0).expect("draw");
        assert_eq!(orchestrator.target().environments, 0);
        assert_eq!(orchestrator.target().textures, vec!["assets/text.jpg".to_string()]);
        assert_eq!(orchestrator.target().draws.len(), 1);
    }

    #[test]
    fn wheel_zooms_camera() {
        let mut orchestrator = orchestrator();
        orchestrator.wheel(1.0);
        assert!(orchestrator.camera().zoom > 1.0);
    }
}
