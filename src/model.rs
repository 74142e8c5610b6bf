use std::borrow::Cow;
use std::collections::HashMap;

use glam::{Quat, Vec3};
use serde::Deserialize;

use crate::draco::{self, DracoMesh, DracoResult};
use crate::error::{AssetError, AssetResult};
use crate::material::{Material, StandardMaterial};
use crate::scene::{MeshData, NodeId, SceneGraph, Transform};

pub const DRACO_EXTENSION: &str = "KHR_draco_mesh_compression";

/// An imported glTF scene, parented under a single group node.
#[derive(Clone, Debug)]
pub struct ModelAsset {
    pub graph: SceneGraph,
    pub root: NodeId,
}

// ======================================
// === COMPRESSED PRIMITIVES ===
// ======================================

/// The slice of the glTF JSON that locates Draco payloads.
#[derive(Deserialize, Default)]
struct ExtensionRoot {
    #[serde(default)]
    meshes: Vec<MeshExtensions>,
}

#[derive(Deserialize)]
struct MeshExtensions {
    #[serde(default)]
    primitives: Vec<PrimitiveExtensions>,
}

#[derive(Deserialize)]
struct PrimitiveExtensions {
    #[serde(default)]
    extensions: Option<PrimitiveExtensionSet>,
}

#[derive(Deserialize)]
struct PrimitiveExtensionSet {
    #[serde(rename = "KHR_draco_mesh_compression")]
    draco: Option<DracoPrimitive>,
}

/// `KHR_draco_mesh_compression` on one primitive: the buffer view holding the
/// bitstream and the Draco attribute id behind each glTF semantic.
#[derive(Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
struct DracoPrimitive {
    buffer_view: usize,
    attributes: HashMap<String, u32>,
}

impl DracoPrimitive {
    fn attribute(&self, semantic: &str) -> Option<u32> {
        self.attributes.get(semantic).copied()
    }

    fn to_mesh_data(&self, mesh: &DracoMesh) -> Option<MeshData> {
        let mut data = MeshData {
            positions: mesh.read::<3>(self.attribute("POSITION")?)?,
            ..Default::default()
        };
        if let Some(normals) = self.attribute("NORMAL").and_then(|id| mesh.read::<3>(id)) {
            data.normals = normals;
        }
        if let Some(uvs) = self.attribute("TEXCOORD_0").and_then(|id| mesh.read::<2>(id)) {
            data.uvs = uvs;
        }
        data.indices = if mesh.indices.is_empty() {
            (0..data.positions.len() as u32).collect()
        } else {
            mesh.indices.clone()
        };
        Some(data)
    }
}

/// Whether the file needs a Draco decoder to be read at all.
pub fn requires_draco(bytes: &[u8]) -> bool {
    gltf::Gltf::from_slice_without_validation(bytes)
        .map(|gltf| gltf.extensions_used().any(|ext| ext == DRACO_EXTENSION))
        .unwrap_or(false)
}

fn json_chunk(bytes: &[u8]) -> Result<Cow<'_, [u8]>, gltf::Error> {
    if bytes.starts_with(b"glTF") {
        gltf::Glb::from_slice(bytes).map(|glb| glb.json)
    } else {
        Ok(Cow::Borrowed(bytes))
    }
}

// ======================================
// === IMPORT ===
// ======================================

/// Imports a binary (or plain JSON) glTF from memory, decoding Draco
/// primitives with the built-in decoder.
pub fn import_glb(path: &str, bytes: &[u8]) -> AssetResult<ModelAsset> {
    import_with(path, bytes, |data, _| draco::decode_mesh(data))
}

/// Imports a glTF, handing every Draco payload to `decode` together with the
/// attribute ids the primitive refers to.
pub fn import_with<D>(path: &str, bytes: &[u8], decode: D) -> AssetResult<ModelAsset>
where
    D: Fn(&[u8], &[u32]) -> DracoResult<DracoMesh>,
{
    let gltf_error = |source| AssetError::Gltf {
        path: path.to_string(),
        source,
    };

    // Validation rejects required extensions it does not know, so Draco
    // files are read unvalidated.
    let unchecked = gltf::Gltf::from_slice_without_validation(bytes).map_err(gltf_error)?;
    let gltf::Gltf { document, blob } = if unchecked.extensions_required().any(|ext| ext == DRACO_EXTENSION) {
        unchecked
    } else {
        gltf::Gltf::from_slice(bytes).map_err(gltf_error)?
    };
    let buffers = gltf::import_buffers(&document, None, blob).map_err(gltf_error)?;

    let decoded = if document.extensions_used().any(|ext| ext == DRACO_EXTENSION) {
        decode_primitives(path, bytes, &document, &buffers, decode)?
    } else {
        HashMap::new()
    };

    let scene = document
        .default_scene()
        .or_else(|| document.scenes().next())
        .ok_or_else(|| AssetError::EmptyScene { path: path.to_string() })?;

    let source = PrimitiveSource {
        buffers: &buffers,
        decoded,
    };
    let mut graph = SceneGraph::new();
    let root = graph.add_node(scene.name().unwrap_or("Scene"), Transform::IDENTITY, None);
    for node in scene.nodes() {
        import_node(&mut graph, &node, &source, root);
    }

    log::info!(
        "Imported {} ({} nodes, {} meshes)",
        path,
        graph.len(),
        graph.mesh_count()
    );
    Ok(ModelAsset { graph, root })
}

/// Decodes every Draco primitive up front, keyed by (mesh, primitive) index.
fn decode_primitives<D>(
    path: &str,
    bytes: &[u8],
    document: &gltf::Document,
    buffers: &[gltf::buffer::Data],
    decode: D,
) -> AssetResult<HashMap<(usize, usize), MeshData>>
where
    D: Fn(&[u8], &[u32]) -> DracoResult<DracoMesh>,
{
    let json = json_chunk(bytes).map_err(|source| AssetError::Gltf {
        path: path.to_string(),
        source,
    })?;
    let root: ExtensionRoot = serde_json::from_slice(&json).map_err(|source| AssetError::Extensions {
        path: path.to_string(),
        source,
    })?;
    let draco_error = |source| AssetError::Draco {
        path: path.to_string(),
        source,
    };

    let mut decoded = HashMap::new();
    for (mesh_index, mesh) in root.meshes.iter().enumerate() {
        for (prim_index, prim) in mesh.primitives.iter().enumerate() {
            let Some(extension) = prim.extensions.as_ref().and_then(|e| e.draco.as_ref()) else {
                continue;
            };
            let payload = document
                .views()
                .nth(extension.buffer_view)
                .and_then(|view| {
                    let data = buffers.get(view.buffer().index())?;
                    data.0.get(view.offset()..view.offset() + view.length())
                })
                .ok_or_else(|| draco_error(draco::DracoError::Malformed("buffer view out of range")))?;

            let ids: Vec<u32> = extension.attributes.values().copied().collect();
            let mesh_data = decode(payload, &ids).map_err(draco_error)?;
            match extension.to_mesh_data(&mesh_data) {
                Some(data) => {
                    decoded.insert((mesh_index, prim_index), data);
                }
                None => log::warn!("Draco primitive {}/{} in {} has no positions", mesh_index, prim_index, path),
            }
        }
    }
    log::debug!("Decoded {} Draco primitives in {}", decoded.len(), path);
    Ok(decoded)
}

/// Vertex data for primitives: accessor buffers plus pre-decoded Draco meshes.
struct PrimitiveSource<'a> {
    buffers: &'a [gltf::buffer::Data],
    decoded: HashMap<(usize, usize), MeshData>,
}

fn import_node(graph: &mut SceneGraph, node: &gltf::Node, source: &PrimitiveSource<'_>, parent: NodeId) {
    let (translation, rotation, scale) = node.transform().decomposed();
    let transform = Transform {
        translation: Vec3::from(translation),
        rotation: Quat::from_array(rotation),
        scale: Vec3::from(scale),
    };
    let name = node.name().map_or_else(|| format!("node_{}", node.index()), str::to_string);
    let id = graph.add_node(&name, transform, Some(parent));

    if let Some(mesh) = node.mesh() {
        let primitives: Vec<_> = mesh
            .primitives()
            .filter_map(|prim| {
                read_primitive(&mesh, &prim, source).map(|data| (data, convert_material(&prim.material())))
            })
            .collect();

        // One primitive renders on the node itself, several get a child each.
        let single = primitives.len() == 1;
        for (index, (data, material)) in primitives.into_iter().enumerate() {
            let mesh_id = graph.add_mesh(data);
            let target = if single {
                id
            } else {
                graph.add_node(&format!("{name}_primitive_{index}"), Transform::IDENTITY, Some(id))
            };
            // Both ids were just created.
            let _ = graph.set_renderable(target, mesh_id, material);
        }
    }

    for child in node.children() {
        import_node(graph, &child, source, id);
    }
}

fn read_primitive(mesh: &gltf::Mesh, prim: &gltf::Primitive, source: &PrimitiveSource<'_>) -> Option<MeshData> {
    if prim.mode() != gltf::mesh::Mode::Triangles {
        log::warn!("Skipping primitive {} with mode {:?}", prim.index(), prim.mode());
        return None;
    }

    let mut data = match source.decoded.get(&(mesh.index(), prim.index())) {
        Some(decoded) => decoded.clone(),
        None => read_accessors(prim, source.buffers)?,
    };
    if data.positions.is_empty() || data.indices.len() < 3 {
        return None;
    }
    data.ensure_attributes();
    Some(data)
}

fn read_accessors(prim: &gltf::Primitive, buffers: &[gltf::buffer::Data]) -> Option<MeshData> {
    let reader = prim.reader(|buffer| buffers.get(buffer.index()).map(|d| d.0.as_slice()));

    let mut data = MeshData {
        positions: reader.read_positions()?.collect(),
        ..Default::default()
    };
    if let Some(normals) = reader.read_normals() {
        data.normals = normals.collect();
    }
    if let Some(tex0) = reader.read_tex_coords(0) {
        data.uvs = tex0.into_f32().collect();
    }
    data.indices = match reader.read_indices() {
        Some(indices) => indices.into_u32().collect(),
        None => (0..data.positions.len() as u32).collect(),
    };
    Some(data)
}

fn convert_material(material: &gltf::Material) -> Material {
    let pbr = material.pbr_metallic_roughness();
    let [r, g, b, a] = pbr.base_color_factor();
    Material::Standard(StandardMaterial {
        color: Vec3::new(r, g, b),
        opacity: a,
        roughness: pbr.roughness_factor(),
        metalness: pbr.metallic_factor(),
        emissive: Vec3::from(material.emissive_factor()),
        double_sided: material.double_sided(),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRIANGLE_JSON: &str = r#"{
        "asset": {"version": "2.0"},
        "scene": 0,
        "scenes": [{"name": "Scene", "nodes": [0]}],
        "nodes": [
            {"name": "Blob", "children": [1], "translation": [0.0, 1.0, 0.0]},
            {"name": "Sphere", "mesh": 0}
        ],
        "meshes": [{"primitives": [{"attributes": {"POSITION": 0}, "indices": 1, "material": 0}]}],
        "materials": [{
            "pbrMetallicRoughness": {"baseColorFactor": [1.0, 0.0, 0.0, 1.0], "metallicFactor": 0.5, "roughnessFactor": 0.25},
            "doubleSided": true
        }],
        "accessors": [
            {"bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3", "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0]},
            {"bufferView": 1, "componentType": 5125, "count": 3, "type": "SCALAR"}
        ],
        "bufferViews": [
            {"buffer": 0, "byteOffset": 0, "byteLength": 36},
            {"buffer": 0, "byteOffset": 36, "byteLength": 12}
        ],
        "buffers": [{"byteLength": 48}]
    }"#;

    fn chunk(kind: &[u8; 4], mut data: Vec<u8>, pad: u8) -> Vec<u8> {
        while data.len() % 4 != 0 {
            data.push(pad);
        }
        let mut out = (data.len() as u32).to_le_bytes().to_vec();
        out.extend_from_slice(kind);
        out.extend(data);
        out
    }

    fn glb(json: &str, bin: Vec<u8>) -> Vec<u8> {
        let json = chunk(b"JSON", json.as_bytes().to_vec(), b' ');
        let bin = chunk(b"BIN\0", bin, 0);
        let total = 12 + json.len() + bin.len();

        let mut glb = b"glTF".to_vec();
        glb.extend_from_slice(&2u32.to_le_bytes());
        glb.extend_from_slice(&(total as u32).to_le_bytes());
        glb.extend(json);
        glb.extend(bin);
        glb
    }

    fn triangle_glb() -> Vec<u8> {
        let mut bin = Vec::new();
        for p in [[0.0f32, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]] {
            for c in p {
                bin.extend_from_slice(&c.to_le_bytes());
            }
        }
        for i in [0u32, 1, 2] {
            bin.extend_from_slice(&i.to_le_bytes());
        }
        glb(TRIANGLE_JSON, bin)
    }

    /// Accessors carry only metadata; the geometry lives in the Draco view.
    const DRACO_JSON: &str = r#"{
        "asset": {"version": "2.0"},
        "extensionsUsed": ["KHR_draco_mesh_compression"],
        "extensionsRequired": ["KHR_draco_mesh_compression"],
        "scene": 0,
        "scenes": [{"name": "Scene", "nodes": [0]}],
        "nodes": [
            {"name": "Blob", "children": [1]},
            {"name": "Sphere", "mesh": 0}
        ],
        "meshes": [{"primitives": [{
            "attributes": {"POSITION": 0, "TEXCOORD_0": 1, "NORMAL": 2},
            "indices": 3,
            "extensions": {"KHR_draco_mesh_compression": {
                "bufferView": 0,
                "attributes": {"POSITION": 0, "TEXCOORD_0": 1, "NORMAL": 2}
            }}
        }]}],
        "accessors": [
            {"componentType": 5126, "count": 3, "type": "VEC3", "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0]},
            {"componentType": 5126, "count": 3, "type": "VEC2"},
            {"componentType": 5126, "count": 3, "type": "VEC3"},
            {"componentType": 5125, "count": 3, "type": "SCALAR"}
        ],
        "bufferViews": [{"buffer": 0, "byteOffset": 0, "byteLength": LENGTH}],
        "buffers": [{"byteLength": LENGTH}]
    }"#;

    fn draco_glb(payload: Vec<u8>) -> Vec<u8> {
        glb(&DRACO_JSON.replace("LENGTH", &payload.len().to_string()), payload)
    }

    fn sphere_mesh(model: &ModelAsset) -> MeshData {
        let graph = &model.graph;
        let sphere = graph.find_by_name(model.root, "Sphere").expect("named node");
        let renderable = graph.node(sphere).expect("node").renderable.clone().expect("has mesh");
        graph.mesh(renderable.mesh).expect("mesh stored").clone()
    }

    #[test]
    fn imports_hierarchy_and_geometry() {
        let model = import_glb("blob.glb", &triangle_glb()).expect("valid glb");
        let graph = &model.graph;
        assert_eq!(graph.node(model.root).expect("root").name, "Scene");

        let sphere = graph.find_by_name(model.root, "Sphere").expect("named node");
        let blob = graph.find_by_name(model.root, "Blob").expect("named node");
        assert_eq!(graph.node(sphere).expect("node").parent, Some(blob));
        assert_eq!(graph.node(blob).expect("node").transform.translation, Vec3::Y);

        let renderable = graph.node(sphere).expect("node").renderable.clone().expect("has mesh");
        let mesh = graph.mesh(renderable.mesh).expect("mesh stored");
        assert_eq!(mesh.indices, vec![0, 1, 2]);
        assert_eq!(mesh.uvs.len(), 3);
        // Normals were absent and get derived from winding.
        for n in &mesh.normals {
            assert!((Vec3::from(*n) - Vec3::Z).length() < 1e-6);
        }

        let Material::Standard(material) = renderable.material else {
            panic!("glTF materials import as standard");
        };
        assert_eq!(material.color, Vec3::X);
        assert_eq!(material.metalness, 0.5);
        assert_eq!(material.roughness, 0.25);
        assert!(material.double_sided);
        assert!(!requires_draco(&triangle_glb()));
    }

    #[test]
    fn draco_primitives_are_decoded() {
        let bytes = draco_glb(draco::tests::triangle(0, &[]));
        assert!(requires_draco(&bytes));

        let model = import_glb("blob.glb", &bytes).expect("draco glb");
        let blob = model.graph.find_by_name(model.root, "Blob").expect("named node");
        let sphere = model.graph.find_by_name(model.root, "Sphere").expect("named node");
        assert_eq!(model.graph.node(sphere).expect("node").parent, Some(blob));

        let mesh = sphere_mesh(&model);
        assert_eq!(mesh.indices, vec![0, 1, 2]);
        assert_eq!(mesh.positions, vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]);
        for (uv, expected) in mesh.uvs.iter().zip([[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]]) {
            assert!((uv[0] - expected[0]).abs() < 1e-5 && (uv[1] - expected[1]).abs() < 1e-5);
        }
        for n in &mesh.normals {
            assert!((Vec3::from(*n) - Vec3::Z).length() < 1e-5);
        }
    }

    #[test]
    fn external_decoder_gets_the_payload_and_attribute_ids() {
        let payload = draco::tests::triangle(0, &[]);
        let bytes = draco_glb(payload.clone());
        let model = import_with("blob.glb", &bytes, |data, ids| {
            assert_eq!(data, payload.as_slice());
            let mut ids = ids.to_vec();
            ids.sort_unstable();
            assert_eq!(ids, vec![0, 1, 2]);
            Ok(DracoMesh {
                num_points: 3,
                indices: vec![2, 1, 0],
                attributes: vec![draco::DracoAttribute {
                    unique_id: 0,
                    kind: draco::AttributeKind::Position,
                    components: 3,
                    values: vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
                }],
            })
        })
        .expect("decoded externally");

        let mesh = sphere_mesh(&model);
        assert_eq!(mesh.indices, vec![2, 1, 0]);
        // Missing attributes are filled in like any other primitive.
        assert_eq!(mesh.uvs.len(), 3);
        assert_eq!(mesh.normals.len(), 3);
    }

    #[test]
    fn undecodable_draco_is_a_draco_error() {
        let bytes = draco_glb(draco::tests::edgebreaker_header());
        match import_glb("blob.glb", &bytes) {
            Err(AssetError::Draco { path, source }) => {
                assert_eq!(path, "blob.glb");
                assert!(matches!(source, draco::DracoError::Unsupported(_)));
            }
            other => panic!("unexpected result {other:?}"),
        }

        let failing = import_with("blob.glb", &draco_glb(draco::tests::triangle(0, &[])), |_, _| {
            Err(draco::DracoError::Decoder("status not ok".to_string()))
        });
        assert!(matches!(failing, Err(AssetError::Draco { .. })));
    }

    #[test]
    fn file_without_scenes_is_rejected() {
        let json = br#"{"asset": {"version": "2.0"}}"#;
        assert!(matches!(
            import_glb("empty.gltf", json),
            Err(AssetError::EmptyScene { .. })
        ));
    }

    #[test]
    fn garbage_is_a_gltf_error() {
        assert!(matches!(
            import_glb("blob.glb", b"\x00\x01\x02"),
            Err(AssetError::Gltf { .. })
        ));
    }
}
