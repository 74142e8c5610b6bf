// ======================================
// === WGSL SOURCES ===
// ======================================
//
// Bind group layout shared by every pipeline:
//   group(0): frame uniforms, environment map, linear sampler
//   group(1): per-object uniforms, colour/emissive map, sampler
//   group(2): opaque scene colour, sampled by transmissive surfaces
//
// The blit binds the same texture/sampler layout at group(0).

use crate::config::MAX_TRANSMISSION_SAMPLES;

/// Frame uniforms, environment bindings and colour helpers.
const COMMON_WGSL: &str = r#"
const PI: f32 = 3.141592653589793;

struct Frame {
    view_proj: mat4x4<f32>,
    inv_view_rot: mat4x4<f32>,
    camera_position: vec3<f32>,
    time: f32,
    ambient: vec4<f32>,
    exposure: f32,
    env_intensity: f32,
    background_blurriness: f32,
    background_intensity: f32,
    env_max_lod: f32,
    tone_mapping: u32,
    _pad0: f32,
    _pad1: f32,
    viewport: vec4<f32>,
}

@group(0) @binding(0) var<uniform> frame: Frame;
@group(0) @binding(1) var env_map: texture_2d<f32>;
@group(0) @binding(2) var env_sampler: sampler;

// Equirectangular lookup, image row 0 at the top (+Y).
fn equirect_uv(dir: vec3<f32>) -> vec2<f32> {
    let d = normalize(dir);
    let u = atan2(d.z, d.x) * (0.5 / PI) + 0.5;
    let v = asin(clamp(d.y, -1.0, 1.0)) / PI + 0.5;
    return vec2<f32>(u, 1.0 - v);
}

fn sample_env(dir: vec3<f32>, lod: f32) -> vec3<f32> {
    return textureSampleLevel(env_map, env_sampler, equirect_uv(dir), clamp(lod, 0.0, frame.env_max_lod)).rgb;
}

fn view_direction() -> vec3<f32> {
    // Camera +Z in world space; constant across the screen for an orthographic view.
    return normalize((frame.inv_view_rot * vec4<f32>(0.0, 0.0, 1.0, 0.0)).xyz);
}

fn rrt_and_odt_fit(v: vec3<f32>) -> vec3<f32> {
    let a = v * (v + 0.0245786) - 0.000090537;
    let b = v * (0.983729 * v + 0.4329510) + 0.238081;
    return a / b;
}

fn aces_filmic(color_in: vec3<f32>) -> vec3<f32> {
    let aces_input = mat3x3<f32>(
        vec3<f32>(0.59719, 0.07600, 0.02840),
        vec3<f32>(0.35458, 0.90834, 0.13383),
        vec3<f32>(0.04823, 0.01566, 0.83777)
    );
    let aces_output = mat3x3<f32>(
        vec3<f32>(1.60475, -0.10208, -0.00327),
        vec3<f32>(-0.53108, 1.10813, -0.07276),
        vec3<f32>(-0.07367, -0.00605, 1.07602)
    );
    var color = color_in * (frame.exposure / 0.6);
    color = aces_input * color;
    color = rrt_and_odt_fit(color);
    color = aces_output * color;
    return clamp(color, vec3<f32>(0.0), vec3<f32>(1.0));
}

fn tone_map(color: vec3<f32>) -> vec3<f32> {
    if (frame.tone_mapping == 1u) {
        return aces_filmic(color);
    }
    return color * frame.exposure;
}
"#;

/// Vertex stage and per-object bindings for scene meshes.
const MESH_WGSL: &str = r#"
struct Object {
    model: mat4x4<f32>,
    normal_matrix: mat4x4<f32>,
    base_color: vec4<f32>,
    // rgb = emissive * intensity, w = 1 when the map also drives emission
    emissive: vec4<f32>,
    // roughness, metalness, double_sided, opacity
    surface: vec4<f32>,
    // transmission, ior, thickness, chromatic_aberration
    glass: vec4<f32>,
    // distortion, distortion_scale, temporal_distortion, time
    distortion: vec4<f32>,
    // clearcoat, clearcoat_roughness, anisotropy, unused
    coat: vec4<f32>,
}

@group(1) @binding(0) var<uniform> object: Object;
@group(1) @binding(1) var color_map: texture_2d<f32>;
@group(1) @binding(2) var color_sampler: sampler;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) world_position: vec3<f32>,
    @location(1) world_normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
}

@vertex
fn vs_main(vertex: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    let world = object.model * vec4<f32>(vertex.position, 1.0);
    out.clip_position = frame.view_proj * world;
    out.world_position = world.xyz;
    out.world_normal = (object.normal_matrix * vec4<f32>(vertex.normal, 0.0)).xyz;
    out.uv = vertex.uv;
    return out;
}

fn fresnel_schlick(f0: vec3<f32>, cos_theta: f32) -> vec3<f32> {
    return f0 + (vec3<f32>(1.0) - f0) * pow(1.0 - clamp(cos_theta, 0.0, 1.0), 5.0);
}
"#;

/// Fullscreen triangle drawing the blurred environment behind everything.
pub fn generate_background_shader() -> String {
    format!(
        r#"{common}
struct BackgroundOutput {{
    @builtin(position) clip_position: vec4<f32>,
    @location(0) ndc: vec2<f32>,
}}

@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> BackgroundOutput {{
    var out: BackgroundOutput;
    let uv = vec2<f32>(f32((index << 1u) & 2u), f32(index & 2u));
    let ndc = uv * 2.0 - 1.0;
    out.clip_position = vec4<f32>(ndc, 0.0, 1.0);
    out.ndc = ndc;
    return out;
}}

@fragment
fn fs_main(in: BackgroundOutput) -> @location(0) vec4<f32> {{
    let aspect = frame.viewport.x / max(frame.viewport.y, 1.0);
    let view_dir = normalize(vec3<f32>(in.ndc.x * aspect, in.ndc.y, -1.0));
    let world_dir = (frame.inv_view_rot * vec4<f32>(view_dir, 0.0)).xyz;
    // Full blur stops a few levels short of 1×1 so the backdrop keeps some shape.
    let lod = clamp(frame.background_blurriness, 0.0, 1.0) * max(frame.env_max_lod - 4.0, 0.0);
    let color = sample_env(world_dir, lod) * frame.background_intensity;
    return vec4<f32>(tone_map(color), 1.0);
}}
"#,
        common = COMMON_WGSL
    )
}

/// Lit opaque surfaces: ambient plus image-based diffuse and specular,
/// emission optionally modulated by the colour map.
pub fn generate_standard_shader() -> String {
    format!(
        r#"{common}{mesh}
@fragment
fn fs_main(in: VertexOutput, @builtin(front_facing) front_facing: bool) -> @location(0) vec4<f32> {{
    let texel = textureSample(color_map, color_sampler, in.uv);
    let base = object.base_color.rgb * texel.rgb;
    let roughness = object.surface.x;
    let metalness = object.surface.y;

    var n = normalize(in.world_normal);
    if (!front_facing && object.surface.z > 0.5) {{
        n = -n;
    }}
    let v = view_direction();
    let n_dot_v = max(dot(n, v), 0.0);

    let diffuse_env = sample_env(n, frame.env_max_lod) * frame.env_intensity;
    let specular_env = sample_env(reflect(-v, n), roughness * frame.env_max_lod) * frame.env_intensity;
    let f0 = mix(vec3<f32>(0.04), base, metalness);
    let fresnel = fresnel_schlick(f0, n_dot_v);

    let diffuse = base * (1.0 - metalness) * (frame.ambient.rgb + diffuse_env);
    let specular = specular_env * fresnel * (1.0 - roughness * 0.5);
    let emissive = object.emissive.rgb * mix(vec3<f32>(1.0), texel.rgb, object.emissive.w);

    let color = diffuse + specular + emissive;
    return vec4<f32>(tone_map(color), object.base_color.a * texel.a);
}}
"#,
        common = COMMON_WGSL,
        mesh = MESH_WGSL
    )
}

/// Refractive glass. Samples the opaque scene behind the surface once per
/// material sample (`object.coat.w`) and channel, with jittered,
/// time-distorted refraction offsets.
pub fn generate_transmission_shader() -> String {
    format!(
        r#"{common}{mesh}
const MAX_SAMPLES: u32 = {max_samples}u;

@group(2) @binding(0) var scene_color: texture_2d<f32>;
@group(2) @binding(1) var scene_sampler: sampler;

fn hash3(p: vec3<f32>) -> vec3<f32> {{
    let q = vec3<f32>(
        dot(p, vec3<f32>(127.1, 311.7, 74.7)),
        dot(p, vec3<f32>(269.5, 183.3, 246.1)),
        dot(p, vec3<f32>(113.5, 271.9, 124.6))
    );
    return fract(sin(q) * 43758.5453) * 2.0 - 1.0;
}}

fn distortion_field(p: vec3<f32>) -> vec3<f32> {{
    let scale = object.distortion.y;
    let phase = object.distortion.w * object.distortion.z;
    let q = p * scale * 10.0 + vec3<f32>(phase);
    return vec3<f32>(sin(q.y + cos(q.z)), sin(q.z + cos(q.x)), sin(q.x + cos(q.y)));
}}

fn sample_behind(uv: vec2<f32>) -> vec3<f32> {{
    return textureSampleLevel(scene_color, scene_sampler, clamp(uv, vec2<f32>(0.0), vec2<f32>(1.0)), 0.0).rgb;
}}

@fragment
fn fs_main(in: VertexOutput, @builtin(front_facing) front_facing: bool) -> @location(0) vec4<f32> {{
    var n = normalize(in.world_normal);
    if (!front_facing) {{
        n = -n;
    }}
    let v = view_direction();
    let n_dot_v = max(dot(n, v), 0.0);

    let transmission = object.glass.x;
    let ior = max(object.glass.y, 1.0);
    let thickness = object.glass.z;
    let aberration = object.glass.w;
    let roughness = object.surface.x;
    let anisotropy = object.coat.z;

    let distorted = normalize(n + distortion_field(in.world_position) * object.distortion.x * 0.1);
    let screen_uv = in.clip_position.xy * frame.viewport.zw;

    let samples = clamp(u32(object.coat.w), 1u, MAX_SAMPLES);
    var transmitted = vec3<f32>(0.0);
    for (var i = 0u; i < samples; i = i + 1u) {{
        let jitter = hash3(in.world_position * 13.0 + vec3<f32>(f32(i)));
        let sample_normal = normalize(distorted + jitter * (roughness + anisotropy * 0.1) * 0.5);
        let offset = f32(i) / f32(samples) * aberration;

        let ior_r = ior * (1.0 - aberration + offset);
        let ior_g = ior * (1.0 + offset);
        let ior_b = ior * (1.0 + aberration + offset);

        let refract_r = refract(-v, sample_normal, 1.0 / ior_r) * thickness;
        let refract_g = refract(-v, sample_normal, 1.0 / ior_g) * thickness;
        let refract_b = refract(-v, sample_normal, 1.0 / ior_b) * thickness;

        let shift_r = (frame.view_proj * vec4<f32>(refract_r, 0.0)).xy * vec2<f32>(0.5, -0.5);
        let shift_g = (frame.view_proj * vec4<f32>(refract_g, 0.0)).xy * vec2<f32>(0.5, -0.5);
        let shift_b = (frame.view_proj * vec4<f32>(refract_b, 0.0)).xy * vec2<f32>(0.5, -0.5);

        transmitted = transmitted + vec3<f32>(
            sample_behind(screen_uv + shift_r).r,
            sample_behind(screen_uv + shift_g).g,
            sample_behind(screen_uv + shift_b).b
        );
    }}
    transmitted = transmitted / f32(samples) * object.base_color.rgb;

    // Scene colour is already tone mapped, so only the reflections need it.
    let reflected = tone_map(sample_env(reflect(-v, n), roughness * frame.env_max_lod) * frame.env_intensity);
    let f0 = pow((ior - 1.0) / (ior + 1.0), 2.0);
    let fresnel = fresnel_schlick(vec3<f32>(f0), n_dot_v);
    let surface = mix(transmitted * transmission, reflected, fresnel);

    let coat_weight = object.coat.x * fresnel_schlick(vec3<f32>(0.04), n_dot_v).x;
    let coat = tone_map(sample_env(reflect(-v, n), object.coat.y * frame.env_max_lod) * frame.env_intensity);
    return vec4<f32>(mix(surface, coat, coat_weight), 1.0);
}}
"#,
        common = COMMON_WGSL,
        mesh = MESH_WGSL,
        max_samples = MAX_TRANSMISSION_SAMPLES
    )
}

/// Copies the offscreen scene colour onto the surface.
pub fn generate_blit_shader() -> String {
    r#"
@group(0) @binding(0) var source: texture_2d<f32>;
@group(0) @binding(1) var source_sampler: sampler;

struct BlitOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> BlitOutput {
    var out: BlitOutput;
    let uv = vec2<f32>(f32((index << 1u) & 2u), f32(index & 2u));
    out.clip_position = vec4<f32>(uv * 2.0 - 1.0, 0.0, 1.0);
    out.uv = vec2<f32>(uv.x, 1.0 - uv.y);
    return out;
}

@fragment
fn fs_main(in: BlitOutput) -> @location(0) vec4<f32> {
    return textureSampleLevel(source, source_sampler, in.uv, 0.0);
}
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn balanced(source: &str) -> bool {
        let mut depth = 0i32;
        for c in source.chars() {
            match c {
                '{' => depth += 1,
                '}' => depth -= 1,
                _ => {}
            }
            if depth < 0 {
                return false;
            }
        }
        depth == 0
    }

    #[test]
    fn every_shader_has_both_stages() {
        for source in [
            generate_background_shader(),
            generate_standard_shader(),
            generate_transmission_shader(),
            generate_blit_shader(),
        ] {
            assert!(source.contains("fn vs_main"));
            assert!(source.contains("fn fs_main"));
            assert!(balanced(&source));
        }
    }

    #[test]
    fn sample_count_comes_from_the_material() {
        let source = generate_transmission_shader();
        assert!(source.contains("clamp(u32(object.coat.w), 1u, MAX_SAMPLES)"));
        assert!(source.contains(&format!("const MAX_SAMPLES: u32 = {MAX_TRANSMISSION_SAMPLES}u;")));
    }

    #[test]
    fn only_glass_reads_scene_colour() {
        assert!(generate_transmission_shader().contains("@group(2)"));
        assert!(!generate_standard_shader().contains("@group(2)"));
        assert!(!generate_background_shader().contains("@group(1)"));
    }
}
