use std::borrow::Cow;

use wgpu::naga::ShaderStage;

/// Compiles the pass-through quad vertex shader.
pub(crate) fn compile_vertex_shader(device: &wgpu::Device) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("dissolve quad vertex"),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Borrowed(VERTEX_SHADER_GLSL),
            stage: ShaderStage::Vertex,
            defines: &[],
        },
    })
}

/// Compiles the dissolve mask fragment shader.
///
/// The GLSL helpers mirror [`crate::mask`] one to one; keep both in sync when
/// the reveal curve changes.
pub(crate) fn compile_fragment_shader(device: &wgpu::Device) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("dissolve mask fragment"),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Borrowed(FRAGMENT_SHADER_GLSL),
            stage: ShaderStage::Fragment,
            defines: &[],
        },
    })
}

/// Quad vertex shader. `v_uv` runs from (0, 0) at the bottom-left corner to
/// (1, 1) at the top-right.
const VERTEX_SHADER_GLSL: &str = r"#version 450
layout(location = 0) in vec2 position;
layout(location = 0) out vec2 v_uv;

void main() {
    v_uv = position * 0.5 + vec2(0.5, 0.5);
    gl_Position = vec4(position, 0.0, 1.0);
}
";

/// Fragment shader. The uniform block layout must match
/// `DissolveUniforms` in `gpu/uniforms.rs`.
const FRAGMENT_SHADER_GLSL: &str = r"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 outColor;

layout(std140, set = 0, binding = 0) uniform DissolveParams {
    vec2 characterSize;
    float progress;
    float smoothness;
} params;

layout(set = 1, binding = 0) uniform texture2D source_texture;
layout(set = 1, binding = 1) uniform sampler source_sampler;
layout(set = 1, binding = 2) uniform texture2D glyph_texture;
layout(set = 1, binding = 3) uniform sampler glyph_sampler;

const float PHI = 1.618034;
const float VARIANT_SEED = 23.0;
const float THRESHOLD_SEED = 42.0;

float cell_random(vec2 cell, float seed) {
    float d = distance(cell * PHI, cell);
    return clamp(fract(tan(d * seed) * d), 0.0, 1.0);
}

float variant_bit(vec2 cell) {
    return clamp(floor(cell_random(cell, VARIANT_SEED) + 0.5), 0.0, 1.0);
}

float visibility(vec2 cell) {
    float lead = cell_random(cell, THRESHOLD_SEED) - params.progress * (1.0 + params.smoothness);
    if (params.smoothness <= 0.0) {
        return lead <= 0.0 ? 1.0 : 0.0;
    }
    return smoothstep(0.0, 1.0, clamp(lead / -params.smoothness, 0.0, 1.0));
}

void main() {
    vec2 grid = v_uv / params.characterSize;
    vec2 cell = floor(grid);
    vec2 within = grid - cell;

    vec2 glyph_uv = vec2(within.x * 0.5 + 0.5 * variant_bit(cell), within.y);
    float shape = texture(sampler2D(glyph_texture, glyph_sampler), glyph_uv).r;
    vec4 color = texture(sampler2D(source_texture, source_sampler), v_uv);

    outColor = vec4(color.rgb, shape * visibility(cell));
}
";
