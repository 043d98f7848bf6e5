use anyhow::{bail, Result};
use image::imageops::flip_vertical_in_place;
use wgpu::util::{DeviceExt, TextureDataOrder};

use crate::assets::DissolveAssets;

/// A sampled 2D texture bound to the dissolve pipeline.
pub(crate) struct BoundTexture {
    pub _texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
}

/// The two textures one run samples from.
pub(crate) struct DissolveTextures {
    pub source: BoundTexture,
    pub glyphs: BoundTexture,
}

impl DissolveTextures {
    /// Uploads both images with rows flipped so texture `v = 0` is the bottom
    /// edge, matching the quad's `v_uv`.
    pub fn upload(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        assets: &DissolveAssets,
        max_dimension: u32,
    ) -> Result<Self> {
        let mut source = assets.source.clone();
        flip_vertical_in_place(&mut source);
        let mut glyphs = assets.glyphs.clone();
        flip_vertical_in_place(&mut glyphs);

        let source = upload_texture(
            device,
            queue,
            "dissolve source texture",
            source.dimensions(),
            wgpu::TextureFormat::Rgba8Unorm,
            source.as_raw(),
            max_dimension,
        )?;
        let glyphs = upload_texture(
            device,
            queue,
            "dissolve glyph atlas",
            glyphs.dimensions(),
            wgpu::TextureFormat::R8Unorm,
            glyphs.as_raw(),
            max_dimension,
        )?;
        Ok(Self { source, glyphs })
    }
}

fn upload_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    label: &str,
    (width, height): (u32, u32),
    format: wgpu::TextureFormat,
    data: &[u8],
    max_dimension: u32,
) -> Result<BoundTexture> {
    if width == 0 || height == 0 {
        bail!("{label} has zero size ({width}x{height})");
    }
    if width > max_dimension || height > max_dimension {
        bail!("{label} is {width}x{height}; GPU max texture dimension is {max_dimension}");
    }

    let texture = device.create_texture_with_data(
        queue,
        &wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        TextureDataOrder::LayerMajor,
        data,
    );

    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some(label),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    });

    Ok(BoundTexture {
        _texture: texture,
        view,
        sampler,
    })
}
