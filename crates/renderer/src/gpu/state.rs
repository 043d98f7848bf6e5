use std::sync::Arc;

use anyhow::Result;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use scheduler::RunSettings;
use wgpu::util::DeviceExt;
use winit::dpi::PhysicalSize;

use crate::assets::DissolveAssets;
use crate::controller::RenderBackend;
use crate::error::DissolveError;
use crate::mask::CellSize;
use crate::types::SurfaceAlpha;

use super::context::GpuContext;
use super::pipeline::{DissolvePipeline, QUAD_VERTEX_COUNT};
use super::textures::DissolveTextures;
use super::uniforms::DissolveUniforms;

/// Resources bound for the run currently on screen.
struct InstalledRun {
    _textures: DissolveTextures,
    texture_bind_group: wgpu::BindGroup,
    uniforms: DissolveUniforms,
    source_size: PhysicalSize<u32>,
}

/// Owns the surface and every GPU object the dissolve needs.
pub struct GpuState {
    context: GpuContext,
    pipeline: DissolvePipeline,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    installed: Option<InstalledRun>,
    clear_color: wgpu::Color,
}

impl GpuState {
    pub(crate) fn new<W>(
        target: Arc<W>,
        initial_size: PhysicalSize<u32>,
        surface_alpha: SurfaceAlpha,
    ) -> Result<Self>
    where
        W: HasDisplayHandle + HasWindowHandle + Send + Sync + 'static,
    {
        let context = GpuContext::new(target, initial_size, surface_alpha)?;
        let pipeline = DissolvePipeline::new(&context.device, context.surface_format);

        let uniform_buffer = context
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("dissolve uniforms"),
                contents: bytemuck::bytes_of(&DissolveUniforms::new(
                    CellSize {
                        width: 1.0,
                        height: 1.0,
                    },
                    0.0,
                )),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });
        let uniform_bind_group = context
            .device
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("dissolve uniform bind group"),
                layout: &pipeline.uniform_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform_buffer.as_entire_binding(),
                }],
            });

        Ok(Self {
            context,
            pipeline,
            uniform_buffer,
            uniform_bind_group,
            installed: None,
            clear_color: surface_alpha.clear_color(),
        })
    }

    pub fn surface_size(&self) -> PhysicalSize<u32> {
        self.context.size
    }

    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        self.context.resize(new_size);
    }

    fn acquire_frame(&mut self) -> Result<wgpu::SurfaceTexture, DissolveError> {
        match self.context.surface.get_current_texture() {
            Ok(frame) => Ok(frame),
            Err(err @ (wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated)) => {
                tracing::debug!(error = %err, "reconfiguring surface");
                self.context.reconfigure();
                Err(err.into())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Clears the surface and, when a run is installed, draws the mask at
    /// `progress`.
    fn render(&mut self, progress: Option<f32>) -> Result<(), DissolveError> {
        let frame = self.acquire_frame()?;
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let draw = match (progress, self.installed.as_ref()) {
            (Some(progress), Some(installed)) => {
                let uniforms = installed.uniforms.with_progress(progress);
                self.context.queue.write_buffer(
                    &self.uniform_buffer,
                    0,
                    bytemuck::bytes_of(&uniforms),
                );
                Some((&installed.texture_bind_group, installed.source_size))
            }
            _ => None,
        };

        let mut encoder =
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("dissolve encoder"),
                });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("dissolve pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            if let Some((texture_bind_group, source_size)) = draw {
                let [x, y, width, height] = fit_viewport(source_size, self.context.size);
                render_pass.set_viewport(x, y, width, height, 0.0, 1.0);
                render_pass.set_pipeline(&self.pipeline.pipeline);
                render_pass.set_bind_group(0, &self.uniform_bind_group, &[]);
                render_pass.set_bind_group(1, texture_bind_group, &[]);
                render_pass.set_vertex_buffer(0, self.pipeline.quad.slice(..));
                render_pass.draw(0..QUAD_VERTEX_COUNT, 0..1);
            }
        }

        self.context.queue.submit(Some(encoder.finish()));
        frame.present();
        Ok(())
    }
}

impl RenderBackend for GpuState {
    fn install(
        &mut self,
        assets: &DissolveAssets,
        settings: &RunSettings,
        cell_size: CellSize,
    ) -> Result<(), DissolveError> {
        let textures = DissolveTextures::upload(
            &self.context.device,
            &self.context.queue,
            assets,
            self.context.max_texture_dimension,
        )
        .map_err(DissolveError::Setup)?;
        let texture_bind_group = self
            .pipeline
            .bind_textures(&self.context.device, &textures);

        let (width, height) = assets.source_dimensions();
        // Dropping the previous run's textures here releases them.
        self.installed = Some(InstalledRun {
            _textures: textures,
            texture_bind_group,
            uniforms: DissolveUniforms::new(cell_size, settings.smoothness),
            source_size: PhysicalSize::new(width, height),
        });

        self.context.resize(PhysicalSize::new(width, height));
        tracing::debug!(
            width,
            height,
            cell_width = cell_size.width,
            cell_height = cell_size.height,
            "installed dissolve resources"
        );
        Ok(())
    }

    fn clear(&mut self) -> Result<(), DissolveError> {
        self.render(None)
    }

    fn present(&mut self, progress: f32) -> Result<(), DissolveError> {
        self.render(Some(progress))
    }

    fn release(&mut self) {
        if self.installed.take().is_some() {
            tracing::debug!("released dissolve resources");
        }
    }
}

/// Largest viewport with the source's aspect ratio, centred on the surface.
///
/// Returns `[x, y, width, height]`. When the window manager ignores the
/// requested size the image is letterboxed instead of stretched.
fn fit_viewport(source: PhysicalSize<u32>, surface: PhysicalSize<u32>) -> [f32; 4] {
    let (surface_w, surface_h) = (surface.width as f32, surface.height as f32);
    if source.width == 0 || source.height == 0 {
        return [0.0, 0.0, surface_w, surface_h];
    }
    let scale = (surface_w / source.width as f32).min(surface_h / source.height as f32);
    let width = (source.width as f32 * scale).min(surface_w);
    let height = (source.height as f32 * scale).min(surface_h);
    [
        ((surface_w - width) * 0.5).floor(),
        ((surface_h - height) * 0.5).floor(),
        width,
        height,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_surface_uses_the_whole_target() {
        let size = PhysicalSize::new(640, 480);
        assert_eq!(fit_viewport(size, size), [0.0, 0.0, 640.0, 480.0]);
    }

    #[test]
    fn wider_surface_pillarboxes() {
        let viewport = fit_viewport(PhysicalSize::new(100, 100), PhysicalSize::new(300, 100));
        assert_eq!(viewport, [100.0, 0.0, 100.0, 100.0]);
    }

    #[test]
    fn taller_surface_letterboxes() {
        let viewport = fit_viewport(PhysicalSize::new(200, 100), PhysicalSize::new(400, 400));
        assert_eq!(viewport, [0.0, 100.0, 400.0, 200.0]);
    }
}
