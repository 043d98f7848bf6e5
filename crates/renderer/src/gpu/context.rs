use std::sync::Arc;

use anyhow::{anyhow, Context as AnyhowContext, Result};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::dpi::PhysicalSize;

use crate::types::SurfaceAlpha;

pub(crate) struct GpuContext {
    pub _instance: wgpu::Instance,
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    pub size: PhysicalSize<u32>,
    pub surface_format: wgpu::TextureFormat,
    pub max_texture_dimension: u32,
}

impl GpuContext {
    pub(crate) fn new<W>(
        target: Arc<W>,
        initial_size: PhysicalSize<u32>,
        surface_alpha: SurfaceAlpha,
    ) -> Result<Self>
    where
        W: HasDisplayHandle + HasWindowHandle + Send + Sync + 'static,
    {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            flags: wgpu::InstanceFlags::default(),
            memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
            backend_options: wgpu::BackendOptions::default(),
        });

        // The surface holds its own reference to the window.
        let surface = instance
            .create_surface(target)
            .context("failed to create rendering surface")?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::LowPower,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .context("failed to find a suitable GPU adapter")?;

        let adapter_info = adapter.get_info();
        tracing::debug!(
            name = %adapter_info.name,
            backend = ?adapter_info.backend,
            device_type = ?adapter_info.device_type,
            "selected GPU adapter"
        );

        let limits = adapter.limits();
        let max_texture_dimension = limits.max_texture_dimension_2d;
        let size = PhysicalSize::new(initial_size.width.max(1), initial_size.height.max(1));
        if size.width > max_texture_dimension || size.height > max_texture_dimension {
            anyhow::bail!(
                "GPU max texture dimension is {max_texture_dimension}, requested surface is {}x{}",
                size.width,
                size.height
            );
        }

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|format| !format.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| anyhow!("surface reports no supported formats"))?;
        if surface_format.is_srgb() {
            tracing::warn!(
                ?surface_format,
                "no non-sRGB surface format available; colours will be re-encoded"
            );
        }

        let alpha_mode = choose_alpha_mode(&surface_caps.alpha_modes, surface_alpha);
        tracing::debug!(?surface_format, ?alpha_mode, "configuring surface");

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("binary dissolve device"),
            required_features: wgpu::Features::empty(),
            required_limits: limits.clone(),
            memory_hints: wgpu::MemoryHints::MemoryUsage,
            trace: wgpu::Trace::default(),
        }))
        .context("failed to create GPU device")?;

        let present_mode = surface_caps
            .present_modes
            .iter()
            .copied()
            .find(|mode| *mode == wgpu::PresentMode::Fifo)
            .unwrap_or(wgpu::PresentMode::AutoVsync);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width,
            height: size.height,
            present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        Ok(Self {
            _instance: instance,
            surface,
            device,
            queue,
            config,
            size,
            surface_format,
            max_texture_dimension,
        })
    }

    pub(crate) fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }
        let clamped = PhysicalSize::new(
            new_size.width.min(self.max_texture_dimension),
            new_size.height.min(self.max_texture_dimension),
        );
        if clamped != new_size {
            tracing::warn!(
                requested = ?new_size,
                ?clamped,
                "surface size exceeds GPU limits; clamping"
            );
        }
        if clamped == self.size {
            return;
        }

        self.size = clamped;
        self.config.width = clamped.width;
        self.config.height = clamped.height;
        self.surface.configure(&self.device, &self.config);
    }

    /// Re-applies the current configuration after the surface was lost.
    pub(crate) fn reconfigure(&self) {
        self.surface.configure(&self.device, &self.config);
    }
}

/// Picks a compositor alpha mode. Transparent surfaces want the blended
/// framebuffer (colour already multiplied by alpha) composited as-is.
fn choose_alpha_mode(
    supported: &[wgpu::CompositeAlphaMode],
    surface_alpha: SurfaceAlpha,
) -> wgpu::CompositeAlphaMode {
    let preferred: &[wgpu::CompositeAlphaMode] = match surface_alpha {
        SurfaceAlpha::Transparent => &[
            wgpu::CompositeAlphaMode::PreMultiplied,
            wgpu::CompositeAlphaMode::PostMultiplied,
            wgpu::CompositeAlphaMode::Inherit,
        ],
        SurfaceAlpha::Opaque => &[wgpu::CompositeAlphaMode::Opaque],
    };
    preferred
        .iter()
        .copied()
        .find(|mode| supported.contains(mode))
        .or_else(|| {
            if surface_alpha == SurfaceAlpha::Transparent {
                tracing::warn!(
                    ?supported,
                    "surface cannot composite with alpha; uncovered regions will look opaque"
                );
            }
            supported.first().copied()
        })
        .unwrap_or(wgpu::CompositeAlphaMode::Auto)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wgpu::CompositeAlphaMode;

    #[test]
    fn transparent_prefers_premultiplied() {
        let supported = [
            CompositeAlphaMode::Opaque,
            CompositeAlphaMode::PostMultiplied,
            CompositeAlphaMode::PreMultiplied,
        ];
        assert_eq!(
            choose_alpha_mode(&supported, SurfaceAlpha::Transparent),
            CompositeAlphaMode::PreMultiplied
        );
        assert_eq!(
            choose_alpha_mode(&supported, SurfaceAlpha::Opaque),
            CompositeAlphaMode::Opaque
        );
    }

    #[test]
    fn falls_back_to_first_supported_mode() {
        assert_eq!(
            choose_alpha_mode(&[CompositeAlphaMode::Opaque], SurfaceAlpha::Transparent),
            CompositeAlphaMode::Opaque
        );
        assert_eq!(
            choose_alpha_mode(&[], SurfaceAlpha::Opaque),
            CompositeAlphaMode::Auto
        );
    }
}
