//! Headless device setup

use crate::error::InitError;

/// Device features the pipeline uses when the adapter offers them
///
/// `BGRA8UNORM_STORAGE` lets direct output write into BGRA surfaces.
const OPTIONAL_FEATURES: &[(wgpu::Features, &str)] = &[(wgpu::Features::BGRA8UNORM_STORAGE, "BGRA8UNORM_STORAGE")];

/// Options for [`GpuContext::new`]
#[derive(Debug, Clone)]
pub struct GpuContextOptions {
    pub backends: wgpu::Backends,
    pub power_preference: wgpu::PowerPreference,
    /// Use a software adapter
    pub force_fallback_adapter: bool,
    /// Features requested in addition to the supported optional ones
    pub required_features: wgpu::Features,
}

impl Default for GpuContextOptions {
    fn default() -> Self {
        Self {
            backends: wgpu::Backends::PRIMARY,
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            required_features: wgpu::Features::empty(),
        }
    }
}

/// An adapter with its device and queue
#[derive(Debug, Clone)]
pub struct GpuContext {
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl GpuContext {
    /// Requests an adapter and a device with every supported optional feature enabled
    ///
    /// Missing optional features are logged; the pipeline falls back where it can.
    pub async fn new(options: &GpuContextOptions) -> Result<Self, InitError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: options.backends,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: options.power_preference,
                compatible_surface: None,
                force_fallback_adapter: options.force_fallback_adapter,
            })
            .await?;

        let adapter_info = adapter.get_info();
        tracing::info!(name = %adapter_info.name, backend = ?adapter_info.backend, "using adapter");

        let supported = adapter.features();
        let mut optional = wgpu::Features::empty();
        for &(feature, name) in OPTIONAL_FEATURES {
            if supported.contains(feature) {
                optional |= feature;
            } else {
                tracing::warn!(feature = name, "adapter lacks optional feature; continuing without it");
            }
        }

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("segblur"),
                required_features: options.required_features | optional,
                required_limits: wgpu::Limits::default().using_resolution(adapter.limits()),
                memory_hints: wgpu::MemoryHints::default(),
                trace: Default::default(),
            })
            .await?;

        Ok(Self { adapter, device, queue })
    }
}
