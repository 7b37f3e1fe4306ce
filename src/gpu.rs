//! Headless GPU device management.
//!
//! [`GpuContext`] holds the wgpu device and queue used by
//! [`WgpuBackend`](crate::WgpuBackend). Filter graphs render off-screen, so no
//! surface or window is involved: the context is created from a
//! [`GpuConfig`] alone.
//!
//! # Example
//!
//! ```no_run
//! use ipgraph::{GpuConfig, GpuContext};
//!
//! let gpu = GpuContext::new(&GpuConfig::new().with_label("filters"))?;
//!
//! let buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
//!     label: Some("My Buffer"),
//!     size: 1024,
//!     usage: wgpu::BufferUsages::UNIFORM,
//!     mapped_at_creation: false,
//! });
//! gpu.queue.write_buffer(&buffer, 0, &[0u8; 1024]);
//! # Ok::<(), ipgraph::BackendError>(())
//! ```

use tracing::info;

use crate::error::BackendError;

/// Adapter and device selection.
///
/// Uses a builder pattern for ergonomic configuration:
///
/// ```
/// use ipgraph::GpuConfig;
///
/// let config = GpuConfig::new()
///     .with_power_preference(wgpu::PowerPreference::LowPower)
///     .with_fallback_adapter(true);
/// ```
#[derive(Clone, Debug)]
pub struct GpuConfig {
    /// Debug label of the device.
    pub label: String,
    /// Which adapter to prefer when several are available.
    pub power_preference: wgpu::PowerPreference,
    /// Backend APIs the instance may use.
    pub backends: wgpu::Backends,
    /// Accept a software adapter.
    pub force_fallback_adapter: bool,
}

impl Default for GpuConfig {
    fn default() -> Self {
        Self {
            label: "ipgraph device".to_string(),
            power_preference: wgpu::PowerPreference::default(),
            backends: wgpu::Backends::PRIMARY,
            force_fallback_adapter: false,
        }
    }
}

impl GpuConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_power_preference(mut self, preference: wgpu::PowerPreference) -> Self {
        self.power_preference = preference;
        self
    }

    pub fn with_backends(mut self, backends: wgpu::Backends) -> Self {
        self.backends = backends;
        self
    }

    pub fn with_fallback_adapter(mut self, force: bool) -> Self {
        self.force_fallback_adapter = force;
        self
    }
}

/// Core GPU context holding wgpu resources.
///
/// Fields are public to allow direct access to wgpu APIs when needed, for
/// example to upload a video frame straight into a source texture.
pub struct GpuContext {
    /// The logical GPU device for creating resources and pipelines.
    pub device: wgpu::Device,
    /// The command queue for submitting work to the GPU.
    pub queue: wgpu::Queue,
    /// Information about the selected adapter.
    pub adapter_info: wgpu::AdapterInfo,
}

impl GpuContext {
    /// Creates a device without a surface.
    ///
    /// 1. Creates a wgpu instance with the configured backends
    /// 2. Requests an adapter (no compatible surface)
    /// 3. Creates the logical device and command queue
    pub fn new(config: &GpuConfig) -> Result<Self, BackendError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: config.backends,
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: config.power_preference,
            compatible_surface: None,
            force_fallback_adapter: config.force_fallback_adapter,
        }))
        .map_err(|_| BackendError::NoAdapter)?;

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some(&config.label),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: Default::default(),
            trace: Default::default(),
            experimental_features: Default::default(),
        }))
        .map_err(|e| BackendError::DeviceCreation(e.to_string()))?;

        let adapter_info = adapter.get_info();
        info!(
            adapter = %adapter_info.name,
            backend = ?adapter_info.backend,
            "created headless GPU context"
        );

        Ok(Self {
            device,
            queue,
            adapter_info,
        })
    }
}
