//! Common utilities for integration tests.
//!
//! Every test runs on the dummy backend, which keeps buffer contents in host
//! memory so reads after reallocation and swap-removal can be checked byte
//! for byte.

#![allow(dead_code)]

use std::rc::Rc;

use glcore_graphics::{
    Attribute, AttributeKind, DeviceParameters, DummyBackend, GraphicsDevice, InstanceBuffer,
    Layout,
};

/// A device together with the backend it runs on.
pub struct TestContext {
    pub backend: Rc<DummyBackend>,
    pub device: Rc<GraphicsDevice>,
}

impl TestContext {
    /// Fresh context with default parameters.
    pub fn new() -> Self {
        Self::with_backend(DummyBackend::new(), DeviceParameters::default())
    }

    /// Context whose backend refuses allocations past `bytes` in total.
    pub fn with_memory_limit(bytes: u64) -> Self {
        Self::with_backend(
            DummyBackend::with_memory_limit(bytes),
            DeviceParameters::default(),
        )
    }

    /// Context with custom device parameters.
    pub fn with_parameters(parameters: DeviceParameters) -> Self {
        Self::with_backend(DummyBackend::new(), parameters)
    }

    fn with_backend(backend: DummyBackend, parameters: DeviceParameters) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let backend = Rc::new(backend);
        let device = GraphicsDevice::new(backend.clone(), parameters.with_label("test"));
        Self { backend, device }
    }

    /// Empty instance buffer for `layout`.
    pub fn instances(&self, layout: Layout) -> InstanceBuffer {
        InstanceBuffer::new(&self.device, layout, &[]).expect("failed to create instance buffer")
    }
}

/// Single `vec3` record, 12 bytes.
pub fn offset_layout() -> Layout {
    Layout::new([Attribute::vec3("offset")])
}

/// Model matrix plus tint, 80 bytes.
pub fn transform_layout() -> Layout {
    Layout::builder()
        .with_attribute(Attribute::vec4("tint"))
        .with_attribute(Attribute::mat4("model"))
        .with_label("transforms")
        .build()
}

/// Layout with one attribute of every kind.
pub fn every_kind_layout() -> Layout {
    Layout::new(
        AttributeKind::ALL
            .iter()
            .map(|&kind| Attribute::new(kind, kind.name())),
    )
}

/// Deterministic record of `stride` bytes distinct for every `seed`.
pub fn record(stride: usize, seed: usize) -> Vec<u8> {
    (0..stride)
        .map(|i| (seed.wrapping_mul(31).wrapping_add(i * 7) % 251) as u8)
        .collect()
}
