//! Graphics pipeline cache keyed by structural identity.

use crate::error::Result;
use ash::vk;
use ash::vk::Handle;
use std::collections::HashMap;

/// Structural identity of a graphics pipeline.
///
/// Two requests with equal keys get the same `vk::Pipeline`. Handles are
/// stored as raw bits so the key is a plain value type with derived equality.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct PipelineKey {
    vertex_shader: u64,
    fragment_shader: u64,
    render_pass: u64,
    layout: u64,
}

impl PipelineKey {
    pub fn new(
        vertex_shader: vk::ShaderModule,
        fragment_shader: vk::ShaderModule,
        render_pass: vk::RenderPass,
        layout: vk::PipelineLayout,
    ) -> Self {
        Self {
            vertex_shader: vertex_shader.as_raw(),
            fragment_shader: fragment_shader.as_raw(),
            render_pass: render_pass.as_raw(),
            layout: layout.as_raw(),
        }
    }

    fn references_render_pass(&self, render_pass: vk::RenderPass) -> bool {
        self.render_pass == render_pass.as_raw()
    }
}

/// Cache of graphics pipelines for the lifetime of the device.
///
/// Pipelines are created on first request and reused until their render pass
/// is purged or the cache is destroyed. The cache owns every pipeline it
/// hands out; callers never destroy them directly.
#[derive(Default)]
pub struct PipelineCache {
    pipelines: HashMap<PipelineKey, vk::Pipeline>,
}

impl PipelineCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached pipelines.
    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    /// Look up the pipeline for `key`, calling `create` on a miss.
    ///
    /// `create` runs at most once per key; a creation failure leaves the
    /// cache unchanged.
    pub fn find_or_create<F>(&mut self, key: PipelineKey, create: F) -> Result<vk::Pipeline>
    where
        F: FnOnce() -> Result<vk::Pipeline>,
    {
        if let Some(&pipeline) = self.pipelines.get(&key) {
            return Ok(pipeline);
        }

        let pipeline = create()?;
        self.pipelines.insert(key, pipeline);
        Ok(pipeline)
    }

    /// Destroy every pipeline built against `render_pass`.
    ///
    /// Must be called before the render pass itself is destroyed, otherwise a
    /// later request with a recycled render-pass handle could alias a stale
    /// entry.
    pub fn purge_render_pass(&mut self, device: &ash::Device, render_pass: vk::RenderPass) {
        self.pipelines.retain(|key, pipeline| {
            if key.references_render_pass(render_pass) {
                unsafe {
                    device.destroy_pipeline(*pipeline, None);
                }
                false
            } else {
                true
            }
        });
    }

    /// Destroy all cached pipelines.
    pub fn destroy_all(&mut self, device: &ash::Device) {
        for (_, pipeline) in self.pipelines.drain() {
            unsafe {
                device.destroy_pipeline(pipeline, None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GpuError;

    fn key(vs: u64, fs: u64, rp: u64, layout: u64) -> PipelineKey {
        PipelineKey::new(
            vk::ShaderModule::from_raw(vs),
            vk::ShaderModule::from_raw(fs),
            vk::RenderPass::from_raw(rp),
            vk::PipelineLayout::from_raw(layout),
        )
    }

    #[test]
    fn equal_keys_hit_the_cache() {
        let mut cache = PipelineCache::new();
        let mut creations = 0;

        let first = cache
            .find_or_create(key(1, 2, 3, 4), || {
                creations += 1;
                Ok(vk::Pipeline::from_raw(100))
            })
            .unwrap();
        let second = cache
            .find_or_create(key(1, 2, 3, 4), || {
                creations += 1;
                Ok(vk::Pipeline::from_raw(200))
            })
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(creations, 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn differing_components_create_distinct_pipelines() {
        let mut cache = PipelineCache::new();
        let mut next = 0_u64;
        let mut create = || {
            next += 1;
            vk::Pipeline::from_raw(next)
        };

        // Vary each key component in turn.
        for k in [
            key(1, 2, 3, 4),
            key(9, 2, 3, 4),
            key(1, 9, 3, 4),
            key(1, 2, 9, 4),
            key(1, 2, 3, 9),
        ] {
            let p = create();
            let got = cache.find_or_create(k, || Ok(p)).unwrap();
            assert_eq!(got, p);
        }

        assert_eq!(cache.len(), 5);
    }

    #[test]
    fn creation_failure_leaves_cache_unchanged() {
        let mut cache = PipelineCache::new();
        let result = cache.find_or_create(key(1, 2, 3, 4), || {
            Err(GpuError::PipelineCreation("no device".to_string()))
        });

        assert!(result.is_err());
        assert!(cache.is_empty());

        // The key is retried on the next request.
        let pipeline = cache
            .find_or_create(key(1, 2, 3, 4), || Ok(vk::Pipeline::from_raw(7)))
            .unwrap();
        assert_eq!(pipeline, vk::Pipeline::from_raw(7));
    }
}
