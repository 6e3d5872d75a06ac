pub mod backend;
pub mod cache;
pub mod common;
pub mod config;
pub mod handle;
pub mod manager;
pub mod resources;

use crate::renderer::backend::null::NullBackend;
use crate::renderer::backend::vulkan::VulkanBackend;
use crate::renderer::common::GraphicsApi;
use crate::renderer::config::RenderConfig;
use crate::renderer::manager::{BackendResourceManager, ResourceManager};
use color_eyre::Result;
use std::sync::Arc;

/// One device and its resource manager. Every wrapper type holds a clone.
#[derive(Clone)]
pub struct GraphicsContext {
    manager: Arc<dyn ResourceManager>,
    config: Arc<RenderConfig>,
}

impl GraphicsContext {
    pub fn new(config: &RenderConfig) -> Result<Self> {
        log::info!("Creating {:?} graphics context", config.api);
        let manager: Arc<dyn ResourceManager> = match config.api {
            GraphicsApi::Null => BackendResourceManager::new(NullBackend::default(), config),
            GraphicsApi::Vulkan => BackendResourceManager::new(VulkanBackend::new(config)?, config),
            GraphicsApi::Direct3D12 => Self::direct3d12(config)?,
        };
        Ok(Self::from_manager(manager, config))
    }

    #[cfg(windows)]
    fn direct3d12(config: &RenderConfig) -> Result<Arc<dyn ResourceManager>> {
        let backend = crate::renderer::backend::dx12::Dx12Backend::new(config)?;
        Ok(BackendResourceManager::new(backend, config))
    }

    #[cfg(not(windows))]
    fn direct3d12(_config: &RenderConfig) -> Result<Arc<dyn ResourceManager>> {
        color_eyre::eyre::bail!("the Direct3D 12 backend is only available on Windows")
    }

    pub fn from_manager(manager: Arc<dyn ResourceManager>, config: &RenderConfig) -> Self {
        Self {
            manager,
            config: Arc::new(config.clone()),
        }
    }

    pub fn manager(&self) -> &dyn ResourceManager {
        self.manager.as_ref()
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn api(&self) -> GraphicsApi {
        self.manager.api()
    }
}

impl std::fmt::Debug for GraphicsContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphicsContext").field("api", &self.api()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_context_from_config() {
        let ctx = GraphicsContext::new(&RenderConfig::null()).unwrap();
        assert_eq!(ctx.api(), GraphicsApi::Null);
        assert_eq!(ctx.manager().limits().constant_buffer_alignment, 256);
        assert!(ctx.manager().as_any().is::<BackendResourceManager<NullBackend>>());
    }
}
