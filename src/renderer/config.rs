use crate::renderer::common::GraphicsApi;
use std::path::PathBuf;

/// Contains configuration options for the renderer like the backend, asset paths and pool sizes
#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub api: GraphicsApi,
    pub application_name: String,
    /// Directories searched in order when resolving a shader name
    pub shader_paths: Vec<PathBuf>,
    pub texture_dir: PathBuf,
    pub validation: bool,

    pub max_color_buffers: usize,
    pub max_depth_buffers: usize,
    pub max_gpu_buffers: usize,
    pub max_root_signatures: usize,
    pub max_pipelines: usize,
    pub max_descriptor_sets: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            api: GraphicsApi::Vulkan,
            application_name: "Luna".to_string(),
            shader_paths: vec![PathBuf::from("shaders")],
            texture_dir: PathBuf::from("textures"),
            validation: cfg!(debug_assertions),

            max_color_buffers: 1024,
            max_depth_buffers: 256,
            max_gpu_buffers: 4096,
            max_root_signatures: 256,
            max_pipelines: 1024,
            max_descriptor_sets: 16384,
        }
    }
}

impl RenderConfig {
    /// Defaults overridden by `LUNA_BACKEND`, `LUNA_SHADER_PATH` and `LUNA_VALIDATION`
    pub fn from_env() -> Self {
        Self::default().with_overrides(|name| std::env::var(name).ok())
    }

    fn with_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(backend) = var("LUNA_BACKEND") {
            match GraphicsApi::parse(&backend) {
                Some(api) => self.api = api,
                None => log::warn!("Unknown LUNA_BACKEND {backend:?}, using {:?}", self.api),
            }
        }

        if let Some(paths) = var("LUNA_SHADER_PATH") {
            self.shader_paths = std::env::split_paths(&paths).filter(|p| !p.as_os_str().is_empty()).collect();
        }

        if let Some(validation) = var("LUNA_VALIDATION") {
            self.validation = matches!(validation.to_ascii_lowercase().as_str(), "1" | "true" | "on" | "yes");
        }
        self
    }

    /// In-memory configuration with small pools, used by tests and tools
    pub fn null() -> Self {
        Self {
            api: GraphicsApi::Null,
            validation: false,
            max_color_buffers: 64,
            max_depth_buffers: 16,
            max_gpu_buffers: 64,
            max_root_signatures: 16,
            max_pipelines: 32,
            max_descriptor_sets: 64,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn environment_overrides() {
        let expected = vec![PathBuf::from("a/b"), PathBuf::from("c"), PathBuf::from("d")];
        let joined = std::env::join_paths(&expected).unwrap().into_string().unwrap();
        let vars: HashMap<&str, String> = [
            ("LUNA_BACKEND", "null".to_string()),
            ("LUNA_SHADER_PATH", joined),
            ("LUNA_VALIDATION", "On".to_string()),
        ]
        .into_iter()
        .collect();

        let config = RenderConfig::default().with_overrides(|name| vars.get(name).cloned());
        assert_eq!(config.api, GraphicsApi::Null);
        assert_eq!(config.shader_paths, expected);
        assert!(config.validation);
    }

    #[cfg(windows)]
    #[test]
    fn shader_paths_keep_drive_letters() {
        let config = RenderConfig::default()
            .with_overrides(|name| (name == "LUNA_SHADER_PATH").then(|| r"C:\shaders;;D:\more".to_string()));
        assert_eq!(
            config.shader_paths,
            vec![PathBuf::from(r"C:\shaders"), PathBuf::from(r"D:\more")]
        );
    }

    #[cfg(unix)]
    #[test]
    fn shader_paths_split_on_colons() {
        let config = RenderConfig::default()
            .with_overrides(|name| (name == "LUNA_SHADER_PATH").then(|| "/opt/shaders::build/shaders".to_string()));
        assert_eq!(
            config.shader_paths,
            vec![PathBuf::from("/opt/shaders"), PathBuf::from("build/shaders")]
        );
    }

    #[test]
    fn unknown_backend_keeps_the_default() {
        let config = RenderConfig::default()
            .with_overrides(|name| (name == "LUNA_BACKEND").then(|| "metal".to_string()));
        assert_eq!(config.api, GraphicsApi::Vulkan);
    }
}
