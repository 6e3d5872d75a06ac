use crate::renderer::cache::{Retention, SingleFlightCache};
use crate::renderer::common::{content_hash, GraphicsApi, ShaderStage};
use crate::renderer::resources::pipeline_state::ShaderNameAndEntry;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Compiled shader bytecode loaded from disk
#[derive(Debug)]
pub struct Shader {
    pub name: String,
    pub path: PathBuf,
    pub bytes: Vec<u8>,
    pub hash: u64,
}

impl Shader {
    /// Bytecode as 32-bit words, as SPIR-V expects
    pub fn words(&self) -> Result<Vec<u32>> {
        if self.bytes.len() % 4 != 0 {
            return Err(eyre!(
                "shader {} is {} bytes, not a whole number of words",
                self.path.display(),
                self.bytes.len()
            ));
        }
        Ok(self
            .bytes
            .chunks_exact(4)
            .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect())
    }
}

#[derive(Debug, Clone)]
pub struct ShaderStageBinding {
    pub shader: Arc<Shader>,
    pub entry: String,
}

/// Resolved shaders of one pipeline
#[derive(Debug, Clone, Default)]
pub struct PipelineShaders {
    pub vertex: Option<ShaderStageBinding>,
    pub hull: Option<ShaderStageBinding>,
    pub domain: Option<ShaderStageBinding>,
    pub geometry: Option<ShaderStageBinding>,
    pub pixel: Option<ShaderStageBinding>,
    pub amplification: Option<ShaderStageBinding>,
    pub mesh: Option<ShaderStageBinding>,
    pub compute: Option<ShaderStageBinding>,
}

impl PipelineShaders {
    pub fn stages(&self) -> impl Iterator<Item = (ShaderStage, &ShaderStageBinding)> {
        [
            (ShaderStage::COMPUTE, &self.compute),
            (ShaderStage::AMPLIFICATION, &self.amplification),
            (ShaderStage::MESH, &self.mesh),
            (ShaderStage::VERTEX, &self.vertex),
            (ShaderStage::HULL, &self.hull),
            (ShaderStage::DOMAIN, &self.domain),
            (ShaderStage::GEOMETRY, &self.geometry),
            (ShaderStage::PIXEL, &self.pixel),
        ]
        .into_iter()
        .filter_map(|(stage, binding)| binding.as_ref().map(|b| (stage, b)))
    }

    pub fn has_graphics_stages(&self) -> bool {
        self.stages().any(|(stage, _)| stage != ShaderStage::COMPUTE)
    }

    /// (stage, shader content hash, entry) per present stage
    pub fn identity(&self) -> Vec<(ShaderStage, u64, String)> {
        self.stages()
            .map(|(stage, b)| (stage, b.shader.hash, b.entry.clone()))
            .collect()
    }
}

/// Finds and caches compiled shaders by resolved path
pub struct ShaderManager {
    search_paths: Vec<PathBuf>,
    extensions: &'static [&'static str],
    shaders: SingleFlightCache<PathBuf, Shader>,
}

impl ShaderManager {
    pub fn new(search_paths: Vec<PathBuf>, api: GraphicsApi) -> Self {
        Self {
            search_paths,
            extensions: Self::extensions_for(api),
            shaders: SingleFlightCache::new("shader", Retention::Strong),
        }
    }

    pub fn extensions_for(api: GraphicsApi) -> &'static [&'static str] {
        match api {
            GraphicsApi::Direct3D12 => &["dxil", "dxbc"],
            GraphicsApi::Vulkan | GraphicsApi::Null => &["spirv"],
        }
    }

    /// Paths tried for `name`, in order
    pub fn candidate_paths(&self, name: &str) -> Vec<PathBuf> {
        let dirs: Vec<&Path> = if self.search_paths.is_empty() {
            vec![Path::new("")]
        } else {
            self.search_paths.iter().map(PathBuf::as_path).collect()
        };

        let mut candidates = Vec::new();
        for dir in dirs {
            candidates.push(dir.join(name));
            for extension in self.extensions {
                candidates.push(dir.join(format!("{name}.{extension}")));
            }
        }
        candidates
    }

    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        let candidates = self.candidate_paths(name);
        candidates
            .iter()
            .find(|path| path.is_file())
            .cloned()
            .ok_or_else(|| {
                let tried: Vec<String> = candidates.iter().map(|p| p.display().to_string()).collect();
                eyre!("shader {name} not found, tried {}", tried.join(", "))
            })
    }

    pub fn load(&self, name: &str) -> Result<Arc<Shader>> {
        let path = self.resolve(name).inspect_err(|e| log::error!("{e}"))?;
        self.shaders.get_or_create(&path, || {
            let bytes = std::fs::read(&path)
                .map_err(|e| eyre!("failed to read shader {}: {e}", path.display()))?;
            log::debug!("Loaded shader {} ({} bytes)", path.display(), bytes.len());
            Ok(Arc::new(Shader {
                name: name.to_string(),
                path: path.clone(),
                hash: content_hash(&bytes),
                bytes,
            }))
        })
    }

    pub fn load_stage(&self, stage: Option<&ShaderNameAndEntry>) -> Result<Option<ShaderStageBinding>> {
        let Some(stage) = stage else {
            return Ok(None);
        };
        let entry = if stage.entry.is_empty() { "main".to_string() } else { stage.entry.clone() };
        Ok(Some(ShaderStageBinding {
            shader: self.load(&stage.file)?,
            entry,
        }))
    }

    pub fn num_loaded(&self) -> usize {
        self.shaders.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tries_literal_then_backend_extensions() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("basic_vs.dxbc"), [1u8, 2, 3, 4]).unwrap();

        let manager = ShaderManager::new(vec![dir.path().to_path_buf()], GraphicsApi::Direct3D12);
        let candidates = manager.candidate_paths("basic_vs");
        assert_eq!(candidates[0], dir.path().join("basic_vs"));
        assert_eq!(candidates[1], dir.path().join("basic_vs.dxil"));
        assert_eq!(candidates[2], dir.path().join("basic_vs.dxbc"));
        assert_eq!(manager.resolve("basic_vs").unwrap(), dir.path().join("basic_vs.dxbc"));

        // dxil beats dxbc once it exists
        std::fs::write(dir.path().join("basic_vs.dxil"), [5u8; 4]).unwrap();
        assert_eq!(manager.resolve("basic_vs").unwrap(), dir.path().join("basic_vs.dxil"));

        let vulkan = ShaderManager::new(vec![dir.path().to_path_buf()], GraphicsApi::Vulkan);
        assert!(vulkan.resolve("basic_vs").is_err());
    }

    #[test]
    fn search_paths_are_tried_in_order() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        std::fs::write(second.path().join("mesh_ms.spirv"), [0u8; 8]).unwrap();

        let manager = ShaderManager::new(
            vec![first.path().to_path_buf(), second.path().to_path_buf()],
            GraphicsApi::Vulkan,
        );
        let shader = manager.load("mesh_ms").unwrap();
        assert_eq!(shader.path, second.path().join("mesh_ms.spirv"));
        assert_eq!(shader.words().unwrap().len(), 2);
    }

    #[test]
    fn loaded_shaders_are_shared() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ps.spirv"), [7u8; 12]).unwrap();
        let manager = ShaderManager::new(vec![dir.path().to_path_buf()], GraphicsApi::Null);

        let a = manager.load("ps").unwrap();
        let b = manager.load("ps.spirv").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(manager.num_loaded(), 1);
    }

    #[test]
    fn missing_shader_names_every_tried_path() {
        let manager = ShaderManager::new(vec![PathBuf::from("/nonexistent")], GraphicsApi::Vulkan);
        let message = manager.load("missing").unwrap_err().to_string();
        assert!(message.contains("missing.spirv"));
    }
}
