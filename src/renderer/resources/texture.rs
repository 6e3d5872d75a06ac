use crate::renderer::cache::{Retention, SingleFlightCache};
use crate::renderer::common::Format;
use crate::renderer::resources::color_buffer::{ColorBuffer, ColorBufferDesc};
use crate::renderer::GraphicsContext;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use std::path::PathBuf;
use std::sync::Arc;

/// Decoded image living in a colour buffer
#[derive(Debug)]
pub struct Texture {
    pub name: String,
    pub path: PathBuf,
    pub color_buffer: ColorBuffer,
}

impl Texture {
    pub fn width(&self) -> u64 {
        self.color_buffer.width()
    }

    pub fn height(&self) -> u32 {
        self.color_buffer.height()
    }

    pub fn format(&self) -> Format {
        self.color_buffer.format()
    }
}

/// Loads each texture file once, no matter how many threads ask for it
pub struct TextureManager {
    ctx: GraphicsContext,
    root_dir: PathBuf,
    textures: SingleFlightCache<String, Texture>,
}

impl TextureManager {
    pub fn new(ctx: &GraphicsContext) -> Self {
        Self {
            ctx: ctx.clone(),
            root_dir: ctx.config().texture_dir.clone(),
            textures: SingleFlightCache::new("texture", Retention::Strong),
        }
    }

    fn cache_key(filename: &str, force_srgb: bool) -> String {
        if force_srgb {
            format!("{filename}_SRGB")
        } else {
            filename.to_string()
        }
    }

    pub fn load(&self, filename: &str, force_srgb: bool) -> Result<Arc<Texture>> {
        let key = Self::cache_key(filename, force_srgb);
        self.textures
            .get_or_create(&key, || self.load_from_disk(filename, force_srgb))
            .inspect_err(|e| log::warn!("Failed to load texture {filename}: {e}"))
    }

    fn load_from_disk(&self, filename: &str, force_srgb: bool) -> Result<Arc<Texture>> {
        let path = self.root_dir.join(filename);
        let image = image::open(&path).map_err(|e| eyre!("{}: {e}", path.display()))?;
        let pixels = image.to_rgba8();

        let format = if force_srgb { Format::SRGBA8_UNorm } else { Format::RGBA8_UNorm };
        let desc = ColorBufferDesc::texture_2d(filename, pixels.width() as u64, pixels.height(), format);
        let color_buffer = ColorBuffer::with_data(&self.ctx, &desc, Some(pixels.as_raw()))?;

        log::info!("Loaded texture {} ({}x{})", path.display(), pixels.width(), pixels.height());
        Ok(Arc::new(Texture {
            name: filename.to_string(),
            path,
            color_buffer,
        }))
    }

    /// Releases textures nobody outside the manager still uses
    pub fn purge_unused(&self) -> usize {
        self.textures.purge_unused()
    }

    pub fn num_textures(&self) -> usize {
        self.textures.len()
    }
}
