pub mod enums;
pub mod format;
pub mod math;

pub use enums::*;
pub use format::{Format, SurfaceInfo};
pub use math::{align_up, align_up_u32, compute_num_mips, content_hash};

pub const MAX_ROOT_PARAMETERS: usize = 8;
pub const MAX_DESCRIPTORS_PER_TABLE: usize = 32;

/// Register number meaning "continue after the previous range of the same table"
pub const APPEND_REGISTER: u32 = u32::MAX;

pub const CONSTANT_BUFFER_ALIGNMENT: u64 = 256;
