pub mod formats;
pub mod heap;
pub mod translate;

#[cfg(windows)]
mod backend;
#[cfg(windows)]
pub mod device;
#[cfg(windows)]
pub mod pipeline;
#[cfg(windows)]
pub mod resource;

#[cfg(windows)]
pub use backend::{Dx12Backend, Dx12DescriptorStorage};
