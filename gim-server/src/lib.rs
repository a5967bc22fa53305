mod app;
mod config;
pub mod services;
mod version;

#[cfg(target_env = "msvc")]
#[global_allocator]
#[cfg(target_env = "msvc")]
static ALLOC: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
#[cfg(not(target_env = "msvc"))]
static ALLOC: jemallocator::Jemalloc = jemallocator::Jemalloc;

pub use app::App;
pub use config::{load, AppConfig};
pub use version::version;
