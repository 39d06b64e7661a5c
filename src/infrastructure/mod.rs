// Infrastructure layer
pub mod bundler;
pub mod file_system;
pub mod processors;
pub mod server;
pub mod watch;

pub use bundler::OxcBundler;
pub use file_system::*;
pub use processors::*;
pub use server::{DevServer, DevServerConfig};
pub use watch::{FileWatcher, WatchBinding, WatchHandle};
