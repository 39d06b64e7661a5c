// Core domain layer
pub mod interfaces;
pub mod locale;
pub mod models;
pub mod registry;
pub mod services;
pub mod tasks;
pub mod transforms;

pub use interfaces::*;
pub use locale::*;
pub use models::*;
pub use registry::*;
pub use services::*;
pub use tasks::*;
pub use transforms::*;
