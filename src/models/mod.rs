pub mod asset;
pub mod file;
pub mod project;
pub mod user;

pub use asset::*;
pub use file::*;
pub use project::*;
pub use user::*;
