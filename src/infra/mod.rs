pub mod loader;
pub mod utils;
