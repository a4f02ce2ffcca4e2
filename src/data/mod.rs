pub mod loader;
pub mod models;
pub mod store;

pub use loader::DataLoader;
pub use store::DatasetStore;
