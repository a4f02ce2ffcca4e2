pub mod config;
pub mod data;
pub mod error;
pub mod features;
pub mod joiner;
pub mod ml;
pub mod pipeline;
pub mod profile;
pub mod scaler;
pub mod split;
