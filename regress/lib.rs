pub mod combine;
pub mod correlation;
pub mod country;
pub mod data;
pub mod elastic_net;
pub mod features;
pub mod forest;
pub mod metrics;
pub mod model;
pub mod prepare;
pub mod scaffold;
pub mod scale;
pub mod split;
pub mod trainer;

#[path = "../shared/files.rs"]
pub mod shared_files;
pub mod shared {
    pub use super::shared_files as files;
}

#[path = "../summarize/mod.rs"]
pub mod summarize;
