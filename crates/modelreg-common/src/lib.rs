pub mod api;
pub mod error;
pub mod model;

pub use api::*;
pub use error::{ErrorBody, ErrorDetail, RegistryError};
pub use model::{
    ActivationStatus, AdapterType, LoadingStatus, ModelConfig, ModelFormat, QuantizationType,
    SourceRepository,
};

pub mod auth;
pub mod telemetry;
