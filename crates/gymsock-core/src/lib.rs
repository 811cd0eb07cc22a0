// gymsock-core: Spaces, values, environment traits, errors and configuration for gymsock.

pub mod config;
pub mod episode;
pub mod error;
pub mod seed;
pub mod space;
pub mod traits;
pub mod types;
pub mod value;

pub mod prelude {
    pub use crate::config::ServerConfig;
    pub use crate::episode::{Episode, Phase, StepOutcome};
    pub use crate::error::{ConfigError, EnvError, SpaceError};
    pub use crate::space::{BoxSpace, Space};
    pub use crate::traits::{
        DisabledExtension, DisabledUploader, Environment, EnvironmentProvider, Extension, Handoff,
        Hooks, Monitor, MonitorOptions, Options, Rejected, UploadRequest, Uploader,
    };
    pub use crate::types::{Info, InfoValue, StepResult};
    pub use crate::value::{Dtype, Tensor, TensorData, Value};
}
