//! Domain model (ids, applications, configurations).

pub mod application;
pub mod configuration;
pub mod ids;

pub use self::application::{Application, ApplicationKey, ApplicationKeyFilter};
pub use self::configuration::{Configuration, ConfigurationFilter, Configurations};
pub use self::ids::{ApplicationId, ApplicationKeyId, ConfigurationId, Id, IdMarker};
