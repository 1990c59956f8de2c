pub mod config;
pub mod converter;
pub mod deps;
pub mod safety;
pub mod scheduler;
pub mod testing;

pub use config::{
    load_settings, validate_settings, ConfigError, PersistedSettings, Settings, SettingsOverrides,
};
pub use converter::{Converter, ConverterConfig, ConverterError, FfmpegConverter, OutputFormat};
pub use deps::{DescriptorTable, Platform, ProvisionError, ProvisionStatus, Provisioner, Tool};
pub use scheduler::{BatchEvent, BatchResult, BatchScheduler, SchedulerConfig, SchedulerError};
