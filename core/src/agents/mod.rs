pub mod config;
pub mod credentials;
pub mod invoker;
pub mod on_device;
pub mod payloads;
pub mod providers;
pub mod transport;

pub use config::{EngineConfig, EngineConfigUpdate};
pub use credentials::{Credential, CredentialAccessor, CredentialStatus, CredentialStore};
pub use invoker::{ProviderAttemptResult, ProviderInvoker};
pub use providers::{Operation, Provider};
