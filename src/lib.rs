//! Strata - layered dependency injection
//!
//! Contexts compose resolution hooks from providers, memoise what they
//! resolve, and share stateful singletons across contexts whenever those
//! singletons' dependencies resolve to the same backing instances.
//!
//! # Example
//!
//! ```ignore
//! use strata::{Context, Provider, ServiceType};
//!
//! let storage = ServiceType::builder("Storage").build();
//! let memory = ServiceType::builder("MemoryStorage")
//!     .extends(&storage)
//!     .constructor(|_| Ok(MemoryStorage::default()))
//!     .build();
//!
//! let context = Context::root().provide([Provider::subclass(&memory)])?;
//! let instance = context.invoke(&storage)?;
//! let storage: &MemoryStorage = instance.downcast_ref().unwrap();
//! ```

pub mod catalog;
pub mod config;
pub mod construction;
pub mod context;
pub mod error;
pub mod hooks;
pub mod instance;
pub mod logging;
pub mod resolver;
pub mod service;
pub mod singletons;

pub use catalog::Catalog;
pub use config::{Config, ConfigError, LoggingConfig};
pub use construction::Construction;
pub use context::{Context, Injector};
pub use error::{DiError, Result};
pub use hooks::{HookChain, PartialHooks, Provider};
pub use instance::Instance;
pub use resolver::Scope;
pub use service::{Args, Object, ServiceId, ServiceType, ServiceTypeBuilder};
pub use singletons::DependentSingletons;
