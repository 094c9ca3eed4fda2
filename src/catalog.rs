//! Named service registry for configuration-driven bindings.
//!
//! A [`Catalog`] knows services by name so that `[bindings]` entries in a
//! [`Config`] can be turned into subclass providers. Bindings are applied in
//! name order; each one only answers for its abstract service and that
//! service's descendants, so the order matters only for overlapping
//! hierarchies.

use std::collections::BTreeMap;

use crate::config::Config;
use crate::context::Context;
use crate::error::{DiError, Result};
use crate::hooks::Provider;
use crate::service::ServiceType;

/// Services addressable by name.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    services: BTreeMap<String, ServiceType>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `service` under its name.
    ///
    /// Registering the same type twice is a no-op; a different type with an
    /// existing name is rejected.
    pub fn register(&mut self, service: &ServiceType) -> Result<()> {
        match self.services.get(service.name()) {
            Some(existing) if existing == service => Ok(()),
            Some(_) => Err(DiError::Configuration(format!(
                "service name '{}' is already registered",
                service.name()
            ))),
            None => {
                self.services
                    .insert(service.name().to_string(), service.clone());
                Ok(())
            }
        }
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, service: &ServiceType) -> Result<Self> {
        self.register(service)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&ServiceType> {
        self.services.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Subclass providers for every configured binding.
    pub fn providers(&self, config: &Config) -> Result<Vec<Provider>> {
        config
            .bindings
            .iter()
            .map(|(abstract_name, concrete_name)| {
                let abstract_type = self.lookup(abstract_name)?;
                let concrete = self.lookup(concrete_name)?;
                if !concrete.descends_from(abstract_type) {
                    return Err(DiError::Configuration(format!(
                        "'{}' cannot be bound to '{}': it does not descend from it",
                        concrete_name, abstract_name
                    )));
                }
                tracing::debug!(service = %abstract_name, concrete = %concrete_name, "Binding");
                Ok(Provider::subclass(concrete))
            })
            .collect()
    }

    /// Root context with every configured binding layered on.
    pub fn context(&self, config: &Config) -> Result<Context> {
        self.context_from(&Context::root(), config)
    }

    /// `base` with every configured binding layered on.
    pub fn context_from(&self, base: &Context, config: &Config) -> Result<Context> {
        base.provide(self.providers(config)?)
    }

    fn lookup(&self, name: &str) -> Result<&ServiceType> {
        self.services
            .get(name)
            .ok_or_else(|| DiError::Configuration(format!("unknown service '{}'", name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::singletons::DependentSingletons;
    use std::sync::Arc;

    struct Services {
        clock: ServiceType,
        system_clock: ServiceType,
        fixed_clock: ServiceType,
        storage: ServiceType,
    }

    fn services() -> Services {
        let clock = ServiceType::builder("Clock").build();
        let system_clock = ServiceType::builder("SystemClock")
            .extends(&clock)
            .constructor(|_| Ok("system"))
            .build();
        let fixed_clock = ServiceType::builder("FixedClock")
            .extends(&clock)
            .constructor(|_| Ok("fixed"))
            .build();
        let storage = ServiceType::builder("Storage").build();
        Services {
            clock,
            system_clock,
            fixed_clock,
            storage,
        }
    }

    fn catalog(s: &Services) -> Catalog {
        Catalog::new()
            .with(&s.clock)
            .and_then(|c| c.with(&s.system_clock))
            .and_then(|c| c.with(&s.fixed_clock))
            .and_then(|c| c.with(&s.storage))
            .unwrap()
    }

    fn config(bindings: &[(&str, &str)]) -> Config {
        Config {
            bindings: bindings
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..Config::default()
        }
    }

    #[test]
    fn test_register_rejects_name_clash() {
        let s = services();
        let mut catalog = catalog(&s);
        assert!(catalog.register(&s.clock).is_ok());

        let impostor = ServiceType::builder("Clock").build();
        assert!(matches!(
            catalog.register(&impostor),
            Err(DiError::Configuration(_))
        ));
        assert_eq!(catalog.len(), 4);
    }

    #[test]
    fn test_bindings_drive_resolution() {
        let s = services();
        let base = Context::with_singletons(Arc::new(DependentSingletons::new()));
        let context = catalog(&s)
            .context_from(&base, &config(&[("Clock", "FixedClock")]))
            .unwrap();

        let clock = context.invoke(&s.clock).unwrap();
        assert_eq!(clock.service_type(), &s.fixed_clock);
        assert_eq!(clock.downcast_ref::<&str>(), Some(&"fixed"));
    }

    #[test]
    fn test_unknown_service_is_configuration_error() {
        let s = services();
        let err = catalog(&s)
            .providers(&config(&[("Clock", "AtomicClock")]))
            .unwrap_err();
        assert!(matches!(err, DiError::Configuration(msg) if msg.contains("AtomicClock")));
    }

    #[test]
    fn test_unrelated_binding_is_rejected() {
        let s = services();
        let err = catalog(&s)
            .providers(&config(&[("Storage", "SystemClock")]))
            .unwrap_err();
        assert!(matches!(err, DiError::Configuration(_)));
    }

    #[test]
    fn test_names_are_sorted() {
        let s = services();
        let catalog = catalog(&s);
        let names: Vec<&str> = catalog.names().collect();
        assert_eq!(names, vec!["Clock", "FixedClock", "Storage", "SystemClock"]);
    }
}
