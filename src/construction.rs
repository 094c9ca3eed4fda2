//! Construction protocol.
//!
//! Turns a concrete service type plus arguments into an instance. A custom
//! `construct` function (own or inherited) takes over completely and its
//! instance is used verbatim. Otherwise the default constructor builds the
//! object; stateful types additionally get a wrapper layer carrying the
//! constructing context's [`Injector`], so the service can resolve from
//! inside its own methods.

use std::any::{type_name, Any};

use crate::context::{Context, Injector};
use crate::error::{DiError, Result};
use crate::instance::Instance;
use crate::resolver::Scope;
use crate::service::{Args, ServiceType};

/// Everything a constructor or construct function may use.
pub struct Construction<'a> {
    scope: &'a Scope,
    service: &'a ServiceType,
    args: &'a Args,
    injector: Injector,
}

impl<'a> Construction<'a> {
    /// Active scope; resolving through it keeps cycle detection intact.
    pub fn scope(&self) -> &'a Scope {
        self.scope
    }

    pub fn context(&self) -> &'a Context {
        self.scope.context()
    }

    /// Concrete type being constructed.
    pub fn service(&self) -> &'a ServiceType {
        self.service
    }

    pub fn args(&self) -> &'a Args {
        self.args
    }

    /// Typed constructor argument.
    pub fn arg<T: Any>(&self, index: usize) -> Result<&'a T> {
        self.args
            .get::<T>(index)
            .ok_or_else(|| DiError::ArgumentMismatch {
                service: self.service.name().to_string(),
                index,
                expected: type_name::<T>(),
            })
    }

    /// Handle for resolving after construction returns.
    ///
    /// Every call returns the injector that default stateful construction
    /// attaches to the instance, so contexts later sharing the singleton are
    /// visible through it too.
    pub fn injector(&self) -> Injector {
        self.injector.clone()
    }

    /// Resolve a collaborator within the current resolution path.
    pub fn invoke(&self, service: &ServiceType) -> Result<Instance> {
        self.scope.invoke(service)
    }

    /// What construction would produce without a custom construct function.
    pub fn default_instance(&self) -> Result<Instance> {
        let constructor =
            self.service
                .constructor()
                .ok_or_else(|| DiError::UnresolvedAbstractType {
                    service: self.service.name().to_string(),
                })?;

        let backing = Instance::from_object(self.service, constructor(self)?);
        if self.service.is_stateful() {
            Ok(Instance::with_injector(backing, self.injector()))
        } else {
            Ok(backing)
        }
    }
}

/// Build an instance of `concrete`. No caching and no `create_proxy`.
pub(crate) fn build(scope: &Scope, concrete: &ServiceType, args: Args) -> Result<Instance> {
    let construction = Construction {
        scope,
        service: concrete,
        args: &args,
        injector: scope.injector(),
    };

    match concrete.construct_fn() {
        Some(construct) => {
            tracing::debug!(service = %concrete, "Custom construct");
            construct(&construction)
        }
        None => {
            tracing::debug!(service = %concrete, args = args.len(), "Default construct");
            construction.default_instance()
        }
    }
}
