//! Port registry.
//!
//! A port is an abstract capability a use case depends on. In this crate a
//! port is a trait-object type such as `dyn BudgetRepository`, tagged with
//! [`Port`] through [`repository_port!`](crate::repository_port) or
//! [`service_port!`](crate::service_port). Ports are looked up by name when
//! adapters are configured declaratively, so every application registers its
//! ports once at startup with [`register`].

use std::any::TypeId;
use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use tracing::{debug, info};

use crate::error::{DocaError, Result};
use crate::repository::Repository;

/// Names of the built-in base ports, never registered.
const BASE_PORTS: [&str; 2] = ["Repository", "Service"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PortKind {
    Repository,
    Service,
}

impl PortKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PortKind::Repository => "repository",
            PortKind::Service => "service",
        }
    }
}

/// An abstract capability contract, implemented for `dyn Trait` types.
///
/// The trait behind the port must have `Send + Sync` as supertraits so the
/// resulting trait object satisfies the bounds here.
pub trait Port: Send + Sync + 'static {
    /// Declared name, unique within the registry.
    const NAME: &'static str;
    const KIND: PortKind;

    /// View an adapter of this port as a repository, if the port is one.
    fn into_repository(self: Arc<Self>) -> Option<Arc<dyn Repository>>;
}

/// Registry entry describing one declared port.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PortInfo {
    pub name: &'static str,
    pub kind: PortKind,
    pub type_id: TypeId,
    pub type_name: &'static str,
}

impl PortInfo {
    pub fn of<P: Port + ?Sized>() -> Self {
        Self {
            name: P::NAME,
            kind: P::KIND,
            type_id: TypeId::of::<P>(),
            type_name: std::any::type_name::<P>(),
        }
    }
}

static PORTS: LazyLock<RwLock<BTreeMap<&'static str, PortInfo>>> =
    LazyLock::new(|| RwLock::new(BTreeMap::new()));

/// Register the port `P` under its declared name.
pub fn register<P: Port + ?Sized>() -> Result<()> {
    register_info(PortInfo::of::<P>())
}

/// Insert a port description into the registry.
///
/// Re-registering the same port is a no-op; registering a different port
/// under a taken name fails with [`DocaError::DuplicateRegistration`].
pub fn register_info(info: PortInfo) -> Result<()> {
    if BASE_PORTS.contains(&info.name) {
        debug!(port = info.name, "skip base port registration");
        return Ok(());
    }

    let mut ports = PORTS.write().unwrap_or_else(PoisonError::into_inner);
    match ports.get(info.name) {
        Some(existing) if existing.type_id == info.type_id => Ok(()),
        Some(existing) => Err(DocaError::DuplicateRegistration {
            name: info.name,
            existing: existing.type_name,
            attempted: info.type_name,
        }),
        None => {
            ports.insert(info.name, info);
            info!(port = info.name, kind = info.kind.as_str(), "Register port");
            Ok(())
        }
    }
}

pub fn lookup(name: &str) -> Result<PortInfo> {
    let ports = PORTS.read().unwrap_or_else(PoisonError::into_inner);
    ports
        .get(name)
        .copied()
        .ok_or_else(|| DocaError::PortNotFound(name.to_string()))
}

/// All registered ports, ordered by name.
pub fn registered() -> Vec<PortInfo> {
    let ports = PORTS.read().unwrap_or_else(PoisonError::into_inner);
    ports.values().copied().collect()
}

/// Declare a repository port for a trait whose supertrait is
/// [`Repository`](crate::Repository).
///
/// ```ignore
/// pub trait BudgetRepository: doca::Repository {
///     fn get_by_id(&self, id: &str) -> doca::Result<Budget>;
/// }
/// doca::repository_port!(BudgetRepository);
/// ```
#[macro_export]
macro_rules! repository_port {
    ($port:ident) => {
        impl $crate::Port for dyn $port {
            const NAME: &'static str = stringify!($port);
            const KIND: $crate::PortKind = $crate::PortKind::Repository;

            fn into_repository(
                self: ::std::sync::Arc<Self>,
            ) -> ::core::option::Option<::std::sync::Arc<dyn $crate::Repository>> {
                ::core::option::Option::Some($crate::Repository::into_repository_ref(self))
            }
        }
    };
}

/// Declare a service port for a `Send + Sync` trait.
#[macro_export]
macro_rules! service_port {
    ($port:ident) => {
        impl $crate::Port for dyn $port {
            const NAME: &'static str = stringify!($port);
            const KIND: $crate::PortKind = $crate::PortKind::Service;

            fn into_repository(
                self: ::std::sync::Arc<Self>,
            ) -> ::core::option::Option<::std::sync::Arc<dyn $crate::Repository>> {
                ::core::option::Option::None
            }
        }
    };
}
