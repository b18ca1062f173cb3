//! Adapter binding table and injector.
//!
//! One process-wide table maps each port to an [`Adapter`]: either a
//! factory producing a fresh instance per injection, or a shared instance
//! handed out on every injection. Rebinding overwrites; [`clear`] empties
//! the table (tests call it between cases).

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use tracing::{debug, info};

use crate::error::{DocaError, Result};
use crate::port::{self, Port, PortInfo};
use crate::repository::Repository;

type Factory<P> = Arc<dyn Fn() -> Arc<P> + Send + Sync>;

/// What a port is bound to.
pub enum Adapter<P: ?Sized> {
    /// New instance on every injection.
    Factory(Factory<P>),
    /// The same instance on every injection.
    Instance(Arc<P>),
}

impl<P: ?Sized> Clone for Adapter<P> {
    fn clone(&self) -> Self {
        match self {
            Adapter::Factory(f) => Adapter::Factory(Arc::clone(f)),
            Adapter::Instance(i) => Adapter::Instance(Arc::clone(i)),
        }
    }
}

impl<P: Port + ?Sized> Adapter<P> {
    pub fn factory<F>(factory: F) -> Self
    where
        F: Fn() -> Arc<P> + Send + Sync + 'static,
    {
        Adapter::Factory(Arc::new(factory))
    }

    pub fn instance(adapter: Arc<P>) -> Self {
        Adapter::Instance(adapter)
    }

    fn resolve(&self) -> Arc<P> {
        match self {
            Adapter::Factory(factory) => factory(),
            Adapter::Instance(instance) => Arc::clone(instance),
        }
    }

    fn mode(&self) -> &'static str {
        match self {
            Adapter::Factory(_) => "factory",
            Adapter::Instance(_) => "instance",
        }
    }
}

impl<P: ?Sized> fmt::Debug for Adapter<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Adapter::Factory(_) => f.write_str("Adapter::Factory"),
            Adapter::Instance(_) => f.write_str("Adapter::Instance"),
        }
    }
}

/// Type-erased binding: an `Adapter<P>` plus the port it was built for.
struct Binding {
    port: &'static str,
    mode: &'static str,
    adapter: Box<dyn Any + Send + Sync>,
}

impl Binding {
    fn new<P: Port + ?Sized>(adapter: Adapter<P>) -> Self {
        Self {
            port: P::NAME,
            mode: adapter.mode(),
            adapter: Box::new(adapter),
        }
    }
}

static ADAPTERS: LazyLock<RwLock<HashMap<TypeId, Binding>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

fn insert(type_id: TypeId, binding: Binding) {
    info!(port = binding.port, mode = binding.mode, "Bind port to adapter");
    let mut table = ADAPTERS.write().unwrap_or_else(PoisonError::into_inner);
    table.insert(type_id, binding);
}

/// Bind `P` to `adapter`, replacing any previous binding.
pub fn bind<P: Port + ?Sized>(adapter: Adapter<P>) {
    insert(TypeId::of::<P>(), Binding::new(adapter));
}

pub fn bind_factory<P, F>(factory: F)
where
    P: Port + ?Sized,
    F: Fn() -> Arc<P> + Send + Sync + 'static,
{
    bind(Adapter::<P>::factory(factory));
}

pub fn bind_instance<P: Port + ?Sized>(adapter: Arc<P>) {
    bind(Adapter::<P>::instance(adapter));
}

/// Remove every binding.
pub fn clear() {
    let mut table = ADAPTERS.write().unwrap_or_else(PoisonError::into_inner);
    let dropped = table.len();
    table.clear();
    debug!(bindings = dropped, "adapter bindings cleared");
}

pub fn is_bound<P: Port + ?Sized>() -> bool {
    let table = ADAPTERS.read().unwrap_or_else(PoisonError::into_inner);
    table.contains_key(&TypeId::of::<P>())
}

/// Resolve `P` to an adapter.
///
/// The binding is cloned out of the table before a factory runs, so a
/// factory may itself call `inject`.
pub fn inject<P: Port + ?Sized>() -> Result<Arc<P>> {
    let adapter = {
        let table = ADAPTERS.read().unwrap_or_else(PoisonError::into_inner);
        let binding = table
            .get(&TypeId::of::<P>())
            .ok_or(DocaError::AdapterNotConfigured(P::NAME))?;
        binding
            .adapter
            .downcast_ref::<Adapter<P>>()
            .cloned()
            .ok_or(DocaError::AdapterMismatch {
                port: P::NAME.to_string(),
                adapter_port: binding.port,
            })?
    };
    debug!(port = P::NAME, mode = adapter.mode(), "inject");
    Ok(adapter.resolve())
}

/// Inject `P` and check it is a repository port.
pub fn inject_repository<P: Port + ?Sized>() -> Result<(Arc<P>, Arc<dyn Repository>)> {
    let adapter = inject::<P>()?;
    let repository = Port::into_repository(Arc::clone(&adapter))
        .ok_or(DocaError::NotARepository(P::NAME))?;
    Ok((adapter, repository))
}

/// Declarative port-name → adapter mapping applied once at bootstrap.
///
/// ```ignore
/// let config = AdaptersConfig::new()
///     .with("BudgetRepository", Adapter::<dyn BudgetRepository>::factory(|| InMemoryBudgetRepo::shared()))
///     .with("ExchangeRateService", Adapter::<dyn ExchangeRateService>::instance(Arc::new(FakeExchange)));
/// doca::bootstrap(Some(config))?;
/// ```
#[derive(Default)]
pub struct AdaptersConfig {
    entries: Vec<(String, TypeId, Binding)>,
}

impl AdaptersConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<P: Port + ?Sized>(mut self, port_name: impl Into<String>, adapter: Adapter<P>) -> Self {
        self.entries
            .push((port_name.into(), TypeId::of::<P>(), Binding::new(adapter)));
        self
    }

    pub fn port_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve every name against the port registry, then bind all pairs.
    ///
    /// Nothing is bound unless every name resolves.
    pub fn apply(self) -> Result<usize> {
        let mut resolved: Vec<(PortInfo, TypeId, Binding)> = Vec::with_capacity(self.entries.len());
        for (name, type_id, binding) in self.entries {
            let info = port::lookup(&name)?;
            if info.type_id != type_id {
                return Err(DocaError::AdapterMismatch {
                    port: name,
                    adapter_port: binding.port,
                });
            }
            resolved.push((info, type_id, binding));
        }

        let count = resolved.len();
        for (_, type_id, binding) in resolved {
            insert(type_id, binding);
        }
        Ok(count)
    }
}

impl fmt::Debug for AdaptersConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.port_names()).finish()
    }
}

/// Apply the optional adapters configuration.
pub fn bootstrap(config: Option<AdaptersConfig>) -> Result<()> {
    if let Some(config) = config {
        let bound = config.apply()?;
        info!(bindings = bound, "adapters configured");
    }
    Ok(())
}
