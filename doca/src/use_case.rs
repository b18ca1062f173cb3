//! Use cases: application operations driven by a command.

use std::fmt::Debug;

use tracing::debug;

use crate::error::{DocaError, Result};

/// An intention to perform one operation, carrying its parameters.
pub trait Command: Debug + Send {}

/// An application operation.
///
/// Service and repository ports the use case needs outside a unit of work
/// are injected once in [`inject`](UseCase::inject); repositories that must
/// commit together are grouped in a [`UnitOfWork`](crate::UnitOfWork)
/// created inside [`exec`](UseCase::exec).
pub trait UseCase: Sized {
    type Command: Command;
    type Output;
    type Error: From<DocaError>;

    const NAME: &'static str;

    /// Build the use case from the current adapter bindings.
    fn inject() -> Result<Self>;

    fn exec(&self, cmd: Self::Command) -> std::result::Result<Self::Output, Self::Error>;
}

/// Inject `U` and execute it with `cmd`.
pub fn execute<U: UseCase>(cmd: U::Command) -> std::result::Result<U::Output, U::Error> {
    debug!(use_case = U::NAME, command = ?cmd, "execute");
    U::inject()?.exec(cmd)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::injector::{bind_instance, clear};
    use crate::test_support::serial;
    use std::sync::Arc;

    trait Greeter: Send + Sync {
        fn greet(&self, name: &str) -> String;
    }
    crate::service_port!(Greeter);

    struct Polite;

    impl Greeter for Polite {
        fn greet(&self, name: &str) -> String {
            format!("Good morning, {name}")
        }
    }

    #[derive(Debug)]
    struct Greet {
        name: String,
    }

    impl Command for Greet {}

    struct GreetUser {
        greeter: Arc<dyn Greeter>,
    }

    impl UseCase for GreetUser {
        type Command = Greet;
        type Output = String;
        type Error = DocaError;
        const NAME: &'static str = "GreetUser";

        fn inject() -> Result<Self> {
            Ok(Self { greeter: crate::inject::<dyn Greeter>()? })
        }

        fn exec(&self, cmd: Greet) -> Result<String> {
            Ok(self.greeter.greet(&cmd.name))
        }
    }

    #[test]
    fn use_case_receives_injected_service() {
        let _guard = serial();
        clear();
        bind_instance::<dyn Greeter>(Arc::new(Polite));

        let out = execute::<GreetUser>(Greet { name: "Ada".into() }).unwrap();
        assert_eq!(out, "Good morning, Ada");
    }

    #[test]
    fn use_case_fails_when_port_is_unbound() {
        let _guard = serial();
        clear();

        let err = execute::<GreetUser>(Greet { name: "Ada".into() }).unwrap_err();
        assert!(matches!(err, DocaError::AdapterNotConfigured("Greeter")));
    }
}
