//! Process-wide singleton holders with two lifecycle policies.
//!
//! - [`Resettable<T>`]: create, read and reset one instance of an interface
//!   type `T` (typically `dyn Trait + Send + Sync`). All operations take one
//!   mutex. Tests use it to install a double, run, and tear it down again.
//! - [`OneShot<T>`]: build the instance of a [`Singleton`] type once for the
//!   life of its [`Context`]. The type's declared [`Policy`] selects either
//!   [`Implicit`] default construction on first access or [`Explicit`]
//!   construction by the first `create` call.
//!
//! Holders live in a [`Context`], a registry keyed by type. [`global`] is the
//! process-wide one; tests may create private contexts for isolation.
//!
//! The only runtime error is [`SingletonError::AccessBeforeInitialization`].
//! Calling `create` on an implicit type, or installing a concrete type that
//! does not implement the interface, does not compile.
//!
//! # Examples
//!
//! ## Swapping an implementation in tests
//!
//! ```rust
//! use poly_singleton::Resettable;
//!
//! trait Greeter: Send + Sync {
//!    fn greet(&self) -> String;
//! }
//!
//! struct English;
//!
//! impl Greeter for English {
//!    fn greet(&self) -> String {
//!       "hello".into()
//!    }
//! }
//!
//! struct Canned(&'static str);
//!
//! impl Greeter for Canned {
//!    fn greet(&self) -> String {
//!       self.0.into()
//!    }
//! }
//!
//! fn welcome() -> String {
//!    match Resettable::<dyn Greeter>::global().get() {
//!       Ok(greeter) => greeter.greet(),
//!       Err(err) => err.to_string(),
//!    }
//! }
//!
//! Resettable::<dyn Greeter>::global().create(|| Box::new(English));
//! assert_eq!(welcome(), "hello");
//!
//! {
//!    Resettable::<dyn Greeter>::global().reset();
//!    let _double = Resettable::<dyn Greeter>::global().scoped(|| Box::new(Canned("stub")));
//!    assert_eq!(welcome(), "stub");
//! }
//! assert!(Resettable::<dyn Greeter>::global().get().is_err());
//! ```
//!
//! ## Configured once at startup
//!
//! ```rust
//! use poly_singleton::{Explicit, ExplicitSingleton, Singleton, SingletonError};
//!
//! struct Pool {
//!    size: usize,
//! }
//!
//! impl Singleton for Pool {
//!    type Policy = Explicit;
//! }
//!
//! assert!(matches!(
//!    Pool::instance(),
//!    Err(SingletonError::AccessBeforeInitialization { .. })
//! ));
//!
//! Pool::create(|| Pool { size: 8 });
//! assert_eq!(Pool::instance().map(|pool| pool.size), Ok(8));
//! ```

/// One-time-initialized storage.
mod cell;

/// Runtime error type.
mod error;

/// Lazy/one-shot holder and the singleton declaration traits.
mod one_shot;

/// Type-keyed holder registry.
mod registry;

/// Resettable holder.
mod resettable;

/// Re-armable initialization gate.
mod state;

pub use error::{Result, SingletonError};
pub use one_shot::{Access, Explicit, ExplicitSingleton, Implicit, OneShot, Policy, Singleton};
pub use registry::{global, Context};
pub use resettable::{Resettable, ScopedInstance};
pub use state::InitState;
