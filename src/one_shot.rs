//! Lazy/one-shot singleton holder.
//!
//! A type opts in by implementing [`Singleton`] and choosing one of two
//! construction policies through its associated `Policy` type:
//!
//! - [`Implicit`]: built with `T::default()` on first access. There is no
//!   create step and `get` cannot fail.
//! - [`Explicit`]: built once by the first [`OneShot::create`] call with
//!   caller-supplied arguments. `get` fails until that call has published.
//!
//! The policy is fixed where the type is declared. `create` only exists for
//! explicit types, and declaring an implicit type that is not `Default` is
//! rejected by the compiler. Neither policy can reset.
//!
//! ```
//! use std::sync::atomic::{AtomicU32, Ordering};
//! use poly_singleton::{Explicit, ExplicitSingleton, Implicit, Singleton};
//!
//! #[derive(Default)]
//! struct Metrics {
//!    hits: AtomicU32,
//! }
//!
//! impl Singleton for Metrics {
//!    type Policy = Implicit;
//! }
//!
//! struct Endpoint {
//!    url: String,
//! }
//!
//! impl Singleton for Endpoint {
//!    type Policy = Explicit;
//! }
//!
//! Metrics::instance().hits.fetch_add(1, Ordering::Relaxed);
//! assert_eq!(Metrics::instance().hits.load(Ordering::Relaxed), 1);
//!
//! assert!(Endpoint::instance().is_err());
//! Endpoint::create(|| Endpoint { url: "https://primary".into() });
//! Endpoint::create(|| Endpoint { url: "https://ignored".into() });
//! assert_eq!(Endpoint::instance().unwrap().url, "https://primary");
//! ```

use core::any::type_name;
use core::fmt;
#[cfg(any(feature = "async-tokio", feature = "async-tokio-mt"))]
use core::future::Future;

use crate::cell::InitCell;
use crate::error::{Result, SingletonError};
use crate::registry;
use crate::state::InitState;

mod sealed {
   pub trait Sealed {}

   impl Sealed for super::Implicit {}
   impl Sealed for super::Explicit {}
}

/// Construction policy of a [`Singleton`] type.
///
/// Sealed: the only policies are [`Implicit`] and [`Explicit`].
pub trait Policy<T>: sealed::Sealed + 'static {
   /// What [`OneShot::get`] returns under this policy.
   type Access<'a>
   where
      T: 'a;

   /// Reads (and for [`Implicit`], lazily builds) the holder's instance.
   fn access(holder: &OneShot<T>) -> Self::Access<'_>;
}

/// Policy for types built with `Default::default()` on first access.
#[derive(Debug)]
pub enum Implicit {}

/// Policy for types built once by an explicit `create` call.
#[derive(Debug)]
pub enum Explicit {}

impl<T: Default> Policy<T> for Implicit {
   type Access<'a> = &'a T where T: 'a;

   #[inline]
   fn access(holder: &OneShot<T>) -> Self::Access<'_> {
      holder.cell.get_or_init(|| {
         tracing::debug!(singleton = type_name::<T>(), "constructing default instance");
         T::default()
      })
   }
}

impl<T> Policy<T> for Explicit {
   type Access<'a> = Result<&'a T> where T: 'a;

   #[inline]
   fn access(holder: &OneShot<T>) -> Self::Access<'_> {
      holder
         .cell
         .get()
         .ok_or_else(SingletonError::access_before_init::<T>)
   }
}

/// Return type of [`OneShot::get`] for `T`.
pub type Access<'a, T> = <<T as Singleton>::Policy as Policy<T>>::Access<'a>;

/// A type with exactly one process-wide instance.
///
/// An [`Implicit`] singleton must be `Default`:
///
/// ```compile_fail
/// use poly_singleton::{Implicit, Singleton};
///
/// struct NeedsArgs(u32);
///
/// impl Singleton for NeedsArgs {
///    type Policy = Implicit;
/// }
/// ```
pub trait Singleton: Sized + Send + Sync + 'static {
   /// [`Implicit`] or [`Explicit`].
   type Policy: Policy<Self>;

   /// The instance from the process-wide holder.
   #[inline]
   fn instance() -> Access<'static, Self> {
      OneShot::<Self>::global().get()
   }
}

/// Shorthands for explicit singletons, operating on the global holder.
///
/// Implemented for every `Singleton<Policy = Explicit>` and nothing else, so
/// creating an implicit singleton does not compile:
///
/// ```compile_fail
/// use poly_singleton::{ExplicitSingleton, Implicit, Singleton};
///
/// #[derive(Default)]
/// struct Metrics;
///
/// impl Singleton for Metrics {
///    type Policy = Implicit;
/// }
///
/// Metrics::create(|| Metrics);
/// ```
pub trait ExplicitSingleton: Singleton<Policy = Explicit> {
   /// See [`OneShot::create`].
   #[inline]
   fn create<F>(ctor: F) -> bool
   where
      F: FnOnce() -> Self,
   {
      OneShot::<Self>::global().create(ctor)
   }

   /// See [`OneShot::try_create`].
   #[inline]
   fn try_create<F, E>(ctor: F) -> core::result::Result<bool, E>
   where
      F: FnOnce() -> core::result::Result<Self, E>,
   {
      OneShot::<Self>::global().try_create(ctor)
   }
}

impl<T: Singleton<Policy = Explicit>> ExplicitSingleton for T {}

/// Holder for the single instance of a [`Singleton`] type.
///
/// State moves `Uninitialized -> Initializing -> Initialized` and never back.
/// A constructor that panics or fails returns the holder to `Uninitialized`.
pub struct OneShot<T> {
   cell: InitCell<T>,
}

impl<T> OneShot<T> {
   /// Creates an empty holder.
   #[inline]
   #[must_use]
   pub const fn new() -> Self {
      Self {
         cell: InitCell::new(),
      }
   }

   /// Current initialization state. Never blocks, even while another
   /// thread is constructing.
   #[inline]
   pub fn state(&self) -> InitState {
      self.cell.state()
   }
}

impl<T: Singleton> OneShot<T> {
   /// Returns the instance according to `T`'s policy: `&T` for
   /// [`Implicit`], `Result<&T>` for [`Explicit`].
   #[inline]
   pub fn get(&self) -> Access<'_, T> {
      <T::Policy as Policy<T>>::access(self)
   }

   /// The holder for `T` in the process-wide [`Context`](crate::Context).
   #[inline]
   pub fn global() -> &'static Self {
      registry::global().one_shot::<T>()
   }
}

impl<T: Singleton<Policy = Explicit>> OneShot<T> {
   /// Builds the instance with `ctor` unless one is published already.
   ///
   /// Only the first caller to reach the gate runs its constructor; callers
   /// racing it block until it finishes and then return without running
   /// theirs. Returns `true` if this call built the instance.
   ///
   /// If `ctor` panics the holder stays uninitialized and the next `create`
   /// may try again.
   ///
   /// ```compile_fail
   /// use poly_singleton::{Implicit, OneShot, Singleton};
   ///
   /// #[derive(Default)]
   /// struct Cache;
   ///
   /// impl Singleton for Cache {
   ///    type Policy = Implicit;
   /// }
   ///
   /// OneShot::<Cache>::new().create(|| Cache);
   /// ```
   pub fn create<F>(&self, ctor: F) -> bool
   where
      F: FnOnce() -> T,
   {
      let constructed = self.cell.init(ctor);
      self.trace_create(constructed);
      constructed
   }

   /// Like [`create`](Self::create) with a fallible constructor. The error is
   /// returned to this caller and the holder stays uninitialized.
   pub fn try_create<F, E>(&self, ctor: F) -> core::result::Result<bool, E>
   where
      F: FnOnce() -> core::result::Result<T, E>,
   {
      let constructed = self.cell.try_init(ctor)?;
      self.trace_create(constructed);
      Ok(constructed)
   }

   /// Async variant of [`create`](Self::create). Dropping the future while
   /// `ctor` runs leaves the holder uninitialized.
   #[cfg(any(feature = "async-tokio", feature = "async-tokio-mt"))]
   pub async fn create_async<F, Fut>(&self, ctor: F) -> bool
   where
      F: FnOnce() -> Fut,
      Fut: Future<Output = T>,
   {
      let constructed = self.cell.init_async(ctor).await;
      self.trace_create(constructed);
      constructed
   }

   #[inline]
   fn trace_create(&self, constructed: bool) {
      if constructed {
         tracing::debug!(singleton = type_name::<T>(), "instance created");
      } else {
         tracing::trace!(singleton = type_name::<T>(), "instance already present, create discarded");
      }
   }
}

impl<T> Default for OneShot<T> {
   #[inline]
   fn default() -> Self {
      Self::new()
   }
}

impl<T> fmt::Debug for OneShot<T> {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("OneShot")
         .field("singleton", &type_name::<T>())
         .field("state", &self.state())
         .finish()
   }
}
