//! Runtime errors reported by the singleton holders.
//!
//! Misuse that can be caught at compile time (creating through an implicit
//! policy, installing a type that does not implement the interface) never
//! reaches this module.

/// Error returned when a holder is read before an instance was published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum SingletonError {
   /// `get` was called while the holder was empty: never created, still being
   /// created, or reset since the last `create`.
   #[error("singleton `{type_name}` accessed before initialization: call `create` before `get`")]
   AccessBeforeInitialization {
      /// Rust type name of the declared singleton or interface.
      type_name: &'static str,
   },
}

impl SingletonError {
   #[inline]
   pub(crate) fn access_before_init<T: ?Sized>() -> Self {
      Self::AccessBeforeInitialization {
         type_name: core::any::type_name::<T>(),
      }
   }
}

/// Result alias used across the crate.
pub type Result<T, E = SingletonError> = core::result::Result<T, E>;
