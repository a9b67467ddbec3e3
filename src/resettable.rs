//! Resettable singleton holder.
//!
//! [`Resettable<T>`] keeps at most one instance of an interface type `T`
//! (usually `dyn Trait + Send + Sync`) and lets tests replace it between cases.
//! Every operation takes the same mutex, so "check empty, then construct" is a
//! single critical section. It trades throughput for the ability to swap in a
//! test double and tear it down again.

use core::any::type_name;
use core::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Result, SingletonError};
use crate::registry;

/// Holder for one replaceable instance of `T`.
///
/// An *epoch* runs from a successful [`create`](Self::create) to the next
/// [`reset`](Self::reset). Within an epoch every [`get`](Self::get) returns a
/// handle to the same instance.
///
/// # Reset and outstanding handles
///
/// `get` hands out an `Arc<T>`. A handle obtained before `reset` keeps the
/// previous epoch's instance alive and keeps pointing at it; it does not follow
/// the holder to the next instance. Reset is meant to run between isolated test
/// cases, so callers should not keep handles across it.
pub struct Resettable<T: ?Sized> {
   slot: Mutex<Option<Arc<T>>>,
}

impl<T: ?Sized> Resettable<T> {
   /// Creates an empty holder.
   #[inline]
   #[must_use]
   pub const fn new() -> Self {
      Self {
         slot: parking_lot::const_mutex(None),
      }
   }

   /// Installs the instance built by `ctor` if the holder is empty.
   ///
   /// `ctor` returns a `Box<T>`; passing `|| Box::new(Concrete::new(..))` only
   /// compiles when `Concrete` implements the interface behind `T`. If an
   /// instance already exists `ctor` is not called and its captured arguments
   /// are dropped unused.
   ///
   /// Returns `true` if this call filled the holder. A panic inside `ctor`
   /// propagates to the caller and leaves the holder empty.
   ///
   /// ```compile_fail
   /// use poly_singleton::Resettable;
   ///
   /// trait Service: Send + Sync {}
   ///
   /// struct Unrelated;
   ///
   /// Resettable::<dyn Service>::new().create(|| Box::new(Unrelated));
   /// ```
   pub fn create<F>(&self, ctor: F) -> bool
   where
      F: FnOnce() -> Box<T>,
   {
      let mut slot = self.slot.lock();
      if slot.is_some() {
         tracing::trace!(interface = type_name::<T>(), "instance already present, create discarded");
         return false;
      }
      *slot = Some(Arc::from(ctor()));
      tracing::debug!(interface = type_name::<T>(), "instance created");
      true
   }

   /// Like [`create`](Self::create) with a fallible constructor.
   ///
   /// A constructor error is returned as-is and the holder stays empty, so a
   /// later call may retry.
   pub fn try_create<F, E>(&self, ctor: F) -> core::result::Result<bool, E>
   where
      F: FnOnce() -> core::result::Result<Box<T>, E>,
   {
      let mut slot = self.slot.lock();
      if slot.is_some() {
         tracing::trace!(interface = type_name::<T>(), "instance already present, create discarded");
         return Ok(false);
      }
      *slot = Some(Arc::from(ctor()?));
      tracing::debug!(interface = type_name::<T>(), "instance created");
      Ok(true)
   }

   /// Returns a handle to the current instance.
   ///
   /// Fails with [`SingletonError::AccessBeforeInitialization`] when nothing
   /// was created, or the holder was reset since.
   pub fn get(&self) -> Result<Arc<T>> {
      self.slot
         .lock()
         .as_ref()
         .map(Arc::clone)
         .ok_or_else(SingletonError::access_before_init::<T>)
   }

   /// Drops the holder's instance, ending the epoch. Resetting an empty
   /// holder does nothing.
   pub fn reset(&self) {
      // Drop outside the lock so a destructor that touches this holder cannot deadlock.
      let previous = self.slot.lock().take();
      if previous.is_some() {
         tracing::debug!(interface = type_name::<T>(), "instance reset");
      }
      drop(previous);
   }

   /// Returns `true` if an instance is currently installed.
   #[inline]
   pub fn is_initialized(&self) -> bool {
      self.slot.lock().is_some()
   }

   /// Creates through `ctor` and returns a guard that resets the holder when
   /// dropped.
   ///
   /// Intended for tests that install a double for the duration of one case.
   /// If an instance already existed, the guard still resets it on drop.
   pub fn scoped<F>(&self, ctor: F) -> ScopedInstance<'_, T>
   where
      F: FnOnce() -> Box<T>,
   {
      self.create(ctor);
      ScopedInstance { holder: self }
   }
}

impl<T: ?Sized + Send + Sync + 'static> Resettable<T> {
   /// The holder for `T` in the process-wide [`Context`](crate::Context).
   #[inline]
   pub fn global() -> &'static Self {
      registry::global().resettable::<T>()
   }
}

impl<T: ?Sized> Default for Resettable<T> {
   #[inline]
   fn default() -> Self {
      Self::new()
   }
}

impl<T: ?Sized> fmt::Debug for Resettable<T> {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("Resettable")
         .field("interface", &type_name::<T>())
         .field("initialized", &self.is_initialized())
         .finish()
   }
}

/// Guard returned by [`Resettable::scoped`]; resets the holder on drop.
#[must_use = "the instance is reset as soon as the guard is dropped"]
pub struct ScopedInstance<'a, T: ?Sized> {
   holder: &'a Resettable<T>,
}

impl<T: ?Sized> ScopedInstance<'_, T> {
   /// Handle to the installed instance.
   #[inline]
   pub fn get(&self) -> Result<Arc<T>> {
      self.holder.get()
   }
}

impl<T: ?Sized> Drop for ScopedInstance<'_, T> {
   fn drop(&mut self) {
      self.holder.reset();
   }
}
