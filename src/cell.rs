//! One-time-initialized storage backing the one-shot holder and the global context.
//!
//! Reading a published value is a single acquire load. Construction goes
//! through the [`InitGate`], which lets exactly one caller run its constructor
//! and parks the others until that constructor publishes or fails.

use core::cell::UnsafeCell;
#[cfg(any(feature = "async-tokio", feature = "async-tokio-mt"))]
use core::future::Future;
use core::mem::MaybeUninit;
use core::sync::atomic::Ordering;

use crate::state::{InitGate, InitState};

pub(crate) struct InitCell<T> {
   value: UnsafeCell<MaybeUninit<T>>,
   gate: InitGate,
}

impl<T> InitCell<T> {
   #[inline]
   pub(crate) const fn new() -> Self {
      Self {
         value: UnsafeCell::new(MaybeUninit::uninit()),
         gate: InitGate::new(),
      }
   }

   #[inline]
   pub(crate) fn state(&self) -> InitState {
      self.gate.state()
   }

   /// Returns the published value, or `None` while uninitialized or initializing.
   #[inline]
   pub(crate) fn get(&self) -> Option<&T> {
      if self.gate.is_ready(Ordering::Acquire) {
         // SAFETY: READY is only set after the value was written, and the
         // acquire load makes that write visible.
         Some(unsafe { self.get_unchecked() })
      } else {
         None
      }
   }

   /// # Safety
   ///
   /// The cell must be initialized.
   #[inline]
   unsafe fn get_unchecked(&self) -> &T {
      debug_assert!(self.gate.is_ready(Ordering::Relaxed));
      // SAFETY: guaranteed by the caller.
      unsafe { (*self.value.get()).assume_init_ref() }
   }

   /// Returns the value, running `f` first if nothing is published yet.
   ///
   /// Concurrent callers block until the winner's `f` returns. If `f` panics
   /// the gate re-arms and a later caller constructs instead.
   #[inline]
   pub(crate) fn get_or_init<F>(&self, f: F) -> &T
   where
      F: FnOnce() -> T,
   {
      if let Some(value) = self.get() {
         return value;
      }
      self.init(f);
      // SAFETY: `init` only returns once the cell is READY.
      unsafe { self.get_unchecked() }
   }

   /// Runs `f` and publishes its result if no value is published yet.
   ///
   /// Returns `true` if this call's `f` produced the value. Losing callers
   /// never run their `f`.
   #[cold]
   pub(crate) fn init<F>(&self, f: F) -> bool
   where
      F: FnOnce() -> T,
   {
      let Some(guard) = self.gate.enter() else {
         return false;
      };
      // SAFETY: holding the guard gives exclusive write access to the value.
      unsafe { (*self.value.get()).write(f()) };
      guard.commit();
      true
   }

   /// Fallible variant of [`init`](Self::init). An error leaves the cell
   /// uninitialized and is handed back to the caller.
   #[cold]
   pub(crate) fn try_init<F, E>(&self, f: F) -> Result<bool, E>
   where
      F: FnOnce() -> Result<T, E>,
   {
      let Some(guard) = self.gate.enter() else {
         return Ok(false);
      };
      // On error the guard drops here and re-arms the gate.
      let value = f()?;
      // SAFETY: holding the guard gives exclusive write access to the value.
      unsafe { (*self.value.get()).write(value) };
      guard.commit();
      Ok(true)
   }

   /// Async variant of [`init`](Self::init). Dropping the future mid-construction
   /// re-arms the gate.
   #[cfg(any(feature = "async-tokio", feature = "async-tokio-mt"))]
   pub(crate) async fn init_async<F, Fut>(&self, f: F) -> bool
   where
      F: FnOnce() -> Fut,
      Fut: Future<Output = T>,
   {
      if self.gate.is_ready(Ordering::Acquire) {
         return false;
      }
      let Some(guard) = self.gate.enter_async().await else {
         return false;
      };
      let value = f().await;
      // SAFETY: holding the guard gives exclusive write access to the value.
      unsafe { (*self.value.get()).write(value) };
      guard.commit();
      true
   }
}

// SAFETY: the value is written once under the gate and only shared afterwards,
// so sharing the cell needs `T: Sync`, and since another thread may drop or
// have produced the value, `T: Send`.
unsafe impl<T: Send + Sync> Sync for InitCell<T> {}
// SAFETY: moving the cell moves the owned value.
unsafe impl<T: Send> Send for InitCell<T> {}

impl<T> Drop for InitCell<T> {
   #[inline]
   fn drop(&mut self) {
      if self.gate.is_ready(Ordering::Acquire) {
         // SAFETY: READY means the value is initialized, and `&mut self`
         // rules out any other reader.
         unsafe { self.value.get_mut().assume_init_drop() };
      }
   }
}
