//! Re-armable initialization gate shared by the singleton holders.
//!
//! The gate is a small state machine packed into a single `AtomicU8`:
//! - Bit 0: READY - an instance has been published
//! - Bit 1: BUSY - a constructor is currently running
//! - Bit 2: PARKED - at least one thread is parked waiting for the constructor
//! - Bits 3-7: generation counter, bumped on every publish or re-arm
//!
//! Losing threads park on the gate address through `parking_lot_core` until the
//! running constructor either publishes or gives up. A constructor that panics or
//! returns an error drops its [`GateGuard`] without committing, which re-arms the
//! gate so the next caller may construct instead of waiting forever.

use core::mem;
use core::sync::atomic::{AtomicU8, Ordering};

use parking_lot_core::{DEFAULT_PARK_TOKEN, DEFAULT_UNPARK_TOKEN};

/// Externally observable initialization state of a holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InitState {
   /// No instance has been published and no constructor is running.
   Uninitialized,
   /// A constructor is running; other creators block until it finishes.
   Initializing,
   /// An instance is published. Terminal for one-shot holders.
   Initialized,
}

/// Atomic gate guarding the transition into [`InitState::Initialized`].
#[repr(transparent)]
pub(crate) struct InitGate(AtomicU8);

impl InitGate {
   const READY: u8 = 1;
   const BUSY: u8 = 2;
   const PARKED: u8 = 4;
   const GENERATION_1: u8 = 8;
   const GENERATION_MASK: u8 = !(Self::READY | Self::BUSY | Self::PARKED);

   /// Yield rounds an async waiter spends before falling back to a blocking park.
   #[cfg(feature = "async-tokio-mt")]
   const YIELD_ROUNDS: u32 = 16;
   /// Yields per round while waiting asynchronously.
   #[cfg(any(feature = "async-tokio", feature = "async-tokio-mt"))]
   const YIELDS_PER_ROUND: u32 = 32;

   #[inline(always)]
   const fn next_generation(state: u8) -> u8 {
      (state & Self::GENERATION_MASK).wrapping_add(Self::GENERATION_1) & Self::GENERATION_MASK
   }

   #[inline]
   pub(crate) const fn new() -> Self {
      Self(AtomicU8::new(0))
   }

   /// Reports the current state. Uses acquire ordering so an `Initialized`
   /// answer also makes the published instance visible.
   #[inline]
   pub(crate) fn state(&self) -> InitState {
      let state = self.0.load(Ordering::Acquire);
      if state & Self::READY != 0 {
         InitState::Initialized
      } else if state & Self::BUSY != 0 {
         InitState::Initializing
      } else {
         InitState::Uninitialized
      }
   }

   #[inline]
   pub(crate) fn is_ready(&self, ordering: Ordering) -> bool {
      self.0.load(ordering) & Self::READY != 0
   }

   #[inline]
   fn wake_all(&self) {
      // SAFETY: parkers and unparkers agree on the address of the atomic.
      unsafe {
         parking_lot_core::unpark_all(self.0.as_ptr() as usize, DEFAULT_UNPARK_TOKEN);
      }
   }

   /// Parks the calling thread while the gate still reads `observed`.
   #[inline]
   fn wait(&self, observed: u8) {
      // SAFETY: see `wake_all`.
      unsafe {
         // Spurious wakeups are fine, every caller re-checks the state.
         let _ = parking_lot_core::park(
            self.0.as_ptr() as usize,
            || self.0.load(Ordering::Acquire) == observed,
            || {},
            |_, _| {},
            DEFAULT_PARK_TOKEN,
            None,
         );
      }
   }

   /// Marks the gate READY and wakes parked threads.
   ///
   /// The release swap orders the instance write before any acquire load that
   /// observes READY.
   #[inline]
   fn publish(&self) {
      let current = self.0.load(Ordering::Relaxed);
      let prev = self.0.swap(Self::READY | Self::next_generation(current), Ordering::Release);
      if prev & Self::PARKED != 0 {
         self.wake_all();
      }
   }

   /// Clears BUSY without publishing and wakes parked threads so one of them
   /// can retry construction.
   #[inline]
   fn rearm(&self) {
      let current = self.0.load(Ordering::Relaxed);
      let prev = self.0.swap(Self::next_generation(current), Ordering::Release);
      if prev & Self::PARKED != 0 {
         self.wake_all();
      }
   }

   /// One attempt at entering the gate.
   ///
   /// - `Ok(None)`: already READY.
   /// - `Ok(Some(guard))`: BUSY acquired, the caller must construct.
   /// - `Err(state)`: another thread is constructing; `state` has PARKED set.
   #[inline]
   fn step(&self) -> Result<Option<GateGuard<'_>>, u8> {
      loop {
         let current = self.0.load(Ordering::Relaxed);
         if current & Self::READY != 0 {
            // Pairs with the release in `publish`.
            core::sync::atomic::fence(Ordering::Acquire);
            return Ok(None);
         }

         if current & Self::BUSY == 0 {
            match self.0.compare_exchange_weak(
               current,
               current | Self::BUSY,
               Ordering::Acquire,
               Ordering::Relaxed,
            ) {
               Ok(_) => return Ok(Some(GateGuard { gate: self })),
               Err(_) => {
                  core::hint::spin_loop();
                  continue;
               }
            }
         }

         if current & Self::PARKED != 0 {
            return Err(current);
         }
         let parked = current | Self::PARKED;
         match self
            .0
            .compare_exchange_weak(current, parked, Ordering::Relaxed, Ordering::Relaxed)
         {
            Ok(_) => return Err(parked),
            Err(_) => core::hint::spin_loop(),
         }
      }
   }

   /// Enters the gate, blocking while another thread constructs.
   ///
   /// Returns `None` once the gate is READY, or a guard if this caller won the
   /// right to construct.
   #[inline]
   pub(crate) fn enter(&self) -> Option<GateGuard<'_>> {
      let mut observed = match self.step() {
         Ok(entered) => return entered,
         Err(observed) => observed,
      };
      loop {
         self.wait(observed);
         match self.step() {
            Ok(entered) => return entered,
            Err(state) => observed = state,
         }
      }
   }

   /// Enters the gate from async code.
   ///
   /// Yields to the runtime while the constructor runs elsewhere. On a
   /// multi-threaded runtime it eventually parks inside `block_in_place`; on
   /// any other runtime it keeps yielding, since the winner may be a task on
   /// the same thread.
   #[cfg(any(feature = "async-tokio", feature = "async-tokio-mt"))]
   pub(crate) async fn enter_async(&self) -> Option<GateGuard<'_>> {
      #[cfg(feature = "async-tokio-mt")]
      let can_block = matches!(
         tokio::runtime::Handle::try_current().map(|handle| handle.runtime_flavor()),
         Ok(tokio::runtime::RuntimeFlavor::MultiThread)
      );
      #[cfg(feature = "async-tokio-mt")]
      let mut rounds = 0u32;
      loop {
         let observed = match self.step() {
            Ok(entered) => return entered,
            Err(observed) => observed,
         };

         #[cfg(feature = "async-tokio-mt")]
         {
            if can_block {
               rounds += 1;
               if rounds > Self::YIELD_ROUNDS {
                  return tokio::task::block_in_place(|| {
                     self.wait(observed);
                     self.enter()
                  });
               }
            }
         }

         for _ in 0..Self::YIELDS_PER_ROUND {
            tokio::task::yield_now().await;
            if self.0.load(Ordering::Relaxed) != observed {
               break;
            }
         }
      }
   }
}

/// Proof that the holder owns the BUSY bit.
///
/// [`commit`](Self::commit) publishes the instance. Dropping the guard instead
/// (panic, error, cancelled future) re-arms the gate.
pub(crate) struct GateGuard<'a> {
   gate: &'a InitGate,
}

impl GateGuard<'_> {
   #[inline(always)]
   pub(crate) fn commit(self) {
      self.gate.publish();
      mem::forget(self);
   }
}

impl Drop for GateGuard<'_> {
   #[inline]
   fn drop(&mut self) {
      tracing::debug!("constructor did not complete, re-arming initialization gate");
      self.gate.rearm();
   }
}
