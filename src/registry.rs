//! Type-keyed storage for singleton holders.
//!
//! Rust has no per-monomorphization statics, so holders live in a [`Context`]
//! keyed by the holder's `TypeId`. The process-wide context behind
//! [`global`] is what `Resettable::global`, `OneShot::global` and
//! `Singleton::instance` use. Tests that want isolation create their own.

use core::any::{type_name, Any, TypeId};
use core::fmt;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::cell::InitCell;
use crate::one_shot::{OneShot, Singleton};
use crate::resettable::Resettable;

/// A holder that a [`Context`] can create on demand.
pub(crate) trait Holder: Any + Send + Sync {
   fn vacant() -> Self;
}

impl<T: ?Sized + Send + Sync + 'static> Holder for Resettable<T> {
   #[inline]
   fn vacant() -> Self {
      Resettable::new()
   }
}

impl<T: Singleton> Holder for OneShot<T> {
   #[inline]
   fn vacant() -> Self {
      OneShot::new()
   }
}

type Entry = Box<dyn Any + Send + Sync>;

/// Registry owning one holder per declared type.
///
/// Holders are created empty the first time they are looked up and stay at
/// the same address until the context is dropped, which drops every
/// instance the context still owns.
///
/// Every lookup takes a shared read lock and hashes the `TypeId` with
/// `FxHash`. Callers on a hot path should look the holder up once and keep
/// the returned reference.
///
/// ```
/// use poly_singleton::Context;
///
/// trait Clock: Send + Sync {
///    fn now(&self) -> u64;
/// }
///
/// struct Fixed(u64);
///
/// impl Clock for Fixed {
///    fn now(&self) -> u64 {
///       self.0
///    }
/// }
///
/// let ctx = Context::new();
/// let clock = ctx.resettable::<dyn Clock>();
/// assert!(clock.get().is_err());
///
/// clock.create(|| Box::new(Fixed(7)));
/// assert_eq!(clock.get().unwrap().now(), 7);
///
/// clock.reset();
/// assert!(clock.get().is_err());
/// ```
pub struct Context {
   holders: RwLock<FxHashMap<TypeId, Entry>>,
}

impl Context {
   /// Creates an empty context.
   #[must_use]
   pub fn new() -> Self {
      Self {
         holders: RwLock::new(FxHashMap::default()),
      }
   }

   /// The resettable holder for interface `T`.
   #[inline]
   pub fn resettable<T>(&self) -> &Resettable<T>
   where
      T: ?Sized + Send + Sync + 'static,
   {
      self.holder()
   }

   /// The one-shot holder for singleton type `T`.
   #[inline]
   pub fn one_shot<T: Singleton>(&self) -> &OneShot<T> {
      self.holder()
   }

   /// Number of holders registered so far.
   pub fn len(&self) -> usize {
      self.holders.read().len()
   }

   /// Returns `true` if no holder has been looked up yet.
   pub fn is_empty(&self) -> bool {
      self.holders.read().is_empty()
   }

   fn holder<H: Holder>(&self) -> &H {
      let key = TypeId::of::<H>();
      let found = self.holders.read().get(&key).map(Self::downcast::<H>);
      let holder = match found {
         Some(holder) => holder,
         None => {
            let mut holders = self.holders.write();
            let entry = holders.entry(key).or_insert_with(|| {
               tracing::trace!(holder = type_name::<H>(), "registering holder");
               Box::new(H::vacant())
            });
            Self::downcast::<H>(entry)
         }
      };
      // SAFETY: entries are boxed and are never removed or replaced while the
      // context lives, so the holder keeps its address after the map guard is
      // released, for at least as long as `&self`.
      unsafe { &*holder }
   }

   fn downcast<H: Holder>(entry: &Entry) -> *const H {
      match (**entry).downcast_ref::<H>() {
         Some(holder) => holder as *const H,
         None => unreachable!("holder stored under the TypeId of another type"),
      }
   }
}

impl Default for Context {
   #[inline]
   fn default() -> Self {
      Self::new()
   }
}

impl fmt::Debug for Context {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("Context").field("holders", &self.len()).finish()
   }
}

static GLOBAL: InitCell<Context> = InitCell::new();

/// The process-wide context, created on first use.
///
/// It lives for the rest of the process and is never dropped, so destructors
/// of instances held here do not run, not even at exit. Singletons that must
/// release resources on shutdown belong in a [`Context`] the caller owns.
#[inline]
pub fn global() -> &'static Context {
   GLOBAL.get_or_init(Context::new)
}
