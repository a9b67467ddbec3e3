use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use poly_singleton::{
   Context, Explicit, ExplicitSingleton, Implicit, InitState, OneShot, Singleton, SingletonError,
};

struct CustomCtor {
   i: i32,
   d: f64,
}

impl Singleton for CustomCtor {
   type Policy = Explicit;
}

#[derive(Default)]
struct DefaultCtor {
   c: AtomicI32,
}

impl Singleton for DefaultCtor {
   type Policy = Implicit;
}

#[test]
fn test_basic_use_case() {
   assert!(matches!(
      CustomCtor::instance(),
      Err(SingletonError::AccessBeforeInitialization { .. })
   ));
   let _ = DefaultCtor::instance();

   assert!(CustomCtor::create(|| CustomCtor { i: 1, d: 3.0 }));
   assert_eq!(CustomCtor::instance().unwrap().i, 1);
   assert_eq!(CustomCtor::instance().unwrap().d, 3.0);

   let custom = CustomCtor::instance().unwrap();
   assert!(!CustomCtor::create(|| CustomCtor { i: 3, d: 4.0 }));
   assert!(std::ptr::eq(custom, CustomCtor::instance().unwrap()));
   assert_eq!(custom.i, 1);

   let default_ctor = DefaultCtor::instance();
   default_ctor.c.store(11, Ordering::SeqCst);
   DefaultCtor::instance().c.store(42, Ordering::SeqCst);
   assert_eq!(default_ctor.c.load(Ordering::SeqCst), 42);
   assert!(std::ptr::eq(default_ctor, DefaultCtor::instance()));
}

#[test]
fn test_concurrent_explicit_create() {
   static CONSTRUCTED: AtomicUsize = AtomicUsize::new(0);

   struct Raced {
      i: i32,
      d: f64,
   }

   impl Raced {
      fn new(i: i32, d: f64) -> Self {
         CONSTRUCTED.fetch_add(1, Ordering::SeqCst);
         Self { i, d }
      }
   }

   impl Singleton for Raced {
      type Policy = Explicit;
   }

   let threads: Vec<_> = (0..50)
      .map(|n| {
         thread::spawn(move || {
            Raced::create(|| Raced::new(n, f64::from(n) * 2.0));
            let instance = Raced::instance().expect("created above");
            instance as *const Raced as usize
         })
      })
      .collect();

   let addresses: Vec<usize> = threads.into_iter().map(|t| t.join().unwrap()).collect();
   assert!(addresses.windows(2).all(|pair| pair[0] == pair[1]));
   assert_eq!(CONSTRUCTED.load(Ordering::SeqCst), 1);

   let winner = Raced::instance().unwrap();
   assert!((0..50).contains(&winner.i));
   assert_eq!(winner.d, f64::from(winner.i) * 2.0);
}

#[test]
fn test_concurrent_implicit_get() {
   static CONSTRUCTED: AtomicUsize = AtomicUsize::new(0);

   struct Lazy;

   impl Default for Lazy {
      fn default() -> Self {
         CONSTRUCTED.fetch_add(1, Ordering::SeqCst);
         thread::sleep(Duration::from_millis(20));
         Lazy
      }
   }

   impl Singleton for Lazy {
      type Policy = Implicit;
   }

   let threads: Vec<_> = (0..100)
      .map(|_| thread::spawn(|| Lazy::instance() as *const Lazy as usize))
      .collect();

   let addresses: Vec<usize> = threads.into_iter().map(|t| t.join().unwrap()).collect();
   assert!(addresses.windows(2).all(|pair| pair[0] == pair[1]));
   assert_eq!(CONSTRUCTED.load(Ordering::SeqCst), 1);
}

#[test]
fn test_local_context_holders_are_independent() {
   let first = Context::new();
   let second = Context::new();

   first.one_shot::<CustomCtor>().create(|| CustomCtor { i: 10, d: 0.0 });
   assert_eq!(first.one_shot::<CustomCtor>().get().unwrap().i, 10);
   assert!(second.one_shot::<CustomCtor>().get().is_err());

   second.one_shot::<CustomCtor>().create(|| CustomCtor { i: 20, d: 0.0 });
   assert_eq!(second.one_shot::<CustomCtor>().get().unwrap().i, 20);
   assert_eq!(first.one_shot::<CustomCtor>().get().unwrap().i, 10);
}

#[test]
fn test_state_transitions() {
   let holder: OneShot<CustomCtor> = OneShot::new();
   assert_eq!(holder.state(), InitState::Uninitialized);

   let (started_tx, started_rx) = mpsc::channel();
   let (release_tx, release_rx) = mpsc::channel::<()>();

   thread::scope(|scope| {
      let holder = &holder;
      let creator = scope.spawn(move || {
         holder.create(|| {
            started_tx.send(()).unwrap();
            release_rx.recv().unwrap();
            CustomCtor { i: 5, d: 5.0 }
         })
      });

      started_rx.recv().unwrap();
      assert_eq!(holder.state(), InitState::Initializing);
      assert!(holder.get().is_err());

      release_tx.send(()).unwrap();
      assert!(creator.join().unwrap());
   });

   assert_eq!(holder.state(), InitState::Initialized);
   assert_eq!(holder.get().unwrap().i, 5);
}

#[test]
fn test_losing_create_waits_for_winner() {
   let holder: OneShot<CustomCtor> = OneShot::new();
   let (started_tx, started_rx) = mpsc::channel();

   thread::scope(|scope| {
      let holder = &holder;
      scope.spawn(move || {
         holder.create(|| {
            started_tx.send(()).unwrap();
            thread::sleep(Duration::from_millis(50));
            CustomCtor { i: 1, d: 1.0 }
         })
      });

      started_rx.recv().unwrap();
      // Blocks until the winner publishes, then finds the instance.
      let created = holder.create(|| CustomCtor { i: 2, d: 2.0 });
      assert!(!created);
      assert_eq!(holder.get().unwrap().i, 1);
   });
}

#[test]
fn test_panicking_explicit_constructor_can_retry() {
   let holder: OneShot<CustomCtor> = OneShot::new();

   let result = panic::catch_unwind(AssertUnwindSafe(|| {
      holder.create(|| panic!("constructor failed"));
   }));
   assert!(result.is_err());
   assert_eq!(holder.state(), InitState::Uninitialized);
   assert!(holder.get().is_err());

   assert!(holder.create(|| CustomCtor { i: 8, d: 8.0 }));
   assert_eq!(holder.get().unwrap().i, 8);
}

#[test]
fn test_waiter_builds_after_winner_panics() {
   let holder: OneShot<CustomCtor> = OneShot::new();
   let (started_tx, started_rx) = mpsc::channel();

   thread::scope(|scope| {
      let holder = &holder;
      let winner = scope.spawn(move || {
         holder.create(|| {
            started_tx.send(()).unwrap();
            thread::sleep(Duration::from_millis(100));
            panic!("constructor failed");
         })
      });

      started_rx.recv().unwrap();
      // Parks behind the failing winner, then takes over the gate.
      assert!(holder.create(|| CustomCtor { i: 7, d: 7.0 }));
      assert!(winner.join().is_err());
   });

   assert_eq!(holder.state(), InitState::Initialized);
   assert_eq!(holder.get().unwrap().i, 7);
}

#[test]
fn test_panicking_default_constructor_can_retry() {
   static ATTEMPTS: AtomicUsize = AtomicUsize::new(0);

   struct Flaky {
      attempt: usize,
   }

   impl Default for Flaky {
      fn default() -> Self {
         let attempt = ATTEMPTS.fetch_add(1, Ordering::SeqCst) + 1;
         if attempt == 1 {
            panic!("first construction fails");
         }
         Self { attempt }
      }
   }

   impl Singleton for Flaky {
      type Policy = Implicit;
   }

   let ctx = Context::new();
   let result = panic::catch_unwind(AssertUnwindSafe(|| ctx.one_shot::<Flaky>().get().attempt));
   assert!(result.is_err());
   assert_eq!(ctx.one_shot::<Flaky>().state(), InitState::Uninitialized);

   assert_eq!(ctx.one_shot::<Flaky>().get().attempt, 2);
   assert_eq!(ctx.one_shot::<Flaky>().get().attempt, 2);
   assert_eq!(ATTEMPTS.load(Ordering::SeqCst), 2);
}

#[test]
fn test_try_create() {
   let holder: OneShot<CustomCtor> = OneShot::new();

   assert_eq!(holder.try_create(|| Err("missing endpoint")), Err("missing endpoint"));
   assert_eq!(holder.state(), InitState::Uninitialized);

   assert_eq!(
      holder.try_create(|| Ok::<_, &str>(CustomCtor { i: 3, d: 0.0 })),
      Ok(true)
   );
   assert_eq!(
      holder.try_create(|| -> Result<CustomCtor, &str> { panic!("should not be called") }),
      Ok(false)
   );
   assert_eq!(holder.get().unwrap().i, 3);
}

#[test]
fn test_explicit_try_create_through_declaration() {
   struct Configured(u16);

   impl Singleton for Configured {
      type Policy = Explicit;
   }

   assert_eq!(Configured::try_create(|| Err::<Configured, _>(404)), Err(404));
   assert!(Configured::instance().is_err());
   assert_eq!(Configured::try_create(|| Ok::<_, i32>(Configured(200))), Ok(true));
   assert_eq!(Configured::instance().map(|c| c.0), Ok(200));
}

#[test]
fn test_error_message() {
   struct Unset;

   impl Singleton for Unset {
      type Policy = Explicit;
   }

   let err = match Unset::instance() {
      Ok(_) => panic!("never created"),
      Err(err) => err,
   };
   let message = err.to_string();
   assert!(message.contains("Unset"), "{message}");
   assert!(message.contains("call `create` before `get`"), "{message}");
}

#[test]
fn test_instance_dropped_with_context() {
   struct Tracked(Arc<AtomicUsize>);

   impl Drop for Tracked {
      fn drop(&mut self) {
         self.0.fetch_add(1, Ordering::SeqCst);
      }
   }

   impl Singleton for Tracked {
      type Policy = Explicit;
   }

   let drops = Arc::new(AtomicUsize::new(0));
   let ctx = Context::new();
   let drops_clone = Arc::clone(&drops);
   ctx.one_shot::<Tracked>().create(move || Tracked(drops_clone));
   assert_eq!(drops.load(Ordering::SeqCst), 0);

   drop(ctx);
   assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[cfg(feature = "async-tokio-mt")]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_create_async() {
   struct Remote {
      version: u32,
   }

   impl Singleton for Remote {
      type Policy = Explicit;
   }

   let ctx = Arc::new(Context::new());
   let constructed = Arc::new(AtomicUsize::new(0));

   let tasks: Vec<_> = (0..8u32)
      .map(|n| {
         let ctx = Arc::clone(&ctx);
         let constructed = Arc::clone(&constructed);
         tokio::spawn(async move {
            ctx.one_shot::<Remote>()
               .create_async(|| async move {
                  constructed.fetch_add(1, Ordering::SeqCst);
                  tokio::time::sleep(Duration::from_millis(20)).await;
                  Remote { version: n }
               })
               .await
         })
      })
      .collect();

   let mut winners = 0;
   for task in tasks {
      if task.await.unwrap() {
         winners += 1;
      }
   }

   assert_eq!(winners, 1);
   assert_eq!(constructed.load(Ordering::SeqCst), 1);
   assert!(ctx.one_shot::<Remote>().get().unwrap().version < 8);
}

#[cfg(any(feature = "async-tokio", feature = "async-tokio-mt"))]
#[tokio::test]
async fn test_create_async_loser_on_current_thread_runtime() {
   struct Remote {
      version: u32,
   }

   impl Singleton for Remote {
      type Policy = Explicit;
   }

   let ctx = Arc::new(Context::new());
   let (started_tx, started_rx) = tokio::sync::oneshot::channel();

   let winner = tokio::spawn({
      let ctx = Arc::clone(&ctx);
      async move {
         ctx.one_shot::<Remote>()
            .create_async(|| async move {
               started_tx.send(()).unwrap();
               tokio::time::sleep(Duration::from_millis(200)).await;
               Remote { version: 1 }
            })
            .await
      }
   });
   let loser = tokio::spawn({
      let ctx = Arc::clone(&ctx);
      async move {
         started_rx.await.unwrap();
         ctx.one_shot::<Remote>()
            .create_async(|| async { Remote { version: 2 } })
            .await
      }
   });

   assert!(winner.await.unwrap());
   assert!(!loser.await.unwrap());
   assert_eq!(ctx.one_shot::<Remote>().get().unwrap().version, 1);
}

#[cfg(any(feature = "async-tokio", feature = "async-tokio-mt"))]
#[tokio::test]
async fn test_aborted_create_async_leaves_holder_uninitialized() {
   struct Remote {
      version: u32,
   }

   impl Singleton for Remote {
      type Policy = Explicit;
   }

   let ctx = Arc::new(Context::new());
   let (started_tx, started_rx) = tokio::sync::oneshot::channel();

   let task = tokio::spawn({
      let ctx = Arc::clone(&ctx);
      async move {
         ctx.one_shot::<Remote>()
            .create_async(|| async move {
               started_tx.send(()).unwrap();
               std::future::pending::<Remote>().await
            })
            .await
      }
   });

   started_rx.await.unwrap();
   assert_eq!(ctx.one_shot::<Remote>().state(), InitState::Initializing);

   task.abort();
   assert!(task.await.unwrap_err().is_cancelled());
   assert_eq!(ctx.one_shot::<Remote>().state(), InitState::Uninitialized);

   assert!(ctx.one_shot::<Remote>().create(|| Remote { version: 3 }));
   assert_eq!(ctx.one_shot::<Remote>().get().unwrap().version, 3);
}
