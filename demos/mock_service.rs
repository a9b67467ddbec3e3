use poly_singleton::{Resettable, SingletonError};

trait Clock: Send + Sync {
   fn now(&self) -> u64;
}

struct SystemClock;

impl Clock for SystemClock {
   fn now(&self) -> u64 {
      std::time::SystemTime::now()
         .duration_since(std::time::UNIX_EPOCH)
         .map(|d| d.as_secs())
         .unwrap_or_default()
   }
}

struct FrozenClock(u64);

impl Clock for FrozenClock {
   fn now(&self) -> u64 {
      self.0
   }
}

fn timestamp() -> Result<u64, SingletonError> {
   Ok(Resettable::<dyn Clock>::global().get()?.now())
}

fn main() {
   let clock = Resettable::<dyn Clock>::global();

   clock.create(|| Box::new(SystemClock));
   println!("System time: {:?}", timestamp());

   // Swap in a fixed clock, as a test would.
   clock.reset();
   {
      let _frozen = clock.scoped(|| Box::new(FrozenClock(1_000)));
      assert_eq!(timestamp(), Ok(1_000));
      println!("Frozen time: {:?}", timestamp());
   }

   match timestamp() {
      Ok(_) => unreachable!("clock was reset"),
      Err(err) => println!("After reset: {}", err),
   }
}
