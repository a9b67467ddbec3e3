use std::sync::atomic::{AtomicUsize, Ordering};

use poly_singleton::{Explicit, ExplicitSingleton, Implicit, Singleton};

static BUILT: AtomicUsize = AtomicUsize::new(0);

#[derive(Default)]
struct Stats {
   requests: AtomicUsize,
}

impl Singleton for Stats {
   type Policy = Implicit;
}

struct Config {
   workers: usize,
   name: String,
}

impl Singleton for Config {
   type Policy = Explicit;
}

fn main() {
   match Config::instance() {
      Ok(_) => unreachable!("nothing created yet"),
      Err(err) => println!("Before create: {}", err),
   }

   let threads: Vec<_> = (1..=5)
      .map(|n| {
         std::thread::spawn(move || {
            // Only one of these constructors runs.
            Config::create(|| {
               BUILT.fetch_add(1, Ordering::Relaxed);
               println!("Building config from thread {}...", n);
               std::thread::sleep(std::time::Duration::from_millis(50));
               Config {
                  workers: n,
                  name: format!("config-{}", n),
               }
            });
            Stats::instance().requests.fetch_add(1, Ordering::Relaxed);
         })
      })
      .collect();

   for t in threads {
      t.join().unwrap();
   }

   let config = Config::instance().expect("created by a worker thread");
   println!("Config: {} with {} workers", config.name, config.workers);
   println!("Requests: {}", Stats::instance().requests.load(Ordering::Relaxed));
   assert_eq!(BUILT.load(Ordering::Relaxed), 1);
}
