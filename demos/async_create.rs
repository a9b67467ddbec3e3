use std::time::Duration;

use poly_singleton::{Explicit, OneShot, Singleton};

struct Connection {
   url: String,
}

impl Singleton for Connection {
   type Policy = Explicit;
}

async fn connect(url: &str) -> Connection {
   println!("Connecting to {}...", url);
   tokio::time::sleep(Duration::from_millis(50)).await;
   Connection { url: url.to_string() }
}

#[tokio::main]
async fn main() {
   let handles: Vec<_> = ["db-a", "db-b", "db-c"]
      .into_iter()
      .map(|url| {
         tokio::spawn(async move {
            OneShot::<Connection>::global()
               .create_async(|| connect(url))
               .await
         })
      })
      .collect();

   for handle in handles {
      println!("Constructed here: {}", handle.await.unwrap());
   }

   let conn = Connection::instance().expect("one task connected");
   println!("Connected to {}", conn.url);
}
