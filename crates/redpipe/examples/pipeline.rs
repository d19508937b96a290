//! Pipelines a few commands against a live server on 127.0.0.1:6379.
//!
//! Run a local redis-compatible server, then:
//! `cargo run -p redpipe --example pipeline`

use redpipe::Command;
use redpipe::Connection;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let conn = Connection::connect("127.0.0.1:6379").await?;

    // All three requests hit the wire before the first reply is awaited.
    let ping = conn.submit(Command::new("PING"))?;
    let set = conn.submit(Command::new("SET").arg("greeting").arg("hello"))?;
    let get = conn.submit(Command::new("GET").arg("greeting"))?;

    println!("PING -> {:?}", ping.await?);
    println!("SET  -> {:?}", set.await?);

    let reply = get.await?;
    println!("GET  -> {:?}", reply.as_str());

    Ok(())
}
