//! FIFO engine CLI demo
//!
//! Usage: `fifo_demo [default|single|multiple]`
//!
//! Lines typed on stdin are written into a session; a second thread reads
//! the same stream back and prints it in chunks of 4 bytes.

use std::sync::Arc;

use bytefifo::{ClientId, Engine, Error, Session};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mode = std::env::args().nth(1).unwrap_or_else(|| "default".to_string());
    let engine = Engine::from_mode_name(&mode)?;

    // One session serves both directions, so `single` mode works too
    let session = Arc::new(engine.open(ClientId::new(1))?);
    let interrupter = session.interrupter();

    let reader_session = Arc::clone(&session);
    let reader_task = tokio::task::spawn_blocking(move || read_all("r1", &reader_session));

    write_all(Arc::clone(&session)).await;

    interrupter.interrupt();
    reader_task.await?;

    drop(session);
    engine.shutdown();
    println!("All tasks completed");
    Ok(())
}

async fn write_all(session: Arc<Session>) {
    println!("Enter text (empty line to quit):");

    let stdin = tokio::io::stdin();
    let reader = tokio::io::BufReader::new(stdin);
    let mut lines = tokio::io::AsyncBufReadExt::lines(reader);

    while let Ok(Some(line)) = lines.next_line().await {
        let trimmed = line.trim().to_string();
        if trimmed.is_empty() {
            break;
        }

        let session = Arc::clone(&session);
        match tokio::task::spawn_blocking(move || write_fully(&session, trimmed.as_bytes())).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                eprintln!("Write error: {e}");
                break;
            }
            Err(e) => {
                eprintln!("Writer task failed: {e}");
                break;
            }
        }
    }
    println!("Writer done");
}

/// Short writes are normal, keep going until everything is queued
fn write_fully(session: &Session, mut data: &[u8]) -> Result<(), Error> {
    while !data.is_empty() {
        let n = session.write(data)?;
        data = &data[n..];
    }
    Ok(())
}

fn read_all(name: &str, session: &Session) {
    let mut buf = [0u8; 4];

    loop {
        match session.read(&mut buf) {
            Ok(0) => {
                println!("({name}) EOF");
                break;
            }
            Ok(n) => {
                let data = String::from_utf8_lossy(&buf[..n]);
                println!("({name}): {data}");
            }
            Err(Error::Interrupted) => {
                println!("({name}) stopped");
                break;
            }
            Err(e) => {
                eprintln!("({name}) Error: {e}");
                break;
            }
        }
    }
}
