//! Echo client example.
//!
//! Start any WebSocket echo server on 127.0.0.1:9001, then run:
//! `RUST_LOG=wsclient=debug cargo run --example echo_client`

use std::error::Error;

use tracing_subscriber::EnvFilter;
use wsclient::{CloseCode, Config, ConnectionOptions, ConnectionState, Event, WebSocketClient};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let options =
        ConnectionOptions::new("127.0.0.1", 9001).with_header("Origin", "http://127.0.0.1");
    println!("Connecting to ws://{}{}", options.host_header(), options.path);

    let mut client = WebSocketClient::connect(options, Config::default()).await?;
    let mut echoes = 0;

    while let Some(event) = client.next_event().await {
        match event {
            Event::Connect => {
                println!("Handshake complete");
                client.send_text("Hello, WebSocket!").await?;
                client.send_binary(&[0xde, 0xad, 0xbe, 0xef]).await?;
                client.ping(b"are you there").await?;
            }
            Event::Message(text) => {
                println!("Received: {text}");
                echoes += 1;
            }
            Event::Binary(data) => {
                println!("Received binary: {} bytes", data.len());
                echoes += 1;
            }
            Event::Pong(payload) => println!("Pong: {}", String::from_utf8_lossy(&payload)),
            Event::Close(frame) => println!("Close: {frame:?}"),
            Event::Error(err) => eprintln!("Error: {err}"),
            Event::Disconnect => println!("Disconnected"),
            other => println!("{other:?}"),
        }

        if echoes == 2 && client.state() == ConnectionState::Open {
            println!("Closing connection...");
            client.close(CloseCode::Normal, "goodbye").await?;
        }
    }

    Ok(())
}
