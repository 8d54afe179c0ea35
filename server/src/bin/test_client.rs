//! Manual test client: joins a room, walks a few tiles and prints what it hears

use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use shared::codec::{encode_frame, encode_message, join_messages};
use shared::FIELD_DELIMITER;
use tokio::time::{sleep, timeout, Duration};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Gateway address
    #[clap(short = 'H', long, default_value = "127.0.0.1:8080")]
    host: String,
    /// Map to join
    #[clap(short, long, default_value = "1")]
    map: u32,
    /// Account token; the address identity is used when absent
    #[clap(short, long)]
    token: Option<String>,
    #[clap(long, env = "SIGNING_KEY", default_value = "overlay-dev-key")]
    signing_key: String,
    /// Steps to walk before disconnecting
    #[clap(short, long, default_value = "5")]
    steps: u16,
}

fn printable(message: &str) -> String {
    message.replace(FIELD_DELIMITER, " ")
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut url = format!("ws://{}/room/{}", args.host, args.map);
    if let Some(token) = &args.token {
        url.push_str(&format!("?token={}", token));
    }
    let (ws, _) = connect_async(url.as_str()).await?;
    println!("Connected to {}", url);
    let (mut write, mut read) = ws.split();

    // The first message carries the client key
    let client_key = match read.next().await {
        Some(Ok(Message::Text(text))) => match text.split(FIELD_DELIMITER).collect::<Vec<_>>()[..] {
            ["k", key] => key.to_string(),
            _ => return Err(format!("unexpected greeting: {}", printable(&text)).into()),
        },
        other => return Err(format!("no greeting: {:?}", other).into()),
    };
    println!("Client key {}", client_key);

    let key = args.signing_key.as_bytes();
    let mut counter = 0u32;
    for step in 0..args.steps {
        counter += 1;
        let payload = join_messages(&[
            encode_message("m", &[step.to_string(), "0".to_string()]),
            encode_message("f", &["1"]),
        ]);
        let frame = encode_frame(key, client_key.as_bytes(), counter, &payload);
        write.send(Message::Binary(frame)).await?;

        while let Ok(Some(Ok(message))) = timeout(Duration::from_millis(200), read.next()).await {
            if let Message::Text(text) = message {
                println!("<- {}", printable(&text));
            }
        }
        sleep(Duration::from_millis(300)).await;
    }

    write.close().await?;
    println!("Disconnected after {} frames", counter);
    Ok(())
}
