//! Webhook Probe Tool
//!
//! Sends a synthetic Plex playback webhook at a running plex-presence
//! listener, framed the way Plex frames it (multipart wrapper with the
//! JSON payload on its own line). Useful for exercising sensor rules
//! without a media server.

use clap::Parser;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

#[derive(Parser, Debug)]
#[command(name = "webhook-probe", about = "Send a synthetic Plex webhook")]
struct Args {
    /// Listener address
    #[arg(long, default_value = "127.0.0.1:22987")]
    addr: String,

    /// Event name (media.play, media.pause, media.resume, media.stop)
    #[arg(long, default_value = "media.play")]
    event: String,

    /// Player uuid
    #[arg(long, default_value = "probe-uuid")]
    player: String,

    /// Player display title
    #[arg(long, default_value = "Webhook Probe")]
    title: String,

    /// Account title
    #[arg(long, default_value = "Probe User")]
    user: String,

    /// Media type
    #[arg(long, default_value = "movie")]
    media_type: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let payload = json!({
        "event": args.event,
        "Account": { "title": args.user },
        "Player": { "uuid": args.player, "title": args.title },
        "Metadata": { "type": args.media_type }
    })
    .to_string();

    // Mimic the Plex multipart framing the decoder expects
    let body = format!(
        "--probe\r\nContent-Disposition: form-data; name=\"payload\"\r\n\r\n{payload}\n--probe--\r\n"
    );
    let request = format!(
        "POST / HTTP/1.1\r\nHost: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        args.addr,
        body.len(),
        body
    );

    let mut stream = TcpStream::connect(&args.addr).await?;
    stream.write_all(request.as_bytes()).await?;

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await?;
    let response = String::from_utf8_lossy(&response);
    let status_line = response.lines().next().unwrap_or("<no response>");

    println!("{} -> {}", args.event, status_line);
    Ok(())
}
