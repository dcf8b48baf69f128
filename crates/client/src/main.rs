//! `gridexec` -- command-line submission client.
//!
//! Talks the control protocol to a running daemon:
//!
//! ```text
//! gridexec submit <spec.json>    enqueue a job from a JSON spec file
//! gridexec cancel <job-id>       cancel a job
//! gridexec status <job-id>       print a job's last-committed state
//! ```
//!
//! The daemon address comes from `GRIDEXEC_DAEMON_URL`
//! (default `ws://127.0.0.1:5555/control`). Exits non-zero when the
//! daemon replies with an error.

use anyhow::{bail, Context};
use futures::{SinkExt, StreamExt};
use gridexec_core::spec::JobSpec;
use gridexec_proto::{Envelope, Reply, Request};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

const DEFAULT_DAEMON_URL: &str = "ws://127.0.0.1:5555/control";

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("gridexec: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let envelope = match args.as_slice() {
        [cmd, spec_file] if cmd == "submit" => {
            let text = std::fs::read_to_string(spec_file)
                .with_context(|| format!("Failed to read {spec_file}"))?;
            let spec: JobSpec =
                serde_json::from_str(&text).with_context(|| format!("Invalid spec in {spec_file}"))?;
            let owner = std::env::var("USER").ok();
            Envelope::request(None, Request::SubmitJob { spec, owner })
        }
        [cmd, id] if cmd == "cancel" => Envelope::request(Some(parse_id(id)?), Request::CancelJob),
        [cmd, id] if cmd == "status" => Envelope::request(Some(parse_id(id)?), Request::QueryStatus),
        _ => {
            bail!("Usage: gridexec submit <spec.json> | cancel <job-id> | status <job-id>");
        }
    };

    let url =
        std::env::var("GRIDEXEC_DAEMON_URL").unwrap_or_else(|_| DEFAULT_DAEMON_URL.to_string());
    let reply = request(&url, &envelope).await?;
    render(reply)
}

fn parse_id(text: &str) -> anyhow::Result<i64> {
    text.parse()
        .with_context(|| format!("'{text}' is not a valid job id"))
}

/// One request/reply exchange with the daemon.
async fn request(url: &str, envelope: &Envelope) -> anyhow::Result<Reply> {
    let (mut ws, _response) = connect_async(url)
        .await
        .with_context(|| format!("Failed to connect to daemon at {url}"))?;

    let json = serde_json::to_string(envelope)?;
    ws.send(Message::Text(json)).await?;

    while let Some(frame) = ws.next().await {
        match frame? {
            Message::Text(text) => {
                return serde_json::from_str(&text)
                    .with_context(|| format!("Unparseable reply: {text}"));
            }
            Message::Close(_) => bail!("Daemon closed the connection without replying"),
            _ => {}
        }
    }
    bail!("Connection ended without a reply")
}

/// Print the reply; error replies exit non-zero.
fn render(reply: Reply) -> anyhow::Result<()> {
    match reply {
        Reply::Submitted { id } => println!("Submitted job {id}"),
        Reply::Ok => println!("OK"),
        Reply::Stale => println!("OK (already applied)"),
        Reply::Status {
            status,
            attempt,
            result,
            error,
        } => {
            println!("Status:  {status}");
            println!("Attempt: {attempt}");
            if let Some(result) = result {
                println!("Result:  {}", serde_json::to_string_pretty(&result)?);
            }
            if let Some(error) = error {
                println!("Error:   {error}");
            }
        }
        Reply::Error { code, message } => {
            bail!("{code:?}: {message}");
        }
    }
    Ok(())
}
