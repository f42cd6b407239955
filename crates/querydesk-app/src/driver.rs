//! JSON-lines driver: one classified message in, one outcome out.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use querydesk_chat::{ClassifiedMessage, IntentRouter, TurnOutcome};

/// One input line: the classifier output, optionally tagged with a user.
#[derive(Debug, Deserialize)]
struct InboundLine {
    #[serde(default)]
    user: Option<String>,
    #[serde(flatten)]
    message: ClassifiedMessage,
}

#[derive(Debug, Serialize)]
struct OutboundLine<'a> {
    user: &'a str,
    #[serde(flatten)]
    outcome: &'a TurnOutcome,
}

/// Handle one input line and render the JSON reply.
///
/// Malformed input and router errors become `{"error": ..}` lines; they
/// never stop the driver.
pub async fn process_line(router: &IntentRouter, default_user: &str, line: &str) -> String {
    let inbound: InboundLine = match serde_json::from_str(line) {
        Ok(inbound) => inbound,
        Err(e) => {
            warn!(error = %e, "Rejected malformed input line");
            return json!({ "error": format!("invalid message: {}", e) }).to_string();
        }
    };

    let user = inbound.user.as_deref().unwrap_or(default_user);
    match router.handle(user, inbound.message).await {
        Ok(outcome) => {
            let line = OutboundLine {
                user,
                outcome: &outcome,
            };
            serde_json::to_string(&line).unwrap_or_else(|e| {
                json!({ "user": user, "error": format!("cannot encode outcome: {}", e) })
                    .to_string()
            })
        }
        Err(e) => {
            warn!(user_id = %user, error = %e, "Turn rejected");
            json!({ "user": user, "error": e.to_string() }).to_string()
        }
    }
}

/// Read lines from `input` until EOF, writing one reply per non-blank line.
pub async fn run<R, W>(
    router: &IntentRouter,
    default_user: &str,
    input: R,
    mut output: W,
) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    let mut handled = 0;
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let reply = process_line(router, default_user, &line).await;
        output.write_all(reply.as_bytes()).await?;
        output.write_all(b"\n").await?;
        output.flush().await?;
        handled += 1;
    }
    debug!(handled, "Input closed");
    Ok(handled)
}
