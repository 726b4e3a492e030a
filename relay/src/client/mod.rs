use crate::shared::*;
use colored::*;

/// Prints each rendered message as its own colored line.
struct TerminalList;

impl MessageList for TerminalList {
    fn append_line(&mut self, line: RenderedLine) {
        let local_time = line
            .timestamp
            .map(|t| t.with_timezone(&Local))
            .unwrap_or_else(Local::now)
            .format("%H:%M:%S");
        println!(
            "[{}] {}: {}",
            local_time.to_string().yellow(),
            line.sender.green().bold(),
            line.body.cyan()
        );
    }
}

/// The typed line is the message field; `/to` edits the recipient field.
struct LineForm {
    body: String,
    recipient: String,
}

impl ComposeForm for LineForm {
    fn message_body(&self) -> String {
        self.body.clone()
    }

    fn recipient(&self) -> String {
        self.recipient.clone()
    }

    fn clear_message_body(&mut self) {
        self.body.clear();
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Input {
    Quit,
    Recipient(String),
    Body(String),
}

fn parse_input(line: &str) -> Input {
    let line = line.trim_end_matches('\r');
    let trimmed = line.trim();

    if trimmed == "/quit" {
        return Input::Quit;
    }
    if trimmed == "/to" {
        return Input::Recipient(String::new());
    }
    if let Some(name) = trimmed.strip_prefix("/to ") {
        return Input::Recipient(name.trim().to_string());
    }
    Input::Body(line.to_string())
}

pub fn run(config: RelayConfig) -> Result<()> {
    let rt = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    rt.block_on(chat(config))
}

async fn chat(config: RelayConfig) -> Result<()> {
    // Create BufReader from stdin for async input
    let stdin = BufReader::new(io::stdin());
    let mut lines = stdin.lines();

    let username = match config.username.clone() {
        Some(name) => name,
        None => {
            println!("Enter your username: ");
            lines.next_line().await?.unwrap_or_default()
        }
    };
    let username = username.trim().to_string();
    if username.is_empty() {
        anyhow::bail!("a username is required");
    }

    let target = config.target()?;
    println!("Connecting to {}...", target);

    let channel = TcpChannel::connect(&target, &username)
        .await
        .with_context(|| format!("failed to connect to {target}"))?;
    println!(
        "{}",
        format!("Connected as {} from {}", username, channel.local_addr()).blue()
    );

    let (mut client, mut inbox) = MessageRelayClient::new(channel, config.client_options());
    let mut errors = client.channel_mut().subscribe(ERROR_EVENT);
    let mut list = TerminalList;
    let mut form = LineForm {
        body: String::new(),
        recipient: config.recipient.clone().unwrap_or_default(),
    };

    println!(
        "{}",
        "You can now chat! Type `/to NAME` to pick a recipient and `/quit` to exit.".blue()
    );
    if form.recipient.is_empty() {
        println!("{}", "No recipient yet, use `/to NAME`.".yellow());
    }

    loop {
        tokio::select! {
            inbound = inbox.recv() => match inbound {
                Some(data) => {
                    if let Err(e) = client.on_message_received(data, &mut list) {
                        warn!("dropping inbound message: {e}");
                    }
                }
                None => {
                    println!("{}", "\nServer closed the connection.".blue());
                    break;
                }
            },
            Some(data) = errors.recv() => {
                let message = serde_json::from_value::<ServerError>(data)
                    .map(|e| e.message)
                    .unwrap_or_else(|_| "unknown server error".to_string());
                println!("{}", format!("Server: {message}").red());
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                match parse_input(&line) {
                    Input::Quit => {
                        println!("Exiting chat.");
                        break;
                    }
                    Input::Recipient(name) => {
                        println!("{}", format!("Now messaging '{name}'").yellow());
                        form.recipient = name;
                    }
                    Input::Body(text) => {
                        form.body = text;
                        match client.on_send_clicked(&mut form) {
                            Ok(()) => {}
                            Err(RelayError::EmptyMessageRejected) => {
                                println!("{}", "Empty message not sent.".yellow());
                            }
                            Err(RelayError::ChannelUnavailable) => {
                                println!("{}", "Connection lost; message not sent.".red());
                                break;
                            }
                            Err(e) => return Err(e.into()),
                        }
                    }
                }
            }
        }
    }

    client.channel().close();
    info!("client session ended");
    Ok(())
}
