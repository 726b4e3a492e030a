mod imports;
mod utils;

pub use imports::*;
pub use utils::*;

pub fn run_chat_tui(config: RelayConfig) -> Result<()> {
    // Network tasks run on the runtime's worker threads while cursive owns the main thread
    let rt = Runtime::new().context("failed to start tokio runtime")?;

    let mut siv = cursive::default();
    set_custom_theme(&mut siv);

    show_connect_dialog(&mut siv, rt.handle().clone(), config);

    siv.add_global_callback(cursive::event::Key::Esc, |s| {
        let client = s.user_data::<SharedClient>().cloned();
        global_quit(s, client.as_ref());
    });

    siv.run();
    Ok(())
}

fn show_connect_dialog(siv: &mut Cursive, handle: Handle, config: RelayConfig) {
    let location_input = EditView::new()
        .content(config.location.clone())
        .with_name("location")
        .fixed_width(40);
    let username_input = EditView::new()
        .content(config.username.clone().unwrap_or_default())
        .with_name("username")
        .fixed_width(20);
    let recipient_input = EditView::new()
        .content(config.recipient.clone().unwrap_or_default())
        .with_name("initial_recipient")
        .fixed_width(20);

    let layout = LinearLayout::vertical()
        .child(TextView::new("Location:"))
        .child(location_input)
        .child(TextView::new("Username:"))
        .child(username_input)
        .child(TextView::new("Send to:"))
        .child(recipient_input);

    let options = config.client_options();
    let dialog = Dialog::around(layout)
        .title("Connect to Relay")
        .button("Connect", move |s| {
            let location = read_edit(s, "location");
            let username = read_edit(s, "username").trim().to_string();
            let recipient = read_edit(s, "initial_recipient").trim().to_string();

            if username.is_empty() {
                s.add_layer(Dialog::info("Please enter a username").title("Error"));
                return;
            }

            let target = match ConnectionTarget::from_location(&location) {
                Ok(target) => target,
                Err(e) => {
                    s.add_layer(Dialog::info(e.to_string()).title("Error"));
                    return;
                }
            };

            match handle.block_on(TcpChannel::connect(&target, &username)) {
                Ok(channel) => {
                    s.pop_layer();
                    open_chat(s, channel, options, &username, &recipient);
                }
                Err(e) => {
                    warn!(%target, "connect failed: {e}");
                    s.add_layer(
                        Dialog::info(format!("Failed to connect to {target}: {e}")).title("Error"),
                    );
                }
            }
        })
        .button("Quit", |s| global_quit(s, None));

    siv.add_layer(dialog);
}

fn read_edit(siv: &mut Cursive, name: &str) -> String {
    siv.call_on_name(name, |view: &mut EditView| view.get_content().to_string())
        .unwrap_or_default()
}

fn open_chat(
    siv: &mut Cursive,
    channel: TcpChannel,
    options: ClientOptions,
    username: &str,
    recipient: &str,
) {
    let local_addr = channel.local_addr();
    let (mut client, inbox) = MessageRelayClient::new(channel, options);
    let errors = client.channel_mut().subscribe(ERROR_EVENT);
    let client: SharedClient = Arc::new(Mutex::new(client));
    siv.set_user_data(Arc::clone(&client));

    let content = TextContent::new("");

    let messages = TextView::new_with_content(content.clone())
        .scrollable()
        .with_name(MESSAGES_VIEW)
        .fixed_height(20);

    let send = {
        let client = Arc::clone(&client);
        let content = content.clone();
        Arc::new(move |s: &mut Cursive| send_clicked(s, &client, &content))
    };

    let message_input = {
        let send = Arc::clone(&send);
        EditView::new()
            .on_submit(move |s, _| send(s))
            .with_name(MESSAGE_FIELD)
            .full_width()
    };
    let send_button = {
        let send = Arc::clone(&send);
        Button::new("Send", move |s| send(s))
    };

    let compose = LinearLayout::horizontal()
        .child(TextView::new("To: "))
        .child(
            EditView::new()
                .content(recipient)
                .with_name(RECIPIENT_FIELD)
                .fixed_width(16),
        )
        .child(TextView::new(" "))
        .child(message_input)
        .child(send_button);

    let input_label = TextView::new("Enter sends, Esc quits").h_align(HAlign::Left);

    let layout = LinearLayout::vertical()
        .child(messages)
        .child(input_label)
        .child(compose);

    let quit_client = Arc::clone(&client);
    siv.add_layer(
        Dialog::around(layout)
            .title(format!("Relay Chat: {username}"))
            .button("Quit", move |s| global_quit(s, Some(&quit_client))),
    );
    siv.focus_name(MESSAGE_FIELD).ok();

    print_textline_to_output(
        siv,
        &content,
        TextLine::new(format!("Connected as {username} from {local_addr}"), &GREEN_COLOR),
    );

    spawn_inbound_forwarder(inbox, siv.cb_sink().clone(), Arc::clone(&client), content.clone());
    spawn_error_forwarder(errors, siv.cb_sink().clone(), content);
    info!(username, "chat view open");
}

fn send_clicked(siv: &mut Cursive, client: &SharedClient, content: &TextContent) {
    let result = match client.lock() {
        Ok(mut client) => {
            let mut form = CursiveForm::read(siv);
            client.on_send_clicked(&mut form)
        }
        Err(_) => return,
    };

    if let Err(e) = result {
        print_textline_to_output(
            siv,
            content,
            TextLine::new(format!("Not sent: {e}"), &RED_COLOR),
        );
    }
}

/// Forwards inbound `message` payloads to the UI thread, where the client
/// renders them.
fn spawn_inbound_forwarder(
    mut inbox: Subscription,
    siv_sink: CbSink,
    client: SharedClient,
    content: TextContent,
) {
    thread::spawn(move || {
        while let Some(data) = inbox.blocking_recv() {
            let client = Arc::clone(&client);
            let content_clone = content.clone();
            let delivered = siv_sink.send(Box::new(move |s| {
                render_inbound(s, &client, &content_clone, data);
            }));
            if delivered.is_err() {
                return;
            }
        }
        send_textline(
            &siv_sink,
            &content,
            TextLine::new("Server closed the connection.", &RED_COLOR),
        );
    });
}

fn render_inbound(siv: &mut Cursive, client: &SharedClient, content: &TextContent, data: Value) {
    let Ok(mut client) = client.lock() else {
        return;
    };
    let mut list = CursiveList { siv, content };
    if let Err(e) = client.on_message_received(data, &mut list) {
        warn!("dropping inbound message: {e}");
    }
}

fn spawn_error_forwarder(mut errors: Subscription, siv_sink: CbSink, content: TextContent) {
    thread::spawn(move || {
        while let Some(data) = errors.blocking_recv() {
            let message = serde_json::from_value::<ServerError>(data)
                .map(|e| e.message)
                .unwrap_or_else(|_| "unknown server error".to_string());
            if !send_textline(
                &siv_sink,
                &content,
                TextLine::new(format!("Server: {message}"), &YELLOW_COLOR),
            ) {
                return;
            }
        }
    });
}
