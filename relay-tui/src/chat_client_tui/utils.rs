use super::imports::*;

pub const MESSAGES_VIEW: &str = "messages_scroll";
pub const MESSAGE_FIELD: &str = "messageContent";
pub const RECIPIENT_FIELD: &str = "receiver";

/// Appends rendered chat lines to the message view.
pub struct CursiveList<'a> {
    pub siv: &'a mut Cursive,
    pub content: &'a TextContent,
}

impl MessageList for CursiveList<'_> {
    fn append_line(&mut self, line: RenderedLine) {
        self.content.append(styled_chat_line(&line));
        scroll_to_bottom(self.siv);
    }
}

/// Snapshot of the compose fields taken when Send is activated; clearing
/// writes back to the message field.
pub struct CursiveForm<'a> {
    siv: &'a mut Cursive,
    body: String,
    recipient: String,
}

impl<'a> CursiveForm<'a> {
    pub fn read(siv: &'a mut Cursive) -> Self {
        let body = field_text(siv, MESSAGE_FIELD);
        let recipient = field_text(siv, RECIPIENT_FIELD);
        Self {
            siv,
            body,
            recipient,
        }
    }
}

impl ComposeForm for CursiveForm<'_> {
    fn message_body(&self) -> String {
        self.body.clone()
    }

    fn recipient(&self) -> String {
        self.recipient.clone()
    }

    fn clear_message_body(&mut self) {
        self.body.clear();
        self.siv.call_on_name(MESSAGE_FIELD, |view: &mut EditView| {
            view.set_content("");
        });
    }
}

fn field_text(siv: &mut Cursive, name: &str) -> String {
    siv.call_on_name(name, |view: &mut EditView| view.get_content().to_string())
        .unwrap_or_default()
}

pub fn scroll_to_bottom(siv: &mut Cursive) {
    siv.call_on_name(MESSAGES_VIEW, |view: &mut ScrollView<TextView>| {
        view.scroll_to_bottom();
    });
}

pub fn styled_chat_line(line: &RenderedLine) -> StyledString {
    let mut styled = StyledString::new();

    let local_time = line
        .timestamp
        .map(|t| t.with_timezone(&Local))
        .unwrap_or_else(Local::now)
        .format("%H:%M:%S");
    styled.append_styled(
        format!("[{}] ", local_time),
        Color::Light(BaseColor::Yellow),
    );
    styled.append_styled(
        format!("{}: ", line.sender),
        Color::Light(BaseColor::Green),
    );
    styled.append_styled(format!("{}\n", line.body), Color::Light(BaseColor::Cyan));

    styled
}

pub fn print_textline_to_output(siv: &mut Cursive, content: &TextContent, textline: TextLine) {
    let mut styled = StyledString::new();
    if let Some(line_color) = textline.color {
        let color: Color = line_color.into();
        styled.append_styled(format!("{}\n", textline.text), color);
    } else {
        styled.append_styled(format!("{}\n", textline.text), Color::TerminalDefault);
    }
    content.append(styled);
    scroll_to_bottom(siv);
}

/// Same as [`print_textline_to_output`] but from a non-UI thread.
pub fn send_textline(siv_sink: &CbSink, content: &TextContent, textline: TextLine) -> bool {
    let content = content.clone();
    siv_sink
        .send(Box::new(move |s| print_textline_to_output(s, &content, textline)))
        .is_ok()
}

pub fn set_custom_theme(siv: &mut cursive::CursiveRunnable) {
    let mut theme = Theme::default();
    let mut palette = Palette::default();

    palette[PaletteColor::Background] = Color::TerminalDefault;
    palette[PaletteColor::View] = Color::TerminalDefault;
    palette[PaletteColor::Primary] = Color::Dark(BaseColor::Blue);
    palette[PaletteColor::Secondary] = Color::Light(BaseColor::Blue);
    palette[PaletteColor::Tertiary] = Color::Light(BaseColor::White);
    palette[PaletteColor::TitlePrimary] = Color::Light(BaseColor::Green);
    palette[PaletteColor::TitleSecondary] = Color::Dark(BaseColor::Green);

    theme.palette = palette;
    siv.set_theme(theme);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_line_keeps_sender_and_body_text() {
        let line = RenderedLine::new("alice", "hi\u{1b}[2J", None);
        let styled = styled_chat_line(&line);
        let text = styled.source();
        assert!(text.ends_with("alice: hi\\u{1b}[2J\n"));
        assert!(text.starts_with('['));
    }
}
