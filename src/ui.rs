use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{
        Block, Borders, Clear, List, ListItem, Paragraph, Scrollbar, ScrollbarOrientation,
        ScrollbarState, Wrap,
    },
};
use giasu::controller::SUGGESTED_TOPICS;
use giasu::state::PLACEHOLDER;
use giasu::Role;
use crate::app::{cursor_position, wrap_input, App, InputMode, MAX_INPUT_ROWS};

/// Parse a line of text and convert **bold** markdown to styled spans
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut chars = text.char_indices().peekable();
    let mut current_text = String::new();

    // Headings and list bullets get a light touch before inline parsing
    let trimmed = text.trim_start();
    if let Some(heading) = trimmed.strip_prefix("### ").or_else(|| trimmed.strip_prefix("## ")).or_else(|| trimmed.strip_prefix("# ")) {
        return Line::from(Span::styled(
            heading.to_string(),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ));
    }

    while let Some((_, c)) = chars.next() {
        if c == '*' && chars.peek().map(|(_, c)| *c) == Some('*') {
            // Consume the second *
            chars.next();

            // Push any accumulated plain text
            if !current_text.is_empty() {
                spans.push(Span::raw(std::mem::take(&mut current_text)));
            }

            // Find closing **
            let mut bold_text = String::new();
            let mut found_close = false;

            while let Some((_, c)) = chars.next() {
                if c == '*' && chars.peek().map(|(_, c)| *c) == Some('*') {
                    chars.next(); // consume second *
                    found_close = true;
                    break;
                }
                bold_text.push(c);
            }

            if found_close && !bold_text.is_empty() {
                spans.push(Span::styled(
                    bold_text,
                    Style::default().add_modifier(Modifier::BOLD),
                ));
            } else {
                // No closing **, treat as literal
                current_text.push_str("**");
                current_text.push_str(&bold_text);
            }
        } else {
            current_text.push(c);
        }
    }

    // Push any remaining text
    if !current_text.is_empty() {
        spans.push(Span::raw(current_text));
    }

    if spans.is_empty() {
        Line::default()
    } else {
        Line::from(spans)
    }
}

/// Rows a line occupies once wrapped to `width` columns.
fn wrapped_rows(line: &Line, width: u16) -> u16 {
    let width = width.max(1) as usize;
    let line_width = line.width();
    if line_width == 0 {
        1
    } else {
        line_width.div_ceil(width) as u16
    }
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    let banner_height = if app.controller.init_error().is_some() || app.controller.error().is_some() {
        1
    } else {
        0
    };
    let input_height = app.input_height(area.width.saturating_sub(2));

    let [header_area, banner_area, chat_area, topics_area, input_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Length(banner_height),
        Constraint::Min(0),
        Constraint::Length(1),
        Constraint::Length(input_height),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);
    if banner_height > 0 {
        render_banner(app, frame, banner_area);
    }
    render_chat(app, frame, chat_area);
    render_topics(app, frame, topics_area);
    render_input(app, frame, input_area);
    render_footer(app, frame, footer_area);

    if app.show_topic_picker {
        render_topic_picker(app, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let speaking_indicator = if app.controller.speaking().is_some() {
        " 🔊 đang đọc"
    } else {
        ""
    };

    let title = Line::from(vec![
        Span::styled(" Gia Sư 4.0 ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(format!("[{}]", app.model), Style::default().fg(Color::Gray)),
        Span::styled(speaking_indicator, Style::default().fg(Color::Magenta)),
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Gray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_banner(app: &App, frame: &mut Frame, area: Rect) {
    // The standing init error wins over transient ones
    let (text, style) = if let Some(message) = app.controller.init_error() {
        (format!(" ⚠ {} ", message), Style::default().bg(Color::Red).fg(Color::White).bold())
    } else if let Some(message) = app.controller.error() {
        (
            format!(" ⚠ {} (Esc để ẩn) ", message),
            Style::default().bg(Color::Yellow).fg(Color::Black),
        )
    } else {
        return;
    };

    frame.render_widget(Paragraph::new(text).style(style), area);
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    app.chat_area = Some(area);
    app.chat_height = area.height.saturating_sub(2);
    app.chat_width = area.width.saturating_sub(2);

    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if app.input_mode == InputMode::Normal {
            Color::Cyan
        } else {
            Color::DarkGray
        }))
        .title(" Trò chuyện ");

    let messages = app.controller.messages();
    let loading = app.controller.is_loading();
    let speaking = app.controller.speaking();
    let last_index = messages.len().checked_sub(1);

    let mut lines: Vec<Line> = Vec::new();
    let mut offsets: Vec<u16> = Vec::with_capacity(messages.len());
    let mut total_rows: u16 = 0;
    let push = |lines: &mut Vec<Line<'static>>, line: Line<'static>, total: &mut u16| {
        *total = total.saturating_add(wrapped_rows(&line, app.chat_width));
        lines.push(line);
    };

    if messages.is_empty() {
        push(
            &mut lines,
            Line::from(Span::styled(
                "Chưa có cuộc trò chuyện nào.",
                Style::default().fg(Color::DarkGray),
            )),
            &mut total_rows,
        );
    }

    for (i, msg) in messages.iter().enumerate() {
        offsets.push(total_rows);

        let selected = app.selected_message == Some(i);
        let (label, color) = match msg.role {
            Role::User => ("Bạn:", Color::Cyan),
            Role::Model => ("Gia sư:", Color::Yellow),
        };
        let mut label_spans = vec![
            Span::styled(if selected { "▶ " } else { "  " }, Style::default().fg(Color::Magenta)),
            Span::styled(label, Style::default().fg(color).add_modifier(Modifier::BOLD)),
        ];
        if speaking == Some(i) {
            label_spans.push(Span::styled(" 🔊", Style::default().fg(Color::Magenta)));
        }
        push(&mut lines, Line::from(label_spans), &mut total_rows);

        let pending = loading && Some(i) == last_index && msg.role == Role::Model && msg.content == PLACEHOLDER;
        if pending {
            // Animated ellipsis: cycles through ".", "..", "..."
            let dots = ".".repeat((app.animation_frame as usize) + 1);
            push(
                &mut lines,
                Line::from(Span::styled(
                    format!("Đang suy nghĩ{}", dots),
                    Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
                )),
                &mut total_rows,
            );
        } else {
            for line in msg.content.lines() {
                let parsed = match msg.role {
                    Role::User => Line::from(line.to_string()),
                    Role::Model => parse_markdown_line(line),
                };
                push(&mut lines, parsed, &mut total_rows);
            }
        }
        push(&mut lines, Line::default(), &mut total_rows);
    }

    let max_scroll = total_rows.saturating_sub(app.chat_height);
    if app.follow_bottom {
        app.chat_scroll = max_scroll;
    } else if app.reveal_selected {
        if let Some(offset) = app.selected_message.and_then(|i| offsets.get(i)) {
            let visible = app.chat_scroll..app.chat_scroll.saturating_add(app.chat_height);
            if !visible.contains(offset) {
                app.chat_scroll = *offset;
            }
        }
        app.reveal_selected = false;
    }
    app.chat_scroll = app.chat_scroll.min(max_scroll);
    if app.chat_scroll == max_scroll {
        app.follow_bottom = app.selected_message.is_none();
    }

    let chat = Paragraph::new(Text::from(lines))
        .block(chat_block)
        .wrap(Wrap { trim: false })
        .scroll((app.chat_scroll, 0));
    frame.render_widget(chat, area);

    if max_scroll > 0 {
        let mut scrollbar_state = ScrollbarState::new(max_scroll as usize)
            .position(app.chat_scroll as usize);
        frame.render_stateful_widget(
            Scrollbar::new(ScrollbarOrientation::VerticalRight),
            area,
            &mut scrollbar_state,
        );
    }
}

fn render_topics(app: &App, frame: &mut Frame, area: Rect) {
    let enabled = app.controller.can_submit();
    let key_style = if enabled {
        Style::default().bg(Color::DarkGray).fg(Color::White)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    let label_style = Style::default().fg(if enabled { Color::Gray } else { Color::DarkGray });

    let mut spans = vec![Span::styled(" Gợi ý: ", label_style)];
    for (i, topic) in SUGGESTED_TOPICS.iter().enumerate() {
        spans.push(Span::styled(format!(" F{} ", i + 1), key_style));
        spans.push(Span::styled(format!(" {} ", topic), label_style));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let editing = app.input_mode == InputMode::Editing;
    let enabled = app.controller.has_session();

    let title = if !enabled {
        " Trò chuyện bị tắt "
    } else if app.controller.is_loading() {
        " Đang chờ trả lời... "
    } else {
        " Tin nhắn (Enter gửi, Alt+Enter xuống dòng) "
    };

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if editing && enabled {
            Color::Yellow
        } else {
            Color::DarkGray
        }))
        .title(title);

    let inner_width = area.width.saturating_sub(2) as usize;
    let (cursor_row, cursor_col) = cursor_position(&app.input, app.input_cursor, inner_width);

    // Keep the cursor row visible once the box stops growing
    let visible_rows = MAX_INPUT_ROWS as usize;
    let first_row = (cursor_row + 1).saturating_sub(visible_rows);

    let rows: Vec<Line> = wrap_input(&app.input, inner_width)
        .into_iter()
        .skip(first_row)
        .take(visible_rows)
        .map(Line::from)
        .collect();

    let input = Paragraph::new(Text::from(rows))
        .style(Style::default().fg(if enabled { Color::White } else { Color::DarkGray }))
        .block(input_block);
    frame.render_widget(input, area);

    // Show cursor when editing
    if editing && enabled {
        frame.set_cursor_position((
            area.x + 1 + cursor_col as u16,
            area.y + 1 + (cursor_row - first_row) as u16,
        ));
    }
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let mode_style = match app.input_mode {
        InputMode::Normal => Style::default().bg(Color::Blue).fg(Color::White),
        InputMode::Editing => Style::default().bg(Color::Yellow).fg(Color::Black),
    };

    let mode_text = match app.input_mode {
        InputMode::Normal => " XEM ",
        InputMode::Editing => " NHẬP ",
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let read_label = if app.controller.speaking().is_some() {
        " dừng đọc "
    } else {
        " đọc "
    };

    let hints = match app.input_mode {
        InputMode::Normal => vec![
            Span::styled(" j/k ", key_style),
            Span::styled(" chọn ", label_style),
            Span::styled(" r ", key_style),
            Span::styled(read_label, label_style),
            Span::styled(" t ", key_style),
            Span::styled(" gợi ý ", label_style),
            Span::styled(" i ", key_style),
            Span::styled(" nhập ", label_style),
            Span::styled(" q ", key_style),
            Span::styled(" thoát ", label_style),
        ],
        InputMode::Editing => vec![
            Span::styled(" Enter ", key_style),
            Span::styled(" gửi ", label_style),
            Span::styled(" F1-F4 ", key_style),
            Span::styled(" gợi ý ", label_style),
            Span::styled(" Esc ", key_style),
            Span::styled(" xem ", label_style),
        ],
    };

    let footer_content = Line::from(
        vec![
            Span::styled(mode_text, mode_style),
            Span::styled(" ", label_style),
        ]
        .into_iter()
        .chain(hints)
        .collect::<Vec<_>>(),
    );

    let footer = Paragraph::new(footer_content).style(Style::default().bg(Color::Black));
    frame.render_widget(footer, area);
}

fn render_topic_picker(app: &mut App, frame: &mut Frame, area: Rect) {
    // Calculate popup size and position (centered)
    let popup_width = 46.min(area.width.saturating_sub(4));
    let popup_height = (SUGGESTED_TOPICS.len() as u16 + 2).min(area.height.saturating_sub(4));

    let popup_x = (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = (area.height.saturating_sub(popup_height)) / 2;

    let popup_area = Rect::new(popup_x, popup_y, popup_width, popup_height);

    // Clear the area behind the popup
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" Chủ đề gợi ý (Enter gửi, Esc đóng) ");

    let items: Vec<ListItem> = SUGGESTED_TOPICS
        .iter()
        .map(|topic| ListItem::new(format!(" {} ", topic)))
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, popup_area, &mut app.topic_state);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_markdown_line_bold() {
        let line = parse_markdown_line("a **b** c");
        assert_eq!(line.spans.len(), 3);
        assert_eq!(line.spans[1].content, "b");
        assert!(line.spans[1].style.add_modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn test_parse_markdown_line_unclosed_bold_is_literal() {
        let line = parse_markdown_line("a **b");
        assert_eq!(line.spans.len(), 1);
        assert_eq!(line.spans[0].content, "a **b");
    }

    #[test]
    fn test_parse_markdown_heading() {
        let line = parse_markdown_line("## Tổng quan");
        assert_eq!(line.spans[0].content, "Tổng quan");
    }

    #[test]
    fn test_wrapped_rows() {
        assert_eq!(wrapped_rows(&Line::default(), 10), 1);
        assert_eq!(wrapped_rows(&Line::from("abcdefghij"), 10), 1);
        assert_eq!(wrapped_rows(&Line::from("abcdefghijk"), 10), 2);
    }
}
