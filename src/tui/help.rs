use ratatui::{
    layout::Rect,
    style::Color,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

fn key_line(key: &'static str, pad: &'static str, desc: &'static str) -> Line<'static> {
    Line::from(vec![
        Span::raw("  "),
        Span::styled(key, Style::default().fg(Color::Magenta)),
        Span::raw(pad),
        Span::raw(desc),
    ])
}

pub fn draw_help(area: Rect, f: &mut Frame) {
    let p = Paragraph::new(vec![
        Line::from("Keybinds:"),
        Line::from(vec![
            Span::raw("  "),
            Span::styled("q", Style::default().fg(Color::Magenta)),
            Span::raw(" / "),
            Span::styled("Ctrl-C", Style::default().fg(Color::Magenta)),
            Span::raw("  Quit"),
        ]),
        key_line("t", "           ", "Download the data template"),
        key_line("l", "           ", "Load a wine data spreadsheet (.xlsx)"),
        key_line("r", "           ", "Run the model against the loaded data"),
        key_line("c", "           ", "Cancel the running simulation"),
        key_line("x", "           ", "Clear the session (dataset and results)"),
        key_line("f", "           ", "Re-fetch the template and indicator image"),
        key_line("?", "           ", "Toggle this help"),
        Line::from(""),
        Line::from("Results log:"),
        key_line("↑/↓", "         ", "Scroll one line"),
        key_line("PgUp/PgDn", "   ", "Scroll ten lines"),
        key_line("Home/End", "    ", "Jump to start / follow the latest run"),
        Line::from(""),
        Line::from("Workflow:"),
        Line::from("  1. Download the template and fill in your wine data."),
        Line::from("  2. Load the filled-in spreadsheet."),
        Line::from("  3. Run the model; each run appends a transcript on the right."),
        Line::from(""),
        Line::from("Model repository:"),
        Line::from(vec![
            Span::raw("  "),
            Span::styled(
                "https://github.com/GOUFANG2021/CalTarPrecip",
                Style::default().fg(Color::Cyan),
            ),
        ]),
    ])
    .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(p, area);
}
