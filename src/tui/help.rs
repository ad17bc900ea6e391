use ratatui::{
    layout::Rect,
    style::Color,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

const KEYS: &[(&str, &str)] = &[
    ("s", "Weighing trial"),
    ("l", "Load-cell capture"),
    ("d", "Dispense"),
    ("t", "Cycle trial mode (raw / median / filtered)"),
    ("[ / ]", "Lower / raise the low-pass cutoff"),
    ("e", "Enable motor"),
    ("x", "Disable motor"),
    ("m", "Move motor"),
    ("i", "Apply sample interval"),
    ("c", "Connect scale"),
    ("r", "Release scale"),
    ("a", "Add calibration trial at the calibration weight"),
    ("- / +", "Lower / raise the calibration weight"),
    ("k", "Calibrate from recorded trials"),
    ("g", "Load stored coefficients"),
    ("p", "Show scale and coefficient status"),
    ("tab", "Switch tabs"),
    ("?", "Show this help"),
];

pub fn draw_help(area: Rect, f: &mut Frame) {
    let mut lines = vec![
        Line::from("Keybinds:"),
        Line::from(vec![
            Span::raw("  "),
            Span::styled("q", Style::default().fg(Color::Magenta)),
            Span::raw(" / "),
            Span::styled("Ctrl-C", Style::default().fg(Color::Magenta)),
            Span::raw("  Quit"),
        ]),
    ];
    lines.extend(KEYS.iter().map(|(key, what)| {
        Line::from(vec![
            Span::raw("  "),
            Span::styled(format!("{key:<12}"), Style::default().fg(Color::Magenta)),
            Span::raw(*what),
        ])
    }));
    lines.push(Line::from(""));
    lines.push(Line::from(
        "Only one operation runs at a time; keys pressed meanwhile are rejected.",
    ));
    lines.push(Line::from(
        "The progress bar is an estimate and completes when the instrument answers.",
    ));

    let p = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(p, area);
}
