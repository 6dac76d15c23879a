//! Terminal dashboard widgets using ratatui.

use crate::history::MetricPoint;
use crate::inventory::MachineInfo;
use num_format::{Locale, ToFormattedString};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Sparkline},
    Frame,
};

/// Get the last N elements from a slice to fit the graph width
/// The sparkline uses 1 char per data point, so we use area.width - 2 (for borders)
fn slice_for_width(data: &[u64], area: Rect) -> &[u64] {
    let graph_width = area.width.saturating_sub(2) as usize;
    if data.len() <= graph_width {
        data
    } else {
        &data[data.len() - graph_width..]
    }
}

/// Format bytes to human readable string
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    const TB: u64 = GB * 1024;

    if bytes >= TB {
        format!("{:.2} TB", bytes as f64 / TB as f64)
    } else if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Whole megabytes with thousands separators, e.g. `16,384 MB`
pub fn format_megabytes(bytes: u64) -> String {
    format!("{} MB", (bytes / (1024 * 1024)).to_formatted_string(&Locale::en))
}

/// Sparkline bars for percentage points. Non-finite or negative values
/// draw as empty bars.
pub fn sparkline_data(points: &[MetricPoint]) -> Vec<u64> {
    points
        .iter()
        .map(|p| if p.value.is_finite() && p.value > 0.0 { p.value.round() as u64 } else { 0 })
        .collect()
}

/// Get color based on percentage value
fn percentage_color(value: f64, warn_threshold: f64, crit_threshold: f64) -> Color {
    if value >= crit_threshold {
        Color::Red
    } else if value >= warn_threshold {
        Color::Yellow
    } else {
        Color::Green
    }
}

/// One metric panel: latest value with a bar, then the history sparkline
pub fn render_usage(f: &mut Frame, area: Rect, title: &str, accent: Color, points: &[MetricPoint]) {
    let block = Block::default()
        .title(format!(" {} ", title))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(accent));

    let inner = block.inner(area);
    f.render_widget(block, area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // Current value
            Constraint::Min(3),    // Sparkline
        ])
        .split(inner);

    let Some(latest) = points.last() else {
        f.render_widget(
            Paragraph::new(Span::styled("Waiting for first sample...", Style::default().fg(Color::DarkGray))),
            chunks[0],
        );
        return;
    };

    let pct = if latest.value.is_finite() { latest.value.clamp(0.0, 100.0) } else { 0.0 };
    // "Now: " (5) + "XXX.X%" (6) + " [" (2) + "]" (1) = 14 chars of fixed text
    let bar_width = (chunks[0].width as usize).saturating_sub(14).min(40);
    let filled = ((pct / 100.0) * bar_width as f64) as usize;
    let empty = bar_width.saturating_sub(filled);
    let color = percentage_color(pct, 70.0, 90.0);

    let current = Line::from(vec![
        Span::raw("Now: "),
        Span::styled(
            format!("{:>5.1}%", latest.value),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        ),
        Span::raw(" ["),
        Span::styled("█".repeat(filled), Style::default().fg(color)),
        Span::styled("░".repeat(empty), Style::default().fg(Color::DarkGray)),
        Span::raw("]"),
    ]);
    f.render_widget(Paragraph::new(current), chunks[0]);

    let bars = sparkline_data(points);
    let data = slice_for_width(&bars, chunks[1]);
    let max_val = data.iter().max().copied().unwrap_or(100).max(100);
    let sparkline = Sparkline::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::DarkGray))
                .title(format!(
                    " last {} samples, since {} ",
                    points.len(),
                    points[0].timestamp.with_timezone(&chrono::Local).format("%H:%M:%S")
                )),
        )
        .data(data)
        .max(max_val)
        .style(Style::default().fg(accent));
    f.render_widget(sparkline, chunks[1]);
}

fn field<'a>(label: &'a str, value: String) -> Line<'a> {
    Line::from(vec![
        Span::styled(format!("{:<10}", label), Style::default().fg(Color::DarkGray)),
        Span::raw(value),
    ])
}

/// Static hardware inventory panel
pub fn render_inventory(f: &mut Frame, area: Rect, info: &MachineInfo) {
    let block = Block::default()
        .title(" System ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Green));

    let mut lines = vec![
        field("Host", format!("{} ({})", info.hostname, info.os)),
        field("Kernel", info.kernel.clone()),
        field(
            "CPU",
            format!(
                "{} | {} cores / {} threads @ {:.2} GHz",
                info.cpu.model,
                info.cpu.cores,
                info.cpu.threads,
                info.cpu.frequency_mhz / 1000.0
            ),
        ),
        field("Memory", format_megabytes(info.memory_total_bytes)),
        field(
            "BIOS",
            format!("{} {} ({})", info.bios.vendor, info.bios.version, info.bios.release_date),
        ),
        field("Serials", format!("board {} / system {}", info.board_serial, info.product_serial)),
    ];

    for module in &info.memory_modules {
        lines.push(field(
            "DIMM",
            format!(
                "{} {} {} (S/N {})",
                module.slot,
                format_megabytes(module.size_bytes),
                module.vendor,
                module.serial
            ),
        ));
    }
    for disk in &info.disks {
        lines.push(field(
            "Disk",
            format!(
                "{} on {} ({}) {}",
                disk.name,
                disk.mount_point.display(),
                disk.file_system,
                format_bytes(disk.size_bytes)
            ),
        ));
    }
    for dev in &info.usb {
        lines.push(field(
            "USB",
            format!("{} {} {} (S/N {})", dev.id, dev.vendor, dev.product, dev.serial),
        ));
    }

    f.render_widget(Paragraph::new(lines).block(block), area);
}

/// Render help bar at bottom of screen
pub fn render_help_bar(f: &mut Frame, area: Rect, status: Option<&str>) {
    let (text, style) = if let Some(msg) = status {
        (
            format!(" {} ", msg),
            Style::default().fg(Color::White).bg(Color::Blue),
        )
    } else {
        (
            " q: Quit | c: Export CSV | j: Export JSON | g: Charts | i: Toggle inventory ".to_string(),
            Style::default().fg(Color::Black).bg(Color::Gray),
        )
    };

    f.render_widget(Paragraph::new(text).style(style), area);
}
