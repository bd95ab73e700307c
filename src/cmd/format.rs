/*!
format.rs

Terminal formatting helpers for `mssh` human output (help listing, per-command
parameter tables, remote execution banners).

  - Color is ON by default; `NO_COLOR` disables it.
  - Width is best-effort: env COLUMNS -> parse -> clamp (40..=220) else 100.
  - Helpers return strings; callers decide where to print.

Public API Summary:
  - StyleOptions::detect() / StyleOptions::plain()
  - color(role, text, &StyleOptions) -> String
  - table(headers, rows, TableOpts, &StyleOptions) -> String
*/

use std::borrow::Cow;

/* -------------------------------------------------------------------------- */
/* Style Options                                                              */
/* -------------------------------------------------------------------------- */

#[derive(Debug, Clone)]
pub struct StyleOptions {
    pub use_color: bool,
    pub term_width: usize,
}

impl Default for StyleOptions {
    fn default() -> Self {
        Self::detect()
    }
}

impl StyleOptions {
    pub fn detect() -> Self {
        let width = std::env::var("COLUMNS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .map(|w| w.clamp(40, 220))
            .unwrap_or(100);

        StyleOptions {
            use_color: std::env::var_os("NO_COLOR").is_none(),
            term_width: width,
        }
    }

    /// No color, fixed width. Used for tests and non-tty output.
    pub fn plain() -> Self {
        StyleOptions {
            use_color: false,
            term_width: 100,
        }
    }
}

/* -------------------------------------------------------------------------- */
/* Color                                                                      */
/* -------------------------------------------------------------------------- */

#[derive(Debug, Clone, Copy)]
pub enum Role {
    Primary,
    Accent,
    Success,
    Dim,
    Bold,
}

pub fn color(role: Role, text: impl AsRef<str>, style: &StyleOptions) -> String {
    if !style.use_color {
        return text.as_ref().to_string();
    }
    let code = match role {
        Role::Primary => "36",
        Role::Accent => "33",
        Role::Success => "32",
        Role::Dim => "2",
        Role::Bold => "1",
    };
    format!("\x1b[{code}m{}\x1b[0m", text.as_ref())
}

/* -------------------------------------------------------------------------- */
/* Table Rendering                                                            */
/* -------------------------------------------------------------------------- */

#[derive(Debug, Clone)]
pub struct TableOpts {
    pub indent: usize,
    pub truncate: bool,
    pub header_sep: bool,
    pub min_col_width: usize,
}

impl Default for TableOpts {
    fn default() -> Self {
        Self {
            indent: 0,
            truncate: true,
            header_sep: true,
            min_col_width: 4,
        }
    }
}

pub fn table(
    headers: &[&str],
    rows: &[Vec<String>],
    opts: TableOpts,
    style: &StyleOptions,
) -> String {
    if headers.is_empty() {
        return String::new();
    }
    let col_count = headers.len();
    let width_limit = style.term_width.saturating_sub(opts.indent);

    let mut widths: Vec<usize> = headers.iter().map(|h| display_width(h)).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate().take(col_count) {
            widths[i] = widths[i].max(display_width(cell));
        }
    }

    // Shrink the widest columns first until the row fits.
    let total_raw: usize = widths.iter().sum::<usize>() + (col_count - 1) * 2;
    if total_raw > width_limit {
        let mut overflow = total_raw - width_limit;
        let mut ordered: Vec<(usize, usize)> = widths.iter().copied().enumerate().collect();
        ordered.sort_by(|a, b| b.1.cmp(&a.1));
        for (idx, _) in ordered {
            if overflow == 0 {
                break;
            }
            if widths[idx] > opts.min_col_width {
                let shrink = (widths[idx] - opts.min_col_width).min(overflow);
                widths[idx] -= shrink;
                overflow -= shrink;
            }
        }
    }

    let indent = " ".repeat(opts.indent);
    let mut lines = Vec::with_capacity(rows.len() + 2);

    let header = headers
        .iter()
        .enumerate()
        .map(|(i, h)| color(Role::Accent, pad_or_truncate(h, widths[i], opts.truncate), style))
        .collect::<Vec<_>>()
        .join("  ");
    lines.push(format!("{indent}{}", header.trim_end()));

    if opts.header_sep {
        let sep = widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("  ");
        lines.push(format!("{indent}{}", color(Role::Dim, sep, style)));
    }

    for row in rows {
        let line = (0..col_count)
            .map(|c| {
                let raw = row.get(c).map(|s| s.as_str()).unwrap_or("");
                pad_or_truncate(raw, widths[c], opts.truncate)
            })
            .collect::<Vec<_>>()
            .join("  ");
        lines.push(format!("{indent}{}", line.trim_end()));
    }

    lines.join("\n")
}

fn pad_or_truncate(s: &str, width: usize, truncate: bool) -> String {
    let len = display_width(s);
    if len <= width {
        return format!("{s}{}", " ".repeat(width - len));
    }
    if !truncate {
        return s.to_string();
    }
    if width <= 1 {
        return "…".to_string();
    }
    let mut out: String = strip_ansi(s).chars().take(width - 1).collect();
    out.push('…');
    out
}

/* -------------------------------------------------------------------------- */
/* ANSI / Width Utilities                                                     */
/* -------------------------------------------------------------------------- */

fn strip_ansi(s: &str) -> Cow<'_, str> {
    // Minimal scan for ESC '[' ... <letter>
    if !s.contains('\x1b') {
        return Cow::Borrowed(s);
    }
    let mut buf = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\x1b' && chars.peek() == Some(&'[') {
            chars.next();
            for end in chars.by_ref() {
                if end.is_ascii_alphabetic() {
                    break;
                }
            }
            continue;
        }
        buf.push(c);
    }
    Cow::Owned(buf)
}

fn display_width(s: &str) -> usize {
    strip_ansi(s).chars().count()
}

/* -------------------------------------------------------------------------- */
/* Tests                                                                      */
/* -------------------------------------------------------------------------- */
