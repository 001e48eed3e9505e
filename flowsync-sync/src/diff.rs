//! Line diff engine and the bordered diff table shown before confirmations.
//!
//! [`generate`] builds a minimal edit script from a longest-common-subsequence
//! table and trims it to the requested context; [`format`] renders it.
//!
//! ```text
//! diff greet.nsl (@@ -2 +2 @@)
//! +---+----------------------+
//! | 1 |   hello              |
//! | 2 | + new                |
//! | 2 | - old                |
//! +---+----------------------+
//! ```
//!
//! The table layout is a compatibility surface: confirmation prompts and
//! divergence warnings print it verbatim.

use colored::Colorize;

/// Inputs with a NUL byte within this many leading bytes are treated as binary.
pub const BINARY_SNIFF_LEN: usize = 200;

/// Context used for confirmation prompts.
pub const PROMPT_CONTEXT: i32 = 3;

/// Context used for divergence warnings.
pub const SUMMARY_CONTEXT: i32 = 1;

/// Pass as `context_lines` to get the whole script.
pub const FULL_CONTEXT: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffKind {
    Context,
    Add,
    Del,
}

/// One row of an edit script.
///
/// Line numbers are 1-based. For `Add` the local number is the local line the
/// insertion precedes; for `Del` the remote number is the remote line the
/// deletion precedes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffLine {
    pub kind: DiffKind,
    pub text: String,
    pub local_line_no: usize,
    pub remote_line_no: usize,
}

/// Compute the edit script turning `local` into `remote`.
///
/// Returns an empty script when either side looks binary or when the two
/// sides have no line differences. `context_lines < 0` keeps every line;
/// otherwise only lines within `context_lines` of a change survive.
pub fn generate(local: &[u8], remote: &[u8], context_lines: i32) -> Vec<DiffLine> {
    if looks_binary(local) || looks_binary(remote) {
        return Vec::new();
    }

    let local_lines = split_lines(local);
    let remote_lines = split_lines(remote);
    let script = edit_script(&local_lines, &remote_lines);

    if script.iter().all(|line| line.kind == DiffKind::Context) {
        return Vec::new();
    }
    if context_lines < 0 {
        return script;
    }
    keep_context(script, context_lines as usize)
}

fn looks_binary(content: &[u8]) -> bool {
    content.iter().take(BINARY_SNIFF_LEN).any(|b| *b == 0)
}

fn split_lines(content: &[u8]) -> Vec<String> {
    let text = String::from_utf8_lossy(content).replace("\r\n", "\n");
    if text.is_empty() {
        return Vec::new();
    }
    let mut lines: Vec<String> = text.split('\n').map(str::to_owned).collect();
    if text.ends_with('\n') {
        lines.pop();
    }
    lines
}

fn edit_script(local: &[String], remote: &[String]) -> Vec<DiffLine> {
    let (n, m) = (local.len(), remote.len());

    // lcs[i][j] = LCS length of local[i..] and remote[j..]
    let mut lcs = vec![vec![0u32; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i][j] = if local[i] == remote[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let line = |kind, text: &str, i: usize, j: usize| DiffLine {
        kind,
        text: text.to_owned(),
        local_line_no: i + 1,
        remote_line_no: j + 1,
    };

    let mut script = Vec::with_capacity(n + m);
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if local[i] == remote[j] {
            script.push(line(DiffKind::Context, &local[i], i, j));
            i += 1;
            j += 1;
        } else if lcs[i][j + 1] >= lcs[i + 1][j] {
            // Ties consume the remote side first: adds precede deletes.
            script.push(line(DiffKind::Add, &remote[j], i, j));
            j += 1;
        } else {
            script.push(line(DiffKind::Del, &local[i], i, j));
            i += 1;
        }
    }
    while i < n {
        script.push(line(DiffKind::Del, &local[i], i, j));
        i += 1;
    }
    while j < m {
        script.push(line(DiffKind::Add, &remote[j], i, j));
        j += 1;
    }
    script
}

fn keep_context(script: Vec<DiffLine>, context: usize) -> Vec<DiffLine> {
    let last = script.len() - 1;
    let mut keep = vec![false; script.len()];
    for (idx, line) in script.iter().enumerate() {
        if line.kind == DiffKind::Context {
            continue;
        }
        let lo = idx.saturating_sub(context);
        let hi = (idx + context).min(last);
        keep[lo..=hi].iter_mut().for_each(|k| *k = true);
    }
    script
        .into_iter()
        .zip(keep)
        .filter_map(|(line, keep)| keep.then_some(line))
        .collect()
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Render `lines` as a bordered table, colored when the terminal allows it.
///
/// Returns an empty string for an empty script.
pub fn format(path: &str, lines: &[DiffLine]) -> String {
    render(
        path,
        lines,
        colored::control::SHOULD_COLORIZE.should_colorize(),
    )
}

/// [`format`] with explicit color control.
pub fn render(path: &str, lines: &[DiffLine], color: bool) -> String {
    let Some(first_change) = lines.iter().find(|l| l.kind != DiffKind::Context) else {
        if lines.is_empty() {
            return String::new();
        }
        return render_rows(&format!("diff {path}"), lines, color);
    };
    let header = format!(
        "diff {path} (@@ -{} +{} @@)",
        first_change.local_line_no, first_change.remote_line_no
    );
    render_rows(&header, lines, color)
}

fn render_rows(header: &str, lines: &[DiffLine], color: bool) -> String {
    let mut rows: Vec<(String, String)> = Vec::with_capacity(lines.len());
    let mut expected: Option<(usize, usize)> = None;
    for line in lines {
        if let Some(next) = expected {
            if next != (line.local_line_no, line.remote_line_no) {
                rows.push((String::new(), "...".to_string()));
            }
        }
        let (number, marker, next) = match line.kind {
            DiffKind::Context => (
                line.local_line_no,
                ' ',
                (line.local_line_no + 1, line.remote_line_no + 1),
            ),
            DiffKind::Del => (
                line.local_line_no,
                '-',
                (line.local_line_no + 1, line.remote_line_no),
            ),
            DiffKind::Add => (
                line.remote_line_no,
                '+',
                (line.local_line_no, line.remote_line_no + 1),
            ),
        };
        expected = Some(next);

        let cell = format!("{marker} {}", line.text);
        let cell = match (color, line.kind) {
            (true, DiffKind::Del) => cell.red().to_string(),
            (true, DiffKind::Add) => cell.green().to_string(),
            _ => cell,
        };
        rows.push((number.to_string(), cell));
    }

    let num_w = rows.iter().map(|(n, _)| visible_width(n)).max().unwrap_or(0);
    let mut text_w = rows.iter().map(|(_, t)| visible_width(t)).max().unwrap_or(0);
    // | num | text |  =>  num_w + text_w + 7 columns
    let table_w = num_w + text_w + 7;
    let header_w = visible_width(header);
    if header_w > table_w {
        text_w += header_w - table_w;
    }

    let border = format!("+{}+{}+", "-".repeat(num_w + 2), "-".repeat(text_w + 2));
    let mut out = String::new();
    out.push_str(header);
    out.push('\n');
    out.push_str(&border);
    out.push('\n');
    for (number, text) in &rows {
        let pad = text_w - visible_width(text);
        out.push_str(&format!(
            "| {number:>num_w$} | {text}{} |\n",
            " ".repeat(pad)
        ));
    }
    out.push_str(&border);
    out.push('\n');
    out
}

/// Number of characters a terminal displays for `s`, ignoring ANSI CSI
/// escape sequences.
pub fn visible_width(s: &str) -> usize {
    let mut width = 0;
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\x1b' && chars.peek() == Some(&'[') {
            chars.next();
            for c in chars.by_ref() {
                if ('@'..='~').contains(&c) {
                    break;
                }
            }
            continue;
        }
        width += 1;
    }
    width
}
