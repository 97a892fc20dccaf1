//! Terminal prompts: base/profile selection, style pattern choice and the
//! console retry approver.

use std::fmt::Display;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use indicatif::MultiProgress;
use reelsmith_core::decision::interpret_answer;
use reelsmith_core::selection::parse_selection;
use reelsmith_pipeline::ApprovalRequest;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Marker a style file name must contain.
const PATTERN_MARKER: &str = "_PATTERN";

/// Ask the operator to pick items from a numbered list.
///
/// Blank input selects nothing. Invalid answers are re-asked.
pub fn select<T, R, W>(title: &str, items: &[T], input: &mut R, out: &mut W) -> anyhow::Result<Vec<T>>
where
    T: Display + Clone,
    R: BufRead,
    W: Write,
{
    if items.is_empty() {
        return Ok(Vec::new());
    }
    writeln!(out, "{title}")?;
    for (index, item) in items.iter().enumerate() {
        writeln!(out, "  {:>2}. {item}", index + 1)?;
    }

    loop {
        write!(out, "Select (numbers, 'all', blank to cancel): ")?;
        out.flush()?;
        let Some(line) = read_line(input)? else {
            return Ok(Vec::new());
        };
        match parse_selection(&line).and_then(|selection| selection.resolve(items)) {
            Ok(chosen) => return Ok(chosen),
            Err(e) => writeln!(out, "{e}")?,
        }
    }
}

/// Style files in `dir`, sorted by name.
pub fn list_patterns(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).with_context(|| format!("reading {}", dir.display())),
    };
    let mut patterns: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension().is_some_and(|ext| ext == "txt")
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.contains(PATTERN_MARKER))
        })
        .collect();
    patterns.sort();
    Ok(patterns)
}

/// Pick one style file. Blank input takes the first one.
pub fn choose_pattern<R: BufRead, W: Write>(
    patterns: &[PathBuf],
    input: &mut R,
    out: &mut W,
) -> anyhow::Result<Option<PathBuf>> {
    if patterns.is_empty() {
        return Ok(None);
    }
    writeln!(out, "Style patterns:")?;
    for (index, path) in patterns.iter().enumerate() {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("?");
        writeln!(out, "  {:>2}. {name}", index + 1)?;
    }

    loop {
        write!(out, "Pattern [1]: ")?;
        out.flush()?;
        let line = read_line(input)?.unwrap_or_default();
        let line = line.trim();
        if line.is_empty() {
            return Ok(patterns.first().cloned());
        }
        match line.parse::<usize>() {
            Ok(n) if (1..=patterns.len()).contains(&n) => return Ok(Some(patterns[n - 1].clone())),
            _ => writeln!(out, "Choose a number between 1 and {}", patterns.len())?,
        }
    }
}

/// `None` at end of input.
fn read_line<R: BufRead>(input: &mut R) -> anyhow::Result<Option<String>> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

// ---------------------------------------------------------------------------
// Console approver
// ---------------------------------------------------------------------------

/// The question shown for one approval request.
pub fn approval_question(request: &ApprovalRequest) -> String {
    let sample = request
        .failed
        .iter()
        .take(10)
        .map(|id| format!("{id:03}"))
        .collect::<Vec<_>>()
        .join(", ");
    let more = if request.failed.len() > 10 { ", ..." } else { "" };
    let hint = match request.previous {
        Some(previous) => format!("y/n, enter = {}", previous.as_token()),
        None => "y/n, enter = n".to_string(),
    };
    format!(
        "[{}] profile {}: {} scenes failed ({sample}{more}). Retry round {}? ({hint}) ",
        request.base,
        request.profile,
        request.failed.len(),
        request.round,
    )
}

/// Answer approval requests from standard input.
///
/// Stdin is read on its own thread, so a question the gate stops waiting
/// for (timeout) does not hold on to the operator's next line. A blank line
/// is passed on as no answer so the gate applies its default.
pub fn spawn_console_approver(
    requests: mpsc::Receiver<ApprovalRequest>,
    progress: MultiProgress,
) -> JoinHandle<()> {
    let lines = spawn_stdin_lines();
    tokio::spawn(answer_requests(requests, lines, move |question| {
        progress.suspend(|| {
            eprint!("{question}");
            let _ = std::io::stderr().flush();
        });
    }))
}

/// Pair each request with the next line typed after its question is shown.
///
/// Lines typed while no question is open are discarded. When the input
/// ends every later request gets no answer.
pub async fn answer_requests<F>(
    mut requests: mpsc::Receiver<ApprovalRequest>,
    mut lines: mpsc::UnboundedReceiver<String>,
    mut show: F,
) where
    F: FnMut(&str),
{
    while let Some(mut request) = requests.recv().await {
        while lines.try_recv().is_ok() {}
        show(&approval_question(&request));
        let (base, profile) = (request.base.clone(), request.profile.clone());

        let line = tokio::select! {
            line = lines.recv() => line,
            _ = request.abandoned() => {
                tracing::info!(base = %base, profile = %profile, "Approval question expired");
                show("\n");
                continue;
            }
        };

        let decision = match line {
            Some(line) if line.trim().is_empty() => None,
            Some(line) => Some(interpret_answer(&line, request.previous)),
            None => None,
        };
        request.respond(decision);
    }
}

/// Forward stdin lines until end of input or a read error.
fn spawn_stdin_lines() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Could not read approval answer");
                    break;
                }
            }
        }
    });
    rx
}
