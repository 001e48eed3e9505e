//! Terminal confirmer: prints the diff table and reads `y`/`n`/`a`.

use std::io::{self, BufRead, IsTerminal, Write};

use colored::Colorize;

use flowsync_sync::{diff, Confirmer, Decision, ProposedChange, ProposedDeletion};

pub struct TerminalConfirmer {
    interactive: bool,
}

impl TerminalConfirmer {
    /// Interactive only when stdin is a terminal; otherwise every prompt
    /// is declined with a warning, and `--force` is the way through.
    pub fn new() -> Self {
        Self {
            interactive: io::stdin().is_terminal(),
        }
    }

    fn ask(&self, path: &str, question: &str) -> Decision {
        if !self.interactive {
            tracing::warn!(path, "no terminal to confirm on; declined (use --force)");
            return Decision::Decline;
        }
        let stdin = io::stdin();
        let mut stderr = io::stderr();
        loop {
            let _ = write!(stderr, "{question} {} ", "[y]es / [n]o / [a]ll:".bold());
            let _ = stderr.flush();
            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                Ok(0) | Err(_) => return Decision::Decline,
                Ok(_) => {}
            }
            match parse_answer(&line) {
                Some(decision) => return decision,
                None => {
                    let _ = writeln!(stderr, "please answer y, n or a");
                }
            }
        }
    }
}

impl Confirmer for TerminalConfirmer {
    fn confirm_change(&self, change: &ProposedChange) -> Decision {
        if self.interactive {
            eprint!("{}", diff::format(&change.path, &change.lines));
        }
        self.ask(
            &change.path,
            &format!("Apply change to {} ({})?", change.path.cyan(), change.context),
        )
    }

    fn confirm_delete(&self, deletion: &ProposedDeletion) -> Decision {
        self.ask(
            &deletion.path,
            &format!(
                "{} remote skill '{}' ({}) because {} is gone?",
                "Delete".red().bold(),
                deletion.skill_idn,
                deletion.skill_id,
                deletion.path.cyan()
            ),
        )
    }
}

/// Parse one answer line. An empty line declines.
fn parse_answer(line: &str) -> Option<Decision> {
    match line.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Some(Decision::ApplyOnce),
        "n" | "no" | "" => Some(Decision::Decline),
        "a" | "all" => Some(Decision::ApplyAll),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answers_parse() {
        assert_eq!(parse_answer("y\n"), Some(Decision::ApplyOnce));
        assert_eq!(parse_answer("YES"), Some(Decision::ApplyOnce));
        assert_eq!(parse_answer(" a "), Some(Decision::ApplyAll));
        assert_eq!(parse_answer("n"), Some(Decision::Decline));
        assert_eq!(parse_answer("\n"), Some(Decision::Decline));
        assert_eq!(parse_answer("maybe"), None);
    }

    #[test]
    fn non_interactive_declines_everything() {
        let confirmer = TerminalConfirmer { interactive: false };
        let deletion = ProposedDeletion {
            path: "projects/acme/p/a/f/greet.nsl".to_string(),
            skill_idn: "greet".to_string(),
            skill_id: "s-1".to_string(),
            context: "push p/a/f".to_string(),
        };
        assert_eq!(confirmer.confirm_delete(&deletion), Decision::Decline);
    }
}
