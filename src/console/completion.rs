//! Command-name completion backed by the server's own `help` output.
//!
//! The `help` response lists one command per line in the form
//! `| request.push <uri>`; completion extracts the first token after the
//! bar and offers the names matching what has been typed so far.

/// Local shell commands offered alongside the server's.
const LOCAL_COMMANDS: &[&str] = &["exit", "help", "quit"];

/// Extract command names from a `help` response.
fn help_names(help_text: &str) -> Vec<String> {
    help_text
        .lines()
        .filter_map(|line| {
            let rest = line.strip_prefix("| ")?;
            rest.split_whitespace().next().map(str::to_string)
        })
        .collect()
}

/// Candidate completions for `prefix`: server command names plus the local
/// ones, sorted and deduplicated.
pub(crate) fn candidates(help_text: &str, prefix: &str) -> Vec<String> {
    let mut names: Vec<String> = help_names(help_text)
        .into_iter()
        .chain(LOCAL_COMMANDS.iter().map(|name| name.to_string()))
        .filter(|name| name.starts_with(prefix))
        .collect();
    names.sort();
    names.dedup();
    names
}
