//! Allow/deny rules for shell command lines.
//!
//! A command line may chain several programs (`a | b`, `a; b`, `a && b`, `$(b)`). The filter
//! extracts every program invoked and checks each one, so a denied program cannot hide behind an
//! allowed one.

use crate::error::TerminalError;

/// Programs rejected unless the deny list is replaced.
pub const DEFAULT_DENY_LIST: &[&str] = &[
    "rm", "rmdir", "dd", "mkfs", "format", "fdisk", "parted", "shutdown", "reboot", "halt",
    "poweroff", "init", "telinit",
];

/// Prefixes that run their first argument as a program.
const WRAPPERS: &[&str] = &[
    "sudo", "env", "nohup", "time", "exec", "command", "nice", "xargs", "timeout", "builtin",
];

/// Command allow/deny policy.
///
/// A non-empty allow list admits only the listed programs. Otherwise every program not on the
/// deny list is admitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFilter {
    allow_list: Vec<String>,
    deny_list: Vec<String>,
}

impl Default for CommandFilter {
    fn default() -> Self {
        Self::new(
            Vec::new(),
            DEFAULT_DENY_LIST.iter().map(|s| s.to_string()).collect(),
        )
    }
}

impl CommandFilter {
    /// Build a filter from explicit lists.
    pub fn new(allow_list: Vec<String>, deny_list: Vec<String>) -> Self {
        Self {
            allow_list,
            deny_list,
        }
    }

    /// Admit everything.
    pub fn allow_all() -> Self {
        Self::new(Vec::new(), Vec::new())
    }

    /// `true` if `program` may run on its own.
    pub fn is_allowed(&self, program: &str) -> bool {
        self.rejection_reason(program).is_none()
    }

    /// Check every program in a command line.
    pub fn check(&self, command: &str) -> Result<(), TerminalError> {
        let programs = programs_in(command);
        if programs.is_empty() {
            return Err(TerminalError::EmptyCommand);
        }
        for program in programs {
            if let Some(reason) = self.rejection_reason(&program) {
                return Err(TerminalError::CommandNotAllowed { program, reason });
            }
        }
        Ok(())
    }

    fn rejection_reason(&self, program: &str) -> Option<String> {
        if !self.allow_list.is_empty() {
            return (!self.allow_list.iter().any(|p| p == program))
                .then(|| "not in the allow list".to_string());
        }
        self.deny_list
            .iter()
            .any(|p| p == program)
            .then(|| "in the deny list".to_string())
    }
}

/// Program names invoked by a shell command line, in order of appearance.
pub fn programs_in(command: &str) -> Vec<String> {
    let mut programs = Vec::new();
    for segment in split_segments(command) {
        let words = split_words(&segment);
        let mut words = words
            .iter()
            .map(String::as_str)
            .skip_while(|word| is_assignment(word));

        let mut next = words.next();
        while let Some(word) = next {
            let name = basename(word);
            programs.push(name.to_string());
            if !WRAPPERS.contains(&name) {
                break;
            }
            // Wrapper flags and durations (`nice -n 5`, `timeout 5`) are not programs.
            next = words.find(|w| !w.starts_with('-') && !is_assignment(w) && !is_number(w));
        }
    }
    programs
}

fn split_segments(command: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut chars = command.chars().peekable();

    while let Some(ch) = chars.next() {
        match (quote, ch) {
            (Some(q), c) if c == q => {
                quote = None;
                current.push(c);
            }
            (Some(_), '\\') => {
                current.push(ch);
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            (Some(_), c) => current.push(c),
            (None, '\'' | '"') => {
                quote = Some(ch);
                current.push(ch);
            }
            (None, '\\') => {
                current.push(ch);
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            // Redirections such as `2>&1` and `&>file`.
            (None, '&') if current.ends_with(['>', '<']) || chars.peek() == Some(&'>') => {
                current.push(ch);
            }
            (None, '|' | ';' | '&' | '\n' | '(' | ')' | '`') => {
                segments.push(std::mem::take(&mut current));
            }
            (None, '$') if chars.peek() == Some(&'(') => {
                chars.next();
                segments.push(std::mem::take(&mut current));
            }
            (None, c) => current.push(c),
        }
    }
    segments.push(current);
    segments.retain(|s| !s.trim().is_empty());
    segments
}

fn split_words(segment: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut chars = segment.chars();

    while let Some(ch) = chars.next() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), c) => current.push(c),
            (None, '\'' | '"') => quote = Some(ch),
            (None, '\\') => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            (None, c) if c.is_whitespace() => {
                if !current.is_empty() {
                    words.push(std::mem::take(&mut current));
                }
            }
            (None, c) => current.push(c),
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

fn is_assignment(word: &str) -> bool {
    match word.split_once('=') {
        Some((name, _)) => {
            !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    }
}

fn is_number(word: &str) -> bool {
    word.trim_end_matches(['s', 'm', 'h'])
        .parse::<f64>()
        .is_ok()
}

fn basename(word: &str) -> &str {
    word.rsplit('/').next().unwrap_or(word)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn every_program_in_a_chain_is_found() {
        assert_eq!(
            programs_in("ls -la | grep foo && echo 'a | b'; cat x"),
            vec!["ls", "grep", "echo", "cat"]
        );
        assert_eq!(programs_in("echo $(rm -rf /tmp/x)"), vec!["echo", "rm"]);
        assert_eq!(programs_in("make 2>&1 | tee log"), vec!["make", "tee"]);
        assert_eq!(programs_in("FOO=1 /usr/bin/python3 -c 'x'"), vec!["python3"]);
        assert_eq!(programs_in("sudo rm -rf x"), vec!["sudo", "rm"]);
        assert_eq!(programs_in("timeout 5 dd if=/dev/zero"), vec!["timeout", "dd"]);
    }

    #[test]
    fn default_filter_denies_destructive_programs() {
        let filter = CommandFilter::default();
        assert!(filter.check("ls -la").is_ok());
        assert!(matches!(
            filter.check("ls && rm -rf build"),
            Err(TerminalError::CommandNotAllowed { ref program, .. }) if program == "rm"
        ));
        assert!(filter.check("echo 'rm is fine inside quotes'").is_ok());
    }

    #[test]
    fn allow_list_takes_precedence() {
        let filter = CommandFilter::new(vec!["cargo".into(), "ls".into()], vec!["ls".into()]);
        assert!(filter.check("ls").is_ok());
        assert!(filter.check("cargo test | tee log").is_err());
        assert!(filter.is_allowed("cargo"));
        assert!(!filter.is_allowed("python"));
    }

    #[test]
    fn blank_commands_are_rejected() {
        assert!(matches!(
            CommandFilter::allow_all().check("  ;  "),
            Err(TerminalError::EmptyCommand)
        ));
    }
}
