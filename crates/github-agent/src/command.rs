//! Parsing of lines typed at the prompt.

/// What a line of input asks for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command<'a> {
    /// End the session.
    Exit,
    /// Nothing was typed; prompt again.
    Empty,
    /// Start a new turn with this text.
    Prompt(&'a str),
}

impl<'a> Command<'a> {
    const EXIT_WORDS: [&'static str; 3] = ["exit", "quit", "q"];

    /// Parses a line of input.
    ///
    /// Exit words are matched case-insensitively after trimming. Prompt text
    /// is passed on trimmed as well.
    pub fn parse(line: &'a str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            Command::Empty
        } else if Self::EXIT_WORDS
            .iter()
            .any(|word| line.eq_ignore_ascii_case(word))
        {
            Command::Exit
        } else {
            Command::Prompt(line)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!(Command::parse("exit"), Command::Exit);
        assert_eq!(Command::parse("  QUIT\n"), Command::Exit);
        assert_eq!(Command::parse("Q"), Command::Exit);
        assert_eq!(Command::parse(""), Command::Empty);
        assert_eq!(Command::parse(" \t\n"), Command::Empty);
        assert_eq!(
            Command::parse("List my repositories\n"),
            Command::Prompt("List my repositories")
        );
        assert_eq!(Command::parse("exit now"), Command::Prompt("exit now"));
        assert_eq!(Command::parse("quitter"), Command::Prompt("quitter"));
    }
}
