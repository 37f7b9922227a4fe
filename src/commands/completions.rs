use std::io::{self, Write};

use clap::{Args, CommandFactory};
use clap_complete::Shell;

use crate::cli::Cli;

#[derive(Debug, Clone, Args)]
pub struct CompletionsCommand {
    #[arg(value_enum, help = "Target shell for completion script")]
    pub shell: Shell,
}

impl CompletionsCommand {
    pub fn execute(self) {
        self.write_script(&mut io::stdout());
    }

    /// Completion script for `stsrotate` and every subcommand
    fn write_script(&self, out: &mut dyn Write) {
        let mut cmd = Cli::command();
        let bin_name = cmd.get_name().to_string();
        clap_complete::generate(self.shell, &mut cmd, bin_name, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script(shell: Shell) -> String {
        let mut buffer = Vec::new();
        CompletionsCommand { shell }.write_script(&mut buffer);
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn test_scripts_register_binary() {
        let cases = [
            (Shell::Bash, "complete -F _stsrotate"),
            (Shell::Zsh, "#compdef stsrotate"),
            (Shell::Fish, "complete -c stsrotate"),
            (Shell::PowerShell, "-CommandName 'stsrotate'"),
            (Shell::Elvish, "arg-completer[stsrotate]"),
        ];

        for (shell, registration) in cases {
            assert!(
                script(shell).contains(registration),
                "{shell} script should contain {registration}"
            );
        }
    }

    #[test]
    fn test_script_covers_commands_and_run_flags() {
        let bash = script(Shell::Bash);
        for word in [
            "run",
            "code",
            "accounts",
            "configure",
            "completions",
            "--config",
            "--account",
            "--no-propagate",
            "--backend",
        ] {
            assert!(bash.contains(word), "bash script should offer {word}");
        }
    }
}
