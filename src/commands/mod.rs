pub mod accounts;
pub mod code;
pub mod completions;
pub mod configure;
pub mod run;

pub use accounts::AccountsCommand;
pub use code::CodeCommand;
pub use completions::CompletionsCommand;
pub use configure::ConfigureCommand;
pub use run::RunCommand;
