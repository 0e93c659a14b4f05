//! Chat commands
//!
//! [`Command::parse`] turns message text into a [`Command`];
//! [`CommandRouter`] authorizes the sender and runs the matching handler.

mod router;

pub use router::CommandRouter;

/// A parsed chat command
///
/// Arguments are the remaining words joined with single spaces; an empty
/// string means the user gave none.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// `/start` or `/help`: usage text
    Start,
    /// `/download <url>`: fetch and keep for a later `/upload`
    Download(String),
    /// `/upload <path>`: relay a file already on disk
    Upload(String),
    /// `/relay <url>`: fetch and upload in one go
    Relay(String),
    /// `/list [path]`: show workspace contents
    List(Option<String>),
    /// `/clean`: purge the workspace
    Clean,
    /// `/status`: host statistics
    Status,
    /// Anything else; carries the command word (empty for plain text)
    Unknown(String),
}

impl Command {
    /// Parse message text. Accepts the `/cmd@botname` form.
    pub fn parse(text: &str) -> Self {
        let mut words = text.split_whitespace();
        let Some(head) = words.next().and_then(|w| w.strip_prefix('/')) else {
            return Command::Unknown(String::new());
        };
        let name = head.split('@').next().unwrap_or_default().to_ascii_lowercase();
        let args = words.collect::<Vec<_>>().join(" ");

        match name.as_str() {
            "start" | "help" => Command::Start,
            "download" => Command::Download(args),
            "upload" => Command::Upload(args),
            "relay" => Command::Relay(args),
            "list" => Command::List((!args.is_empty()).then_some(args)),
            "clean" => Command::Clean,
            "status" => Command::Status,
            _ => Command::Unknown(name),
        }
    }
}

/// Usage text for `/start`
pub const HELP: &str = "👋 Hi! I download files and upload them here, splitting anything too large for one message.\n\n\
Available commands:\n\
/download <url> - Download a video and keep it on the server\n\
/upload <file_path> - Upload a file from the server\n\
/relay <url> - Download and upload in one step\n\
/list [path] - List files in your workspace\n\
/clean - Delete your temporary files\n\
/status - Show server status\n\n\
Send a cookies.txt file to use your cookies for downloads, or an archive (zip, 7z, rar, tar, gz, bz2) to get its contents back.";
