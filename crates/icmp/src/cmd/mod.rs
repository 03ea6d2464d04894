use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use icmp_frame::FrameType;

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::{parse_hex, OutputFormat};

pub mod command;
pub mod decode;
pub mod encode;
pub mod listen;
pub mod notify;
pub mod session;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Unpack one frame from hex and print it.
    Decode(DecodeArgs),
    /// Pack one frame and print its wire bytes.
    Encode(EncodeArgs),
    /// Act as a board: accept one link and print received frames.
    Listen(ListenArgs),
    /// Connect to a board and send one NOTIFY.
    Notify(NotifyArgs),
    /// Connect to a board, send one COMMAND and print the RESPONSE.
    Command(CommandArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Decode(args) => decode::run(args, format),
        Command::Encode(args) => encode::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Notify(args) => notify::run(args),
        Command::Command(args) => command::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum FrameKind {
    Command,
    Response,
    Notify,
    Heartbeat,
}

impl From<FrameKind> for FrameType {
    fn from(kind: FrameKind) -> Self {
        match kind {
            FrameKind::Command => FrameType::Command,
            FrameKind::Response => FrameType::Response,
            FrameKind::Notify => FrameType::Notify,
            FrameKind::Heartbeat => FrameType::Heartbeat,
        }
    }
}

#[derive(Args, Debug)]
pub struct PayloadArgs {
    /// Payload as a UTF-8 string.
    #[arg(long, conflicts_with = "hex")]
    pub data: Option<String>,
    /// Payload as hex bytes.
    #[arg(long, conflicts_with = "data")]
    pub hex: Option<String>,
}

impl PayloadArgs {
    pub fn resolve(&self) -> CliResult<Vec<u8>> {
        if let Some(data) = &self.data {
            return Ok(data.as_bytes().to_vec());
        }
        if let Some(hex) = &self.hex {
            return parse_hex(hex)
                .map_err(|err| CliError::new(USAGE, format!("--hex is not valid hex: {err}")));
        }
        Ok(Vec::new())
    }
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Packed frame as hex (whitespace and `:` separators allowed).
    pub hex: String,
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// Frame type.
    #[arg(long = "type", value_enum, default_value = "notify")]
    pub kind: FrameKind,
    /// Target ID on the receiving board.
    #[arg(long, short = 't', default_value = "0")]
    pub target: u8,
    /// Message ID. Defaults to 255 for NOTIFY and HEARTBEAT, 0 otherwise.
    #[arg(long)]
    pub msg_id: Option<u8>,
    #[command(flatten)]
    pub payload: PayloadArgs,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Socket path to bind.
    pub path: PathBuf,
    /// Targets to register handlers for (comma-separated). Default: all.
    #[arg(long, value_delimiter = ',')]
    pub targets: Option<Vec<u8>>,
    /// Exit after printing N frames.
    #[arg(long)]
    pub count: Option<usize>,
    /// Answer each COMMAND with an empty RESPONSE.
    #[arg(long)]
    pub ack: bool,
}

#[derive(Args, Debug)]
pub struct NotifyArgs {
    /// Socket path to connect to.
    pub path: PathBuf,
    /// Target ID on the receiving board.
    #[arg(long, short = 't')]
    pub target: u8,
    #[command(flatten)]
    pub payload: PayloadArgs,
    /// Maximum time to wait for the frame to leave (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct CommandArgs {
    /// Socket path to connect to.
    pub path: PathBuf,
    /// Target ID on the receiving board.
    #[arg(long, short = 't')]
    pub target: u8,
    #[command(flatten)]
    pub payload: PayloadArgs,
    /// Maximum time to wait for the response (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
