//! CLI entry point for single-register PC/104 bus access.

use std::env;
use std::ffi::OsString;
use std::fmt;

use pc104_core::{BridgeConfig, BusAccess, BusError, BusSpace, PortWidth};
use pc104_linux::{init, mmap_init, SetupError};
use tracing::debug;
use tracing_subscriber::EnvFilter;
#[cfg(test)]
use tempfile as _;

const USAGE_TEXT: &str = "\
Usage: pc104-peekpoke [--mmap] <io|mem> <8|16|alt16|32> <address> [value]

Reads print the value as 0x-prefixed hex; writes print nothing.
Addresses and values accept 0x hex, leading-0 octal, or decimal.

Options:
  --mmap      Access through the trapped bus window instead of the port files
  -h, --help  Show this help message

Environment:
  PC104_DEVICE_DIR  Directory holding the io8..memalt16 port files
  RUST_LOG          Log filter (default: warn)

Examples:
  pc104-peekpoke io 8 0x140
  pc104-peekpoke mem 16 0x20 0xBEEF
";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Width {
    Bits8,
    Bits16,
    Alt16,
    Bits32,
}

impl Width {
    const fn max_value(self) -> u32 {
        match self {
            Self::Bits8 => 0xFF,
            Self::Bits16 | Self::Alt16 => 0xFFFF,
            Self::Bits32 => u32::MAX,
        }
    }

    const fn port_width(self) -> Option<PortWidth> {
        match self {
            Self::Bits8 => Some(PortWidth::Bits8),
            Self::Bits16 => Some(PortWidth::Bits16),
            Self::Alt16 => Some(PortWidth::Bits16Alt),
            Self::Bits32 => None,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
struct Request {
    mmap: bool,
    space: BusSpace,
    width: Width,
    address: u32,
    value: Option<u32>,
}

#[derive(Debug)]
enum ParseResult {
    Request(Request),
    Help,
}

fn parse_args(args: impl Iterator<Item = OsString>) -> Result<ParseResult, String> {
    let mut mmap = false;
    let mut positional = Vec::new();
    for arg in args {
        if arg == "--help" || arg == "-h" {
            return Ok(ParseResult::Help);
        }
        if arg == "--mmap" {
            mmap = true;
            continue;
        }
        let arg = arg.to_string_lossy().into_owned();
        if arg.starts_with('-') {
            return Err(format!("unknown option: {arg}"));
        }
        positional.push(arg);
    }

    let (space, width, address, value) = match positional.as_slice() {
        [space, width, address] => (space, width, address, None),
        [space, width, address, value] => (space, width, address, Some(value)),
        [] => return Err("missing bus space".to_string()),
        [_] => return Err("missing access width".to_string()),
        [_, _] => return Err("missing address".to_string()),
        _ => return Err("too many arguments".to_string()),
    };

    let space = parse_space(space)?;
    let width = parse_width(width)?;
    if mmap && width == Width::Alt16 {
        return Err("alt16 is only reachable without --mmap".to_string());
    }
    let address = parse_number(address)?;
    let value = value.map(|text| parse_number(text)).transpose()?;
    if let Some(value) = value {
        if value > width.max_value() {
            return Err(format!("value {value:#x} does not fit the access width"));
        }
    }

    Ok(ParseResult::Request(Request {
        mmap,
        space,
        width,
        address,
        value,
    }))
}

fn parse_space(text: &str) -> Result<BusSpace, String> {
    match text {
        "io" => Ok(BusSpace::Io),
        "mem" => Ok(BusSpace::Memory),
        other => Err(format!("unknown bus space: {other}")),
    }
}

fn parse_width(text: &str) -> Result<Width, String> {
    match text {
        "8" => Ok(Width::Bits8),
        "16" => Ok(Width::Bits16),
        "alt16" => Ok(Width::Alt16),
        "32" => Ok(Width::Bits32),
        other => Err(format!("unknown access width: {other}")),
    }
}

/// Parses `0x` hex, leading-`0` octal or decimal.
fn parse_number(text: &str) -> Result<u32, String> {
    let (digits, radix) = if let Some(hex) = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
    {
        (hex, 16)
    } else if let Some(octal) = text.strip_prefix('0').filter(|rest| !rest.is_empty()) {
        (octal, 8)
    } else {
        (text, 10)
    };
    u32::from_str_radix(digits, radix).map_err(|_| format!("invalid number: {text}"))
}

#[derive(Debug)]
enum RunError {
    Setup(SetupError),
    Bus(BusError),
}

impl From<SetupError> for RunError {
    fn from(error: SetupError) -> Self {
        Self::Setup(error)
    }
}

impl From<BusError> for RunError {
    fn from(error: BusError) -> Self {
        Self::Bus(error)
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Setup(error) => write!(f, "{error}"),
            Self::Bus(error) => write!(f, "{error}"),
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn run_direct(config: &BridgeConfig, request: &Request) -> Result<Option<u32>, RunError> {
    let bus = init(config)?;
    let Request {
        space,
        width,
        address,
        value,
        ..
    } = *request;

    let Some(port_width) = width.port_width() else {
        let mut port = bus;
        return Ok(match value {
            Some(value) => {
                port.write32(space, address, value)?;
                None
            }
            None => Some(port.read32(space, address)?),
        });
    };
    Ok(match value {
        Some(value) => {
            bus.write(space, port_width, address, value as u16)?;
            None
        }
        None => Some(u32::from(bus.read(space, port_width, address)?)),
    })
}

#[allow(clippy::cast_possible_truncation)]
fn run_mapped(config: &BridgeConfig, request: &Request) -> Result<Option<u32>, RunError> {
    let window = mmap_init(config)?;
    let Request {
        space,
        width,
        address,
        value,
        ..
    } = *request;

    let result = match (width, value) {
        (Width::Bits8, None) => window.peek8(space, address).map(|v| Some(u32::from(v))),
        (Width::Bits8, Some(value)) => window.poke8(space, address, value as u8).map(|()| None),
        (Width::Bits32, None) => window.peek32(space, address).map(Some),
        (Width::Bits32, Some(value)) => window.poke32(space, address, value).map(|()| None),
        (_, None) => window.peek16(space, address).map(|v| Some(u32::from(v))),
        (_, Some(value)) => window.poke16(space, address, value as u16).map(|()| None),
    };
    result.map_err(RunError::from)
}

fn run(request: &Request) -> Result<(), i32> {
    let config = BridgeConfig::from_env();
    debug!(?request, device_dir = %config.device_dir.display(), "bus request");

    let result = if request.mmap {
        run_mapped(&config, request)
    } else {
        run_direct(&config, request)
    };
    match result {
        Ok(Some(value)) => {
            println!("0x{value:X}");
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(error) => {
            eprintln!("error: {error}");
            Err(1)
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_logging();
    let exit_code = match parse_args(env::args_os().skip(1)) {
        Ok(ParseResult::Help) => {
            println!("{USAGE_TEXT}");
            0
        }
        Ok(ParseResult::Request(request)) => match run(&request) {
            Ok(()) => 0,
            Err(code) => code,
        },
        Err(error) => {
            eprintln!("error: {error}");
            eprintln!("{USAGE_TEXT}");
            1
        }
    };
    std::process::exit(exit_code);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;

    fn parse(args: &[&str]) -> Result<ParseResult, String> {
        parse_args(args.iter().map(OsString::from))
    }

    fn request(args: &[&str]) -> Request {
        match parse(args).expect("valid arguments should parse") {
            ParseResult::Request(request) => request,
            ParseResult::Help => panic!("unexpected help"),
        }
    }

    #[test]
    fn parses_io_byte_read() {
        assert_eq!(
            request(&["io", "8", "0x140"]),
            Request {
                mmap: false,
                space: BusSpace::Io,
                width: Width::Bits8,
                address: 0x140,
                value: None,
            }
        );
    }

    #[test]
    fn parses_mapped_memory_word_write() {
        assert_eq!(
            request(&["--mmap", "mem", "32", "0x20", "4294967295"]),
            Request {
                mmap: true,
                space: BusSpace::Memory,
                width: Width::Bits32,
                address: 0x20,
                value: Some(u32::MAX),
            }
        );
    }

    #[test]
    fn numbers_follow_c_radix_prefixes() {
        assert_eq!(parse_number("0x1F"), Ok(0x1F));
        assert_eq!(parse_number("0X1f"), Ok(0x1F));
        assert_eq!(parse_number("017"), Ok(0o17));
        assert_eq!(parse_number("0"), Ok(0));
        assert_eq!(parse_number("320"), Ok(320));
        assert!(parse_number("08").is_err());
        assert!(parse_number("0x").is_err());
        assert!(parse_number("ten").is_err());
    }

    #[test]
    fn parses_help_flag() {
        assert!(matches!(parse(&["-h"]), Ok(ParseResult::Help)));
        assert!(matches!(parse(&["io", "--help"]), Ok(ParseResult::Help)));
    }

    #[test]
    fn rejects_bad_space_and_width() {
        assert!(parse(&["isa", "8", "0"]).unwrap_err().contains("unknown bus space"));
        assert!(parse(&["io", "12", "0"]).unwrap_err().contains("unknown access width"));
    }

    #[test]
    fn rejects_missing_and_extra_arguments() {
        assert_eq!(parse(&[]).unwrap_err(), "missing bus space");
        assert_eq!(parse(&["io", "8"]).unwrap_err(), "missing address");
        assert_eq!(
            parse(&["io", "8", "1", "2", "3"]).unwrap_err(),
            "too many arguments"
        );
    }

    #[test]
    fn rejects_values_wider_than_the_access() {
        assert!(parse(&["io", "8", "0", "0x100"]).is_err());
        assert!(parse(&["mem", "alt16", "0", "0x10000"]).is_err());
        assert!(parse(&["mem", "alt16", "0", "0xFFFF"]).is_ok());
    }

    #[test]
    fn alternate_pinout_is_not_mapped() {
        assert!(parse(&["--mmap", "io", "alt16", "0"])
            .unwrap_err()
            .contains("without --mmap"));
    }

    #[test]
    fn rejects_unknown_option() {
        assert!(parse(&["--fast", "io", "8", "0"])
            .unwrap_err()
            .contains("unknown option"));
    }
}
