//! TR-451 ONU command-line client.
//!
//! Sends OMCI commands to an ONU simulator instance on a single channel
//! termination, one command per ONU id in the configured range. Commands
//! time out after 10 seconds when no simulator is listening.
//!
//! Examples:
//!
//! ```text
//! onucli get
//! onucli --extended get 256 0 0xf600
//! onucli set 256 0 battery_backup=true
//! onucli upload && onucli upload-next 0
//! ```

use clap::{Parser, Subcommand};
use log::{LevelFilter, debug, error, info, warn};
use onusim::endpoint::{Config, Endpoint};
use onusim::message::{CtermName, Message, MessageKind};
use onusim::mib::{Attr, AttrValue, Mib};
use onusim_wire::{Kind, Value};
use std::net::ToSocketAddrs;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "onucli", version, about = "TR-451 ONU command-line client")]
struct Args {
    /// Server DNS name or IP address.
    #[arg(short, long, default_value = "127.0.0.1")]
    address: String,

    /// Server UDP port number.
    #[arg(short, long, default_value_t = 12345)]
    port: u16,

    /// Channel termination name.
    #[arg(short = 'n', long, default_value = "cterm")]
    ctermname: String,

    /// First ONU id.
    #[arg(short = 'i', long, default_value_t = 42)]
    onuidfirst: u16,

    /// Last ONU id; defaults to the first.
    #[arg(short = 'I', long)]
    onuidlast: Option<u16>,

    /// Whether to use extended messages.
    #[arg(short, long)]
    extended: bool,

    /// File to which to dump hex messages.
    #[arg(short, long, num_args = 0..=1, default_missing_value = "dump.txt")]
    dumpfile: Option<String>,

    /// Logging level (0=errors+warnings, 1=info, 2=debug).
    #[arg(short, long, default_value_t = 1)]
    loglevel: u8,

    /// First TCI (transaction correlation identifier); incremented per
    /// ONU id.
    #[arg(short, long, default_value_t = 0)]
    tci: u16,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Get MIB instance attribute values.
    #[command(visible_alias = "g")]
    Get {
        /// ME class.
        #[arg(default_value_t = 256)]
        me_class: u16,
        /// ME instance.
        #[arg(default_value_t = 0)]
        me_inst: u16,
        /// Attribute mask (0b, 0o and 0x prefixes are OK).
        #[arg(default_value = "0xffff", value_parser = parse_u16)]
        attr_mask: u16,
    },
    /// Set MIB instance attribute values, as name=value pairs (a bare
    /// name sets a boolean attribute to true).
    #[command(visible_alias = "s")]
    Set {
        /// ME class.
        me_class: u16,
        /// ME instance.
        me_inst: u16,
        /// Attributes to set; each is of the form name=value.
        #[arg(required = true)]
        attrs: Vec<String>,
    },
    /// Reset MIB instance values.
    #[command(visible_alias = "r")]
    Reset,
    /// Latch MIB instance values for upload. They remain valid for 60
    /// seconds.
    #[command(visible_alias = "u")]
    Upload,
    /// Upload the next set of latched MIB instance values.
    #[command(name = "upload-next", visible_alias = "un")]
    UploadNext {
        /// Sequence number, 0 to num_upload_nexts - 1.
        #[arg(default_value_t = 0)]
        seq_num: u16,
    },
}

impl Command {
    /// The target and payload of this command. Reset/upload address
    /// ONU data #0.
    fn to_kind(&self) -> Result<(u16, u16, MessageKind), String> {
        let kind = match self {
            Command::Get {
                me_class,
                me_inst,
                attr_mask,
            } => (
                *me_class,
                *me_inst,
                MessageKind::Get {
                    attr_mask: *attr_mask,
                },
            ),
            Command::Set {
                me_class,
                me_inst,
                attrs,
            } => {
                let mib = onusim::registry()
                    .get(*me_class)
                    .ok_or_else(|| format!("ME class {} is not implemented", me_class))?;

                let (attr_mask, values) = parse_set_attrs(mib, attrs)?;

                (*me_class, *me_inst, MessageKind::Set { attr_mask, values })
            }
            Command::Reset => (onusim::mibs::ONU_DATA, 0, MessageKind::MibReset),
            Command::Upload => (onusim::mibs::ONU_DATA, 0, MessageKind::MibUpload),
            Command::UploadNext { seq_num } => (
                onusim::mibs::ONU_DATA,
                0,
                MessageKind::MibUploadNext { seq_num: *seq_num },
            ),
        };

        Ok(kind)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let level = match args.loglevel {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };

    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    debug!("args {:?}", args);

    let cterm_name = CtermName::try_from(args.ctermname.as_str())
        .map_err(|()| format!("channel termination name {:?} exceeds 30 bytes", args.ctermname))?;

    let onu_ids = args.onuidfirst..=args.onuidlast.unwrap_or(args.onuidfirst);

    let server_addr = (args.address.as_str(), args.port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| format!("can't resolve {:?}", args.address))?;

    let config = Config {
        server_addr,
        cterm_name: cterm_name.clone(),
        onu_ids: onu_ids.clone(),
        extended: args.extended,
        tr451: true,
        optional: true,
        dumpfile: args.dumpfile.clone(),
    };

    let server_addr = config.server_addr;
    let client = Arc::new(Endpoint::client(config).await?);

    let (me_class, me_inst, kind) = args.command.to_kind()?;

    let mut tci = args.tci;

    for onu_id in onu_ids {
        let message = Message {
            cterm_name: Some(cterm_name.clone()),
            onu_id,
            tci,
            extended: args.extended,
            me_class,
            me_inst,
            kind: kind.clone(),
        };

        tci = tci.wrapping_add(1);

        client.send(&message, None).await?;
        info!("sent message {} to {}", message, server_addr);

        match client.recv_timeout().await {
            Ok((response, addr)) => {
                info!("received response {} from {}", response, addr);

                report_attrs(&response);

                if let Some(unexpected) = client.process(&response) {
                    error!("unexpected response response {}", unexpected);
                }
            }
            Err(e) => error!("no response for ONU {}: {}", onu_id, e),
        }
    }

    Ok(())
}

/// Prints the retrieved attributes of a Get response by name.
fn report_attrs(response: &Message) {
    let MessageKind::GetResponse { attrs, .. } = &response.kind else {
        return;
    };

    let Some(mib) = onusim::registry().get(response.me_class) else {
        return;
    };

    for (number, value) in attrs {
        if let Some(attr) = mib.attr_by_number(*number) {
            let rendered: Vec<String> = value.iter().map(|value| value.to_string()).collect();

            info!("  {} = {}", attr.name(), rendered.join(", "));
        }
    }
}

/// Parses `name=value` pairs into an attribute mask and values, skipping
/// (with a warning) names that are unknown or not writable.
fn parse_set_attrs(mib: &Mib, attrs: &[String]) -> Result<(u16, Vec<(u8, AttrValue)>), String> {
    let mut attr_mask = 0u16;
    let mut values = Vec::new();

    for spec in attrs {
        let (key, raw) = match spec.split_once('=') {
            Some((key, raw)) => (key, Some(raw)),
            None => (spec.as_str(), None),
        };

        let Some(attr) = mib.attr(key) else {
            warn!(
                "MIB {} {:?} not found; supported attributes: {}",
                mib,
                key,
                mib.attr_names(Some(onusim::mib::Access::RW))
            );
            continue;
        };

        if !attr.access().writable() {
            warn!("MIB {} {} is not writable (ignored)", mib, attr);
            continue;
        }

        let value = match raw {
            Some(raw) => parse_attr_value(attr, raw)?,
            // A bare name means true.
            None => vec![Value::Bool(true)],
        };

        attr_mask |= attr.mask();
        values.push((attr.number(), value));
    }

    values.sort_by_key(|(number, _)| *number);

    Ok((attr_mask, values))
}

/// Parses a comma-separated textual value against an attribute's data
/// tuple.
fn parse_attr_value(attr: &Attr, raw: &str) -> Result<AttrValue, String> {
    let parts: Vec<&str> = raw.split(',').collect();

    if parts.len() != attr.data().len() {
        return Err(format!(
            "{} takes {} comma-separated value(s), got {}",
            attr.name(),
            attr.data().len(),
            parts.len()
        ));
    }

    attr.data()
        .iter()
        .zip(parts)
        .map(|(datum, part)| parse_datum(datum.kind(), part.trim()))
        .collect()
}

fn parse_datum(kind: Kind, text: &str) -> Result<Value, String> {
    match kind {
        Kind::Unsigned => parse_u64(text).map(Value::Unsigned),
        Kind::Bool => match text {
            "true" | "1" => Ok(Value::Bool(true)),
            "false" | "0" => Ok(Value::Bool(false)),
            _ => Err(format!("{:?} is not a boolean", text)),
        },
        Kind::Enum(labels) => labels
            .iter()
            .find(|label| **label == text)
            .copied()
            .map(Value::Enum)
            .ok_or_else(|| format!("{:?} is not one of {}", text, labels.join(", "))),
        Kind::Bits(labels) => text
            .split('|')
            .filter(|part| !part.is_empty())
            .map(|part| {
                labels
                    .iter()
                    .find(|label| **label == part)
                    .copied()
                    .ok_or_else(|| format!("{:?} is not one of {}", part, labels.join(", ")))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Bits),
        Kind::Str => Ok(Value::Str(text.to_string())),
        Kind::Bytes => parse_hex(text).map(Value::Bytes),
        Kind::Table { row_size } => {
            let row = parse_hex(text)?;

            if row.len() != row_size {
                return Err(format!(
                    "table row must be {} bytes, got {}",
                    row_size,
                    row.len()
                ));
            }

            Ok(Value::Table(vec![row]))
        }
    }
}

/// Parses a decimal/binary/octal/hex integer (0b, 0o and 0x prefixes).
fn parse_u64(text: &str) -> Result<u64, String> {
    let result = if let Some(digits) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u64::from_str_radix(digits, 16)
    } else if let Some(digits) = text.strip_prefix("0b") {
        u64::from_str_radix(digits, 2)
    } else if let Some(digits) = text.strip_prefix("0o") {
        u64::from_str_radix(digits, 8)
    } else {
        text.parse()
    };

    result.map_err(|_| format!("{:?} is not an integer", text))
}

fn parse_u16(text: &str) -> Result<u16, String> {
    u16::try_from(parse_u64(text)?).map_err(|_| format!("{:?} exceeds 16 bits", text))
}

fn parse_hex(text: &str) -> Result<Vec<u8>, String> {
    let digits = text.trim_start_matches("0x");

    if digits.len() % 2 != 0 {
        return Err(format!("{:?} has an odd number of hex digits", text));
    }

    (0..digits.len() / 2)
        .map(|index| {
            u8::from_str_radix(&digits[2 * index..2 * index + 2], 16)
                .map_err(|_| format!("{:?} is not hexadecimal", text))
        })
        .collect()
}
