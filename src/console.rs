//! Interactive console: reads whitespace-tokenized commands from standard
//! input and lifts them into database operations and unsolicited sends.
//!
//! Commands:
//!
//! * `alarm <me_class> <me_inst> <hex_bitmap> <seq_num>` injects an
//!   autonomous alarm towards the last observed OLT address.
//! * `notif ...` is recognized but not implemented.

use crate::database::bitmap_from_hex;
use crate::endpoint::Endpoint;
use log::{error, info, warn};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Runs the console loop until standard input closes.
pub async fn run(endpoint: Arc<Endpoint>) {
    info!("serving console commands");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => handle_line(&endpoint, &line).await,
            Ok(None) => break,
            Err(e) => {
                error!("console read failed: {}", e);
                break;
            }
        }
    }

    info!("console input closed");
}

async fn handle_line(endpoint: &Endpoint, line: &str) {
    let tokens: Vec<&str> = line.split_whitespace().collect();

    match tokens.as_slice() {
        [] => {}
        ["alarm", me_class, me_inst, bitmap, seq_num] => {
            let parsed = (
                me_class.parse::<u16>(),
                me_inst.parse::<u16>(),
                bitmap_from_hex(bitmap),
                seq_num.parse::<u32>(),
            );

            let (Ok(me_class), Ok(me_inst), Some(bitmap), Ok(seq_num)) = parsed else {
                error!("usage: alarm <me_class> <me_inst> <hex_bitmap> <seq_num>");
                return;
            };

            match endpoint.inject_alarm(me_class, me_inst, bitmap, seq_num).await {
                Ok(()) => info!("alarm sent for MIB {} #{}", me_class, me_inst),
                Err(e) => error!("alarm not sent: {}", e),
            }
        }
        ["alarm", ..] => error!("usage: alarm <me_class> <me_inst> <hex_bitmap> <seq_num>"),
        ["notif", ..] => warn!("notifications are not implemented"),
        [command, ..] => warn!("unrecognized command {:?}", command),
    }
}
