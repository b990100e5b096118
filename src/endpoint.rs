//! OMCI endpoint: one UDP socket, one database.
//!
//! A server endpoint binds the configured address, then loops receive,
//! process, respond in [`Endpoint::serve`]. Messages addressed to another
//! channel termination name or an out-of-range ONU id are dropped without a
//! response, as a real ONU would. A client endpoint sends to the server
//! address and fails receives after a 10 second deadline.
//!
//! The endpoint is the [`ServerHandle`] the message processors see: each
//! handle method takes the database mutex for exactly one operation, which
//! keeps `mib_data_sync` increments consistent with the mutations that
//! caused them.

use crate::database::{
    AlarmBitmap, AlarmCountResult, AlarmNextResult, CreateResult, Database, GetNextResult,
    GetResult, SetResult, StatusResult, UploadNextResult, UploadResult,
};
use crate::error::Error;
use crate::message::{
    CtermName, DEV_ID_EXTENDED, Message, MessageKind, ServerHandle, TR451_HEADER_LEN,
};
use crate::mib::AttrValue;
use log::{debug, error, info, warn};
use std::fs::OpenOptions;
use std::io::{LineWriter, Write};
use std::net::SocketAddr;
use std::ops::RangeInclusive;
use std::sync::Mutex;
use tokio::net::UdpSocket;
use tokio::time::Duration;

/// Client receives fail after this deadline.
pub const CLIENT_RECV_TIMEOUT: Duration = Duration::from_secs(10);

/// Receive buffer size; comfortably above the largest extended frame.
const RECV_BUF_SIZE: usize = 2048;

/// Endpoint configuration shared by servers and clients.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server address: bound by servers, sent to by clients.
    pub server_addr: SocketAddr,
    /// Channel termination name carried in (and required of) every
    /// TR-451 header.
    pub cterm_name: CtermName,
    /// Contiguous ONU id range served by this endpoint.
    pub onu_ids: RangeInclusive<u16>,
    /// Whether extended framing is in use.
    pub extended: bool,
    /// Whether datagrams carry the TR-451 header.
    pub tr451: bool,
    /// Whether optional attributes are materialized.
    pub optional: bool,
    /// Hex dump file spec: `file` truncates, `file+` appends.
    pub dumpfile: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_addr: ([0, 0, 0, 0], 12345).into(),
            cterm_name: CtermName::try_from("cterm").expect("name fits"),
            onu_ids: 42..=42,
            extended: false,
            tr451: true,
            optional: true,
            dumpfile: None,
        }
    }
}

/// An OMCI client or server endpoint.
pub struct Endpoint {
    socket: UdpSocket,
    is_server: bool,
    config: Config,
    database: Mutex<Database>,
    dump: Option<Mutex<LineWriter<std::fs::File>>>,
    /// Last OLT-side address a datagram was received from; autonomous
    /// messages are sent there.
    peer: Mutex<Option<SocketAddr>>,
}

impl Endpoint {
    /// Binds a server endpoint on the configured address.
    pub async fn server(config: Config) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(config.server_addr).await?;

        info!("listening on {}", socket.local_addr()?);

        Ok(Self::with_socket(socket, true, config))
    }

    /// Creates a client endpoint sending to the configured server address.
    pub async fn client(config: Config) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", 0)).await?;

        Ok(Self::with_socket(socket, false, config))
    }

    fn with_socket(socket: UdpSocket, is_server: bool, config: Config) -> Self {
        let database = Database::with_options(
            config.onu_ids.clone(),
            config.optional,
            config.extended,
        );

        let dump = config
            .dumpfile
            .as_deref()
            .and_then(open_dump)
            .map(Mutex::new);

        Self {
            socket,
            is_server,
            config,
            database: Mutex::new(database),
            dump,
            peer: Mutex::new(None),
        }
    }

    /// The endpoint's database.
    pub fn database(&self) -> &Mutex<Database> {
        &self.database
    }

    /// The address the socket is actually bound to (useful when binding
    /// port 0).
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// The configured channel termination name.
    pub fn cterm_name(&self) -> &CtermName {
        &self.config.cterm_name
    }

    /// The configured ONU id range.
    pub fn onu_ids(&self) -> RangeInclusive<u16> {
        self.config.onu_ids.clone()
    }

    /// Whether extended framing is in use.
    pub fn extended(&self) -> bool {
        self.config.extended
    }

    /// Receives one datagram and decodes it.
    ///
    /// The decode result is returned alongside the sender address so the
    /// caller can log and drop malformed datagrams without tearing down
    /// the receive loop.
    pub async fn recv(&self) -> std::io::Result<(Result<Message, Error>, SocketAddr)> {
        let mut buf = [0u8; RECV_BUF_SIZE];

        let (len, addr) = self.socket.recv_from(&mut buf).await?;
        let buf = &buf[..len];

        debug!("received {} bytes from {}", len, addr);

        if self.is_server {
            *self.peer.lock().unwrap() = Some(addr);
        }

        self.dump_buffer(buf);

        Ok((Message::decode(buf, self.config.tr451), addr))
    }

    /// Receives one message with the client deadline applied.
    pub async fn recv_timeout(&self) -> Result<(Message, SocketAddr), Error> {
        match tokio::time::timeout(CLIENT_RECV_TIMEOUT, self.recv()).await {
            Ok(Ok((message, addr))) => message.map(|message| (message, addr)),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(Error::Timeout),
        }
    }

    /// Processes a received message, returning the response to send (if
    /// any).
    ///
    /// Messages for another channel termination or an out-of-range ONU id
    /// are dropped silently, per G.988 practice.
    pub fn process(&self, message: &Message) -> Option<Message> {
        if self.config.tr451 {
            let name = message.cterm_name.as_deref().unwrap_or("");

            if name != self.config.cterm_name.as_str() {
                error!(
                    "message is for channel termination {:?}, not for {:?}; ignored",
                    name,
                    self.config.cterm_name.as_str()
                );

                return None;
            }

            if !self.config.onu_ids.contains(&message.onu_id) {
                error!(
                    "message is for ONU id {}, not for {}:{}; ignored",
                    message.onu_id,
                    self.config.onu_ids.start(),
                    self.config.onu_ids.end()
                );

                return None;
            }
        }

        message.process(self)
    }

    /// Encodes and sends a message. The address defaults to the server
    /// address (client mode).
    pub async fn send(&self, message: &Message, addr: Option<SocketAddr>) -> Result<(), Error> {
        let addr = addr.unwrap_or(self.config.server_addr);

        let buf = message.encode(self.config.tr451)?;

        // One datagram per message; responses and autonomous alarms are
        // never interleaved on the wire.
        self.socket.send_to(&buf, addr).await?;

        debug!("sent {} bytes to {}", buf.len(), addr);

        self.dump_buffer(&buf);

        Ok(())
    }

    /// Applies an alarm bitmap to the database and sends the autonomous
    /// Alarm message to the last observed OLT address.
    ///
    /// Fails softly with [`Error::NoPeer`] when no OLT datagram has been
    /// seen yet.
    pub async fn inject_alarm(
        &self,
        me_class: u16,
        me_inst: u16,
        bitmap: AlarmBitmap,
        seq_num: u32,
    ) -> Result<(), Error> {
        let onu_id = *self.config.onu_ids.start();

        let message = Message {
            cterm_name: Some(self.config.cterm_name.clone()),
            onu_id,
            tci: 0x0059,
            extended: self.config.extended,
            me_class,
            me_inst,
            kind: MessageKind::Alarm { bitmap, seq_num },
        };

        self.database
            .lock()
            .unwrap()
            .set_alarm(onu_id, me_class, me_inst, &bitmap);

        let peer = *self.peer.lock().unwrap();

        let Some(peer) = peer else {
            error!("no OLT address observed yet; alarm not sent");
            return Err(Error::NoPeer);
        };

        debug!("sending alarm {}", message);

        self.send(&message, Some(peer)).await
    }

    /// The server main loop: receive, process, respond.
    ///
    /// Per-datagram failures are logged and the loop continues; only a
    /// socket-level receive error terminates it.
    pub async fn serve(&self) -> std::io::Result<()> {
        loop {
            let (decoded, addr) = self.recv().await?;

            match decoded {
                Ok(message) => {
                    info!("received message {} from {}", message, addr);

                    if let Some(response) = self.process(&message) {
                        match self.send(&response, Some(addr)).await {
                            Ok(()) => info!("sent response {} to {}", response, addr),
                            Err(e) => error!("failed to send response: {}", e),
                        }
                    }
                }
                Err(e) => error!("dropped datagram from {}: {}", addr, e),
            }
        }
    }

    /// Appends hex dump lines for one raw datagram buffer, TR-451 header
    /// excluded.
    fn dump_buffer(&self, buffer: &[u8]) {
        let Some(dump) = &self.dump else {
            return;
        };

        let offset = if self.config.tr451 {
            TR451_HEADER_LEN
        } else {
            0
        };

        let Some(packet) = buffer.get(offset..) else {
            return;
        };

        if packet.len() < 10 {
            return;
        }

        let extended = packet[3] == DEV_ID_EXTENDED;

        let mut dump = dump.lock().unwrap();

        let result = if !extended {
            writeln!(
                dump,
                "# TCI  MT DI CLS  INST CONTENTS{:57}TRAILER",
                ""
            )
            .and_then(|_| {
                writeln!(
                    dump,
                    "  {} {} {} {} {} {} {}",
                    hex(&packet[0..2]),
                    hex(&packet[2..3]),
                    hex(&packet[3..4]),
                    hex(&packet[4..6]),
                    hex(&packet[6..8]),
                    hex(&packet[8..40.min(packet.len())]),
                    hex(packet.get(40..).unwrap_or_default()),
                )
            })
        } else {
            writeln!(dump, "# TCI  MT DI CLS  INST LEN  CONTENTS").and_then(|_| {
                writeln!(
                    dump,
                    "  {} {} {} {} {} {} {}",
                    hex(&packet[0..2]),
                    hex(&packet[2..3]),
                    hex(&packet[3..4]),
                    hex(&packet[4..6]),
                    hex(&packet[6..8]),
                    hex(&packet[8..10]),
                    hex(packet.get(10..).unwrap_or_default()),
                )
            })
        };

        if let Err(e) = result {
            debug!("hex dump write failed: {}", e);
        }
    }
}

impl ServerHandle for Endpoint {
    fn set(
        &self,
        onu_id: u16,
        me_class: u16,
        me_inst: u16,
        attr_mask: u16,
        values: &[(u8, AttrValue)],
        _extended: bool,
    ) -> SetResult {
        self.database
            .lock()
            .unwrap()
            .set(onu_id, me_class, me_inst, attr_mask, values)
    }

    fn get(
        &self,
        onu_id: u16,
        me_class: u16,
        me_inst: u16,
        attr_mask: u16,
        extended: bool,
    ) -> GetResult {
        self.database
            .lock()
            .unwrap()
            .get(onu_id, me_class, me_inst, attr_mask, extended)
    }

    fn get_next(
        &self,
        onu_id: u16,
        me_class: u16,
        me_inst: u16,
        attr_mask: u16,
        seq_num: u16,
    ) -> GetNextResult {
        self.database
            .lock()
            .unwrap()
            .get_next(onu_id, me_class, me_inst, attr_mask, seq_num)
    }

    fn create(
        &self,
        onu_id: u16,
        me_class: u16,
        me_inst: u16,
        values: &[(u8, AttrValue)],
    ) -> CreateResult {
        self.database
            .lock()
            .unwrap()
            .create(onu_id, me_class, me_inst, values)
    }

    fn delete(&self, onu_id: u16, me_class: u16, me_inst: u16) -> StatusResult {
        self.database.lock().unwrap().delete(onu_id, me_class, me_inst)
    }

    fn reset(&self, onu_id: u16, me_class: u16, me_inst: u16) -> StatusResult {
        self.database.lock().unwrap().reset(onu_id, me_class, me_inst)
    }

    fn upload(&self, onu_id: u16, me_class: u16, me_inst: u16, extended: bool) -> UploadResult {
        self.database
            .lock()
            .unwrap()
            .upload(onu_id, me_class, me_inst, extended)
    }

    fn upload_next(
        &self,
        onu_id: u16,
        me_class: u16,
        me_inst: u16,
        seq_num: u16,
        extended: bool,
    ) -> UploadNextResult {
        self.database
            .lock()
            .unwrap()
            .upload_next(onu_id, me_class, me_inst, seq_num, extended)
    }

    fn get_all_alarms(
        &self,
        onu_id: u16,
        me_class: u16,
        me_inst: u16,
        retrieval_mode: u8,
    ) -> AlarmCountResult {
        self.database
            .lock()
            .unwrap()
            .get_all_alarms(onu_id, me_class, me_inst, retrieval_mode)
    }

    fn get_all_alarms_next(
        &self,
        onu_id: u16,
        me_class: u16,
        me_inst: u16,
        seq_num: u16,
    ) -> AlarmNextResult {
        self.database
            .lock()
            .unwrap()
            .get_all_alarms_next(onu_id, me_class, me_inst, seq_num)
    }

    fn set_alarm(&self, onu_id: u16, me_class: u16, me_inst: u16, bitmap: &AlarmBitmap) {
        self.database
            .lock()
            .unwrap()
            .set_alarm(onu_id, me_class, me_inst, bitmap);
    }
}

/// Opens the hex dump file: `file` truncates, `file+` appends. Failure
/// logs a warning and the endpoint continues without dumping.
fn open_dump(spec: &str) -> Option<LineWriter<std::fs::File>> {
    let (path, append) = match spec.split_once('+') {
        Some((path, _)) => (path, true),
        None => (spec, false),
    };

    let result = OpenOptions::new()
        .create(true)
        .write(true)
        .append(append)
        .truncate(!append)
        .open(path);

    match result {
        Ok(file) => Some(LineWriter::new(file)),
        Err(e) => {
            warn!("can't open dump file {:?}: {}; continuing without", path, e);
            None
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|byte| format!("{:02x}", byte))
        .collect()
}
