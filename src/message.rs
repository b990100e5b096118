//! OMCI message model: framing, per-action payload codecs and dispatch.
//!
//! A [`Message`] pairs the common OMCI header fields with a [`MessageKind`],
//! one variant per registered (direction, message type) pair. Messages are
//! short-lived values: clients build requests and decode responses, the
//! server decodes requests and builds responses via [`Message::process`].
//!
//! Two framings exist (G.988 annexes A.2 and A.3): baseline frames are
//! exactly 48 bytes (a 32-byte contents area plus the CPCS trailer) with
//! device identifier 0x0a, extended frames carry an explicit contents
//! length with device identifier 0x0b. Both may be prefixed by the 32-byte
//! TR-451 header (30-byte channel termination name, 16-bit ONU id).

use crate::database::{
    ALARM_BITMAP_LEN, AlarmBitmap, AlarmCountResult, AlarmNextResult, CreateResult, GetNextResult,
    GetResult, SetResult, StatusResult, UploadBody, UploadNextResult, UploadResult, reason,
};
use crate::error::{Error, FrameError};
use crate::mib::{AttrValue, Mib, mask_indices};
use log::{debug, error, warn};

/// OMCI message type codes (G.988 Table 11.2.2-1) in scope for the
/// simulator.
pub mod mt {
    /// Create a managed entity instance.
    pub const CREATE: u8 = 4;
    /// Delete a managed entity instance.
    pub const DELETE: u8 = 6;
    /// Set one or more attributes.
    pub const SET: u8 = 8;
    /// Get one or more attributes.
    pub const GET: u8 = 9;
    /// Latch the alarm status of all managed entities.
    pub const GET_ALL_ALARMS: u8 = 11;
    /// Retrieve the next latched alarm bitmap.
    pub const GET_ALL_ALARMS_NEXT: u8 = 12;
    /// Latch a snapshot of the MIB for upload.
    pub const MIB_UPLOAD: u8 = 13;
    /// Retrieve the next portion of the latched MIB snapshot.
    pub const MIB_UPLOAD_NEXT: u8 = 14;
    /// Reset the MIB to its default state.
    pub const MIB_RESET: u8 = 15;
    /// Autonomous alarm notification (never acknowledged).
    pub const ALARM: u8 = 16;
    /// Retrieve the next portion of a table attribute.
    pub const GET_NEXT: u8 = 26;
}

/// Baseline device identifier.
pub const DEV_ID_BASELINE: u8 = 0x0a;
/// Extended device identifier.
pub const DEV_ID_EXTENDED: u8 = 0x0b;
/// The fixed CPCS-SDU length trailer of a baseline frame.
pub const CPCS_SDU_FIXED: u16 = 0x0028;

/// TR-451 channel termination name length.
pub const TR451_NAME_LEN: usize = 30;
/// TR-451 header length: name plus 16-bit ONU id.
pub const TR451_HEADER_LEN: usize = TR451_NAME_LEN + 2;

/// Baseline contents area length.
pub const BASELINE_CONTENTS_LEN: usize = 32;
/// Total baseline frame length: 8-byte header, contents, 4-byte trailer.
pub const BASELINE_FRAME_LEN: usize = 48;
/// Maximum extended contents length.
pub const MAX_EXTENDED_CONTENTS_LEN: usize = 1966;
/// Maximum attribute value bytes in a baseline Get response or Set command
/// (contents minus masks and reason).
pub const BASELINE_VALUES_LIMIT: usize = 25;
/// Table bytes carried per Get-next response.
pub const GET_NEXT_CHUNK_LEN: usize = 29;

/// A TR-451 channel termination name: at most 30 ASCII characters.
pub type CtermName = heapless::String<TR451_NAME_LEN>;

/// The type-specific part of a message: payload fields per action.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageKind {
    /// Create command: attribute mask plus set-by-create attribute values.
    Create {
        /// Attributes carried by the command.
        attr_mask: u16,
        /// Attribute values, ascending by attribute number.
        values: Vec<(u8, AttrValue)>,
    },
    /// Create response.
    CreateResponse {
        /// Result/reason code.
        reason: u8,
        /// Failed attributes, present when reason is parameter error.
        attr_exec_mask: u16,
    },
    /// Delete command.
    Delete,
    /// Delete response.
    DeleteResponse {
        /// Result/reason code.
        reason: u8,
    },
    /// Set command.
    Set {
        /// Attributes to set.
        attr_mask: u16,
        /// Attribute values, ascending by attribute number.
        values: Vec<(u8, AttrValue)>,
    },
    /// Set response.
    SetResponse {
        /// Result/reason code.
        reason: u8,
        /// Unsupported attributes, present when reason is attribute failure.
        opt_attr_mask: u16,
        /// Failed attributes, present when reason is attribute failure.
        attr_exec_mask: u16,
    },
    /// Get command.
    Get {
        /// Requested attributes.
        attr_mask: u16,
    },
    /// Get response.
    GetResponse {
        /// Result/reason code.
        reason: u8,
        /// Attributes actually included.
        attr_mask: u16,
        /// Unsupported attributes.
        opt_attr_mask: u16,
        /// Failed attributes.
        attr_exec_mask: u16,
        /// Attribute values, ascending by attribute number.
        attrs: Vec<(u8, AttrValue)>,
    },
    /// Get-all-alarms command.
    GetAllAlarms {
        /// Alarm retrieval mode, 0 or 1.
        retrieval_mode: u8,
    },
    /// Get-all-alarms response.
    GetAllAlarmsResponse {
        /// Number of get-all-alarms-next commands needed.
        num_alarms_nexts: u16,
    },
    /// Get-all-alarms-next command.
    GetAllAlarmsNext {
        /// Command sequence number.
        seq_num: u16,
    },
    /// Get-all-alarms-next response.
    GetAllAlarmsNextResponse {
        /// Class of the managed entity the bitmap belongs to.
        alarmed_me_class: u16,
        /// Instance of the managed entity the bitmap belongs to.
        alarmed_me_inst: u16,
        /// Active alarm bitmap.
        bitmap: AlarmBitmap,
    },
    /// MIB upload command.
    MibUpload,
    /// MIB upload response.
    MibUploadResponse {
        /// Number of MIB-upload-next commands needed.
        num_upload_nexts: u16,
    },
    /// MIB upload next command.
    MibUploadNext {
        /// Command sequence number.
        seq_num: u16,
    },
    /// MIB upload next response: one body of the latched snapshot.
    MibUploadNextResponse {
        /// The snapshot body; empty when the snapshot expired or the
        /// sequence number was out of range.
        body: UploadBody,
    },
    /// MIB reset command.
    MibReset,
    /// MIB reset response.
    MibResetResponse {
        /// Result/reason code.
        reason: u8,
    },
    /// Autonomous alarm notification. Never acknowledged.
    Alarm {
        /// Active alarm bitmap.
        bitmap: AlarmBitmap,
        /// Alarm sequence number.
        seq_num: u32,
    },
    /// Get-next command: continuation of a table attribute get.
    GetNext {
        /// The (single) table attribute being retrieved.
        attr_mask: u16,
        /// Command sequence number.
        seq_num: u16,
    },
    /// Get-next response.
    GetNextResponse {
        /// Result/reason code.
        reason: u8,
        /// The table attribute being retrieved.
        attr_mask: u16,
        /// Raw table bytes, zero-padded in the final chunk.
        data: Vec<u8>,
    },
}

impl MessageKind {
    /// The (type_ar, type_ak, type_mt) key this kind is registered under.
    pub fn type_fields(&self) -> (bool, bool, u8) {
        match self {
            MessageKind::Create { .. } => (true, false, mt::CREATE),
            MessageKind::CreateResponse { .. } => (false, true, mt::CREATE),
            MessageKind::Delete => (true, false, mt::DELETE),
            MessageKind::DeleteResponse { .. } => (false, true, mt::DELETE),
            MessageKind::Set { .. } => (true, false, mt::SET),
            MessageKind::SetResponse { .. } => (false, true, mt::SET),
            MessageKind::Get { .. } => (true, false, mt::GET),
            MessageKind::GetResponse { .. } => (false, true, mt::GET),
            MessageKind::GetAllAlarms { .. } => (true, false, mt::GET_ALL_ALARMS),
            MessageKind::GetAllAlarmsResponse { .. } => (false, true, mt::GET_ALL_ALARMS),
            MessageKind::GetAllAlarmsNext { .. } => (true, false, mt::GET_ALL_ALARMS_NEXT),
            MessageKind::GetAllAlarmsNextResponse { .. } => {
                (false, true, mt::GET_ALL_ALARMS_NEXT)
            }
            MessageKind::MibUpload => (true, false, mt::MIB_UPLOAD),
            MessageKind::MibUploadResponse { .. } => (false, true, mt::MIB_UPLOAD),
            MessageKind::MibUploadNext { .. } => (true, false, mt::MIB_UPLOAD_NEXT),
            MessageKind::MibUploadNextResponse { .. } => (false, true, mt::MIB_UPLOAD_NEXT),
            MessageKind::MibReset => (true, false, mt::MIB_RESET),
            MessageKind::MibResetResponse { .. } => (false, true, mt::MIB_RESET),
            MessageKind::Alarm { .. } => (false, false, mt::ALARM),
            MessageKind::GetNext { .. } => (true, false, mt::GET_NEXT),
            MessageKind::GetNextResponse { .. } => (false, true, mt::GET_NEXT),
        }
    }

    /// The action name, for log messages.
    pub fn name(&self) -> &'static str {
        match self {
            MessageKind::Create { .. } => "Create",
            MessageKind::CreateResponse { .. } => "CreateResponse",
            MessageKind::Delete => "Delete",
            MessageKind::DeleteResponse { .. } => "DeleteResponse",
            MessageKind::Set { .. } => "Set",
            MessageKind::SetResponse { .. } => "SetResponse",
            MessageKind::Get { .. } => "Get",
            MessageKind::GetResponse { .. } => "GetResponse",
            MessageKind::GetAllAlarms { .. } => "GetAllAlarms",
            MessageKind::GetAllAlarmsResponse { .. } => "GetAllAlarmsResponse",
            MessageKind::GetAllAlarmsNext { .. } => "GetAllAlarmsNext",
            MessageKind::GetAllAlarmsNextResponse { .. } => "GetAllAlarmsNextResponse",
            MessageKind::MibUpload => "MibUpload",
            MessageKind::MibUploadResponse { .. } => "MibUploadResponse",
            MessageKind::MibUploadNext { .. } => "MibUploadNext",
            MessageKind::MibUploadNextResponse { .. } => "MibUploadNextResponse",
            MessageKind::MibReset => "MibReset",
            MessageKind::MibResetResponse { .. } => "MibResetResponse",
            MessageKind::Alarm { .. } => "Alarm",
            MessageKind::GetNext { .. } => "GetNext",
            MessageKind::GetNextResponse { .. } => "GetNextResponse",
        }
    }

    /// Decodes the contents area into the kind selected by the
    /// (type_ar, type_ak, type_mt) key.
    ///
    /// Unknown keys are a protocol error; the caller reports and discards
    /// the datagram.
    fn decode(
        ar: bool,
        ak: bool,
        mt: u8,
        contents: &[u8],
        extended: bool,
        me_class: u16,
    ) -> Result<Self, Error> {
        let mib = crate::registry().get(me_class);

        let kind = match (ar, ak, mt) {
            (true, false, mt::CREATE) => {
                let (attr_mask, offset) = get_u16(contents, 0);
                let values = decode_values(contents, offset, attr_mask, mib);

                MessageKind::Create { attr_mask, values }
            }
            (false, true, mt::CREATE) => {
                let (reason, offset) = get_u8(contents, 0);

                let attr_exec_mask = if reason == reason::PARAMETER_ERROR {
                    get_u16(contents, offset).0
                } else {
                    0
                };

                MessageKind::CreateResponse {
                    reason,
                    attr_exec_mask,
                }
            }
            (true, false, mt::DELETE) => MessageKind::Delete,
            (false, true, mt::DELETE) => MessageKind::DeleteResponse {
                reason: get_u8(contents, 0).0,
            },
            (true, false, mt::SET) => {
                let (attr_mask, offset) = get_u16(contents, 0);
                let values = decode_values(contents, offset, attr_mask, mib);

                MessageKind::Set { attr_mask, values }
            }
            (false, true, mt::SET) => {
                let (reason, offset) = get_u8(contents, 0);

                let (opt_attr_mask, attr_exec_mask) = if reason == reason::ATTRIBUTES_FAILED {
                    let (opt, offset) = get_u16(contents, offset);
                    let (exec, _) = get_u16(contents, offset);
                    (opt, exec)
                } else {
                    (0, 0)
                };

                MessageKind::SetResponse {
                    reason,
                    opt_attr_mask,
                    attr_exec_mask,
                }
            }
            (true, false, mt::GET) => MessageKind::Get {
                attr_mask: get_u16(contents, 0).0,
            },
            (false, true, mt::GET) => decode_get_response(contents, extended, me_class, mib)?,
            (true, false, mt::GET_ALL_ALARMS) => MessageKind::GetAllAlarms {
                retrieval_mode: get_u8(contents, 0).0,
            },
            (false, true, mt::GET_ALL_ALARMS) => MessageKind::GetAllAlarmsResponse {
                num_alarms_nexts: get_u16(contents, 0).0,
            },
            (true, false, mt::GET_ALL_ALARMS_NEXT) => MessageKind::GetAllAlarmsNext {
                seq_num: get_u16(contents, 0).0,
            },
            (false, true, mt::GET_ALL_ALARMS_NEXT) => {
                let (alarmed_me_class, offset) = get_u16(contents, 0);
                let (alarmed_me_inst, offset) = get_u16(contents, offset);
                let (bitmap, _) = get_array::<ALARM_BITMAP_LEN>(contents, offset);

                MessageKind::GetAllAlarmsNextResponse {
                    alarmed_me_class,
                    alarmed_me_inst,
                    bitmap,
                }
            }
            (true, false, mt::MIB_UPLOAD) => MessageKind::MibUpload,
            (false, true, mt::MIB_UPLOAD) => MessageKind::MibUploadResponse {
                num_upload_nexts: get_u16(contents, 0).0,
            },
            (true, false, mt::MIB_UPLOAD_NEXT) => MessageKind::MibUploadNext {
                seq_num: get_u16(contents, 0).0,
            },
            (false, true, mt::MIB_UPLOAD_NEXT) => MessageKind::MibUploadNextResponse {
                body: decode_upload_body(contents, extended)?,
            },
            (true, false, mt::MIB_RESET) => MessageKind::MibReset,
            (false, true, mt::MIB_RESET) => MessageKind::MibResetResponse {
                reason: get_u8(contents, 0).0,
            },
            (false, false, mt::ALARM) => {
                let (bitmap, offset) = get_array::<ALARM_BITMAP_LEN>(contents, 0);
                let (seq_num, _) = get_u32(contents, offset);

                MessageKind::Alarm { bitmap, seq_num }
            }
            (true, false, mt::GET_NEXT) => {
                let (attr_mask, offset) = get_u16(contents, 0);
                let (seq_num, _) = get_u16(contents, offset);

                MessageKind::GetNext {
                    attr_mask,
                    seq_num,
                }
            }
            (false, true, mt::GET_NEXT) => {
                let (reason, offset) = get_u8(contents, 0);
                let (attr_mask, offset) = get_u16(contents, offset);
                let data = contents.get(offset..).unwrap_or_default().to_vec();

                MessageKind::GetNextResponse {
                    reason,
                    attr_mask,
                    data,
                }
            }
            _ => return Err(Error::UnknownMessageType { ar, ak, mt }),
        };

        Ok(kind)
    }

    /// Encodes the type-specific payload into a contents buffer.
    fn encode_contents(&self, extended: bool, me_class: u16) -> Result<Vec<u8>, Error> {
        let mib = crate::registry().get(me_class);

        let mut contents = Vec::new();

        match self {
            MessageKind::Create { attr_mask, values }
            | MessageKind::Set { attr_mask, values } => {
                put_u16(&mut contents, *attr_mask);
                encode_values(
                    &mut contents,
                    *attr_mask,
                    values,
                    extended,
                    mib.ok_or(Error::UnknownMib(me_class))?,
                )?;
            }
            MessageKind::CreateResponse {
                reason,
                attr_exec_mask,
            } => {
                contents.push(*reason);

                if *reason == reason::PARAMETER_ERROR {
                    put_u16(&mut contents, *attr_exec_mask);
                }
            }
            MessageKind::Delete | MessageKind::MibUpload | MessageKind::MibReset => {}
            MessageKind::DeleteResponse { reason } | MessageKind::MibResetResponse { reason } => {
                contents.push(*reason);
            }
            MessageKind::SetResponse {
                reason,
                opt_attr_mask,
                attr_exec_mask,
            } => {
                contents.push(*reason);

                if *reason == reason::ATTRIBUTES_FAILED {
                    put_u16(&mut contents, *opt_attr_mask);
                    put_u16(&mut contents, *attr_exec_mask);
                }
            }
            MessageKind::Get { attr_mask } => put_u16(&mut contents, *attr_mask),
            MessageKind::GetResponse {
                reason,
                attr_mask,
                opt_attr_mask,
                attr_exec_mask,
                attrs,
            } => {
                contents.push(*reason);
                put_u16(&mut contents, *attr_mask);

                if extended {
                    put_u16(&mut contents, *opt_attr_mask);
                    put_u16(&mut contents, *attr_exec_mask);
                }

                let mut values = Vec::new();

                for (number, value) in attrs {
                    let attr = mib
                        .and_then(|mib| mib.attr_by_number(*number))
                        .ok_or(Error::UnknownAttribute {
                            me_class,
                            number: *number,
                        })?;

                    if attr.is_table() {
                        // A table attribute reports its byte length; the
                        // rows themselves stream through get-next.
                        let length = value.first().and_then(|v| v.as_unsigned()).unwrap_or(0);
                        put_u32(&mut values, length as u32);
                    } else {
                        attr.encode_value(Some(value), &mut values)?;
                    }
                }

                if !extended {
                    if values.len() > BASELINE_VALUES_LIMIT {
                        return Err(Error::ContentsTooLong {
                            length: values.len(),
                            max_length: BASELINE_VALUES_LIMIT,
                        });
                    }

                    values.resize(BASELINE_VALUES_LIMIT, 0);
                }

                contents.extend_from_slice(&values);

                if !extended {
                    put_u16(&mut contents, *opt_attr_mask);
                    put_u16(&mut contents, *attr_exec_mask);
                }
            }
            MessageKind::GetAllAlarms { retrieval_mode } => contents.push(*retrieval_mode),
            MessageKind::GetAllAlarmsResponse { num_alarms_nexts } => {
                put_u16(&mut contents, *num_alarms_nexts);
            }
            MessageKind::GetAllAlarmsNext { seq_num } | MessageKind::MibUploadNext { seq_num } => {
                put_u16(&mut contents, *seq_num);
            }
            MessageKind::GetAllAlarmsNextResponse {
                alarmed_me_class,
                alarmed_me_inst,
                bitmap,
            } => {
                put_u16(&mut contents, *alarmed_me_class);
                put_u16(&mut contents, *alarmed_me_inst);
                contents.extend_from_slice(bitmap);
            }
            MessageKind::MibUploadResponse { num_upload_nexts } => {
                put_u16(&mut contents, *num_upload_nexts);
            }
            MessageKind::MibUploadNextResponse { body } => {
                encode_upload_body(&mut contents, body, extended)?;
            }
            MessageKind::Alarm { bitmap, seq_num } => {
                contents.extend_from_slice(bitmap);
                put_u32(&mut contents, *seq_num);
            }
            MessageKind::GetNext { attr_mask, seq_num } => {
                put_u16(&mut contents, *attr_mask);
                put_u16(&mut contents, *seq_num);
            }
            MessageKind::GetNextResponse {
                reason,
                attr_mask,
                data,
            } => {
                contents.push(*reason);
                put_u16(&mut contents, *attr_mask);
                contents.extend_from_slice(data);
            }
        }

        Ok(contents)
    }
}

/// The narrow database surface message processors need.
///
/// The concrete endpoint implements this by locking its database mutex per
/// call; tests implement it over a bare [`crate::database::Database`].
/// Passing the handle into [`Message::process`] keeps the message layer
/// free of any dependency on the endpoint type.
pub trait ServerHandle {
    /// Set attribute values.
    fn set(
        &self,
        onu_id: u16,
        me_class: u16,
        me_inst: u16,
        attr_mask: u16,
        values: &[(u8, AttrValue)],
        extended: bool,
    ) -> SetResult;

    /// Get attribute values.
    fn get(&self, onu_id: u16, me_class: u16, me_inst: u16, attr_mask: u16, extended: bool)
    -> GetResult;

    /// Get the next chunk of a latched table attribute.
    fn get_next(
        &self,
        onu_id: u16,
        me_class: u16,
        me_inst: u16,
        attr_mask: u16,
        seq_num: u16,
    ) -> GetNextResult;

    /// Create a managed entity instance.
    fn create(
        &self,
        onu_id: u16,
        me_class: u16,
        me_inst: u16,
        values: &[(u8, AttrValue)],
    ) -> CreateResult;

    /// Delete a managed entity instance.
    fn delete(&self, onu_id: u16, me_class: u16, me_inst: u16) -> StatusResult;

    /// Reset the MIB to its default state.
    fn reset(&self, onu_id: u16, me_class: u16, me_inst: u16) -> StatusResult;

    /// Latch a MIB snapshot for upload.
    fn upload(&self, onu_id: u16, me_class: u16, me_inst: u16, extended: bool) -> UploadResult;

    /// Retrieve one body of the latched MIB snapshot.
    fn upload_next(
        &self,
        onu_id: u16,
        me_class: u16,
        me_inst: u16,
        seq_num: u16,
        extended: bool,
    ) -> UploadNextResult;

    /// Latch the alarm status of all managed entities.
    fn get_all_alarms(
        &self,
        onu_id: u16,
        me_class: u16,
        me_inst: u16,
        retrieval_mode: u8,
    ) -> AlarmCountResult;

    /// Retrieve one latched alarm bitmap.
    fn get_all_alarms_next(
        &self,
        onu_id: u16,
        me_class: u16,
        me_inst: u16,
        seq_num: u16,
    ) -> AlarmNextResult;

    /// Apply an alarm bitmap to an instance's alarm state.
    fn set_alarm(&self, onu_id: u16, me_class: u16, me_inst: u16, bitmap: &AlarmBitmap);
}

/// An OMCI message: common header fields plus the type-specific payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// TR-451 channel termination name, when TR-451 framing is in use.
    pub cterm_name: Option<CtermName>,
    /// TR-451 ONU id.
    pub onu_id: u16,
    /// Transaction correlation identifier.
    pub tci: u16,
    /// Whether the message uses extended framing.
    pub extended: bool,
    /// Managed entity class.
    pub me_class: u16,
    /// Managed entity instance.
    pub me_inst: u16,
    /// Type-specific payload.
    pub kind: MessageKind,
}

impl Message {
    /// Encodes this message into a datagram buffer.
    pub fn encode(&self, tr451: bool) -> Result<Vec<u8>, Error> {
        let mut buf = Vec::with_capacity(BASELINE_FRAME_LEN + TR451_HEADER_LEN);

        if tr451 {
            let name = self.cterm_name.as_deref().unwrap_or("");

            buf.extend_from_slice(name.as_bytes());
            buf.resize(TR451_NAME_LEN, 0);
            put_u16(&mut buf, self.onu_id);
        }

        put_u16(&mut buf, self.tci);

        let (ar, ak, mt) = self.kind.type_fields();
        buf.push((u8::from(ar) << 6) | (u8::from(ak) << 5) | (mt & 0x1f));

        buf.push(if self.extended {
            DEV_ID_EXTENDED
        } else {
            DEV_ID_BASELINE
        });

        put_u16(&mut buf, self.me_class);
        put_u16(&mut buf, self.me_inst);

        let contents = self.kind.encode_contents(self.extended, self.me_class)?;

        if !self.extended {
            if contents.len() > BASELINE_CONTENTS_LEN {
                return Err(Error::ContentsTooLong {
                    length: contents.len(),
                    max_length: BASELINE_CONTENTS_LEN,
                });
            }

            let pad = BASELINE_CONTENTS_LEN - contents.len();
            buf.extend_from_slice(&contents);
            buf.extend(core::iter::repeat_n(0, pad));

            // CPCS-UU, CPI and CPCS-SDU trailer.
            buf.push(0);
            buf.push(0);
            put_u16(&mut buf, CPCS_SDU_FIXED);
        } else {
            if contents.len() > MAX_EXTENDED_CONTENTS_LEN {
                return Err(Error::ContentsTooLong {
                    length: contents.len(),
                    max_length: MAX_EXTENDED_CONTENTS_LEN,
                });
            }

            put_u16(&mut buf, contents.len() as u16);
            buf.extend_from_slice(&contents);
        }

        Ok(buf)
    }

    /// Decodes a datagram buffer into a message.
    ///
    /// Framing anomalies (bad device identifier, reserved type bit, bad
    /// trailer, length mismatch) are logged and decoding continues best
    /// effort; only a truncated header or an unknown message key fails.
    pub fn decode(buf: &[u8], tr451: bool) -> Result<Message, Error> {
        let mut offset = 0;

        let mut cterm_name = None;
        let mut onu_id = 0;

        if tr451 {
            if buf.len() < TR451_HEADER_LEN {
                return Err(FrameError::Truncated {
                    needed: TR451_HEADER_LEN,
                    available: buf.len(),
                }
                .into());
            }

            let name = trim_trailing_nuls(&buf[..TR451_NAME_LEN]);
            let name = core::str::from_utf8(name).map_err(|_| onusim_wire::WireError::Utf8)?;

            cterm_name = Some(CtermName::try_from(name).map_err(|_| Error::StringTooLong {
                max_length: TR451_NAME_LEN,
                string_length: name.len(),
            })?);

            (onu_id, offset) = get_u16(buf, TR451_NAME_LEN);
        }

        if buf.len() < offset + 8 {
            return Err(FrameError::Truncated {
                needed: offset + 8,
                available: buf.len(),
            }
            .into());
        }

        let (tci, next) = get_u16(buf, offset);
        let (type_byte, next) = get_u8(buf, next);
        let (dev_id, next) = get_u8(buf, next);

        if type_byte & 0x80 != 0 {
            error!("{}", FrameError::ReservedTypeBit(type_byte));
        }

        let ar = type_byte & 0x40 != 0;
        let ak = type_byte & 0x20 != 0;
        let mt = type_byte & 0x1f;

        let dev_id = if dev_id == DEV_ID_BASELINE || dev_id == DEV_ID_EXTENDED {
            dev_id
        } else {
            error!(
                "{}; {:#04x} (baseline) assumed",
                FrameError::DeviceId(dev_id),
                DEV_ID_BASELINE
            );

            DEV_ID_BASELINE
        };

        let extended = dev_id == DEV_ID_EXTENDED;

        let (me_class, next) = get_u16(buf, next);
        let (me_inst, next) = get_u16(buf, next);
        offset = next;

        let contents;

        if !extended {
            let (raw, next) = get_vec(buf, offset, BASELINE_CONTENTS_LEN);
            contents = raw;

            let (_cpcs_uu, next) = get_u8(buf, next);
            let (_cpi, next) = get_u8(buf, next);
            let (cpcs_sdu, next) = get_u16(buf, next);
            offset = next;

            if cpcs_sdu != CPCS_SDU_FIXED {
                error!("{}", FrameError::Trailer(cpcs_sdu));
            }
        } else {
            let (length, next) = get_u16(buf, offset);
            let (raw, next) = get_vec(buf, next, usize::from(length));
            contents = raw;
            offset = next;
        }

        if offset != buf.len() {
            error!(
                "{}",
                FrameError::LengthMismatch {
                    expected: offset,
                    actual: buf.len()
                }
            );
        }

        let kind = MessageKind::decode(ar, ak, mt, &contents, extended, me_class)?;

        Ok(Message {
            cterm_name,
            onu_id,
            tci,
            extended,
            me_class,
            me_inst,
            kind,
        })
    }

    /// Processes this message against the server, returning the response to
    /// send (if any).
    pub fn process(&self, server: &dyn ServerHandle) -> Option<Message> {
        let kind = match &self.kind {
            MessageKind::Create { values, .. } => {
                let results = server.create(self.onu_id, self.me_class, self.me_inst, values);

                Some(MessageKind::CreateResponse {
                    reason: results.reason,
                    attr_exec_mask: results.attr_exec_mask,
                })
            }
            MessageKind::Delete => {
                let results = server.delete(self.onu_id, self.me_class, self.me_inst);

                Some(MessageKind::DeleteResponse {
                    reason: results.reason,
                })
            }
            MessageKind::Set { attr_mask, values } => {
                let results = server.set(
                    self.onu_id,
                    self.me_class,
                    self.me_inst,
                    *attr_mask,
                    values,
                    self.extended,
                );

                Some(MessageKind::SetResponse {
                    reason: results.reason,
                    opt_attr_mask: results.opt_attr_mask,
                    attr_exec_mask: results.attr_exec_mask,
                })
            }
            MessageKind::Get { attr_mask } => {
                let results = server.get(
                    self.onu_id,
                    self.me_class,
                    self.me_inst,
                    *attr_mask,
                    self.extended,
                );

                Some(MessageKind::GetResponse {
                    reason: results.reason,
                    attr_mask: results.attr_mask,
                    opt_attr_mask: results.opt_attr_mask,
                    attr_exec_mask: results.attr_exec_mask,
                    attrs: results.attrs,
                })
            }
            MessageKind::GetAllAlarms { retrieval_mode } => {
                let results = server.get_all_alarms(
                    self.onu_id,
                    self.me_class,
                    self.me_inst,
                    *retrieval_mode,
                );

                Some(MessageKind::GetAllAlarmsResponse {
                    num_alarms_nexts: results.num_alarms_nexts,
                })
            }
            MessageKind::GetAllAlarmsNext { seq_num } => {
                let results =
                    server.get_all_alarms_next(self.onu_id, self.me_class, self.me_inst, *seq_num);

                Some(MessageKind::GetAllAlarmsNextResponse {
                    alarmed_me_class: results.alarmed_me_class,
                    alarmed_me_inst: results.alarmed_me_inst,
                    bitmap: results.bitmap,
                })
            }
            MessageKind::MibUpload => {
                let results =
                    server.upload(self.onu_id, self.me_class, self.me_inst, self.extended);

                Some(MessageKind::MibUploadResponse {
                    num_upload_nexts: results.num_upload_nexts,
                })
            }
            MessageKind::MibUploadNext { seq_num } => {
                let results = server.upload_next(
                    self.onu_id,
                    self.me_class,
                    self.me_inst,
                    *seq_num,
                    self.extended,
                );

                Some(MessageKind::MibUploadNextResponse {
                    body: results.body.unwrap_or_default(),
                })
            }
            MessageKind::MibReset => {
                let results = server.reset(self.onu_id, self.me_class, self.me_inst);

                Some(MessageKind::MibResetResponse {
                    reason: results.reason,
                })
            }
            MessageKind::GetNext { attr_mask, seq_num } => {
                let results = server.get_next(
                    self.onu_id,
                    self.me_class,
                    self.me_inst,
                    *attr_mask,
                    *seq_num,
                );

                Some(MessageKind::GetNextResponse {
                    reason: results.reason,
                    attr_mask: results.attr_mask,
                    data: results.data,
                })
            }
            MessageKind::Alarm { bitmap, .. } => {
                server.set_alarm(self.onu_id, self.me_class, self.me_inst, bitmap);

                None
            }
            // Responses are terminal: processing one never yields another
            // message.
            _ => None,
        };

        kind.map(|kind| self.reply(kind))
    }

    /// Builds a response carrying this message's header fields.
    pub fn reply(&self, kind: MessageKind) -> Message {
        Message {
            cterm_name: self.cterm_name.clone(),
            onu_id: self.onu_id,
            tci: self.tci,
            extended: self.extended,
            me_class: self.me_class,
            me_inst: self.me_inst,
            kind,
        }
    }
}

impl core::fmt::Display for Message {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{}(onu_id={}, tci={}, me_class={}, me_inst={}",
            self.kind.name(),
            self.onu_id,
            self.tci,
            self.me_class,
            self.me_inst
        )?;

        match &self.kind {
            MessageKind::Get { attr_mask }
            | MessageKind::Set { attr_mask, .. }
            | MessageKind::Create { attr_mask, .. } => {
                write!(f, ", attr_mask={:#06x}", attr_mask)?;
            }
            MessageKind::GetResponse {
                reason, attr_mask, ..
            } => write!(f, ", reason={:#03x}, attr_mask={:#06x}", reason, attr_mask)?,
            MessageKind::SetResponse { reason, .. }
            | MessageKind::CreateResponse { reason, .. }
            | MessageKind::DeleteResponse { reason }
            | MessageKind::MibResetResponse { reason }
            | MessageKind::GetNextResponse { reason, .. } => {
                write!(f, ", reason={:#03x}", reason)?;
            }
            MessageKind::MibUploadNext { seq_num } | MessageKind::GetAllAlarmsNext { seq_num } => {
                write!(f, ", seq_num={}", seq_num)?;
            }
            MessageKind::MibUploadResponse { num_upload_nexts } => {
                write!(f, ", num_upload_nexts={}", num_upload_nexts)?;
            }
            MessageKind::GetAllAlarmsResponse { num_alarms_nexts } => {
                write!(f, ", num_alarms_nexts={}", num_alarms_nexts)?;
            }
            MessageKind::Alarm { seq_num, .. } => write!(f, ", seq_num={}", seq_num)?,
            _ => {}
        }

        f.write_str(")")
    }
}

/// Decodes masked attribute values, ascending by attribute number.
///
/// An attribute number the schema doesn't declare stops value decoding:
/// its size is unknown, so the rest of the payload cannot be framed.
fn decode_values(
    contents: &[u8],
    mut offset: usize,
    attr_mask: u16,
    mib: Option<&Mib>,
) -> Vec<(u8, AttrValue)> {
    let mut values = Vec::new();

    let Some(mib) = mib else {
        return values;
    };

    for (number, _) in mask_indices(attr_mask) {
        let Some(attr) = mib.attr_by_number(number) else {
            debug!(
                "MIB {} attribute {} not found; supported attributes: {}",
                mib,
                number,
                mib.attr_names(None)
            );

            break;
        };

        match attr.decode_value(contents, offset) {
            Ok((value, next)) => {
                values.push((number, value));
                offset = next;
            }
            Err(e) => {
                warn!("MIB {} {} decode failed: {}", mib, attr, e);
                break;
            }
        }
    }

    values
}

/// Encodes masked attribute values, ascending by attribute number.
fn encode_values(
    contents: &mut Vec<u8>,
    attr_mask: u16,
    values: &[(u8, AttrValue)],
    extended: bool,
    mib: &Mib,
) -> Result<(), Error> {
    let mut size = 0;

    for (number, _) in mask_indices(attr_mask) {
        let Some(attr) = mib.attr_by_number(number) else {
            error!(
                "MIB {} attribute {} not found; supported attributes: {}",
                mib,
                number,
                mib.attr_names(None)
            );
            continue;
        };

        let Some((_, value)) = values.iter().find(|(n, _)| *n == number) else {
            continue;
        };

        if !extended && size + attr.size() > BASELINE_VALUES_LIMIT {
            warn!(
                "MIB {} {} dropped (too long for baseline message)",
                mib, attr
            );
            continue;
        }

        attr.encode_value(Some(value), contents)?;
        size += attr.size();
    }

    Ok(())
}

fn decode_get_response(
    contents: &[u8],
    extended: bool,
    me_class: u16,
    mib: Option<&Mib>,
) -> Result<MessageKind, Error> {
    let (reason, offset) = get_u8(contents, 0);
    let (attr_mask, mut offset) = get_u16(contents, offset);

    let (opt_attr_mask, attr_exec_mask) = if extended {
        let (opt, next) = get_u16(contents, offset);
        let (exec, next) = get_u16(contents, next);
        offset = next;
        (opt, exec)
    } else {
        // Baseline masks trail the fixed 25-byte value area.
        let (opt, _) = get_u16(contents, 1 + 2 + BASELINE_VALUES_LIMIT);
        let (exec, _) = get_u16(contents, 1 + 2 + BASELINE_VALUES_LIMIT + 2);
        (opt, exec)
    };

    let include_mask = attr_mask & !opt_attr_mask & !attr_exec_mask;

    let mut attrs = Vec::new();

    if let Some(mib) = mib {
        for (number, _) in mask_indices(include_mask) {
            let Some(attr) = mib.attr_by_number(number) else {
                // The attribute's size is unknown, so later values can't be
                // located either.
                warn!("MIB {} attribute {} not found; rest skipped", mib, number);
                break;
            };

            if attr.is_table() {
                let (length, next) = get_u32(contents, offset);
                attrs.push((number, vec![onusim_wire::Value::Unsigned(u64::from(length))]));
                offset = next;
            } else {
                let (value, next) = attr.decode_value(contents, offset)?;
                attrs.push((number, value));
                offset = next;
            }
        }
    } else if include_mask != 0 {
        error!("ME class {} unknown; Get response values not decoded", me_class);
    }

    Ok(MessageKind::GetResponse {
        reason,
        attr_mask,
        opt_attr_mask,
        attr_exec_mask,
        attrs,
    })
}

fn encode_upload_body(
    contents: &mut Vec<u8>,
    body: &UploadBody,
    extended: bool,
) -> Result<(), Error> {
    if extended {
        put_u16(contents, body.length() as u16);
    }

    for chunk in body.chunks() {
        let mib = crate::registry()
            .get(chunk.me_class)
            .ok_or(Error::UnknownMib(chunk.me_class))?;

        if extended {
            put_u16(contents, chunk.size() as u16);
        }

        put_u16(contents, chunk.me_class);
        put_u16(contents, chunk.me_inst);
        put_u16(contents, chunk.attr_mask());

        for (number, value) in chunk.attrs() {
            let attr = mib
                .attr_by_number(*number)
                .ok_or(Error::UnknownAttribute {
                    me_class: chunk.me_class,
                    number: *number,
                })?;

            attr.encode_value(Some(value), contents)?;
        }
    }

    Ok(())
}

fn decode_upload_body(contents: &[u8], extended: bool) -> Result<UploadBody, Error> {
    let mut body = UploadBody::default();
    let mut offset = 0;

    if extended {
        (_, offset) = get_u16(contents, offset);
    }

    while offset < contents.len() {
        if extended {
            (_, offset) = get_u16(contents, offset);
        }

        let (me_class, next) = get_u16(contents, offset);

        // Baseline bodies are zero-padded; class 0 marks the end.
        if me_class == 0 {
            break;
        }

        let mib = crate::registry()
            .get(me_class)
            .ok_or(Error::UnknownMib(me_class))?;

        let (me_inst, next) = get_u16(contents, next);
        let (attr_mask, next) = get_u16(contents, next);
        offset = next;

        let mut chunk = crate::database::UploadChunk::new(me_class, me_inst, extended);

        for (number, _) in mask_indices(attr_mask) {
            let attr = mib
                .attr_by_number(number)
                .ok_or(Error::UnknownAttribute { me_class, number })?;

            let (value, next) = attr.decode_value(contents, offset)?;
            chunk.push(number, value, attr.size());
            offset = next;
        }

        body.push(chunk);
    }

    Ok(body)
}

fn put_u16(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_be_bytes());
}

fn put_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_be_bytes());
}

fn get_u8(buf: &[u8], offset: usize) -> (u8, usize) {
    (buf.get(offset).copied().unwrap_or(0), offset + 1)
}

fn get_u16(buf: &[u8], offset: usize) -> (u16, usize) {
    let (bytes, next) = get_array::<2>(buf, offset);

    (u16::from_be_bytes(bytes), next)
}

fn get_u32(buf: &[u8], offset: usize) -> (u32, usize) {
    let (bytes, next) = get_array::<4>(buf, offset);

    (u32::from_be_bytes(bytes), next)
}

/// Reads `N` bytes at `offset`, zero-padding past the end of the buffer;
/// the offset always advances so that later fields stay aligned.
fn get_array<const N: usize>(buf: &[u8], offset: usize) -> ([u8; N], usize) {
    let mut out = [0u8; N];

    if let Some(available) = buf.len().checked_sub(offset) {
        let take = available.min(N);
        out[..take].copy_from_slice(&buf[offset..offset + take]);
    }

    (out, offset + N)
}

fn get_vec(buf: &[u8], offset: usize, len: usize) -> (Vec<u8>, usize) {
    let mut out = vec![0u8; len];

    if let Some(available) = buf.len().checked_sub(offset) {
        let take = available.min(len);
        out[..take].copy_from_slice(&buf[offset..offset + take]);
    }

    (out, offset + len)
}

fn trim_trailing_nuls(raw: &[u8]) -> &[u8] {
    let end = raw
        .iter()
        .rposition(|byte| *byte != 0)
        .map_or(0, |position| position + 1);

    &raw[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mibs;
    use pretty_assertions::assert_eq;

    fn request(me_class: u16, me_inst: u16, kind: MessageKind) -> Message {
        Message {
            cterm_name: Some(CtermName::try_from("cterm").unwrap()),
            onu_id: 42,
            tci: 7,
            extended: false,
            me_class,
            me_inst,
            kind,
        }
    }

    #[test]
    fn baseline_frame_is_48_bytes() {
        let message = request(mibs::ONU_G, 0, MessageKind::Get { attr_mask: 0xffff });

        assert_eq!(message.encode(false).unwrap().len(), BASELINE_FRAME_LEN);
        assert_eq!(
            message.encode(true).unwrap().len(),
            BASELINE_FRAME_LEN + TR451_HEADER_LEN
        );
    }

    #[test]
    fn extended_frame_length_matches_contents() {
        let mut message = request(mibs::ONU_G, 0, MessageKind::Get { attr_mask: 0xffff });
        message.extended = true;

        // 8-byte header, 2-byte length, 2-byte attribute mask.
        assert_eq!(message.encode(false).unwrap().len(), 12);
    }

    #[test]
    fn get_round_trips() {
        let message = request(mibs::ONU_G, 0, MessageKind::Get { attr_mask: 0x8400 });

        let encoded = message.encode(true).unwrap();

        assert_eq!(Message::decode(&encoded, true).unwrap(), message);
    }

    #[test]
    fn set_round_trips_with_values() {
        use onusim_wire::Value;

        let message = request(
            mibs::ONU_G,
            0,
            MessageKind::Set {
                attr_mask: 0x0400,
                values: vec![(6, vec![Value::Bool(true)])],
            },
        );

        let encoded = message.encode(true).unwrap();

        assert_eq!(Message::decode(&encoded, true).unwrap(), message);
    }

    #[test]
    fn alarm_round_trips() {
        let mut bitmap = [0u8; ALARM_BITMAP_LEN];
        bitmap[0] = 0b0010_0000;

        let message = request(
            mibs::ANI_G,
            1,
            MessageKind::Alarm {
                bitmap,
                seq_num: 3,
            },
        );

        let encoded = message.encode(true).unwrap();

        assert_eq!(encoded.len(), BASELINE_FRAME_LEN + TR451_HEADER_LEN);
        assert_eq!(Message::decode(&encoded, true).unwrap(), message);
    }

    #[test]
    fn get_response_round_trips_baseline() {
        use onusim_wire::Value;

        let message = request(
            mibs::ONU_DATA,
            0,
            MessageKind::GetResponse {
                reason: reason::SUCCESS,
                attr_mask: 0x8000,
                opt_attr_mask: 0x0007,
                attr_exec_mask: 0x0000,
                attrs: vec![(1, vec![Value::Unsigned(9)])],
            },
        );

        let encoded = message.encode(true).unwrap();

        assert_eq!(Message::decode(&encoded, true).unwrap(), message);
    }

    #[test]
    fn get_response_round_trips_extended() {
        use onusim_wire::Value;

        let mut message = request(
            mibs::ONU_G,
            0,
            MessageKind::GetResponse {
                reason: reason::SUCCESS,
                attr_mask: 0xc000,
                opt_attr_mask: 0x0000,
                attr_exec_mask: 0x0000,
                attrs: vec![
                    (1, vec![Value::Unsigned(1234)]),
                    (2, vec![Value::Str("v2".into())]),
                ],
            },
        );
        message.extended = true;

        let encoded = message.encode(true).unwrap();

        assert_eq!(Message::decode(&encoded, true).unwrap(), message);
    }

    #[test]
    fn unknown_message_key_is_rejected() {
        let mut encoded = request(mibs::ONU_G, 0, MessageKind::Get { attr_mask: 0 })
            .encode(false)
            .unwrap();

        // Patch the message type to an unregistered code (18 = Test).
        encoded[2] = 0x40 | 18;

        assert_eq!(
            Message::decode(&encoded, false),
            Err(Error::UnknownMessageType {
                ar: true,
                ak: false,
                mt: 18
            })
        );
    }

    #[test]
    fn truncated_header_is_rejected() {
        assert_eq!(
            Message::decode(&[0u8; 4], false),
            Err(Error::Frame(FrameError::Truncated {
                needed: 8,
                available: 4
            }))
        );
    }

    #[test]
    fn tr451_header_carries_name_and_onu_id() {
        let message = request(mibs::ONU_G, 0, MessageKind::Get { attr_mask: 0 });

        let encoded = message.encode(true).unwrap();

        assert_eq!(&encoded[..5], b"cterm");
        assert_eq!(encoded[5..TR451_NAME_LEN], [0u8; 25]);
        assert_eq!(encoded[TR451_NAME_LEN..TR451_HEADER_LEN], [0, 42]);

        let decoded = Message::decode(&encoded, true).unwrap();

        assert_eq!(decoded.cterm_name.as_deref(), Some("cterm"));
        assert_eq!(decoded.onu_id, 42);
    }

    #[test]
    fn bad_trailer_is_tolerated() {
        let message = request(mibs::ONU_G, 0, MessageKind::Get { attr_mask: 0x8000 });

        let mut encoded = message.encode(false).unwrap();
        encoded[46] = 0xff;
        encoded[47] = 0xff;

        // Logged, but decoded best effort.
        assert_eq!(Message::decode(&encoded, false).unwrap(), message);
    }
}
