//! Wire-level request/response sessions: frames in, frames out.
//!
//! These tests drive the same path the server drives: raw datagram bytes
//! through `Message::decode`, `Message::process` against a database, and
//! `Message::encode` back to bytes.

use onusim::database::{
    ALARM_BITMAP_LEN, AlarmBitmap, AlarmCountResult, AlarmNextResult, CreateResult, Database,
    GetNextResult, GetResult, SetResult, StatusResult, UploadNextResult, UploadResult, reason,
};
use onusim::endpoint::{Config, Endpoint};
use onusim::message::{
    BASELINE_FRAME_LEN, CtermName, Message, MessageKind, ServerHandle, TR451_HEADER_LEN,
};
use onusim::mib::AttrValue;
use onusim::mibs;
use onusim_wire::Value;
use pretty_assertions::assert_eq;
use std::sync::Mutex;

const ONU: u16 = 42;

/// A server handle over a bare database, standing in for the endpoint.
struct Sim(Mutex<Database>);

impl Sim {
    fn new() -> Self {
        Self(Mutex::new(Database::with_options(ONU..=ONU, false, true)))
    }
}

impl ServerHandle for Sim {
    fn set(
        &self,
        onu_id: u16,
        me_class: u16,
        me_inst: u16,
        attr_mask: u16,
        values: &[(u8, AttrValue)],
        _extended: bool,
    ) -> SetResult {
        self.0
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
        self.0
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
        self.0
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
        self.0
            .lock()
            .unwrap()
            .create(onu_id, me_class, me_inst, values)
    }

    fn delete(&self, onu_id: u16, me_class: u16, me_inst: u16) -> StatusResult {
        self.0.lock().unwrap().delete(onu_id, me_class, me_inst)
    }

    fn reset(&self, onu_id: u16, me_class: u16, me_inst: u16) -> StatusResult {
        self.0.lock().unwrap().reset(onu_id, me_class, me_inst)
    }

    fn upload(&self, onu_id: u16, me_class: u16, me_inst: u16, extended: bool) -> UploadResult {
        self.0
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
        self.0
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
        self.0
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
        self.0
            .lock()
            .unwrap()
            .get_all_alarms_next(onu_id, me_class, me_inst, seq_num)
    }

    fn set_alarm(&self, onu_id: u16, me_class: u16, me_inst: u16, bitmap: &AlarmBitmap) {
        self.0
            .lock()
            .unwrap()
            .set_alarm(onu_id, me_class, me_inst, bitmap);
    }
}

fn request(extended: bool, me_class: u16, me_inst: u16, tci: u16, kind: MessageKind) -> Message {
    Message {
        cterm_name: Some(CtermName::try_from("cterm").unwrap()),
        onu_id: ONU,
        tci,
        extended,
        me_class,
        me_inst,
        kind,
    }
}

/// One round trip: encode the request, decode it as the server would,
/// process it, encode the response, decode it as the client would.
fn round_trip(sim: &Sim, message: Message) -> Message {
    let wire = message.encode(true).unwrap();

    let received = Message::decode(&wire, true).unwrap();
    assert_eq!(received, message);

    let response = received.process(sim).expect("a response");

    let wire = response.encode(true).unwrap();

    if !response.extended {
        assert_eq!(wire.len(), BASELINE_FRAME_LEN + TR451_HEADER_LEN);
    }

    let decoded = Message::decode(&wire, true).unwrap();
    assert_eq!(decoded, response);

    // Responses echo the transaction correlation id.
    assert_eq!(decoded.tci, message.tci);

    decoded
}

#[test]
fn extended_get_reports_default_onu_g_masks() {
    let sim = Sim::new();

    let response = round_trip(
        &sim,
        request(true, mibs::ONU_G, 0, 1, MessageKind::Get { attr_mask: 0xffff }),
    );

    // Mandatory attributes 1-4, 6 and 7 are present; 5 and 14-16 are not
    // declared.
    match response.kind {
        MessageKind::GetResponse {
            reason: r,
            attr_mask,
            opt_attr_mask,
            attr_exec_mask,
            ref attrs,
        } => {
            assert_eq!(r, reason::ATTRIBUTES_FAILED);
            assert_eq!(attr_mask, 0xf600);
            assert_eq!(opt_attr_mask, 0x0807);
            assert_eq!(attr_exec_mask, 0x0000);
            assert_eq!(attrs.len(), 6);
        }
        ref other => panic!("unexpected response {:?}", other),
    }
}

#[test]
fn get_response_masks_are_a_subset_of_the_request() {
    let sim = Sim::new();

    // Attribute 5 is not declared, 6 is battery_backup.
    let request_mask = 0x0c00;

    let response = round_trip(
        &sim,
        request(
            false,
            mibs::ONU_G,
            0,
            4,
            MessageKind::Get {
                attr_mask: request_mask,
            },
        ),
    );

    match response.kind {
        MessageKind::GetResponse {
            attr_mask,
            opt_attr_mask,
            attr_exec_mask,
            ..
        } => {
            assert_eq!(attr_mask & !request_mask, 0);
            assert_eq!(opt_attr_mask & !request_mask, 0);
            assert_eq!(attr_exec_mask & !request_mask, 0);
            assert_eq!(attr_mask, 0x0400);
            assert_eq!(opt_attr_mask, 0x0800);
        }
        ref other => panic!("unexpected response {:?}", other),
    }
}

#[test]
fn set_then_get_battery_backup() {
    let sim = Sim::new();

    let response = round_trip(
        &sim,
        request(
            false,
            mibs::ONU_G,
            0,
            2,
            MessageKind::Set {
                attr_mask: 0x0400,
                values: vec![(6, vec![Value::Bool(true)])],
            },
        ),
    );

    assert_eq!(
        response.kind,
        MessageKind::SetResponse {
            reason: reason::SUCCESS,
            opt_attr_mask: 0,
            attr_exec_mask: 0,
        }
    );

    assert_eq!(sim.0.lock().unwrap().mib_data_sync(ONU), Some(1));

    let response = round_trip(
        &sim,
        request(false, mibs::ONU_G, 0, 3, MessageKind::Get { attr_mask: 0x0400 }),
    );

    match response.kind {
        MessageKind::GetResponse {
            reason: r,
            attr_mask,
            ref attrs,
            ..
        } => {
            assert_eq!(r, reason::SUCCESS);
            assert_eq!(attr_mask, 0x0400);
            assert_eq!(attrs, &vec![(6, vec![Value::Bool(true)])]);
        }
        ref other => panic!("unexpected response {:?}", other),
    }
}

#[test]
fn mib_reset_restores_defaults() {
    let sim = Sim::new();

    round_trip(
        &sim,
        request(
            false,
            mibs::ONU_G,
            0,
            1,
            MessageKind::Set {
                attr_mask: 0x0400,
                values: vec![(6, vec![Value::Bool(true)])],
            },
        ),
    );

    let response = round_trip(
        &sim,
        request(false, mibs::ONU_DATA, 0, 2, MessageKind::MibReset),
    );

    assert_eq!(
        response.kind,
        MessageKind::MibResetResponse {
            reason: reason::SUCCESS
        }
    );

    let response = round_trip(
        &sim,
        request(false, mibs::ONU_G, 0, 3, MessageKind::Get { attr_mask: 0x0400 }),
    );

    match response.kind {
        MessageKind::GetResponse { ref attrs, .. } => {
            assert_eq!(attrs, &vec![(6, vec![Value::Bool(false)])]);
        }
        ref other => panic!("unexpected response {:?}", other),
    }
}

#[test]
fn upload_session_covers_all_instances() {
    let sim = Sim::new();

    let response = round_trip(
        &sim,
        request(false, mibs::ONU_DATA, 0, 1, MessageKind::MibUpload),
    );

    let MessageKind::MibUploadResponse { num_upload_nexts } = response.kind else {
        panic!("unexpected response {:?}", response.kind);
    };

    assert!(num_upload_nexts > 0);

    let mut seen = std::collections::BTreeSet::new();

    for seq_num in 0..num_upload_nexts {
        let response = round_trip(
            &sim,
            request(
                false,
                mibs::ONU_DATA,
                0,
                2 + seq_num,
                MessageKind::MibUploadNext { seq_num },
            ),
        );

        let MessageKind::MibUploadNextResponse { body } = response.kind else {
            panic!("unexpected response {:?}", response.kind);
        };

        assert!(!body.is_empty());

        for chunk in body.chunks() {
            seen.insert((chunk.me_class, chunk.me_inst));
        }
    }

    // Every instance materialized for this ONU appears in the stream.
    for expected in [
        (mibs::ONU_DATA, 0),
        (mibs::SOFTWARE_IMAGE, 0x0101),
        (mibs::ONU_G, 0),
        (mibs::ONU2_G, 0),
        (mibs::ANI_G, 1),
        (mibs::PPTP_ETH_UNI, 257),
        (mibs::TCONT, 0x8000),
    ] {
        assert!(seen.contains(&expected), "missing {:?}", expected);
    }

    // A sequence number past the end is an empty body (reason 0b0001 at
    // the database level; the response has no reason field).
    let response = round_trip(
        &sim,
        request(
            false,
            mibs::ONU_DATA,
            0,
            99,
            MessageKind::MibUploadNext {
                seq_num: num_upload_nexts,
            },
        ),
    );

    assert_eq!(
        response.kind,
        MessageKind::MibUploadNextResponse {
            body: Default::default()
        }
    );
}

#[test]
fn alarm_then_get_all_alarms() {
    let sim = Sim::new();

    // The autonomous Alarm message applies to the database and produces
    // no response.
    let mut bitmap = [0u8; ALARM_BITMAP_LEN];
    bitmap[0] = 0b0010_0000;

    let alarm = request(
        false,
        mibs::ANI_G,
        1,
        0,
        MessageKind::Alarm {
            bitmap,
            seq_num: 1,
        },
    );

    let wire = alarm.encode(true).unwrap();
    let received = Message::decode(&wire, true).unwrap();

    assert!(received.process(&sim).is_none());

    let response = round_trip(
        &sim,
        request(
            false,
            mibs::ONU_DATA,
            0,
            5,
            MessageKind::GetAllAlarms { retrieval_mode: 0 },
        ),
    );

    assert_eq!(
        response.kind,
        MessageKind::GetAllAlarmsResponse {
            num_alarms_nexts: 1
        }
    );

    let response = round_trip(
        &sim,
        request(
            false,
            mibs::ONU_DATA,
            0,
            6,
            MessageKind::GetAllAlarmsNext { seq_num: 0 },
        ),
    );

    assert_eq!(
        response.kind,
        MessageKind::GetAllAlarmsNextResponse {
            alarmed_me_class: mibs::ANI_G,
            alarmed_me_inst: 1,
            bitmap,
        }
    );
}

#[test]
fn baseline_table_with_scalar_is_a_parameter_error() {
    let sim = Sim::new();

    round_trip(
        &sim,
        request(
            false,
            mibs::EXT_VLAN_TAG,
            1,
            1,
            MessageKind::Create {
                attr_mask: 0x8000,
                values: vec![(1, vec![Value::Unsigned(2)])],
            },
        ),
    );

    let response = round_trip(
        &sim,
        request(
            false,
            mibs::EXT_VLAN_TAG,
            1,
            2,
            MessageKind::Get {
                attr_mask: 0x0400 | 0x2000,
            },
        ),
    );

    match response.kind {
        MessageKind::GetResponse {
            reason: r,
            attr_mask,
            ref attrs,
            ..
        } => {
            assert_eq!(r, reason::PARAMETER_ERROR);
            assert_eq!(attr_mask, 0);
            assert!(attrs.is_empty());
        }
        ref other => panic!("unexpected response {:?}", other),
    }
}

#[test]
fn create_delete_session() {
    let sim = Sim::new();

    let response = round_trip(
        &sim,
        request(
            false,
            mibs::GEM_PORT_NET_CTP,
            3,
            1,
            MessageKind::Create {
                attr_mask: 0x8000 | 0x4000,
                values: vec![
                    (1, vec![Value::Unsigned(100)]),
                    (2, vec![Value::Unsigned(0x8000)]),
                ],
            },
        ),
    );

    assert_eq!(
        response.kind,
        MessageKind::CreateResponse {
            reason: reason::SUCCESS,
            attr_exec_mask: 0,
        }
    );

    let response = round_trip(
        &sim,
        request(false, mibs::GEM_PORT_NET_CTP, 3, 2, MessageKind::Delete),
    );

    assert_eq!(
        response.kind,
        MessageKind::DeleteResponse {
            reason: reason::SUCCESS
        }
    );

    // Deleting again: the instance is gone.
    let response = round_trip(
        &sim,
        request(false, mibs::GEM_PORT_NET_CTP, 3, 3, MessageKind::Delete),
    );

    assert_eq!(
        response.kind,
        MessageKind::DeleteResponse {
            reason: reason::UNKNOWN_INSTANCE
        }
    );
}

#[tokio::test]
async fn server_filters_foreign_cterm_and_onu_id() {
    let endpoint = Endpoint::server(Config {
        server_addr: "127.0.0.1:0".parse().unwrap(),
        ..Config::default()
    })
    .await
    .unwrap();

    let get = MessageKind::Get { attr_mask: 0x8000 };

    let mut foreign_name = request(false, mibs::ONU_G, 0, 1, get.clone());
    foreign_name.cterm_name = Some(CtermName::try_from("other").unwrap());

    assert!(endpoint.process(&foreign_name).is_none());

    let mut foreign_onu = request(false, mibs::ONU_G, 0, 1, get.clone());
    foreign_onu.onu_id = ONU + 1;

    assert!(endpoint.process(&foreign_onu).is_none());

    let valid = request(false, mibs::ONU_G, 0, 1, get);

    assert!(endpoint.process(&valid).is_some());
}

#[tokio::test]
async fn client_server_round_trip_over_udp() {
    let server = std::sync::Arc::new(
        Endpoint::server(Config {
            server_addr: "127.0.0.1:0".parse().unwrap(),
            ..Config::default()
        })
        .await
        .unwrap(),
    );

    let server_addr = server.local_addr().unwrap();

    let serve = std::sync::Arc::clone(&server);
    tokio::spawn(async move {
        let _ = serve.serve().await;
    });

    let client = Endpoint::client(Config {
        server_addr,
        ..Config::default()
    })
    .await
    .unwrap();

    let message = request(false, mibs::ONU_G, 0, 9, MessageKind::Get { attr_mask: 0x0400 });

    client.send(&message, None).await.unwrap();

    let (response, from) = client.recv_timeout().await.unwrap();

    assert_eq!(from, server_addr);
    assert_eq!(response.tci, 9);

    match response.kind {
        MessageKind::GetResponse {
            reason: r,
            attr_mask,
            ..
        } => {
            assert_eq!(r, reason::SUCCESS);
            assert_eq!(attr_mask, 0x0400);
        }
        ref other => panic!("unexpected response {:?}", other),
    }
}
