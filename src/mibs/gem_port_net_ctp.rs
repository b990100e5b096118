//! GEM port network CTP (G.988 9.2.3).

use crate::message::mt;
use crate::mib::{
    Access::{R, RWC},
    AlarmDef, Attr, Mib,
    Requirement::{M, O},
};
use onusim_wire::Datum;

/// GEM port network CTP class number.
pub const NUMBER: u16 = 268;

/// Represents one GEM port: instances are created and deleted by the OLT.
pub fn gem_port_net_ctp() -> Mib {
    Mib::new(
        NUMBER,
        "GEM port network CTP",
        "Represents a GEM port network connection termination point",
        vec![
            Attr::new(
                0,
                "me_inst",
                "Managed entity instance",
                R,
                M,
                [Datum::unsigned(2)],
            ),
            Attr::new(1, "port_id", "Port ID", RWC, M, [Datum::unsigned(2)]),
            Attr::new(2, "tcont_ptr", "T-CONT pointer", RWC, M, [Datum::unsigned(2)]),
            Attr::new(3, "direction", "Direction", RWC, M, [Datum::unsigned(1)]),
            Attr::new(
                4,
                "traffic_mgmt_ptr_us",
                "Traffic management pointer, upstream",
                RWC,
                M,
                [Datum::unsigned(2)],
            ),
            Attr::new(
                5,
                "traffic_desc_prof_ptr_us",
                "Traffic descriptor profile pointer, upstream",
                RWC,
                O,
                [Datum::unsigned(2)],
            ),
            Attr::new(6, "uni_count", "UNI counter", R, O, [Datum::unsigned(1)]),
            Attr::new(
                7,
                "pri_queue_ptr_ds",
                "Priority queue pointer, downstream",
                RWC,
                M,
                [Datum::unsigned(2)],
            ),
            Attr::new(
                8,
                "encryption_state",
                "Encryption state",
                R,
                O,
                [Datum::unsigned(1)],
            ),
            Attr::new(
                9,
                "traffic_desc_prof_ptr_ds",
                "Traffic descriptor profile pointer, downstream",
                RWC,
                O,
                [Datum::unsigned(2)],
            ),
            Attr::new(
                10,
                "encryption_key_ring",
                "Encryption key ring",
                RWC,
                O,
                [Datum::enumeration(
                    1,
                    &[
                        "no-encryption",
                        "unicast-encryption-both-dir",
                        "broadcast-encryption",
                        "unicast-encryption-ds",
                    ],
                )],
            ),
        ],
    )
    .with_actions(&[mt::CREATE, mt::DELETE, mt::GET, mt::SET])
    .with_alarms(vec![AlarmDef {
        number: 5,
        name: "end-to-end-loss-of-continuity",
        description: "Loss of continuity on the GEM port network CTP",
    }])
}
