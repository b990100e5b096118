//! Physical path termination point Ethernet UNI (G.988 9.5.1).

use crate::message::mt;
use crate::mib::{
    Access::{R, RW},
    AlarmDef, Attr, ChangeDef, Mib,
    Requirement::{M, O},
};
use onusim_wire::Datum;

/// PPTP Ethernet UNI class number.
pub const NUMBER: u16 = 11;

/// Represents a physical Ethernet interface.
pub fn pptp_eth_uni() -> Mib {
    Mib::new(
        NUMBER,
        "PPTP Ethernet UNI",
        "Represents a physical Ethernet interface",
        vec![
            Attr::new(
                0,
                "me_inst",
                "Managed entity instance",
                R,
                M,
                [Datum::unsigned(2)],
            ),
            Attr::new(1, "expected_type", "Expected type", RW, M, [Datum::unsigned(1)]),
            Attr::new(2, "sensed_type", "Sensed type", R, O, [Datum::unsigned(1)]),
            Attr::new(
                3,
                "auto_detection_conf",
                "Auto detection configuration",
                RW,
                M,
                [Datum::unsigned(1)],
            ),
            Attr::new(
                4,
                "eth_loop_conf",
                "Ethernet loopback configuration",
                RW,
                M,
                [Datum::unsigned(1)],
            ),
            Attr::new(
                5,
                "admin_state",
                "Administrative state",
                RW,
                M,
                [Datum::enumeration(1, &["unlock", "lock"])],
            ),
            Attr::new(
                6,
                "oper_state",
                "Operational state",
                R,
                O,
                [Datum::enumeration(1, &["enabled", "disabled"])],
            ),
            Attr::new(7, "config_ind", "Configuration ind", R, M, [Datum::unsigned(1)]),
            Attr::new(8, "max_frame_size", "Max frame size", RW, M, [Datum::unsigned(2)]),
            Attr::new(
                9,
                "dte_dce_ind",
                "DTE or DCE ind",
                RW,
                M,
                [Datum::enumeration(1, &["dce-mdix", "dte-mdi", "auto"])],
            ),
            Attr::new(10, "pause_time", "Pause time", RW, O, [Datum::unsigned(2)]),
            Attr::new(
                11,
                "bridged_ip_ind",
                "Bridged or IP ind",
                RW,
                O,
                [Datum::enumeration(
                    1,
                    &["bridged", "ip-router", "depends-on-circuit-pack"],
                )],
            ),
            Attr::new(12, "arc", "ARC", RW, O, [Datum::unsigned(1)]),
            Attr::new(13, "arc_interval", "ARC interval", RW, O, [Datum::unsigned(1)]),
            Attr::new(
                14,
                "pppoe_filter",
                "PPPoE filter",
                RW,
                O,
                [Datum::enumeration(1, &["allow-all", "pppoe-only"])],
            ),
            Attr::new(
                15,
                "power_control",
                "Power control",
                RW,
                O,
                [Datum::enumeration(1, &["enabled", "disabled"])],
            ),
        ],
    )
    .with_actions(&[mt::GET, mt::SET])
    .with_changes(vec![
        ChangeDef {
            number: 2,
            name: "sensed_type",
        },
        ChangeDef {
            number: 6,
            name: "oper_state",
        },
        ChangeDef {
            number: 12,
            name: "arc_timer_expiration",
        },
    ])
    .with_alarms(vec![AlarmDef {
        number: 0,
        name: "lan-los",
        description: "No carrier at the Ethernet UNI",
    }])
}
