//! ONU-G (G.988 9.1.1).

use crate::message::mt;
use crate::mib::{
    Access::{R, RW},
    AlarmDef, Attr, ChangeDef, Mib, NotificationDef,
    Requirement::{M, O},
};
use onusim_wire::{Datum, Value};

/// ONU-G class number.
pub const NUMBER: u16 = 256;

/// Represents the ONU as equipment.
pub fn onu_g() -> Mib {
    Mib::new(
        NUMBER,
        "ONU-G",
        "Represents the ONU as equipment",
        vec![
            Attr::new(
                0,
                "me_inst",
                "Managed entity instance",
                R,
                M,
                [Datum::unsigned(2).with_fixed(Value::Unsigned(0))],
            ),
            Attr::new(1, "vendor_id", "Vendor ID", R, M, [Datum::unsigned(4)]),
            Attr::new(
                2,
                "version",
                "Version",
                R,
                M,
                [Datum::string(14).with_default(Value::Str("v1".into()))],
            ),
            Attr::new(
                3,
                "serial_number",
                "Serial number",
                R,
                M,
                [Datum::string(4), Datum::unsigned(4)],
            ),
            Attr::new(
                4,
                "traffic_management",
                "Traffic management option",
                R,
                M,
                [Datum::enumeration(
                    1,
                    &[
                        "priority-controlled",
                        "rate-controlled",
                        "priority-and-rate-controlled",
                    ],
                )],
            ),
            // Attribute 5 is deprecated and deliberately not implemented.
            Attr::new(
                6,
                "battery_backup",
                "Battery backup",
                RW,
                M,
                [Datum::boolean(1)],
            ),
            Attr::new(
                7,
                "admin_state",
                "Administrative state",
                RW,
                M,
                [Datum::enumeration(1, &["unlock", "lock"])],
            ),
            Attr::new(
                8,
                "oper_state",
                "Operational state",
                R,
                O,
                [Datum::enumeration(1, &["enabled", "disabled"])],
            ),
            Attr::new(
                9,
                "survival_time",
                "ONU survival time",
                R,
                O,
                [Datum::unsigned(1).with_units("ms")],
            ),
            Attr::new(
                10,
                "logical_onu_id",
                "Logical ONU ID",
                R,
                O,
                [Datum::string(24)],
            ),
            Attr::new(
                11,
                "logical_password",
                "Logical password",
                R,
                O,
                [Datum::string(12)],
            ),
            Attr::new(
                12,
                "credentials_status",
                "Credentials status",
                RW,
                O,
                [Datum::enumeration(
                    1,
                    &[
                        "initial",
                        "successful",
                        "loid-error",
                        "password-error",
                        "duplicate-loid",
                    ],
                )],
            ),
            Attr::new(
                13,
                "extended_tc_options",
                "Extended TC-layer options",
                R,
                O,
                [Datum::bits(1, &["annex-c", "annex-d"])],
            ),
        ],
    )
    .with_actions(&[mt::GET, mt::SET])
    .with_notifications(vec![NotificationDef {
        number: 0,
        name: "test-result",
    }])
    .with_changes(vec![
        ChangeDef {
            number: 8,
            name: "oper_state",
        },
        ChangeDef {
            number: 10,
            name: "logical_onu_id",
        },
        ChangeDef {
            number: 11,
            name: "logical_password",
        },
    ])
    .with_alarms(vec![
        AlarmDef {
            number: 0,
            name: "equipment",
            description: "Equipment alarm",
        },
        AlarmDef {
            number: 1,
            name: "powering",
            description: "Powering alarm",
        },
    ])
}
