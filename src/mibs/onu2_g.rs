//! ONU2-G (G.988 9.1.2).

use crate::message::mt;
use crate::mib::{
    Access::{R, RW},
    Attr, ChangeDef, Mib,
    Requirement::{M, O},
};
use onusim_wire::{Datum, Value};

/// ONU2-G class number.
pub const NUMBER: u16 = 257;

/// OMCC version advertised when only baseline messages are supported.
pub const OMCC_VERSION_BASELINE: u64 = 0xa3;

/// OMCC version advertised when extended messages are supported too.
pub const OMCC_VERSION_EXTENDED: u64 = 0xb4;

const AES: &[&str] = &["reserved", "aes-128"];
const CONNECTIVITY: &[&str] = &["N:1", "1:M", "1:P", "N:M", "1:MP", "N:P", "N:MP"];

/// Contains additional attributes associated with a PON ONU.
pub fn onu2_g() -> Mib {
    Mib::new(
        NUMBER,
        "ONU2-G",
        "Contains additional attributes associated with a PON ONU",
        vec![
            Attr::new(
                0,
                "me_inst",
                "Managed entity instance",
                R,
                M,
                [Datum::unsigned(2).with_fixed(Value::Unsigned(0))],
            ),
            Attr::new(1, "equipment_id", "Equipment ID", R, O, [Datum::string(20)]),
            Attr::new(2, "omcc_version", "OMCC version", R, M, [Datum::unsigned(1)]),
            Attr::new(
                3,
                "vendor_product_code",
                "Vendor product code",
                R,
                O,
                [Datum::string(2)],
            ),
            Attr::new(
                4,
                "security_capability",
                "Security capability",
                R,
                M,
                [Datum::enumeration(1, AES).with_default(Value::Enum("aes-128"))],
            ),
            Attr::new(
                5,
                "security_mode",
                "Security mode",
                RW,
                M,
                [Datum::enumeration(1, AES).with_default(Value::Enum("aes-128"))],
            ),
            Attr::new(
                6,
                "total_priority_queue_number",
                "Total priority queue number",
                R,
                M,
                [Datum::unsigned(2)],
            ),
            Attr::new(
                7,
                "total_traf_sched_number",
                "Total traffic scheduler number",
                R,
                M,
                [Datum::unsigned(1)],
            ),
            // Attribute 8 is deprecated and deliberately not implemented.
            Attr::new(
                9,
                "total_gem_port_number",
                "Total GEM port-ID number",
                R,
                O,
                [Datum::unsigned(2)],
            ),
            Attr::new(
                10,
                "sys_up_time",
                "SysUpTime",
                R,
                O,
                [Datum::unsigned(4).with_units("10ms")],
            ),
            Attr::new(
                11,
                "connectivity_capability",
                "Connectivity capability",
                R,
                O,
                [Datum::bits(2, CONNECTIVITY)],
            ),
            Attr::new(
                12,
                "connectivity_mode",
                "Current connectivity mode",
                RW,
                O,
                [Datum::enumeration(1, CONNECTIVITY)],
            ),
            Attr::new(
                13,
                "qos_config_flexibility",
                "QoS configuration flexibility",
                R,
                O,
                [Datum::bits(2, &["1", "2", "3", "4", "5", "6"])],
            ),
            Attr::new(
                14,
                "priority_queue_scale_factor",
                "Priority queue scale factor",
                RW,
                O,
                [Datum::unsigned(2)],
            ),
        ],
    )
    .with_actions(&[mt::GET, mt::SET])
    .with_changes(vec![ChangeDef {
        number: 2,
        name: "omcc_version",
    }])
}
