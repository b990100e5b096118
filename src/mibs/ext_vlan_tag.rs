//! Extended VLAN tagging operation configuration data (G.988 9.3.13).

use crate::message::mt;
use crate::mib::{
    Access::{R, RW, RWC},
    Attr, Mib,
    Requirement::{M, O},
};
use onusim_wire::{Datum, Value};

/// Extended VLAN tagging operation configuration data class number.
pub const NUMBER: u16 = 171;

/// Row size of the received frame VLAN tagging operation table.
pub const OP_TABLE_ROW_SIZE: usize = 16;

/// Associates VLAN tagging operations with an upstream termination point.
pub fn ext_vlan_tag() -> Mib {
    Mib::new(
        NUMBER,
        "Extended VLAN tagging operation configuration data",
        "Associates VLAN tagging operations with a termination point",
        vec![
            Attr::new(
                0,
                "me_inst",
                "Managed entity instance",
                R,
                M,
                [Datum::unsigned(2)],
            ),
            Attr::new(
                1,
                "association_type",
                "Association type",
                RWC,
                M,
                [Datum::unsigned(1)],
            ),
            Attr::new(
                2,
                "rx_frame_vlan_tag_op_table_max_size",
                "Received frame VLAN tagging operation table max size",
                R,
                M,
                [Datum::unsigned(2).with_fixed(Value::Unsigned(16))],
            ),
            Attr::new(3, "input_tpid", "Input TPID", RW, M, [Datum::unsigned(2)]),
            Attr::new(4, "output_tpid", "Output TPID", RW, M, [Datum::unsigned(2)]),
            Attr::new(
                5,
                "downstream_mode",
                "Downstream mode",
                RW,
                M,
                [Datum::unsigned(1)],
            ),
            Attr::new(
                6,
                "rx_frame_vlan_tag_op_table",
                "Received frame VLAN tagging operation table",
                RW,
                M,
                [Datum::table(OP_TABLE_ROW_SIZE)],
            ),
            Attr::new(
                7,
                "associated_me_ptr",
                "Associated ME pointer",
                RWC,
                M,
                [Datum::unsigned(2)],
            ),
            Attr::new(
                8,
                "dscp_pbit_mapping",
                "DSCP to P-bit mapping",
                RW,
                O,
                [Datum::bytes(24)],
            ),
            Attr::new(
                9,
                "enhanced_mode",
                "Enhanced mode",
                RWC,
                O,
                [Datum::boolean(1)],
            ),
            Attr::new(
                10,
                "enhanced_rx_classification_table",
                "Enhanced received classification and operation table",
                RW,
                M,
                [Datum::table(OP_TABLE_ROW_SIZE)],
            ),
        ],
    )
    .with_actions(&[mt::CREATE, mt::DELETE, mt::GET, mt::SET, mt::GET_NEXT])
}
