//! T-CONT (G.988 9.2.2).

use crate::message::mt;
use crate::mib::{
    Access::{R, RW},
    Attr, Mib,
    Requirement::M,
};
use onusim_wire::{Datum, Value};

/// T-CONT class number.
pub const NUMBER: u16 = 262;

/// Represents a traffic container, the upstream scheduling unit of a PON.
pub fn tcont() -> Mib {
    Mib::new(
        NUMBER,
        "T-CONT",
        "Represents a T-CONT",
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
                "alloc_id",
                "Alloc-ID",
                RW,
                M,
                [Datum::unsigned(2).with_default(Value::Unsigned(0xffff))],
            ),
            Attr::new(
                2,
                "deprecated",
                "Deprecated",
                R,
                M,
                [Datum::unsigned(1).with_fixed(Value::Unsigned(1))],
            ),
            Attr::new(
                3,
                "policy",
                "Policy",
                RW,
                M,
                [Datum::enumeration(1, &["null", "strict-priority", "wrr"])],
            ),
        ],
    )
    .with_actions(&[mt::GET, mt::SET])
}
