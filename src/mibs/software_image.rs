//! Software image (G.988 9.1.4).

use crate::message::mt;
use crate::mib::{
    Access::R,
    Attr, ChangeDef, Mib,
    Requirement::{M, O},
};
use onusim_wire::Datum;

/// Software image class number.
pub const NUMBER: u16 = 7;

/// Models an executable software image. Instances are numbered
/// `(slot << 8) | image`, two images per slot.
pub fn software_image() -> Mib {
    Mib::new(
        NUMBER,
        "Software image",
        "Models an executable software image",
        vec![
            Attr::new(
                0,
                "me_inst",
                "Managed entity instance",
                R,
                M,
                [Datum::unsigned(2)],
            ),
            Attr::new(1, "version", "Version", R, M, [Datum::string(14)]),
            Attr::new(2, "is_committed", "Is committed", R, M, [Datum::boolean(1)]),
            Attr::new(3, "is_active", "Is active", R, M, [Datum::boolean(1)]),
            Attr::new(4, "is_valid", "Is valid", R, M, [Datum::boolean(1)]),
            Attr::new(5, "product_code", "Product code", R, O, [Datum::string(25)]),
            Attr::new(6, "image_hash", "Image hash", R, O, [Datum::bytes(16)]),
        ],
    )
    .with_actions(&[mt::GET])
    .with_changes(vec![
        ChangeDef {
            number: 1,
            name: "version",
        },
        ChangeDef {
            number: 2,
            name: "is_committed",
        },
        ChangeDef {
            number: 3,
            name: "is_active",
        },
        ChangeDef {
            number: 4,
            name: "is_valid",
        },
        ChangeDef {
            number: 5,
            name: "product_code",
        },
        ChangeDef {
            number: 6,
            name: "image_hash",
        },
    ])
}
