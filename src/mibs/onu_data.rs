//! ONU data (G.988 9.1.3).

use crate::message::mt;
use crate::mib::{
    Access::{R, RW},
    Attr, Mib,
    Requirement::M,
};
use onusim_wire::{Datum, Value};

/// ONU data class number.
pub const NUMBER: u16 = 2;

/// Models the MIB itself: holds the `mib_data_sync` audit counter and
/// anchors the MIB reset/upload and get-all-alarms actions.
pub fn onu_data() -> Mib {
    Mib::new(
        NUMBER,
        "ONU data",
        "Models the MIB itself",
        vec![
            Attr::new(
                0,
                "me_inst",
                "Managed entity instance",
                R,
                M,
                [Datum::unsigned(2).with_fixed(Value::Unsigned(0))],
            ),
            Attr::new(
                1,
                "mib_data_sync",
                "MIB data sync",
                RW,
                M,
                [Datum::unsigned(1)],
            ),
        ],
    )
    .with_actions(&[
        mt::GET,
        mt::SET,
        mt::GET_ALL_ALARMS,
        mt::GET_ALL_ALARMS_NEXT,
        mt::MIB_RESET,
        mt::MIB_UPLOAD,
        mt::MIB_UPLOAD_NEXT,
    ])
}
