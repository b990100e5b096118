//! ANI-G (G.988 9.2.1).

use crate::message::mt;
use crate::mib::{
    Access::{R, RW},
    AlarmDef, Attr, Mib, NotificationDef,
    Requirement::{M, O},
};
use onusim_wire::Datum;

/// ANI-G class number.
pub const NUMBER: u16 = 263;

/// Represents a physical PON interface.
pub fn ani_g() -> Mib {
    Mib::new(
        NUMBER,
        "ANI-G",
        "Represents a physical PON interface",
        vec![
            Attr::new(
                0,
                "me_inst",
                "Managed entity instance",
                R,
                M,
                [Datum::unsigned(2)],
            ),
            Attr::new(1, "sr_indication", "SR indication", R, M, [Datum::boolean(1)]),
            Attr::new(
                2,
                "total_tcont_number",
                "Total T-CONT number",
                R,
                M,
                [Datum::unsigned(2)],
            ),
            Attr::new(
                3,
                "gem_block_length",
                "GEM block length",
                RW,
                M,
                [Datum::unsigned(2)],
            ),
            Attr::new(
                4,
                "piggy_back_dba_reporting",
                "Piggyback DBA reporting",
                R,
                M,
                [Datum::unsigned(1)],
            ),
            Attr::new(5, "deprecated", "Deprecated", R, M, [Datum::unsigned(1)]),
            Attr::new(6, "sf_threshold", "SF threshold", RW, M, [Datum::unsigned(1)]),
            Attr::new(7, "sd_threshold", "SD threshold", RW, M, [Datum::unsigned(1)]),
            Attr::new(8, "arc", "ARC", RW, O, [Datum::unsigned(1)]),
            Attr::new(9, "arc_interval", "ARC interval", RW, O, [Datum::unsigned(1)]),
            Attr::new(
                10,
                "optical_signal_level",
                "Optical signal level",
                R,
                O,
                [Datum::unsigned(2)],
            ),
            Attr::new(
                11,
                "lower_optical_threshold",
                "Lower optical threshold",
                RW,
                O,
                [Datum::unsigned(1)],
            ),
            Attr::new(
                12,
                "upper_optical_threshold",
                "Upper optical threshold",
                RW,
                O,
                [Datum::unsigned(1)],
            ),
            Attr::new(
                13,
                "onu_response_time",
                "ONU response time",
                R,
                O,
                [Datum::unsigned(2)],
            ),
            Attr::new(
                14,
                "transmit_optical_level",
                "Transmit optical level",
                R,
                O,
                [Datum::unsigned(2)],
            ),
            Attr::new(
                15,
                "lower_transmit_power_threshold",
                "Lower transmit power threshold",
                RW,
                O,
                [Datum::unsigned(1)],
            ),
            Attr::new(
                16,
                "upper_transmit_power_threshold",
                "Upper transmit power threshold",
                RW,
                O,
                [Datum::unsigned(1)],
            ),
        ],
    )
    .with_actions(&[mt::GET, mt::SET])
    .with_notifications(vec![NotificationDef {
        number: 8,
        name: "arc-cancellation",
    }])
    .with_alarms(vec![
        AlarmDef {
            number: 0,
            name: "rx-power-low",
            description: "Low receive (RX) input power",
        },
        AlarmDef {
            number: 1,
            name: "rx-power-high",
            description: "High receive (RX) input power",
        },
        AlarmDef {
            number: 2,
            name: "signal-fail",
            description: "Signal fail",
        },
        AlarmDef {
            number: 3,
            name: "signal-degraded",
            description: "Signal degraded",
        },
        AlarmDef {
            number: 4,
            name: "tx-power-low",
            description: "Low transmit (TX) output power",
        },
        AlarmDef {
            number: 5,
            name: "tx-power-high",
            description: "High transmit (TX) output power",
        },
        AlarmDef {
            number: 6,
            name: "tx-bias-high",
            description: "High transmit (TX) bias current",
        },
    ])
}
