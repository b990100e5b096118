//! G.988 managed entity class definitions.
//!
//! These modules are configuration data, not logic: each one carries the
//! attribute tables, actions, alarms and change events of one managed
//! entity class, in declarative form. [`standard`] assembles them into the
//! registry the simulator loads at start-up, and [`default_specs`] lists
//! the instances materialized for every simulated ONU.

mod ani_g;
mod ext_vlan_tag;
mod gem_port_net_ctp;
mod onu2_g;
mod onu_data;
mod onu_g;
mod pptp_eth_uni;
mod software_image;
mod tcont;

pub use ani_g::{NUMBER as ANI_G, ani_g};
pub use ext_vlan_tag::{NUMBER as EXT_VLAN_TAG, OP_TABLE_ROW_SIZE, ext_vlan_tag};
pub use gem_port_net_ctp::{NUMBER as GEM_PORT_NET_CTP, gem_port_net_ctp};
pub use onu2_g::{
    NUMBER as ONU2_G, OMCC_VERSION_BASELINE, OMCC_VERSION_EXTENDED, onu2_g,
};
pub use onu_data::{NUMBER as ONU_DATA, onu_data};
pub use onu_g::{NUMBER as ONU_G, onu_g};
pub use pptp_eth_uni::{NUMBER as PPTP_ETH_UNI, pptp_eth_uni};
pub use software_image::{NUMBER as SOFTWARE_IMAGE, software_image};
pub use tcont::{NUMBER as TCONT, tcont};

use crate::database::InstanceSpec;
use crate::mib::MibRegistry;
use onusim_wire::Value;

/// Builds the registry of all implemented managed entity classes.
pub fn standard() -> MibRegistry {
    let mut registry = MibRegistry::new();

    registry.register(onu_g());
    registry.register(onu2_g());
    registry.register(onu_data());
    registry.register(software_image());
    registry.register(ani_g());
    registry.register(pptp_eth_uni());
    registry.register(tcont());
    registry.register(gem_port_net_ctp());
    registry.register(ext_vlan_tag());

    registry
}

/// The instances materialized for every simulated ONU.
///
/// Attributes not named here receive their datum defaults (or fixed
/// values); `sys_up_time` is a placeholder resolved against the database
/// start instant on every read.
pub fn default_specs(extended_supported: bool) -> Vec<InstanceSpec> {
    let omcc_version = if extended_supported {
        OMCC_VERSION_EXTENDED
    } else {
        OMCC_VERSION_BASELINE
    };

    vec![
        InstanceSpec::new(ONU_G, 0)
            .value("vendor_id", [Value::Unsigned(1234)])
            .value("version", [Value::Str("v2".into())])
            .value(
                "serial_number",
                [Value::Str("abcd".into()), Value::Unsigned(5678)],
            ),
        InstanceSpec::new(ONU2_G, 0)
            .value("omcc_version", [Value::Unsigned(omcc_version)])
            .value("sys_up_time", [Value::Unsigned(0)]),
        InstanceSpec::new(ONU_DATA, 0).value("mib_data_sync", [Value::Unsigned(0)]),
        InstanceSpec::new(SOFTWARE_IMAGE, 0x0000),
        InstanceSpec::new(SOFTWARE_IMAGE, 0x0001),
        InstanceSpec::new(SOFTWARE_IMAGE, 0x0100),
        InstanceSpec::new(SOFTWARE_IMAGE, 0x0101),
        InstanceSpec::new(ANI_G, 1),
        InstanceSpec::new(PPTP_ETH_UNI, 257),
        InstanceSpec::new(TCONT, 0x8000),
    ]
}
