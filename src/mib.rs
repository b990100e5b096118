//! MIB schema model: managed entity classes, attributes and their access
//! rules.
//!
//! A [`Mib`] describes one G.988 managed entity class: its attributes
//! (number, name, access, requirement and data shape), the actions it
//! supports, its alarms and its attribute value change events. The schema is
//! declarative; instances live in [`crate::database`].
//!
//! Attributes are addressable both by number (0 to 16) and by name, with the
//! indexes built at registration time. Attribute 0 is the managed entity
//! instance selector; attributes 1 to 16 are selected by the 16-bit
//! attribute mask where bit `16 - n` selects attribute `n`.

use onusim_wire::{Datum, Value, WireError};
use std::collections::HashMap;

/// Attribute access rules, per G.988 clause 11.2.1.1.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Access {
    /// Read only.
    R,
    /// Write only.
    W,
    /// Read and write.
    RW,
    /// Read, write, set by create.
    RWC,
    /// Read, set by create.
    RC,
}

impl Access {
    /// Whether a Set action may write this attribute.
    pub fn writable(self) -> bool {
        matches!(self, Access::W | Access::RW | Access::RWC)
    }

    /// Whether a Create action may supply this attribute.
    pub fn settable_by_create(self) -> bool {
        matches!(self, Access::RWC | Access::RC)
    }
}

impl core::fmt::Display for Access {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Access::R => "R",
            Access::W => "W",
            Access::RW => "RW",
            Access::RWC => "RWC",
            Access::RC => "RC",
        })
    }
}

/// Attribute requirement.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Requirement {
    /// Mandatory.
    M,
    /// Optional.
    O,
}

/// A materialized attribute value: one [`Value`] per datum in the
/// attribute's data tuple.
pub type AttrValue = Vec<Value>;

/// A managed entity attribute.
#[derive(Debug, Clone)]
pub struct Attr {
    number: u8,
    name: &'static str,
    description: &'static str,
    access: Access,
    requirement: Requirement,
    data: Vec<Datum>,
}

impl Attr {
    /// Declares an attribute. Panics on an out-of-range attribute number;
    /// schema registration errors are fatal.
    pub fn new(
        number: u8,
        name: &'static str,
        description: &'static str,
        access: Access,
        requirement: Requirement,
        data: impl Into<Vec<Datum>>,
    ) -> Self {
        assert!(number <= 16, "attribute number {} out of range", number);

        let data = data.into();

        assert!(!data.is_empty(), "attribute {} has no data", name);

        Self {
            number,
            name,
            description,
            access,
            requirement,
            data,
        }
    }

    /// Attribute number, 0 to 16.
    pub fn number(&self) -> u8 {
        self.number
    }

    /// Attribute name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Attribute description.
    pub fn description(&self) -> &'static str {
        self.description
    }

    /// Access rules.
    pub fn access(&self) -> Access {
        self.access
    }

    /// Mandatory or optional.
    pub fn requirement(&self) -> Requirement {
        self.requirement
    }

    /// The attribute's data tuple.
    pub fn data(&self) -> &[Datum] {
        &self.data
    }

    /// The attribute mask bit selecting this attribute: `1 << (16 - n)`.
    ///
    /// Attribute 0 (the instance selector) has no mask bit.
    pub fn mask(&self) -> u16 {
        if self.number == 0 {
            0
        } else {
            1 << (16 - self.number)
        }
    }

    /// Encoded size in bytes: the sum of the datum sizes. A table datum
    /// contributes one row.
    pub fn size(&self) -> usize {
        self.data.iter().map(Datum::size).sum()
    }

    /// Whether the attribute's leading datum is a table.
    pub fn is_table(&self) -> bool {
        matches!(
            self.data.first().map(Datum::kind),
            Some(onusim_wire::Kind::Table { .. })
        )
    }

    /// The value materialized when an instance spec doesn't name this
    /// attribute.
    pub fn default_value(&self) -> AttrValue {
        self.data.iter().map(Datum::default_value).collect()
    }

    /// Encodes a value tuple (or the defaults, when `None`) onto `buf`.
    pub fn encode_value(
        &self,
        value: Option<&AttrValue>,
        buf: &mut Vec<u8>,
    ) -> Result<(), WireError> {
        for (index, datum) in self.data.iter().enumerate() {
            datum.encode_into(value.and_then(|tuple| tuple.get(index)), buf)?;
        }

        Ok(())
    }

    /// Decodes a value tuple from `buf` at `offset`.
    pub fn decode_value(
        &self,
        buf: &[u8],
        mut offset: usize,
    ) -> Result<(AttrValue, usize), WireError> {
        let mut tuple = AttrValue::with_capacity(self.data.len());

        for datum in &self.data {
            let (value, next) = datum.decode(buf, offset)?;
            tuple.push(value);
            offset = next;
        }

        Ok((tuple, offset))
    }
}

impl core::fmt::Display for Attr {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}({})", self.number, self.name)
    }
}

/// A declared alarm, ordered by bit position in the 28-byte alarm bitmap.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AlarmDef {
    /// Bit position: the MSB of bitmap byte 0 is alarm 0.
    pub number: u8,
    /// Alarm name.
    pub name: &'static str,
    /// Alarm description.
    pub description: &'static str,
}

/// A declared attribute value change event.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ChangeDef {
    /// The attribute whose change is notified.
    pub number: u8,
    /// Event name.
    pub name: &'static str,
}

/// A declared autonomous notification.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct NotificationDef {
    /// Notification number.
    pub number: u8,
    /// Notification name.
    pub name: &'static str,
}

/// A managed entity class.
#[derive(Debug, Clone)]
pub struct Mib {
    number: u16,
    name: &'static str,
    description: &'static str,
    attrs: Vec<Attr>,
    by_number: [Option<usize>; 17],
    by_name: HashMap<&'static str, usize>,
    actions: Vec<u8>,
    alarms: Vec<AlarmDef>,
    changes: Vec<ChangeDef>,
    notifications: Vec<NotificationDef>,
}

impl Mib {
    /// Declares a managed entity class and builds its attribute indexes.
    ///
    /// Panics on duplicate attribute numbers or names; schema registration
    /// errors are fatal.
    pub fn new(
        number: u16,
        name: &'static str,
        description: &'static str,
        attrs: Vec<Attr>,
    ) -> Self {
        let mut by_number = [None; 17];
        let mut by_name = HashMap::with_capacity(attrs.len());

        for (index, attr) in attrs.iter().enumerate() {
            let slot = &mut by_number[usize::from(attr.number)];
            assert!(
                slot.is_none(),
                "MIB {}: duplicate attribute number {}",
                name,
                attr.number
            );
            *slot = Some(index);

            assert!(
                by_name.insert(attr.name, index).is_none(),
                "MIB {}: duplicate attribute name {}",
                name,
                attr.name
            );
        }

        Self {
            number,
            name,
            description,
            attrs,
            by_number,
            by_name,
            actions: Vec::new(),
            alarms: Vec::new(),
            changes: Vec::new(),
            notifications: Vec::new(),
        }
    }

    /// Declares the message type codes this class supports.
    pub fn with_actions(mut self, actions: &[u8]) -> Self {
        self.actions = actions.to_vec();
        self
    }

    /// Declares the class's alarms, ordered by bit position.
    pub fn with_alarms(mut self, alarms: Vec<AlarmDef>) -> Self {
        self.alarms = alarms;
        self
    }

    /// Declares the class's attribute value change events.
    pub fn with_changes(mut self, changes: Vec<ChangeDef>) -> Self {
        self.changes = changes;
        self
    }

    /// Declares the class's autonomous notifications.
    pub fn with_notifications(mut self, notifications: Vec<NotificationDef>) -> Self {
        self.notifications = notifications;
        self
    }

    /// Class number, 1 to 65535.
    pub fn number(&self) -> u16 {
        self.number
    }

    /// Class name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Class description.
    pub fn description(&self) -> &'static str {
        self.description
    }

    /// All attributes, in declaration order.
    pub fn attrs(&self) -> &[Attr] {
        &self.attrs
    }

    /// Declared alarms.
    pub fn alarms(&self) -> &[AlarmDef] {
        &self.alarms
    }

    /// Declared attribute value change events.
    pub fn changes(&self) -> &[ChangeDef] {
        &self.changes
    }

    /// Declared autonomous notifications.
    pub fn notifications(&self) -> &[NotificationDef] {
        &self.notifications
    }

    /// Looks up an attribute by number.
    pub fn attr_by_number(&self, number: u8) -> Option<&Attr> {
        self.by_number
            .get(usize::from(number))
            .copied()
            .flatten()
            .map(|index| &self.attrs[index])
    }

    /// Looks up an attribute by name or number.
    ///
    /// A key consisting solely of decimal digits is treated as a number; any
    /// other key is a name.
    pub fn attr(&self, key: &str) -> Option<&Attr> {
        if !key.is_empty() && key.bytes().all(|byte| byte.is_ascii_digit()) {
            key.parse().ok().and_then(|number| self.attr_by_number(number))
        } else {
            self.by_name.get(key).map(|&index| &self.attrs[index])
        }
    }

    /// The comma-separated names of attributes matching an optional access
    /// filter.
    pub fn attr_names(&self, access: Option<Access>) -> String {
        self.attrs
            .iter()
            .filter(|attr| access.is_none_or(|access| attr.access == access))
            .map(Attr::name)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Whether this class supports the given message type code.
    pub fn supports(&self, mt: u8) -> bool {
        self.actions.contains(&mt)
    }
}

impl core::fmt::Display for Mib {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}({})", self.number, self.name)
    }
}

/// The process-wide registry of managed entity classes, indexed by class
/// number. Immutable once built.
#[derive(Debug, Default)]
pub struct MibRegistry {
    mibs: HashMap<u16, Mib>,
}

impl MibRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a class. Panics on a duplicate class number.
    pub fn register(&mut self, mib: Mib) {
        let number = mib.number();

        assert!(
            self.mibs.insert(number, mib).is_none(),
            "MIB class {} registered twice",
            number
        );
    }

    /// Looks up a class by number.
    pub fn get(&self, me_class: u16) -> Option<&Mib> {
        self.mibs.get(&me_class)
    }

    /// The registered classes, sorted by class number (for log messages).
    pub fn names(&self) -> String {
        let mut mibs: Vec<&Mib> = self.mibs.values().collect();
        mibs.sort_by_key(|mib| mib.number());

        mibs.iter()
            .map(|mib| mib.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Iterates over registered classes in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = &Mib> {
        self.mibs.values()
    }
}

/// Iterates the attribute numbers selected by `mask`, in ascending order,
/// together with each one's mask bit.
pub fn mask_indices(mask: u16) -> impl Iterator<Item = (u8, u16)> {
    (1..=16u8).filter_map(move |number| {
        let bit = 1 << (16 - number);

        (mask & bit != 0).then_some((number, bit))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mibs;
    use pretty_assertions::assert_eq;

    #[test]
    fn attr_mask_bits() {
        let onu_g = mibs::onu_g();

        assert_eq!(onu_g.attr("battery_backup").unwrap().mask(), 0x0400);
        assert_eq!(onu_g.attr_by_number(1).unwrap().mask(), 0x8000);
        assert_eq!(onu_g.attr_by_number(0).unwrap().mask(), 0x0000);
    }

    #[test]
    fn digit_keys_are_numbers() {
        let onu_g = mibs::onu_g();

        assert_eq!(onu_g.attr("6").unwrap().name(), "battery_backup");
        assert_eq!(onu_g.attr("battery_backup").unwrap().number(), 6);
        assert!(onu_g.attr("99").is_none());
        assert!(onu_g.attr("no_such_attr").is_none());
    }

    #[test]
    fn attr_names_filters_by_access() {
        let onu_data = mibs::onu_data();

        assert_eq!(onu_data.attr_names(None), "me_inst, mib_data_sync");
        assert_eq!(onu_data.attr_names(Some(Access::RW)), "mib_data_sync");
        assert_eq!(onu_data.attr_names(Some(Access::W)), "");
    }

    #[test]
    fn mask_indices_ascend() {
        let indices: Vec<(u8, u16)> = mask_indices(0x8400).collect();

        assert_eq!(indices, vec![(1, 0x8000), (6, 0x0400)]);
    }

    #[test]
    fn attr_size_sums_data() {
        let onu_g = mibs::onu_g();

        // serial_number is a (string(4), unsigned(4)) pair.
        assert_eq!(onu_g.attr("serial_number").unwrap().size(), 8);
    }

    #[test]
    #[should_panic(expected = "duplicate attribute number")]
    fn duplicate_attribute_number_is_fatal() {
        use crate::mib::{Access::R, Requirement::M};
        use onusim_wire::Datum;

        Mib::new(
            1000,
            "broken",
            "",
            vec![
                Attr::new(1, "a", "", R, M, [Datum::unsigned(1)]),
                Attr::new(1, "b", "", R, M, [Datum::unsigned(1)]),
            ],
        );
    }
}
