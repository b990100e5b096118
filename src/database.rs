//! Per-ONU MIB instance store and the operations the OMCI actions map to.
//!
//! A [`Database`] materializes an identical set of managed entity instances
//! for every ONU id in a configured contiguous range. All operations return
//! result structs mirroring the corresponding response payloads; failures
//! travel as G.988 reason codes inside those results and are never raised
//! to the caller.
//!
//! The upload snapshot is a small time-bounded state machine per ONU id:
//! idle until an upload latches a snapshot, consumed by upload-next, and
//! expired lazily 60 seconds after the latch.

use crate::message::{
    BASELINE_CONTENTS_LEN, BASELINE_VALUES_LIMIT, GET_NEXT_CHUNK_LEN, MAX_EXTENDED_CONTENTS_LEN,
};
use crate::mib::{Attr, AttrValue, Requirement};
use crate::mibs;
use log::{debug, error, info, warn};
use onusim_wire::Value;
use std::collections::{BTreeMap, HashMap};
use std::ops::RangeInclusive;
use std::time::{Duration, Instant};

/// G.988 response reason codes (clause 11.2.3.2), used uniformly across
/// responses.
pub mod reason {
    /// Command processed successfully.
    pub const SUCCESS: u8 = 0b0000;
    /// Command processing error, including expired upload snapshots.
    pub const PROCESSING_ERROR: u8 = 0b0001;
    /// Command not supported.
    pub const NOT_SUPPORTED: u8 = 0b0010;
    /// Parameter error.
    pub const PARAMETER_ERROR: u8 = 0b0011;
    /// Unknown managed entity class.
    pub const UNKNOWN_ME: u8 = 0b0100;
    /// Unknown managed entity instance.
    pub const UNKNOWN_INSTANCE: u8 = 0b0101;
    /// Device busy.
    pub const DEVICE_BUSY: u8 = 0b0110;
    /// Instance exists.
    pub const INSTANCE_EXISTS: u8 = 0b0111;
    /// Attribute(s) failed or unknown; opt/exec masks carry the detail.
    pub const ATTRIBUTES_FAILED: u8 = 0b1001;
}

/// Alarm bitmap length: 224 alarm bits per instance.
pub const ALARM_BITMAP_LEN: usize = 28;

/// An instance's active alarm bitmap. The MSB of byte 0 is alarm 0.
pub type AlarmBitmap = [u8; ALARM_BITMAP_LEN];

/// Snapshots expire this long after the upload that latched them.
pub const SNAPSHOT_MAX_AGE: Duration = Duration::from_secs(60);

/// Parses a hexadecimal alarm bitmap (with or without a `0x` prefix) into
/// a right-aligned 28-byte bitmap, as the console and REST facades supply
/// it.
pub fn bitmap_from_hex(text: &str) -> Option<AlarmBitmap> {
    let digits = text
        .trim()
        .trim_start_matches("0x")
        .trim_start_matches("0X");

    if digits.is_empty() || digits.len() > 2 * ALARM_BITMAP_LEN {
        return None;
    }

    let padded = format!("{:0>width$}", digits, width = 2 * ALARM_BITMAP_LEN);

    let mut bitmap = [0u8; ALARM_BITMAP_LEN];

    for (index, byte) in bitmap.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&padded[2 * index..2 * index + 2], 16).ok()?;
    }

    Some(bitmap)
}

/// A materialized managed entity instance: attribute name to value tuple.
pub type Instance = BTreeMap<&'static str, AttrValue>;

/// A declarative instance description: the class and instance number plus an
/// optional subset of attribute values. Unnamed attributes receive their
/// datum defaults.
#[derive(Debug, Clone)]
pub struct InstanceSpec {
    /// Managed entity class.
    pub me_class: u16,
    /// Managed entity instance number.
    pub me_inst: u16,
    /// Explicit attribute values.
    pub values: Vec<(&'static str, AttrValue)>,
}

impl InstanceSpec {
    /// A spec with no explicit attribute values.
    pub fn new(me_class: u16, me_inst: u16) -> Self {
        Self {
            me_class,
            me_inst,
            values: Vec::new(),
        }
    }

    /// Adds an explicit attribute value.
    pub fn value(mut self, name: &'static str, value: impl Into<AttrValue>) -> Self {
        self.values.push((name, value.into()));
        self
    }
}

/// Results of a set operation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SetResult {
    /// Reason code.
    pub reason: u8,
    /// Unknown/unsupported attributes.
    pub opt_attr_mask: u16,
    /// Attributes that failed to execute.
    pub attr_exec_mask: u16,
}

/// Results of a get operation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GetResult {
    /// Reason code.
    pub reason: u8,
    /// Attributes actually included.
    pub attr_mask: u16,
    /// Unknown/unsupported attributes.
    pub opt_attr_mask: u16,
    /// Attributes that failed to execute.
    pub attr_exec_mask: u16,
    /// Retrieved values, ascending by attribute number.
    pub attrs: Vec<(u8, AttrValue)>,
}

/// Results of a get-next operation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GetNextResult {
    /// Reason code.
    pub reason: u8,
    /// The table attribute being retrieved.
    pub attr_mask: u16,
    /// One chunk of raw table bytes, zero-padded at the end of the table.
    pub data: Vec<u8>,
}

/// Results of a create operation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CreateResult {
    /// Reason code.
    pub reason: u8,
    /// Attributes that failed, when the reason is a parameter error.
    pub attr_exec_mask: u16,
}

/// Results of a delete or reset operation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatusResult {
    /// Reason code.
    pub reason: u8,
}

/// Results of an upload operation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UploadResult {
    /// Reason code.
    pub reason: u8,
    /// Number of upload-next commands needed to retrieve the snapshot.
    pub num_upload_nexts: u16,
}

/// Results of an upload-next operation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UploadNextResult {
    /// Reason code.
    pub reason: u8,
    /// The requested body, when the snapshot is live and the sequence
    /// number is in range.
    pub body: Option<UploadBody>,
}

/// Results of a get-all-alarms operation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AlarmCountResult {
    /// Reason code.
    pub reason: u8,
    /// Number of get-all-alarms-next commands needed.
    pub num_alarms_nexts: u16,
}

/// Results of a get-all-alarms-next operation. All zero when the sequence
/// number is out of range; the response carries no reason field.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AlarmNextResult {
    /// Class of the managed entity the bitmap belongs to.
    pub alarmed_me_class: u16,
    /// Instance of the managed entity the bitmap belongs to.
    pub alarmed_me_inst: u16,
    /// The instance's active alarm bitmap.
    pub bitmap: AlarmBitmap,
}

/// One chunk of an upload body: a run of attributes of a single instance.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadChunk {
    /// Managed entity class.
    pub me_class: u16,
    /// Managed entity instance.
    pub me_inst: u16,
    attrs: Vec<(u8, AttrValue)>,
    size: usize,
}

/// Baseline chunk header: class, instance and attribute mask.
const CHUNK_HEADER_BASELINE: usize = 6;
/// Extended chunk header: a size prefix on top of the baseline header.
const CHUNK_HEADER_EXTENDED: usize = 8;

impl UploadChunk {
    /// An empty chunk. Its size starts at the chunk header length.
    pub fn new(me_class: u16, me_inst: u16, extended: bool) -> Self {
        Self {
            me_class,
            me_inst,
            attrs: Vec::new(),
            size: if extended {
                CHUNK_HEADER_EXTENDED
            } else {
                CHUNK_HEADER_BASELINE
            },
        }
    }

    /// Appends an attribute value of `encoded_size` bytes.
    pub fn push(&mut self, number: u8, value: AttrValue, encoded_size: usize) {
        self.attrs.push((number, value));
        self.size += encoded_size;
    }

    /// The chunk's attributes, ascending by attribute number.
    pub fn attrs(&self) -> &[(u8, AttrValue)] {
        &self.attrs
    }

    /// Whether any attribute has been pushed.
    pub fn has_attrs(&self) -> bool {
        !self.attrs.is_empty()
    }

    /// Header plus value bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// The attribute mask covering the chunk's attributes.
    pub fn attr_mask(&self) -> u16 {
        self.attrs
            .iter()
            .fold(0, |mask, (number, _)| mask | (1 << (16 - number)))
    }
}

/// One body of a latched upload snapshot: as many chunks as fit the frame.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UploadBody {
    chunks: Vec<UploadChunk>,
}

impl UploadBody {
    /// The body's chunks.
    pub fn chunks(&self) -> &[UploadChunk] {
        &self.chunks
    }

    /// Appends a chunk.
    pub fn push(&mut self, chunk: UploadChunk) {
        self.chunks.push(chunk);
    }

    /// Total byte length of the body's chunks (headers included).
    pub fn length(&self) -> usize {
        self.chunks.iter().map(UploadChunk::size).sum()
    }

    /// Whether the body holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// A latched MIB snapshot awaiting upload-next retrieval.
#[derive(Debug, Clone)]
struct UploadSnapshot {
    extended: bool,
    latched_at: Instant,
    bodies: Vec<UploadBody>,
}

/// A latched table attribute awaiting get-next retrieval.
#[derive(Debug, Clone)]
struct TableSnapshot {
    me_class: u16,
    me_inst: u16,
    attr_number: u8,
    data: Vec<u8>,
    max_seq_num: u16,
}

#[derive(Debug, Clone)]
struct AlarmEntry {
    me_class: u16,
    me_inst: u16,
    bitmap: AlarmBitmap,
}

/// The per-ONU MIB database.
pub struct Database {
    optional: bool,
    extended_supported: bool,
    onu_ids: RangeInclusive<u16>,
    started_at: Instant,
    instances: HashMap<u16, BTreeMap<(u16, u16), Instance>>,
    alarms: HashMap<u16, BTreeMap<(u16, u16), AlarmBitmap>>,
    snapshots: HashMap<u16, UploadSnapshot>,
    tables: HashMap<u16, TableSnapshot>,
    alarm_lists: HashMap<u16, Vec<AlarmEntry>>,
}

impl Database {
    /// A database for the given ONU id range, materializing optional
    /// attributes and advertising extended message support.
    pub fn new(onu_ids: RangeInclusive<u16>) -> Self {
        Self::with_options(onu_ids, true, true)
    }

    /// A database with explicit control over whether optional attributes
    /// not named in the instance specs are materialized, and over the
    /// advertised OMCC version.
    pub fn with_options(
        onu_ids: RangeInclusive<u16>,
        optional: bool,
        extended_supported: bool,
    ) -> Self {
        let mut database = Self {
            optional,
            extended_supported,
            onu_ids: onu_ids.clone(),
            started_at: Instant::now(),
            instances: HashMap::new(),
            alarms: HashMap::new(),
            snapshots: HashMap::new(),
            tables: HashMap::new(),
            alarm_lists: HashMap::new(),
        };

        for onu_id in onu_ids {
            database.reload(onu_id);
        }

        database
    }

    /// The configured ONU id range.
    pub fn onu_ids(&self) -> RangeInclusive<u16> {
        self.onu_ids.clone()
    }

    /// The raw stored value of an attribute, for inspection.
    pub fn value(
        &self,
        onu_id: u16,
        me_class: u16,
        me_inst: u16,
        name: &str,
    ) -> Option<AttrValue> {
        self.instances
            .get(&onu_id)?
            .get(&(me_class, me_inst))?
            .get(name)
            .cloned()
    }

    /// The current `mib_data_sync` counter of ONU data #0.
    pub fn mib_data_sync(&self, onu_id: u16) -> Option<u64> {
        self.value(onu_id, mibs::ONU_DATA, 0, "mib_data_sync")?
            .first()?
            .as_unsigned()
    }

    /// Reinitializes one ONU id from the instance specs, dropping its
    /// snapshots and alarm state.
    fn reload(&mut self, onu_id: u16) {
        self.instances.insert(onu_id, self.build_instances());
        self.alarms.insert(onu_id, BTreeMap::new());
        self.snapshots.remove(&onu_id);
        self.tables.remove(&onu_id);
        self.alarm_lists.remove(&onu_id);
    }

    /// Materializes the instance map from the declarative specs.
    ///
    /// Panics on a spec naming an undeclared attribute, a value tuple of
    /// the wrong arity, a value conflicting with a fixed datum, or a
    /// duplicate instance; spec errors are fatal at start-up.
    fn build_instances(&self) -> BTreeMap<(u16, u16), Instance> {
        let registry = crate::registry();

        let mut instances = BTreeMap::new();

        for spec in mibs::default_specs(self.extended_supported) {
            let mib = registry.get(spec.me_class).unwrap_or_else(|| {
                panic!("instance spec references unknown MIB class {}", spec.me_class)
            });

            for (name, _) in &spec.values {
                assert!(
                    mib.attr(name).is_some(),
                    "instance spec key {:?} is not an attribute of MIB {}",
                    name,
                    mib
                );
            }

            let mut instance = Instance::new();

            for attr in mib.attrs() {
                let name = attr.name();

                if attr.number() == 0 {
                    instance.insert(name, vec![Value::Unsigned(u64::from(spec.me_inst))]);
                    continue;
                }

                if let Some((_, value)) = spec.values.iter().find(|(n, _)| *n == name) {
                    assert_eq!(
                        value.len(),
                        attr.data().len(),
                        "MIB {} {} value arity mismatch",
                        mib,
                        attr
                    );

                    for (datum, value) in attr.data().iter().zip(value) {
                        if let Some(fixed) = datum.fixed() {
                            assert_eq!(
                                fixed, value,
                                "MIB {} {} value differs from the fixed value",
                                mib, attr
                            );
                        }
                    }

                    instance.insert(name, value.clone());
                } else if self.optional || attr.requirement() == Requirement::M {
                    instance.insert(name, attr.default_value());
                }
            }

            let key = (spec.me_class, spec.me_inst);

            assert!(
                instances.insert(key, instance).is_none(),
                "MIB {} instance {} defined twice",
                mib,
                spec.me_inst
            );
        }

        instances
    }

    /// Resolves (class, instance) for one ONU id, mapping a missing class
    /// to reason 0b0100 and a missing instance to 0b0101.
    fn instance(
        &self,
        onu_id: u16,
        me_class: u16,
        me_inst: u16,
    ) -> Result<(&'static crate::mib::Mib, &Instance), u8> {
        let registry = crate::registry();

        let Some(mib) = registry.get(me_class) else {
            error!(
                "MIB {} not implemented; MIBs: {}",
                me_class,
                registry.names()
            );

            return Err(reason::UNKNOWN_ME);
        };

        let instance = self
            .instances
            .get(&onu_id)
            .and_then(|map| map.get(&(me_class, me_inst)));

        let Some(instance) = instance else {
            error!(
                "ONU {} MIB {} #{} not instantiated; instances: {}",
                onu_id,
                mib,
                me_inst,
                self.instance_names(onu_id, me_class)
            );

            return Err(reason::UNKNOWN_INSTANCE);
        };

        Ok((mib, instance))
    }

    fn instance_names(&self, onu_id: u16, me_class: u16) -> String {
        self.instances
            .get(&onu_id)
            .map(|map| {
                map.keys()
                    .filter(|(class, _)| *class == me_class)
                    .map(|(_, inst)| inst.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .unwrap_or_default()
    }

    /// Resolves a stored value at read time. `sys_up_time` reports the time
    /// since database start in 10 ms ticks; everything else reads back as
    /// stored.
    fn resolve(&self, me_class: u16, attr: &Attr, value: &AttrValue) -> AttrValue {
        if me_class == mibs::ONU2_G && attr.name() == "sys_up_time" {
            let ticks = self.started_at.elapsed().as_millis() / 10;

            return vec![Value::Unsigned(ticks as u64)];
        }

        value.clone()
    }

    /// Sets the masked attribute values on one instance, enforcing the
    /// schema's write access rules.
    pub fn set(
        &mut self,
        onu_id: u16,
        me_class: u16,
        me_inst: u16,
        attr_mask: u16,
        values: &[(u8, AttrValue)],
    ) -> SetResult {
        debug!(
            "set onu_id={}, me_class={}, me_inst={}, attr_mask={:#06x}",
            onu_id, me_class, me_inst, attr_mask
        );

        let mut results = SetResult::default();

        let mib = match self.instance(onu_id, me_class, me_inst) {
            Ok((mib, _)) => mib,
            Err(reason) => {
                results.reason = reason;
                return results;
            }
        };

        let instance = self
            .instances
            .get_mut(&onu_id)
            .and_then(|map| map.get_mut(&(me_class, me_inst)))
            .expect("instance resolved above");

        let mut updated = false;

        for (number, bit) in crate::mib::mask_indices(attr_mask) {
            let Some(attr) = mib.attr_by_number(number) else {
                debug!("MIB {} #{} {} not found", mib, me_inst, number);

                if matches!(results.reason, reason::SUCCESS | reason::ATTRIBUTES_FAILED) {
                    results.reason = reason::ATTRIBUTES_FAILED;
                    results.opt_attr_mask |= bit;
                }

                continue;
            };

            if !attr.access().writable() {
                warn!("MIB {} #{} {} ignored (not writable)", mib, me_inst, attr);
                results.reason = reason::PARAMETER_ERROR;
                continue;
            }

            if !instance.contains_key(attr.name()) {
                warn!("MIB {} #{} {} ignored (not implemented)", mib, me_inst, attr);
                continue;
            }

            let Some((_, value)) = values.iter().find(|(n, _)| *n == number) else {
                warn!("MIB {} #{} {} has no supplied value", mib, me_inst, attr);
                continue;
            };

            if attr.is_table() {
                // Table rows are appended, not replaced.
                if let (Some(Value::Table(rows)), Some(Value::Table(new_rows))) = (
                    instance.get_mut(attr.name()).and_then(|v| v.first_mut()),
                    value.first(),
                ) {
                    if !new_rows.is_empty() {
                        rows.extend(new_rows.iter().cloned());
                        updated = true;

                        info!(
                            "MIB {} #{} {} += {} row(s)",
                            mib,
                            me_inst,
                            attr,
                            new_rows.len()
                        );
                    }
                }

                continue;
            }

            if instance.get(attr.name()) != Some(value) {
                instance.insert(attr.name(), value.clone());
                updated = true;

                info!("MIB {} #{} {} = {:?}", mib, me_inst, attr, value);
            }
        }

        if updated {
            self.bump_mib_data_sync(onu_id);
        }

        results
    }

    /// Gets the masked attribute values of one instance.
    ///
    /// A get of a table attribute latches the table for get-next retrieval
    /// and reports the table's byte length in the attribute position; with
    /// baseline framing it must also be the only attribute in the mask.
    pub fn get(
        &mut self,
        onu_id: u16,
        me_class: u16,
        me_inst: u16,
        attr_mask: u16,
        extended: bool,
    ) -> GetResult {
        debug!(
            "get onu_id={}, me_class={}, me_inst={}, attr_mask={:#06x}, extended={}",
            onu_id, me_class, me_inst, attr_mask, extended
        );

        let mut results = GetResult::default();

        let (mib, instance) = match self.instance(onu_id, me_class, me_inst) {
            Ok(found) => found,
            Err(reason) => {
                results.reason = reason;
                return results;
            }
        };

        let mut latch = None;
        let mut size = 0;

        for (number, bit) in crate::mib::mask_indices(attr_mask) {
            let Some(attr) = mib.attr_by_number(number) else {
                debug!("MIB {} #{} {} not found", mib, me_inst, number);

                if matches!(results.reason, reason::SUCCESS | reason::ATTRIBUTES_FAILED) {
                    results.reason = reason::ATTRIBUTES_FAILED;
                    results.opt_attr_mask |= bit;
                }

                continue;
            };

            let Some(stored) = instance.get(attr.name()) else {
                debug!("MIB {} #{} {} ignored (not implemented)", mib, me_inst, attr);
                continue;
            };

            if attr.is_table() {
                if !extended && attr_mask.count_ones() > 1 {
                    // Ref G.988 clause 11.2.9: a table cannot share a
                    // baseline get with other attributes.
                    error!(
                        "MIB {} #{} {} is a table; it must be requested alone",
                        mib, me_inst, attr
                    );

                    results.reason = reason::PARAMETER_ERROR;
                    results.attr_mask = 0;
                    results.opt_attr_mask = 0;
                    results.attrs.clear();

                    return results;
                }

                let data: Vec<u8> = match stored.first() {
                    Some(Value::Table(rows)) => rows.concat(),
                    _ => Vec::new(),
                };

                let length = data.len();

                latch = Some(TableSnapshot {
                    me_class,
                    me_inst,
                    attr_number: number,
                    max_seq_num: (data.len().div_ceil(GET_NEXT_CHUNK_LEN)).saturating_sub(1)
                        as u16,
                    data,
                });

                results.attr_mask |= bit;
                results
                    .attrs
                    .push((number, vec![Value::Unsigned(length as u64)]));
                size += 4;

                continue;
            }

            if !extended && size + attr.size() > BASELINE_VALUES_LIMIT {
                // Ref G.988 section 11.2.9; returning a parameter error was
                // recommended (see Jira OBBAA-237).
                debug!(
                    "MIB {} #{} {} ignored (too long for baseline message)",
                    mib, me_inst, attr
                );

                results.reason = reason::PARAMETER_ERROR;
                continue;
            }

            let value = self.resolve(me_class, attr, stored);

            debug!("MIB {} #{} {} = {:?}", mib, me_inst, attr, value);

            results.attr_mask |= bit;
            results.attrs.push((number, value));
            size += attr.size();
        }

        if let Some(snapshot) = latch {
            self.tables.insert(onu_id, snapshot);
        }

        results
    }

    /// Returns one 29-byte chunk of the table latched by a prior
    /// single-attribute table get.
    pub fn get_next(
        &mut self,
        onu_id: u16,
        me_class: u16,
        me_inst: u16,
        attr_mask: u16,
        seq_num: u16,
    ) -> GetNextResult {
        debug!(
            "get_next onu_id={}, me_class={}, me_inst={}, attr_mask={:#06x}, seq_num={}",
            onu_id, me_class, me_inst, attr_mask, seq_num
        );

        let mut results = GetNextResult {
            attr_mask,
            ..GetNextResult::default()
        };

        if let Err(reason) = self.instance(onu_id, me_class, me_inst) {
            results.reason = reason;
            return results;
        }

        let Some(snapshot) = self.tables.get(&onu_id) else {
            warn!("ONU {} has no latched table; get the table attribute first", onu_id);
            results.reason = reason::UNKNOWN_ME;
            return results;
        };

        if snapshot.me_class != me_class || snapshot.me_inst != me_inst {
            error!(
                "latched table belongs to MIB {} #{}, not MIB {} #{}",
                snapshot.me_class, snapshot.me_inst, me_class, me_inst
            );

            results.reason = reason::UNKNOWN_ME;
            return results;
        }

        if seq_num > snapshot.max_seq_num {
            error!(
                "invalid seq_num {}; should be in range 0:{}",
                seq_num, snapshot.max_seq_num
            );

            results.reason = reason::PARAMETER_ERROR;
            return results;
        }

        let start = usize::from(seq_num) * GET_NEXT_CHUNK_LEN;

        let mut data = vec![0u8; GET_NEXT_CHUNK_LEN];
        let available = snapshot.data.len().saturating_sub(start).min(GET_NEXT_CHUNK_LEN);
        data[..available].copy_from_slice(&snapshot.data[start..start + available]);

        results.attr_mask = 1 << (16 - snapshot.attr_number);
        results.data = data;

        results
    }

    /// Creates a managed entity instance.
    pub fn create(
        &mut self,
        onu_id: u16,
        me_class: u16,
        me_inst: u16,
        values: &[(u8, AttrValue)],
    ) -> CreateResult {
        debug!(
            "create onu_id={}, me_class={}, me_inst={}",
            onu_id, me_class, me_inst
        );

        let mut results = CreateResult::default();

        let registry = crate::registry();

        let Some(mib) = registry.get(me_class) else {
            error!(
                "MIB {} not implemented; MIBs: {}",
                me_class,
                registry.names()
            );

            results.reason = reason::UNKNOWN_ME;
            return results;
        };

        let Some(onu_instances) = self.instances.get_mut(&onu_id) else {
            error!("ONU {} is not simulated", onu_id);
            results.reason = reason::PROCESSING_ERROR;
            return results;
        };

        if onu_instances.contains_key(&(me_class, me_inst)) {
            error!("MIB {} #{} already exists", mib, me_inst);
            results.reason = reason::INSTANCE_EXISTS;
            return results;
        }

        for (number, _) in values {
            if mib.attr_by_number(*number).is_none() {
                error!(
                    "MIB {} {} not found; supported attributes: {}",
                    mib,
                    number,
                    mib.attr_names(None)
                );

                results.reason = reason::UNKNOWN_INSTANCE;
                return results;
            }
        }

        let mut instance = Instance::new();

        for attr in mib.attrs() {
            if attr.number() == 0 {
                instance.insert(attr.name(), vec![Value::Unsigned(u64::from(me_inst))]);
                continue;
            }

            let provided = values
                .iter()
                .find(|(number, _)| *number == attr.number())
                .map(|(_, value)| value);

            if let Some(value) = provided {
                if attr.access().settable_by_create() {
                    instance.insert(attr.name(), value.clone());
                    continue;
                }

                warn!(
                    "MIB {} #{} {} is not settable by create",
                    mib, me_inst, attr
                );

                results.reason = reason::PARAMETER_ERROR;
                results.attr_exec_mask |= attr.mask();
            }

            if self.optional || attr.requirement() == Requirement::M {
                instance.insert(attr.name(), attr.default_value());
            }
        }

        info!("created MIB {} #{}", mib, me_inst);
        onu_instances.insert((me_class, me_inst), instance);
        self.bump_mib_data_sync(onu_id);

        results
    }

    /// Deletes a managed entity instance. Only the named instance is
    /// removed; the remaining database is untouched.
    pub fn delete(&mut self, onu_id: u16, me_class: u16, me_inst: u16) -> StatusResult {
        debug!(
            "delete onu_id={}, me_class={}, me_inst={}",
            onu_id, me_class, me_inst
        );

        let mut results = StatusResult::default();

        if let Err(reason) = self.instance(onu_id, me_class, me_inst) {
            results.reason = reason;
            return results;
        }

        if let Some(map) = self.instances.get_mut(&onu_id) {
            map.remove(&(me_class, me_inst));
        }

        if let Some(map) = self.alarms.get_mut(&onu_id) {
            map.remove(&(me_class, me_inst));
        }

        info!("deleted MIB {} #{}", me_class, me_inst);
        self.bump_mib_data_sync(onu_id);

        results
    }

    /// Resets one ONU id's MIB to the instance specs. Only accepted on
    /// ONU data #0.
    pub fn reset(&mut self, onu_id: u16, me_class: u16, me_inst: u16) -> StatusResult {
        debug!(
            "reset onu_id={}, me_class={}, me_inst={}",
            onu_id, me_class, me_inst
        );

        let mut results = StatusResult::default();

        match self.instance(onu_id, me_class, me_inst) {
            Err(reason) => results.reason = reason,
            Ok((mib, _)) if mib.number() != mibs::ONU_DATA => {
                error!("MIB {} invalid for reset; must be {}", mib, mibs::ONU_DATA);
                results.reason = reason::UNKNOWN_ME;
            }
            Ok(_) => self.reload(onu_id),
        }

        results
    }

    /// Latches an upload snapshot of all of one ONU id's instances, packed
    /// into frame-sized bodies. Only accepted on ONU data #0.
    pub fn upload(
        &mut self,
        onu_id: u16,
        me_class: u16,
        me_inst: u16,
        extended: bool,
    ) -> UploadResult {
        debug!(
            "upload onu_id={}, me_class={}, me_inst={}, extended={}",
            onu_id, me_class, me_inst, extended
        );

        let mut results = UploadResult::default();

        match self.instance(onu_id, me_class, me_inst) {
            Err(reason) => {
                results.reason = reason;
                return results;
            }
            Ok((mib, _)) if mib.number() != mibs::ONU_DATA => {
                error!("MIB {} invalid for upload; must be {}", mib, mibs::ONU_DATA);
                results.reason = reason::UNKNOWN_ME;
                return results;
            }
            Ok(_) => {}
        }

        let max_contents_length = if extended {
            MAX_EXTENDED_CONTENTS_LEN
        } else {
            BASELINE_CONTENTS_LEN
        };

        let registry = crate::registry();

        let mut bodies = Vec::new();
        let mut body = UploadBody::default();

        for ((chunk_class, chunk_inst), instance) in &self.instances[&onu_id] {
            let Some(mib) = registry.get(*chunk_class) else {
                continue;
            };

            let mut chunk = UploadChunk::new(*chunk_class, *chunk_inst, extended);

            for attr in mib.attrs() {
                // Attribute 0 is the instance selector and tables stream
                // via get-next; neither is uploaded.
                if attr.number() == 0 || attr.is_table() {
                    continue;
                }

                let Some(stored) = instance.get(attr.name()) else {
                    continue;
                };

                if body.length() + chunk.size() + attr.size() > max_contents_length {
                    if chunk.has_attrs() {
                        body.push(chunk);
                    }

                    bodies.push(std::mem::take(&mut body));

                    // The fresh chunk continues the same instance in the
                    // next body.
                    chunk = UploadChunk::new(*chunk_class, *chunk_inst, extended);
                }

                let value = self.resolve(*chunk_class, attr, stored);
                chunk.push(attr.number(), value, attr.size());
            }

            if chunk.has_attrs() {
                body.push(chunk);
            }
        }

        if !body.is_empty() || bodies.is_empty() {
            bodies.push(body);
        }

        for (index, body) in bodies.iter().enumerate() {
            debug!("body {} ({} bytes, {} chunks)", index, body.length(), body.chunks().len());
        }

        results.num_upload_nexts = bodies.len() as u16;

        self.snapshots.insert(
            onu_id,
            UploadSnapshot {
                extended,
                latched_at: Instant::now(),
                bodies,
            },
        );

        results
    }

    /// Returns one body of the snapshot latched by a prior upload.
    ///
    /// An expired, mismatched or absent snapshot, or an out-of-range
    /// sequence number, yields reason 0b0001 and no body.
    pub fn upload_next(
        &mut self,
        onu_id: u16,
        me_class: u16,
        me_inst: u16,
        seq_num: u16,
        extended: bool,
    ) -> UploadNextResult {
        debug!(
            "upload_next onu_id={}, me_class={}, me_inst={}, seq_num={}, extended={}",
            onu_id, me_class, me_inst, seq_num, extended
        );

        let mut results = UploadNextResult::default();

        match self.instance(onu_id, me_class, me_inst) {
            Err(reason) => {
                results.reason = reason;
                return results;
            }
            Ok((mib, _)) if mib.number() != mibs::ONU_DATA => {
                error!("MIB {} invalid for upload; must be {}", mib, mibs::ONU_DATA);
                results.reason = reason::UNKNOWN_ME;
                return results;
            }
            Ok(_) => {}
        }

        let Some(snapshot) = self.snapshots.get(&onu_id) else {
            warn!("snapshot was never taken");
            results.reason = reason::PROCESSING_ERROR;
            return results;
        };

        if snapshot.latched_at.elapsed() > SNAPSHOT_MAX_AGE {
            warn!("snapshot has timed out");
            self.snapshots.remove(&onu_id);
            results.reason = reason::PROCESSING_ERROR;
            return results;
        }

        if snapshot.extended != extended {
            let framing = |extended: bool| if extended { "extended" } else { "baseline" };

            error!(
                "snapshot calculated for {}, so can't get using {} message",
                framing(snapshot.extended),
                framing(extended)
            );

            results.reason = reason::PROCESSING_ERROR;
            return results;
        }

        let Some(body) = snapshot.bodies.get(usize::from(seq_num)) else {
            error!(
                "invalid seq_num {}; should be in range 0:{}",
                seq_num,
                snapshot.bodies.len().saturating_sub(1)
            );

            results.reason = reason::PROCESSING_ERROR;
            return results;
        };

        results.body = Some(body.clone());

        results
    }

    /// Latches the non-empty alarm bitmaps of all of one ONU id's
    /// instances, ordered by (class, instance).
    ///
    /// Any materialized instance may anchor the request; the scan always
    /// covers the whole ONU id.
    pub fn get_all_alarms(
        &mut self,
        onu_id: u16,
        me_class: u16,
        me_inst: u16,
        retrieval_mode: u8,
    ) -> AlarmCountResult {
        debug!(
            "get_all_alarms onu_id={}, me_class={}, me_inst={}, retrieval_mode={}",
            onu_id, me_class, me_inst, retrieval_mode
        );

        let mut results = AlarmCountResult::default();

        if let Err(reason) = self.instance(onu_id, me_class, me_inst) {
            results.reason = reason;
            return results;
        }

        // Both retrieval modes return the same stream; ARC is not
        // simulated.
        let entries: Vec<AlarmEntry> = self
            .alarms
            .get(&onu_id)
            .map(|map| {
                map.iter()
                    .filter(|(_, bitmap)| **bitmap != [0; ALARM_BITMAP_LEN])
                    .map(|((me_class, me_inst), bitmap)| AlarmEntry {
                        me_class: *me_class,
                        me_inst: *me_inst,
                        bitmap: *bitmap,
                    })
                    .collect()
            })
            .unwrap_or_default();

        results.num_alarms_nexts = entries.len() as u16;
        self.alarm_lists.insert(onu_id, entries);

        results
    }

    /// Returns one latched alarm bitmap, or all-zero contents when the
    /// sequence number is out of range (the response carries no reason
    /// field).
    pub fn get_all_alarms_next(
        &mut self,
        onu_id: u16,
        me_class: u16,
        me_inst: u16,
        seq_num: u16,
    ) -> AlarmNextResult {
        debug!(
            "get_all_alarms_next onu_id={}, me_class={}, me_inst={}, seq_num={}",
            onu_id, me_class, me_inst, seq_num
        );

        let entry = self
            .alarm_lists
            .get(&onu_id)
            .and_then(|entries| entries.get(usize::from(seq_num)));

        match entry {
            Some(entry) => AlarmNextResult {
                alarmed_me_class: entry.me_class,
                alarmed_me_inst: entry.me_inst,
                bitmap: entry.bitmap,
            },
            None => {
                warn!(
                    "ONU {} has no latched alarm entry {}; returning zeros",
                    onu_id, seq_num
                );

                AlarmNextResult::default()
            }
        }
    }

    /// Applies an alarm bitmap onto one instance's alarm state.
    ///
    /// Only the bit positions the class declares are copied; everything
    /// else in the incoming bitmap is ignored.
    pub fn set_alarm(&mut self, onu_id: u16, me_class: u16, me_inst: u16, bitmap: &AlarmBitmap) {
        let mib = match self.instance(onu_id, me_class, me_inst) {
            Ok((mib, _)) => mib,
            Err(_) => {
                warn!(
                    "alarm for unknown ONU {} MIB {} #{} ignored",
                    onu_id, me_class, me_inst
                );

                return;
            }
        };

        let state = self
            .alarms
            .entry(onu_id)
            .or_default()
            .entry((me_class, me_inst))
            .or_insert([0; ALARM_BITMAP_LEN]);

        for alarm in mib.alarms() {
            let byte = usize::from(alarm.number) / 8;
            let bit = 0x80u8 >> (alarm.number % 8);

            if bitmap[byte] & bit != 0 {
                state[byte] |= bit;
                info!("ONU {} MIB {} #{} alarm {} raised", onu_id, mib, me_inst, alarm.name);
            } else {
                state[byte] &= !bit;
            }
        }
    }

    /// Advances `mib_data_sync` of ONU data #0: modulo 255, skipping zero.
    fn bump_mib_data_sync(&mut self, onu_id: u16) {
        let instance = self
            .instances
            .get_mut(&onu_id)
            .and_then(|map| map.get_mut(&(mibs::ONU_DATA, 0)));

        let Some(value) = instance.and_then(|instance| instance.get_mut("mib_data_sync")) else {
            error!("ONU {} has no ONU data #0 mib_data_sync", onu_id);
            return;
        };

        if let Some(Value::Unsigned(counter)) = value.first_mut() {
            *counter = if *counter >= 255 { 1 } else { *counter + 1 };

            info!("ONU {} mib_data_sync = {}", onu_id, counter);
        }
    }

    /// Backdates the upload snapshot, simulating the passage of time.
    #[cfg(test)]
    fn age_snapshot(&mut self, onu_id: u16, age: Duration) {
        if let Some(snapshot) = self.snapshots.get_mut(&onu_id) {
            snapshot.latched_at = Instant::now() - age;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const ONU: u16 = 42;

    fn database() -> Database {
        Database::new(ONU..=ONU)
    }

    #[test]
    fn default_get_masks_without_optional_attributes() {
        // ONU-G mandatory attributes are 1-4, 6 and 7 (0xf600); 5 and
        // 14-16 are not declared (0x0807). The extended framing carries
        // all 29 bytes of mandatory values in one response.
        let mut db = Database::with_options(ONU..=ONU, false, true);

        let results = db.get(ONU, mibs::ONU_G, 0, 0xffff, true);

        assert_eq!(results.reason, reason::ATTRIBUTES_FAILED);
        assert_eq!(results.attr_mask, 0xf600);
        assert_eq!(results.opt_attr_mask, 0x0807);
        assert_eq!(results.attrs.len(), 6);
    }

    #[test]
    fn baseline_get_drops_oversize_attributes() {
        let mut db = Database::with_options(ONU..=ONU, false, true);

        // 4 + 14 bytes fit; serial_number (8 bytes) would exceed the
        // 25-byte value area, so it is dropped with a parameter error.
        let results = db.get(ONU, mibs::ONU_G, 0, 0xf600, false);

        assert_eq!(results.reason, reason::PARAMETER_ERROR);
        assert_eq!(results.attr_mask, 0xd600);
    }

    #[test]
    fn unknown_class_and_instance_reasons() {
        let mut db = database();

        assert_eq!(
            db.get(ONU, 9999, 0, 0x8000, true).reason,
            reason::UNKNOWN_ME
        );
        assert_eq!(
            db.get(ONU, mibs::ONU_G, 7, 0x8000, true).reason,
            reason::UNKNOWN_INSTANCE
        );
    }

    #[test]
    fn set_battery_backup_increments_mib_data_sync() {
        let mut db = database();

        assert_eq!(db.mib_data_sync(ONU), Some(0));

        let results = db.set(
            ONU,
            mibs::ONU_G,
            0,
            0x0400,
            &[(6, vec![Value::Bool(true)])],
        );

        assert_eq!(results.reason, reason::SUCCESS);
        assert_eq!(db.mib_data_sync(ONU), Some(1));

        let results = db.get(ONU, mibs::ONU_G, 0, 0x0400, false);

        assert_eq!(results.reason, reason::SUCCESS);
        assert_eq!(results.attrs, vec![(6, vec![Value::Bool(true)])]);

        // Setting the same value again is not a change.
        db.set(
            ONU,
            mibs::ONU_G,
            0,
            0x0400,
            &[(6, vec![Value::Bool(true)])],
        );

        assert_eq!(db.mib_data_sync(ONU), Some(1));
    }

    #[test]
    fn set_read_only_attribute_is_a_parameter_error() {
        let mut db = database();

        let results = db.set(
            ONU,
            mibs::ONU_G,
            0,
            0x8000,
            &[(1, vec![Value::Unsigned(1)])],
        );

        assert_eq!(results.reason, reason::PARAMETER_ERROR);
        assert_eq!(db.mib_data_sync(ONU), Some(0));
        assert_eq!(
            db.value(ONU, mibs::ONU_G, 0, "vendor_id"),
            Some(vec![Value::Unsigned(1234)])
        );
    }

    #[test]
    fn set_unknown_attribute_sets_opt_mask() {
        let mut db = database();

        let results = db.set(ONU, mibs::ONU_DATA, 0, 0x0200, &[]);

        assert_eq!(results.reason, reason::ATTRIBUTES_FAILED);
        assert_eq!(results.opt_attr_mask, 0x0200);
    }

    #[test]
    fn mib_data_sync_skips_zero() {
        let mut db = database();

        db.set(
            ONU,
            mibs::ONU_DATA,
            0,
            0x8000,
            &[(1, vec![Value::Unsigned(255)])],
        );

        assert_eq!(db.mib_data_sync(ONU), Some(1));
    }

    #[test]
    fn reset_restores_defaults() {
        let mut db = database();

        db.set(
            ONU,
            mibs::ONU_G,
            0,
            0x0400,
            &[(6, vec![Value::Bool(true)])],
        );

        // Reset is only valid on ONU data #0.
        assert_eq!(
            db.reset(ONU, mibs::ONU_G, 0).reason,
            reason::UNKNOWN_ME
        );

        assert_eq!(db.reset(ONU, mibs::ONU_DATA, 0).reason, reason::SUCCESS);

        let results = db.get(ONU, mibs::ONU_G, 0, 0x0400, false);

        assert_eq!(results.attrs, vec![(6, vec![Value::Bool(false)])]);
        assert_eq!(db.mib_data_sync(ONU), Some(0));
    }

    #[test]
    fn upload_covers_every_instance_exactly_once() {
        let mut db = database();

        let results = db.upload(ONU, mibs::ONU_DATA, 0, false);

        assert_eq!(results.reason, reason::SUCCESS);
        assert!(results.num_upload_nexts > 0);

        let mut seen = std::collections::BTreeSet::new();

        for seq_num in 0..results.num_upload_nexts {
            let next = db.upload_next(ONU, mibs::ONU_DATA, 0, seq_num, false);

            assert_eq!(next.reason, reason::SUCCESS);

            let body = next.body.unwrap();

            assert!(body.length() <= BASELINE_CONTENTS_LEN);

            for chunk in body.chunks() {
                seen.insert((chunk.me_class, chunk.me_inst));
            }
        }

        let expected: std::collections::BTreeSet<(u16, u16)> =
            db.instances[&ONU].keys().copied().collect();

        assert_eq!(seen, expected);
    }

    #[test]
    fn upload_body_lengths_account_for_headers() {
        let mut db = database();

        let results = db.upload(ONU, mibs::ONU_DATA, 0, true);

        let snapshot = db.snapshots.get(&ONU).unwrap();

        let total: usize = snapshot.bodies.iter().map(UploadBody::length).sum();

        let mut expected = 0;

        for body in &snapshot.bodies {
            for chunk in body.chunks() {
                expected += CHUNK_HEADER_EXTENDED;

                let mib = crate::registry().get(chunk.me_class).unwrap();

                for (number, _) in chunk.attrs() {
                    expected += mib.attr_by_number(*number).unwrap().size();
                }
            }
        }

        assert_eq!(total, expected);
        assert_eq!(results.num_upload_nexts as usize, snapshot.bodies.len());
    }

    #[test]
    fn upload_next_expires_after_60_seconds() {
        let mut db = database();

        db.upload(ONU, mibs::ONU_DATA, 0, false);
        db.age_snapshot(ONU, Duration::from_secs(62));

        let results = db.upload_next(ONU, mibs::ONU_DATA, 0, 0, false);

        assert_eq!(results.reason, reason::PROCESSING_ERROR);
        assert!(results.body.is_none());

        // The snapshot is gone; a further upload-next is still an error.
        let results = db.upload_next(ONU, mibs::ONU_DATA, 0, 0, false);

        assert_eq!(results.reason, reason::PROCESSING_ERROR);
    }

    #[test]
    fn upload_next_rejects_framing_mismatch_and_bad_seq() {
        let mut db = database();

        let results = db.upload(ONU, mibs::ONU_DATA, 0, false);

        assert_eq!(
            db.upload_next(ONU, mibs::ONU_DATA, 0, 0, true).reason,
            reason::PROCESSING_ERROR
        );
        assert_eq!(
            db.upload_next(ONU, mibs::ONU_DATA, 0, results.num_upload_nexts, false)
                .reason,
            reason::PROCESSING_ERROR
        );
    }

    #[test]
    fn upload_requires_onu_data() {
        let mut db = database();

        assert_eq!(
            db.upload(ONU, mibs::ONU_G, 0, false).reason,
            reason::UNKNOWN_ME
        );
        assert_eq!(
            db.upload_next(ONU, mibs::ONU_DATA, 0, 0, false).reason,
            reason::PROCESSING_ERROR
        );
    }

    #[test]
    fn create_and_delete_gem_port() {
        let mut db = database();

        let values = vec![
            (1, vec![Value::Unsigned(100)]),
            (2, vec![Value::Unsigned(0x8000)]),
        ];

        let results = db.create(ONU, mibs::GEM_PORT_NET_CTP, 5, &values);

        assert_eq!(results.reason, reason::SUCCESS);
        assert_eq!(db.mib_data_sync(ONU), Some(1));
        assert_eq!(
            db.value(ONU, mibs::GEM_PORT_NET_CTP, 5, "port_id"),
            Some(vec![Value::Unsigned(100)])
        );

        // A second create of the same instance fails.
        assert_eq!(
            db.create(ONU, mibs::GEM_PORT_NET_CTP, 5, &values).reason,
            reason::INSTANCE_EXISTS
        );

        assert_eq!(
            db.delete(ONU, mibs::GEM_PORT_NET_CTP, 5).reason,
            reason::SUCCESS
        );
        assert_eq!(db.mib_data_sync(ONU), Some(2));
        assert_eq!(
            db.delete(ONU, mibs::GEM_PORT_NET_CTP, 5).reason,
            reason::UNKNOWN_INSTANCE
        );
    }

    #[test]
    fn create_flags_non_creatable_attributes() {
        let mut db = database();

        // uni_count (6) is read-only, not settable by create.
        let results = db.create(
            ONU,
            mibs::GEM_PORT_NET_CTP,
            6,
            &[(6, vec![Value::Unsigned(1)])],
        );

        assert_eq!(results.reason, reason::PARAMETER_ERROR);
        assert_eq!(results.attr_exec_mask, 0x0400);
    }

    #[test]
    fn create_unknown_class_and_attribute() {
        let mut db = database();

        assert_eq!(db.create(ONU, 9999, 0, &[]).reason, reason::UNKNOWN_ME);
        assert_eq!(
            db.create(
                ONU,
                mibs::GEM_PORT_NET_CTP,
                6,
                &[(15, vec![Value::Unsigned(1)])]
            )
            .reason,
            reason::UNKNOWN_INSTANCE
        );
    }

    #[test]
    fn alarm_round_trip() {
        let mut db = database();

        // ANI-G declares alarm 2 (signal fail).
        let mut bitmap = [0u8; ALARM_BITMAP_LEN];
        bitmap[0] = 0b0010_0000;

        db.set_alarm(ONU, mibs::ANI_G, 1, &bitmap);

        let count = db.get_all_alarms(ONU, mibs::ONU_DATA, 0, 0);

        assert_eq!(count.reason, reason::SUCCESS);
        assert_eq!(count.num_alarms_nexts, 1);

        let next = db.get_all_alarms_next(ONU, mibs::ONU_DATA, 0, 0);

        assert_eq!(next.alarmed_me_class, mibs::ANI_G);
        assert_eq!(next.alarmed_me_inst, 1);
        assert_eq!(next.bitmap[0], 0b0010_0000);

        // Out of range: all-zero contents.
        let next = db.get_all_alarms_next(ONU, mibs::ONU_DATA, 0, 1);

        assert_eq!(next, AlarmNextResult::default());

        // Any materialized instance may anchor the request; the scan still
        // covers the whole ONU id.
        let count = db.get_all_alarms(ONU, mibs::ONU_G, 0, 0);

        assert_eq!(count.reason, reason::SUCCESS);
        assert_eq!(count.num_alarms_nexts, 1);

        assert_eq!(
            db.get_all_alarms(ONU, 9999, 0, 0).reason,
            reason::UNKNOWN_ME
        );
    }

    #[test]
    fn undeclared_alarm_bits_are_ignored() {
        let mut db = database();

        // ONU-G declares alarms 0 and 1 only.
        let mut bitmap = [0xffu8; ALARM_BITMAP_LEN];

        db.set_alarm(ONU, mibs::ONU_G, 0, &bitmap);

        let next = {
            db.get_all_alarms(ONU, mibs::ONU_DATA, 0, 0);
            db.get_all_alarms_next(ONU, mibs::ONU_DATA, 0, 0)
        };

        assert_eq!(next.bitmap[0], 0b1100_0000);
        assert_eq!(&next.bitmap[1..], &[0; ALARM_BITMAP_LEN - 1]);

        // Clearing works bit by bit too.
        bitmap = [0; ALARM_BITMAP_LEN];
        db.set_alarm(ONU, mibs::ONU_G, 0, &bitmap);

        db.get_all_alarms(ONU, mibs::ONU_DATA, 0, 0);

        assert_eq!(
            db.get_all_alarms_next(ONU, mibs::ONU_DATA, 0, 0),
            AlarmNextResult::default()
        );
    }

    #[test]
    fn baseline_table_get_must_be_alone() {
        let mut db = database();

        db.create(ONU, mibs::EXT_VLAN_TAG, 1, &[(1, vec![Value::Unsigned(2)])]);

        // Table plus scalar: parameter error, no payload.
        let results = db.get(ONU, mibs::EXT_VLAN_TAG, 1, 0x0400 | 0x2000, false);

        assert_eq!(results.reason, reason::PARAMETER_ERROR);
        assert_eq!(results.attr_mask, 0);
        assert!(results.attrs.is_empty());
    }

    #[test]
    fn table_set_appends_and_get_next_streams() {
        let mut db = database();

        db.create(ONU, mibs::EXT_VLAN_TAG, 1, &[(1, vec![Value::Unsigned(2)])]);

        let row_a = vec![0x11u8; mibs::OP_TABLE_ROW_SIZE];
        let row_b = vec![0x22u8; mibs::OP_TABLE_ROW_SIZE];

        for row in [&row_a, &row_b] {
            let results = db.set(
                ONU,
                mibs::EXT_VLAN_TAG,
                1,
                0x0400,
                &[(6, vec![Value::Table(vec![row.clone()])])],
            );

            assert_eq!(results.reason, reason::SUCCESS);
        }

        // A single-attribute baseline get reports the table length and
        // latches the rows.
        let results = db.get(ONU, mibs::EXT_VLAN_TAG, 1, 0x0400, false);

        assert_eq!(results.reason, reason::SUCCESS);
        assert_eq!(
            results.attrs,
            vec![(6, vec![Value::Unsigned(2 * mibs::OP_TABLE_ROW_SIZE as u64)])]
        );

        // 32 bytes of rows stream as two 29-byte chunks.
        let first = db.get_next(ONU, mibs::EXT_VLAN_TAG, 1, 0x0400, 0);

        assert_eq!(first.reason, reason::SUCCESS);
        assert_eq!(first.data.len(), GET_NEXT_CHUNK_LEN);
        assert_eq!(&first.data[..16], &row_a[..]);
        assert_eq!(&first.data[16..29], &row_b[..13]);

        let second = db.get_next(ONU, mibs::EXT_VLAN_TAG, 1, 0x0400, 1);

        assert_eq!(&second.data[..3], &row_b[13..]);
        assert_eq!(&second.data[3..], &[0; 26]);

        // Out of range and missing snapshots.
        assert_eq!(
            db.get_next(ONU, mibs::EXT_VLAN_TAG, 1, 0x0400, 2).reason,
            reason::PARAMETER_ERROR
        );
        assert_eq!(
            db.get_next(ONU, mibs::ONU_G, 0, 0x0400, 0).reason,
            reason::UNKNOWN_ME
        );
    }

    #[test]
    fn sys_up_time_is_dynamic() {
        let mut db = database();

        let results = db.get(ONU, mibs::ONU2_G, 0, 0x0040, true);

        assert_eq!(results.reason, reason::SUCCESS);
        assert_eq!(results.attr_mask, 0x0040);

        // Freshly started, so the tick count is tiny but present.
        assert!(matches!(
            results.attrs[0].1.first(),
            Some(Value::Unsigned(_))
        ));
    }

    #[test]
    fn every_value_tuple_matches_its_attribute_arity() {
        let db = database();

        for (key, instance) in &db.instances[&ONU] {
            let mib = crate::registry().get(key.0).unwrap();

            for (name, value) in instance {
                let attr = mib.attr(name).unwrap();

                assert_eq!(value.len(), attr.data().len(), "{} {}", mib, name);
            }
        }
    }

    #[test]
    fn fixed_values_hold_in_every_instance() {
        let db = database();

        for (key, instance) in &db.instances[&ONU] {
            let mib = crate::registry().get(key.0).unwrap();

            for (name, value) in instance {
                let attr = mib.attr(name).unwrap();

                for (datum, value) in attr.data().iter().zip(value) {
                    if let Some(fixed) = datum.fixed() {
                        assert_eq!(fixed, value, "{} {}", mib, name);
                    }
                }
            }
        }
    }
}
