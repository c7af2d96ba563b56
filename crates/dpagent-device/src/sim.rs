//! In-memory device table.
//!
//! [`SimTable`] implements [`DeviceHandler`] for one resource kind by keeping
//! the instances in memory. It counts every call, can drop tags the way a
//! device without a tag field does, and can be told to fail the next call of
//! a given operation, to behave as unreachable, or to take a fixed time per
//! call. The agent binary runs on
//! these tables in simulation mode, and the integration tests use them to
//! assert how many device calls a pass issued.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::marker::PhantomData;
use std::thread;
use std::time::Duration;

use log::debug;
use parking_lot::{Mutex, MutexGuard};

use crate::context::OpContext;
use crate::error::{DeviceError, DeviceResult, DeviceStatus};
use crate::handler::{DeviceHandler, DumpedInstance};
use crate::types::{Handle, ObjectKind, RawHandle};

/// Device operations, for fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimOp {
    Add,
    Modify,
    Delete,
    Dump,
    SetTag,
}

/// Successful calls per operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimCounters {
    pub adds: u64,
    pub modifies: u64,
    pub deletes: u64,
    pub dumps: u64,
    pub tags: u64,
}

impl SimCounters {
    /// Calls that changed device state.
    pub fn mutations(&self) -> u64 {
        self.adds + self.modifies + self.deletes
    }
}

/// One stored instance.
#[derive(Debug, Clone, PartialEq)]
pub struct SimEntry<C> {
    pub tag: Option<String>,
    pub config: C,
}

struct SimState<C> {
    entries: BTreeMap<RawHandle, SimEntry<C>>,
    next_handle: RawHandle,
    counters: SimCounters,
    unreachable: bool,
    latency: Duration,
    faults: VecDeque<(SimOp, DeviceError)>,
}

impl<C> SimState<C> {
    fn allocate(&mut self) -> RawHandle {
        while self.entries.contains_key(&self.next_handle) {
            self.next_handle += 1;
        }
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }
}

/// In-memory table of one resource kind.
pub struct SimTable<K: ObjectKind, C> {
    name: &'static str,
    tags: bool,
    state: Mutex<SimState<C>>,
    _kind: PhantomData<K>,
}

impl<K: ObjectKind, C> fmt::Debug for SimTable<K, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SimTable")
            .field("name", &self.name)
            .field("tags", &self.tags)
            .field("entries", &state.entries.len())
            .field("counters", &state.counters)
            .finish()
    }
}

impl<K: ObjectKind, C: Clone> SimTable<K, C> {
    /// Empty table handing out handles from 1, with tag support.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            tags: true,
            state: Mutex::new(SimState {
                entries: BTreeMap::new(),
                next_handle: 1,
                counters: SimCounters::default(),
                unreachable: false,
                latency: Duration::ZERO,
                faults: VecDeque::new(),
            }),
            _kind: PhantomData,
        }
    }

    /// Drops tags on add and reports none on dump.
    pub fn without_tags(mut self) -> Self {
        self.tags = false;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Creates an instance behind the agent's back.
    pub fn inject(&self, tag: Option<&str>, config: C) -> Handle<K> {
        let mut state = self.state.lock();
        let raw = state.allocate();
        state.entries.insert(
            raw,
            SimEntry {
                tag: tag.map(str::to_string),
                config,
            },
        );
        Handle::new(raw)
    }

    /// Creates an instance at a fixed handle behind the agent's back.
    pub fn inject_at(&self, raw: RawHandle, tag: Option<&str>, config: C) -> Handle<K> {
        let mut state = self.state.lock();
        state.entries.insert(
            raw,
            SimEntry {
                tag: tag.map(str::to_string),
                config,
            },
        );
        if state.next_handle <= raw {
            state.next_handle = raw + 1;
        }
        Handle::new(raw)
    }

    /// Removes an instance behind the agent's back.
    pub fn remove_out_of_band(&self, handle: Handle<K>) -> Option<SimEntry<C>> {
        self.state.lock().entries.remove(&handle.as_raw())
    }

    pub fn get(&self, handle: Handle<K>) -> Option<SimEntry<C>> {
        self.state.lock().entries.get(&handle.as_raw()).cloned()
    }

    /// Handle of the instance carrying `tag`.
    pub fn find_by_tag(&self, tag: &str) -> Option<Handle<K>> {
        self.state
            .lock()
            .entries
            .iter()
            .find(|(_, entry)| entry.tag.as_deref() == Some(tag))
            .map(|(raw, _)| Handle::new(*raw))
    }

    /// All instances in handle order.
    pub fn entries(&self) -> Vec<(Handle<K>, SimEntry<C>)> {
        self.state
            .lock()
            .entries
            .iter()
            .map(|(raw, entry)| (Handle::new(*raw), entry.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    pub fn counters(&self) -> SimCounters {
        self.state.lock().counters
    }

    pub fn reset_counters(&self) {
        self.state.lock().counters = SimCounters::default();
    }

    /// Makes every call fail with `Unreachable` until cleared.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unreachable = unreachable;
    }

    /// Fails the next call of `op` with `error`.
    pub fn fail_next(&self, op: SimOp, error: DeviceError) {
        self.state.lock().faults.push_back((op, error));
    }

    /// Makes every call block for `latency` before it is served.
    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().latency = latency;
    }

    /// Waits out the latency, then checks the context and injected faults.
    fn enter(&self, ctx: &OpContext, op: SimOp) -> DeviceResult<MutexGuard<'_, SimState<C>>> {
        let latency = self.state.lock().latency;
        if !latency.is_zero() {
            thread::sleep(latency);
        }

        let mut state = self.state.lock();
        ctx.check()?;
        if state.unreachable {
            return Err(DeviceError::unreachable(format!("{} table offline", self.name)));
        }
        if let Some(pos) = state.faults.iter().position(|(fault_op, _)| *fault_op == op) {
            if let Some((_, error)) = state.faults.remove(pos) {
                return Err(error);
            }
        }
        Ok(state)
    }
}

impl<K, C, R> DeviceHandler<K, C, R> for SimTable<K, C>
where
    K: ObjectKind,
    C: Clone + fmt::Debug + Send + Sync,
    R: fmt::Debug,
{
    fn add(&self, ctx: &OpContext, tag: &str, config: &C, resolved: &R) -> DeviceResult<Handle<K>> {
        let mut state = self.enter(ctx, SimOp::Add)?;

        let raw = state.allocate();
        let tag = (self.tags && !tag.is_empty()).then(|| tag.to_string());
        state.entries.insert(
            raw,
            SimEntry {
                tag,
                config: config.clone(),
            },
        );
        state.counters.adds += 1;
        debug!("{}: add handle={} config={:?} resolved={:?}", self.name, raw, config, resolved);
        Ok(Handle::new(raw))
    }

    fn modify(
        &self,
        ctx: &OpContext,
        handle: Handle<K>,
        _old: &C,
        new: &C,
        resolved: &R,
    ) -> DeviceResult<()> {
        let mut state = self.enter(ctx, SimOp::Modify)?;

        let entry = state
            .entries
            .get_mut(&handle.as_raw())
            .ok_or_else(|| DeviceError::rejected(DeviceStatus::NoSuchEntry, "modify"))?;
        entry.config = new.clone();
        state.counters.modifies += 1;
        debug!("{}: modify handle={} config={:?} resolved={:?}", self.name, handle, new, resolved);
        Ok(())
    }

    fn delete(&self, ctx: &OpContext, handle: Handle<K>, _config: &C) -> DeviceResult<()> {
        let mut state = self.enter(ctx, SimOp::Delete)?;

        state
            .entries
            .remove(&handle.as_raw())
            .ok_or_else(|| DeviceError::rejected(DeviceStatus::NoSuchEntry, "delete"))?;
        state.counters.deletes += 1;
        debug!("{}: delete handle={}", self.name, handle);
        Ok(())
    }

    fn dump(&self, ctx: &OpContext) -> DeviceResult<Vec<DumpedInstance<K, C>>> {
        let mut state = self.enter(ctx, SimOp::Dump)?;

        state.counters.dumps += 1;
        Ok(state
            .entries
            .iter()
            .map(|(raw, entry)| {
                let tag = if self.tags { entry.tag.clone() } else { None };
                DumpedInstance::new(Handle::new(*raw), tag, entry.config.clone())
            })
            .collect())
    }

    fn supports_tags(&self) -> bool {
        self.tags
    }

    fn set_tag(&self, ctx: &OpContext, handle: Handle<K>, tag: &str) -> DeviceResult<()> {
        if !self.tags {
            return Ok(());
        }
        let mut state = self.enter(ctx, SimOp::SetTag)?;

        let entry = state
            .entries
            .get_mut(&handle.as_raw())
            .ok_or_else(|| DeviceError::rejected(DeviceStatus::NoSuchEntry, "set_tag"))?;
        entry.tag = Some(tag.to_string());
        state.counters.tags += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::InterfaceKind;
    use pretty_assertions::assert_eq;

    type Table = SimTable<InterfaceKind, &'static str>;

    fn add(table: &Table, tag: &str, config: &'static str) -> DeviceResult<Handle<InterfaceKind>> {
        DeviceHandler::<InterfaceKind, &'static str, ()>::add(table, &OpContext::new(), tag, &config, &())
    }

    fn dump(table: &Table) -> Vec<DumpedInstance<InterfaceKind, &'static str>> {
        DeviceHandler::<InterfaceKind, &'static str, ()>::dump(table, &OpContext::new()).unwrap()
    }

    #[test]
    fn test_add_allocates_sequential_handles() {
        let table = Table::new("interfaces");
        assert_eq!(add(&table, "a", "loop").unwrap().as_raw(), 1);
        assert_eq!(add(&table, "b", "loop").unwrap().as_raw(), 2);
        assert_eq!(table.counters().adds, 2);
    }

    #[test]
    fn test_allocation_skips_injected_handles() {
        let table = Table::new("interfaces");
        table.inject_at(1, None, "ethernet");
        table.inject_at(2, None, "ethernet");
        assert_eq!(add(&table, "tap1", "tap").unwrap().as_raw(), 3);
    }

    #[test]
    fn test_dump_reports_tags_in_handle_order() {
        let table = Table::new("interfaces");
        table.inject_at(6, None, "tap");
        table.inject_at(5, Some("tap1"), "tap");

        let dumped = dump(&table);
        assert_eq!(dumped.len(), 2);
        assert_eq!(dumped[0].handle.as_raw(), 5);
        assert_eq!(dumped[0].tag(), Some("tap1"));
        assert_eq!(dumped[1].tag(), None);
    }

    #[test]
    fn test_without_tags_drops_them() {
        let table = Table::new("sessions").without_tags();
        add(&table, "bfd1", "session").unwrap();
        assert!(dump(&table).iter().all(|d| d.tag.is_none()));
    }

    #[test]
    fn test_fail_next_only_hits_matching_op() {
        let table = Table::new("interfaces");
        table.fail_next(SimOp::Delete, DeviceError::rejected(DeviceStatus::InUse, "delete"));

        let handle = add(&table, "a", "loop").unwrap();
        let err = DeviceHandler::<InterfaceKind, &'static str, ()>::delete(
            &table,
            &OpContext::new(),
            handle,
            &"loop",
        )
        .unwrap_err();
        assert_eq!(err.status(), Some(DeviceStatus::InUse));
        assert_eq!(table.len(), 1);
        assert_eq!(table.counters().deletes, 0);
    }

    #[test]
    fn test_unreachable_and_cancelled() {
        let table = Table::new("interfaces");
        table.set_unreachable(true);
        assert!(add(&table, "a", "loop").unwrap_err().is_unreachable());
        table.set_unreachable(false);

        let ctx = OpContext::new();
        ctx.cancel();
        let err =
            DeviceHandler::<InterfaceKind, &'static str, ()>::add(&table, &ctx, "a", &"loop", &())
                .unwrap_err();
        assert_eq!(err, DeviceError::Cancelled);
        assert!(table.is_empty());
    }

    #[test]
    fn test_modify_missing_is_rejected() {
        let table = Table::new("interfaces");
        let err = DeviceHandler::<InterfaceKind, &'static str, ()>::modify(
            &table,
            &OpContext::new(),
            Handle::new(9),
            &"a",
            &"b",
            &(),
        )
        .unwrap_err();
        assert_eq!(err.status(), Some(DeviceStatus::NoSuchEntry));
    }

    #[test]
    fn test_latency_counts_against_the_call_deadline() {
        let table = Table::new("interfaces");
        table.set_latency(Duration::from_millis(30));

        let ctx = OpContext::new().with_call_timeout(Duration::from_millis(10));
        let err = DeviceHandler::<InterfaceKind, &'static str, ()>::add(
            &table,
            &ctx.for_call(),
            "a",
            &"loop",
            &(),
        )
        .unwrap_err();
        assert_eq!(err, DeviceError::DeadlineExceeded);
        assert!(table.is_empty());

        let ctx = OpContext::new().with_call_timeout(Duration::from_secs(5));
        for tag in ["a", "b", "c"] {
            DeviceHandler::<InterfaceKind, &'static str, ()>::add(
                &table,
                &ctx.for_call(),
                tag,
                &"loop",
                &(),
            )
            .unwrap();
        }
        assert_eq!(table.len(), 3);
    }
}
