//! The device handler trait.

use crate::context::OpContext;
use crate::error::DeviceResult;
use crate::types::{Handle, ObjectKind};

/// A resource instance as reported by the device.
///
/// `config` holds the parameters read back from the device, expressed in
/// the same configuration type the agent submits. `tag` is the correlation
/// string stored with the instance, if the device keeps one.
#[derive(Debug, Clone, PartialEq)]
pub struct DumpedInstance<K: ObjectKind, C> {
    pub handle: Handle<K>,
    pub tag: Option<String>,
    pub config: C,
}

impl<K: ObjectKind, C> DumpedInstance<K, C> {
    pub fn new(handle: Handle<K>, tag: Option<String>, config: C) -> Self {
        Self {
            handle,
            tag,
            config,
        }
    }

    /// The tag, treating an empty string as absent.
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref().filter(|tag| !tag.is_empty())
    }
}

/// Executes control operations for one resource kind.
///
/// `C` is the configuration payload; `R` carries what the agent resolved
/// from other resources before the call (for example the handle of the
/// interface a session runs on). Every method receives an [`OpContext`] and
/// must give up with `Cancelled`/`DeadlineExceeded` once it is spent.
pub trait DeviceHandler<K: ObjectKind, C, R>: Send + Sync {
    /// Creates an instance and returns its handle. `tag` is stored with the
    /// instance when the device supports tags.
    fn add(&self, ctx: &OpContext, tag: &str, config: &C, resolved: &R) -> DeviceResult<Handle<K>>;

    /// Updates an instance in place.
    fn modify(
        &self,
        ctx: &OpContext,
        handle: Handle<K>,
        old: &C,
        new: &C,
        resolved: &R,
    ) -> DeviceResult<()>;

    /// Removes an instance.
    fn delete(&self, ctx: &OpContext, handle: Handle<K>, config: &C) -> DeviceResult<()>;

    /// Lists every instance of this kind currently on the device.
    fn dump(&self, ctx: &OpContext) -> DeviceResult<Vec<DumpedInstance<K, C>>>;

    /// Whether `add`/`set_tag` persist a correlation tag.
    fn supports_tags(&self) -> bool {
        true
    }

    /// Writes a correlation tag onto an existing instance.
    fn set_tag(&self, _ctx: &OpContext, _handle: Handle<K>, _tag: &str) -> DeviceResult<()> {
        Ok(())
    }
}
