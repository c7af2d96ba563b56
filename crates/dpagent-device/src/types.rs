//! Typed device handles.
//!
//! A device assigns a numeric handle to every instance it creates (an
//! interface index, a session index, ...). [`Handle`] tags that number with
//! the kind of object it names so handles of different kinds cannot be
//! mixed at compile time.

use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Raw device handle as carried on the control API.
pub type RawHandle = u32;

/// Marker trait for the kinds of object a device hands out handles for.
pub trait ObjectKind: Send + Sync + 'static {
    /// Object type name used in debug output.
    fn type_name() -> &'static str;
}

/// A device handle for an object of kind `K`.
///
/// Zero is a valid handle: the built-in loopback interface lives at index 0.
pub struct Handle<K: ObjectKind> {
    raw: RawHandle,
    _kind: PhantomData<K>,
}

impl<K: ObjectKind> Handle<K> {
    pub const fn new(raw: RawHandle) -> Self {
        Self {
            raw,
            _kind: PhantomData,
        }
    }

    pub const fn as_raw(&self) -> RawHandle {
        self.raw
    }
}

impl<K: ObjectKind> Clone for Handle<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K: ObjectKind> Copy for Handle<K> {}

impl<K: ObjectKind> fmt::Debug for Handle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", K::type_name(), self.raw)
    }
}

impl<K: ObjectKind> fmt::Display for Handle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl<K: ObjectKind> PartialEq for Handle<K> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<K: ObjectKind> Eq for Handle<K> {}

impl<K: ObjectKind> PartialOrd for Handle<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K: ObjectKind> Ord for Handle<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.raw.cmp(&other.raw)
    }
}

impl<K: ObjectKind> Hash for Handle<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl<K: ObjectKind> Serialize for Handle<K> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.raw)
    }
}

macro_rules! define_object_kind {
    ($name:ident, $type_name:literal, $alias:ident) => {
        #[doc = concat!("Marker type for ", $type_name, " objects.")]
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name;

        impl ObjectKind for $name {
            fn type_name() -> &'static str {
                $type_name
            }
        }

        #[doc = concat!("Handle of a ", $type_name, " object.")]
        pub type $alias = Handle<$name>;
    };
}

define_object_kind!(InterfaceKind, "Interface", InterfaceHandle);
define_object_kind!(HostInterfaceKind, "HostInterface", HostInterfaceHandle);
define_object_kind!(BfdSessionKind, "BfdSession", BfdSessionHandle);
define_object_kind!(BfdAuthKeyKind, "BfdAuthKey", BfdAuthKeyHandle);
define_object_kind!(BfdEchoKind, "BfdEcho", BfdEchoHandle);
define_object_kind!(StnRuleKind, "StnRule", StnRuleHandle);
