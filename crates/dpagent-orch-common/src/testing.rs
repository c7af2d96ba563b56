//! Toy resource kind shared by the unit tests.

use std::sync::Arc;

use dpagent_device::{
    DeviceHandler, DumpedInstance, Handle, HostInterfaceKind, InterfaceKind, OpContext, RawHandle,
    SimTable,
};

use crate::configurator::Configurator;
use crate::pending::{Dependency, PendingCache};
use crate::registry::Registry;
use crate::spec::{Match, Resolution, ResourceSpec};

#[derive(Debug, Clone, PartialEq)]
pub struct Widget {
    pub name: String,
    pub color: &'static str,
    pub size: u32,
    pub label: &'static str,
    pub mac: Option<&'static str>,
    pub ips: Vec<&'static str>,
    pub needs: Option<&'static str>,
    pub port: bool,
}

impl Widget {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            color: "red",
            size: 1,
            label: "",
            mac: None,
            ips: Vec::new(),
            needs: None,
            port: false,
        }
    }

    pub fn color(mut self, color: &'static str) -> Self {
        self.color = color;
        self
    }

    pub fn size(mut self, size: u32) -> Self {
        self.size = size;
        self
    }

    pub fn label(mut self, label: &'static str) -> Self {
        self.label = label;
        self
    }

    pub fn mac(mut self, mac: &'static str) -> Self {
        self.mac = Some(mac);
        self
    }

    pub fn ips(mut self, ips: &[&'static str]) -> Self {
        self.ips = ips.to_vec();
        self
    }

    pub fn needs(mut self, gadget: &'static str) -> Self {
        self.needs = Some(gadget);
        self
    }

    /// Device-owned: present from the start, never added or deleted.
    pub fn port(mut self) -> Self {
        self.port = true;
        self
    }
}

pub fn gadget(name: &str) -> Dependency {
    Dependency::new("gadget", name)
}

/// Widgets may need a gadget; color changes apply in place, size changes
/// recreate. The label only lives in registry metadata. Port widgets are
/// device-owned and reset to their defaults, keeping the MAC.
pub struct WidgetSpec {
    pub gadgets: Arc<Registry<HostInterfaceKind, ()>>,
}

impl ResourceSpec for WidgetSpec {
    type Kind = InterfaceKind;
    type Config = Widget;
    type Meta = &'static str;
    type Resolved = Option<RawHandle>;

    fn kind(&self) -> &'static str {
        "widget"
    }

    fn name(&self, config: &Widget) -> String {
        config.name.clone()
    }

    fn validate(&self, config: &Widget) -> Result<(), String> {
        if config.size == 0 {
            return Err("size must be positive".to_string());
        }
        Ok(())
    }

    fn dependencies(&self, config: &Widget) -> Vec<Dependency> {
        config.needs.map(gadget).into_iter().collect()
    }

    fn resolve(&self, config: &Widget) -> Resolution<Option<RawHandle>> {
        match config.needs {
            None => Resolution::Ready(None),
            Some(name) => match self.gadgets.lookup_by_name(name) {
                Some(entry) => Resolution::Ready(Some(entry.handle.as_raw())),
                None => Resolution::Blocked(gadget(name)),
            },
        }
    }

    fn metadata(&self, config: &Widget) -> &'static str {
        config.label
    }

    fn is_modified(&self, old: &Widget, new: &Widget) -> bool {
        old.color != new.color
            || old.size != new.size
            || old.needs != new.needs
            || old.mac != new.mac
            || old.ips != new.ips
    }

    fn can_modify_in_place(&self, old: &Widget, new: &Widget) -> bool {
        old.size == new.size && old.needs == new.needs
    }

    fn correlate(&self, dumped: &DumpedInstance<InterfaceKind, Widget>, desired: &Widget) -> Option<Match> {
        if dumped.handle.as_raw() == 0 {
            return None;
        }
        if desired.mac.is_some() && dumped.config.mac == desired.mac {
            return Some(Match::Primary);
        }
        if !desired.ips.is_empty() && dumped.config.ips == desired.ips {
            return Some(Match::Secondary);
        }
        None
    }

    fn is_builtin(&self, dumped: &DumpedInstance<InterfaceKind, Widget>) -> bool {
        dumped.handle.as_raw() == 0 || dumped.config.port
    }

    fn builtin_name(&self, dumped: &DumpedInstance<InterfaceKind, Widget>) -> Option<String> {
        if dumped.handle.as_raw() == 0 {
            return Some("local0".to_string());
        }
        dumped.config.port.then(|| dumped.config.name.clone())
    }

    fn fixed_default(&self, config: &Widget) -> Option<Widget> {
        let mut reset = Widget::new(&config.name).port();
        reset.mac = config.mac;
        config.port.then_some(reset)
    }
}

pub struct Harness {
    pub ctx: OpContext,
    pub device: Arc<SimTable<InterfaceKind, Widget>>,
    pub gadgets: Arc<Registry<HostInterfaceKind, ()>>,
    pub configurator: Configurator<WidgetSpec>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_device(SimTable::new("widgets"))
    }

    pub fn with_device(table: SimTable<InterfaceKind, Widget>) -> Self {
        let device = Arc::new(table);
        let gadgets = Arc::new(Registry::new("gadget"));
        let handler: Arc<dyn DeviceHandler<InterfaceKind, Widget, Option<RawHandle>>> = device.clone();
        let configurator = Configurator::new(
            WidgetSpec {
                gadgets: Arc::clone(&gadgets),
            },
            handler,
            Arc::new(Registry::new("widget")),
            Arc::new(PendingCache::new()),
        );
        Self {
            ctx: OpContext::new(),
            device,
            gadgets,
            configurator,
        }
    }

    pub fn add_gadget(&self, name: &str, raw: RawHandle) {
        self.gadgets
            .register(name, Handle::new(raw), ())
            .unwrap();
    }

    pub fn mutations(&self) -> u64 {
        self.device.counters().mutations()
    }
}
