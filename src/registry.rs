//! LED registry seam
//!
//! [`LedRegistry`] is what a session needs from the LED core: register a
//! device, drop it again, and point it at a default trigger. The registry
//! reports brightness changes back through a [`BrightnessSink`].
//!
//! [`LedClassRegistry`] is an in-process LED class that keeps every
//! registered LED in a table, enforces unique names and lets the host set
//! brightness the way a write to `/sys/class/leds/<name>/brightness` would.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use log::{debug, info, trace};
use parking_lot::Mutex;

use crate::error::RegistryError;
use crate::slot::Brightness;

/// What the registry is asked to create
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LedDescriptor {
    pub name: String,
    pub max_brightness: u32,
    /// Trigger to activate as soon as the LED exists
    pub default_trigger: Option<String>,
}

/// The LED core as seen from a [`DeviceSession`](crate::DeviceSession).
///
/// A [`BrightnessSink`] may be invoked from anywhere, including synchronously
/// from inside `register` or `set_default_trigger` (a trigger that lights the
/// LED as soon as it is attached, for example).
pub trait LedRegistry: Send + Sync + 'static {
    type Handle: Send + 'static;

    fn register(
        &self,
        led: &LedDescriptor,
        sink: BrightnessSink,
    ) -> Result<Self::Handle, RegistryError>;

    /// Best effort, the session is gone either way
    fn unregister(&self, handle: Self::Handle);

    fn set_default_trigger(&self, handle: &Self::Handle, trigger: Option<&str>);
}

pub(crate) trait BrightnessTarget: Send + Sync {
    fn brightness_set(&self, value: Brightness);
}

/// Callback half of a registration.
///
/// Calling [`brightness_set`](Self::brightness_set) never suspends the
/// caller and may happen from any thread. Once the owning session is gone
/// the sink silently drops values.
#[derive(Clone)]
pub struct BrightnessSink {
    target: Weak<dyn BrightnessTarget>,
}

impl BrightnessSink {
    pub(crate) fn new(target: Weak<dyn BrightnessTarget>) -> Self {
        Self { target }
    }

    pub fn brightness_set(&self, value: Brightness) {
        if let Some(target) = self.target.upgrade() {
            target.brightness_set(value);
        }
    }

    /// `false` once the session behind this sink has been dropped
    pub fn is_connected(&self) -> bool {
        self.target.strong_count() > 0
    }
}

impl std::fmt::Debug for BrightnessSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrightnessSink")
            .field("connected", &self.is_connected())
            .finish()
    }
}

struct LedEntry {
    id: u64,
    /// Held from table update through sink call, keeps dispatch in update order
    dispatch: Arc<Mutex<()>>,
    max_brightness: u32,
    brightness: Brightness,
    default_trigger: Option<String>,
    sink: BrightnessSink,
}

/// Handle to an LED registered in a [`LedClassRegistry`]
#[derive(Debug)]
pub struct LedClassHandle {
    name: String,
    id: u64,
}

impl LedClassHandle {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// In-memory LED class
#[derive(Default)]
pub struct LedClassRegistry {
    leds: Mutex<HashMap<String, LedEntry>>,
    next_id: AtomicU64,
}

impl LedClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the brightness of `name`, clamped to its ceiling.
    ///
    /// The device's sink is called after the table lock is released, but
    /// writes to one LED reach its sink in the order they hit the table.
    /// Returns the brightness actually applied.
    pub fn set_brightness(
        &self,
        name: &str,
        value: Brightness,
    ) -> Result<Brightness, RegistryError> {
        let not_found = || RegistryError::NotFound(name.to_owned());
        let (id, dispatch) = {
            let leds = self.leds.lock();
            let led = leds.get(name).ok_or_else(not_found)?;
            (led.id, led.dispatch.clone())
        };
        let _order = dispatch.lock();

        let (sink, applied) = {
            let mut leds = self.leds.lock();
            let led = leds
                .get_mut(name)
                .filter(|led| led.id == id)
                .ok_or_else(not_found)?;
            led.brightness = value.min(led.max_brightness);
            (led.sink.clone(), led.brightness)
        };
        trace!("set_brightness({name}, {value}) -> {applied}");
        sink.brightness_set(applied);
        Ok(applied)
    }

    pub fn brightness(&self, name: &str) -> Option<Brightness> {
        self.leds.lock().get(name).map(|led| led.brightness)
    }

    pub fn max_brightness(&self, name: &str) -> Option<u32> {
        self.leds.lock().get(name).map(|led| led.max_brightness)
    }

    pub fn default_trigger(&self, name: &str) -> Option<String> {
        self.leds
            .lock()
            .get(name)
            .and_then(|led| led.default_trigger.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.leds.lock().contains_key(name)
    }

    /// Names of all registered LEDs, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.leds.lock().keys().cloned().collect();
        names.sort();
        names
    }
}

impl LedRegistry for LedClassRegistry {
    type Handle = LedClassHandle;

    fn register(
        &self,
        led: &LedDescriptor,
        sink: BrightnessSink,
    ) -> Result<LedClassHandle, RegistryError> {
        if led.name.is_empty() {
            return Err(RegistryError::Invalid("empty name".into()));
        }
        if led.max_brightness == 0 {
            return Err(RegistryError::Invalid("max_brightness must be positive".into()));
        }

        let mut leds = self.leds.lock();
        if leds.contains_key(&led.name) {
            return Err(RegistryError::AlreadyExists(led.name.clone()));
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        leds.insert(
            led.name.clone(),
            LedEntry {
                id,
                dispatch: Arc::new(Mutex::new(())),
                max_brightness: led.max_brightness,
                brightness: 0,
                default_trigger: led.default_trigger.clone(),
                sink,
            },
        );
        info!("led {:?} registered (trigger {:?})", led.name, led.default_trigger);
        Ok(LedClassHandle {
            name: led.name.clone(),
            id,
        })
    }

    fn unregister(&self, handle: LedClassHandle) {
        let mut leds = self.leds.lock();
        // a stale handle must not drop a newer LED of the same name
        if leds.get(&handle.name).is_some_and(|led| led.id == handle.id) {
            leds.remove(&handle.name);
            info!("led {:?} unregistered", handle.name);
        }
    }

    fn set_default_trigger(&self, handle: &LedClassHandle, trigger: Option<&str>) {
        if let Some(led) = self.leds.lock().get_mut(&handle.name) {
            if led.id == handle.id {
                debug!("led {:?} default trigger {:?}", handle.name, trigger);
                led.default_trigger = trigger.map(str::to_owned);
            }
        }
    }
}
