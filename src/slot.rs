//! State of one userspace-backed LED
//!
//! A [`LedSlot`] holds the declared name and brightness ceiling, the
//! registration state and a single-value brightness mailbox. It has no locking
//! of its own; [`DeviceSession`](crate::DeviceSession) keeps it behind one
//! mutex and pairs it with a wake channel.

use log::{debug, trace};

use crate::abi::{until_nul, UserDev, UserTrigger, LED_MAX_NAME_SIZE, TRIGGER_MAX_NAME_SIZE};
use crate::error::{RegistryError, Result, UledsError};
use crate::registry::LedDescriptor;

pub type Brightness = u32;

/// Trigger names the LED core reserves for itself
const RESERVED_TRIGGER: &str = "default";

#[derive(Debug)]
pub enum SlotState<H> {
    Unregistered,
    /// Registered with the LED registry, holding its handle
    Registered(H),
    /// Torn down by close, never leaves this state
    Closed,
}

#[derive(Debug)]
pub struct LedSlot<H> {
    name: String,
    max_brightness: u32,
    default_trigger: Option<String>,
    state: SlotState<H>,
    brightness: Brightness,
    has_unread: bool,
}

impl<H> Default for LedSlot<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> LedSlot<H> {
    pub fn new() -> Self {
        LedSlot {
            name: String::new(),
            max_brightness: 0,
            default_trigger: None,
            state: SlotState::Unregistered,
            brightness: 0,
            has_unread: false,
        }
    }

    /// Registered name, empty until setup succeeds
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_brightness(&self) -> u32 {
        self.max_brightness
    }

    pub fn default_trigger(&self) -> Option<&str> {
        self.default_trigger.as_deref()
    }

    pub fn state(&self) -> &SlotState<H> {
        &self.state
    }

    pub fn is_registered(&self) -> bool {
        matches!(self.state, SlotState::Registered(_))
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, SlotState::Closed)
    }

    /// `true` if a brightness value is waiting for a reader
    pub fn has_unread(&self) -> bool {
        self.has_unread
    }

    /// Fail unless setup may still run on this slot.
    pub fn ensure_unregistered(&self) -> Result<()> {
        match self.state {
            SlotState::Unregistered => Ok(()),
            SlotState::Registered(_) => Err(UledsError::AlreadyConfigured),
            SlotState::Closed => Err(UledsError::NotReady),
        }
    }

    /// Validate `dev` and register through `register`.
    ///
    /// Either the slot ends up `Registered` with one unread seed value, or it
    /// is left exactly as it was.
    pub fn setup<F>(&mut self, dev: &UserDev, register: F) -> Result<()>
    where
        F: FnOnce(&LedDescriptor) -> std::result::Result<H, RegistryError>,
    {
        self.ensure_unregistered()?;

        let name = parse_led_name(&dev.name)?;
        if dev.max_brightness <= 0 {
            return Err(UledsError::InvalidArgument);
        }

        let desc = LedDescriptor {
            name: name.to_owned(),
            max_brightness: dev.max_brightness as u32,
            default_trigger: self.default_trigger.clone(),
        };
        let handle = register(&desc)?;

        debug!("registered led {:?} (max_brightness={})", desc.name, desc.max_brightness);
        self.name = desc.name;
        self.max_brightness = desc.max_brightness;
        self.state = SlotState::Registered(handle);
        // the seed always counts as one unread value
        self.has_unread = true;
        Ok(())
    }

    /// Store or clear the default trigger; `apply` pushes it to a live
    /// registration.
    pub fn set_default_trigger<F>(&mut self, trigger: &UserTrigger, apply: F) -> Result<()>
    where
        F: FnOnce(&H, Option<&str>),
    {
        if self.is_closed() {
            return Err(UledsError::NotReady);
        }
        self.default_trigger = parse_trigger_name(&trigger.name)?.map(str::to_owned);
        debug!("default trigger for {:?} is now {:?}", self.name, self.default_trigger);

        if let SlotState::Registered(ref handle) = self.state {
            apply(handle, self.default_trigger.as_deref());
        }
        Ok(())
    }

    /// Put a new brightness in the mailbox.
    ///
    /// Returns `true` if a reader should be woken.
    pub fn store_brightness(&mut self, value: Brightness) -> bool {
        if !self.is_registered() || self.brightness == value {
            return false;
        }
        trace!("{}: brightness {} -> {}", self.name, self.brightness, value);
        self.brightness = value;
        self.has_unread = true;
        true
    }

    /// Take the pending brightness.
    ///
    /// `Ok(None)` means nothing is pending and the caller may wait.
    pub fn take_brightness(&mut self, nonblocking: bool) -> Result<Option<Brightness>> {
        if !self.is_registered() {
            Err(UledsError::NotReady)
        } else if self.has_unread {
            self.has_unread = false;
            Ok(Some(self.brightness))
        } else if nonblocking {
            Err(UledsError::WouldBlock)
        } else {
            Ok(None)
        }
    }

    /// Move to the terminal state, handing back the registry handle if any.
    pub fn close(&mut self) -> Option<H> {
        self.has_unread = false;
        match std::mem::replace(&mut self.state, SlotState::Closed) {
            SlotState::Registered(handle) => Some(handle),
            _ => None,
        }
    }
}

/// A name the LED class can use as a directory entry.
pub fn is_led_name_valid(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains('/')
}

/// Alphanumerics, hyphen or underscore, shorter than the field, not reserved.
pub fn is_trigger_name_valid(name: &str) -> bool {
    !name.is_empty()
        && name.len() < TRIGGER_MAX_NAME_SIZE
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        && name != RESERVED_TRIGGER
}

fn parse_led_name(field: &[u8; LED_MAX_NAME_SIZE]) -> Result<&str> {
    let raw = until_nul(field);
    // no terminator inside the field
    if raw.len() == LED_MAX_NAME_SIZE {
        return Err(UledsError::InvalidArgument);
    }
    let name = std::str::from_utf8(raw).map_err(|_| UledsError::InvalidArgument)?;
    if !is_led_name_valid(name) {
        return Err(UledsError::InvalidArgument);
    }
    Ok(name)
}

/// `Ok(None)` clears the trigger.
fn parse_trigger_name(field: &[u8; TRIGGER_MAX_NAME_SIZE]) -> Result<Option<&str>> {
    let raw = until_nul(field);
    if raw.is_empty() {
        return Ok(None);
    }
    let name = std::str::from_utf8(raw).map_err(|_| UledsError::InvalidArgument)?;
    if !is_trigger_name_valid(name) {
        return Err(UledsError::InvalidArgument);
    }
    Ok(Some(name))
}
