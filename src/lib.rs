//! Userspace LED devices
//!
//! A process opens a [`DeviceSession`], sets it up with a name and a
//! brightness ceiling, and from then on the LED core treats it like any other
//! LED. Brightness changes made by anyone else show up in the session as
//! values to [`read`](DeviceSession::read).
//!
//! https://www.kernel.org/doc/html/latest/leds/uleds.html

pub mod abi;
pub mod client;
pub mod error;
pub mod registry;
pub mod session;
pub mod slot;

pub use abi::{PayloadReader, UserDev, UserTrigger};
pub use error::{RegistryError, UledsError};
pub use registry::{BrightnessSink, LedClassRegistry, LedDescriptor, LedRegistry};
pub use session::{DeviceSession, ReadMode, Readiness};
pub use slot::{Brightness, LedSlot, SlotState};
