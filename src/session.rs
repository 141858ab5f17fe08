//! One open handle on the uleds device
//!
//! A [`DeviceSession`] owns a [`LedSlot`] behind a single lock and wakes
//! readers through a [`Notify`]. Setup reaches the slot either through a
//! fixed-size [`write`](DeviceSession::write) or through the
//! [`ioctl`](DeviceSession::ioctl) control call; both end up in the same
//! `apply_setup`.
//!
//! The brightness callback never waits for the slot lock. If the lock is
//! busy (including when the registry calls back from inside `register` or
//! `set_default_trigger`), the value is parked in an atomic cell and whoever
//! holds the lock folds it into the slot on the way out.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{fence, AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, info, trace};
use parking_lot::{Mutex, MutexGuard};
use tokio::sync::futures::Notified;
use tokio::sync::Notify;

use crate::abi::{
    transfer, PayloadReader, UserDev, UserTrigger, BRIGHTNESS_SIZE, ULEDS_IOC_DEV_SETUP,
    ULEDS_IOC_SET_DEFAULT_TRIGGER,
};
use crate::error::{Result, UledsError};
use crate::registry::{BrightnessSink, BrightnessTarget, LedRegistry};
use crate::slot::{Brightness, LedSlot};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReadMode {
    #[default]
    Blocking,
    /// Fail with [`UledsError::WouldBlock`] instead of waiting
    NonBlocking,
}

/// Set in `Shared::parked` when the low 32 bits carry a brightness
const PARKED: u64 = 1 << 32;

struct Shared<H> {
    slot: Mutex<LedSlot<H>>,
    /// Latest brightness from a producer that found the slot locked
    parked: AtomicU64,
    wake: Notify,
}

impl<H> Shared<H> {
    fn new() -> Self {
        Shared {
            slot: Mutex::new(LedSlot::new()),
            parked: AtomicU64::new(0),
            wake: Notify::new(),
        }
    }

    /// Run `f` on the locked slot.
    fn with_slot<T>(&self, f: impl FnOnce(&mut LedSlot<H>) -> T) -> T {
        let mut slot = self.slot.lock();
        let out = f(&mut slot);
        self.release(slot, false);
        out
    }

    /// Move a parked value into the slot; `true` if readers should wake.
    fn unpark(&self, slot: &mut LedSlot<H>) -> bool {
        match self.parked.swap(0, Ordering::SeqCst) {
            0 => false,
            parked => slot.store_brightness(parked as Brightness),
        }
    }

    /// Unlock the slot without stranding a value parked while it was held.
    fn release<'a>(&'a self, mut slot: MutexGuard<'a, LedSlot<H>>, mut wake: bool) {
        loop {
            wake |= self.unpark(&mut slot);
            drop(slot);
            // pairs with the store in `brightness_set`
            fence(Ordering::SeqCst);
            if self.parked.load(Ordering::SeqCst) == 0 {
                break;
            }
            match self.slot.try_lock() {
                Some(next) => slot = next,
                // the new holder picks it up
                None => break,
            }
        }
        if wake {
            self.wake.notify_waiters();
        }
    }
}

impl<H: Send + 'static> BrightnessTarget for Shared<H> {
    fn brightness_set(&self, value: Brightness) {
        match self.slot.try_lock() {
            Some(mut slot) => {
                // anything parked earlier is older than `value`
                let parked = self.unpark(&mut slot);
                let stored = slot.store_brightness(value);
                self.release(slot, parked | stored);
            }
            None => {
                trace!("slot busy, parking brightness {value}");
                self.parked.store(PARKED | u64::from(value), Ordering::SeqCst);
                if let Some(slot) = self.slot.try_lock() {
                    self.release(slot, false);
                }
            }
        }
    }
}

/// Snapshot from [`DeviceSession::poll`].
///
/// Interest in the wake channel is registered before the snapshot is taken,
/// so [`wait`](Self::wait) cannot miss a wake-up that happens in between.
pub struct Readiness<'a> {
    readable: bool,
    notified: Pin<Box<Notified<'a>>>,
}

impl Readiness<'_> {
    pub fn is_readable(&self) -> bool {
        self.readable
    }

    /// Wait for the next wake-up: a new value or a teardown.
    pub async fn wait(self) {
        self.notified.await
    }
}

pub struct DeviceSession<R: LedRegistry> {
    shared: Arc<Shared<R::Handle>>,
    registry: Arc<R>,
}

impl<R: LedRegistry> DeviceSession<R> {
    /// Open a new, unconfigured session.
    pub fn open(registry: Arc<R>) -> Self {
        debug!("session opened");
        DeviceSession {
            shared: Arc::new(Shared::new()),
            registry,
        }
    }

    /// Name the LED was registered under, empty before setup
    pub fn name(&self) -> String {
        self.shared.with_slot(|slot| slot.name().to_owned())
    }

    pub fn max_brightness(&self) -> u32 {
        self.shared.with_slot(|slot| slot.max_brightness())
    }

    pub fn default_trigger(&self) -> Option<String> {
        self.shared
            .with_slot(|slot| slot.default_trigger().map(str::to_owned))
    }

    pub fn is_registered(&self) -> bool {
        self.shared.with_slot(|slot| slot.is_registered())
    }

    fn sink(&self) -> BrightnessSink {
        let target: Arc<dyn BrightnessTarget> = self.shared.clone();
        BrightnessSink::new(Arc::downgrade(&target))
    }

    fn apply_setup(&self, payload: &mut dyn PayloadReader) -> Result<()> {
        let dev = self.shared.with_slot(|slot| {
            slot.ensure_unregistered()?;
            let raw: [u8; UserDev::SIZE] = transfer(payload)?;
            let dev = UserDev::from_bytes(&raw);
            trace!("apply_setup({dev:?})");

            let sink = self.sink();
            slot.setup(&dev, |led| self.registry.register(led, sink))?;
            Ok::<_, UledsError>(dev)
        })?;

        info!("uleds device {:?} is up", dev);
        self.shared.wake.notify_waiters();
        Ok(())
    }

    fn apply_trigger(&self, payload: &mut dyn PayloadReader) -> Result<()> {
        let raw: [u8; UserTrigger::SIZE] = transfer(payload)?;
        let trigger = UserTrigger::from_bytes(&raw);
        trace!("apply_trigger({trigger:?})");

        self.shared.with_slot(|slot| {
            slot.set_default_trigger(&trigger, |handle, name| {
                self.registry.set_default_trigger(handle, name)
            })
        })
    }

    /// Setup through a single payload write.
    ///
    /// A zero length write does nothing, any length other than
    /// [`UserDev::SIZE`] is rejected.
    pub fn write(&self, mut payload: impl PayloadReader) -> Result<usize> {
        match payload.len() {
            0 => Ok(0),
            UserDev::SIZE => {
                self.apply_setup(&mut payload)?;
                Ok(UserDev::SIZE)
            }
            _ => Err(UledsError::InvalidArgument),
        }
    }

    /// Control call dispatch, `cmd` is one of the `ULEDS_IOC_*` numbers.
    pub fn ioctl(&self, cmd: u32, mut arg: impl PayloadReader) -> Result<()> {
        match cmd {
            ULEDS_IOC_DEV_SETUP => self.apply_setup(&mut arg),
            ULEDS_IOC_SET_DEFAULT_TRIGGER => self.apply_trigger(&mut arg),
            _ => Err(UledsError::UnknownCommand(cmd)),
        }
    }

    /// `ULEDS_IOC_DEV_SETUP` with an already built payload
    pub fn setup(&self, dev: &UserDev) -> Result<()> {
        self.ioctl(ULEDS_IOC_DEV_SETUP, &dev.to_bytes()[..])
    }

    /// `ULEDS_IOC_SET_DEFAULT_TRIGGER` with an already built payload
    pub fn set_default_trigger(&self, trigger: &UserTrigger) -> Result<()> {
        self.ioctl(ULEDS_IOC_SET_DEFAULT_TRIGGER, &trigger.to_bytes()[..])
    }

    /// Read one brightness value into `buf`.
    ///
    /// See [`read_interruptible`](Self::read_interruptible).
    pub async fn read(&self, buf: &mut [u8], mode: ReadMode) -> Result<usize> {
        self.read_interruptible(buf, mode, std::future::pending::<()>())
            .await
    }

    /// Read one brightness value into `buf`, giving up with
    /// [`UledsError::Interrupted`] once `interrupt` completes.
    ///
    /// Returns `Ok(0)` if `buf` cannot hold a value, otherwise the value is
    /// written native-endian and [`BRIGHTNESS_SIZE`] is returned.
    pub async fn read_interruptible<I>(
        &self,
        buf: &mut [u8],
        mode: ReadMode,
        interrupt: I,
    ) -> Result<usize>
    where
        I: Future,
    {
        if buf.len() < BRIGHTNESS_SIZE {
            return Ok(0);
        }
        let nonblocking = mode == ReadMode::NonBlocking;
        tokio::pin!(interrupt);

        loop {
            // armed before looking at the slot so a wake-up can't slip past
            let notified = self.shared.wake.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let taken = self
                .shared
                .with_slot(|slot| slot.take_brightness(nonblocking))?;
            if let Some(value) = taken {
                trace!("read -> {value}");
                buf[..BRIGHTNESS_SIZE].copy_from_slice(&value.to_ne_bytes());
                return Ok(BRIGHTNESS_SIZE);
            }

            tokio::select! {
                biased;
                _ = &mut interrupt => return Err(UledsError::Interrupted),
                _ = notified => {}
            }
        }
    }

    /// Readiness check, never consumes the pending value.
    pub fn poll(&self) -> Result<Readiness<'_>> {
        let mut notified = Box::pin(self.shared.wake.notified());
        notified.as_mut().enable();

        let readable = self.shared.with_slot(|slot| {
            if slot.is_registered() {
                Ok(slot.has_unread())
            } else {
                Err(UledsError::NotReady)
            }
        })?;
        Ok(Readiness { readable, notified })
    }

    /// Wait until a value is pending, without taking it.
    pub async fn readable(&self) -> Result<()> {
        loop {
            let readiness = self.poll()?;
            if readiness.is_readable() {
                return Ok(());
            }
            readiness.wait().await;
        }
    }

    /// Tear the session down, unregistering the LED if it was registered.
    ///
    /// Blocked readers are released with [`UledsError::NotReady`]. Closing
    /// twice is harmless.
    pub fn close(&self) {
        let (was_closed, handle) = self
            .shared
            .with_slot(|slot| (slot.is_closed(), slot.close()));
        if was_closed {
            return;
        }
        if let Some(handle) = handle {
            self.registry.unregister(handle);
        }
        debug!("session closed");
        self.shared.wake.notify_waiters();
    }
}

impl<R: LedRegistry> Drop for DeviceSession<R> {
    fn drop(&mut self) {
        self.close();
    }
}
