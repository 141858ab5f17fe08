//! uleds client
//!
//! creates a userspace LED through the kernel's `/dev/uleds` device
//!
//! https://www.kernel.org/doc/html/latest/leds/uleds.html

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use anyhow::{bail, Context, Result};
use log::{debug, trace};
use tokio::io::unix::AsyncFd;

use crate::abi::{
    UserDev, UserTrigger, BRIGHTNESS_SIZE, ULEDS_IOC_DEV_SETUP, ULEDS_IOC_SET_DEFAULT_TRIGGER,
};
use crate::slot::Brightness;

pub const DEFAULT_DEVICE: &str = "/dev/uleds";

/// How the setup payload reaches the driver
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SetupMethod {
    /// One `write(2)` of the whole payload
    Write,
    #[default]
    Ioctl,
}

/// An open uleds device, registered with the runtime's reactor.
///
/// [`readable`](Self::readable) lets a caller wait on several devices (or
/// anything else) in one `select!`.
pub struct Uleds {
    fd: AsyncFd<File>,
    name: String,
}

impl Uleds {
    pub fn open(path: impl AsRef<Path>) -> Result<Uleds> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .custom_flags(libc::O_NONBLOCK)
            .read(true)
            .write(true)
            .open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        debug!("opened {}", path.display());
        Self::from_file(file)
    }

    /// Wrap an already open, non-blocking file.
    pub fn from_file(file: File) -> Result<Uleds> {
        let fd = AsyncFd::new(file).context("Failed to register device with the reactor")?;
        Ok(Uleds {
            fd,
            name: String::new(),
        })
    }

    /// Name the device was set up with
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn setup(&mut self, name: &str, max_brightness: i32, method: SetupMethod) -> Result<()> {
        let payload = UserDev::new(name, max_brightness).to_bytes();
        trace!("setup({name:?}, {max_brightness}, {method:?})");
        match method {
            SetupMethod::Write => {
                let mut file = self.fd.get_ref();
                file.write_all(&payload)?;
                file.flush()?;
            }
            SetupMethod::Ioctl => self.ioctl(ULEDS_IOC_DEV_SETUP, &payload)?,
        }
        self.name = name.to_owned();
        Ok(())
    }

    pub fn set_default_trigger(&mut self, trigger: &str) -> Result<()> {
        trace!("set_default_trigger({trigger:?})");
        self.ioctl(ULEDS_IOC_SET_DEFAULT_TRIGGER, &UserTrigger::new(trigger).to_bytes())
    }

    /// Wait until a brightness change is pending, without reading it.
    pub async fn readable(&self) -> Result<()> {
        let _ready = self.fd.readable().await?;
        Ok(())
    }

    /// Wait for the next brightness change
    pub async fn read_brightness(&self) -> Result<Brightness> {
        loop {
            let mut guard = self.fd.readable().await?;
            let res = guard.try_io(|fd| {
                let mut buf = [0u8; BRIGHTNESS_SIZE];
                let n = fd.get_ref().read(&mut buf)?;
                Ok((n, buf))
            });
            match res {
                Ok(Ok((BRIGHTNESS_SIZE, buf))) => return Ok(Brightness::from_ne_bytes(buf)),
                Ok(Ok((n, _))) => bail!("short read of {n} bytes from uleds device"),
                Ok(Err(e)) => return Err(e.into()),
                // readiness was stale, wait again
                Err(_would_block) => continue,
            }
        }
    }

    fn ioctl(&self, cmd: u32, payload: &[u8]) -> Result<()> {
        // SAFETY: the driver copies at most `payload.len()` bytes, which is
        // the size encoded in `cmd`
        let ret = unsafe { libc::ioctl(self.fd.as_raw_fd(), cmd as _, payload.as_ptr()) };
        if ret == -1 {
            return Err(std::io::Error::last_os_error().into());
        }
        Ok(())
    }
}
