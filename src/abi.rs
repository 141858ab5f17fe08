//! Binary layout shared with `/dev/uleds` clients
//!
//! Mirrors `struct uleds_user_dev` and `struct uleds_user_trigger` from the
//! kernel uapi header. Integers are native-endian, strings are NUL padded.

/// Size of the name field in [`UserDev`]
pub const LED_MAX_NAME_SIZE: usize = 64;

/// Size of the name field in [`UserTrigger`]
pub const TRIGGER_MAX_NAME_SIZE: usize = 64;

/// Size in bytes of one brightness value handed to a reader
pub const BRIGHTNESS_SIZE: usize = std::mem::size_of::<u32>();

const IOC_WRITE: u32 = 1;
const IOC_MAGIC: u32 = b'l' as u32;

/// `_IOW(type, nr, size)` as laid out by the generic Linux ioctl encoding
const fn iow(nr: u32, size: usize) -> u32 {
    (IOC_WRITE << 30) | ((size as u32) << 16) | (IOC_MAGIC << 8) | nr
}

/// Initial setup, payload is a [`UserDev`]
pub const ULEDS_IOC_DEV_SETUP: u32 = iow(0x01, UserDev::SIZE);

/// Set the default trigger, payload is a [`UserTrigger`]
pub const ULEDS_IOC_SET_DEFAULT_TRIGGER: u32 = iow(0x02, UserTrigger::SIZE);

/// Setup payload: the device name and its brightness ceiling.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct UserDev {
    pub name: [u8; LED_MAX_NAME_SIZE],
    pub max_brightness: i32,
}

impl UserDev {
    pub const SIZE: usize = LED_MAX_NAME_SIZE + std::mem::size_of::<i32>();

    /// Build a payload from a name, truncating it the way `strncpy` would.
    pub fn new(name: &str, max_brightness: i32) -> Self {
        Self {
            name: pad_name(name),
            max_brightness,
        }
    }

    pub fn from_bytes(raw: &[u8; UserDev::SIZE]) -> Self {
        let mut name = [0u8; LED_MAX_NAME_SIZE];
        name.copy_from_slice(&raw[..LED_MAX_NAME_SIZE]);
        let mut max = [0u8; 4];
        max.copy_from_slice(&raw[LED_MAX_NAME_SIZE..]);
        Self {
            name,
            max_brightness: i32::from_ne_bytes(max),
        }
    }

    pub fn to_bytes(&self) -> [u8; UserDev::SIZE] {
        let mut buf = [0u8; UserDev::SIZE];
        buf[..LED_MAX_NAME_SIZE].copy_from_slice(&self.name);
        buf[LED_MAX_NAME_SIZE..].copy_from_slice(&self.max_brightness.to_ne_bytes());
        buf
    }
}

impl std::fmt::Debug for UserDev {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserDev")
            .field("name", &String::from_utf8_lossy(until_nul(&self.name)))
            .field("max_brightness", &self.max_brightness)
            .finish()
    }
}

/// Default trigger payload. An all-zero name clears the trigger.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct UserTrigger {
    pub name: [u8; TRIGGER_MAX_NAME_SIZE],
}

impl UserTrigger {
    pub const SIZE: usize = TRIGGER_MAX_NAME_SIZE;

    pub fn new(name: &str) -> Self {
        Self {
            name: pad_name(name),
        }
    }

    pub fn from_bytes(raw: &[u8; UserTrigger::SIZE]) -> Self {
        Self { name: *raw }
    }

    pub fn to_bytes(&self) -> [u8; UserTrigger::SIZE] {
        self.name
    }
}

impl std::fmt::Debug for UserTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserTrigger")
            .field("name", &String::from_utf8_lossy(until_nul(&self.name)))
            .finish()
    }
}

/// Copy `name` into a NUL padded field. Names that fill the whole field are
/// kept unterminated, like `strncpy`.
fn pad_name<const N: usize>(name: &str) -> [u8; N] {
    let mut buf = [0u8; N];
    let len = name.len().min(N);
    buf[..len].copy_from_slice(&name.as_bytes()[..len]);
    buf
}

/// Bytes of a C string field up to (not including) the first NUL.
pub(crate) fn until_nul(field: &[u8]) -> &[u8] {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    &field[..end]
}

/// Source of a payload crossing into the session, like a user memory reader.
pub trait PayloadReader {
    /// Number of bytes the caller claims to provide.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fill `out` completely or fail with a transfer fault.
    fn read_slice(&mut self, out: &mut [u8]) -> Result<(), crate::UledsError>;
}

impl<'a> PayloadReader for &'a [u8] {
    fn len(&self) -> usize {
        let src: &[u8] = self;
        src.len()
    }

    fn read_slice(&mut self, out: &mut [u8]) -> Result<(), crate::UledsError> {
        let src: &'a [u8] = *self;
        if out.len() > src.len() {
            return Err(crate::UledsError::TransferFault);
        }
        let (head, tail) = src.split_at(out.len());
        out.copy_from_slice(head);
        *self = tail;
        Ok(())
    }
}

/// Pull exactly `N` bytes out of `reader`.
pub(crate) fn transfer<const N: usize>(
    reader: &mut dyn PayloadReader,
) -> Result<[u8; N], crate::UledsError> {
    let mut buf = [0u8; N];
    reader.read_slice(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ioctl_numbers_match_uapi() {
        assert_eq!(UserDev::SIZE, 68);
        assert_eq!(UserTrigger::SIZE, 64);
        assert_eq!(ULEDS_IOC_DEV_SETUP, 0x4044_6c01);
        assert_eq!(ULEDS_IOC_SET_DEFAULT_TRIGGER, 0x4040_6c02);
    }

    #[test]
    fn user_dev_layout() {
        let dev = UserDev::new("uleds::test0", 255);
        let raw = dev.to_bytes();
        assert_eq!(&raw[..12], b"uleds::test0");
        assert!(raw[12..64].iter().all(|&b| b == 0));
        assert_eq!(&raw[64..], &255i32.to_ne_bytes());
        assert_eq!(UserDev::from_bytes(&raw), dev);
    }

    #[test]
    fn long_names_fill_the_field() {
        let long = "x".repeat(80);
        let dev = UserDev::new(&long, 1);
        assert!(dev.name.iter().all(|&b| b == b'x'));
        assert_eq!(until_nul(&dev.name).len(), LED_MAX_NAME_SIZE);
    }

    #[test]
    fn short_reader_faults() {
        let data = [0u8; 10];
        let mut reader: &[u8] = &data;
        assert!(matches!(
            transfer::<68>(&mut reader),
            Err(crate::UledsError::TransferFault)
        ));
    }
}
