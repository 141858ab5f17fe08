use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use uleds::client::{SetupMethod, DEFAULT_DEVICE};

#[derive(Clone, Copy, Debug, ValueEnum)]
#[value(rename_all="lowercase")]
pub enum Setup {
    Write,
    Ioctl,
}

impl Setup {
    pub fn as_method(&self) -> SetupMethod {
        match self {
            Setup::Write => SetupMethod::Write,
            Setup::Ioctl => SetupMethod::Ioctl,
        }
    }
}

/// Create a userspace LED and print a timestamp and value for every brightness change
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[command(after_help="Press Ctrl+C to exit.\nWith --loopback, type brightness values on stdin to drive the LED.")]
pub struct Args {
    /// Name of the LED class device to create
    pub name: String,

    /// Default trigger for the new LED
    pub trigger: Option<String>,

    /// uleds character device
    #[arg(long, default_value = DEFAULT_DEVICE)]
    pub device: PathBuf,

    /// How to hand the setup payload to the device
    #[arg(long, value_enum, default_value_t = Setup::Ioctl)]
    pub setup: Setup,

    /// Max brightness setting
    #[arg(short, long, default_value_t = 100)]
    #[arg(value_parser = clap::value_parser!(i32).range(1..))]
    pub max_brightness: i32,

    /// Use an in-process LED class instead of the kernel device
    #[arg(long, default_value_t = false)]
    pub loopback: bool,
}
