use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};

/// Physical transport a camera is attached through.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportClass {
    Usb,
    #[serde(rename = "gige")]
    GigE,
    CameraLink,
    Mock,
}

impl fmt::Display for TransportClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportClass::Usb => "USB",
            TransportClass::GigE => "GigE",
            TransportClass::CameraLink => "CameraLink",
            TransportClass::Mock => "mock",
        };
        f.write_str(name)
    }
}

/// Immutable description of an attached camera. Two descriptors are equal
/// when their ids are equal.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub id: String,
    pub model_name: String,
    pub serial_number: String,
    pub transport: TransportClass,
}

impl DeviceDescriptor {
    /// Human-readable list entry, e.g. `acA1920-40uc (SN: 40012345)`.
    pub fn label(&self) -> String {
        format!("{} (SN: {})", self.model_name, self.serial_number)
    }
}

impl PartialEq for DeviceDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for DeviceDescriptor {}

/// Pixel layout tag, named after the GenICam `PixelFormat` entries.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    #[serde(rename = "Mono8")]
    Mono8,
    #[serde(rename = "RGB8")]
    Rgb8,
    #[serde(rename = "BGR8")]
    Bgr8,
    #[serde(rename = "BGRa8")]
    Bgra8,
    /// Packed YUYV, two bytes per pixel.
    #[serde(rename = "YUV422_8")]
    Yuv422,
    #[serde(rename = "BayerRG8")]
    BayerRg8,
}

impl PixelFormat {
    pub const ALL: [PixelFormat; 6] = [
        PixelFormat::Mono8,
        PixelFormat::Rgb8,
        PixelFormat::Bgr8,
        PixelFormat::Bgra8,
        PixelFormat::Yuv422,
        PixelFormat::BayerRg8,
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            PixelFormat::Mono8 => "Mono8",
            PixelFormat::Rgb8 => "RGB8",
            PixelFormat::Bgr8 => "BGR8",
            PixelFormat::Bgra8 => "BGRa8",
            PixelFormat::Yuv422 => "YUV422_8",
            PixelFormat::BayerRg8 => "BayerRG8",
        }
    }

    /// Bytes per pixel in a buffer of this layout.
    pub fn channels(&self) -> u8 {
        match self {
            PixelFormat::Mono8 | PixelFormat::BayerRg8 => 1,
            PixelFormat::Yuv422 => 2,
            PixelFormat::Rgb8 | PixelFormat::Bgr8 => 3,
            PixelFormat::Bgra8 => 4,
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for PixelFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PixelFormat::ALL
            .iter()
            .copied()
            .find(|fmt| fmt.tag().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown pixel format tag: {s}"))
    }
}

/// Buffering policy while grabbing.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrabStrategy {
    /// A new frame replaces any buffered frame that was not retrieved yet.
    #[default]
    LatestImageOnly,
    /// Frames are queued and retrieved in arrival order.
    OneByOne,
}
