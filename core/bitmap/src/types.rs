use crate::error::BitmapError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What kind of texture a color plate compiles into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BitmapType {
    #[default]
    #[serde(rename = "2d")]
    TwoDTextures,
    #[serde(rename = "3d")]
    ThreeDTextures,
    #[serde(rename = "cubemaps")]
    CubeMaps,
    #[serde(rename = "sprites")]
    Sprites,
    #[serde(rename = "interface")]
    InterfaceBitmaps,
}

impl BitmapType {
    /// Sprites and interface bitmaps may have any dimensions.
    pub fn requires_power_of_two(self) -> bool {
        !matches!(self, BitmapType::Sprites | BitmapType::InterfaceBitmaps)
    }
}

impl FromStr for BitmapType {
    type Err = BitmapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "2d" | "2d_textures" => Ok(BitmapType::TwoDTextures),
            "3d" | "3d_textures" => Ok(BitmapType::ThreeDTextures),
            "cubemaps" | "cube_maps" => Ok(BitmapType::CubeMaps),
            "sprites" => Ok(BitmapType::Sprites),
            "interface" | "interface_bitmaps" => Ok(BitmapType::InterfaceBitmaps),
            other => Err(BitmapError::Unsupported(format!("bitmap type '{}'", other))),
        }
    }
}

/// Requested storage class. The encoder resolves it to a concrete [`BitmapDataFormat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BitmapFormat {
    #[serde(rename = "dxt1")]
    Dxt1,
    #[serde(rename = "dxt3")]
    Dxt3,
    #[serde(rename = "dxt5")]
    Dxt5,
    #[serde(rename = "16-bit")]
    Color16Bit,
    #[default]
    #[serde(rename = "32-bit")]
    Color32Bit,
    #[serde(rename = "monochrome")]
    Monochrome,
}

impl BitmapFormat {
    pub fn is_compressed(self) -> bool {
        matches!(
            self,
            BitmapFormat::Dxt1 | BitmapFormat::Dxt3 | BitmapFormat::Dxt5
        )
    }
}

impl FromStr for BitmapFormat {
    type Err = BitmapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dxt1" => Ok(BitmapFormat::Dxt1),
            "dxt3" => Ok(BitmapFormat::Dxt3),
            "dxt5" => Ok(BitmapFormat::Dxt5),
            "16-bit" | "16bit" | "16" => Ok(BitmapFormat::Color16Bit),
            "32-bit" | "32bit" | "32" => Ok(BitmapFormat::Color32Bit),
            "monochrome" => Ok(BitmapFormat::Monochrome),
            other => Err(BitmapError::Unsupported(format!("bitmap format '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BitmapUsage {
    AlphaBlend,
    #[default]
    Default,
    HeightMap,
    DetailMap,
    LightMap,
    VectorMap,
}

impl FromStr for BitmapUsage {
    type Err = BitmapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "alpha_blend" => Ok(BitmapUsage::AlphaBlend),
            "default" => Ok(BitmapUsage::Default),
            "height_map" => Ok(BitmapUsage::HeightMap),
            "detail_map" => Ok(BitmapUsage::DetailMap),
            "light_map" => Ok(BitmapUsage::LightMap),
            "vector_map" => Ok(BitmapUsage::VectorMap),
            other => Err(BitmapError::Unsupported(format!("bitmap usage '{}'", other))),
        }
    }
}

/// Filter used to build each mipmap from its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MipmapScaleType {
    /// Average color and alpha.
    #[default]
    Linear,
    /// Average color, keep the top-left alpha.
    NearestAlpha,
    /// Keep the top-left pixel.
    Nearest,
}

impl FromStr for MipmapScaleType {
    type Err = BitmapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "linear" => Ok(MipmapScaleType::Linear),
            "nearest_alpha" => Ok(MipmapScaleType::NearestAlpha),
            "nearest" => Ok(MipmapScaleType::Nearest),
            other => Err(BitmapError::Unsupported(format!(
                "mipmap scale type '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpriteUsage {
    #[default]
    BlendAddSubtractMax,
    MultiplyMin,
    DoubleMultiply,
}

impl FromStr for SpriteUsage {
    type Err = BitmapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "blend_add_subtract_max" => Ok(SpriteUsage::BlendAddSubtractMax),
            "multiply_min" => Ok(SpriteUsage::MultiplyMin),
            "double_multiply" => Ok(SpriteUsage::DoubleMultiply),
            other => Err(BitmapError::Unsupported(format!("sprite usage '{}'", other))),
        }
    }
}

/// Concrete on-disk pixel format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", from = "u16")]
pub enum BitmapDataFormat {
    A8,
    Y8,
    Ay8,
    A8Y8,
    R5G6B5,
    A1R5G5B5,
    A4R4G4B4,
    X8R8G8B8,
    A8R8G8B8,
    Dxt1,
    Dxt3,
    Dxt5,
    P8Bump,
    Unknown(u16),
}

impl From<u16> for BitmapDataFormat {
    fn from(v: u16) -> Self {
        match v {
            0 => BitmapDataFormat::A8,
            1 => BitmapDataFormat::Y8,
            2 => BitmapDataFormat::Ay8,
            3 => BitmapDataFormat::A8Y8,
            6 => BitmapDataFormat::R5G6B5,
            8 => BitmapDataFormat::A1R5G5B5,
            9 => BitmapDataFormat::A4R4G4B4,
            10 => BitmapDataFormat::X8R8G8B8,
            11 => BitmapDataFormat::A8R8G8B8,
            14 => BitmapDataFormat::Dxt1,
            15 => BitmapDataFormat::Dxt3,
            16 => BitmapDataFormat::Dxt5,
            17 => BitmapDataFormat::P8Bump,
            n => BitmapDataFormat::Unknown(n),
        }
    }
}

impl From<BitmapDataFormat> for u16 {
    fn from(format: BitmapDataFormat) -> Self {
        match format {
            BitmapDataFormat::A8 => 0,
            BitmapDataFormat::Y8 => 1,
            BitmapDataFormat::Ay8 => 2,
            BitmapDataFormat::A8Y8 => 3,
            BitmapDataFormat::R5G6B5 => 6,
            BitmapDataFormat::A1R5G5B5 => 8,
            BitmapDataFormat::A4R4G4B4 => 9,
            BitmapDataFormat::X8R8G8B8 => 10,
            BitmapDataFormat::A8R8G8B8 => 11,
            BitmapDataFormat::Dxt1 => 14,
            BitmapDataFormat::Dxt3 => 15,
            BitmapDataFormat::Dxt5 => 16,
            BitmapDataFormat::P8Bump => 17,
            BitmapDataFormat::Unknown(n) => n,
        }
    }
}

impl BitmapDataFormat {
    pub fn name(self) -> &'static str {
        match self {
            BitmapDataFormat::A8 => "A8",
            BitmapDataFormat::Y8 => "Y8",
            BitmapDataFormat::Ay8 => "AY8",
            BitmapDataFormat::A8Y8 => "A8Y8",
            BitmapDataFormat::R5G6B5 => "R5G6B5",
            BitmapDataFormat::A1R5G5B5 => "A1R5G5B5",
            BitmapDataFormat::A4R4G4B4 => "A4R4G4B4",
            BitmapDataFormat::X8R8G8B8 => "X8R8G8B8",
            BitmapDataFormat::A8R8G8B8 => "A8R8G8B8",
            BitmapDataFormat::Dxt1 => "DXT1",
            BitmapDataFormat::Dxt3 => "DXT3",
            BitmapDataFormat::Dxt5 => "DXT5",
            BitmapDataFormat::P8Bump => "P8",
            BitmapDataFormat::Unknown(_) => "Unknown",
        }
    }

    /// Bits per pixel, or `None` for values we cannot store.
    pub fn bits_per_pixel(self) -> Option<usize> {
        match self {
            BitmapDataFormat::A8
            | BitmapDataFormat::Y8
            | BitmapDataFormat::Ay8
            | BitmapDataFormat::P8Bump
            | BitmapDataFormat::Dxt3
            | BitmapDataFormat::Dxt5 => Some(8),
            BitmapDataFormat::A8Y8
            | BitmapDataFormat::R5G6B5
            | BitmapDataFormat::A1R5G5B5
            | BitmapDataFormat::A4R4G4B4 => Some(16),
            BitmapDataFormat::X8R8G8B8 | BitmapDataFormat::A8R8G8B8 => Some(32),
            BitmapDataFormat::Dxt1 => Some(4),
            BitmapDataFormat::Unknown(_) => None,
        }
    }

    pub fn is_compressed(self) -> bool {
        matches!(
            self,
            BitmapDataFormat::Dxt1 | BitmapDataFormat::Dxt3 | BitmapDataFormat::Dxt5
        )
    }

    /// Bytes per 4x4 block for block-compressed formats.
    pub fn block_size(self) -> Option<usize> {
        match self {
            BitmapDataFormat::Dxt1 => Some(8),
            BitmapDataFormat::Dxt3 | BitmapDataFormat::Dxt5 => Some(16),
            _ => None,
        }
    }
}

impl fmt::Display for BitmapDataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "u16", from = "u16")]
pub enum BitmapDataType {
    #[default]
    Texture2D,
    Texture3D,
    CubeMap,
    White,
    Unknown(u16),
}

impl From<u16> for BitmapDataType {
    fn from(v: u16) -> Self {
        match v {
            0 => BitmapDataType::Texture2D,
            1 => BitmapDataType::Texture3D,
            2 => BitmapDataType::CubeMap,
            3 => BitmapDataType::White,
            n => BitmapDataType::Unknown(n),
        }
    }
}

impl From<BitmapDataType> for u16 {
    fn from(t: BitmapDataType) -> Self {
        match t {
            BitmapDataType::Texture2D => 0,
            BitmapDataType::Texture3D => 1,
            BitmapDataType::CubeMap => 2,
            BitmapDataType::White => 3,
            BitmapDataType::Unknown(n) => n,
        }
    }
}

impl BitmapDataType {
    /// Number of stored faces per mipmap level.
    pub fn faces(self) -> usize {
        match self {
            BitmapDataType::CubeMap => 6,
            _ => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BitmapDataFlags(pub u16);

impl BitmapDataFlags {
    pub const POWER_OF_TWO_DIMENSIONS: u16 = 1;
    pub const COMPRESSED: u16 = 1 << 1;
    pub const PALETTIZED: u16 = 1 << 2;
    pub const LINEAR: u16 = 1 << 4;

    pub fn contains(self, flag: u16) -> bool {
        self.0 & flag == flag
    }

    pub fn insert(&mut self, flag: u16) {
        self.0 |= flag;
    }
}

/// Which channels take part in error diffusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DitherChannels {
    pub alpha: bool,
    pub red: bool,
    pub green: bool,
    pub blue: bool,
}

impl DitherChannels {
    pub const NONE: DitherChannels = DitherChannels {
        alpha: false,
        red: false,
        green: false,
        blue: false,
    };

    pub fn any(self) -> bool {
        self.alpha || self.red || self.green || self.blue
    }

    /// Flags in alpha, red, green, blue order.
    pub fn as_array(self) -> [bool; 4] {
        [self.alpha, self.red, self.green, self.blue]
    }
}

impl FromStr for DitherChannels {
    type Err = BitmapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let color = |alpha, rgb| DitherChannels {
            alpha,
            red: rgb,
            green: rgb,
            blue: rgb,
        };
        match s.to_lowercase().as_str() {
            "none" | "" => Ok(DitherChannels::NONE),
            "a" => Ok(color(true, false)),
            "rgb" => Ok(color(false, true)),
            "argb" => Ok(color(true, true)),
            other => Err(BitmapError::Unsupported(format!(
                "dither channels '{}' (expected none, a, rgb or argb)",
                other
            ))),
        }
    }
}

impl TryFrom<String> for DitherChannels {
    type Error = BitmapError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DitherChannels> for String {
    fn from(d: DitherChannels) -> Self {
        let mut s = String::new();
        if d.alpha {
            s.push('a');
        }
        if d.red || d.green || d.blue {
            s.push_str("rgb");
        }
        if s.is_empty() {
            s.push_str("none");
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_format_values() {
        for v in 0u16..20 {
            let format = BitmapDataFormat::from(v);
            assert_eq!(u16::from(format), v, "format value {} should survive", v);
        }
        assert_eq!(BitmapDataFormat::from(17), BitmapDataFormat::P8Bump);
        assert_eq!(BitmapDataFormat::from(4), BitmapDataFormat::Unknown(4));
        assert_eq!(BitmapDataFormat::Dxt1.bits_per_pixel(), Some(4));
        assert_eq!(BitmapDataFormat::Unknown(4).bits_per_pixel(), None);
    }

    #[test]
    fn test_parse_options() {
        assert_eq!("DXT5".parse::<BitmapFormat>().unwrap(), BitmapFormat::Dxt5);
        assert_eq!(
            "height-map".parse::<BitmapUsage>().unwrap(),
            BitmapUsage::HeightMap
        );
        assert!("dxt7".parse::<BitmapFormat>().is_err());

        let rgb: DitherChannels = "rgb".parse().unwrap();
        assert!(!rgb.alpha && rgb.red && rgb.green && rgb.blue);
        assert_eq!(String::from(rgb), "rgb");
        assert!(!"none".parse::<DitherChannels>().unwrap().any());
        assert!("rg".parse::<DitherChannels>().is_err());
    }

    #[test]
    fn test_flags() {
        let mut flags = BitmapDataFlags::default();
        flags.insert(BitmapDataFlags::COMPRESSED);
        flags.insert(BitmapDataFlags::LINEAR);
        assert_eq!(flags.0, 0b10010);
        assert!(flags.contains(BitmapDataFlags::COMPRESSED));
        assert!(!flags.contains(BitmapDataFlags::PALETTIZED));
    }
}
