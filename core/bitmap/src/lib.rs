pub mod codec;
pub mod color_plate;
pub mod decoder;
pub mod dither;
pub mod encoder;
pub mod error;
pub mod generated;
pub mod height_map;
pub mod mipmap;
pub mod palette;
pub mod pixel;
pub mod process;
pub mod scanner;
pub mod sprite;
pub mod types;

pub use color_plate::{decode_color_plate, encode_color_plate, ColorPlateCompression};
pub use decoder::{
    bitmap_data_size, convert_bitmap, decode_bitmap_data, decode_to_bitmap, from_rgba_image,
    most_efficient_format, to_rgba_image, DecodedImage,
};
pub use encoder::{encode_bitmap_data, BitmapDataEntry, EncodeOptions, EncodedBitmapData};
pub use error::{BitmapError, Result};
pub use generated::{Bitmap, GeneratedBitmapData, Mipmap, Sequence, Sprite};
pub use pixel::Pixel;
pub use process::{
    compile_image, group_sequences, process_bitmap_data, CompileOptions, CompiledBitmap,
    GroupSequence, GroupSprite,
};
pub use scanner::{scan_color_plate, MarkerColors};
pub use sprite::SpriteParameters;
pub use types::*;
