//! EXIF GPS slot location and in-place patching.

pub mod patcher;
pub mod rational;
pub mod reader;
pub mod writer;

pub use patcher::{
    find_byte_sequence, locate_gps_info, patch_gps_coordinates, read_directory_entry,
    read_gps_coordinates, ByteOrder, DirectoryEntry, GpsCoordinates, GpsInfoOffsets,
};
pub use rational::{degrees_to_rational, fraction, fraction_string, round_to, Dms, Rational};
pub use reader::FileDataReader;
pub use writer::FileDataWriter;
