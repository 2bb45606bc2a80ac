pub mod vbyte;
pub mod bitstream;
pub mod compress;
