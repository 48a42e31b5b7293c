//! Scanner firmware container.
//!
//! ## File Layout
//!
//! ```text
//! +----------+-------------+----------------+------------------+
//! | Platform |  Reserved   |   Image Size   |   Image Bytes    |
//! +----------+-------------+----------------+------------------+
//! |    1     |  3 (zero)   |   4 (u32 LE)   |   image_size     |
//! +----------+-------------+----------------+------------------+
//! ```
//!
//! The image repeats its platform code at offset `0x10`, which is the byte
//! transcoding rewrites.
//!
//! ## Transfer Packets
//!
//! The header packet carries `[platform][image_size u32 LE]` followed by
//! the first [`PACKET_SIZE`] bytes of the image. Every further packet is the
//! next [`PACKET_SIZE`] bytes. A short final chunk is padded with `0xFF`.

use crate::error::{Error, Result};
use crate::target::Platform;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::{debug, info};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Container header size in bytes.
pub const HEADER_SIZE: usize = 8;

/// Image bytes carried per transfer packet.
pub const PACKET_SIZE: usize = 256;

/// Offset of the platform code inside the image.
pub const IMAGE_PLATFORM_OFFSET: usize = 0x10;

/// Fill byte for the unused tail of the final packet.
pub const PAD_BYTE: u8 = 0xFF;

/// Container header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareHeader {
    /// Platform the image is built for.
    pub platform: Platform,
    /// Number of image bytes following the header.
    pub image_size: u32,
}

impl FirmwareHeader {
    /// Read a header from a reader.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let code = reader.read_u8()?;
        let mut reserved = [0u8; 3];
        reader.read_exact(&mut reserved)?;
        let image_size = reader.read_u32::<LittleEndian>()?;

        if reserved != [0; 3] {
            return Err(Error::InvalidFirmware(format!(
                "reserved header bytes not zero: {reserved:02X?}"
            )));
        }
        let platform = Platform::try_from(code)?;

        Ok(Self {
            platform,
            image_size,
        })
    }
}

/// Summary of a loaded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FirmwareInfo {
    /// Platform the image is built for.
    pub platform: Platform,
    /// Image size in bytes.
    pub image_size: u32,
    /// Packets needed to transfer the image, header packet included.
    pub packet_count: usize,
}

/// A firmware image prepared for transfer.
#[derive(Debug, Clone)]
pub struct FirmwareImage {
    header: FirmwareHeader,
    data: Vec<u8>,
    offset: usize,
}

impl FirmwareImage {
    /// Load a firmware container from a file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading firmware from: {}", path.display());

        let file = File::open(path)?;
        let mut reader = BufReader::new(file);

        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;

        Self::from_bytes(&data)
    }

    /// Parse a firmware container from raw bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(Error::InvalidFirmware(format!(
                "file too small for header: {} bytes",
                data.len()
            )));
        }

        let mut cursor = std::io::Cursor::new(data);
        let header = FirmwareHeader::read_from(&mut cursor)?;
        let size = header.image_size as usize;

        if size <= IMAGE_PLATFORM_OFFSET {
            return Err(Error::InvalidFirmware(format!(
                "image too small: {size} bytes"
            )));
        }

        let body = &data[HEADER_SIZE..];
        if body.len() < size {
            return Err(Error::InvalidFirmware(format!(
                "truncated image: header says {size} bytes, file has {}",
                body.len()
            )));
        }
        if body.len() > size {
            debug!("Ignoring {} trailing bytes", body.len() - size);
        }

        let data = body[..size].to_vec();
        if data[IMAGE_PLATFORM_OFFSET] != header.platform.code() {
            return Err(Error::InvalidFirmware(format!(
                "image platform 0x{:02X} does not match header platform {}",
                data[IMAGE_PLATFORM_OFFSET], header.platform
            )));
        }

        debug!(
            "Firmware header: platform {}, {} bytes",
            header.platform, header.image_size
        );

        Ok(Self {
            header,
            data,
            offset: 0,
        })
    }

    /// Platform the image is currently built for.
    pub fn platform(&self) -> Platform {
        self.header.platform
    }

    /// Image size in bytes.
    pub fn image_size(&self) -> u32 {
        self.header.image_size
    }

    /// Raw image bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Image bytes already handed out as packets.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Packets needed to transfer the image, header packet included.
    pub fn packet_count(&self) -> usize {
        self.data.len().div_ceil(PACKET_SIZE)
    }

    /// Summary for display.
    pub fn info(&self) -> FirmwareInfo {
        FirmwareInfo {
            platform: self.platform(),
            image_size: self.image_size(),
            packet_count: self.packet_count(),
        }
    }

    /// Rewrite the image for another platform.
    ///
    /// A no-op when `target` is already the image platform. Pairs without a
    /// transcode path fail with [`Error::Unsupported`] and leave the image
    /// untouched.
    pub fn transcode(&mut self, target: Platform) -> Result<()> {
        let source = self.platform();
        if source == target {
            return Ok(());
        }
        if !source.can_transcode_to(target) {
            return Err(Error::Unsupported(format!(
                "transcode from {source} to {target} not supported"
            )));
        }

        self.data[IMAGE_PLATFORM_OFFSET] = target.code();
        self.header.platform = target;
        info!("Transcoded firmware from {source} to {target}");
        Ok(())
    }

    /// Build the header packet and rewind the cursor to just past its data.
    #[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
    pub fn first_packet(&mut self) -> Vec<u8> {
        let chunk_len = PACKET_SIZE.min(self.data.len());

        let mut packet = Vec::with_capacity(5 + PACKET_SIZE);
        packet.push(self.platform().code());
        packet
            .write_u32::<LittleEndian>(self.header.image_size)
            .unwrap();
        packet.extend_from_slice(&self.data[..chunk_len]);
        packet.resize(5 + PACKET_SIZE, PAD_BYTE);

        self.offset = chunk_len;
        packet
    }

    /// Next data packet, or `None` once the image is exhausted.
    pub fn next_packet(&mut self) -> Option<Vec<u8>> {
        if self.offset >= self.data.len() {
            return None;
        }

        let end = (self.offset + PACKET_SIZE).min(self.data.len());
        let mut packet = self.data[self.offset..end].to_vec();
        packet.resize(PACKET_SIZE, PAD_BYTE);

        self.offset = end;
        Some(packet)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Build a container for `platform` with a recognizable image pattern.
    pub(crate) fn container(platform: Platform, image_size: usize) -> Vec<u8> {
        let mut file = vec![platform.code(), 0, 0, 0];
        file.extend_from_slice(&u32::try_from(image_size).unwrap().to_le_bytes());
        let mut image: Vec<u8> = (0..image_size).map(|i| (i % 251) as u8).collect();
        image[IMAGE_PLATFORM_OFFSET] = platform.code();
        file.extend(image);
        file
    }

    #[test]
    fn test_parse_header() {
        let fw = FirmwareImage::from_bytes(&container(Platform::Pro18, 600)).unwrap();
        assert_eq!(fw.platform(), Platform::Pro18);
        assert_eq!(fw.image_size(), 600);
        assert_eq!(fw.packet_count(), 3);
        assert_eq!(fw.offset(), 0);
    }

    #[test]
    fn test_truncated_file_rejected() {
        let mut file = container(Platform::Pro18, 600);
        file.truncate(500);
        assert!(matches!(
            FirmwareImage::from_bytes(&file),
            Err(Error::InvalidFirmware(_))
        ));
        assert!(FirmwareImage::from_bytes(&file[..5]).is_err());
    }

    #[test]
    fn test_unknown_platform_rejected() {
        let mut file = container(Platform::Pro18, 600);
        file[0] = 0x42;
        assert!(matches!(
            FirmwareImage::from_bytes(&file),
            Err(Error::InvalidFirmware(_))
        ));
    }

    #[test]
    fn test_reserved_bytes_must_be_zero() {
        let mut file = container(Platform::Pro18, 600);
        file[2] = 1;
        assert!(FirmwareImage::from_bytes(&file).is_err());
    }

    #[test]
    fn test_platform_mismatch_rejected() {
        let mut file = container(Platform::Pro18, 600);
        file[HEADER_SIZE + IMAGE_PLATFORM_OFFSET] = Platform::Psr800.code();
        assert!(FirmwareImage::from_bytes(&file).is_err());
    }

    #[test]
    fn test_packet_sequence() {
        let mut fw = FirmwareImage::from_bytes(&container(Platform::Psr800, 600)).unwrap();

        let first = fw.first_packet();
        assert_eq!(first.len(), 5 + PACKET_SIZE);
        assert_eq!(first[0], Platform::Psr800.code());
        assert_eq!(&first[1..5], &600u32.to_le_bytes());
        assert_eq!(&first[5..], &fw.data()[..PACKET_SIZE]);
        assert_eq!(fw.offset(), 256);

        let second = fw.next_packet().unwrap();
        assert_eq!(second, fw.data()[256..512]);
        assert_eq!(fw.offset(), 512);

        let last = fw.next_packet().unwrap();
        assert_eq!(last.len(), PACKET_SIZE);
        assert_eq!(&last[..88], &fw.data()[512..600]);
        assert!(last[88..].iter().all(|&b| b == PAD_BYTE));
        assert_eq!(fw.offset(), 600);

        assert_eq!(fw.next_packet(), None);
        assert_eq!(fw.next_packet(), None);
    }

    #[test]
    fn test_first_packet_restarts_transfer() {
        let mut fw = FirmwareImage::from_bytes(&container(Platform::Psr800, 600)).unwrap();
        fw.first_packet();
        while fw.next_packet().is_some() {}
        let again = fw.first_packet();
        assert_eq!(fw.offset(), 256);
        assert_eq!(again[0], Platform::Psr800.code());
    }

    #[test]
    fn test_small_image_single_padded_packet() {
        let mut fw = FirmwareImage::from_bytes(&container(Platform::Pro107, 100)).unwrap();
        let first = fw.first_packet();
        assert_eq!(first.len(), 5 + PACKET_SIZE);
        assert!(first[105..].iter().all(|&b| b == PAD_BYTE));
        assert_eq!(fw.offset(), 100);
        assert_eq!(fw.next_packet(), None);
    }

    #[test]
    fn test_transcode_supported_pair() {
        let mut fw = FirmwareImage::from_bytes(&container(Platform::Ws1080, 600)).unwrap();
        fw.transcode(Platform::Pro668).unwrap();
        assert_eq!(fw.platform(), Platform::Pro668);
        assert_eq!(fw.data()[IMAGE_PLATFORM_OFFSET], Platform::Pro668.code());
        assert_eq!(fw.first_packet()[0], Platform::Pro668.code());
    }

    #[test]
    fn test_transcode_unsupported_leaves_image_unchanged() {
        let mut fw = FirmwareImage::from_bytes(&container(Platform::Psr800, 600)).unwrap();
        let before = fw.data().to_vec();

        assert!(matches!(
            fw.transcode(Platform::Pro107),
            Err(Error::Unsupported(_))
        ));
        assert_eq!(fw.platform(), Platform::Psr800);
        assert_eq!(fw.data(), before.as_slice());
        assert_eq!(fw.first_packet()[0], Platform::Psr800.code());
    }

    #[test]
    fn test_transcode_to_same_platform_is_noop() {
        let mut fw = FirmwareImage::from_bytes(&container(Platform::Pro18, 600)).unwrap();
        fw.transcode(Platform::Pro18).unwrap();
        assert_eq!(fw.platform(), Platform::Pro18);
    }

    #[test]
    fn test_open_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pro18.bin");
        std::fs::write(&path, container(Platform::Pro18, 300)).unwrap();

        let fw = FirmwareImage::open(&path).unwrap();
        assert_eq!(fw.info().packet_count, 2);

        let missing = dir.path().join("missing.bin");
        assert!(matches!(FirmwareImage::open(missing), Err(Error::Io(_))));
    }
}
