//! JP2 container reader.
//!
//! Walks the top-level boxes of a JP2 file (ITU-T T.800 / ISO/IEC 15444-1
//! Annex I) far enough to validate the file and locate its contiguous
//! codestreams. The codestream itself is left to the `jpc` crate.

use log::{debug, info, warn};
use std::fmt;
use std::io;
use std::str;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum JP2Error {
    #[error("invalid signature {:?} at offset {offset}", String::from_utf8_lossy(.signature))]
    InvalidSignature { signature: [u8; 4], offset: u64 },
    #[error("invalid brand {:?} at offset {offset}", String::from_utf8_lossy(.brand))]
    InvalidBrand { brand: [u8; 4], offset: u64 },
    #[error("only JPEG 2000 part-1 (ISO 15444-1 / T.800) is supported")]
    Unsupported,
    #[error("'jp2 ' not found in compatibility list '{}'", .compatibility_list.join(", "))]
    NotCompatible { compatibility_list: Vec<String> },
    #[error("unexpected box type {} at offset {offset}", BoxName(.box_type))]
    BoxUnexpected { box_type: BoxType, offset: u64 },
    #[error("unexpected duplicate box type {} at offset {offset}", BoxName(.box_type))]
    BoxDuplicate { box_type: BoxType, offset: u64 },
    #[error("malformed box type {} at offset {offset}", BoxName(.box_type))]
    BoxMalformed { box_type: BoxType, offset: u64 },
    #[error("box type {} missing", BoxName(.box_type))]
    BoxMissing { box_type: BoxType },
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type BoxType = [u8; 4];

struct BoxName<'a>(&'a BoxType);

impl fmt::Display for BoxName<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(self.0))
    }
}

// jP\040\040 (0x6A50 2020)
pub const BOX_TYPE_SIGNATURE: BoxType = *b"jP  ";
pub const BOX_TYPE_FILE_TYPE: BoxType = *b"ftyp";
pub const BOX_TYPE_HEADER: BoxType = *b"jp2h";
pub const BOX_TYPE_IMAGE_HEADER: BoxType = *b"ihdr";
pub const BOX_TYPE_CONTIGUOUS_CODESTREAM: BoxType = *b"jp2c";

// jp2\040
const BRAND_JP2: [u8; 4] = *b"jp2 ";

// jpx\040
const BRAND_JPX: [u8; 4] = *b"jpx ";

// <CR><LF><0x87><LF> (0x0D0A 870A).
pub const SIGNATURE_MAGIC: [u8; 4] = [13, 10, 135, 10];

const COMPRESSION_TYPE_WAVELET: u8 = 7;

#[derive(Debug, PartialEq, Eq)]
enum BoxTypes {
    Signature,
    FileType,
    Header,
    ImageHeader,
    ContiguousCodestream,
    Other,
}

impl BoxTypes {
    fn new(value: BoxType) -> BoxTypes {
        match value {
            BOX_TYPE_SIGNATURE => BoxTypes::Signature,
            BOX_TYPE_FILE_TYPE => BoxTypes::FileType,
            BOX_TYPE_HEADER => BoxTypes::Header,
            BOX_TYPE_IMAGE_HEADER => BoxTypes::ImageHeader,
            BOX_TYPE_CONTIGUOUS_CODESTREAM => BoxTypes::ContiguousCodestream,
            _ => BoxTypes::Other,
        }
    }
}

/// JPEG 2000 box trait.
///
/// The building-block of the JP2 file format is called a box. Some boxes
/// contain other boxes (super boxes).
///
/// `offset` is the position of the box contents, just past its header, and
/// `length` the size of those contents.
pub trait JBox {
    fn identifier(&self) -> BoxType;
    fn length(&self) -> u64;
    fn offset(&self) -> u64;

    fn decode<R: io::Read + io::Seek>(&mut self, reader: &mut R) -> Result<(), JP2Error>;
}

/// Signature box.
///
/// The first box of every JP2 file: a fixed 12-byte string
/// `0x0000 000C 6A50 2020 0D0A 870A`.
#[derive(Debug, Default)]
pub struct SignatureBox {
    length: u64,
    offset: u64,
}

impl SignatureBox {
    pub fn signature(&self) -> [u8; 4] {
        SIGNATURE_MAGIC
    }
}

impl JBox for SignatureBox {
    fn identifier(&self) -> BoxType {
        BOX_TYPE_SIGNATURE
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn decode<R: io::Read + io::Seek>(&mut self, reader: &mut R) -> Result<(), JP2Error> {
        if self.length != 4 {
            return Err(JP2Error::BoxMalformed {
                box_type: BOX_TYPE_SIGNATURE,
                offset: self.offset,
            });
        }

        let mut buffer: [u8; 4] = [0; 4];
        reader.read_exact(&mut buffer)?;

        if buffer != SIGNATURE_MAGIC {
            return Err(JP2Error::InvalidSignature {
                signature: buffer,
                offset: self.offset,
            });
        };

        Ok(())
    }
}

/// File Type box.
///
/// Immediately follows the Signature box and names the standard the file
/// conforms to, plus the readers able to interpret it.
#[derive(Debug, Default)]
pub struct FileTypeBox {
    length: u64,
    offset: u64,
    brand: [u8; 4],
    min_version: [u8; 4],
    compatibility_list: Vec<[u8; 4]>,
}

impl FileTypeBox {
    pub fn brand(&self) -> String {
        String::from_utf8_lossy(&self.brand).into_owned()
    }

    /// Minor version, expected to be zero but not enforced.
    pub fn min_version(&self) -> u32 {
        u32::from_be_bytes(self.min_version)
    }

    pub fn compatibility_list(&self) -> Vec<String> {
        self.compatibility_list
            .iter()
            .map(|c| String::from_utf8_lossy(c).into_owned())
            .collect()
    }
}

impl JBox for FileTypeBox {
    fn identifier(&self) -> BoxType {
        BOX_TYPE_FILE_TYPE
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn decode<R: io::Read + io::Seek>(&mut self, reader: &mut R) -> Result<(), JP2Error> {
        if self.length < 8 || self.length % 4 != 0 {
            return Err(JP2Error::BoxMalformed {
                box_type: BOX_TYPE_FILE_TYPE,
                offset: self.offset,
            });
        }

        reader.read_exact(&mut self.brand)?;
        if self.brand == BRAND_JPX {
            return Err(JP2Error::Unsupported);
        } else if self.brand != BRAND_JP2 {
            return Err(JP2Error::InvalidBrand {
                brand: self.brand,
                offset: self.offset,
            });
        }

        reader.read_exact(&mut self.min_version)?;

        // The number of CL fields is determined by the length of this box
        let mut buffer: [u8; 4] = [0; 4];
        for _ in 0..(self.length - 8) / 4 {
            reader.read_exact(&mut buffer)?;
            self.compatibility_list.push(buffer);
        }

        if !self.compatibility_list.contains(&BRAND_JP2) {
            return Err(JP2Error::NotCompatible {
                compatibility_list: self.compatibility_list(),
            });
        }

        Ok(())
    }
}

/// Image Header box.
///
/// Fixed 14 bytes of contents, first inside the JP2 Header box. Most of it
/// repeats the SIZ marker segment of the first codestream.
#[derive(Debug, Default)]
pub struct ImageHeaderBox {
    length: u64,
    offset: u64,
    height: [u8; 4],
    width: [u8; 4],
    components_num: [u8; 2],
    components_bits: [u8; 1],
    compression_type: [u8; 1],
    colourspace_unknown: [u8; 1],
    intellectual_property: [u8; 1],
}

impl ImageHeaderBox {
    /// Image area height, `Ysiz - YOsiz`.
    pub fn height(&self) -> u32 {
        u32::from_be_bytes(self.height)
    }

    /// Image area width, `Xsiz - XOsiz`.
    pub fn width(&self) -> u32 {
        u32::from_be_bytes(self.width)
    }

    pub fn components_num(&self) -> u16 {
        u16::from_be_bytes(self.components_num)
    }

    /// Bit depth shared by all components, or `None` when it varies per
    /// component (BPC 255) or uses a reserved value.
    pub fn components_bits(&self) -> Option<u8> {
        match self.components_bits[0] {
            255 => None,
            value => {
                let low_bits = value & 0b0111_1111;
                // Depths run from 1 through 38 bits
                (low_bits <= 37).then_some(low_bits + 1)
            }
        }
    }

    /// True when the components are signed. False when they are unsigned or
    /// their depth varies.
    pub fn values_are_signed(&self) -> bool {
        self.components_bits[0] != 255 && (self.components_bits[0] & 0x80) == 0x80
    }

    /// Compression type, 7 for every part-1 file.
    pub fn compression_type(&self) -> u8 {
        self.compression_type[0]
    }

    pub fn colourspace_unknown(&self) -> u8 {
        self.colourspace_unknown[0]
    }

    pub fn intellectual_property(&self) -> u8 {
        self.intellectual_property[0]
    }
}

impl JBox for ImageHeaderBox {
    fn identifier(&self) -> BoxType {
        BOX_TYPE_IMAGE_HEADER
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn decode<R: io::Read + io::Seek>(&mut self, reader: &mut R) -> Result<(), JP2Error> {
        if self.length != 14 {
            return Err(JP2Error::BoxMalformed {
                box_type: BOX_TYPE_IMAGE_HEADER,
                offset: self.offset,
            });
        }

        reader.read_exact(&mut self.height)?;
        reader.read_exact(&mut self.width)?;
        reader.read_exact(&mut self.components_num)?;
        reader.read_exact(&mut self.components_bits)?;
        reader.read_exact(&mut self.compression_type)?;
        reader.read_exact(&mut self.colourspace_unknown)?;
        reader.read_exact(&mut self.intellectual_property)?;

        if self.compression_type() != COMPRESSION_TYPE_WAVELET {
            warn!(
                "ImageHeaderBox compression type {} is not {}",
                self.compression_type(),
                COMPRESSION_TYPE_WAVELET
            );
        }

        Ok(())
    }
}

/// A box that was recognised by its header and skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedBox {
    pub box_type: BoxType,
    pub offset: u64,
    pub length: u64,
}

impl SkippedBox {
    pub fn name(&self) -> String {
        String::from_utf8_lossy(&self.box_type).into_owned()
    }
}

/// JP2 Header box.
///
/// A super box that starts with the Image Header box. The remaining sub-boxes
/// (bits per component, colour specification, palette, resolution, ...) are
/// recorded but not interpreted.
#[derive(Debug, Default)]
pub struct HeaderSuperBox {
    length: u64,
    offset: u64,
    pub image_header_box: ImageHeaderBox,
    other_boxes: Vec<SkippedBox>,
}

impl HeaderSuperBox {
    pub fn other_boxes(&self) -> &[SkippedBox] {
        &self.other_boxes
    }
}

impl JBox for HeaderSuperBox {
    fn identifier(&self) -> BoxType {
        BOX_TYPE_HEADER
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn decode<R: io::Read + io::Seek>(&mut self, reader: &mut R) -> Result<(), JP2Error> {
        let end = self.offset + self.length;

        let BoxHeader {
            box_length,
            box_type,
            ..
        } = decode_box_header(reader, end)?;

        if box_type != self.image_header_box.identifier() {
            return Err(JP2Error::BoxUnexpected {
                box_type,
                offset: reader.stream_position()?,
            });
        }
        self.image_header_box.length = box_length;
        self.image_header_box.offset = reader.stream_position()?;
        info!("ImageHeaderBox start at {:?}", self.image_header_box.offset);
        self.image_header_box.decode(reader)?;
        info!("ImageHeaderBox finish at {:?}", reader.stream_position()?);

        while reader.stream_position()? < end {
            let BoxHeader {
                box_length,
                box_type,
                ..
            } = decode_box_header(reader, end)?;
            let offset = reader.stream_position()?;

            if BoxTypes::new(box_type) == BoxTypes::ImageHeader {
                // Instances of Image Header box in other places in the file shall be ignored.
                warn!("ImageHeaderBox found in other place, ignoring");
            } else {
                debug!(
                    "{} box at {:?} skipped",
                    String::from_utf8_lossy(&box_type),
                    offset
                );
                self.other_boxes.push(SkippedBox {
                    box_type,
                    offset,
                    length: box_length,
                });
            }
            reader.seek(io::SeekFrom::Start(offset + box_length))?;
        }

        if reader.stream_position()? != end {
            return Err(JP2Error::BoxMalformed {
                box_type: BOX_TYPE_HEADER,
                offset: self.offset,
            });
        }

        Ok(())
    }
}

/// Contiguous Codestream box.
///
/// Holds a complete JPEG 2000 codestream. Readers display the first one and
/// ignore the rest. May appear anywhere after the JP2 Header box.
#[derive(Debug, Default)]
pub struct ContiguousCodestreamBox {
    length: u64,
    offset: u64,
}

impl JBox for ContiguousCodestreamBox {
    fn identifier(&self) -> BoxType {
        BOX_TYPE_CONTIGUOUS_CODESTREAM
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn decode<R: io::Read + io::Seek>(&mut self, reader: &mut R) -> Result<(), JP2Error> {
        reader.seek(io::SeekFrom::Start(self.offset + self.length))?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct JP2File {
    length: u64,
    signature: SignatureBox,
    file_type: FileTypeBox,
    header: HeaderSuperBox,
    contiguous_codestreams: Vec<ContiguousCodestreamBox>,
    other_boxes: Vec<SkippedBox>,
}

impl JP2File {
    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn signature_box(&self) -> &SignatureBox {
        &self.signature
    }

    pub fn file_type_box(&self) -> &FileTypeBox {
        &self.file_type
    }

    pub fn header_box(&self) -> &HeaderSuperBox {
        &self.header
    }

    pub fn contiguous_codestreams_boxes(&self) -> &[ContiguousCodestreamBox] {
        &self.contiguous_codestreams
    }

    /// Byte offset of the codestream a reader should display.
    pub fn codestream_offset(&self) -> Option<u64> {
        self.contiguous_codestreams.first().map(|c| c.offset)
    }

    /// Start and end offsets of that codestream. Boxes may follow it.
    pub fn codestream_range(&self) -> Option<(u64, u64)> {
        self.contiguous_codestreams
            .first()
            .map(|c| (c.offset, c.offset + c.length))
    }

    /// Top-level boxes that were skipped, such as XML, UUID or IPR boxes.
    pub fn other_boxes(&self) -> &[SkippedBox] {
        &self.other_boxes
    }
}

struct BoxHeader {
    // Length of the box contents, excluding LBox, TBox and XLBox.
    box_length: u64,

    // Four ISO 646 characters, spaces shown as `\040` in the standard.
    box_type: BoxType,
}

/// Reads LBox, TBox and, when LBox is 1, XLBox.
///
/// An LBox of 0 means the box runs to `end`, which is the end of the file for
/// top-level boxes and the end of the super box otherwise.
fn decode_box_header<R: io::Read + io::Seek>(
    reader: &mut R,
    end: u64,
) -> Result<BoxHeader, JP2Error> {
    let start = reader.stream_position()?;
    let mut box_length: [u8; 4] = [0; 4];
    let mut box_type: BoxType = [0; 4];

    reader.read_exact(&mut box_length)?;
    reader.read_exact(&mut box_type)?;

    let (total_length, header_length) = match u32::from_be_bytes(box_length) {
        0 => (end.saturating_sub(start), 8),
        1 => {
            let mut xl_length: [u8; 8] = [0; 8];
            reader.read_exact(&mut xl_length)?;
            (u64::from_be_bytes(xl_length), 16)
        }
        value => (value as u64, 8),
    };

    // The values 2-7 are reserved for ISO use, and no box may overrun its parent.
    if total_length < header_length || start + total_length > end {
        return Err(JP2Error::BoxMalformed {
            box_type,
            offset: start,
        });
    }

    Ok(BoxHeader {
        box_length: total_length - header_length,
        box_type,
    })
}

/// Walks the top-level boxes of a JP2 file.
///
/// The Signature box must come first and the File Type box second. A
/// Contiguous Codestream box is only accepted once the JP2 Header box has been
/// read. Unrecognised boxes are skipped by their length.
pub fn decode_jp2<R: io::Read + io::Seek>(reader: &mut R) -> Result<JP2File, JP2Error> {
    let start = reader.stream_position()?;
    let file_end = reader.seek(io::SeekFrom::End(0))?;
    reader.seek(io::SeekFrom::Start(start))?;

    let BoxHeader {
        box_length,
        box_type,
    } = decode_box_header(reader, file_end)?;

    let mut signature_box = SignatureBox::default();
    if box_type != signature_box.identifier() {
        return Err(JP2Error::BoxUnexpected {
            box_type,
            offset: start,
        });
    }
    signature_box.length = box_length;
    signature_box.offset = reader.stream_position()?;
    info!("SignatureBox start at {:?}", signature_box.offset);
    signature_box.decode(reader)?;
    info!("SignatureBox finish at {:?}", reader.stream_position()?);

    let BoxHeader {
        box_length,
        box_type,
    } = decode_box_header(reader, file_end)?;
    let mut file_type_box = FileTypeBox {
        length: box_length,
        offset: reader.stream_position()?,
        ..Default::default()
    };
    if box_type != file_type_box.identifier() {
        return Err(JP2Error::BoxUnexpected {
            box_type,
            offset: file_type_box.offset,
        });
    }
    info!("FileTypeBox start at {:?}", file_type_box.offset);
    file_type_box.decode(reader)?;
    info!("FileTypeBox finish at {:?}", reader.stream_position()?);

    let mut header_box_option: Option<HeaderSuperBox> = None;
    let mut contiguous_codestream_boxes: Vec<ContiguousCodestreamBox> = vec![];
    let mut other_boxes: Vec<SkippedBox> = vec![];

    while reader.stream_position()? < file_end {
        let BoxHeader {
            box_length,
            box_type,
        } = decode_box_header(reader, file_end)?;
        let offset = reader.stream_position()?;

        match BoxTypes::new(box_type) {
            BoxTypes::Header => {
                if header_box_option.is_some() {
                    return Err(JP2Error::BoxDuplicate { box_type, offset });
                }
                info!("HeaderSuperBox start at {:?}", offset);
                let mut header_box = HeaderSuperBox {
                    length: box_length,
                    offset,
                    ..Default::default()
                };
                header_box.decode(reader)?;
                header_box_option = Some(header_box);
                info!("HeaderSuperBox finish at {:?}", reader.stream_position()?);
            }
            BoxTypes::ContiguousCodestream => {
                // The Header box shall fall before the Contiguous Codestream box
                if header_box_option.is_none() {
                    return Err(JP2Error::BoxUnexpected { box_type, offset });
                }

                let mut contiguous_codestream_box = ContiguousCodestreamBox {
                    length: box_length,
                    offset,
                };
                info!("ContiguousCodestreamBox start at {:?}", offset);
                contiguous_codestream_box.decode(reader)?;
                info!(
                    "ContiguousCodestreamBox finish at {:?}",
                    reader.stream_position()?
                );
                contiguous_codestream_boxes.push(contiguous_codestream_box);
            }
            BoxTypes::Signature | BoxTypes::FileType | BoxTypes::ImageHeader => {
                return Err(JP2Error::BoxUnexpected { box_type, offset });
            }
            BoxTypes::Other => {
                debug!(
                    "{} box at {:?} skipped",
                    String::from_utf8_lossy(&box_type),
                    offset
                );
                other_boxes.push(SkippedBox {
                    box_type,
                    offset,
                    length: box_length,
                });
                reader.seek(io::SeekFrom::Start(offset + box_length))?;
            }
        }
    }

    let header = header_box_option.ok_or(JP2Error::BoxMissing {
        box_type: BOX_TYPE_HEADER,
    })?;
    if contiguous_codestream_boxes.is_empty() {
        return Err(JP2Error::BoxMissing {
            box_type: BOX_TYPE_CONTIGUOUS_CODESTREAM,
        });
    }

    Ok(JP2File {
        length: file_end - start,
        signature: signature_box,
        file_type: file_type_box,
        header,
        contiguous_codestreams: contiguous_codestream_boxes,
        other_boxes,
    })
}

/// True when `bytes` start with a complete Signature box.
pub fn has_jp2_signature(bytes: &[u8]) -> bool {
    bytes.len() >= 12
        && bytes[0..4] == 12u32.to_be_bytes()
        && bytes[4..8] == BOX_TYPE_SIGNATURE
        && bytes[8..12] == SIGNATURE_MAGIC
}
