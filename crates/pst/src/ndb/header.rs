//! [HEADER](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/c9876f5a-664b-46a3-9887-ba63f113abf5)
//!
//! Only the fields needed to locate the node and block B-trees are modeled. Everything else in
//! the header is written as zero and ignored on read.

use tracing::warn;

use super::{block_ref::BlockLocator, byte_index::IndexWidth, node_id::NodeId, read_write::*, *};
use crate::crc::compute_crc;

/// `dwMagic`
///
/// ### See also
/// [FileHeader]
pub const HEADER_MAGIC: u32 = u32::from_be_bytes(*b"NDB!");

const HEADER_MAGIC_CLIENT: u16 = u16::from_be_bytes(*b"MS");

pub const ANSI_HEADER_SIZE: usize = 512;
pub const UNICODE_HEADER_SIZE: usize = 564;

const CRC_OFFSET: usize = 4;
const CRC_START: usize = 8;
const CHECKSUM_OFFSET: usize = 508;
const VERSION_OFFSET: usize = 10;
const ROOT_FOLDER_OFFSET: usize = 52;
const DENSITY_OFFSET: usize = 56;

const NDB_CLIENT_VERSION: u16 = 19;
const NDB_PLATFORM_CREATE: u8 = 0x01;
const NDB_PLATFORM_ACCESS: u8 = 0x01;

/// `wVer`
///
/// ### See also
/// [FileHeader]
#[repr(u16)]
#[derive(Copy, Clone, PartialEq, Eq, Default, Debug)]
pub enum NdbVersion {
    Ansi = 15,
    #[default]
    Unicode = 23,
}

impl NdbVersion {
    pub fn layout(&self) -> HeaderLayout {
        match self {
            NdbVersion::Ansi => HeaderLayout::ANSI,
            NdbVersion::Unicode => HeaderLayout::UNICODE,
        }
    }

    pub fn is_unicode(&self) -> bool {
        *self == NdbVersion::Unicode
    }

    /// Layout implied by any `wVer`, including values too old to accept strictly.
    pub fn from_raw(value: u16) -> Self {
        if value >= NdbVersion::Unicode as u16 {
            NdbVersion::Unicode
        } else {
            NdbVersion::Ansi
        }
    }
}

impl TryFrom<u16> for NdbVersion {
    type Error = NdbError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            14..=22 => Ok(NdbVersion::Ansi),
            23.. => Ok(NdbVersion::Unicode),
            _ => Err(NdbError::InvalidVersion(value)),
        }
    }
}

/// Field positions for one header variant, selected once from the version field.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct HeaderLayout {
    pub version: NdbVersion,
    pub header_size: usize,
    /// The CRC covers `[8, crc_end)`.
    pub crc_end: usize,
    /// Width of the file size and locator fields.
    pub width: IndexWidth,
    pub file_size_offset: usize,
    /// `ib` of the NBT locator, immediately followed by its `cb`.
    pub nbt_offset: usize,
    /// `ib` of the BBT locator, immediately followed by its `cb`.
    pub bbt_offset: usize,
}

impl HeaderLayout {
    pub const ANSI: Self = Self {
        version: NdbVersion::Ansi,
        header_size: ANSI_HEADER_SIZE,
        crc_end: 508,
        width: IndexWidth::Narrow,
        file_size_offset: 44,
        nbt_offset: 60,
        bbt_offset: 68,
    };

    pub const UNICODE: Self = Self {
        version: NdbVersion::Unicode,
        header_size: UNICODE_HEADER_SIZE,
        crc_end: 516,
        width: IndexWidth::Wide,
        file_size_offset: 44,
        nbt_offset: 240,
        bbt_offset: 256,
    };

    fn read_locator(&self, data: &[u8], offset: usize) -> NdbResult<BlockLocator> {
        let ib = self.width.read_at(data, offset)?;
        let cb = self.width.read_at(data, offset + self.width.size())?;
        Ok(BlockLocator::new(ib, cb))
    }

    fn write_locator(
        &self,
        data: &mut [u8],
        offset: usize,
        locator: BlockLocator,
    ) -> NdbResult<()> {
        self.width.write_at(data, offset, locator.offset())?;
        self.width
            .write_at(data, offset + self.width.size(), locator.size())
    }
}

/// Sum of every little-endian 32-bit word in `data`, negated modulo 2^32.
pub fn header_checksum(data: &[u8]) -> u32 {
    data.chunks_exact(4)
        .map(|word| u32::from_le_bytes([word[0], word[1], word[2], word[3]]))
        .fold(0_u32, u32::wrapping_add)
        .wrapping_neg()
}

fn digest_crc(data: &[u8], layout: &HeaderLayout) -> NdbResult<u32> {
    let mut scratch = data[..layout.header_size].to_vec();
    write_u32_at(&mut scratch, CRC_OFFSET, 0)?;
    write_u32_at(&mut scratch, CHECKSUM_OFFSET, 0)?;
    Ok(compute_crc(&scratch[CRC_START..layout.crc_end]))
}

/// Recompute both digests in place: the CRC with both digest fields zeroed, then the checksum
/// over `[0, 508)`, which includes the new CRC.
fn seal(data: &mut [u8], layout: &HeaderLayout) -> NdbResult<()> {
    let crc = digest_crc(data, layout)?;
    write_u32_at(data, CRC_OFFSET, crc)?;
    write_u32_at(data, CHECKSUM_OFFSET, 0)?;
    let checksum = header_checksum(&data[..CHECKSUM_OFFSET]);
    write_u32_at(data, CHECKSUM_OFFSET, checksum)
}

/// Digest mismatches found in a header, in verification order.
fn verify(data: &[u8], layout: &HeaderLayout) -> NdbResult<Vec<NdbError>> {
    let mut findings = Vec::new();

    let stored = read_u32_at(data, CRC_OFFSET)?;
    let computed = digest_crc(data, layout)?;
    if stored != computed {
        findings.push(NdbError::InvalidHeaderCrc { stored, computed });
    }

    let stored = read_u32_at(data, CHECKSUM_OFFSET)?;
    let computed = header_checksum(&data[..CHECKSUM_OFFSET]);
    if stored != computed {
        findings.push(NdbError::InvalidHeaderChecksum { stored, computed });
    }

    Ok(findings)
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct FileHeader {
    version: NdbVersion,
    raw_version: u16,
    client_version: u16,
    platform_create: u8,
    platform_access: u8,
    file_size: u64,
    nbt: BlockLocator,
    bbt: BlockLocator,
    root_folder: NodeId,
    density: u8,
}

impl FileHeader {
    pub fn new(version: NdbVersion, root_folder: NodeId) -> Self {
        Self {
            version,
            raw_version: version as u16,
            client_version: NDB_CLIENT_VERSION,
            platform_create: NDB_PLATFORM_CREATE,
            platform_access: NDB_PLATFORM_ACCESS,
            file_size: version.layout().header_size as u64,
            nbt: Default::default(),
            bbt: Default::default(),
            root_folder,
            density: 0,
        }
    }

    pub fn version(&self) -> NdbVersion {
        self.version
    }

    pub fn is_unicode(&self) -> bool {
        self.version.is_unicode()
    }

    /// `wVer` exactly as stored, which may be any value at or above the layout's own.
    pub fn raw_version(&self) -> u16 {
        self.raw_version
    }

    /// `wVerClient`
    pub fn client_version(&self) -> u16 {
        self.client_version
    }

    /// `bPlatformCreate`
    pub fn platform_create(&self) -> u8 {
        self.platform_create
    }

    /// `bPlatformAccess`
    pub fn platform_access(&self) -> u8 {
        self.platform_access
    }

    pub fn layout(&self) -> HeaderLayout {
        self.version.layout()
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn nbt(&self) -> BlockLocator {
        self.nbt
    }

    pub fn bbt(&self) -> BlockLocator {
        self.bbt
    }

    pub fn root_folder(&self) -> NodeId {
        self.root_folder
    }

    pub fn density(&self) -> u8 {
        self.density
    }

    pub fn set_file_size(&mut self, file_size: u64) {
        self.file_size = file_size;
    }

    pub fn set_locators(&mut self, nbt: BlockLocator, bbt: BlockLocator) {
        self.nbt = nbt;
        self.bbt = bbt;
    }

    pub fn set_density(&mut self, density: u8) {
        self.density = density.min(100);
    }

    /// Serialize the header. Both digests are recomputed, so this must run after every
    /// locator is final.
    pub fn encode(&self) -> NdbResult<Vec<u8>> {
        let layout = self.layout();
        let mut data = vec![0_u8; layout.header_size];

        // dwMagic
        write_u32_at(&mut data, 0, HEADER_MAGIC)?;
        // wMagicClient
        write_u16_at(&mut data, CRC_START, HEADER_MAGIC_CLIENT)?;
        // wVer
        write_u16_at(&mut data, VERSION_OFFSET, self.raw_version)?;
        // wVerClient
        write_u16_at(&mut data, VERSION_OFFSET + 2, self.client_version)?;
        // bPlatformCreate
        write_u8_at(&mut data, VERSION_OFFSET + 4, self.platform_create)?;
        // bPlatformAccess
        write_u8_at(&mut data, VERSION_OFFSET + 5, self.platform_access)?;

        layout
            .width
            .write_at(&mut data, layout.file_size_offset, self.file_size)?;
        write_u32_at(&mut data, ROOT_FOLDER_OFFSET, u32::from(self.root_folder))?;
        write_u8_at(&mut data, DENSITY_OFFSET, self.density)?;
        layout.write_locator(&mut data, layout.nbt_offset, self.nbt)?;
        layout.write_locator(&mut data, layout.bbt_offset, self.bbt)?;

        seal(&mut data, &layout)?;
        Ok(data)
    }

    /// Strict decode: any signature, version or digest problem is an error.
    pub fn decode(data: &[u8]) -> NdbResult<Self> {
        let (header, mut findings) = Self::read_fields(data)?;
        if findings.is_empty() {
            Ok(header)
        } else {
            Err(findings.remove(0))
        }
    }

    /// Lenient decode for read-only analysis. A bad signature, version or digest is returned as
    /// a finding instead of failing. Any `wVer` below 23 is read with the ANSI layout, and the
    /// data must still be long enough for the layout.
    pub fn inspect(data: &[u8]) -> NdbResult<(Self, Vec<NdbError>)> {
        let (header, findings) = Self::read_fields(data)?;
        for finding in findings.iter() {
            warn!(name: "PstHeaderFinding", "{finding}");
        }
        Ok((header, findings))
    }

    fn read_fields(data: &[u8]) -> NdbResult<(Self, Vec<NdbError>)> {
        if data.len() < ANSI_HEADER_SIZE {
            return Err(NdbError::TruncatedHeader {
                expected: ANSI_HEADER_SIZE,
                actual: data.len(),
            });
        }

        let mut findings = Vec::new();

        // dwMagic
        let magic = read_u32_at(data, 0)?;
        if magic != HEADER_MAGIC {
            findings.push(NdbError::InvalidHeaderMagic(magic));
        }

        // wVer
        let raw_version = read_u16_at(data, VERSION_OFFSET)?;
        let version = NdbVersion::try_from(raw_version).unwrap_or_else(|err| {
            findings.push(err);
            NdbVersion::from_raw(raw_version)
        });
        let layout = version.layout();
        if data.len() < layout.header_size {
            return Err(NdbError::TruncatedHeader {
                expected: layout.header_size,
                actual: data.len(),
            });
        }

        findings.extend(verify(data, &layout)?);

        let header = Self {
            version,
            raw_version,
            // wVerClient
            client_version: read_u16_at(data, VERSION_OFFSET + 2)?,
            // bPlatformCreate
            platform_create: read_u8_at(data, VERSION_OFFSET + 4)?,
            // bPlatformAccess
            platform_access: read_u8_at(data, VERSION_OFFSET + 5)?,
            file_size: layout.width.read_at(data, layout.file_size_offset)?,
            nbt: layout.read_locator(data, layout.nbt_offset)?,
            bbt: layout.read_locator(data, layout.bbt_offset)?,
            root_folder: NodeId::from(read_u32_at(data, ROOT_FOLDER_OFFSET)?),
            density: read_u8_at(data, DENSITY_OFFSET)?,
        };

        Ok((header, findings))
    }
}
