//! Header-level introspection of executables, without shelling out to platform tools.

use regex::bytes::Regex;
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// How much of a binary is read up front for header inspection
const MAX_HEADER_BYTES: u64 = 1 << 20;

/// Largest section goenv will load while looking for version references
const MAX_SECTION_BYTES: usize = 4 << 20;

const ELF_MAGIC: &[u8; 4] = b"\x7fELF";
const PT_INTERP: u32 = 3;
const SHT_GNU_VERNEED: u32 = 0x6fff_fffe;

const MH_MAGIC: u32 = 0xfeed_face;
const MH_MAGIC_64: u32 = 0xfeed_facf;
const FAT_MAGIC: u32 = 0xcafe_babe;
const LC_VERSION_MIN_MACOSX: u32 = 0x24;
const LC_VERSION_MIN_IPHONEOS: u32 = 0x25;
const LC_VERSION_MIN_TVOS: u32 = 0x2f;
const LC_VERSION_MIN_WATCHOS: u32 = 0x30;
const LC_BUILD_VERSION: u32 = 0x32;

/// `platform` values of LC_BUILD_VERSION
const PLATFORM_MACOS: u32 = 1;
const PLATFORM_IOS: u32 = 2;
const PLATFORM_TVOS: u32 = 3;
const PLATFORM_WATCHOS: u32 = 4;
const PLATFORM_MACCATALYST: u32 = 6;

/// A dotted OS version such as macOS 14.2.1
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct OsVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl OsVersion {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse the leading numeric part of strings like `5.15.0-91-generic`
    pub fn parse(input: &str) -> Option<Self> {
        let numeric: String = input
            .trim()
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .collect();
        let mut parts = numeric.split('.').filter(|p| !p.is_empty());
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
        let patch = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
        Some(Self::new(major, minor, patch))
    }

    /// Decode Mach-O's packed xxxx.yy.zz nibble format
    fn from_packed(packed: u32) -> Self {
        Self::new(packed >> 16, (packed >> 8) & 0xff, packed & 0xff)
    }
}

impl fmt::Display for OsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.patch == 0 {
            write!(f, "{}.{}", self.major, self.minor)
        } else {
            write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElfInfo {
    pub is_64: bool,
    pub machine: u16,
    pub interpreter: Option<String>,
    /// Highest GLIBC_x.y version named in the version-needed table of a
    /// dynamically linked image
    pub glibc_required: Option<(u32, u32)>,
}

impl ElfInfo {
    pub fn arch(&self) -> Option<&'static str> {
        match self.machine {
            3 => Some("386"),
            8 => Some("mips"),
            21 => Some("ppc64"),
            40 => Some("arm"),
            62 => Some("amd64"),
            183 => Some("arm64"),
            243 => Some("riscv64"),
            258 => Some("loong64"),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachOInfo {
    pub is_64: bool,
    pub cpu_type: u32,
    /// Apple platform the image was built for, when a load command says so
    pub platform: Option<u32>,
    /// Minimum macOS version; only recorded for macOS images
    pub min_os: Option<OsVersion>,
}

impl MachOInfo {
    /// True unless a load command names a platform other than macOS.
    /// Mac Catalyst images run natively on macOS.
    pub fn targets_macos(&self) -> bool {
        matches!(self.platform, None | Some(PLATFORM_MACOS) | Some(PLATFORM_MACCATALYST))
    }

    pub fn platform_name(&self) -> &'static str {
        match self.platform {
            None | Some(PLATFORM_MACOS) => "macOS",
            Some(PLATFORM_IOS) => "iOS",
            Some(PLATFORM_TVOS) => "tvOS",
            Some(PLATFORM_WATCHOS) => "watchOS",
            Some(5) => "bridgeOS",
            Some(PLATFORM_MACCATALYST) => "Mac Catalyst",
            Some(7) => "the iOS simulator",
            Some(8) => "the tvOS simulator",
            Some(9) => "the watchOS simulator",
            Some(10) => "DriverKit",
            Some(11) => "visionOS",
            Some(12) => "the visionOS simulator",
            Some(_) => "an unknown Apple platform",
        }
    }

    pub fn arch(&self) -> Option<&'static str> {
        match self.cpu_type {
            7 => Some("386"),
            0x0100_0007 => Some("amd64"),
            12 => Some("arm"),
            0x0100_000c => Some("arm64"),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeInfo {
    pub machine: u16,
}

impl PeInfo {
    pub fn arch(&self) -> Option<&'static str> {
        match self.machine {
            0x014c => Some("386"),
            0x8664 => Some("amd64"),
            0x01c4 => Some("arm"),
            0xaa64 => Some("arm64"),
            _ => None,
        }
    }
}

/// What kind of executable a file is
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BinaryFormat {
    Elf(ElfInfo),
    MachO(MachOInfo),
    /// Universal binary; slices are not inspected
    FatMachO,
    Pe(PeInfo),
    Script { interpreter: PathBuf },
    Unknown,
}

impl BinaryFormat {
    /// Inspect the file at `path`.
    ///
    /// Only the leading header bytes are read up front; ELF section tables
    /// usually sit at the end of the file and are fetched by offset.
    pub fn read(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        let mut bytes = Vec::new();
        (&file).take(MAX_HEADER_BYTES).read_to_end(&mut bytes)?;

        if bytes.starts_with(ELF_MAGIC) {
            let fetch = |offset: usize, len: usize| read_at(&file, offset, len);
            return Ok(parse_elf(&bytes, &fetch).map_or(BinaryFormat::Unknown, BinaryFormat::Elf));
        }
        Ok(Self::parse(&bytes))
    }

    /// Inspect an in-memory image
    pub fn parse(bytes: &[u8]) -> Self {
        if bytes.starts_with(b"#!") {
            return parse_script(bytes);
        }
        if bytes.starts_with(ELF_MAGIC) {
            let fetch = |offset: usize, len: usize| {
                bytes.get(offset..offset.checked_add(len)?).map(<[u8]>::to_vec)
            };
            return parse_elf(bytes, &fetch).map_or(BinaryFormat::Unknown, BinaryFormat::Elf);
        }
        if bytes.starts_with(b"MZ") {
            return parse_pe(bytes).map_or(BinaryFormat::Unknown, BinaryFormat::Pe);
        }
        parse_macho(bytes).unwrap_or(BinaryFormat::Unknown)
    }

    pub fn arch(&self) -> Option<&'static str> {
        match self {
            BinaryFormat::Elf(elf) => elf.arch(),
            BinaryFormat::MachO(macho) => macho.arch(),
            BinaryFormat::Pe(pe) => pe.arch(),
            _ => None,
        }
    }
}

fn parse_script(bytes: &[u8]) -> BinaryFormat {
    let line_end = bytes
        .iter()
        .position(|b| *b == b'\n')
        .unwrap_or(bytes.len());
    let line = String::from_utf8_lossy(&bytes[2..line_end]);
    match line.split_whitespace().next() {
        Some(interpreter) => BinaryFormat::Script {
            interpreter: PathBuf::from(interpreter),
        },
        None => BinaryFormat::Unknown,
    }
}

/// Fixed-width integer reads with a chosen byte order
#[derive(Clone, Copy)]
struct Reader<'a> {
    bytes: &'a [u8],
    little: bool,
}

impl<'a> Reader<'a> {
    fn u16(&self, offset: usize) -> Option<u16> {
        let raw: [u8; 2] = self.bytes.get(offset..offset.checked_add(2)?)?.try_into().ok()?;
        Some(if self.little {
            u16::from_le_bytes(raw)
        } else {
            u16::from_be_bytes(raw)
        })
    }

    fn u32(&self, offset: usize) -> Option<u32> {
        let raw: [u8; 4] = self.bytes.get(offset..offset.checked_add(4)?)?.try_into().ok()?;
        Some(if self.little {
            u32::from_le_bytes(raw)
        } else {
            u32::from_be_bytes(raw)
        })
    }

    fn u64(&self, offset: usize) -> Option<u64> {
        let raw: [u8; 8] = self.bytes.get(offset..offset.checked_add(8)?)?.try_into().ok()?;
        Some(if self.little {
            u64::from_le_bytes(raw)
        } else {
            u64::from_be_bytes(raw)
        })
    }

    /// Address-sized field: u64 for 64-bit images, u32 otherwise
    fn word(&self, offset: usize, is_64: bool) -> Option<usize> {
        if is_64 {
            self.u64(offset).and_then(|v| usize::try_from(v).ok())
        } else {
            self.u32(offset).and_then(|v| usize::try_from(v).ok())
        }
    }
}

/// Reads `len` bytes at `offset` of an image
type Fetch<'a> = dyn Fn(usize, usize) -> Option<Vec<u8>> + 'a;

fn read_at(file: &File, offset: usize, len: usize) -> Option<Vec<u8>> {
    if len > MAX_SECTION_BYTES {
        return None;
    }
    let mut handle = file;
    handle.seek(SeekFrom::Start(u64::try_from(offset).ok()?)).ok()?;
    let mut buf = vec![0u8; len];
    handle.read_exact(&mut buf).ok()?;
    Some(buf)
}

fn parse_elf(bytes: &[u8], fetch: &Fetch<'_>) -> Option<ElfInfo> {
    let is_64 = match bytes.get(4)? {
        1 => false,
        2 => true,
        _ => return None,
    };
    let little = match bytes.get(5)? {
        1 => true,
        2 => false,
        _ => return None,
    };
    let r = Reader { bytes, little };

    let machine = r.u16(18)?;
    let (phoff, phentsize, phnum) = if is_64 {
        (r.word(32, true)?, r.u16(54)? as usize, r.u16(56)? as usize)
    } else {
        (r.word(28, false)?, r.u16(42)? as usize, r.u16(44)? as usize)
    };

    let interpreter = elf_interpreter(r, is_64, phoff, phentsize, phnum);
    // Static images have no loader and link no libc at run time
    let glibc_required = match interpreter {
        Some(_) => required_glibc(r, is_64, fetch),
        None => None,
    };

    Some(ElfInfo {
        is_64,
        machine,
        interpreter,
        glibc_required,
    })
}

/// Highest GLIBC_x.y entry of the `SHT_GNU_verneed` section
fn required_glibc(r: Reader<'_>, is_64: bool, fetch: &Fetch<'_>) -> Option<(u32, u32)> {
    let (shoff, shentsize, shnum) = if is_64 {
        (r.word(40, true)?, r.u16(58)? as usize, r.u16(60)? as usize)
    } else {
        (r.word(32, false)?, r.u16(46)? as usize, r.u16(48)? as usize)
    };
    if shoff == 0 || shnum == 0 {
        return None;
    }

    let table = fetch(shoff, shentsize.checked_mul(shnum)?)?;
    let sections = Reader {
        bytes: &table,
        little: r.little,
    };
    // (offset, size, link, info) of one section header
    let section = |index: usize| -> Option<(usize, usize, usize, usize)> {
        let base = index.checked_mul(shentsize)?;
        if is_64 {
            Some((
                sections.word(base + 24, true)?,
                sections.word(base + 32, true)?,
                sections.u32(base + 40)? as usize,
                sections.u32(base + 44)? as usize,
            ))
        } else {
            Some((
                sections.word(base + 16, false)?,
                sections.word(base + 20, false)?,
                sections.u32(base + 24)? as usize,
                sections.u32(base + 28)? as usize,
            ))
        }
    };

    let verneed = (0..shnum).find(|index| {
        index
            .checked_mul(shentsize)
            .and_then(|base| sections.u32(base + 4))
            == Some(SHT_GNU_VERNEED)
    })?;
    let (offset, size, link, count) = section(verneed)?;
    let (str_offset, str_size, _, _) = section(link)?;

    let needed = fetch(offset, size)?;
    let strings = fetch(str_offset, str_size)?;
    glibc_from_verneed(
        Reader {
            bytes: &needed,
            little: r.little,
        },
        count,
        &strings,
    )
}

/// Walk Verneed entries and their Vernaux chains
fn glibc_from_verneed(needed: Reader<'_>, count: usize, strings: &[u8]) -> Option<(u32, u32)> {
    let mut highest = None;
    let mut entry = 0usize;

    for _ in 0..count {
        let aux_count = needed.u16(entry + 2)?;
        let mut aux = entry.checked_add(needed.u32(entry + 8)? as usize)?;
        for _ in 0..aux_count {
            let name = needed.u32(aux + 8)? as usize;
            if let Some(version) = c_str(strings, name).and_then(parse_glibc_version) {
                highest = highest.max(Some(version));
            }
            match needed.u32(aux + 12)? {
                0 => break,
                next => aux = aux.checked_add(next as usize)?,
            }
        }
        match needed.u32(entry + 12)? {
            0 => break,
            next => entry = entry.checked_add(next as usize)?,
        }
    }
    highest
}

fn c_str(strings: &[u8], offset: usize) -> Option<&str> {
    let tail = strings.get(offset..)?;
    let end = tail.iter().position(|b| *b == 0)?;
    std::str::from_utf8(&tail[..end]).ok()
}

fn parse_glibc_version(name: &str) -> Option<(u32, u32)> {
    let mut parts = name.strip_prefix("GLIBC_")?.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    Some((major, minor))
}

/// Path named by the PT_INTERP segment, if any
fn elf_interpreter(
    r: Reader<'_>,
    is_64: bool,
    phoff: usize,
    phentsize: usize,
    phnum: usize,
) -> Option<String> {
    for index in 0..phnum {
        let header = phoff.checked_add(index.checked_mul(phentsize)?)?;
        if r.u32(header)? != PT_INTERP {
            continue;
        }
        let (offset, size) = if is_64 {
            (
                r.word(header.checked_add(8)?, true)?,
                r.word(header.checked_add(32)?, true)?,
            )
        } else {
            (
                r.word(header.checked_add(4)?, false)?,
                r.word(header.checked_add(16)?, false)?,
            )
        };
        let raw = r.bytes.get(offset..offset.checked_add(size)?)?;
        let path = String::from_utf8_lossy(raw).trim_end_matches('\0').to_string();
        return (!path.is_empty()).then_some(path);
    }
    None
}

fn glibc_symbol_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"GLIBC_(\d+)\.(\d+)")
            .unwrap_or_else(|err| panic!("invalid glibc symbol pattern: {err}"))
    })
}

/// Highest `GLIBC_x.y` string anywhere in `bytes`; used on the host's own libc,
/// whose version definitions are what it provides
pub fn highest_glibc_version(bytes: &[u8]) -> Option<(u32, u32)> {
    glibc_symbol_pattern()
        .captures_iter(bytes)
        .filter_map(|captures| {
            let major = std::str::from_utf8(&captures[1]).ok()?.parse().ok()?;
            let minor = std::str::from_utf8(&captures[2]).ok()?.parse().ok()?;
            Some((major, minor))
        })
        .max()
}

fn parse_pe(bytes: &[u8]) -> Option<PeInfo> {
    let r = Reader {
        bytes,
        little: true,
    };
    let pe_offset = r.u32(0x3c)? as usize;
    if bytes.get(pe_offset..pe_offset + 4)? != b"PE\0\0" {
        return None;
    }
    Some(PeInfo {
        machine: r.u16(pe_offset + 4)?,
    })
}

fn parse_macho(bytes: &[u8]) -> Option<BinaryFormat> {
    let big = Reader {
        bytes,
        little: false,
    };
    if big.u32(0)? == FAT_MAGIC {
        // Java class files share this magic; their second word is a version >= 45.
        return (big.u32(4)? < 45).then_some(BinaryFormat::FatMachO);
    }

    let little = Reader {
        bytes,
        little: true,
    };
    let (r, is_64) = match (little.u32(0)?, big.u32(0)?) {
        (MH_MAGIC_64, _) => (little, true),
        (MH_MAGIC, _) => (little, false),
        (_, MH_MAGIC_64) => (big, true),
        (_, MH_MAGIC) => (big, false),
        _ => return None,
    };

    let cpu_type = r.u32(4)?;
    let ncmds = r.u32(16)? as usize;
    let mut offset = if is_64 { 32 } else { 28 };

    let mut platform = None;
    let mut min_os = None;
    for _ in 0..ncmds {
        let (Some(cmd), Some(size)) = (r.u32(offset), r.u32(offset + 4)) else {
            break;
        };
        match cmd {
            LC_BUILD_VERSION => {
                platform = r.u32(offset + 8);
                if platform == Some(PLATFORM_MACOS) {
                    min_os = r.u32(offset + 12).map(OsVersion::from_packed);
                }
            }
            LC_VERSION_MIN_MACOSX => {
                platform = Some(PLATFORM_MACOS);
                min_os = r.u32(offset + 8).map(OsVersion::from_packed);
            }
            LC_VERSION_MIN_IPHONEOS => platform = Some(PLATFORM_IOS),
            LC_VERSION_MIN_TVOS => platform = Some(PLATFORM_TVOS),
            LC_VERSION_MIN_WATCHOS => platform = Some(PLATFORM_WATCHOS),
            _ => {}
        }
        if platform.is_some() || size < 8 {
            break;
        }
        offset += size as usize;
    }

    Some(BinaryFormat::MachO(MachOInfo {
        is_64,
        cpu_type,
        platform,
        min_os,
    }))
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Minimal synthetic headers for tests.

    /// 64-bit little-endian ELF with an optional PT_INTERP segment and a
    /// version-needed section listing `needed` against libc.so.6
    pub fn elf64(machine: u16, interpreter: Option<&str>, needed: &[&str]) -> Vec<u8> {
        let mut bytes = vec![0u8; 64];
        bytes[..4].copy_from_slice(b"\x7fELF");
        bytes[4] = 2;
        bytes[5] = 1;
        bytes[18..20].copy_from_slice(&machine.to_le_bytes());

        if let Some(interp) = interpreter {
            let phoff = 64u64;
            let interp_offset = 64u64 + 56;
            bytes[32..40].copy_from_slice(&phoff.to_le_bytes());
            bytes[54..56].copy_from_slice(&56u16.to_le_bytes());
            bytes[56..58].copy_from_slice(&1u16.to_le_bytes());

            let mut ph = vec![0u8; 56];
            ph[..4].copy_from_slice(&3u32.to_le_bytes());
            ph[8..16].copy_from_slice(&interp_offset.to_le_bytes());
            let size = interp.len() as u64 + 1;
            ph[32..40].copy_from_slice(&size.to_le_bytes());
            bytes.extend(ph);
            bytes.extend(interp.as_bytes());
            bytes.push(0);
        }

        if needed.is_empty() {
            return bytes;
        }

        let mut dynstr = b"\0libc.so.6\0".to_vec();
        let mut names = Vec::new();
        for version in needed {
            names.push(dynstr.len() as u32);
            dynstr.extend(version.as_bytes());
            dynstr.push(0);
        }
        let dynstr_offset = bytes.len() as u64;
        bytes.extend(&dynstr);

        let verneed_offset = bytes.len() as u64;
        let mut verneed = vec![0u8; 16];
        verneed[..2].copy_from_slice(&1u16.to_le_bytes());
        verneed[2..4].copy_from_slice(&(needed.len() as u16).to_le_bytes());
        verneed[4..8].copy_from_slice(&1u32.to_le_bytes());
        verneed[8..12].copy_from_slice(&16u32.to_le_bytes());
        for (index, name) in names.iter().enumerate() {
            let mut aux = vec![0u8; 16];
            aux[8..12].copy_from_slice(&name.to_le_bytes());
            let next: u32 = if index + 1 < names.len() { 16 } else { 0 };
            aux[12..16].copy_from_slice(&next.to_le_bytes());
            verneed.extend(aux);
        }
        let verneed_size = verneed.len() as u64;
        bytes.extend(verneed);

        // Section headers: null, .dynstr, .gnu.version_r
        let shoff = bytes.len() as u64;
        bytes[40..48].copy_from_slice(&shoff.to_le_bytes());
        bytes[58..60].copy_from_slice(&64u16.to_le_bytes());
        bytes[60..62].copy_from_slice(&3u16.to_le_bytes());

        bytes.extend(vec![0u8; 64]);

        let mut strtab = vec![0u8; 64];
        strtab[4..8].copy_from_slice(&3u32.to_le_bytes());
        strtab[24..32].copy_from_slice(&dynstr_offset.to_le_bytes());
        strtab[32..40].copy_from_slice(&(dynstr.len() as u64).to_le_bytes());
        bytes.extend(strtab);

        let mut version_r = vec![0u8; 64];
        version_r[4..8].copy_from_slice(&0x6fff_fffeu32.to_le_bytes());
        version_r[24..32].copy_from_slice(&verneed_offset.to_le_bytes());
        version_r[32..40].copy_from_slice(&verneed_size.to_le_bytes());
        version_r[40..44].copy_from_slice(&1u32.to_le_bytes());
        version_r[44..48].copy_from_slice(&1u32.to_le_bytes());
        bytes.extend(version_r);

        bytes
    }

    /// 32-bit little-endian ELF without program headers
    pub fn elf32(machine: u16) -> Vec<u8> {
        let mut bytes = vec![0u8; 52];
        bytes[..4].copy_from_slice(b"\x7fELF");
        bytes[4] = 1;
        bytes[5] = 1;
        bytes[18..20].copy_from_slice(&machine.to_le_bytes());
        bytes
    }

    /// 64-bit little-endian macOS Mach-O with one LC_BUILD_VERSION command
    pub fn macho64(cpu_type: u32, minos: (u32, u32, u32)) -> Vec<u8> {
        macho64_for(1, cpu_type, minos)
    }

    /// Same, built for the given LC_BUILD_VERSION platform
    pub fn macho64_for(platform: u32, cpu_type: u32, minos: (u32, u32, u32)) -> Vec<u8> {
        let mut bytes = vec![0u8; 32];
        bytes[..4].copy_from_slice(&0xfeed_facfu32.to_le_bytes());
        bytes[4..8].copy_from_slice(&cpu_type.to_le_bytes());
        bytes[16..20].copy_from_slice(&2u32.to_le_bytes());

        // An unrelated load command first, to exercise the walk.
        let mut segment = vec![0u8; 16];
        segment[..4].copy_from_slice(&0x19u32.to_le_bytes());
        segment[4..8].copy_from_slice(&16u32.to_le_bytes());
        bytes.extend(segment);

        let packed = (minos.0 << 16) | (minos.1 << 8) | minos.2;
        let mut build = vec![0u8; 24];
        build[..4].copy_from_slice(&0x32u32.to_le_bytes());
        build[4..8].copy_from_slice(&24u32.to_le_bytes());
        build[8..12].copy_from_slice(&platform.to_le_bytes());
        build[12..16].copy_from_slice(&packed.to_le_bytes());
        bytes.extend(build);
        bytes
    }

    /// PE image with the given COFF machine
    pub fn pe(machine: u16) -> Vec<u8> {
        let mut bytes = vec![0u8; 0x80];
        bytes[..2].copy_from_slice(b"MZ");
        bytes[0x3c..0x40].copy_from_slice(&0x40u32.to_le_bytes());
        bytes[0x40..0x44].copy_from_slice(b"PE\0\0");
        bytes[0x44..0x46].copy_from_slice(&machine.to_le_bytes());
        bytes
    }
}
