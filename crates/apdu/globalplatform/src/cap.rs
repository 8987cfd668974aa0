//! CAP archive reader
//!
//! A CAP archive is a zip whose entries place the converted package
//! components under a conventional `javacard/` runtime directory. The
//! reader extracts the component contents and the package and applet
//! identifiers; the component-internal layout is otherwise opaque.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

use tracing::debug;
use zip::ZipArchive;

use jcbench_apdu_core::Aid;

use crate::error::{Error, Result};

/// Component kinds of a converted applet package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    /// Package header, carries the package AID
    Header,
    /// Component directory
    Directory,
    /// Imported packages
    Import,
    /// Applet declarations, carries the applet AIDs
    Applet,
    /// Class descriptions
    Class,
    /// Method bytecode
    Method,
    /// Static field image
    StaticField,
    /// Constant pool
    ConstantPool,
    /// Reference locations
    RefLocation,
    /// Exported symbols
    Export,
    /// Debug information
    Debug,
    /// Descriptor component
    Descriptor,
}

impl Component {
    /// Every component kind an archive may carry.
    pub const ALL: [Self; 12] = [
        Self::Header,
        Self::Directory,
        Self::Import,
        Self::Applet,
        Self::Class,
        Self::Method,
        Self::StaticField,
        Self::ConstantPool,
        Self::RefLocation,
        Self::Export,
        Self::Debug,
        Self::Descriptor,
    ];

    /// Concatenation order mandated for the load file data block.
    pub const LOAD_ORDER: [Self; 10] = [
        Self::Header,
        Self::Directory,
        Self::Import,
        Self::Applet,
        Self::Class,
        Self::Method,
        Self::StaticField,
        Self::Export,
        Self::ConstantPool,
        Self::RefLocation,
    ];

    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "Header" => Self::Header,
            "Directory" => Self::Directory,
            "Import" => Self::Import,
            "Applet" => Self::Applet,
            "Class" => Self::Class,
            "Method" => Self::Method,
            "StaticField" => Self::StaticField,
            "ConstantPool" => Self::ConstantPool,
            "RefLocation" => Self::RefLocation,
            "Export" => Self::Export,
            "Debug" => Self::Debug,
            "Descriptor" => Self::Descriptor,
            _ => return None,
        })
    }
}

/// Immutable view of a CAP archive: component contents plus the package and
/// applet identifiers extracted from them.
#[derive(Debug, Clone)]
pub struct CapFile {
    package_name: String,
    components: HashMap<Component, Vec<u8>>,
    package_aid: Aid,
    applet_aids: Vec<Aid>,
}

impl CapFile {
    /// Open a CAP archive from a file path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(file)
    }

    /// Read a CAP archive from any seekable reader.
    pub fn from_reader<R: Read + Seek>(reader: R) -> Result<Self> {
        let mut zip = ZipArchive::new(reader).map_err(|_| Error::CapFile("not a valid archive"))?;

        let names: Vec<String> = zip.file_names().map(str::to_owned).collect();
        let mut components = HashMap::new();
        let mut package_name = String::new();

        for name in names {
            if !name.contains("javacard/") || !name.ends_with(".cap") {
                continue;
            }
            if package_name.is_empty() {
                if let Some(pos) = name.rfind("/javacard/") {
                    package_name = name[..pos].replace('/', ".");
                }
            }
            let file_name = name.rsplit('/').next().unwrap_or(&name);
            // strip the fixed 4-character extension to get the component kind
            let Some(kind) = Component::from_name(&file_name[..file_name.len() - 4]) else {
                continue;
            };

            let mut data = Vec::new();
            zip.by_name(&name)
                .map_err(|_| Error::CapFile("archive entry vanished"))?
                .read_to_end(&mut data)?;
            components.insert(kind, data);
        }

        let package_aid = read_package_aid(
            components
                .get(&Component::Header)
                .map(Vec::as_slice)
                .unwrap_or_default(),
        )?;
        let applet_aids = read_applet_aids(
            components
                .get(&Component::Applet)
                .map(Vec::as_slice)
                .unwrap_or_default(),
        )?;
        debug!(
            package = %package_aid,
            applets = applet_aids.len(),
            name = %package_name,
            "CAP archive read"
        );

        Ok(Self {
            package_name,
            components,
            package_aid,
            applet_aids,
        })
    }

    /// Dotted package name derived from the archive paths.
    pub fn package_name(&self) -> &str {
        &self.package_name
    }

    /// Contents of a component; missing components are empty.
    pub fn component(&self, kind: Component) -> &[u8] {
        self.components.get(&kind).map(Vec::as_slice).unwrap_or_default()
    }

    /// The package AID from the Header component.
    pub const fn package_aid(&self) -> &Aid {
        &self.package_aid
    }

    /// The applet AIDs from the Applet component, in declaration order.
    pub fn applet_aids(&self) -> &[Aid] {
        &self.applet_aids
    }
}

/// The package AID sits at a fixed offset in the Header component: a 1-byte
/// length at offset 12 followed by the AID bytes.
fn read_package_aid(header: &[u8]) -> Result<Aid> {
    if header.len() < 13 {
        return Err(Error::CapFile("Header component missing or truncated"));
    }
    let aid_len = header[12] as usize;
    let aid_end = 13 + aid_len;
    if header.len() < aid_end {
        return Err(Error::CapFile("package AID exceeds the Header component"));
    }
    Ok(Aid::try_from(&header[13..aid_end])?)
}

/// Applet declarations start 4 bytes into the Applet component and repeat
/// `length ‖ AID ‖ 2-byte install-method offset` until exhausted.
fn read_applet_aids(applet: &[u8]) -> Result<Vec<Aid>> {
    let mut aids = Vec::new();
    let mut index = 4;
    while index < applet.len() {
        let aid_len = applet[index] as usize;
        let start = index + 1;
        let end = start + aid_len;
        if end > applet.len() {
            return Err(Error::CapFile("applet AID exceeds the Applet component"));
        }
        aids.push(Aid::try_from(&applet[start..end])?);
        index = end + 2;
    }
    Ok(aids)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    use hex_literal::hex;
    use zip::ZipWriter;
    use zip::write::SimpleFileOptions;

    const PACKAGE_AID: [u8; 7] = hex!("A0000006270501");
    const APPLET_AID: [u8; 8] = hex!("A000000627050101");

    fn fixture_header() -> Vec<u8> {
        let mut header = hex!("01 00DECAFFED 0102 0400 0107").to_vec();
        header.push(PACKAGE_AID.len() as u8);
        header.extend_from_slice(&PACKAGE_AID);
        header
    }

    fn fixture_applet() -> Vec<u8> {
        let mut applet = hex!("03 000E 01").to_vec();
        applet.push(APPLET_AID.len() as u8);
        applet.extend_from_slice(&APPLET_AID);
        applet.extend_from_slice(&hex!("0008"));
        applet
    }

    /// Build an in-memory CAP archive with the conventional entry layout.
    pub(crate) fn fixture_archive() -> Cursor<Vec<u8>> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);

        let entries: [(&str, Vec<u8>); 4] = [
            ("test/pkg/javacard/Header.cap", fixture_header()),
            ("test/pkg/javacard/Applet.cap", fixture_applet()),
            ("test/pkg/javacard/Method.cap", vec![0xAA; 300]),
            ("test/pkg/javacard/ConstantPool.cap", vec![0xBB; 40]),
        ];
        for (name, data) in entries {
            writer.start_file(name, options).unwrap();
            writer.write_all(&data).unwrap();
        }
        writer.finish().unwrap()
    }

    #[test]
    fn test_fixture_archive_parses() {
        let cap = CapFile::from_reader(fixture_archive()).unwrap();

        assert_eq!(cap.package_aid().as_bytes(), PACKAGE_AID);
        assert_eq!(cap.applet_aids().len(), 1);
        assert_eq!(cap.applet_aids()[0].as_bytes(), APPLET_AID);
        assert_eq!(cap.package_name(), "test.pkg");

        assert_eq!(cap.component(Component::Method).len(), 300);
        assert_eq!(cap.component(Component::ConstantPool).len(), 40);
        // missing kinds default empty
        assert!(cap.component(Component::Export).is_empty());
        assert!(cap.component(Component::Debug).is_empty());
    }

    #[test]
    fn test_multiple_applets() {
        let mut applet = hex!("03 0020 02").to_vec();
        for aid in [&APPLET_AID[..], &hex!("A000000627050102")[..]] {
            applet.push(aid.len() as u8);
            applet.extend_from_slice(aid);
            applet.extend_from_slice(&hex!("0008"));
        }

        let aids = read_applet_aids(&applet).unwrap();
        assert_eq!(aids.len(), 2);
        assert_eq!(aids[1].as_bytes(), hex!("A000000627050102"));
    }

    #[test]
    fn test_truncated_header_rejected() {
        assert!(matches!(
            read_package_aid(&hex!("0011223344")),
            Err(Error::CapFile(_))
        ));
        // declared AID length runs past the component
        let mut header = vec![0u8; 12];
        header.push(0x10);
        header.extend_from_slice(&hex!("A0A1A2"));
        assert!(matches!(
            read_package_aid(&header),
            Err(Error::CapFile(_))
        ));
    }

    #[test]
    fn test_missing_header_component() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        writer
            .start_file("test/pkg/javacard/Method.cap", options)
            .unwrap();
        writer.write_all(&[0u8; 16]).unwrap();
        let archive = writer.finish().unwrap();

        assert!(matches!(
            CapFile::from_reader(archive),
            Err(Error::CapFile(_))
        ));
    }
}
