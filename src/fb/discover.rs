//! Framebuffer node discovery via `/proc/devices`.
//!
//! The fb driver's major number is not fixed, so the device list is built
//! by finding the "fb" entry in `/proc/devices` and matching `/dev` nodes
//! by their major number.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

/// Registered device driver, parsed from one `/proc/devices` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RegisteredDriver {
    pub kind: DriverKind,
    pub major: u32,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DriverKind {
    Character,
    Block,
}

/// Paths of `/dev` nodes handled by the "fb" driver.
pub(crate) fn framebuffer_nodes() -> std::io::Result<Vec<PathBuf>> {
    let drivers = parse_registered_drivers(BufReader::new(File::open("/proc/devices")?));
    let Some(fb) = drivers.into_iter().find(|d| d.name == "fb") else {
        return Ok(Vec::new());
    };

    let mut nodes = Vec::new();
    for entry in std::fs::read_dir("/dev")? {
        let Ok(entry) = entry else { continue };
        let path = entry.path();
        let Some(path_str) = path.to_str() else { continue };
        let Ok(cpath) = std::ffi::CString::new(path_str) else { continue };

        // SAFETY: cpath is a valid nul-terminated string, statbuf is out-only.
        let mut statbuf: libc::stat = unsafe { std::mem::zeroed() };
        if unsafe { libc::stat(cpath.as_ptr(), &mut statbuf) } == -1 {
            continue;
        }
        let major = unsafe { libc::major(statbuf.st_rdev) } as u32;
        if major == fb.major {
            nodes.push(path);
        }
    }
    nodes.sort();
    Ok(nodes)
}

/// Parse the `/proc/devices` listing.
///
/// The file has a "Character devices:" section and a "Block devices:"
/// section, each listing `major name` pairs. Unparseable lines are skipped.
pub(crate) fn parse_registered_drivers(input: impl BufRead) -> Vec<RegisteredDriver> {
    let mut kind = DriverKind::Character;
    let mut drivers = Vec::new();

    for line in input.lines().map_while(Result::ok) {
        if line.starts_with("Character devices:") {
            kind = DriverKind::Character;
        } else if line.starts_with("Block devices:") {
            kind = DriverKind::Block;
        } else if let Some(driver) = parse_driver_line(kind, &line) {
            drivers.push(driver);
        }
    }
    drivers
}

fn parse_driver_line(kind: DriverKind, line: &str) -> Option<RegisteredDriver> {
    let mut parts = line.split_whitespace();
    let major = parts.next()?.parse().ok()?;
    let name = parts.next()?.to_string();
    Some(RegisteredDriver { kind, major, name })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_registered_drivers() {
        let input = "\
Character devices:
  1 mem
  4 tty
 29 fb
249 rtc

Block devices:
  7 loop
  9 md
";
        let drivers = parse_registered_drivers(std::io::Cursor::new(input));
        assert_eq!(drivers.len(), 6);
        assert_eq!(
            drivers[2],
            RegisteredDriver {
                kind: DriverKind::Character,
                major: 29,
                name: "fb".into(),
            }
        );
        assert_eq!(drivers[4].kind, DriverKind::Block);
        assert_eq!(drivers[4].major, 7);
    }

    #[test]
    fn test_parse_skips_garbage_lines() {
        let input = "Character devices:\nnot a device line\n 10 misc\n";
        let drivers = parse_registered_drivers(std::io::Cursor::new(input));
        assert_eq!(drivers.len(), 1);
        assert_eq!(drivers[0].name, "misc");
    }
}
