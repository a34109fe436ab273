//! Handler routing — magic bytes first, extension second
//!
//! Magic beats extension for trust: a renamed archive still routes to the
//! archive handler, and a `.zip` that is not actually a ZIP does not.

use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Extensions routed to the ZIP handler. OOXML documents and JAR-family
/// containers are ZIPs under the hood.
const ZIP_EXTS: &[&str] = &["zip", "jar", "apk", "docx", "xlsx", "pptx"];

/// Routing outcome: which handler owns the file and why it was chosen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingDecision {
    /// Handler key, e.g. `"zip"`. Empty when unsupported.
    pub handler: String,
    /// `"magic"` or `"ext"`.
    pub reason: String,
}

impl RoutingDecision {
    pub fn is_archive(&self) -> bool {
        !self.handler.is_empty()
    }
}

/// Decide the handler for a path.
///
/// Reads up to 4 head bytes; `PK` routes to the ZIP handler regardless of
/// extension. Falls back to the extension table, otherwise returns an empty
/// decision. Unreadable files fall through to the extension check.
pub fn route_to_handler(path: &Path) -> RoutingDecision {
    let mut magic = [0u8; 4];
    if let Ok(mut f) = File::open(path) {
        // Short reads are fine; the buffer stays zeroed past what was read.
        let _ = f.read(&mut magic);
    }
    if magic[0] == 0x50 && magic[1] == 0x4B {
        return RoutingDecision {
            handler: "zip".to_string(),
            reason: "magic".to_string(),
        };
    }

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    if ZIP_EXTS.contains(&ext.as_str()) {
        return RoutingDecision {
            handler: "zip".to_string(),
            reason: "ext".to_string(),
        };
    }

    RoutingDecision::default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, content: &[u8]) -> std::path::PathBuf {
        let p = dir.join(name);
        File::create(&p).unwrap().write_all(content).unwrap();
        p
    }

    #[test]
    fn magic_wins_over_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let p = write_file(dir.path(), "renamed.dat", b"PK\x03\x04rest");
        let rd = route_to_handler(&p);
        assert_eq!(rd.handler, "zip");
        assert_eq!(rd.reason, "magic");
    }

    #[test]
    fn extension_fallback_for_ooxml_family() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.docx", "b.XLSX", "c.jar", "d.apk", "e.pptx", "f.zip"] {
            let p = write_file(dir.path(), name, b"not a real header");
            let rd = route_to_handler(&p);
            assert_eq!(rd.handler, "zip", "{name} should route by extension");
            assert_eq!(rd.reason, "ext");
        }
    }

    #[test]
    fn unsupported_files_get_empty_handler() {
        let dir = tempfile::tempdir().unwrap();
        let p = write_file(dir.path(), "notes.txt", b"plain text");
        let rd = route_to_handler(&p);
        assert!(!rd.is_archive());
        assert!(rd.handler.is_empty());
    }

    #[test]
    fn missing_file_still_routes_by_extension() {
        let rd = route_to_handler(Path::new("/definitely/not/here.zip"));
        assert_eq!(rd.handler, "zip");
        assert_eq!(rd.reason, "ext");
    }
}
