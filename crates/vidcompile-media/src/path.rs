//! Path Normalizer (C1): canonicalizes UNC, drive-letter, SMB-URL, and
//! macOS-volume paths into one target form per the running host's
//! environment. Pure string processing, no I/O.

/// One entry in the share <-> drive-letter <-> container-mount table.
#[derive(Debug, Clone, PartialEq)]
pub struct ShareEntry {
    pub share: String,
    pub drive_letter: Option<String>,
    pub container_mount: Option<String>,
}

/// The tables and host routing policy the normalizer consults.
#[derive(Debug, Clone, PartialEq)]
pub struct PathTables {
    entries: Vec<ShareEntry>,
    pub containerized: bool,
    pub network_host: String,
}

impl PathTables {
    pub fn new(entries: Vec<ShareEntry>, containerized: bool, network_host: impl Into<String>) -> Self {
        Self {
            entries,
            containerized,
            network_host: network_host.into(),
        }
    }

    fn by_drive(&self, drive: &str) -> Option<&ShareEntry> {
        self.entries
            .iter()
            .find(|e| e.drive_letter.as_deref().map(|d| d.eq_ignore_ascii_case(drive)).unwrap_or(false))
    }

    fn by_share(&self, share: &str) -> Option<&ShareEntry> {
        self.entries.iter().find(|e| e.share.eq_ignore_ascii_case(share))
    }
}

/// Normalizes a single path. No I/O; a missing share mapping passes the
/// path through unchanged for the drive-letter case, or falls back to a
/// UNC re-emission using the configured network host for the other cases.
pub fn normalize_one(path: &str, tables: &PathTables) -> String {
    let trimmed = path.trim().trim_matches(|c| c == '"' || c == '\'');
    if trimmed.is_empty() {
        return trimmed.to_string();
    }

    if let Some(rest) = trimmed.strip_prefix("smb://") {
        let mut parts = rest.splitn(3, '/');
        let _host = parts.next().unwrap_or("");
        let share = parts.next().unwrap_or("");
        let remainder = parts.next().unwrap_or("");
        return route(tables, share, remainder);
    }

    if let Some(rest) = trimmed.strip_prefix("/Volumes/") {
        let mut parts = rest.splitn(2, '/');
        let share = parts.next().unwrap_or("");
        let remainder = parts.next().unwrap_or("");
        return route(tables, share, remainder);
    }

    let bytes = trimmed.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        let drive = trimmed[0..2].to_uppercase();
        let remainder = trimmed[2..].trim_start_matches(['\\', '/']);
        return match tables.by_drive(&drive) {
            Some(entry) => route_entry(tables, entry, remainder),
            None => trimmed.to_string(),
        };
    }

    if let Some(rest) = trimmed.strip_prefix("\\\\") {
        let mut parts = rest.splitn(3, '\\');
        let _host = parts.next().unwrap_or("");
        let share = parts.next().unwrap_or("");
        let remainder = parts.next().unwrap_or("");
        return route(tables, share, remainder);
    }

    trimmed.to_string()
}

/// Batch variant preserving input order.
pub fn normalize_many(paths: &[String], tables: &PathTables) -> Vec<String> {
    paths.iter().map(|p| normalize_one(p, tables)).collect()
}

fn route(tables: &PathTables, share: &str, remainder: &str) -> String {
    match tables.by_share(share) {
        Some(entry) => route_entry(tables, entry, remainder),
        None => {
            let remainder_bs = remainder.replace('/', "\\");
            format!("\\\\{}\\{share}\\{remainder_bs}", tables.network_host)
        }
    }
}

fn route_entry(tables: &PathTables, entry: &ShareEntry, remainder: &str) -> String {
    if tables.containerized {
        if let Some(mount) = &entry.container_mount {
            let remainder_fs = remainder.replace('\\', "/");
            return format!("{}/{remainder_fs}", mount.trim_end_matches('/'));
        }
    }
    let remainder_bs = remainder.replace('/', "\\");
    format!("\\\\{}\\{}\\{remainder_bs}", tables.network_host, entry.share)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn test_tables(containerized: bool) -> PathTables {
        PathTables::new(
            vec![
                ShareEntry {
                    share: "Share4".to_string(),
                    drive_letter: Some("V:".to_string()),
                    container_mount: Some("/mnt/share4".to_string()),
                },
                ShareEntry {
                    share: "New_Share_1".to_string(),
                    drive_letter: Some("O:".to_string()),
                    container_mount: None,
                },
            ],
            containerized,
            "192.168.1.6",
        )
    }

    #[test]
    fn smb_url_to_unc_on_direct_access_host() {
        let tables = test_tables(false);
        let out = normalize_one("smb://192.168.1.6/Share4/video.mp4", &tables);
        assert_eq!(out, "\\\\192.168.1.6\\Share4\\video.mp4");
    }

    #[test]
    fn smb_url_to_container_mount() {
        let tables = test_tables(true);
        let out = normalize_one("smb://192.168.1.6/Share4/a/video.mp4", &tables);
        assert_eq!(out, "/mnt/share4/a/video.mp4");
    }

    #[test]
    fn macos_volume_routes_like_smb() {
        let tables = test_tables(true);
        let out = normalize_one("/Volumes/Share4/video.mp4", &tables);
        assert_eq!(out, "/mnt/share4/video.mp4");
    }

    #[test]
    fn drive_letter_maps_via_table() {
        let tables = test_tables(false);
        let out = normalize_one("V:\\Production\\video.mp4", &tables);
        assert_eq!(out, "\\\\192.168.1.6\\Share4\\Production\\video.mp4");
    }

    #[test]
    fn unknown_drive_letter_passes_through() {
        let tables = test_tables(false);
        let out = normalize_one("Z:\\video.mp4", &tables);
        assert_eq!(out, "Z:\\video.mp4");
    }

    #[test]
    fn drive_without_container_mount_falls_back_to_unc_when_containerized() {
        let tables = test_tables(true);
        let out = normalize_one("O:\\clips\\a.mp4", &tables);
        assert_eq!(out, "\\\\192.168.1.6\\New_Share_1\\clips\\a.mp4");
    }

    #[test]
    fn unc_reemits_as_container_mount() {
        let tables = test_tables(true);
        let out = normalize_one("\\\\192.168.1.6\\Share4\\clips\\a.mp4", &tables);
        assert_eq!(out, "/mnt/share4/clips/a.mp4");
    }

    #[test]
    fn unrecognized_format_passes_through() {
        let tables = test_tables(false);
        let out = normalize_one("/local/disk/video.mp4", &tables);
        assert_eq!(out, "/local/disk/video.mp4");
    }

    #[test]
    fn batch_preserves_order() {
        let tables = test_tables(false);
        let inputs = vec![
            "V:\\a.mp4".to_string(),
            "/local/b.mp4".to_string(),
            "smb://host/Share4/c.mp4".to_string(),
        ];
        let out = normalize_many(&inputs, &tables);
        assert_eq!(out.len(), 3);
        assert_eq!(out[1], "/local/b.mp4");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn prop_normalize_is_idempotent(
            path in "(smb://[a-z0-9.]{3,10}/Share4/[a-zA-Z0-9_/.]{0,20}|V:\\\\\\\\[a-zA-Z0-9_\\\\.]{0,20}|/local/[a-zA-Z0-9_/.]{0,20})",
            containerized in proptest::bool::ANY,
        ) {
            let tables = test_tables(containerized);
            let once = normalize_one(&path, &tables);
            let twice = normalize_one(&once, &tables);
            prop_assert_eq!(once, twice);
        }
    }
}
